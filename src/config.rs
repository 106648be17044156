//! Engine configuration
//!
//! Defaults, then an optional TOML file, then environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assets::AssetMounts;
use crate::compositor::DEFAULT_CANVAS;
use crate::error::{EngineError, EngineResult};

pub const ENV_DEBIT_URL: &str = "CREDITS_DEBIT_URL";
pub const ENV_DISABLE_GUARD: &str = "DISABLE_CREDITS_GUARD";
pub const ENV_TEMPLATES_DIR: &str = "POSTFORGE_TEMPLATES_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub templates_dir: PathBuf,
    /// Served as `/static/`
    pub static_root: PathBuf,
    /// Served as `/assets/`
    pub assets_root: PathBuf,
    pub fonts_dir: PathBuf,
    /// Preview artifacts, relative to `static_root`
    pub generated_subdir: String,
    pub database: PathBuf,
    pub canvas_size: u32,
    pub credits: CreditsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CreditsConfig {
    pub debit_url: String,
    pub disabled: bool,
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("assets/templates"),
            static_root: PathBuf::from("static"),
            assets_root: PathBuf::from("assets"),
            fonts_dir: PathBuf::from("assets/fonts"),
            generated_subdir: "generated".to_string(),
            database: PathBuf::from("postforge.db"),
            canvas_size: DEFAULT_CANVAS,
            credits: CreditsConfig::default(),
        }
    }
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            debit_url: "http://localhost:8000/me/use-credit".to_string(),
            disabled: false,
            timeout_secs: 10,
        }
    }
}

impl CreditsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> EngineResult<Self> {
        toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Environment overrides, read through `lookup` so tests need not touch the process env.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_DEBIT_URL).filter(|v| !v.trim().is_empty()) {
            self.credits.debit_url = url;
        }
        if let Some(flag) = lookup(ENV_DISABLE_GUARD) {
            self.credits.disabled = matches!(flag.trim(), "1" | "true" | "True");
        }
        if let Some(dir) = lookup(ENV_TEMPLATES_DIR).filter(|v| !v.trim().is_empty()) {
            self.templates_dir = PathBuf::from(dir);
        }
    }

    pub fn mounts(&self) -> AssetMounts {
        AssetMounts::standard(&self.static_root, &self.assets_root)
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.static_root.join(&self.generated_subdir)
    }

    pub fn generated_url_prefix(&self) -> String {
        format!("/static/{}", self.generated_subdir.trim_matches('/'))
    }
}
