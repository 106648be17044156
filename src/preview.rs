//! Preview artifacts
//!
//! A preview exists once its artifact is on disk under the generated
//! directory. Ids are `prev_<utc millis>_<12 hex>`; the random suffix keeps
//! renders issued in the same millisecond apart.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

const ID_PREFIX: &str = "prev_";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Svg,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }

    const ALL: [OutputFormat; 2] = [OutputFormat::Png, OutputFormat::Svg];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preview {
    pub id: String,
    pub url: String,
    pub format: OutputFormat,
    pub template_id: Option<String>,
    pub render_hash: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Where preview artifacts live, and how they are addressed publicly.
#[derive(Debug, Clone)]
pub struct PreviewStore {
    dir: PathBuf,
    url_prefix: String,
}

impl PreviewStore {
    /// `url_prefix` is the public URL of `dir`, e.g. `/static/generated`.
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn next_id(&self, at: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{ID_PREFIX}{}_{}", at.timestamp_millis(), &suffix[..12])
    }

    pub fn is_valid_id(id: &str) -> bool {
        id.starts_with(ID_PREFIX)
            && id.len() <= 64
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    pub fn artifact_path(&self, id: &str, format: OutputFormat) -> PathBuf {
        self.dir.join(format!("{id}.{}", format.extension()))
    }

    pub fn artifact_url(&self, id: &str, format: OutputFormat) -> String {
        format!("{}/{id}.{}", self.url_prefix, format.extension())
    }

    /// Scratch path for collaborators that write a file we then load.
    pub fn scratch_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("tmp_{id}.png"))
    }

    pub fn ensure_dir(&self) -> EngineResult<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| EngineError::Storage(format!("create {}: {e}", self.dir.display())))
    }

    pub fn write_png(&self, id: &str, canvas: &RgbaImage) -> EngineResult<PathBuf> {
        self.ensure_dir()?;
        let path = self.artifact_path(id, OutputFormat::Png);
        canvas
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| EngineError::Storage(format!("write {}: {e}", path.display())))?;
        Ok(path)
    }

    pub fn write_svg(&self, id: &str, markup: &str) -> EngineResult<PathBuf> {
        self.ensure_dir()?;
        let path = self.artifact_path(id, OutputFormat::Svg);
        fs::write(&path, markup)
            .map_err(|e| EngineError::Storage(format!("write {}: {e}", path.display())))?;
        Ok(path)
    }

    /// Artifact on disk for `id`, if any.
    pub fn find(&self, id: &str) -> Option<(PathBuf, OutputFormat)> {
        if !Self::is_valid_id(id) {
            return None;
        }
        OutputFormat::ALL
            .into_iter()
            .map(|f| (self.artifact_path(id, f), f))
            .find(|(p, _)| p.is_file())
    }
}
