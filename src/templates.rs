//! Template System - Schemas, Slots, Registry
//!
//! One template per directory: `meta.json` (schema) + `template.svg.j2`
//! (markup with slot annotations) + optional `thumb.png`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::assets::AssetMounts;
use crate::error::{EngineError, EngineResult};
use crate::scanner::{scan_markup, SlotMap};
use crate::ENGINE_VERSION;

pub type TemplateId = String;

pub const META_FILE: &str = "meta.json";
pub const MARKUP_FILE: &str = "template.svg.j2";
pub const THUMB_FILE: &str = "thumb.png";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Price,
    Image,
    Color,
    Url,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub max_chars: Option<usize>,
    #[serde(default)]
    pub default: Option<Value>,
    /// Display format with a `{value}` placeholder (prices)
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanvasSpec {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub background: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMeta {
    pub id: TemplateId,
    pub name: String,
    pub version: String,
    pub ratios: Vec<String>,
    pub fields: BTreeMap<String, FieldDef>,
    #[serde(default)]
    pub canvas: Option<CanvasSpec>,
    #[serde(default)]
    pub engine_min_version: Option<String>,
}

impl TemplateMeta {
    pub fn allows_ratio(&self, ratio: &str) -> bool {
        self.ratios.iter().any(|r| r == ratio)
    }
}

/// Immutable once loaded; reload replaces records, never mutates them.
#[derive(Debug, Clone)]
pub struct TemplateRecord {
    pub meta: TemplateMeta,
    pub dir: PathBuf,
    pub template_file: PathBuf,
    pub markup: String,
    pub thumb_file: Option<PathBuf>,
    pub slots: SlotMap,
    pub scanned_canvas: Option<(u32, u32)>,
}

impl TemplateRecord {
    /// Read one template directory. `Ok(None)` when the directory is not a
    /// template candidate (missing meta or markup).
    pub fn load(dir: &Path) -> EngineResult<Option<Self>> {
        let meta_path = dir.join(META_FILE);
        let template_file = dir.join(MARKUP_FILE);
        if !meta_path.is_file() || !template_file.is_file() {
            return Ok(None);
        }

        let meta: TemplateMeta = serde_json::from_str(&fs::read_to_string(&meta_path)?)?;
        check_engine_version(&meta)?;

        let bytes = fs::read(&template_file)?;
        let markup = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };

        let (slots, scanned_canvas) = match scan_markup(&markup) {
            Ok(scanned) => (scanned.slots, scanned.canvas),
            Err(e) => {
                tracing::warn!(
                    template = %meta.id,
                    error = %e,
                    "markup not scannable, no slot map"
                );
                (SlotMap::new(), None)
            }
        };

        let thumb = dir.join(THUMB_FILE);
        Ok(Some(Self {
            meta,
            dir: dir.to_path_buf(),
            template_file,
            markup,
            thumb_file: thumb.is_file().then_some(thumb),
            slots,
            scanned_canvas,
        }))
    }

    /// Canvas for the geometry-driven render: metadata wins over the markup root.
    pub fn canvas(&self) -> Option<CanvasSpec> {
        if let Some(canvas) = &self.meta.canvas {
            return Some(canvas.clone());
        }
        self.scanned_canvas.map(|(width, height)| CanvasSpec {
            width,
            height,
            background: None,
        })
    }

    pub fn has_geometry(&self) -> bool {
        self.canvas().is_some() && !self.slots.is_empty()
    }
}

fn check_engine_version(meta: &TemplateMeta) -> EngineResult<()> {
    let Some(min) = &meta.engine_min_version else {
        return Ok(());
    };
    let engine_ver = semver::Version::parse(ENGINE_VERSION)
        .map_err(|_| EngineError::Config("Invalid engine version".into()))?;
    let min_ver = semver::Version::parse(min)
        .map_err(|_| EngineError::Config(format!("Invalid template min version: {min}")))?;
    if engine_ver < min_ver {
        return Err(EngineError::Config(format!(
            "Template {} requires engine >= {}, current is {}",
            meta.id, min, ENGINE_VERSION
        )));
    }
    Ok(())
}

/// Public view of a template. Never carries filesystem paths.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateSummary {
    pub id: TemplateId,
    pub name: String,
    pub version: String,
    pub ratios: Vec<String>,
    pub fields: BTreeMap<String, FieldDef>,
    pub thumb_url: Option<String>,
    pub has_map: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateDetail {
    #[serde(flatten)]
    pub summary: TemplateSummary,
    pub canvas: Option<CanvasSpec>,
    pub slots: SlotMap,
}

type RecordSet = Arc<HashMap<TemplateId, Arc<TemplateRecord>>>;

/// Template registry - loads and caches templates, swaps the whole set on reload
pub struct TemplateRegistry {
    base_dir: PathBuf,
    mounts: AssetMounts,
    records: RwLock<RecordSet>,
}

impl TemplateRegistry {
    pub fn new(base_dir: impl Into<PathBuf>, mounts: AssetMounts) -> Self {
        Self {
            base_dir: base_dir.into(),
            mounts,
            records: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn load(base_dir: impl Into<PathBuf>, mounts: AssetMounts) -> EngineResult<Self> {
        let registry = Self::new(base_dir, mounts);
        registry.reload()?;
        Ok(registry)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Rebuild the full set, then swap it in. Returns the number of templates loaded.
    pub fn reload(&self) -> EngineResult<usize> {
        let fresh = self.scan_dir()?;
        let count = fresh.len();
        let mut guard = self
            .records
            .write()
            .map_err(|_| EngineError::Storage("template registry lock poisoned".into()))?;
        *guard = Arc::new(fresh);
        tracing::info!(count, dir = %self.base_dir.display(), "template registry loaded");
        Ok(count)
    }

    fn scan_dir(&self) -> EngineResult<HashMap<TemplateId, Arc<TemplateRecord>>> {
        let mut fresh = HashMap::new();
        if !self.base_dir.is_dir() {
            tracing::warn!(dir = %self.base_dir.display(), "templates directory missing");
            return Ok(fresh);
        }

        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.base_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            match TemplateRecord::load(&dir) {
                Ok(Some(record)) => {
                    fresh.insert(record.meta.id.clone(), Arc::new(record));
                }
                Ok(None) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        "skipping directory without meta.json and template.svg.j2"
                    );
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "skipping template");
                }
            }
        }
        Ok(fresh)
    }

    fn snapshot(&self) -> RecordSet {
        match self.records.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn get(&self, id: &str) -> EngineResult<Arc<TemplateRecord>> {
        self.snapshot()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::TemplateNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list_public(&self) -> Vec<TemplateSummary> {
        let records = self.snapshot();
        let mut out: Vec<_> = records.values().map(|r| self.summary(r)).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn detail(&self, id: &str) -> EngineResult<TemplateDetail> {
        let record = self.get(id)?;
        Ok(TemplateDetail {
            summary: self.summary(&record),
            canvas: record.canvas(),
            slots: record.slots.clone(),
        })
    }

    fn summary(&self, record: &TemplateRecord) -> TemplateSummary {
        TemplateSummary {
            id: record.meta.id.clone(),
            name: record.meta.name.clone(),
            version: record.meta.version.clone(),
            ratios: record.meta.ratios.clone(),
            fields: record.meta.fields.clone(),
            thumb_url: self.thumbnail_url(record),
            has_map: !record.slots.is_empty(),
        }
    }

    /// Public URL of the thumbnail, `None` when absent or outside every mount.
    pub fn thumbnail_url(&self, record: &TemplateRecord) -> Option<String> {
        let thumb = record.thumb_file.as_ref()?;
        self.mounts.public_url(thumb)
    }
}
