//! Render Pipeline - Single Entry Point
//!
//! Every render goes through `validate_and_merge` first. Nothing reaches the
//! compositor, the markup renderer or the preview store with unvalidated input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use crate::compositor::{Compositor, LayerSources, PromoCard};
use crate::config::EngineConfig;
use crate::credits::{CreditDebit, HttpCreditDebit};
use crate::error::{EngineError, EngineResult};
use crate::export;
use crate::hashing::{compute_render_hash, RenderInputs};
use crate::lifecycle::CommitService;
use crate::markup::render_markup;
use crate::preview::{OutputFormat, Preview, PreviewStore};
use crate::store::{CommittedPage, CommittedPost, PostStore, SqlitePostStore};
use crate::templates::{TemplateDetail, TemplateRegistry, TemplateSummary};
use crate::validation::{RenderContext, ValidationOutcome, Validator};
use crate::ENGINE_VERSION;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Without a template the fallback card layout is used.
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub ratio: Option<String>,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub brand_logo_url: Option<String>,
    #[serde(default)]
    pub extra_images: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkupOutput {
    pub template_id: String,
    pub svg: String,
    pub warnings: Vec<String>,
}

/// The render pipeline - list, validate, render, commit
pub struct RenderPipeline {
    registry: Arc<TemplateRegistry>,
    validator: Validator,
    compositor: Compositor,
    previews: PreviewStore,
    commits: CommitService,
}

impl RenderPipeline {
    pub fn new(
        registry: Arc<TemplateRegistry>,
        compositor: Compositor,
        previews: PreviewStore,
        commits: CommitService,
    ) -> Self {
        let validator = Validator::new(compositor.mounts().prefixes());
        Self {
            registry,
            validator,
            compositor,
            previews,
            commits,
        }
    }

    /// Wire the default collaborators: HTTP debit, SQLite store, built-in card renderer.
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let mounts = config.mounts();
        let registry = Arc::new(TemplateRegistry::load(&config.templates_dir, mounts.clone())?);
        let compositor = Compositor::with_defaults(mounts, &config.fonts_dir, config.canvas_size);
        let previews = PreviewStore::new(config.generated_dir(), config.generated_url_prefix());

        let debit: Arc<dyn CreditDebit> = Arc::new(HttpCreditDebit::new(
            config.credits.debit_url.clone(),
            config.credits.timeout(),
        )?);
        let posts: Arc<dyn PostStore> = Arc::new(SqlitePostStore::open(&config.database)?);
        let commits = CommitService::new(previews.clone(), debit, posts, config.credits.disabled);

        Ok(Self::new(registry, compositor, previews, commits))
    }

    pub fn registry(&self) -> &Arc<TemplateRegistry> {
        &self.registry
    }

    /// List all available templates
    pub fn list_templates(&self) -> Vec<TemplateSummary> {
        self.registry.list_public()
    }

    /// Get a specific template with its slot map
    pub fn get_template(&self, id: &str) -> EngineResult<TemplateDetail> {
        self.registry.detail(id)
    }

    pub fn reload_templates(&self) -> EngineResult<usize> {
        self.registry.reload()
    }

    /// Validate caller fields against a template
    pub fn validate(
        &self,
        template_id: &str,
        fields: &Map<String, Value>,
        ratio: Option<&str>,
    ) -> EngineResult<ValidationOutcome> {
        let record = self.registry.get(template_id)?;
        Ok(self.validator.validate_and_merge(&record, fields, ratio)?)
    }

    /// Markup for a template, without persisting anything
    pub fn render_markup(
        &self,
        template_id: &str,
        fields: &Map<String, Value>,
        ratio: Option<&str>,
    ) -> EngineResult<MarkupOutput> {
        let record = self.registry.get(template_id)?;
        let outcome = self.validator.validate_and_merge(&record, fields, ratio)?;
        let svg = render_markup(&record, &outcome.context)?;
        Ok(MarkupOutput {
            template_id: record.meta.id.clone(),
            svg,
            warnings: outcome.warnings,
        })
    }

    /// Render and persist a preview artifact
    #[tracing::instrument(
        skip(self, request),
        fields(template = ?request.template_id, format = ?request.format)
    )]
    pub fn render_preview(&self, request: &RenderRequest) -> EngineResult<Preview> {
        let created_at = Utc::now();
        let id = self.previews.next_id(created_at);
        let sources = LayerSources {
            brand_logo_url: request.brand_logo_url.as_deref(),
            extra_images: &request.extra_images,
        };

        let (context, warnings, template) = match &request.template_id {
            Some(template_id) => {
                let record = self.registry.get(template_id)?;
                let ratio = request.ratio.as_deref();
                let outcome = self
                    .validator
                    .validate_and_merge(&record, &request.fields, ratio)?;
                (outcome.context, outcome.warnings, Some(record))
            }
            None => (loose_context(&request.fields), Vec::new(), None),
        };

        match (request.format, &template) {
            (OutputFormat::Svg, Some(record)) => {
                let svg = render_markup(record, &context)?;
                self.previews.write_svg(&id, &svg)?;
            }
            (OutputFormat::Svg, None) => {
                return Err(EngineError::BadRequest("svg output requires a template_id".into()));
            }
            (OutputFormat::Png, Some(record)) if record.has_geometry() => {
                let canvas = self.compositor.compose(record, &context, &sources)?;
                self.previews.write_png(&id, &canvas)?;
            }
            (OutputFormat::Png, _) => {
                let logo_path = request
                    .brand_logo_url
                    .as_deref()
                    .and_then(|url| self.compositor.mounts().resolve(url));
                let card = PromoCard::from_context(&context, request.product_id, logo_path);
                self.previews.ensure_dir()?;
                let canvas = self
                    .compositor
                    .compose_fallback(&card, &self.previews.scratch_path(&id))?;
                self.previews.write_png(&id, &canvas)?;
            }
        }

        let render_hash = compute_render_hash(&RenderInputs {
            template_id: template.as_ref().map(|r| r.meta.id.as_str()),
            template_version: template.as_ref().map(|r| r.meta.version.as_str()),
            context: &context,
            brand_logo_url: request.brand_logo_url.as_deref(),
            extra_images: &request.extra_images,
            format: request.format.extension(),
            engine_version: ENGINE_VERSION,
        })?;

        tracing::info!(preview = %id, "preview rendered");
        Ok(Preview {
            url: self.previews.artifact_url(&id, request.format),
            id,
            format: request.format,
            template_id: template.map(|r| r.meta.id.clone()),
            render_hash,
            warnings,
            created_at,
        })
    }

    /// Debit one credit, then record the committed post
    pub async fn commit_preview(
        &self,
        preview_id: &str,
        urls: &[String],
        authorization: Option<&str>,
    ) -> EngineResult<CommittedPost> {
        self.commits.commit(preview_id, urls, authorization).await
    }

    pub fn list_committed(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> EngineResult<CommittedPage> {
        self.commits.list(limit, offset)
    }

    /// Rasterize a committed post's first (SVG) URL to PNG next to it
    pub fn export_post_png(&self, post_id: i64) -> EngineResult<PathBuf> {
        let post = self
            .commits
            .posts()
            .get(post_id)?
            .ok_or(EngineError::PostNotFound(post_id))?;
        let first = post
            .urls
            .first()
            .ok_or_else(|| EngineError::BadRequest("No media on post".into()))?;
        if !first.to_ascii_lowercase().ends_with(".svg") {
            return Err(EngineError::BadRequest(format!("Unsupported media path: {first}")));
        }
        let svg_path = self
            .compositor
            .mounts()
            .resolve(first)
            .ok_or_else(|| EngineError::BadRequest(format!("Unsupported media path: {first}")))?;
        if !svg_path.is_file() {
            return Err(EngineError::BadRequest(format!("SVG file missing: {first}")));
        }
        export::export_png(&svg_path)
    }
}

/// Untemplated fields pass through as-is.
fn loose_context(fields: &Map<String, Value>) -> RenderContext {
    let mut ctx = RenderContext::new();
    for (k, v) in fields {
        ctx.insert(k.clone(), v.clone());
    }
    ctx
}
