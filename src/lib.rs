//! PostForge Core - template-driven social post images
//!
//! # Guarantees
//! 1. Templates Are Contracts: the field schema decides what is valid
//! 2. Slots Are Geometry: markup annotations decide where things go
//! 3. Validation Is Mandatory: every render validates first
//! 4. Deterministic Output: equal inputs, equal canvas
//! 5. No Commit Without Debit: a post row implies a successful credit debit

pub mod assets;
pub mod compositor;
pub mod config;
pub mod credits;
pub mod error;
pub mod export;
pub mod hashing;
pub mod lifecycle;
pub mod logging;
pub mod markup;
pub mod pipeline;
pub mod preview;
pub mod scanner;
pub mod store;
pub mod templates;
pub mod text;
pub mod validation;

pub use assets::AssetMounts;
pub use compositor::{CardRenderer, Compositor, LayerSources, PromoCard, SimpleCardRenderer};
pub use config::EngineConfig;
pub use credits::{CreditDebit, HttpCreditDebit};
pub use error::{EngineError, EngineResult};
pub use lifecycle::CommitService;
pub use pipeline::{MarkupOutput, RenderPipeline, RenderRequest};
pub use preview::{OutputFormat, Preview, PreviewStore};
pub use scanner::{scan_markup, Slot, SlotKind, SlotMap};
pub use store::{CommittedPage, CommittedPost, PostStore, SqlitePostStore};
pub use templates::{FieldDef, FieldKind, TemplateMeta, TemplateRecord, TemplateRegistry};
pub use validation::{RenderContext, ValidationError, ValidationOutcome, Validator};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
