//! Engine error taxonomy.

use thiserror::Error;

use crate::validation::ValidationError;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Preview not found: {0}")]
    PreviewNotFound(String),

    #[error("Post not found: {0}")]
    PostNotFound(i64),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Render failure: {0}")]
    RenderFailure(String),

    #[error("Credits service unreachable: {0}")]
    ServiceUnavailable(String),

    #[error("Unauthorized for credit debit")]
    Unauthorized,

    #[error("Credit debit failed: {0}")]
    DebitFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Stable tag used in CLI/JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TemplateNotFound(_) | Self::PreviewNotFound(_) | Self::PostNotFound(_) => {
                "not_found"
            }
            Self::Validation(_) => "validation_error",
            Self::BadRequest(_) => "bad_request",
            Self::RenderFailure(_) => "render_failure",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Unauthorized => "unauthorized",
            Self::DebitFailed(_) => "debit_failed",
            Self::Storage(_) => "storage_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == "not_found"
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<image::ImageError> for EngineError {
    fn from(err: image::ImageError) -> Self {
        Self::RenderFailure(err.to_string())
    }
}
