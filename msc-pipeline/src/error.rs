//! Error types for msc-pipeline

use msc_common::events::EventError;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// msc-common error (config, observers, checkpoint validation)
    #[error(transparent)]
    Common(#[from] msc_common::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV encode error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error reported by an external collaborator (source, resolver, stats, scorer)
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),

    /// A stage aborted
    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    /// The track source could not be read at all
    #[error("Track source unavailable: {0}")]
    SourceUnavailable(String),
}

impl PipelineError {
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Short variant name, used when an error is attached to an event
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Common(e) => e.kind(),
            PipelineError::Io(_) => "Io",
            PipelineError::Json(_) => "Json",
            PipelineError::Csv(_) => "Csv",
            PipelineError::Collaborator(_) => "Collaborator",
            PipelineError::Stage { .. } => "Stage",
            PipelineError::SourceUnavailable(_) => "SourceUnavailable",
        }
    }
}

impl From<&PipelineError> for EventError {
    fn from(error: &PipelineError) -> Self {
        EventError::new(error.kind(), error.to_string())
    }
}
