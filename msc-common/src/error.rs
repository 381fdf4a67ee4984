//! Common error types for msc

use thiserror::Error;

/// Common result type for msc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across msc crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An observer failed while handling an event
    #[error("Observer error: {0}")]
    Observer(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short variant name, used when an error is attached to an event
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "Io",
            Error::Json(_) => "Json",
            Error::Config(_) => "Config",
            Error::NotFound(_) => "NotFound",
            Error::InvalidInput(_) => "InvalidInput",
            Error::Observer(_) => "Observer",
            Error::Internal(_) => "Internal",
        }
    }
}
