//! Error types for batch ingestion

use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause carried by backend and transform errors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Main error type for ingestion runs
#[derive(Error, Debug)]
pub enum IngestError {
    /// A required field is missing or a value is unusable. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Local source file absent at download time
    #[error("Local source not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Object storage failed, after any retries
    #[error("Storage backend error for {path}: {source}")]
    Backend {
        path: String,
        #[source]
        source: BoxError,
    },

    /// CSV parsing or output serialization failed
    #[error("Transform failed: {context}: {source}")]
    Transform {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Pipeline document could not be read or parsed
    #[error("Invalid pipeline document {}: {source}", path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn config(message: impl Into<String>) -> Self {
        IngestError::Configuration(message.into())
    }

    pub fn backend(path: impl Into<String>, source: impl Into<BoxError>) -> Self {
        IngestError::Backend {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn transform(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        IngestError::Transform {
            context: context.into(),
            source: source.into(),
        }
    }
}
