//! Error types shared across the iconseek pipeline.
//!
//! The taxonomy distinguishes fatal configuration problems (reported before
//! any work starts) from per-item failures that batch operations recover
//! from locally, and from client-side validation errors that never touch
//! the index.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for iconseek operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in iconseek operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or unusable configuration (index path, metadata path, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// The asset root passed to the catalog does not exist.
    #[error("assets root not found: {}", .0.display())]
    AssetsNotFound(PathBuf),

    /// The asset root exists but contains no indexable images.
    #[error("no indexable images found under {}", .0.display())]
    EmptyCatalog(PathBuf),

    /// Failed to load or run the embedding model.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Failed to build, persist, or query the vector index.
    #[error("index error: {0}")]
    Index(String),

    /// The metadata file violates the loader contract (duplicate or
    /// non-contiguous ids, malformed lines).
    #[error("metadata error: {0}")]
    Metadata(String),

    /// Invalid query parameters, rejected at the boundary.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The query service has not finished loading its engine yet.
    #[error("search engine is not ready")]
    ServiceNotReady,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<candle_core::Error> for Error {
    fn from(err: candle_core::Error) -> Self {
        Error::Embedding(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(err: bincode::error::EncodeError) -> Self {
        Error::Index(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(err: bincode::error::DecodeError) -> Self {
        Error::Index(err.to_string())
    }
}
