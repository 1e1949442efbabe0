//! Error types for specula-core

use thiserror::Error;

/// Main error type for the specula-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem watch error
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Task not found
    #[error("task not found: {0}")]
    TaskNotFound(String),
}

/// Result type alias for specula-core
pub type Result<T> = std::result::Result<T, Error>;
