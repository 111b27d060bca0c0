//! Error types for the state store

use std::io;
use thiserror::Error;

/// State store errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem I/O failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store root directory could not be determined
    #[error("Cannot determine data directory")]
    NoDataDir,

    /// Key contains characters unsafe for the backend
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
