//! Error types for process management

use std::io;
use thiserror::Error;

/// Process management errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Failed to spawn process
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(#[from] io::Error),

    /// Process exceeded its timeout and was killed
    #[error("Process timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Process was cancelled by caller
    #[error("Process cancelled")]
    Cancelled,

    /// Process exited with a nonzero code
    #[error("Process exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    /// Failed to terminate process
    #[error("Failed to kill process: {0}")]
    KillFailed(String),

    /// Execution id already has a running process
    #[error("Execution already running: {0}")]
    AlreadyRunning(String),
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
