//! Error types for the providers module
//!
//! The failover router classifies every failure into one of three buckets:
//! retryable (advance to the next candidate), terminal for the whole chain
//! (authentication, exhausted credits, cancellation), or a plain execution
//! failure that is retryable on a sibling candidate. `aborts_chain` encodes
//! that policy.

use thiserror::Error;

/// Errors that can occur when executing a task against a provider
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    /// Provider not found by ID
    #[error("Provider not found: {0}")]
    NotFound(String),

    /// Request exceeded its deadline
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Provider returned no usable content
    #[error("Provider returned an empty response")]
    EmptyResponse,

    /// Network error occurred
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limited by provider
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication/authorization failed (never includes credentials)
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Whole-account resource exhaustion (credits, quota)
    #[error("Credits exhausted: {0}")]
    CreditsExhausted(String),

    /// Subprocess or output-level execution failure
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Execution cancelled by the caller
    #[error("Execution cancelled")]
    Cancelled,

    /// Invalid or unavailable model
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Whether the router must abandon the remaining chain instead of trying
    /// the next candidate.
    ///
    /// Authentication failures and exhausted credits affect every sibling
    /// model of the same account, so cycling through them only wastes time.
    /// A cancelled execution aborts too: the caller asked for the whole
    /// request to stop, not for a different candidate to serve it.
    pub fn aborts_chain(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::CreditsExhausted(_) | Self::Cancelled
        )
    }

    /// Whether the next candidate in the chain may still succeed
    pub fn is_retryable(&self) -> bool {
        !self.aborts_chain()
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(0)
        } else if err.is_connect() {
            ProviderError::Network(err.to_string())
        } else {
            ProviderError::Internal(err.to_string())
        }
    }
}

impl From<taskforge_process::ProcessError> for ProviderError {
    fn from(err: taskforge_process::ProcessError) -> Self {
        use taskforge_process::ProcessError;
        match err {
            ProcessError::Timeout { seconds } => ProviderError::Timeout(seconds),
            ProcessError::Cancelled => ProviderError::Cancelled,
            ProcessError::NonZeroExit { code, stderr } => {
                ProviderError::ExecutionFailed(format!("exit code {code}: {stderr}"))
            }
            other => ProviderError::ExecutionFailed(other.to_string()),
        }
    }
}

impl From<taskforge_storage::StorageError> for ProviderError {
    fn from(err: taskforge_storage::StorageError) -> Self {
        ProviderError::Internal(err.to_string())
    }
}
