//! Engine error types

use thiserror::Error;

use taskforge_providers::ProviderError;
use taskforge_storage::StorageError;

/// One failed attempt inside a failover chain
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    /// Provider that was tried
    pub provider_id: String,
    /// Model that was requested, when the entry named one
    pub model: Option<String>,
    /// Why the attempt failed
    pub error: ProviderError,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{}/{}: {}", self.provider_id, model, self.error),
            None => write!(f, "{}: {}", self.provider_id, self.error),
        }
    }
}

fn render_attempts(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors produced by the execution engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Every candidate in the chain was tried and failed
    #[error("All {} candidates failed: {}", attempts.len(), render_attempts(attempts))]
    ChainExhausted {
        /// The failure of each candidate, in attempt order
        attempts: Vec<AttemptFailure>,
    },

    /// A terminal failure stopped the chain before trying further candidates
    #[error("Chain aborted at {provider_id}: {error}")]
    ChainAborted {
        /// Provider whose failure ended the chain
        provider_id: String,
        /// The terminal failure
        error: ProviderError,
        /// Candidates already tried before the abort, in attempt order
        attempts: Vec<AttemptFailure>,
    },

    /// No provider can serve the requested task
    #[error("No candidate providers for this task")]
    NoCandidates,

    /// Unknown execution id
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// Provider-level error outside chain execution
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Storage backend error
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Provider(ProviderError::Serialization(err.to_string()))
    }
}
