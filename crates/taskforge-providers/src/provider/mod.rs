//! Provider trait and capability registry

use async_trait::async_trait;

use crate::{
    error::ProviderError,
    models::{ChatRequest, ChatResponse, ProviderDescriptor},
};

pub mod registry;

pub use registry::CapabilityRegistry;

/// Core trait implemented by every execution substrate
///
/// Exactly three implementations exist: the hosted-API adapter, the
/// local-inference adapter, and the CLI-subprocess adapter. The rest of the
/// engine only ever sees this contract and the uniform response shape.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Static metadata describing this provider
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Execute a chat request and normalize the result
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Whether the provider can currently serve requests
    async fn is_available(&self) -> bool;
}
