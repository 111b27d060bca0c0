//! Provider abstraction and adapters for AI task execution
//!
//! This crate provides:
//! - A uniform `Provider` contract over heterogeneous execution substrates
//! - Adapters for a hosted HTTP API, a local inference server, and
//!   interactively-authenticated CLI tools
//! - A capability registry with deterministic candidate ordering
//! - A remote model catalog with durable mirroring
//! - Output interpretation for noisy CLI streams (noise stripping, error
//!   classification, NDJSON event parsing)
//! - Workspace management and artifact detection for subprocess runs
//! - Durable CLI authentication state with probe-based re-verification

pub mod api_key;
pub mod artifacts;
pub mod auth;
pub mod catalog;
pub mod error;
pub mod interpreter;
pub mod models;
pub mod provider;
pub mod providers;
pub mod workspace;

pub use api_key::ApiKeyManager;
pub use auth::{AuthEvidence, AuthRecord, AuthStore};
pub use catalog::ModelCatalog;
pub use error::ProviderError;
pub use models::{
    Capabilities, ChainEntry, ChatRequest, ChatResponse, CostClass, ImagePart, Message, ModelInfo,
    OutputFile, ProviderDescriptor, ProviderKind, TaskType, Tier, TokenUsage, ToolCall, ToolSpec,
};
pub use provider::{registry::CapabilityRegistry, Provider};
pub use providers::{
    CliProvider, CliToolSpec, HostedConfig, HostedProvider, LocalConfig, LocalProvider,
};
pub use workspace::WorkspaceManager;
