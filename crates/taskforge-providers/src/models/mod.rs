//! Data models shared across providers

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a provider is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Hosted multi-model HTTP API
    Api,
    /// Locally reachable inference server
    Local,
    /// External command-line tool spawned as a subprocess
    Cli,
}

/// Kinds of task a provider/model can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Plain text generation
    Chat,
    /// Image understanding
    Vision,
    /// Vector embedding
    Embedding,
}

/// Billing classification, used by chain scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostClass {
    /// No cost per request
    Free,
    /// Pay per token
    Metered,
    /// Flat subscription
    Flat,
}

/// What a provider is capable of
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    /// Supported task types
    pub task_types: Vec<TaskType>,
    /// Largest supported context, in tokens
    pub max_context: usize,
    /// Image inputs supported
    pub supports_vision: bool,
    /// Native tool calls supported
    pub supports_tools: bool,
    /// Embedding generation supported
    pub supports_embedding: bool,
}

impl Capabilities {
    /// Whether these capabilities can serve the given task type
    pub fn supports(&self, task_type: TaskType) -> bool {
        match task_type {
            TaskType::Chat => self.task_types.contains(&TaskType::Chat),
            TaskType::Vision => self.supports_vision,
            TaskType::Embedding => self.supports_embedding,
        }
    }
}

/// Per-provider metadata, immutable for the process lifetime except for
/// capability refresh through the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Unique provider identifier
    pub id: String,
    /// Execution substrate
    pub kind: ProviderKind,
    /// Human-readable name
    pub display_name: String,
    /// Capability set
    pub capabilities: Capabilities,
    /// Billing classification
    pub cost_class: CostClass,
}

/// Information about an available model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Unique model identifier
    pub id: String,
    /// Owning provider id
    pub provider: String,
    /// Maximum context window in tokens
    pub context_length: usize,
    /// Whether this model is free to use
    #[serde(default)]
    pub is_free: bool,
    /// Image inputs supported
    #[serde(default)]
    pub supports_vision: bool,
    /// Native tool calls supported
    #[serde(default)]
    pub supports_tools: bool,
}

/// Coarse task-difficulty classification used to pick a default chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Smallest, cheapest models are fine
    Trivial,
    /// Everyday tasks
    Simple,
    /// Tasks needing a capable general model
    Moderate,
    /// Long-context or multi-step work
    Complex,
    /// Best available model, cost secondary
    Critical,
}

/// One failover candidate: a provider and an optional explicit model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Provider to invoke
    pub provider_id: String,
    /// Model to request; `None` lets the adapter auto-select
    pub model: Option<String>,
}

impl ChainEntry {
    /// Construct a candidate with an explicit model
    pub fn new(provider_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model: Some(model.into()),
        }
    }

    /// Construct a candidate that lets the adapter pick the model
    pub fn provider_only(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model: None,
        }
    }
}

/// A chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message role (user, assistant, system)
    pub role: String,
    /// Message content
    pub content: String,
}

impl Message {
    /// Convenience constructor for a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Convenience constructor for a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// An image attached to a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePart {
    /// MIME type, e.g. `image/png`
    pub media_type: String,
    /// Base64-encoded image bytes
    pub base64_data: String,
}

/// A tool made available to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name
    pub name: String,
    /// What the tool does
    pub description: String,
    /// JSON schema of the tool's parameters
    pub parameters: serde_json::Value,
}

/// A tool invocation emitted by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name
    pub name: String,
    /// Invocation arguments
    pub arguments: serde_json::Value,
}

/// Uniform request accepted by every adapter
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Explicit model id; adapters auto-select when absent
    pub model: Option<String>,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Optional system prompt, prepended by the adapter in its native shape
    pub system_prompt: Option<String>,
    /// Image attachments (vision tasks)
    pub images: Vec<ImagePart>,
    /// Tools offered to the model
    pub tools: Vec<ToolSpec>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<usize>,
    /// Per-request deadline override
    pub timeout: Option<Duration>,
    /// Owner of the request; CLI executions resolve their workspace by it
    pub user_id: Option<String>,
    /// Workspace directory for CLI executions and artifact scanning
    pub workspace: Option<PathBuf>,
    /// Execution id assigned by the caller, used for cancellation
    pub execution_id: Option<String>,
}

impl ChatRequest {
    /// Derive the task type this request needs a provider for
    pub fn task_type(&self) -> TaskType {
        if self.images.is_empty() {
            TaskType::Chat
        } else {
            TaskType::Vision
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,
    /// Number of tokens in the completion
    pub completion_tokens: usize,
    /// Total tokens used
    pub total_tokens: usize,
}

/// A file produced as a side effect of an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFile {
    /// File name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Human-readable size, e.g. `1.2 MB`
    pub human_size: String,
    /// Absolute path
    pub full_path: PathBuf,
}

/// Uniform response produced by every adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated text content
    pub content: String,
    /// Model that produced the response
    pub model: String,
    /// Provider that served the request
    pub provider: String,
    /// Token usage, zeroed when the substrate does not report it
    #[serde(default)]
    pub usage: TokenUsage,
    /// Native tool invocations emitted by the model
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Files the execution produced in its workspace
    #[serde(default)]
    pub output_files: Vec<OutputFile>,
}
