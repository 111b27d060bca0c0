//! Hosted-API provider adapter
//!
//! Stateless HTTP calls against an OpenAI-compatible multi-model endpoint.
//! The API key is resolved through the layered lookup in `api_key`; requests
//! carry multimodal image parts and native tool schemas only when the target
//! model is flagged for them; responses are normalized to the uniform
//! `ChatResponse` shape at this boundary so nothing upstream ever sees the
//! wire format.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{
    api_key::ApiKeyManager,
    catalog::ModelCatalog,
    error::ProviderError,
    interpreter,
    models::{
        Capabilities, ChatRequest, ChatResponse, CostClass, Message, ProviderDescriptor,
        ProviderKind, TaskType, TokenUsage, ToolCall,
    },
    provider::Provider,
};

/// Default per-request timeout for hosted calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for a hosted-API provider
#[derive(Debug, Clone)]
pub struct HostedConfig {
    /// Provider id, e.g. `openrouter`
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// API base URL (OpenAI-compatible)
    pub base_url: String,
    /// Model used when the request does not name one
    pub default_model: String,
    /// Tenant whose configured credential applies
    pub tenant_id: Option<String>,
    /// Explicit key override, wins over every other layer
    pub api_key_override: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl HostedConfig {
    /// Reasonable defaults for an aggregator endpoint
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            base_url: base_url.into(),
            default_model: String::new(),
            tenant_id: None,
            api_key_override: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Hosted multi-model API adapter
pub struct HostedProvider {
    config: HostedConfig,
    descriptor: ProviderDescriptor,
    client: Client,
    keys: Arc<RwLock<ApiKeyManager>>,
    catalog: Arc<ModelCatalog>,
}

impl HostedProvider {
    /// Create a new hosted provider
    pub fn new(
        config: HostedConfig,
        keys: Arc<RwLock<ApiKeyManager>>,
        catalog: Arc<ModelCatalog>,
    ) -> Result<Self, ProviderError> {
        if config.base_url.is_empty() {
            return Err(ProviderError::Config(
                "hosted provider base URL is required".to_string(),
            ));
        }

        let descriptor = ProviderDescriptor {
            id: config.id.clone(),
            kind: ProviderKind::Api,
            display_name: config.display_name.clone(),
            capabilities: Capabilities {
                task_types: vec![TaskType::Chat, TaskType::Vision],
                max_context: 200_000,
                supports_vision: true,
                supports_tools: true,
                supports_embedding: false,
            },
            cost_class: CostClass::Metered,
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            config,
            descriptor,
            client,
            keys,
            catalog,
        })
    }

    fn resolve_key(&self) -> Result<String, ProviderError> {
        self.keys.read().resolve(
            &self.config.id,
            self.config.tenant_id.as_deref(),
            self.config.api_key_override.as_deref(),
        )
    }

    /// Model flags from the catalog; unknown models get conservative tool
    /// support (none) but keep image parts so vision requests still work on
    /// endpoints the catalog does not cover.
    async fn model_flags(&self, model: &str) -> (bool, bool) {
        let models = self.catalog.models_for(&self.config.id).await;
        match models.iter().find(|m| m.id == model) {
            Some(info) => (info.supports_tools, info.supports_vision),
            None => (false, true),
        }
    }

    fn build_messages(request: &ChatRequest, attach_images: bool) -> Vec<WireMessage> {
        let mut wire = Vec::new();

        if let Some(system) = &request.system_prompt {
            wire.push(WireMessage {
                role: "system".to_string(),
                content: WireContent::Text(system.clone()),
            });
        }

        let last_user_idx = request
            .messages
            .iter()
            .rposition(|m| m.role == "user")
            .unwrap_or(usize::MAX);

        for (idx, message) in request.messages.iter().enumerate() {
            let needs_parts = attach_images && idx == last_user_idx && !request.images.is_empty();
            let content = if needs_parts {
                let mut parts = vec![WirePart::Text {
                    text: message.content.clone(),
                }];
                for image in &request.images {
                    parts.push(WirePart::ImageUrl {
                        image_url: WireImageUrl {
                            url: format!(
                                "data:{};base64,{}",
                                image.media_type, image.base64_data
                            ),
                        },
                    });
                }
                WireContent::Parts(parts)
            } else {
                WireContent::Text(message.content.clone())
            };
            wire.push(WireMessage {
                role: message.role.clone(),
                content,
            });
        }

        wire
    }

    fn convert_response(
        &self,
        response: WireChatResponse,
        model: String,
    ) -> Result<ChatResponse, ProviderError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyResponse)?;

        let content = choice
            .message
            .as_ref()
            .and_then(|m| m.content.clone())
            .unwrap_or_default();

        let tool_calls = choice
            .message
            .map(|m| m.tool_calls)
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                let arguments = serde_json::from_str::<Value>(&call.function.arguments)
                    .unwrap_or(Value::String(call.function.arguments));
                ToolCall {
                    name: call.function.name,
                    arguments,
                }
            })
            .collect();

        let usage = response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            content,
            model,
            provider: self.config.id.clone(),
            usage,
            tool_calls,
            output_files: Vec::new(),
        })
    }
}

#[async_trait]
impl Provider for HostedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let api_key = self.resolve_key()?;
        let model = request
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.config.default_model.clone());
        if model.is_empty() {
            return Err(ProviderError::InvalidModel(
                "no model requested and no default configured".to_string(),
            ));
        }

        let (supports_tools, supports_vision) = self.model_flags(&model).await;
        if !request.images.is_empty() && !supports_vision {
            return Err(ProviderError::InvalidModel(format!(
                "model {model} does not accept image input"
            )));
        }

        let tools: Vec<WireTool> = if supports_tools {
            request
                .tools
                .iter()
                .map(|t| WireTool {
                    kind: "function".to_string(),
                    function: WireToolFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect()
        } else {
            if !request.tools.is_empty() {
                debug!(model = %model, "Model lacks tool support, omitting tool schemas");
            }
            Vec::new()
        };

        let wire_request = WireChatRequest {
            model: model.clone(),
            messages: Self::build_messages(&request, supports_vision),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools,
        };

        debug!(provider = %self.config.id, model = %model, "Sending hosted chat request");

        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .timeout(timeout)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                error!(provider = %self.config.id, error = %e, "Hosted API request failed");
                if e.is_timeout() {
                    ProviderError::Timeout(timeout.as_secs())
                } else {
                    ProviderError::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(provider = %self.config.id, status = %status, "Hosted API error");

            return Err(match status.as_u16() {
                401 | 403 => ProviderError::Auth(format!("HTTP {status}")),
                402 => ProviderError::CreditsExhausted(format!("HTTP {status}")),
                429 => {
                    // Rate limiting with an explicit credits signal is
                    // account-wide, not a transient throttle.
                    match interpreter::classify_errors(&body) {
                        Err(e @ ProviderError::CreditsExhausted(_)) => e,
                        _ => ProviderError::RateLimited(60),
                    }
                }
                _ => match interpreter::classify_errors(&body) {
                    Err(e @ ProviderError::CreditsExhausted(_)) => e,
                    _ => ProviderError::ExecutionFailed(format!("HTTP {status}")),
                },
            });
        }

        let wire_response: WireChatResponse = response.json().await?;
        self.convert_response(wire_response, model)
    }

    async fn is_available(&self) -> bool {
        let Ok(api_key) = self.resolve_key() else {
            return false;
        };

        let result = self
            .client
            .get(format!("{}/models", self.config.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(provider = %self.config.id, error = %e, "Hosted availability check failed");
                false
            }
        }
    }
}

// Wire formats (OpenAI-compatible)

#[derive(Debug, Serialize)]
struct WireChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: WireContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Serialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireToolFunction,
}

#[derive(Debug, Serialize)]
struct WireToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct WireChatResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: Option<WireResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct WireToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}
