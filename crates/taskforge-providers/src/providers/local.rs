//! Local-inference provider adapter
//!
//! Targets a locally reachable inference server (Ollama wire format). The
//! live model list is cached for 30 seconds, models are bucketed into
//! text/vision/embedding by name-pattern heuristics with an optional richer
//! capability probe cached durably, and the smallest model of the required
//! kind is auto-selected unless a model is explicitly requested. A vision
//! request with no vision model degrades to the text bucket with a logged
//! warning instead of failing outright.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use taskforge_storage::{tables, StateStore};

use crate::{
    error::ProviderError,
    models::{
        Capabilities, ChatRequest, ChatResponse, CostClass, ProviderDescriptor, ProviderKind,
        TaskType, TokenUsage,
    },
    provider::Provider,
};

/// Live model list cache TTL
const MODEL_LIST_TTL: Duration = Duration::from_secs(30);

/// Default per-request timeout for local inference
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Vision-capable model families, by name
static VISION_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(llava|vision|bakllava|moondream|minicpm-v)").expect("vision pattern")
});

/// Embedding model families, by name
static EMBEDDING_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(embed|bge|nomic|minilm|e5)").expect("embedding pattern"));

/// Parameter-count tag in a model name, e.g. `:7b` or `-1.5b`
static PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)b\b").expect("param pattern"));

/// What kind of model a request needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelBucket {
    Text,
    Vision,
    Embedding,
}

/// Configuration for the local-inference adapter
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Provider id, e.g. `ollama`
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Server base URL
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Whether to run the richer per-model capability probe
    pub probe_capabilities: bool,
}

impl LocalConfig {
    /// Defaults for a localhost Ollama server
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            base_url: "http://localhost:11434".to_string(),
            timeout: DEFAULT_TIMEOUT,
            probe_capabilities: false,
        }
    }
}

/// A locally served model with derived metadata
#[derive(Debug, Clone)]
struct LocalModel {
    name: String,
    size_bytes: u64,
    bucket: ModelBucket,
    /// Parameter count in billions, parsed from the name when present
    params_b: Option<f64>,
}

struct ModelListCache {
    models: Vec<LocalModel>,
    fetched_at: Option<Instant>,
}

impl ModelListCache {
    fn is_fresh(&self) -> bool {
        self.fetched_at
            .map(|at| at.elapsed() < MODEL_LIST_TTL)
            .unwrap_or(false)
    }
}

/// Local-inference adapter
pub struct LocalProvider {
    config: LocalConfig,
    descriptor: ProviderDescriptor,
    client: Client,
    store: Arc<dyn StateStore>,
    cache: Mutex<ModelListCache>,
}

impl LocalProvider {
    /// Create a new local provider
    pub fn new(config: LocalConfig, store: Arc<dyn StateStore>) -> Result<Self, ProviderError> {
        if config.base_url.is_empty() {
            return Err(ProviderError::Config(
                "local provider base URL is required".to_string(),
            ));
        }

        let descriptor = ProviderDescriptor {
            id: config.id.clone(),
            kind: ProviderKind::Local,
            display_name: config.display_name.clone(),
            capabilities: Capabilities {
                task_types: vec![TaskType::Chat, TaskType::Vision, TaskType::Embedding],
                max_context: 32_768,
                supports_vision: true,
                supports_tools: false,
                supports_embedding: true,
            },
            cost_class: CostClass::Free,
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            config,
            descriptor,
            client,
            store,
            cache: Mutex::new(ModelListCache {
                models: Vec::new(),
                fetched_at: None,
            }),
        })
    }

    /// Live models, via the 30s cache
    async fn models(&self) -> Result<Vec<LocalModel>, ProviderError> {
        let mut cache = self.cache.lock().await;
        if cache.is_fresh() {
            return Ok(cache.models.clone());
        }

        let response = self
            .client
            .get(format!("{}/api/tags", self.config.base_url))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let listed: TagsResponse = response.json().await?;
        let mut models = Vec::with_capacity(listed.models.len());
        for tag in listed.models {
            let bucket = self.bucket_for(&tag.name).await;
            models.push(LocalModel {
                params_b: parse_params(&tag.name),
                bucket,
                size_bytes: tag.size,
                name: tag.name,
            });
        }

        debug!(provider = %self.config.id, count = models.len(), "Refreshed local model list");
        cache.models = models.clone();
        cache.fetched_at = Some(Instant::now());
        Ok(models)
    }

    /// Classify a model by name heuristics, upgraded by the durable probe
    /// cache when probing is enabled.
    async fn bucket_for(&self, name: &str) -> ModelBucket {
        if EMBEDDING_NAME_RE.is_match(name) {
            return ModelBucket::Embedding;
        }

        if VISION_NAME_RE.is_match(name) {
            return ModelBucket::Vision;
        }

        if self.config.probe_capabilities {
            if let Some(bucket) = self.probed_bucket(name).await {
                return bucket;
            }
        }

        ModelBucket::Text
    }

    /// Richer capability probe against `/api/show`, cached durably so the
    /// probe runs once per model across restarts.
    async fn probed_bucket(&self, name: &str) -> Option<ModelBucket> {
        let key = cache_key(&self.config.id, name);
        if let Ok(Some(cached)) = self.store.get(tables::LOCAL_MODEL_CAPS, &key) {
            let vision = cached.get("supports_vision").and_then(|v| v.as_bool())?;
            return Some(if vision {
                ModelBucket::Vision
            } else {
                ModelBucket::Text
            });
        }

        let response = self
            .client
            .post(format!("{}/api/show", self.config.base_url))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .ok()?;
        let detail: ShowResponse = response.json().await.ok()?;

        let vision = detail
            .details
            .map(|d| {
                d.families
                    .iter()
                    .any(|f| f.eq_ignore_ascii_case("clip") || f.eq_ignore_ascii_case("mllama"))
            })
            .unwrap_or(false);

        let record = serde_json::json!({ "supports_vision": vision });
        if let Err(e) = self.store.put(tables::LOCAL_MODEL_CAPS, &key, &record) {
            warn!(model = %name, error = %e, "Failed to cache capability probe");
        }

        Some(if vision {
            ModelBucket::Vision
        } else {
            ModelBucket::Text
        })
    }

    /// Pick the smallest model of the required bucket; vision falls back to
    /// text with a warning when nothing vision-capable is installed.
    fn select_model(&self, models: &[LocalModel], wanted: ModelBucket) -> Option<String> {
        let pick_smallest = |bucket: ModelBucket| {
            models
                .iter()
                .filter(|m| m.bucket == bucket)
                .min_by(|a, b| {
                    let ka = (a.params_b.unwrap_or(f64::MAX), a.size_bytes);
                    let kb = (b.params_b.unwrap_or(f64::MAX), b.size_bytes);
                    ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|m| m.name.clone())
        };

        match pick_smallest(wanted) {
            Some(name) => Some(name),
            None if wanted == ModelBucket::Vision => {
                let fallback = pick_smallest(ModelBucket::Text);
                if let Some(name) = &fallback {
                    warn!(
                        provider = %self.config.id,
                        model = %name,
                        "No vision model installed, falling back to text model"
                    );
                }
                fallback
            }
            None => None,
        }
    }
}

fn cache_key(provider: &str, model: &str) -> String {
    format!("{provider}__{}", model.replace(['/', ':'], "_"))
}

fn parse_params(name: &str) -> Option<f64> {
    PARAM_RE
        .captures(name)
        .and_then(|cap| cap[1].parse::<f64>().ok())
}

#[async_trait]
impl Provider for LocalProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let models = self.models().await?;
        if models.is_empty() {
            return Err(ProviderError::InvalidModel(
                "no models installed on local server".to_string(),
            ));
        }

        let wanted = if request.images.is_empty() {
            ModelBucket::Text
        } else {
            ModelBucket::Vision
        };

        let model = match request.model.clone().filter(|m| !m.is_empty()) {
            Some(explicit) => explicit,
            None => self
                .select_model(&models, wanted)
                .ok_or_else(|| ProviderError::InvalidModel("no suitable model".to_string()))?,
        };

        let mut wire_messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            wire_messages.push(WireMessage {
                role: "system".to_string(),
                content: system.clone(),
                images: Vec::new(),
            });
        }

        let last_user_idx = request
            .messages
            .iter()
            .rposition(|m| m.role == "user")
            .unwrap_or(usize::MAX);
        for (idx, message) in request.messages.iter().enumerate() {
            let images = if idx == last_user_idx {
                request.images.iter().map(|i| i.base64_data.clone()).collect()
            } else {
                Vec::new()
            };
            wire_messages.push(WireMessage {
                role: message.role.clone(),
                content: message.content.clone(),
                images,
            });
        }

        debug!(provider = %self.config.id, model = %model, "Sending local chat request");

        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .timeout(timeout)
            .json(&WireChatRequest {
                model: model.clone(),
                messages: wire_messages,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(timeout.as_secs())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ExecutionFailed(format!(
                "local server returned HTTP {status}: {body}"
            )));
        }

        let wire: WireChatResponse = response.json().await?;
        let prompt_tokens = wire.prompt_eval_count.unwrap_or(0);
        let completion_tokens = wire.eval_count.unwrap_or(0);

        Ok(ChatResponse {
            content: wire.message.map(|m| m.content).unwrap_or_default(),
            model,
            provider: self.config.id.clone(),
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            tool_calls: Vec::new(),
            output_files: Vec::new(),
        })
    }

    async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.config.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

// Wire formats (Ollama)

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
    details: Option<ShowDetails>,
}

#[derive(Debug, Deserialize)]
struct ShowDetails {
    #[serde(default)]
    families: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WireChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireChatResponse {
    message: Option<WireResponseMessage>,
    prompt_eval_count: Option<usize>,
    eval_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: String,
}
