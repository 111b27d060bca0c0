//! Failover router - strictly sequential candidate execution
//!
//! The router walks a chain of (provider, model) candidates one at a time.
//! A usable response ends the chain immediately; a retryable failure advances
//! to the next candidate; an authentication or credits failure aborts the
//! whole chain, because it would fail on every sibling of the same account
//! too, and a cancellation aborts it because the caller wants the request
//! stopped, not served elsewhere. Candidates are never raced in parallel and
//! never retried in place.

use std::sync::Arc;

use tracing::{debug, info, warn};

use taskforge_providers::{
    CapabilityRegistry, ChainEntry, ChatRequest, ChatResponse, ProviderError, Tier,
};

use crate::error::{AttemptFailure, EngineError};

/// Default cap on synthesized chain length
pub const DEFAULT_MAX_CANDIDATES: usize = 5;

/// Router tuning knobs
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum candidates when the registry synthesizes the chain
    pub max_candidates: usize,
    /// Treat a response with tool calls but no text as usable
    pub accept_tool_only_responses: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_candidates: DEFAULT_MAX_CANDIDATES,
            accept_tool_only_responses: true,
        }
    }
}

/// Outcome of a routed execution
#[derive(Debug)]
pub struct RouteOutcome {
    /// The winning response
    pub response: ChatResponse,
    /// Failures of the candidates tried before the winner
    pub attempts: Vec<AttemptFailure>,
}

/// Sequential failover over registry-synthesized or caller-supplied chains
pub struct FailoverRouter {
    registry: Arc<CapabilityRegistry>,
    config: RouterConfig,
}

impl FailoverRouter {
    /// Create a router over the given registry
    pub fn new(registry: Arc<CapabilityRegistry>, config: RouterConfig) -> Self {
        Self { registry, config }
    }

    /// Execute the request against a failover chain
    ///
    /// An explicit chain is used verbatim, in the caller's order, with no
    /// reordering or filtering. Otherwise the registry synthesizes one from
    /// the request's task type and the tier.
    pub async fn route(
        &self,
        request: &ChatRequest,
        tier: Tier,
        explicit_chain: Option<Vec<ChainEntry>>,
    ) -> Result<RouteOutcome, EngineError> {
        let chain = match explicit_chain {
            Some(chain) if !chain.is_empty() => chain,
            _ => {
                self.registry
                    .candidates_for(request.task_type(), tier, self.config.max_candidates)
                    .await
            }
        };

        if chain.is_empty() {
            return Err(EngineError::NoCandidates);
        }

        debug!(candidates = chain.len(), tier = ?tier, "Routing over failover chain");

        let mut attempts: Vec<AttemptFailure> = Vec::new();

        for entry in chain {
            let provider = match self.registry.get(&entry.provider_id) {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(provider = %entry.provider_id, "Chain names unknown provider");
                    attempts.push(AttemptFailure {
                        provider_id: entry.provider_id,
                        model: entry.model,
                        error: e,
                    });
                    continue;
                }
            };

            let mut attempt_request = request.clone();
            if entry.model.is_some() {
                attempt_request.model = entry.model.clone();
            }

            info!(
                provider = %entry.provider_id,
                model = entry.model.as_deref().unwrap_or("auto"),
                attempt = attempts.len() + 1,
                "Trying candidate"
            );

            match provider.chat(attempt_request).await {
                Ok(response) => {
                    if self.is_usable(&response) {
                        info!(
                            provider = %entry.provider_id,
                            model = %response.model,
                            failed_attempts = attempts.len(),
                            "Candidate succeeded"
                        );
                        return Ok(RouteOutcome { response, attempts });
                    }
                    warn!(provider = %entry.provider_id, "Candidate returned unusable response");
                    attempts.push(AttemptFailure {
                        provider_id: entry.provider_id,
                        model: entry.model,
                        error: ProviderError::EmptyResponse,
                    });
                }
                Err(error) if error.aborts_chain() => {
                    warn!(
                        provider = %entry.provider_id,
                        error = %error,
                        "Terminal failure, abandoning remaining candidates"
                    );
                    return Err(EngineError::ChainAborted {
                        provider_id: entry.provider_id,
                        error,
                        attempts,
                    });
                }
                Err(error) => {
                    warn!(provider = %entry.provider_id, error = %error, "Candidate failed");
                    attempts.push(AttemptFailure {
                        provider_id: entry.provider_id,
                        model: entry.model,
                        error,
                    });
                }
            }
        }

        Err(EngineError::ChainExhausted { attempts })
    }

    /// A response is usable when it has text, or tool calls where policy
    /// accepts a tool-only turn.
    fn is_usable(&self, response: &ChatResponse) -> bool {
        if !response.content.trim().is_empty() {
            return true;
        }
        self.config.accept_tool_only_responses && !response.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use taskforge_providers::{
        Capabilities, CostClass, Message, ModelCatalog, Provider, ProviderDescriptor, ProviderKind,
        TaskType, TokenUsage, ToolCall,
    };
    use taskforge_storage::MemoryStore;

    /// Provider that replays a scripted sequence of outcomes
    struct ScriptedProvider {
        descriptor: ProviderDescriptor,
        script: Mutex<Vec<Result<ChatResponse, ProviderError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(id: &str, script: Vec<Result<ChatResponse, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                descriptor: ProviderDescriptor {
                    id: id.to_string(),
                    kind: ProviderKind::Api,
                    display_name: id.to_string(),
                    capabilities: Capabilities {
                        task_types: vec![TaskType::Chat],
                        max_context: 32_768,
                        supports_vision: false,
                        supports_tools: true,
                        supports_embedding: false,
                    },
                    cost_class: CostClass::Metered,
                },
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock();
            if script.is_empty() {
                return Err(ProviderError::Internal("script exhausted".into()));
            }
            script.remove(0)
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    fn response(provider: &str, content: &str) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            model: "m".to_string(),
            provider: provider.to_string(),
            usage: TokenUsage::default(),
            tool_calls: vec![],
            output_files: vec![],
        }
    }

    fn router_over(providers: Vec<Arc<ScriptedProvider>>) -> FailoverRouter {
        router_with_config(providers, RouterConfig::default())
    }

    fn router_with_config(
        providers: Vec<Arc<ScriptedProvider>>,
        config: RouterConfig,
    ) -> FailoverRouter {
        let catalog = Arc::new(ModelCatalog::new(
            Arc::new(MemoryStore::new()),
            "http://unused.invalid/catalog.json".to_string(),
        ));
        let mut registry = CapabilityRegistry::new(catalog);
        for provider in providers {
            registry.register(provider).unwrap();
        }
        FailoverRouter::new(Arc::new(registry), config)
    }

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![Message::user("hello")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn success_stops_the_chain() {
        let first = ScriptedProvider::new("first", vec![Ok(response("first", "Bonjour"))]);
        let second = ScriptedProvider::new("second", vec![Ok(response("second", "unused"))]);
        let router = router_over(vec![first.clone(), second.clone()]);

        let outcome = router.route(&request(), Tier::Simple, None).await.unwrap();
        assert_eq!(outcome.response.content, "Bonjour");
        assert_eq!(outcome.response.provider, "first");
        assert!(outcome.attempts.is_empty());
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn retryable_failure_advances_to_next_candidate() {
        let first = ScriptedProvider::new("first", vec![Err(ProviderError::Timeout(30))]);
        let second = ScriptedProvider::new("second", vec![Ok(response("second", "recovered"))]);
        let router = router_over(vec![first.clone(), second.clone()]);

        let outcome = router.route(&request(), Tier::Simple, None).await.unwrap();
        assert_eq!(outcome.response.provider, "second");
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.attempts[0].provider_id, "first");
        assert_eq!(first.calls(), 1);
    }

    #[tokio::test]
    async fn empty_response_is_retryable() {
        let first = ScriptedProvider::new("first", vec![Ok(response("first", "   "))]);
        let second = ScriptedProvider::new("second", vec![Ok(response("second", "real"))]);
        let router = router_over(vec![first, second]);

        let outcome = router.route(&request(), Tier::Simple, None).await.unwrap();
        assert_eq!(outcome.response.content, "real");
        assert!(matches!(
            outcome.attempts[0].error,
            ProviderError::EmptyResponse
        ));
    }

    #[tokio::test]
    async fn credits_exhausted_aborts_without_trying_siblings() {
        let first = ScriptedProvider::new(
            "first",
            vec![Err(ProviderError::CreditsExhausted("balance too low".into()))],
        );
        let second = ScriptedProvider::new("second", vec![Ok(response("second", "unused"))]);
        let router = router_over(vec![first, second.clone()]);

        let err = router.route(&request(), Tier::Simple, None).await.unwrap_err();
        match err {
            EngineError::ChainAborted {
                provider_id, error, ..
            } => {
                assert_eq!(provider_id, "first");
                assert!(matches!(error, ProviderError::CreditsExhausted(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn auth_failure_aborts_the_chain() {
        let first =
            ScriptedProvider::new("first", vec![Err(ProviderError::Auth("expired".into()))]);
        let second = ScriptedProvider::new("second", vec![Ok(response("second", "unused"))]);
        let router = router_over(vec![first, second.clone()]);

        let err = router.route(&request(), Tier::Simple, None).await.unwrap_err();
        assert!(matches!(err, EngineError::ChainAborted { .. }));
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_execution_does_not_fail_over() {
        let first = ScriptedProvider::new("first", vec![Err(ProviderError::Cancelled)]);
        let second = ScriptedProvider::new("second", vec![Ok(response("second", "unused"))]);
        let router = router_over(vec![first, second.clone()]);

        let err = router.route(&request(), Tier::Simple, None).await.unwrap_err();
        match err {
            EngineError::ChainAborted {
                provider_id, error, ..
            } => {
                assert_eq!(provider_id, "first");
                assert_eq!(error, ProviderError::Cancelled);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn all_failures_yield_chain_exhausted_in_order() {
        let first = ScriptedProvider::new("first", vec![Err(ProviderError::Network("down".into()))]);
        let second = ScriptedProvider::new("second", vec![Err(ProviderError::RateLimited(60))]);
        let router = router_over(vec![first, second]);

        let err = router.route(&request(), Tier::Simple, None).await.unwrap_err();
        match err {
            EngineError::ChainExhausted { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].provider_id, "first");
                assert_eq!(attempts[1].provider_id, "second");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn explicit_chain_is_used_verbatim() {
        let first = ScriptedProvider::new("first", vec![Ok(response("first", "unused"))]);
        let second = ScriptedProvider::new("second", vec![Ok(response("second", "picked"))]);
        let router = router_over(vec![first.clone(), second]);

        let chain = vec![
            ChainEntry::new("second", "model-x"),
            ChainEntry::provider_only("first"),
        ];
        let outcome = router
            .route(&request(), Tier::Simple, Some(chain))
            .await
            .unwrap();
        assert_eq!(outcome.response.content, "picked");
        assert_eq!(first.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_provider_in_explicit_chain_is_skipped() {
        let real = ScriptedProvider::new("real", vec![Ok(response("real", "here"))]);
        let router = router_over(vec![real]);

        let chain = vec![
            ChainEntry::provider_only("ghost"),
            ChainEntry::provider_only("real"),
        ];
        let outcome = router
            .route(&request(), Tier::Simple, Some(chain))
            .await
            .unwrap();
        assert_eq!(outcome.response.content, "here");
        assert_eq!(outcome.attempts.len(), 1);
        assert!(matches!(
            outcome.attempts[0].error,
            ProviderError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn tool_only_response_follows_policy() {
        let tool_response = |provider: &str| ChatResponse {
            tool_calls: vec![ToolCall {
                name: "search".into(),
                arguments: json!({"q": "x"}),
            }],
            ..response(provider, "")
        };

        let accepting = router_over(vec![ScriptedProvider::new(
            "a",
            vec![Ok(tool_response("a"))],
        )]);
        let outcome = accepting.route(&request(), Tier::Simple, None).await.unwrap();
        assert_eq!(outcome.response.tool_calls.len(), 1);

        let strict = router_with_config(
            vec![ScriptedProvider::new("a", vec![Ok(tool_response("a"))])],
            RouterConfig {
                accept_tool_only_responses: false,
                ..RouterConfig::default()
            },
        );
        let err = strict.route(&request(), Tier::Simple, None).await.unwrap_err();
        assert!(matches!(err, EngineError::ChainExhausted { .. }));
    }

    #[tokio::test]
    async fn empty_registry_has_no_candidates() {
        let router = router_over(vec![]);
        let err = router.route(&request(), Tier::Simple, None).await.unwrap_err();
        assert!(matches!(err, EngineError::NoCandidates));
    }
}
