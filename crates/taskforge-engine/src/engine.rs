//! Execution engine - the composition root
//!
//! Ties the capability registry, failover router, execution tracker, process
//! runner, and auth store together behind one façade. Callers submit a task
//! and get back an execution id they can use to observe or cancel the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use taskforge_process::ProcessRunner;
use taskforge_providers::{
    AuthRecord, AuthStore, CapabilityRegistry, ChainEntry, ChatRequest, ImagePart, Message,
    ModelInfo, OutputFile, ProviderDescriptor, ProviderError, Tier, TokenUsage, ToolCall, ToolSpec,
};
use taskforge_storage::StateStore;

use crate::{
    error::EngineError,
    execution::{ExecutionRecord, ExecutionStatus, ExecutionTracker},
    router::{FailoverRouter, RouterConfig},
};

/// Options for one task submission
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Task difficulty tier, drives default-chain synthesis
    pub tier: Tier,
    /// Caller-supplied chain, used verbatim when present
    pub explicit_chain: Option<Vec<ChainEntry>>,
    /// Requesting user
    pub user_id: String,
    /// System prompt for the task
    pub system_prompt: Option<String>,
    /// Image attachments
    pub images: Vec<ImagePart>,
    /// Tools offered to the model
    pub tools: Vec<ToolSpec>,
    /// Per-request deadline
    pub timeout: Option<Duration>,
    /// Workspace override for CLI executions
    pub workspace: Option<PathBuf>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            tier: Tier::Moderate,
            explicit_chain: None,
            user_id: "default".to_string(),
            system_prompt: None,
            images: Vec::new(),
            tools: Vec::new(),
            timeout: None,
            workspace: None,
        }
    }
}

/// Result of a completed task
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Execution id, usable for lookup and (late) cancellation
    pub execution_id: String,
    /// Generated content
    pub content: String,
    /// Provider that served the request
    pub provider: String,
    /// Model that served the request
    pub model: String,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Token usage when the substrate reports it
    pub usage: TokenUsage,
    /// Native tool invocations emitted by the model
    pub tool_calls: Vec<ToolCall>,
    /// Artifacts produced in the workspace
    pub output_files: Vec<OutputFile>,
}

/// The task execution engine
pub struct Engine {
    registry: Arc<CapabilityRegistry>,
    router: FailoverRouter,
    tracker: Arc<ExecutionTracker>,
    runner: Arc<ProcessRunner>,
    auth: Arc<AuthStore>,
}

impl Engine {
    /// Assemble an engine from its parts
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        store: Arc<dyn StateStore>,
        runner: Arc<ProcessRunner>,
        auth: Arc<AuthStore>,
        router_config: RouterConfig,
    ) -> Self {
        let router = FailoverRouter::new(registry.clone(), router_config);
        Self {
            registry,
            router,
            tracker: Arc::new(ExecutionTracker::new(store)),
            runner,
            auth,
        }
    }

    /// Execute a task through the failover chain
    ///
    /// The execution is tracked durably from acceptance to its terminal
    /// state; the assigned id travels into provider adapters so a running
    /// subprocess can be cancelled by it.
    pub async fn execute(
        &self,
        task: impl Into<String>,
        options: ExecuteOptions,
    ) -> Result<ExecutionResult, EngineError> {
        let execution_id = Uuid::new_v4().to_string();
        self.tracker.create(&execution_id, &options.user_id)?;

        let request = ChatRequest {
            model: None,
            messages: vec![Message::user(task)],
            system_prompt: options.system_prompt.clone(),
            images: options.images.clone(),
            tools: options.tools.clone(),
            temperature: None,
            max_tokens: None,
            user_id: Some(options.user_id.clone()),
            timeout: options.timeout,
            workspace: options.workspace.clone(),
            execution_id: Some(execution_id.clone()),
        };

        self.tracker
            .update(&execution_id, |r| r.status = ExecutionStatus::Running)?;
        info!(execution_id = %execution_id, tier = ?options.tier, "Execution started");

        match self
            .router
            .route(&request, options.tier, options.explicit_chain.clone())
            .await
        {
            Ok(outcome) => {
                let response = outcome.response;
                let record = self.tracker.update(&execution_id, |r| {
                    r.status = ExecutionStatus::Completed;
                    r.provider = Some(response.provider.clone());
                    r.model = Some(response.model.clone());
                    r.output_files = response.output_files.clone();
                })?;
                info!(
                    execution_id = %execution_id,
                    provider = %response.provider,
                    duration_ms = record.duration_ms.unwrap_or(0),
                    "Execution completed"
                );
                Ok(ExecutionResult {
                    execution_id,
                    content: response.content,
                    provider: response.provider,
                    model: response.model,
                    duration_ms: record.duration_ms.unwrap_or(0),
                    usage: response.usage,
                    tool_calls: response.tool_calls,
                    output_files: response.output_files,
                })
            }
            Err(error) => {
                let status = terminal_status_for(&error);
                let message = error.to_string();
                let record = self.tracker.update(&execution_id, |r| {
                    r.status = status;
                    r.error = Some(message.clone());
                })?;
                warn!(
                    execution_id = %execution_id,
                    status = ?record.status,
                    error = %message,
                    "Execution failed"
                );
                Err(error)
            }
        }
    }

    /// Cancel an execution by id
    ///
    /// Signals any live subprocess and marks the record cancelled. Cancelling
    /// an already-terminal execution changes nothing and reports the stored
    /// record; cancelling twice is indistinguishable from cancelling once.
    pub fn cancel(&self, execution_id: &str) -> Result<ExecutionRecord, EngineError> {
        let record = self.tracker.get(execution_id)?;
        if record.status.is_terminal() {
            info!(execution_id = %execution_id, status = ?record.status, "Cancel after terminal state, no-op");
            return Ok(record);
        }

        let signalled = self.runner.cancel(execution_id);
        info!(execution_id = %execution_id, signalled = %signalled, "Execution cancelled");
        self.tracker.update(execution_id, |r| {
            r.status = ExecutionStatus::Cancelled;
        })
    }

    /// Look up an execution record
    pub fn execution(&self, execution_id: &str) -> Result<ExecutionRecord, EngineError> {
        self.tracker.get(execution_id)
    }

    /// All tracked executions, newest first
    pub fn list_executions(&self) -> Vec<ExecutionRecord> {
        self.tracker.list()
    }

    /// Descriptors of every registered provider
    pub fn list_providers(&self) -> Vec<ProviderDescriptor> {
        self.registry.list_providers()
    }

    /// Models known for one provider
    pub async fn list_models(&self, provider_id: &str) -> Result<Vec<ModelInfo>, EngineError> {
        Ok(self.registry.list_models(provider_id).await?)
    }

    /// Record a completed out-of-band login for a CLI provider
    pub fn authenticate(
        &self,
        provider_id: &str,
        capabilities: Vec<String>,
    ) -> Result<AuthRecord, EngineError> {
        Ok(self.auth.authenticate(provider_id, capabilities)?)
    }

    /// Revoke a CLI provider's stored authentication
    pub fn revoke_authentication(&self, provider_id: &str) -> Result<bool, EngineError> {
        Ok(self.auth.revoke(provider_id)?)
    }

    /// Re-verify a provider's authentication with a live availability probe
    pub async fn verify_authentication(
        &self,
        provider_id: &str,
    ) -> Result<AuthRecord, EngineError> {
        let provider = self.registry.get(provider_id)?;
        let record = self
            .auth
            .verify(provider_id, || async move {
                if provider.is_available().await {
                    Ok(())
                } else {
                    Err(ProviderError::Auth("availability probe failed".to_string()))
                }
            })
            .await?;
        Ok(record)
    }

    /// Re-verify every previously-authenticated provider (startup path)
    ///
    /// Restores the durable auth records and probes each one that claims to
    /// be authenticated, so stale credentials surface at startup instead of
    /// at first use. Records for providers that are no longer registered are
    /// left untouched. Returns the post-verification records.
    pub async fn verify_all_authentications(&self) -> Result<Vec<AuthRecord>, EngineError> {
        self.auth.load()?;
        let mut verified = Vec::new();
        for record in self.auth.records() {
            if !record.is_authenticated {
                continue;
            }
            match self.verify_authentication(&record.provider_id).await {
                Ok(updated) => verified.push(updated),
                Err(e) => {
                    warn!(
                        provider = %record.provider_id,
                        error = %e,
                        "Skipping auth re-verification for unregistered provider"
                    );
                }
            }
        }
        Ok(verified)
    }

    /// Stored authentication state for a provider
    pub fn auth_status(&self, provider_id: &str) -> AuthRecord {
        self.auth.status(provider_id)
    }
}

/// Map an aggregate routing failure onto a terminal execution status
fn terminal_status_for(error: &EngineError) -> ExecutionStatus {
    match error {
        EngineError::ChainAborted {
            error: ProviderError::Cancelled,
            ..
        } => ExecutionStatus::Cancelled,
        EngineError::ChainExhausted { attempts }
            if !attempts.is_empty()
                && attempts
                    .iter()
                    .all(|a| matches!(a.error, ProviderError::Timeout(_))) =>
        {
            ExecutionStatus::Timeout
        }
        _ => ExecutionStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use taskforge_providers::{
        Capabilities, ChatResponse, CostClass, ModelCatalog, Provider, ProviderKind, TaskType,
    };
    use taskforge_storage::MemoryStore;

    struct FixedProvider {
        descriptor: ProviderDescriptor,
        outcome: Result<String, ProviderError>,
    }

    impl FixedProvider {
        fn new(id: &str, outcome: Result<String, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                descriptor: ProviderDescriptor {
                    id: id.to_string(),
                    kind: ProviderKind::Api,
                    display_name: id.to_string(),
                    capabilities: Capabilities {
                        task_types: vec![TaskType::Chat],
                        max_context: 32_768,
                        supports_vision: false,
                        supports_tools: false,
                        supports_embedding: false,
                    },
                    cost_class: CostClass::Metered,
                },
                outcome,
            })
        }
    }

    #[async_trait]
    impl Provider for FixedProvider {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            match &self.outcome {
                Ok(content) => Ok(ChatResponse {
                    content: content.clone(),
                    model: "m".to_string(),
                    provider: self.descriptor.id.clone(),
                    usage: TokenUsage::default(),
                    tool_calls: vec![],
                    output_files: vec![],
                }),
                Err(e) => Err(e.clone()),
            }
        }

        async fn is_available(&self) -> bool {
            self.outcome.is_ok()
        }
    }

    fn engine_with(providers: Vec<Arc<FixedProvider>>) -> Engine {
        engine_with_store(providers, Arc::new(MemoryStore::new()))
    }

    fn engine_with_store(providers: Vec<Arc<FixedProvider>>, store: Arc<MemoryStore>) -> Engine {
        let catalog = Arc::new(ModelCatalog::new(
            store.clone(),
            "http://unused.invalid/catalog.json".to_string(),
        ));
        let mut registry = CapabilityRegistry::new(catalog);
        for provider in providers {
            registry.register(provider).unwrap();
        }
        Engine::new(
            Arc::new(registry),
            store.clone(),
            Arc::new(ProcessRunner::new()),
            Arc::new(AuthStore::new(store)),
            RouterConfig::default(),
        )
    }

    #[tokio::test]
    async fn execute_records_completion() {
        let engine = engine_with(vec![FixedProvider::new("a", Ok("done".into()))]);

        let result = engine
            .execute("do the thing", ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(result.content, "done");
        assert_eq!(result.provider, "a");

        let record = engine.execution(&result.execution_id).unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.provider.as_deref(), Some("a"));
        assert!(record.finished_at.is_some());
    }

    #[tokio::test]
    async fn failover_is_recorded_transparently() {
        let engine = engine_with(vec![
            FixedProvider::new("down", Err(ProviderError::Network("refused".into()))),
            FixedProvider::new("up", Ok("recovered".into())),
        ]);

        let result = engine
            .execute("task", ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(result.provider, "up");
        assert_eq!(result.content, "recovered");
    }

    #[tokio::test]
    async fn exhausted_chain_marks_failed() {
        let engine = engine_with(vec![FixedProvider::new(
            "down",
            Err(ProviderError::Network("refused".into())),
        )]);

        let err = engine
            .execute("task", ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ChainExhausted { .. }));

        let record = &engine.list_executions()[0];
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn all_timeouts_mark_timeout_status() {
        let engine = engine_with(vec![FixedProvider::new(
            "slow",
            Err(ProviderError::Timeout(30)),
        )]);

        engine
            .execute("task", ExecuteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(engine.list_executions()[0].status, ExecutionStatus::Timeout);
    }

    #[tokio::test]
    async fn cancelled_candidate_marks_record_cancelled() {
        let engine = engine_with(vec![FixedProvider::new("a", Err(ProviderError::Cancelled))]);

        let err = engine
            .execute("task", ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ChainAborted { .. }));
        assert_eq!(
            engine.list_executions()[0].status,
            ExecutionStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_respects_terminal_states() {
        let engine = engine_with(vec![FixedProvider::new("a", Ok("done".into()))]);
        let result = engine
            .execute("task", ExecuteOptions::default())
            .await
            .unwrap();

        // Cancel after completion: the record stays completed
        let record = engine.cancel(&result.execution_id).unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        let again = engine.cancel(&result.execution_id).unwrap();
        assert_eq!(again.status, ExecutionStatus::Completed);

        assert!(matches!(
            engine.cancel("missing"),
            Err(EngineError::ExecutionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn verify_authentication_uses_live_probe() {
        let engine = engine_with(vec![FixedProvider::new(
            "bad",
            Err(ProviderError::Auth("expired".into())),
        )]);
        engine.authenticate("bad", vec![]).unwrap();

        let record = engine.verify_authentication("bad").await.unwrap();
        assert!(!record.is_authenticated);
        assert!(record.last_error.is_some());

        assert!(matches!(
            futures_err(engine.verify_authentication("ghost")).await,
            EngineError::Provider(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn startup_sweep_flips_stale_auth_records() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());

        // Logins recorded in an earlier process lifetime
        let earlier = AuthStore::new(store.clone());
        earlier.authenticate("bad", vec![]).unwrap();
        earlier.authenticate("gone", vec![]).unwrap();

        let engine = engine_with_store(
            vec![FixedProvider::new(
                "bad",
                Err(ProviderError::Auth("expired".into())),
            )],
            store,
        );

        let verified = engine.verify_all_authentications().await.unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].provider_id, "bad");
        assert!(!verified[0].is_authenticated);
        assert!(!engine.auth_status("bad").is_authenticated);

        // A record for an unregistered provider is skipped, not flipped
        assert!(engine.auth_status("gone").is_authenticated);
    }

    async fn futures_err<T: std::fmt::Debug>(
        fut: impl std::future::Future<Output = Result<T, EngineError>>,
    ) -> EngineError {
        fut.await.unwrap_err()
    }
}
