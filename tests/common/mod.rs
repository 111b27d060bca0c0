//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use taskforge_engine::{Engine, RouterConfig};
use taskforge_process::ProcessRunner;
use taskforge_providers::{
    AuthStore, Capabilities, CapabilityRegistry, ChatRequest, ChatResponse, CostClass,
    ModelCatalog, Provider, ProviderDescriptor, ProviderError, ProviderKind, TaskType, TokenUsage,
};
use taskforge_storage::{MemoryStore, StateStore};

/// A provider that always produces the same outcome and counts its calls
pub struct StubProvider {
    descriptor: ProviderDescriptor,
    outcome: Result<String, ProviderError>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn ok(id: &str, content: &str) -> Arc<Self> {
        Self::with_outcome(id, Ok(content.to_string()))
    }

    pub fn failing(id: &str, error: ProviderError) -> Arc<Self> {
        Self::with_outcome(id, Err(error))
    }

    pub fn with_outcome(id: &str, outcome: Result<String, ProviderError>) -> Arc<Self> {
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
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(content) => Ok(ChatResponse {
                content: content.clone(),
                model: "stub-model".to_string(),
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

/// Assemble an engine over the given providers and an in-memory store
pub fn engine_over(providers: Vec<Arc<dyn Provider>>) -> Engine {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    engine_with_store(providers, store)
}

/// Assemble an engine over the given providers and store backend
pub fn engine_with_store(
    providers: Vec<Arc<dyn Provider>>,
    store: Arc<dyn StateStore>,
) -> Engine {
    let catalog = Arc::new(ModelCatalog::new(
        store.clone(),
        "http://unused.invalid/catalog.json".to_string(),
    ));
    let mut registry = CapabilityRegistry::new(catalog);
    for provider in providers {
        registry.register(provider).expect("register provider");
    }
    Engine::new(
        Arc::new(registry),
        store.clone(),
        Arc::new(ProcessRunner::new()),
        Arc::new(AuthStore::new(store)),
        RouterConfig::default(),
    )
}
