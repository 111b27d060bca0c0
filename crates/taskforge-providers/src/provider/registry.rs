//! Capability registry - provider metadata and default-chain candidates

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::debug;

use super::Provider;
use crate::{
    catalog::ModelCatalog,
    error::ProviderError,
    models::{ChainEntry, ModelInfo, ProviderDescriptor, TaskType, Tier},
};

/// Providers with an established track record get a scoring boost when the
/// registry synthesizes a default chain.
const KNOWN_PROVIDERS: &[&str] = &["openrouter", "ollama", "claude", "codex", "gemini"];

/// Score boost for a known provider
const KNOWN_PROVIDER_BOOST: u64 = 1_000;

/// Score boost for free models on low tiers
const FREE_MODEL_BOOST: u64 = 500;

/// Registry of configured providers and their capabilities
///
/// Providers are kept in registration order; all iteration and scoring is
/// stable, so a fixed configuration always yields the same chain.
pub struct CapabilityRegistry {
    providers: Vec<Arc<dyn Provider>>,
    catalog: Arc<ModelCatalog>,
}

impl CapabilityRegistry {
    /// Create a registry backed by the given model catalog
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self {
            providers: Vec::new(),
            catalog,
        }
    }

    /// Register a provider; rejects duplicate ids
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<(), ProviderError> {
        let id = provider.descriptor().id.clone();
        if self.providers.iter().any(|p| p.descriptor().id == id) {
            return Err(ProviderError::Config(format!(
                "provider already registered: {id}"
            )));
        }
        debug!(provider = %id, "Registered provider");
        self.providers.push(provider);
        Ok(())
    }

    /// Get a provider by id
    pub fn get(&self, provider_id: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .iter()
            .find(|p| p.descriptor().id == provider_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(provider_id.to_string()))
    }

    /// Descriptors of all registered providers, in registration order
    pub fn list_providers(&self) -> Vec<ProviderDescriptor> {
        self.providers
            .iter()
            .map(|p| p.descriptor().clone())
            .collect()
    }

    /// Models known for one provider (catalog-backed)
    pub async fn list_models(&self, provider_id: &str) -> Result<Vec<ModelInfo>, ProviderError> {
        // Validate the provider exists before consulting the catalog
        self.get(provider_id)?;
        Ok(self.catalog.models_for(provider_id).await)
    }

    /// The shared model catalog
    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    /// Build a default failover chain for a task type and tier
    ///
    /// Filters providers by capability, scores each (provider, model)
    /// candidate, and returns the top `max` in descending score. Equal scores
    /// keep registry/catalog order, so the result is deterministic.
    pub async fn candidates_for(
        &self,
        task_type: TaskType,
        tier: Tier,
        max: usize,
    ) -> Vec<ChainEntry> {
        let mut scored: Vec<(u64, ChainEntry)> = Vec::new();

        for provider in &self.providers {
            let desc = provider.descriptor();
            if !desc.capabilities.supports(task_type) {
                continue;
            }

            let models = self.catalog.models_for(&desc.id).await;
            let eligible: Vec<&ModelInfo> = models
                .iter()
                .filter(|m| task_type != TaskType::Vision || m.supports_vision)
                .collect();

            if eligible.is_empty() {
                // No catalog entries: let the adapter auto-select.
                scored.push((
                    score(&desc.id, desc.capabilities.max_context, false, tier),
                    ChainEntry::provider_only(&desc.id),
                ));
                continue;
            }

            for model in eligible {
                scored.push((
                    score(&desc.id, model.context_length, model.is_free, tier),
                    ChainEntry::new(&desc.id, &model.id),
                ));
            }
        }

        // Stable sort: ties keep registration/catalog order.
        scored.sort_by_key(|(s, _)| Reverse(*s));
        scored.truncate(max);
        scored.into_iter().map(|(_, entry)| entry).collect()
    }
}

/// Scoring heuristic: larger context wins, known providers get a boost, and
/// free models are preferred on the low tiers where cost dominates quality.
fn score(provider_id: &str, context_length: usize, is_free: bool, tier: Tier) -> u64 {
    let mut score = (context_length / 1024) as u64;
    if KNOWN_PROVIDERS.contains(&provider_id) {
        score += KNOWN_PROVIDER_BOOST;
    }
    if is_free && tier <= Tier::Simple {
        score += FREE_MODEL_BOOST;
    }
    score
}
