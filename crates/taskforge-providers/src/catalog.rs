//! Model catalog - remote model metadata with TTL caching and a durable
//! mirror
//!
//! The catalog is fetched from a remote endpoint on a TTL (default 1 hour),
//! held in memory behind a lock so refreshes replace it atomically, and
//! mirrored into the state store so model metadata is available immediately
//! after a restart even when the network is down. Built-in model lists
//! registered at construction act as the last-resort fallback.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use taskforge_storage::{tables, StateStore};

use crate::{error::ProviderError, models::ModelInfo};

/// Cache TTL for the fetched catalog
const CATALOG_TTL: Duration = Duration::from_secs(60 * 60);

/// Fetch timeout
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Backoff after a failed fetch; lookups inside this window serve the cache
/// instead of blocking on another doomed request
const FETCH_BACKOFF: Duration = Duration::from_secs(60);

/// Remote catalog response shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogResponse {
    /// All models across providers
    pub models: Vec<ModelInfo>,
}

struct CatalogCache {
    models: Vec<ModelInfo>,
    fetched_at: Option<Instant>,
    attempted_at: Option<Instant>,
}

impl CatalogCache {
    fn is_fresh(&self) -> bool {
        self.fetched_at
            .map(|at| at.elapsed() < CATALOG_TTL)
            .unwrap_or(false)
    }

    fn should_attempt(&self) -> bool {
        if self.is_fresh() {
            return false;
        }
        self.attempted_at
            .map(|at| at.elapsed() >= FETCH_BACKOFF)
            .unwrap_or(true)
    }
}

/// Periodically refreshed model metadata, shared across the engine
pub struct ModelCatalog {
    store: Arc<dyn StateStore>,
    url: String,
    client: reqwest::Client,
    cache: RwLock<CatalogCache>,
    builtin: RwLock<Vec<ModelInfo>>,
}

impl ModelCatalog {
    /// Create a catalog that fetches from `url` and mirrors into `store`
    pub fn new(store: Arc<dyn StateStore>, url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            store,
            url,
            client,
            cache: RwLock::new(CatalogCache {
                models: Vec::new(),
                fetched_at: None,
                attempted_at: None,
            }),
            builtin: RwLock::new(Vec::new()),
        }
    }

    /// Register built-in model metadata used when neither the remote catalog
    /// nor the mirror has entries for a provider.
    pub async fn install_builtin(&self, models: Vec<ModelInfo>) {
        self.builtin.write().await.extend(models);
    }

    /// Restore the mirrored catalog from the state store (startup path)
    pub async fn load_from_store(&self) -> Result<usize, ProviderError> {
        let rows = self.store.list(tables::MODEL_CATALOG)?;
        let mut models = Vec::new();
        for (key, value) in rows {
            match serde_json::from_value::<ModelInfo>(value) {
                Ok(model) => models.push(model),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable catalog row"),
            }
        }
        let count = models.len();
        if count > 0 {
            // Mirrored rows count as a (stale) cache fill, not a fresh fetch.
            let mut cache = self.cache.write().await;
            cache.models = models;
            cache.fetched_at = None;
        }
        info!(models = %count, "Restored model catalog from store");
        Ok(count)
    }

    /// Force a refresh from the remote catalog
    ///
    /// The attempt is recorded before the fetch so a failure backs off
    /// instead of being retried on the next lookup.
    pub async fn refresh(&self) -> Result<usize, ProviderError> {
        self.cache.write().await.attempted_at = Some(Instant::now());

        debug!(url = %self.url, "Fetching model catalog");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let parsed: CatalogResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Serialization(e.to_string()))?;

        for model in &parsed.models {
            let key = format!("{}__{}", model.provider, model.id);
            if let Err(e) = self
                .store
                .put(tables::MODEL_CATALOG, &key, &serde_json::to_value(model)?)
            {
                warn!(model = %model.id, error = %e, "Failed to mirror catalog row");
            }
        }

        let count = parsed.models.len();
        let mut cache = self.cache.write().await;
        cache.models = parsed.models;
        cache.fetched_at = Some(Instant::now());
        info!(models = %count, "Model catalog refreshed");
        Ok(count)
    }

    /// Models known for one provider
    ///
    /// Refreshes on TTL expiry; a failed refresh serves the stale cache (or
    /// the restored mirror) and backs off before refetching, and built-in
    /// lists fill in for providers the catalog does not cover. Never fails on
    /// a network blip.
    pub async fn models_for(&self, provider_id: &str) -> Vec<ModelInfo> {
        let needs_refresh = {
            let cache = self.cache.read().await;
            cache.should_attempt()
        };

        if needs_refresh {
            if let Err(e) = self.refresh().await {
                debug!(error = %e, "Catalog refresh failed, serving cached entries");
            }
        }

        let cached: Vec<ModelInfo> = {
            let cache = self.cache.read().await;
            cache
                .models
                .iter()
                .filter(|m| m.provider == provider_id)
                .cloned()
                .collect()
        };
        if !cached.is_empty() {
            return cached;
        }

        self.builtin
            .read()
            .await
            .iter()
            .filter(|m| m.provider == provider_id)
            .cloned()
            .collect()
    }

    /// All models currently known, cached plus built-in
    pub async fn all_models(&self) -> Vec<ModelInfo> {
        let mut models = self.cache.read().await.models.clone();
        for builtin in self.builtin.read().await.iter() {
            if !models
                .iter()
                .any(|m| m.id == builtin.id && m.provider == builtin.provider)
            {
                models.push(builtin.clone());
            }
        }
        models
    }
}
