//! Auth state store - durable authentication records for CLI providers
//!
//! CLI tools are authenticated out-of-band (interactive login), so the engine
//! keeps a durable record per provider and re-verifies it at startup with a
//! real probe request. A failed probe flips the record to unauthenticated
//! with the reason recorded; silent staleness is never allowed. The durable
//! record is the source of truth; memory is a cache rebuilt from it.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use taskforge_storage::{tables, StateStore};

use crate::error::ProviderError;

/// Durable authentication state for one CLI provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRecord {
    /// Provider this record belongs to
    pub provider_id: String,
    /// Whether the provider is currently authenticated
    pub is_authenticated: bool,
    /// When the out-of-band login completed
    pub authenticated_at: Option<DateTime<Utc>>,
    /// When the last successful probe ran
    pub verified_at: Option<DateTime<Utc>>,
    /// Capabilities detected at login (models, feature flags)
    pub capabilities: Vec<String>,
    /// Why the last verification failed, if it did
    pub last_error: Option<String>,
}

impl AuthRecord {
    fn unauthenticated(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            is_authenticated: false,
            authenticated_at: None,
            verified_at: None,
            capabilities: Vec::new(),
            last_error: None,
        }
    }
}

/// Alternate authentication evidence accepted without a durable record
///
/// The durable record can lag behind an out-of-band login, so an
/// environment-supplied credential or the CLI tool's own on-disk credential
/// files also count as authenticated.
#[derive(Debug, Clone, Default)]
pub struct AuthEvidence {
    /// Environment variable carrying a credential
    pub env_var: Option<String>,
    /// Credential/config files written by the tool's login flow
    pub credential_paths: Vec<PathBuf>,
}

/// In-memory cache over the durable `cli_auth_state` table
pub struct AuthStore {
    store: Arc<dyn StateStore>,
    records: RwLock<HashMap<String, AuthRecord>>,
}

impl AuthStore {
    /// Create a store over the given backend
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Load all durable records into memory (startup path)
    pub fn load(&self) -> Result<usize, ProviderError> {
        let rows = self.store.list(tables::CLI_AUTH_STATE)?;
        let mut records = self.records.write();
        records.clear();
        for (key, value) in rows {
            match serde_json::from_value::<AuthRecord>(value) {
                Ok(record) => {
                    records.insert(key, record);
                }
                Err(e) => warn!(provider = %key, error = %e, "Skipping unreadable auth record"),
            }
        }
        info!(records = records.len(), "Loaded CLI auth state");
        Ok(records.len())
    }

    /// Record a completed out-of-band login with its detected capabilities
    pub fn authenticate(
        &self,
        provider_id: &str,
        capabilities: Vec<String>,
    ) -> Result<AuthRecord, ProviderError> {
        let now = Utc::now();
        let record = AuthRecord {
            provider_id: provider_id.to_string(),
            is_authenticated: true,
            authenticated_at: Some(now),
            verified_at: Some(now),
            capabilities,
            last_error: None,
        };
        self.persist(&record)?;
        self.records
            .write()
            .insert(provider_id.to_string(), record.clone());
        info!(provider = %provider_id, "Provider authenticated");
        Ok(record)
    }

    /// Clear both the in-memory and durable record
    pub fn revoke(&self, provider_id: &str) -> Result<bool, ProviderError> {
        self.records.write().remove(provider_id);
        let existed = self.store.delete(tables::CLI_AUTH_STATE, provider_id)?;
        info!(provider = %provider_id, existed = %existed, "Provider auth revoked");
        Ok(existed)
    }

    /// Re-verify a provider by running a minimal real probe request
    ///
    /// A failed probe marks the record unauthenticated with the failure
    /// reason. Returns the post-verification record.
    pub async fn verify<F, Fut>(
        &self,
        provider_id: &str,
        probe: F,
    ) -> Result<AuthRecord, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ProviderError>>,
    {
        let outcome = probe().await;

        let mut record = self
            .records
            .read()
            .get(provider_id)
            .cloned()
            .unwrap_or_else(|| AuthRecord::unauthenticated(provider_id));

        match outcome {
            Ok(()) => {
                record.is_authenticated = true;
                record.verified_at = Some(Utc::now());
                record.last_error = None;
                info!(provider = %provider_id, "Auth verification succeeded");
            }
            Err(e) => {
                record.is_authenticated = false;
                record.last_error = Some(e.to_string());
                warn!(provider = %provider_id, error = %e, "Auth verification failed");
            }
        }

        self.persist(&record)?;
        self.records
            .write()
            .insert(provider_id.to_string(), record.clone());
        Ok(record)
    }

    /// Whether the provider should be treated as authenticated
    ///
    /// True when the durable record says so, or when alternate evidence (env
    /// credential, on-disk credential files) is present.
    pub fn is_authenticated(&self, provider_id: &str, evidence: &AuthEvidence) -> bool {
        if self
            .records
            .read()
            .get(provider_id)
            .map(|r| r.is_authenticated)
            .unwrap_or(false)
        {
            return true;
        }

        if let Some(env_var) = &evidence.env_var {
            if std::env::var(env_var).map(|v| !v.is_empty()).unwrap_or(false) {
                return true;
            }
        }

        evidence.credential_paths.iter().any(|p| p.exists())
    }

    /// Snapshot of every known record
    pub fn records(&self) -> Vec<AuthRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Current record for a provider (default unauthenticated when absent)
    pub fn status(&self, provider_id: &str) -> AuthRecord {
        self.records
            .read()
            .get(provider_id)
            .cloned()
            .unwrap_or_else(|| AuthRecord::unauthenticated(provider_id))
    }

    fn persist(&self, record: &AuthRecord) -> Result<(), ProviderError> {
        self.store.put(
            tables::CLI_AUTH_STATE,
            &record.provider_id,
            &serde_json::to_value(record)?,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_storage::MemoryStore;

    fn store() -> (Arc<MemoryStore>, AuthStore) {
        let backend = Arc::new(MemoryStore::new());
        let auth = AuthStore::new(backend.clone());
        (backend, auth)
    }

    #[test]
    fn authenticate_persists_durably() {
        let (backend, auth) = store();
        auth.authenticate("claude", vec!["chat".into()]).unwrap();

        // A fresh store over the same backend sees the record
        let reloaded = AuthStore::new(backend);
        reloaded.load().unwrap();
        assert!(reloaded.status("claude").is_authenticated);
        assert_eq!(reloaded.status("claude").capabilities, vec!["chat"]);
    }

    #[tokio::test]
    async fn failed_probe_flips_record_with_reason() {
        let (_, auth) = store();
        auth.authenticate("claude", vec![]).unwrap();

        let record = auth
            .verify("claude", || async {
                Err(ProviderError::Auth("token expired".into()))
            })
            .await
            .unwrap();

        assert!(!record.is_authenticated);
        assert!(record.last_error.as_deref().unwrap().contains("token expired"));

        let status = auth.status("claude");
        assert!(!status.is_authenticated);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn successful_probe_updates_verified_at() {
        let (_, auth) = store();
        auth.authenticate("claude", vec![]).unwrap();
        let before = auth.status("claude").verified_at.unwrap();

        let record = auth.verify("claude", || async { Ok(()) }).await.unwrap();
        assert!(record.is_authenticated);
        assert!(record.verified_at.unwrap() >= before);
        assert!(record.last_error.is_none());
    }

    #[test]
    fn revoke_clears_memory_and_durable_state() {
        let (backend, auth) = store();
        auth.authenticate("claude", vec![]).unwrap();

        assert!(auth.revoke("claude").unwrap());
        assert!(!auth.status("claude").is_authenticated);
        assert!(backend
            .get(tables::CLI_AUTH_STATE, "claude")
            .unwrap()
            .is_none());

        // Revoking again is a no-op
        assert!(!auth.revoke("claude").unwrap());
    }

    #[test]
    fn credential_file_counts_as_evidence() {
        let (_, auth) = store();
        let dir = tempfile::tempdir().unwrap();
        let cred = dir.path().join("credentials.json");

        let evidence = AuthEvidence {
            env_var: None,
            credential_paths: vec![cred.clone()],
        };
        assert!(!auth.is_authenticated("claude", &evidence));

        std::fs::write(&cred, b"{}").unwrap();
        assert!(auth.is_authenticated("claude", &evidence));
    }
}
