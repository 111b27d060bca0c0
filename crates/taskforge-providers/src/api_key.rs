//! API key resolution for hosted providers
//!
//! Keys are resolved through a layered lookup: an explicit per-call override
//! wins, then a per-tenant configured credential, then the provider's
//! environment variable. Error messages never include key material.

use std::collections::HashMap;

use crate::error::ProviderError;

/// Layered API key lookup
#[derive(Default)]
pub struct ApiKeyManager {
    /// Per-tenant configured credentials: (tenant_id, provider_id) -> key
    tenant_keys: HashMap<(String, String), String>,
    /// Environment variable name per provider
    env_vars: HashMap<String, String>,
}

impl ApiKeyManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the environment variable consulted for a provider
    pub fn register_env_var(&mut self, provider_id: impl Into<String>, env_var: impl Into<String>) {
        self.env_vars.insert(provider_id.into(), env_var.into());
    }

    /// Store a tenant-scoped credential
    pub fn store_tenant_key(
        &mut self,
        tenant_id: impl Into<String>,
        provider_id: impl Into<String>,
        key: impl Into<String>,
    ) {
        self.tenant_keys
            .insert((tenant_id.into(), provider_id.into()), key.into());
    }

    /// Remove a tenant-scoped credential
    pub fn clear_tenant_key(&mut self, tenant_id: &str, provider_id: &str) {
        self.tenant_keys
            .remove(&(tenant_id.to_string(), provider_id.to_string()));
    }

    /// Resolve a key: explicit override, then tenant credential, then env
    pub fn resolve(
        &self,
        provider_id: &str,
        tenant_id: Option<&str>,
        explicit: Option<&str>,
    ) -> Result<String, ProviderError> {
        if let Some(key) = explicit {
            if !key.is_empty() {
                return Ok(key.to_string());
            }
        }

        if let Some(tenant) = tenant_id {
            if let Some(key) = self
                .tenant_keys
                .get(&(tenant.to_string(), provider_id.to_string()))
            {
                return Ok(key.clone());
            }
        }

        if let Some(env_var) = self.env_vars.get(provider_id) {
            if let Ok(key) = std::env::var(env_var) {
                if !key.is_empty() {
                    return Ok(key);
                }
            }
        }

        Err(ProviderError::Config(format!(
            "No API key configured for provider '{provider_id}'"
        )))
    }

    /// Whether any layer can produce a key for this provider
    pub fn has_key(&self, provider_id: &str, tenant_id: Option<&str>) -> bool {
        self.resolve(provider_id, tenant_id, None).is_ok()
    }
}
