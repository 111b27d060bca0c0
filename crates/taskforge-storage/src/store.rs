//! The `StateStore` trait - the engine's entire view of durable storage

use serde_json::Value;

use crate::error::Result;

/// Logical table names used by the engine
pub mod tables {
    /// CLI provider authentication records
    pub const CLI_AUTH_STATE: &str = "cli_auth_state";
    /// Append-only execution audit rows
    pub const EXECUTIONS: &str = "executions";
    /// Mirrored remote model catalog
    pub const MODEL_CATALOG: &str = "model_catalog";
    /// Probed capabilities of locally served models
    pub const LOCAL_MODEL_CAPS: &str = "local_model_caps";
}

/// Key-value state store over logical tables
///
/// Values are JSON documents; the engine never issues raw SQL or manages
/// schema. Implementations must be safe to share across tasks.
pub trait StateStore: Send + Sync {
    /// Fetch a record, `None` if absent
    fn get(&self, table: &str, key: &str) -> Result<Option<Value>>;

    /// Insert or replace a record
    fn put(&self, table: &str, key: &str, value: &Value) -> Result<()>;

    /// Remove a record, returning whether it existed
    fn delete(&self, table: &str, key: &str) -> Result<bool>;

    /// List all records in a table as (key, value) pairs
    fn list(&self, table: &str) -> Result<Vec<(String, Value)>>;
}
