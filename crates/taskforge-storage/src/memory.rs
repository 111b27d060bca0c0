//! In-memory state store for tests and ephemeral deployments

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

use crate::{error::Result, store::StateStore};

/// `StateStore` backed by a process-local map
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, table: &str, key: &str) -> Result<Option<Value>> {
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|t| t.get(key))
            .cloned())
    }

    fn put(&self, table: &str, key: &str, value: &Value) -> Result<()> {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn delete(&self, table: &str, key: &str) -> Result<bool> {
        Ok(self
            .tables
            .write()
            .get_mut(table)
            .map(|t| t.remove(key).is_some())
            .unwrap_or(false))
    }

    fn list(&self, table: &str) -> Result<Vec<(String, Value)>> {
        let tables = self.tables.read();
        let mut rows: Vec<(String, Value)> = tables
            .get(table)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrip_and_delete() {
        let store = MemoryStore::new();
        store.put("t", "a", &json!({"n": 1})).unwrap();

        assert_eq!(store.get("t", "a").unwrap(), Some(json!({"n": 1})));
        assert!(store.delete("t", "a").unwrap());
        assert!(!store.delete("t", "a").unwrap());
        assert_eq!(store.get("t", "a").unwrap(), None);
    }

    #[test]
    fn list_is_sorted_by_key() {
        let store = MemoryStore::new();
        store.put("t", "b", &json!(2)).unwrap();
        store.put("t", "a", &json!(1)).unwrap();

        let rows = store.list("t").unwrap();
        assert_eq!(rows[0].0, "a");
        assert_eq!(rows[1].0, "b");
    }
}
