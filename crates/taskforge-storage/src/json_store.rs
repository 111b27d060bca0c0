//! JSON-file backed state store
//!
//! One JSON document per record under `<root>/<table>/<key>.json`. Writes go
//! through a temp file and rename so a crash mid-write never leaves a
//! half-written record visible.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::{
    error::{Result, StorageError},
    store::StateStore,
};

/// `StateStore` persisting each record as a JSON file
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at the given directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Create a store under the platform data directory
    /// (`~/.local/share/taskforge/state` on Linux)
    pub fn default_location() -> Result<Self> {
        let data_dir = dirs::data_dir().ok_or(StorageError::NoDataDir)?;
        Self::new(data_dir.join("taskforge").join("state"))
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    fn record_path(&self, table: &str, key: &str) -> Result<PathBuf> {
        validate_key(table)?;
        validate_key(key)?;
        Ok(self.table_dir(table).join(format!("{key}.json")))
    }
}

/// Keys become file names; reject anything that could escape the table dir.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.contains(['/', '\\', '\0'])
        || key == "."
        || key == ".."
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl StateStore for JsonFileStore {
    fn get(&self, table: &str, key: &str) -> Result<Option<Value>> {
        let path = self.record_path(table, key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, table: &str, key: &str, value: &Value) -> Result<()> {
        let path = self.record_path(table, key)?;
        fs::create_dir_all(self.table_dir(table))?;
        write_atomic(&path, &serde_json::to_string_pretty(value)?)?;
        debug!(table = %table, key = %key, "Persisted record");
        Ok(())
    }

    fn delete(&self, table: &str, key: &str) -> Result<bool> {
        let path = self.record_path(table, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, table: &str) -> Result<Vec<(String, Value)>> {
        validate_key(table)?;
        let dir = self.table_dir(table);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let contents = fs::read_to_string(&path)?;
            rows.push((key.to_string(), serde_json::from_str(&contents)?));
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }
}
