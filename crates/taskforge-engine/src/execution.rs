//! Execution tracking - durable per-execution lifecycle records
//!
//! Every task run gets a record keyed by execution id. Status moves through a
//! one-way lifecycle: once a record is terminal it never changes again, so a
//! cancel that lands after completion is recorded as the no-op it was.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use taskforge_providers::OutputFile;
use taskforge_storage::{tables, StateStore};

use crate::error::EngineError;

/// Lifecycle state of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Accepted, not yet running
    Pending,
    /// A provider attempt is in flight
    Running,
    /// Finished with usable output
    Completed,
    /// Every candidate failed or a terminal error ended the chain
    Failed,
    /// The deadline elapsed
    Timeout,
    /// Cancelled by the caller
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status is final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }
}

/// Durable record of one execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Execution id
    pub id: String,
    /// Requesting user
    pub user_id: String,
    /// Current lifecycle state
    pub status: ExecutionStatus,
    /// Provider that served (or last attempted) the request
    pub provider: Option<String>,
    /// Model that served the request
    pub model: Option<String>,
    /// When the execution was accepted
    pub started_at: DateTime<Utc>,
    /// When a terminal state was reached
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds, set at terminal transition
    pub duration_ms: Option<u64>,
    /// Failure detail for non-completed terminal states
    pub error: Option<String>,
    /// Artifacts the execution produced
    #[serde(default)]
    pub output_files: Vec<OutputFile>,
}

/// Tracks executions in memory and mirrors every change durably
pub struct ExecutionTracker {
    store: Arc<dyn StateStore>,
    records: RwLock<HashMap<String, ExecutionRecord>>,
}

impl ExecutionTracker {
    /// Create a tracker over the given backend
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new pending record
    pub fn create(&self, id: &str, user_id: &str) -> Result<ExecutionRecord, EngineError> {
        let record = ExecutionRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            status: ExecutionStatus::Pending,
            provider: None,
            model: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            error: None,
            output_files: Vec::new(),
        };
        self.persist(&record)?;
        self.records.write().insert(id.to_string(), record.clone());
        debug!(execution_id = %id, user_id = %user_id, "Execution created");
        Ok(record)
    }

    /// Look up a record by id (memory first, then the durable table)
    pub fn get(&self, id: &str) -> Result<ExecutionRecord, EngineError> {
        if let Some(record) = self.records.read().get(id).cloned() {
            return Ok(record);
        }
        match self.store.get(tables::EXECUTIONS, id)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Err(EngineError::ExecutionNotFound(id.to_string())),
        }
    }

    /// Apply a mutation to a record and persist the result
    ///
    /// Terminal records are immutable: the mutation is skipped and the stored
    /// record returned unchanged. A terminal transition stamps `finished_at`
    /// and the duration exactly once.
    pub fn update<F>(&self, id: &str, mutate: F) -> Result<ExecutionRecord, EngineError>
    where
        F: FnOnce(&mut ExecutionRecord),
    {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| EngineError::ExecutionNotFound(id.to_string()))?;

        if record.status.is_terminal() {
            warn!(
                execution_id = %id,
                status = ?record.status,
                "Ignoring update to terminal execution"
            );
            return Ok(record.clone());
        }

        mutate(record);

        if record.status.is_terminal() && record.finished_at.is_none() {
            let now = Utc::now();
            record.finished_at = Some(now);
            record.duration_ms = Some(
                (now - record.started_at).num_milliseconds().max(0) as u64,
            );
        }

        let snapshot = record.clone();
        drop(records);
        self.persist(&snapshot)?;
        Ok(snapshot)
    }

    /// All records currently in memory, newest first
    pub fn list(&self) -> Vec<ExecutionRecord> {
        let mut records: Vec<ExecutionRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }

    fn persist(&self, record: &ExecutionRecord) -> Result<(), EngineError> {
        self.store
            .put(tables::EXECUTIONS, &record.id, &serde_json::to_value(record)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_storage::MemoryStore;

    fn tracker() -> (Arc<MemoryStore>, ExecutionTracker) {
        let backend = Arc::new(MemoryStore::new());
        (backend.clone(), ExecutionTracker::new(backend))
    }

    #[test]
    fn create_persists_pending_record() {
        let (backend, tracker) = tracker();
        tracker.create("x-1", "user-1").unwrap();

        let stored = backend.get(tables::EXECUTIONS, "x-1").unwrap().unwrap();
        let record: ExecutionRecord = serde_json::from_value(stored).unwrap();
        assert_eq!(record.status, ExecutionStatus::Pending);
        assert_eq!(record.user_id, "user-1");
    }

    #[test]
    fn terminal_transition_stamps_duration_once() {
        let (_, tracker) = tracker();
        tracker.create("x-1", "user-1").unwrap();

        let done = tracker
            .update("x-1", |r| {
                r.status = ExecutionStatus::Completed;
                r.provider = Some("a".into());
            })
            .unwrap();
        assert!(done.finished_at.is_some());
        assert!(done.duration_ms.is_some());
    }

    #[test]
    fn terminal_record_rejects_regression() {
        let (_, tracker) = tracker();
        tracker.create("x-1", "user-1").unwrap();
        tracker
            .update("x-1", |r| r.status = ExecutionStatus::Cancelled)
            .unwrap();

        // A late completion must not overwrite the cancelled state
        let record = tracker
            .update("x-1", |r| r.status = ExecutionStatus::Completed)
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Cancelled);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let (_, tracker) = tracker();
        assert!(matches!(
            tracker.get("missing"),
            Err(EngineError::ExecutionNotFound(_))
        ));
    }

    #[test]
    fn list_is_newest_first() {
        let (_, tracker) = tracker();
        tracker.create("x-1", "u").unwrap();
        tracker.create("x-2", "u").unwrap();

        let listed = tracker.list();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].started_at >= listed[1].started_at);
    }
}
