//! # taskforge-storage
//!
//! Durable state for the task execution engine, consumed strictly as a
//! get/put/query boundary. The engine persists three kinds of records: CLI
//! authentication state, append-only execution audit rows, and the mirrored
//! model catalog. Schema management lives with the storage collaborator, not
//! here.

pub mod error;
pub mod json_store;
pub mod memory;
pub mod store;

pub use error::{Result, StorageError};
pub use json_store::JsonFileStore;
pub use memory::MemoryStore;
pub use store::{tables, StateStore};
