//! Task execution engine
//!
//! This crate provides:
//! - A failover router that walks candidate chains strictly sequentially
//! - Durable execution tracking with a one-way status lifecycle
//! - Idempotent cancellation wired through to live subprocesses
//! - An engine façade composing the registry, router, tracker, and auth store

pub mod engine;
pub mod error;
pub mod execution;
pub mod router;

pub use engine::{Engine, ExecuteOptions, ExecutionResult};
pub use error::{AttemptFailure, EngineError};
pub use execution::{ExecutionRecord, ExecutionStatus, ExecutionTracker};
pub use router::{FailoverRouter, RouteOutcome, RouterConfig};
