//! # taskforge-process
//!
//! Subprocess lifecycle management for AI task executions.
//!
//! Provides process spawning with discrete arguments (no shell), bounded
//! execution with SIGTERM→SIGKILL escalation, full stdout/stderr capture, and
//! a registry of running executions so callers can cancel a run by execution
//! id while it is in flight.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use taskforge_process::{ProcessRunner, ProcessConfig};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runner = ProcessRunner::new();
//!
//! let config = ProcessConfig::new("some-ai-tool")
//!     .args(["--print", "summarize this file"])
//!     .timeout(Duration::from_secs(600));
//!
//! let output = runner.run("exec-1", config).await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod runner;

pub use config::ProcessConfig;
pub use error::{ProcessError, Result};
pub use runner::{ProcessRunner, RunOutput};
