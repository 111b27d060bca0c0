//! Concrete provider adapters
//!
//! Three implementations of the `Provider` contract, one per execution
//! substrate: a hosted multi-model HTTP API, a locally reachable inference
//! server, and an interactively-authenticated CLI tool run as a subprocess.

pub mod cli;
pub mod hosted;
pub mod local;

pub use cli::{CliProvider, CliToolSpec};
pub use hosted::{HostedConfig, HostedProvider};
pub use local::{LocalConfig, LocalProvider};
