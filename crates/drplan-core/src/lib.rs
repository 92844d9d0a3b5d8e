//! drplan-core — domain types for disaster-recovery orchestration.
//!
//! Defines protection groups, recovery plans, waves, executions, and the
//! hard service quotas they are validated against. Higher-level crates
//! (admission, orchestrator, api) build on these types; this crate has no
//! I/O and no async.

pub mod error;
pub mod plan_graph;
pub mod quotas;
pub mod types;

pub use error::{validate_name, ValidationError, ValidationResult};
pub use types::*;
