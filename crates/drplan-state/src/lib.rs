//! drplan-state — redb-backed durable store.
//!
//! Holds protection group and recovery plan definitions plus the durable
//! execution records the orchestrator re-derives its work from on every
//! invocation. Supports on-disk and in-memory backends (the latter for
//! testing).

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
