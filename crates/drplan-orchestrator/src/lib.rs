//! drplan-orchestrator — dependency-ordered wave execution.
//!
//! The orchestrator is a stateless reactor: every [`Orchestrator::tick`]
//! re-derives its work from the durable execution record, so a crashed or
//! restarted process continues exactly where the store says it was. The
//! only suspension point is an explicit resume gate; everything else is
//! driven by the periodic tick.

pub mod engine;
pub mod error;

pub use engine::{Orchestrator, OrchestratorConfig, TickReport};
pub use error::{OrchestratorError, OrchestratorResult};
