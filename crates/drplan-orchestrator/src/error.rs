use thiserror::Error;

use drplan_admission::{AdmissionError, Conflict};
use drplan_remote::RemoteError;
use drplan_state::StateError;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unknown recovery plan '{0}'")]
    UnknownPlan(String),

    #[error("unknown execution '{0}'")]
    UnknownExecution(String),

    #[error("execution '{0}' is already terminal")]
    AlreadyTerminal(String),

    #[error("execution '{0}' has no wave left to pause before")]
    NothingToPause(String),

    #[error("execution '{0}' is not waiting for resume")]
    NotWaiting(String),

    #[error("resume token does not match the gate for execution '{0}'")]
    TokenMismatch(String),

    #[error("{} server conflict(s) block this execution", .0.len())]
    ConflictsDetected(Vec<Conflict>),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("remote service error: {0}")]
    Remote(#[from] RemoteError),
}
