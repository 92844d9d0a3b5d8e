//! Error types for the drplan store.

use thiserror::Error;

/// Result type alias for store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("name '{0}' is already in use")]
    NameTaken(String),

    #[error("protection group '{group_id}' is referenced by plans: {plan_ids:?}")]
    GroupInUse {
        group_id: String,
        plan_ids: Vec<String>,
    },

    #[error("plan references unknown protection group '{0}'")]
    UnknownGroup(String),

    #[error("wave '{wave_id}' of execution '{execution_id}' is no longer {expected}: now {actual}")]
    StaleTransition {
        execution_id: String,
        wave_id: String,
        expected: String,
        actual: String,
    },
}
