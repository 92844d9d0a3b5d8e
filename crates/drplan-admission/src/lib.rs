//! drplan-admission — creation-time and start-time gates.
//!
//! Two components share this crate because they share resolution logic and
//! the conflict vocabulary:
//!
//! - [`QuotaValidator`]: the pre-creation gate. Hard quotas the remote
//!   service will unconditionally reject are blocked here; quotas that
//!   depend on other concurrent operations are advisory only, since that
//!   state can change between creation and execution.
//! - [`ConflictDetector`]: the pre-start gate, re-evaluated fresh on every
//!   execution-start attempt and again per wave, never trusted from an
//!   earlier check.

pub mod conflict;
pub mod error;
pub mod quota;
pub mod resolve;

pub use conflict::ConflictDetector;
pub use error::{
    AdmissionError, AdmissionResult, Conflict, ConflictSource, QuotaType, Warning, WarningCode,
    WaveBreakdown,
};
pub use quota::QuotaValidator;
