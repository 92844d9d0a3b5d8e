//! Admission error and warning vocabulary.
//!
//! The serialized forms (`QUOTA_EXCEEDED`, `CONCURRENT_JOBS_AT_LIMIT`,
//! `SERVER_CONFLICTS_DETECTED`, `conflictSource` values) are part of the
//! external API contract.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use drplan_core::{ServerId, ValidationError, WaveId};
use drplan_remote::RemoteError;
use drplan_state::StateError;

/// Result type alias for admission checks.
pub type AdmissionResult<T> = Result<T, AdmissionError>;

/// Which hard quota a configuration exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaType {
    /// Resolved servers in one wave/job (limit 100).
    ServersPerJob,
    /// Resolved servers across all waves of a plan (limit 500).
    TotalServersInJobs,
}

/// Per-wave server count attached to plan-level quota errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveBreakdown {
    pub wave_id: WaveId,
    pub server_count: usize,
}

/// Hard admission failures. Every rejection carries the violating quantity,
/// the limit, and an actionable recommendation — never a bare boolean.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("{quota_type:?} quota exceeded: {count} > {max}")]
    QuotaExceeded {
        quota_type: QuotaType,
        count: usize,
        max: usize,
        recommendation: String,
        /// Populated for plan-level violations.
        wave_breakdown: Vec<WaveBreakdown>,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown protection group '{0}'")]
    UnknownGroup(String),

    // Hard checks fail closed: a resolution failure is a rejection, not a
    // silent pass.
    #[error("remote service error during validation: {0}")]
    Remote(#[from] RemoteError),

    #[error("state error during validation: {0}")]
    State(#[from] StateError),
}

/// Non-blocking advisory codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    ConcurrentJobsAtLimit,
    ServerConflictsDetected,
}

/// Advisory attached to a creation response; never a rejection, because
/// the underlying condition can clear before the plan is executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
    pub can_execute_now: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<Conflict>,
}

/// Where a detected conflict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSource {
    /// Server committed to another active execution of this system.
    Execution,
    /// Server attached to a non-terminal job directly in the remote service.
    DrsJob,
    /// Hard quota arithmetic violated at start time.
    QuotaViolation,
}

/// One conflict blocking (or warning about) an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<ServerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wave_id: Option<WaveId>,
    #[serde(rename = "conflictSource")]
    pub source: ConflictSource,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_vocabulary() {
        assert_eq!(
            serde_json::to_value(QuotaType::ServersPerJob).unwrap(),
            "servers_per_job"
        );
        assert_eq!(
            serde_json::to_value(QuotaType::TotalServersInJobs).unwrap(),
            "total_servers_in_jobs"
        );
        assert_eq!(
            serde_json::to_value(WarningCode::ConcurrentJobsAtLimit).unwrap(),
            "CONCURRENT_JOBS_AT_LIMIT"
        );
        assert_eq!(
            serde_json::to_value(ConflictSource::DrsJob).unwrap(),
            "drs_job"
        );
    }

    #[test]
    fn conflict_serializes_source_field_name() {
        let conflict = Conflict {
            server_id: Some("s-1".into()),
            wave_id: None,
            source: ConflictSource::Execution,
            detail: "committed to execution e-1".into(),
        };
        let json = serde_json::to_value(&conflict).unwrap();
        assert_eq!(json["conflictSource"], "execution");
        assert_eq!(json["serverId"], "s-1");
        assert!(json.get("waveId").is_none());
    }
}
