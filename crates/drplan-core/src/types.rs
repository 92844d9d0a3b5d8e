//! Domain types for protection groups, recovery plans, and executions.
//!
//! All types serialize to the JSON shapes consumed by the dashboard and
//! API callers, so field names (camelCase) and status vocabularies
//! (SCREAMING_SNAKE_CASE) are part of the external contract.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Unique identifier for a protection group.
pub type GroupId = String;

/// Unique identifier for a recovery plan.
pub type PlanId = String;

/// Wave identifier, unique within one plan.
pub type WaveId = String;

/// Source server identifier as known to the remote recovery service.
pub type ServerId = String;

/// Remote recovery job identifier.
pub type JobId = String;

// ── Protection groups ──────────────────────────────────────────────

/// A named, region-scoped set of source servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionGroup {
    pub id: GroupId,
    /// Unique (case-insensitive), 1-64 characters.
    pub name: String,
    pub region: String,
    pub selection: ServerSelection,
    /// Unix timestamp (seconds) when this group was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) when this group was last updated.
    pub updated_at: u64,
}

/// How a protection group selects its member servers.
///
/// Tag queries are resolved against the remote service at validation and
/// use time; membership can change between plan creation and execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerSelection {
    /// A fixed list of server ids.
    #[serde(rename_all = "camelCase")]
    Explicit { server_ids: Vec<ServerId> },
    /// A tag query resolved dynamically against the remote inventory.
    TagQuery { tags: BTreeMap<String, String> },
}

impl ServerSelection {
    /// The fixed server list, if this selection is explicit.
    pub fn as_explicit(&self) -> Option<&[ServerId]> {
        match self {
            Self::Explicit { server_ids } => Some(server_ids),
            Self::TagQuery { .. } => None,
        }
    }
}

// ── Recovery plans ─────────────────────────────────────────────────

/// An ordered, dependency-graphed set of waves referencing protection groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPlan {
    pub id: PlanId,
    /// Unique (case-insensitive), 1-64 characters.
    pub name: String,
    pub waves: Vec<Wave>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// One unit of a plan, corresponding to exactly one remote recovery job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wave {
    /// Unique within the plan.
    pub id: WaveId,
    pub name: String,
    /// Protection groups whose resolved servers make up this wave's job.
    pub protection_group_ids: Vec<GroupId>,
    /// Waves that must reach LAUNCHED before this wave may start.
    #[serde(default)]
    pub depends_on: BTreeSet<WaveId>,
    /// Park the execution and wait for an external resume signal before
    /// starting this wave.
    #[serde(default)]
    pub pause_before: bool,
}

impl RecoveryPlan {
    /// Look up a wave by id.
    pub fn wave(&self, wave_id: &str) -> Option<&Wave> {
        self.waves.iter().find(|w| w.id == wave_id)
    }
}

// ── Execution options ──────────────────────────────────────────────

/// Launch mode passed through to the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaunchMode {
    /// Non-destructive drill launch.
    Drill,
    /// Actual recovery launch.
    Recovery,
}

/// Per-execution options supplied at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOptions {
    pub mode: LaunchMode,
    /// When true, a wave with any failed server is marked FAILED instead of
    /// propagating partial success per-server.
    #[serde(default)]
    pub require_full_wave: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            mode: LaunchMode::Drill,
            require_full_wave: false,
        }
    }
}

// ── Execution records ──────────────────────────────────────────────

/// Top-level execution status, derived from wave statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Started,
    InProgress,
    Completed,
    Partial,
    Failed,
    Timeout,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status is terminal (the execution will never advance).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Partial | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }
}

/// Per-wave execution sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaveStatus {
    /// Not started; may be blocked on dependencies.
    Pending,
    /// Conflict check passed; remote job submission in progress.
    Started,
    /// Remote job accepted; polling for completion.
    Polling,
    /// Parked ahead of this wave, holding a resume token.
    WaitingForResume,
    /// Every tracked server reached a terminal launch outcome and the wave
    /// counts as a success (possibly with per-server failures recorded).
    Launched,
    Failed,
    /// Exceeded the polling bound and the remote service was unreachable
    /// for a ground-truth requery.
    TimedOut,
    Cancelled,
}

impl WaveStatus {
    /// Whether this wave will never advance again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Launched | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// Terminal success — the state dependencies wait for.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Launched)
    }
}

/// Launch status of a single server within a wave's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerLaunchStatus {
    Pending,
    Launching,
    Launched,
    Failed,
}

impl ServerLaunchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Launched | Self::Failed)
    }
}

/// Per-server record within a wave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub status: ServerLaunchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_instance_id: Option<String>,
    /// Unix timestamp (seconds) when the recovery instance launched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_time: Option<u64>,
}

impl ServerRecord {
    pub fn pending() -> Self {
        Self {
            status: ServerLaunchStatus::Pending,
            recovery_instance_id: None,
            launch_time: None,
        }
    }
}

/// Durable per-wave record inside an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveRecord {
    pub wave_id: WaveId,
    pub status: WaveStatus,
    /// Assigned once the remote service accepts the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub server_statuses: BTreeMap<ServerId, ServerRecord>,
    /// Unix timestamp (seconds) when the wave was claimed for submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    /// Unix timestamp (seconds) when the remote job was submitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<u64>,
    /// Unix timestamp (seconds) of the last poll.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_polled_at: Option<u64>,
    /// Human-readable failure or progress detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl WaveRecord {
    /// Fresh PENDING record for a plan wave.
    pub fn pending(wave_id: &str) -> Self {
        Self {
            wave_id: wave_id.to_string(),
            status: WaveStatus::Pending,
            job_id: None,
            server_statuses: BTreeMap::new(),
            started_at: None,
            submitted_at: None,
            last_polled_at: None,
            detail: None,
        }
    }

    pub fn launched_servers(&self) -> usize {
        self.server_statuses
            .values()
            .filter(|s| s.status == ServerLaunchStatus::Launched)
            .count()
    }

    pub fn failed_servers(&self) -> usize {
        self.server_statuses
            .values()
            .filter(|s| s.status == ServerLaunchStatus::Failed)
            .count()
    }
}

/// Durable pause gate: the execution is parked ahead of `wave_id` until an
/// external resume signal bearing `token` arrives. Persisted so a process
/// restart resumes correctly from storage alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeGate {
    pub wave_id: WaveId,
    pub token: String,
    pub paused_at: u64,
}

/// A single run of a recovery plan.
///
/// Owned and mutated exclusively by the orchestrator; read by external
/// observers. Never deleted, only superseded by new executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: String,
    pub plan_id: PlanId,
    pub status: ExecutionStatus,
    pub options: ExecutionOptions,
    pub waves: Vec<WaveRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting: Option<ResumeGate>,
    #[serde(default)]
    pub cancel_requested: bool,
    /// Bumped on every store update; the optimistic-concurrency guard.
    pub version: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Execution {
    /// Create a fresh execution for a plan, one PENDING record per wave.
    pub fn new(id: &str, plan: &RecoveryPlan, options: ExecutionOptions, now: u64) -> Self {
        Self {
            id: id.to_string(),
            plan_id: plan.id.clone(),
            status: ExecutionStatus::Pending,
            options,
            waves: plan.waves.iter().map(|w| WaveRecord::pending(&w.id)).collect(),
            waiting: None,
            cancel_requested: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn wave(&self, wave_id: &str) -> Option<&WaveRecord> {
        self.waves.iter().find(|w| w.wave_id == wave_id)
    }

    pub fn wave_mut(&mut self, wave_id: &str) -> Option<&mut WaveRecord> {
        self.waves.iter_mut().find(|w| w.wave_id == wave_id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Derive the top-level status from the wave records.
    ///
    /// While waves remain in flight: STARTED when waves are claimed or
    /// parked but none has reached polling yet, IN_PROGRESS once any wave
    /// polls or settles. Worst-status rules for the terminal mix: any
    /// cancelled wave marks the run CANCELLED; at least one launched wave
    /// is PARTIAL (as is full launch with per-server failures); nothing
    /// launched is TIMEOUT if any wave timed out, otherwise FAILED.
    pub fn derive_status(&self) -> ExecutionStatus {
        if self.waves.iter().any(|w| w.status == WaveStatus::Cancelled) {
            return ExecutionStatus::Cancelled;
        }
        if !self.waves.iter().all(|w| w.status.is_terminal()) {
            let any_in_flight = self
                .waves
                .iter()
                .any(|w| w.status == WaveStatus::Polling || w.status.is_terminal());
            if any_in_flight {
                return ExecutionStatus::InProgress;
            }
            let any_claimed = self.waves.iter().any(|w| {
                matches!(w.status, WaveStatus::Started | WaveStatus::WaitingForResume)
            });
            return if any_claimed {
                ExecutionStatus::Started
            } else {
                ExecutionStatus::Pending
            };
        }
        let launched = self.waves.iter().filter(|w| w.status.is_success()).count();
        let failed_servers: usize = self.waves.iter().map(|w| w.failed_servers()).sum();
        if launched == self.waves.len() {
            if failed_servers == 0 {
                ExecutionStatus::Completed
            } else {
                ExecutionStatus::Partial
            }
        } else if launched > 0 {
            ExecutionStatus::Partial
        } else if self.waves.iter().any(|w| w.status == WaveStatus::TimedOut) {
            ExecutionStatus::Timeout
        } else {
            ExecutionStatus::Failed
        }
    }
}
