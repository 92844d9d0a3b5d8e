//! The remote recovery-service interface.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use drplan_core::{JobId, LaunchMode, ServerId, ServerRecord};

use crate::error::RemoteResult;

/// Point-in-time status of a remote recovery job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: JobId,
    /// The job will never change again.
    pub terminal: bool,
    pub servers: BTreeMap<ServerId, ServerRecord>,
}

impl JobStatus {
    /// Whether every server reached a terminal launch outcome.
    pub fn all_servers_terminal(&self) -> bool {
        self.servers.values().all(|s| s.status.is_terminal())
    }
}

/// A non-terminal job as reported by the remote service, regardless of
/// which tool started it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJob {
    pub job_id: JobId,
    pub region: String,
    pub server_ids: Vec<ServerId>,
}

/// Replication state of a source server in an account's inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationState {
    /// Actively replicating into the target; counts against the per-region quota.
    Replicating,
    /// Extended from a staging account; does not count against the target.
    Extended,
    Stalled,
    Disconnected,
}

/// One source server in a per-account, per-region inventory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceServer {
    pub server_id: ServerId,
    /// Account the server replicates toward.
    pub replication_target: String,
    pub state: ReplicationState,
}

/// The remote recovery service, as consumed by this system.
///
/// Always the source of truth for job outcomes; this system's durable
/// records are a cache of it.
#[async_trait]
pub trait RecoveryService: Send + Sync {
    /// Resolve the servers matching a tag query in a region.
    async fn resolve_servers_by_tag(
        &self,
        region: &str,
        tags: &BTreeMap<String, String>,
    ) -> RemoteResult<Vec<ServerId>>;

    /// Submit one recovery job for a wave's resolved server set.
    async fn submit_recovery_job(
        &self,
        region: &str,
        server_ids: &[ServerId],
        mode: LaunchMode,
    ) -> RemoteResult<JobId>;

    /// Current per-server status of a job.
    async fn get_job_status(&self, job_id: &str) -> RemoteResult<JobStatus>;

    /// All non-terminal jobs in a region, including those started by other tools.
    async fn list_active_jobs(&self, region: &str) -> RemoteResult<Vec<ActiveJob>>;

    /// Server inventory for an account/region pair.
    async fn list_inventory(
        &self,
        account_id: &str,
        region: &str,
    ) -> RemoteResult<Vec<SourceServer>>;
}

/// Produces a service client scoped to one account's credentials.
///
/// The injection seam for every component: tests swap in the mock factory,
/// production wires one that assumes credentials per account.
pub trait ServiceFactory: Send + Sync {
    fn service_for(&self, account_id: &str) -> RemoteResult<Arc<dyn RecoveryService>>;
}
