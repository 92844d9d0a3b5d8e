//! Scriptable in-memory recovery service for tests.
//!
//! Downstream crates drive their admission, capacity, and orchestration
//! tests against this fake: tag universes, scripted job-status sequences,
//! injectable failures, and per-method call counters.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use drplan_core::{JobId, LaunchMode, ServerId, ServerLaunchStatus, ServerRecord};

use crate::error::{RemoteError, RemoteResult};
use crate::service::{
    ActiveJob, JobStatus, RecoveryService, ReplicationState, ServiceFactory, SourceServer,
};

/// A job submitted through the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub job_id: JobId,
    pub region: String,
    pub server_ids: Vec<ServerId>,
    pub mode: LaunchMode,
}

#[derive(Default)]
struct Inner {
    tag_resolutions: HashMap<(String, BTreeMap<String, String>), Vec<ServerId>>,
    submitted: Vec<SubmittedJob>,
    next_job: u64,
    scripted: HashMap<JobId, VecDeque<JobStatus>>,
    external_jobs: HashMap<String, Vec<ActiveJob>>,
    inventory: HashMap<(String, String), Vec<SourceServer>>,
    failures: HashMap<&'static str, VecDeque<RemoteError>>,
    calls: HashMap<&'static str, usize>,
}

/// In-memory scriptable recovery service.
#[derive(Default)]
pub struct MockRecoveryService {
    inner: Mutex<Inner>,
}

impl MockRecoveryService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the resolution of a tag query in a region.
    pub fn set_tag_resolution(
        &self,
        region: &str,
        tags: BTreeMap<String, String>,
        servers: Vec<ServerId>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .tag_resolutions
            .insert((region.to_string(), tags), servers);
    }

    /// Script the status sequence a job will report, one entry per poll.
    /// The final entry is sticky.
    pub fn script_job_status(&self, job_id: &str, statuses: Vec<JobStatus>) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripted.insert(job_id.to_string(), statuses.into());
    }

    /// Register a job started outside this system (split-brain scenarios).
    pub fn add_external_job(&self, region: &str, job_id: &str, server_ids: Vec<ServerId>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .external_jobs
            .entry(region.to_string())
            .or_default()
            .push(ActiveJob {
                job_id: job_id.to_string(),
                region: region.to_string(),
                server_ids,
            });
    }

    /// Script the inventory for an account/region pair.
    pub fn set_inventory(&self, account_id: &str, region: &str, servers: Vec<SourceServer>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .inventory
            .insert((account_id.to_string(), region.to_string()), servers);
    }

    /// Make the next call to `method` fail with `error`.
    pub fn fail_next(&self, method: &'static str, error: RemoteError) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.entry(method).or_default().push_back(error);
    }

    /// Number of calls made to `method`.
    pub fn calls(&self, method: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.calls.get(method).copied().unwrap_or(0)
    }

    /// Jobs submitted through this mock, in submission order.
    pub fn submitted_jobs(&self) -> Vec<SubmittedJob> {
        self.inner.lock().unwrap().submitted.clone()
    }

    fn enter(&self, method: &'static str) -> RemoteResult<()> {
        let mut inner = self.inner.lock().unwrap();
        *inner.calls.entry(method).or_insert(0) += 1;
        if let Some(queue) = inner.failures.get_mut(method) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }
        Ok(())
    }

    fn current_status(inner: &Inner, job_id: &str) -> Option<JobStatus> {
        if let Some(queue) = inner.scripted.get(job_id) {
            if let Some(front) = queue.front() {
                return Some(front.clone());
            }
        }
        inner
            .submitted
            .iter()
            .find(|j| j.job_id == job_id)
            .map(|job| JobStatus {
                job_id: job.job_id.clone(),
                terminal: false,
                servers: job
                    .server_ids
                    .iter()
                    .map(|s| {
                        (
                            s.clone(),
                            ServerRecord {
                                status: ServerLaunchStatus::Launching,
                                recovery_instance_id: None,
                                launch_time: None,
                            },
                        )
                    })
                    .collect(),
            })
    }
}

#[async_trait]
impl RecoveryService for MockRecoveryService {
    async fn resolve_servers_by_tag(
        &self,
        region: &str,
        tags: &BTreeMap<String, String>,
    ) -> RemoteResult<Vec<ServerId>> {
        self.enter("resolve_servers_by_tag")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tag_resolutions
            .get(&(region.to_string(), tags.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn submit_recovery_job(
        &self,
        region: &str,
        server_ids: &[ServerId],
        mode: LaunchMode,
    ) -> RemoteResult<JobId> {
        self.enter("submit_recovery_job")?;
        let mut inner = self.inner.lock().unwrap();
        inner.next_job += 1;
        let job_id = format!("job-{}", inner.next_job);
        inner.submitted.push(SubmittedJob {
            job_id: job_id.clone(),
            region: region.to_string(),
            server_ids: server_ids.to_vec(),
            mode,
        });
        Ok(job_id)
    }

    async fn get_job_status(&self, job_id: &str) -> RemoteResult<JobStatus> {
        self.enter("get_job_status")?;
        let mut inner = self.inner.lock().unwrap();
        let status = Self::current_status(&inner, job_id)
            .ok_or_else(|| RemoteError::NotFound(format!("job '{job_id}'")))?;
        // Advance the script, keeping the last entry sticky.
        if let Some(queue) = inner.scripted.get_mut(job_id) {
            if queue.len() > 1 {
                queue.pop_front();
            }
        }
        Ok(status)
    }

    async fn list_active_jobs(&self, region: &str) -> RemoteResult<Vec<ActiveJob>> {
        self.enter("list_active_jobs")?;
        let inner = self.inner.lock().unwrap();
        let mut jobs: Vec<ActiveJob> = inner
            .external_jobs
            .get(region)
            .cloned()
            .unwrap_or_default();
        for job in inner.submitted.iter().filter(|j| j.region == region) {
            let non_terminal = Self::current_status(&inner, &job.job_id)
                .map(|s| !s.terminal)
                .unwrap_or(false);
            if non_terminal {
                jobs.push(ActiveJob {
                    job_id: job.job_id.clone(),
                    region: job.region.clone(),
                    server_ids: job.server_ids.clone(),
                });
            }
        }
        Ok(jobs)
    }

    async fn list_inventory(
        &self,
        account_id: &str,
        region: &str,
    ) -> RemoteResult<Vec<SourceServer>> {
        self.enter("list_inventory")?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .inventory
            .get(&(account_id.to_string(), region.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Factory handing out mock services, optionally per-account, with
/// injectable per-account failures for partial-snapshot tests.
#[derive(Default)]
pub struct MockFactory {
    default: Arc<MockRecoveryService>,
    per_account: Mutex<HashMap<String, Arc<MockRecoveryService>>>,
    failing: Mutex<HashSet<String>>,
}

impl MockFactory {
    pub fn new(default: Arc<MockRecoveryService>) -> Arc<Self> {
        Arc::new(Self {
            default,
            per_account: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
        })
    }

    /// Use a dedicated mock for one account.
    pub fn set_account_service(&self, account_id: &str, service: Arc<MockRecoveryService>) {
        self.per_account
            .lock()
            .unwrap()
            .insert(account_id.to_string(), service);
    }

    /// Make `service_for` fail for the given account (unreachable staging
    /// account scenarios).
    pub fn fail_account(&self, account_id: &str) {
        self.failing.lock().unwrap().insert(account_id.to_string());
    }
}

impl ServiceFactory for MockFactory {
    fn service_for(&self, account_id: &str) -> RemoteResult<Arc<dyn RecoveryService>> {
        if self.failing.lock().unwrap().contains(account_id) {
            return Err(RemoteError::Unavailable(format!(
                "cannot assume credentials for account '{account_id}'"
            )));
        }
        let per_account = self.per_account.lock().unwrap();
        Ok(match per_account.get(account_id) {
            Some(service) => service.clone(),
            None => self.default.clone(),
        })
    }
}

// ── Builders used across downstream tests ──────────────────────────

/// Build a [`JobStatus`] from (server, status) pairs.
pub fn job_status(job_id: &str, terminal: bool, servers: &[(&str, ServerLaunchStatus)]) -> JobStatus {
    JobStatus {
        job_id: job_id.to_string(),
        terminal,
        servers: servers
            .iter()
            .map(|(id, status)| {
                (
                    id.to_string(),
                    ServerRecord {
                        status: *status,
                        recovery_instance_id: matches!(status, ServerLaunchStatus::Launched)
                            .then(|| format!("ri-{id}")),
                        launch_time: matches!(status, ServerLaunchStatus::Launched).then_some(1000),
                    },
                )
            })
            .collect(),
    }
}

/// Build a replicating [`SourceServer`] targeting `account_id`.
pub fn replicating_server(server_id: &str, account_id: &str) -> SourceServer {
    SourceServer {
        server_id: server_id.to_string(),
        replication_target: account_id.to_string(),
        state: ReplicationState::Replicating,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_and_poll_roundtrip() {
        let mock = MockRecoveryService::new();
        let job_id = mock
            .submit_recovery_job("us-east-1", &["s-1".into()], LaunchMode::Drill)
            .await
            .unwrap();
        assert_eq!(job_id, "job-1");

        // Unscripted jobs report all servers launching.
        let status = mock.get_job_status(&job_id).await.unwrap();
        assert!(!status.terminal);
        assert_eq!(
            status.servers["s-1"].status,
            ServerLaunchStatus::Launching
        );

        mock.script_job_status(
            &job_id,
            vec![job_status(&job_id, true, &[("s-1", ServerLaunchStatus::Launched)])],
        );
        let status = mock.get_job_status(&job_id).await.unwrap();
        assert!(status.terminal);
        assert_eq!(mock.calls("get_job_status"), 2);
    }

    #[tokio::test]
    async fn scripted_sequence_advances_and_sticks() {
        let mock = MockRecoveryService::new();
        mock.script_job_status(
            "job-x",
            vec![
                job_status("job-x", false, &[("s-1", ServerLaunchStatus::Launching)]),
                job_status("job-x", true, &[("s-1", ServerLaunchStatus::Launched)]),
            ],
        );
        assert!(!mock.get_job_status("job-x").await.unwrap().terminal);
        assert!(mock.get_job_status("job-x").await.unwrap().terminal);
        // Sticky.
        assert!(mock.get_job_status("job-x").await.unwrap().terminal);
    }

    #[tokio::test]
    async fn active_jobs_includes_external_and_submitted() {
        let mock = MockRecoveryService::new();
        mock.add_external_job("us-east-1", "ext-1", vec!["s-9".into()]);
        mock.submit_recovery_job("us-east-1", &["s-1".into()], LaunchMode::Drill)
            .await
            .unwrap();

        let jobs = mock.list_active_jobs("us-east-1").await.unwrap();
        assert_eq!(jobs.len(), 2);

        // Terminal submitted jobs drop out.
        mock.script_job_status(
            "job-1",
            vec![job_status("job-1", true, &[("s-1", ServerLaunchStatus::Launched)])],
        );
        let jobs = mock.list_active_jobs("us-east-1").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, "ext-1");
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let mock = MockRecoveryService::new();
        mock.fail_next(
            "list_active_jobs",
            RemoteError::Throttled("busy".into()),
        );
        assert!(mock.list_active_jobs("us-east-1").await.is_err());
        assert!(mock.list_active_jobs("us-east-1").await.is_ok());
    }

    #[tokio::test]
    async fn factory_fails_per_account() {
        let mock = MockRecoveryService::new();
        let factory = MockFactory::new(mock);
        factory.fail_account("999999999999");
        assert!(factory.service_for("111122223333").is_ok());
        assert!(factory.service_for("999999999999").is_err());
    }
}
