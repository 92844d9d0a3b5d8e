//! Conflict Detector — the pre-start gate.
//!
//! Invoked immediately before an execution starts (whole plan, one
//! evaluation per start attempt) and again before each wave starts (scoped
//! to that wave's servers, which may have drifted since plan start). A plan
//! with any unresolved conflict must not start any wave.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use drplan_core::{quotas, Execution, RecoveryPlan, ServerId, Wave};
use drplan_remote::{RecoveryService, ServiceFactory};
use drplan_state::StateStore;

use crate::error::{AdmissionResult, Conflict, ConflictSource};
use crate::resolve;

/// Detects server and quota conflicts against in-flight state.
pub struct ConflictDetector {
    factory: Arc<dyn ServiceFactory>,
    store: StateStore,
    account_id: String,
}

impl ConflictDetector {
    pub fn new(factory: Arc<dyn ServiceFactory>, store: StateStore, account_id: &str) -> Self {
        Self {
            factory,
            store,
            account_id: account_id.to_string(),
        }
    }

    /// Check a whole plan before its execution starts.
    ///
    /// `exclude_execution_id` ignores claims held by the caller's own
    /// execution (used when re-checking per wave mid-run).
    pub async fn check_plan(
        &self,
        plan: &RecoveryPlan,
        exclude_execution_id: Option<&str>,
    ) -> AdmissionResult<Vec<Conflict>> {
        let service = self.factory.service_for(&self.account_id)?;
        let mut conflicts = Vec::new();

        // Resolve every wave up front; resolution failures fail closed.
        let mut wave_servers: Vec<(&Wave, Vec<ServerId>)> = Vec::new();
        for wave in &plan.waves {
            let servers = resolve::resolve_wave(&self.store, service.as_ref(), wave).await?;
            wave_servers.push((wave, servers));
        }

        // Re-run the hard quota arithmetic: tag membership may have changed
        // since creation-time validation.
        let mut total = 0usize;
        for (wave, servers) in &wave_servers {
            total += servers.len();
            if servers.len() > quotas::MAX_SERVERS_PER_JOB {
                conflicts.push(Conflict {
                    server_id: None,
                    wave_id: Some(wave.id.clone()),
                    source: ConflictSource::QuotaViolation,
                    detail: format!(
                        "wave now resolves to {} servers (limit {})",
                        servers.len(),
                        quotas::MAX_SERVERS_PER_JOB
                    ),
                });
            }
        }
        if total > quotas::MAX_TOTAL_SERVERS_IN_JOBS {
            conflicts.push(Conflict {
                server_id: None,
                wave_id: None,
                source: ConflictSource::QuotaViolation,
                detail: format!(
                    "plan now resolves to {total} servers (limit {})",
                    quotas::MAX_TOTAL_SERVERS_IN_JOBS
                ),
            });
        }

        let committed = self
            .committed_servers(service.as_ref(), exclude_execution_id)
            .await?;
        let remote_jobs = self
            .remote_job_servers(service.as_ref(), &plan.waves, exclude_execution_id)
            .await?;

        for (wave, servers) in &wave_servers {
            self.collect_server_conflicts(wave, servers, &committed, &remote_jobs, &mut conflicts);
        }

        debug!(
            plan_id = %plan.id,
            conflicts = conflicts.len(),
            "plan conflict check complete"
        );
        Ok(conflicts)
    }

    /// Check a single wave immediately before it starts.
    pub async fn check_wave(
        &self,
        wave: &Wave,
        servers: &[ServerId],
        exclude_execution_id: &str,
    ) -> AdmissionResult<Vec<Conflict>> {
        let service = self.factory.service_for(&self.account_id)?;
        let mut conflicts = Vec::new();

        if servers.len() > quotas::MAX_SERVERS_PER_JOB {
            conflicts.push(Conflict {
                server_id: None,
                wave_id: Some(wave.id.clone()),
                source: ConflictSource::QuotaViolation,
                detail: format!(
                    "wave now resolves to {} servers (limit {})",
                    servers.len(),
                    quotas::MAX_SERVERS_PER_JOB
                ),
            });
        }

        let committed = self
            .committed_servers(service.as_ref(), Some(exclude_execution_id))
            .await?;
        let remote_jobs = self
            .remote_job_servers(
                service.as_ref(),
                std::slice::from_ref(wave),
                Some(exclude_execution_id),
            )
            .await?;
        self.collect_server_conflicts(wave, servers, &committed, &remote_jobs, &mut conflicts);
        Ok(conflicts)
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn collect_server_conflicts(
        &self,
        wave: &Wave,
        servers: &[ServerId],
        committed: &HashMap<ServerId, String>,
        remote_jobs: &HashMap<ServerId, String>,
        conflicts: &mut Vec<Conflict>,
    ) {
        for server in servers {
            if let Some(execution_id) = committed.get(server) {
                conflicts.push(Conflict {
                    server_id: Some(server.clone()),
                    wave_id: Some(wave.id.clone()),
                    source: ConflictSource::Execution,
                    detail: format!("committed to active execution '{execution_id}'"),
                });
            }
            if let Some(job_id) = remote_jobs.get(server) {
                conflicts.push(Conflict {
                    server_id: Some(server.clone()),
                    wave_id: Some(wave.id.clone()),
                    source: ConflictSource::DrsJob,
                    detail: format!("attached to non-terminal remote job '{job_id}'"),
                });
            }
        }
    }

    /// Servers claimed by active executions, first-active-execution-wins.
    ///
    /// Started waves claim the servers recorded in their job; pending waves
    /// claim their plan's current resolved membership, so a freshly-created
    /// execution holds its servers before any wave submits.
    async fn committed_servers(
        &self,
        service: &dyn RecoveryService,
        exclude_execution_id: Option<&str>,
    ) -> AdmissionResult<HashMap<ServerId, String>> {
        let mut active: Vec<Execution> = self
            .store
            .list_active_executions()?
            .into_iter()
            .filter(|e| Some(e.id.as_str()) != exclude_execution_id)
            .collect();
        active.sort_by_key(|e| e.created_at);

        let mut committed: HashMap<ServerId, String> = HashMap::new();
        for execution in &active {
            for record in &execution.waves {
                if !record.server_statuses.is_empty() {
                    for server in record.server_statuses.keys() {
                        committed
                            .entry(server.clone())
                            .or_insert_with(|| execution.id.clone());
                    }
                    continue;
                }
                // Pending wave: claim current plan membership.
                if let Some(plan) = self.store.get_recovery_plan(&execution.plan_id)? {
                    if let Some(wave) = plan.wave(&record.wave_id) {
                        let servers = resolve::resolve_wave(&self.store, service, wave).await?;
                        for server in servers {
                            committed
                                .entry(server)
                                .or_insert_with(|| execution.id.clone());
                        }
                    }
                }
            }
        }
        Ok(committed)
    }

    /// Servers attached to non-terminal jobs directly in the remote
    /// service — the split-brain guard against jobs this system's
    /// bookkeeping does not know about.
    async fn remote_job_servers(
        &self,
        service: &dyn RecoveryService,
        waves: &[Wave],
        exclude_execution_id: Option<&str>,
    ) -> AdmissionResult<HashMap<ServerId, String>> {
        let own_jobs: HashSet<String> = match exclude_execution_id {
            Some(id) => match self.store.get_execution(id)? {
                Some(execution) => execution
                    .waves
                    .iter()
                    .filter_map(|w| w.job_id.clone())
                    .collect(),
                None => HashSet::new(),
            },
            None => HashSet::new(),
        };

        let mut by_server = HashMap::new();
        for region in resolve::wave_regions(&self.store, waves)? {
            for job in service.list_active_jobs(&region).await? {
                if own_jobs.contains(&job.job_id) {
                    continue;
                }
                for server in job.server_ids {
                    by_server.entry(server).or_insert_with(|| job.job_id.clone());
                }
            }
        }
        Ok(by_server)
    }
}
