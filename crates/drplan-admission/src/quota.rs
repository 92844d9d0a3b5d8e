//! Quota Validator — the pre-creation gate.
//!
//! Hard quotas (servers per job, total servers across a plan) block
//! creation synchronously, before anything is persisted. Concurrency and
//! server-conflict conditions are advisory: jobs may finish between plan
//! creation and plan execution, so rejecting on them would produce false
//! negatives.

use std::sync::Arc;

use tracing::{debug, warn};

use drplan_core::{plan_graph, quotas, RecoveryPlan, ServerSelection};
use drplan_remote::ServiceFactory;
use drplan_state::StateStore;

use crate::conflict::ConflictDetector;
use crate::error::{AdmissionError, AdmissionResult, QuotaType, Warning, WarningCode, WaveBreakdown};
use crate::resolve;

/// Validates group and plan definitions against the hard service quotas.
pub struct QuotaValidator {
    factory: Arc<dyn ServiceFactory>,
    store: StateStore,
    /// Target account the checks run under.
    account_id: String,
}

impl QuotaValidator {
    pub fn new(factory: Arc<dyn ServiceFactory>, store: StateStore, account_id: &str) -> Self {
        Self {
            factory,
            store,
            account_id: account_id.to_string(),
        }
    }

    /// Resolve a group selection and enforce the servers-per-job limit.
    ///
    /// Runs synchronously before group creation is persisted — a hard
    /// block, not a warning. Resolution failures fail closed.
    pub async fn validate_group_size(
        &self,
        region: &str,
        selection: &ServerSelection,
    ) -> AdmissionResult<usize> {
        let service = self.factory.service_for(&self.account_id)?;
        let servers = resolve::resolve_selection(service.as_ref(), region, selection).await?;
        let count = servers.len();
        if count > quotas::MAX_SERVERS_PER_JOB {
            return Err(AdmissionError::QuotaExceeded {
                quota_type: QuotaType::ServersPerJob,
                count,
                max: quotas::MAX_SERVERS_PER_JOB,
                recommendation: format!(
                    "resolved selection has {count} servers; split it into multiple \
                     protection groups of at most {} servers each",
                    quotas::MAX_SERVERS_PER_JOB
                ),
                wave_breakdown: Vec::new(),
            });
        }
        debug!(region, count, "protection group size validated");
        Ok(count)
    }

    /// Validate a plan's wave graph and wave/total server counts.
    ///
    /// Structural problems (cycles, unknown dependencies) reject first;
    /// then each wave is resolved and checked against the per-job limit,
    /// then the plan total against the all-jobs limit. Every plan-level
    /// rejection carries the full per-wave breakdown.
    pub async fn validate_plan_waves(&self, plan: &RecoveryPlan) -> AdmissionResult<()> {
        plan_graph::validate(plan)?;

        let service = self.factory.service_for(&self.account_id)?;
        let mut breakdown = Vec::with_capacity(plan.waves.len());
        for wave in &plan.waves {
            let servers = resolve::resolve_wave(&self.store, service.as_ref(), wave).await?;
            breakdown.push(WaveBreakdown {
                wave_id: wave.id.clone(),
                server_count: servers.len(),
            });
        }

        if let Some(over) = breakdown
            .iter()
            .find(|b| b.server_count > quotas::MAX_SERVERS_PER_JOB)
        {
            return Err(AdmissionError::QuotaExceeded {
                quota_type: QuotaType::ServersPerJob,
                count: over.server_count,
                max: quotas::MAX_SERVERS_PER_JOB,
                recommendation: format!(
                    "wave '{}' resolves to {} servers; split it into multiple waves \
                     of at most {} servers each",
                    over.wave_id,
                    over.server_count,
                    quotas::MAX_SERVERS_PER_JOB
                ),
                wave_breakdown: breakdown.clone(),
            });
        }

        let total: usize = breakdown.iter().map(|b| b.server_count).sum();
        if total > quotas::MAX_TOTAL_SERVERS_IN_JOBS {
            return Err(AdmissionError::QuotaExceeded {
                quota_type: QuotaType::TotalServersInJobs,
                count: total,
                max: quotas::MAX_TOTAL_SERVERS_IN_JOBS,
                recommendation: format!(
                    "plan resolves to {total} servers across {} waves; split it into \
                     multiple recovery plans totalling at most {} servers each",
                    breakdown.len(),
                    quotas::MAX_TOTAL_SERVERS_IN_JOBS
                ),
                wave_breakdown: breakdown,
            });
        }

        debug!(plan_id = %plan.id, total, waves = plan.waves.len(), "plan quotas validated");
        Ok(())
    }

    /// Non-blocking advisory: is the region's concurrent-job quota
    /// currently saturated?
    ///
    /// Returns `None` both when there is headroom and when the check itself
    /// fails — an advisory must never block creation.
    pub async fn concurrency_advisory(&self, region: &str) -> Option<Warning> {
        let service = match self.factory.service_for(&self.account_id) {
            Ok(s) => s,
            Err(e) => {
                warn!(region, error = %e, "skipping concurrency advisory");
                return None;
            }
        };
        let jobs = match service.list_active_jobs(region).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(region, error = %e, "skipping concurrency advisory");
                return None;
            }
        };
        if jobs.len() >= quotas::MAX_CONCURRENT_JOBS_PER_REGION {
            return Some(Warning {
                code: WarningCode::ConcurrentJobsAtLimit,
                message: format!(
                    "region {region} is running {} of {} allowed concurrent jobs; \
                     the plan cannot start until a job finishes",
                    jobs.len(),
                    quotas::MAX_CONCURRENT_JOBS_PER_REGION
                ),
                can_execute_now: false,
                conflicts: Vec::new(),
            });
        }
        None
    }

    /// Non-blocking advisory: are any of the plan's servers presently
    /// committed elsewhere?
    pub async fn server_conflicts_advisory(
        &self,
        detector: &ConflictDetector,
        plan: &RecoveryPlan,
    ) -> Option<Warning> {
        let conflicts = match detector.check_plan(plan, None).await {
            Ok(conflicts) => conflicts,
            Err(e) => {
                warn!(plan_id = %plan.id, error = %e, "skipping server-conflict advisory");
                return None;
            }
        };
        if conflicts.is_empty() {
            return None;
        }
        Some(Warning {
            code: WarningCode::ServerConflictsDetected,
            message: format!(
                "{} server(s) referenced by this plan are committed to other \
                 in-flight operations; they may free up before execution",
                conflicts.len()
            ),
            can_execute_now: false,
            conflicts,
        })
    }
}
