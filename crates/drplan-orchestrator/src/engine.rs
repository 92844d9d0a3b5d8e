//! The tick engine and execution control surface.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use drplan_admission::{resolve, ConflictDetector};
use drplan_core::{
    plan_graph, Execution, ExecutionOptions, ExecutionStatus, LaunchMode, RecoveryPlan,
    ResumeGate, ServerId, ServerRecord, Wave, WaveId, WaveStatus,
};
use drplan_remote::{retry, RecoveryService, RetryPolicy, ServiceFactory};
use drplan_state::{StateError, StateStore};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Poll cadence while a job is young: 15s for the first two minutes,
/// 30s until ten minutes, 45s after that.
const POLL_FAST: u64 = 15;
const POLL_MEDIUM: u64 = 30;
const POLL_SLOW: u64 = 45;
const FAST_WINDOW: u64 = 120;
const MEDIUM_WINDOW: u64 = 600;

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Age after which a polling wave is requeried for ground truth and
    /// finalized.
    pub wave_timeout: Duration,
    /// Age after which a claimed-but-unsubmitted wave is treated as an
    /// interrupted submission and reconciled against the remote job list.
    pub start_grace: Duration,
    pub submit_retry: RetryPolicy,
    pub poll_retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            wave_timeout: Duration::from_secs(30 * 60),
            start_grace: Duration::from_secs(60),
            submit_retry: RetryPolicy::default(),
            poll_retry: RetryPolicy::default(),
        }
    }
}

/// What one tick did to one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub execution_id: String,
    pub status: Option<ExecutionStatus>,
    pub polled: Vec<WaveId>,
    pub started: Vec<WaveId>,
    pub failed: Vec<WaveId>,
    /// Set when this tick parked the execution ahead of a wave.
    pub parked: Option<WaveId>,
}

/// Stateless reactor over durable executions.
///
/// Holds no in-memory execution state: every tick re-derives its work from
/// the store, and every transition goes through the store's optimistic
/// wave-status guard, so overlapping invocations cannot double-submit a
/// wave's remote job.
pub struct Orchestrator {
    store: StateStore,
    factory: Arc<dyn ServiceFactory>,
    detector: Arc<ConflictDetector>,
    account_id: String,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(store: StateStore, factory: Arc<dyn ServiceFactory>, account_id: &str) -> Self {
        Self::with_config(store, factory, account_id, OrchestratorConfig::default())
    }

    pub fn with_config(
        store: StateStore,
        factory: Arc<dyn ServiceFactory>,
        account_id: &str,
        config: OrchestratorConfig,
    ) -> Self {
        let detector = Arc::new(ConflictDetector::new(
            factory.clone(),
            store.clone(),
            account_id,
        ));
        Self {
            store,
            factory,
            detector,
            account_id: account_id.to_string(),
            config,
        }
    }

    // ── Control surface ─────────────────────────────────────────────

    /// Create a PENDING execution for a plan after a full-plan conflict
    /// check. Any conflict aborts with the full list.
    pub async fn start(
        &self,
        plan_id: &str,
        options: ExecutionOptions,
    ) -> OrchestratorResult<Execution> {
        let plan = self
            .store
            .get_recovery_plan(plan_id)?
            .ok_or_else(|| OrchestratorError::UnknownPlan(plan_id.to_string()))?;

        let conflicts = self.detector.check_plan(&plan, None).await?;
        if !conflicts.is_empty() {
            warn!(
                plan_id = %plan_id,
                conflicts = conflicts.len(),
                "execution start blocked by conflicts"
            );
            return Err(OrchestratorError::ConflictsDetected(conflicts));
        }

        let execution = Execution::new(
            &Uuid::new_v4().to_string(),
            &plan,
            options,
            epoch_secs(),
        );
        self.store.put_execution(&execution)?;
        info!(execution_id = %execution.id, plan_id = %plan_id, "execution created");
        Ok(execution)
    }

    /// Park the execution ahead of its next pending wave. Waves already
    /// polling run to completion; nothing new starts until resume.
    pub fn pause(&self, execution_id: &str) -> OrchestratorResult<Execution> {
        let execution = self.load(execution_id)?;
        if execution.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal(execution_id.to_string()));
        }
        if execution.waiting.is_some() {
            return Ok(execution);
        }
        let gate_wave = execution
            .waves
            .iter()
            .find(|w| w.status == WaveStatus::Pending)
            .map(|w| w.wave_id.clone())
            .ok_or_else(|| OrchestratorError::NothingToPause(execution_id.to_string()))?;

        let updated = self.store.update_execution(execution_id, |e| {
            e.waiting = Some(ResumeGate {
                wave_id: gate_wave.clone(),
                token: Uuid::new_v4().to_string(),
                paused_at: epoch_secs(),
            });
            Ok(())
        })?;
        info!(execution_id = %execution_id, wave_id = %gate_wave, "execution paused");
        Ok(updated)
    }

    /// Lift the gate. The presented token must match the one issued when
    /// the execution was parked.
    pub fn resume(&self, execution_id: &str, token: &str) -> OrchestratorResult<Execution> {
        let execution = self.load(execution_id)?;
        let gate = execution
            .waiting
            .as_ref()
            .ok_or_else(|| OrchestratorError::NotWaiting(execution_id.to_string()))?;
        if gate.token != token {
            return Err(OrchestratorError::TokenMismatch(execution_id.to_string()));
        }
        let updated = self.store.update_execution(execution_id, |e| {
            e.waiting = None;
            Ok(())
        })?;
        info!(execution_id = %execution_id, "execution resumed");
        Ok(updated)
    }

    /// Request cooperative cancellation; the next tick finalizes it.
    /// Already-launched recovery instances are left untouched.
    pub fn cancel(&self, execution_id: &str) -> OrchestratorResult<Execution> {
        let execution = self.load(execution_id)?;
        if execution.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal(execution_id.to_string()));
        }
        let updated = self.store.update_execution(execution_id, |e| {
            e.cancel_requested = true;
            Ok(())
        })?;
        info!(execution_id = %execution_id, "cancellation requested");
        Ok(updated)
    }

    // ── Tick ────────────────────────────────────────────────────────

    /// Advance one execution by one step against the current wall clock.
    pub async fn tick(&self, execution_id: &str) -> OrchestratorResult<TickReport> {
        self.tick_at(execution_id, epoch_secs()).await
    }

    /// Advance one execution as of `now` (epoch seconds). All scheduling
    /// decisions — poll due times, timeouts — derive from this value.
    pub async fn tick_at(&self, execution_id: &str, now: u64) -> OrchestratorResult<TickReport> {
        let mut report = TickReport {
            execution_id: execution_id.to_string(),
            ..TickReport::default()
        };

        let execution = self.load(execution_id)?;
        if execution.is_terminal() {
            report.status = Some(execution.status);
            return Ok(report);
        }
        if execution.cancel_requested {
            let updated = self.finalize_cancel(execution_id)?;
            report.status = Some(updated.status);
            return Ok(report);
        }

        let plan = self
            .store
            .get_recovery_plan(&execution.plan_id)?
            .ok_or_else(|| OrchestratorError::UnknownPlan(execution.plan_id.clone()))?;
        let service = self.factory.service_for(&self.account_id)?;

        // Phase 1: poll in-flight waves that are due (or timed out).
        for record in &execution.waves {
            if record.status != WaveStatus::Polling {
                continue;
            }
            if self
                .poll_wave(service.as_ref(), &execution, &record.wave_id, now)
                .await?
            {
                report.polled.push(record.wave_id.clone());
            }
        }

        // Recover waves claimed by an invocation that died mid-submit.
        for record in &execution.waves {
            if record.status != WaveStatus::Started {
                continue;
            }
            self.recover_started_wave(
                service.as_ref(),
                &plan,
                &execution,
                &record.wave_id,
                now,
                &mut report,
            )
            .await?;
        }

        // Phase 2: fail waves whose dependencies can no longer launch.
        self.cascade_dependency_failures(&plan, execution_id)?;

        // Phase 3: start eligible waves, unless parked.
        let execution = self.load(execution_id)?;
        if let Some(gate) = &execution.waiting {
            report.parked = Some(gate.wave_id.clone());
        } else {
            self.start_eligible(&plan, &execution, now, &mut report)
                .await?;
        }

        let updated = self.store.update_execution(execution_id, |e| {
            e.status = e.derive_status();
            Ok(())
        })?;
        report.status = Some(updated.status);
        debug!(
            execution_id = %execution_id,
            status = ?updated.status,
            polled = report.polled.len(),
            started = report.started.len(),
            "tick complete"
        );
        Ok(report)
    }

    /// Scheduled loop the daemon spawns: tick every active execution.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        info!(interval_secs = interval.as_secs(), "orchestrator started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.store.list_active_executions() {
                        Ok(active) => {
                            for execution in active {
                                if let Err(e) = self.tick(&execution.id).await {
                                    error!(
                                        execution_id = %execution.id,
                                        error = %e,
                                        "tick failed"
                                    );
                                }
                            }
                        }
                        Err(e) => error!(error = %e, "listing active executions failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("orchestrator shutting down");
                    break;
                }
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn load(&self, execution_id: &str) -> OrchestratorResult<Execution> {
        self.store
            .get_execution(execution_id)?
            .ok_or_else(|| OrchestratorError::UnknownExecution(execution_id.to_string()))
    }

    fn finalize_cancel(&self, execution_id: &str) -> OrchestratorResult<Execution> {
        let updated = self.store.update_execution(execution_id, |e| {
            for wave in &mut e.waves {
                if !wave.status.is_terminal() {
                    wave.status = WaveStatus::Cancelled;
                    wave.detail = Some("cancelled by operator".to_string());
                }
            }
            e.waiting = None;
            e.status = e.derive_status();
            Ok(())
        })?;
        info!(execution_id = %execution_id, "execution cancelled");
        Ok(updated)
    }

    /// Poll one POLLING wave if its adaptive interval has elapsed, or
    /// finalize it if it has exceeded the timeout bound. Returns whether a
    /// remote query happened.
    async fn poll_wave(
        &self,
        service: &dyn RecoveryService,
        execution: &Execution,
        wave_id: &str,
        now: u64,
    ) -> OrchestratorResult<bool> {
        let record = match execution.wave(wave_id) {
            Some(r) => r.clone(),
            None => return Ok(false),
        };
        let Some(job_id) = record.job_id.clone() else {
            // A polling wave without a job is unrecoverable bookkeeping.
            self.transition(wave_id, execution, WaveStatus::Polling, |w| {
                w.status = WaveStatus::Failed;
                w.detail = Some("polling wave has no job id".to_string());
            })?;
            return Ok(false);
        };
        let submitted = record.submitted_at.unwrap_or(execution.created_at);
        let age = now.saturating_sub(submitted);
        let require_full = execution.options.require_full_wave;

        // Past the bound: requery ground truth once and finalize. The
        // remote outcome wins; only an unreachable remote times the wave
        // out.
        if age >= self.config.wave_timeout.as_secs() {
            match service.get_job_status(&job_id).await {
                Ok(status) => {
                    let outcome = wave_outcome(&status.servers, status.terminal, require_full);
                    self.transition(wave_id, execution, WaveStatus::Polling, |w| {
                        w.server_statuses = status.servers;
                        w.last_polled_at = Some(now);
                        match outcome {
                            Some((final_status, detail)) => {
                                w.status = final_status;
                                w.detail = detail;
                            }
                            None => {
                                w.status = WaveStatus::TimedOut;
                                w.detail =
                                    Some("remote job still in progress at timeout".to_string());
                            }
                        }
                    })?;
                }
                Err(e) => {
                    warn!(wave_id = %wave_id, error = %e, "timeout requery failed");
                    self.transition(wave_id, execution, WaveStatus::Polling, |w| {
                        w.status = WaveStatus::TimedOut;
                        w.last_polled_at = Some(now);
                        w.detail = Some(format!("remote unreachable at timeout requery: {e}"));
                    })?;
                }
            }
            return Ok(true);
        }

        let due_at = record.last_polled_at.unwrap_or(submitted) + poll_interval(age);
        if now < due_at {
            return Ok(false);
        }

        match retry::with_backoff(&self.config.poll_retry, || service.get_job_status(&job_id))
            .await
        {
            Ok(status) => {
                let outcome = wave_outcome(&status.servers, status.terminal, require_full);
                self.transition(wave_id, execution, WaveStatus::Polling, |w| {
                    w.server_statuses = status.servers;
                    w.last_polled_at = Some(now);
                    if let Some((final_status, detail)) = outcome {
                        w.status = final_status;
                        w.detail = detail;
                    }
                })?;
            }
            Err(e) if e.is_transient() => {
                // Leave the wave for the next tick.
                warn!(wave_id = %wave_id, error = %e, "poll failed transiently");
                self.transition(wave_id, execution, WaveStatus::Polling, |w| {
                    w.last_polled_at = Some(now);
                })?;
            }
            Err(e) => {
                self.transition(wave_id, execution, WaveStatus::Polling, |w| {
                    w.status = WaveStatus::Failed;
                    w.last_polled_at = Some(now);
                    w.detail = Some(format!("job status query failed: {e}"));
                })?;
            }
        }
        Ok(true)
    }

    /// Reconcile a STARTED wave left behind by an invocation that died
    /// between the claim and the submission record. Inside the grace bound
    /// the claim may still belong to a live submit and is left alone; past
    /// it, the remote job list is the ground truth — a matching active job
    /// is adopted as POLLING, and a wave with no job fails.
    async fn recover_started_wave(
        &self,
        service: &dyn RecoveryService,
        plan: &RecoveryPlan,
        execution: &Execution,
        wave_id: &str,
        now: u64,
        report: &mut TickReport,
    ) -> OrchestratorResult<()> {
        let Some(record) = execution.wave(wave_id) else {
            return Ok(());
        };
        let claimed = record.started_at.unwrap_or(execution.created_at);
        if now < claimed + self.config.start_grace.as_secs() {
            return Ok(());
        }
        let Some(wave) = plan.wave(wave_id) else {
            return Ok(());
        };
        let Some(group_id) = wave.protection_group_ids.first() else {
            return Ok(());
        };
        let servers = match resolve::resolve_wave(&self.store, service, wave).await {
            Ok(servers) => servers,
            Err(e) => {
                warn!(wave_id = %wave_id, error = %e, "resolution failed during job reconciliation");
                return Ok(());
            }
        };
        let region = resolve::load_group(&self.store, group_id)?.region;

        let known: HashSet<&str> = execution
            .waves
            .iter()
            .filter_map(|w| w.job_id.as_deref())
            .collect();
        let wanted: HashSet<&str> = servers.iter().map(|s| s.as_str()).collect();
        match service.list_active_jobs(&region).await {
            Ok(jobs) => {
                let adopted = jobs.into_iter().find(|job| {
                    !known.contains(job.job_id.as_str())
                        && !wanted.is_empty()
                        && job
                            .server_ids
                            .iter()
                            .map(|s| s.as_str())
                            .collect::<HashSet<_>>()
                            == wanted
                });
                match adopted {
                    Some(job) => {
                        let statuses: BTreeMap<ServerId, ServerRecord> = servers
                            .iter()
                            .map(|s| (s.clone(), ServerRecord::pending()))
                            .collect();
                        self.transition(wave_id, execution, WaveStatus::Started, |w| {
                            w.job_id = Some(job.job_id.clone());
                            w.submitted_at = Some(now);
                            w.server_statuses = statuses;
                            w.status = WaveStatus::Polling;
                        })?;
                        info!(
                            execution_id = %execution.id,
                            wave_id = %wave_id,
                            job_id = %job.job_id,
                            "adopted remote job for interrupted submission"
                        );
                        report.started.push(wave_id.to_string());
                    }
                    None => {
                        self.transition(wave_id, execution, WaveStatus::Started, |w| {
                            w.status = WaveStatus::Failed;
                            w.detail = Some(
                                "no remote job found for interrupted submission".to_string(),
                            );
                        })?;
                        report.failed.push(wave_id.to_string());
                    }
                }
            }
            Err(e) if e.is_transient() => {
                // Leave the wave for the next tick.
                warn!(wave_id = %wave_id, error = %e, "job reconciliation failed transiently");
            }
            Err(e) => {
                self.transition(wave_id, execution, WaveStatus::Started, |w| {
                    w.status = WaveStatus::Failed;
                    w.detail = Some(format!("job reconciliation failed: {e}"));
                })?;
                report.failed.push(wave_id.to_string());
            }
        }
        Ok(())
    }

    /// Guarded transition; a stale guard means another invocation already
    /// advanced the wave, which is not an error here.
    fn transition<F>(
        &self,
        wave_id: &str,
        execution: &Execution,
        expected: WaveStatus,
        mutate: F,
    ) -> OrchestratorResult<()>
    where
        F: FnOnce(&mut drplan_core::WaveRecord),
    {
        match self
            .store
            .transition_wave(&execution.id, wave_id, expected, mutate)
        {
            Ok(_) => Ok(()),
            Err(StateError::StaleTransition { .. }) => {
                debug!(wave_id = %wave_id, "wave already advanced elsewhere");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mark pending waves FAILED when a dependency reached a terminal
    /// non-success state, repeating until the cascade settles.
    fn cascade_dependency_failures(
        &self,
        plan: &RecoveryPlan,
        execution_id: &str,
    ) -> OrchestratorResult<()> {
        loop {
            let execution = self.load(execution_id)?;
            let doomed: Vec<(WaveId, WaveId)> = plan
                .waves
                .iter()
                .filter(|wave| {
                    execution
                        .wave(&wave.id)
                        .is_some_and(|r| r.status == WaveStatus::Pending)
                })
                .filter_map(|wave| {
                    wave.depends_on
                        .iter()
                        .find(|dep| {
                            execution.wave(dep).is_some_and(|r| {
                                r.status.is_terminal() && !r.status.is_success()
                            })
                        })
                        .map(|dep| (wave.id.clone(), dep.clone()))
                })
                .collect();
            if doomed.is_empty() {
                return Ok(());
            }
            for (wave_id, dep) in doomed {
                warn!(wave_id = %wave_id, dependency = %dep, "dependency unsatisfiable");
                self.transition(&wave_id, &execution, WaveStatus::Pending, |w| {
                    w.status = WaveStatus::Failed;
                    w.detail = Some(format!("dependency '{dep}' did not launch"));
                })?;
            }
        }
    }

    /// Start every wave whose dependencies are satisfied, concurrently
    /// within the layer. The first pending wave demanding a pause parks
    /// the execution and stops the scan, but waves collected before the
    /// park still start this tick.
    async fn start_eligible(
        &self,
        plan: &RecoveryPlan,
        execution: &Execution,
        now: u64,
        report: &mut TickReport,
    ) -> OrchestratorResult<()> {
        let mut to_start: Vec<(Wave, WaveStatus)> = Vec::new();
        'layers: for layer in plan_graph::execution_layers(plan) {
            for wave_id in &layer {
                let Some(wave) = plan.wave(wave_id) else {
                    continue;
                };
                let Some(record) = execution.wave(&wave.id) else {
                    continue;
                };
                let startable = matches!(
                    record.status,
                    WaveStatus::Pending | WaveStatus::WaitingForResume
                );
                if !startable {
                    continue;
                }
                let deps_satisfied = wave.depends_on.iter().all(|dep| {
                    execution
                        .wave(dep)
                        .is_some_and(|r| r.status.is_success())
                });
                if !deps_satisfied {
                    continue;
                }
                // A configured pause fires once: the wave is parked as
                // WAITING_FOR_RESUME, and once the gate is lifted the wave
                // is startable without re-parking.
                if wave.pause_before && record.status == WaveStatus::Pending {
                    let gate = ResumeGate {
                        wave_id: wave.id.clone(),
                        token: Uuid::new_v4().to_string(),
                        paused_at: now,
                    };
                    let wave_id = wave.id.clone();
                    self.store.update_execution(&execution.id, |e| {
                        if let Some(w) = e.wave_mut(&wave_id) {
                            w.status = WaveStatus::WaitingForResume;
                        }
                        e.waiting = Some(gate.clone());
                        Ok(())
                    })?;
                    info!(execution_id = %execution.id, wave_id = %wave_id, "parked before wave");
                    report.parked = Some(wave_id);
                    break 'layers;
                }
                to_start.push((wave.clone(), record.status));
            }
        }

        if to_start.is_empty() {
            return Ok(());
        }

        let mut starts = JoinSet::new();
        for (wave, expected) in to_start {
            let store = self.store.clone();
            let detector = self.detector.clone();
            let factory = self.factory.clone();
            let account_id = self.account_id.clone();
            let execution_id = execution.id.clone();
            let mode = execution.options.mode;
            let policy = self.config.submit_retry;
            starts.spawn(async move {
                let outcome = start_wave(
                    &store,
                    detector.as_ref(),
                    factory,
                    &account_id,
                    &execution_id,
                    &wave,
                    expected,
                    mode,
                    &policy,
                    now,
                )
                .await;
                (wave.id, outcome)
            });
        }
        while let Some(joined) = starts.join_next().await {
            match joined {
                Ok((wave_id, StartOutcome::Started)) => report.started.push(wave_id),
                Ok((wave_id, StartOutcome::Failed)) => report.failed.push(wave_id),
                Ok((_, StartOutcome::Skipped)) => {}
                Err(e) => error!(error = %e, "wave start task panicked"),
            }
        }
        Ok(())
    }
}

enum StartOutcome {
    Started,
    Failed,
    /// Another invocation won the transition guard.
    Skipped,
}

/// Start one wave: re-check conflicts scoped to its current membership,
/// claim it through the status guard, submit the remote job, move to
/// POLLING. Any failure here fails this wave only.
#[allow(clippy::too_many_arguments)]
async fn start_wave(
    store: &StateStore,
    detector: &ConflictDetector,
    factory: Arc<dyn ServiceFactory>,
    account_id: &str,
    execution_id: &str,
    wave: &Wave,
    expected: WaveStatus,
    mode: LaunchMode,
    policy: &RetryPolicy,
    now: u64,
) -> StartOutcome {
    let fail = |detail: String| {
        match store.transition_wave(execution_id, &wave.id, expected, |w| {
            w.status = WaveStatus::Failed;
            w.detail = Some(detail.clone());
        }) {
            Ok(_) => {
                warn!(execution_id = %execution_id, wave_id = %wave.id, %detail, "wave failed to start");
                StartOutcome::Failed
            }
            Err(StateError::StaleTransition { .. }) => StartOutcome::Skipped,
            Err(e) => {
                error!(wave_id = %wave.id, error = %e, "recording wave failure failed");
                StartOutcome::Failed
            }
        }
    };

    let service = match factory.service_for(account_id) {
        Ok(service) => service,
        Err(e) => return fail(format!("remote service unavailable: {e}")),
    };
    let servers = match resolve::resolve_wave(store, service.as_ref(), wave).await {
        Ok(servers) => servers,
        Err(e) => return fail(format!("server resolution failed: {e}")),
    };
    let region = match wave
        .protection_group_ids
        .first()
        .map(|id| resolve::load_group(store, id))
    {
        Some(Ok(group)) => group.region,
        Some(Err(e)) => return fail(format!("group lookup failed: {e}")),
        None => return fail("wave has no protection groups".to_string()),
    };

    // Conflicts may have appeared since the execution was created.
    match detector.check_wave(wave, &servers, execution_id).await {
        Ok(conflicts) if conflicts.is_empty() => {}
        Ok(conflicts) => {
            let first = &conflicts[0];
            return fail(format!(
                "{} server conflict(s), first: {} ({:?})",
                conflicts.len(),
                first.server_id.as_deref().unwrap_or("-"),
                first.source,
            ));
        }
        Err(e) => return fail(format!("conflict check failed: {e}")),
    }

    // Claim the wave. Losing the guard means a concurrent invocation
    // already owns it.
    match store.transition_wave(execution_id, &wave.id, expected, |w| {
        w.status = WaveStatus::Started;
        w.started_at = Some(now);
        w.detail = None;
    }) {
        Ok(_) => {}
        Err(StateError::StaleTransition { .. }) => return StartOutcome::Skipped,
        Err(e) => return fail(format!("claiming wave failed: {e}")),
    }

    match retry::with_backoff(policy, || {
        service.submit_recovery_job(&region, &servers, mode)
    })
    .await
    {
        Ok(job_id) => {
            let statuses: BTreeMap<ServerId, ServerRecord> = servers
                .iter()
                .map(|s| (s.clone(), ServerRecord::pending()))
                .collect();
            match store.transition_wave(execution_id, &wave.id, WaveStatus::Started, |w| {
                w.job_id = Some(job_id.clone());
                w.submitted_at = Some(now);
                w.server_statuses = statuses;
                w.status = WaveStatus::Polling;
            }) {
                Ok(_) => {
                    info!(
                        execution_id = %execution_id,
                        wave_id = %wave.id,
                        job_id = %job_id,
                        servers = servers.len(),
                        "wave submitted"
                    );
                    StartOutcome::Started
                }
                Err(StateError::StaleTransition { .. }) => StartOutcome::Skipped,
                Err(e) => {
                    error!(wave_id = %wave.id, error = %e, "recording submission failed");
                    StartOutcome::Failed
                }
            }
        }
        Err(e) => {
            match store.transition_wave(execution_id, &wave.id, WaveStatus::Started, |w| {
                w.status = WaveStatus::Failed;
                w.detail = Some(format!("job submission failed: {e}"));
            }) {
                Ok(_) => StartOutcome::Failed,
                Err(err) => {
                    error!(wave_id = %wave.id, error = %err, "recording submission failure failed");
                    StartOutcome::Failed
                }
            }
        }
    }
}

/// Terminal outcome for a wave given the remote job's server map, or
/// `None` while the job is still in flight.
fn wave_outcome(
    servers: &BTreeMap<ServerId, ServerRecord>,
    terminal: bool,
    require_full_wave: bool,
) -> Option<(WaveStatus, Option<String>)> {
    let total = servers.len();
    let launched = servers
        .values()
        .filter(|s| s.status == drplan_core::ServerLaunchStatus::Launched)
        .count();
    if total > 0 && launched == total {
        return Some((WaveStatus::Launched, None));
    }
    if !terminal {
        return None;
    }
    let detail = Some(format!("{} of {total} servers launched", launched));
    if launched > 0 && !require_full_wave {
        Some((WaveStatus::Launched, detail))
    } else {
        Some((WaveStatus::Failed, detail))
    }
}

/// Adaptive poll interval for a job of the given age (seconds).
fn poll_interval(age: u64) -> u64 {
    if age < FAST_WINDOW {
        POLL_FAST
    } else if age < MEDIUM_WINDOW {
        POLL_MEDIUM
    } else {
        POLL_SLOW
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
