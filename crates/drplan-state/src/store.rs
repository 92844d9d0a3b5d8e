//! StateStore — redb-backed persistence for drplan.
//!
//! Typed CRUD over protection groups, recovery plans, and executions. All
//! values are JSON-serialized into redb's `&[u8]` value columns. Write
//! transactions are serialized by redb, which makes the read-modify-write
//! helpers below atomic without external locking.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use drplan_core::{Execution, ProtectionGroup, RecoveryPlan, WaveRecord, WaveStatus};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PROTECTION_GROUPS).map_err(map_err!(Table))?;
        txn.open_table(RECOVERY_PLANS).map_err(map_err!(Table))?;
        txn.open_table(EXECUTIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Protection groups ──────────────────────────────────────────

    /// Insert a new protection group.
    ///
    /// Rejects the insert when another group already uses the same name
    /// (case-insensitive).
    pub fn create_protection_group(&self, group: &ProtectionGroup) -> StateResult<()> {
        let existing = self.list_protection_groups()?;
        let wanted = group.name.to_lowercase();
        if existing
            .iter()
            .any(|g| g.id != group.id && g.name.to_lowercase() == wanted)
        {
            return Err(StateError::NameTaken(group.name.clone()));
        }
        self.put_json(PROTECTION_GROUPS, &group.id, group)?;
        debug!(group_id = %group.id, name = %group.name, "protection group stored");
        Ok(())
    }

    /// Get a protection group by id.
    pub fn get_protection_group(&self, id: &str) -> StateResult<Option<ProtectionGroup>> {
        self.get_json(PROTECTION_GROUPS, id)
    }

    /// List all protection groups.
    pub fn list_protection_groups(&self) -> StateResult<Vec<ProtectionGroup>> {
        self.list_json(PROTECTION_GROUPS)
    }

    /// Delete a protection group by id. Returns true if it existed.
    ///
    /// A group referenced by any recovery plan cannot be deleted; the
    /// caller gets the referencing plan ids back in the error.
    pub fn delete_protection_group(&self, id: &str) -> StateResult<bool> {
        let referencing = self.plans_referencing(id)?;
        if !referencing.is_empty() {
            return Err(StateError::GroupInUse {
                group_id: id.to_string(),
                plan_ids: referencing,
            });
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(PROTECTION_GROUPS).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(group_id = %id, existed, "protection group deleted");
        Ok(existed)
    }

    /// Ids of plans referencing the given protection group.
    pub fn plans_referencing(&self, group_id: &str) -> StateResult<Vec<String>> {
        let plans = self.list_recovery_plans()?;
        Ok(plans
            .into_iter()
            .filter(|p| {
                p.waves
                    .iter()
                    .any(|w| w.protection_group_ids.iter().any(|g| g == group_id))
            })
            .map(|p| p.id)
            .collect())
    }

    // ── Recovery plans ─────────────────────────────────────────────

    /// Insert a new recovery plan.
    ///
    /// Enforces case-insensitive name uniqueness and that every referenced
    /// protection group exists.
    pub fn create_recovery_plan(&self, plan: &RecoveryPlan) -> StateResult<()> {
        let existing = self.list_recovery_plans()?;
        let wanted = plan.name.to_lowercase();
        if existing
            .iter()
            .any(|p| p.id != plan.id && p.name.to_lowercase() == wanted)
        {
            return Err(StateError::NameTaken(plan.name.clone()));
        }
        for wave in &plan.waves {
            for group_id in &wave.protection_group_ids {
                if self.get_protection_group(group_id)?.is_none() {
                    return Err(StateError::UnknownGroup(group_id.clone()));
                }
            }
        }
        self.put_json(RECOVERY_PLANS, &plan.id, plan)?;
        debug!(plan_id = %plan.id, name = %plan.name, waves = plan.waves.len(), "recovery plan stored");
        Ok(())
    }

    /// Get a recovery plan by id.
    pub fn get_recovery_plan(&self, id: &str) -> StateResult<Option<RecoveryPlan>> {
        self.get_json(RECOVERY_PLANS, id)
    }

    /// List all recovery plans.
    pub fn list_recovery_plans(&self) -> StateResult<Vec<RecoveryPlan>> {
        self.list_json(RECOVERY_PLANS)
    }

    // ── Executions ─────────────────────────────────────────────────

    /// Insert a fresh execution record.
    pub fn put_execution(&self, execution: &Execution) -> StateResult<()> {
        self.put_json(EXECUTIONS, &execution.id, execution)?;
        debug!(execution_id = %execution.id, plan_id = %execution.plan_id, "execution stored");
        Ok(())
    }

    /// Get an execution by id.
    pub fn get_execution(&self, id: &str) -> StateResult<Option<Execution>> {
        self.get_json(EXECUTIONS, id)
    }

    /// List all executions.
    pub fn list_executions(&self) -> StateResult<Vec<Execution>> {
        self.list_json(EXECUTIONS)
    }

    /// List executions that have not reached a terminal status.
    pub fn list_active_executions(&self) -> StateResult<Vec<Execution>> {
        Ok(self
            .list_executions()?
            .into_iter()
            .filter(|e| !e.is_terminal())
            .collect())
    }

    /// Apply a mutation to an execution inside one serialized write
    /// transaction, bumping the record version.
    pub fn update_execution<F>(&self, id: &str, mutate: F) -> StateResult<Execution>
    where
        F: FnOnce(&mut Execution) -> StateResult<()>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(EXECUTIONS).map_err(map_err!(Table))?;
            let mut execution: Execution = match table.get(id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("execution '{id}'"))),
            };
            mutate(&mut execution)?;
            execution.version += 1;
            let value = serde_json::to_vec(&execution).map_err(map_err!(Serialize))?;
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
            updated = execution;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(updated)
    }

    /// Guarded wave transition: the mutation is applied only while the wave
    /// still holds `expected`. Two overlapping orchestrator invocations for
    /// the same wave therefore cannot both submit its remote job.
    pub fn transition_wave<F>(
        &self,
        execution_id: &str,
        wave_id: &str,
        expected: WaveStatus,
        mutate: F,
    ) -> StateResult<Execution>
    where
        F: FnOnce(&mut WaveRecord),
    {
        self.update_execution(execution_id, |execution| {
            let wave = execution
                .wave_mut(wave_id)
                .ok_or_else(|| StateError::NotFound(format!("wave '{wave_id}'")))?;
            if wave.status != expected {
                return Err(StateError::StaleTransition {
                    execution_id: execution_id.to_string(),
                    wave_id: wave_id.to_string(),
                    expected: format!("{expected:?}"),
                    actual: format!("{:?}", wave.status),
                });
            }
            mutate(wave);
            Ok(())
        })
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn put_json<T: serde::Serialize>(
        &self,
        table_def: redb::TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        table_def: redb::TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list_json<T: serde::de::DeserializeOwned>(
        &self,
        table_def: redb::TableDefinition<&str, &[u8]>,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }
}
