//! Reconciler for maintaining desired state.
//!
//! Ties the state store, the planner and the environment resource together.
//! Every command that writes state holds the state lock for its duration.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ConfigHasher;
use crate::error::{ProviderError, ReconcileError, Result, StateError};
use crate::model::EnvironmentRecord;
use crate::planner::{DesiredEnvironment, EnvironmentPlan, ExecutionResult, PlanExecutor, Planner};
use crate::semaphore::{EnvironmentApi, EnvironmentResource};
use crate::state::{HistoryEntry, LockInfo, ProviderState, StateOperation, StateStore};

/// Reconciler for managed environments.
#[derive(Debug)]
pub struct Reconciler<'a, S, A> {
    /// State store.
    store: &'a S,
    /// Environment resource handler.
    resource: &'a EnvironmentResource<A>,
    /// Plan builder.
    planner: Planner,
    /// Whether to continue past failed changes.
    continue_on_error: bool,
}

/// Result of re-reading tracked environments.
#[derive(Debug, Default, Serialize)]
pub struct RefreshReport {
    /// Addresses read successfully.
    pub refreshed: Vec<String>,
    /// Addresses whose server record differed from state.
    pub changed: Vec<String>,
    /// Addresses dropped because the server no longer has them.
    pub removed: Vec<String>,
}

/// Result of an apply or destroy run.
#[derive(Debug, Serialize)]
pub struct ApplyReport {
    /// The plan that was shown.
    pub plan: EnvironmentPlan,
    /// Execution outcome, `None` when nothing ran.
    pub execution: Option<ExecutionResult>,
}

/// Report of drift detection.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Environments changed on the server since the last write.
    pub remote_changes: Vec<String>,
    /// Environments deleted on the server.
    pub missing: Vec<String>,
    /// Environments whose configuration changed since the last apply.
    pub config_changes: Vec<String>,
    /// Changes an apply would make.
    pub plan: EnvironmentPlan,
}

impl<'a, S: StateStore, A: EnvironmentApi> Reconciler<'a, S, A> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(store: &'a S, resource: &'a EnvironmentResource<A>) -> Self {
        Self {
            store,
            resource,
            planner: Planner::new(),
            continue_on_error: false,
        }
    }

    /// Sets whether apply continues past failed changes.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Plans changes against freshly read server records.
    ///
    /// Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be loaded, a read fails or the desired
    /// secrets are inconsistent.
    pub async fn plan(&self, desired: &[DesiredEnvironment]) -> Result<EnvironmentPlan> {
        let mut state = self.load().await?;
        self.refresh_state(&mut state).await?;
        Ok(self.planner.plan(desired, &state)?)
    }

    /// Refreshes, plans and, if `confirm` accepts the plan, applies it.
    ///
    /// State is saved after execution even when changes fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, a read fails, planning
    /// fails or state cannot be saved.
    pub async fn apply_with<F>(&self, desired: &[DesiredEnvironment], confirm: F) -> Result<ApplyReport>
    where
        F: FnOnce(&EnvironmentPlan) -> bool + Send,
    {
        let lock = self.store.acquire_lock("", "apply").await?;
        let result = self.apply_locked(desired, confirm).await;
        self.release(&lock).await;
        result
    }

    async fn apply_locked<F>(&self, desired: &[DesiredEnvironment], confirm: F) -> Result<ApplyReport>
    where
        F: FnOnce(&EnvironmentPlan) -> bool + Send,
    {
        let mut state = self.load().await?;
        self.refresh_state(&mut state).await?;

        let plan = self.planner.plan(desired, &state)?;
        self.execute(plan, state, confirm).await
    }

    /// Deletes every managed environment if `confirm` accepts the plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken or state cannot be saved.
    pub async fn destroy_with<F>(&self, confirm: F) -> Result<ApplyReport>
    where
        F: FnOnce(&EnvironmentPlan) -> bool + Send,
    {
        let lock = self.store.acquire_lock("", "destroy").await?;
        let result = self.destroy_locked(confirm).await;
        self.release(&lock).await;
        result
    }

    async fn destroy_locked<F>(&self, confirm: F) -> Result<ApplyReport>
    where
        F: FnOnce(&EnvironmentPlan) -> bool + Send,
    {
        let state = self.load().await?;
        let plan = self.planner.plan_destroy(&state);
        self.execute(plan, state, confirm).await
    }

    async fn execute<F>(&self, plan: EnvironmentPlan, mut state: ProviderState, confirm: F) -> Result<ApplyReport>
    where
        F: FnOnce(&EnvironmentPlan) -> bool,
    {
        if plan.is_empty() {
            info!("No changes required");
            self.store.save(&state).await?;
            return Ok(ApplyReport { plan, execution: None });
        }

        if !confirm(&plan) {
            info!("Plan not confirmed, nothing applied");
            return Ok(ApplyReport { plan, execution: None });
        }

        let execution = PlanExecutor::new(self.resource)
            .with_continue_on_error(self.continue_on_error)
            .execute(&plan, &mut state)
            .await;
        self.store.save(&state).await?;

        info!("{execution}");
        Ok(ApplyReport {
            plan,
            execution: Some(execution),
        })
    }

    /// Re-reads every tracked environment and saves the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, a read fails or state
    /// cannot be saved.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let lock = self.store.acquire_lock("", "refresh").await?;
        let result = self.refresh_locked().await;
        self.release(&lock).await;
        result
    }

    async fn refresh_locked(&self) -> Result<RefreshReport> {
        let mut state = self.load().await?;
        let report = self.refresh_state(&mut state).await?;
        state.add_history(HistoryEntry::new(
            StateOperation::Refresh,
            report.refreshed.clone(),
        ));
        self.store.save(&state).await?;
        Ok(report)
    }

    /// Adopts an existing environment under `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if `address` is already tracked, the identifier is
    /// malformed or the read fails.
    pub async fn import(&self, address: &str, raw_id: &str) -> Result<EnvironmentRecord> {
        let lock = self.store.acquire_lock("", "import").await?;
        let result = self.import_locked(address, raw_id).await;
        self.release(&lock).await;
        result
    }

    async fn import_locked(&self, address: &str, raw_id: &str) -> Result<EnvironmentRecord> {
        let mut state = self.load().await?;
        if state.get(address).is_some() {
            return Err(StateError::AddressInUse {
                address: address.to_string(),
            }
            .into());
        }

        let record = self.resource.import(raw_id).await?;
        info!("Imported {raw_id} as {address}");
        state.set_record(address, record.clone(), "");
        state.add_history(HistoryEntry::new(
            StateOperation::Import,
            vec![address.to_string()],
        ));
        self.store.save(&state).await?;
        Ok(record)
    }

    /// Compares configuration, state and the server without writing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be loaded, a read fails or planning
    /// fails.
    pub async fn check_drift(&self, desired: &[DesiredEnvironment]) -> Result<DriftReport> {
        let mut state = self.load().await?;
        let refresh = self.refresh_state(&mut state).await?;

        let config_changes = desired
            .iter()
            .filter(|d| {
                state
                    .get(&d.address)
                    .is_some_and(|env| !ConfigHasher::hashes_match(&env.config_hash, &d.config_hash))
            })
            .map(|d| d.address.clone())
            .collect();

        let plan = self.planner.plan(desired, &state)?;

        Ok(DriftReport {
            remote_changes: refresh.changed,
            missing: refresh.removed,
            config_changes,
            plan,
        })
    }

    async fn load(&self) -> Result<ProviderState> {
        Ok(self.store.load().await?.unwrap_or_default())
    }

    async fn release(&self, lock: &LockInfo) {
        if let Err(e) = self.store.release_lock(&lock.lock_id).await {
            warn!("Failed to release state lock {}: {e}", lock.lock_id);
        }
    }

    async fn refresh_state(&self, state: &mut ProviderState) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();
        let addresses: Vec<String> = state.addresses().into_iter().map(String::from).collect();

        for address in addresses {
            let Some(current) = state.record(&address).cloned() else {
                continue;
            };

            match self.resource.read(&current).await {
                Ok(record) => {
                    if record != current {
                        debug!("{address} changed on the server");
                        report.changed.push(address.clone());
                    }
                    state.refresh_record(&address, record);
                    report.refreshed.push(address);
                }
                Err(e) if e.is_not_found() => {
                    warn!("{address} no longer exists on the server, dropping it from state");
                    state.remove(&address);
                    report.removed.push(address);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }
}

/// Stops tracking `address` without touching the server.
///
/// # Errors
///
/// Returns an error if the lock cannot be taken, `address` is not tracked or
/// state cannot be saved.
pub async fn forget<S: StateStore>(store: &S, address: &str) -> Result<EnvironmentRecord> {
    let lock = store.acquire_lock("", "state rm").await?;
    let result = forget_locked(store, address).await;
    if let Err(e) = store.release_lock(&lock.lock_id).await {
        warn!("Failed to release state lock {}: {e}", lock.lock_id);
    }
    result
}

async fn forget_locked<S: StateStore>(store: &S, address: &str) -> Result<EnvironmentRecord> {
    let mut state = store.load().await?.unwrap_or_default();
    let removed = state.remove(address).ok_or_else(|| StateError::UnknownAddress {
        address: address.to_string(),
    })?;
    state.add_history(HistoryEntry::new(
        StateOperation::Remove,
        vec![address.to_string()],
    ));
    store.save(&state).await?;
    Ok(removed.record)
}

/// Releases the lock held under `lock_id`.
///
/// Unlike the release done after each operation, a different lock on disk is
/// an error rather than a warning. Returns `None` when state was not locked.
///
/// # Errors
///
/// Returns `LockMismatch` if another lock is held, or an error if the backend
/// cannot be read or written.
pub async fn unlock<S: StateStore>(store: &S, lock_id: &str) -> Result<Option<LockInfo>> {
    let Some(current) = store.get_lock_info().await? else {
        return Ok(None);
    };
    if current.lock_id != lock_id {
        return Err(StateError::LockMismatch {
            requested: lock_id.to_string(),
            current: current.lock_id,
        }
        .into());
    }
    store.release_lock(lock_id).await?;
    Ok(Some(current))
}

impl ApplyReport {
    /// Converts failed changes into an error.
    ///
    /// # Errors
    ///
    /// Returns `ChangesFailed` if any change failed.
    pub fn into_result(self) -> Result<Self> {
        match &self.execution {
            Some(execution) if !execution.success => {
                Err(ProviderError::Reconcile(ReconcileError::ChangesFailed {
                    failed: execution.failed,
                    total: self.plan.change_count(),
                }))
            }
            _ => Ok(self),
        }
    }
}

impl DriftReport {
    /// Returns true if configuration, state and server all agree.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.remote_changes.is_empty()
            && self.missing.is_empty()
            && self.config_changes.is_empty()
            && self.plan.is_empty()
    }
}

impl std::fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Refreshed {} environments: {} changed, {} removed",
            self.refreshed.len(),
            self.changed.len(),
            self.removed.len()
        )
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_converged() {
            return write!(f, "No drift detected - state is converged");
        }

        writeln!(f, "Drift detected:")?;
        for address in &self.remote_changes {
            writeln!(f, "  ~ {address} (changed on server)")?;
        }
        for address in &self.missing {
            writeln!(f, "  - {address} (missing on server)")?;
        }
        for address in &self.config_changes {
            writeln!(f, "  * {address} (configuration changed)")?;
        }
        write!(f, "{}", self.plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::model::{Attr, SecretEntry, SecretKind};
    use crate::semaphore::{Environment, EnvironmentSecret, MockEnvironmentApi};
    use crate::state::LocalStateStore;
    use tempfile::TempDir;

    fn server_env(id: i64, name: &str, secrets: Vec<EnvironmentSecret>) -> Environment {
        Environment {
            id,
            project_id: 1,
            name: name.to_string(),
            json: String::from("{}"),
            env: String::from("{}"),
            secrets,
        }
    }

    fn token_secret(id: i64) -> EnvironmentSecret {
        EnvironmentSecret {
            id,
            name: String::from("TOKEN"),
            kind: SecretKind::EnvVar,
        }
    }

    fn desired(name: &str, value: &str) -> DesiredEnvironment {
        let mut record = EnvironmentRecord::new(1, name);
        record.secrets = Attr::Value(vec![SecretEntry::new("TOKEN", SecretKind::EnvVar, value)]);
        DesiredEnvironment {
            address: name.to_string(),
            record,
            config_hash: format!("hash-{value}"),
        }
    }

    async fn seeded_store(dir: &TempDir) -> LocalStateStore {
        let store = LocalStateStore::with_base_dir(dir.path());
        let mut record = EnvironmentRecord::new(1, "staging");
        record.identity = Some(7);
        record.generic_variables = Attr::Null;
        record.runtime_variables = Attr::Null;
        record.secrets = Attr::Value(vec![
            SecretEntry::new("TOKEN", SecretKind::EnvVar, "old").with_identity(3),
        ]);
        let mut state = ProviderState::new();
        state.set_record("staging", record, "hash-old");
        store.save(&state).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_apply_updates_secret_and_saves() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;

        let mut api = MockEnvironmentApi::new();
        api.expect_get_environment()
            .returning(|_, _| Ok(server_env(7, "staging", vec![token_secret(3)])));
        api.expect_update_environment()
            .withf(|id, req| {
                *id == 7
                    && req.secrets.len() == 1
                    && req.secrets[0].id == Some(3)
                    && req.secrets[0].secret.as_deref() == Some("new")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let resource = EnvironmentResource::new(api);

        let report = Reconciler::new(&store, &resource)
            .apply_with(&[desired("staging", "new")], |_| true)
            .await
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(report.plan.change_count(), 1);
        let state = store.load().await.unwrap().unwrap();
        let env = state.get("staging").unwrap();
        assert_eq!(env.record.secret(3).unwrap().value, "new");
        assert_eq!(env.config_hash, "hash-new");
        assert!(store.get_lock_info().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_not_confirmed_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;

        let mut api = MockEnvironmentApi::new();
        api.expect_get_environment()
            .returning(|_, _| Ok(server_env(7, "staging", vec![token_secret(3)])));
        api.expect_update_environment().never();
        let resource = EnvironmentResource::new(api);

        let report = Reconciler::new(&store, &resource)
            .apply_with(&[desired("staging", "new")], |_| false)
            .await
            .unwrap();

        assert!(report.execution.is_none());
        let state = store.load().await.unwrap().unwrap();
        assert_eq!(state.record("staging").unwrap().secret(3).unwrap().value, "old");
    }

    #[tokio::test]
    async fn test_failed_changes_become_error() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(dir.path());

        let mut api = MockEnvironmentApi::new();
        api.expect_create_environment()
            .returning(|_| Err(ApiError::request_failed(500, "boom").into()));
        let resource = EnvironmentResource::new(api);

        let err = Reconciler::new(&store, &resource)
            .apply_with(&[desired("staging", "v")], |_| true)
            .await
            .unwrap()
            .into_result()
            .unwrap_err();

        assert!(matches!(
            err,
            ProviderError::Reconcile(ReconcileError::ChangesFailed { failed: 1, total: 1 })
        ));
        assert!(store.get_lock_info().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_drops_missing_environment() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;

        let mut api = MockEnvironmentApi::new();
        api.expect_get_environment().returning(|_, _| {
            Err(ApiError::NotFound {
                path: String::from("/project/1/environment/7"),
            }
            .into())
        });
        let resource = EnvironmentResource::new(api);

        let report = Reconciler::new(&store, &resource).refresh().await.unwrap();

        assert_eq!(report.removed, vec!["staging"]);
        assert!(store.load().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_rejects_tracked_address() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;
        let resource = EnvironmentResource::new(MockEnvironmentApi::new());

        let err = Reconciler::new(&store, &resource)
            .import("staging", "1/7")
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::State(StateError::AddressInUse { .. })));
    }

    #[tokio::test]
    async fn test_import_adopts_environment() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(dir.path());

        let mut api = MockEnvironmentApi::new();
        api.expect_get_environment()
            .withf(|project, id| *project == 1 && *id == 7)
            .returning(|_, _| Ok(server_env(7, "staging", vec![token_secret(3)])));
        let resource = EnvironmentResource::new(api);

        let record = Reconciler::new(&store, &resource)
            .import("prod", "1/7")
            .await
            .unwrap();

        assert_eq!(record.secret(3).unwrap().value, "");
        let state = store.load().await.unwrap().unwrap();
        assert_eq!(state.record("prod").unwrap().identity, Some(7));
        assert_eq!(state.history[0].operation, StateOperation::Import);
    }

    #[tokio::test]
    async fn test_forget_unknown_address() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;

        let err = forget(&store, "prod").await.unwrap_err();
        assert!(matches!(err, ProviderError::State(StateError::UnknownAddress { .. })));

        forget(&store, "staging").await.unwrap();
        assert!(store.get_lock_info().await.unwrap().is_none());
        assert!(store.load().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unlock_rejects_foreign_lock_id() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::with_base_dir(dir.path());

        assert!(unlock(&store, "missing").await.unwrap().is_none());

        let lock = store.acquire_lock("ci", "manual").await.unwrap();
        let err = unlock(&store, "wrong-id").await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::State(StateError::LockMismatch { ref current, .. }) if *current == lock.lock_id
        ));
        assert!(store.get_lock_info().await.unwrap().is_some());

        let released = unlock(&store, &lock.lock_id).await.unwrap().unwrap();
        assert_eq!(released.holder, "ci");
        assert!(store.get_lock_info().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_drift_reports_remote_rename() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;

        let mut api = MockEnvironmentApi::new();
        api.expect_get_environment()
            .returning(|_, _| Ok(server_env(7, "renamed", vec![token_secret(3)])));
        let resource = EnvironmentResource::new(api);

        let report = Reconciler::new(&store, &resource)
            .check_drift(&[desired("staging", "old")])
            .await
            .unwrap();

        assert_eq!(report.remote_changes, vec!["staging"]);
        assert!(report.missing.is_empty());
        assert!(report.config_changes.is_empty());
        assert_eq!(report.plan.change_count(), 1);
        assert!(!report.is_converged());
    }
}
