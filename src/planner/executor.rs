//! Plan executor for applying environment plans.
//!
//! Changes run one at a time. State is updated after every successful change
//! so that a failure part-way through leaves an accurate record of what was
//! done.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{ProviderError, Result};
use crate::model::EnvironmentRecord;
use crate::semaphore::{EnvironmentApi, EnvironmentResource};
use crate::state::{HistoryEntry, ProviderState, StateOperation};

use super::plan::{ChangeAction, EnvironmentPlan, PlannedChange};

/// Executor for environment plans.
#[derive(Debug)]
pub struct PlanExecutor<'a, A> {
    /// Resource handler.
    resource: &'a EnvironmentResource<A>,
    /// Whether to continue on errors.
    continue_on_error: bool,
}

/// Result of executing a single change.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeResult {
    /// State address.
    pub address: String,
    /// Change type.
    pub action: ChangeAction,
    /// Whether the change succeeded.
    pub success: bool,
    /// Server identity after the change, if any.
    pub identity: Option<i64>,
    /// Error message (if failed).
    pub error: Option<String>,
}

/// Result of executing the entire plan.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Individual change results.
    pub results: Vec<ChangeResult>,
    /// Number of successful changes.
    pub successful: usize,
    /// Number of failed changes.
    pub failed: usize,
    /// Number of changes not attempted after a failure.
    pub skipped: usize,
    /// Whether the entire plan succeeded.
    pub success: bool,
}

impl<'a, A: EnvironmentApi> PlanExecutor<'a, A> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(resource: &'a EnvironmentResource<A>) -> Self {
        Self {
            resource,
            continue_on_error: false,
        }
    }

    /// Sets whether to continue on errors.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Executes a plan, recording every change in `state`.
    ///
    /// Failures are reported in the result rather than returned.
    pub async fn execute(&self, plan: &EnvironmentPlan, state: &mut ProviderState) -> ExecutionResult {
        info!("Executing plan with {} changes", plan.changes.len());

        let mut results = Vec::with_capacity(plan.changes.len());

        for change in &plan.changes {
            info!("Applying {change}");
            let outcome = self.apply_change(change, state).await;
            let operation = StateOperation::from(change.action);
            let addresses = vec![change.address.clone()];

            match outcome {
                Ok(identity) => {
                    state.add_history(HistoryEntry::new(operation, addresses));
                    results.push(ChangeResult {
                        address: change.address.clone(),
                        action: change.action,
                        success: true,
                        identity,
                        error: None,
                    });
                }
                Err(e) => {
                    error!("Failed to {} {}: {e}", change.action, change.address);
                    state.add_history(HistoryEntry::failed(operation, addresses, &e.to_string()));
                    results.push(ChangeResult {
                        address: change.address.clone(),
                        action: change.action,
                        success: false,
                        identity: None,
                        error: Some(e.to_string()),
                    });

                    if !self.continue_on_error {
                        break;
                    }
                }
            }
        }

        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;
        ExecutionResult {
            skipped: plan.changes.len() - results.len(),
            successful,
            failed,
            success: failed == 0 && results.len() == plan.changes.len(),
            results,
        }
    }

    async fn apply_change(&self, change: &PlannedChange, state: &mut ProviderState) -> Result<Option<i64>> {
        match change.action {
            ChangeAction::Create => {
                let desired = Self::desired(change)?;
                let record = self.resource.create(desired).await?;
                let identity = record.identity;
                state.set_record(&change.address, record, &change.config_hash);
                Ok(identity)
            }
            ChangeAction::Update => {
                let desired = Self::desired(change)?;
                let current = Self::current(change)?;
                let record = self.resource.update(desired, current).await?;
                let identity = record.identity;
                state.set_record(&change.address, record, &change.config_hash);
                Ok(identity)
            }
            ChangeAction::Replace => {
                let desired = Self::desired(change)?;
                self.delete(change, state).await?;
                let record = self.resource.create(desired).await?;
                let identity = record.identity;
                state.set_record(&change.address, record, &change.config_hash);
                Ok(identity)
            }
            ChangeAction::Delete => {
                self.delete(change, state).await?;
                Ok(None)
            }
        }
    }

    /// Deletes the current record; an environment already gone counts as deleted.
    async fn delete(&self, change: &PlannedChange, state: &mut ProviderState) -> Result<()> {
        let current = Self::current(change)?;
        match self.resource.delete(current).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!("{} was already deleted on the server", change.address);
            }
            Err(e) => return Err(e),
        }
        state.remove(&change.address);
        Ok(())
    }

    fn desired(change: &PlannedChange) -> Result<&EnvironmentRecord> {
        change
            .desired
            .as_ref()
            .ok_or_else(|| ProviderError::internal(format!("No desired record for {}", change.address)))
    }

    fn current(change: &PlannedChange) -> Result<&EnvironmentRecord> {
        change
            .current
            .as_ref()
            .ok_or_else(|| ProviderError::internal(format!("No current record for {}", change.address)))
    }
}

impl From<ChangeAction> for StateOperation {
    fn from(action: ChangeAction) -> Self {
        match action {
            ChangeAction::Create => Self::Create,
            ChangeAction::Update => Self::Update,
            ChangeAction::Replace => Self::Replace,
            ChangeAction::Delete => Self::Delete,
        }
    }
}

impl ExecutionResult {
    /// Returns the number of attempted changes.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.results.len()
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Applied {} changes: {} successful, {} failed, {} skipped",
            self.attempted(),
            self.successful,
            self.failed,
            self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::model::{Attr, SecretEntry, SecretKind};
    use crate::planner::{DesiredEnvironment, Planner};
    use crate::semaphore::{Environment, EnvironmentSecret, MockEnvironmentApi};

    fn server_env(id: i64, project_id: i64, name: &str, secrets: Vec<EnvironmentSecret>) -> Environment {
        Environment {
            id,
            project_id,
            name: name.to_string(),
            json: String::from("{}"),
            env: String::from("{}"),
            secrets,
        }
    }

    fn desired(address: &str, project: i64) -> DesiredEnvironment {
        let mut record = EnvironmentRecord::new(project, address);
        record.secrets = Attr::Value(vec![SecretEntry::new("TOKEN", SecretKind::EnvVar, "abc")]);
        DesiredEnvironment {
            address: address.to_string(),
            record,
            config_hash: String::from("hash-1"),
        }
    }

    #[tokio::test]
    async fn test_create_records_state_and_history() {
        let mut api = MockEnvironmentApi::new();
        api.expect_create_environment()
            .times(1)
            .returning(|_| Ok(server_env(7, 1, "staging", vec![])));
        api.expect_get_environment().times(1).returning(|_, _| {
            Ok(server_env(
                7,
                1,
                "staging",
                vec![EnvironmentSecret {
                    id: 3,
                    name: String::from("TOKEN"),
                    kind: SecretKind::EnvVar,
                }],
            ))
        });
        let resource = EnvironmentResource::new(api);

        let mut state = ProviderState::new();
        let plan = Planner::new().plan(&[desired("staging", 1)], &state).unwrap();
        let result = PlanExecutor::new(&resource).execute(&plan, &mut state).await;

        assert!(result.success);
        assert_eq!(result.results[0].identity, Some(7));
        let env = state.get("staging").unwrap();
        assert_eq!(env.config_hash, "hash-1");
        assert_eq!(env.record.secret(3).unwrap().value, "abc");
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].operation, StateOperation::Create);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let mut api = MockEnvironmentApi::new();
        api.expect_create_environment()
            .times(1)
            .returning(|_| Err(ApiError::request_failed(500, "boom").into()));
        let resource = EnvironmentResource::new(api);

        let mut state = ProviderState::new();
        let plan = Planner::new()
            .plan(&[desired("a", 1), desired("b", 1)], &state)
            .unwrap();
        let result = PlanExecutor::new(&resource).execute(&plan, &mut state).await;

        assert!(!result.success);
        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 1);
        assert!(state.is_empty());
        assert!(!state.history[0].success);
    }

    #[tokio::test]
    async fn test_continue_on_error() {
        let mut api = MockEnvironmentApi::new();
        api.expect_create_environment()
            .times(2)
            .returning(|req| {
                if req.name == "a" {
                    Err(ApiError::request_failed(500, "boom").into())
                } else {
                    Ok(server_env(8, 1, "b", vec![]))
                }
            });
        api.expect_get_environment()
            .returning(|_, _| Ok(server_env(8, 1, "b", vec![])));
        let resource = EnvironmentResource::new(api);

        let mut state = ProviderState::new();
        let plan = Planner::new()
            .plan(&[desired("a", 1), desired("b", 1)], &state)
            .unwrap();
        let result = PlanExecutor::new(&resource)
            .with_continue_on_error(true)
            .execute(&plan, &mut state)
            .await;

        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(state.addresses(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_environment() {
        let mut api = MockEnvironmentApi::new();
        api.expect_delete_environment().times(1).returning(|_, _| {
            Err(ApiError::NotFound {
                path: String::from("/project/1/environment/5"),
            }
            .into())
        });
        let resource = EnvironmentResource::new(api);

        let mut current = EnvironmentRecord::new(1, "old");
        current.identity = Some(5);
        let mut state = ProviderState::new();
        state.set_record("old", current, "");

        let plan = Planner::new().plan(&[], &state).unwrap();
        let result = PlanExecutor::new(&resource).execute(&plan, &mut state).await;

        assert!(result.success);
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_replace_deletes_then_creates() {
        let mut api = MockEnvironmentApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_delete_environment()
            .withf(|project, id| *project == 1 && *id == 5)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        api.expect_create_environment()
            .withf(|req| req.project_id == 2)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(server_env(9, 2, "staging", vec![])));
        api.expect_get_environment()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(server_env(9, 2, "staging", vec![])));
        let resource = EnvironmentResource::new(api);

        let mut current = EnvironmentRecord::new(1, "staging");
        current.identity = Some(5);
        let mut state = ProviderState::new();
        state.set_record("staging", current, "");

        let plan = Planner::new().plan(&[desired("staging", 2)], &state).unwrap();
        let result = PlanExecutor::new(&resource).execute(&plan, &mut state).await;

        assert!(result.success);
        assert_eq!(state.record("staging").unwrap().identity, Some(9));
        assert_eq!(state.history[0].operation, StateOperation::Replace);
    }
}
