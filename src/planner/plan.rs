//! Environment plan types and construction.
//!
//! A plan compares every configured environment with its record in state and
//! lists the changes that would converge them. Each change carries the secret
//! operations it will submit.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use crate::config::{ConfigHasher, SemaphoreConfig};
use crate::error::{PlanError, Result};
use crate::model::{Attr, EnvironmentRecord};
use crate::state::ProviderState;

use super::bind::bind_identities;
use super::diff::{SecretDiffEngine, SecretOperation};

/// A resolved desired environment.
#[derive(Debug, Clone)]
pub struct DesiredEnvironment {
    /// State address.
    pub address: String,
    /// Desired record with secret values resolved.
    pub record: EnvironmentRecord,
    /// Fingerprint of `record`.
    pub config_hash: String,
}

/// A complete plan.
#[derive(Debug, Serialize)]
pub struct EnvironmentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Planned changes in execution order.
    pub changes: Vec<PlannedChange>,
    /// Addresses that need no change.
    pub unchanged: Vec<String>,
}

/// A single planned change.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedChange {
    /// State address.
    pub address: String,
    /// Change type.
    pub action: ChangeAction,
    /// Reason for this change.
    pub reason: String,
    /// Top-level fields that differ.
    pub changed_fields: Vec<&'static str>,
    /// Human-readable secret operations (never contains values).
    pub secret_changes: Vec<String>,
    /// Record to write, with identities bound.
    #[serde(skip)]
    pub desired: Option<EnvironmentRecord>,
    /// Record currently in state.
    #[serde(skip)]
    pub current: Option<EnvironmentRecord>,
    /// Secret operations that will be submitted.
    #[serde(skip)]
    pub secret_operations: Vec<SecretOperation>,
    /// Fingerprint of the desired configuration.
    #[serde(skip)]
    pub config_hash: String,
}

/// Types of changes in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Create a new environment.
    Create,
    /// Update an environment in place.
    Update,
    /// Delete and recreate (the project changed).
    Replace,
    /// Delete an environment.
    Delete,
}

/// Builds plans from desired environments and state.
#[derive(Debug, Default)]
pub struct Planner {
    differ: SecretDiffEngine,
}

/// Resolves every configured environment.
///
/// # Errors
///
/// Returns an error if a secret value cannot be resolved.
pub fn desired_environments<F>(
    config: &SemaphoreConfig,
    lookup: F,
) -> Result<Vec<DesiredEnvironment>>
where
    F: Fn(&str) -> Option<String>,
{
    let hasher = ConfigHasher::new();
    config
        .environments
        .iter()
        .map(|env| -> Result<DesiredEnvironment> {
            let record = env.to_record(&lookup)?;
            Ok(DesiredEnvironment {
                address: env.address().to_string(),
                config_hash: hasher.hash_record(&record),
                record,
            })
        })
        .collect()
}

impl Planner {
    /// Creates a new planner.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            differ: SecretDiffEngine::new(),
        }
    }

    /// Plans the changes that converge `state` on `desired`.
    ///
    /// Deletes come first, then creates, replaces and updates in
    /// configuration order.
    ///
    /// # Errors
    ///
    /// Returns an error if a desired secret list contains duplicate identities.
    pub fn plan(
        &self,
        desired: &[DesiredEnvironment],
        state: &ProviderState,
    ) -> std::result::Result<EnvironmentPlan, PlanError> {
        let mut changes = Vec::new();
        let mut unchanged = Vec::new();

        let wanted: HashSet<&str> = desired.iter().map(|d| d.address.as_str()).collect();
        for (address, env) in &state.environments {
            if !wanted.contains(address.as_str()) {
                changes.push(PlannedChange::delete(address, &env.record));
            }
        }

        for target in desired {
            match state.record(&target.address) {
                None => changes.push(self.plan_create(target)?),
                Some(current) => match self.plan_existing(target, current)? {
                    Some(change) => changes.push(change),
                    None => {
                        debug!("{} is up to date", target.address);
                        unchanged.push(target.address.clone());
                    }
                },
            }
        }

        Ok(EnvironmentPlan {
            created_at: Utc::now(),
            changes,
            unchanged,
        })
    }

    /// Plans the deletion of every managed environment.
    #[must_use]
    pub fn plan_destroy(&self, state: &ProviderState) -> EnvironmentPlan {
        EnvironmentPlan {
            created_at: Utc::now(),
            changes: state
                .environments
                .iter()
                .map(|(address, env)| PlannedChange::delete(address, &env.record))
                .collect(),
            unchanged: Vec::new(),
        }
    }

    fn plan_create(&self, target: &DesiredEnvironment) -> std::result::Result<PlannedChange, PlanError> {
        let mut record = target.record.clone();
        record.identity = None;
        let operations = self.differ.diff(record.secret_list(), &[])?;

        Ok(PlannedChange::new(
            target,
            ChangeAction::Create,
            String::from("Environment defined in configuration"),
            vec!["name", "project_id", "variables", "env", "secrets"],
            operations,
            record,
            None,
        ))
    }

    fn plan_existing(
        &self,
        target: &DesiredEnvironment,
        current: &EnvironmentRecord,
    ) -> std::result::Result<Option<PlannedChange>, PlanError> {
        if target.record.project_identity != current.project_identity {
            let mut change = self.plan_create(target)?;
            change.action = ChangeAction::Replace;
            change.reason = format!(
                "Project changed from {} to {}",
                current.project_identity, target.record.project_identity
            );
            change.current = Some(current.clone());
            return Ok(Some(change));
        }

        let mut record = target.record.clone();
        record.identity = current.identity;
        if let Attr::Value(secrets) = &record.secrets {
            record.secrets = Attr::Value(bind_identities(secrets, current.secret_list()));
        }

        let operations = self.differ.diff(record.secret_list(), current.secret_list())?;

        let mut changed_fields = Vec::new();
        if record.name != current.name {
            changed_fields.push("name");
        }
        if record.generic_variables != current.generic_variables {
            changed_fields.push("variables");
        }
        if record.runtime_variables != current.runtime_variables {
            changed_fields.push("env");
        }
        if !operations.is_empty() {
            changed_fields.push("secrets");
        }

        if changed_fields.is_empty() {
            return Ok(None);
        }

        let reason = format!("Changed: {}", changed_fields.join(", "));
        Ok(Some(PlannedChange::new(
            target,
            ChangeAction::Update,
            reason,
            changed_fields,
            operations,
            record,
            Some(current.clone()),
        )))
    }
}

impl EnvironmentPlan {
    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of changes.
    #[must_use]
    pub const fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Counts changes of one type.
    #[must_use]
    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    /// Returns the change planned for `address`, if any.
    #[must_use]
    pub fn change_for(&self, address: &str) -> Option<&PlannedChange> {
        self.changes.iter().find(|c| c.address == address)
    }
}

impl PlannedChange {
    fn new(
        target: &DesiredEnvironment,
        action: ChangeAction,
        reason: String,
        changed_fields: Vec<&'static str>,
        secret_operations: Vec<SecretOperation>,
        desired: EnvironmentRecord,
        current: Option<EnvironmentRecord>,
    ) -> Self {
        Self {
            address: target.address.clone(),
            action,
            reason,
            changed_fields,
            secret_changes: secret_operations.iter().map(ToString::to_string).collect(),
            desired: Some(desired),
            current,
            secret_operations,
            config_hash: target.config_hash.clone(),
        }
    }

    fn delete(address: &str, current: &EnvironmentRecord) -> Self {
        Self {
            address: address.to_string(),
            action: ChangeAction::Delete,
            reason: String::from("Environment removed from configuration"),
            changed_fields: Vec::new(),
            secret_changes: Vec::new(),
            desired: None,
            current: Some(current.clone()),
            secret_operations: Vec::new(),
            config_hash: String::new(),
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action, self.address)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for EnvironmentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.changes.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Plan ({} changes):", self.changes.len())?;
        for (i, change) in self.changes.iter().enumerate() {
            writeln!(f, "  {i}. {change}")?;
            for op in &change.secret_changes {
                writeln!(f, "       secret: {op}")?;
            }
        }
        Ok(())
    }
}
