//! Diff engine for environment secrets.
//!
//! This module computes the batch of secret operations that moves the server
//! from the previous secret list to the desired one. Secret values are never
//! read back from the server, so "previous" is always local knowledge.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::PlanError;
use crate::model::{SecretEntry, SecretKind, ensure_unique_identities};

/// Engine for computing secret operations between desired and previous lists.
#[derive(Debug, Default)]
pub struct SecretDiffEngine;

/// Kind of change applied to a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretAction {
    /// Secret needs to be created.
    Create,
    /// Secret needs to be updated.
    Update,
    /// Secret needs to be deleted.
    Delete,
}

/// A partial secret patch.
///
/// Only the fields relevant to the action are set: creates carry name, kind
/// and value; updates carry the identity and the changed fields; deletes carry
/// the identity and kind.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretOperation {
    /// Target identity.
    pub identity: Option<i64>,
    /// Name, if set or changed.
    pub name: Option<String>,
    /// Kind, if set or changed (always set for deletes).
    pub kind: Option<SecretKind>,
    /// Value, if set or changed.
    pub value: Option<String>,
    /// Action to apply.
    pub action: SecretAction,
}

impl SecretDiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the operations that turn `previous` into `desired`.
    ///
    /// Creates and updates follow the order of `desired`; deletes follow the
    /// order of `previous` and come last.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::DuplicateIdentity`] if two desired entries share
    /// an identity.
    pub fn diff(
        &self,
        desired: &[SecretEntry],
        previous: &[SecretEntry],
    ) -> Result<Vec<SecretOperation>, PlanError> {
        ensure_unique_identities(desired)?;

        let previous_by_id: HashMap<i64, &SecretEntry> = previous
            .iter()
            .filter_map(|s| s.identity.map(|id| (id, s)))
            .collect();

        let mut operations = Vec::new();

        for secret in desired {
            let Some(identity) = secret.identity else {
                debug!("Secret {} ({}) is new", secret.name, secret.kind);
                operations.push(SecretOperation::create(secret));
                continue;
            };

            match previous_by_id.get(&identity) {
                None => {
                    debug!("Secret {identity} is not in previous state, creating");
                    operations.push(SecretOperation::create(secret));
                }
                Some(prev) => {
                    if let Some(update) = SecretOperation::update(identity, secret, prev) {
                        debug!("Secret {identity} changed");
                        operations.push(update);
                    }
                }
            }
        }

        let claimed: HashSet<i64> = desired.iter().filter_map(|s| s.identity).collect();
        for prev in previous {
            match prev.identity {
                Some(identity) if !claimed.contains(&identity) => {
                    debug!("Secret {identity} ({}) removed from configuration", prev.name);
                    operations.push(SecretOperation::delete(identity, prev.kind));
                }
                Some(_) => {}
                None => debug!("Skipping previous secret {} without identity", prev.name),
            }
        }

        Ok(operations)
    }
}

impl SecretOperation {
    /// A create carrying name, kind and value.
    #[must_use]
    pub fn create(secret: &SecretEntry) -> Self {
        Self {
            identity: None,
            name: Some(secret.name.clone()),
            kind: Some(secret.kind),
            value: Some(secret.value.clone()),
            action: SecretAction::Create,
        }
    }

    /// An update carrying only the fields that differ, or `None` if nothing does.
    #[must_use]
    pub fn update(identity: i64, desired: &SecretEntry, previous: &SecretEntry) -> Option<Self> {
        let name = (desired.name != previous.name).then(|| desired.name.clone());
        let kind = (desired.kind != previous.kind).then_some(desired.kind);
        let value = (desired.value != previous.value).then(|| desired.value.clone());

        if name.is_none() && kind.is_none() && value.is_none() {
            return None;
        }

        Some(Self {
            identity: Some(identity),
            name,
            kind,
            value,
            action: SecretAction::Update,
        })
    }

    /// A delete carrying identity and kind only.
    #[must_use]
    pub const fn delete(identity: i64, kind: SecretKind) -> Self {
        Self {
            identity: Some(identity),
            name: None,
            kind: Some(kind),
            value: None,
            action: SecretAction::Delete,
        }
    }

    /// Names of the fields this operation sets, for display.
    #[must_use]
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.kind.is_some() {
            fields.push("type");
        }
        if self.value.is_some() {
            fields.push("value");
        }
        fields
    }
}

impl std::fmt::Debug for SecretOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretOperation")
            .field("identity", &self.identity)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("value", &self.value.as_ref().map(|_| "(sensitive)"))
            .field("action", &self.action)
            .finish()
    }
}

impl std::fmt::Display for SecretAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for SecretOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.action)?;
        if let Some(id) = self.identity {
            write!(f, " #{id}")?;
        }
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        if self.action == SecretAction::Update {
            write!(f, " ({})", self.fields().join(", "))?;
        }
        Ok(())
    }
}
