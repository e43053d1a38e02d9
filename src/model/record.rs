//! Local records for project environments and their secrets.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::PlanError;

use super::attr::Attr;

/// Key/value document used for generic and runtime variables.
pub type VarMap = BTreeMap<String, String>;

/// How a secret is exposed to tasks run in the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SecretKind {
    /// Exposed as a process environment variable.
    #[default]
    #[serde(rename = "env")]
    EnvVar,
    /// Exposed as a file.
    #[serde(rename = "file")]
    File,
}

/// A secret attached to an environment.
///
/// The value is write-only on the server; the local copy is the only source.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    /// Server-assigned identity, absent until the secret is created.
    #[serde(rename = "id", default)]
    pub identity: Option<i64>,
    /// Secret name.
    pub name: String,
    /// Secret kind.
    #[serde(rename = "type")]
    pub kind: SecretKind,
    /// Secret value.
    #[serde(default)]
    pub value: String,
}

/// Local view of a project environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    /// Server-assigned identity.
    #[serde(rename = "id", default)]
    pub identity: Option<i64>,
    /// Identity of the owning project.
    #[serde(rename = "project_id")]
    pub project_identity: i64,
    /// Environment name.
    pub name: String,
    /// Generic (extra) variables.
    #[serde(default)]
    pub generic_variables: Attr<VarMap>,
    /// Runtime environment variables.
    #[serde(default)]
    pub runtime_variables: Attr<VarMap>,
    /// Secrets in identity order.
    #[serde(default)]
    pub secrets: Attr<Vec<SecretEntry>>,
}

impl SecretEntry {
    /// Creates a not-yet-persisted secret.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: SecretKind, value: impl Into<String>) -> Self {
        Self {
            identity: None,
            name: name.into(),
            kind,
            value: value.into(),
        }
    }

    /// Sets the identity.
    #[must_use]
    pub const fn with_identity(mut self, identity: i64) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Returns true if this entry has the given name and kind.
    #[must_use]
    pub fn matches(&self, name: &str, kind: SecretKind) -> bool {
        self.kind == kind && self.name == name
    }
}

impl std::fmt::Debug for SecretEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretEntry")
            .field("identity", &self.identity)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("value", &"(sensitive)")
            .finish()
    }
}

impl EnvironmentRecord {
    /// Creates a record with no variables and no secrets.
    #[must_use]
    pub fn new(project_identity: i64, name: impl Into<String>) -> Self {
        Self {
            identity: None,
            project_identity,
            name: name.into(),
            generic_variables: Attr::Null,
            runtime_variables: Attr::Null,
            secrets: Attr::Null,
        }
    }

    /// The record used as "previous" when nothing is known yet.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(0, "")
    }

    /// Returns the known secrets, or an empty slice.
    #[must_use]
    pub fn secret_list(&self) -> &[SecretEntry] {
        self.secrets.as_value().map(Vec::as_slice).unwrap_or_default()
    }

    /// Finds a secret by identity.
    #[must_use]
    pub fn secret(&self, identity: i64) -> Option<&SecretEntry> {
        self.secret_list()
            .iter()
            .find(|s| s.identity == Some(identity))
    }

    /// Finds the first secret with the given name and kind.
    #[must_use]
    pub fn secret_by_name(&self, name: &str, kind: SecretKind) -> Option<&SecretEntry> {
        self.secret_list().iter().find(|s| s.matches(name, kind))
    }
}

/// Rejects secret lists in which two entries claim the same identity.
///
/// # Errors
///
/// Returns [`PlanError::DuplicateIdentity`] naming the first repeated identity.
pub fn ensure_unique_identities(secrets: &[SecretEntry]) -> Result<(), PlanError> {
    let mut seen = HashSet::new();
    for identity in secrets.iter().filter_map(|s| s.identity) {
        if !seen.insert(identity) {
            return Err(PlanError::DuplicateIdentity { identity });
        }
    }
    Ok(())
}

impl std::fmt::Display for SecretKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::EnvVar => "env",
            Self::File => "file",
        };
        write!(f, "{s}")
    }
}
