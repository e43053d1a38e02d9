//! Semaphore UI API types and data structures.
//!
//! This module defines the request and response bodies of the project
//! environment endpoints.

use serde::{Deserialize, Deserializer, Serialize};

use crate::model::{EnvironmentRecord, SecretKind, vars};
use crate::planner::{SecretAction, SecretOperation};

/// A project environment as returned by the server.
///
/// Secrets never carry values in responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Environment identity.
    pub id: i64,
    /// Owning project identity.
    pub project_id: i64,
    /// Environment name.
    pub name: String,
    /// Generic variables as a JSON object string.
    #[serde(default, deserialize_with = "null_as_default")]
    pub json: String,
    /// Runtime variables as a JSON object string.
    #[serde(default, deserialize_with = "null_as_default")]
    pub env: String,
    /// Secrets, without values.
    #[serde(default, deserialize_with = "null_as_default")]
    pub secrets: Vec<EnvironmentSecret>,
}

/// A secret as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSecret {
    /// Secret identity.
    pub id: i64,
    /// Secret name.
    pub name: String,
    /// Secret kind.
    #[serde(rename = "type")]
    pub kind: SecretKind,
}

/// Body of create and update requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentRequest {
    /// Environment identity, set on update only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Owning project identity.
    pub project_id: i64,
    /// Environment name.
    pub name: String,
    /// Generic variables as a JSON object string.
    pub json: String,
    /// Runtime variables as a JSON object string.
    pub env: String,
    /// Secret operations applied atomically with the request.
    pub secrets: Vec<EnvironmentSecretRequest>,
}

/// One secret operation inside a write request.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentSecretRequest {
    /// Target secret identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Secret name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Secret kind.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<SecretKind>,
    /// Secret value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Operation to perform.
    pub operation: SecretAction,
}

impl EnvironmentRequest {
    /// Builds a write body from a desired record and its secret operations.
    ///
    /// The identity is taken from `record`, so creates (where it is absent)
    /// carry none.
    #[must_use]
    pub fn from_record(record: &EnvironmentRecord, operations: &[SecretOperation]) -> Self {
        Self {
            id: record.identity,
            project_id: record.project_identity,
            name: record.name.clone(),
            json: vars::encode(&record.generic_variables),
            env: vars::encode(&record.runtime_variables),
            secrets: operations.iter().map(EnvironmentSecretRequest::from).collect(),
        }
    }
}

impl From<&SecretOperation> for EnvironmentSecretRequest {
    fn from(op: &SecretOperation) -> Self {
        Self {
            id: op.identity,
            name: op.name.clone(),
            kind: op.kind,
            secret: op.value.clone(),
            operation: op.action,
        }
    }
}

impl std::fmt::Debug for EnvironmentSecretRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentSecretRequest")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("secret", &self.secret.as_ref().map(|_| "(sensitive)"))
            .field("operation", &self.operation)
            .finish()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
