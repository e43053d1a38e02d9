//! Reconstruction of local records from value-less server responses.
//!
//! The server never returns secret values, so every read is merged with the
//! best local knowledge: the previous record (for reads) or the desired record
//! that was just submitted (for creates and updates).

use std::cmp::Ordering;
use tracing::debug;

use crate::semaphore::{Environment, EnvironmentSecret};

use super::attr::Attr;
use super::record::{EnvironmentRecord, SecretEntry};
use super::vars;

/// Orders server secrets by identity, ascending.
#[must_use]
pub fn by_identity(a: &EnvironmentSecret, b: &EnvironmentSecret) -> Ordering {
    a.id.cmp(&b.id)
}

/// Merges a server response with the previous local record.
#[must_use]
pub fn merge_response(server: &Environment, previous: &EnvironmentRecord) -> EnvironmentRecord {
    EnvironmentRecord {
        identity: Some(server.id),
        project_identity: server.project_id,
        name: server.name.clone(),
        generic_variables: vars::decode(&server.json, &previous.generic_variables),
        runtime_variables: vars::decode(&server.env, &previous.runtime_variables),
        secrets: merge_secrets(&server.secrets, previous),
    }
}

fn merge_secrets(server: &[EnvironmentSecret], previous: &EnvironmentRecord) -> Attr<Vec<SecretEntry>> {
    let mut ordered = server.to_vec();
    ordered.sort_by(by_identity);

    let secrets: Vec<SecretEntry> = ordered
        .iter()
        .map(|secret| SecretEntry {
            identity: Some(secret.id),
            name: secret.name.clone(),
            kind: secret.kind,
            value: resolve_value(secret, previous),
        })
        .collect();

    if !secrets.is_empty() {
        return Attr::Value(secrets);
    }

    match &previous.secrets {
        Attr::Value(prev) => {
            debug!("Server returned no secrets, keeping {} previous entries", prev.len());
            Attr::Value(prev.clone())
        }
        Attr::Unset | Attr::Null => Attr::Null,
    }
}

fn resolve_value(secret: &EnvironmentSecret, previous: &EnvironmentRecord) -> String {
    if let Some(prev) = previous.secret(secret.id) {
        return prev.value.clone();
    }
    if let Some(prev) = previous.secret_by_name(&secret.name, secret.kind) {
        debug!("Secret {} ({}) matched by name", secret.id, secret.name);
        return prev.value.clone();
    }
    debug!("No local value for secret {} ({})", secret.id, secret.name);
    String::new()
}
