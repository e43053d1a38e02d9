//! Identity binding for configured secrets.
//!
//! Configuration rarely names secret identities. Before diffing, each desired
//! secret without one inherits the identity of a previous secret with the same
//! name and kind, so an unchanged secret stays untouched across runs.

use std::collections::HashSet;
use tracing::debug;

use crate::model::SecretEntry;

/// Assigns identities from `previous` to the unpinned entries of `desired`.
///
/// Identities already present in `desired` are claimed first. Each remaining
/// entry takes the first unclaimed previous secret with the same name and kind,
/// in `previous` order.
#[must_use]
pub fn bind_identities(desired: &[SecretEntry], previous: &[SecretEntry]) -> Vec<SecretEntry> {
    let mut claimed: HashSet<i64> = desired.iter().filter_map(|s| s.identity).collect();

    desired
        .iter()
        .map(|secret| {
            if secret.identity.is_some() {
                return secret.clone();
            }

            let candidate = previous.iter().find_map(|prev| match prev.identity {
                Some(id) if !claimed.contains(&id) && prev.matches(&secret.name, secret.kind) => {
                    Some(id)
                }
                _ => None,
            });

            match candidate {
                Some(id) => {
                    debug!("Bound secret {} ({}) to identity {id}", secret.name, secret.kind);
                    claimed.insert(id);
                    secret.clone().with_identity(id)
                }
                None => secret.clone(),
            }
        })
        .collect()
}
