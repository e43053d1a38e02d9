//! Configuration fingerprints for change detection.
//!
//! A fingerprint is taken of each resolved desired environment when it is
//! applied. Comparing it with the current configuration tells whether a
//! difference came from an edit or from a change made on the server.

use sha2::{Digest, Sha256};

use crate::model::{Attr, EnvironmentRecord, VarMap};

/// Hasher for computing configuration fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a desired environment.
    ///
    /// Secret values are included, so a rotated value changes the fingerprint.
    #[must_use]
    pub fn hash_record(&self, record: &EnvironmentRecord) -> String {
        let mut hasher = Sha256::new();

        hasher.update(record.project_identity.to_be_bytes());
        update_str(&mut hasher, &record.name);
        update_map(&mut hasher, &record.generic_variables);
        update_map(&mut hasher, &record.runtime_variables);

        match &record.secrets {
            Attr::Value(secrets) => {
                hasher.update([1u8]);
                hasher.update((secrets.len() as u64).to_be_bytes());
                for secret in secrets {
                    hasher.update(secret.identity.unwrap_or(-1).to_be_bytes());
                    update_str(&mut hasher, &secret.name);
                    update_str(&mut hasher, &secret.kind.to_string());
                    update_str(&mut hasher, &secret.value);
                }
            }
            Attr::Unset | Attr::Null => hasher.update([0u8]),
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes in constant time.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Length-prefixed so that adjacent fields cannot run together.
fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}

fn update_map(hasher: &mut Sha256, map: &Attr<VarMap>) {
    match map {
        Attr::Value(values) => {
            hasher.update([1u8]);
            hasher.update((values.len() as u64).to_be_bytes());
            for (key, value) in values {
                update_str(hasher, key);
                update_str(hasher, value);
            }
        }
        Attr::Unset | Attr::Null => hasher.update([0u8]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SecretEntry, SecretKind};

    fn record() -> EnvironmentRecord {
        let mut record = EnvironmentRecord::new(1, "staging");
        record.secrets = Attr::Value(vec![SecretEntry::new("TOKEN", SecretKind::EnvVar, "abc")]);
        record
    }

    #[test]
    fn test_hash_deterministic() {
        let hasher = ConfigHasher::new();
        assert_eq!(hasher.hash_record(&record()), hasher.hash_record(&record()));
        assert_eq!(hasher.hash_record(&record()).len(), 64);
    }

    #[test]
    fn test_secret_value_changes_hash() {
        let hasher = ConfigHasher::new();
        let mut rotated = record();
        rotated.secrets = Attr::Value(vec![SecretEntry::new("TOKEN", SecretKind::EnvVar, "xyz")]);
        assert_ne!(hasher.hash_record(&record()), hasher.hash_record(&rotated));
    }

    #[test]
    fn test_null_and_empty_map_differ() {
        let hasher = ConfigHasher::new();
        let mut empty = record();
        empty.runtime_variables = Attr::Value(VarMap::new());
        assert_ne!(hasher.hash_record(&record()), hasher.hash_record(&empty));
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");
        assert_eq!(short, "abcdef12");
    }

    #[test]
    fn test_hashes_match() {
        assert!(ConfigHasher::hashes_match("abc123", "abc123"));
        assert!(!ConfigHasher::hashes_match("abc123", "abc124"));
        assert!(!ConfigHasher::hashes_match("abc123", "abc12"));
    }
}
