//! Composite import identifiers.
//!
//! An identifier such as `12/34` (or the labelled `project/12/environment/34`)
//! encodes several numeric identities at once.

use std::collections::BTreeMap;

use crate::error::ImportError;

/// Named numeric fields parsed from a composite identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFields {
    fields: BTreeMap<String, i64>,
}

impl ImportFields {
    /// Returns the identity stored under `label`.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<i64> {
        self.fields.get(label).copied()
    }

    /// Number of parsed fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if nothing was parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parses `raw` into one identity per expected label.
///
/// Accepts either the positional form (one value per label) or the labelled
/// form (label and value alternating, labels in the expected order).
///
/// # Errors
///
/// Returns [`ImportError::MalformedIdentifier`] when the segment count does not
/// fit `labels` or a value is not a non-negative integer.
pub fn parse_import_id(raw: &str, labels: &[&str]) -> Result<ImportFields, ImportError> {
    let segments: Vec<&str> = raw.split('/').collect();

    let values: Vec<&str> = if segments.len() == labels.len() {
        segments
    } else if segments.len() == labels.len() * 2 {
        let mut values = Vec::with_capacity(labels.len());
        for (pair, label) in segments.chunks(2).zip(labels) {
            if pair[0] != *label {
                return Err(ImportError::malformed(raw, pair[0], labels));
            }
            values.push(pair[1]);
        }
        values
    } else {
        return Err(ImportError::malformed(raw, "", labels));
    };

    let mut fields = BTreeMap::new();
    for (label, token) in labels.iter().zip(values) {
        let identity = parse_identity(token).ok_or_else(|| ImportError::malformed(raw, token, labels))?;
        fields.insert((*label).to_string(), identity);
    }

    Ok(ImportFields { fields })
}

fn parse_identity(token: &str) -> Option<i64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
