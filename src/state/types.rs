//! State types for tracking managed environments.
//!
//! State holds the last known full record of every managed environment,
//! secret values included, because the server never returns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::EnvironmentRecord;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept.
const MAX_HISTORY: usize = 100;

/// The complete provider state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderState {
    /// State format version.
    pub version: String,
    /// Managed environments by address.
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentState>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Operation history (recent entries).
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// State of a single managed environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentState {
    /// Address (configuration key).
    pub address: String,
    /// Last known full record.
    pub record: EnvironmentRecord,
    /// Fingerprint of the configuration last applied, empty for imports.
    #[serde(default)]
    pub config_hash: String,
    /// When the environment came under management.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the operation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the operation ran.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: StateOperation,
    /// Addresses affected.
    pub addresses: Vec<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of recorded operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateOperation {
    /// Environment created.
    Create,
    /// Environment updated in place.
    Update,
    /// Environment deleted and recreated.
    Replace,
    /// Environment deleted.
    Delete,
    /// Records re-read from the server.
    Refresh,
    /// Existing environment adopted.
    Import,
    /// Environment forgotten without touching the server.
    Remove,
}

impl ProviderState {
    /// Creates a new empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            environments: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets an environment by address.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&EnvironmentState> {
        self.environments.get(address)
    }

    /// Gets the record of an environment by address.
    #[must_use]
    pub fn record(&self, address: &str) -> Option<&EnvironmentRecord> {
        self.environments.get(address).map(|e| &e.record)
    }

    /// Stores the record for `address`, keeping the creation time if known.
    pub fn set_record(&mut self, address: &str, record: EnvironmentRecord, config_hash: &str) {
        let now = Utc::now();
        let created_at = self
            .environments
            .get(address)
            .map_or(now, |existing| existing.created_at);

        self.environments.insert(
            address.to_string(),
            EnvironmentState {
                address: address.to_string(),
                record,
                config_hash: config_hash.to_string(),
                created_at,
                updated_at: now,
            },
        );
        self.last_updated = now;
    }

    /// Replaces the record for `address` after a read, keeping the fingerprint.
    ///
    /// Returns false if `address` is not tracked.
    pub fn refresh_record(&mut self, address: &str, record: EnvironmentRecord) -> bool {
        let Some(existing) = self.environments.get_mut(address) else {
            return false;
        };
        existing.record = record;
        existing.updated_at = Utc::now();
        self.last_updated = existing.updated_at;
        true
    }

    /// Removes an environment by address.
    pub fn remove(&mut self, address: &str) -> Option<EnvironmentState> {
        let result = self.environments.remove(address);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Adds a history entry, dropping the oldest beyond the cap.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns all addresses in sorted order.
    #[must_use]
    pub fn addresses(&self) -> Vec<&str> {
        self.environments.keys().map(String::as_str).collect()
    }

    /// Returns true if nothing is managed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }
}

impl Default for ProviderState {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: StateOperation, addresses: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            addresses,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(operation: StateOperation, addresses: Vec<String>, error: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            addresses,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for StateOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Refresh => "refresh",
            Self::Import => "import",
            Self::Remove => "remove",
        };
        write!(f, "{op}")
    }
}
