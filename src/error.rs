//! Error types for the Semaphore UI provider.
//!
//! This module provides the error hierarchy for every stage of an environment's
//! lifecycle: configuration, state management, the Semaphore UI API, planning,
//! import and reconciliation.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Semaphore UI API errors.
    #[error("Semaphore UI API error: {0}")]
    Api(#[from] ApiError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Import identifier errors.
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A provider setting is missing or empty.
    #[error("Missing provider setting `{setting}`: set it in the configuration or use the {env_var} environment variable")]
    MissingSetting {
        /// Configuration key.
        setting: String,
        /// Environment variable that can supply it.
        env_var: String,
    },

    /// The API base URL is not a valid URL.
    #[error("Invalid Semaphore UI API base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Reading or writing the state backend failed.
    #[error("State storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// The requested resource address is not tracked in state.
    #[error("No resource '{address}' in state")]
    UnknownAddress {
        /// Resource address (configuration name).
        address: String,
    },

    /// The resource address is already tracked in state.
    #[error("Resource '{address}' is already managed in state")]
    AddressInUse {
        /// Resource address (configuration name).
        address: String,
    },

    /// The lock on disk is not the one the caller asked to release.
    #[error("Lock {requested} is not held; current lock is {current}")]
    LockMismatch {
        /// Lock id supplied by the caller.
        requested: String,
        /// Lock id found in the backend.
        current: String,
    },
}

/// Semaphore UI API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failed.
    #[error("Semaphore UI authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("Semaphore UI API request failed: {status} - {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Rate limited.
    #[error("Semaphore UI API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The requested object does not exist.
    #[error("Not found: {path}")]
    NotFound {
        /// Request path that returned 404.
        path: String,
    },

    /// Network error.
    #[error("Network error communicating with Semaphore UI: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from Semaphore UI API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Two desired secret entries claim the same identity.
    #[error("Duplicate secret identity {identity} in desired configuration")]
    DuplicateIdentity {
        /// The duplicated identity.
        identity: i64,
    },

    /// An update was planned for a record that has no identity.
    #[error("Cannot update '{name}': the environment has no identity yet")]
    MissingIdentity {
        /// Environment name.
        name: String,
    },
}

/// Import identifier errors.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The composite identifier could not be parsed.
    #[error("Malformed identifier '{raw}': invalid segment '{token}', expected \"{pattern}\"")]
    MalformedIdentifier {
        /// The raw identifier as given.
        raw: String,
        /// The offending token (empty when the segment count is wrong).
        token: String,
        /// Expected pattern, e.g. `project/environment`.
        pattern: String,
    },
}

/// Resource operation kinds, used to give API failures context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOperation {
    /// Creating a resource.
    Create,
    /// Reading a resource.
    Read,
    /// Updating a resource.
    Update,
    /// Deleting a resource.
    Delete,
    /// Importing a resource.
    Import,
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A remote operation on a resource failed.
    #[error("Could not {operation} {resource}: {source}")]
    OperationFailed {
        /// Resource kind, e.g. `project environment`.
        resource: &'static str,
        /// Operation that failed.
        operation: ResourceOperation,
        /// Underlying failure.
        #[source]
        source: Box<ProviderError>,
    },

    /// Reconciliation finished with failed changes.
    #[error("{failed} of {total} changes failed")]
    ChangesFailed {
        /// Number of failed changes.
        failed: usize,
        /// Number of attempted changes.
        total: usize,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Api(ApiError::RateLimited { .. } | ApiError::NetworkError { .. })
                | Self::State(StateError::LockFailed { .. })
        )
    }

    /// Returns the wait the server asked for before retrying, if any.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Api(ApiError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Returns true if the server reported the object as missing.
    ///
    /// Looks through operation context added by the resource handlers.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api(ApiError::NotFound { .. }) => true,
            Self::Reconcile(ReconcileError::OperationFailed { source, .. }) => source.is_not_found(),
            _ => false,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Creates an API request error.
    #[must_use]
    pub fn request_failed(status: u16, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}

impl ImportError {
    /// Creates a malformed identifier error.
    #[must_use]
    pub fn malformed(raw: &str, token: &str, labels: &[&str]) -> Self {
        Self::MalformedIdentifier {
            raw: raw.to_string(),
            token: token.to_string(),
            pattern: labels.join("/"),
        }
    }
}

impl ReconcileError {
    /// Wraps a failure with the resource kind and operation it belongs to.
    #[must_use]
    pub fn operation(
        resource: &'static str,
        operation: ResourceOperation,
        source: ProviderError,
    ) -> Self {
        Self::OperationFailed {
            resource,
            operation,
            source: Box::new(source),
        }
    }
}

impl std::fmt::Display for ResourceOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_seen_through_context() {
        let err = ProviderError::from(ReconcileError::operation(
            "project environment",
            ResourceOperation::Read,
            ApiError::NotFound {
                path: String::from("/project/1/environment/2"),
            }
            .into(),
        ));
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_operation_context_in_message() {
        let err = ReconcileError::operation(
            "project environment",
            ResourceOperation::Create,
            ApiError::request_failed(500, "boom").into(),
        );
        let message = err.to_string();
        assert!(message.starts_with("Could not create project environment"));
        assert!(message.contains("500"));
    }

    #[test]
    fn test_malformed_identifier_message() {
        let err = ImportError::malformed("abc/34", "abc", &["project", "environment"]);
        assert_eq!(
            err.to_string(),
            "Malformed identifier 'abc/34': invalid segment 'abc', expected \"project/environment\""
        );
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        let err = ProviderError::from(ApiError::RateLimited {
            retry_after_secs: 7,
        });
        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_secs(), Some(7));

        let err = ProviderError::from(ApiError::network("reset"));
        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_secs(), None);
    }
}
