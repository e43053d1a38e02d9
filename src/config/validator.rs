//! Configuration validation.
//!
//! This module checks a parsed configuration before any network call, so that
//! mistakes such as a duplicated secret identity never reach the server.

use crate::error::{ConfigError, PlanError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{EnvironmentConfig, SecretConfig, SemaphoreConfig};

/// Validator for provider configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found; warnings are returned in the result.
    pub fn validate(&self, config: &SemaphoreConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }
            .into())
        }
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &SemaphoreConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if config.provider.tls_skip_verify == Some(true) {
            result
                .warnings
                .push(String::from("TLS certificate verification is disabled"));
        }

        if config.environments.is_empty() {
            result
                .warnings
                .push(String::from("No environments defined in configuration"));
            return result;
        }

        let mut seen_addresses = HashSet::new();
        for (i, env) in config.environments.iter().enumerate() {
            let prefix = format!("environments[{i}]");

            if !seen_addresses.insert(env.address()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.address"),
                    message: format!("Duplicate environment address: {}", env.address()),
                });
            }

            Self::validate_environment(env, &prefix, &mut result);
        }

        result
    }

    fn validate_environment(env: &EnvironmentConfig, prefix: &str, result: &mut ValidationResult) {
        if env.name.trim().is_empty() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.name"),
                message: String::from("Environment name cannot be empty"),
            });
        }

        if !is_valid_address(env.address()) {
            result.errors.push(ValidationError {
                field: format!("{prefix}.address"),
                message: format!(
                    "Address '{}' is invalid. It must be non-empty and contain no whitespace or '/'.",
                    env.address()
                ),
            });
        }

        if env.project_id <= 0 {
            result.errors.push(ValidationError {
                field: format!("{prefix}.project_id"),
                message: format!("Project id must be positive, got {}", env.project_id),
            });
        }

        if let Some(secrets) = &env.secrets {
            Self::validate_secrets(secrets, &format!("{prefix}.secrets"), result);
        }
    }

    fn validate_secrets(secrets: &[SecretConfig], prefix: &str, result: &mut ValidationResult) {
        let mut seen_ids = HashSet::new();
        let mut seen_names = HashSet::new();

        for (i, secret) in secrets.iter().enumerate() {
            let field = format!("{prefix}[{i}]");

            if secret.name.trim().is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{field}.name"),
                    message: String::from("Secret name cannot be empty"),
                });
            }

            match (&secret.value, &secret.value_env) {
                (None, None) => result.errors.push(ValidationError {
                    field: field.clone(),
                    message: format!("Secret '{}' needs either value or value_env", secret.name),
                }),
                (Some(_), Some(var)) => result.warnings.push(format!(
                    "{field}: both value and value_env are set, ignoring {var}"
                )),
                _ => {}
            }

            if let Some(id) = secret.id
                && !seen_ids.insert(id)
            {
                result.errors.push(ValidationError {
                    field: format!("{field}.id"),
                    message: PlanError::DuplicateIdentity { identity: id }.to_string(),
                });
            }

            if !seen_names.insert((secret.name.as_str(), secret.kind)) {
                result.warnings.push(format!(
                    "{field}: secret '{}' ({}) is declared more than once",
                    secret.name, secret.kind
                ));
            }
        }
    }
}

/// Addresses key environments in state and on the command line.
fn is_valid_address(address: &str) -> bool {
    !address.is_empty() && !address.chars().any(|c| c.is_whitespace() || c == '/')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
