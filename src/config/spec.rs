//! Configuration specification types for the provider.
//!
//! This module defines all the structs that map to the `semaphoreui.yaml` file.
//! Environments are declared with their full desired state; secret values are
//! either inline or read from the process environment.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{Attr, EnvironmentRecord, SecretEntry, SecretKind, VarMap};

/// Default Semaphore UI API base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable supplying the API token.
pub const ENV_API_TOKEN: &str = "SEMAPHOREUI_API_TOKEN";

/// Environment variable supplying the API base URL.
pub const ENV_API_BASE_URL: &str = "SEMAPHOREUI_API_BASE_URL";

/// Environment variable supplying the TLS verification switch.
pub const ENV_TLS_SKIP_VERIFY: &str = "SEMAPHOREUI_TLS_SKIP_VERIFY";

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SemaphoreConfig {
    /// Connection settings.
    #[serde(default)]
    pub provider: ProviderSettings,
    /// State file settings.
    #[serde(default)]
    pub state: StateConfig,
    /// Desired project environments.
    #[serde(default)]
    pub environments: Vec<EnvironmentConfig>,
}

/// Connection settings as written in the file.
///
/// Every field is optional; missing values fall back to environment variables
/// and then to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderSettings {
    /// API base URL, e.g. `https://semaphore.example.com/api`.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// API token.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub tls_skip_verify: Option<bool>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Resolved connection settings handed to the API client.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// API base URL.
    pub api_base_url: String,
    /// API token.
    pub api_token: String,
    /// Skip TLS certificate verification.
    pub tls_skip_verify: bool,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// State file settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Path of the state file, relative to the configuration file.
    #[serde(default)]
    pub path: Option<String>,
}

/// Desired state of one project environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Stable key of this environment in state. Defaults to `name`.
    #[serde(default)]
    pub address: Option<String>,
    /// Environment name on the server.
    pub name: String,
    /// Owning project identity.
    pub project_id: i64,
    /// Generic (extra) variables.
    #[serde(default)]
    pub variables: Option<VarMap>,
    /// Runtime environment variables.
    #[serde(default)]
    pub env: Option<VarMap>,
    /// Secrets.
    #[serde(default)]
    pub secrets: Option<Vec<SecretConfig>>,
}

/// Desired secret.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretConfig {
    /// Pinned server identity, usually left out.
    #[serde(default)]
    pub id: Option<i64>,
    /// Secret name.
    pub name: String,
    /// Secret kind.
    #[serde(rename = "type", default)]
    pub kind: SecretKind,
    /// Inline value.
    #[serde(default)]
    pub value: Option<String>,
    /// Name of the environment variable holding the value.
    #[serde(default)]
    pub value_env: Option<String>,
}

impl EnvironmentConfig {
    /// Returns the state key of this environment.
    #[must_use]
    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or(&self.name)
    }

    /// Converts this entry into a desired record, resolving secret values.
    ///
    /// # Errors
    ///
    /// Returns an error if a secret has no value or its `value_env` variable
    /// is not set.
    pub fn to_record<F>(&self, lookup: F) -> Result<EnvironmentRecord, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secrets = match &self.secrets {
            Some(secrets) => Attr::Value(
                secrets
                    .iter()
                    .map(|s| s.resolve(&lookup))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => Attr::Null,
        };

        Ok(EnvironmentRecord {
            identity: None,
            project_identity: self.project_id,
            name: self.name.clone(),
            generic_variables: self.variables.clone().into(),
            runtime_variables: self.env.clone().into(),
            secrets,
        })
    }
}

impl SecretConfig {
    /// Resolves the value into a secret entry.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `value` nor a set `value_env` is present.
    pub fn resolve<F>(&self, lookup: F) -> Result<SecretEntry, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = match (&self.value, &self.value_env) {
            (Some(value), _) => value.clone(),
            (None, Some(var)) => lookup(var).ok_or_else(|| ConfigError::MissingEnvVar {
                name: var.clone(),
            })?,
            (None, None) => {
                return Err(ConfigError::validation(
                    format!("Secret '{}' has neither value nor value_env", self.name),
                    self.name.clone(),
                ));
            }
        };

        let entry = SecretEntry::new(self.name.clone(), self.kind, value);
        Ok(match self.id {
            Some(id) => entry.with_identity(id),
            None => entry,
        })
    }
}

impl SemaphoreConfig {
    /// Finds an environment by state address.
    #[must_use]
    pub fn find_environment(&self, address: &str) -> Option<&EnvironmentConfig> {
        self.environments.iter().find(|e| e.address() == address)
    }

    /// Returns all state addresses in declaration order.
    #[must_use]
    pub fn addresses(&self) -> Vec<&str> {
        self.environments.iter().map(EnvironmentConfig::address).collect()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &"(sensitive)")
            .field("tls_skip_verify", &self.tls_skip_verify)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for SecretConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("value", &self.value.as_ref().map(|_| "(sensitive)"))
            .field("value_env", &self.value_env)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn environment(yaml: &str) -> EnvironmentConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_absent_and_empty_maps_are_distinct() {
        let env = environment(
            r"
name: staging
project_id: 1
variables: {}
",
        );
        let record = env.to_record(no_env).unwrap();
        assert_eq!(record.generic_variables, Attr::Value(VarMap::new()));
        assert_eq!(record.runtime_variables, Attr::Null);
        assert_eq!(record.secrets, Attr::Null);
    }

    #[test]
    fn test_secret_value_from_environment() {
        let env = environment(
            r"
name: staging
project_id: 1
secrets:
  - name: DB_PASSWORD
    value_env: STAGING_DB_PASSWORD
  - name: ssh_key
    type: file
    value: inline
    id: 12
",
        );
        let record = env
            .to_record(|name| (name == "STAGING_DB_PASSWORD").then(|| String::from("s3cret")))
            .unwrap();

        let secrets = record.secret_list();
        assert_eq!(secrets[0].kind, SecretKind::EnvVar);
        assert_eq!(secrets[0].value, "s3cret");
        assert_eq!(secrets[1].identity, Some(12));
        assert_eq!(secrets[1].kind, SecretKind::File);
    }

    #[test]
    fn test_missing_value_env_is_an_error() {
        let secret = SecretConfig {
            id: None,
            name: String::from("A"),
            kind: SecretKind::EnvVar,
            value: None,
            value_env: Some(String::from("UNSET_VAR")),
        };
        let err = secret.resolve(no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar { ref name } if name == "UNSET_VAR"));
    }

    #[test]
    fn test_address_defaults_to_name() {
        let mut env = environment("name: staging\nproject_id: 1\n");
        assert_eq!(env.address(), "staging");
        env.address = Some(String::from("stage"));
        assert_eq!(env.address(), "stage");
    }

    #[test]
    fn test_provider_config_debug_hides_token() {
        let config = ProviderConfig {
            api_base_url: String::from(DEFAULT_API_BASE_URL),
            api_token: String::from("tok-123"),
            tls_skip_verify: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        };
        assert!(!format!("{config:?}").contains("tok-123"));
    }
}
