//! Configuration parser for loading and resolving configuration files.
//!
//! This module handles loading configuration from YAML files and `.env` files,
//! and resolving provider settings against environment variables. Explicit
//! file values take precedence over environment variables.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::state::{STATE_DIR, STATE_FILE};

use super::spec::{
    ProviderConfig, ProviderSettings, SemaphoreConfig, DEFAULT_API_BASE_URL,
    DEFAULT_TIMEOUT_SECS, ENV_API_BASE_URL, ENV_API_TOKEN, ENV_TLS_SKIP_VERIFY,
};

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["semaphoreui.yaml", "semaphoreui.yml", "semaphore.yaml"];

/// Configuration parser for loading provider configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

/// Reads a variable from the process environment.
#[must_use]
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<SemaphoreConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<SemaphoreConfig> {
        debug!("Parsing YAML configuration");

        let config: SemaphoreConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })?;

        debug!(
            "Parsed configuration with {} environments",
            config.environments.len()
        );
        Ok(config)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Resolves the state file path.
    ///
    /// Relative paths are taken from the base path; the default is
    /// `.semaphoreui/state.json` next to the configuration.
    #[must_use]
    pub fn state_path(&self, config: &SemaphoreConfig) -> PathBuf {
        let base = self.base_path.clone().unwrap_or_else(|| PathBuf::from("."));
        config.state.path.as_ref().map_or_else(
            || base.join(STATE_DIR).join(STATE_FILE),
            |p| base.join(p),
        )
    }
}

/// Resolves connection settings.
///
/// Values in `settings` win over the variables returned by `lookup`; the base
/// URL falls back to [`DEFAULT_API_BASE_URL`].
///
/// # Errors
///
/// Returns an error if no token is configured, the base URL is not an
/// http(s) URL, or the TLS switch is not a boolean.
pub fn resolve_provider<F>(settings: &ProviderSettings, lookup: F) -> Result<ProviderConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let api_base_url = settings
        .api_base_url
        .clone()
        .or_else(|| lookup(ENV_API_BASE_URL))
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    validate_base_url(&api_base_url)?;

    let api_token = settings
        .api_token
        .clone()
        .or_else(|| lookup(ENV_API_TOKEN))
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingSetting {
            setting: String::from("provider.api_token"),
            env_var: ENV_API_TOKEN.to_string(),
        })?;

    let tls_skip_verify = match settings.tls_skip_verify {
        Some(value) => value,
        None => match lookup(ENV_TLS_SKIP_VERIFY) {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                ConfigError::validation(
                    format!("{ENV_TLS_SKIP_VERIFY} must be true or false, got '{raw}'"),
                    "provider.tls_skip_verify",
                )
            })?,
            None => false,
        },
    };

    debug!("Using Semaphore UI API at {api_base_url}");
    Ok(ProviderConfig {
        api_base_url,
        api_token,
        tls_skip_verify,
        timeout_secs: settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
    })
}

fn validate_base_url(url: &str) -> std::result::Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: url.to_string(),
        reason,
    };

    let parsed = reqwest::Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
environments:
  - name: staging
    project_id: 1
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(config.environments.len(), 1);
        assert_eq!(config.provider, ProviderSettings::default());
        assert!(config.state.path.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
provider:
  api_base_url: https://ci.example.com/api
  tls_skip_verify: true
state:
  path: state/semaphore.json
environments:
  - name: production
    address: prod
    project_id: 3
    variables:
      region: eu-west-1
    env:
      ANSIBLE_FORCE_COLOR: "1"
    secrets:
      - name: VAULT_PASSWORD
        value_env: PROD_VAULT_PASSWORD
      - name: deploy_key
        type: file
        value: "-----BEGIN KEY-----"
"#;
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let env = config.find_environment("prod").unwrap();
        assert_eq!(env.name, "production");
        assert_eq!(env.secrets.as_ref().map(Vec::len), Some(2));
        assert_eq!(config.provider.tls_skip_verify, Some(true));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = ConfigParser::new()
            .parse_yaml("environments: [", None)
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Config(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_env_supplies_missing_settings() {
        let config = resolve_provider(
            &ProviderSettings::default(),
            vars(&[
                (ENV_API_TOKEN, "from-env"),
                (ENV_API_BASE_URL, "https://env.example.com/api"),
                (ENV_TLS_SKIP_VERIFY, "true"),
            ]),
        )
        .unwrap();
        assert_eq!(config.api_token, "from-env");
        assert_eq!(config.api_base_url, "https://env.example.com/api");
        assert!(config.tls_skip_verify);
    }

    #[test]
    fn test_file_values_override_env() {
        let settings = ProviderSettings {
            api_base_url: Some(String::from("https://file.example.com/api")),
            api_token: Some(String::from("from-file")),
            tls_skip_verify: Some(false),
            timeout_secs: Some(5),
        };
        let config = resolve_provider(
            &settings,
            vars(&[(ENV_API_TOKEN, "from-env"), (ENV_TLS_SKIP_VERIFY, "true")]),
        )
        .unwrap();
        assert_eq!(config.api_token, "from-file");
        assert_eq!(config.api_base_url, "https://file.example.com/api");
        assert!(!config.tls_skip_verify);
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn test_defaults() {
        let config =
            resolve_provider(&ProviderSettings::default(), vars(&[(ENV_API_TOKEN, "t")])).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert!(!config.tls_skip_verify);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_missing_token() {
        let err = resolve_provider(&ProviderSettings::default(), vars(&[])).unwrap_err();
        assert!(err.to_string().contains(ENV_API_TOKEN));
    }

    #[test]
    fn test_bad_tls_switch() {
        let err = resolve_provider(
            &ProviderSettings::default(),
            vars(&[(ENV_API_TOKEN, "t"), (ENV_TLS_SKIP_VERIFY, "maybe")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("maybe"));
    }

    #[test]
    fn test_bad_base_url() {
        let settings = ProviderSettings {
            api_base_url: Some(String::from("ftp://example.com")),
            ..ProviderSettings::default()
        };
        let err = resolve_provider(&settings, vars(&[(ENV_API_TOKEN, "t")])).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Config(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("semaphoreui.yaml"), "environments: []\n").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("semaphoreui.yaml"));
    }

    #[test]
    fn test_state_path_default_and_relative() {
        let parser = ConfigParser::new().with_base_path("/work");
        let mut config = SemaphoreConfig::default();
        assert_eq!(
            parser.state_path(&config),
            PathBuf::from("/work/.semaphoreui/state.json")
        );

        config.state.path = Some(String::from("custom/state.json"));
        assert_eq!(
            parser.state_path(&config),
            PathBuf::from("/work/custom/state.json")
        );
    }
}
