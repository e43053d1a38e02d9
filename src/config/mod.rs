//! Configuration module for the Semaphore UI provider.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `semaphoreui.yaml`
//! - Resolving connection settings from the file, `.env` and the environment
//! - Validation of configuration values
//! - Computing configuration fingerprints for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file, process_env, resolve_provider};
pub use spec::{
    EnvironmentConfig, ProviderConfig, ProviderSettings, SecretConfig, SemaphoreConfig,
    StateConfig, DEFAULT_API_BASE_URL, DEFAULT_TIMEOUT_SECS, ENV_API_BASE_URL, ENV_API_TOKEN,
    ENV_TLS_SKIP_VERIFY,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
