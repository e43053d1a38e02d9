// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Semaphore UI Provider
//!
//! Declarative management of Semaphore UI project environments.
//!
//! ## Overview
//!
//! Environments are described in `semaphoreui.yaml` and reconciled against the
//! Semaphore UI REST API. Environment secrets are write-only on the server, so
//! every read is merged with the last record this tool wrote, and every write
//! submits the smallest batch of secret create, update and delete operations.
//!
//! ## Architecture
//!
//! 1. **Desired state**: environments resolved from the configuration
//! 2. **Recorded state**: the last merged record of each environment, kept in
//!    a local JSON state file
//! 3. **Reconciler**: refreshes records, plans changes and applies them
//!
//! ## Modules
//!
//! - [`model`]: Environment records, import identifiers, variable maps, merging
//! - [`config`]: Configuration parsing and validation
//! - [`state`]: State storage and locking
//! - [`semaphore`]: Semaphore UI API client and the environment resource
//! - [`planner`]: Secret diffing, identity binding, plans and execution
//! - [`reconciler`]: Refresh, apply, import and drift detection
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! environments:
//!   - name: staging
//!     project_id: 1
//!     variables:
//!       deploy_target: staging
//!     secrets:
//!       - name: DB_PASSWORD
//!         type: env
//!         value_env: STAGING_DB_PASSWORD
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod planner;
pub mod reconciler;
pub mod semaphore;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, SemaphoreConfig};
pub use error::{ProviderError, Result};
pub use model::{EnvironmentRecord, SecretEntry, SecretKind, parse_import_id};
pub use planner::{EnvironmentPlan, PlanExecutor, Planner, SecretDiffEngine};
pub use reconciler::{DriftReport, Reconciler};
pub use semaphore::{EnvironmentApi, EnvironmentResource, SemaphoreClient};
pub use state::{LocalStateStore, ProviderState, StateStore};
