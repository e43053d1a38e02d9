//! Planning for environment changes.
//!
//! Compares desired environments with state, binds secret identities and
//! produces the secret operations each change will submit.

mod bind;
mod diff;
mod executor;
mod plan;

pub use bind::bind_identities;
pub use diff::{SecretAction, SecretDiffEngine, SecretOperation};
pub use executor::{ChangeResult, ExecutionResult, PlanExecutor};
pub use plan::{
    ChangeAction, DesiredEnvironment, EnvironmentPlan, PlannedChange, Planner, desired_environments,
};
