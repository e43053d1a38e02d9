//! Project environment API abstraction.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{Environment, EnvironmentRequest};

/// Remote operations on project environments.
///
/// [`super::SemaphoreClient`] is the HTTP implementation; resource handlers
/// take any implementation so they can run against a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnvironmentApi: Send + Sync {
    /// Creates an environment and returns the server's view of it.
    async fn create_environment(&self, request: &EnvironmentRequest) -> Result<Environment>;

    /// Reads an environment.
    async fn get_environment(&self, project_id: i64, environment_id: i64) -> Result<Environment>;

    /// Replaces an environment and applies the request's secret operations.
    async fn update_environment(
        &self,
        environment_id: i64,
        request: &EnvironmentRequest,
    ) -> Result<()>;

    /// Deletes an environment.
    async fn delete_environment(&self, project_id: i64, environment_id: i64) -> Result<()>;
}
