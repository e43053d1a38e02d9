//! State store trait definition.

use async_trait::async_trait;

use super::lock::LockInfo;
use super::types::ProviderState;
use crate::error::Result;

/// Trait for state storage backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self) -> Result<Option<ProviderState>>;

    /// Saves the state.
    async fn save(&self, state: &ProviderState) -> Result<()>;

    /// Acquires the lock for `operation`.
    ///
    /// An empty `holder` is replaced by a generated process identifier.
    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo>;

    /// Releases the lock if it is still held under `lock_id`.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Removes the lock regardless of holder.
    ///
    /// Returns the removed lock, if any.
    async fn force_unlock(&self) -> Result<Option<LockInfo>>;

    /// Gets current lock information if a lock file exists.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
