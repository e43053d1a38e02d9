//! Local file-based state storage backend.
//!
//! State lives in a single JSON file. Writes go through a temporary file and
//! a rename so a crash never leaves a half-written state behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::store::StateStore;
use super::types::{ProviderState, STATE_VERSION};

/// Default state directory name.
pub const STATE_DIR: &str = ".semaphoreui";

/// Default state file name.
pub const STATE_FILE: &str = "state.json";

/// Lock file name.
const LOCK_FILE: &str = "state.lock";

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    base_dir: PathBuf,
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalStateStore {
    /// Creates a store using the default file names inside `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(STATE_FILE);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            state_path,
            lock_path,
        }
    }

    /// Creates a store for a specific state file.
    ///
    /// The lock file is placed next to it.
    #[must_use]
    pub fn with_state_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let base_dir = state_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            state_path,
            lock_path,
        }
    }

    /// Path of the state file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| StateError::storage(format!("Failed to create state directory: {e}")))?;
        }
        Ok(())
    }

    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path).await.map_err(|e| StateError::Corrupted {
            message: format!("Failed to read lock file: {e}"),
        })?;

        let lock_info = serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse lock file: {e}"),
        })?;

        Ok(Some(lock_info))
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        self.ensure_dir().await?;

        let mut file = fs::File::create(path)
            .await
            .map_err(|e| StateError::storage(format!("Failed to create {}: {e}", path.display())))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::storage(format!("Failed to write {}: {e}", path.display())))?;
        file.sync_all()
            .await
            .map_err(|e| StateError::storage(format!("Failed to sync {}: {e}", path.display())))?;
        Ok(())
    }

    async fn delete_lock_file(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await.map_err(|e| StateError::LockFailed {
                message: format!("Failed to delete lock file: {e}"),
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<ProviderState>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        debug!("Loading state from: {}", self.state_path.display());

        let content = fs::read_to_string(&self.state_path).await.map_err(|e| StateError::Corrupted {
            message: format!("Failed to read state file: {e}"),
        })?;

        let state: ProviderState = serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse state file: {e}"),
        })?;

        if state.version != STATE_VERSION {
            warn!(
                "State file version {} differs from supported version {STATE_VERSION}",
                state.version
            );
        }

        Ok(Some(state))
    }

    async fn save(&self, state: &ProviderState) -> Result<()> {
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        let temp_path = self.state_path.with_extension("tmp");
        self.write_file(&temp_path, &content).await?;

        fs::rename(&temp_path, &self.state_path)
            .await
            .map_err(|e| StateError::storage(format!("Failed to rename state file: {e}")))?;

        info!("Saved state to: {}", self.state_path.display());
        Ok(())
    }

    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file().await? {
            if !existing.is_expired() {
                return Err(ProviderError::State(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            warn!("Taking over expired lock {}", existing.lock_id);
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id, operation);
        let content = serde_json::to_string_pretty(&lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;
        self.write_file(&self.lock_path, &content)
            .await
            .map_err(|e| StateError::LockFailed { message: e.to_string() })?;

        debug!(
            "Acquired state lock: {} (expires in {LOCK_EXPIRY_SECS}s)",
            lock_info.lock_id
        );
        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file().await?;
                debug!("Released state lock: {lock_id}");
            } else {
                warn!("Lock {lock_id} was replaced by {}, leaving it in place", existing.lock_id);
            }
        }
        Ok(())
    }

    async fn force_unlock(&self) -> Result<Option<LockInfo>> {
        let existing = self.read_lock_file().await?;
        if let Some(lock) = &existing {
            warn!("Force-removing lock {lock}");
        }
        self.delete_lock_file().await?;
        Ok(existing)
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock_file().await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EnvironmentRecord;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::with_base_dir(temp_dir.path().join(STATE_DIR));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let mut state = ProviderState::new();
        let mut record = EnvironmentRecord::new(1, "staging");
        record.identity = Some(12);
        state.set_record("staging", record, "abc");
        store.save(&state).await.expect("Failed to save state");

        let loaded = store
            .load()
            .await
            .expect("Failed to load state")
            .expect("State should exist");

        assert_eq!(loaded.record("staging").and_then(|r| r.identity), Some(12));
        assert_eq!(loaded.get("staging").map(|e| e.config_hash.as_str()), Some("abc"));
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();
        assert!(store.load().await.expect("Load should not fail").is_none());
        assert!(!store.state_path().exists());
    }

    #[tokio::test]
    async fn test_corrupted_state() {
        let (store, _temp) = create_test_store();
        store.write_file(store.state_path(), "{not json").await.expect("write");

        let err = store.load().await.expect_err("corrupted state must fail");
        assert!(matches!(err, ProviderError::State(StateError::Corrupted { .. })));
    }

    #[tokio::test]
    async fn test_state_path_layout() {
        let store = LocalStateStore::with_state_path("/work/custom/env-state.json");
        assert_eq!(store.state_path(), Path::new("/work/custom/env-state.json"));
        assert_eq!(store.lock_path, Path::new("/work/custom/state.lock"));

        let bare = LocalStateStore::with_state_path("state.json");
        assert_eq!(bare.lock_path, Path::new("./state.lock"));
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (store, _temp) = create_test_store();

        let lock = store
            .acquire_lock("test-holder", "apply")
            .await
            .expect("Failed to acquire lock");
        let info = store.get_lock_info().await.expect("lock info").expect("lock present");
        assert_eq!(info.operation, "apply");

        store.release_lock(&lock.lock_id).await.expect("Failed to release lock");
        assert!(store.get_lock_info().await.expect("lock info").is_none());
    }

    #[tokio::test]
    async fn test_lock_conflict() {
        let (store, _temp) = create_test_store();

        let _lock = store
            .acquire_lock("holder-1", "apply")
            .await
            .expect("Failed to acquire first lock");

        let err = store.acquire_lock("holder-2", "apply").await.expect_err("must conflict");
        assert!(matches!(
            err,
            ProviderError::State(StateError::LockedByOther { ref holder, .. }) if holder == "holder-1"
        ));
    }

    #[tokio::test]
    async fn test_release_ignores_foreign_lock() {
        let (store, _temp) = create_test_store();

        store.acquire_lock("holder-1", "apply").await.expect("lock");
        store.release_lock("someone-else").await.expect("release");
        assert!(store.get_lock_info().await.expect("lock info").is_some());
    }

    #[tokio::test]
    async fn test_force_unlock() {
        let (store, _temp) = create_test_store();

        assert!(store.force_unlock().await.expect("unlock").is_none());

        store.acquire_lock("", "destroy").await.expect("lock");
        let removed = store.force_unlock().await.expect("unlock").expect("lock removed");
        assert_eq!(removed.operation, "destroy");
        assert!(!removed.holder.is_empty());
        assert!(store.acquire_lock("holder-2", "apply").await.is_ok());
    }
}
