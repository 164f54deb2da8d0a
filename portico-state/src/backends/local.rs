//! Local file backend for state storage
//!
//! Stores state in a JSON file (default: portico.state.json) next to a
//! `.lock` file holding the current `LockInfo`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};
use crate::lock::LockInfo;
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "portico.state.json";

    pub fn new() -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_STATE_FILE))
    }

    pub fn with_path(state_path: PathBuf) -> Self {
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
        }
    }

    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        if let Some(key) = config.attributes.keys().find(|k| k.as_str() != "path") {
            return Err(BackendError::configuration(format!(
                "unknown attribute '{}' for local backend",
                key
            )));
        }
        let path = config
            .get_string("path")
            .unwrap_or(Self::DEFAULT_STATE_FILE);
        if path.is_empty() {
            return Err(BackendError::configuration("path must not be empty"));
        }

        Ok(Self::with_path(PathBuf::from(path)))
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match fs::read_to_string(&self.lock_path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| BackendError::InvalidState(format!("Failed to parse lock file: {}", e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::Io(format!("Failed to read lock file: {}", e))),
        }
    }

    async fn remove_lock_file(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to remove lock file: {}", e)))
    }

    /// Create the lock file, failing if it already exists
    async fn create_lock_file(&self, lock: &LockInfo) -> std::io::Result<()> {
        let content = serde_json::to_vec_pretty(lock)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await?;
        file.write_all(&content).await?;
        file.flush().await
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::Io(format!("Failed to read state file: {}", e))),
        };

        let state: StateFile = serde_json::from_str(&content).map_err(|e| {
            BackendError::InvalidState(format!("Failed to parse state file: {}", e))
        })?;
        if state.version > StateFile::CURRENT_VERSION {
            return Err(BackendError::InvalidState(format!(
                "State file version {} is newer than supported version {}",
                state.version,
                StateFile::CURRENT_VERSION
            )));
        }

        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(existing) = self.read_state().await?
            && existing.lineage != state.lineage
        {
            return Err(BackendError::LineageMismatch {
                expected: existing.lineage,
                actual: state.lineage.clone(),
            });
        }

        let content = serde_json::to_string_pretty(state).map_err(|e| {
            BackendError::Serialization(format!("Failed to serialize state: {}", e))
        })?;

        // Write then rename so a crash never leaves a truncated state file
        let tmp_path = self.state_path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;
        fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;

        debug!(
            "Wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock_with_timeout(
        &self,
        operation: &str,
        timeout_secs: i64,
    ) -> BackendResult<LockInfo> {
        let lock = LockInfo::with_timeout(operation, timeout_secs);

        for _ in 0..2 {
            match self.create_lock_file(&lock).await {
                Ok(()) => {
                    debug!("Acquired state lock {} for {}", lock.id, operation);
                    return Ok(lock);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(BackendError::Io(format!("Failed to write lock file: {}", e)));
                }
            }

            match self.read_lock().await {
                Ok(Some(existing)) if !existing.is_expired() => {
                    return Err(BackendError::locked(&existing));
                }
                Ok(Some(existing)) => {
                    warn!(
                        "Removing expired state lock {} held by {}",
                        existing.id, existing.who
                    );
                    self.remove_lock_file().await?;
                }
                // Released between our attempt and the read
                Ok(None) => {}
                Err(BackendError::InvalidState(message)) => {
                    warn!("Removing unreadable lock file: {}", message);
                    self.remove_lock_file().await?;
                }
                Err(e) => return Err(e),
            }
        }

        match self.read_lock().await? {
            Some(existing) => Err(BackendError::locked(&existing)),
            None => Err(BackendError::Io(
                "Failed to acquire lock: lock file keeps changing".to_string(),
            )),
        }
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;

        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }

        self.remove_lock_file().await?;
        debug!("Released state lock {}", lock.id);
        Ok(())
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock_id.to_string()))?;

        if existing.id != lock_id {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            });
        }

        warn!(
            "Force-unlocking state lock {} held by {} for {}",
            existing.id, existing.who, existing.operation
        );
        self.remove_lock_file().await
    }

    async fn init(&self) -> BackendResult<()> {
        if let Some(parent) = self.state_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::Io(format!("Failed to create state directory: {}", e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ResourceState;
    use tempfile::tempdir;

    fn backend(dir: &tempfile::TempDir) -> LocalBackend {
        LocalBackend::with_path(dir.path().join("test.state.json"))
    }

    #[tokio::test]
    async fn read_write_round_trip() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        assert!(backend.read_state().await.unwrap().is_none());

        let mut state = StateFile::new();
        state.upsert_resource(
            ResourceState::new("domain_name", "api", "apigateway")
                .with_identifier("api.example.com"),
        );
        state.increment_serial();
        backend.write_state(&state).await.unwrap();

        let read = backend.read_state().await.unwrap().unwrap();
        assert_eq!(read.serial, 1);
        assert_eq!(read.resources, state.resources);
        assert!(!dir.path().join("test.state.json.tmp").exists());
    }

    #[tokio::test]
    async fn write_rejects_other_lineage() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        backend.write_state(&StateFile::new()).await.unwrap();
        let result = backend.write_state(&StateFile::new()).await;

        assert!(matches!(result, Err(BackendError::LineageMismatch { .. })));
    }

    #[tokio::test]
    async fn corrupt_state_is_reported() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);
        std::fs::write(backend.state_path(), "{ not json").unwrap();

        assert!(matches!(
            backend.read_state().await,
            Err(BackendError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn locking() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        let lock = backend.acquire_lock("apply").await.unwrap();
        assert_eq!(lock.operation, "apply");

        match backend.acquire_lock("plan").await {
            Err(BackendError::Locked { lock_id, .. }) => assert_eq!(lock_id, lock.id),
            other => panic!("Expected Locked error, got {:?}", other),
        }

        backend.release_lock(&lock).await.unwrap();

        let lock2 = backend.acquire_lock("destroy").await.unwrap();
        assert_eq!(lock2.operation, "destroy");
        backend.release_lock(&lock2).await.unwrap();
        assert!(!backend.lock_path().exists());
    }

    #[tokio::test]
    async fn expired_lock_is_taken_over() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        let stale = LockInfo::with_timeout("apply", -60);
        std::fs::write(backend.lock_path(), serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = backend.acquire_lock("apply").await.unwrap();
        assert_ne!(lock.id, stale.id);
    }

    #[tokio::test]
    async fn long_lock_outlives_default_expiry() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        let held = backend
            .acquire_lock_with_timeout("apply", 2 * 60 * 60)
            .await
            .unwrap();
        assert_eq!((held.expires - held.created).num_minutes(), 120);

        // As if the holder had been waiting for 16 minutes
        let mut stored: LockInfo =
            serde_json::from_str(&std::fs::read_to_string(backend.lock_path()).unwrap()).unwrap();
        stored.created -= chrono::Duration::minutes(16);
        stored.expires -= chrono::Duration::minutes(16);
        std::fs::write(backend.lock_path(), serde_json::to_string(&stored).unwrap()).unwrap();

        match backend.acquire_lock("apply").await {
            Err(BackendError::Locked { lock_id, .. }) => assert_eq!(lock_id, held.id),
            other => panic!("Expected Locked error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn release_with_wrong_lock_fails() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        let _held = backend.acquire_lock("apply").await.unwrap();
        let other = LockInfo::new("apply");

        assert!(matches!(
            backend.release_lock(&other).await,
            Err(BackendError::LockMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn force_unlock() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        let lock = backend.acquire_lock("apply").await.unwrap();
        assert!(matches!(
            backend.force_unlock("some-other-id").await,
            Err(BackendError::LockMismatch { .. })
        ));

        backend.force_unlock(&lock.id).await.unwrap();
        assert!(matches!(
            backend.force_unlock(&lock.id).await,
            Err(BackendError::LockNotFound(_))
        ));
    }

    #[test]
    fn from_config() {
        let backend = LocalBackend::from_config(&BackendConfig::local("custom.state.json")).unwrap();
        assert_eq!(backend.state_path(), Path::new("custom.state.json"));
        assert_eq!(backend.lock_path(), Path::new("custom.state.lock"));

        let mut config = BackendConfig::local("x.json");
        config.attributes.insert(
            "bucket".to_string(),
            portico_core::resource::Value::String("b".to_string()),
        );
        assert!(LocalBackend::from_config(&config).is_err());
    }
}
