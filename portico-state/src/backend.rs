//! State backend trait and error types

use std::collections::HashMap;

use async_trait::async_trait;
use portico_core::resource::Value;
use thiserror::Error;

use crate::lock::{DEFAULT_LOCK_TIMEOUT_SECS, LockInfo};
use crate::state::StateFile;

/// Errors that can occur when interacting with a state backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("State is locked by {who} (lock ID: {lock_id}, operation: {operation})")]
    Locked {
        lock_id: String,
        who: String,
        operation: String,
    },

    #[error("Lock not found: {0}")]
    LockNotFound(String),

    #[error("Lock ID mismatch: expected {expected}, got {actual}")]
    LockMismatch { expected: String, actual: String },

    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    #[error("Backend configuration error: {0}")]
    Configuration(String),

    /// State file is corrupted or has an unknown version
    #[error("Invalid state file: {0}")]
    InvalidState(String),

    /// Refuses to overwrite a state file that belongs to another lineage
    #[error("State lineage mismatch: expected {expected}, got {actual}")]
    LineageMismatch { expected: String, actual: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BackendError {
    pub fn locked(lock: &LockInfo) -> Self {
        Self::Locked {
            lock_id: lock.id.clone(),
            who: lock.who.clone(),
            operation: lock.operation.clone(),
        }
    }

    pub fn unsupported_backend(backend_type: impl Into<String>) -> Self {
        Self::UnsupportedBackend(backend_type.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Trait for state storage backends
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Read the current state. Returns `None` on first use.
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Write the state. Callers increment the serial first.
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Acquire a lock for `operation` with the default expiry
    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        self.acquire_lock_with_timeout(operation, DEFAULT_LOCK_TIMEOUT_SECS)
            .await
    }

    /// Acquire a lock that expires after `timeout_secs`, failing while
    /// another unexpired lock is held. Holders that may run longer than the
    /// default expiry size the lock to their longest wait.
    async fn acquire_lock_with_timeout(
        &self,
        operation: &str,
        timeout_secs: i64,
    ) -> BackendResult<LockInfo>;

    /// Release a lock previously returned by `acquire_lock`
    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    /// Remove a lock by id regardless of its owner
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;

    /// Prepare the storage location
    async fn init(&self) -> BackendResult<()>;
}

/// Configuration for a state backend
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// Backend type (currently only "local")
    pub backend_type: String,
    pub attributes: HashMap<String, Value>,
}

impl BackendConfig {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            backend_type: "local".to_string(),
            attributes: HashMap::from([("path".to_string(), Value::String(path.into()))]),
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

impl From<&portico_core::parser::BackendConfig> for BackendConfig {
    fn from(config: &portico_core::parser::BackendConfig) -> Self {
        Self {
            backend_type: config.backend_type.clone(),
            attributes: config.attributes.clone(),
        }
    }
}
