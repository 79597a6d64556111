//! State backend trait and error types

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lock::LockInfo;
use crate::state::StateFile;

/// Errors that can occur when interacting with a state backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The state is locked by another run
    #[error("State is locked by {who} (lock ID: {lock_id}, operation: {operation}, expires: {expires})")]
    Locked {
        lock_id: String,
        who: String,
        operation: String,
        expires: String,
    },

    #[error("Lock not found: {0}")]
    LockNotFound(String),

    #[error("Lock ID mismatch: expected {expected}, got {actual}")]
    LockMismatch { expected: String, actual: String },

    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    /// State file is corrupted or invalid
    #[error("Invalid state file {path}: {reason}")]
    InvalidState { path: String, reason: String },

    /// Writing would replace a state that belongs to another lineage
    #[error("State lineage mismatch: expected {expected}, got {actual}")]
    LineageMismatch { expected: String, actual: String },

    /// Writing would replace a newer state
    #[error("State serial {actual} is older than the stored serial {stored}")]
    StaleSerial { stored: u64, actual: u64 },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    pub fn locked(lock: &LockInfo) -> Self {
        Self::Locked {
            lock_id: lock.id.clone(),
            who: lock.who.clone(),
            operation: lock.operation.clone(),
            expires: lock.expires.to_rfc3339(),
        }
    }

    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for the state file plus an exclusive lock
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Read the current state, `None` on first use
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Replace the stored state
    ///
    /// Refuses a state of another lineage or with a lower serial than the
    /// stored one.
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;

    /// Acquire the lock for `operation`; an expired lock is taken over
    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo>;

    /// Release a lock acquired by this run
    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()>;

    /// Remove the lock with `lock_id` regardless of owner
    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()>;
}

/// `backend` block of a configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend type; only "local" is available
    #[serde(rename = "type", default = "default_backend_type")]
    pub backend_type: String,
    /// State file path for the local backend
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_backend_type() -> String {
    "local".to_string()
}

impl BackendConfig {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            backend_type: default_backend_type(),
            path: Some(path.into()),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: default_backend_type(),
            path: None,
        }
    }
}
