//! Local file backend
//!
//! State lives in a JSON file (default `ksyun.state.json`); the lock is a
//! sibling `.lock` file holding the serialized `LockInfo`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
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
    pub const DEFAULT_STATE_FILE: &'static str = "ksyun.state.json";

    pub fn with_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::with_path(
            config
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_STATE_FILE)),
        )
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match fs::read_to_string(&self.lock_path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| BackendError::InvalidState {
                    path: self.lock_path.display().to_string(),
                    reason: e.to_string(),
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::io(&self.lock_path, e)),
        }
    }

    /// Create the lock file; fails if another run created it first
    async fn create_lock_file(&self, lock: &LockInfo) -> BackendResult<()> {
        let content = serde_json::to_vec_pretty(lock)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await
            .map_err(|e| BackendError::io(&self.lock_path, e))?;
        file.write_all(&content)
            .await
            .map_err(|e| BackendError::io(&self.lock_path, e))
    }

    async fn remove_lock_file(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| BackendError::io(&self.lock_path, e))
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::with_path(Self::DEFAULT_STATE_FILE)
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::io(&self.state_path, e)),
        };
        let state: StateFile =
            serde_json::from_str(&content).map_err(|e| BackendError::InvalidState {
                path: self.state_path.display().to_string(),
                reason: e.to_string(),
            })?;
        log::debug!(
            "read state serial {} with {} resource(s)",
            state.serial,
            state.resources.len()
        );
        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(stored) = self.read_state().await? {
            if stored.lineage != state.lineage {
                return Err(BackendError::LineageMismatch {
                    expected: stored.lineage,
                    actual: state.lineage.clone(),
                });
            }
            if state.serial < stored.serial {
                return Err(BackendError::StaleSerial {
                    stored: stored.serial,
                    actual: state.serial,
                });
            }
        }

        // Sibling file renamed over the state file
        let content = serde_json::to_vec_pretty(state)?;
        let tmp = self.state_path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| BackendError::io(&tmp, e))?;
        fs::rename(&tmp, &self.state_path)
            .await
            .map_err(|e| BackendError::io(&self.state_path, e))?;
        log::info!(
            "wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        if let Some(existing) = self.read_lock().await? {
            if !existing.is_expired() {
                return Err(BackendError::locked(&existing));
            }
            log::warn!(
                "taking over expired lock {} held by {}",
                existing.id,
                existing.who
            );
            self.remove_lock_file().await?;
        }

        let lock = LockInfo::new(operation);
        match self.create_lock_file(&lock).await {
            Ok(()) => Ok(lock),
            // Lost a race with another run
            Err(BackendError::Io { source, .. }) if source.kind() == ErrorKind::AlreadyExists => {
                match self.read_lock().await? {
                    Some(holder) => Err(BackendError::locked(&holder)),
                    None => Err(BackendError::LockNotFound(lock.id)),
                }
            }
            Err(e) => Err(e),
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
        self.remove_lock_file().await
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
        log::warn!("force-unlocking lock {} held by {}", existing.id, existing.who);
        self.remove_lock_file().await
    }
}
