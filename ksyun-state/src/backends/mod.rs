//! Backend implementations for state storage

mod local;

pub use local::LocalBackend;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};

/// Create the backend named by `config.backend_type`
pub fn create_backend(config: &BackendConfig) -> BackendResult<Box<dyn StateBackend>> {
    match config.backend_type.as_str() {
        "local" => Ok(Box::new(LocalBackend::from_config(config))),
        other => Err(BackendError::UnsupportedBackend(other.to_string())),
    }
}
