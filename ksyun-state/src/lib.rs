//! Ksyun State
//!
//! Records the id and last read attributes of every managed resource
//! between runs, so that later runs update or delete the same objects.
//!
//! - **StateFile**: all managed resources plus a serial and lineage
//! - **StateBackend**: storage with locking for concurrent runs
//! - **LockInfo**: owner and expiry of a held lock
//!
//! ```ignore
//! let backend = create_backend(&BackendConfig::local("ksyun.state.json"))?;
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! // ... apply changes ...
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
