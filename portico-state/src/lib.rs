//! Portico State Management
//!
//! Persists what Portico knows about the domain names it manages, with a
//! lock file guarding concurrent writers.
//!
//! # Example
//!
//! ```ignore
//! use portico_state::{create_backend, BackendConfig};
//!
//! let backend = create_backend(&BackendConfig::local("portico.state.json")).await?;
//!
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//!
//! // ... modify resources ...
//!
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
