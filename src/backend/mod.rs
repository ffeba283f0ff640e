//! Flat key-value backend seam
//!
//! The backend only offers get, set-with-expiry, delete and an atomic
//! replace-if-present. Expiry values are absolute unix timestamps in seconds,
//! with [`NO_EXPIRY`] meaning the item never expires.

mod memory;

pub use memory::{InMemoryBackend, InMemoryConnector};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ServerAddress;

/// Expiry sentinel: the item never expires
pub const NO_EXPIRY: u64 = 0;

/// Backend operation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
  #[error("backend connection is shut down")]
  Shutdown,
  #[error("backend operation failed: {0}")]
  Operation(String),
  #[error("cannot connect to {0}")]
  Connect(String),
}

/// Thread-safe connection to a flat key-value store
#[async_trait]
pub trait Backend: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

  async fn set(&self, key: &str, expiry: u64, value: Vec<u8>) -> Result<(), BackendError>;

  /// Returns whether an item was removed
  async fn delete(&self, key: &str) -> Result<bool, BackendError>;

  /// Store `value` only if `key` is already present. This is the one atomic
  /// conditional primitive the backend offers.
  async fn replace(&self, key: &str, expiry: u64, value: Vec<u8>) -> Result<bool, BackendError>;

  /// Release the connection. Later operations fail with [`BackendError::Shutdown`].
  fn shutdown(&self);

  fn is_shutdown(&self) -> bool;
}

/// Opens a backend connection over a pool of servers
pub trait BackendConnector: Send + Sync {
  fn connect(&self, servers: &[ServerAddress]) -> Result<Arc<dyn Backend>, BackendError>;
}
