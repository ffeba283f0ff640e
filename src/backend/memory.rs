//! In-memory backend implementation

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{Backend, BackendConnector, BackendError, NO_EXPIRY};
use crate::config::ServerAddress;

/// A stored item with its absolute expiry
#[derive(Debug, Clone)]
struct StoredItem {
  value: Vec<u8>,
  expires_at: u64,
}

impl StoredItem {
  fn is_expired(&self, now: u64) -> bool {
    self.expires_at != NO_EXPIRY && now >= self.expires_at
  }
}

fn unix_now() -> u64 {
  chrono::Utc::now().timestamp().max(0) as u64
}

/// In-process stand-in for a memcached-style server pool
pub struct InMemoryBackend {
  data: RwLock<HashMap<String, StoredItem>>,
  servers: Vec<ServerAddress>,
  shutdown: AtomicBool,
}

impl Default for InMemoryBackend {
  fn default() -> Self {
    Self::new(Vec::new())
  }
}

impl InMemoryBackend {
  pub fn new(servers: Vec<ServerAddress>) -> Self {
    Self {
      data: RwLock::new(HashMap::new()),
      servers,
      shutdown: AtomicBool::new(false),
    }
  }

  /// Servers this connection was opened against
  pub fn servers(&self) -> &[ServerAddress] {
    &self.servers
  }

  /// Number of live (unexpired) items
  pub fn len(&self) -> usize {
    let now = unix_now();
    self
      .data
      .read()
      .values()
      .filter(|item| !item.is_expired(now))
      .count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drop every expired item, returning how many were removed
  pub fn evict_expired(&self) -> usize {
    let now = unix_now();
    let mut data = self.data.write();
    let before = data.len();
    data.retain(|_, item| !item.is_expired(now));
    let evicted = before - data.len();
    if evicted > 0 {
      tracing::debug!("Evicted {} expired keys", evicted);
    }
    evicted
  }

  fn ensure_running(&self) -> Result<(), BackendError> {
    if self.shutdown.load(Ordering::Acquire) {
      Err(BackendError::Shutdown)
    } else {
      Ok(())
    }
  }
}

#[async_trait]
impl Backend for InMemoryBackend {
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
    self.ensure_running()?;
    let now = unix_now();

    let expired = {
      let data = self.data.read();
      match data.get(key) {
        Some(item) if !item.is_expired(now) => return Ok(Some(item.value.clone())),
        Some(_) => true,
        None => false,
      }
    };

    if expired {
      let mut data = self.data.write();
      if data.get(key).is_some_and(|item| item.is_expired(now)) {
        data.remove(key);
      }
    }
    Ok(None)
  }

  async fn set(&self, key: &str, expiry: u64, value: Vec<u8>) -> Result<(), BackendError> {
    self.ensure_running()?;
    self.data.write().insert(
      key.to_string(),
      StoredItem {
        value,
        expires_at: expiry,
      },
    );
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<bool, BackendError> {
    self.ensure_running()?;
    let now = unix_now();
    Ok(
      self
        .data
        .write()
        .remove(key)
        .is_some_and(|item| !item.is_expired(now)),
    )
  }

  async fn replace(&self, key: &str, expiry: u64, value: Vec<u8>) -> Result<bool, BackendError> {
    self.ensure_running()?;
    let now = unix_now();
    let mut data = self.data.write();
    match data.get_mut(key) {
      Some(item) if !item.is_expired(now) => {
        item.value = value;
        item.expires_at = expiry;
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  fn shutdown(&self) {
    if !self.shutdown.swap(true, Ordering::AcqRel) {
      self.data.write().clear();
    }
  }

  fn is_shutdown(&self) -> bool {
    self.shutdown.load(Ordering::Acquire)
  }
}

/// Connector handing out a fresh [`InMemoryBackend`] per connection
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryConnector;

impl BackendConnector for InMemoryConnector {
  fn connect(&self, servers: &[ServerAddress]) -> Result<Arc<dyn Backend>, BackendError> {
    if servers.is_empty() {
      return Err(BackendError::Connect("empty server list".to_string()));
    }
    Ok(Arc::new(InMemoryBackend::new(servers.to_vec())))
  }
}
