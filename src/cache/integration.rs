//! Read-through and write-through integration points

use async_trait::async_trait;
use std::collections::HashMap;

use super::entry::CacheEntry;
use super::{CacheKey, CacheValue};
use crate::error::CacheError;

/// Loads values for keys missing from the cache
#[async_trait]
pub trait CacheLoader<K: CacheKey, V: CacheValue>: Send + Sync {
  /// `Ok(None)` means the key has no value to load
  async fn load(&self, key: &K) -> anyhow::Result<Option<V>>;

  /// Batch form used by bulk loading. The default loads keys one at a time.
  async fn load_all(&self, keys: &[K]) -> anyhow::Result<HashMap<K, V>> {
    let mut loaded = HashMap::with_capacity(keys.len());
    for key in keys {
      if let Some(value) = self.load(key).await? {
        loaded.insert(key.clone(), value);
      }
    }
    Ok(loaded)
  }
}

/// Mirrors cache writes and deletes to an external system
#[async_trait]
pub trait CacheWriter<K: CacheKey, V: CacheValue>: Send + Sync {
  async fn write(&self, entry: &CacheEntry<K, V>) -> anyhow::Result<()>;

  async fn delete(&self, key: &K) -> anyhow::Result<()>;
}

/// Receives the outcome of a bulk load
pub trait CompletionListener: Send + Sync {
  fn on_completion(&self);

  fn on_exception(&self, error: CacheError);
}
