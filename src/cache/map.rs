//! Map-shaped view over a cache
//!
//! The backend cannot enumerate keys, so only point operations work. Size is
//! reported as `usize::MAX` and the view never claims to be empty.

use std::collections::HashMap;

use super::{Cache, CacheKey, CacheValue};
use crate::error::{CacheError, Result};

pub struct CacheMap<'a, K: CacheKey, V: CacheValue> {
  cache: &'a Cache<K, V>,
}

impl<'a, K: CacheKey, V: CacheValue> CacheMap<'a, K, V> {
  pub(crate) fn new(cache: &'a Cache<K, V>) -> Self {
    Self { cache }
  }

  pub fn size(&self) -> usize {
    usize::MAX
  }

  pub fn is_empty(&self) -> bool {
    false
  }

  pub async fn contains_key(&self, key: &K) -> Result<bool> {
    self.cache.contains_key(key).await
  }

  pub async fn get(&self, key: &K) -> Result<Option<V>> {
    self.cache.get(key).await
  }

  /// Stores `value` and hands it back
  pub async fn put(&self, key: K, value: V) -> Result<V> {
    self.cache.put(key, value.clone()).await?;
    Ok(value)
  }

  /// Removes `key`, returning the value it held
  pub async fn remove(&self, key: &K) -> Result<Option<V>> {
    self.cache.get_and_remove(key).await
  }

  pub async fn put_all(&self, entries: HashMap<K, V>) -> Result<()> {
    for (key, value) in entries {
      self.cache.put(key, value).await?;
    }
    Ok(())
  }

  pub fn clear(&self) -> Result<()> {
    self.cache.clear()
  }

  pub fn contains_value(&self, _value: &V) -> Result<bool> {
    Err(CacheError::Unsupported("containsValue"))
  }

  pub fn keys(&self) -> Result<Vec<K>> {
    Err(CacheError::Unsupported("key iteration"))
  }

  pub fn values(&self) -> Result<Vec<V>> {
    Err(CacheError::Unsupported("value iteration"))
  }

  pub fn entries(&self) -> Result<Vec<(K, V)>> {
    Err(CacheError::Unsupported("entry iteration"))
  }
}
