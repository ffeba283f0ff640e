//! Cache entry types

use super::{CacheKey, CacheValue};

/// A key/value pair handed to cache writers
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<K, V> {
  pub key: K,
  pub value: Option<V>,
  pub old_value: Option<V>,
}

impl<K: CacheKey, V: CacheValue> CacheEntry<K, V> {
  pub fn new(key: K, value: V) -> Self {
    Self {
      key,
      value: Some(value),
      old_value: None,
    }
  }

  pub fn with_old_value(key: K, value: Option<V>, old_value: Option<V>) -> Self {
    Self {
      key,
      value,
      old_value,
    }
  }

  /// True iff an old value is present
  pub fn exists(&self) -> bool {
    self.old_value.is_some()
  }
}

/// Mutation requested by an entry processor
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PendingAction<V> {
  Put(V),
  Remove,
}

/// Entry handle passed to entry processors.
///
/// `set_value` and `remove` do not touch the backend directly. The owning
/// cache applies the last requested mutation through `put` or `remove` once
/// the processor returns, so writers, statistics and listeners all see it.
#[derive(Debug, Clone)]
pub struct EntryView<K, V> {
  key: K,
  value: Option<V>,
  old_value: Option<V>,
  action: Option<PendingAction<V>>,
}

impl<K: CacheKey, V: CacheValue> EntryView<K, V> {
  /// View over the value read just before the processor runs
  pub(crate) fn new(key: K, current: Option<V>) -> Self {
    Self {
      key,
      old_value: current.clone(),
      value: current,
      action: None,
    }
  }

  pub fn key(&self) -> &K {
    &self.key
  }

  pub fn value(&self) -> Option<&V> {
    self.value.as_ref()
  }

  pub fn old_value(&self) -> Option<&V> {
    self.old_value.as_ref()
  }

  pub fn exists(&self) -> bool {
    self.value.is_some()
  }

  pub fn set_value(&mut self, value: V) {
    self.value = Some(value.clone());
    self.action = Some(PendingAction::Put(value));
  }

  pub fn remove(&mut self) {
    self.value = None;
    self.action = Some(PendingAction::Remove);
  }

  pub(crate) fn take_action(&mut self) -> Option<PendingAction<V>> {
    self.action.take()
  }
}

/// Logic run against a single entry by `Cache::invoke`
pub trait EntryProcessor<K: CacheKey, V: CacheValue, T>: Send + Sync {
  fn process(
    &self,
    entry: &mut EntryView<K, V>,
    arguments: &[serde_json::Value],
  ) -> anyhow::Result<Option<T>>;
}

impl<K, V, T, F> EntryProcessor<K, V, T> for F
where
  K: CacheKey,
  V: CacheValue,
  F: Fn(&mut EntryView<K, V>, &[serde_json::Value]) -> anyhow::Result<Option<T>> + Send + Sync,
{
  fn process(
    &self,
    entry: &mut EntryView<K, V>,
    arguments: &[serde_json::Value],
  ) -> anyhow::Result<Option<T>> {
    self(entry, arguments)
  }
}

impl<K: CacheKey, V: CacheValue> PartialEq for EntryView<K, V> {
  fn eq(&self, other: &Self) -> bool {
    self.key == other.key && self.value == other.value && self.old_value == other.old_value
  }
}
