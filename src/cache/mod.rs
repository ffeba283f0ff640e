//! Typed cache over a flat key-value backend
//!
//! Every call composes the same steps: namespace the key, call the backend,
//! update statistics, delegate to the loader or writer, then dispatch events.
//! Compound operations such as `put_if_absent` read and then act without any
//! locking, so concurrent callers on the same key can race.

mod entry;
mod events;
mod integration;
mod map;
mod statistics;

pub use entry::{CacheEntry, EntryProcessor, EntryView};
pub use events::{
  CacheEntryEvent, CacheEntryEventFilter, CacheEntryListener, EventType, ListenerConfiguration,
};
pub use integration::{CacheLoader, CacheWriter, CompletionListener};
pub use map::CacheMap;
pub use statistics::StatisticsView;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use crate::backend::Backend;
use crate::config::{CacheConfiguration, CompleteConfiguration, ConfigurationView, TypeDescriptor};
use crate::error::{CacheError, Result};
use crate::manager::CacheManager;
use entry::PendingAction;
use events::{EventDispatcher, ListenerRegistry};
use statistics::CacheStatistics;

/// Bounds every cache key satisfies. `Display` produces the key's wire form.
pub trait CacheKey: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static {}

/// Bounds every cache value satisfies
pub trait CacheValue: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{}

/// Targets a cache can be unwrapped to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwrapKind {
  Cache,
  Map,
  Backend,
}

impl FromStr for UnwrapKind {
  type Err = CacheError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "cache" => Ok(UnwrapKind::Cache),
      "map" => Ok(UnwrapKind::Map),
      "backend" => Ok(UnwrapKind::Backend),
      other => Err(CacheError::TypeMismatch(format!(
        "unwrapping to '{}' is not supported",
        other
      ))),
    }
  }
}

/// Result of [`Cache::unwrap`]
pub enum Unwrapped<'a, K: CacheKey, V: CacheValue> {
  Cache(&'a Cache<K, V>),
  Map(CacheMap<'a, K, V>),
  Backend(Arc<dyn Backend>),
}

impl<'a, K: CacheKey, V: CacheValue> Unwrapped<'a, K, V> {
  pub fn kind(&self) -> UnwrapKind {
    match self {
      Unwrapped::Cache(_) => UnwrapKind::Cache,
      Unwrapped::Map(_) => UnwrapKind::Map,
      Unwrapped::Backend(_) => UnwrapKind::Backend,
    }
  }

  pub fn into_cache(self) -> Result<&'a Cache<K, V>> {
    match self {
      Unwrapped::Cache(cache) => Ok(cache),
      other => Err(mismatch(other.kind(), UnwrapKind::Cache)),
    }
  }

  pub fn into_map(self) -> Result<CacheMap<'a, K, V>> {
    match self {
      Unwrapped::Map(map) => Ok(map),
      other => Err(mismatch(other.kind(), UnwrapKind::Map)),
    }
  }

  pub fn into_backend(self) -> Result<Arc<dyn Backend>> {
    match self {
      Unwrapped::Backend(backend) => Ok(backend),
      other => Err(mismatch(other.kind(), UnwrapKind::Backend)),
    }
  }
}

fn mismatch(actual: UnwrapKind, wanted: UnwrapKind) -> CacheError {
  CacheError::TypeMismatch(format!("unwrapped {:?}, not {:?}", actual, wanted))
}

/// A named cache bound to one manager's backend
pub struct Cache<K: CacheKey, V: CacheValue> {
  name: String,
  separator: String,
  backend: Arc<dyn Backend>,
  manager: Weak<CacheManager>,
  configuration: CompleteConfiguration<K, V>,
  listeners: ListenerRegistry<K, V>,
  statistics: CacheStatistics,
  closed: AtomicBool,
}

impl<K: CacheKey, V: CacheValue> Cache<K, V> {
  pub(crate) fn new(
    name: &str,
    separator: &str,
    backend: Arc<dyn Backend>,
    manager: Weak<CacheManager>,
    configuration: &CacheConfiguration<K, V>,
  ) -> Self {
    let configuration = CompleteConfiguration::from(configuration);
    let listeners = ListenerRegistry::new(configuration.listener_configurations());
    Self {
      name: name.to_string(),
      separator: separator.to_string(),
      backend,
      manager,
      configuration,
      listeners,
      statistics: CacheStatistics::default(),
      closed: AtomicBool::new(false),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// The owning manager, if it is still alive
  pub fn manager(&self) -> Option<Arc<CacheManager>> {
    self.manager.upgrade()
  }

  pub fn configuration(&self) -> &CompleteConfiguration<K, V> {
    &self.configuration
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  /// Wire key: cache name, separator, then the key's display form
  pub fn namespaced_key(&self, key: &K) -> String {
    format!("{}{}{}", self.name, self.separator, key)
  }

  fn ensure_open(&self) -> Result<()> {
    if self.is_closed() {
      return Err(CacheError::IllegalState(format!(
        "cache {} is closed",
        self.name
      )));
    }
    Ok(())
  }

  fn statistics_enabled(&self) -> bool {
    self.configuration.is_statistics_enabled()
  }

  fn expiry(&self) -> u64 {
    self
      .configuration
      .expiry_policy()
      .expiry_for_creation()
      .expires_at(chrono::Utc::now().timestamp_millis())
  }

  fn fire(&self, event: CacheEntryEvent<K, V>) -> Result<()> {
    if self.listeners.is_empty() {
      return Ok(());
    }
    let mut dispatcher = EventDispatcher::new();
    dispatcher.add_event(event);
    dispatcher.dispatch(&self.listeners.snapshot())
  }

  /// Backend read with statistics, no read-through
  async fn read(&self, key: &K) -> Result<Option<V>> {
    let start = Instant::now();
    let raw = self.backend.get(&self.namespaced_key(key)).await?;
    if self.statistics_enabled() {
      self.statistics.add_get_time(start.elapsed());
      if raw.is_some() {
        self.statistics.record_hit();
      } else {
        self.statistics.record_miss();
      }
    }
    match raw {
      Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      None => Ok(None),
    }
  }

  /// Backend set followed by write-through and a single event of `event_type`.
  /// `old_value` is the prior value when the caller already read it.
  async fn write(
    &self,
    key: K,
    value: V,
    event_type: EventType,
    old_value: Option<V>,
  ) -> Result<()> {
    let start = Instant::now();
    let bytes = serde_json::to_vec(&value)?;
    self
      .backend
      .set(&self.namespaced_key(&key), self.expiry(), bytes)
      .await?;
    if self.statistics_enabled() {
      self.statistics.add_put_time(start.elapsed());
      self.statistics.record_put();
    }

    if let Some(writer) = self.configuration.write_through_writer() {
      writer
        .write(&CacheEntry::with_old_value(
          key.clone(),
          Some(value.clone()),
          old_value.clone(),
        ))
        .await
        .map_err(CacheError::writer)?;
    }

    self.fire(
      CacheEntryEvent::new(&self.name, event_type, key, Some(value)).with_old_value(old_value),
    )
  }

  /// Read the key; on a miss with read-through active, load and store the result
  pub async fn get(&self, key: &K) -> Result<Option<V>> {
    self.ensure_open()?;
    let value = self.read(key).await?;
    if value.is_some() {
      return Ok(value);
    }

    let Some(loader) = self.configuration.read_through_loader() else {
      return Ok(None);
    };
    let loaded = loader.load(key).await.map_err(CacheError::loader)?;
    if let Some(value) = &loaded {
      self.put(key.clone(), value.clone()).await?;
    }
    Ok(loaded)
  }

  /// Absent keys are left out of the result
  pub async fn get_all(&self, keys: &[K]) -> Result<HashMap<K, V>> {
    let mut found = HashMap::with_capacity(keys.len());
    for key in keys {
      if let Some(value) = self.get(key).await? {
        found.insert(key.clone(), value);
      }
    }
    Ok(found)
  }

  pub async fn contains_key(&self, key: &K) -> Result<bool> {
    Ok(self.get(key).await?.is_some())
  }

  /// Load `keys` through the configured loader.
  ///
  /// Loader failures are reported to `listener` rather than returned. Without
  /// a loader this completes immediately.
  pub async fn load_all(
    &self,
    keys: &[K],
    replace_existing: bool,
    listener: Option<&dyn CompletionListener>,
  ) -> Result<()> {
    self.ensure_open()?;
    let Some(loader) = self.configuration.loader().cloned() else {
      if let Some(listener) = listener {
        listener.on_completion();
      }
      return Ok(());
    };

    match self.load_keys(loader.as_ref(), keys, replace_existing).await {
      Ok(loaded) => {
        tracing::debug!("Loaded {} entries into cache {}", loaded, self.name);
        if let Some(listener) = listener {
          listener.on_completion();
        }
      }
      Err(err) => {
        tracing::warn!("Load into cache {} failed: {}", self.name, err);
        if let Some(listener) = listener {
          listener.on_exception(err);
        }
      }
    }
    Ok(())
  }

  async fn load_keys(
    &self,
    loader: &dyn CacheLoader<K, V>,
    keys: &[K],
    replace_existing: bool,
  ) -> Result<usize> {
    let mut to_load = Vec::with_capacity(keys.len());
    for key in keys {
      if replace_existing || !self.contains_key(key).await? {
        to_load.push(key.clone());
      }
    }

    let loaded = loader
      .load_all(&to_load)
      .await
      .map_err(CacheError::loader)?;
    let count = loaded.len();
    for (key, value) in loaded {
      self.put(key, value).await?;
    }
    Ok(count)
  }

  /// Store `value`, firing an updated event
  pub async fn put(&self, key: K, value: V) -> Result<()> {
    self.ensure_open()?;
    self.write(key, value, EventType::Updated, None).await
  }

  pub async fn get_and_put(&self, key: K, value: V) -> Result<Option<V>> {
    let previous = self.get(&key).await?;
    self
      .write(key, value, EventType::Updated, previous.clone())
      .await?;
    Ok(previous)
  }

  pub async fn put_all(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<()> {
    for (key, value) in entries {
      self.put(key, value).await?;
    }
    Ok(())
  }

  /// Store `value` when the key is absent at check time, firing a created event
  pub async fn put_if_absent(&self, key: K, value: V) -> Result<bool> {
    if self.contains_key(&key).await? {
      return Ok(false);
    }
    self.write(key, value, EventType::Created, None).await?;
    Ok(true)
  }

  /// Unconditional delete. Always returns true since the backend cannot say
  /// whether a remote item existed before an expiry raced the delete.
  pub async fn remove(&self, key: &K) -> Result<bool> {
    self.remove_entry(key, None).await
  }

  async fn remove_entry(&self, key: &K, old_value: Option<V>) -> Result<bool> {
    self.ensure_open()?;
    let start = Instant::now();
    self.backend.delete(&self.namespaced_key(key)).await?;
    if self.statistics_enabled() {
      self.statistics.add_remove_time(start.elapsed());
      self.statistics.record_removal();
    }

    if let Some(writer) = self.configuration.write_through_writer() {
      writer.delete(key).await.map_err(CacheError::writer)?;
    }

    self.fire(
      CacheEntryEvent::new(&self.name, EventType::Removed, key.clone(), None)
        .with_old_value(old_value),
    )?;
    Ok(true)
  }

  pub async fn remove_if_equals(&self, key: &K, old_value: &V) -> Result<bool> {
    match self.get(key).await? {
      Some(current) if current == *old_value => self.remove_entry(key, Some(current)).await,
      _ => Ok(false),
    }
  }

  pub async fn get_and_remove(&self, key: &K) -> Result<Option<V>> {
    let current = self.get(key).await?;
    if current.is_some() {
      self.remove_entry(key, current.clone()).await?;
    }
    Ok(current)
  }

  pub async fn replace_if_equals(&self, key: &K, old_value: &V, new_value: V) -> Result<bool> {
    match self.get(key).await? {
      Some(current) if current == *old_value => {
        self.replace_entry(key.clone(), new_value, Some(current)).await
      }
      _ => Ok(false),
    }
  }

  /// Atomic replace-if-present. Encoding and backend failures are logged and
  /// reported as `false`.
  pub async fn replace(&self, key: K, value: V) -> Result<bool> {
    self.replace_entry(key, value, None).await
  }

  async fn replace_entry(&self, key: K, value: V, old_value: Option<V>) -> Result<bool> {
    self.ensure_open()?;
    let start = Instant::now();
    let wire_key = self.namespaced_key(&key);
    let outcome = match serde_json::to_vec(&value) {
      Ok(bytes) => self
        .backend
        .replace(&wire_key, self.expiry(), bytes)
        .await
        .map_err(CacheError::from),
      Err(err) => Err(CacheError::from(err)),
    };
    let replaced = match outcome {
      Ok(replaced) => replaced,
      Err(err) => {
        tracing::warn!("Replace of {} failed: {}", wire_key, err);
        false
      }
    };

    if self.statistics_enabled() {
      self.statistics.add_get_time(start.elapsed());
      if replaced {
        self.statistics.record_put();
        self.statistics.record_hit();
        self.statistics.add_put_time(start.elapsed());
      } else {
        self.statistics.record_miss();
      }
    }

    if !replaced {
      return Ok(false);
    }

    if let Some(writer) = self.configuration.write_through_writer() {
      writer
        .write(&CacheEntry::with_old_value(
          key.clone(),
          Some(value.clone()),
          old_value.clone(),
        ))
        .await
        .map_err(CacheError::writer)?;
    }

    self.fire(
      CacheEntryEvent::new(&self.name, EventType::Updated, key, Some(value))
        .with_old_value(old_value),
    )?;
    Ok(true)
  }

  /// Returns the value read before the replace, whether or not it succeeded
  pub async fn get_and_replace(&self, key: K, value: V) -> Result<Option<V>> {
    let previous = self.get(&key).await?;
    self.replace_entry(key, value, previous.clone()).await?;
    Ok(previous)
  }

  pub async fn remove_keys(&self, keys: &[K]) -> Result<()> {
    for key in keys {
      self.remove(key).await?;
    }
    Ok(())
  }

  /// Needs key enumeration, which the backend cannot do
  pub fn remove_all(&self) -> Result<()> {
    Err(CacheError::Unsupported("removeAll"))
  }

  /// Needs key enumeration, which the backend cannot do
  pub fn clear(&self) -> Result<()> {
    Err(CacheError::Unsupported("clear"))
  }

  pub fn iter(&self) -> Result<std::vec::IntoIter<(K, V)>> {
    self.ensure_open()?;
    Err(CacheError::Unsupported("iteration"))
  }

  /// Run `processor` against the entry for `key`.
  ///
  /// A value set or removal requested by the processor is applied through
  /// `put` or `remove` afterwards. Nothing isolates the entry while it runs.
  pub async fn invoke<T, P>(
    &self,
    key: &K,
    processor: &P,
    arguments: &[serde_json::Value],
  ) -> Result<Option<T>>
  where
    P: EntryProcessor<K, V, T> + ?Sized,
  {
    let current = self.get(key).await?;
    let mut entry = EntryView::new(key.clone(), current);
    let result = processor
      .process(&mut entry, arguments)
      .map_err(CacheError::processor)?;

    match entry.take_action() {
      Some(PendingAction::Put(value)) => self.put(key.clone(), value).await?,
      Some(PendingAction::Remove) => {
        self.remove(key).await?;
      }
      None => {}
    }
    Ok(result)
  }

  /// Keys whose processor returned nothing are left out of the result
  pub async fn invoke_all<T, P>(
    &self,
    keys: &[K],
    processor: &P,
    arguments: &[serde_json::Value],
  ) -> Result<HashMap<K, T>>
  where
    P: EntryProcessor<K, V, T> + ?Sized,
  {
    let mut results = HashMap::new();
    for key in keys {
      if let Some(result) = self.invoke(key, processor, arguments).await? {
        results.insert(key.clone(), result);
      }
    }
    Ok(results)
  }

  pub fn unwrap(&self, kind: UnwrapKind) -> Result<Unwrapped<'_, K, V>> {
    self.ensure_open()?;
    Ok(match kind {
      UnwrapKind::Cache => Unwrapped::Cache(self),
      UnwrapKind::Map => Unwrapped::Map(CacheMap::new(self)),
      UnwrapKind::Backend => Unwrapped::Backend(self.backend.clone()),
    })
  }

  pub fn register_listener(&self, configuration: ListenerConfiguration<K, V>) -> Result<()> {
    self.ensure_open()?;
    self
      .configuration
      .add_listener_configuration(configuration.clone());
    self.listeners.register(configuration);
    Ok(())
  }

  pub fn deregister_listener(&self, configuration: &ListenerConfiguration<K, V>) -> Result<()> {
    self.ensure_open()?;
    if self.listeners.deregister(configuration) {
      self
        .configuration
        .remove_listener_configuration(configuration);
    }
    Ok(())
  }

  /// Counters start from zero each time statistics are switched back on
  pub fn set_statistics_enabled(&self, enabled: bool) {
    let previous = self.configuration.set_statistics_enabled(enabled);
    if enabled && !previous {
      self.statistics.clear();
    }
  }

  pub fn set_management_enabled(&self, enabled: bool) {
    self.configuration.set_management_enabled(enabled);
  }

  /// Configuration projection, present only while management is enabled
  pub fn configuration_view(&self) -> Option<ConfigurationView> {
    self
      .configuration
      .is_management_enabled()
      .then(|| self.configuration.view(&self.name))
  }

  /// Statistics projection, present only while statistics are enabled
  pub fn statistics_view(&self) -> Option<StatisticsView> {
    self
      .configuration
      .is_statistics_enabled()
      .then(|| self.statistics.view(&self.name))
  }

  /// Release the cache from its manager and disable statistics and
  /// management. Closing is terminal; repeated calls do nothing.
  pub fn close(&self) {
    if self.closed.swap(true, Ordering::AcqRel) {
      return;
    }
    if let Some(manager) = self.manager.upgrade() {
      manager.release_cache(self);
    }
    self.set_statistics_enabled(false);
    self.set_management_enabled(false);
    tracing::debug!("Closed cache {}", self.name);
  }
}

impl<K: CacheKey, V: CacheValue> fmt::Debug for Cache<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache")
      .field("name", &self.name)
      .field("separator", &self.separator)
      .field("closed", &self.is_closed())
      .finish()
  }
}

/// Type-erased handle a manager keeps for each of its caches
pub(crate) trait ManagedCache: Send + Sync {
  fn name(&self) -> &str;

  fn key_type(&self) -> TypeDescriptor;

  fn value_type(&self) -> TypeDescriptor;

  fn close(&self);

  fn set_statistics_enabled(&self, enabled: bool);

  fn set_management_enabled(&self, enabled: bool);

  fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<K: CacheKey, V: CacheValue> ManagedCache for Cache<K, V> {
  fn name(&self) -> &str {
    &self.name
  }

  fn key_type(&self) -> TypeDescriptor {
    self.configuration.key_type()
  }

  fn value_type(&self) -> TypeDescriptor {
    self.configuration.value_type()
  }

  fn close(&self) {
    Cache::close(self)
  }

  fn set_statistics_enabled(&self, enabled: bool) {
    Cache::set_statistics_enabled(self, enabled)
  }

  fn set_management_enabled(&self, enabled: bool) {
    Cache::set_management_enabled(self, enabled)
  }

  fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
    self
  }
}
