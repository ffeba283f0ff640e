//! Cache configuration: the caller-side descriptor and the per-cache snapshot

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::expiry::{EternalExpiryPolicy, ExpiryPolicy};
use crate::cache::{CacheKey, CacheLoader, CacheValue, CacheWriter, ListenerConfiguration};

/// Produces a strategy instance when a cache is created
pub type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Runtime identity of a declared key or value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
  id: TypeId,
  name: &'static str,
}

impl TypeDescriptor {
  pub fn of<T: 'static>() -> Self {
    Self {
      id: TypeId::of::<T>(),
      name: std::any::type_name::<T>(),
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }
}

impl fmt::Display for TypeDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name)
  }
}

/// Mutable cache descriptor supplied by callers.
///
/// A cache copies what it needs at creation time, so changing a descriptor
/// afterwards never affects caches already built from it.
pub struct CacheConfiguration<K: CacheKey, V: CacheValue> {
  store_by_value: bool,
  read_through: bool,
  write_through: bool,
  statistics_enabled: bool,
  management_enabled: bool,
  expiry_policy_factory: Factory<Arc<dyn ExpiryPolicy>>,
  loader_factory: Option<Factory<Arc<dyn CacheLoader<K, V>>>>,
  writer_factory: Option<Factory<Arc<dyn CacheWriter<K, V>>>>,
  listener_configurations: Vec<ListenerConfiguration<K, V>>,
}

impl<K: CacheKey, V: CacheValue> Clone for CacheConfiguration<K, V> {
  fn clone(&self) -> Self {
    Self {
      store_by_value: self.store_by_value,
      read_through: self.read_through,
      write_through: self.write_through,
      statistics_enabled: self.statistics_enabled,
      management_enabled: self.management_enabled,
      expiry_policy_factory: self.expiry_policy_factory.clone(),
      loader_factory: self.loader_factory.clone(),
      writer_factory: self.writer_factory.clone(),
      listener_configurations: self.listener_configurations.clone(),
    }
  }
}

impl<K: CacheKey, V: CacheValue> Default for CacheConfiguration<K, V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K: CacheKey, V: CacheValue> CacheConfiguration<K, V> {
  pub fn new() -> Self {
    Self {
      store_by_value: true,
      read_through: false,
      write_through: false,
      statistics_enabled: false,
      management_enabled: false,
      expiry_policy_factory: Arc::new(|| Arc::new(EternalExpiryPolicy) as Arc<dyn ExpiryPolicy>),
      loader_factory: None,
      writer_factory: None,
      listener_configurations: Vec::new(),
    }
  }

  pub fn key_type(&self) -> TypeDescriptor {
    TypeDescriptor::of::<K>()
  }

  pub fn value_type(&self) -> TypeDescriptor {
    TypeDescriptor::of::<V>()
  }

  pub fn is_store_by_value(&self) -> bool {
    self.store_by_value
  }

  pub fn set_store_by_value(&mut self, enabled: bool) -> &mut Self {
    self.store_by_value = enabled;
    self
  }

  pub fn is_read_through(&self) -> bool {
    self.read_through
  }

  pub fn set_read_through(&mut self, enabled: bool) -> &mut Self {
    self.read_through = enabled;
    self
  }

  pub fn is_write_through(&self) -> bool {
    self.write_through
  }

  pub fn set_write_through(&mut self, enabled: bool) -> &mut Self {
    self.write_through = enabled;
    self
  }

  pub fn is_statistics_enabled(&self) -> bool {
    self.statistics_enabled
  }

  pub fn set_statistics_enabled(&mut self, enabled: bool) -> &mut Self {
    self.statistics_enabled = enabled;
    self
  }

  pub fn is_management_enabled(&self) -> bool {
    self.management_enabled
  }

  pub fn set_management_enabled(&mut self, enabled: bool) -> &mut Self {
    self.management_enabled = enabled;
    self
  }

  pub fn set_expiry_policy_factory(&mut self, factory: Factory<Arc<dyn ExpiryPolicy>>) -> &mut Self {
    self.expiry_policy_factory = factory;
    self
  }

  /// Share one expiry policy instance between every cache built from this descriptor
  pub fn set_expiry_policy(&mut self, policy: impl ExpiryPolicy + 'static) -> &mut Self {
    let policy: Arc<dyn ExpiryPolicy> = Arc::new(policy);
    self.set_expiry_policy_factory(Arc::new(move || policy.clone()))
  }

  pub fn set_loader_factory(&mut self, factory: Factory<Arc<dyn CacheLoader<K, V>>>) -> &mut Self {
    self.loader_factory = Some(factory);
    self
  }

  pub fn set_loader(&mut self, loader: impl CacheLoader<K, V> + 'static) -> &mut Self {
    let loader: Arc<dyn CacheLoader<K, V>> = Arc::new(loader);
    self.set_loader_factory(Arc::new(move || loader.clone()))
  }

  pub fn set_writer_factory(&mut self, factory: Factory<Arc<dyn CacheWriter<K, V>>>) -> &mut Self {
    self.writer_factory = Some(factory);
    self
  }

  pub fn set_writer(&mut self, writer: impl CacheWriter<K, V> + 'static) -> &mut Self {
    let writer: Arc<dyn CacheWriter<K, V>> = Arc::new(writer);
    self.set_writer_factory(Arc::new(move || writer.clone()))
  }

  /// Add a listener configuration; duplicates are ignored
  pub fn add_listener_configuration(&mut self, listener: ListenerConfiguration<K, V>) -> &mut Self {
    if !self.listener_configurations.contains(&listener) {
      self.listener_configurations.push(listener);
    }
    self
  }

  pub fn remove_listener_configuration(&mut self, listener: &ListenerConfiguration<K, V>) -> &mut Self {
    self.listener_configurations.retain(|l| l != listener);
    self
  }

  pub fn listener_configurations(&self) -> &[ListenerConfiguration<K, V>] {
    &self.listener_configurations
  }
}

/// Configuration owned by a live cache.
///
/// Loader, writer and expiry policy are materialized once from their
/// factories when the cache is created.
pub struct CompleteConfiguration<K: CacheKey, V: CacheValue> {
  store_by_value: bool,
  read_through: bool,
  write_through: bool,
  statistics_enabled: AtomicBool,
  management_enabled: AtomicBool,
  expiry_policy: Arc<dyn ExpiryPolicy>,
  loader: Option<Arc<dyn CacheLoader<K, V>>>,
  writer: Option<Arc<dyn CacheWriter<K, V>>>,
  listener_configurations: RwLock<Vec<ListenerConfiguration<K, V>>>,
}

impl<K: CacheKey, V: CacheValue> From<&CacheConfiguration<K, V>> for CompleteConfiguration<K, V> {
  fn from(config: &CacheConfiguration<K, V>) -> Self {
    Self {
      store_by_value: config.store_by_value,
      read_through: config.read_through,
      write_through: config.write_through,
      statistics_enabled: AtomicBool::new(config.statistics_enabled),
      management_enabled: AtomicBool::new(config.management_enabled),
      expiry_policy: (config.expiry_policy_factory)(),
      loader: config.loader_factory.as_ref().map(|factory| factory()),
      writer: config.writer_factory.as_ref().map(|factory| factory()),
      listener_configurations: RwLock::new(config.listener_configurations.clone()),
    }
  }
}

impl<K: CacheKey, V: CacheValue> CompleteConfiguration<K, V> {
  pub fn key_type(&self) -> TypeDescriptor {
    TypeDescriptor::of::<K>()
  }

  pub fn value_type(&self) -> TypeDescriptor {
    TypeDescriptor::of::<V>()
  }

  pub fn is_store_by_value(&self) -> bool {
    self.store_by_value
  }

  /// Read-through needs both the flag and a loader
  pub fn is_read_through(&self) -> bool {
    self.read_through && self.loader.is_some()
  }

  /// Write-through needs both the flag and a writer
  pub fn is_write_through(&self) -> bool {
    self.write_through && self.writer.is_some()
  }

  pub fn is_statistics_enabled(&self) -> bool {
    self.statistics_enabled.load(Ordering::Acquire)
  }

  /// Returns the previous setting
  pub(crate) fn set_statistics_enabled(&self, enabled: bool) -> bool {
    self.statistics_enabled.swap(enabled, Ordering::AcqRel)
  }

  pub fn is_management_enabled(&self) -> bool {
    self.management_enabled.load(Ordering::Acquire)
  }

  pub(crate) fn set_management_enabled(&self, enabled: bool) {
    self.management_enabled.store(enabled, Ordering::Release);
  }

  pub fn expiry_policy(&self) -> &Arc<dyn ExpiryPolicy> {
    &self.expiry_policy
  }

  pub fn loader(&self) -> Option<&Arc<dyn CacheLoader<K, V>>> {
    self.loader.as_ref()
  }

  pub fn writer(&self) -> Option<&Arc<dyn CacheWriter<K, V>>> {
    self.writer.as_ref()
  }

  /// The loader, only when read-through is active
  pub fn read_through_loader(&self) -> Option<&Arc<dyn CacheLoader<K, V>>> {
    self.loader.as_ref().filter(|_| self.read_through)
  }

  /// The writer, only when write-through is active
  pub fn write_through_writer(&self) -> Option<&Arc<dyn CacheWriter<K, V>>> {
    self.writer.as_ref().filter(|_| self.write_through)
  }

  pub fn listener_configurations(&self) -> Vec<ListenerConfiguration<K, V>> {
    self.listener_configurations.read().clone()
  }

  /// Returns false when an equal configuration is already present
  pub(crate) fn add_listener_configuration(&self, listener: ListenerConfiguration<K, V>) -> bool {
    let mut listeners = self.listener_configurations.write();
    if listeners.contains(&listener) {
      return false;
    }
    listeners.push(listener);
    true
  }

  pub(crate) fn remove_listener_configuration(&self, listener: &ListenerConfiguration<K, V>) -> bool {
    let mut listeners = self.listener_configurations.write();
    let before = listeners.len();
    listeners.retain(|l| l != listener);
    listeners.len() != before
  }

  pub fn view(&self, cache_name: &str) -> ConfigurationView {
    ConfigurationView {
      cache_name: cache_name.to_string(),
      key_type: self.key_type().name().to_string(),
      value_type: self.value_type().name().to_string(),
      read_through: self.is_read_through(),
      write_through: self.is_write_through(),
      store_by_value: self.is_store_by_value(),
      statistics_enabled: self.is_statistics_enabled(),
      management_enabled: self.is_management_enabled(),
    }
  }
}

/// Read-only management projection of a cache's configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationView {
  pub cache_name: String,
  pub key_type: String,
  pub value_type: String,
  pub read_through: bool,
  pub write_through: bool,
  pub store_by_value: bool,
  pub statistics_enabled: bool,
  pub management_enabled: bool,
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;

  struct NullLoader;

  #[async_trait]
  impl CacheLoader<String, String> for NullLoader {
    async fn load(&self, _key: &String) -> anyhow::Result<Option<String>> {
      Ok(None)
    }
  }

  #[test]
  fn test_read_through_requires_loader() {
    let mut config = CacheConfiguration::<String, String>::new();
    config.set_read_through(true);
    let complete = CompleteConfiguration::from(&config);
    assert!(!complete.is_read_through());
    assert!(complete.read_through_loader().is_none());

    config.set_loader(NullLoader);
    let complete = CompleteConfiguration::from(&config);
    assert!(complete.is_read_through());
    assert!(complete.read_through_loader().is_some());
  }

  #[test]
  fn test_loader_without_flag_is_not_read_through() {
    let mut config = CacheConfiguration::<String, String>::new();
    config.set_loader(NullLoader);
    let complete = CompleteConfiguration::from(&config);
    assert!(!complete.is_read_through());
    assert!(complete.loader().is_some());
  }

  #[test]
  fn test_snapshot_is_detached_from_descriptor() {
    let mut config = CacheConfiguration::<u32, String>::new();
    let complete = CompleteConfiguration::from(&config);
    config.set_statistics_enabled(true).set_store_by_value(false);
    assert!(!complete.is_statistics_enabled());
    assert!(complete.is_store_by_value());
  }

  #[test]
  fn test_expiry_factory_runs_once_per_snapshot() {
    use std::sync::atomic::AtomicUsize;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut config = CacheConfiguration::<u32, String>::new();
    config.set_expiry_policy_factory(Arc::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      Arc::new(EternalExpiryPolicy) as Arc<dyn ExpiryPolicy>
    }));

    let complete = CompleteConfiguration::from(&config);
    assert!(complete.expiry_policy().expiry_for_creation().is_eternal());
    assert!(complete.expiry_policy().expiry_for_creation().is_eternal());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_view_reports_type_names() {
    let config = CacheConfiguration::<u32, String>::new();
    let view = CompleteConfiguration::from(&config).view("user");
    assert_eq!(view.cache_name, "user");
    assert_eq!(view.key_type, "u32");
    assert_eq!(view.value_type, "alloc::string::String");
    assert!(view.store_by_value);
  }
}
