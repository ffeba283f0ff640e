//! Cache manager: named caches over one shared backend connection

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::backend::Backend;
use crate::cache::{Cache, CacheKey, CacheValue, ManagedCache};
use crate::config::{CacheConfiguration, Locator, TypeDescriptor};
use crate::error::{CacheError, Result};
use crate::provider::{CachingProvider, Properties, Scope};

/// Property that overrides the locator's key separator
pub const SEPARATOR_PROPERTY: &str = "separator";

static CACHE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").unwrap());

/// Owns the caches created against one (locator, scope) pair
pub struct CacheManager {
  locator: Locator,
  scope: Scope,
  properties: Properties,
  separator: String,
  backend: Arc<dyn Backend>,
  provider: Weak<CachingProvider>,
  caches: Mutex<HashMap<String, Arc<dyn ManagedCache>>>,
  closed: AtomicBool,
}

impl CacheManager {
  pub(crate) fn new(
    locator: Locator,
    scope: Scope,
    properties: Properties,
    backend: Arc<dyn Backend>,
    provider: Weak<CachingProvider>,
  ) -> Self {
    let separator = properties
      .get(SEPARATOR_PROPERTY)
      .filter(|s| !s.is_empty())
      .cloned()
      .unwrap_or_else(|| locator.separator().to_string());

    Self {
      locator,
      scope,
      properties,
      separator,
      backend,
      provider,
      caches: Mutex::new(HashMap::new()),
      closed: AtomicBool::new(false),
    }
  }

  pub fn locator(&self) -> &Locator {
    &self.locator
  }

  pub fn scope(&self) -> &Scope {
    &self.scope
  }

  pub fn properties(&self) -> &Properties {
    &self.properties
  }

  pub fn separator(&self) -> &str {
    &self.separator
  }

  /// The provider that created this manager, if it is still alive
  pub fn provider(&self) -> Option<Arc<CachingProvider>> {
    self.provider.upgrade()
  }

  /// Raw handle to the shared backend connection
  pub fn backend(&self) -> Arc<dyn Backend> {
    self.backend.clone()
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  fn ensure_open(&self) -> Result<()> {
    if self.is_closed() {
      return Err(CacheError::IllegalState(format!(
        "cache manager for {} is closed",
        self.locator
      )));
    }
    Ok(())
  }

  fn lookup(&self, name: &str) -> Option<Arc<dyn ManagedCache>> {
    self.caches.lock().get(name).cloned()
  }

  /// Get or create the cache called `name`.
  ///
  /// When the cache already exists it is returned unchanged and
  /// `configuration` is ignored.
  pub fn create_cache<K: CacheKey, V: CacheValue>(
    self: &Arc<Self>,
    name: &str,
    configuration: &CacheConfiguration<K, V>,
  ) -> Result<Arc<Cache<K, V>>> {
    self.ensure_open()?;
    if !CACHE_NAME.is_match(name) {
      return Err(CacheError::Configuration(format!(
        "Cache name '{}' is illegal, use \\w+ as cache name",
        name
      )));
    }

    let mut caches = self.caches.lock();
    if let Some(existing) = caches.get(name) {
      return downcast(existing.clone());
    }

    let cache = Arc::new(Cache::new(
      name,
      &self.separator,
      self.backend.clone(),
      Arc::downgrade(self),
      configuration,
    ));
    caches.insert(name.to_string(), cache.clone());
    tracing::info!("Created cache {} on {}", name, self.locator);
    Ok(cache)
  }

  /// Typed lookup; a missing cache is created with the default configuration
  pub fn get_cache<K: CacheKey, V: CacheValue>(self: &Arc<Self>, name: &str) -> Result<Arc<Cache<K, V>>> {
    self.ensure_open()?;
    match self.lookup(name) {
      Some(existing) => downcast(existing),
      None => self.create_cache(name, &CacheConfiguration::default()),
    }
  }

  /// Sorted names of the live caches
  pub fn cache_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.caches.lock().keys().cloned().collect();
    names.sort();
    names
  }

  /// Close and forget the named cache. Unknown names are ignored.
  pub fn destroy_cache(&self, name: &str) -> Result<()> {
    self.ensure_open()?;
    let removed = self.caches.lock().remove(name);
    if let Some(cache) = removed {
      cache.close();
      tracing::info!("Destroyed cache {}", name);
    }
    Ok(())
  }

  pub fn enable_statistics(&self, name: &str, enabled: bool) -> Result<()> {
    self.ensure_open()?;
    self.require(name)?.set_statistics_enabled(enabled);
    Ok(())
  }

  pub fn enable_management(&self, name: &str, enabled: bool) -> Result<()> {
    self.ensure_open()?;
    self.require(name)?.set_management_enabled(enabled);
    Ok(())
  }

  fn require(&self, name: &str) -> Result<Arc<dyn ManagedCache>> {
    self
      .lookup(name)
      .ok_or_else(|| CacheError::Configuration(format!("No cache named {}", name)))
  }

  /// Stop tracking `cache` without closing it. A different cache that has
  /// since taken the same name stays registered.
  pub(crate) fn release_cache(&self, cache: &dyn ManagedCache) {
    let mut caches = self.caches.lock();
    let tracked = caches
      .get(cache.name())
      .is_some_and(|existing| std::ptr::addr_eq(Arc::as_ptr(existing), std::ptr::from_ref(cache)));
    if tracked {
      caches.remove(cache.name());
    }
  }

  /// Deregister from the provider, close every cache, then shut the backend
  /// down. Repeated calls do nothing.
  pub fn close(&self) {
    if self.closed.swap(true, Ordering::AcqRel) {
      return;
    }

    if let Some(provider) = self.provider.upgrade() {
      provider.release_cache_manager(&self.locator, &self.scope);
    }

    let caches: Vec<Arc<dyn ManagedCache>> = self.caches.lock().drain().map(|(_, c)| c).collect();
    for cache in &caches {
      cache.close();
    }

    self.backend.shutdown();
    tracing::info!(
      "Closed cache manager for {} ({} caches)",
      self.locator,
      caches.len()
    );
  }
}

/// Recover the typed cache, reporting which declared type disagrees
fn downcast<K: CacheKey, V: CacheValue>(cache: Arc<dyn ManagedCache>) -> Result<Arc<Cache<K, V>>> {
  let (key_type, value_type) = (TypeDescriptor::of::<K>(), TypeDescriptor::of::<V>());
  if cache.key_type() != key_type {
    return Err(CacheError::TypeMismatch(format!(
      "Incompatible key type for cache {}: expected {} but {} was specified",
      cache.name(),
      cache.key_type(),
      key_type
    )));
  }
  if cache.value_type() != value_type {
    return Err(CacheError::TypeMismatch(format!(
      "Incompatible value type for cache {}: expected {} but {} was specified",
      cache.name(),
      cache.value_type(),
      value_type
    )));
  }

  let name = cache.name().to_string();
  cache
    .as_any()
    .downcast::<Cache<K, V>>()
    .map_err(|_| CacheError::TypeMismatch(format!("cache {} has an unexpected type", name)))
}


impl std::fmt::Debug for CacheManager {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CacheManager")
      .field("separator", &self.separator)
      .field("closed", &self.closed.load(Ordering::Acquire))
      .finish()
  }
}
