//! Process-wide registry of cache managers keyed by (locator, scope)

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::backend::{BackendConnector, InMemoryConnector};
use crate::config::{Locator, ProviderConfig};
use crate::error::Result;
use crate::manager::CacheManager;

/// String property bag handed to managers
pub type Properties = HashMap<String, String>;

const DEFAULT_SCOPE: &str = "default";

/// Caller-supplied token grouping managers for collective release
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope(String);

impl Scope {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }

  pub fn name(&self) -> &str {
    &self.0
  }
}

impl Default for Scope {
  fn default() -> Self {
    Self::new(DEFAULT_SCOPE)
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Optional capabilities a provider may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionalFeature {
  StoreByReference,
  Transactions,
}

static GLOBAL: Lazy<Arc<CachingProvider>> = Lazy::new(|| {
  let connector: Arc<dyn BackendConnector> = Arc::new(InMemoryConnector);
  match ProviderConfig::find_and_load() {
    Ok(Some(config)) => CachingProvider::from_config(&config, connector.clone()).unwrap_or_else(|err| {
      tracing::warn!("Ignoring invalid provider config: {}", err);
      CachingProvider::with_connector(connector)
    }),
    Ok(None) => CachingProvider::with_connector(connector),
    Err(err) => {
      tracing::warn!("Failed to load provider config: {}", err);
      CachingProvider::with_connector(connector)
    }
  }
});

type ManagersByLocator = HashMap<String, Arc<CacheManager>>;

/// Hands out one manager per (locator, scope) until that manager is closed
pub struct CachingProvider {
  default_locator: Locator,
  default_properties: Properties,
  connector: Arc<dyn BackendConnector>,
  managers: Mutex<HashMap<Scope, ManagersByLocator>>,
}

impl CachingProvider {
  /// Provider backed by the in-memory connector with built-in defaults
  pub fn new() -> Arc<Self> {
    Self::with_connector(Arc::new(InMemoryConnector))
  }

  pub fn with_connector(connector: Arc<dyn BackendConnector>) -> Arc<Self> {
    Arc::new(Self {
      default_locator: Locator::default(),
      default_properties: Properties::new(),
      connector,
      managers: Mutex::new(HashMap::new()),
    })
  }

  pub fn from_config(config: &ProviderConfig, connector: Arc<dyn BackendConnector>) -> Result<Arc<Self>> {
    Ok(Arc::new(Self {
      default_locator: config.locator.parse()?,
      default_properties: config.properties.clone(),
      connector,
      managers: Mutex::new(HashMap::new()),
    }))
  }

  /// The process-wide provider. Reads `spycache.yaml` from the working
  /// directory on first use when present.
  pub fn global() -> Arc<Self> {
    GLOBAL.clone()
  }

  pub fn default_locator(&self) -> &Locator {
    &self.default_locator
  }

  pub fn default_scope(&self) -> Scope {
    Scope::default()
  }

  pub fn default_properties(&self) -> &Properties {
    &self.default_properties
  }

  fn resolve_locator(&self, locator: Option<&str>) -> Result<Locator> {
    match locator {
      Some(raw) => raw.parse(),
      None => Ok(self.default_locator.clone()),
    }
  }

  /// Get or create the manager for (locator, scope). Absent arguments fall
  /// back to the provider defaults. Properties only apply when a new manager
  /// is created.
  pub fn get_cache_manager(
    self: &Arc<Self>,
    locator: Option<&str>,
    scope: Option<&Scope>,
    properties: Option<Properties>,
  ) -> Result<Arc<CacheManager>> {
    let locator = self.resolve_locator(locator)?;
    let scope = scope.cloned().unwrap_or_default();

    let mut managers = self.managers.lock();
    let by_locator = managers.entry(scope.clone()).or_default();
    if let Some(manager) = by_locator.get(locator.as_str()) {
      return Ok(manager.clone());
    }

    let backend = self.connector.connect(locator.servers())?;
    let key = locator.as_str().to_string();
    let manager = Arc::new(CacheManager::new(
      locator,
      scope.clone(),
      properties.unwrap_or_else(|| self.default_properties.clone()),
      backend,
      Arc::downgrade(self),
    ));
    by_locator.insert(key, manager.clone());
    tracing::info!("Created cache manager for {} in scope {}", manager.locator(), scope);
    Ok(manager)
  }

  pub fn default_cache_manager(self: &Arc<Self>) -> Result<Arc<CacheManager>> {
    self.get_cache_manager(None, None, None)
  }

  /// Close every manager of every scope
  pub fn close(&self) {
    let managers = std::mem::take(&mut *self.managers.lock());
    let mut closed = 0;
    for manager in managers.into_values().flat_map(|m| m.into_values()) {
      manager.close();
      closed += 1;
    }
    tracing::info!("Closed caching provider ({} managers)", closed);
  }

  /// Close every manager created under `scope`
  pub fn close_scope(&self, scope: &Scope) {
    let removed = self.managers.lock().remove(scope);
    if let Some(managers) = removed {
      for manager in managers.into_values() {
        manager.close();
      }
      tracing::info!("Released scope {}", scope);
    }
  }

  /// Close the single manager for (locator, scope), if tracked
  pub fn close_manager(&self, locator: Option<&str>, scope: Option<&Scope>) -> Result<()> {
    let locator = self.resolve_locator(locator)?;
    let scope = scope.cloned().unwrap_or_default();
    if let Some(manager) = self.untrack(&locator, &scope) {
      manager.close();
    }
    Ok(())
  }

  /// Stop tracking a manager without closing it
  pub fn release_cache_manager(&self, locator: &Locator, scope: &Scope) {
    self.untrack(locator, scope);
  }

  fn untrack(&self, locator: &Locator, scope: &Scope) -> Option<Arc<CacheManager>> {
    let mut managers = self.managers.lock();
    let by_locator = managers.get_mut(scope)?;
    let manager = by_locator.remove(locator.as_str());
    if by_locator.is_empty() {
      managers.remove(scope);
    }
    manager
  }

  /// Only store-by-reference is supported
  pub fn is_supported(&self, feature: OptionalFeature) -> bool {
    matches!(feature, OptionalFeature::StoreByReference)
  }
}
