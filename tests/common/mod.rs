//! Shared test helpers
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use spycache::{
  CacheEntry, CacheEntryEvent, CacheEntryListener, CacheError, CacheKey, CacheLoader, CacheManager,
  CacheValue, CacheWriter, CachingProvider, CompletionListener, EventType,
};

pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

/// A manager from a private provider, so tests never share backends
pub fn manager() -> Arc<CacheManager> {
  init_tracing();
  CachingProvider::new().default_cache_manager().unwrap()
}

/// Records every event it is handed
pub struct RecordingListener<K, V> {
  types: Vec<EventType>,
  events: Mutex<Vec<CacheEntryEvent<K, V>>>,
}

impl<K: CacheKey, V: CacheValue> RecordingListener<K, V> {
  pub fn all() -> Arc<Self> {
    Self::handling(&[EventType::Created, EventType::Updated, EventType::Removed])
  }

  pub fn handling(types: &[EventType]) -> Arc<Self> {
    Arc::new(Self {
      types: types.to_vec(),
      events: Mutex::new(Vec::new()),
    })
  }

  pub fn events(&self) -> Vec<CacheEntryEvent<K, V>> {
    self.events.lock().clone()
  }

  pub fn types(&self) -> Vec<EventType> {
    self.events.lock().iter().map(|e| e.event_type).collect()
  }

  fn record(&self, events: &[CacheEntryEvent<K, V>]) -> anyhow::Result<()> {
    self.events.lock().extend_from_slice(events);
    Ok(())
  }
}

impl<K: CacheKey, V: CacheValue> CacheEntryListener<K, V> for RecordingListener<K, V> {
  fn handles(&self, event_type: EventType) -> bool {
    self.types.contains(&event_type)
  }

  fn on_created(&self, events: &[CacheEntryEvent<K, V>]) -> anyhow::Result<()> {
    self.record(events)
  }

  fn on_updated(&self, events: &[CacheEntryEvent<K, V>]) -> anyhow::Result<()> {
    self.record(events)
  }

  fn on_removed(&self, events: &[CacheEntryEvent<K, V>]) -> anyhow::Result<()> {
    self.record(events)
  }
}

/// Records writes and deletes; optionally fails every call
pub struct RecordingWriter<K, V> {
  fail: bool,
  writes: Mutex<Vec<CacheEntry<K, V>>>,
  deletes: Mutex<Vec<K>>,
}

impl<K: CacheKey, V: CacheValue> RecordingWriter<K, V> {
  pub fn new() -> Self {
    Self {
      fail: false,
      writes: Mutex::new(Vec::new()),
      deletes: Mutex::new(Vec::new()),
    }
  }

  pub fn failing() -> Self {
    Self {
      fail: true,
      ..Self::new()
    }
  }

  pub fn writes(&self) -> Vec<CacheEntry<K, V>> {
    self.writes.lock().clone()
  }

  pub fn deletes(&self) -> Vec<K> {
    self.deletes.lock().clone()
  }
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> CacheWriter<K, V> for RecordingWriter<K, V> {
  async fn write(&self, entry: &CacheEntry<K, V>) -> anyhow::Result<()> {
    if self.fail {
      anyhow::bail!("writer unavailable");
    }
    self.writes.lock().push(entry.clone());
    Ok(())
  }

  async fn delete(&self, key: &K) -> anyhow::Result<()> {
    if self.fail {
      anyhow::bail!("writer unavailable");
    }
    self.deletes.lock().push(key.clone());
    Ok(())
  }
}

/// Loads the same value for every key and counts calls
pub struct ConstantLoader<V> {
  value: V,
  calls: AtomicUsize,
}

impl<V> ConstantLoader<V> {
  pub fn new(value: V) -> Self {
    Self {
      value,
      calls: AtomicUsize::new(0),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> CacheLoader<K, V> for ConstantLoader<V> {
  async fn load(&self, _key: &K) -> anyhow::Result<Option<V>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(Some(self.value.clone()))
  }
}

/// Loads from a fixed map and remembers which keys each batch asked for
pub struct MapLoader<K, V> {
  entries: HashMap<K, V>,
  fail: bool,
  batches: Mutex<Vec<Vec<K>>>,
}

impl<K: CacheKey, V: CacheValue> MapLoader<K, V> {
  pub fn new(entries: HashMap<K, V>) -> Self {
    Self {
      entries,
      fail: false,
      batches: Mutex::new(Vec::new()),
    }
  }

  pub fn failing() -> Self {
    Self {
      fail: true,
      ..Self::new(HashMap::new())
    }
  }

  pub fn batches(&self) -> Vec<Vec<K>> {
    self.batches.lock().clone()
  }
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> CacheLoader<K, V> for MapLoader<K, V> {
  async fn load(&self, key: &K) -> anyhow::Result<Option<V>> {
    Ok(self.entries.get(key).cloned())
  }

  async fn load_all(&self, keys: &[K]) -> anyhow::Result<HashMap<K, V>> {
    if self.fail {
      anyhow::bail!("loader unavailable");
    }
    self.batches.lock().push(keys.to_vec());
    Ok(
      keys
        .iter()
        .filter_map(|k| self.entries.get(k).map(|v| (k.clone(), v.clone())))
        .collect(),
    )
  }
}

/// Captures the outcome of a bulk load
#[derive(Default)]
pub struct CompletionRecorder {
  completed: AtomicUsize,
  failures: Mutex<Vec<String>>,
}

impl CompletionRecorder {
  pub fn completed(&self) -> usize {
    self.completed.load(Ordering::SeqCst)
  }

  pub fn failures(&self) -> Vec<String> {
    self.failures.lock().clone()
  }
}

impl CompletionListener for CompletionRecorder {
  fn on_completion(&self) {
    self.completed.fetch_add(1, Ordering::SeqCst);
  }

  fn on_exception(&self, error: CacheError) {
    self.failures.lock().push(error.to_string());
  }
}
