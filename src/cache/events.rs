//! Cache entry events and listener dispatch

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::{CacheKey, CacheValue};
use crate::error::{CacheError, Result};

/// Kind of change an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
  Created,
  Updated,
  Removed,
}

impl fmt::Display for EventType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EventType::Created => write!(f, "created"),
      EventType::Updated => write!(f, "updated"),
      EventType::Removed => write!(f, "removed"),
    }
  }
}

/// A single entry change
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntryEvent<K, V> {
  pub cache_name: String,
  pub event_type: EventType,
  pub key: K,
  pub value: Option<V>,
  pub old_value: Option<V>,
}

impl<K: CacheKey, V: CacheValue> CacheEntryEvent<K, V> {
  pub fn new(cache_name: &str, event_type: EventType, key: K, value: Option<V>) -> Self {
    Self {
      cache_name: cache_name.to_string(),
      event_type,
      key,
      value,
      old_value: None,
    }
  }

  pub fn with_old_value(mut self, old_value: Option<V>) -> Self {
    self.old_value = old_value;
    self
  }
}

/// Receives entry events.
///
/// `handles` declares which event types the listener wants; only the matching
/// callbacks are ever invoked. An error returned from a callback propagates to
/// the caller of the cache operation that raised the event.
pub trait CacheEntryListener<K: CacheKey, V: CacheValue>: Send + Sync {
  fn handles(&self, event_type: EventType) -> bool;

  fn on_created(&self, _events: &[CacheEntryEvent<K, V>]) -> anyhow::Result<()> {
    Ok(())
  }

  fn on_updated(&self, _events: &[CacheEntryEvent<K, V>]) -> anyhow::Result<()> {
    Ok(())
  }

  fn on_removed(&self, _events: &[CacheEntryEvent<K, V>]) -> anyhow::Result<()> {
    Ok(())
  }
}

/// Optional predicate narrowing which events reach a listener
pub trait CacheEntryEventFilter<K: CacheKey, V: CacheValue>: Send + Sync {
  fn evaluate(&self, event: &CacheEntryEvent<K, V>) -> bool;
}

impl<K, V, F> CacheEntryEventFilter<K, V> for F
where
  K: CacheKey,
  V: CacheValue,
  F: Fn(&CacheEntryEvent<K, V>) -> bool + Send + Sync,
{
  fn evaluate(&self, event: &CacheEntryEvent<K, V>) -> bool {
    self(event)
  }
}

/// A listener together with its optional filter.
///
/// Two configurations are equal when they share the same listener and filter
/// instances and agree on `old_value_required`.
pub struct ListenerConfiguration<K: CacheKey, V: CacheValue> {
  listener: Arc<dyn CacheEntryListener<K, V>>,
  filter: Option<Arc<dyn CacheEntryEventFilter<K, V>>>,
  old_value_required: bool,
}

impl<K: CacheKey, V: CacheValue> ListenerConfiguration<K, V> {
  pub fn new(listener: Arc<dyn CacheEntryListener<K, V>>) -> Self {
    Self {
      listener,
      filter: None,
      old_value_required: false,
    }
  }

  pub fn with_filter(mut self, filter: Arc<dyn CacheEntryEventFilter<K, V>>) -> Self {
    self.filter = Some(filter);
    self
  }

  pub fn with_old_value_required(mut self, required: bool) -> Self {
    self.old_value_required = required;
    self
  }

  pub fn listener(&self) -> &Arc<dyn CacheEntryListener<K, V>> {
    &self.listener
  }

  pub fn filter(&self) -> Option<&Arc<dyn CacheEntryEventFilter<K, V>>> {
    self.filter.as_ref()
  }

  pub fn is_old_value_required(&self) -> bool {
    self.old_value_required
  }

  fn accepts(&self, event: &CacheEntryEvent<K, V>) -> bool {
    self
      .filter
      .as_ref()
      .map(|filter| filter.evaluate(event))
      .unwrap_or(true)
  }
}

impl<K: CacheKey, V: CacheValue> Clone for ListenerConfiguration<K, V> {
  fn clone(&self) -> Self {
    Self {
      listener: self.listener.clone(),
      filter: self.filter.clone(),
      old_value_required: self.old_value_required,
    }
  }
}

impl<K: CacheKey, V: CacheValue> PartialEq for ListenerConfiguration<K, V> {
  fn eq(&self, other: &Self) -> bool {
    let same_filter = match (&self.filter, &other.filter) {
      (Some(a), Some(b)) => Arc::ptr_eq(a, b),
      (None, None) => true,
      _ => false,
    };
    Arc::ptr_eq(&self.listener, &other.listener)
      && same_filter
      && self.old_value_required == other.old_value_required
  }
}

impl<K: CacheKey, V: CacheValue> fmt::Debug for ListenerConfiguration<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ListenerConfiguration")
      .field("filtered", &self.filter.is_some())
      .field("old_value_required", &self.old_value_required)
      .finish()
  }
}

/// Live listener registrations of one cache
pub(crate) struct ListenerRegistry<K: CacheKey, V: CacheValue> {
  registrations: RwLock<Vec<Arc<ListenerConfiguration<K, V>>>>,
}

impl<K: CacheKey, V: CacheValue> ListenerRegistry<K, V> {
  pub fn new(configurations: Vec<ListenerConfiguration<K, V>>) -> Self {
    Self {
      registrations: RwLock::new(configurations.into_iter().map(Arc::new).collect()),
    }
  }

  /// Returns false when an equal registration already exists
  pub fn register(&self, configuration: ListenerConfiguration<K, V>) -> bool {
    let mut registrations = self.registrations.write();
    if registrations.iter().any(|r| **r == configuration) {
      return false;
    }
    registrations.push(Arc::new(configuration));
    true
  }

  pub fn deregister(&self, configuration: &ListenerConfiguration<K, V>) -> bool {
    let mut registrations = self.registrations.write();
    let before = registrations.len();
    registrations.retain(|r| **r != *configuration);
    registrations.len() != before
  }

  pub fn is_empty(&self) -> bool {
    self.registrations.read().is_empty()
  }

  /// Copy of the current registrations; dispatch iterates this so concurrent
  /// register/deregister calls never block on a running listener.
  pub fn snapshot(&self) -> Vec<Arc<ListenerConfiguration<K, V>>> {
    self.registrations.read().clone()
  }
}

/// Collects events raised by one operation and delivers them by type
pub(crate) struct EventDispatcher<K: CacheKey, V: CacheValue> {
  events: Vec<CacheEntryEvent<K, V>>,
}

impl<K: CacheKey, V: CacheValue> EventDispatcher<K, V> {
  pub fn new() -> Self {
    Self { events: Vec::new() }
  }

  pub fn add_event(&mut self, event: CacheEntryEvent<K, V>) {
    self.events.push(event);
  }

  /// Deliver created, then updated, then removed events. Within a type,
  /// registrations are visited in registration order.
  pub fn dispatch(self, registrations: &[Arc<ListenerConfiguration<K, V>>]) -> Result<()> {
    if self.events.is_empty() || registrations.is_empty() {
      return Ok(());
    }

    for event_type in [EventType::Created, EventType::Updated, EventType::Removed] {
      let events: Vec<&CacheEntryEvent<K, V>> = self
        .events
        .iter()
        .filter(|e| e.event_type == event_type)
        .collect();
      if events.is_empty() {
        continue;
      }

      for registration in registrations {
        if !registration.listener.handles(event_type) {
          continue;
        }

        let selected: Vec<CacheEntryEvent<K, V>> = events
          .iter()
          .filter(|e| registration.accepts(e))
          .map(|e| {
            let mut event = (*e).clone();
            if !registration.old_value_required {
              event.old_value = None;
            }
            event
          })
          .collect();
        if selected.is_empty() {
          continue;
        }

        let listener = &registration.listener;
        let delivered = match event_type {
          EventType::Created => listener.on_created(&selected),
          EventType::Updated => listener.on_updated(&selected),
          EventType::Removed => listener.on_removed(&selected),
        };
        delivered.map_err(CacheError::listener)?;
      }
    }

    Ok(())
  }
}
