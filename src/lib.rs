//! JCache-style caching over a flat remote key-value backend
//!
//! Exposes a full cache contract on top of a backend that only knows how to:
//! - get a value by key
//! - set a value with an absolute expiry
//! - delete a key
//! - atomically replace a value that is already present
//!
//! Everything else (read-through, write-through, listeners, entry processors,
//! statistics) is composed around those four primitives. Operations the
//! backend cannot express (iteration, clearing, cardinality) fail with
//! [`CacheError::Unsupported`].

pub mod backend;
pub mod cache;
pub mod config;
mod error;
pub mod manager;
pub mod provider;

pub use backend::{Backend, BackendConnector, BackendError, InMemoryBackend, InMemoryConnector};
pub use cache::{
  Cache, CacheEntry, CacheEntryEvent, CacheEntryEventFilter, CacheEntryListener, CacheKey,
  CacheLoader, CacheMap, CacheValue, CacheWriter, CompletionListener, EntryProcessor, EntryView,
  EventType, ListenerConfiguration, StatisticsView, UnwrapKind, Unwrapped,
};
pub use config::{
  CacheConfiguration, CompleteConfiguration, ConfigurationView, CreatedExpiryPolicy,
  EternalExpiryPolicy, ExpiryDuration, ExpiryPolicy, Locator, ProviderConfig, ServerAddress,
  TypeDescriptor,
};
pub use error::{BoxError, CacheError, Result};
pub use manager::CacheManager;
pub use provider::{CachingProvider, OptionalFeature, Properties, Scope};
