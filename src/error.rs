//! Error types

use thiserror::Error;

use crate::backend::BackendError;

/// Boxed error carried as the source of callback failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

/// Errors surfaced by caches, managers and the provider
#[derive(Debug, Error)]
pub enum CacheError {
  /// Illegal cache name or malformed locator
  #[error("configuration error: {0}")]
  Configuration(String),

  /// The backend has no primitive to support the operation
  #[error("{0} not supported by the backend")]
  Unsupported(&'static str),

  /// Operation on a closed cache or manager
  #[error("illegal state: {0}")]
  IllegalState(String),

  #[error("cache loader failed: {0}")]
  Loader(#[source] BoxError),

  #[error("cache writer failed: {0}")]
  Writer(#[source] BoxError),

  #[error("cache entry listener failed: {0}")]
  Listener(#[source] BoxError),

  #[error("entry processor failed: {0}")]
  Processor(#[source] BoxError),

  /// Unwrap target or declared key/value types do not match
  #[error("type mismatch: {0}")]
  TypeMismatch(String),

  #[error(transparent)]
  Backend(#[from] BackendError),

  #[error("value codec error: {0}")]
  Codec(#[from] serde_json::Error),
}

impl CacheError {
  pub(crate) fn loader(err: anyhow::Error) -> Self {
    CacheError::Loader(err.into())
  }

  pub(crate) fn writer(err: anyhow::Error) -> Self {
    CacheError::Writer(err.into())
  }

  pub(crate) fn listener(err: anyhow::Error) -> Self {
    CacheError::Listener(err.into())
  }

  pub(crate) fn processor(err: anyhow::Error) -> Self {
    CacheError::Processor(err.into())
  }
}
