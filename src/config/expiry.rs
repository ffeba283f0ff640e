//! Expiry policies

use std::time::Duration;

use crate::backend::NO_EXPIRY;

/// How long an entry lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryDuration {
  Eternal,
  After(Duration),
}

impl ExpiryDuration {
  pub fn is_eternal(&self) -> bool {
    matches!(self, ExpiryDuration::Eternal)
  }

  /// Absolute expiry in unix seconds, or [`NO_EXPIRY`] for eternal entries.
  /// `now_millis` is truncated together with the duration, not before.
  /// Durations past the end of the clock saturate instead of wrapping.
  pub fn expires_at(&self, now_millis: i64) -> u64 {
    match self {
      ExpiryDuration::Eternal => NO_EXPIRY,
      ExpiryDuration::After(duration) => {
        let now = now_millis.max(0) as u128;
        u64::try_from((now + duration.as_millis()) / 1000).unwrap_or(u64::MAX)
      }
    }
  }
}

/// Decides the lifetime of newly written entries
pub trait ExpiryPolicy: Send + Sync + std::fmt::Debug {
  fn expiry_for_creation(&self) -> ExpiryDuration;
}

/// Entries never expire
#[derive(Debug, Clone, Copy, Default)]
pub struct EternalExpiryPolicy;

impl ExpiryPolicy for EternalExpiryPolicy {
  fn expiry_for_creation(&self) -> ExpiryDuration {
    ExpiryDuration::Eternal
  }
}

/// Entries expire a fixed duration after they were written
#[derive(Debug, Clone, Copy)]
pub struct CreatedExpiryPolicy {
  duration: ExpiryDuration,
}

impl CreatedExpiryPolicy {
  pub fn new(duration: Duration) -> Self {
    Self {
      duration: ExpiryDuration::After(duration),
    }
  }
}

impl ExpiryPolicy for CreatedExpiryPolicy {
  fn expiry_for_creation(&self) -> ExpiryDuration {
    self.duration
  }
}
