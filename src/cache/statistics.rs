//! Per-cache statistics counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic counters updated by cache operations while statistics are enabled
#[derive(Debug, Default)]
pub(crate) struct CacheStatistics {
  hits: AtomicU64,
  misses: AtomicU64,
  puts: AtomicU64,
  removals: AtomicU64,
  get_time_nanos: AtomicU64,
  put_time_nanos: AtomicU64,
  remove_time_nanos: AtomicU64,
}

fn nanos(elapsed: Duration) -> u64 {
  u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

impl CacheStatistics {
  pub fn record_hit(&self) {
    self.hits.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_miss(&self) {
    self.misses.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_put(&self) {
    self.puts.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_removal(&self) {
    self.removals.fetch_add(1, Ordering::Relaxed);
  }

  pub fn add_get_time(&self, elapsed: Duration) {
    self.get_time_nanos.fetch_add(nanos(elapsed), Ordering::Relaxed);
  }

  pub fn add_put_time(&self, elapsed: Duration) {
    self.put_time_nanos.fetch_add(nanos(elapsed), Ordering::Relaxed);
  }

  pub fn add_remove_time(&self, elapsed: Duration) {
    self.remove_time_nanos.fetch_add(nanos(elapsed), Ordering::Relaxed);
  }

  pub fn clear(&self) {
    for counter in [
      &self.hits,
      &self.misses,
      &self.puts,
      &self.removals,
      &self.get_time_nanos,
      &self.put_time_nanos,
      &self.remove_time_nanos,
    ] {
      counter.store(0, Ordering::Relaxed);
    }
  }

  pub fn view(&self, cache_name: &str) -> StatisticsView {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let puts = self.puts.load(Ordering::Relaxed);
    let removals = self.removals.load(Ordering::Relaxed);
    let get_time_nanos = self.get_time_nanos.load(Ordering::Relaxed);
    let put_time_nanos = self.put_time_nanos.load(Ordering::Relaxed);
    let remove_time_nanos = self.remove_time_nanos.load(Ordering::Relaxed);
    let gets = hits + misses;

    StatisticsView {
      cache_name: cache_name.to_string(),
      hits,
      misses,
      gets,
      puts,
      removals,
      hit_percentage: percentage(hits, gets),
      miss_percentage: percentage(misses, gets),
      average_get_micros: average_micros(get_time_nanos, gets),
      average_put_micros: average_micros(put_time_nanos, puts),
      average_remove_micros: average_micros(remove_time_nanos, removals),
      get_time_nanos,
      put_time_nanos,
      remove_time_nanos,
    }
  }
}

fn percentage(part: u64, total: u64) -> f64 {
  if total == 0 {
    0.0
  } else {
    part as f64 / total as f64 * 100.0
  }
}

fn average_micros(total_nanos: u64, count: u64) -> f64 {
  if count == 0 {
    0.0
  } else {
    total_nanos as f64 / count as f64 / 1000.0
  }
}

/// Read-only statistics projection of one cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsView {
  pub cache_name: String,
  pub hits: u64,
  pub misses: u64,
  pub gets: u64,
  pub puts: u64,
  pub removals: u64,
  pub hit_percentage: f64,
  pub miss_percentage: f64,
  pub average_get_micros: f64,
  pub average_put_micros: f64,
  pub average_remove_micros: f64,
  pub get_time_nanos: u64,
  pub put_time_nanos: u64,
  pub remove_time_nanos: u64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_view_has_no_rates() {
    let view = CacheStatistics::default().view("user");
    assert_eq!(view.gets, 0);
    assert_eq!(view.hit_percentage, 0.0);
    assert_eq!(view.average_get_micros, 0.0);
  }

  #[test]
  fn test_rates_and_averages() {
    let stats = CacheStatistics::default();
    stats.record_hit();
    stats.record_hit();
    stats.record_hit();
    stats.record_miss();
    stats.add_get_time(Duration::from_micros(8));
    stats.record_put();
    stats.add_put_time(Duration::from_micros(5));

    let view = stats.view("user");
    assert_eq!(view.gets, 4);
    assert_eq!(view.hit_percentage, 75.0);
    assert_eq!(view.miss_percentage, 25.0);
    assert_eq!(view.average_get_micros, 2.0);
    assert_eq!(view.average_put_micros, 5.0);
    assert_eq!(view.get_time_nanos, 8_000);
  }

  #[test]
  fn test_clear_resets_everything() {
    let stats = CacheStatistics::default();
    stats.record_removal();
    stats.add_remove_time(Duration::from_nanos(10));
    stats.clear();

    let view = stats.view("user");
    assert_eq!(view.removals, 0);
    assert_eq!(view.remove_time_nanos, 0);
  }
}
