//! Run metrics and structured logging setup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Counters collected by the driver while a world runs.
pub struct Metrics {
    update_count: AtomicU64,
    facet_count: AtomicU64,
    checkpoint_count: AtomicU64,
    report_interval: u64,
    counters: Mutex<HashMap<String, AtomicU64>>,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Metrics {
    /// Creates a collector that logs progress every `report_interval` updates.
    #[must_use]
    pub fn new(report_interval: u64) -> Self {
        Self {
            update_count: AtomicU64::new(0),
            facet_count: AtomicU64::new(0),
            checkpoint_count: AtomicU64::new(0),
            report_interval: report_interval.max(1),
            counters: Mutex::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Records a completed world update with its duration.
    pub fn record_update(&self, update: i32, duration: Duration, facets: usize) {
        let count = self.update_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.facet_count.store(facets as u64, Ordering::Relaxed);

        if count.is_multiple_of(self.report_interval) {
            tracing::info!(
                update = update,
                facets = facets,
                duration_us = duration.as_micros() as u64,
                "World update"
            );
        }
    }

    pub fn record_checkpoint(&self, update: i32, path: &str) {
        self.checkpoint_count.fetch_add(1, Ordering::Relaxed);
        tracing::info!(update = update, path = path, "Checkpoint written");
    }

    /// Increments a named counter.
    pub fn increment_counter(&self, name: &str) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn facet_count(&self) -> u64 {
        self.facet_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn checkpoint_count(&self) -> u64 {
        self.checkpoint_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level` when set. Calling this twice is
/// harmless; the second subscriber is dropped.
pub fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(filter)
            .finish(),
    )
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new(10);
        assert_eq!(metrics.update_count(), 0);
        assert_eq!(metrics.checkpoint_count(), 0);
    }

    #[test]
    fn test_record_update() {
        let metrics = Metrics::new(2);
        metrics.record_update(0, Duration::from_millis(1), 4);
        metrics.record_update(1, Duration::from_millis(1), 5);
        assert_eq!(metrics.update_count(), 2);
        assert_eq!(metrics.facet_count(), 5);
    }

    #[test]
    fn test_counters() {
        let metrics = Metrics::default();
        metrics.increment_counter("restore.skipped");
        metrics.increment_counter("restore.skipped");
        assert_eq!(metrics.counter("restore.skipped"), 2);
        assert_eq!(metrics.counter("missing"), 0);
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging("debug");
        init_logging("info");
    }
}
