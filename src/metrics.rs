// Performance metrics module
//
// Lightweight counters for index builds and relink runs

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Relink engine metrics
///
/// Uses atomic operations so the coordinator, index tasks and the host can all
/// record without locks. Logged on shutdown or after each run.
#[derive(Debug)]
pub struct Metrics {
    /// Items rebound and verified
    pub items_relinked: AtomicUsize,

    /// Items whose candidate was rejected by the binder
    pub items_unbound: AtomicUsize,

    /// Items with no usable name or no match in the index
    pub items_not_found: AtomicUsize,

    /// Items whose processing panicked
    pub item_panics: AtomicUsize,

    /// Files in the most recent index
    pub files_indexed: AtomicUsize,

    /// Total time spent building indexes, in milliseconds
    pub index_build_time_ms: AtomicU64,

    /// Number of index builds that completed
    pub index_builds: AtomicU64,

    /// Number of ticks handled
    pub ticks: AtomicU64,

    /// Number of runs started
    pub runs_started: AtomicU64,

    /// Number of runs that ended cancelled
    pub runs_cancelled: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            items_relinked: AtomicUsize::new(0),
            items_unbound: AtomicUsize::new(0),
            items_not_found: AtomicUsize::new(0),
            item_panics: AtomicUsize::new(0),
            files_indexed: AtomicUsize::new(0),
            index_build_time_ms: AtomicU64::new(0),
            index_builds: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            runs_started: AtomicU64::new(0),
            runs_cancelled: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_relinked(&self) {
        self.items_relinked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unbound(&self) {
        self.items_unbound.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_found(&self) {
        self.items_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_item_panic(&self) {
        self.item_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished index build
    pub fn record_index_build(&self, files: usize, duration: Duration) {
        self.files_indexed.store(files, Ordering::Relaxed);
        self.index_builds.fetch_add(1, Ordering::Relaxed);
        self.index_build_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_cancelled(&self) {
        self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average index build time in milliseconds
    pub fn avg_index_build_time_ms(&self) -> f64 {
        let total = self.index_build_time_ms.load(Ordering::Relaxed);
        let count = self.index_builds.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Items processed across all runs
    pub fn items_processed(&self) -> usize {
        self.items_relinked.load(Ordering::Relaxed)
            + self.items_unbound.load(Ordering::Relaxed)
            + self.items_not_found.load(Ordering::Relaxed)
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Relink Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Runs: {} started, {} cancelled, {} ticks",
            self.runs_started.load(Ordering::Relaxed),
            self.runs_cancelled.load(Ordering::Relaxed),
            self.ticks.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Items: {} relinked, {} rejected, {} not found, {} panicked",
            self.items_relinked.load(Ordering::Relaxed),
            self.items_unbound.load(Ordering::Relaxed),
            self.items_not_found.load(Ordering::Relaxed),
            self.item_panics.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Index: {} files, {} builds (avg: {:.2}ms)",
            self.files_indexed.load(Ordering::Relaxed),
            self.index_builds.load(Ordering::Relaxed),
            self.avg_index_build_time_ms()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.items_relinked.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.items_processed(), 0);
    }

    #[test]
    fn test_record_item_outcomes() {
        let metrics = Metrics::new();

        metrics.record_relinked();
        metrics.record_relinked();
        metrics.record_unbound();
        metrics.record_not_found();
        metrics.record_item_panic();

        assert_eq!(metrics.items_relinked.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.items_processed(), 4);
        assert_eq!(metrics.item_panics.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_record_index_builds() {
        let metrics = Metrics::new();

        metrics.record_index_build(10, Duration::from_millis(100));
        metrics.record_index_build(12, Duration::from_millis(200));

        assert_eq!(metrics.files_indexed.load(Ordering::Relaxed), 12);
        assert_eq!(metrics.index_build_time_ms.load(Ordering::Relaxed), 300);
        assert_eq!(metrics.avg_index_build_time_ms(), 150.0);
    }

    #[test]
    fn test_avg_build_time_without_builds() {
        assert_eq!(Metrics::new().avg_index_build_time_ms(), 0.0);
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
