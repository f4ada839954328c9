//! Collection counters shared by every running source

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    rows_emitted: AtomicU64,
    rows_skipped: AtomicU64,
    pages_fetched: AtomicU64,
    retries: AtomicU64,
    artifacts_discovered: AtomicU64,
    artifacts_skipped: AtomicU64,
    listing_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows_emitted(&self, count: u64) {
        self.rows_emitted.fetch_add(count, Ordering::Relaxed);
        tracing::debug!(counter = "rows_emitted", count, "Metric incremented");
    }

    /// Boundary records rejected as already collected
    pub fn row_skipped(&self) {
        self.rows_skipped(1);
    }

    pub fn rows_skipped(&self, count: u64) {
        self.rows_skipped.fetch_add(count, Ordering::Relaxed);
        tracing::debug!(counter = "rows_skipped", count, "Metric incremented");
    }

    pub fn page_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "pages_fetched", "Metric incremented");
    }

    pub fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "retries", "Metric incremented");
    }

    pub fn artifact_discovered(&self) {
        self.artifacts_discovered.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "artifacts_discovered", "Metric incremented");
    }

    pub fn artifact_skipped(&self) {
        self.artifacts_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "artifacts_skipped", "Metric incremented");
    }

    pub fn listing_failed(&self) {
        self.listing_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "listing_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_emitted: self.rows_emitted.load(Ordering::Relaxed),
            rows_skipped: self.rows_skipped.load(Ordering::Relaxed),
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            artifacts_discovered: self.artifacts_discovered.load(Ordering::Relaxed),
            artifacts_skipped: self.artifacts_skipped.load(Ordering::Relaxed),
            listing_failures: self.listing_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub rows_emitted: u64,
    pub rows_skipped: u64,
    pub pages_fetched: u64,
    pub retries: u64,
    pub artifacts_discovered: u64,
    pub artifacts_skipped: u64,
    pub listing_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = Metrics::new();
        metrics.rows_emitted(3);
        metrics.rows_emitted(2);
        metrics.row_skipped();
        metrics.retry();
        metrics.listing_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rows_emitted, 5);
        assert_eq!(snapshot.rows_skipped, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.listing_failures, 1);
        assert_eq!(snapshot.pages_fetched, 0);
    }
}
