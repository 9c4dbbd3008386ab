//! Reconciliation run metrics
//!
//! Thread-safe counters shared between the orchestrator and whoever drives it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Cloneable handle to the job's counters
#[derive(Debug, Clone, Default)]
pub struct ReconcileMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    runs_started: AtomicUsize,
    runs_succeeded: AtomicUsize,
    runs_failed: AtomicUsize,
    passes_completed: AtomicUsize,
    documents_removed: AtomicU64,
    dangling_groups: AtomicU64,
    total_duration_ms: AtomicU64,
}

impl ReconcileMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_run_start(&self) {
        self.inner.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pass that ran to completion, including its prune step
    pub fn record_pass(&self, removed: u64, dangling: u64) {
        self.inner.passes_completed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .documents_removed
            .fetch_add(removed, Ordering::Relaxed);
        self.inner
            .dangling_groups
            .fetch_add(dangling, Ordering::Relaxed);
    }

    pub fn record_run_success(&self, duration: Duration) {
        self.inner.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_run_failure(&self) {
        self.inner.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn runs_started(&self) -> usize {
        self.inner.runs_started.load(Ordering::Relaxed)
    }

    pub fn runs_succeeded(&self) -> usize {
        self.inner.runs_succeeded.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> usize {
        self.inner.runs_failed.load(Ordering::Relaxed)
    }

    pub fn passes_completed(&self) -> usize {
        self.inner.passes_completed.load(Ordering::Relaxed)
    }

    pub fn documents_removed(&self) -> u64 {
        self.inner.documents_removed.load(Ordering::Relaxed)
    }

    pub fn dangling_groups(&self) -> u64 {
        self.inner.dangling_groups.load(Ordering::Relaxed)
    }

    /// Average duration of successful runs
    pub fn avg_duration_ms(&self) -> f64 {
        let total_ms = self.inner.total_duration_ms.load(Ordering::Relaxed) as f64;
        let runs = self.runs_succeeded() as f64;

        if runs > 0.0 { total_ms / runs } else { 0.0 }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            runs_started: self.runs_started(),
            runs_succeeded: self.runs_succeeded(),
            runs_failed: self.runs_failed(),
            passes_completed: self.passes_completed(),
            documents_removed: self.documents_removed(),
            dangling_groups: self.dangling_groups(),
            avg_duration_ms: self.avg_duration_ms(),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub runs_started: usize,
    pub runs_succeeded: usize,
    pub runs_failed: usize,
    pub passes_completed: usize,
    pub documents_removed: u64,
    pub dangling_groups: u64,
    pub avg_duration_ms: f64,
}

impl MetricsSummary {
    pub fn log(&self) {
        log::info!("=== Reconciliation Metrics Summary ===");
        log::info!(
            "Runs: {} started, {} succeeded, {} failed",
            self.runs_started,
            self.runs_succeeded,
            self.runs_failed
        );
        log::info!(
            "Passes: {} completed, {} documents removed, {} dangling groups",
            self.passes_completed,
            self.documents_removed,
            self.dangling_groups
        );
        log::info!("Average run duration: {:.2}ms", self.avg_duration_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let summary = ReconcileMetrics::new().summary();
        assert_eq!(summary.runs_started, 0);
        assert_eq!(summary.passes_completed, 0);
        assert_eq!(summary.documents_removed, 0);
        assert_eq!(summary.avg_duration_ms, 0.0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = ReconcileMetrics::new();
        let handle = metrics.clone();

        handle.record_run_start();
        handle.record_pass(3, 1);
        handle.record_pass(0, 0);

        assert_eq!(metrics.runs_started(), 1);
        assert_eq!(metrics.passes_completed(), 2);
        assert_eq!(metrics.documents_removed(), 3);
        assert_eq!(metrics.dangling_groups(), 1);
    }

    #[test]
    fn test_average_duration_counts_successful_runs_only() {
        let metrics = ReconcileMetrics::new();
        metrics.record_run_success(Duration::from_millis(100));
        metrics.record_run_success(Duration::from_millis(300));
        metrics.record_run_failure();

        assert_eq!(metrics.avg_duration_ms(), 200.0);
        assert_eq!(metrics.runs_failed(), 1);
    }
}
