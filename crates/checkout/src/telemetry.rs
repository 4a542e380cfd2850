//! Metrics sinks for the checkout surface.
//!
//! Handlers report through these traits so tests can observe what was
//! recorded without installing a global recorder.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use domain::ReleaseExpiredResult;

/// Records reserve outcomes.
pub trait ReservationMetrics: Send + Sync {
    fn record_created(&self, ttl: Duration, line_count: usize);
    fn record_failure(&self, reason: &str);
}

/// Records maintenance cleanup runs.
pub trait CleanupMetrics: Send + Sync {
    fn record_run(&self, checked: usize, released: usize, already_released: usize, skipped: usize);
    fn record_failure(&self, code: &str);

    fn record_result(&self, result: &ReleaseExpiredResult) {
        self.record_run(
            result.checked_count,
            result.released_count,
            result.already_released_count,
            result.skipped_count,
        );
    }
}

/// Reports into the global `metrics` recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl ReservationMetrics for PrometheusMetrics {
    fn record_created(&self, ttl: Duration, line_count: usize) {
        metrics::counter!("checkout_reservations_created_total").increment(1);
        metrics::histogram!("checkout_reservation_ttl_seconds").record(ttl.as_secs_f64());
        metrics::histogram!("checkout_reservation_lines").record(line_count as f64);
    }

    fn record_failure(&self, reason: &str) {
        metrics::counter!("checkout_reservations_failed_total", "reason" => reason.to_string())
            .increment(1);
    }
}

impl CleanupMetrics for PrometheusMetrics {
    fn record_run(&self, checked: usize, released: usize, already_released: usize, skipped: usize) {
        metrics::counter!("maintenance_cleanup_runs_total").increment(1);
        metrics::counter!("maintenance_cleanup_checked_total").increment(checked as u64);
        metrics::counter!("maintenance_cleanup_processed_total")
            .increment((released + already_released + skipped) as u64);
    }

    fn record_failure(&self, code: &str) {
        metrics::counter!("maintenance_cleanup_failures_total", "code" => code.to_string())
            .increment(1);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl ReservationMetrics for NoopMetrics {
    fn record_created(&self, _ttl: Duration, _line_count: usize) {}
    fn record_failure(&self, _reason: &str) {}
}

impl CleanupMetrics for NoopMetrics {
    fn record_run(&self, _: usize, _: usize, _: usize, _: usize) {}
    fn record_failure(&self, _code: &str) {}
}

/// A cleanup run as seen by [`RecordingMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupRun {
    pub checked: usize,
    pub released: usize,
    pub already_released: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct Recorded {
    created: Vec<(Duration, usize)>,
    reserve_failures: Vec<String>,
    cleanup_runs: Vec<CleanupRun>,
    cleanup_failures: Vec<String>,
}

/// Keeps every call in memory. Cloned handles share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingMetrics {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<(Duration, usize)> {
        self.with(|r| r.created.clone())
    }

    pub fn reserve_failures(&self) -> Vec<String> {
        self.with(|r| r.reserve_failures.clone())
    }

    pub fn cleanup_runs(&self) -> Vec<CleanupRun> {
        self.with(|r| r.cleanup_runs.clone())
    }

    pub fn cleanup_failures(&self) -> Vec<String> {
        self.with(|r| r.cleanup_failures.clone())
    }

    fn with<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl ReservationMetrics for RecordingMetrics {
    fn record_created(&self, ttl: Duration, line_count: usize) {
        self.with(|r| r.created.push((ttl, line_count)));
    }

    fn record_failure(&self, reason: &str) {
        self.with(|r| r.reserve_failures.push(reason.to_string()));
    }
}

impl CleanupMetrics for RecordingMetrics {
    fn record_run(&self, checked: usize, released: usize, already_released: usize, skipped: usize) {
        self.with(|r| {
            r.cleanup_runs.push(CleanupRun {
                checked,
                released,
                already_released,
                skipped,
            })
        });
    }

    fn record_failure(&self, code: &str) {
        self.with(|r| r.cleanup_failures.push(code.to_string()));
    }
}
