// Run metrics
//
// Lightweight counters for processing runs and event relay, logged on shutdown.

use crate::models::{ErrorKind, ProcessingResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-wide run counters.
///
/// Atomic so the orchestrator's tasks and the UI thread can record without locks.
#[derive(Debug)]
pub struct Metrics {
    /// Runs submitted to the orchestrator
    pub runs_started: AtomicU64,

    /// Runs that exited with code 0
    pub runs_succeeded: AtomicU64,

    /// Runs that ended with any error kind other than cancellation
    pub runs_failed: AtomicU64,

    /// Runs cancelled by the user or killed by the timeout
    pub runs_cancelled: AtomicU64,

    /// Bytes read from child stdout/stderr and relayed to observers
    pub bytes_relayed: AtomicU64,

    /// Wall time spent in runs, in milliseconds
    pub total_run_time_ms: AtomicU64,

    /// Theme changes broadcast to windows
    pub theme_broadcasts: AtomicU64,

    /// UI updates dropped because the bridge channel was full
    pub ui_update_channel_full: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            runs_cancelled: AtomicU64::new(0),
            bytes_relayed: AtomicU64::new(0),
            total_run_time_ms: AtomicU64::new(0),
            theme_broadcasts: AtomicU64::new(0),
            ui_update_channel_full: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the terminal outcome of a run.
    pub fn record_run_finished(&self, result: &ProcessingResult) {
        match result.error_kind {
            None => self.runs_succeeded.fetch_add(1, Ordering::Relaxed),
            Some(ErrorKind::Cancelled) | Some(ErrorKind::TimedOut) => {
                self.runs_cancelled.fetch_add(1, Ordering::Relaxed)
            }
            Some(_) => self.runs_failed.fetch_add(1, Ordering::Relaxed),
        };
        self.record_run_time(result.duration);
    }

    pub fn record_run_time(&self, duration: Duration) {
        self.total_run_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_bytes_relayed(&self, bytes: usize) {
        self.bytes_relayed.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_theme_broadcast(&self) {
        self.theme_broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ui_channel_full(&self) {
        self.ui_update_channel_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average wall time of finished runs in milliseconds
    pub fn avg_run_time_ms(&self) -> f64 {
        let total = self.total_run_time_ms.load(Ordering::Relaxed);
        let count = self.runs_succeeded.load(Ordering::Relaxed)
            + self.runs_failed.load(Ordering::Relaxed)
            + self.runs_cancelled.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Run Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Runs: {} started, {} succeeded, {} failed, {} cancelled",
            self.runs_started.load(Ordering::Relaxed),
            self.runs_succeeded.load(Ordering::Relaxed),
            self.runs_failed.load(Ordering::Relaxed),
            self.runs_cancelled.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Run time: {:.2}s total (avg: {:.2}ms per run), {} bytes relayed",
            self.total_run_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_run_time_ms(),
            self.bytes_relayed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Theme broadcasts: {}, UI channel full: {}",
            self.theme_broadcasts.load(Ordering::Relaxed),
            self.ui_update_channel_full.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
