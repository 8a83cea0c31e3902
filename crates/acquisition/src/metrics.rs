//! Producer-side metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Acquisition metrics
#[derive(Debug, Default)]
pub struct AcquisitionMetrics {
    /// Events whose sub-frames were all enqueued
    pub images_acquired: AtomicU64,

    /// Batch units enqueued
    pub units_submitted: AtomicU64,

    /// Signals enqueued
    pub signals_submitted: AtomicU64,

    /// Puts that found the construction queue full
    pub puts_blocked: AtomicU64,

    /// Total time spent blocked in puts
    pub blocked_nanos: AtomicU64,

    /// Sub-frame reads that failed
    pub frame_read_errors: AtomicU64,

    /// Hardware queries answered with a fallback value
    pub query_fallbacks: AtomicU64,
}

impl AcquisitionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one enqueued unit and how long the put waited
    pub fn record_submitted(&self, waited: Duration, was_full: bool) {
        self.units_submitted.fetch_add(1, Ordering::Relaxed);
        if was_full {
            self.puts_blocked.fetch_add(1, Ordering::Relaxed);
        }
        self.blocked_nanos
            .fetch_add(waited.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record signal enqueued
    pub fn record_signal(&self) {
        self.signals_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record image acquired
    pub fn record_image(&self) {
        self.images_acquired.fetch_add(1, Ordering::Relaxed);
    }

    /// Record frame read error
    pub fn record_frame_read_error(&self) {
        self.frame_read_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record query fallback
    pub fn record_query_fallback(&self) {
        self.query_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> AcquisitionMetricsSnapshot {
        AcquisitionMetricsSnapshot {
            images_acquired: self.images_acquired.load(Ordering::Relaxed),
            units_submitted: self.units_submitted.load(Ordering::Relaxed),
            signals_submitted: self.signals_submitted.load(Ordering::Relaxed),
            puts_blocked: self.puts_blocked.load(Ordering::Relaxed),
            blocked_time: Duration::from_nanos(self.blocked_nanos.load(Ordering::Relaxed)),
            frame_read_errors: self.frame_read_errors.load(Ordering::Relaxed),
            query_fallbacks: self.query_fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionMetricsSnapshot {
    pub images_acquired: u64,
    pub units_submitted: u64,
    pub signals_submitted: u64,
    pub puts_blocked: u64,
    pub blocked_time: Duration,
    pub frame_read_errors: u64,
    pub query_fallbacks: u64,
}
