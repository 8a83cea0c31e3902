//! Storage and viewer metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for one storage
#[derive(Debug, Default)]
pub struct StorageMetrics {
    /// Current writing queue length
    queue_len: AtomicUsize,
    /// Largest writing queue length seen
    peak_queue_len: AtomicUsize,
    /// Images written
    write_count: AtomicU64,
    /// Payload bytes written
    bytes_written: AtomicU64,
    /// Failed writes
    failure_count: AtomicU64,
    /// Signals handled (flush / timepoint / finish)
    signal_count: AtomicU64,
    /// Timepoints reported as saved
    timepoints_saved: AtomicU64,
    /// Images received after the storage finished
    rejected_count: AtomicU64,
}

impl StorageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Set current queue length (and track the peak)
    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
        self.peak_queue_len.fetch_max(len, Ordering::Relaxed);
    }

    pub fn peak_queue_len(&self) -> usize {
        self.peak_queue_len.load(Ordering::Relaxed)
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Record one successful write
    pub fn record_write(&self, bytes: usize) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_signal_count(&self) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timepoints_saved(&self) {
        self.timepoints_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected_count(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> StorageMetricsSnapshot {
        StorageMetricsSnapshot {
            queue_len: self.queue_len(),
            peak_queue_len: self.peak_queue_len(),
            write_count: self.write_count(),
            bytes_written: self.bytes_written(),
            failure_count: self.failure_count(),
            signal_count: self.signal_count.load(Ordering::Relaxed),
            timepoints_saved: self.timepoints_saved.load(Ordering::Relaxed),
            rejected_count: self.rejected_count.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of storage metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageMetricsSnapshot {
    pub queue_len: usize,
    pub peak_queue_len: usize,
    pub write_count: u64,
    pub bytes_written: u64,
    pub failure_count: u64,
    pub signal_count: u64,
    pub timepoints_saved: u64,
    pub rejected_count: u64,
}

/// Metrics for the viewer notification thread
#[derive(Debug, Default)]
pub struct ViewerMetrics {
    delivered: AtomicU64,
    skipped: AtomicU64,
}

impl ViewerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Notification skipped because the viewer lags behind
    pub fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ViewerMetricsSnapshot {
        ViewerMetricsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of viewer metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerMetricsSnapshot {
    pub delivered: u64,
    pub skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_queue_len_is_sticky() {
        let metrics = StorageMetrics::new();
        metrics.set_queue_len(3);
        metrics.set_queue_len(1);
        assert_eq!(metrics.queue_len(), 1);
        assert_eq!(metrics.peak_queue_len(), 3);
    }

    #[test]
    fn test_record_write_accumulates_bytes() {
        let metrics = StorageMetrics::new();
        metrics.record_write(100);
        metrics.record_write(28);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.write_count, 2);
        assert_eq!(snapshot.bytes_written, 128);
    }
}
