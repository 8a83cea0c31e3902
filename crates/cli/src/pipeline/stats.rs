//! Pipeline statistics.

use std::time::Duration;

use acquisition::{AcquisitionError, AcquisitionMetricsSnapshot};
use construction::WorkerMetricsSnapshot;
use contracts::{QueueCapacities, QueueOccupancySample};
use dispatcher::{StorageMetricsSnapshot, ViewerMetricsSnapshot};
use observability::{DiagnosticsFiles, MetricsSummary};

/// Outcome of the acquisition loop
#[derive(Debug, Default)]
pub(super) struct AcquisitionReport {
    pub metrics: AcquisitionMetricsSnapshot,
    /// Images skipped after a recoverable error
    pub images_failed: u64,
    pub timepoints_completed: u32,
    /// Stopped early by timeout or signal
    pub cancelled: bool,
    /// Error that aborted the acquisition
    pub error: Option<AcquisitionError>,
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total duration of the run
    pub duration: Duration,

    /// Images the acquisition plan describes
    pub expected_images: u64,

    /// Producer-side counters
    pub acquisition: AcquisitionMetricsSnapshot,

    /// Acquisition events skipped after a recoverable error
    pub images_failed: u64,

    pub timepoints_completed: u32,

    /// Whether the acquisition was stopped before the plan completed
    pub cancelled: bool,

    /// Construction worker counters
    pub worker: WorkerMetricsSnapshot,

    /// Storage counters
    pub storage: StorageMetricsSnapshot,

    /// Viewer counters (None = no viewer)
    pub viewer: Option<ViewerMetricsSnapshot>,

    /// Storage write statistics
    pub write_summary: MetricsSummary,

    /// Stage capacities
    pub capacities: QueueCapacities,

    /// Largest sampled depth per stage (None = diagnostics disabled)
    pub peak_occupancy: Option<QueueOccupancySample>,

    pub mean_bytes_per_sec: f64,

    /// Written diagnostic tables
    pub diagnostics_files: Option<DiagnosticsFiles>,
}

impl PipelineStats {
    /// Constructed images per second
    pub fn images_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.worker.images_emitted as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Share of expected images that reached storage, as percentage
    pub fn completion_rate(&self) -> f64 {
        if self.expected_images > 0 {
            (self.storage.write_count as f64 / self.expected_images as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Time points: {}", self.timepoints_completed);
        println!(
            "   ├─ Images stored: {} / {} ({:.1}%)",
            self.storage.write_count,
            self.expected_images,
            self.completion_rate()
        );
        println!("   ├─ Images/s: {:.2}", self.images_per_sec());
        println!("   └─ Cancelled: {}", self.cancelled);

        let acq = &self.acquisition;
        println!("\nAcquisition");
        println!("   ├─ Events acquired: {}", acq.images_acquired);
        println!("   ├─ Events skipped: {}", self.images_failed);
        println!("   ├─ Units submitted: {}", acq.units_submitted);
        println!("   ├─ Frame read errors: {}", acq.frame_read_errors);
        println!("   ├─ Query fallbacks: {}", acq.query_fallbacks);
        println!(
            "   └─ Blocked puts: {} ({:.1} ms total)",
            acq.puts_blocked,
            acq.blocked_time.as_secs_f64() * 1000.0
        );

        let worker = &self.worker;
        println!("\nConstruction");
        println!("   ├─ Images constructed: {}", worker.images_emitted);
        println!("   ├─ Batches failed: {}", worker.batches_failed);
        println!("   ├─ Batches aborted: {}", worker.batches_aborted);
        println!("   └─ Signals forwarded: {}", worker.signals_forwarded);

        println!("\nOutputs");
        println!("   ├─ Write failures: {}", self.storage.failure_count);
        println!("   ├─ Rejected after finish: {}", self.storage.rejected_count);
        println!("   ├─ Throughput: {:.2} MiB/s", self.mean_bytes_per_sec / (1024.0 * 1024.0));
        match &self.viewer {
            Some(viewer) => println!(
                "   └─ Viewer: {} delivered, {} skipped",
                viewer.delivered, viewer.skipped
            ),
            None => println!("   └─ Viewer: disabled"),
        }

        if let Some(peak) = &self.peak_occupancy {
            let caps = &self.capacities;
            println!("\nPeak Queue Depth");
            println!("   ├─ Camera buffer: {} / {}", peak.buffer_depth, caps.buffer_capacity);
            println!(
                "   ├─ Construction queue: {} / {}",
                peak.construction_queue_depth, caps.construction_queue_capacity
            );
            println!(
                "   └─ Writing queue: {} / {}",
                peak.writing_queue_depth, caps.writing_queue_capacity
            );
        }

        if let Some(files) = &self.diagnostics_files {
            println!("\nDiagnostics");
            println!("   ├─ {}", files.queue_depths.display());
            println!("   └─ {}", files.throughput.display());
        }

        println!("\n{}", self.write_summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let stats = PipelineStats {
            duration: Duration::from_secs(2),
            expected_images: 20,
            worker: WorkerMetricsSnapshot {
                images_emitted: 10,
                ..Default::default()
            },
            storage: StorageMetricsSnapshot {
                write_count: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!((stats.images_per_sec() - 5.0).abs() < 1e-10);
        assert!((stats.completion_rate() - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_rates_of_empty_run() {
        let stats = PipelineStats::default();
        assert_eq!(stats.images_per_sec(), 0.0);
        assert_eq!(stats.completion_rate(), 0.0);
    }
}
