//! Pipeline metrics
//!
//! Thin wrappers over the `metrics` facade plus an in-memory aggregator for
//! the end-of-run summary.

use metrics::{counter, gauge, histogram};

/// Record the depth of a named queue
pub fn record_queue_depth(queue: &'static str, depth: usize) {
    gauge!("frame_constructor_queue_depth", "queue" => queue).set(depth as f64);
}

/// Record one constructed image and the time since acquisition start
pub fn record_image_constructed(filter: &'static str, elapsed_ms: f64) {
    counter!("frame_constructor_images_constructed_total", "filter" => filter).increment(1);
    histogram!("frame_constructor_construction_latency_ms").record(elapsed_ms);
}

/// Record a dropped batch
///
/// `reason` is `"aborted"` (incomplete batch interrupted) or `"integration"`.
pub fn record_batch_failed(reason: &'static str) {
    counter!("frame_constructor_batches_failed_total", "reason" => reason).increment(1);
}

/// Record time a producer spent blocked on a full construction queue
pub fn record_producer_blocked_ms(blocked_ms: f64) {
    counter!("frame_constructor_producer_blocked_total").increment(1);
    histogram!("frame_constructor_producer_blocked_ms").record(blocked_ms);
}

/// Record one image handed to storage and how long the write took
pub fn record_image_written(storage: &str, bytes: usize, write_ms: f64) {
    counter!(
        "frame_constructor_images_written_total",
        "storage" => storage.to_string()
    )
    .increment(1);
    counter!(
        "frame_constructor_bytes_written_total",
        "storage" => storage.to_string()
    )
    .increment(bytes as u64);
    histogram!("frame_constructor_write_latency_ms").record(write_ms);
}

/// Record a failed storage write
pub fn record_write_failed(storage: &str) {
    counter!(
        "frame_constructor_write_failures_total",
        "storage" => storage.to_string()
    )
    .increment(1);
}

/// Record a viewer notification, delivered or skipped because the viewer lags
pub fn record_viewer_notification(delivered: bool) {
    let status = if delivered { "delivered" } else { "skipped" };
    counter!("frame_constructor_viewer_notifications_total", "status" => status).increment(1);
}

/// Run-level aggregator
///
/// Fed from the storage "written" callback; read once at the end of the run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStatsAggregator {
    /// Images that reached storage
    pub images_written: u64,

    /// Payload bytes that reached storage
    pub bytes_written: u64,

    /// Storage write duration (ms)
    pub write_stats: RunningStats,

    /// Payload size per image (bytes)
    pub size_stats: RunningStats,
}

impl PipelineStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with one written image
    pub fn record_write(&mut self, bytes: usize, write_ms: f64) {
        self.images_written += 1;
        self.bytes_written += bytes as u64;
        self.write_stats.push(write_ms);
        self.size_stats.push(bytes as f64);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            images_written: self.images_written,
            bytes_written: self.bytes_written,
            write_ms: StatsSummary::from(&self.write_stats),
            image_bytes: StatsSummary::from(&self.size_stats),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Run summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub images_written: u64,
    pub bytes_written: u64,
    pub write_ms: StatsSummary,
    pub image_bytes: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Frame Construction Summary ===")?;
        writeln!(f, "Images written: {}", self.images_written)?;
        writeln!(
            f,
            "Bytes written: {} ({:.2} MiB)",
            self.bytes_written,
            self.bytes_written as f64 / (1024.0 * 1024.0)
        )?;
        writeln!(f, "Write time (ms): {}", self.write_ms)?;
        writeln!(f, "Image size (bytes): {}", self.image_bytes)?;
        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
