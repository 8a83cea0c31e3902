//! Queue occupancy and throughput diagnostics
//!
//! The occupancy recorder runs on its own thread and only reads depth
//! probes; it never puts to or takes from a pipeline queue. The throughput
//! recorder is fed from the storage worker and never takes a lock there.
//! Both tables count milliseconds from the same acquisition start.
//! Results are written as two CSV tables:
//!
//! - queue depths: first row holds the three capacities, then one row per
//!   sample `elapsed_ms, buffer_depth, construction_queue_depth, writing_queue_depth`
//! - throughput: one row per written image `timestamp_ms, cumulative_bytes_written`

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use contracts::{QueueCapacities, QueueOccupancySample, ThroughputSample};
use tracing::{debug, info, warn};

/// Name of the sampling thread
pub const SAMPLER_THREAD_NAME: &str = "queue-occupancy";

/// Reads the current depth of one queue
pub type DepthProbe = Box<dyn Fn() -> usize + Send>;

/// One probe per sampled stage
pub struct DepthProbes {
    pub buffer: DepthProbe,
    pub construction_queue: DepthProbe,
    pub writing_queue: DepthProbe,
}

impl DepthProbes {
    fn sample(&self, elapsed: Duration) -> QueueOccupancySample {
        QueueOccupancySample {
            elapsed_ms: elapsed.as_millis() as u64,
            buffer_depth: (self.buffer)(),
            construction_queue_depth: (self.construction_queue)(),
            writing_queue_depth: (self.writing_queue)(),
        }
    }
}

/// Periodic queue depth sampler
pub struct QueueOccupancyRecorder {
    capacities: QueueCapacities,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Vec<QueueOccupancySample>>>,
}

impl QueueOccupancyRecorder {
    /// Start sampling every `interval`, timestamps counted from now
    pub fn start(
        capacities: QueueCapacities,
        probes: DepthProbes,
        interval: Duration,
    ) -> Result<Self> {
        Self::start_at(Instant::now(), capacities, probes, interval)
    }

    /// Start sampling every `interval`, timestamps counted from `started`
    pub fn start_at(
        started: Instant,
        capacities: QueueCapacities,
        probes: DepthProbes,
        interval: Duration,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = std::thread::Builder::new()
            .name(SAMPLER_THREAD_NAME.to_string())
            .spawn({
                let stop = Arc::clone(&stop);
                move || sample_loop(&probes, started, interval, &stop)
            })
            .context("Failed to spawn queue occupancy sampler")?;

        debug!(interval_ms = interval.as_millis() as u64, "queue occupancy sampling started");
        Ok(Self {
            capacities,
            stop,
            handle: Some(handle),
        })
    }

    /// Stop sampling and collect the table
    pub fn stop(mut self) -> QueueOccupancyTable {
        self.stop.store(true, Ordering::Relaxed);
        let samples = match self.handle.take().map(JoinHandle::join) {
            Some(Ok(samples)) => samples,
            Some(Err(_)) => {
                warn!("queue occupancy sampler panicked, table is empty");
                Vec::new()
            }
            None => Vec::new(),
        };
        debug!(samples = samples.len(), "queue occupancy sampling stopped");
        QueueOccupancyTable {
            capacities: self.capacities,
            samples,
        }
    }
}

impl Drop for QueueOccupancyRecorder {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn sample_loop(
    probes: &DepthProbes,
    started: Instant,
    interval: Duration,
    stop: &AtomicBool,
) -> Vec<QueueOccupancySample> {
    let mut samples = Vec::new();
    while !stop.load(Ordering::Relaxed) {
        samples.push(probes.sample(started.elapsed()));
        std::thread::sleep(interval);
    }
    // Final sample shows the drained state
    samples.push(probes.sample(started.elapsed()));
    samples
}

/// Queue depth table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueOccupancyTable {
    pub capacities: QueueCapacities,
    pub samples: Vec<QueueOccupancySample>,
}

impl QueueOccupancyTable {
    /// Largest observed depth per stage
    pub fn peak(&self) -> QueueOccupancySample {
        self.samples
            .iter()
            .fold(QueueOccupancySample::default(), |peak, s| QueueOccupancySample {
                elapsed_ms: peak.elapsed_ms.max(s.elapsed_ms),
                buffer_depth: peak.buffer_depth.max(s.buffer_depth),
                construction_queue_depth: peak
                    .construction_queue_depth
                    .max(s.construction_queue_depth),
                writing_queue_depth: peak.writing_queue_depth.max(s.writing_queue_depth),
            })
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        // The capacity row is one column shorter than the sample rows
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(writer);
        let c = &self.capacities;
        writer
            .write_record(&[
                c.buffer_capacity.to_string(),
                c.construction_queue_capacity.to_string(),
                c.writing_queue_capacity.to_string(),
            ])
            .context("Failed to write capacity row")?;
        for s in &self.samples {
            writer
                .write_record(&[
                    s.elapsed_ms.to_string(),
                    s.buffer_depth.to_string(),
                    s.construction_queue_depth.to_string(),
                    s.writing_queue_depth.to_string(),
                ])
                .context("Failed to write queue depth row")?;
        }
        writer.flush().context("Failed to flush queue depth table")?;
        Ok(())
    }
}

/// Cumulative bytes written over time
///
/// Fed from the storage "written" callback. `record` appends to an unbounded
/// lock-free channel; the samples are only collected by `table`.
#[derive(Debug)]
pub struct ThroughputRecorder {
    started: Instant,
    cumulative_bytes: AtomicU64,
    tx: Sender<ThroughputSample>,
    rx: Receiver<ThroughputSample>,
    /// Samples already drained from the channel (reader side only)
    collected: Mutex<Vec<ThroughputSample>>,
}

impl ThroughputRecorder {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Recorder whose timestamps count from `started`
    pub fn starting_at(started: Instant) -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            started,
            cumulative_bytes: AtomicU64::new(0),
            tx,
            rx,
            collected: Mutex::new(Vec::new()),
        }
    }

    /// Time base of the throughput timestamps
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Add `bytes` and append a sample
    pub fn record(&self, bytes: usize) {
        let total = self
            .cumulative_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed)
            + bytes as u64;
        let sample = ThroughputSample {
            timestamp_ms: self.started.elapsed().as_millis() as u64,
            cumulative_bytes_written: total,
        };
        // Unbounded and never closed while `self` holds the receiver
        let _ = self.tx.try_send(sample);
    }

    pub fn total_bytes(&self) -> u64 {
        self.cumulative_bytes.load(Ordering::Relaxed)
    }

    pub fn table(&self) -> ThroughputTable {
        let mut collected = self
            .collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while let Ok(sample) = self.rx.try_recv() {
            collected.push(sample);
        }
        let mut samples = collected.clone();
        drop(collected);
        // Concurrent writers may append slightly out of order
        samples.sort_by_key(|s| (s.timestamp_ms, s.cumulative_bytes_written));
        ThroughputTable { samples }
    }
}

impl Default for ThroughputRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Throughput table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThroughputTable {
    pub samples: Vec<ThroughputSample>,
}

impl ThroughputTable {
    /// Mean throughput in bytes per second over the recorded span
    pub fn mean_bytes_per_sec(&self) -> f64 {
        match self.samples.last() {
            Some(last) if last.timestamp_ms > 0 => {
                last.cumulative_bytes_written as f64 * 1000.0 / last.timestamp_ms as f64
            }
            _ => 0.0,
        }
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for s in &self.samples {
            writer
                .write_record(&[
                    s.timestamp_ms.to_string(),
                    s.cumulative_bytes_written.to_string(),
                ])
                .context("Failed to write throughput row")?;
        }
        writer.flush().context("Failed to flush throughput table")?;
        Ok(())
    }
}

/// Paths of the written diagnostic tables
#[derive(Debug, Clone)]
pub struct DiagnosticsFiles {
    pub queue_depths: PathBuf,
    pub throughput: PathBuf,
}

/// Write both tables into `dir` with timestamped file names
pub fn write_diagnostics(
    dir: &Path,
    occupancy: &QueueOccupancyTable,
    throughput: &ThroughputTable,
) -> Result<DiagnosticsFiles> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create diagnostics directory {}", dir.display()))?;

    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let files = DiagnosticsFiles {
        queue_depths: dir.join(format!("queue_depths_{stamp}.csv")),
        throughput: dir.join(format!("throughput_{stamp}.csv")),
    };

    let file = File::create(&files.queue_depths)
        .with_context(|| format!("Failed to create {}", files.queue_depths.display()))?;
    occupancy.write_csv(file)?;

    let file = File::create(&files.throughput)
        .with_context(|| format!("Failed to create {}", files.throughput.display()))?;
    throughput.write_csv(file)?;

    info!(
        queue_depths = %files.queue_depths.display(),
        throughput = %files.throughput.display(),
        samples = occupancy.samples.len(),
        "diagnostics written"
    );
    Ok(files)
}
