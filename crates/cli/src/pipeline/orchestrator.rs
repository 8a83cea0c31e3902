//! Pipeline orchestrator - wires camera, construction worker and output stages.
//!
//! Startup order: output stages, construction worker, occupancy sampler, then
//! the acquisition loop on a blocking thread. Teardown runs in reverse once the
//! acquisition has put its shutdown signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use acquisition::{AcquisitionError, AcquisitionPipeline, SimulatedCamera};
use anyhow::{Context, Result};
use construction::ConstructionQueue;
use contracts::{
    AcquisitionEvent, AcquisitionId, AcquisitionPlan, AxesCoordinates, FrameSource, ImageWritten,
    PipelineBlueprint, QueueCapacities, Signal, WrittenCallback,
};
use dispatcher::OutputStagesBuilder;
use observability::{
    write_diagnostics, DepthProbes, PipelineStatsAggregator, QueueOccupancyRecorder,
    ThroughputRecorder,
};
use tracing::{debug, error, info, warn};

use super::stats::AcquisitionReport;
use super::PipelineStats;
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The pipeline blueprint
    pub blueprint: PipelineBlueprint,

    /// Acquisition timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Time the storage may take to drain at shutdown
    pub storage_timeout: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
    stop: Arc<AtomicBool>,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends the acquisition after the current image
    ///
    /// Images already queued are still constructed and stored.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run the acquisition plan to completion
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let Self { config, stop } = self;
        let blueprint = config.blueprint;

        if let Some(port) = config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // 1. Camera and construction queue
        let camera = Arc::new(
            SimulatedCamera::new(blueprint.camera.clone())
                .map_err(|e| CliError::acquisition_setup(e.to_string()))?,
        );
        let (producer, consumer) = ConstructionQueue::bounded(blueprint.queue.capacity);
        let construction_queue_capacity = producer.capacity();

        // Fatal configuration problems surface here, before anything runs
        let acquisition = AcquisitionPipeline::new(
            Arc::clone(&camera) as Arc<dyn FrameSource>,
            producer,
            blueprint.construction.clone(),
        )
        .map_err(|e| CliError::acquisition_setup(e.to_string()))?;
        let summary = acquisition
            .summary_tags()
            .map_err(|e| CliError::acquisition_setup(e.to_string()))?;
        info!(
            tags = %serde_json::to_string(&summary).unwrap_or_default(),
            "Acquisition summary metadata"
        );

        // Image tags and both diagnostics tables count from here
        let acquisition_start = acquisition.acquisition_start();

        // 2. Output stages, fed through the written callback
        let throughput = Arc::new(ThroughputRecorder::starting_at(acquisition_start));
        // Write records are folded into the summary after shutdown
        let (written_tx, written_rx) = async_channel::unbounded::<(usize, f64)>();
        let on_written: WrittenCallback = {
            let throughput = Arc::clone(&throughput);
            Arc::new(move |written: &ImageWritten| {
                throughput.record(written.bytes);
                let write_ms = written.write_duration.as_secs_f64() * 1000.0;
                let _ = written_tx.try_send((written.bytes, write_ms));
            })
        };
        let stages = OutputStagesBuilder::from_blueprint(&blueprint)
            .on_written(on_written)
            .build()
            .context("Failed to start output stages")?;

        // 3. Construction worker
        let worker = construction::ConstructionWorker::spawn(consumer, stages.router())
            .context("Failed to start construction worker")?;

        // 4. Occupancy sampler
        let capacities = QueueCapacities {
            buffer_capacity: camera.buffer_capacity(),
            construction_queue_capacity,
            writing_queue_capacity: stages.storage().max_queue_len(),
        };
        let occupancy = if blueprint.diagnostics.enabled {
            let probes = DepthProbes {
                buffer: Box::new({
                    let camera = Arc::clone(&camera);
                    move || camera.buffer_depth()
                }),
                construction_queue: Box::new({
                    let producer = acquisition.producer();
                    move || producer.len()
                }),
                writing_queue: Box::new(stages.storage().depth_probe()),
            };
            Some(QueueOccupancyRecorder::start_at(
                acquisition_start,
                capacities,
                probes,
                Duration::from_millis(blueprint.diagnostics.sample_interval_ms),
            )?)
        } else {
            None
        };

        info!(
            timepoints = blueprint.acquisition.timepoints,
            expected_images = blueprint.expected_images(),
            method = blueprint.construction.method.filter_name(),
            "Pipeline started"
        );

        // 5. Acquisition loop (blocking puts, so off the async workers)
        let mut acquisition_task = tokio::task::spawn_blocking({
            let camera = Arc::clone(&camera);
            let plan = blueprint.acquisition.clone();
            let stop = Arc::clone(&stop);
            move || run_acquisition(&camera, acquisition, &plan, &stop)
        });

        let acquisition_result = match config.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut acquisition_task).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "Acquisition timeout reached, stopping");
                    stop.store(true, Ordering::Relaxed);
                    acquisition_task.await
                }
            },
            None => acquisition_task.await,
        };
        let report = acquisition_result.context("Acquisition task panicked")?;

        // 6. Teardown: worker exits on the shutdown signal, then the outputs drain
        let worker_stats = tokio::task::spawn_blocking(move || worker.join())
            .await
            .context("Construction worker join task failed")?
            .context("Construction worker failed")?;
        debug!(images = worker_stats.images_emitted, "Construction worker stopped");

        let outputs = stages
            .shutdown(config.storage_timeout)
            .await
            .map_err(|e| CliError::shutdown(e.to_string()))?;

        let occupancy_table = match occupancy {
            Some(recorder) => Some(
                tokio::task::spawn_blocking(move || recorder.stop())
                    .await
                    .context("Occupancy sampler join task failed")?,
            ),
            None => None,
        };

        let throughput_table = throughput.table();
        let diagnostics_files = match (&occupancy_table, &blueprint.diagnostics.output_dir) {
            (Some(table), Some(dir)) => Some(write_diagnostics(dir, table, &throughput_table)?),
            _ => None,
        };

        if let Some(e) = report.error {
            return Err(CliError::pipeline_execution(e.to_string()).into());
        }

        let mut aggregator = PipelineStatsAggregator::new();
        while let Ok((bytes, write_ms)) = written_rx.try_recv() {
            aggregator.record_write(bytes, write_ms);
        }
        let write_summary = aggregator.summary();

        Ok(PipelineStats {
            duration: start_time.elapsed(),
            expected_images: blueprint.expected_images(),
            acquisition: report.metrics,
            images_failed: report.images_failed,
            timepoints_completed: report.timepoints_completed,
            cancelled: report.cancelled,
            worker: worker_stats,
            storage: outputs.storage,
            viewer: outputs.viewer,
            write_summary,
            capacities,
            peak_occupancy: occupancy_table.as_ref().map(|t| t.peak()),
            mean_bytes_per_sec: throughput_table.mean_bytes_per_sec(),
            diagnostics_files,
        })
    }
}

/// Acquire every (time, slice, channel) image of the plan
///
/// Recoverable errors skip the image. A fatal error or a stop request ends
/// the loop; the finishing and shutdown signals are put either way.
fn run_acquisition(
    camera: &SimulatedCamera,
    acquisition: AcquisitionPipeline,
    plan: &AcquisitionPlan,
    stop: &AtomicBool,
) -> AcquisitionReport {
    let id = AcquisitionId::new(&plan.id);
    let mut report = AcquisitionReport::default();
    let mut fatal: Option<AcquisitionError> = None;
    let mut last_event: Option<Arc<AcquisitionEvent>> = None;

    'timepoints: for time in 0..plan.timepoints {
        for slice in 0..plan.slices {
            for channel in 0..plan.channels {
                if stop.load(Ordering::Relaxed) {
                    report.cancelled = true;
                    break 'timepoints;
                }
                camera.snap_image();
                let axes = AxesCoordinates::new(time, channel, slice, 0);
                match acquisition.acquire_image(acquisition.event(id.clone(), axes)) {
                    Ok(event) => last_event = Some(event),
                    Err(e) if e.is_fatal() => {
                        error!(time, channel, slice, error = %e, "Acquisition aborted");
                        fatal = Some(e);
                        break 'timepoints;
                    }
                    Err(e) => {
                        warn!(time, channel, slice, error = %e, "Image skipped");
                        report.images_failed += 1;
                    }
                }
            }
        }

        if let Err(e) = acquisition.signal(Signal::TimepointFinished, last_event.clone()) {
            fatal = Some(e);
            break;
        }
        report.timepoints_completed += 1;

        if plan.interval_ms > 0 && time + 1 < plan.timepoints {
            std::thread::sleep(Duration::from_millis(plan.interval_ms));
        }
    }

    if let Err(e) = acquisition.signal(Signal::AcquisitionFinished, last_event) {
        warn!(error = %e, "Could not signal acquisition end");
    }
    let metrics = acquisition.metrics();
    if let Err(e) = acquisition.finish() {
        warn!(error = %e, "Could not put shutdown signal");
        fatal.get_or_insert(e);
    }
    report.metrics = metrics.snapshot();
    report.error = fatal;
    report
}
