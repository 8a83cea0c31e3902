//! # Integration Tests
//!
//! End-to-end tests over the whole pipeline:
//! simulated camera -> acquisition -> construction worker -> storage / viewer.
//!
//! Covers:
//! - contract snapshots
//! - construction results per method
//! - backpressure, shutdown ordering and failure isolation
//! - diagnostics output

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_method_names_and_depths() {
        use contracts::{ConstructionMethod, PixelType};

        assert_eq!(ConstructionMethod::Average.filter_name(), "FrameAverage");
        assert_eq!(
            ConstructionMethod::Summation
                .output_pixel_type(PixelType::Gray8)
                .unwrap(),
            PixelType::Gray16
        );
        assert_eq!(
            ConstructionMethod::RankFilter
                .output_pixel_type(PixelType::Gray16)
                .unwrap(),
            PixelType::Gray16
        );
    }
}

#[cfg(test)]
mod harness {
    use std::sync::Arc;
    use std::time::Duration;

    use acquisition::{AcquisitionMetricsSnapshot, AcquisitionPipeline, SimulatedCamera};
    use construction::{ConstructionQueue, ConstructionWorker, WorkerMetricsSnapshot};
    use contracts::{
        AxesCoordinates, CameraConfig, ConstructionSettings, FramePattern, FrameSource,
        IntegratedImage, PixelData, PixelType, Signal, StorageConfig, StorageType,
    };
    use dispatcher::{OutputReport, OutputStagesBuilder};

    pub const WIDTH: u32 = 4;
    pub const HEIGHT: u32 = 2;

    pub fn camera(channels: u32, frames_per_image: u32, bytes_per_pixel: u32) -> Arc<SimulatedCamera> {
        Arc::new(
            SimulatedCamera::new(CameraConfig {
                name: "sim".to_string(),
                width: WIDTH,
                height: HEIGHT,
                channels,
                bytes_per_pixel,
                frames_per_image,
                exposure_ms: 5.0,
                buffer_capacity: 64,
                pattern: FramePattern::Constant,
                base_value: 7,
            })
            .unwrap(),
        )
    }

    /// Push uniform frames in capture order
    pub fn push_uniform(camera: &SimulatedCamera, pixel_type: PixelType, frames: &[(u32, u64)]) {
        let len = (WIDTH * HEIGHT) as usize;
        for &(channel, value) in frames {
            camera.push_frame(PixelData::uniform(pixel_type, len, value), channel);
        }
    }

    pub fn memory_storage(queue_capacity: usize) -> StorageConfig {
        StorageConfig {
            name: "memory".to_string(),
            storage_type: StorageType::Memory,
            queue_capacity,
        }
    }

    pub struct RunResult {
        pub images: Vec<IntegratedImage>,
        pub acquisition: AcquisitionMetricsSnapshot,
        pub worker: WorkerMetricsSnapshot,
        pub outputs: OutputReport,
    }

    impl RunResult {
        pub fn image_at(&self, time: u32, channel: u32) -> &IntegratedImage {
            let axes = AxesCoordinates::new(time, channel, 0, 0);
            self.images
                .iter()
                .find(|image| image.axes == axes)
                .unwrap_or_else(|| panic!("no image at t={time} c={channel}"))
        }
    }

    /// Acquire `events` images from frames already in the ring buffer
    ///
    /// Each event reads the newest frames, so callers pushing frames for one
    /// event at a time use `before_each` to stage them.
    pub async fn run_events(
        camera: Arc<SimulatedCamera>,
        settings: ConstructionSettings,
        queue_capacity: usize,
        events: u32,
        before_each: impl Fn(&SimulatedCamera, u32) + Send + 'static,
    ) -> RunResult {
        let (producer, consumer) = ConstructionQueue::bounded(queue_capacity);
        let pipeline = AcquisitionPipeline::new(
            Arc::clone(&camera) as Arc<dyn FrameSource>,
            producer,
            settings,
        )
        .unwrap();
        let stages = OutputStagesBuilder::new(memory_storage(16))
            .viewer_capacity(16)
            .build()
            .unwrap();
        let memory = stages.memory().cloned().unwrap();
        let worker = ConstructionWorker::spawn(consumer, stages.router()).unwrap();

        let (acquisition, worker) = tokio::task::spawn_blocking(move || {
            for time in 0..events {
                before_each(camera.as_ref(), time);
                let event = pipeline.event("acq", AxesCoordinates::new(time, 0, 0, 0));
                let _ = pipeline.acquire_image(event);
                pipeline.signal(Signal::TimepointFinished, None).unwrap();
            }
            pipeline.signal(Signal::AcquisitionFinished, None).unwrap();
            let acquisition = pipeline.finish().unwrap();
            (acquisition, worker.join().unwrap())
        })
        .await
        .unwrap();

        let outputs = stages.shutdown(Duration::from_secs(5)).await.unwrap();
        RunResult {
            images: memory.images(),
            acquisition,
            worker,
            outputs,
        }
    }
}

#[cfg(test)]
mod construction_tests {
    use super::harness::*;
    use contracts::tags::keys;
    use contracts::{ConstructionMethod, ConstructionSettings, PixelType};

    /// C=2, N=3, summation over 8-bit frames
    #[tokio::test]
    async fn test_summation_two_channels() {
        let camera = camera(2, 3, 1);
        let result = run_events(
            camera,
            ConstructionSettings::new(ConstructionMethod::Summation),
            16,
            1,
            |camera, _| {
                // Channel-minor capture order
                push_uniform(
                    camera,
                    PixelType::Gray8,
                    &[(0, 10), (1, 5), (0, 20), (1, 15), (0, 30), (1, 25)],
                );
            },
        )
        .await;

        assert_eq!(result.images.len(), 2);
        let ch0 = result.image_at(0, 0);
        let ch1 = result.image_at(0, 1);
        assert_eq!(ch0.pixels.pixel_type(), PixelType::Gray16);
        assert_eq!(ch0.pixels, contracts::PixelData::uniform(PixelType::Gray16, 8, 60));
        assert_eq!(ch1.pixels, contracts::PixelData::uniform(PixelType::Gray16, 8, 45));
        assert_eq!(ch0.tags.get_u64(keys::NUM_SUB_FRAMES), Some(3));
        assert_eq!(ch1.tags.get_u64(keys::CAMERA_CHANNEL_INDEX), Some(1));
        assert_eq!(ch0.tags.get_str(keys::CONSTRUCTION_FILTER), Some("FrameSummation"));
        assert_eq!(result.acquisition.units_submitted, 6);
        assert_eq!(result.worker.images_emitted, 2);
    }

    #[tokio::test]
    async fn test_average_keeps_depth() {
        let result = run_events(
            camera(1, 3, 2),
            ConstructionSettings::new(ConstructionMethod::Average),
            16,
            1,
            |camera, _| {
                push_uniform(camera, PixelType::Gray16, &[(0, 1000), (0, 2000), (0, 3000)]);
            },
        )
        .await;

        let image = result.image_at(0, 0);
        assert_eq!(image.pixels, contracts::PixelData::uniform(PixelType::Gray16, 8, 2000));
        assert_eq!(image.width, WIDTH);
        assert_eq!(image.height, HEIGHT);
    }

    #[tokio::test]
    async fn test_rank_filter_extremes() {
        for (rank, expected) in [(0.0, 10), (1.0, 30)] {
            let result = run_events(
                camera(1, 3, 1),
                ConstructionSettings::new(ConstructionMethod::RankFilter).with_rank(rank),
                16,
                1,
                |camera, _| {
                    push_uniform(camera, PixelType::Gray8, &[(0, 30), (0, 10), (0, 20)]);
                },
            )
            .await;

            let image = result.image_at(0, 0);
            assert_eq!(image.pixels.pixel_type(), PixelType::Gray8);
            assert_eq!(
                image.pixels,
                contracts::PixelData::uniform(PixelType::Gray8, 8, expected),
                "rank {rank}"
            );
        }
    }

    #[tokio::test]
    async fn test_images_reach_storage_in_acquisition_order() {
        let result = run_events(
            camera(2, 2, 1),
            ConstructionSettings::new(ConstructionMethod::Average),
            4,
            5,
            |camera, time| {
                let v = 10 * (time as u64 + 1);
                push_uniform(camera, PixelType::Gray8, &[(0, v), (1, v + 1), (0, v), (1, v + 1)]);
            },
        )
        .await;

        let order: Vec<(u32, u32)> = result
            .images
            .iter()
            .map(|image| (image.axes.time, image.axes.channel))
            .collect();
        let expected: Vec<(u32, u32)> = (0..5).flat_map(|t| [(t, 0), (t, 1)]).collect();
        assert_eq!(order, expected);
        assert_eq!(result.image_at(4, 1).pixels.sample(0), Some(51));
        assert_eq!(result.outputs.storage.timepoints_saved, 5);
        assert_eq!(result.outputs.viewer.map(|v| v.delivered + v.skipped), Some(10));
    }
}

#[cfg(test)]
mod failure_tests {
    use std::sync::Arc;

    use super::harness::*;
    use acquisition::{AcquisitionError, AcquisitionPipeline, QueryFailures};
    use construction::ConstructionQueue;
    use contracts::{ConstructionMethod, ConstructionSettings, FrameSource};

    /// A truncated sub-frame costs one image, not the acquisition
    #[tokio::test]
    async fn test_corrupted_frame_drops_only_its_batch() {
        let camera = camera(2, 2, 1);
        camera.corrupt_next_frames(1);
        let result = run_events(
            camera,
            ConstructionSettings::new(ConstructionMethod::Average),
            16,
            2,
            |camera, _| camera.snap_image(),
        )
        .await;

        assert_eq!(result.worker.batches_failed, 1);
        assert_eq!(result.images.len(), 3);
        assert!(result.images.iter().all(|image| image.axes != contracts::AxesCoordinates::new(0, 0, 0, 0)));
        assert_eq!(result.outputs.storage.write_count, 3);
    }

    #[tokio::test]
    async fn test_frames_per_image_fallback_still_constructs() {
        let camera = camera(1, 4, 1);
        camera.inject_query_failures(QueryFailures {
            frames_per_image: true,
            ..Default::default()
        });
        let result = run_events(
            camera,
            ConstructionSettings::new(ConstructionMethod::Summation),
            16,
            1,
            |camera, _| camera.snap_image(),
        )
        .await;

        // One sub-frame per image after the fallback
        assert_eq!(result.acquisition.query_fallbacks, 1);
        assert_eq!(result.acquisition.units_submitted, 1);
        assert_eq!(result.images.len(), 1);
        assert_eq!(result.image_at(0, 0).pixels.sample(0), Some(7));
    }

    #[test]
    fn test_channel_count_failure_is_fatal() {
        let camera = camera(2, 1, 1);
        camera.inject_query_failures(QueryFailures {
            channel_count: true,
            ..Default::default()
        });
        let (producer, _consumer) = ConstructionQueue::bounded(4);
        let result = AcquisitionPipeline::new(
            Arc::clone(&camera) as Arc<dyn FrameSource>,
            producer,
            ConstructionSettings::default(),
        );
        assert!(matches!(result, Err(AcquisitionError::Configuration { .. })));
    }

    #[test]
    fn test_summation_frame_limit_is_fatal() {
        // 8-bit summation into 16 bits supports at most 257 sub-frames
        let camera = camera(1, 300, 1);
        let (producer, _consumer) = ConstructionQueue::bounded(4);
        let pipeline = AcquisitionPipeline::new(
            Arc::clone(&camera) as Arc<dyn FrameSource>,
            producer,
            ConstructionSettings::new(ConstructionMethod::Summation),
        )
        .unwrap();
        let err = pipeline
            .acquire_image(pipeline.event("acq", contracts::AxesCoordinates::default()))
            .unwrap_err();
        assert!(err.is_fatal());
    }
}

#[cfg(test)]
mod flow_control_tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::harness::*;
    use acquisition::{AcquisitionError, AcquisitionPipeline};
    use construction::{ConstructionQueue, ConstructionWorker};
    use contracts::{
        AxesCoordinates, ConstructionMethod, ConstructionSettings, ContractError, FrameSource,
        ImageStorage, IntegratedImage, Signal,
    };
    use dispatcher::{OutputRouter, StorageHandle};

    struct SlowStorage {
        written: Arc<AtomicU64>,
        delay: Duration,
    }

    impl ImageStorage for SlowStorage {
        fn name(&self) -> &str {
            "slow"
        }

        async fn put_image(&mut self, _image: &IntegratedImage) -> Result<(), ContractError> {
            tokio::time::sleep(self.delay).await;
            self.written.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    /// A slow storage blocks the producer instead of losing images
    #[tokio::test]
    async fn test_slow_storage_backpressures_acquisition() {
        let camera = camera(1, 1, 1);
        let written = Arc::new(AtomicU64::new(0));
        let storage = StorageHandle::spawn(
            SlowStorage {
                written: Arc::clone(&written),
                delay: Duration::from_millis(20),
            },
            1,
            None,
        );

        let (producer, consumer) = ConstructionQueue::bounded(1);
        let pipeline = AcquisitionPipeline::new(
            Arc::clone(&camera) as Arc<dyn FrameSource>,
            producer,
            ConstructionSettings::new(ConstructionMethod::Average),
        )
        .unwrap();
        let worker =
            ConstructionWorker::spawn(consumer, OutputRouter::new(storage.sender(), None)).unwrap();

        let acquisition = tokio::task::spawn_blocking(move || {
            for time in 0..8 {
                camera.snap_image();
                pipeline
                    .acquire_image(pipeline.event("acq", AxesCoordinates::new(time, 0, 0, 0)))
                    .unwrap();
            }
            let acquisition = pipeline.finish().unwrap();
            worker.join().unwrap();
            acquisition
        })
        .await
        .unwrap();

        let snapshot = storage.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(acquisition.puts_blocked > 0);
        assert!(acquisition.blocked_time > Duration::ZERO);
        assert_eq!(written.load(Ordering::Relaxed), 8);
        assert_eq!(snapshot.failure_count, 0);
        assert!(snapshot.peak_queue_len <= 1);
    }

    /// Nothing is accepted once the worker has seen the shutdown signal
    #[tokio::test]
    async fn test_puts_after_shutdown_fail() {
        let camera = camera(1, 2, 1);
        let (producer, consumer) = ConstructionQueue::bounded(8);
        let pipeline = AcquisitionPipeline::new(
            Arc::clone(&camera) as Arc<dyn FrameSource>,
            producer,
            ConstructionSettings::default(),
        )
        .unwrap();
        let stages = dispatcher::OutputStagesBuilder::new(memory_storage(4))
            .build()
            .unwrap();
        let memory = stages.memory().cloned().unwrap();
        let worker = ConstructionWorker::spawn(consumer, stages.router()).unwrap();
        let late_producer = pipeline.producer();

        let (late, worker_stats) = tokio::task::spawn_blocking(move || {
            camera.snap_image();
            pipeline
                .acquire_image(pipeline.event("acq", AxesCoordinates::default()))
                .unwrap();
            pipeline.signal(Signal::AcquisitionFinished, None).unwrap();
            pipeline.finish().unwrap();
            let stats = worker.join().unwrap();
            let late = late_producer.put_blocking(contracts::SignalUnit::new(Signal::Flush, None));
            (late, stats)
        })
        .await
        .unwrap();

        assert!(matches!(late, Err(ContractError::QueueClosed { .. })));
        assert_eq!(worker_stats.images_emitted, 1);

        let report = stages.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.storage.write_count, 1);
        assert_eq!(memory.len(), 1);
        assert!(memory.is_closed());
    }

    #[test]
    fn test_queue_closed_is_fatal() {
        assert!(AcquisitionError::QueueClosed.is_fatal());
    }
}

#[cfg(test)]
mod config_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use acquisition::{AcquisitionPipeline, SimulatedCamera};
    use config_loader::{ConfigFormat, ConfigLoader};
    use construction::{ConstructionQueue, ConstructionWorker};
    use contracts::{AxesCoordinates, FrameSource, QueueCapacities, Signal};
    use dispatcher::OutputStagesBuilder;
    use observability::{write_diagnostics, DepthProbes, QueueOccupancyRecorder, ThroughputRecorder};

    const CONFIG: &str = r#"
[camera]
width = 8
height = 4
channels = 2
frames_per_image = 2
buffer_capacity = 32
pattern = "ramp"
base_value = 3

[construction]
method = "summation"

[acquisition]
timepoints = 3

[queue]
capacity = 4

[storage]
name = "memory"
storage_type = "memory"
queue_capacity = 2

[viewer]
enabled = false

[diagnostics]
sample_interval_ms = 1
"#;

    /// Blueprint-driven run with occupancy and throughput tables written
    #[tokio::test]
    async fn test_blueprint_run_writes_diagnostics() {
        let blueprint = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        let camera = Arc::new(SimulatedCamera::new(blueprint.camera.clone()).unwrap());

        let (producer, consumer) = ConstructionQueue::bounded(blueprint.queue.capacity);
        let pipeline = AcquisitionPipeline::new(
            Arc::clone(&camera) as Arc<dyn FrameSource>,
            producer,
            blueprint.construction.clone(),
        )
        .unwrap();
        // Recorders start late but keep the acquisition's time base
        let started = pipeline.acquisition_start();
        std::thread::sleep(Duration::from_millis(30));
        let throughput = Arc::new(ThroughputRecorder::starting_at(started));
        let stages = OutputStagesBuilder::from_blueprint(&blueprint)
            .on_written({
                let throughput = Arc::clone(&throughput);
                Arc::new(move |written: &contracts::ImageWritten| throughput.record(written.bytes))
            })
            .build()
            .unwrap();
        let memory = stages.memory().cloned().unwrap();
        let worker = ConstructionWorker::spawn(consumer, stages.router()).unwrap();

        let capacities = QueueCapacities {
            buffer_capacity: camera.buffer_capacity(),
            construction_queue_capacity: blueprint.queue.capacity,
            writing_queue_capacity: blueprint.storage.queue_capacity,
        };
        let recorder = QueueOccupancyRecorder::start_at(
            started,
            capacities,
            DepthProbes {
                buffer: Box::new({
                    let camera = Arc::clone(&camera);
                    move || camera.buffer_depth()
                }),
                construction_queue: Box::new({
                    let producer = pipeline.producer();
                    move || producer.len()
                }),
                writing_queue: Box::new(stages.storage().depth_probe()),
            },
            Duration::from_millis(blueprint.diagnostics.sample_interval_ms),
        )
        .unwrap();

        let timepoints = blueprint.acquisition.timepoints;
        tokio::task::spawn_blocking(move || {
            for time in 0..timepoints {
                camera.snap_image();
                pipeline
                    .acquire_image(pipeline.event("acq", AxesCoordinates::new(time, 0, 0, 0)))
                    .unwrap();
                pipeline.signal(Signal::TimepointFinished, None).unwrap();
            }
            pipeline.signal(Signal::AcquisitionFinished, None).unwrap();
            pipeline.finish().unwrap();
            worker.join().unwrap();
        })
        .await
        .unwrap();

        let report = stages.shutdown(Duration::from_secs(5)).await.unwrap();
        let occupancy = recorder.stop();
        assert!(report.viewer.is_none());
        assert_eq!(memory.len() as u64, blueprint.expected_images());

        // Ramp pattern: pixel (x=1) of channel 1 is 3 + 1 + 1, summed over 2 frames
        let image = memory.find(&AxesCoordinates::new(2, 1, 0, 0)).unwrap();
        assert_eq!(image.pixels.sample(1), Some(10));
        let image_elapsed = image.tags.get_u64(contracts::tags::keys::ELAPSED_TIME_MS).unwrap();
        assert!(occupancy.samples[0].elapsed_ms >= 30);

        let peak = occupancy.peak();
        assert!(peak.construction_queue_depth <= 4);
        assert!(peak.writing_queue_depth <= 2);

        let dir = tempfile::tempdir().unwrap();
        let files = write_diagnostics(dir.path(), &occupancy, &throughput.table()).unwrap();

        let depths = std::fs::read_to_string(&files.queue_depths).unwrap();
        let mut lines = depths.lines();
        assert_eq!(lines.next(), Some("32,4,2"));
        assert!(lines.all(|line| line.split(',').count() == 4));

        let samples: Vec<(u64, u64)> = std::fs::read_to_string(&files.throughput)
            .unwrap()
            .lines()
            .map(|line| {
                let mut cols = line.split(',').map(|c| c.parse::<u64>().unwrap());
                (cols.next().unwrap(), cols.next().unwrap())
            })
            .collect();
        assert!(samples[0].0 >= 30);
        // An image is tagged before it is written
        assert!(image_elapsed <= samples.last().unwrap().0);
        let rows: Vec<u64> = samples.iter().map(|&(_, bytes)| bytes).collect();
        assert_eq!(rows.len(), 6);
        assert!(rows.windows(2).all(|w| w[0] <= w[1]));
        // 8x4 16-bit images
        assert_eq!(rows.last().copied(), Some(6 * 64));
    }
}
