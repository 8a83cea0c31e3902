//! Acquisition pipeline (producer side)
//!
//! Reads the sub-frames of one logical image out of the camera ring buffer and
//! submits them to the construction queue. A put on a full queue blocks the
//! producer until the worker drains a unit; nothing is ever dropped.
//!
//! The pipeline may be shared by several producer threads. The units of one
//! image and every signal are enqueued under a submission lock, so the queue
//! only ever holds whole batches back to back.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use construction::QueueProducer;
use contracts::{
    AcquisitionEvent, AcquisitionId, AxesCoordinates, ConstructionMethod, ConstructionSettings,
    FrameBatchUnit, FrameSource, ImageTags, PixelType, QueueUnit, Signal, SignalUnit,
};
use observability::metrics as obs;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{AcquisitionError, Result};
use crate::metrics::{AcquisitionMetrics, AcquisitionMetricsSnapshot};
use crate::reorder::FrameReorderer;

/// Producer that feeds the construction queue
pub struct AcquisitionPipeline {
    source: Arc<dyn FrameSource>,
    producer: QueueProducer,
    settings: ConstructionSettings,
    camera_channels: u32,
    input_type: PixelType,
    acquisition_start: Instant,
    metrics: Arc<AcquisitionMetrics>,
    /// Held while one image's units (or a signal) are enqueued
    submit: Mutex<()>,
}

impl std::fmt::Debug for AcquisitionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionPipeline")
            .field("source", &self.source.name())
            .field("camera_channels", &self.camera_channels)
            .field("input_type", &self.input_type)
            .field("method", &self.settings.method)
            .finish()
    }
}

impl AcquisitionPipeline {
    /// Query the camera once and check the construction settings against it
    ///
    /// # Errors
    /// `Configuration` when the channel count or pixel depth cannot be
    /// determined, or when the settings cannot be applied to this camera.
    #[instrument(name = "acquisition_pipeline_new", skip_all, fields(source = source.name()))]
    pub fn new(
        source: Arc<dyn FrameSource>,
        producer: QueueProducer,
        settings: ConstructionSettings,
    ) -> Result<Self> {
        let camera_channels = source.camera_channel_count().map_err(|e| {
            AcquisitionError::configuration(format!("cannot determine camera channel count: {e}"))
        })?;
        if camera_channels == 0 {
            return Err(AcquisitionError::configuration(
                "camera reports 0 channels",
            ));
        }

        let bytes_per_pixel = source.bytes_per_pixel().map_err(|e| {
            AcquisitionError::configuration(format!("cannot determine bytes per pixel: {e}"))
        })?;
        let input_type = PixelType::from_bytes_per_pixel(bytes_per_pixel).ok_or_else(|| {
            AcquisitionError::configuration(format!(
                "unsupported bytes per pixel {bytes_per_pixel}"
            ))
        })?;

        if settings.method == ConstructionMethod::RankFilter
            && !(0.0..=1.0).contains(&settings.rank)
        {
            return Err(AcquisitionError::configuration(format!(
                "rank must be in [0, 1], got {}",
                settings.rank
            )));
        }
        settings
            .method
            .output_pixel_type(input_type)
            .map_err(|e| AcquisitionError::configuration(e.to_string()))?;

        let raw_width = source.image_width();
        for channel in 0..camera_channels {
            let offset = settings.channel_offset(channel);
            let width = settings.output_width(raw_width, channel);
            if width == 0 || offset as u64 + width as u64 > raw_width as u64 {
                return Err(AcquisitionError::configuration(format!(
                    "channel {channel}: offset {offset} + width {width} exceeds raw width {raw_width}"
                )));
            }
        }

        info!(
            channels = camera_channels,
            pixel_type = input_type.as_tag(),
            method = settings.method.filter_name(),
            queue_capacity = producer.capacity(),
            "acquisition pipeline ready"
        );

        Ok(Self {
            source,
            producer,
            settings,
            camera_channels,
            input_type,
            acquisition_start: Instant::now(),
            metrics: Arc::new(AcquisitionMetrics::new()),
            submit: Mutex::new(()),
        })
    }

    /// Camera channels interleaved in the ring buffer
    pub fn camera_channels(&self) -> u32 {
        self.camera_channels
    }

    /// Raw sample type
    pub fn input_type(&self) -> PixelType {
        self.input_type
    }

    pub fn settings(&self) -> &ConstructionSettings {
        &self.settings
    }

    /// Acquisition-level metadata for storage: output pixel type, filter and rank
    pub fn summary_tags(&self) -> Result<ImageTags> {
        let width = self.settings.output_width(self.source.image_width(), 0);
        contracts::summary_tags(&self.settings, self.input_type, width, self.source.image_height())
            .map_err(|e| AcquisitionError::configuration(e.to_string()))
    }

    /// Time base of the `ElapsedTime-ms` tag and of the diagnostics tables
    pub fn acquisition_start(&self) -> Instant {
        self.acquisition_start
    }

    /// Shared handle to the producer metrics
    pub fn metrics(&self) -> Arc<AcquisitionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Another producer handle onto the same queue
    pub fn producer(&self) -> QueueProducer {
        self.producer.clone()
    }

    /// New event for the image at `axes`
    pub fn event(&self, acquisition_id: impl Into<AcquisitionId>, axes: AxesCoordinates) -> AcquisitionEvent {
        AcquisitionEvent::new(
            acquisition_id,
            axes,
            self.settings.clone(),
            self.acquisition_start,
        )
    }

    /// Read every sub-frame of one logical image and submit them
    ///
    /// All `C x N` frames are read before the first put, so a failed read
    /// never leaves a partial batch in the queue.
    ///
    /// # Errors
    /// `FrameRead` (recoverable, nothing was enqueued), `QueueClosed` once the
    /// worker has shut down, `Configuration` when the sub-frame count exceeds
    /// what the construction method supports.
    #[instrument(
        name = "acquire_image",
        skip(self, event),
        fields(time = event.axes.time, channel = event.axes.channel)
    )]
    pub fn acquire_image(&self, mut event: AcquisitionEvent) -> Result<Arc<AcquisitionEvent>> {
        let (num_frames, fallback) = FrameReorderer::resolve_num_frames(self.source.as_ref());
        if fallback {
            self.metrics.record_query_fallback();
        }
        self.settings
            .method
            .check_num_frames(self.input_type, num_frames)
            .map_err(|e| AcquisitionError::configuration(e.to_string()))?;

        event.exposure_ms = match self.source.exposure_ms() {
            Ok(exposure) => Some(exposure),
            Err(e) => {
                warn!(error = %e, "cannot query exposure, image will carry no exposure tag");
                self.metrics.record_query_fallback();
                None
            }
        };
        let event = Arc::new(event);
        let reorderer = FrameReorderer::new(self.camera_channels, num_frames)?;

        let frames = reorderer
            .batch_order()
            .map(|(channel, offset)| {
                self.source
                    .nth_frame_before_last(offset)
                    .map(|frame| (channel, frame))
                    .map_err(|source| {
                        self.metrics.record_frame_read_error();
                        AcquisitionError::FrameRead { offset, source }
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let _submit = self.lock_submit();
        for (channel_index, frame) in frames {
            let unit = FrameBatchUnit {
                frame,
                event: Arc::clone(&event),
                num_channels: self.camera_channels,
                channel_index,
                arrived_at: Instant::now(),
                num_frames,
            };
            let (waited, was_full) = self.put(unit)?;
            self.metrics.record_submitted(waited, was_full);
        }

        self.metrics.record_image();
        debug!(
            num_frames,
            channels = self.camera_channels,
            depth = self.producer.len(),
            "image submitted"
        );
        Ok(event)
    }

    /// Enqueue a signal behind every unit already submitted
    pub fn signal(&self, signal: Signal, event: Option<Arc<AcquisitionEvent>>) -> Result<()> {
        let _submit = self.lock_submit();
        self.put(SignalUnit::new(signal, event))?;
        self.metrics.record_signal();
        debug!(?signal, "signal submitted");
        Ok(())
    }

    /// Enqueue the shutdown signal after the last real unit
    #[instrument(name = "acquisition_finish", skip(self))]
    pub fn finish(self) -> Result<AcquisitionMetricsSnapshot> {
        {
            let _submit = self.lock_submit();
            self.put(SignalUnit::shutdown())?;
        }
        self.metrics.record_signal();
        let snapshot = self.metrics.snapshot();
        info!(
            images = snapshot.images_acquired,
            units = snapshot.units_submitted,
            blocked_ms = snapshot.blocked_time.as_millis() as u64,
            "acquisition finished"
        );
        Ok(snapshot)
    }

    fn lock_submit(&self) -> MutexGuard<'_, ()> {
        self.submit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocking put; returns how long it waited and whether the queue was full
    fn put(&self, unit: impl Into<QueueUnit>) -> Result<(Duration, bool)> {
        let was_full = self.producer.is_full();
        let started = Instant::now();
        self.producer
            .put_blocking(unit)
            .map_err(|_| AcquisitionError::QueueClosed)?;
        let waited = started.elapsed();

        if was_full {
            trace!(waited_us = waited.as_micros() as u64, "producer blocked on full queue");
            obs::record_producer_blocked_ms(waited.as_secs_f64() * 1000.0);
        }
        Ok((waited, was_full))
    }
}
