//! Construction worker
//!
//! A single dedicated thread drains the construction queue, groups sub-frames
//! into per-channel batches, integrates each complete batch and hands the
//! image downstream. It blocks only while the queue is empty (and inside
//! `ImageHandoff::deliver`, which is how storage backpressure propagates).
//!
//! Batch policy:
//! - signals are expected at batch boundaries; a signal that arrives mid-batch
//!   discards the partial batch and is then forwarded
//! - a unit of another event or channel aborts the partial batch and starts a
//!   new one
//! - a failing (or panicking) integration discards its batch; the worker
//!   carries on with the next unit

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use contracts::{
    tags::keys, AcquisitionEvent, AxesCoordinates, ConstructionMethod, ContractError,
    FrameBatchUnit, ImageHandoff, ImageTags, IntegratedImage, QueueUnit, SignalUnit,
};
use observability::metrics as obs;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::{ConstructionError, Result};
use crate::integrate::{IntegrationGeometry, Integrator};
use crate::queue::QueueConsumer;

/// Worker thread name
pub const WORKER_THREAD_NAME: &str = "frame-construction";

/// Observable worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Between batches
    Idle,
    /// Waiting on the queue with no partial batch
    AwaitFirstUnit,
    /// Partial batch held for `channel`
    Accumulating { channel: u32, frames_remaining: u32 },
    /// Integrating and handing off a complete batch
    Emit,
    /// Loop exited
    Stopped,
}

const STATE_IDLE: u8 = 0;
const STATE_AWAIT: u8 = 1;
const STATE_ACCUMULATING: u8 = 2;
const STATE_EMIT: u8 = 3;
const STATE_STOPPED: u8 = 4;

/// Lock-free state cell (readers may observe a torn channel/remaining pair)
#[derive(Debug, Default)]
struct StateCell {
    tag: AtomicU8,
    channel: AtomicU32,
    remaining: AtomicU32,
}

impl StateCell {
    fn set(&self, state: WorkerState) {
        let tag = match state {
            WorkerState::Idle => STATE_IDLE,
            WorkerState::AwaitFirstUnit => STATE_AWAIT,
            WorkerState::Accumulating {
                channel,
                frames_remaining,
            } => {
                self.channel.store(channel, Ordering::Relaxed);
                self.remaining.store(frames_remaining, Ordering::Relaxed);
                STATE_ACCUMULATING
            }
            WorkerState::Emit => STATE_EMIT,
            WorkerState::Stopped => STATE_STOPPED,
        };
        self.tag.store(tag, Ordering::Release);
    }

    fn get(&self) -> WorkerState {
        match self.tag.load(Ordering::Acquire) {
            STATE_AWAIT => WorkerState::AwaitFirstUnit,
            STATE_ACCUMULATING => WorkerState::Accumulating {
                channel: self.channel.load(Ordering::Relaxed),
                frames_remaining: self.remaining.load(Ordering::Relaxed),
            },
            STATE_EMIT => WorkerState::Emit,
            STATE_STOPPED => WorkerState::Stopped,
            _ => WorkerState::Idle,
        }
    }
}

/// Worker counters
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// Batch units taken from the queue
    pub units_received: AtomicU64,
    /// Images handed downstream
    pub images_emitted: AtomicU64,
    /// Batches discarded because integration failed
    pub batches_failed: AtomicU64,
    /// Partial batches discarded by a signal or a foreign unit
    pub batches_aborted: AtomicU64,
    /// Units consumed without contributing to an image
    pub units_discarded: AtomicU64,
    /// Signals forwarded downstream
    pub signals_forwarded: AtomicU64,
    /// Hand-off errors (image or signal)
    pub handoff_failures: AtomicU64,
    /// Units still queued behind the shutdown signal
    pub units_rejected: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            units_received: self.units_received.load(Ordering::Relaxed),
            images_emitted: self.images_emitted.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            batches_aborted: self.batches_aborted.load(Ordering::Relaxed),
            units_discarded: self.units_discarded.load(Ordering::Relaxed),
            signals_forwarded: self.signals_forwarded.load(Ordering::Relaxed),
            handoff_failures: self.handoff_failures.load(Ordering::Relaxed),
            units_rejected: self.units_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Worker metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerMetricsSnapshot {
    pub units_received: u64,
    pub images_emitted: u64,
    pub batches_failed: u64,
    pub batches_aborted: u64,
    pub units_discarded: u64,
    pub signals_forwarded: u64,
    pub handoff_failures: u64,
    pub units_rejected: u64,
}

#[derive(Debug, Default)]
struct WorkerShared {
    metrics: Arc<WorkerMetrics>,
    state: StateCell,
}

/// Spawns the construction thread
pub struct ConstructionWorker;

impl ConstructionWorker {
    /// Start draining `consumer`, delivering images to `handoff`
    #[instrument(
        name = "construction_worker_spawn",
        skip(consumer, handoff),
        fields(capacity = consumer.capacity())
    )]
    pub fn spawn<H>(consumer: QueueConsumer, handoff: H) -> Result<WorkerHandle>
    where
        H: ImageHandoff + 'static,
    {
        let shared = Arc::new(WorkerShared::default());
        let thread = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || WorkerLoop::new(consumer, handoff, shared).run()
            })
            .map_err(ConstructionError::Spawn)?;

        debug!("construction worker spawned");
        Ok(WorkerHandle {
            shared,
            thread: Some(thread),
        })
    }
}

/// Handle to a running construction worker
#[derive(Debug)]
pub struct WorkerHandle {
    shared: Arc<WorkerShared>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Get metrics reference
    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// Current state (relaxed read)
    pub fn state(&self) -> WorkerState {
        self.shared.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker to exit (after it observed the shutdown signal)
    pub fn join(mut self) -> Result<WorkerMetricsSnapshot> {
        if let Some(thread) = self.thread.take() {
            thread.join().map_err(|_| ConstructionError::WorkerPanicked)?;
        }
        Ok(self.shared.metrics.snapshot())
    }
}

/// Run an integrator call, turning a panic into an error
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(ConstructionError::from_panic(payload)))
}

/// Sub-frames collected so far for one (event, channel)
struct PendingBatch {
    event: Arc<AcquisitionEvent>,
    channel_index: u32,
    num_frames: u32,
    received: u32,
    axes: AxesCoordinates,
    /// Tags of the first sub-frame
    tags: ImageTags,
    /// Err once any unit failed; later units are consumed but not integrated
    integrator: Result<Integrator>,
}

impl PendingBatch {
    fn begin(unit: &FrameBatchUnit) -> Self {
        let settings = &unit.event.settings;
        let channel = unit.channel_index;
        let raw_width = unit.frame.width;
        let geometry = IntegrationGeometry {
            raw_width,
            width: settings.output_width(raw_width, channel),
            height: unit.frame.height,
            pixel_offset: settings.channel_offset(channel),
            num_frames: unit.num_frames,
        };
        let input_type = unit.frame.pixel_type();
        let integrator =
            guarded(|| Integrator::new(settings.method, geometry, settings.rank, input_type));

        Self {
            event: Arc::clone(&unit.event),
            channel_index: channel,
            num_frames: unit.num_frames,
            received: 0,
            axes: unit.output_axes(),
            tags: unit.frame.tags.clone(),
            integrator,
        }
    }

    fn accepts(&self, unit: &FrameBatchUnit) -> bool {
        Arc::ptr_eq(&self.event, &unit.event)
            && self.channel_index == unit.channel_index
            && self.num_frames == unit.num_frames
    }

    fn push(&mut self, unit: &FrameBatchUnit) {
        self.received += 1;
        if let Ok(integrator) = &mut self.integrator {
            let geometry = *integrator.geometry();
            let result = if unit.frame.width != geometry.raw_width
                || unit.frame.height != geometry.height
            {
                Err(ConstructionError::from(ContractError::malformed_frame(
                    format!(
                        "sub-frame is {}x{}, batch expects {}x{}",
                        unit.frame.width, unit.frame.height, geometry.raw_width, geometry.height
                    ),
                )))
            } else {
                guarded(|| integrator.add_frame(&unit.frame.pixels))
            };
            if let Err(e) = result {
                warn!(
                    acquisition = %self.event.acquisition_id,
                    channel = self.channel_index,
                    sequence = ?unit.frame.sequence,
                    error = %e,
                    "malformed sub-frame, batch will be discarded"
                );
                self.integrator = Err(e);
            }
        }
    }

    fn frames_remaining(&self) -> u32 {
        self.num_frames.max(1).saturating_sub(self.received)
    }

    fn is_complete(&self) -> bool {
        self.frames_remaining() == 0
    }

    /// Integrate the complete batch into an image
    fn finish(self) -> Result<(IntegratedImage, ConstructionMethod)> {
        let integrator = self.integrator?;
        let geometry = *integrator.geometry();
        let method = integrator.method();

        let mut tags = self.tags;
        tags.set_width(geometry.width);
        tags.set_height(geometry.height);
        tags.set_pixel_type(integrator.output_pixel_type());
        tags.set_elapsed_ms(self.event.acquisition_start.elapsed().as_millis() as u64);
        tags.insert(keys::CHANNEL, self.axes.channel);
        tags.insert(keys::CAMERA_CHANNEL_INDEX, self.channel_index);
        tags.insert(keys::CONSTRUCTION_FILTER, method.filter_name());
        tags.insert(keys::NUM_SUB_FRAMES, self.num_frames);
        if method == ConstructionMethod::RankFilter {
            tags.insert(keys::RANK_FILTER_RANK, self.event.settings.rank);
        }
        if let Some(exposure) = self.event.exposure_ms {
            tags.insert(keys::EXPOSURE_MS, exposure);
        }

        let pixels = guarded(move || integrator.construct_image())?;
        let image = IntegratedImage {
            pixels,
            tags,
            axes: self.axes,
            width: geometry.width,
            height: geometry.height,
            is_rgb: false,
        };
        Ok((image, method))
    }
}

struct WorkerLoop<H> {
    consumer: QueueConsumer,
    handoff: H,
    shared: Arc<WorkerShared>,
    pending: Option<PendingBatch>,
}

impl<H: ImageHandoff> WorkerLoop<H> {
    fn new(consumer: QueueConsumer, handoff: H, shared: Arc<WorkerShared>) -> Self {
        Self {
            consumer,
            handoff,
            shared,
            pending: None,
        }
    }

    fn metrics(&self) -> &WorkerMetrics {
        &self.shared.metrics
    }

    fn set_state(&self, state: WorkerState) {
        self.shared.state.set(state);
    }

    fn run(mut self) {
        info!(capacity = self.consumer.capacity(), "construction worker started");

        loop {
            if self.pending.is_none() {
                self.set_state(WorkerState::AwaitFirstUnit);
            }
            let Some(unit) = self.consumer.take() else {
                warn!("construction queue closed without shutdown signal");
                self.abort_pending("queue closed");
                break;
            };
            obs::record_queue_depth(crate::queue::QUEUE_NAME, self.consumer.len());

            match unit {
                QueueUnit::Batch(unit) => self.on_unit(unit),
                QueueUnit::Signal(signal) => {
                    if self.on_signal(signal) {
                        break;
                    }
                }
            }
        }

        self.set_state(WorkerState::Stopped);
        let snapshot = self.metrics().snapshot();
        info!(
            images = snapshot.images_emitted,
            failed = snapshot.batches_failed,
            aborted = snapshot.batches_aborted,
            "construction worker stopped"
        );
    }

    fn on_unit(&mut self, unit: FrameBatchUnit) {
        WorkerMetrics::add(&self.metrics().units_received, 1);
        trace!(
            channel = unit.channel_index,
            sequence = ?unit.frame.sequence,
            "unit taken"
        );

        if self.pending.as_ref().is_some_and(|b| !b.accepts(&unit)) {
            self.abort_pending("unit of another batch arrived");
        }

        let batch = self
            .pending
            .get_or_insert_with(|| PendingBatch::begin(&unit));
        batch.push(&unit);

        if batch.is_complete() {
            if let Some(batch) = self.pending.take() {
                self.emit(batch);
            }
        } else {
            let state = WorkerState::Accumulating {
                channel: batch.channel_index,
                frames_remaining: batch.frames_remaining(),
            };
            self.set_state(state);
        }
    }

    /// Returns true when the loop must exit
    fn on_signal(&mut self, signal: SignalUnit) -> bool {
        if self.pending.is_some() {
            self.abort_pending("signal arrived mid-batch");
        }

        let shutdown = signal.is_shutdown();
        if shutdown {
            let rejected = self.consumer.close();
            if !rejected.is_empty() {
                warn!(
                    count = rejected.len(),
                    "units queued behind the shutdown signal were rejected"
                );
                WorkerMetrics::add(&self.metrics().units_rejected, rejected.len() as u64);
            }
        }

        match self.handoff.forward_signal(&signal) {
            Ok(()) => {
                debug!(signal = ?signal.signal, "signal forwarded");
                WorkerMetrics::add(&self.metrics().signals_forwarded, 1);
            }
            Err(e) => {
                error!(signal = ?signal.signal, error = %e, "failed to forward signal");
                WorkerMetrics::add(&self.metrics().handoff_failures, 1);
            }
        }

        self.set_state(WorkerState::Idle);
        shutdown
    }

    fn abort_pending(&mut self, reason: &str) {
        let Some(batch) = self.pending.take() else {
            return;
        };
        error!(
            acquisition = %batch.event.acquisition_id,
            channel = batch.channel_index,
            received = batch.received,
            expected = batch.num_frames,
            reason,
            "discarding partial batch"
        );
        WorkerMetrics::add(&self.metrics().batches_aborted, 1);
        WorkerMetrics::add(&self.metrics().units_discarded, batch.received as u64);
        obs::record_batch_failed("aborted");
    }

    fn emit(&mut self, batch: PendingBatch) {
        self.set_state(WorkerState::Emit);
        let started = Instant::now();
        let acquisition = batch.event.acquisition_id.clone();
        let (channel, axes, received) = (batch.channel_index, batch.axes, batch.received);

        match batch.finish() {
            Ok((image, method)) => {
                obs::record_image_constructed(
                    method.filter_name(),
                    started.elapsed().as_secs_f64() * 1000.0,
                );
                self.deliver(image);
            }
            Err(e) => {
                error!(
                    %acquisition,
                    channel,
                    ?axes,
                    error = %e,
                    "batch integration failed, discarding batch"
                );
                WorkerMetrics::add(&self.metrics().batches_failed, 1);
                WorkerMetrics::add(&self.metrics().units_discarded, received as u64);
                obs::record_batch_failed("integration");
            }
        }

        self.set_state(WorkerState::Idle);
    }

    fn deliver(&mut self, image: IntegratedImage) {
        let axes = image.axes;
        match self.handoff.deliver(image) {
            Ok(()) => {
                trace!(?axes, "image delivered");
                WorkerMetrics::add(&self.metrics().images_emitted, 1);
            }
            Err(e) => {
                error!(?axes, error = %e, "image hand-off failed");
                WorkerMetrics::add(&self.metrics().handoff_failures, 1);
            }
        }
    }
}
