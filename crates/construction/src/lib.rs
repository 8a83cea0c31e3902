//! # Construction
//!
//! Frame construction off the acquisition-critical path.
//!
//! Responsibilities:
//! - Integrate `num_frames` sub-frames per channel (average / summation / rank filter)
//! - Bounded construction queue with blocking put/take
//! - Single worker thread grouping units into batches and emitting images
//!
//! ## Usage Example
//!
//! ```ignore
//! use construction::{ConstructionQueue, ConstructionWorker};
//!
//! let (producer, consumer) = ConstructionQueue::bounded(64);
//! let worker = ConstructionWorker::spawn(consumer, router)?;
//!
//! // Producers block while the queue is full
//! producer.put_blocking(unit)?;
//! producer.put_blocking(SignalUnit::shutdown())?;
//!
//! let stats = worker.join()?;
//! ```

mod error;
mod integrate;
mod queue;
mod worker;

// Re-exports
pub use error::{ConstructionError, Result};
pub use integrate::{FrameAverager, FrameSummer, IntegrationGeometry, Integrator, RankFilter};
pub use queue::{ConstructionQueue, QueueConsumer, QueueProducer, TryPutError, QUEUE_NAME};
pub use worker::{
    ConstructionWorker, WorkerHandle, WorkerMetrics, WorkerMetricsSnapshot, WorkerState,
    WORKER_THREAD_NAME,
};
