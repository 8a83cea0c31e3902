//! # Acquisition
//!
//! Producer side of the frame construction pipeline.
//!
//! Responsibilities:
//! - Map each needed sub-frame to a backward offset into the camera ring buffer
//! - Read every sub-frame of an image and submit it to the construction queue
//! - Block on a full queue (backpressure), never drop
//! - Simulated camera for runs without hardware
//!
//! ## Usage Example
//!
//! ```ignore
//! use acquisition::{AcquisitionPipeline, SimulatedCamera};
//! use construction::ConstructionQueue;
//!
//! let camera = Arc::new(SimulatedCamera::new(blueprint.camera.clone())?);
//! let (producer, consumer) = ConstructionQueue::bounded(blueprint.queue.capacity);
//! let pipeline = AcquisitionPipeline::new(camera.clone(), producer, settings)?;
//!
//! camera.snap_image();
//! let event = pipeline.acquire_image(pipeline.event("acq", axes))?;
//! pipeline.signal(Signal::TimepointFinished, Some(event))?;
//! pipeline.finish()?;
//! ```

mod error;
mod metrics;
mod pipeline;
mod reorder;
mod simulated;

// Re-exports
pub use error::{AcquisitionError, Result};
pub use metrics::{AcquisitionMetrics, AcquisitionMetricsSnapshot};
pub use pipeline::AcquisitionPipeline;
pub use reorder::FrameReorderer;
pub use simulated::{QueryFailures, SimulatedCamera};
