//! # Contracts
//!
//! Frozen interface contracts shared by every pipeline stage.
//! All business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Data flow
//! - `FrameSource` (hardware) -> `RawFrame`
//! - acquisition wraps frames into `FrameBatchUnit`s / `SignalUnit`s (`QueueUnit`)
//! - construction integrates batches into `IntegratedImage`s via `ImageHandoff`
//! - dispatcher forwards images to `ImageStorage` and `ImageViewer`

mod acquisition_id;
mod blueprint;
mod diagnostics;
mod error;
mod frame;
mod frame_source;
mod method;
mod pixel;
mod sink;
pub mod tags;
mod unit;

pub use acquisition_id::AcquisitionId;
pub use blueprint::*;
pub use diagnostics::*;
pub use error::*;
pub use frame::*;
pub use frame_source::FrameSource;
pub use method::*;
pub use pixel::*;
pub use sink::*;
pub use tags::{AxesCoordinates, ImageTags};
pub use unit::*;
