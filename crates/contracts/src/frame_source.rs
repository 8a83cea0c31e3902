//! FrameSource trait - hardware collaborator abstraction
//!
//! Read-only queries against the camera driver and its circular buffer.
//! Real drivers and the simulated camera implement the same interface.

use crate::{ContractError, RawFrame};

/// Read-only view of the camera and its ring buffer
///
/// Queries may fail transiently; callers decide whether a failure is fatal
/// (channel count before acquisition) or recoverable (sub-frame count).
pub trait FrameSource: Send + Sync {
    /// Source name (used for logging)
    fn name(&self) -> &str;

    /// Bytes per pixel of raw frames
    fn bytes_per_pixel(&self) -> Result<u32, ContractError>;

    /// Number of camera channels interleaved in the ring buffer
    fn camera_channel_count(&self) -> Result<u32, ContractError>;

    /// Current exposure in milliseconds
    fn exposure_ms(&self) -> Result<f64, ContractError>;

    /// Sub-frames the camera captures per logical image
    fn frames_per_image(&self) -> Result<u32, ContractError>;

    /// Raw frame width
    fn image_width(&self) -> u32;

    /// Raw frame height
    fn image_height(&self) -> u32;

    /// Frame `n` positions before the most recent one (0 = newest)
    ///
    /// # Errors
    /// Returns an error when `n` is beyond the buffered frames.
    fn nth_frame_before_last(&self, n: usize) -> Result<RawFrame, ContractError>;

    /// Total ring buffer capacity in frames
    fn buffer_capacity(&self) -> usize;

    /// Free ring buffer slots
    fn buffer_free(&self) -> usize;

    /// Occupied ring buffer slots
    fn buffer_depth(&self) -> usize {
        self.buffer_capacity().saturating_sub(self.buffer_free())
    }
}
