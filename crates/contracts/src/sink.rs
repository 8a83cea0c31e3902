//! Downstream interfaces: storage, viewer and the construction hand-off.

use std::sync::Arc;
use std::time::Duration;

use crate::{AxesCoordinates, ContractError, IntegratedImage, SignalUnit};

/// Image storage trait
///
/// All storage implementations must implement this trait. Writes run on the
/// storage worker, never on the construction thread.
#[trait_variant::make(ImageStorage: Send)]
pub trait LocalImageStorage {
    /// Storage name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Persist one image
    ///
    /// The image carries pixels, tags, axes coordinates, RGB flag, bit depth,
    /// height and width.
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn put_image(&mut self, image: &IntegratedImage) -> Result<(), ContractError>;

    /// Flush buffered writes (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close storage
    async fn close(&mut self) -> Result<(), ContractError>;
}

/// Notification sent after an image has been written
#[derive(Debug, Clone, Copy)]
pub struct ImageWritten {
    pub axes: AxesCoordinates,
    /// Pixel payload size
    pub bytes: usize,
    /// Time spent in `put_image`
    pub write_duration: Duration,
}

/// Per-image "written" callback
pub type WrittenCallback = Arc<dyn Fn(&ImageWritten) + Send + Sync>;

/// Viewer collaborator
///
/// Called from the viewer-notification thread; implementations must not
/// assume they run on the acquisition path.
pub trait ImageViewer: Send + Sync {
    /// A new image is available at `axes`
    fn new_image_arrived(&self, axes: &AxesCoordinates);
}

/// Where the construction worker delivers its output
///
/// `deliver` may block; blocking here is how storage backpressure reaches the
/// construction queue.
pub trait ImageHandoff: Send {
    /// Hand one constructed image downstream
    fn deliver(&mut self, image: IntegratedImage) -> Result<(), ContractError>;

    /// Forward a signal downstream, in order with delivered images
    fn forward_signal(&mut self, signal: &SignalUnit) -> Result<(), ContractError>;
}
