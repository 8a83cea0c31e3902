//! LogViewer - logs new-image notifications

use contracts::{AxesCoordinates, ImageViewer};
use tracing::debug;

/// Viewer stand-in that logs every notification
#[derive(Debug, Default)]
pub struct LogViewer;

impl ImageViewer for LogViewer {
    fn new_image_arrived(&self, axes: &AxesCoordinates) {
        debug!(
            time = axes.time,
            channel = axes.channel,
            slice = axes.slice,
            position = axes.position,
            "new image available"
        );
    }
}
