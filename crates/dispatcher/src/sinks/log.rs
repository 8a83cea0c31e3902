//! LogStorage - logs image summaries via tracing

use contracts::{ContractError, ImageStorage, IntegratedImage};
use tracing::{debug, info, instrument};

/// Storage that logs image summaries instead of persisting pixels
pub struct LogStorage {
    name: String,
    images: u64,
}

impl LogStorage {
    /// Create a new LogStorage with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            images: 0,
        }
    }

    fn log_image_summary(&self, image: &IntegratedImage) {
        info!(
            storage = %self.name,
            time = image.axes.time,
            channel = image.axes.channel,
            slice = image.axes.slice,
            position = image.axes.position,
            width = image.width,
            height = image.height,
            pixel_type = image.pixel_type().as_tag(),
            bytes = image.byte_len(),
            tags = %serde_json::to_string(&image.tags).unwrap_or_default(),
            "IntegratedImage received"
        );
    }
}

impl ImageStorage for LogStorage {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_storage_put_image",
        skip(self, image),
        fields(storage = %self.name, time = image.axes.time)
    )]
    async fn put_image(&mut self, image: &IntegratedImage) -> Result<(), ContractError> {
        self.log_image_summary(image);
        self.images += 1;
        Ok(())
    }

    #[instrument(name = "log_storage_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        debug!(storage = %self.name, images = self.images, "LogStorage flushed");
        Ok(())
    }

    #[instrument(name = "log_storage_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(storage = %self.name, images = self.images, "LogStorage closed");
        Ok(())
    }
}
