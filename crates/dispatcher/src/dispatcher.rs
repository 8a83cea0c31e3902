//! Output stages - storage and viewer fed by the construction worker

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use contracts::{
    ContractError, ImageHandoff, ImageViewer, IntegratedImage, PipelineBlueprint, SignalUnit,
    StorageConfig, StorageType, WrittenCallback,
};

use crate::error::Result;
use crate::handle::{StorageHandle, StorageSender};
use crate::metrics::{StorageMetricsSnapshot, ViewerMetricsSnapshot};
use crate::sinks::{LogStorage, LogViewer, MemoryContents, MemoryStorage};
use crate::viewer::{ViewerHandle, ViewerNotifier};

/// Routes constructed images to storage (blocking) and the viewer (best-effort)
///
/// Owned by the construction worker thread.
#[derive(Debug, Clone)]
pub struct OutputRouter {
    storage: StorageSender,
    viewer: Option<ViewerNotifier>,
}

impl OutputRouter {
    pub fn new(storage: StorageSender, viewer: Option<ViewerNotifier>) -> Self {
        Self { storage, viewer }
    }
}

impl ImageHandoff for OutputRouter {
    fn deliver(&mut self, image: IntegratedImage) -> std::result::Result<(), ContractError> {
        let axes = image.axes;
        self.storage.put_blocking(image)?;
        if let Some(viewer) = &self.viewer {
            viewer.notify(axes);
        }
        Ok(())
    }

    fn forward_signal(&mut self, signal: &SignalUnit) -> std::result::Result<(), ContractError> {
        self.storage.signal_blocking(signal.signal)?;
        Ok(())
    }
}

/// Builder for the output stages
pub struct OutputStagesBuilder {
    storage: StorageConfig,
    viewer_capacity: Option<usize>,
    viewer: Option<Arc<dyn ImageViewer>>,
    on_written: Option<WrittenCallback>,
}

impl OutputStagesBuilder {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            viewer_capacity: None,
            viewer: None,
            on_written: None,
        }
    }

    /// Storage and viewer settings from a blueprint
    pub fn from_blueprint(blueprint: &PipelineBlueprint) -> Self {
        let builder = Self::new(blueprint.storage.clone());
        if blueprint.viewer.enabled {
            builder.viewer_capacity(blueprint.viewer.queue_capacity)
        } else {
            builder
        }
    }

    /// Enable viewer notifications with the given queue capacity
    pub fn viewer_capacity(mut self, capacity: usize) -> Self {
        self.viewer_capacity = Some(capacity);
        self
    }

    /// Viewer to notify (a [`LogViewer`] when unset)
    pub fn viewer(mut self, viewer: Arc<dyn ImageViewer>) -> Self {
        self.viewer = Some(viewer);
        self
    }

    /// Callback run after every successful storage write
    pub fn on_written(mut self, callback: WrittenCallback) -> Self {
        self.on_written = Some(callback);
        self
    }

    /// Start the storage worker and the viewer thread
    ///
    /// Must be called from inside a tokio runtime.
    #[instrument(
        name = "output_stages_build",
        skip(self),
        fields(storage = %self.storage.name, storage_type = ?self.storage.storage_type)
    )]
    pub fn build(self) -> Result<OutputStages> {
        let (storage, memory) = create_storage_handle(&self.storage, self.on_written);

        let viewer = match self.viewer_capacity {
            Some(capacity) => {
                let viewer = self
                    .viewer
                    .unwrap_or_else(|| Arc::new(LogViewer) as Arc<dyn ImageViewer>);
                Some(ViewerHandle::spawn(viewer, capacity)?)
            }
            None => None,
        };

        info!(
            writing_queue_capacity = storage.max_queue_len(),
            viewer = viewer.is_some(),
            "Output stages started"
        );
        Ok(OutputStages {
            storage,
            viewer,
            memory,
        })
    }
}

/// Create a StorageHandle from configuration
///
/// Returns the in-memory contents when the storage keeps images.
fn create_storage_handle(
    config: &StorageConfig,
    on_written: Option<WrittenCallback>,
) -> (StorageHandle, Option<MemoryContents>) {
    match config.storage_type {
        StorageType::Log => {
            let storage = LogStorage::new(&config.name);
            (
                StorageHandle::spawn(storage, config.queue_capacity, on_written),
                None,
            )
        }
        StorageType::Memory => {
            let storage = MemoryStorage::new(&config.name);
            let contents = storage.contents();
            (
                StorageHandle::spawn(storage, config.queue_capacity, on_written),
                Some(contents),
            )
        }
    }
}

/// Running storage worker and viewer thread
pub struct OutputStages {
    storage: StorageHandle,
    viewer: Option<ViewerHandle>,
    memory: Option<MemoryContents>,
}

impl OutputStages {
    /// Router for the construction worker
    pub fn router(&self) -> OutputRouter {
        OutputRouter::new(
            self.storage.sender(),
            self.viewer.as_ref().map(ViewerHandle::notifier),
        )
    }

    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }

    /// Images kept by a memory storage
    pub fn memory(&self) -> Option<&MemoryContents> {
        self.memory.as_ref()
    }

    /// Drain and stop both stages
    ///
    /// The storage worker is given at most `storage_timeout`.
    #[instrument(name = "output_stages_shutdown", skip(self))]
    pub async fn shutdown(self, storage_timeout: Duration) -> Result<OutputReport> {
        let storage = self.storage.shutdown(storage_timeout).await?;
        let viewer = match self.viewer {
            Some(handle) => match tokio::task::spawn_blocking(move || handle.shutdown()).await {
                Ok(result) => Some(result?),
                Err(e) => {
                    warn!(error = %e, "Viewer shutdown task failed");
                    None
                }
            },
            None => None,
        };
        Ok(OutputReport { storage, viewer })
    }
}

/// Final counters of the output stages
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputReport {
    pub storage: StorageMetricsSnapshot,
    pub viewer: Option<ViewerMetricsSnapshot>,
}
