//! # Dispatcher
//!
//! Output stages of the frame construction pipeline.
//!
//! Responsibilities:
//! - Own the storage's bounded writing queue and its worker task
//! - Block the construction worker while the writing queue is full
//! - Notify the viewer from a dedicated thread, best-effort
//! - Forward acquisition signals to storage in FIFO order

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;
pub mod viewer;

pub use contracts::{ImageStorage, ImageViewer, IntegratedImage};
pub use dispatcher::{OutputReport, OutputRouter, OutputStages, OutputStagesBuilder};
pub use error::{DispatcherError, Result};
pub use handle::{StorageHandle, StorageItem, StorageSender, WRITING_QUEUE_NAME};
pub use metrics::{StorageMetrics, StorageMetricsSnapshot, ViewerMetrics, ViewerMetricsSnapshot};
pub use sinks::{LogStorage, LogViewer, MemoryContents, MemoryStorage};
pub use viewer::{ViewerHandle, ViewerNotifier, VIEWER_THREAD_NAME};
