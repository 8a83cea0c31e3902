//! StorageHandle - storage with its own bounded writing queue and worker task
//!
//! Puts block while the writing queue is full, so a slow storage pushes
//! back on the construction worker (and, through it, on acquisition).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use contracts::{ImageStorage, ImageWritten, IntegratedImage, Signal, WrittenCallback};
use observability::metrics as obs;

use crate::error::{DispatcherError, Result};
use crate::metrics::{StorageMetrics, StorageMetricsSnapshot};

/// Metrics label of the writing queue
pub const WRITING_QUEUE_NAME: &str = "writing";

/// Element of the writing queue
#[derive(Debug)]
pub enum StorageItem {
    Image(IntegratedImage),
    Signal(Signal),
}

/// Send side of a storage's writing queue; cheap to clone
#[derive(Clone)]
pub struct StorageSender {
    name: Arc<str>,
    tx: mpsc::Sender<StorageItem>,
    capacity: usize,
    metrics: Arc<StorageMetrics>,
}

impl std::fmt::Debug for StorageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSender")
            .field("name", &self.name)
            .field("queue_len", &self.queue_len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl StorageSender {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue an image, blocking the calling thread while the queue is full
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn put_blocking(&self, image: IntegratedImage) -> Result<()> {
        self.send_blocking(StorageItem::Image(image))
    }

    /// Queue a signal behind every image already queued
    pub fn signal_blocking(&self, signal: Signal) -> Result<()> {
        self.send_blocking(StorageItem::Signal(signal))
    }

    /// Queue an image, suspending the calling task while the queue is full
    pub async fn put_image(&self, image: IntegratedImage) -> Result<()> {
        self.tx
            .send(StorageItem::Image(image))
            .await
            .map_err(|_| DispatcherError::storage_closed(self.name.as_ref()))?;
        self.update_depth();
        Ok(())
    }

    fn send_blocking(&self, item: StorageItem) -> Result<()> {
        self.tx
            .blocking_send(item)
            .map_err(|_| DispatcherError::storage_closed(self.name.as_ref()))?;
        self.update_depth();
        Ok(())
    }

    fn update_depth(&self) {
        let depth = self.queue_len();
        self.metrics.set_queue_len(depth);
        obs::record_queue_depth(WRITING_QUEUE_NAME, depth);
        trace!(storage = %self.name, depth, "item queued for storage");
    }

    /// Current writing queue length
    pub fn queue_len(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    /// Maximum writing queue length
    pub fn max_queue_len(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Handle to a running storage worker
pub struct StorageHandle {
    sender: StorageSender,
    worker_handle: JoinHandle<()>,
}

impl StorageHandle {
    /// Create a new StorageHandle and spawn the worker task
    ///
    /// `on_written` runs on the worker task after every successful write.
    /// Must be called from inside a tokio runtime.
    pub fn spawn<S: ImageStorage + Send + 'static>(
        storage: S,
        queue_capacity: usize,
        on_written: Option<WrittenCallback>,
    ) -> Self {
        let name: Arc<str> = Arc::from(storage.name());
        let (tx, rx) = mpsc::channel(queue_capacity);
        let metrics = Arc::new(StorageMetrics::new());

        let worker_handle = tokio::spawn(storage_worker(
            storage,
            rx,
            Arc::clone(&metrics),
            on_written,
            Arc::clone(&name),
        ));

        Self {
            sender: StorageSender {
                name,
                tx,
                capacity: queue_capacity,
                metrics,
            },
            worker_handle,
        }
    }

    pub fn name(&self) -> &str {
        self.sender.name()
    }

    /// Another send side onto this storage's queue
    pub fn sender(&self) -> StorageSender {
        self.sender.clone()
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<StorageMetrics> {
        &self.sender.metrics
    }

    pub fn queue_len(&self) -> usize {
        self.sender.queue_len()
    }

    pub fn max_queue_len(&self) -> usize {
        self.sender.max_queue_len()
    }

    /// Lock-free depth probe for the occupancy recorder
    pub fn depth_probe(&self) -> impl Fn() -> usize + Send + 'static {
        let metrics = Arc::clone(&self.sender.metrics);
        move || metrics.queue_len()
    }

    /// Shutdown the storage worker gracefully
    ///
    /// Waits at most `timeout` for queued items to drain; the worker is
    /// aborted after that.
    #[instrument(name = "storage_handle_shutdown", skip(self), fields(storage = %self.sender.name))]
    pub async fn shutdown(self, timeout: Duration) -> Result<StorageMetricsSnapshot> {
        let Self {
            sender,
            mut worker_handle,
        } = self;
        let name = sender.name.to_string();
        let metrics = Arc::clone(&sender.metrics);
        // Drop sender to signal worker to stop
        drop(sender);

        match tokio::time::timeout(timeout, &mut worker_handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(storage = %name, error = ?e, "Storage worker panicked");
            }
            Err(_) => {
                worker_handle.abort();
                warn!(storage = %name, timeout_ms = timeout.as_millis() as u64, "Storage worker aborted");
                return Err(DispatcherError::ShutdownTimeout {
                    name,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
        debug!(storage = %name, "StorageHandle shutdown complete");
        Ok(metrics.snapshot())
    }
}

/// Worker task that drains the writing queue into the storage
#[instrument(
    name = "storage_worker_loop",
    skip(storage, rx, metrics, on_written),
    fields(storage = %name)
)]
async fn storage_worker<S: ImageStorage>(
    mut storage: S,
    mut rx: mpsc::Receiver<StorageItem>,
    metrics: Arc<StorageMetrics>,
    on_written: Option<WrittenCallback>,
    name: Arc<str>,
) {
    debug!(storage = %name, "Storage worker started");
    let mut finished = false;

    while let Some(item) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match item {
            StorageItem::Image(image) if finished => {
                metrics.inc_rejected_count();
                warn!(
                    storage = %name,
                    time = image.axes.time,
                    channel = image.axes.channel,
                    "Image arrived after storage finished, discarded"
                );
            }
            StorageItem::Image(image) => {
                let started = Instant::now();
                match storage.put_image(&image).await {
                    Ok(()) => {
                        let written = ImageWritten {
                            axes: image.axes,
                            bytes: image.byte_len(),
                            write_duration: started.elapsed(),
                        };
                        metrics.record_write(written.bytes);
                        obs::record_image_written(
                            &name,
                            written.bytes,
                            written.write_duration.as_secs_f64() * 1000.0,
                        );
                        if let Some(callback) = &on_written {
                            callback(&written);
                        }
                    }
                    Err(e) => {
                        metrics.inc_failure_count();
                        obs::record_write_failed(&name);
                        error!(
                            storage = %name,
                            time = image.axes.time,
                            channel = image.axes.channel,
                            error = %e,
                            "Write failed"
                        );
                        // Continue processing - don't crash on single failure
                    }
                }
            }
            StorageItem::Signal(signal) => {
                metrics.inc_signal_count();
                match signal {
                    Signal::Flush => flush(&mut storage, &name).await,
                    Signal::TimepointFinished => {
                        flush(&mut storage, &name).await;
                        metrics.inc_timepoints_saved();
                        debug!(storage = %name, "Timepoint saved");
                    }
                    Signal::AcquisitionFinished => {
                        if !finished {
                            finish(&mut storage, &name).await;
                            finished = true;
                        }
                    }
                    Signal::Shutdown => {
                        debug!(storage = %name, "Shutdown signal received");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup
    if !finished {
        finish(&mut storage, &name).await;
    }
    let snapshot = metrics.snapshot();
    info!(
        storage = %name,
        written = snapshot.write_count,
        bytes = snapshot.bytes_written,
        failures = snapshot.failure_count,
        "Storage worker stopped"
    );
}

async fn flush<S: ImageStorage>(storage: &mut S, name: &str) {
    if let Err(e) = storage.flush().await {
        error!(storage = %name, error = %e, "Flush failed");
    }
}

async fn finish<S: ImageStorage>(storage: &mut S, name: &str) {
    flush(storage, name).await;
    if let Err(e) = storage.close().await {
        error!(storage = %name, error = %e, "Close failed");
    }
    info!(storage = %name, "Storage finished");
}
