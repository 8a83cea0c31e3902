//! Viewer notification thread
//!
//! Notifications are best-effort: they go through a small bounded queue
//! drained by a dedicated thread, and are skipped (counted, never blocking)
//! when the viewer falls behind.

use std::sync::Arc;
use std::thread::JoinHandle;

use async_channel::{Receiver, Sender, TrySendError};
use contracts::{AxesCoordinates, ImageViewer};
use observability::metrics as obs;
use tracing::{debug, instrument, trace};

use crate::error::{DispatcherError, Result};
use crate::metrics::{ViewerMetrics, ViewerMetricsSnapshot};

/// Name of the notification thread
pub const VIEWER_THREAD_NAME: &str = "viewer-notify";

/// Send side of the notification queue; cheap to clone
#[derive(Debug, Clone)]
pub struct ViewerNotifier {
    tx: Sender<AxesCoordinates>,
    metrics: Arc<ViewerMetrics>,
}

impl ViewerNotifier {
    /// Announce a new image without waiting
    ///
    /// Returns whether the notification was queued.
    pub fn notify(&self, axes: AxesCoordinates) -> bool {
        match self.tx.try_send(axes) {
            Ok(()) => true,
            Err(TrySendError::Full(axes)) => {
                self.metrics.inc_skipped();
                obs::record_viewer_notification(false);
                trace!(time = axes.time, channel = axes.channel, "viewer lagging, notification skipped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Handle to the notification thread
pub struct ViewerHandle {
    notifier: ViewerNotifier,
    thread: Option<JoinHandle<()>>,
}

impl ViewerHandle {
    /// Spawn the notification thread for `viewer`
    pub fn spawn(viewer: Arc<dyn ImageViewer>, queue_capacity: usize) -> Result<Self> {
        let (tx, rx) = async_channel::bounded(queue_capacity);
        let metrics = Arc::new(ViewerMetrics::new());

        let thread = std::thread::Builder::new()
            .name(VIEWER_THREAD_NAME.to_string())
            .spawn({
                let metrics = Arc::clone(&metrics);
                move || notify_loop(viewer, rx, metrics)
            })?;

        Ok(Self {
            notifier: ViewerNotifier { tx, metrics },
            thread: Some(thread),
        })
    }

    pub fn notifier(&self) -> ViewerNotifier {
        self.notifier.clone()
    }

    pub fn metrics(&self) -> ViewerMetricsSnapshot {
        self.notifier.metrics.snapshot()
    }

    /// Deliver what is queued, then stop the thread
    #[instrument(name = "viewer_handle_shutdown", skip(self))]
    pub fn shutdown(mut self) -> Result<ViewerMetricsSnapshot> {
        self.notifier.tx.close();
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| DispatcherError::Viewer("notification thread panicked".into()))?;
        }
        let snapshot = self.notifier.metrics.snapshot();
        debug!(
            delivered = snapshot.delivered,
            skipped = snapshot.skipped,
            "viewer notifications stopped"
        );
        Ok(snapshot)
    }
}

impl Drop for ViewerHandle {
    fn drop(&mut self) {
        self.notifier.tx.close();
    }
}

fn notify_loop(viewer: Arc<dyn ImageViewer>, rx: Receiver<AxesCoordinates>, metrics: Arc<ViewerMetrics>) {
    while let Ok(axes) = rx.recv_blocking() {
        viewer.new_image_arrived(&axes);
        metrics.inc_delivered();
        obs::record_viewer_notification(true);
    }
}
