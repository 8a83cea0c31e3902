//! Units carried by the construction queue.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::{AcquisitionId, AxesCoordinates, ConstructionSettings, RawFrame};

/// One hardware acquisition event (one logical image per camera channel)
#[derive(Debug, Clone)]
pub struct AcquisitionEvent {
    /// Owning acquisition
    pub acquisition_id: AcquisitionId,

    /// Coordinates of the event; `channel` is the acquisition channel
    pub axes: AxesCoordinates,

    /// How sub-frames are combined
    pub settings: ConstructionSettings,

    /// Start of the owning acquisition (for elapsed-time tags)
    pub acquisition_start: Instant,

    /// Exposure used for the event, if known
    pub exposure_ms: Option<f64>,
}

impl AcquisitionEvent {
    pub fn new(
        acquisition_id: impl Into<AcquisitionId>,
        axes: AxesCoordinates,
        settings: ConstructionSettings,
        acquisition_start: Instant,
    ) -> Self {
        Self {
            acquisition_id: acquisition_id.into(),
            axes,
            settings,
            acquisition_start,
            exposure_ms: None,
        }
    }
}

/// A raw sub-frame plus the context needed to integrate it
#[derive(Debug, Clone)]
pub struct FrameBatchUnit {
    /// Raw sub-frame
    pub frame: RawFrame,

    /// Owning event
    pub event: Arc<AcquisitionEvent>,

    /// Camera channel count of the event
    pub num_channels: u32,

    /// Camera channel this sub-frame belongs to
    pub channel_index: u32,

    /// Time the producer enqueued the unit
    pub arrived_at: Instant,

    /// Sub-frames required for one image of this channel
    pub num_frames: u32,
}

impl FrameBatchUnit {
    /// Dataset coordinates of the image this unit contributes to.
    ///
    /// Output channels enumerate acquisition channel × camera channel.
    pub fn output_axes(&self) -> AxesCoordinates {
        let channel = self.event.axes.channel * self.num_channels + self.channel_index;
        self.event.axes.with_channel(channel)
    }

    /// Whether `other` belongs to the same batch (same event and channel)
    pub fn same_batch(&self, other: &FrameBatchUnit) -> bool {
        Arc::ptr_eq(&self.event, &other.event) && self.channel_index == other.channel_index
    }
}

/// Pass-through control markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Ask downstream stages to flush
    Flush,
    /// Every image of the current time point has been enqueued
    TimepointFinished,
    /// Every image of the acquisition has been enqueued
    AcquisitionFinished,
    /// Terminates the construction worker; always the last unit
    Shutdown,
}

/// A signal travelling in FIFO order with batch units
#[derive(Debug, Clone)]
pub struct SignalUnit {
    pub signal: Signal,
    pub event: Option<Arc<AcquisitionEvent>>,
}

impl SignalUnit {
    pub fn new(signal: Signal, event: Option<Arc<AcquisitionEvent>>) -> Self {
        Self { signal, event }
    }

    pub fn shutdown() -> Self {
        Self::new(Signal::Shutdown, None)
    }

    pub fn is_shutdown(&self) -> bool {
        self.signal == Signal::Shutdown
    }
}

/// Element type of the construction queue
#[derive(Debug, Clone)]
pub enum QueueUnit {
    Batch(FrameBatchUnit),
    Signal(SignalUnit),
}

impl QueueUnit {
    pub fn is_signal(&self) -> bool {
        matches!(self, Self::Signal(_))
    }
}

impl From<FrameBatchUnit> for QueueUnit {
    fn from(unit: FrameBatchUnit) -> Self {
        Self::Batch(unit)
    }
}

impl From<SignalUnit> for QueueUnit {
    fn from(unit: SignalUnit) -> Self {
        Self::Signal(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PixelData;

    fn unit(event: &Arc<AcquisitionEvent>, channel: u32) -> FrameBatchUnit {
        FrameBatchUnit {
            frame: RawFrame::new(PixelData::from(vec![0u8; 4]), 2, 2, channel),
            event: Arc::clone(event),
            num_channels: 2,
            channel_index: channel,
            arrived_at: Instant::now(),
            num_frames: 1,
        }
    }

    #[test]
    fn test_output_axes_interleave_camera_channels() {
        let event = Arc::new(AcquisitionEvent::new(
            "acq",
            AxesCoordinates::new(3, 1, 0, 0),
            ConstructionSettings::default(),
            Instant::now(),
        ));
        let axes = unit(&event, 1).output_axes();
        assert_eq!(axes.channel, 3);
        assert_eq!(axes.time, 3);
    }

    #[test]
    fn test_same_batch_requires_same_event() {
        let start = Instant::now();
        let e1 = Arc::new(AcquisitionEvent::new(
            "acq",
            AxesCoordinates::default(),
            ConstructionSettings::default(),
            start,
        ));
        let e2 = Arc::new(AcquisitionEvent::new(
            "acq",
            AxesCoordinates::default(),
            ConstructionSettings::default(),
            start,
        ));
        assert!(unit(&e1, 0).same_batch(&unit(&e1, 0)));
        assert!(!unit(&e1, 0).same_batch(&unit(&e1, 1)));
        assert!(!unit(&e1, 0).same_batch(&unit(&e2, 0)));
    }
}
