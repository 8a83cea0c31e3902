//! Ring buffer reordering
//!
//! The ring buffer delivers frames newest-first with channels interleaved
//! (channel-minor). For `C` camera channels and `N` sub-frames, sub-frame
//! `frames_back` of channel `c` sits at backward offset
//! `frames_back * C + (C - 1 - c)`.

use contracts::FrameSource;
use tracing::warn;

use crate::error::{AcquisitionError, Result};

/// Maps (channel, sub-frame) to backward ring buffer offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReorderer {
    channels: u32,
    num_frames: u32,
}

impl FrameReorderer {
    /// # Errors
    /// Zero channels or zero sub-frames.
    pub fn new(channels: u32, num_frames: u32) -> Result<Self> {
        if channels == 0 {
            return Err(AcquisitionError::configuration(
                "camera channel count must be >= 1",
            ));
        }
        if num_frames == 0 {
            return Err(AcquisitionError::configuration("num_frames must be >= 1"));
        }
        Ok(Self {
            channels,
            num_frames,
        })
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn num_frames(&self) -> u32 {
        self.num_frames
    }

    /// Frames one event occupies in the ring buffer
    pub fn frames_per_event(&self) -> usize {
        self.channels as usize * self.num_frames as usize
    }

    /// Backward offset of sub-frame `frames_back` (0 = newest) of `channel`
    #[inline]
    pub fn backward_offset(&self, frames_back: u32, channel: u32) -> usize {
        debug_assert!(channel < self.channels);
        frames_back as usize * self.channels as usize + (self.channels - 1 - channel) as usize
    }

    /// Offsets for `channel`, oldest sub-frame first
    pub fn backward_offsets(&self, channel: u32) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_frames)
            .rev()
            .map(move |frames_back| self.backward_offset(frames_back, channel))
    }

    /// `(channel, offset)` for a whole event, channel-major
    ///
    /// Each channel's batch is contiguous so it can be enqueued between
    /// batch boundaries.
    pub fn batch_order(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        (0..self.channels).flat_map(move |channel| {
            self.backward_offsets(channel)
                .map(move |offset| (channel, offset))
        })
    }

    /// Sub-frames per image, falling back to 1 when the query fails
    ///
    /// Returns the count and whether the fallback was used.
    pub fn resolve_num_frames(source: &dyn FrameSource) -> (u32, bool) {
        match source.frames_per_image() {
            Ok(0) => {
                warn!(source = source.name(), "camera reported 0 frames per image, using 1");
                (1, true)
            }
            Ok(n) => (n, false),
            Err(e) => {
                warn!(
                    source = source.name(),
                    error = %e,
                    "cannot query frames per image, using 1"
                );
                (1, true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Capture index of the frame at `offset` when `total` frames were
    /// captured channel-minor (index 0 is the oldest)
    fn capture_index(total: usize, offset: usize) -> usize {
        total - 1 - offset
    }

    fn assert_capture_order(channels: u32, num_frames: u32) {
        let reorderer = FrameReorderer::new(channels, num_frames).unwrap();
        let total = reorderer.frames_per_event();
        for channel in 0..channels {
            let indices: Vec<usize> = reorderer
                .backward_offsets(channel)
                .map(|offset| capture_index(total, offset))
                .collect();
            assert_eq!(indices.len(), num_frames as usize);
            assert!(
                indices.windows(2).all(|w| w[0] < w[1]),
                "C={channels} N={num_frames} c={channel}: {indices:?}"
            );
            assert!(indices.iter().all(|i| i % channels as usize == channel as usize));
        }
    }

    #[test]
    fn test_single_channel() {
        let reorderer = FrameReorderer::new(1, 4).unwrap();
        let offsets: Vec<usize> = reorderer.backward_offsets(0).collect();
        assert_eq!(offsets, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_two_channels() {
        let reorderer = FrameReorderer::new(2, 3).unwrap();
        assert_eq!(reorderer.backward_offsets(0).collect::<Vec<_>>(), vec![5, 3, 1]);
        assert_eq!(reorderer.backward_offsets(1).collect::<Vec<_>>(), vec![4, 2, 0]);
        let order: Vec<(u32, usize)> = reorderer.batch_order().collect();
        assert_eq!(order, vec![(0, 5), (0, 3), (0, 1), (1, 4), (1, 2), (1, 0)]);
    }

    #[test]
    fn test_capture_order_exhaustive_small() {
        for channels in 1..=4 {
            for num_frames in 1..=6 {
                assert_capture_order(channels, num_frames);
            }
        }
    }

    #[test]
    fn test_capture_order_random() {
        let mut rng = rand::rng();
        for _ in 0..50 {
            assert_capture_order(rng.random_range(1..=8), rng.random_range(1..=64));
        }
    }

    #[test]
    fn test_offsets_cover_event_exactly_once() {
        let reorderer = FrameReorderer::new(3, 5).unwrap();
        let mut offsets: Vec<usize> = reorderer.batch_order().map(|(_, o)| o).collect();
        offsets.sort_unstable();
        assert_eq!(offsets, (0..15).collect::<Vec<_>>());
    }

    #[test]
    fn test_rejects_zero() {
        assert!(FrameReorderer::new(0, 1).is_err());
        assert!(FrameReorderer::new(1, 0).is_err());
    }
}
