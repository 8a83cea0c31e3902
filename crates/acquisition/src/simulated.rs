//! Simulated camera
//!
//! Generates frames into a fixed-capacity ring buffer (oldest frames are
//! overwritten) and answers the read-only hardware queries. Used when no
//! real camera is attached, and in tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::{
    tags::keys, CameraConfig, ContractError, FramePattern, FrameSource, PixelData, PixelType,
    RawFrame,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ringbuf::{traits::*, HeapRb};
use tracing::{debug, trace};

/// Noise amplitude of [`FramePattern::Noise`]
const NOISE_AMPLITUDE: u64 = 32;

/// Hardware queries that should fail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryFailures {
    pub channel_count: bool,
    pub bytes_per_pixel: bool,
    pub exposure: bool,
    pub frames_per_image: bool,
}

#[derive(Debug, Default)]
struct FailureFlags {
    channel_count: AtomicBool,
    bytes_per_pixel: AtomicBool,
    exposure: AtomicBool,
    frames_per_image: AtomicBool,
}

struct CameraState {
    ring: HeapRb<RawFrame>,
    sequence: u64,
    rng: StdRng,
}

/// Simulated camera with a ring buffer
pub struct SimulatedCamera {
    config: CameraConfig,
    pixel_type: PixelType,
    state: Mutex<CameraState>,
    failures: FailureFlags,
    corrupt_remaining: AtomicU32,
}

impl std::fmt::Debug for SimulatedCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedCamera")
            .field("name", &self.config.name)
            .field("pixel_type", &self.pixel_type)
            .field("buffer_depth", &self.buffer_depth())
            .finish()
    }
}

impl SimulatedCamera {
    /// # Errors
    /// Unsupported bytes per pixel or a zero-capacity ring buffer.
    pub fn new(config: CameraConfig) -> Result<Self, ContractError> {
        let pixel_type = PixelType::from_bytes_per_pixel(config.bytes_per_pixel).ok_or_else(|| {
            ContractError::unsupported(format!(
                "camera bytes_per_pixel {} has no pixel type",
                config.bytes_per_pixel
            ))
        })?;
        if config.buffer_capacity == 0 {
            return Err(ContractError::unsupported("ring buffer capacity must be > 0"));
        }

        debug!(
            name = %config.name,
            width = config.width,
            height = config.height,
            channels = config.channels,
            capacity = config.buffer_capacity,
            "simulated camera created"
        );
        Ok(Self {
            state: Mutex::new(CameraState {
                ring: HeapRb::new(config.buffer_capacity),
                sequence: 0,
                rng: StdRng::seed_from_u64(config.base_value as u64),
            }),
            config,
            pixel_type,
            failures: FailureFlags::default(),
            corrupt_remaining: AtomicU32::new(0),
        })
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    /// Make the selected queries fail until called again
    pub fn inject_query_failures(&self, failures: QueryFailures) {
        self.failures
            .channel_count
            .store(failures.channel_count, Ordering::Relaxed);
        self.failures
            .bytes_per_pixel
            .store(failures.bytes_per_pixel, Ordering::Relaxed);
        self.failures
            .exposure
            .store(failures.exposure, Ordering::Relaxed);
        self.failures
            .frames_per_image
            .store(failures.frames_per_image, Ordering::Relaxed);
    }

    /// Truncate the next `count` captured frames
    pub fn corrupt_next_frames(&self, count: u32) {
        self.corrupt_remaining.store(count, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, CameraState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capture one logical image: `frames_per_image` sub-frames of every
    /// channel, channels interleaved
    pub fn snap_image(&self) {
        let mut state = self.lock();
        for _ in 0..self.config.frames_per_image {
            for channel in 0..self.config.channels {
                let pixels = self.generate(&mut state, channel);
                self.store(&mut state, pixels, channel);
            }
        }
    }

    /// Append a frame with explicit pixels; returns its sequence number
    pub fn push_frame(&self, pixels: PixelData, camera_channel: u32) -> u64 {
        let mut state = self.lock();
        self.store(&mut state, pixels, camera_channel)
    }

    /// Drop every buffered frame
    pub fn clear(&self) {
        let mut state = self.lock();
        while state.ring.try_pop().is_some() {}
    }

    fn store(&self, state: &mut CameraState, pixels: PixelData, camera_channel: u32) -> u64 {
        let sequence = state.sequence;
        state.sequence += 1;

        let pixels = if self.take_corruption() {
            trace!(sequence, "corrupting frame");
            truncate(&pixels)
        } else {
            pixels
        };

        let mut frame = RawFrame::new(pixels, self.config.width, self.config.height, camera_channel)
            .with_sequence(sequence);
        frame.tags.set_width(self.config.width);
        frame.tags.set_height(self.config.height);
        frame.tags.set_pixel_type(self.pixel_type);
        frame.tags.insert(keys::CAMERA_CHANNEL_INDEX, camera_channel);
        frame.tags.insert(keys::EXPOSURE_MS, self.config.exposure_ms);

        if state.ring.is_full() && state.ring.try_pop().is_some() {
            trace!(sequence, "ring buffer overwrote oldest frame");
        }
        let _ = state.ring.try_push(frame);
        sequence
    }

    fn take_corruption(&self) -> bool {
        self.corrupt_remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    fn generate(&self, state: &mut CameraState, channel: u32) -> PixelData {
        let width = self.config.width as usize;
        let len = width * self.config.height as usize;
        let max = self.pixel_type.max_value();
        let base = self.config.base_value as u64;

        match self.config.pattern {
            FramePattern::Constant => PixelData::uniform(self.pixel_type, len, base.min(max)),
            FramePattern::Ramp => {
                let samples: Vec<u64> = (0..len)
                    .map(|i| (base + (i % width) as u64 + channel as u64) % (max + 1))
                    .collect();
                PixelData::from_samples(self.pixel_type, &samples)
            }
            FramePattern::Noise => {
                let samples: Vec<u64> = (0..len)
                    .map(|_| (base + state.rng.random_range(0..=NOISE_AMPLITUDE)).min(max))
                    .collect();
                PixelData::from_samples(self.pixel_type, &samples)
            }
        }
    }

    fn query<T>(&self, failing: &AtomicBool, query: &str, value: T) -> Result<T, ContractError> {
        if failing.load(Ordering::Relaxed) {
            Err(ContractError::hardware_query(query, "simulated failure"))
        } else {
            Ok(value)
        }
    }
}

/// First half of a buffer
fn truncate(pixels: &PixelData) -> PixelData {
    let half = pixels.len() / 2;
    let samples: Vec<u64> = (0..half).filter_map(|i| pixels.sample(i)).collect();
    PixelData::from_samples(pixels.pixel_type(), &samples)
}

impl FrameSource for SimulatedCamera {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn bytes_per_pixel(&self) -> Result<u32, ContractError> {
        self.query(
            &self.failures.bytes_per_pixel,
            "bytes_per_pixel",
            self.config.bytes_per_pixel,
        )
    }

    fn camera_channel_count(&self) -> Result<u32, ContractError> {
        self.query(
            &self.failures.channel_count,
            "camera_channel_count",
            self.config.channels,
        )
    }

    fn exposure_ms(&self) -> Result<f64, ContractError> {
        self.query(&self.failures.exposure, "exposure_ms", self.config.exposure_ms)
    }

    fn frames_per_image(&self) -> Result<u32, ContractError> {
        self.query(
            &self.failures.frames_per_image,
            "frames_per_image",
            self.config.frames_per_image,
        )
    }

    fn image_width(&self) -> u32 {
        self.config.width
    }

    fn image_height(&self) -> u32 {
        self.config.height
    }

    fn nth_frame_before_last(&self, n: usize) -> Result<RawFrame, ContractError> {
        let state = self.lock();
        let len = state.ring.occupied_len();
        if n >= len {
            return Err(ContractError::hardware_query(
                "nth_frame_before_last",
                format!("requested frame {n} before last, only {len} buffered"),
            ));
        }
        state
            .ring
            .iter()
            .nth(len - 1 - n)
            .cloned()
            .ok_or_else(|| ContractError::hardware_query("nth_frame_before_last", "ring buffer changed"))
    }

    fn buffer_capacity(&self) -> usize {
        self.config.buffer_capacity
    }

    fn buffer_free(&self) -> usize {
        self.lock().ring.vacant_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(channels: u32, frames_per_image: u32) -> CameraConfig {
        CameraConfig {
            name: "sim".into(),
            width: 4,
            height: 2,
            channels,
            bytes_per_pixel: 1,
            frames_per_image,
            exposure_ms: 2.0,
            buffer_capacity: 8,
            pattern: FramePattern::Constant,
            base_value: 7,
        }
    }

    #[test]
    fn test_snap_fills_ring_channel_minor() {
        let camera = SimulatedCamera::new(config(2, 3)).unwrap();
        camera.snap_image();
        assert_eq!(camera.buffer_depth(), 6);
        assert_eq!(camera.buffer_free(), 2);

        let newest = camera.nth_frame_before_last(0).unwrap();
        assert_eq!(newest.camera_channel, 1);
        assert_eq!(newest.sequence, Some(5));
        let oldest = camera.nth_frame_before_last(5).unwrap();
        assert_eq!(oldest.camera_channel, 0);
        assert_eq!(oldest.sequence, Some(0));
        assert_eq!(oldest.pixels.sample(0), Some(7));
        assert!(camera.nth_frame_before_last(6).is_err());
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let camera = SimulatedCamera::new(config(1, 3)).unwrap();
        for _ in 0..4 {
            camera.snap_image();
        }
        assert_eq!(camera.buffer_depth(), 8);
        assert_eq!(camera.nth_frame_before_last(0).unwrap().sequence, Some(11));
        assert_eq!(camera.nth_frame_before_last(7).unwrap().sequence, Some(4));
    }

    #[test]
    fn test_injected_query_failures() {
        let camera = SimulatedCamera::new(config(2, 3)).unwrap();
        assert_eq!(camera.frames_per_image().unwrap(), 3);
        camera.inject_query_failures(QueryFailures {
            frames_per_image: true,
            ..Default::default()
        });
        assert!(matches!(
            camera.frames_per_image(),
            Err(ContractError::HardwareQuery { .. })
        ));
        assert!(camera.camera_channel_count().is_ok());
        camera.inject_query_failures(QueryFailures::default());
        assert!(camera.frames_per_image().is_ok());
    }

    #[test]
    fn test_corrupted_frames_are_short() {
        let camera = SimulatedCamera::new(config(1, 2)).unwrap();
        camera.corrupt_next_frames(1);
        camera.snap_image();
        assert_eq!(camera.nth_frame_before_last(1).unwrap().pixels.len(), 4);
        assert_eq!(camera.nth_frame_before_last(0).unwrap().pixels.len(), 8);
    }

    #[test]
    fn test_patterns_stay_in_range() {
        for pattern in [FramePattern::Ramp, FramePattern::Noise] {
            let mut cfg = config(1, 1);
            cfg.pattern = pattern;
            cfg.base_value = 250;
            let camera = SimulatedCamera::new(cfg).unwrap();
            camera.snap_image();
            let frame = camera.nth_frame_before_last(0).unwrap();
            assert_eq!(frame.pixels.len(), 8);
            assert!((0..8).all(|i| frame.pixels.sample(i).is_some_and(|v| v <= 255)));
        }
    }

    #[test]
    fn test_rejects_bad_config() {
        let mut cfg = config(1, 1);
        cfg.bytes_per_pixel = 3;
        assert!(SimulatedCamera::new(cfg).is_err());
        let mut cfg = config(1, 1);
        cfg.buffer_capacity = 0;
        assert!(SimulatedCamera::new(cfg).is_err());
    }
}
