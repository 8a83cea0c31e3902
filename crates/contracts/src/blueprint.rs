//! PipelineBlueprint - Config Loader output
//!
//! Describes a complete run: camera, acquisition plan, construction, queues,
//! storage, viewer and diagnostics.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ConstructionSettings;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete pipeline blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Camera description
    pub camera: CameraConfig,

    /// Acquisition plan
    #[serde(default)]
    pub acquisition: AcquisitionPlan,

    /// Frame construction
    #[serde(default)]
    pub construction: ConstructionSettings,

    /// Construction queue
    #[serde(default)]
    pub queue: QueueConfig,

    /// Storage routing
    pub storage: StorageConfig,

    /// Viewer notification
    #[serde(default)]
    pub viewer: ViewerConfig,

    /// Queue occupancy diagnostics
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Camera configuration (simulated camera parameters)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Camera name
    #[serde(default = "default_camera_name")]
    pub name: String,

    /// Raw frame width in pixels
    pub width: u32,

    /// Raw frame height in pixels
    pub height: u32,

    /// Camera channels interleaved in the ring buffer
    #[serde(default = "default_one")]
    pub channels: u32,

    /// Bytes per pixel (1 or 2)
    #[serde(default = "default_one")]
    pub bytes_per_pixel: u32,

    /// Sub-frames per logical image
    #[serde(default = "default_one")]
    pub frames_per_image: u32,

    /// Exposure per sub-frame
    #[serde(default = "default_exposure_ms")]
    pub exposure_ms: f64,

    /// Ring buffer capacity in frames
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Generated pixel pattern
    #[serde(default)]
    pub pattern: FramePattern,

    /// Base value for generated pixels
    #[serde(default)]
    pub base_value: u32,
}

fn default_camera_name() -> String {
    "camera".to_string()
}

fn default_one() -> u32 {
    1
}

fn default_exposure_ms() -> f64 {
    10.0
}

fn default_buffer_capacity() -> usize {
    64
}

/// Pixel pattern of generated frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePattern {
    /// Every pixel equals `base_value`
    #[default]
    Constant,
    /// Horizontal ramp starting at `base_value`
    Ramp,
    /// Pseudo-random shot noise around `base_value`
    Noise,
}

/// Acquisition plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionPlan {
    /// Acquisition id
    #[serde(default = "default_acquisition_id")]
    pub id: String,

    /// Number of time points
    #[serde(default = "default_timepoints")]
    pub timepoints: u32,

    /// Acquisition channels per time point
    #[serde(default = "default_one")]
    pub channels: u32,

    /// Z slices per time point
    #[serde(default = "default_one")]
    pub slices: u32,

    /// Delay between time points
    #[serde(default)]
    pub interval_ms: u64,
}

fn default_acquisition_id() -> String {
    "acquisition".to_string()
}

fn default_timepoints() -> u32 {
    10
}

impl Default for AcquisitionPlan {
    fn default() -> Self {
        Self {
            id: default_acquisition_id(),
            timepoints: default_timepoints(),
            channels: 1,
            slices: 1,
            interval_ms: 0,
        }
    }
}

/// Construction queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Fixed queue capacity in units
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    100
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage name
    pub name: String,

    /// Storage type
    pub storage_type: StorageType,

    /// Writing queue capacity
    #[serde(default = "default_writing_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_writing_queue_capacity() -> usize {
    50
}

/// Storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Log image summaries
    Log,
    /// Keep images in memory
    Memory,
}

/// Viewer notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Whether a viewer is attached
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Notification queue capacity (notifications beyond it are skipped)
    #[serde(default = "default_viewer_capacity")]
    pub queue_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_viewer_capacity() -> usize {
    16
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: default_viewer_capacity(),
        }
    }
}

/// Diagnostics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Whether queue occupancy is recorded
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sampling period
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Directory for the CSV tables (None = do not write)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_sample_interval_ms() -> u64 {
    5
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval_ms: default_sample_interval_ms(),
            output_dir: None,
        }
    }
}

impl PipelineBlueprint {
    /// Total output channels per time point
    pub fn output_channels(&self) -> u32 {
        self.acquisition.channels * self.camera.channels
    }

    /// Logical images the plan produces
    pub fn expected_images(&self) -> u64 {
        self.acquisition.timepoints as u64
            * self.acquisition.slices as u64
            * self.output_channels() as u64
    }
}
