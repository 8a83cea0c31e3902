//! Image metadata tags and dataset axes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::PixelType;

/// Well-known tag keys
pub mod keys {
    pub const WIDTH: &str = "Width";
    pub const HEIGHT: &str = "Height";
    pub const PIXEL_TYPE: &str = "PixelType";
    pub const BIT_DEPTH: &str = "BitDepth";
    pub const ELAPSED_TIME_MS: &str = "ElapsedTime-ms";
    pub const CHANNEL: &str = "Channel";
    pub const CAMERA_CHANNEL_INDEX: &str = "CameraChannelIndex";
    pub const CONSTRUCTION_FILTER: &str = "ImageConstructionFilter";
    pub const RANK_FILTER_RANK: &str = "RankFilterRank";
    pub const NUM_SUB_FRAMES: &str = "NumSubFrames";
    pub const EXPOSURE_MS: &str = "Exposure-ms";
}

/// Ordered metadata map attached to raw and integrated images
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageTags(BTreeMap<String, Value>);

impl ImageTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copy every entry of `other` into `self`, overwriting on conflict
    pub fn merge(&mut self, other: &ImageTags) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn set_width(&mut self, width: u32) {
        self.insert(keys::WIDTH, width);
    }

    pub fn set_height(&mut self, height: u32) {
        self.insert(keys::HEIGHT, height);
    }

    /// Sets both the pixel type and its bit depth
    pub fn set_pixel_type(&mut self, pixel_type: PixelType) {
        self.insert(keys::PIXEL_TYPE, pixel_type.as_tag());
        self.insert(keys::BIT_DEPTH, pixel_type.bit_depth());
    }

    pub fn set_elapsed_ms(&mut self, elapsed_ms: u64) {
        self.insert(keys::ELAPSED_TIME_MS, elapsed_ms);
    }

    pub fn width(&self) -> Option<u64> {
        self.get_u64(keys::WIDTH)
    }

    pub fn height(&self) -> Option<u64> {
        self.get_u64(keys::HEIGHT)
    }

    pub fn pixel_type(&self) -> Option<&str> {
        self.get_str(keys::PIXEL_TYPE)
    }
}

/// Position of an image within a dataset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxesCoordinates {
    /// Time point index
    pub time: u32,
    /// Output channel index (acquisition channel × camera channel)
    pub channel: u32,
    /// Z slice index
    pub slice: u32,
    /// Stage position index
    pub position: u32,
}

impl AxesCoordinates {
    pub fn new(time: u32, channel: u32, slice: u32, position: u32) -> Self {
        Self {
            time,
            channel,
            slice,
            position,
        }
    }

    /// Same coordinates with a different channel index
    pub fn with_channel(self, channel: u32) -> Self {
        Self { channel, ..self }
    }
}
