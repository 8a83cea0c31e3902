//! Frame construction method selection.

use serde::{Deserialize, Serialize};

use crate::{tags::keys, ContractError, ImageTags, PixelType};

/// Largest sub-frame count for which summation of 8-bit input cannot
/// overflow a 16-bit output: 257 * 255 = 65535.
pub const MAX_SUMMATION_FRAMES_8BIT: u32 = 257;

/// Largest sub-frame count for which summation of 16-bit input cannot
/// overflow a 32-bit output: 65537 * 65535 = u32::MAX.
pub const MAX_SUMMATION_FRAMES_16BIT: u32 = 65537;

/// How sub-frames are combined into one image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructionMethod {
    /// Per-pixel mean, output keeps the input depth
    #[default]
    Average,
    /// Per-pixel sum, output widened to twice the input depth
    Summation,
    /// Spatio-temporal percentile over 3x3 x N samples
    RankFilter,
}

impl ConstructionMethod {
    /// Filter name recorded in summary and image metadata
    pub fn filter_name(self) -> &'static str {
        match self {
            Self::Average => "FrameAverage",
            Self::Summation => "FrameSummation",
            Self::RankFilter => "RankFilter",
        }
    }

    /// Output sample type for a given input sample type
    pub fn output_pixel_type(self, input: PixelType) -> Result<PixelType, ContractError> {
        match self {
            Self::Average | Self::RankFilter => Ok(input),
            Self::Summation => input.widened().ok_or_else(|| {
                ContractError::unsupported(format!(
                    "summation has no output type wider than {}",
                    input.as_tag()
                ))
            }),
        }
    }

    /// Largest supported sub-frame count for a given input sample type
    pub fn max_num_frames(self, input: PixelType) -> Option<u32> {
        match (self, input) {
            (Self::Summation, PixelType::Gray8) => Some(MAX_SUMMATION_FRAMES_8BIT),
            (Self::Summation, PixelType::Gray16) => Some(MAX_SUMMATION_FRAMES_16BIT),
            (Self::Summation, PixelType::Gray32) => Some(0),
            _ => None,
        }
    }

    /// Reject `num_frames` the method cannot combine without wraparound
    pub fn check_num_frames(self, input: PixelType, num_frames: u32) -> Result<(), ContractError> {
        if num_frames == 0 {
            return Err(ContractError::unsupported("num_frames must be >= 1"));
        }
        match self.max_num_frames(input) {
            Some(max) if num_frames > max => Err(ContractError::unsupported(format!(
                "{} of {} {} frames overflows {}",
                self.filter_name(),
                num_frames,
                input.as_tag(),
                self.output_pixel_type(input)
                    .map(PixelType::as_tag)
                    .unwrap_or("any output type"),
            ))),
            _ => Ok(()),
        }
    }
}

/// Per-acquisition construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionSettings {
    /// Integration method
    #[serde(default)]
    pub method: ConstructionMethod,

    /// Rank in [0, 1], used by the rank filter only
    #[serde(default = "default_rank")]
    pub rank: f64,

    /// Pixel offset of each camera channel within the raw frame.
    /// Empty means every channel starts at column 0.
    #[serde(default)]
    pub channel_offsets: Vec<u32>,

    /// Output image width. None uses the raw width minus the channel offset.
    #[serde(default)]
    pub image_width: Option<u32>,
}

fn default_rank() -> f64 {
    0.95
}

impl Default for ConstructionSettings {
    fn default() -> Self {
        Self {
            method: ConstructionMethod::default(),
            rank: default_rank(),
            channel_offsets: Vec::new(),
            image_width: None,
        }
    }
}

impl ConstructionSettings {
    pub fn new(method: ConstructionMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn with_rank(mut self, rank: f64) -> Self {
        self.rank = rank;
        self
    }

    /// Pixel offset for `camera_channel`
    pub fn channel_offset(&self, camera_channel: u32) -> u32 {
        self.channel_offsets
            .get(camera_channel as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Output width for `camera_channel` given the raw frame width
    pub fn output_width(&self, raw_width: u32, camera_channel: u32) -> u32 {
        self.image_width
            .unwrap_or_else(|| raw_width.saturating_sub(self.channel_offset(camera_channel)))
    }
}

/// Summary metadata describing how images of an acquisition are built
pub fn summary_tags(
    settings: &ConstructionSettings,
    input: PixelType,
    width: u32,
    height: u32,
) -> Result<ImageTags, ContractError> {
    let output = settings.method.output_pixel_type(input)?;
    let mut tags = ImageTags::new();
    tags.set_width(width);
    tags.set_height(height);
    tags.set_pixel_type(output);
    tags.insert(keys::CONSTRUCTION_FILTER, settings.method.filter_name());
    if settings.method == ConstructionMethod::RankFilter {
        tags.insert(keys::RANK_FILTER_RANK, settings.rank);
    }
    Ok(tags)
}
