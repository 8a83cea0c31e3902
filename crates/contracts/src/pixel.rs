//! Pixel sample types and immutable pixel buffers.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Sample type of a grayscale pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    #[serde(rename = "GRAY8")]
    Gray8,
    #[serde(rename = "GRAY16")]
    Gray16,
    #[serde(rename = "GRAY32")]
    Gray32,
}

impl PixelType {
    /// Pixel type for a hardware bytes-per-pixel value
    pub fn from_bytes_per_pixel(bytes: u32) -> Option<Self> {
        match bytes {
            1 => Some(Self::Gray8),
            2 => Some(Self::Gray16),
            4 => Some(Self::Gray32),
            _ => None,
        }
    }

    /// Bytes per sample
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Gray8 => 1,
            Self::Gray16 => 2,
            Self::Gray32 => 4,
        }
    }

    /// Declared bit depth
    pub fn bit_depth(self) -> u32 {
        self.bytes_per_pixel() * 8
    }

    /// Largest representable sample value
    pub fn max_value(self) -> u64 {
        match self {
            Self::Gray8 => u8::MAX as u64,
            Self::Gray16 => u16::MAX as u64,
            Self::Gray32 => u32::MAX as u64,
        }
    }

    /// Type with twice the bit width, if one exists
    pub fn widened(self) -> Option<Self> {
        match self {
            Self::Gray8 => Some(Self::Gray16),
            Self::Gray16 => Some(Self::Gray32),
            Self::Gray32 => None,
        }
    }

    /// Tag value used in image metadata
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::Gray8 => "GRAY8",
            Self::Gray16 => "GRAY16",
            Self::Gray32 => "GRAY32",
        }
    }
}

/// Immutable pixel buffer
///
/// Clones share the underlying storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelData {
    Gray8(Bytes),
    Gray16(Arc<[u16]>),
    Gray32(Arc<[u32]>),
}

impl PixelData {
    /// Sample type of this buffer
    pub fn pixel_type(&self) -> PixelType {
        match self {
            Self::Gray8(_) => PixelType::Gray8,
            Self::Gray16(_) => PixelType::Gray16,
            Self::Gray32(_) => PixelType::Gray32,
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        match self {
            Self::Gray8(p) => p.len(),
            Self::Gray16(p) => p.len(),
            Self::Gray32(p) => p.len(),
        }
    }

    /// Whether the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.len() * self.pixel_type().bytes_per_pixel() as usize
    }

    /// Sample at `index`, widened to u64
    #[inline]
    pub fn sample(&self, index: usize) -> Option<u64> {
        match self {
            Self::Gray8(p) => p.get(index).map(|&v| v as u64),
            Self::Gray16(p) => p.get(index).map(|&v| v as u64),
            Self::Gray32(p) => p.get(index).map(|&v| v as u64),
        }
    }

    /// Buffer filled with one value, truncated to `pixel_type`
    pub fn uniform(pixel_type: PixelType, len: usize, value: u64) -> Self {
        match pixel_type {
            PixelType::Gray8 => Self::Gray8(Bytes::from(vec![value as u8; len])),
            PixelType::Gray16 => Self::Gray16(vec![value as u16; len].into()),
            PixelType::Gray32 => Self::Gray32(vec![value as u32; len].into()),
        }
    }

    /// Build a buffer of `pixel_type` from u64 samples.
    ///
    /// Values are truncated to the target width; callers guarantee they fit.
    pub fn from_samples(pixel_type: PixelType, samples: &[u64]) -> Self {
        match pixel_type {
            PixelType::Gray8 => {
                Self::Gray8(Bytes::from(samples.iter().map(|&v| v as u8).collect::<Vec<_>>()))
            }
            PixelType::Gray16 => Self::Gray16(samples.iter().map(|&v| v as u16).collect()),
            PixelType::Gray32 => Self::Gray32(samples.iter().map(|&v| v as u32).collect()),
        }
    }
}

impl From<Vec<u8>> for PixelData {
    fn from(v: Vec<u8>) -> Self {
        Self::Gray8(Bytes::from(v))
    }
}

impl From<Vec<u16>> for PixelData {
    fn from(v: Vec<u16>) -> Self {
        Self::Gray16(v.into())
    }
}

impl From<Vec<u32>> for PixelData {
    fn from(v: Vec<u32>) -> Self {
        Self::Gray32(v.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening_chain() {
        assert_eq!(PixelType::Gray8.widened(), Some(PixelType::Gray16));
        assert_eq!(PixelType::Gray16.widened(), Some(PixelType::Gray32));
        assert_eq!(PixelType::Gray32.widened(), None);
    }

    #[test]
    fn test_byte_len_follows_type() {
        let data = PixelData::uniform(PixelType::Gray16, 10, 7);
        assert_eq!(data.len(), 10);
        assert_eq!(data.byte_len(), 20);
        assert_eq!(data.sample(3), Some(7));
        assert_eq!(data.sample(10), None);
    }

    #[test]
    fn test_from_bytes_per_pixel() {
        assert_eq!(PixelType::from_bytes_per_pixel(1), Some(PixelType::Gray8));
        assert_eq!(PixelType::from_bytes_per_pixel(3), None);
    }
}
