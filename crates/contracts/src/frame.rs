//! RawFrame (hardware output) and IntegratedImage (construction output)

use std::time::Instant;

use crate::{AxesCoordinates, ImageTags, PixelData, PixelType};

/// Raw sub-frame read from the hardware ring buffer
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Pixel samples, row-major, `width * height` long
    pub pixels: PixelData,

    /// Raw frame width (may pack several optical channels side by side)
    pub width: u32,

    /// Raw frame height
    pub height: u32,

    /// Camera channel that produced the frame
    pub camera_channel: u32,

    /// Driver-side metadata
    pub tags: ImageTags,

    /// Capture instant
    pub captured_at: Instant,

    /// Optional capture sequence number (for ordering/diagnostics)
    pub sequence: Option<u64>,
}

impl RawFrame {
    pub fn new(pixels: PixelData, width: u32, height: u32, camera_channel: u32) -> Self {
        Self {
            pixels,
            width,
            height,
            camera_channel,
            tags: ImageTags::new(),
            captured_at: Instant::now(),
            sequence: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixels.pixel_type()
    }
}

/// One constructed image, ready for storage and display
#[derive(Debug, Clone)]
pub struct IntegratedImage {
    /// Output samples, row-major
    pub pixels: PixelData,

    /// Final tags (width/height/pixel type/elapsed time already set)
    pub tags: ImageTags,

    /// Dataset position
    pub axes: AxesCoordinates,

    pub width: u32,

    pub height: u32,

    /// Always false for grayscale construction
    pub is_rgb: bool,
}

impl IntegratedImage {
    pub fn pixel_type(&self) -> PixelType {
        self.pixels.pixel_type()
    }

    pub fn bit_depth(&self) -> u32 {
        self.pixel_type().bit_depth()
    }

    /// Bytes of pixel payload (used for throughput accounting)
    pub fn byte_len(&self) -> usize {
        self.pixels.byte_len()
    }
}
