//! Per-pixel mean

use contracts::{ContractError, PixelData, PixelType};

use super::{check_complete, check_frame, IntegrationGeometry};

/// Averages `num_frames` sub-frames; output keeps the input sample type
#[derive(Debug)]
pub struct FrameAverager {
    pub(super) geometry: IntegrationGeometry,
    pub(super) input_type: PixelType,
    pub(super) added: u32,
    sums: Vec<u64>,
}

impl FrameAverager {
    pub fn new(geometry: IntegrationGeometry, input_type: PixelType) -> Self {
        Self {
            geometry,
            input_type,
            added: 0,
            sums: vec![0; geometry.output_len()],
        }
    }

    pub fn add_frame(&mut self, frame: &PixelData) -> Result<(), ContractError> {
        check_frame(frame, self.input_type, &self.geometry, self.added)?;
        let sums = &mut self.sums;
        self.geometry.for_each_sample(frame, |i, v| sums[i] += v);
        self.added += 1;
        Ok(())
    }

    /// Truncating division by `num_frames`
    pub fn construct_image(self) -> Result<PixelData, ContractError> {
        check_complete(&self.geometry, self.added)?;
        let n = self.geometry.num_frames as u64;
        let means: Vec<u64> = self.sums.iter().map(|&sum| sum / n).collect();
        Ok(PixelData::from_samples(self.input_type, &means))
    }
}
