//! Per-pixel sum into a widened sample type

use contracts::{ConstructionMethod, ContractError, PixelData, PixelType};

use super::{check_complete, check_frame, IntegrationGeometry};

/// Sums `num_frames` sub-frames into an output twice as wide as the input
///
/// Construction rejects any `num_frames` for which `num_frames * max_input`
/// would not fit the output type.
#[derive(Debug)]
pub struct FrameSummer {
    pub(super) geometry: IntegrationGeometry,
    pub(super) input_type: PixelType,
    pub(super) output_type: PixelType,
    pub(super) added: u32,
    sums: Vec<u64>,
}

impl FrameSummer {
    pub fn new(geometry: IntegrationGeometry, input_type: PixelType) -> Result<Self, ContractError> {
        let method = ConstructionMethod::Summation;
        let output_type = method.output_pixel_type(input_type)?;
        method.check_num_frames(input_type, geometry.num_frames)?;
        Ok(Self {
            geometry,
            input_type,
            output_type,
            added: 0,
            sums: vec![0; geometry.output_len()],
        })
    }

    pub fn add_frame(&mut self, frame: &PixelData) -> Result<(), ContractError> {
        check_frame(frame, self.input_type, &self.geometry, self.added)?;
        let sums = &mut self.sums;
        self.geometry.for_each_sample(frame, |i, v| sums[i] += v);
        self.added += 1;
        Ok(())
    }

    pub fn construct_image(self) -> Result<PixelData, ContractError> {
        check_complete(&self.geometry, self.added)?;
        debug_assert!(self.sums.iter().all(|&s| s <= self.output_type.max_value()));
        Ok(PixelData::from_samples(self.output_type, &self.sums))
    }
}
