//! Integration strategies
//!
//! Each strategy receives exactly `num_frames` sub-frames (oldest first) and
//! produces one output buffer. All strategies accumulate in `u64`.

mod average;
mod rank_filter;
mod summation;

pub use average::FrameAverager;
pub use rank_filter::RankFilter;
pub use summation::FrameSummer;

use contracts::{ConstructionMethod, ContractError, PixelData, PixelType};

use crate::error::{ConstructionError, Result};

/// Where the output image sits inside a raw sub-frame
///
/// Sensors that pack two optical channels side by side deliver frames of
/// `raw_width` columns; each channel reads `width` columns from `pixel_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrationGeometry {
    /// Raw sub-frame width
    pub raw_width: u32,
    /// Output width
    pub width: u32,
    /// Output height (equal to the raw height)
    pub height: u32,
    /// First raw column of this channel
    pub pixel_offset: u32,
    /// Sub-frames per output image
    pub num_frames: u32,
}

impl IntegrationGeometry {
    /// Geometry that uses the whole raw frame
    pub fn full_frame(width: u32, height: u32, num_frames: u32) -> Self {
        Self {
            raw_width: width,
            width,
            height,
            pixel_offset: 0,
            num_frames,
        }
    }

    /// Check dimensions and that the sub-rectangle fits the raw frame
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ConstructionError::invalid_geometry(format!(
                "output size must be > 0, got {}x{}",
                self.width, self.height
            )));
        }
        if self.num_frames == 0 {
            return Err(ConstructionError::invalid_geometry("num_frames must be >= 1"));
        }
        if self.pixel_offset as u64 + self.width as u64 > self.raw_width as u64 {
            return Err(ConstructionError::invalid_geometry(format!(
                "offset {} + width {} exceeds raw width {}",
                self.pixel_offset, self.width, self.raw_width
            )));
        }
        Ok(())
    }

    /// Output pixels per image
    pub fn output_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Raw samples a sub-frame must provide
    pub fn raw_len(&self) -> usize {
        self.raw_width as usize * self.height as usize
    }

    /// Visit every output pixel of `frame` as `(output_index, sample)`
    #[inline]
    pub(crate) fn for_each_sample(&self, frame: &PixelData, mut f: impl FnMut(usize, u64)) {
        let width = self.width as usize;
        let raw_width = self.raw_width as usize;
        let offset = self.pixel_offset as usize;
        for row in 0..self.height as usize {
            let src = row * raw_width + offset;
            let dst = row * width;
            for col in 0..width {
                if let Some(value) = frame.sample(src + col) {
                    f(dst + col, value);
                }
            }
        }
    }
}

/// Check a sub-frame against the integrator's expectations
pub(crate) fn check_frame(
    frame: &PixelData,
    input_type: PixelType,
    geometry: &IntegrationGeometry,
    added: u32,
) -> std::result::Result<(), ContractError> {
    if added >= geometry.num_frames {
        return Err(ContractError::BatchOverflow {
            expected: geometry.num_frames,
        });
    }
    if frame.pixel_type() != input_type {
        return Err(ContractError::malformed_frame(format!(
            "expected {} samples, got {}",
            input_type.as_tag(),
            frame.pixel_type().as_tag()
        )));
    }
    if frame.len() < geometry.raw_len() {
        return Err(ContractError::malformed_frame(format!(
            "expected {} samples ({}x{}), got {}",
            geometry.raw_len(),
            geometry.raw_width,
            geometry.height,
            frame.len()
        )));
    }
    Ok(())
}

/// Fail fast when fewer than `num_frames` sub-frames were added
pub(crate) fn check_complete(
    geometry: &IntegrationGeometry,
    added: u32,
) -> std::result::Result<(), ContractError> {
    if added < geometry.num_frames {
        return Err(ContractError::IncompleteBatch {
            expected: geometry.num_frames,
            received: added,
        });
    }
    Ok(())
}

/// Integration strategy selected by [`ConstructionMethod`]
#[derive(Debug)]
pub enum Integrator {
    Average(FrameAverager),
    Summation(FrameSummer),
    RankFilter(RankFilter),
}

impl Integrator {
    /// Create the strategy for `method`
    ///
    /// `rank` is only used by the rank filter.
    ///
    /// # Errors
    /// Invalid geometry, rank outside [0, 1], or a summation that could wrap.
    pub fn new(
        method: ConstructionMethod,
        geometry: IntegrationGeometry,
        rank: f64,
        input_type: PixelType,
    ) -> Result<Self> {
        geometry.validate()?;
        Ok(match method {
            ConstructionMethod::Average => Self::Average(FrameAverager::new(geometry, input_type)),
            ConstructionMethod::Summation => {
                Self::Summation(FrameSummer::new(geometry, input_type)?)
            }
            ConstructionMethod::RankFilter => {
                Self::RankFilter(RankFilter::new(geometry, rank, input_type)?)
            }
        })
    }

    pub fn method(&self) -> ConstructionMethod {
        match self {
            Self::Average(_) => ConstructionMethod::Average,
            Self::Summation(_) => ConstructionMethod::Summation,
            Self::RankFilter(_) => ConstructionMethod::RankFilter,
        }
    }

    pub fn geometry(&self) -> &IntegrationGeometry {
        match self {
            Self::Average(i) => &i.geometry,
            Self::Summation(i) => &i.geometry,
            Self::RankFilter(i) => &i.geometry,
        }
    }

    /// Sample type of the constructed image
    pub fn output_pixel_type(&self) -> PixelType {
        match self {
            Self::Average(i) => i.input_type,
            Self::Summation(i) => i.output_type,
            Self::RankFilter(i) => i.input_type,
        }
    }

    /// Sub-frames added so far
    pub fn frames_added(&self) -> u32 {
        match self {
            Self::Average(i) => i.added,
            Self::Summation(i) => i.added,
            Self::RankFilter(i) => i.frames.len() as u32,
        }
    }

    /// Whether every required sub-frame has been added
    pub fn is_complete(&self) -> bool {
        self.frames_added() == self.geometry().num_frames
    }

    /// Add the next sub-frame (oldest first)
    pub fn add_frame(&mut self, frame: &PixelData) -> Result<()> {
        match self {
            Self::Average(i) => i.add_frame(frame),
            Self::Summation(i) => i.add_frame(frame),
            Self::RankFilter(i) => i.add_frame(frame),
        }
        .map_err(ConstructionError::from)
    }

    /// Combine the added sub-frames into one image
    pub fn construct_image(self) -> Result<PixelData> {
        match self {
            Self::Average(i) => i.construct_image(),
            Self::Summation(i) => i.construct_image(),
            Self::RankFilter(i) => i.construct_image(),
        }
        .map_err(ConstructionError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_validation() {
        let ok = IntegrationGeometry {
            raw_width: 8,
            width: 4,
            height: 2,
            pixel_offset: 4,
            num_frames: 1,
        };
        assert!(ok.validate().is_ok());
        assert!(IntegrationGeometry { pixel_offset: 5, ..ok }.validate().is_err());
        assert!(IntegrationGeometry { num_frames: 0, ..ok }.validate().is_err());
        assert!(IntegrationGeometry { height: 0, ..ok }.validate().is_err());
    }

    #[test]
    fn test_for_each_sample_reads_offset_window() {
        // 2 rows of 4 raw columns, right half selected
        let frame = PixelData::from(vec![0u8, 1, 2, 3, 10, 11, 12, 13]);
        let geometry = IntegrationGeometry {
            raw_width: 4,
            width: 2,
            height: 2,
            pixel_offset: 2,
            num_frames: 1,
        };
        let mut out = vec![0u64; geometry.output_len()];
        geometry.for_each_sample(&frame, |i, v| out[i] = v);
        assert_eq!(out, vec![2, 3, 12, 13]);
    }

    #[test]
    fn test_integrator_rejects_wrong_type_and_short_frame() {
        let geometry = IntegrationGeometry::full_frame(2, 2, 2);
        let mut integrator =
            Integrator::new(ConstructionMethod::Average, geometry, 0.5, PixelType::Gray8).unwrap();

        let wrong_type = PixelData::from(vec![0u16; 4]);
        assert!(matches!(
            integrator.add_frame(&wrong_type),
            Err(ConstructionError::Contract(ContractError::MalformedFrame { .. }))
        ));

        let short = PixelData::from(vec![0u8; 3]);
        assert!(integrator.add_frame(&short).is_err());
        assert_eq!(integrator.frames_added(), 0);
    }

    #[test]
    fn test_construct_early_fails_fast() {
        for method in [
            ConstructionMethod::Average,
            ConstructionMethod::Summation,
            ConstructionMethod::RankFilter,
        ] {
            let geometry = IntegrationGeometry::full_frame(2, 2, 3);
            let mut integrator = Integrator::new(method, geometry, 0.5, PixelType::Gray8).unwrap();
            integrator
                .add_frame(&PixelData::uniform(PixelType::Gray8, 4, 7))
                .unwrap();
            assert!(!integrator.is_complete());
            match integrator.construct_image() {
                Err(ConstructionError::Contract(ContractError::IncompleteBatch {
                    expected,
                    received,
                })) => {
                    assert_eq!(expected, 3);
                    assert_eq!(received, 1);
                }
                other => panic!("{method:?}: expected IncompleteBatch, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_add_beyond_num_frames_rejected() {
        let geometry = IntegrationGeometry::full_frame(1, 1, 1);
        let mut integrator =
            Integrator::new(ConstructionMethod::Summation, geometry, 0.0, PixelType::Gray8)
                .unwrap();
        let frame = PixelData::from(vec![9u8]);
        integrator.add_frame(&frame).unwrap();
        assert!(integrator.is_complete());
        assert!(matches!(
            integrator.add_frame(&frame),
            Err(ConstructionError::Contract(ContractError::BatchOverflow { expected: 1 }))
        ));
    }
}
