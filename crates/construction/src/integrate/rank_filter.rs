//! Spatio-temporal percentile filter

use contracts::{ContractError, PixelData, PixelType};

use super::{check_complete, check_frame, IntegrationGeometry};

/// Samples per pixel per sub-frame (3x3 neighborhood)
const NEIGHBORHOOD: usize = 9;

/// Selects, per output pixel, the `rank` percentile of its 3x3 neighborhood
/// across every sub-frame (`9 * num_frames` samples).
///
/// Border neighborhoods replicate the nearest in-bounds pixel.
#[derive(Debug)]
pub struct RankFilter {
    pub(super) geometry: IntegrationGeometry,
    pub(super) input_type: PixelType,
    pub(super) frames: Vec<Vec<u32>>,
    rank: f64,
}

impl RankFilter {
    pub fn new(
        geometry: IntegrationGeometry,
        rank: f64,
        input_type: PixelType,
    ) -> Result<Self, ContractError> {
        if !(0.0..=1.0).contains(&rank) {
            return Err(ContractError::unsupported(format!(
                "rank must be in [0, 1], got {rank}"
            )));
        }
        Ok(Self {
            geometry,
            input_type,
            frames: Vec::with_capacity(geometry.num_frames as usize),
            rank,
        })
    }

    /// Index into the sorted `9 * num_frames` samples
    pub fn selection_index(&self) -> usize {
        let last = (NEIGHBORHOOD * self.geometry.num_frames as usize - 1) as f64;
        (last * self.rank).floor() as usize
    }

    pub fn add_frame(&mut self, frame: &PixelData) -> Result<(), ContractError> {
        check_frame(frame, self.input_type, &self.geometry, self.frames.len() as u32)?;
        let mut window = vec![0u32; self.geometry.output_len()];
        self.geometry
            .for_each_sample(frame, |i, v| window[i] = v as u32);
        self.frames.push(window);
        Ok(())
    }

    pub fn construct_image(self) -> Result<PixelData, ContractError> {
        check_complete(&self.geometry, self.frames.len() as u32)?;

        let width = self.geometry.width as usize;
        let height = self.geometry.height as usize;
        let index = self.selection_index();
        let mut samples: Vec<u32> = Vec::with_capacity(NEIGHBORHOOD * self.frames.len());
        let mut output = Vec::with_capacity(width * height);

        for y in 0..height {
            for x in 0..width {
                samples.clear();
                for frame in &self.frames {
                    for dy in [-1isize, 0, 1] {
                        let ny = clamp_coord(y, dy, height);
                        for dx in [-1isize, 0, 1] {
                            let nx = clamp_coord(x, dx, width);
                            samples.push(frame[ny * width + nx]);
                        }
                    }
                }
                let (_, selected, _) = samples.select_nth_unstable(index);
                output.push(*selected as u64);
            }
        }

        Ok(PixelData::from_samples(self.input_type, &output))
    }
}

/// Neighbor coordinate with edge replication
#[inline]
fn clamp_coord(pos: usize, delta: isize, len: usize) -> usize {
    (pos as isize + delta).clamp(0, len as isize - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn filter(width: u32, height: u32, rank: f64, frames: &[Vec<u8>]) -> PixelData {
        let geometry = IntegrationGeometry::full_frame(width, height, frames.len() as u32);
        let mut rf = RankFilter::new(geometry, rank, PixelType::Gray8).unwrap();
        for f in frames {
            rf.add_frame(&PixelData::from(f.clone())).unwrap();
        }
        rf.construct_image().unwrap()
    }

    /// Reference: full 3x3xN gather with replicated borders, sorted
    fn neighborhood(frames: &[Vec<u8>], width: usize, height: usize, x: usize, y: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for f in frames {
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let nx = (x as isize + dx).clamp(0, width as isize - 1) as usize;
                    let ny = (y as isize + dy).clamp(0, height as isize - 1) as usize;
                    out.push(f[ny * width + nx]);
                }
            }
        }
        out.sort_unstable();
        out
    }

    #[test]
    fn test_rank_zero_is_min_and_one_is_max() {
        let mut rng = rand::rng();
        let (w, h) = (5usize, 4usize);
        let frames: Vec<Vec<u8>> = (0..3)
            .map(|_| (0..w * h).map(|_| rng.random_range(1..=254)).collect())
            .collect();

        let min = filter(w as u32, h as u32, 0.0, &frames);
        let max = filter(w as u32, h as u32, 1.0, &frames);
        for y in 0..h {
            for x in 0..w {
                let sorted = neighborhood(&frames, w, h, x, y);
                assert_eq!(sorted.len(), 27);
                assert_eq!(min.sample(y * w + x), Some(sorted[0] as u64));
                assert_eq!(max.sample(y * w + x), Some(sorted[26] as u64));
            }
        }
    }

    #[test]
    fn test_median_matches_reference() {
        let mut rng = rand::rng();
        let (w, h) = (6usize, 3usize);
        let frames: Vec<Vec<u8>> = (0..2)
            .map(|_| (0..w * h).map(|_| rng.random()).collect())
            .collect();
        let out = filter(w as u32, h as u32, 0.5, &frames);
        // floor(17 * 0.5) = 8
        for y in 0..h {
            for x in 0..w {
                let sorted = neighborhood(&frames, w, h, x, y);
                assert_eq!(out.sample(y * w + x), Some(sorted[8] as u64));
            }
        }
    }

    #[test]
    fn test_border_replicates_never_zero() {
        // Uniform frame: zero padding would pull rank-0 border pixels to 0
        let frames = vec![vec![50u8; 9]; 2];
        let out = filter(3, 3, 0.0, &frames);
        assert!((0..9).all(|i| out.sample(i) == Some(50)));
    }

    #[test]
    fn test_single_pixel_image() {
        let out = filter(1, 1, 1.0, &[vec![3u8], vec![9u8], vec![4u8]]);
        assert_eq!(out.sample(0), Some(9));
    }

    #[test]
    fn test_selection_index() {
        let geometry = IntegrationGeometry::full_frame(2, 2, 4);
        let rf = RankFilter::new(geometry, 0.95, PixelType::Gray8).unwrap();
        // floor(35 * 0.95) = 33
        assert_eq!(rf.selection_index(), 33);
        assert!(RankFilter::new(geometry, -0.1, PixelType::Gray8).is_err());
    }
}
