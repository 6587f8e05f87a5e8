// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

mod color_featmap;
mod filter_bank_featmap;
mod position_featmap;
mod texture_featmap;

pub use self::color_featmap::{rgb_to_lab, ColorFeatureMap};
pub use self::filter_bank_featmap::FilterBankFeatureMap;
pub use self::position_featmap::PositionFeatureMap;
pub use self::texture_featmap::TextureFeatureMap;

use serde::{Deserialize, Serialize};

use crate::common::ImageData;
use crate::error::{Error, Result};

/// One group of per-pixel features.
///
/// A map writes exactly `dimension()` values per pixel, starting at column `offset`
/// of the field.
pub trait FeatureMap: Send + Sync {
    fn dimension(&self) -> usize;
    fn compute(&self, image: &ImageData, field: &mut FeatureField, offset: usize);
}

/// Which feature groups are extracted, and their parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureOptions {
    pub color: bool,
    pub filter_bank: bool,
    /// Gaussian bandwidths of the filter bank, in pixels.
    pub bandwidths: Vec<f32>,
    pub texture: bool,
    /// Half-sizes of the square windows used for local statistics.
    pub texture_radii: Vec<u32>,
    pub position: bool,
    /// Number of coarse cells per image axis.
    pub grid_spacing: u32,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        FeatureOptions {
            color: true,
            filter_bank: true,
            bandwidths: vec![1.0, 2.0, 4.0],
            texture: true,
            texture_radii: vec![2, 5],
            position: true,
            grid_spacing: 4,
        }
    }
}

impl FeatureOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.color || self.filter_bank || self.texture || self.position) {
            return Err(Error::config("no feature group is enabled"));
        }
        if self.filter_bank {
            if self.bandwidths.is_empty() {
                return Err(Error::config("filter bank enabled without bandwidths"));
            }
            if let Some(sigma) = self.bandwidths.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
                return Err(Error::config(format!(
                    "filter bandwidth must be positive, got {}",
                    sigma
                )));
            }
        }
        if self.texture {
            if self.texture_radii.is_empty() {
                return Err(Error::config("texture enabled without window radii"));
            }
            if self.texture_radii.contains(&0) {
                return Err(Error::config("texture window radius must be positive"));
            }
        }
        if self.position && self.grid_spacing == 0 {
            return Err(Error::config("grid spacing must be positive"));
        }
        Ok(())
    }

    /// Length of the feature vector these options produce, independent of image size.
    pub fn dimension(&self) -> usize {
        let mut dimension = 0;
        if self.color {
            dimension += ColorFeatureMap::DIMENSION;
        }
        if self.filter_bank {
            dimension += FilterBankFeatureMap::RESPONSES_PER_BANDWIDTH * self.bandwidths.len();
        }
        if self.texture {
            dimension += TextureFeatureMap::STATS_PER_RADIUS * self.texture_radii.len();
        }
        if self.position {
            dimension += PositionFeatureMap::DIMENSION;
        }
        dimension
    }
}

/// Dense per-pixel feature vectors, pixel-major.
#[derive(Debug, Clone)]
pub struct FeatureField {
    data: Vec<f32>,
    dimension: usize,
    width: u32,
    height: u32,
}

impl FeatureField {
    pub fn new(width: u32, height: u32, dimension: usize) -> Self {
        FeatureField {
            data: vec![0.0; width as usize * height as usize * dimension],
            dimension,
            width,
            height,
        }
    }

    /// Wraps precomputed vectors, e.g. features produced outside this crate.
    pub fn from_vec(data: Vec<f32>, width: u32, height: u32, dimension: usize) -> Result<Self> {
        if data.len() != width as usize * height as usize * dimension {
            return Err(Error::DimensionMismatch {
                expected: format!("{}x{}x{}", width, height, dimension),
                actual: format!("{} values", data.len()),
            });
        }
        Ok(FeatureField {
            data,
            dimension,
            width,
            height,
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub fn vector(&self, index: usize) -> &[f32] {
        &self.data[index * self.dimension..(index + 1) * self.dimension]
    }

    #[inline]
    pub fn set(&mut self, index: usize, column: usize, value: f32) {
        self.data[index * self.dimension + column] = value;
    }

    /// Writes one full column from a per-pixel plane.
    pub fn set_column(&mut self, column: usize, plane: &[f32]) {
        debug_assert_eq!(plane.len(), self.num_pixels());
        for (i, &value) in plane.iter().enumerate() {
            self.set(i, column, value);
        }
    }
}

/// Computes every enabled feature group for an image.
pub struct FeatureExtractor {
    options: FeatureOptions,
    maps: Vec<Box<dyn FeatureMap>>,
}

impl FeatureExtractor {
    pub fn new(options: &FeatureOptions) -> Result<Self> {
        options.validate()?;

        let mut maps: Vec<Box<dyn FeatureMap>> = vec![];
        if options.color {
            maps.push(Box::new(ColorFeatureMap::new()));
        }
        if options.filter_bank {
            maps.push(Box::new(FilterBankFeatureMap::new(&options.bandwidths)));
        }
        if options.texture {
            maps.push(Box::new(TextureFeatureMap::new(&options.texture_radii)));
        }
        if options.position {
            maps.push(Box::new(PositionFeatureMap::new(options.grid_spacing)));
        }

        Ok(FeatureExtractor {
            options: options.clone(),
            maps,
        })
    }

    pub fn options(&self) -> &FeatureOptions {
        &self.options
    }

    pub fn dimension(&self) -> usize {
        self.maps.iter().map(|m| m.dimension()).sum()
    }

    pub fn compute(&self, image: &ImageData) -> FeatureField {
        let mut field = FeatureField::new(image.width(), image.height(), self.dimension());
        let mut offset = 0;
        for map in &self.maps {
            map.compute(image, &mut field, offset);
            offset += map.dimension();
        }
        field
    }
}

/// Separable convolution of a `width x height` plane with a symmetric kernel,
/// clamping reads at the border.
pub(crate) fn convolve_separable(
    plane: &[f32],
    width: usize,
    height: usize,
    kernel: &[f32],
) -> Vec<f32> {
    let radius = (kernel.len() / 2) as isize;
    let clamp = |v: isize, max: usize| v.max(0).min(max as isize - 1) as usize;

    let mut horizontal = vec![0.0; plane.len()];
    for y in 0..height {
        let row = &plane[y * width..(y + 1) * width];
        for x in 0..width {
            horizontal[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, &w)| w * row[clamp(x as isize + k as isize - radius, width)])
                .sum();
        }
    }

    let mut output = vec![0.0; plane.len()];
    for y in 0..height {
        for x in 0..width {
            output[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, &w)| {
                    w * horizontal[clamp(y as isize + k as isize - radius, height) * width + x]
                })
                .sum();
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(width: u32, height: u32) -> ImageData {
        let mut data = vec![];
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 7 % 256) as u8, (y * 11 % 256) as u8, 128]);
            }
        }
        ImageData::new(data, width, height).unwrap()
    }

    #[test]
    fn test_dimension_does_not_depend_on_image_size() {
        let extractor = FeatureExtractor::new(&FeatureOptions::default()).unwrap();
        let small = extractor.compute(&gradient_image(4, 3));
        let large = extractor.compute(&gradient_image(37, 21));
        assert_eq!(small.dimension(), large.dimension());
        assert_eq!(FeatureOptions::default().dimension(), small.dimension());
        assert_eq!(3 + 6 * 3 + 2 * 2 + 4, small.dimension());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = FeatureExtractor::new(&FeatureOptions::default()).unwrap();
        let image = gradient_image(9, 8);
        let a = extractor.compute(&image);
        let b = extractor.compute(&image);
        for i in 0..a.num_pixels() {
            assert_eq!(a.vector(i), b.vector(i));
        }
        assert!(a.vector(40).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_rejects_non_positive_bandwidth() {
        let options = FeatureOptions {
            bandwidths: vec![1.0, 0.0],
            ..Default::default()
        };
        assert!(matches!(FeatureExtractor::new(&options), Err(Error::Config(_))));

        let options = FeatureOptions {
            bandwidths: vec![],
            ..Default::default()
        };
        assert!(FeatureExtractor::new(&options).is_err());
    }

    #[test]
    fn test_disabled_group_without_parameters_is_fine() {
        let options = FeatureOptions {
            filter_bank: false,
            bandwidths: vec![],
            ..Default::default()
        };
        let extractor = FeatureExtractor::new(&options).unwrap();
        assert_eq!(3 + 4 + 4, extractor.dimension());
    }

    #[test]
    fn test_rejects_empty_configuration() {
        let options = FeatureOptions {
            color: false,
            filter_bank: false,
            texture: false,
            position: false,
            ..Default::default()
        };
        assert!(FeatureExtractor::new(&options).is_err());
    }

    #[test]
    fn test_convolution_preserves_constant_plane() {
        let plane = vec![0.5; 20];
        let kernel = crate::math::gaussian_kernel(1.0);
        let smoothed = convolve_separable(&plane, 5, 4, &kernel);
        assert!(smoothed.iter().all(|v| (v - 0.5).abs() < 1e-6));
    }
}
