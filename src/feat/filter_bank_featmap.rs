// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use super::{convolve_separable, rgb_to_lab, FeatureField, FeatureMap};
use crate::common::ImageData;
use crate::math;

/// Ratio between the two Gaussians of the difference-of-Gaussians response.
const DOG_RATIO: f32 = 1.6;

/// Gaussian filter bank over the Lab channels.
///
/// For every bandwidth it produces the smoothed L, a and b channels, a
/// difference-of-Gaussians response (an approximation of the Laplacian of
/// Gaussian) and the horizontal and vertical derivatives of the smoothed
/// lightness.
pub struct FilterBankFeatureMap {
    kernels: Vec<(Vec<f32>, Vec<f32>)>,
}

impl FilterBankFeatureMap {
    pub const RESPONSES_PER_BANDWIDTH: usize = 6;

    pub fn new(bandwidths: &[f32]) -> Self {
        let kernels = bandwidths
            .iter()
            .map(|&sigma| {
                (
                    math::gaussian_kernel(sigma),
                    math::gaussian_kernel(sigma * DOG_RATIO),
                )
            })
            .collect();
        FilterBankFeatureMap { kernels }
    }

    fn lab_planes(image: &ImageData) -> [Vec<f32>; 3] {
        let n = image.num_pixels();
        let mut planes = [vec![0.0; n], vec![0.0; n], vec![0.0; n]];
        for i in 0..n {
            let [l, a, b] = rgb_to_lab(image.color(i));
            planes[0][i] = l / 100.0;
            planes[1][i] = (a + 128.0) / 255.0;
            planes[2][i] = (b + 128.0) / 255.0;
        }
        planes
    }
}

impl FeatureMap for FilterBankFeatureMap {
    fn dimension(&self) -> usize {
        Self::RESPONSES_PER_BANDWIDTH * self.kernels.len()
    }

    fn compute(&self, image: &ImageData, field: &mut FeatureField, offset: usize) {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let planes = Self::lab_planes(image);

        let mut column = offset;
        for (narrow, wide) in &self.kernels {
            let smoothed: Vec<Vec<f32>> = planes
                .iter()
                .map(|plane| convolve_separable(plane, width, height, narrow))
                .collect();
            for plane in &smoothed {
                field.set_column(column, plane);
                column += 1;
            }

            let lightness = &smoothed[0];
            let wide_lightness = convolve_separable(&planes[0], width, height, wide);
            let mut dog = vec![0.0; lightness.len()];
            math::vector_sub(lightness, &wide_lightness, &mut dog);
            field.set_column(column, &dog);
            column += 1;

            let (dx, dy) = central_differences(lightness, width, height);
            field.set_column(column, &dx);
            field.set_column(column + 1, &dy);
            column += 2;
        }
    }
}

fn central_differences(plane: &[f32], width: usize, height: usize) -> (Vec<f32>, Vec<f32>) {
    let mut dx = vec![0.0; plane.len()];
    let mut dy = vec![0.0; plane.len()];
    for y in 0..height {
        for x in 0..width {
            let left = plane[y * width + x.saturating_sub(1)];
            let right = plane[y * width + (x + 1).min(width - 1)];
            let up = plane[y.saturating_sub(1) * width + x];
            let down = plane[(y + 1).min(height - 1) * width + x];
            dx[y * width + x] = 0.5 * (right - left);
            dy[y * width + x] = 0.5 * (down - up);
        }
    }
    (dx, dy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertical_edge_has_horizontal_gradient() {
        let (width, height) = (8u32, 4u32);
        let mut data = vec![];
        for _ in 0..height {
            for x in 0..width {
                let v = if x < width / 2 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        let image = ImageData::new(data, width, height).unwrap();
        let map = FilterBankFeatureMap::new(&[1.0]);
        let mut field = FeatureField::new(width, height, map.dimension());
        map.compute(&image, &mut field, 0);

        let at_edge = field.vector(width as usize + 4);
        let far_left = field.vector(width as usize);
        assert!(at_edge[4] > 0.05);
        assert!(far_left[4].abs() < at_edge[4]);
        assert!(at_edge[5].abs() < 1e-6);
    }
}
