// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use super::{FeatureField, FeatureMap};
use crate::common::ImageData;
use crate::math;

/// Local mean and standard deviation of luminance over square windows.
///
/// Both statistics come from integral images of the luminance and of its
/// square, so the cost per pixel does not depend on the window size.
/// Windows are clipped at the image border.
pub struct TextureFeatureMap {
    radii: Vec<u32>,
}

impl TextureFeatureMap {
    pub const STATS_PER_RADIUS: usize = 2;

    pub fn new(radii: &[u32]) -> Self {
        TextureFeatureMap {
            radii: radii.to_vec(),
        }
    }

    fn compute_integral_images(image: &ImageData) -> (Vec<f64>, Vec<f64>) {
        let width = image.width() as usize;
        let height = image.height() as usize;

        let luminance = image.luminance();
        let mut squares = vec![0.0f32; luminance.len()];
        math::square(&luminance, &mut squares);

        let mut int_img: Vec<f64> = luminance.iter().map(|&v| f64::from(v)).collect();
        let mut square_int_img: Vec<f64> = squares.iter().map(|&v| f64::from(v)).collect();
        math::compute_integral(&mut int_img, width, height);
        math::compute_integral(&mut square_int_img, width, height);

        (int_img, square_int_img)
    }
}

impl FeatureMap for TextureFeatureMap {
    fn dimension(&self) -> usize {
        Self::STATS_PER_RADIUS * self.radii.len()
    }

    fn compute(&self, image: &ImageData, field: &mut FeatureField, offset: usize) {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let (int_img, square_int_img) = Self::compute_integral_images(image);

        for (r, &radius) in self.radii.iter().enumerate() {
            let radius = radius as usize;
            let column = offset + r * Self::STATS_PER_RADIUS;
            for y in 0..height {
                let y0 = y.saturating_sub(radius);
                let y1 = (y + radius).min(height - 1);
                for x in 0..width {
                    let x0 = x.saturating_sub(radius);
                    let x1 = (x + radius).min(width - 1);
                    let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;

                    let mean = math::integral_rect_sum(&int_img, width, (x0, y0), (x1, y1)) / area;
                    let m2 =
                        math::integral_rect_sum(&square_int_img, width, (x0, y0), (x1, y1)) / area;
                    let std_dev = (m2 - mean * mean).max(0.0).sqrt();

                    let i = y * width + x;
                    field.set(i, column, mean as f32);
                    field.set(i, column + 1, std_dev as f32);
                }
            }
        }
    }
}
