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

/// CIE L*a*b* colour of each pixel, scaled so every channel spans roughly `[0, 1]`.
pub struct ColorFeatureMap;

impl ColorFeatureMap {
    pub const DIMENSION: usize = 3;

    pub fn new() -> Self {
        ColorFeatureMap
    }
}

impl FeatureMap for ColorFeatureMap {
    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn compute(&self, image: &ImageData, field: &mut FeatureField, offset: usize) {
        for i in 0..image.num_pixels() {
            let [l, a, b] = rgb_to_lab(image.color(i));
            field.set(i, offset, l / 100.0);
            field.set(i, offset + 1, (a + 128.0) / 255.0);
            field.set(i, offset + 2, (b + 128.0) / 255.0);
        }
    }
}

#[inline]
fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[inline]
fn lab_f(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

/// Converts an sRGB colour with channels in `[0, 1]` to CIE L*a*b* under D65.
pub fn rgb_to_lab([r, g, b]: [f32; 3]) -> [f32; 3] {
    let (r, g, b) = (srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b));

    let x = (0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b) / 0.950_47;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175 * b;
    let z = (0.019_333_9 * r + 0.119_192 * g + 0.950_304_1 * b) / 1.088_83;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}
