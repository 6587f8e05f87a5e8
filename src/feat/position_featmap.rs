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

/// Normalised pixel position plus the coarse grid cell it falls into.
pub struct PositionFeatureMap {
    grid_spacing: u32,
}

impl PositionFeatureMap {
    pub const DIMENSION: usize = 4;

    pub fn new(grid_spacing: u32) -> Self {
        PositionFeatureMap { grid_spacing }
    }
}

impl FeatureMap for PositionFeatureMap {
    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn compute(&self, image: &ImageData, field: &mut FeatureField, offset: usize) {
        let width = image.width();
        let height = image.height();
        let cells = self.grid_spacing as f32;

        for y in 0..height {
            let v = (y as f32 + 0.5) / height as f32;
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32;
                let i = (y * width + x) as usize;
                field.set(i, offset, u);
                field.set(i, offset + 1, v);
                field.set(i, offset + 2, (u * cells).floor() / cells);
                field.set(i, offset + 3, (v * cells).floor() / cells);
            }
        }
    }
}
