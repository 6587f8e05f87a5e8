// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use crate::error::{Error, Result};

pub const NUM_CHANNELS: usize = 3;

/// An RGB image stored row by row, three bytes per pixel.
#[derive(Debug, Clone)]
pub struct ImageData {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl ImageData {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * NUM_CHANNELS;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(Error::DimensionMismatch {
                expected: format!("{} bytes for {}x{} RGB", expected, width, height),
                actual: format!("{} bytes", data.len()),
            });
        }
        Ok(ImageData {
            data,
            width,
            height,
        })
    }

    /// Builds an RGB image from a single gray channel by replicating it.
    pub fn from_gray(gray: &[u8], width: u32, height: u32) -> Result<Self> {
        let data = gray.iter().flat_map(|&v| [v, v, v]).collect();
        ImageData::new(data, width, height)
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
    pub fn pixel(&self, index: usize) -> [u8; 3] {
        let i = index * NUM_CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Colour of a pixel with channels scaled to `[0, 1]`.
    #[inline]
    pub fn color(&self, index: usize) -> [f32; 3] {
        let [r, g, b] = self.pixel(index);
        [
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
        ]
    }

    /// Rec. 601 luma, scaled to `[0, 1]`.
    pub fn luminance(&self) -> Vec<f32> {
        (0..self.num_pixels())
            .map(|i| {
                let [r, g, b] = self.color(i);
                0.299 * r + 0.587 * g + 0.114 * b
            })
            .collect()
    }
}
