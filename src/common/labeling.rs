// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use crate::error::{Error, Result};

/// A class index, or [`VOID_LABEL`] for pixels excluded from training and scoring.
pub type Label = i32;

pub const VOID_LABEL: Label = -1;

#[inline]
pub fn is_void(label: Label) -> bool {
    label < 0
}

/// A `width x height` grid of labels in raster order.
///
/// Labelings are produced once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labeling {
    labels: Vec<Label>,
    width: u32,
    height: u32,
}

impl Labeling {
    pub fn new(labels: Vec<Label>, width: u32, height: u32) -> Result<Self> {
        if labels.len() != width as usize * height as usize {
            return Err(Error::DimensionMismatch {
                expected: format!("{} labels for {}x{}", width * height, width, height),
                actual: format!("{} labels", labels.len()),
            });
        }
        Ok(Labeling {
            labels,
            width,
            height,
        })
    }

    /// Builds a labelling the caller already knows to hold `width * height` labels.
    pub(crate) fn from_raw(labels: Vec<Label>, width: u32, height: u32) -> Self {
        debug_assert_eq!(labels.len(), width as usize * height as usize);
        Labeling {
            labels,
            width,
            height,
        }
    }

    pub fn filled(width: u32, height: u32, label: Label) -> Self {
        Labeling {
            labels: vec![label; width as usize * height as usize],
            width,
            height,
        }
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
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Label {
        self.labels[(y * self.width + x) as usize]
    }

    pub fn count_void(&self) -> usize {
        self.labels.iter().filter(|&&l| is_void(l)).count()
    }

    pub fn into_labels(self) -> Vec<Label> {
        self.labels
    }
}
