// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::{block_origins, is_void, Label, Labeling};
use crate::error::{Error, Result};
use crate::feat::FeatureField;

/// Seed of the per-block pixel choice. Every image starts from it, so sampling
/// does not depend on the order images are processed in.
const SUBSAMPLE_SEED: u64 = 0x5eed_b10c;

/// Labelled feature vectors gathered from one or more images.
#[derive(Debug, Clone)]
pub struct SampleSet {
    features: Vec<f32>,
    labels: Vec<Label>,
    dimension: usize,
}

/// What [`SampleSet::collect`] took from one image.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    pub collected: usize,
    pub skipped_void: usize,
}

impl SampleSet {
    pub fn new(dimension: usize) -> Self {
        SampleSet {
            features: vec![],
            labels: vec![],
            dimension,
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
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
    pub fn vector(&self, index: usize) -> &[f32] {
        &self.features[index * self.dimension..(index + 1) * self.dimension]
    }

    #[inline]
    pub fn value(&self, index: usize, dim: usize) -> f32 {
        self.features[index * self.dimension + dim]
    }

    pub fn push(&mut self, features: &[f32], label: Label) -> Result<()> {
        if features.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: format!("{} features", self.dimension),
                actual: format!("{} features", features.len()),
            });
        }
        self.features.extend_from_slice(features);
        self.labels.push(label);
        Ok(())
    }

    /// Moves all samples of `other` to the end of this set.
    pub fn append(&mut self, other: SampleSet) -> Result<()> {
        if other.dimension != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: format!("{} features", self.dimension),
                actual: format!("{} features", other.dimension),
            });
        }
        self.features.extend(other.features);
        self.labels.extend(other.labels);
        Ok(())
    }

    /// Adds the pixels of one image, keeping one pixel per `subsample x subsample` block.
    ///
    /// The kept pixel is drawn uniformly among the non-void pixels of the block
    /// from a fixed seed, so repeated runs pick the same pixels. Blocks that are
    /// entirely void contribute nothing.
    pub fn collect(
        &mut self,
        field: &FeatureField,
        truth: &Labeling,
        subsample: u32,
    ) -> Result<CollectStats> {
        if field.dimensions() != truth.dimensions() {
            return Err(Error::dimensions(truth.dimensions(), field.dimensions()));
        }
        let subsample = subsample.max(1);
        let (width, height) = truth.dimensions();
        let mut stats = CollectStats::default();
        let mut rng = StdRng::seed_from_u64(SUBSAMPLE_SEED);
        let mut candidates = Vec::with_capacity((subsample * subsample) as usize);

        for (bx, by) in block_origins(width, height, subsample) {
            candidates.clear();
            for y in by..(by + subsample).min(height) {
                for x in bx..(bx + subsample).min(width) {
                    let label = truth.get(x, y);
                    if is_void(label) {
                        stats.skipped_void += 1;
                    } else {
                        candidates.push(((y * width + x) as usize, label));
                    }
                }
            }
            if candidates.is_empty() {
                continue;
            }
            let (index, label) = candidates[rng.random_range(0..candidates.len())];
            self.push(field.vector(index), label)?;
            stats.collected += 1;
        }

        debug!(
            "collected {} samples from {}x{} image ({} void pixels skipped)",
            stats.collected, width, height, stats.skipped_void
        );
        Ok(stats)
    }

    /// Splits off every `every`-th sample, e.g. to hold them out for calibration.
    pub fn split_every(&self, every: usize) -> (SampleSet, SampleSet) {
        let mut kept = SampleSet::new(self.dimension);
        let mut held_out = SampleSet::new(self.dimension);
        for i in 0..self.len() {
            let target = if every > 0 && i % every == every - 1 {
                &mut held_out
            } else {
                &mut kept
            };
            target.features.extend_from_slice(self.vector(i));
            target.labels.push(self.labels[i]);
        }
        (kept, held_out)
    }

    /// Number of non-void samples per label in `0..num_labels`.
    pub fn class_counts(&self, num_labels: usize) -> Vec<usize> {
        let mut counts = vec![0; num_labels];
        for &label in &self.labels {
            if !is_void(label) && (label as usize) < num_labels {
                counts[label as usize] += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_with_index(width: u32, height: u32) -> FeatureField {
        let data = (0..width * height).map(|i| i as f32).collect();
        FeatureField::from_vec(data, width, height, 1).unwrap()
    }

    #[test]
    fn test_subsample_picks_one_pixel_per_block() {
        let field = field_with_index(4, 4);
        let truth = Labeling::new(vec![0; 16], 4, 4).unwrap();
        let mut samples = SampleSet::new(1);
        let stats = samples.collect(&field, &truth, 2).unwrap();

        assert_eq!(4, stats.collected);
        let blocks: [[f32; 4]; 4] = [
            [0.0, 1.0, 4.0, 5.0],
            [2.0, 3.0, 6.0, 7.0],
            [8.0, 9.0, 12.0, 13.0],
            [10.0, 11.0, 14.0, 15.0],
        ];
        for (i, block) in blocks.iter().enumerate() {
            assert!(block.contains(&samples.value(i, 0)), "sample {}", i);
        }

        let mut again = SampleSet::new(1);
        again.collect(&field, &truth, 2).unwrap();
        assert_eq!(samples.features, again.features);
    }

    #[test]
    fn test_subsample_spreads_over_block() {
        let (width, height) = (32, 32);
        let field = field_with_index(width, height);
        let truth = Labeling::filled(width, height, 0);
        let mut samples = SampleSet::new(1);
        samples.collect(&field, &truth, 2).unwrap();

        let mut offsets = [0usize; 4];
        for i in 0..samples.len() {
            let index = samples.value(i, 0) as u32;
            let (x, y) = (index % width, index / width);
            offsets[((y % 2) * 2 + x % 2) as usize] += 1;
        }
        assert_eq!(256, samples.len());
        assert!(offsets.iter().all(|&n| n > 30), "{:?}", offsets);
    }

    #[test]
    fn test_append() {
        let mut first = SampleSet::new(2);
        first.push(&[1.0, 2.0], 0).unwrap();
        let mut second = SampleSet::new(2);
        second.push(&[3.0, 4.0], 1).unwrap();

        first.append(second).unwrap();
        assert_eq!(&[0, 1], first.labels());
        assert_eq!(&[3.0, 4.0], first.vector(1));
        assert!(first.append(SampleSet::new(3)).is_err());
    }

    #[test]
    fn test_void_pixels_are_skipped() {
        let field = field_with_index(2, 2);
        let truth = Labeling::new(vec![-1, 1, -1, -1], 2, 2).unwrap();
        let mut samples = SampleSet::new(1);
        let stats = samples.collect(&field, &truth, 2).unwrap();

        assert_eq!(1, stats.collected);
        assert_eq!(3, stats.skipped_void);
        assert_eq!(&[1], samples.labels());
        assert_eq!(1.0, samples.value(0, 0));

        let all_void = Labeling::filled(2, 2, -1);
        let stats = samples.collect(&field, &all_void, 1).unwrap();
        assert_eq!(0, stats.collected);
        assert_eq!(1, samples.len());
    }

    #[test]
    fn test_collect_rejects_mismatched_truth() {
        let field = field_with_index(2, 2);
        let truth = Labeling::filled(3, 2, 0);
        let mut samples = SampleSet::new(1);
        assert!(matches!(
            samples.collect(&field, &truth, 1),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_split_every() {
        let mut samples = SampleSet::new(1);
        for i in 0..6 {
            samples.push(&[i as f32], 0).unwrap();
        }
        let (kept, held_out) = samples.split_every(3);
        assert_eq!(4, kept.len());
        assert_eq!(vec![2.0, 5.0], vec![held_out.value(0, 0), held_out.value(1, 0)]);
    }
}
