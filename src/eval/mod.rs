// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use std::fmt;

use crate::common::{is_void, Labeling};
use crate::error::{Error, Result};

/// Pixel counts indexed by (true label, predicted label).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    num_labels: usize,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(num_labels: usize) -> Self {
        ConfusionMatrix {
            num_labels,
            counts: vec![0; num_labels * num_labels],
        }
    }

    #[inline]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    #[inline]
    pub fn get(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[truth * self.num_labels + predicted]
    }

    #[inline]
    fn add(&mut self, truth: usize, predicted: usize) {
        self.counts[truth * self.num_labels + predicted] += 1;
    }

    /// Adds the counts of `other`, which must cover the same labels.
    pub fn merge(&mut self, other: &ConfusionMatrix) -> Result<()> {
        if other.num_labels != self.num_labels {
            return Err(Error::DimensionMismatch {
                expected: format!("{} labels", self.num_labels),
                actual: format!("{} labels", other.num_labels),
            });
        }
        for (c, o) in self.counts.iter_mut().zip(&other.counts) {
            *c += o;
        }
        Ok(())
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn correct(&self) -> u64 {
        (0..self.num_labels).map(|k| self.get(k, k)).sum()
    }

    fn row_sum(&self, truth: usize) -> u64 {
        (0..self.num_labels).map(|p| self.get(truth, p)).sum()
    }

    fn column_sum(&self, predicted: usize) -> u64 {
        (0..self.num_labels).map(|t| self.get(t, predicted)).sum()
    }

    /// Fraction of counted pixels on the diagonal; zero when nothing was counted.
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Recall of every label; `None` for labels absent from the ground truth.
    pub fn class_accuracy(&self) -> Vec<Option<f64>> {
        (0..self.num_labels)
            .map(|k| {
                let row = self.row_sum(k);
                if row == 0 {
                    None
                } else {
                    Some(ratio(self.get(k, k), row))
                }
            })
            .collect()
    }

    /// Precision of every label; `None` for labels never predicted.
    pub fn class_precision(&self) -> Vec<Option<f64>> {
        (0..self.num_labels)
            .map(|k| {
                let column = self.column_sum(k);
                if column == 0 {
                    None
                } else {
                    Some(ratio(self.get(k, k), column))
                }
            })
            .collect()
    }

    /// Intersection over union per label; `None` when the label appears nowhere.
    pub fn class_iou(&self) -> Vec<Option<f64>> {
        (0..self.num_labels)
            .map(|k| {
                let union = self.row_sum(k) + self.column_sum(k) - self.get(k, k);
                if union == 0 {
                    None
                } else {
                    Some(ratio(self.get(k, k), union))
                }
            })
            .collect()
    }

    /// Mean recall over the labels present in the ground truth.
    pub fn average_class_accuracy(&self) -> f64 {
        let present: Vec<f64> = self.class_accuracy().into_iter().flatten().collect();
        if present.is_empty() {
            0.0
        } else {
            present.iter().sum::<f64>() / present.len() as f64
        }
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in 0..self.num_labels {
            let row: Vec<String> = (0..self.num_labels)
                .map(|p| self.get(t, p).to_string())
                .collect();
            writeln!(f, "{}", row.join(" "))?;
        }
        Ok(())
    }
}

#[inline]
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Scoring of one predicted labelling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageScore {
    /// Non-void ground-truth pixels.
    pub counted: u64,
    pub correct: u64,
    /// Counted pixels whose prediction is void or outside the label range.
    pub invalid: u64,
}

impl ImageScore {
    pub fn errors(&self) -> u64 {
        self.counted - self.correct
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.counted)
    }
}

/// Scores `predicted` against `truth` and accumulates the counts into `confusion`.
///
/// Pixels that are void in the ground truth are ignored, whatever was predicted
/// there. Counted pixels with an out-of-range prediction are errors but are not
/// added to the matrix.
pub fn score(
    predicted: &Labeling,
    truth: &Labeling,
    confusion: &mut ConfusionMatrix,
) -> Result<ImageScore> {
    if predicted.dimensions() != truth.dimensions() {
        return Err(Error::dimensions(truth.dimensions(), predicted.dimensions()));
    }

    let num_labels = confusion.num_labels();
    let mut result = ImageScore::default();
    for (&p, &t) in predicted.labels().iter().zip(truth.labels()) {
        if is_void(t) {
            continue;
        }
        result.counted += 1;
        if (t as usize) >= num_labels || is_void(p) || (p as usize) >= num_labels {
            result.invalid += 1;
            continue;
        }
        if p == t {
            result.correct += 1;
        }
        confusion.add(t as usize, p as usize);
    }
    Ok(result)
}

/// Accuracy and confusion matrix of a single labelling.
pub fn evaluate(
    predicted: &Labeling,
    truth: &Labeling,
    num_labels: usize,
) -> Result<(f64, ConfusionMatrix)> {
    let mut confusion = ConfusionMatrix::new(num_labels);
    let score = score(predicted, truth, &mut confusion)?;
    Ok((score.accuracy(), confusion))
}
