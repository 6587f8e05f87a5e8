// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use std::cmp::Ordering;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::SampleSet;
use crate::common::{is_void, Label};

const MIN_ERROR: f64 = 1e-10;

/// Objective used to rank candidate stumps in a boosting round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitCriterion {
    /// Weighted misclassification error.
    Misclassification,
    /// Weighted Gini impurity of both sides of the threshold.
    Gini,
    /// Weighted entropy of both sides of the threshold.
    Entropy,
}

impl SplitCriterion {
    /// Cost of one side of a split holding `positive` and `negative` weight.
    fn side_cost(self, positive: f64, negative: f64) -> f64 {
        let total = positive + negative;
        if total <= 0.0 {
            return 0.0;
        }
        match self {
            SplitCriterion::Misclassification => positive.min(negative),
            SplitCriterion::Gini => 2.0 * positive * negative / total,
            SplitCriterion::Entropy => {
                let h = |w: f64| if w > 0.0 { -w / total * (w / total).ln() } else { 0.0 };
                total * (h(positive) + h(negative))
            }
        }
    }
}

impl Default for SplitCriterion {
    fn default() -> Self {
        SplitCriterion::Misclassification
    }
}

/// Threshold rule on a single feature: `polarity` above the threshold, `-polarity` otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionStump {
    dim: usize,
    threshold: f32,
    polarity: i8,
}

impl DecisionStump {
    pub fn new(dim: usize, threshold: f32, polarity: i8) -> Self {
        DecisionStump {
            dim,
            threshold,
            polarity: if polarity < 0 { -1 } else { 1 },
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    #[inline]
    pub fn polarity(&self) -> i8 {
        self.polarity
    }

    #[inline]
    pub fn classify(&self, features: &[f32]) -> f32 {
        if features[self.dim] > self.threshold {
            f32::from(self.polarity)
        } else {
            -f32::from(self.polarity)
        }
    }
}

/// Ordered weak classifiers with their confidence weights, for one label.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoostedEnsemble {
    stumps: Vec<(DecisionStump, f32)>,
}

impl BoostedEnsemble {
    pub fn new() -> Self {
        BoostedEnsemble { stumps: vec![] }
    }

    pub fn add_stump(&mut self, stump: DecisionStump, alpha: f32) {
        self.stumps.push((stump, alpha));
    }

    #[inline]
    pub fn stumps(&self) -> &[(DecisionStump, f32)] {
        &self.stumps
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stumps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stumps.is_empty()
    }

    /// Largest feature index read by any stump, if there are stumps.
    pub fn max_dim(&self) -> Option<usize> {
        self.stumps.iter().map(|(s, _)| s.dim()).max()
    }

    /// Weighted vote of the weak classifiers. An empty ensemble scores zero.
    pub fn score(&self, features: &[f32]) -> f32 {
        self.stumps
            .iter()
            .map(|(stump, alpha)| alpha * stump.classify(features))
            .sum()
    }
}

/// Candidate thresholds per feature, and every sample's bucket among them.
///
/// The space only depends on the sample values, so it is built once and
/// shared by the ensembles of all labels.
pub struct StumpSearchSpace {
    thresholds: Vec<Vec<f32>>,
    // bins[dim][sample]: number of thresholds strictly below the sample value
    bins: Vec<Vec<u16>>,
}

impl StumpSearchSpace {
    pub fn new(samples: &SampleSet, max_thresholds: usize) -> Self {
        let max_thresholds = max_thresholds.clamp(1, usize::from(u16::MAX));
        let mut thresholds = Vec::with_capacity(samples.dimension());
        let mut bins = Vec::with_capacity(samples.dimension());

        for dim in 0..samples.dimension() {
            let mut values: Vec<f32> = (0..samples.len())
                .filter(|&i| !is_void(samples.labels()[i]))
                .map(|i| samples.value(i, dim))
                .filter(|v| v.is_finite())
                .collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            values.dedup();

            let midpoints: Vec<f32> = values.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
            let candidates = if midpoints.len() > max_thresholds {
                let last = midpoints.len() - 1;
                let mut picked: Vec<f32> = (0..max_thresholds)
                    .map(|j| midpoints[j * last / (max_thresholds - 1).max(1)])
                    .collect();
                picked.dedup();
                picked
            } else {
                midpoints
            };

            let dim_bins = (0..samples.len())
                .map(|i| {
                    let v = samples.value(i, dim);
                    candidates.partition_point(|&t| t < v) as u16
                })
                .collect();

            thresholds.push(candidates);
            bins.push(dim_bins);
        }

        StumpSearchSpace { thresholds, bins }
    }

    pub fn num_candidates(&self) -> usize {
        self.thresholds.iter().map(|t| t.len()).sum()
    }
}

/// Parameters of one-vs-all boosting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingOptions {
    pub num_rounds: usize,
    pub split_criterion: SplitCriterion,
    /// Upper bound on candidate thresholds per feature.
    pub max_thresholds: usize,
}

impl Default for BoostingOptions {
    fn default() -> Self {
        BoostingOptions {
            num_rounds: 100,
            split_criterion: SplitCriterion::Misclassification,
            max_thresholds: 32,
        }
    }
}

struct Split {
    dim: usize,
    index: usize,
    threshold: f32,
    polarity: i8,
    cost: f64,
    error: f64,
}

fn find_best_split(
    space: &StumpSearchSpace,
    targets: &[f64],
    weights: &[f64],
    criterion: SplitCriterion,
) -> Option<Split> {
    let mut best: Option<Split> = None;
    let mut positive = vec![];
    let mut negative = vec![];

    for (dim, thresholds) in space.thresholds.iter().enumerate() {
        if thresholds.is_empty() {
            continue;
        }

        // Weighted positive and negative mass per bucket, then prefix sums so that
        // index j holds the mass at or below thresholds[j].
        positive.clear();
        positive.resize(thresholds.len() + 1, 0.0);
        negative.clear();
        negative.resize(thresholds.len() + 1, 0.0);
        for ((&bin, &target), &weight) in space.bins[dim].iter().zip(targets).zip(weights) {
            if target > 0.0 {
                positive[bin as usize] += weight;
            } else {
                negative[bin as usize] += weight;
            }
        }
        let total_positive: f64 = positive.iter().sum();
        let total_negative: f64 = negative.iter().sum();

        let mut below_positive = 0.0;
        let mut below_negative = 0.0;
        for (j, &threshold) in thresholds.iter().enumerate() {
            below_positive += positive[j];
            below_negative += negative[j];
            let above_positive = total_positive - below_positive;
            let above_negative = total_negative - below_negative;

            // polarity +1 predicts positive above the threshold
            let error_up = below_positive + above_negative;
            let error_down = below_negative + above_positive;
            let (polarity, error) = if error_up <= error_down {
                (1, error_up)
            } else {
                (-1, error_down)
            };

            let cost = match criterion {
                SplitCriterion::Misclassification => error,
                _ => {
                    criterion.side_cost(below_positive, below_negative)
                        + criterion.side_cost(above_positive, above_negative)
                }
            };

            if best.as_ref().map_or(true, |b| cost < b.cost) {
                best = Some(Split {
                    dim,
                    index: j,
                    threshold,
                    polarity,
                    cost,
                    error,
                });
            }
        }
    }

    best
}

/// Trains the one-vs-all ensemble of `label` with discrete AdaBoost.
///
/// Runs exactly `options.num_rounds` rounds unless no feature offers a
/// threshold at all. Void samples carry no weight. Training is deterministic:
/// equal inputs yield bit-identical ensembles.
pub fn train_boosted(
    samples: &SampleSet,
    space: &StumpSearchSpace,
    label: Label,
    options: &BoostingOptions,
) -> BoostedEnsemble {
    let mut ensemble = BoostedEnsemble::new();

    let targets: Vec<f64> = samples
        .labels()
        .iter()
        .map(|&l| if l == label { 1.0 } else { -1.0 })
        .collect();
    let num_positive = samples.labels().iter().filter(|&&l| l == label).count();
    let num_negative = samples.labels().iter().filter(|&&l| !is_void(l) && l != label).count();

    if num_positive == 0 {
        warn!("label {} has no training samples, its ensemble stays empty", label);
        return ensemble;
    }

    // Positives and negatives start with equal total mass.
    let positive_share = if num_negative == 0 { 1.0 } else { 0.5 };
    let mut weights: Vec<f64> = samples
        .labels()
        .iter()
        .map(|&l| {
            if l == label {
                positive_share / num_positive as f64
            } else if is_void(l) {
                0.0
            } else {
                (1.0 - positive_share) / num_negative as f64
            }
        })
        .collect();

    for round in 0..options.num_rounds {
        let split = match find_best_split(space, &targets, &weights, options.split_criterion) {
            Some(split) => split,
            None => {
                debug!("label {}: no candidate thresholds, stopping at round {}", label, round);
                break;
            }
        };

        let error = split.error.max(MIN_ERROR).min(1.0 - MIN_ERROR);
        let alpha = 0.5 * ((1.0 - error) / error).ln();
        let stump = DecisionStump::new(split.dim, split.threshold, split.polarity);

        let mut sum = 0.0;
        let bins = &space.bins[split.dim];
        for ((weight, &target), &bin) in weights.iter_mut().zip(&targets).zip(bins) {
            let above = bin as usize > split.index;
            let output = if above { f64::from(split.polarity) } else { -f64::from(split.polarity) };
            *weight *= (-alpha * target * output).exp();
            sum += *weight;
        }
        if sum > 0.0 {
            weights.iter_mut().for_each(|w| *w /= sum);
        }

        ensemble.add_stump(stump, alpha as f32);
    }

    debug!(
        "label {}: trained {} stumps on {} positive / {} negative samples",
        label,
        ensemble.len(),
        num_positive,
        num_negative
    );
    ensemble
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cluster_samples() -> SampleSet {
        let mut samples = SampleSet::new(2);
        let points = [
            ([0.1, 0.9], 0),
            ([0.2, 0.1], 0),
            ([0.3, 0.5], 0),
            ([0.7, 0.4], 1),
            ([0.8, 0.8], 1),
            ([0.9, 0.2], 1),
            ([0.5, 0.5], -1),
        ];
        for (features, label) in points.iter() {
            samples.push(features, *label).unwrap();
        }
        samples
    }

    #[test]
    fn test_stump_classify() {
        let stump = DecisionStump::new(1, 0.5, -1);
        assert_eq!(-1.0, stump.classify(&[0.0, 0.7]));
        assert_eq!(1.0, stump.classify(&[0.0, 0.5]));
    }

    #[test]
    fn test_separable_data_is_learned() {
        let samples = two_cluster_samples();
        let space = StumpSearchSpace::new(&samples, 32);
        let options = BoostingOptions {
            num_rounds: 5,
            ..Default::default()
        };

        let ensemble = train_boosted(&samples, &space, 1, &options);
        assert_eq!(5, ensemble.len());
        let first = ensemble.stumps()[0].0;
        assert_eq!(0, first.dim());
        assert!(first.threshold() > 0.3 && first.threshold() < 0.7);
        assert_eq!(1, first.polarity());

        assert!(ensemble.score(&[0.85, 0.5]) > 0.0);
        assert!(ensemble.score(&[0.15, 0.5]) < 0.0);
    }

    #[test]
    fn test_training_is_deterministic() {
        let samples = two_cluster_samples();
        let space = StumpSearchSpace::new(&samples, 4);
        for criterion in [
            SplitCriterion::Misclassification,
            SplitCriterion::Gini,
            SplitCriterion::Entropy,
        ]
        .iter()
        {
            let options = BoostingOptions {
                num_rounds: 8,
                split_criterion: *criterion,
                max_thresholds: 4,
            };
            let a = train_boosted(&samples, &space, 0, &options);
            let b = train_boosted(&samples, &StumpSearchSpace::new(&samples, 4), 0, &options);
            assert_eq!(a, b);
            for ((sa, aa), (sb, ab)) in a.stumps().iter().zip(b.stumps()) {
                assert_eq!(sa.threshold().to_bits(), sb.threshold().to_bits());
                assert_eq!(aa.to_bits(), ab.to_bits());
            }
        }
    }

    #[test]
    fn test_missing_label_yields_empty_ensemble() {
        let samples = two_cluster_samples();
        let space = StumpSearchSpace::new(&samples, 32);
        let ensemble = train_boosted(&samples, &space, 2, &BoostingOptions::default());
        assert!(ensemble.is_empty());
        assert_eq!(0.0, ensemble.score(&[0.5, 0.5]));
    }

    #[test]
    fn test_threshold_candidates_are_bounded() {
        let mut samples = SampleSet::new(1);
        for i in 0..100 {
            samples.push(&[i as f32], i % 2).unwrap();
        }
        let space = StumpSearchSpace::new(&samples, 8);
        assert_eq!(8, space.num_candidates());

        let constant = {
            let mut s = SampleSet::new(1);
            s.push(&[1.0], 0).unwrap();
            s.push(&[1.0], 1).unwrap();
            s
        };
        let space = StumpSearchSpace::new(&constant, 8);
        assert_eq!(0, space.num_candidates());
        let ensemble = train_boosted(&constant, &space, 0, &BoostingOptions::default());
        assert!(ensemble.is_empty());
    }

    #[test]
    fn test_criteria_costs() {
        assert_eq!(0.0, SplitCriterion::Gini.side_cost(1.0, 0.0));
        assert!((SplitCriterion::Gini.side_cost(1.0, 1.0) - 1.0).abs() < 1e-12);
        assert!((SplitCriterion::Entropy.side_cost(1.0, 1.0) - 2.0 * 2f64.ln()).abs() < 1e-12);
        assert_eq!(0.25, SplitCriterion::Misclassification.side_cost(0.25, 0.5));
    }
}
