// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::common::{is_void, Label};
use crate::error::{Error, Result};
use crate::math;

/// Parameters of the multiclass logistic regression fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    pub max_iterations: usize,
    /// Initial gradient step; adapted by backtracking during the fit.
    pub learning_rate: f64,
    pub l2: f64,
    /// Stop once the objective changes by less than this between iterations.
    pub tolerance: f64,
    /// Hold out every n-th training sample for calibration; 0 calibrates on
    /// the boosting samples themselves.
    pub holdout_every: usize,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        CalibrationOptions {
            max_iterations: 300,
            learning_rate: 1.0,
            l2: 1e-4,
            tolerance: 1e-7,
            holdout_every: 5,
        }
    }
}

impl CalibrationOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::config("calibration needs at least one iteration"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::config("calibration learning rate must be positive"));
        }
        if !(self.l2.is_finite() && self.l2 >= 0.0) {
            return Err(Error::config("calibration l2 must be non-negative"));
        }
        if self.holdout_every == 1 {
            return Err(Error::config(
                "holding out every sample leaves nothing for boosting",
            ));
        }
        Ok(())
    }
}

/// Softmax regression from the `K` ensemble scores of a pixel to a distribution over `K` labels.
///
/// Row `k` of the weight matrix holds `K` input weights followed by a bias.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationModel {
    num_labels: usize,
    weights: Vec<f32>,
}

impl CalibrationModel {
    /// The model that predicts the uniform distribution whatever the scores.
    pub fn uniform(num_labels: usize) -> Self {
        CalibrationModel {
            num_labels,
            weights: vec![0.0; num_labels * (num_labels + 1)],
        }
    }

    pub fn from_weights(num_labels: usize, weights: Vec<f32>) -> Result<Self> {
        if weights.len() != num_labels * (num_labels + 1) {
            return Err(Error::Model(format!(
                "calibration needs {} weights for {} labels, got {}",
                num_labels * (num_labels + 1),
                num_labels,
                weights.len()
            )));
        }
        Ok(CalibrationModel {
            num_labels,
            weights,
        })
    }

    #[inline]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    fn row(&self, k: usize) -> &[f32] {
        let stride = self.num_labels + 1;
        &self.weights[k * stride..(k + 1) * stride]
    }

    /// Probability of every label given the ensemble scores; entries sum to one.
    pub fn predict(&self, scores: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0; self.num_labels];
        self.predict_into(scores, &mut output);
        output
    }

    pub fn predict_into(&self, scores: &[f32], output: &mut [f32]) {
        for (k, out) in output.iter_mut().enumerate().take(self.num_labels) {
            let row = self.row(k);
            let (weights, bias) = row.split_at(self.num_labels);
            *out = math::vector_inner_product(weights, scores) + bias[0];
        }
        math::softmax(&mut output[..self.num_labels]);
    }
}

/// Mean negative log-likelihood plus the L2 penalty, and its gradient.
fn objective(
    weights: &[f64],
    inputs: &[(&[f32], usize)],
    num_labels: usize,
    l2: f64,
    gradient: Option<&mut Vec<f64>>,
) -> f64 {
    let stride = num_labels + 1;
    let n = inputs.len() as f64;
    let mut loss = 0.0;
    let mut logits = vec![0.0f64; num_labels];

    let mut gradient = gradient;
    if let Some(g) = gradient.as_mut() {
        g.clear();
        g.resize(weights.len(), 0.0);
    }

    for &(scores, label) in inputs {
        for (k, logit) in logits.iter_mut().enumerate() {
            let row = &weights[k * stride..(k + 1) * stride];
            *logit = row[num_labels]
                + row[..num_labels]
                    .iter()
                    .zip(scores)
                    .map(|(&w, &s)| w * f64::from(s))
                    .sum::<f64>();
        }
        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let log_norm = max + logits.iter().map(|l| (l - max).exp()).sum::<f64>().ln();
        loss -= logits[label] - log_norm;

        if let Some(g) = gradient.as_mut() {
            for k in 0..num_labels {
                let p = (logits[k] - log_norm).exp();
                let residual = (p - if k == label { 1.0 } else { 0.0 }) / n;
                let row = &mut g[k * stride..(k + 1) * stride];
                for (gw, &s) in row[..num_labels].iter_mut().zip(scores) {
                    *gw += residual * f64::from(s);
                }
                row[num_labels] += residual;
            }
        }
    }

    let penalty: f64 = weights.iter().map(|w| w * w).sum::<f64>() * 0.5 * l2;
    if let Some(g) = gradient.as_mut() {
        for (gw, &w) in g.iter_mut().zip(weights) {
            *gw += l2 * w;
        }
    }
    loss / n + penalty
}

/// Fits the calibration model by gradient descent with a backtracking step.
///
/// Samples whose label is void, or outside `0..num_labels`, are left out of the
/// objective. Without any usable sample the uniform model is returned.
pub fn train_calibration(
    scores: &[Vec<f32>],
    labels: &[Label],
    num_labels: usize,
    options: &CalibrationOptions,
) -> Result<CalibrationModel> {
    if scores.len() != labels.len() {
        return Err(Error::DimensionMismatch {
            expected: format!("{} score vectors", labels.len()),
            actual: format!("{} score vectors", scores.len()),
        });
    }
    if let Some(bad) = scores.iter().find(|s| s.len() != num_labels) {
        return Err(Error::DimensionMismatch {
            expected: format!("{} scores per sample", num_labels),
            actual: format!("{} scores", bad.len()),
        });
    }

    let inputs: Vec<(&[f32], usize)> = scores
        .iter()
        .zip(labels)
        .filter(|&(_, &l)| !is_void(l) && (l as usize) < num_labels)
        .map(|(s, &l)| (s.as_slice(), l as usize))
        .collect();
    if inputs.is_empty() {
        warn!("no labelled samples for calibration, using the uniform model");
        return Ok(CalibrationModel::uniform(num_labels));
    }

    let mut weights = vec![0.0f64; num_labels * (num_labels + 1)];
    let mut gradient = vec![];
    let mut candidate = vec![0.0f64; weights.len()];
    let mut step = options.learning_rate;
    let mut current = objective(&weights, &inputs, num_labels, options.l2, Some(&mut gradient));
    let mut iterations = 0;

    while iterations < options.max_iterations {
        iterations += 1;

        let mut accepted = None;
        while step > 1e-12 {
            for ((c, &w), &g) in candidate.iter_mut().zip(&weights).zip(&gradient) {
                *c = w - step * g;
            }
            let value = objective(&candidate, &inputs, num_labels, options.l2, None);
            if value < current {
                accepted = Some(value);
                break;
            }
            step *= 0.5;
        }

        let value = match accepted {
            Some(value) => value,
            None => break,
        };
        weights.copy_from_slice(&candidate);
        let delta = current - value;
        current = objective(&weights, &inputs, num_labels, options.l2, Some(&mut gradient));
        step *= 1.25;

        if delta < options.tolerance {
            break;
        }
    }

    debug!(
        "calibration converged to {:.6} after {} iterations on {} samples",
        current,
        iterations,
        inputs.len()
    );
    CalibrationModel::from_weights(num_labels, weights.iter().map(|&w| w as f32).collect())
}
