// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

mod expansion;
pub mod maxflow;
mod pairwise;
mod search;

pub use self::expansion::{labeling_energy, ExpansionSolver, InferenceResult};
pub use self::pairwise::{Connectivity, ContrastPotential, Edge};
pub use self::search::{search_pairwise_weight, SearchOutcome, ValidationItem};

use serde::{Deserialize, Serialize};

use crate::common::{Label, Labeling};
use crate::error::{Error, Result};
use crate::math;

/// Smallest probability considered when turning a distribution into unary costs.
pub const MIN_PROBABILITY: f32 = 1e-12;

/// Per-pixel label distributions of one image, pixel-major.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryField {
    probabilities: Vec<f32>,
    width: u32,
    height: u32,
    num_labels: usize,
}

impl UnaryField {
    pub fn new(
        probabilities: Vec<f32>,
        width: u32,
        height: u32,
        num_labels: usize,
    ) -> Result<Self> {
        if num_labels == 0 || probabilities.len() != width as usize * height as usize * num_labels {
            return Err(Error::DimensionMismatch {
                expected: format!("{}x{}x{}", width, height, num_labels),
                actual: format!("{} probabilities", probabilities.len()),
            });
        }
        Ok(UnaryField {
            probabilities,
            width,
            height,
            num_labels,
        })
    }

    #[inline]
    pub fn num_labels(&self) -> usize {
        self.num_labels
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
    pub fn distribution(&self, index: usize) -> &[f32] {
        &self.probabilities[index * self.num_labels..(index + 1) * self.num_labels]
    }

    /// Negative log-probability of `label` at pixel `index`.
    #[inline]
    pub fn cost(&self, index: usize, label: usize) -> f64 {
        -f64::from(self.distribution(index)[label].max(MIN_PROBABILITY)).ln()
    }

    /// Independent per-pixel argmax; the lowest label wins ties.
    pub fn argmax_labeling(&self) -> Labeling {
        let labels = (0..self.num_pixels())
            .map(|i| math::argmax(self.distribution(i)).unwrap_or(0) as Label)
            .collect();
        Labeling::from_raw(labels, self.width, self.height)
    }
}

/// Stopping rules of the energy minimisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Upper bound on full expansion sweeps over all labels.
    pub max_sweeps: usize,
    /// Wall-clock budget in milliseconds, unlimited when absent.
    pub time_budget_ms: Option<u64>,
    /// A sweep improving the energy by no more than this ends the minimisation.
    pub energy_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            max_sweeps: 5,
            time_budget_ms: None,
            energy_tolerance: 1e-6,
        }
    }
}

impl SolverOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_sweeps == 0 {
            return Err(Error::config("solver needs at least one sweep"));
        }
        if !(self.energy_tolerance.is_finite() && self.energy_tolerance >= 0.0) {
            return Err(Error::config("energy tolerance must be non-negative"));
        }
        Ok(())
    }
}

/// Checks a pairwise weight: finite and not negative.
pub fn validate_weight(weight: f32) -> Result<()> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(Error::config(format!(
            "pairwise weight must be finite and non-negative, got {}",
            weight
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_labeling_matches_example() {
        let unary = UnaryField::new(vec![0.9, 0.1, 0.8, 0.2, 0.1, 0.9, 0.2, 0.8], 2, 2, 2).unwrap();
        assert_eq!(&[0, 0, 1, 1], unary.argmax_labeling().labels());
    }

    #[test]
    fn test_cost_is_clamped() {
        let unary = UnaryField::new(vec![1.0, 0.0], 1, 1, 2).unwrap();
        assert_eq!(0.0, unary.cost(0, 0));
        assert!(unary.cost(0, 1).is_finite());
    }

    #[test]
    fn test_validate_weight() {
        assert!(validate_weight(0.0).is_ok());
        assert!(validate_weight(-0.5).is_err());
        assert!(validate_weight(f32::NAN).is_err());
    }
}
