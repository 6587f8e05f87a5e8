// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::{BoostingOptions, CalibrationOptions};
use crate::crf::{validate_weight, Connectivity, SolverOptions};
use crate::error::{Error, Result};
use crate::feat::FeatureOptions;

/// Validation images used by the pairwise weight search unless configured otherwise.
pub const DEFAULT_MAX_VALIDATION_IMAGES: usize = 100;

/// Pairwise term and weight search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairwiseOptions {
    /// Candidate pairwise weights tried by the search.
    pub candidates: Vec<f32>,
    pub max_validation_images: usize,
    pub connectivity: Connectivity,
}

impl Default for PairwiseOptions {
    fn default() -> Self {
        PairwiseOptions {
            candidates: vec![0.0, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0],
            max_validation_images: DEFAULT_MAX_VALIDATION_IMAGES,
            connectivity: Connectivity::Eight,
        }
    }
}

/// Complete configuration of training and inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub num_classes: usize,
    pub features: FeatureOptions,
    pub boosting: BoostingOptions,
    pub calibration: CalibrationOptions,
    /// Keep one training pixel per `subsample x subsample` block.
    pub subsample: u32,
    pub pairwise: PairwiseOptions,
    pub solver: SolverOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            num_classes: 21,
            features: FeatureOptions::default(),
            boosting: BoostingOptions::default(),
            calibration: CalibrationOptions::default(),
            subsample: 4,
            pairwise: PairwiseOptions::default(),
            solver: SolverOptions::default(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("cannot parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Config::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(format!("cannot serialise configuration: {}", e)))
    }

    /// Checks every setting; a run must not start with an invalid configuration.
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(Error::config("number of classes must be positive"));
        }
        if self.boosting.num_rounds == 0 {
            return Err(Error::config("boosting needs at least one round"));
        }
        let max_thresholds = self.boosting.max_thresholds;
        if max_thresholds == 0 || max_thresholds > usize::from(u16::MAX) {
            return Err(Error::config(format!(
                "max_thresholds must lie in 1..={}",
                u16::MAX
            )));
        }
        if self.subsample == 0 {
            return Err(Error::config("subsample factor must be positive"));
        }
        self.features.validate()?;
        self.calibration.validate()?;
        for &candidate in &self.pairwise.candidates {
            validate_weight(candidate)?;
        }
        self.solver.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SplitCriterion;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json(
            r#"{
                "num_classes": 3,
                "boosting": { "num_rounds": 12, "split_criterion": "gini" },
                "pairwise": { "candidates": [0, 1, 5], "connectivity": "four" },
                "solver": { "time_budget_ms": 250 }
            }"#,
        )
        .unwrap();

        assert_eq!(3, config.num_classes);
        assert_eq!(12, config.boosting.num_rounds);
        assert_eq!(SplitCriterion::Gini, config.boosting.split_criterion);
        assert_eq!(32, config.boosting.max_thresholds);
        assert_eq!(vec![0.0, 1.0, 5.0], config.pairwise.candidates);
        assert_eq!(Connectivity::Four, config.pairwise.connectivity);
        assert_eq!(DEFAULT_MAX_VALIDATION_IMAGES, config.pairwise.max_validation_images);
        assert_eq!(Some(250), config.solver.time_budget_ms);
        assert_eq!(FeatureOptions::default(), config.features);
    }

    #[test]
    fn test_json_round_trip() {
        let config = Config::default();
        assert_eq!(config, Config::from_json(&config.to_json().unwrap()).unwrap());
    }

    #[test]
    fn test_invalid_settings_are_config_errors() {
        let cases = [
            r#"{ "num_classes": 0 }"#,
            r#"{ "subsample": 0 }"#,
            r#"{ "boosting": { "num_rounds": 0 } }"#,
            r#"{ "features": { "bandwidths": [1.0, -2.0] } }"#,
            r#"{ "pairwise": { "candidates": [1.0, -0.5] } }"#,
            r#"{ "solver": { "max_sweeps": 0 } }"#,
            r#"{ "calibration": { "holdout_every": 1 } }"#,
            r#"{ "num_classes": "many" }"#,
        ];
        for json in cases.iter() {
            assert!(matches!(Config::from_json(json), Err(Error::Config(_))), "{}", json);
        }
    }
}
