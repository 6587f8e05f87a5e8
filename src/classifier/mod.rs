// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

mod boosted_classifier;
mod calibration;
mod samples;

pub use self::boosted_classifier::{
    train_boosted, BoostedEnsemble, BoostingOptions, DecisionStump, SplitCriterion,
    StumpSearchSpace,
};
pub use self::calibration::{train_calibration, CalibrationModel, CalibrationOptions};
pub use self::samples::{CollectStats, SampleSet};

use log::{info, warn};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::common::Label;
use crate::crf::UnaryField;
use crate::error::{Error, Result};
use crate::feat::FeatureField;

/// The per-pixel classifier: one boosted ensemble per label plus the calibration on top.
///
/// Immutable once built; inference shares it by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryModel {
    ensembles: Vec<BoostedEnsemble>,
    calibration: CalibrationModel,
    dimension: usize,
}

impl UnaryModel {
    pub fn new(
        ensembles: Vec<BoostedEnsemble>,
        calibration: CalibrationModel,
        dimension: usize,
    ) -> Result<Self> {
        if ensembles.is_empty() {
            return Err(Error::Model("a unary model needs at least one label".to_string()));
        }
        if ensembles.len() != calibration.num_labels() {
            return Err(Error::Model(format!(
                "{} ensembles but calibration for {} labels",
                ensembles.len(),
                calibration.num_labels()
            )));
        }
        if let Some(dim) = ensembles.iter().filter_map(|e| e.max_dim()).max() {
            if dim >= dimension {
                return Err(Error::Model(format!(
                    "stump reads feature {} of a {}-dimensional vector",
                    dim, dimension
                )));
            }
        }
        Ok(UnaryModel {
            ensembles,
            calibration,
            dimension,
        })
    }

    #[inline]
    pub fn num_labels(&self) -> usize {
        self.ensembles.len()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn ensembles(&self) -> &[BoostedEnsemble] {
        &self.ensembles
    }

    pub fn calibration(&self) -> &CalibrationModel {
        &self.calibration
    }

    /// Raw ensemble score of every label.
    pub fn scores(&self, features: &[f32]) -> Vec<f32> {
        self.ensembles.iter().map(|e| e.score(features)).collect()
    }

    /// Calibrated label distribution of one feature vector.
    pub fn distribution(&self, features: &[f32]) -> Vec<f32> {
        self.calibration.predict(&self.scores(features))
    }

    /// Label distributions of every pixel of a feature field.
    pub fn predict_field(&self, field: &FeatureField) -> Result<UnaryField> {
        if field.dimension() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: format!("{} features", self.dimension),
                actual: format!("{} features", field.dimension()),
            });
        }

        let k = self.num_labels();
        let mut probabilities = vec![0.0; field.num_pixels() * k];
        let mut scores = vec![0.0; k];
        for (i, out) in probabilities.chunks_mut(k).enumerate() {
            let features = field.vector(i);
            for (score, ensemble) in scores.iter_mut().zip(&self.ensembles) {
                *score = ensemble.score(features);
            }
            self.calibration.predict_into(&scores, out);
        }
        UnaryField::new(probabilities, field.width(), field.height(), k)
    }
}

/// Trains all per-label ensembles, then fits the calibration on their scores.
///
/// Ensembles are independent and train in parallel when `rayon` is enabled;
/// calibration starts once all of them are done. With `holdout_every > 0`
/// every n-th sample is kept away from boosting and used for calibration.
pub fn train_unary_model(
    samples: &SampleSet,
    num_labels: usize,
    boosting: &BoostingOptions,
    calibration: &CalibrationOptions,
) -> Result<UnaryModel> {
    if num_labels == 0 {
        return Err(Error::config("number of classes must be positive"));
    }

    let (boost_set, held_out) = samples.split_every(calibration.holdout_every);
    let calibration_set = if held_out.class_counts(num_labels).iter().sum::<usize>() > 0 {
        &held_out
    } else {
        &boost_set
    };

    let counts = boost_set.class_counts(num_labels);
    let empty = counts.iter().filter(|&&c| c == 0).count();
    if empty > 0 {
        warn!("{} of {} labels have no boosting samples", empty, num_labels);
    }
    info!(
        "training {} ensembles on {} samples ({} held out for calibration)",
        num_labels,
        boost_set.len(),
        held_out.len()
    );

    let space = StumpSearchSpace::new(&boost_set, boosting.max_thresholds);

    #[cfg(feature = "rayon")]
    let labels = (0..num_labels).into_par_iter();
    #[cfg(not(feature = "rayon"))]
    let labels = 0..num_labels;

    let ensembles: Vec<BoostedEnsemble> = labels
        .map(|k| train_boosted(&boost_set, &space, k as Label, boosting))
        .collect();

    let scores: Vec<Vec<f32>> = (0..calibration_set.len())
        .map(|i| {
            let features = calibration_set.vector(i);
            ensembles.iter().map(|e| e.score(features)).collect()
        })
        .collect();
    let calibration_model =
        train_calibration(&scores, calibration_set.labels(), num_labels, calibration)?;

    UnaryModel::new(ensembles, calibration_model, samples.dimension())
}
