// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::common::ImageData;
use crate::crf::{validate_weight, ExpansionSolver, InferenceResult, SolverOptions};
use crate::error::Result;
use crate::feat::FeatureExtractor;
use crate::model::Model;
use crate::Segmenter;

/// Segmenter running alpha-expansion over the energy of a trained model.
pub struct CrfSegmenter {
    model: Model,
    extractor: FeatureExtractor,
    solver: ExpansionSolver,
    pairwise_weight: f32,
}

impl CrfSegmenter {
    pub fn new(model: Model) -> Result<Self> {
        CrfSegmenter::with_solver(model, SolverOptions::default())
    }

    pub fn with_solver(model: Model, options: SolverOptions) -> Result<Self> {
        options.validate()?;
        let extractor = FeatureExtractor::new(model.features())?;
        let pairwise_weight = model.pairwise_weight();
        Ok(CrfSegmenter {
            model,
            extractor,
            solver: ExpansionSolver::new(options),
            pairwise_weight,
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn pairwise_weight(&self) -> f32 {
        self.pairwise_weight
    }

    pub fn solver_options(&self) -> &SolverOptions {
        self.solver.options()
    }

    fn update_solver<F: FnOnce(&mut SolverOptions)>(&mut self, update: F) -> Result<()> {
        let mut options = self.solver.options().clone();
        update(&mut options);
        options.validate()?;
        self.solver = ExpansionSolver::new(options);
        Ok(())
    }
}

impl Segmenter for CrfSegmenter {
    fn segment(&self, image: &ImageData) -> Result<InferenceResult> {
        crate::infer_with(
            image,
            self.model.unary(),
            &self.extractor,
            &self.solver,
            self.model.connectivity(),
            self.pairwise_weight,
        )
    }

    fn segment_all(&self, images: &[ImageData]) -> Vec<Result<InferenceResult>> {
        #[cfg(feature = "rayon")]
        let iter = images.par_iter();
        #[cfg(not(feature = "rayon"))]
        let iter = images.iter();

        iter.map(|image| self.segment(image)).collect()
    }

    fn num_labels(&self) -> usize {
        self.model.num_labels()
    }

    fn set_pairwise_weight(&mut self, weight: f32) -> Result<()> {
        validate_weight(weight)?;
        self.pairwise_weight = weight;
        Ok(())
    }

    fn set_max_sweeps(&mut self, max_sweeps: usize) -> Result<()> {
        self.update_solver(|options| options.max_sweeps = max_sweeps)
    }

    fn set_time_budget(&mut self, budget_ms: Option<u64>) {
        let mut options = self.solver.options().clone();
        options.time_budget_ms = budget_ms;
        self.solver = ExpansionSolver::new(options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{BoostedEnsemble, CalibrationModel, DecisionStump, UnaryModel};
    use crate::crf::Connectivity;
    use crate::feat::FeatureOptions;

    /// Two labels split on lightness: label 1 wherever the pixel is bright.
    fn brightness_model(weight: f32) -> Model {
        let features = FeatureOptions {
            color: true,
            filter_bank: false,
            texture: false,
            position: false,
            ..FeatureOptions::default()
        };
        let mut dark = BoostedEnsemble::new();
        dark.add_stump(DecisionStump::new(0, 0.5, -1), 1.0);
        let mut bright = BoostedEnsemble::new();
        bright.add_stump(DecisionStump::new(0, 0.5, 1), 1.0);
        let calibration =
            CalibrationModel::from_weights(2, vec![4.0, 0.0, 0.0, 0.0, 4.0, 0.0]).unwrap();
        let unary = UnaryModel::new(vec![dark, bright], calibration, 3).unwrap();
        Model::new(unary, features, Connectivity::Four, weight).unwrap()
    }

    fn half_bright(width: u32, height: u32) -> ImageData {
        let mut data = vec![];
        for _ in 0..height {
            for x in 0..width {
                let v = if x < width / 2 { 10 } else { 240 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        ImageData::new(data, width, height).unwrap()
    }

    #[test]
    fn test_segment_splits_on_brightness() {
        let segmenter = CrfSegmenter::new(brightness_model(1.0)).unwrap();
        let result = segmenter.segment(&half_bright(6, 3)).unwrap();
        for y in 0..3 {
            for x in 0..6 {
                let expected = if x < 3 { 0 } else { 1 };
                assert_eq!(expected, result.labeling.get(x, y));
            }
        }
    }

    #[test]
    fn test_setters_validate() {
        let mut segmenter = CrfSegmenter::new(brightness_model(0.0)).unwrap();
        assert!(segmenter.set_pairwise_weight(-1.0).is_err());
        assert!(segmenter.set_max_sweeps(0).is_err());
        assert_eq!(5, segmenter.solver_options().max_sweeps);

        segmenter.set_pairwise_weight(2.5).unwrap();
        segmenter.set_max_sweeps(2).unwrap();
        segmenter.set_time_budget(Some(100));
        assert_eq!(2.5, segmenter.pairwise_weight());
        assert_eq!(2, segmenter.solver_options().max_sweeps);
        assert_eq!(Some(100), segmenter.solver_options().time_budget_ms);
    }

    #[test]
    fn test_segment_all_keeps_order() {
        let segmenter = CrfSegmenter::new(brightness_model(0.5)).unwrap();
        let dark = ImageData::new(vec![5; 12], 2, 2).unwrap();
        let bright = ImageData::new(vec![250; 12], 2, 2).unwrap();
        let results = segmenter.segment_all(&[dark, bright]);

        assert_eq!(2, results.len());
        assert_eq!(&[0, 0, 0, 0], results[0].as_ref().unwrap().labeling.labels());
        assert_eq!(&[1, 1, 1, 1], results[1].as_ref().unwrap().labeling.labels());
    }
}
