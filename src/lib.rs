// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.


//! Pixel labelling with boosted per-pixel classifiers and a contrast-sensitive CRF.
//!
//! Training runs in two stages. [`train_unary`] fits one boosted ensemble per label
//! and calibrates their scores into a distribution, [`train_pairwise`] then picks the
//! weight of the pairwise smoothness term on validation images. [`infer`] labels an
//! image by minimising the CRF energy with alpha-expansion.

pub mod classifier;
pub mod common;
pub mod config;
pub mod crf;
pub mod dataset;
pub mod error;
pub mod eval;
pub mod feat;
pub mod math;
pub mod model;
mod segmenter;

pub use crate::classifier::UnaryModel;
pub use crate::common::{ImageData, Label, Labeling, VOID_LABEL};
pub use crate::config::Config;
pub use crate::crf::{InferenceResult, SearchOutcome};
pub use crate::dataset::{Dataset, LabeledImage};
pub use crate::error::{Error, Result, Warning};
pub use crate::eval::ConfusionMatrix;
pub use crate::model::{load_model, read_model, save_model, write_model, Model};
pub use crate::segmenter::CrfSegmenter;

use std::path::Path;

use log::{info, warn};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::classifier::{train_unary_model, SampleSet};
use crate::common::is_void;
use crate::crf::{
    search_pairwise_weight, validate_weight, ContrastPotential, ExpansionSolver, ValidationItem,
};
use crate::feat::FeatureExtractor;

/// Trains the unary model on labelled images.
///
/// `num_labels` takes precedence over `config.num_classes`. Images whose
/// labelling does not match the image size, or that carry a label outside
/// `0..num_labels` other than void, are skipped with a warning. Features are
/// extracted in parallel per image; samples are merged in input order.
pub fn train_unary(
    images: &[LabeledImage],
    num_labels: usize,
    config: &Config,
) -> Result<UnaryModel> {
    config.validate()?;
    if num_labels == 0 {
        return Err(Error::config("number of classes must be positive"));
    }
    let extractor = FeatureExtractor::new(&config.features)?;

    let usable: Vec<&LabeledImage> = images
        .iter()
        .filter(|item| is_usable_training_image(item, num_labels))
        .collect();
    let skipped = images.len() - usable.len();

    #[cfg(feature = "rayon")]
    let iter = usable.par_iter();
    #[cfg(not(feature = "rayon"))]
    let iter = usable.iter();

    let per_image: Vec<Result<SampleSet>> = iter
        .map(|item| {
            let field = extractor.compute(&item.image);
            let mut samples = SampleSet::new(extractor.dimension());
            samples.collect(&field, &item.truth, config.subsample)?;
            Ok(samples)
        })
        .collect();

    let mut samples = SampleSet::new(extractor.dimension());
    for image_samples in per_image {
        samples.append(image_samples?)?;
    }

    if samples.is_empty() {
        return Err(Error::config("no labelled pixels to train on"));
    }
    info!(
        "collected {} training samples from {} images ({} skipped)",
        samples.len(),
        usable.len(),
        skipped
    );
    train_unary_model(&samples, num_labels, &config.boosting, &config.calibration)
}

fn is_usable_training_image(item: &LabeledImage, num_labels: usize) -> bool {
    if item.image.dimensions() != item.truth.dimensions() {
        warn!(
            "skipping {}: image is {:?}, labels are {:?}",
            item.name,
            item.image.dimensions(),
            item.truth.dimensions()
        );
        return false;
    }
    let out_of_range = item
        .truth
        .labels()
        .iter()
        .find(|&&l| !is_void(l) && l as usize >= num_labels);
    if let Some(label) = out_of_range {
        warn!("skipping {}: label {} is outside 0..{}", item.name, label, num_labels);
        return false;
    }
    true
}

/// Chooses the pairwise weight among the configured candidates on validation images.
pub fn train_pairwise(
    validation: &[LabeledImage],
    unary: &UnaryModel,
    config: &Config,
) -> Result<SearchOutcome> {
    config.validate()?;
    let extractor = FeatureExtractor::new(&config.features)?;
    check_feature_dimension(unary, &extractor)?;

    let used = &validation[..validation.len().min(config.pairwise.max_validation_images)];

    #[cfg(feature = "rayon")]
    let iter = used.par_iter();
    #[cfg(not(feature = "rayon"))]
    let iter = used.iter();

    let prepared: Vec<Result<Option<ValidationItem>>> = iter
        .map(|item| {
            if item.image.dimensions() != item.truth.dimensions() {
                warn!("skipping validation image {}: size mismatch", item.name);
                return Ok(None);
            }
            let field = extractor.compute(&item.image);
            Ok(Some(ValidationItem {
                unary: unary.predict_field(&field)?,
                pairwise: ContrastPotential::new(&item.image, config.pairwise.connectivity),
                truth: item.truth.clone(),
            }))
        })
        .collect();

    let mut items = Vec::with_capacity(prepared.len());
    for item in prepared {
        if let Some(item) = item? {
            items.push(item);
        }
    }

    let outcome = search_pairwise_weight(
        &items,
        &config.pairwise.candidates,
        config.pairwise.max_validation_images,
        &config.solver,
    )?;
    info!("selected pairwise weight {}", outcome.weight);
    Ok(outcome)
}

/// Labels an image with the given unary model and pairwise weight.
pub fn infer(
    image: &ImageData,
    unary: &UnaryModel,
    weight: f32,
    config: &Config,
) -> Result<InferenceResult> {
    config.validate()?;
    validate_weight(weight)?;
    let extractor = FeatureExtractor::new(&config.features)?;
    check_feature_dimension(unary, &extractor)?;
    let solver = ExpansionSolver::new(config.solver.clone());
    infer_with(image, unary, &extractor, &solver, config.pairwise.connectivity, weight)
}

/// Labels a batch of images. A failure on one image leaves the others unaffected.
pub fn infer_all(
    images: &[ImageData],
    unary: &UnaryModel,
    weight: f32,
    config: &Config,
) -> Vec<Result<InferenceResult>> {
    #[cfg(feature = "rayon")]
    let iter = images.par_iter();
    #[cfg(not(feature = "rayon"))]
    let iter = images.iter();

    iter.map(|image| infer(image, unary, weight, config)).collect()
}

/// Accuracy over the non-void pixels of `truth`, with the confusion matrix.
pub fn evaluate(
    predicted: &Labeling,
    truth: &Labeling,
    num_labels: usize,
) -> Result<(f64, ConfusionMatrix)> {
    eval::evaluate(predicted, truth, num_labels)
}

pub(crate) fn infer_with(
    image: &ImageData,
    unary: &UnaryModel,
    extractor: &FeatureExtractor,
    solver: &ExpansionSolver,
    connectivity: crf::Connectivity,
    weight: f32,
) -> Result<InferenceResult> {
    let field = extractor.compute(image);
    let unary_field = unary.predict_field(&field)?;
    let pairwise = ContrastPotential::new(image, connectivity);
    solver.solve(&unary_field, &pairwise, weight)
}

fn check_feature_dimension(unary: &UnaryModel, extractor: &FeatureExtractor) -> Result<()> {
    if unary.dimension() != extractor.dimension() {
        return Err(Error::Model(format!(
            "unary model expects {} features, configuration produces {}",
            unary.dimension(),
            extractor.dimension()
        )));
    }
    Ok(())
}

/// Create a segmenter from a model file.
pub fn create_segmenter<P: AsRef<Path>>(path_to_model: P) -> Result<Box<dyn Segmenter>> {
    let model = load_model(path_to_model)?;
    create_segmenter_with_model(model)
}

/// Create a segmenter from an already loaded model.
pub fn create_segmenter_with_model(model: Model) -> Result<Box<dyn Segmenter>> {
    Ok(Box::new(CrfSegmenter::new(model)?))
}

/// Image segmenter.
///
/// # Examples
///
/// ```rust,no_run
/// use rustseg::{dataset, Segmenter};
///
/// let mut segmenter = rustseg::create_segmenter("/path/to/model").unwrap();
/// segmenter.set_max_sweeps(3).unwrap();
/// segmenter.set_time_budget(Some(500));
///
/// let image = dataset::load_image("/path/to/image.png").unwrap();
/// let result = segmenter.segment(&image).unwrap();
/// println!("energy {} after {} sweeps", result.energy, result.sweeps);
/// ```
pub trait Segmenter: Send + Sync {
    /// Label every pixel of `image`.
    fn segment(&self, image: &ImageData) -> Result<InferenceResult>;

    /// Label a batch of images, with one result per image.
    fn segment_all(&self, images: &[ImageData]) -> Vec<Result<InferenceResult>>;

    /// Number of labels the model distinguishes.
    fn num_labels(&self) -> usize;

    /// Set the weight of the pairwise term. Zero yields the per-pixel argmax.
    fn set_pairwise_weight(&mut self, weight: f32) -> Result<()>;

    /// Set the maximum number of expansion sweeps, at least one.
    fn set_max_sweeps(&mut self, max_sweeps: usize) -> Result<()>;

    /// Set the wall-clock budget of one inference in milliseconds.
    fn set_time_budget(&mut self, budget_ms: Option<u64>);
}
