// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use log::{debug, info, warn};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::{validate_weight, ContrastPotential, ExpansionSolver, SolverOptions, UnaryField};
use crate::common::Labeling;
use crate::error::{Result, Warning};
use crate::eval::{self, ConfusionMatrix};

/// One validation image, reduced to what inference and scoring need.
pub struct ValidationItem {
    pub unary: UnaryField,
    pub pairwise: ContrastPotential,
    pub truth: Labeling,
}

impl ValidationItem {
    fn is_consistent(&self) -> bool {
        self.unary.dimensions() == self.truth.dimensions()
            && self.pairwise.dimensions() == self.truth.dimensions()
    }
}

/// Result of the pairwise weight search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub weight: f32,
    /// Misclassified non-void pixels for every evaluated candidate, in candidate order.
    pub errors: Vec<(f32, u64)>,
    pub warning: Option<Warning>,
}

impl SearchOutcome {
    fn degenerate(reason: &str) -> Self {
        warn!("pairwise weight search is degenerate ({}), falling back to 0", reason);
        SearchOutcome {
            weight: 0.0,
            errors: vec![],
            warning: Some(Warning::DegenerateSearch),
        }
    }
}

/// Picks the pairwise weight with the fewest misclassified pixels on the validation set.
///
/// Only the first `max_images` items take part. Ties go to the smaller weight.
/// Without candidates or without any labelled validation pixel the search falls
/// back to a weight of zero and reports [`Warning::DegenerateSearch`].
pub fn search_pairwise_weight(
    items: &[ValidationItem],
    candidates: &[f32],
    max_images: usize,
    solver: &SolverOptions,
) -> Result<SearchOutcome> {
    for &candidate in candidates {
        validate_weight(candidate)?;
    }
    solver.validate()?;

    let used: Vec<&ValidationItem> = items
        .iter()
        .take(max_images)
        .filter(|item| {
            let consistent = item.is_consistent();
            if !consistent {
                warn!(
                    "skipping validation item: truth {:?}, unary {:?}",
                    item.truth.dimensions(),
                    item.unary.dimensions()
                );
            }
            consistent
        })
        .collect();

    if candidates.is_empty() {
        return Ok(SearchOutcome::degenerate("no candidate weights"));
    }
    let labelled: usize = used.iter().map(|item| item.truth.len() - item.truth.count_void()).sum();
    if used.is_empty() || labelled == 0 {
        return Ok(SearchOutcome::degenerate("no labelled validation pixels"));
    }

    info!(
        "searching {} pairwise weights on {} validation images",
        candidates.len(),
        used.len()
    );

    let engine = ExpansionSolver::new(solver.clone());
    let evaluate_candidate = |&weight: &f32| -> Result<(f32, u64)> {
        let num_labels = used[0].unary.num_labels();
        let mut confusion = ConfusionMatrix::new(num_labels);
        let mut errors = 0;
        for item in &used {
            let result = engine.solve(&item.unary, &item.pairwise, weight)?;
            let score = eval::score(&result.labeling, &item.truth, &mut confusion)?;
            errors += score.errors();
        }
        debug!("weight {}: {} misclassified pixels", weight, errors);
        Ok((weight, errors))
    };

    #[cfg(feature = "rayon")]
    let errors: Result<Vec<(f32, u64)>> = candidates.par_iter().map(evaluate_candidate).collect();
    #[cfg(not(feature = "rayon"))]
    let errors: Result<Vec<(f32, u64)>> = candidates.iter().map(evaluate_candidate).collect();
    let errors = errors?;

    let mut best = errors[0];
    for &(weight, error) in &errors[1..] {
        if error < best.1 || (error == best.1 && weight < best.0) {
            best = (weight, error);
        }
    }

    info!("selected pairwise weight {} ({} errors)", best.0, best.1);
    Ok(SearchOutcome {
        weight: best.0,
        errors,
        warning: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ImageData;
    use crate::crf::Connectivity;
    use crate::error::Error;

    /// A 5x1 strip whose middle pixel is mislabelled by the unary term.
    ///
    /// Weight 0 keeps the mistake, a moderate weight fixes it, a large weight
    /// also swallows the genuine one-pixel region at the end.
    fn strip() -> ValidationItem {
        let probabilities = vec![
            0.8, 0.2, //
            0.8, 0.2, //
            0.45, 0.55, //
            0.8, 0.2, //
            0.1, 0.9,
        ];
        let unary = UnaryField::new(probabilities, 5, 1, 2).unwrap();
        let image = ImageData::from_gray(&[100; 5], 5, 1).unwrap();
        ValidationItem {
            unary,
            pairwise: ContrastPotential::new(&image, Connectivity::Four),
            truth: Labeling::new(vec![0, 0, 0, 0, 1], 5, 1).unwrap(),
        }
    }

    fn search(
        items: &[ValidationItem],
        candidates: &[f32],
        max_images: usize,
    ) -> Result<SearchOutcome> {
        search_pairwise_weight(items, candidates, max_images, &SolverOptions::default())
    }

    #[test]
    fn test_selects_weight_with_fewest_errors() {
        let outcome = search(&[strip()], &[0.0, 1.0, 5.0], 100).unwrap();
        assert_eq!(1.0, outcome.weight);
        assert_eq!(None, outcome.warning);
        assert_eq!(vec![(0.0, 1), (1.0, 0), (5.0, 1)], outcome.errors);
    }

    #[test]
    fn test_ties_prefer_smaller_weight() {
        let outcome = search(&[strip()], &[2.0, 1.0], 100).unwrap();
        assert_eq!(1.0, outcome.weight);
    }

    #[test]
    fn test_empty_validation_falls_back_to_zero() {
        let outcome = search(&[], &[1.0, 5.0], 100).unwrap();
        assert_eq!(0.0, outcome.weight);
        assert_eq!(Some(Warning::DegenerateSearch), outcome.warning);

        let outcome = search(&[strip()], &[1.0], 0).unwrap();
        assert_eq!(Some(Warning::DegenerateSearch), outcome.warning);

        let outcome = search(&[strip()], &[], 100).unwrap();
        assert_eq!(Some(Warning::DegenerateSearch), outcome.warning);
    }

    #[test]
    fn test_all_void_validation_is_degenerate() {
        let mut item = strip();
        item.truth = Labeling::filled(5, 1, -1);
        let outcome = search(&[item], &[1.0], 100).unwrap();
        assert_eq!(0.0, outcome.weight);
        assert_eq!(Some(Warning::DegenerateSearch), outcome.warning);
    }

    #[test]
    fn test_negative_candidate_is_rejected() {
        let result = search(&[strip()], &[1.0, -2.0], 100);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_items_beyond_the_cap_are_ignored() {
        // the middle pixel really is label 1 here, so this item favours weight 0
        let mut contrary = strip();
        contrary.truth = Labeling::new(vec![0, 0, 1, 0, 1], 5, 1).unwrap();
        let items = [strip(), contrary];
        let candidates = [0.0, 1.0, 5.0];

        let capped = search(&items, &candidates, 1).unwrap();
        assert_eq!(1.0, capped.weight);
        assert_eq!(vec![(0.0, 1), (1.0, 0), (5.0, 1)], capped.errors);

        let all = search(&items, &candidates, 2).unwrap();
        assert_eq!(0.0, all.weight);
        assert_eq!(vec![(0.0, 1), (1.0, 1), (5.0, 3)], all.errors);
    }
}
