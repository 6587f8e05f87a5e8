// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use std::time::{Duration, Instant};

use log::debug;

use super::maxflow::{Capacity, FlowGraph};
use super::{validate_weight, ContrastPotential, SolverOptions, UnaryField};
use crate::common::{Label, Labeling};
use crate::error::{Error, Result};

/// Fixed-point scale applied to energies when they become graph capacities.
const CAPACITY_SCALE: f64 = 1e6;

/// Upper bound on the summed capacities of one expansion graph. Flow and residual
/// capacities never exceed this sum, so it keeps the solver clear of overflow.
const MAX_TOTAL_CAPACITY: f64 = (Capacity::MAX / 4) as f64;

/// Scale for a move whose capacities add up to `total` before scaling.
///
/// Large pairwise weights lower the scale, trading resolution for range.
fn capacity_scale(total: f64) -> f64 {
    if total * CAPACITY_SCALE > MAX_TOTAL_CAPACITY {
        MAX_TOTAL_CAPACITY / total
    } else {
        CAPACITY_SCALE
    }
}

#[inline]
fn to_capacity(value: f64, scale: f64) -> Capacity {
    (value * scale).round() as Capacity
}

/// Outcome of one MAP inference.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub labeling: Labeling,
    pub energy: f64,
    /// Completed sweeps over all labels.
    pub sweeps: usize,
    /// The sweep or time budget ran out before convergence; `labeling` is the best found.
    pub budget_exceeded: bool,
    /// Energy after initialisation and after every accepted move; never increases.
    pub energy_trace: Vec<f64>,
}

/// Total energy of a labelling: unary costs plus the weighted contrast penalty of
/// every link whose two labels differ.
pub fn labeling_energy(
    unary: &UnaryField,
    pairwise: &ContrastPotential,
    weight: f32,
    labels: &[Label],
) -> f64 {
    let data: f64 = labels
        .iter()
        .enumerate()
        .map(|(i, &l)| unary.cost(i, l as usize))
        .sum();
    let smoothness: f64 = pairwise
        .edges()
        .iter()
        .filter(|e| labels[e.first as usize] != labels[e.second as usize])
        .map(|e| f64::from(pairwise.cost(e, weight)))
        .sum();
    data + smoothness
}

/// Approximate MAP labelling by alpha-expansion.
///
/// Each expansion move is a binary problem (keep the current label or switch to
/// `alpha`) that is solved exactly as a minimum cut. A move is only accepted when
/// it strictly lowers the energy.
pub struct ExpansionSolver {
    options: SolverOptions,
}

impl ExpansionSolver {
    pub fn new(options: SolverOptions) -> Self {
        ExpansionSolver { options }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn solve(
        &self,
        unary: &UnaryField,
        pairwise: &ContrastPotential,
        weight: f32,
    ) -> Result<InferenceResult> {
        validate_weight(weight)?;
        if unary.dimensions() != pairwise.dimensions() {
            return Err(Error::dimensions(pairwise.dimensions(), unary.dimensions()));
        }

        let (width, height) = unary.dimensions();
        let num_labels = unary.num_labels();
        let mut labels = unary.argmax_labeling().into_labels();
        let mut energy = labeling_energy(unary, pairwise, weight, &labels);
        let mut energy_trace = vec![energy];

        // Without a smoothness term the independent argmax is the exact minimiser.
        if weight == 0.0 || pairwise.edges().is_empty() || num_labels == 1 {
            return Ok(InferenceResult {
                labeling: Labeling::from_raw(labels, width, height),
                energy,
                sweeps: 0,
                budget_exceeded: false,
                energy_trace,
            });
        }

        let started = Instant::now();
        let budget = self.options.time_budget_ms.map(Duration::from_millis);
        let mut sweeps = 0;
        let mut converged = false;

        'sweeps: while sweeps < self.options.max_sweeps {
            let before = energy;
            for alpha in 0..num_labels {
                if budget.map_or(false, |b| started.elapsed() >= b) {
                    break 'sweeps;
                }
                let proposal = self.expand(unary, pairwise, weight, &labels, alpha);
                let proposed = labeling_energy(unary, pairwise, weight, &proposal);
                if proposed < energy {
                    labels = proposal;
                    energy = proposed;
                    energy_trace.push(energy);
                }
            }
            sweeps += 1;

            if before - energy <= self.options.energy_tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            debug!(
                "solver budget exhausted after {} sweeps in {:?}, energy {:.4}",
                sweeps,
                started.elapsed(),
                energy
            );
        }

        Ok(InferenceResult {
            labeling: Labeling::from_raw(labels, width, height),
            energy,
            sweeps,
            budget_exceeded: !converged,
            energy_trace,
        })
    }

    /// Best labelling reachable from `labels` by switching any subset of pixels to `alpha`.
    fn expand(
        &self,
        unary: &UnaryField,
        pairwise: &ContrastPotential,
        weight: f32,
        labels: &[Label],
        alpha: usize,
    ) -> Vec<Label> {
        let n = labels.len();
        let alpha_label = alpha as Label;

        // Node on the source side keeps its label, on the sink side takes alpha.
        let mut switch_cost = vec![0.0f64; n];
        let mut keep_cost = vec![0.0f64; n];
        for (i, &label) in labels.iter().enumerate() {
            keep_cost[i] = unary.cost(i, label as usize);
            switch_cost[i] = unary.cost(i, alpha);
        }

        let mut couplings = Vec::with_capacity(pairwise.edges().len());
        for edge in pairwise.edges() {
            let (i, j) = (edge.first as usize, edge.second as usize);
            let (li, lj) = (labels[i], labels[j]);
            let w = f64::from(pairwise.cost(edge, weight));
            let penalty = |a: Label, b: Label| if a != b { w } else { 0.0 };

            // E(xi, xj) with x = 1 meaning "switch to alpha"
            let e00 = penalty(li, lj);
            let e01 = penalty(li, alpha_label);
            let e10 = penalty(alpha_label, lj);
            let e11 = 0.0;

            // E = e00 + (e10 - e00) xi + (e11 - e10) xj + (e01 + e10 - e00 - e11) (1 - xi) xj
            for &(node, delta) in [(i, e10 - e00), (j, e11 - e10)].iter() {
                if delta > 0.0 {
                    switch_cost[node] += delta;
                } else {
                    keep_cost[node] -= delta;
                }
            }
            let coupling = e01 + e10 - e00 - e11;
            couplings.push((i, j, coupling.max(0.0)));
        }

        let total = couplings.iter().map(|c| c.2).sum::<f64>()
            + switch_cost
                .iter()
                .zip(&keep_cost)
                .map(|(s, k)| (s - k).abs())
                .sum::<f64>();
        let scale = capacity_scale(total);

        let mut graph = FlowGraph::new(n);
        for &(i, j, coupling) in &couplings {
            graph.add_edge(i, j, to_capacity(coupling, scale), 0);
        }
        for i in 0..n {
            let shared = switch_cost[i].min(keep_cost[i]);
            graph.add_tedge(
                i,
                to_capacity(switch_cost[i] - shared, scale),
                to_capacity(keep_cost[i] - shared, scale),
            );
        }

        graph.max_flow();

        labels
            .iter()
            .enumerate()
            .map(|(i, &label)| {
                if graph.is_source_side(i) {
                    label
                } else {
                    alpha_label
                }
            })
            .collect()
    }
}
