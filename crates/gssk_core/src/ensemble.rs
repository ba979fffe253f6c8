//! Ensemble forecasting: many runs with perturbed edge rates folded into
//! per-step min/max/mean envelopes.

use crate::config::SimulationConfig;
use crate::error::{NumericalFailure, ValidationError};
use crate::model::NetworkModel;
use crate::simulation::Simulation;
use crate::trajectory::Trajectory;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleSettings {
    pub runs: usize,
    /// Each rate is scaled by a factor drawn uniformly from
    /// `[1 - perturbation, 1 + perturbation]`.
    pub perturbation: f64,
    pub seed: u64,
}

impl Default for EnsembleSettings {
    fn default() -> Self {
        Self {
            runs: 100,
            perturbation: 0.1,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnsembleError {
    #[error("an ensemble needs at least one run")]
    NoRuns,
    #[error("perturbation ({0}) must lie in [0, 1)")]
    InvalidPerturbation(f64),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("all {runs} ensemble runs diverged (first: {first})")]
    AllRunsDiverged { runs: usize, first: NumericalFailure },
}

/// Envelopes over the completed runs, stored row-major as `step * nodes + node`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleResult {
    node_ids: Vec<String>,
    times: Vec<f64>,
    min: Vec<f64>,
    max: Vec<f64>,
    mean: Vec<f64>,
    completed_runs: usize,
    failed_runs: usize,
}

impl EnsembleResult {
    pub fn node_ids(&self) -> &[String] {
        &self.node_ids
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    /// Number of recorded time points, including `t_start`.
    pub fn step_count(&self) -> usize {
        self.times.len()
    }

    pub fn completed_runs(&self) -> usize {
        self.completed_runs
    }

    pub fn failed_runs(&self) -> usize {
        self.failed_runs
    }

    pub fn min_envelope(&self) -> &[f64] {
        &self.min
    }

    pub fn max_envelope(&self) -> &[f64] {
        &self.max
    }

    pub fn mean_envelope(&self) -> &[f64] {
        &self.mean
    }

    pub fn min_at(&self, step: usize, node_id: &str) -> Option<f64> {
        self.lookup(&self.min, step, node_id)
    }

    pub fn max_at(&self, step: usize, node_id: &str) -> Option<f64> {
        self.lookup(&self.max, step, node_id)
    }

    pub fn mean_at(&self, step: usize, node_id: &str) -> Option<f64> {
        self.lookup(&self.mean, step, node_id)
    }

    fn lookup(&self, envelope: &[f64], step: usize, node_id: &str) -> Option<f64> {
        let node = self.node_ids.iter().position(|id| id == node_id)?;
        if step >= self.times.len() {
            return None;
        }
        Some(envelope[step * self.node_ids.len() + node])
    }
}

/// Runs `settings.runs` perturbed copies of `model` and folds their
/// trajectories into envelopes. Runs that diverge are left out and counted.
pub fn ensemble_forecast(
    model: &NetworkModel,
    config: &SimulationConfig,
    settings: &EnsembleSettings,
) -> Result<EnsembleResult, EnsembleError> {
    if settings.runs == 0 {
        return Err(EnsembleError::NoRuns);
    }
    if !(0.0..1.0).contains(&settings.perturbation) {
        return Err(EnsembleError::InvalidPerturbation(settings.perturbation));
    }

    let members = (0..settings.runs)
        .map(|run| perturbed(model, settings, run))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        runs = settings.runs,
        perturbation = settings.perturbation,
        seed = settings.seed,
        "starting ensemble forecast"
    );

    #[cfg(feature = "parallel")]
    let outcomes: Vec<_> = members
        .into_par_iter()
        .map(|member| Simulation::new(member, *config).run())
        .collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<_> = members
        .into_iter()
        .map(|member| Simulation::new(member, *config).run())
        .collect();

    let node_count = model.node_count();
    let times: Vec<f64> = (0..=config.step_count()).map(|k| config.time_at(k)).collect();
    let cells = times.len() * node_count;
    let mut min = vec![f64::INFINITY; cells];
    let mut max = vec![f64::NEG_INFINITY; cells];
    let mut sum = vec![0.0; cells];
    let mut completed = 0;
    let mut first_failure = None;

    for (run, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(trajectory) => {
                fold(&trajectory, node_count, &mut min, &mut max, &mut sum);
                completed += 1;
            }
            Err(err) => {
                warn!(
                    run,
                    time = err.failure.time,
                    node = %err.failure.node,
                    "ensemble run diverged, excluded from envelopes"
                );
                first_failure.get_or_insert(err.failure);
            }
        }
    }

    let failed = settings.runs - completed;
    if completed == 0 {
        if let Some(first) = first_failure {
            return Err(EnsembleError::AllRunsDiverged {
                runs: settings.runs,
                first,
            });
        }
    }

    let mean = sum.into_iter().map(|total| total / completed as f64).collect();
    info!(completed, failed, "ensemble forecast finished");

    Ok(EnsembleResult {
        node_ids: model.node_ids(),
        times,
        min,
        max,
        mean,
        completed_runs: completed,
        failed_runs: failed,
    })
}

/// A copy of `model` with every rate scaled by its own random factor.
/// Each run draws from its own seeded stream, so results do not depend on
/// the order runs execute in.
fn perturbed(
    model: &NetworkModel,
    settings: &EnsembleSettings,
    run: usize,
) -> Result<NetworkModel, ValidationError> {
    let mut rng = StdRng::seed_from_u64(settings.seed.wrapping_add(run as u64));
    let spread = settings.perturbation;
    let rates: Vec<f64> = model
        .rates()
        .into_iter()
        .map(|k| k * rng.gen_range(1.0 - spread..=1.0 + spread))
        .collect();
    model.with_rates(&rates)
}

fn fold(trajectory: &Trajectory, nodes: usize, min: &mut [f64], max: &mut [f64], sum: &mut [f64]) {
    for (step, sample) in trajectory.samples().iter().enumerate() {
        for (node, &value) in sample.values.iter().enumerate() {
            let cell = step * nodes + node;
            min[cell] = min[cell].min(value);
            max[cell] = max[cell].max(value);
            sum[cell] += value;
        }
    }
}
