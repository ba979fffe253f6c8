//! Fitting edge rates to observed node values with differential evolution.

use crate::config::SimulationConfig;
use crate::error::ValidationError;
use crate::model::NetworkModel;
use crate::simulation::Simulation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time: f64,
    pub value: f64,
}

/// Observed values of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeObservations {
    pub node_id: String,
    pub data: Vec<Observation>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSettings {
    pub iterations: usize,
    pub population: usize,
    /// Differential weight `F`.
    pub mutation: f64,
    /// Crossover probability `CR`.
    pub crossover: f64,
    /// Range the initial population's rates are drawn from.
    pub initial_range: (f64, f64),
    pub seed: u64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            iterations: 100,
            population: 20,
            mutation: 0.8,
            crossover: 0.9,
            initial_range: (0.0, 10.0),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no observations were supplied")]
    NoObservations,
    #[error("observation of node '{0}' is not finite")]
    NonFiniteObservation(String),
    #[error("population must be at least 4, got {0}")]
    PopulationTooSmall(usize),
    #[error("invalid calibration setting: {0}")]
    InvalidSetting(&'static str),
}

#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// Best rate found for every edge, in edge order.
    pub rates: Vec<f64>,
    /// Mean squared error of `rates` against the observations.
    pub fitness: f64,
    /// The input model with `rates` applied.
    pub model: NetworkModel,
}

struct Target {
    node: String,
    time: f64,
    value: f64,
}

/// Searches for edge rates that minimise the mean squared error between the
/// simulated trajectory and `observations`.
///
/// Observations outside `[t_start, t_end]` are ignored. Candidates whose run
/// diverges score `+inf`.
pub fn calibrate(
    model: &NetworkModel,
    config: &SimulationConfig,
    observations: &[NodeObservations],
    settings: &CalibrationSettings,
) -> Result<CalibrationResult, CalibrationError> {
    let targets = targets(model, config, observations)?;
    check_settings(settings)?;

    let dim = model.edge_count();
    if dim == 0 {
        let fitness = fitness(model, config, &targets, &[]);
        return Ok(CalibrationResult {
            rates: Vec::new(),
            fitness,
            model: model.clone(),
        });
    }

    info!(
        edges = dim,
        observations = targets.len(),
        iterations = settings.iterations,
        population = settings.population,
        "starting calibration"
    );

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let (low, high) = settings.initial_range;
    let size = settings.population;

    let mut population: Vec<Vec<f64>> = (0..size)
        .map(|_| (0..dim).map(|_| rng.gen_range(low..=high)).collect())
        .collect();
    let mut scores: Vec<f64> = population
        .iter()
        .map(|rates| fitness(model, config, &targets, rates))
        .collect();
    let mut best = best_index(&scores);

    let mut trial = vec![0.0; dim];
    for iteration in 0..settings.iterations {
        for i in 0..size {
            let a = pick(&mut rng, size, &[i]);
            let b = pick(&mut rng, size, &[i, a]);
            let c = pick(&mut rng, size, &[i, a, b]);
            let forced = rng.gen_range(0..dim);

            for j in 0..dim {
                trial[j] = if rng.gen::<f64>() < settings.crossover || j == forced {
                    let mutant = population[a][j]
                        + settings.mutation * (population[b][j] - population[c][j]);
                    mutant.max(0.0)
                } else {
                    population[i][j]
                };
            }

            let score = fitness(model, config, &targets, &trial);
            if score <= scores[i] {
                scores[i] = score;
                population[i].copy_from_slice(&trial);
                if score < scores[best] {
                    best = i;
                }
            }
        }
        debug!(iteration, fitness = scores[best], "calibration generation");
    }

    let rates = population[best].clone();
    let fitness = scores[best];
    info!(fitness, "calibration finished");

    Ok(CalibrationResult {
        model: model.with_rates(&rates)?,
        rates,
        fitness,
    })
}

fn check_settings(settings: &CalibrationSettings) -> Result<(), CalibrationError> {
    if settings.population < 4 {
        return Err(CalibrationError::PopulationTooSmall(settings.population));
    }
    if !settings.mutation.is_finite() || settings.mutation <= 0.0 {
        return Err(CalibrationError::InvalidSetting("mutation must be positive"));
    }
    if !(0.0..=1.0).contains(&settings.crossover) {
        return Err(CalibrationError::InvalidSetting("crossover must lie in [0, 1]"));
    }
    let (low, high) = settings.initial_range;
    if !low.is_finite() || !high.is_finite() || low > high {
        return Err(CalibrationError::InvalidSetting(
            "initial range must be finite and ordered",
        ));
    }
    Ok(())
}

fn targets(
    model: &NetworkModel,
    config: &SimulationConfig,
    observations: &[NodeObservations],
) -> Result<Vec<Target>, CalibrationError> {
    if observations.iter().all(|series| series.data.is_empty()) {
        return Err(CalibrationError::NoObservations);
    }

    let mut targets = Vec::new();
    for series in observations {
        if model.node_index(&series.node_id).is_none() {
            return Err(ValidationError::UnknownObservedNode(series.node_id.clone()).into());
        }
        for point in &series.data {
            if !point.time.is_finite() || !point.value.is_finite() {
                return Err(CalibrationError::NonFiniteObservation(series.node_id.clone()));
            }
            if point.time < config.t_start() || point.time > config.t_end() {
                continue;
            }
            targets.push(Target {
                node: series.node_id.clone(),
                time: point.time,
                value: point.value,
            });
        }
    }
    Ok(targets)
}

fn fitness(
    model: &NetworkModel,
    config: &SimulationConfig,
    targets: &[Target],
    rates: &[f64],
) -> f64 {
    let Ok(candidate) = model.with_rates(rates) else {
        return f64::INFINITY;
    };
    let Ok(trajectory) = Simulation::new(candidate, *config).run() else {
        return f64::INFINITY;
    };

    let mut total = 0.0;
    let mut points = 0usize;
    for target in targets {
        if let Some(simulated) = trajectory.interpolate(&target.node, target.time) {
            let diff = simulated - target.value;
            total += diff * diff;
            points += 1;
        }
    }

    if points == 0 {
        f64::INFINITY
    } else {
        total / points as f64
    }
}

fn best_index(scores: &[f64]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold(0, |best, (i, &score)| if score < scores[best] { i } else { best })
}

/// Uniform index in `0..size` not contained in `exclude`.
fn pick(rng: &mut StdRng, size: usize, exclude: &[usize]) -> usize {
    loop {
        let candidate = rng.gen_range(0..size);
        if !exclude.contains(&candidate) {
            return candidate;
        }
    }
}
