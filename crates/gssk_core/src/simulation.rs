//! The simulation driver: owns the evolving state and walks the time grid.

use crate::config::{IntegrationMethod, SimulationConfig};
use crate::document::ModelDocument;
use crate::error::{LoadError, NumericalFailure, RunFailure, ValidationError};
use crate::model::NetworkModel;
use crate::solvers::{Euler, Tsit5, RK4};
use crate::system::FlowSystem;
use crate::trajectory::{Recorder, Trajectory};
use crate::traits::{Divergence, DynamicalSystem, Steppable};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, trace, warn};

/// Upper bound on samples reserved up front by [`Simulation::run`].
const INITIAL_SAMPLE_CAPACITY: usize = 4096;

/// Validates a JSON model document into a model and its run settings.
pub fn load(json: &str) -> Result<(NetworkModel, SimulationConfig), LoadError> {
    let document = ModelDocument::from_json(json)?;
    let model = NetworkModel::from_document(&document)?;
    let config = SimulationConfig::from_record(&document.config)?;
    Ok((model, config))
}

/// Cooperative cancellation shared between a running simulation and its
/// controller. Checked before every step.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
}

enum Stepper {
    Rk4(RK4<f64>),
    Euler(Euler<f64>),
    Tsit5(Tsit5<f64>),
}

impl Stepper {
    fn build(method: IntegrationMethod, dim: usize) -> Self {
        match method {
            IntegrationMethod::Rk4 => Stepper::Rk4(RK4::new(dim)),
            IntegrationMethod::Euler => Stepper::Euler(Euler::new(dim)),
            IntegrationMethod::Tsit5 => Stepper::Tsit5(Tsit5::new(dim)),
        }
    }

    fn step(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t: &mut f64,
        state: &mut [f64],
        dt: f64,
    ) -> Result<(), Divergence> {
        match self {
            Stepper::Rk4(s) => s.step(system, t, state, dt),
            Stepper::Euler(s) => s.step(system, t, state, dt),
            Stepper::Tsit5(s) => s.step(system, t, state, dt),
        }
    }
}

/// A single run of a model over its configured time span.
pub struct Simulation {
    model: NetworkModel,
    config: SimulationConfig,
    stepper: Stepper,
    state: Vec<f64>,
    time: f64,
    steps_taken: usize,
}

impl Simulation {
    pub fn new(model: NetworkModel, config: SimulationConfig) -> Self {
        let stepper = Stepper::build(config.method(), model.node_count());
        let state = model.initial_state();
        Self {
            model,
            config,
            stepper,
            state,
            time: config.t_start(),
            steps_taken: 0,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        let (model, config) = load(json)?;
        Ok(Self::new(model, config))
    }

    pub fn model(&self) -> &NetworkModel {
        &self.model
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Current value of every node, in node order.
    pub fn state(&self) -> &[f64] {
        &self.state
    }

    pub fn value(&self, node_id: &str) -> Option<f64> {
        self.model.node_index(node_id).map(|index| self.state[index])
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub fn is_finished(&self) -> bool {
        self.steps_taken >= self.config.step_count()
    }

    /// Swaps in new edge rates without disturbing the current state or time.
    pub fn set_rates(&mut self, rates: &[f64]) -> Result<(), ValidationError> {
        self.model = self.model.with_rates(rates)?;
        Ok(())
    }

    /// Rewinds to `t_start` and the model's initial values.
    pub fn reset(&mut self) {
        self.state = self.model.initial_state();
        self.time = self.config.t_start();
        self.steps_taken = 0;
    }

    /// Advances one grid step. Returns `Ok(false)` once the run is finished.
    ///
    /// On failure the state and time stay at the last accepted step.
    pub fn step(&mut self) -> Result<bool, NumericalFailure> {
        if self.is_finished() {
            return Ok(false);
        }

        let k = self.steps_taken;
        let t0 = self.config.time_at(k);
        let t1 = self.config.time_at(k + 1);
        let system = FlowSystem::new(&self.model);
        let mut t = t0;

        if let Err(divergence) = self.stepper.step(&system, &mut t, &mut self.state, t1 - t0) {
            let failure = NumericalFailure {
                time: t0,
                node: self.model.nodes()[divergence.index].id.clone(),
                stage: divergence.stage,
            };
            warn!(
                time = t0,
                node = %failure.node,
                stage = ?failure.stage,
                "integration diverged"
            );
            return Err(failure);
        }

        if self.config.clamp_negative() {
            for value in self.state.iter_mut() {
                if *value < 0.0 {
                    *value = 0.0;
                }
            }
        }

        self.time = t1;
        self.steps_taken = k + 1;
        trace!(step = self.steps_taken, time = t1, "accepted step");
        Ok(true)
    }

    /// Runs from the current position to `t_end`, recording the current state
    /// first and then every accepted step.
    pub fn run_with(
        &mut self,
        recorder: &mut impl Recorder,
        cancel: Option<&CancelFlag>,
    ) -> Result<RunStatus, NumericalFailure> {
        info!(
            nodes = self.model.node_count(),
            edges = self.model.edge_count(),
            steps = self.config.step_count() - self.steps_taken,
            method = self.config.method().name(),
            "starting run"
        );

        recorder.record(self.time, &self.state);
        while !self.is_finished() {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                info!(time = self.time, step = self.steps_taken, "run cancelled");
                return Ok(RunStatus::Cancelled);
            }
            self.step()?;
            recorder.record(self.time, &self.state);
        }

        info!(time = self.time, steps = self.steps_taken, "run finished");
        Ok(RunStatus::Completed)
    }

    /// Runs to `t_end` and returns the recorded trajectory. A numerical
    /// failure still hands back every sample recorded before it.
    pub fn run(&mut self) -> Result<Trajectory, RunFailure> {
        let remaining = self.config.step_count() - self.steps_taken;
        let reserve = remaining.min(INITIAL_SAMPLE_CAPACITY) + 1;
        let mut trajectory = Trajectory::with_capacity(self.model.node_ids(), reserve);
        match self.run_with(&mut trajectory, None) {
            Ok(_) => Ok(trajectory),
            Err(failure) => Err(RunFailure { failure, trajectory }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelFlag, RunStatus, Simulation};
    use crate::config::IntegrationMethod;
    use crate::traits::StepStage;
    use crate::trajectory::FnRecorder;

    const CLOSED_LOOP: &str = r#"{
        "nodes": [
            {"id": "a", "type": "storage", "value": 40.0},
            {"id": "b", "type": "storage", "value": 10.0},
            {"id": "c", "type": "storage", "value": 5.0}
        ],
        "edges": [
            {"origin": "a", "target": "b", "rule": "linear", "params": {"k": 0.3}},
            {"origin": "b", "target": "c", "rule": "interaction",
             "params": {"k": 0.01, "control_node": "a"}},
            {"origin": "c", "target": "a", "rule": "constant", "params": {"k": 0.5}}
        ],
        "config": {"t_start": 0, "t_end": 5, "dt": 0.1}
    }"#;

    fn draining(method: &str, clamp: bool) -> String {
        format!(
            r#"{{"nodes": [
                {{"id": "a", "type": "storage", "value": 1.0}},
                {{"id": "out", "type": "sink", "value": 0.0}}
            ], "edges": [
                {{"origin": "a", "target": "out", "rule": "constant", "params": {{"k": 2.0}}}}
            ], "config": {{"t_start": 0, "t_end": 2, "dt": 0.5,
                           "method": "{method}", "clamp_negative": {clamp}}}}}"#
        )
    }

    #[test]
    fn closed_network_conserves_total() {
        let mut sim = Simulation::from_json(CLOSED_LOOP).unwrap();
        let trajectory = sim.run().unwrap();
        assert_eq!(trajectory.len(), 51);
        for sample in trajectory.samples() {
            let total: f64 = sample.values.iter().sum();
            assert!((total - 55.0).abs() < 1e-9, "total drifted to {total}");
        }
        assert_eq!(sim.time(), 5.0);
        assert!(sim.is_finished());
    }

    #[test]
    fn runs_are_deterministic() {
        let first = Simulation::from_json(CLOSED_LOOP).unwrap().run().unwrap();
        let second = Simulation::from_json(CLOSED_LOOP).unwrap().run().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn stepping_matches_run_and_stops_at_end() {
        let mut stepped = Simulation::from_json(CLOSED_LOOP).unwrap();
        while stepped.step().unwrap() {}
        assert_eq!(stepped.steps_taken(), 50);
        assert!(!stepped.step().unwrap());

        let mut batch = Simulation::from_json(CLOSED_LOOP).unwrap();
        let trajectory = batch.run().unwrap();
        assert_eq!(trajectory.final_sample().unwrap().values, stepped.state());
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut sim = Simulation::from_json(CLOSED_LOOP).unwrap();
        sim.run().unwrap();
        assert_ne!(sim.value("a"), Some(40.0));
        sim.reset();
        assert_eq!(sim.time(), 0.0);
        assert_eq!(sim.steps_taken(), 0);
        assert_eq!(sim.state(), &[40.0, 10.0, 5.0]);
        assert_eq!(sim.run().unwrap().len(), 51);
    }

    #[test]
    fn rate_changes_apply_from_the_next_step() {
        let mut sim = Simulation::from_json(&draining("euler", false)).unwrap();
        sim.step().unwrap();
        assert_eq!(sim.value("a"), Some(0.0));
        sim.set_rates(&[4.0]).unwrap();
        assert_eq!(sim.value("a"), Some(0.0));
        sim.step().unwrap();
        assert_eq!(sim.value("a"), Some(-2.0));
        assert!(sim.set_rates(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn negative_values_pass_through_unless_clamped() {
        let mut free = Simulation::from_json(&draining("euler", false)).unwrap();
        free.run().unwrap();
        assert_eq!(free.value("a"), Some(-3.0));

        let mut clamped = Simulation::from_json(&draining("euler", true)).unwrap();
        let trajectory = clamped.run().unwrap();
        assert_eq!(trajectory.series("a").unwrap(), vec![1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn method_selection_is_honoured() {
        for (method, expected) in [
            ("rk4", IntegrationMethod::Rk4),
            ("euler", IntegrationMethod::Euler),
            ("tsit5", IntegrationMethod::Tsit5),
        ] {
            let mut sim = Simulation::from_json(&draining(method, false)).unwrap();
            assert_eq!(sim.config().method(), expected);
            // A constant drain is integrated exactly by every method.
            sim.run().unwrap();
            assert!((sim.value("a").unwrap() + 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn cancellation_keeps_partial_samples() {
        let mut sim = Simulation::from_json(CLOSED_LOOP).unwrap();
        let flag = CancelFlag::new();
        let trigger = flag.clone();
        let mut times = Vec::new();
        let mut recorder = FnRecorder(|t: f64, _: &[f64]| {
            times.push(t);
            if times.len() == 3 {
                trigger.cancel();
            }
        });

        let status = sim.run_with(&mut recorder, Some(&flag)).unwrap();
        assert_eq!(status, RunStatus::Cancelled);
        assert_eq!(sim.steps_taken(), 2);
        assert_eq!(times.len(), 3);
        assert!((times[2] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn divergence_leaves_last_accepted_state() {
        let json = r#"{
            "nodes": [
                {"id": "a", "type": "storage", "value": 1e200},
                {"id": "b", "type": "storage", "value": 1e200}
            ],
            "edges": [
                {"origin": "a", "target": "b", "rule": "interaction",
                 "params": {"k": 1e10, "control_node": "b"}}
            ],
            "config": {"t_start": 0, "t_end": 1, "dt": 0.1}
        }"#;
        let mut sim = Simulation::from_json(json).unwrap();
        let err = sim.run().unwrap_err();
        assert_eq!(err.failure.time, 0.0);
        assert_eq!(err.failure.stage, StepStage::Derivative(1));
        assert_eq!(err.trajectory.len(), 1);
        assert_eq!(sim.state(), &[1e200, 1e200]);
        assert_eq!(sim.steps_taken(), 0);
    }
}
