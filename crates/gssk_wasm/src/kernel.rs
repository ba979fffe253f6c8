//! Core WASM kernel wrapper: loading, stepping and state access.

use gssk_core::{LoadError, NumericalFailure, Simulation};
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

/// A loaded model and its running simulation.
#[wasm_bindgen]
pub struct WasmKernel {
    pub(crate) simulation: Simulation,
}

/// Progress payload for batched stepping.
#[derive(Debug, Serialize)]
pub(crate) struct RunProgress {
    done: bool,
    steps_taken: usize,
    total_steps: usize,
    time: f64,
}

pub(crate) fn load_error(err: LoadError) -> JsValue {
    JsValue::from_str(&format!("Model load failed: {}", err))
}

pub(crate) fn numerical_error(err: NumericalFailure) -> JsValue {
    JsValue::from_str(&format!("Simulation diverged: {}", err))
}

pub(crate) fn serialization_error(err: serde_wasm_bindgen::Error) -> JsValue {
    JsValue::from_str(&format!("Serialization error: {}", err))
}

impl WasmKernel {
    pub(crate) fn from_json(json: &str) -> Result<Self, LoadError> {
        Ok(Self {
            simulation: Simulation::from_json(json)?,
        })
    }

    pub(crate) fn advance(&mut self, batch_size: u32) -> Result<RunProgress, NumericalFailure> {
        for _ in 0..batch_size {
            if !self.simulation.step()? {
                break;
            }
        }
        Ok(self.progress())
    }

    pub(crate) fn progress(&self) -> RunProgress {
        RunProgress {
            done: self.simulation.is_finished(),
            steps_taken: self.simulation.steps_taken(),
            total_steps: self.simulation.config().step_count(),
            time: self.simulation.time(),
        }
    }
}

#[wasm_bindgen]
impl WasmKernel {
    #[wasm_bindgen(constructor)]
    pub fn new(model_json: &str) -> Result<WasmKernel, JsValue> {
        console_error_panic_hook::set_once();
        Self::from_json(model_json).map_err(load_error)
    }

    /// Advances one grid step; `false` once `t_end` has been reached.
    pub fn step(&mut self) -> Result<bool, JsValue> {
        self.simulation.step().map_err(numerical_error)
    }

    /// Advances up to `batch_size` steps and reports progress.
    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let progress = self.advance(batch_size).map_err(numerical_error)?;
        to_value(&progress).map_err(serialization_error)
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        to_value(&self.progress()).map_err(serialization_error)
    }

    /// Runs to `t_end` and returns the trajectory recorded from the current position.
    pub fn run(&mut self) -> Result<JsValue, JsValue> {
        let trajectory = self
            .simulation
            .run()
            .map_err(|err| numerical_error(err.failure))?;
        to_value(&trajectory).map_err(serialization_error)
    }

    pub fn reset(&mut self) {
        self.simulation.reset();
    }

    pub fn is_done(&self) -> bool {
        self.simulation.is_finished()
    }

    pub fn get_state(&self) -> Vec<f64> {
        self.simulation.state().to_vec()
    }

    pub fn get_t(&self) -> f64 {
        self.simulation.time()
    }

    pub fn t_start(&self) -> f64 {
        self.simulation.config().t_start()
    }

    pub fn t_end(&self) -> f64 {
        self.simulation.config().t_end()
    }

    pub fn dt(&self) -> f64 {
        self.simulation.config().dt()
    }

    pub fn node_count(&self) -> usize {
        self.simulation.model().node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.simulation.model().edge_count()
    }

    pub fn node_id(&self, index: usize) -> Option<String> {
        self.simulation
            .model()
            .nodes()
            .get(index)
            .map(|node| node.id.clone())
    }

    pub fn node_index(&self, node_id: &str) -> Option<usize> {
        self.simulation.model().node_index(node_id)
    }

    pub fn edge_k(&self, index: usize) -> Option<f64> {
        self.simulation
            .model()
            .edges()
            .get(index)
            .map(|edge| edge.rule.rate())
    }

    /// Replaces one edge's rate; takes effect from the next step.
    pub fn set_edge_k(&mut self, index: usize, k: f64) -> Result<(), JsValue> {
        let mut rates = self.simulation.model().rates();
        let slot = rates
            .get_mut(index)
            .ok_or_else(|| JsValue::from_str("Edge index out of range."))?;
        *slot = k;
        self.simulation
            .set_rates(&rates)
            .map_err(|e| JsValue::from_str(&format!("Invalid rate: {}", e)))
    }
}
