//! Ensemble forecasting and calibration bindings.

use crate::kernel::{serialization_error, WasmKernel};
use gssk_core::calibration::CalibrationError;
use gssk_core::ensemble::EnsembleError;
use gssk_core::{
    calibrate, ensemble_forecast, CalibrationSettings, EnsembleResult, EnsembleSettings,
    NodeObservations,
};
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// Result payload for a calibration run.
#[derive(Debug, Serialize)]
pub(crate) struct CalibrationSummary {
    rates: Vec<f64>,
    fitness: f64,
}

impl WasmKernel {
    pub(crate) fn forecast(
        &self,
        runs: u32,
        perturbation: f64,
        seed: u32,
    ) -> Result<EnsembleResult, EnsembleError> {
        let settings = EnsembleSettings {
            runs: runs as usize,
            perturbation,
            seed: u64::from(seed),
        };
        ensemble_forecast(
            self.simulation.model(),
            self.simulation.config(),
            &settings,
        )
    }

    /// Fits the edge rates and applies the best ones to this kernel.
    pub(crate) fn fit(
        &mut self,
        observations: &[NodeObservations],
        iterations: u32,
        seed: u32,
    ) -> Result<CalibrationSummary, CalibrationError> {
        let settings = CalibrationSettings {
            iterations: iterations as usize,
            seed: u64::from(seed),
            ..CalibrationSettings::default()
        };
        let result = calibrate(
            self.simulation.model(),
            self.simulation.config(),
            observations,
            &settings,
        )?;
        self.simulation.set_rates(&result.rates)?;
        Ok(CalibrationSummary {
            rates: result.rates,
            fitness: result.fitness,
        })
    }
}

#[wasm_bindgen]
impl WasmKernel {
    /// Runs `runs` perturbed copies of the model and returns min/max/mean envelopes.
    pub fn ensemble_forecast(
        &self,
        runs: u32,
        perturbation: f64,
        seed: u32,
    ) -> Result<JsValue, JsValue> {
        let result = self
            .forecast(runs, perturbation, seed)
            .map_err(|e| JsValue::from_str(&format!("Ensemble forecast failed: {}", e)))?;
        to_value(&result).map_err(serialization_error)
    }

    /// `observations` is an array of `{ node_id, data: [{ time, value }] }`.
    pub fn calibrate(
        &mut self,
        observations: JsValue,
        iterations: u32,
        seed: u32,
    ) -> Result<JsValue, JsValue> {
        let observations: Vec<NodeObservations> = from_value(observations)
            .map_err(|e| JsValue::from_str(&format!("Invalid observations: {}", e)))?;
        let summary = self
            .fit(&observations, iterations, seed)
            .map_err(|e| JsValue::from_str(&format!("Calibration failed: {}", e)))?;
        to_value(&summary).map_err(serialization_error)
    }
}
