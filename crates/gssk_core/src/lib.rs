//! The `gssk_core` crate is the simulation engine behind the GSSK front ends.
//! It loads a flow-network model (nodes holding quantities, edges moving them
//! according to named flow rules) and integrates it over a fixed time grid.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` (vector fields), `Steppable` (solvers).
//! - **Rules**: The closed set of flow laws, validated once at load.
//! - **Model**: Document parsing, validation and dense index resolution.
//! - **Solvers**: Fixed-step integrators (RK4, Euler, Tsit5) with divergence checks.
//! - **Simulation**: The run driver, trajectory recording and cancellation.
//! - **Ensemble / Calibration**: Perturbed-rate forecasting and differential-evolution fitting.
pub mod calibration;
pub mod config;
pub mod document;
pub mod ensemble;
pub mod error;
pub mod model;
pub mod rules;
pub mod simulation;
pub mod solvers;
pub mod system;
pub mod trajectory;
pub mod traits;

pub use calibration::{calibrate, CalibrationResult, CalibrationSettings, NodeObservations, Observation};
pub use config::{IntegrationMethod, SimulationConfig};
pub use ensemble::{ensemble_forecast, EnsembleResult, EnsembleSettings};
pub use error::{ConfigurationError, LoadError, NumericalFailure, RunFailure, ValidationError};
pub use model::{NetworkModel, NodeKind};
pub use simulation::{load, CancelFlag, RunStatus, Simulation};
pub use trajectory::{FnRecorder, Recorder, Sample, Trajectory};
