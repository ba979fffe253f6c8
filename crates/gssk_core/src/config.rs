use crate::document::ConfigRecord;
use crate::error::{ConfigurationError, LoadError, ValidationError};
use std::str::FromStr;

/// A remainder of `(t_end - t_start) / dt` below this fraction of a step is
/// treated as an even division instead of producing a sliver final step.
const STEP_REMAINDER_TOLERANCE: f64 = 1e-9;

/// Largest step count a run may take; every step is recorded.
pub const MAX_STEPS: usize = 100_000_000;

/// Fixed-step integration methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IntegrationMethod {
    #[default]
    Rk4,
    Euler,
    Tsit5,
}

impl IntegrationMethod {
    pub fn name(self) -> &'static str {
        match self {
            IntegrationMethod::Rk4 => "rk4",
            IntegrationMethod::Euler => "euler",
            IntegrationMethod::Tsit5 => "tsit5",
        }
    }
}

impl FromStr for IntegrationMethod {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rk4" => Ok(IntegrationMethod::Rk4),
            "euler" => Ok(IntegrationMethod::Euler),
            "tsit5" => Ok(IntegrationMethod::Tsit5),
            other => Err(ConfigurationError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Validated integration settings and the time grid they imply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    t_start: f64,
    t_end: f64,
    dt: f64,
    method: IntegrationMethod,
    clamp_negative: bool,
    steps: usize,
}

impl SimulationConfig {
    pub fn new(
        t_start: f64,
        t_end: f64,
        dt: f64,
        method: IntegrationMethod,
    ) -> Result<Self, ValidationError> {
        if !t_start.is_finite() {
            return Err(ValidationError::NonFiniteConfig("t_start"));
        }
        if !t_end.is_finite() {
            return Err(ValidationError::NonFiniteConfig("t_end"));
        }
        if !dt.is_finite() {
            return Err(ValidationError::NonFiniteConfig("dt"));
        }
        if dt <= 0.0 {
            return Err(ValidationError::NonPositiveStep(dt));
        }
        if t_end <= t_start {
            return Err(ValidationError::EmptyTimeSpan { t_start, t_end });
        }

        let ratio = (t_end - t_start) / dt;
        if !ratio.is_finite() {
            return Err(ValidationError::NonFiniteConfig("step count"));
        }
        let nearest = ratio.round();
        let steps = if (ratio - nearest).abs() < STEP_REMAINDER_TOLERANCE && nearest >= 1.0 {
            nearest
        } else {
            ratio.ceil()
        };
        if steps > MAX_STEPS as f64 {
            return Err(ValidationError::TooManySteps {
                steps,
                max: MAX_STEPS,
            });
        }

        Ok(Self {
            t_start,
            t_end,
            dt,
            method,
            clamp_negative: false,
            steps: steps as usize,
        })
    }

    pub fn from_record(record: &ConfigRecord) -> Result<Self, LoadError> {
        let method = record.method.parse::<IntegrationMethod>()?;
        let config = Self::new(record.t_start, record.t_end, record.dt, method)?
            .with_clamp_negative(record.clamp_negative);
        Ok(config)
    }

    /// Clamp every node value below zero back to zero after each step.
    pub fn with_clamp_negative(mut self, clamp: bool) -> Self {
        self.clamp_negative = clamp;
        self
    }

    pub fn with_method(mut self, method: IntegrationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn t_start(&self) -> f64 {
        self.t_start
    }

    pub fn t_end(&self) -> f64 {
        self.t_end
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn method(&self) -> IntegrationMethod {
        self.method
    }

    pub fn clamp_negative(&self) -> bool {
        self.clamp_negative
    }

    /// Number of integration steps from `t_start` to `t_end`.
    pub fn step_count(&self) -> usize {
        self.steps
    }

    /// Time of grid point `k`; the last point is exactly `t_end`.
    pub fn time_at(&self, k: usize) -> f64 {
        if k >= self.steps {
            self.t_end
        } else {
            self.t_start + k as f64 * self.dt
        }
    }
}
