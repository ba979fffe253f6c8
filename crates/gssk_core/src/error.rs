//! Error taxonomy for loading and running flow-network models.

use crate::trajectory::Trajectory;
use crate::traits::StepStage;

/// Which endpoint of an edge failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRole {
    Origin,
    Target,
    Control,
}

impl std::fmt::Display for EdgeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeRole::Origin => f.write_str("origin"),
            EdgeRole::Target => f.write_str("target"),
            EdgeRole::Control => f.write_str("control"),
        }
    }
}

/// A malformed or inconsistent model document, raised before any step runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("model document is malformed: {0}")]
    Malformed(String),
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),
    #[error("duplicate edge id '{0}'")]
    DuplicateEdge(String),
    #[error("node '{0}' has a non-finite initial value")]
    NonFiniteNodeValue(String),
    #[error("unknown node kind '{kind}' on node '{node}'")]
    UnknownNodeKind { node: String, kind: String },
    #[error("edge '{edge}' references non-existent {role} node '{node}'")]
    UnknownNode {
        edge: String,
        role: EdgeRole,
        node: String,
    },
    #[error("edge '{edge}' uses unknown rule '{rule}'")]
    UnknownRule { edge: String, rule: String },
    #[error("edge '{edge}' ({rule}) is missing required parameter '{param}'")]
    MissingParameter {
        edge: String,
        rule: &'static str,
        param: &'static str,
    },
    #[error("edge '{edge}' ({rule}) has unexpected parameter '{param}'")]
    UnexpectedParameter {
        edge: String,
        rule: &'static str,
        param: String,
    },
    #[error("edge '{edge}' parameter '{param}' {reason}")]
    InvalidParameter {
        edge: String,
        param: String,
        reason: &'static str,
    },
    #[error("expected {expected} edge rates, got {actual}")]
    RateCountMismatch { expected: usize, actual: usize },
    #[error("config field '{0}' must be finite")]
    NonFiniteConfig(&'static str),
    #[error("dt ({0}) must be positive")]
    NonPositiveStep(f64),
    #[error("{steps} integration steps exceed the limit of {max}")]
    TooManySteps { steps: f64, max: usize },
    #[error("t_end ({t_end}) must be greater than t_start ({t_start})")]
    EmptyTimeSpan { t_start: f64, t_end: f64 },
    #[error("observation references non-existent node '{0}'")]
    UnknownObservedNode(String),
}

/// The requested integration method is not supported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unsupported integration method '{0}' (expected one of: rk4, euler, tsit5)")]
    UnsupportedMethod(String),
}

/// Anything that stops a model from loading.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// A derivative evaluation or state update produced NaN or infinity.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("numerical failure at t={time} on node '{node}' ({stage:?})")]
pub struct NumericalFailure {
    /// Start time of the step that failed.
    pub time: f64,
    pub node: String,
    pub stage: StepStage,
}

/// A run that halted on a numerical failure, along with everything recorded
/// up to the last accepted step.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{failure}")]
pub struct RunFailure {
    #[source]
    pub failure: NumericalFailure,
    pub trajectory: Trajectory,
}
