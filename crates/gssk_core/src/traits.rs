use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as node quantities in a flow network.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Represents a continuous-time system dx/dt = f(t, x).
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// x: current state
    /// t: current time
    /// out: buffer to write dx/dt into
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// Which part of a step produced a non-finite value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStage {
    /// The n-th derivative evaluation of the step (1-based).
    Derivative(u8),
    /// The final state update.
    Update,
}

/// A step was abandoned because a component became NaN or infinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divergence {
    /// State index of the first offending component.
    pub index: usize,
    pub stage: StepStage,
}

/// A trait for fixed-step solvers that advance a system forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after a successful step)
    /// state: current state (updated after a successful step)
    ///
    /// On `Err`, neither `t` nor `state` is modified.
    fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), Divergence>;
}

/// Returns the first non-finite entry of `values`, tagged with `stage`.
pub(crate) fn check_finite<T: Scalar>(values: &[T], stage: StepStage) -> Result<(), Divergence> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(Divergence { index, stage }),
        None => Ok(()),
    }
}

/// Converts an f64 literal into `T`; unrepresentable values become NaN and
/// surface through the divergence checks.
pub(crate) fn lit<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}
