use crate::traits::{check_finite, lit, Divergence, DynamicalSystem, Scalar, StepStage, Steppable};

/// Explicit (forward) Euler solver.
pub struct Euler<T: Scalar> {
    k1: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> Euler<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![T::zero(); dim],
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for Euler<T> {
    fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), Divergence> {
        system.apply(*t, state, &mut self.k1);
        check_finite(&self.k1, StepStage::Derivative(1))?;

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i];
        }
        check_finite(&self.tmp, StepStage::Update)?;

        state.copy_from_slice(&self.tmp);
        *t = *t + dt;
        Ok(())
    }
}

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![T::zero(); dim],
            k2: vec![T::zero(); dim],
            k3: vec![T::zero(); dim],
            k4: vec![T::zero(); dim],
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), Divergence> {
        let half: T = lit(0.5);
        let sixth: T = lit(1.0 / 6.0);
        let two: T = lit(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);
        check_finite(&self.k1, StepStage::Derivative(1))?;

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);
        check_finite(&self.k2, StepStage::Derivative(2))?;

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);
        check_finite(&self.k3, StepStage::Derivative(3))?;

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);
        check_finite(&self.k4, StepStage::Derivative(4))?;

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..state.len() {
            self.tmp[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }
        check_finite(&self.tmp, StepStage::Update)?;

        state.copy_from_slice(&self.tmp);
        *t = t0 + dt;
        Ok(())
    }
}

/// Tsitouras 5/4 Solver, used here with a fixed step (5th order solution only).
pub struct Tsit5<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    k5: Vec<T>,
    k6: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> Tsit5<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            k5: vec![z; dim],
            k6: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for Tsit5<T> {
    fn step(
        &mut self,
        system: &impl DynamicalSystem<T>,
        t: &mut T,
        state: &mut [T],
        dt: T,
    ) -> Result<(), Divergence> {
        let t0 = *t;

        // Tsit5 Coefficients
        let c2: T = lit(0.161);
        let c3: T = lit(0.327);
        let c4: T = lit(0.9);
        let c5: T = lit(0.9800255409045097);
        let c6: T = lit(1.0);

        let a21: T = lit(0.161);

        let a31: T = lit(-0.008480655492356989);
        let a32: T = lit(0.335480655492357);

        let a41: T = lit(2.898);
        let a42: T = lit(-6.359447987781783);
        let a43: T = lit(4.361447987781783);

        let a51: T = lit(5.325864858437957);
        let a52: T = lit(-11.748883564062828);
        let a53: T = lit(7.495539342889693);
        let a54: T = lit(-0.09249506636030195);

        let a61: T = lit(5.86145544294642);
        let a62: T = lit(-12.92096931784711);
        let a63: T = lit(8.159367898576159);
        let a64: T = lit(-0.071584973281401);
        let a65: T = lit(-0.02826857949054663);

        // b coefficients (5th order)
        let b1: T = lit(0.09646076681806523);
        let b2: T = lit(0.01);
        let b3: T = lit(0.4798896504144996);
        let b4: T = lit(1.379008574103742);
        let b5: T = lit(-3.290069515436099);
        let b6: T = lit(2.324710524099774);

        system.apply(t0, state, &mut self.k1);
        check_finite(&self.k1, StepStage::Derivative(1))?;

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (a21 * self.k1[i]);
        }
        system.apply(t0 + c2 * dt, &self.tmp, &mut self.k2);
        check_finite(&self.k2, StepStage::Derivative(2))?;

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (a31 * self.k1[i] + a32 * self.k2[i]);
        }
        system.apply(t0 + c3 * dt, &self.tmp, &mut self.k3);
        check_finite(&self.k3, StepStage::Derivative(3))?;

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * (a41 * self.k1[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        system.apply(t0 + c4 * dt, &self.tmp, &mut self.k4);
        check_finite(&self.k4, StepStage::Derivative(4))?;

        for i in 0..state.len() {
            self.tmp[i] = state[i]
                + dt * (a51 * self.k1[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        system.apply(t0 + c5 * dt, &self.tmp, &mut self.k5);
        check_finite(&self.k5, StepStage::Derivative(5))?;

        for i in 0..state.len() {
            self.tmp[i] = state[i]
                + dt * (a61 * self.k1[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        system.apply(t0 + c6 * dt, &self.tmp, &mut self.k6);
        check_finite(&self.k6, StepStage::Derivative(6))?;

        for i in 0..state.len() {
            self.tmp[i] = state[i]
                + dt * (b1 * self.k1[i]
                    + b2 * self.k2[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }
        check_finite(&self.tmp, StepStage::Update)?;

        state.copy_from_slice(&self.tmp);
        *t = t0 + dt;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Euler, Tsit5, RK4};
    use crate::traits::{DynamicalSystem, StepStage, Steppable};

    struct Decay {
        rate: f64,
    }

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -self.rate * x[0];
        }
    }

    /// Finite at the starting state, infinite at any other.
    struct BlowsUpAwayFromStart;

    impl DynamicalSystem<f64> for BlowsUpAwayFromStart {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = if x[0] == 1.0 { 1.0 } else { f64::INFINITY };
        }
    }

    fn integrate(stepper: &mut impl Steppable<f64>, steps: usize, dt: f64) -> (f64, f64) {
        let system = Decay { rate: 0.5 };
        let mut t = 0.0;
        let mut state = [2.0];
        for _ in 0..steps {
            stepper.step(&system, &mut t, &mut state, dt).expect("decay is finite");
        }
        (t, state[0])
    }

    #[test]
    fn rk4_matches_exponential_decay() {
        let (t, value) = integrate(&mut RK4::new(1), 40, 0.1);
        let expected = 2.0 * (-0.5 * t).exp();
        assert!((t - 4.0).abs() < 1e-12);
        assert!((value - expected).abs() < 1e-6, "got {value}, expected {expected}");
    }

    #[test]
    fn tsit5_matches_exponential_decay() {
        let (t, value) = integrate(&mut Tsit5::new(1), 40, 0.1);
        let expected = 2.0 * (-0.5 * t).exp();
        assert!((value - expected).abs() < 1e-6, "got {value}, expected {expected}");
    }

    #[test]
    fn euler_is_first_order() {
        let (_, coarse) = integrate(&mut Euler::new(1), 40, 0.1);
        let (_, fine) = integrate(&mut Euler::new(1), 400, 0.01);
        let expected = 2.0 * (-2.0f64).exp();
        let coarse_err = (coarse - expected).abs();
        let fine_err = (fine - expected).abs();
        assert!(fine_err < coarse_err / 5.0);
    }

    #[test]
    fn divergent_stage_leaves_state_untouched() {
        let mut stepper = RK4::new(1);
        let mut t = 0.0;
        let mut state = [1.0];
        let err = stepper
            .step(&BlowsUpAwayFromStart, &mut t, &mut state, 0.1)
            .expect_err("k2 is evaluated away from the start");
        assert_eq!(err.index, 0);
        assert_eq!(err.stage, StepStage::Derivative(2));
        assert_eq!(state, [1.0]);
        assert_eq!(t, 0.0);
    }

    #[test]
    fn euler_reports_divergent_derivative() {
        let system = Decay { rate: -1.0e308 };
        let mut stepper = Euler::new(1);
        let mut t = 0.0;
        let mut state = [10.0];
        let err = stepper
            .step(&system, &mut t, &mut state, 1.0)
            .expect_err("derivative overflows");
        assert_eq!(err.stage, StepStage::Derivative(1));
        assert_eq!(state, [10.0]);
    }

    #[test]
    fn euler_reports_divergent_update() {
        // dx/dt = x stays finite at 1e308; the step itself overflows.
        let system = Decay { rate: -1.0 };
        let mut stepper = Euler::new(1);
        let mut t = 0.0;
        let mut state = [1.0e308];
        let err = stepper
            .step(&system, &mut t, &mut state, 10.0)
            .expect_err("update overflows");
        assert_eq!(err.index, 0);
        assert_eq!(err.stage, StepStage::Update);
        assert_eq!(state, [1.0e308]);
        assert_eq!(t, 0.0);
    }
}
