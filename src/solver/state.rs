//! Conjugate Gradient state and its one-iteration transition.
//!
//! [`CgState`] holds everything a CG iteration carries from one step to the
//! next. [`CgState::step`] is the whole arithmetic of one iteration; every
//! solver host in this crate (bare loop, [`IterativeDriver`], plugins) drives
//! that same transition, so they agree bit for bit.
//!
//! A step is split in three parts so that hosts with their own convergence
//! test can slot it in between:
//!
//! 1. [`CgState::advance`]: `y = A p`, `alpha = r.r / p.y`, update `x` and `r`,
//!    compute the new `r.r` and `beta`;
//! 2. [`CgState::converged`]: the built-in test `r.r / r0.r0 < rtol^2`;
//! 3. [`CgState::update_direction`]: `p = beta p + r`, then refresh the ghosts of `p`.
//!
//! [`IterativeDriver`]: crate::solver::driver::IterativeDriver

use num_traits::Float;

use crate::core::traits::{LinearOperator, VectorOps, VectorSpace};
use crate::error::KError;
use crate::utils::convergence::{ConvergedReason, Convergence, SolveStats};
use crate::utils::monitor::ConvergenceEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Converged,
}

#[derive(Debug, Clone)]
pub struct CgState<V, T> {
    x: V,
    r: V,
    p: V,
    y: V,
    r_norm2: T,
    r0_norm2: T,
    beta: T,
    iteration: usize,
    conv: Convergence<T>,
    initial: Option<ConvergedReason>,
}

impl<V, T> CgState<V, T>
where
    V: VectorOps<T>,
    T: Float,
{
    /// Compute `r = b - A x0`, `p = r` and the reference norm `r0.r0`.
    ///
    /// Takes ownership of the initial guess; the caller's vectors are never
    /// touched by a failing solve.
    pub fn start<A, S>(a: &A, space: &S, b: &V, x0: V, conv: Convergence<T>) -> Result<Self, KError>
    where
        A: LinearOperator<V> + ?Sized,
        S: VectorSpace<V, T> + ?Sized,
    {
        if !b.compatible(&x0) {
            return Err(KError::mismatch("initial guess", b.global_len(), x0.global_len()));
        }
        let mut x = x0;
        space.ghost_update(&mut x)?;

        let mut y = b.clone();
        a.apply(&x, &mut y)?;
        let mut r = b.clone();
        r.axpy(-T::one(), &y);
        space.ghost_update(&mut r)?;
        let p = r.clone();

        let r_norm2 = space.dot(&r, &r);
        let b_norm2 = space.dot(b, b);
        let mut state = CgState {
            x,
            r,
            p,
            y,
            r_norm2,
            r0_norm2: r_norm2,
            beta: T::zero(),
            iteration: 0,
            conv,
            initial: None,
        };
        if !r_norm2.is_finite() {
            return Err(state.breakdown("r^T r", r_norm2));
        }
        if r_norm2 == T::zero() || r_norm2 < state.conv.rtol2() * b_norm2 {
            state.initial = Some(ConvergedReason::ConvergedInitial);
        }
        Ok(state)
    }

    fn breakdown(&self, quantity: &'static str, value: T) -> KError {
        let value = value.to_f64().unwrap_or(f64::NAN);
        tracing::warn!(iteration = self.iteration, quantity, value, "CG breakdown");
        KError::NumericalBreakdown { iteration: self.iteration, quantity, value }
    }

    /// `y = A p`, step length, `x` and `r` updates, new `r.r` and `beta`.
    pub fn advance<A, S>(&mut self, a: &A, space: &S) -> Result<(), KError>
    where
        A: LinearOperator<V> + ?Sized,
        S: VectorSpace<V, T> + ?Sized,
    {
        a.apply(&self.p, &mut self.y)?;
        let p_y = space.dot(&self.p, &self.y);
        if !p_y.is_finite() || p_y.abs() <= self.conv.breakdown_tol {
            return Err(self.breakdown("p^T A p", p_y));
        }
        if p_y < T::zero() {
            let curvature = p_y.to_f64().unwrap_or(f64::NAN);
            tracing::warn!(iteration = self.iteration, curvature, "CG hit negative curvature");
            return Err(KError::IndefiniteOperator { iteration: self.iteration, curvature });
        }
        let alpha = self.r_norm2 / p_y;
        if !alpha.is_finite() {
            return Err(self.breakdown("alpha", alpha));
        }

        self.x.axpy(alpha, &self.p);
        self.r.axpy(-alpha, &self.y);

        let r_norm2_new = space.dot(&self.r, &self.r);
        if !r_norm2_new.is_finite() {
            return Err(self.breakdown("r^T r", r_norm2_new));
        }
        self.beta = r_norm2_new / self.r_norm2;
        self.r_norm2 = r_norm2_new;
        self.iteration += 1;
        Ok(())
    }

    /// `r.r / r0.r0 < rtol^2`.
    pub fn converged(&self) -> bool {
        self.conv.is_converged(self.r_norm2, self.r0_norm2)
    }

    /// `p = beta p + r`, then refresh the ghosts of `p` for the next `A p`.
    pub fn update_direction<S>(&mut self, space: &S) -> Result<(), KError>
    where
        S: VectorSpace<V, T> + ?Sized,
    {
        if !self.beta.is_finite() {
            return Err(self.breakdown("beta", self.beta));
        }
        self.p.aypx(self.beta, &self.r);
        space.ghost_update(&mut self.p)
    }

    /// One full CG iteration with the built-in convergence test.
    pub fn step<A, S>(&mut self, a: &A, space: &S) -> Result<StepOutcome, KError>
    where
        A: LinearOperator<V> + ?Sized,
        S: VectorSpace<V, T> + ?Sized,
    {
        self.advance(a, space)?;
        if self.converged() {
            return Ok(StepOutcome::Converged);
        }
        self.update_direction(space)?;
        Ok(StepOutcome::Continue)
    }

    /// `Some(ConvergedInitial)` when no iteration is needed.
    pub fn initial_reason(&self) -> Option<ConvergedReason> {
        self.initial
    }

    pub fn event(&self) -> ConvergenceEvent<T> {
        ConvergenceEvent { iteration: self.iteration, r_norm2: self.r_norm2, r0_norm2: self.r0_norm2 }
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn r_norm2(&self) -> T {
        self.r_norm2
    }

    pub fn r0_norm2(&self) -> T {
        self.r0_norm2
    }

    pub fn convergence(&self) -> &Convergence<T> {
        &self.conv
    }

    /// Current iterate; its ghosts are only current after [`CgState::finish`].
    pub fn solution(&self) -> &V {
        &self.x
    }

    pub fn residual(&self) -> &V {
        &self.r
    }

    /// Refresh the ghosts of `x` and hand it out with the solve statistics.
    pub fn finish<S>(mut self, space: &S, reason: ConvergedReason) -> Result<(V, SolveStats<T>), KError>
    where
        S: VectorSpace<V, T> + ?Sized,
    {
        space.ghost_update(&mut self.x)?;
        let stats = SolveStats::new(self.iteration, self.r_norm2, self.r0_norm2, reason);
        if stats.converged {
            tracing::debug!(iterations = stats.iterations, ?reason, "CG converged");
        } else {
            tracing::warn!(
                iterations = stats.iterations,
                residual = stats.final_residual.to_f64().unwrap_or(f64::NAN),
                ?reason,
                "CG stopped without converging"
            );
        }
        Ok((self.x, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::ShellOperator;
    use faer::Mat;

    fn spd2() -> Mat<f64> {
        Mat::from_fn(2, 2, |i, j| [[4.0, 1.0], [1.0, 3.0]][i][j])
    }

    #[test]
    fn two_by_two_converges_in_two_steps() {
        let a = spd2();
        let b = vec![1.0, 2.0];
        let mut state = CgState::start(&a, &(), &b, vec![0.0; 2], Convergence::new(1e-10, 20)).unwrap();
        assert_eq!(state.initial_reason(), None);
        assert_eq!(state.r0_norm2(), 5.0);

        assert_eq!(state.step(&a, &()).unwrap(), StepOutcome::Continue);
        assert_eq!(state.solution(), &vec![0.25, 0.5]);
        assert_eq!(state.r_norm2(), 0.3125);

        assert_eq!(state.step(&a, &()).unwrap(), StepOutcome::Converged);
        let (x, stats) = state.finish(&(), ConvergedReason::ConvergedRtol).unwrap();
        assert_eq!(stats.iterations, 2);
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn zero_operator_breaks_down() {
        let zero = ShellOperator::new(|_x: &Vec<f64>, y: &mut Vec<f64>| {
            y.set_zero();
            Ok(())
        });
        let b = vec![1.0, -1.0, 2.0];
        let mut state = CgState::start(&zero, &(), &b, vec![0.0; 3], Convergence::new(1e-6, 10)).unwrap();
        match state.step(&zero, &()) {
            Err(KError::NumericalBreakdown { iteration, quantity, value }) => {
                assert_eq!(iteration, 0);
                assert_eq!(quantity, "p^T A p");
                assert_eq!(value, 0.0);
            }
            other => panic!("expected breakdown, got {other:?}"),
        }
    }

    #[test]
    fn negative_definite_operator_is_rejected() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { -1.0 } else { 0.0 });
        let mut state = CgState::start(&a, &(), &vec![1.0, 1.0], vec![0.0; 2], Convergence::new(1e-6, 10)).unwrap();
        assert!(matches!(state.step(&a, &()), Err(KError::IndefiniteOperator { iteration: 0, .. })));
    }

    #[test]
    fn breakdown_tolerance_catches_tiny_curvature() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 1e-20 } else { 0.0 });
        let conv = Convergence::new(1e-6, 10).with_breakdown_tol(1e-12);
        let mut state = CgState::start(&a, &(), &vec![1.0, 0.0], vec![0.0; 2], conv).unwrap();
        assert!(matches!(state.step(&a, &()), Err(KError::NumericalBreakdown { .. })));
    }

    #[test]
    fn mismatched_guess_is_rejected_before_any_apply() {
        let calls = std::cell::Cell::new(0);
        let op = ShellOperator::new(|x: &Vec<f64>, y: &mut Vec<f64>| {
            calls.set(calls.get() + 1);
            y.copy_from(x);
            Ok(())
        });
        let err = CgState::start(&op, &(), &vec![1.0; 3], vec![0.0; 2], Convergence::new(1e-6, 10)).unwrap_err();
        assert_eq!(err, KError::mismatch("initial guess", 3, 2));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn exact_guess_needs_no_iteration() {
        let a = spd2();
        let b = vec![1.0, 2.0];
        let state = CgState::start(&a, &(), &b, vec![1.0 / 11.0, 7.0 / 11.0], Convergence::new(1e-6, 10)).unwrap();
        assert_eq!(state.initial_reason(), Some(ConvergedReason::ConvergedInitial));
    }
    #[test]
    fn exact_step_converges_with_zero_tolerance() {
        let identity = ShellOperator::new(|x: &Vec<f64>, y: &mut Vec<f64>| {
            y.copy_from(x);
            Ok(())
        });
        let b = vec![1.0, 1.0];
        let mut state = CgState::start(&identity, &(), &b, vec![0.0; 2], Convergence::new(0.0, 10)).unwrap();
        assert_eq!(state.step(&identity, &()).unwrap(), StepOutcome::Converged);
        assert_eq!(state.r_norm2(), 0.0);
        let (x, stats) = state.finish(&(), ConvergedReason::ConvergedRtol).unwrap();
        assert_eq!(x, b);
        assert_eq!(stats.iterations, 1);
    }

    #[test]
    fn nan_from_the_operator_is_a_breakdown() {
        let calls = std::cell::Cell::new(0);
        let a = ShellOperator::new(|x: &Vec<f64>, y: &mut Vec<f64>| {
            calls.set(calls.get() + 1);
            for (i, (yi, xi)) in y.iter_mut().zip(x).enumerate() {
                *yi = if calls.get() > 2 { f64::NAN } else { (i + 1) as f64 * xi };
            }
            Ok(())
        });
        let mut state = CgState::start(&a, &(), &vec![1.0; 3], vec![0.0; 3], Convergence::new(1e-10, 10)).unwrap();
        assert_eq!(state.step(&a, &()).unwrap(), StepOutcome::Continue);
        match state.step(&a, &()) {
            Err(KError::NumericalBreakdown { iteration, quantity, value }) => {
                assert_eq!(iteration, 1);
                assert_eq!(quantity, "p^T A p");
                assert!(value.is_nan());
            }
            other => panic!("expected breakdown, got {other:?}"),
        }
    }

    #[test]
    fn overflowing_step_length_is_a_breakdown() {
        let tiny = ShellOperator::new(|x: &Vec<f64>, y: &mut Vec<f64>| {
            for (yi, xi) in y.iter_mut().zip(x) {
                *yi = xi * 1e-320;
            }
            Ok(())
        });
        let mut state = CgState::start(&tiny, &(), &vec![1.0, 1.0], vec![0.0; 2], Convergence::new(1e-6, 10)).unwrap();
        match state.step(&tiny, &()) {
            Err(KError::NumericalBreakdown { quantity, value, .. }) => {
                assert_eq!(quantity, "alpha");
                assert!(value.is_infinite());
            }
            other => panic!("expected breakdown, got {other:?}"),
        }
    }
}
