//! Conjugate Gradient (unpreconditioned) per Saad §6.7.
//!
//! [`cg_solve`] is the bare loop over [`CgState`]; [`CgSolver`] wraps it with
//! the [`LinearSolver`] interface, a residual history and an optional
//! per-iteration callback.

use num_traits::Float;

use crate::core::traits::{LinearOperator, VectorOps, VectorSpace};
use crate::error::KError;
use crate::solver::LinearSolver;
use crate::solver::state::{CgState, StepOutcome};
use crate::utils::convergence::{ConvergedReason, Convergence, SolveStats};
use crate::utils::monitor::{ConvergenceEvent, ConvergenceMonitor};

/// Solve `A x = b` for symmetric positive definite `A`, starting from `x`.
///
/// `x` is overwritten with the last iterate when the loop ends, converged or
/// not (check [`SolveStats::converged`]). On error `x` keeps its input value.
/// The monitor sees the initial residual and every iteration after it.
pub fn cg_solve<A, S, V, T>(
    a: &A,
    space: &S,
    b: &V,
    x: &mut V,
    conv: &Convergence<T>,
    monitor: &mut dyn ConvergenceMonitor<T>,
) -> Result<SolveStats<T>, KError>
where
    A: LinearOperator<V> + ?Sized,
    S: VectorSpace<V, T> + ?Sized,
    V: VectorOps<T>,
    T: Float,
{
    let mut state = CgState::start(a, space, b, x.clone(), conv.clone())?;
    monitor.on_iteration(&state.event());

    let reason = match state.initial_reason() {
        Some(reason) => reason,
        None => loop {
            if state.iteration() >= conv.max_iters {
                break ConvergedReason::DivergedIts;
            }
            let outcome = state.step(a, space)?;
            monitor.on_iteration(&state.event());
            if outcome == StepOutcome::Converged {
                break ConvergedReason::ConvergedRtol;
            }
        },
    };

    let (solution, stats) = state.finish(space, reason)?;
    *x = solution;
    Ok(stats)
}

/// Reusable CG solver over the inner-product space `S`.
///
/// `S = ()` is plain `Vec<T>` arithmetic; use a
/// [`DistributedInnerProduct`](crate::parallel::DistributedInnerProduct) for
/// [`DistVector`](crate::parallel::DistVector)s.
pub struct CgSolver<S, T> {
    pub conv: Convergence<T>,
    space: S,
    /// Called with `(iteration, ||r||)`.
    pub monitor: Option<Box<dyn FnMut(usize, T)>>,
    /// `||r||` of the last solve, initial residual first.
    pub residual_history: Vec<T>,
}

impl<T: Float> CgSolver<(), T> {
    pub fn new(rtol: T, max_iters: usize) -> Self {
        Self::with_space((), Convergence::new(rtol, max_iters))
    }
}

impl<S, T: Float> CgSolver<S, T> {
    pub fn with_space(space: S, conv: Convergence<T>) -> Self {
        Self { conv, space, monitor: None, residual_history: Vec::new() }
    }

    pub fn with_breakdown_tol(mut self, breakdown_tol: T) -> Self {
        self.conv.breakdown_tol = breakdown_tol;
        self
    }

    pub fn with_monitor<F>(mut self, f: F) -> Self
    where
        F: FnMut(usize, T) + 'static,
    {
        self.monitor = Some(Box::new(f));
        self
    }

    pub fn space(&self) -> &S {
        &self.space
    }

    pub fn clear_history(&mut self) {
        self.residual_history.clear();
    }
}

impl<A, S, V, T> LinearSolver<A, V> for CgSolver<S, T>
where
    A: LinearOperator<V> + ?Sized,
    S: VectorSpace<V, T>,
    V: VectorOps<T>,
    T: Float,
{
    type Scalar = T;
    type Error = KError;

    fn solve(&mut self, a: &A, b: &V, x: &mut V) -> Result<SolveStats<T>, KError> {
        let Self { conv, space, monitor, residual_history } = self;
        residual_history.clear();
        let mut record = |e: &ConvergenceEvent<T>| {
            let norm = e.residual_norm();
            residual_history.push(norm);
            if let Some(m) = monitor.as_mut() {
                m(e.iteration, norm);
            }
        };
        cg_solve(a, &*space, b, x, conv, &mut record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::monitor::NoMonitor;
    use faer::Mat;

    fn dense(rows: &[&[f64]]) -> Mat<f64> {
        Mat::from_fn(rows.len(), rows.len(), |i, j| rows[i][j])
    }

    fn tridiag(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| match i.abs_diff(j) {
            0 => 2.0,
            1 => -1.0,
            _ => 0.0,
        })
    }

    #[test]
    fn cg_solves_simple_spd() {
        // [[4,1],[1,3]] x = [1,2]
        let a = dense(&[&[4.0, 1.0], &[1.0, 3.0]]);
        let b = vec![1.0, 2.0];
        let mut x = vec![0.0, 0.0];
        let mut solver = CgSolver::new(1e-10, 20);
        let stats = solver.solve(&a, &b, &mut x).unwrap();
        let expected = [1.0 / 11.0, 7.0 / 11.0];
        for (xi, ei) in x.iter().zip(expected.iter()) {
            assert!((xi - ei).abs() < 1e-8, "xi = {}, expected = {}", xi, ei);
        }
        assert!(stats.converged, "CG did not converge");
        assert_eq!(stats.reason, ConvergedReason::ConvergedRtol);
        assert_eq!(solver.residual_history.len(), stats.iterations + 1);
    }

    #[test]
    fn cg_solves_spd() {
        // x_true = [1,2,3], b = A x_true = [6,10,8]
        let a = dense(&[&[4.0, 1.0, 0.0], &[1.0, 3.0, 1.0], &[0.0, 1.0, 2.0]]);
        let b = vec![6.0, 10.0, 8.0];
        let mut x = vec![0.0; 3];
        let stats = cg_solve(&a, &(), &b, &mut x, &Convergence::new(1e-10, 100), &mut NoMonitor).unwrap();
        assert!(stats.converged, "CG did not converge");
        assert!(stats.iterations <= 3 + 1);
        for (xi, ei) in x.iter().zip([1.0, 2.0, 3.0]) {
            assert!((xi - ei).abs() < 1e-8, "xi = {}, expected = {}", xi, ei);
        }
    }

    #[test]
    fn iteration_cap_is_reported_not_raised() {
        let a = tridiag(50);
        let b = vec![1.0; 50];
        let mut x = vec![0.0; 50];
        let stats = cg_solve(&a, &(), &b, &mut x, &Convergence::new(1e-12, 3), &mut NoMonitor).unwrap();
        assert!(!stats.converged);
        assert_eq!(stats.reason, ConvergedReason::DivergedIts);
        assert_eq!(stats.iterations, 3);
        assert!(x.iter().any(|&v| v != 0.0));
        assert!(matches!(stats.into_result(), Err(KError::NonConvergence { iterations: 3, .. })));
    }

    #[test]
    fn failed_solve_leaves_x_untouched() {
        let a = dense(&[&[1.0, 0.0], &[0.0, -1.0]]);
        let b = vec![0.0, 1.0];
        let mut x = vec![0.5, 0.5];
        let err = cg_solve(&a, &(), &b, &mut x, &Convergence::new(1e-8, 10), &mut NoMonitor).unwrap_err();
        assert!(matches!(err, KError::IndefiniteOperator { .. }));
        assert_eq!(x, vec![0.5, 0.5]);
    }

    #[test]
    fn monitor_receives_iteration_and_norm() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut solver = CgSolver::new(1e-10, 20).with_monitor(move |k, r| sink.borrow_mut().push((k, r)));
        let a = tridiag(4);
        let mut x = vec![0.0; 4];
        let stats = solver.solve(&a, &vec![1.0; 4], &mut x).unwrap();
        let seen = seen.borrow();
        assert_eq!(seen.len(), stats.iterations + 1);
        assert_eq!(seen[0], (0, 2.0));
        assert_eq!(seen.iter().map(|&(_, r)| r).collect::<Vec<_>>(), solver.residual_history);
    }
}
