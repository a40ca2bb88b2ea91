//! Convergence tracking & tolerance checks for iterative solvers.

use num_traits::Float;

use crate::error::KError;

/// Stopping criteria.
#[derive(Clone, Debug, PartialEq)]
pub struct Convergence<T> {
    /// Relative residual tolerance.
    pub rtol: T,
    pub max_iters: usize,
    /// Curvatures `|p^T A p|` at or below this are a breakdown.
    pub breakdown_tol: T,
}

impl<T: Float> Convergence<T> {
    pub fn new(rtol: T, max_iters: usize) -> Self {
        Self { rtol, max_iters, breakdown_tol: T::zero() }
    }

    pub fn with_breakdown_tol(mut self, breakdown_tol: T) -> Self {
        self.breakdown_tol = breakdown_tol;
        self
    }

    /// `rtol^2`, the threshold for squared residual ratios.
    pub fn rtol2(&self) -> T {
        self.rtol * self.rtol
    }

    /// `r_norm2 / r0_norm2 < rtol^2`, compared without square roots.
    ///
    /// An exactly zero residual always counts, so `rtol = 0` still stops on
    /// an exact solution.
    pub fn is_converged(&self, r_norm2: T, r0_norm2: T) -> bool {
        r_norm2 == T::zero() || r_norm2 / r0_norm2 < self.rtol2()
    }

    /// Returns (should_stop, reason) given the squared residual norms after iteration `i`.
    pub fn check(&self, r_norm2: T, r0_norm2: T, i: usize) -> (bool, ConvergedReason) {
        if self.is_converged(r_norm2, r0_norm2) {
            (true, ConvergedReason::ConvergedRtol)
        } else if i >= self.max_iters {
            (true, ConvergedReason::DivergedIts)
        } else {
            (false, ConvergedReason::Iterating)
        }
    }
}

/// Default relative tolerance, the same for every scalar type and for
/// [`KspOptions`](crate::config::KspOptions).
pub const DEFAULT_RTOL: f64 = 1e-6;
/// Default iteration cap.
pub const DEFAULT_MAX_ITERS: usize = 200;

impl<T: Float> Default for Convergence<T> {
    fn default() -> Self {
        Self::new(T::from(DEFAULT_RTOL).unwrap_or_else(T::epsilon), DEFAULT_MAX_ITERS)
    }
}

/// Why an iteration stopped (or that it has not).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergedReason {
    Iterating,
    /// The initial guess already satisfied the tolerance.
    ConvergedInitial,
    /// `r_norm2 / r0_norm2 < rtol^2`.
    ConvergedRtol,
    /// A user-supplied convergence test accepted the iterate.
    ConvergedUser,
    /// The iteration cap was reached.
    DivergedIts,
    /// A user-supplied convergence test rejected the iteration.
    DivergedUser,
}

impl ConvergedReason {
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            ConvergedReason::ConvergedInitial | ConvergedReason::ConvergedRtol | ConvergedReason::ConvergedUser
        )
    }
}

#[derive(Clone, Debug)]
pub struct SolveStats<T> {
    pub iterations: usize,
    /// `||r||` at termination.
    pub final_residual: T,
    /// `||r_0||`.
    pub initial_residual: T,
    pub converged: bool,
    pub reason: ConvergedReason,
}

impl<T: Float> SolveStats<T> {
    pub fn new(iterations: usize, r_norm2: T, r0_norm2: T, reason: ConvergedReason) -> Self {
        SolveStats {
            iterations,
            final_residual: r_norm2.sqrt(),
            initial_residual: r0_norm2.sqrt(),
            converged: reason.is_converged(),
            reason,
        }
    }

    /// Turn a non-converged result into `KError::NonConvergence`.
    pub fn into_result(self) -> Result<Self, KError> {
        if self.converged {
            Ok(self)
        } else {
            Err(KError::NonConvergence {
                iterations: self.iterations,
                residual: self.final_residual.to_f64().unwrap_or(f64::NAN),
            })
        }
    }
}
