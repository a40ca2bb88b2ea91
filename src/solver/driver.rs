//! Generic iterative-method driver with pluggable convergence tests.
//!
//! [`IterativeDriver`] owns the outer loop: it asks a [`KrylovMethod`] for one
//! iteration at a time, notifies monitors and consults a convergence test
//! between the update of `x, r` and the update of the search direction.
//! Without a user test the driver applies the same squared relative test as
//! [`cg_solve`](crate::solver::cg::cg_solve), so both take the same path.

use num_traits::Float;

use crate::core::traits::{LinearOperator, VectorOps, VectorSpace};
use crate::error::KError;
use crate::solver::state::CgState;
use crate::utils::convergence::{ConvergedReason, Convergence, SolveStats};
use crate::utils::monitor::{ConvergenceEvent, ConvergenceMonitor, MonitorSet};

/// Returns [`ConvergedReason::Iterating`] to keep going; anything else stops.
pub type ConvergenceTest<'a, T> = Box<dyn FnMut(&ConvergenceEvent<T>) -> ConvergedReason + 'a>;

/// One Krylov method, driven iteration by iteration.
pub trait KrylovMethod<V, T> {
    fn name(&self) -> &'static str;

    /// Initialise from `x0`; returns the initial event and, when no iteration
    /// is needed, the reason.
    fn setup(
        &mut self,
        a: &dyn LinearOperator<V>,
        space: &dyn VectorSpace<V, T>,
        b: &V,
        x0: V,
        conv: &Convergence<T>,
    ) -> Result<(ConvergenceEvent<T>, Option<ConvergedReason>), KError>;

    /// Advance the iterate and residual by one step.
    fn iterate(&mut self, a: &dyn LinearOperator<V>, space: &dyn VectorSpace<V, T>) -> Result<ConvergenceEvent<T>, KError>;

    /// Prepare the next search direction; only called when iteration goes on.
    fn prepare_next(&mut self, space: &dyn VectorSpace<V, T>) -> Result<(), KError>;

    fn finish(&mut self, space: &dyn VectorSpace<V, T>, reason: ConvergedReason) -> Result<(V, SolveStats<T>), KError>;
}

/// CG as a [`KrylovMethod`].
#[derive(Debug)]
pub struct CgMethod<V, T> {
    state: Option<CgState<V, T>>,
}

impl<V, T> CgMethod<V, T> {
    pub fn new() -> Self {
        Self { state: None }
    }
}

impl<V, T> Default for CgMethod<V, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: VectorOps<T>, T: Float> CgMethod<V, T> {
    fn state_mut(&mut self) -> Result<&mut CgState<V, T>, KError> {
        self.state.as_mut().ok_or(KError::Unsupported("Krylov method used before setup"))
    }
}

impl<V: VectorOps<T>, T: Float> KrylovMethod<V, T> for CgMethod<V, T> {
    fn name(&self) -> &'static str {
        "cg"
    }

    fn setup(
        &mut self,
        a: &dyn LinearOperator<V>,
        space: &dyn VectorSpace<V, T>,
        b: &V,
        x0: V,
        conv: &Convergence<T>,
    ) -> Result<(ConvergenceEvent<T>, Option<ConvergedReason>), KError> {
        let state = CgState::start(a, space, b, x0, conv.clone())?;
        let out = (state.event(), state.initial_reason());
        self.state = Some(state);
        Ok(out)
    }

    fn iterate(&mut self, a: &dyn LinearOperator<V>, space: &dyn VectorSpace<V, T>) -> Result<ConvergenceEvent<T>, KError> {
        let state = self.state_mut()?;
        state.advance(a, space)?;
        Ok(state.event())
    }

    fn prepare_next(&mut self, space: &dyn VectorSpace<V, T>) -> Result<(), KError> {
        self.state_mut()?.update_direction(space)
    }

    fn finish(&mut self, space: &dyn VectorSpace<V, T>, reason: ConvergedReason) -> Result<(V, SolveStats<T>), KError> {
        let state = self.state.take().ok_or(KError::Unsupported("Krylov method used before setup"))?;
        state.finish(space, reason)
    }
}

pub struct IterativeDriver<'a, T> {
    pub conv: Convergence<T>,
    test: Option<ConvergenceTest<'a, T>>,
    monitors: MonitorSet<'a, T>,
}

impl<'a, T: Float> IterativeDriver<'a, T> {
    pub fn new(conv: Convergence<T>) -> Self {
        Self { conv, test: None, monitors: MonitorSet::new() }
    }

    /// Replace the built-in relative residual test.
    pub fn with_convergence_test<F>(mut self, test: F) -> Self
    where
        F: FnMut(&ConvergenceEvent<T>) -> ConvergedReason + 'a,
    {
        self.test = Some(Box::new(test));
        self
    }

    pub fn add_monitor(&mut self, monitor: impl ConvergenceMonitor<T> + 'a) {
        self.monitors.push(monitor);
    }

    /// The built-in test: squared relative residual against `rtol^2`, then the
    /// iteration cap.
    pub fn default_test(&self, event: &ConvergenceEvent<T>) -> ConvergedReason {
        self.conv.check(event.r_norm2, event.r0_norm2, event.iteration).1
    }

    fn test(&mut self, event: &ConvergenceEvent<T>) -> ConvergedReason {
        match self.test.as_mut() {
            Some(test) => test(event),
            None => self.default_test(event),
        }
    }

    /// Run `method` on `A x = b`, starting from `x`.
    ///
    /// The iteration cap applies with or without a user test. `x` receives the
    /// last iterate unless an error is returned.
    pub fn solve<V>(
        &mut self,
        method: &mut dyn KrylovMethod<V, T>,
        a: &dyn LinearOperator<V>,
        space: &dyn VectorSpace<V, T>,
        b: &V,
        x: &mut V,
    ) -> Result<SolveStats<T>, KError>
    where
        V: VectorOps<T>,
    {
        tracing::trace!(method = method.name(), max_iters = self.conv.max_iters, "driver solve");
        let (mut event, initial) = method.setup(a, space, b, x.clone(), &self.conv)?;
        self.monitors.on_iteration(&event);

        let reason = match initial {
            Some(reason) => reason,
            None => loop {
                if event.iteration >= self.conv.max_iters {
                    break ConvergedReason::DivergedIts;
                }
                event = method.iterate(a, space)?;
                self.monitors.on_iteration(&event);
                match self.test(&event) {
                    ConvergedReason::Iterating => method.prepare_next(space)?,
                    reason => break reason,
                }
            },
        };

        let (solution, stats) = method.finish(space, reason)?;
        *x = solution;
        Ok(stats)
    }
}
