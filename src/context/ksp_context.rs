//! Factory for Krylov Subspace Methods (KSP).
//!
//! This module provides the `KspContext` struct, which holds a matrix-free
//! operator, the stopping criteria, monitors and a plugin registry, and
//! solves linear systems with the selected solver host:
//!
//! - `cg`: the bare CG loop ([`cg_solve`]),
//! - `cg-driven`: CG under the [`IterativeDriver`], honouring a user
//!   convergence test,
//! - any other name: a [`KrylovPlugin`](crate::solver::KrylovPlugin) looked up in the registry (`mfcg` is
//!   always available).
//!
//! # Usage
//!
//! 1. Construct a `KspContext` directly or from [`KspOptions`].
//! 2. Call `solve_context` with the inner-product space, `b` and the initial guess.
//!
//! # References
//! - Saad, Y. (2003). Iterative Methods for Sparse Linear Systems. SIAM.
//! - PETSc documentation: https://petsc.org/release/manualpages/KSP/

use num_traits::Float;

use crate::config::options::KspOptions;
use crate::core::traits::{LinearOperator, VectorOps, VectorSpace};
use crate::error::KError;
use crate::solver::cg::cg_solve;
use crate::solver::driver::{CgMethod, ConvergenceTest, IterativeDriver};
use crate::solver::plugin::{PluginContext, PluginRegistry};
use crate::utils::convergence::{ConvergedReason, Convergence, SolveStats};
use crate::utils::monitor::{ConvergenceEvent, ConvergenceMonitor, LogMonitor, MonitorSet};

/// Which host runs the CG iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverKind {
    /// Bare loop
    Cg,
    /// Generic iterative driver with pluggable convergence test
    DrivenCg,
    /// Registered solver plugin, by name
    Plugin(String),
}

impl SolverKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "cg" => SolverKind::Cg,
            "cg-driven" => SolverKind::DrivenCg,
            other => SolverKind::Plugin(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SolverKind::Cg => "cg",
            SolverKind::DrivenCg => "cg-driven",
            SolverKind::Plugin(name) => name,
        }
    }
}

/// Context and configuration for a Krylov subspace solve.
pub struct KspContext<'a, A, V, T> {
    /// The solver host to use
    pub kind: SolverKind,
    /// The operator (only its action is ever used)
    pub a: A,
    /// Stopping criteria
    pub conv: Convergence<T>,
    /// Plugins available to `SolverKind::Plugin`
    pub registry: PluginRegistry<V, T>,
    monitors: MonitorSet<'a, T>,
    test: Option<ConvergenceTest<'a, T>>,
}

impl<'a, A, V, T> KspContext<'a, A, V, T>
where
    A: LinearOperator<V>,
    V: VectorOps<T> + 'static,
    T: Float + 'static,
{
    pub fn new(kind: SolverKind, a: A, conv: Convergence<T>) -> Self {
        Self { kind, a, conv, registry: PluginRegistry::new(), monitors: MonitorSet::new(), test: None }
    }

    /// Build a context from parsed options; `-ksp_monitor` adds a [`LogMonitor`].
    pub fn from_options(opts: &KspOptions, a: A) -> Result<Self, KError> {
        opts.validate()?;
        let mut ctx = Self::new(SolverKind::from_name(&opts.ksp_type), a, opts.convergence()?);
        if opts.monitor {
            ctx.add_monitor(LogMonitor);
        }
        Ok(ctx)
    }

    pub fn add_monitor(&mut self, monitor: impl ConvergenceMonitor<T> + 'a) {
        self.monitors.push(monitor);
    }

    /// Custom convergence test; only the `cg-driven` host consults it.
    pub fn set_convergence_test<F>(&mut self, test: F)
    where
        F: FnMut(&ConvergenceEvent<T>) -> ConvergedReason + 'a,
    {
        self.test = Some(Box::new(test));
    }

    /// Solve `A x = b` with the configured host, using `x` as the initial guess.
    ///
    /// # Returns
    /// * `Ok(SolveStats)` when the loop ends, converged or not
    /// * `Err(KError)` on breakdown, dimension mismatch or an unknown plugin
    pub fn solve_context<S>(&mut self, space: &S, b: &V, x: &mut V) -> Result<SolveStats<T>, KError>
    where
        S: VectorSpace<V, T>,
    {
        tracing::debug!(ksp_type = self.kind.name(), max_it = self.conv.max_iters, "KSP solve");
        match &self.kind {
            SolverKind::Cg => cg_solve(&self.a, space, b, x, &self.conv, &mut self.monitors),
            SolverKind::DrivenCg => {
                let monitors = &mut self.monitors;
                let mut driver = IterativeDriver::new(self.conv.clone());
                driver.add_monitor(|e: &ConvergenceEvent<T>| monitors.on_iteration(e));
                if let Some(test) = self.test.as_mut() {
                    driver = driver.with_convergence_test(|e: &ConvergenceEvent<T>| test(e));
                }
                driver.solve(&mut CgMethod::<V, T>::new(), &self.a, space, b, x)
            }
            SolverKind::Plugin(name) => {
                let mut plugin = self.registry.create(name)?;
                plugin.solve(PluginContext {
                    operator: &self.a,
                    space,
                    b,
                    x,
                    conv: &self.conv,
                    monitor: &mut self.monitors,
                })
            }
        }
    }
}
