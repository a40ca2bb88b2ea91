//! Solver plugins selectable by name.
//!
//! A [`KrylovPlugin`] is a fully custom solver: it receives the operator,
//! the inner-product space, the right-hand side and the initial guess in a
//! [`PluginContext`] and runs its own loop. [`PluginRegistry`] maps names to
//! factories so that a [`KspContext`](crate::context::KspContext) can pick a
//! plugin from an options string.

use std::collections::HashMap;
use std::fmt;

use num_traits::Float;

use crate::core::traits::{LinearOperator, VectorOps, VectorSpace};
use crate::error::KError;
use crate::solver::state::{CgState, StepOutcome};
use crate::utils::convergence::{ConvergedReason, Convergence, SolveStats};
use crate::utils::monitor::ConvergenceMonitor;

/// Everything a plugin needs for one solve.
pub struct PluginContext<'c, V, T> {
    pub operator: &'c dyn LinearOperator<V>,
    pub space: &'c dyn VectorSpace<V, T>,
    pub b: &'c V,
    /// Initial guess on entry, solution on successful return.
    pub x: &'c mut V,
    pub conv: &'c Convergence<T>,
    pub monitor: &'c mut dyn ConvergenceMonitor<T>,
}

pub trait KrylovPlugin<V, T> {
    fn name(&self) -> &str;

    fn solve(&mut self, ctx: PluginContext<'_, V, T>) -> Result<SolveStats<T>, KError>;
}

pub type PluginFactory<V, T> = fn() -> Box<dyn KrylovPlugin<V, T>>;

pub struct PluginRegistry<V, T> {
    factories: HashMap<String, PluginFactory<V, T>>,
}

impl<V, T> PluginRegistry<V, T> {
    /// A registry with no plugins.
    pub fn empty() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Register `factory` under `name`, returning the factory it replaces.
    pub fn register(&mut self, name: impl Into<String>, factory: PluginFactory<V, T>) -> Option<PluginFactory<V, T>> {
        self.factories.insert(name.into(), factory)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn KrylovPlugin<V, T>>, KError> {
        self.factories.get(name).map(|f| f()).ok_or_else(|| KError::UnknownSolver(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<V, T> PluginRegistry<V, T>
where
    V: VectorOps<T> + 'static,
    T: Float + 'static,
{
    /// A registry holding the built-in plugins (`"mfcg"`).
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(MatrixFreeCgPlugin::NAME, MatrixFreeCgPlugin::factory);
        registry
    }
}

impl<V, T> Default for PluginRegistry<V, T>
where
    V: VectorOps<T> + 'static,
    T: Float + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, T> fmt::Debug for PluginRegistry<V, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry").field("plugins", &self.names()).finish()
    }
}

/// Matrix-free CG as a plugin; drives [`CgState`] with its own loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct MatrixFreeCgPlugin;

impl MatrixFreeCgPlugin {
    pub const NAME: &'static str = "mfcg";

    pub fn factory<V, T>() -> Box<dyn KrylovPlugin<V, T>>
    where
        V: VectorOps<T> + 'static,
        T: Float + 'static,
    {
        Box::new(MatrixFreeCgPlugin)
    }
}

impl<V, T> KrylovPlugin<V, T> for MatrixFreeCgPlugin
where
    V: VectorOps<T>,
    T: Float,
{
    fn name(&self) -> &str {
        Self::NAME
    }

    fn solve(&mut self, ctx: PluginContext<'_, V, T>) -> Result<SolveStats<T>, KError> {
        let PluginContext { operator, space, b, x, conv, monitor } = ctx;
        let mut state = CgState::start(operator, space, b, x.clone(), conv.clone())?;
        monitor.on_iteration(&state.event());

        let mut reason = state.initial_reason().unwrap_or(ConvergedReason::Iterating);
        while reason == ConvergedReason::Iterating {
            if state.iteration() >= conv.max_iters {
                reason = ConvergedReason::DivergedIts;
                break;
            }
            if state.step(operator, space)? == StepOutcome::Converged {
                reason = ConvergedReason::ConvergedRtol;
            }
            monitor.on_iteration(&state.event());
        }

        let (solution, stats) = state.finish(space, reason)?;
        *x = solution;
        Ok(stats)
    }
}
