//! Conjugate Gradient core and the hosts that drive it.

use crate::utils::convergence::SolveStats;

/// Common interface for a configured solver.
pub trait LinearSolver<A: ?Sized, V> {
    type Scalar;
    type Error;
    /// Solve A·x = b, writing the result into `x`.
    /// Returns iteration stats (including convergence info).
    fn solve(&mut self, a: &A, b: &V, x: &mut V) -> Result<SolveStats<Self::Scalar>, Self::Error>;
}

pub mod state;
pub use state::{CgState, StepOutcome};

pub mod cg;
pub use cg::{CgSolver, cg_solve};

pub mod driver;
pub use driver::{CgMethod, ConvergenceTest, IterativeDriver, KrylovMethod};

pub mod plugin;
pub use plugin::{KrylovPlugin, MatrixFreeCgPlugin, PluginContext, PluginFactory, PluginRegistry};
