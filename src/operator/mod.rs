//! Operator actions: closure shells, boundary-constrained wrappers and a
//! structured-grid Poisson operator.

use std::fmt;

use crate::core::traits::LinearOperator;
use crate::error::KError;

pub mod constraint;
pub mod laplacian;

pub use constraint::{BoundaryConstraint, ConstrainedOperator};
pub use laplacian::{Laplacian2d, StripLaplacian2d};

/// An operator defined only by a closure computing `y = A x`.
///
/// The closure must overwrite every entry of `y` it is responsible for.
pub struct ShellOperator<F> {
    action: F,
}

impl<F> ShellOperator<F> {
    pub fn new(action: F) -> Self {
        Self { action }
    }
}

impl<F> fmt::Debug for ShellOperator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShellOperator")
    }
}

impl<V, F> LinearOperator<V> for ShellOperator<F>
where
    F: Fn(&V, &mut V) -> Result<(), KError>,
{
    fn apply(&self, x: &V, y: &mut V) -> Result<(), KError> {
        (self.action)(x, y)
    }
}
