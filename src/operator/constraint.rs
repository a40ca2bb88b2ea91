//! Dirichlet-type boundary constraints and right-hand-side lifting.
//!
//! A [`BoundaryConstraint`] fixes the values of a set of entries. Solving the
//! constrained system works on the free entries only:
//!
//! 1. the initial guess carries the prescribed values ([`BoundaryConstraint::apply_values`]),
//! 2. the right-hand side is lifted, `b - A x_bc`, with constrained rows zeroed
//!    ([`BoundaryConstraint::lift`]),
//! 3. the operator is wrapped in a [`ConstrainedOperator`], which ignores
//!    constrained input entries and zeroes constrained output rows.
//!
//! The wrapped operator is symmetric whenever the inner one is, and positive
//! definite on the free entries, so CG never touches the prescribed values.

use num_traits::Float;

use crate::core::traits::{LinearOperator, LocalStorage, VectorOps};
use crate::error::KError;
use crate::parallel::GhostLayout;

/// Constrained entries (indices into local storage) and their values.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryConstraint<T> {
    dofs: Vec<usize>,
    values: Vec<T>,
}

impl<T: Float> BoundaryConstraint<T> {
    /// Pairs are sorted by index; for a repeated index the first value wins.
    pub fn new(dofs: Vec<usize>, values: Vec<T>) -> Result<Self, KError> {
        if dofs.len() != values.len() {
            return Err(KError::mismatch("constraint values", dofs.len(), values.len()));
        }
        let mut pairs: Vec<(usize, T)> = dofs.into_iter().zip(values).collect();
        pairs.sort_by_key(|&(d, _)| d);
        pairs.dedup_by_key(|&mut (d, _)| d);
        let (dofs, values) = pairs.into_iter().unzip();
        Ok(Self { dofs, values })
    }

    /// `dofs` must already be sorted and unique.
    pub(crate) fn from_sorted(dofs: Vec<usize>, values: Vec<T>) -> Self {
        debug_assert!(dofs.windows(2).all(|w| w[0] < w[1]));
        debug_assert_eq!(dofs.len(), values.len());
        Self { dofs, values }
    }

    /// All values zero.
    pub fn homogeneous(mut dofs: Vec<usize>) -> Self {
        dofs.sort_unstable();
        dofs.dedup();
        let values = vec![T::zero(); dofs.len()];
        Self { dofs, values }
    }

    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.dofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dofs.is_empty()
    }

    pub fn contains(&self, dof: usize) -> bool {
        self.dofs.binary_search(&dof).is_ok()
    }

    /// Reindex a constraint given in global indices to one rank's local
    /// storage, keeping the entries that rank owns or holds as ghosts.
    pub fn restrict_to(&self, layout: &GhostLayout) -> Self {
        let mut pairs: Vec<(usize, T)> = self
            .dofs
            .iter()
            .zip(&self.values)
            .filter_map(|(&g, &v)| layout.local_index(g).map(|l| (l, v)))
            .collect();
        pairs.sort_by_key(|&(d, _)| d);
        let (dofs, values) = pairs.into_iter().unzip();
        Self { dofs, values }
    }

    fn check_bounds(&self, len: usize) -> Result<(), KError> {
        match self.dofs.last() {
            Some(&last) if last >= len => Err(KError::mismatch("constrained index bound", len, last)),
            _ => Ok(()),
        }
    }

    /// Write the prescribed values into the constrained entries of `x`.
    pub fn apply_values<V: LocalStorage<T>>(&self, x: &mut V) -> Result<(), KError> {
        let x = x.local_mut();
        self.check_bounds(x.len())?;
        for (&d, &v) in self.dofs.iter().zip(&self.values) {
            x[d] = v;
        }
        Ok(())
    }

    /// Zero the constrained entries of `y`.
    pub fn zero_entries<V: LocalStorage<T>>(&self, y: &mut V) -> Result<(), KError> {
        let y = y.local_mut();
        self.check_bounds(y.len())?;
        for &d in &self.dofs {
            y[d] = T::zero();
        }
        Ok(())
    }

    /// Lifted right-hand side `b - A x_bc` with constrained rows zeroed,
    /// where `x_bc` holds the prescribed values and zero elsewhere.
    ///
    /// `a` is the unconstrained operator.
    pub fn lift<V, A>(&self, a: &A, b: &V) -> Result<V, KError>
    where
        V: VectorOps<T> + LocalStorage<T>,
        A: LinearOperator<V> + ?Sized,
    {
        let mut x_bc = b.clone();
        x_bc.set_zero();
        self.apply_values(&mut x_bc)?;
        let mut a_x_bc = b.clone();
        a.apply(&x_bc, &mut a_x_bc)?;
        let mut lifted = b.clone();
        lifted.axpy(-T::one(), &a_x_bc);
        self.zero_entries(&mut lifted)?;
        Ok(lifted)
    }
}

/// `y = P A P x`, where `P` zeroes the constrained entries.
pub struct ConstrainedOperator<A, T> {
    inner: A,
    constraint: BoundaryConstraint<T>,
}

impl<A, T: Float> ConstrainedOperator<A, T> {
    pub fn new(inner: A, constraint: BoundaryConstraint<T>) -> Self {
        Self { inner, constraint }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn constraint(&self) -> &BoundaryConstraint<T> {
        &self.constraint
    }
}

impl<A, V, T> LinearOperator<V> for ConstrainedOperator<A, T>
where
    A: LinearOperator<V>,
    V: LocalStorage<T> + Clone,
    T: Float,
{
    fn apply(&self, x: &V, y: &mut V) -> Result<(), KError> {
        let mut free = x.clone();
        self.constraint.zero_entries(&mut free)?;
        self.inner.apply(&free, y)?;
        self.constraint.zero_entries(y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    fn tridiag(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| {
            if i == j {
                2.0
            } else if i.abs_diff(j) == 1 {
                -1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn new_sorts_and_keeps_first_duplicate() {
        let bc = BoundaryConstraint::new(vec![4, 0, 4], vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(bc.dofs(), &[0, 4]);
        assert_eq!(bc.values(), &[2.0, 1.0]);
        assert!(bc.contains(4));
        assert!(!bc.contains(1));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let bc = BoundaryConstraint::new(vec![5], vec![1.0]).unwrap();
        let mut x = vec![0.0; 3];
        assert!(matches!(bc.apply_values(&mut x), Err(KError::DimensionMismatch { .. })));
    }

    #[test]
    fn lift_moves_boundary_values_to_rhs() {
        let a = tridiag(4);
        let bc = BoundaryConstraint::new(vec![0, 3], vec![1.0, 2.0]).unwrap();
        let b = vec![0.0; 4];
        let lifted = bc.lift(&a, &b).unwrap();
        // Rows 1 and 2 see -(-1 * 1.0) and -(-1 * 2.0).
        assert_eq!(lifted, vec![0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn constrained_operator_ignores_constrained_inputs() {
        let a = ConstrainedOperator::new(tridiag(3), BoundaryConstraint::homogeneous(vec![0]));
        let mut y = vec![0.0; 3];
        a.apply(&vec![100.0, 1.0, 1.0], &mut y).unwrap();
        assert_eq!(y, vec![0.0, 1.0, 1.0]);
    }
}
