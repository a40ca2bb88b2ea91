//! Core linear-algebra traits for matfree-cg.

use num_traits::Float;

use crate::error::KError;

/// Action of a linear operator: y ← A x.
///
/// The operator is never required to exist as a matrix; implementors only
/// have to be able to evaluate its action on a vector.
pub trait LinearOperator<V> {
    /// Compute y = A · x, overwriting `y`.
    fn apply(&self, x: &V, y: &mut V) -> Result<(), KError>;
}

impl<V, A> LinearOperator<V> for &A
where
    A: ?Sized + LinearOperator<V>,
{
    fn apply(&self, x: &V, y: &mut V) -> Result<(), KError> {
        <A as LinearOperator<V>>::apply(self, x, y)
    }
}

impl<V, A> LinearOperator<V> for Box<A>
where
    A: ?Sized + LinearOperator<V>,
{
    fn apply(&self, x: &V, y: &mut V) -> Result<(), KError> {
        <A as LinearOperator<V>>::apply(self, x, y)
    }
}

/// Inner products & norms.
///
/// For distributed vectors both operations are collective: every rank must
/// call them in the same order.
pub trait InnerProduct<V> {
    /// Associated scalar type.
    type Scalar: Float;
    /// Compute dot(x, y) over owned entries.
    fn dot(&self, x: &V, y: &V) -> Self::Scalar;
    /// Compute ‖x‖₂.
    fn norm(&self, x: &V) -> Self::Scalar {
        self.dot(x, x).sqrt()
    }
}

/// Refresh of ghost (halo) entries from their owning ranks.
pub trait GhostUpdate<V> {
    /// Overwrite the ghost entries of `v` with the owners' current values.
    fn ghost_update(&self, v: &mut V) -> Result<(), KError>;
}

/// Elementwise vector primitives used by the Krylov kernels.
///
/// All operations act on locally owned entries only; ghosts are left stale
/// until the next [`GhostUpdate::ghost_update`].
pub trait VectorOps<T>: Clone {
    /// Global length of the vector.
    fn global_len(&self) -> usize;
    /// Whether `other` has the same length and distribution layout.
    fn compatible(&self, other: &Self) -> bool {
        self.global_len() == other.global_len()
    }
    /// self ← self + alpha · x
    fn axpy(&mut self, alpha: T, x: &Self);
    /// self ← beta · self + x
    fn aypx(&mut self, beta: T, x: &Self);
    /// self ← x
    fn copy_from(&mut self, x: &Self);
    /// self ← 0
    fn set_zero(&mut self);
}

/// Raw access to the locally stored entries (owned entries, then ghosts).
pub trait LocalStorage<T> {
    fn local(&self) -> &[T];
    fn local_mut(&mut self) -> &mut [T];
}

/// Inner product plus ghost exchange: everything a Krylov kernel needs from
/// the environment besides the operator. Usable as a trait object.
pub trait VectorSpace<V, T>: InnerProduct<V, Scalar = T> + GhostUpdate<V> {}

impl<V, T, S> VectorSpace<V, T> for S where S: InnerProduct<V, Scalar = T> + GhostUpdate<V> + ?Sized {}
