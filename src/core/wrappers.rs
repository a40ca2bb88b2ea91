//! Implementations of the core traits for `Vec<T>` and faer dense matrices.
//!
//! `Vec<T>` is the serial vector type: its inner product is provided by `()`
//! and ghost updates are no-ops. Dense `faer::Mat` / `faer::MatRef` act as
//! explicit operators, mostly useful as references for matrix-free actions.
//!
//! With the `rayon` feature enabled, dot products are reduced over fixed-size
//! chunks and summed in chunk order, so results do not depend on how the
//! thread pool schedules work.
//!
//! # References
//! - [faer crate documentation](https://docs.rs/faer)
//! - [num-traits crate documentation](https://docs.rs/num-traits)

use crate::core::traits::{GhostUpdate, InnerProduct, LinearOperator, LocalStorage, VectorOps};
use crate::error::KError;
use faer::{Mat, MatRef};
use num_traits::Float;

/// Chunk length of the deterministic parallel reduction.
#[cfg(feature = "rayon")]
const REDUCE_CHUNK: usize = 4096;

fn dense_apply<T: Float>(a: MatRef<'_, T>, x: &[T], y: &mut [T]) -> Result<(), KError> {
    if a.ncols() != x.len() {
        return Err(KError::mismatch("operator input", a.ncols(), x.len()));
    }
    if a.nrows() != y.len() {
        return Err(KError::mismatch("operator output", a.nrows(), y.len()));
    }
    for (i, yi) in y.iter_mut().enumerate() {
        let mut acc = T::zero();
        for (j, &xj) in x.iter().enumerate() {
            acc = acc + a[(i, j)] * xj;
        }
        *yi = acc;
    }
    Ok(())
}

/// Implements the operator action for `faer::Mat`.
///
/// Computes `y = A * x` where `A` is a dense matrix.
impl<T: Float> LinearOperator<Vec<T>> for Mat<T> {
    fn apply(&self, x: &Vec<T>, y: &mut Vec<T>) -> Result<(), KError> {
        dense_apply(self.as_ref(), x, y)
    }
}

/// Implements the operator action for a matrix reference (`faer::MatRef`).
impl<T: Float> LinearOperator<Vec<T>> for MatRef<'_, T> {
    fn apply(&self, x: &Vec<T>, y: &mut Vec<T>) -> Result<(), KError> {
        dense_apply(*self, x, y)
    }
}

fn local_dot<T: Float>(x: &[T], y: &[T]) -> T {
    x.iter()
        .zip(y.iter())
        .fold(T::zero(), |acc, (&xi, &yi)| acc + xi * yi)
}

/// Dot product over two slices of equal length.
pub(crate) fn slice_dot<T: Float + Send + Sync>(x: &[T], y: &[T]) -> T {
    assert_eq!(x.len(), y.len(), "Vectors must have the same length");
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        if x.len() > REDUCE_CHUNK {
            let partial: Vec<T> = x
                .par_chunks(REDUCE_CHUNK)
                .zip(y.par_chunks(REDUCE_CHUNK))
                .map(|(xc, yc)| local_dot(xc, yc))
                .collect();
            return partial.into_iter().fold(T::zero(), |acc, v| acc + v);
        }
    }
    local_dot(x, y)
}

pub(crate) fn slice_axpy<T: Float + Send + Sync>(y: &mut [T], alpha: T, x: &[T]) {
    assert_eq!(x.len(), y.len(), "Vectors must have the same length");
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        y.par_iter_mut()
            .zip(x.par_iter())
            .for_each(|(yi, &xi)| *yi = *yi + alpha * xi);
    }
    #[cfg(not(feature = "rayon"))]
    {
        for (yi, &xi) in y.iter_mut().zip(x) {
            *yi = *yi + alpha * xi;
        }
    }
}

pub(crate) fn slice_aypx<T: Float + Send + Sync>(y: &mut [T], beta: T, x: &[T]) {
    assert_eq!(x.len(), y.len(), "Vectors must have the same length");
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        y.par_iter_mut()
            .zip(x.par_iter())
            .for_each(|(yi, &xi)| *yi = beta * *yi + xi);
    }
    #[cfg(not(feature = "rayon"))]
    {
        for (yi, &xi) in y.iter_mut().zip(x) {
            *yi = beta * *yi + xi;
        }
    }
}

/// Implements inner product and norm for serial vectors.
impl<T: Float + Send + Sync> InnerProduct<Vec<T>> for () {
    type Scalar = T;
    /// Computes the dot product of two vectors: `x^T y`.
    fn dot(&self, x: &Vec<T>, y: &Vec<T>) -> T {
        slice_dot(x, y)
    }
}

/// Serial vectors have no ghosts.
impl<T> GhostUpdate<Vec<T>> for () {
    fn ghost_update(&self, _v: &mut Vec<T>) -> Result<(), KError> {
        Ok(())
    }
}

impl<T: Float + Send + Sync> VectorOps<T> for Vec<T> {
    fn global_len(&self) -> usize {
        self.len()
    }
    fn axpy(&mut self, alpha: T, x: &Self) {
        slice_axpy(self, alpha, x);
    }
    fn aypx(&mut self, beta: T, x: &Self) {
        slice_aypx(self, beta, x);
    }
    fn copy_from(&mut self, x: &Self) {
        self.copy_from_slice(x);
    }
    fn set_zero(&mut self) {
        self.iter_mut().for_each(|v| *v = T::zero());
    }
}

impl<T> LocalStorage<T> for Vec<T> {
    fn local(&self) -> &[T] {
        self
    }
    fn local_mut(&mut self) -> &mut [T] {
        self
    }
}
