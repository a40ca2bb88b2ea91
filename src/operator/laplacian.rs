//! Matrix-free five-point Laplacian on the unit square.
//!
//! The grid has `(n + 1) x (n + 1)` nodes with spacing `h = 1 / n`; node
//! `(i, j)` sits at `(i h, j h)` and has index `j (n + 1) + i`. Interior rows
//! evaluate `(4 u_c - u_w - u_e - u_s - u_n) / h^2`, boundary rows are the
//! identity. Wrapped in a [`ConstrainedOperator`](super::ConstrainedOperator)
//! with [`Laplacian2d::boundary_constraint`], this is the Dirichlet Poisson
//! operator on the interior nodes.
//!
//! The stencil differentiates quadratics exactly, so for a manufactured
//! solution such as `1 + x^2 + 2 y^2` the discrete solution coincides with the
//! nodal interpolant and the only error left is the solver's.
//!
//! [`StripLaplacian2d`] is the same operator with node rows split into
//! contiguous strips, one per rank, each holding the neighbouring node row on
//! either side as ghosts.

use std::ops::Range;
use std::sync::Arc;

use faer::Mat;
use num_traits::Float;

use super::constraint::BoundaryConstraint;
use crate::core::traits::{LinearOperator, LocalStorage, VectorOps};
use crate::error::KError;
use crate::parallel::{Comm, DistVector, GhostLayout};

fn cast<T: Float>(x: f64) -> T {
    T::from(x).unwrap_or_else(T::nan)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Laplacian2d {
    n: usize,
}

impl Laplacian2d {
    /// `n` cells per side; at least one interior node is required.
    pub fn new(n: usize) -> Result<Self, KError> {
        if n < 2 {
            return Err(KError::Unsupported("Laplacian2d needs n >= 2 cells per side"));
        }
        Ok(Self { n })
    }

    pub fn cells(&self) -> usize {
        self.n
    }

    /// Nodes per side.
    pub fn side(&self) -> usize {
        self.n + 1
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.side() * self.side()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn h(&self) -> f64 {
        1.0 / self.n as f64
    }

    pub fn index(&self, i: usize, j: usize) -> usize {
        j * self.side() + i
    }

    pub fn coords(&self, idx: usize) -> (f64, f64) {
        let (i, j) = (idx % self.side(), idx / self.side());
        (i as f64 * self.h(), j as f64 * self.h())
    }

    pub fn is_boundary_node(&self, i: usize, j: usize) -> bool {
        i == 0 || j == 0 || i == self.n || j == self.n
    }

    pub fn is_boundary(&self, idx: usize) -> bool {
        self.is_boundary_node(idx % self.side(), idx / self.side())
    }

    pub fn boundary_dofs(&self) -> Vec<usize> {
        (0..self.len()).filter(|&idx| self.is_boundary(idx)).collect()
    }

    /// Interior node indices in increasing order.
    pub fn free_dofs(&self) -> Vec<usize> {
        (0..self.len()).filter(|&idx| !self.is_boundary(idx)).collect()
    }

    /// Dirichlet data `g` sampled at the boundary nodes.
    pub fn boundary_constraint<T: Float>(&self, g: impl Fn(f64, f64) -> T) -> BoundaryConstraint<T> {
        let dofs = self.boundary_dofs();
        let values = dofs
            .iter()
            .map(|&idx| {
                let (x, y) = self.coords(idx);
                g(x, y)
            })
            .collect();
        BoundaryConstraint::from_sorted(dofs, values)
    }

    /// Nodal interpolant of `u`.
    pub fn interpolate<T: Float>(&self, u: impl Fn(f64, f64) -> T) -> Vec<T> {
        (0..self.len())
            .map(|idx| {
                let (x, y) = self.coords(idx);
                u(x, y)
            })
            .collect()
    }

    /// Load vector: `f` at interior nodes, zero on the boundary.
    pub fn rhs<T: Float>(&self, f: impl Fn(f64, f64) -> T) -> Vec<T> {
        (0..self.len())
            .map(|idx| {
                if self.is_boundary(idx) {
                    T::zero()
                } else {
                    let (x, y) = self.coords(idx);
                    f(x, y)
                }
            })
            .collect()
    }

    /// Grid-weighted discrete L2 norm, `h * ||v||_2`.
    pub fn l2_norm<T: Float>(&self, v: &[T]) -> T {
        let sum = v.iter().fold(T::zero(), |acc, &vi| acc + vi * vi);
        cast::<T>(self.h()) * sum.sqrt()
    }

    /// Dense matrix of the constrained operator restricted to the interior
    /// nodes, with those nodes in the order of [`Laplacian2d::free_dofs`].
    pub fn assemble_free_dense<T: Float>(&self) -> (Mat<T>, Vec<usize>) {
        let free = self.free_dofs();
        let side = self.side();
        let inv_h2 = self.inv_h2::<T>();
        let m = free.len();
        let a = Mat::from_fn(m, m, |r, c| {
            let (ri, rj) = (free[r] % side, free[r] / side);
            let (ci, cj) = (free[c] % side, free[c] / side);
            if r == c {
                cast::<T>(4.0) * inv_h2
            } else if ri.abs_diff(ci) + rj.abs_diff(cj) == 1 {
                -inv_h2
            } else {
                T::zero()
            }
        });
        (a, free)
    }

    /// Row `(i, j)` of the operator, reading neighbours through `get`.
    fn stencil<T: Float>(&self, i: usize, j: usize, inv_h2: T, get: impl Fn(usize, usize) -> T) -> T {
        let c = get(i, j);
        if self.is_boundary_node(i, j) {
            return c;
        }
        let four = cast::<T>(4.0);
        (four * c - get(i - 1, j) - get(i + 1, j) - get(i, j - 1) - get(i, j + 1)) * inv_h2
    }

    fn inv_h2<T: Float>(&self) -> T {
        let n = cast::<T>(self.n as f64);
        n * n
    }
}

impl<T: Float + Send + Sync> LinearOperator<Vec<T>> for Laplacian2d {
    fn apply(&self, x: &Vec<T>, y: &mut Vec<T>) -> Result<(), KError> {
        if x.len() != self.len() {
            return Err(KError::mismatch("operator input", self.len(), x.len()));
        }
        if y.len() != self.len() {
            return Err(KError::mismatch("operator output", self.len(), y.len()));
        }
        let side = self.side();
        let inv_h2 = self.inv_h2::<T>();
        let row = |j: usize, out: &mut [T]| {
            for (i, yi) in out.iter_mut().enumerate() {
                *yi = self.stencil(i, j, inv_h2, |ii, jj| x[jj * side + ii]);
            }
        };
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            y.par_chunks_mut(side).enumerate().for_each(|(j, out)| row(j, out));
        }
        #[cfg(not(feature = "rayon"))]
        {
            y.chunks_mut(side).enumerate().for_each(|(j, out)| row(j, out));
        }
        Ok(())
    }
}

/// [`Laplacian2d`] with node rows distributed over the ranks of a communicator.
#[derive(Debug, Clone)]
pub struct StripLaplacian2d {
    grid: Laplacian2d,
    rows: Range<usize>,
    layout: Arc<GhostLayout>,
}

impl StripLaplacian2d {
    /// Collective: every rank of `comm` must call this with the same `n`.
    pub fn new<C: Comm>(comm: &C, n: usize) -> Result<Self, KError> {
        let grid = Laplacian2d::new(n)?;
        let side = grid.side();
        let (rank, size) = (comm.rank(), comm.size());
        if side < size {
            return Err(KError::Unsupported("more ranks than grid rows"));
        }
        let base = side / size;
        let rem = side % size;
        let start = rank * base + rank.min(rem);
        let rows = start..start + base + usize::from(rank < rem);

        let mut ghosts = Vec::new();
        if rows.start > 0 {
            ghosts.extend((0..side).map(|i| grid.index(i, rows.start - 1)));
        }
        if rows.end < side {
            ghosts.extend((0..side).map(|i| grid.index(i, rows.end)));
        }
        let layout = Arc::new(GhostLayout::new(comm, rows.len() * side, ghosts)?);
        Ok(Self { grid, rows, layout })
    }

    pub fn grid(&self) -> &Laplacian2d {
        &self.grid
    }

    /// Node rows owned by this rank.
    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    pub fn layout(&self) -> &Arc<GhostLayout> {
        &self.layout
    }

    /// Local storage position of node `(i, j)`; `j` must be owned or a ghost row.
    fn local(&self, i: usize, j: usize) -> usize {
        let side = self.grid.side();
        let owned = self.layout.owned_len();
        if self.rows.contains(&j) {
            (j - self.rows.start) * side + i
        } else if j + 1 == self.rows.start {
            owned + i
        } else if self.rows.start > 0 {
            owned + side + i
        } else {
            owned + i
        }
    }

    /// Boundary constraint in this rank's local indices (owned and ghost nodes).
    pub fn boundary_constraint<T: Float>(&self, g: impl Fn(f64, f64) -> T) -> BoundaryConstraint<T> {
        self.grid.boundary_constraint(g).restrict_to(&self.layout)
    }

    pub fn interpolate<T: Float>(&self, u: impl Fn(f64, f64) -> T) -> DistVector<T> {
        DistVector::from_fn(Arc::clone(&self.layout), |g| {
            let (x, y) = self.grid.coords(g);
            u(x, y)
        })
    }

    pub fn rhs<T: Float>(&self, f: impl Fn(f64, f64) -> T) -> DistVector<T> {
        DistVector::from_fn(Arc::clone(&self.layout), |g| {
            if self.grid.is_boundary(g) {
                T::zero()
            } else {
                let (x, y) = self.grid.coords(g);
                f(x, y)
            }
        })
    }
}

impl<T: Float + Send + Sync> LinearOperator<DistVector<T>> for StripLaplacian2d {
    /// Reads the ghost rows of `x`; they must be current.
    fn apply(&self, x: &DistVector<T>, y: &mut DistVector<T>) -> Result<(), KError> {
        for v in [x, &*y] {
            if !Arc::ptr_eq(v.layout(), &self.layout) && **v.layout() != *self.layout {
                return Err(KError::mismatch("strip layout", self.layout.global_len(), v.global_len()));
            }
        }
        let side = self.grid.side();
        let inv_h2 = self.grid.inv_h2::<T>();
        let xs = x.local();
        let out = y.owned_mut();
        for j in self.rows.clone() {
            for i in 0..side {
                out[(j - self.rows.start) * side + i] =
                    self.grid.stencil(i, j, inv_h2, |ii, jj| xs[self.local(ii, jj)]);
            }
        }
        Ok(())
    }
}
