//! matfree-cg: matrix-free Conjugate Gradient with PETSc-style KSP hosts
//!
//! This crate solves symmetric positive definite systems `A x = b` where `A`
//! is known only through its action on a vector. One CG state transition is
//! shared by a bare loop, a generic iterative driver with user convergence
//! tests and a named plugin interface. Vectors may be plain `Vec<T>` or
//! distributed across ranks with ghost entries.

pub mod parallel;

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod operator;
pub mod solver;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use context::*;
pub use crate::core::*;
pub use error::*;
pub use operator::*;
pub use solver::*;
pub use utils::*;
