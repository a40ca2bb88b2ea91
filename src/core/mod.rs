//! Core traits and their implementations for the built-in vector types.

pub mod traits;
pub mod wrappers;

pub use traits::{GhostUpdate, InnerProduct, LinearOperator, LocalStorage, VectorOps, VectorSpace};
