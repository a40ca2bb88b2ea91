//! Context module for matfree-cg.
//!
//! This module provides the context/factory type that selects a solver host,
//! holds the stopping criteria and monitors, and runs solves.
//!
//! Modules:
//! - [`ksp_context`]: Contains the `KspContext` struct and the `SolverKind` selector.
//!
//! # Example
//! ```rust,ignore
//! use matfree_cg::context::{KspContext, SolverKind};
//! let mut ksp = KspContext::new(SolverKind::Cg, op, Convergence::default());
//! let stats = ksp.solve_context(&(), &b, &mut x)?;
//! ```
//!
//! # References
//! - PETSc documentation: https://petsc.org/release/manualpages/KSP/

pub mod ksp_context;
pub use ksp_context::{KspContext, SolverKind};
