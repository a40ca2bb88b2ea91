//! Command-line or API options for Krylov solvers.
//!
//! This module provides the `KspOptions` struct, which is used to select a
//! solver host and its stopping criteria from PETSc-style command-line tokens
//! or API calls:
//!
//! ```text
//! -ksp_type mfcg -ksp_rtol 1e-8 -ksp_max_it 500 -ksp_breakdown_tol 1e-30 -ksp_monitor
//! ```
//!
//! Tokens not starting with `-ksp_` are skipped, so the same argument list
//! can carry options for other components.

use num_traits::Float;

use crate::error::KError;
use crate::utils::convergence::{Convergence, DEFAULT_MAX_ITERS, DEFAULT_RTOL};

/// Solver types & parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct KspOptions {
    /// Solver type (cg, cg-driven, or the name of a registered plugin)
    pub ksp_type: String,

    /// Relative residual tolerance
    pub rtol: f64,

    /// Iteration cap
    pub max_it: usize,

    /// Curvatures |p^T A p| at or below this are a breakdown
    pub breakdown_tol: f64,

    /// Log the residual norm of every iteration
    pub monitor: bool,
}

impl Default for KspOptions {
    fn default() -> Self {
        Self {
            ksp_type: "cg".to_string(),
            rtol: DEFAULT_RTOL,
            max_it: DEFAULT_MAX_ITERS,
            breakdown_tol: 0.0,
            monitor: false,
        }
    }
}

fn invalid(key: &str, value: &str) -> KError {
    KError::InvalidOption { key: key.to_string(), value: value.to_string() }
}

fn parse_value<F: std::str::FromStr>(key: &str, value: Option<&str>) -> Result<F, KError> {
    let value = value.ok_or_else(|| invalid(key, ""))?;
    value.parse().map_err(|_| invalid(key, value))
}

impl KspOptions {
    /// Parse option tokens, starting from the defaults.
    pub fn parse<I, S>(args: I) -> Result<Self, KError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        let mut tokens = args.iter().map(String::as_str);
        let mut opts = Self::default();
        while let Some(key) = tokens.next() {
            match key {
                "-ksp_type" => {
                    let value = tokens.next().filter(|v| !v.starts_with('-'));
                    opts.ksp_type = value.ok_or_else(|| invalid(key, ""))?.to_string();
                }
                "-ksp_rtol" => opts.rtol = parse_value(key, tokens.next())?,
                "-ksp_max_it" => opts.max_it = parse_value(key, tokens.next())?,
                "-ksp_breakdown_tol" => opts.breakdown_tol = parse_value(key, tokens.next())?,
                "-ksp_monitor" => opts.monitor = true,
                other if other.starts_with("-ksp_") => return Err(invalid(other, "")),
                _ => {}
            }
        }
        opts.validate()?;
        Ok(opts)
    }

    /// Parse the process arguments, skipping the program name.
    pub fn from_env_args() -> Result<Self, KError> {
        Self::parse(std::env::args().skip(1))
    }

    pub fn validate(&self) -> Result<(), KError> {
        if !(self.rtol.is_finite() && self.rtol > 0.0) {
            return Err(invalid("-ksp_rtol", &self.rtol.to_string()));
        }
        if !(self.breakdown_tol.is_finite() && self.breakdown_tol >= 0.0) {
            return Err(invalid("-ksp_breakdown_tol", &self.breakdown_tol.to_string()));
        }
        if self.ksp_type.is_empty() {
            return Err(invalid("-ksp_type", ""));
        }
        Ok(())
    }

    /// Stopping criteria in the solve's scalar type.
    pub fn convergence<T: Float>(&self) -> Result<Convergence<T>, KError> {
        let rtol = T::from(self.rtol).ok_or_else(|| invalid("-ksp_rtol", &self.rtol.to_string()))?;
        let breakdown_tol = T::from(self.breakdown_tol)
            .ok_or_else(|| invalid("-ksp_breakdown_tol", &self.breakdown_tol.to_string()))?;
        Ok(Convergence::new(rtol, self.max_it).with_breakdown_tol(breakdown_tol))
    }
}
