use thiserror::Error;

// Unified error type for matfree-cg

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KError {
    #[error("numerical breakdown at iteration {iteration}: {quantity} = {value:e}")]
    NumericalBreakdown {
        iteration: usize,
        quantity: &'static str,
        value: f64,
    },
    #[error("indefinite operator detected at iteration {iteration} (p^T A p = {curvature:e} < 0)")]
    IndefiniteOperator { iteration: usize, curvature: f64 },
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("did not converge in {iterations} iterations (residual norm {residual:e})")]
    NonConvergence { iterations: usize, residual: f64 },
    #[error("operator error: {0}")]
    OperatorError(String),
    #[error("invalid option {key}: {value:?}")]
    InvalidOption { key: String, value: String },
    #[error("unknown solver type: {0}")]
    UnknownSolver(String),
    #[error("communication error: {0}")]
    CommError(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl KError {
    /// Shorthand for a length check failure.
    pub fn mismatch(what: &'static str, expected: usize, found: usize) -> Self {
        KError::DimensionMismatch { what, expected, found }
    }
}
