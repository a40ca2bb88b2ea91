//! Convergence criteria and observers.

pub mod convergence;
pub mod monitor;

pub use convergence::{ConvergedReason, Convergence, SolveStats};
pub use monitor::{ConvergenceEvent, ConvergenceMonitor, LogMonitor, MonitorSet, NoMonitor, ResidualHistory};
