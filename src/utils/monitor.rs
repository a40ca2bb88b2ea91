//! Convergence observers.
//!
//! Solvers report one [`ConvergenceEvent`] for the initial residual and one
//! after every iteration. Monitors only observe; the arithmetic never depends
//! on them.

use num_traits::Float;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvergenceEvent<T> {
    pub iteration: usize,
    /// `r^T r` after `iteration` updates.
    pub r_norm2: T,
    /// `r_0^T r_0`.
    pub r0_norm2: T,
}

impl<T: Float> ConvergenceEvent<T> {
    pub fn residual_norm(&self) -> T {
        self.r_norm2.sqrt()
    }

    /// `||r|| / ||r_0||`; zero when the initial residual vanishes.
    pub fn relative_residual(&self) -> T {
        if self.r0_norm2 == T::zero() {
            T::zero()
        } else {
            (self.r_norm2 / self.r0_norm2).sqrt()
        }
    }
}

pub trait ConvergenceMonitor<T> {
    fn on_iteration(&mut self, event: &ConvergenceEvent<T>);
}

impl<T, F> ConvergenceMonitor<T> for F
where
    F: FnMut(&ConvergenceEvent<T>),
{
    fn on_iteration(&mut self, event: &ConvergenceEvent<T>) {
        self(event)
    }
}

/// No monitoring.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMonitor;

impl<T> ConvergenceMonitor<T> for NoMonitor {
    fn on_iteration(&mut self, _event: &ConvergenceEvent<T>) {}
}

/// Several monitors notified in insertion order.
pub struct MonitorSet<'a, T> {
    monitors: Vec<Box<dyn ConvergenceMonitor<T> + 'a>>,
}

impl<'a, T> MonitorSet<'a, T> {
    pub fn new() -> Self {
        Self { monitors: Vec::new() }
    }

    pub fn push(&mut self, monitor: impl ConvergenceMonitor<T> + 'a) {
        self.monitors.push(Box::new(monitor));
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}

impl<T> Default for MonitorSet<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConvergenceMonitor<T> for MonitorSet<'_, T> {
    fn on_iteration(&mut self, event: &ConvergenceEvent<T>) {
        for m in self.monitors.iter_mut() {
            m.on_iteration(event);
        }
    }
}

/// Records `||r||` per iteration, starting with the initial residual.
#[derive(Clone, Debug, Default)]
pub struct ResidualHistory<T> {
    pub norms: Vec<T>,
}

impl<T: Float> ResidualHistory<T> {
    pub fn new() -> Self {
        Self { norms: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.norms.clear();
    }
}

impl<T: Float> ConvergenceMonitor<T> for ResidualHistory<T> {
    fn on_iteration(&mut self, event: &ConvergenceEvent<T>) {
        self.norms.push(event.residual_norm());
    }
}

/// Emits one `tracing` debug event per iteration.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMonitor;

impl<T: Float> ConvergenceMonitor<T> for LogMonitor {
    fn on_iteration(&mut self, event: &ConvergenceEvent<T>) {
        tracing::debug!(
            iteration = event.iteration,
            residual = event.residual_norm().to_f64().unwrap_or(f64::NAN),
            relative = event.relative_residual().to_f64().unwrap_or(f64::NAN),
            "KSP residual norm"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_and_closure_see_the_same_events() {
        let mut seen = Vec::new();
        let mut history = ResidualHistory::new();
        {
            let mut monitors = MonitorSet::new();
            monitors.push(|e: &ConvergenceEvent<f64>| history.on_iteration(e));
            monitors.push(|e: &ConvergenceEvent<f64>| seen.push(e.iteration));
            assert_eq!(monitors.len(), 2);
            for (k, r2) in [16.0, 4.0, 1.0].into_iter().enumerate() {
                monitors.on_iteration(&ConvergenceEvent { iteration: k, r_norm2: r2, r0_norm2: 16.0 });
            }
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(history.norms, vec![4.0, 2.0, 1.0]);
    }

    #[test]
    fn relative_residual_of_zero_start() {
        let e = ConvergenceEvent { iteration: 0, r_norm2: 0.0, r0_norm2: 0.0 };
        assert_eq!(e.relative_residual(), 0.0);
    }
}
