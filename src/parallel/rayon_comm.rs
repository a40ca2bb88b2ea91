// rayon-based shared-memory communication

/// Shared-memory "communicator": a single logical rank whose vector kernels
/// run on the global rayon pool.
pub struct RayonComm {
    threads: usize,
}

impl RayonComm {
    pub fn new() -> Self {
        let threads = num_cpus::get();
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .ok();
        RayonComm { threads: rayon::current_num_threads().min(threads.max(1)) }
    }

    /// Number of worker threads backing the kernels.
    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl Default for RayonComm {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Comm for RayonComm {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }
    fn barrier(&self) { rayon::scope(|_| {}); }
    fn all_reduce(&self, x: f64) -> f64 {
        x // No-op for shared memory
    }
    fn all_gather_sizes(&self, x: usize) -> Vec<usize> {
        vec![x]
    }
    fn all_gather_varcount(&self, local: &[f64], out: &mut Vec<f64>) -> Result<(), crate::error::KError> {
        out.clear();
        out.extend_from_slice(local);
        Ok(())
    }
}
