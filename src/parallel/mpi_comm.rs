//! MPI-based parallel communication module.
//!
//! This module provides an implementation of the `Comm` trait using the MPI (Message Passing Interface)
//! backend for distributed-memory parallelism: barrier synchronization, the sum all-reduce used by
//! distributed inner products, and the variable-count all-gather used by ghost exchange.
//! The implementation is only available when the `mpi` feature is enabled.
//!
//! # References
//! - [MPI Standard](https://www.mpi-forum.org/)
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "mpi")]
//! # {
//! use matfree_cg::parallel::{Comm, MpiComm};
//! let comm = MpiComm::new().expect("MPI already initialized");
//! println!("Rank: {} / {}", comm.rank(), comm.size());
//! comm.barrier();
//! # }
//! ```

use mpi::collective::SystemOperation;
use mpi::datatype::PartitionMut;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

use crate::error::KError;

/// MPI communicator wrapper for distributed parallelism.
///
/// Holds the MPI universe (finalized when this value is dropped), the world
/// communicator, the rank of the current process, and the total number of processes.
pub struct MpiComm {
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
    _universe: Universe,
}

impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` instance.
    ///
    /// Fails if MPI has already been initialized in this process.
    pub fn new() -> Result<Self, KError> {
        let universe = mpi::initialize()
            .ok_or_else(|| KError::CommError("MPI is already initialized".into()))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Ok(MpiComm { world, rank, size, _universe: universe })
    }
}

impl super::Comm for MpiComm {
    /// Returns the rank (ID) of this process.
    fn rank(&self) -> usize { self.rank }
    /// Returns the total number of processes in the communicator.
    fn size(&self) -> usize { self.size }
    /// Synchronizes all processes at a barrier.
    fn barrier(&self) { self.world.barrier(); }

    /// Performs an all-reduce sum operation across all processes.
    fn all_reduce(&self, x: f64) -> f64 {
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, &SystemOperation::sum());
        y
    }

    fn all_gather_sizes(&self, x: usize) -> Vec<usize> {
        let mut buf = vec![0u64; self.size];
        self.world.all_gather_into(&(x as u64), &mut buf[..]);
        buf.into_iter().map(|v| v as usize).collect()
    }

    /// Gathers every rank's block into `out` on all ranks.
    ///
    /// - `local`: the block contributed by this process.
    /// - `out`: receives the concatenation of all blocks in rank order.
    fn all_gather_varcount(&self, local: &[f64], out: &mut Vec<f64>) -> Result<(), KError> {
        let sizes = self.all_gather_sizes(local.len());
        let counts = sizes
            .iter()
            .map(|&s| Count::try_from(s).map_err(|_| KError::CommError(format!("block of {s} entries exceeds MPI count range"))))
            .collect::<Result<Vec<Count>, KError>>()?;
        let displs: Vec<Count> = counts
            .iter()
            .scan(0 as Count, |acc, &c| {
                let d = *acc;
                *acc += c;
                Some(d)
            })
            .collect();
        let total: usize = sizes.iter().sum();
        out.clear();
        out.resize(total, 0.0);
        let mut partition = PartitionMut::new(&mut out[..], &counts[..], &displs[..]);
        self.world.all_gather_varcount_into(local, &mut partition);
        Ok(())
    }
}
