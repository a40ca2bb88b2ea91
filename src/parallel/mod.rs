//! Communicators and distributed vectors.
//!
//! A [`Comm`] provides the two collectives the Krylov kernels need: a sum
//! all-reduce for inner products and a variable-count all-gather for ghost
//! exchange. Every collective is a synchronization point: all ranks must call
//! the same collectives in the same order.

use crate::error::KError;

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    /// Sum of `x` over all ranks.
    fn all_reduce(&self, x: f64) -> f64;
    /// One `usize` per rank, in rank order.
    fn all_gather_sizes(&self, x: usize) -> Vec<usize>;
    /// Concatenation of every rank's `local` block, in rank order.
    fn all_gather_varcount(&self, local: &[f64], out: &mut Vec<f64>) -> Result<(), KError>;
}

/// A single rank; every collective is the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl SerialComm {
    pub fn new() -> Self {
        SerialComm
    }
}

impl Comm for SerialComm {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }
    fn barrier(&self) {}
    fn all_reduce(&self, x: f64) -> f64 { x }
    fn all_gather_sizes(&self, x: usize) -> Vec<usize> { vec![x] }
    fn all_gather_varcount(&self, local: &[f64], out: &mut Vec<f64>) -> Result<(), KError> {
        out.clear();
        out.extend_from_slice(local);
        Ok(())
    }
}

#[cfg(feature="mpi")]
pub mod mpi_comm;
#[cfg(feature="mpi")]
pub use mpi_comm::MpiComm;

#[cfg(feature="rayon")]
pub mod rayon_comm;
#[cfg(feature="rayon")]
pub use rayon_comm::RayonComm;

pub mod thread_comm;
pub use thread_comm::ThreadComm;

pub mod ghost;
pub use ghost::{DistVector, DistributedInnerProduct, GhostLayout};

/// Any of the available communicators, chosen at run time.
pub enum UniverseComm {
    Serial(SerialComm),
    Thread(ThreadComm),
    #[cfg(feature="mpi")]
    Mpi(MpiComm),
    #[cfg(feature="rayon")]
    Rayon(RayonComm),
}

impl Comm for UniverseComm {
    fn rank(&self) -> usize {
        match self {
            UniverseComm::Serial(comm) => comm.rank(),
            UniverseComm::Thread(comm) => comm.rank(),
            #[cfg(feature="mpi")]
            UniverseComm::Mpi(comm) => comm.rank(),
            #[cfg(feature="rayon")]
            UniverseComm::Rayon(comm) => comm.rank(),
        }
    }
    fn size(&self) -> usize {
        match self {
            UniverseComm::Serial(comm) => comm.size(),
            UniverseComm::Thread(comm) => comm.size(),
            #[cfg(feature="mpi")]
            UniverseComm::Mpi(comm) => comm.size(),
            #[cfg(feature="rayon")]
            UniverseComm::Rayon(comm) => comm.size(),
        }
    }
    fn barrier(&self) {
        match self {
            UniverseComm::Serial(comm) => comm.barrier(),
            UniverseComm::Thread(comm) => comm.barrier(),
            #[cfg(feature="mpi")]
            UniverseComm::Mpi(comm) => comm.barrier(),
            #[cfg(feature="rayon")]
            UniverseComm::Rayon(comm) => comm.barrier(),
        }
    }
    fn all_reduce(&self, x: f64) -> f64 {
        match self {
            UniverseComm::Serial(comm) => comm.all_reduce(x),
            UniverseComm::Thread(comm) => comm.all_reduce(x),
            #[cfg(feature="mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce(x),
            #[cfg(feature="rayon")]
            UniverseComm::Rayon(comm) => comm.all_reduce(x),
        }
    }
    fn all_gather_sizes(&self, x: usize) -> Vec<usize> {
        match self {
            UniverseComm::Serial(comm) => comm.all_gather_sizes(x),
            UniverseComm::Thread(comm) => comm.all_gather_sizes(x),
            #[cfg(feature="mpi")]
            UniverseComm::Mpi(comm) => comm.all_gather_sizes(x),
            #[cfg(feature="rayon")]
            UniverseComm::Rayon(comm) => comm.all_gather_sizes(x),
        }
    }
    fn all_gather_varcount(&self, local: &[f64], out: &mut Vec<f64>) -> Result<(), KError> {
        match self {
            UniverseComm::Serial(comm) => comm.all_gather_varcount(local, out),
            UniverseComm::Thread(comm) => comm.all_gather_varcount(local, out),
            #[cfg(feature="mpi")]
            UniverseComm::Mpi(comm) => comm.all_gather_varcount(local, out),
            #[cfg(feature="rayon")]
            UniverseComm::Rayon(comm) => comm.all_gather_varcount(local, out),
        }
    }
}
