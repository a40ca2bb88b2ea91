//! In-process communicator: a group of ranks living on separate threads.
//!
//! Every rank owns one `ThreadComm`; the group shares a generation barrier and
//! one exchange slot per rank. Collectives write the caller's contribution
//! into its slot, wait for the group, read all slots in rank order, and wait
//! again before any slot may be overwritten. Reductions are therefore summed
//! in rank order and are bitwise reproducible.
//!
//! A rank that leaves [`ThreadComm::run`] (returning or panicking) while the
//! others still wait in a collective fails the group instead of hanging it:
//! `all_gather_varcount` returns [`KError::CommError`], and the collectives
//! without an error channel panic. `run` then re-raises the panic of the rank
//! that failed first.
//!
//! This exercises exactly the same code paths as an MPI job (ghost exchange,
//! collective dot products) without an MPI installation.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::KError;

#[derive(Default)]
struct Turn {
    arrived: usize,
    generation: u64,
    departed: usize,
    first_panic: Option<usize>,
}

struct Shared {
    turn: Mutex<Turn>,
    wake: Condvar,
    slots: Mutex<Vec<Vec<f64>>>,
}

impl Shared {
    fn turn(&self) -> MutexGuard<'_, Turn> {
        self.turn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Vec<f64>>> {
        // A panicking rank poisons the lock; the data is still consistent
        // for the others because each rank only writes its own slot.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks its rank as gone when the rank's closure ends, however it ends.
struct Departure<'a> {
    comm: &'a ThreadComm,
}

impl Drop for Departure<'_> {
    fn drop(&mut self) {
        let mut turn = self.comm.shared.turn();
        turn.departed += 1;
        if std::thread::panicking() && turn.first_panic.is_none() {
            turn.first_panic = Some(self.comm.rank);
        }
        self.comm.shared.wake.notify_all();
    }
}

pub struct ThreadComm {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Create the `size` communicators of one group, indexed by rank.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a communicator group needs at least one rank");
        let shared = Arc::new(Shared {
            turn: Mutex::new(Turn::default()),
            wake: Condvar::new(),
            slots: Mutex::new(vec![Vec::new(); size]),
        });
        (0..size)
            .map(|rank| ThreadComm { rank, size, shared: Arc::clone(&shared) })
            .collect()
    }

    /// Run `f` on `size` ranks, one scoped thread each, and return the
    /// per-rank results in rank order.
    ///
    /// If any rank panics, the panic of the first rank to fail is resumed
    /// once every thread has finished.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&ThreadComm) -> R + Sync,
    {
        let comms = Self::group(size);
        let joined: Vec<std::thread::Result<R>> = std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .iter()
                .map(|comm| {
                    let f = &f;
                    scope.spawn(move || {
                        let _departure = Departure { comm };
                        f(comm)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let first_panic = comms[0].shared.turn().first_panic;
        let mut results = Vec::with_capacity(size);
        let mut panics = Vec::new();
        for (rank, outcome) in joined.into_iter().enumerate() {
            match outcome {
                Ok(r) => results.push(r),
                Err(payload) => panics.push((rank, payload)),
            }
        }
        if !panics.is_empty() {
            let first = first_panic
                .and_then(|rank| panics.iter().position(|(r, _)| *r == rank))
                .unwrap_or(0);
            std::panic::resume_unwind(panics.swap_remove(first).1);
        }
        results
    }

    /// Wait until every rank of the group has arrived.
    fn wait(&self) -> Result<(), KError> {
        let mut turn = self.shared.turn();
        let generation = turn.generation;
        turn.arrived += 1;
        if turn.arrived == self.size {
            turn.arrived = 0;
            turn.generation += 1;
            self.shared.wake.notify_all();
            return Ok(());
        }
        loop {
            if turn.generation != generation {
                return Ok(());
            }
            if turn.departed > 0 {
                return Err(KError::CommError(format!(
                    "rank {} is waiting on a collective that {} departed rank(s) will never join",
                    self.rank, turn.departed
                )));
            }
            turn = self.shared.wake.wait(turn).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn exchange(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, KError> {
        self.shared.slots()[self.rank] = local.to_vec();
        self.wait()?;
        let all = self.shared.slots().clone();
        self.wait()?;
        Ok(all)
    }

    /// `exchange` for collectives whose signature has no room for an error.
    fn exchange_or_abort(&self, local: &[f64]) -> Vec<Vec<f64>> {
        match self.exchange(local) {
            Ok(all) => all,
            Err(err) => panic!("{err}"),
        }
    }
}

impl super::Comm for ThreadComm {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.size }
    fn barrier(&self) {
        if let Err(err) = self.wait() {
            panic!("{err}");
        }
    }
    fn all_reduce(&self, x: f64) -> f64 {
        self.exchange_or_abort(&[x])
            .iter()
            .fold(0.0, |acc, slot| acc + slot[0])
    }
    fn all_gather_sizes(&self, x: usize) -> Vec<usize> {
        self.exchange_or_abort(&[x as f64])
            .iter()
            .map(|slot| slot[0] as usize)
            .collect()
    }
    fn all_gather_varcount(&self, local: &[f64], out: &mut Vec<f64>) -> Result<(), KError> {
        let all = self.exchange(local)?;
        if all.len() != self.size {
            return Err(KError::CommError(format!(
                "expected {} contributions, got {}",
                self.size,
                all.len()
            )));
        }
        out.clear();
        for slot in &all {
            out.extend_from_slice(slot);
        }
        Ok(())
    }
}
