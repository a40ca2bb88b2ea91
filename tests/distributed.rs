//! Distributed CG on in-process ranks.
//!
//! Each rank owns a strip of grid rows plus ghost copies of the rows next to
//! it. Solves on 1, 2 and 3 ranks must agree with the serial solve up to the
//! round-off of the reordered dot-product sums.

use std::cell::Cell;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use matfree_cg::context::{KspContext, SolverKind};
use matfree_cg::core::traits::{GhostUpdate, LinearOperator};
use matfree_cg::error::KError;
use matfree_cg::operator::{ConstrainedOperator, Laplacian2d, StripLaplacian2d};
use matfree_cg::parallel::{
    Comm, DistVector, DistributedInnerProduct, GhostLayout, SerialComm, ThreadComm, UniverseComm,
};
use matfree_cg::solver::cg_solve;
use matfree_cg::utils::{Convergence, NoMonitor, SolveStats};

fn exact(x: f64, y: f64) -> f64 {
    1.0 + x * x + 2.0 * y * y
}

fn serial_solve(n: usize, conv: &Convergence<f64>) -> (SolveStats<f64>, Vec<f64>) {
    let grid = Laplacian2d::new(n).unwrap();
    let bc = grid.boundary_constraint(exact);
    let b = bc.lift(&grid, &grid.rhs(|_, _| -6.0)).unwrap();
    let a = ConstrainedOperator::new(grid, bc.clone());
    let mut x = vec![0.0; grid.len()];
    bc.apply_values(&mut x).unwrap();
    let stats = cg_solve(&a, &(), &b, &mut x, conv, &mut NoMonitor).unwrap();
    (stats, x)
}

struct RankResult {
    stats: SolveStats<f64>,
    /// Gathered global solution.
    x: Vec<f64>,
    /// (global index, value) of this rank's ghost entries after the solve.
    ghosts: Vec<(usize, f64)>,
}

fn strip_solve(comm: &ThreadComm, n: usize, conv: &Convergence<f64>, kind: Option<&str>) -> RankResult {
    let strip = StripLaplacian2d::new(comm, n).unwrap();
    let space = DistributedInnerProduct::new(comm);
    let bc = strip.boundary_constraint(exact);
    let b = bc.lift(&strip, &strip.rhs(|_, _| -6.0)).unwrap();
    let a = ConstrainedOperator::new(strip.clone(), bc.clone());
    let mut x = DistVector::zeros(Arc::clone(strip.layout()));
    bc.apply_values(&mut x).unwrap();
    let stats = match kind {
        None => cg_solve(&a, &space, &b, &mut x, conv, &mut NoMonitor).unwrap(),
        Some(kind) => {
            let mut ctx = KspContext::new(SolverKind::from_name(kind), &a, conv.clone());
            ctx.solve_context(&space, &b, &mut x).unwrap()
        }
    };
    let ghosts = strip.layout().ghosts().iter().copied().zip(x.ghost_values().iter().copied()).collect();
    RankResult { stats, x: space.gather(&x).unwrap(), ghosts }
}

fn assert_matches_serial(ranks: usize, kind: Option<&'static str>) {
    let n = 16;
    let conv = Convergence::new(1e-6, 200);
    let (serial_stats, serial_x) = serial_solve(n, &conv);
    let results = ThreadComm::run(ranks, |comm| strip_solve(comm, n, &conv, kind));
    assert_eq!(results.len(), ranks);
    for r in &results {
        assert!(r.stats.converged);
        assert_eq!(r.stats.iterations, serial_stats.iterations);
        assert_eq!(r.x.len(), serial_x.len());
        for (xi, si) in r.x.iter().zip(&serial_x) {
            assert_abs_diff_eq!(xi, si, epsilon = 1e-10);
        }
        // ghosts of the returned solution are current
        for &(g, v) in &r.ghosts {
            assert_eq!(v, r.x[g]);
        }
        // every rank sees the same reduced scalars
        assert_eq!(r.stats.final_residual, results[0].stats.final_residual);
    }
}

#[test]
fn one_rank_matches_serial() {
    assert_matches_serial(1, None);
}

#[test]
fn two_ranks_match_serial() {
    assert_matches_serial(2, None);
}

#[test]
fn three_ranks_match_serial() {
    assert_matches_serial(3, None);
}

#[test]
fn plugin_and_driver_hosts_run_distributed() {
    assert_matches_serial(3, Some("mfcg"));
    assert_matches_serial(2, Some("cg-driven"));
}

#[test]
fn collectives_agree_across_ranks() {
    let sums = ThreadComm::run(4, |comm| comm.all_reduce((comm.rank() + 1) as f64));
    assert_eq!(sums, vec![10.0; 4]);
}

#[test]
fn single_rank_communicators_reproduce_serial_solve() {
    let conv = Convergence::new(1e-6, 200);
    let (serial_stats, serial_x) = serial_solve(12, &conv);
    let mut comms = vec![UniverseComm::Serial(SerialComm::new())];
    #[cfg(feature = "rayon")]
    comms.push(UniverseComm::Rayon(matfree_cg::parallel::RayonComm::new()));
    for comm in &comms {
        assert_eq!(comm.size(), 1);
        let strip = StripLaplacian2d::new(comm, 12).unwrap();
        assert!(strip.layout().ghosts().is_empty());
        let space = DistributedInnerProduct::new(comm);
        let bc = strip.boundary_constraint(exact);
        let b = bc.lift(&strip, &strip.rhs(|_, _| -6.0)).unwrap();
        let a = ConstrainedOperator::new(strip.clone(), bc.clone());
        let mut x = DistVector::zeros(Arc::clone(strip.layout()));
        bc.apply_values(&mut x).unwrap();
        let stats = cg_solve(&a, &space, &b, &mut x, &conv, &mut NoMonitor).unwrap();
        assert_eq!(stats.iterations, serial_stats.iterations);
        assert_eq!(x.owned(), &serial_x[..]);
    }
}

/// Forwards to a `ThreadComm` and counts the entries every all-gather delivers.
struct CountingComm<'a> {
    inner: &'a ThreadComm,
    gathered: Cell<usize>,
}

impl Comm for CountingComm<'_> {
    fn rank(&self) -> usize {
        self.inner.rank()
    }
    fn size(&self) -> usize {
        self.inner.size()
    }
    fn barrier(&self) {
        self.inner.barrier()
    }
    fn all_reduce(&self, x: f64) -> f64 {
        self.inner.all_reduce(x)
    }
    fn all_gather_sizes(&self, x: usize) -> Vec<usize> {
        self.inner.all_gather_sizes(x)
    }
    fn all_gather_varcount(&self, local: &[f64], out: &mut Vec<f64>) -> Result<(), KError> {
        self.inner.all_gather_varcount(local, out)?;
        self.gathered.set(self.gathered.get() + out.len());
        Ok(())
    }
}

#[test]
fn ghost_update_moves_only_the_halo() {
    let n = 64;
    let per_rank = ThreadComm::run(4, |comm| {
        let counting = CountingComm { inner: comm, gathered: Cell::new(0) };
        let strip = StripLaplacian2d::new(&counting, n).unwrap();
        let space = DistributedInnerProduct::new(&counting);
        let mut v = strip.interpolate(exact);
        counting.gathered.set(0);
        space.ghost_update(&mut v).unwrap();
        let grid = strip.grid();
        for (&g, &value) in strip.layout().ghosts().iter().zip(v.ghost_values()) {
            let (x, y) = grid.coords(g);
            assert_eq!(value, exact(x, y));
        }
        (counting.gathered.get(), strip.layout().ghosts().len(), strip.layout().global_len())
    });
    let total_ghosts: usize = per_rank.iter().map(|&(_, ghosts, _)| ghosts).sum();
    // four strips of a 65-row grid: the outer ranks read one row, the inner ones two
    assert_eq!(total_ghosts, 6 * (n + 1));
    for &(received, _, global) in &per_rank {
        assert_eq!(received, total_ghosts);
        assert!(received < global);
    }
}

#[test]
fn incompatible_layouts_are_rejected() {
    let errors = ThreadComm::run(2, |comm| {
        let strip = StripLaplacian2d::new(comm, 8).unwrap();
        let space = DistributedInnerProduct::new(comm);
        let conv = Convergence::new(1e-6, 200);
        // same ownership, no ghosts
        let bare = Arc::new(GhostLayout::new(comm, strip.layout().owned_len(), Vec::new()).unwrap());

        let b = strip.rhs(|_, _| -6.0);
        let mut x = DistVector::zeros(Arc::clone(&bare));
        let guess = cg_solve(&strip, &space, &b, &mut x, &conv, &mut NoMonitor).unwrap_err();

        let b_bare = DistVector::from_fn(Arc::clone(&bare), |_| 1.0);
        let mut y = DistVector::zeros(Arc::clone(&bare));
        let apply = strip.apply(&b_bare, &mut y).unwrap_err();
        let mut x = DistVector::zeros(bare);
        let solve = cg_solve(&strip, &space, &b_bare, &mut x, &conv, &mut NoMonitor).unwrap_err();
        (guess, apply, solve)
    });
    let global = 81;
    for (guess, apply, solve) in errors {
        assert_eq!(guess, KError::DimensionMismatch { what: "initial guess", expected: global, found: global });
        assert_eq!(apply, KError::DimensionMismatch { what: "strip layout", expected: global, found: global });
        assert_eq!(solve, apply);
    }
}
