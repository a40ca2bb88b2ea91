//! Poisson problem on the unit square, solved without ever assembling the matrix.
//!
//! `-lap u = f` with `u = 1 + x^2 + 2 y^2` on the boundary and `f = -6`. The
//! five-point stencil is exact for this `u`, so the printed L2 error is the
//! solver's error alone.
//!
//! ```text
//! cargo run --example poisson_matrix_free -- -n 32 -ranks 3 -ksp_type mfcg -ksp_rtol 1e-8 -ksp_monitor
//! ```

use std::sync::Arc;

use matfree_cg::config::KspOptions;
use matfree_cg::context::KspContext;
use matfree_cg::error::KError;
use matfree_cg::operator::{ConstrainedOperator, Laplacian2d, StripLaplacian2d};
use matfree_cg::parallel::{DistVector, DistributedInnerProduct, ThreadComm};
use matfree_cg::utils::SolveStats;

fn exact(x: f64, y: f64) -> f64 {
    1.0 + x * x + 2.0 * y * y
}

fn usize_option(key: &str, default: usize) -> Result<usize, KError> {
    let args: Vec<String> = std::env::args().collect();
    match args.iter().position(|a| a == key) {
        None => Ok(default),
        Some(k) => {
            let value = args.get(k + 1).map(String::as_str).unwrap_or("");
            value.parse().map_err(|_| KError::InvalidOption { key: key.to_string(), value: value.to_string() })
        }
    }
}

fn solve_serial(opts: &KspOptions, n: usize) -> Result<(SolveStats<f64>, f64), KError> {
    let grid = Laplacian2d::new(n)?;
    let bc = grid.boundary_constraint(exact);
    let b = bc.lift(&grid, &grid.rhs(|_, _| -6.0))?;
    let a = ConstrainedOperator::new(grid, bc.clone());
    let mut x = vec![0.0; grid.len()];
    bc.apply_values(&mut x)?;

    let mut ksp = KspContext::from_options(opts, &a)?;
    let stats = ksp.solve_context(&(), &b, &mut x)?;

    let err: Vec<f64> = x.iter().zip(grid.interpolate(exact)).map(|(xi, ui)| xi - ui).collect();
    Ok((stats, grid.l2_norm(&err)))
}

fn solve_strips(comm: &ThreadComm, opts: &KspOptions, n: usize) -> Result<(SolveStats<f64>, f64), KError> {
    let strip = StripLaplacian2d::new(comm, n)?;
    let space = DistributedInnerProduct::new(comm);
    let bc = strip.boundary_constraint(exact);
    let b = bc.lift(&strip, &strip.rhs(|_, _| -6.0))?;
    let a = ConstrainedOperator::new(strip.clone(), bc.clone());
    let mut x = DistVector::zeros(Arc::clone(strip.layout()));
    bc.apply_values(&mut x)?;

    let mut ksp = KspContext::from_options(opts, &a)?;
    let stats = ksp.solve_context(&space, &b, &mut x)?;

    let grid = strip.grid();
    let global = space.gather(&x)?;
    let err: Vec<f64> = global.iter().zip(grid.interpolate(exact)).map(|(xi, ui)| xi - ui).collect();
    Ok((stats, grid.l2_norm(&err)))
}

fn main() -> Result<(), KError> {
    let opts = KspOptions::from_env_args()?;
    let level = if opts.monitor { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let n = usize_option("-n", 16)?;
    let ranks = usize_option("-ranks", 1)?;

    let (stats, err) = if ranks <= 1 {
        solve_serial(&opts, n)?
    } else {
        let mut results = ThreadComm::run(ranks, |comm| solve_strips(comm, &opts, n));
        results.swap_remove(0)?
    };

    tracing::info!(
        ksp_type = %opts.ksp_type,
        n,
        ranks,
        iterations = stats.iterations,
        reason = ?stats.reason,
        "solve finished"
    );
    println!(
        "{} on a {}x{} grid ({} rank(s)): {} iterations, ||r||/||r0|| = {:.3e}, L2 error = {:.3e}",
        opts.ksp_type,
        n,
        n,
        ranks.max(1),
        stats.iterations,
        stats.final_residual / stats.initial_residual,
        err
    );
    stats.into_result().map(|_| ())
}
