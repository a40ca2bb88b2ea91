//! Tests for the core operator and vector-space implementations on plain vectors.
//!
//! These tests check the `LinearOperator` implementation for dense faer
//! matrices, the `InnerProduct` on `Vec<f64>` and the boundary-constraint
//! wrapper, using random and fixed data.

use approx::assert_abs_diff_eq;
use faer::Mat;
use matfree_cg::core::traits::{InnerProduct, LinearOperator, VectorOps};
use matfree_cg::operator::{BoundaryConstraint, ConstrainedOperator, Laplacian2d};
use rand::Rng;

/// Dense operator action for a small random matrix, checked against a manual product.
#[test]
fn dense_apply_random_small() {
    let n = 5;
    let mut rng = rand::thread_rng();
    let vals: Vec<f64> = (0..n * n).map(|_| rng.r#gen()).collect();
    // column-major, as faer stores it
    let a = Mat::from_fn(n, n, |i, j| vals[j * n + i]);
    let x: Vec<f64> = (0..n).map(|_| rng.r#gen()).collect();
    let mut y = vec![0.0; n];
    a.apply(&x, &mut y).unwrap();

    for i in 0..n {
        let expected = (0..n).map(|j| vals[j * n + i] * x[j]).sum::<f64>();
        assert_abs_diff_eq!(y[i], expected, epsilon = 1e-12);
    }
}

#[test]
fn dot_and_norm() {
    let x = vec![1.0, 2.0, 3.0];
    let y = vec![4.0, -5.0, 6.0];
    let ip = ();
    let dot = ip.dot(&x, &y);
    assert_abs_diff_eq!(dot, 1.0 * 4.0 + 2.0 * (-5.0) + 3.0 * 6.0, epsilon = 1e-12);
    let norm_x = ip.norm(&x);
    assert_abs_diff_eq!(norm_x, 14.0f64.sqrt(), epsilon = 1e-12);
}

#[test]
fn long_dot_is_reproducible() {
    let n = 20_000;
    let x: Vec<f64> = (0..n).map(|i| ((i * 7919) % 1000) as f64 * 1e-3).collect();
    let first = ().dot(&x, &x);
    for _ in 0..5 {
        assert_eq!(().dot(&x, &x), first);
    }
    let sequential: f64 = x.iter().map(|v| v * v).sum();
    assert_abs_diff_eq!(first, sequential, epsilon = 1e-9 * sequential);
}

#[test]
fn vector_updates() {
    let mut y = vec![1.0, 1.0, 1.0];
    y.axpy(2.0, &vec![1.0, 2.0, 3.0]);
    assert_eq!(y, vec![3.0, 5.0, 7.0]);
    y.aypx(0.5, &vec![1.0, 1.0, 1.0]);
    assert_eq!(y, vec![2.5, 3.5, 4.5]);
    assert!(y.compatible(&vec![0.0; 3]));
    assert!(!y.compatible(&vec![0.0; 4]));
}

/// The constrained Laplacian is symmetric: x.(A y) == y.(A x) for random x, y.
#[test]
fn constrained_laplacian_is_symmetric() {
    let grid = Laplacian2d::new(6).unwrap();
    let a = ConstrainedOperator::new(grid, BoundaryConstraint::<f64>::homogeneous(grid.boundary_dofs()));
    let mut rng = rand::thread_rng();
    let x: Vec<f64> = (0..grid.len()).map(|_| rng.r#gen()).collect();
    let y: Vec<f64> = (0..grid.len()).map(|_| rng.r#gen()).collect();
    let (mut ax, mut ay) = (vec![0.0; grid.len()], vec![0.0; grid.len()]);
    a.apply(&x, &mut ax).unwrap();
    a.apply(&y, &mut ay).unwrap();
    assert_abs_diff_eq!(().dot(&x, &ay), ().dot(&y, &ax), epsilon = 1e-9);
    assert!(().dot(&x, &ax) > 0.0);
}
