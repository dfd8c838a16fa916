use approx::assert_abs_diff_eq;
use ndarray::{Array2, Array3};
use tsinsar::core::{BatchLstsqParams, BatchSolver, DesignMatrix, FixedMemory};

fn problem(n_obs: usize, n_pt: usize) -> (Array2<f64>, Array2<f64>) {
    let g = Array2::from_shape_fn((n_obs, 3), |(i, j)| (i as f64).powi(j as i32));
    // column p follows p - 0.5 t + 0.1 t^2
    let d = Array2::from_shape_fn((n_obs, n_pt), |(i, p)| {
        let t = i as f64;
        p as f64 - 0.5 * t + 0.1 * t * t
    });
    (g, d)
}

fn solver(available: u64) -> BatchSolver {
    BatchSolver::with_params(BatchLstsqParams {
        progress: false,
        ..BatchLstsqParams::default()
    })
    .with_memory_estimator(Box::new(FixedMemory(available)))
}

#[test]
fn test_patching_does_not_change_result() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (g, mut d) = problem(12, 50);
    d[[3, 7]] = f64::NAN;
    d[[5, 20]] = f64::NAN;

    let whole = solver(u64::MAX).solve(DesignMatrix::Shared(g.view()), d.view()).unwrap();
    let patched = solver(4096).solve(DesignMatrix::Shared(g.view()), d.view()).unwrap();

    assert_eq!(whole.dim(), (3, 50));
    for (a, b) in whole.iter().zip(patched.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
    for p in 0..50 {
        assert_abs_diff_eq!(whole[[0, p]], p as f64, epsilon = 1e-6);
        assert_abs_diff_eq!(whole[[1, p]], -0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(whole[[2, p]], 0.1, epsilon = 1e-6);
    }
}

#[test]
fn test_missing_columns_degrade_to_nan() {
    let (g, mut d) = problem(5, 4);
    // leaves 3 valid observations for 3 parameters
    for i in 0..2 {
        d[[i, 1]] = f64::NAN;
    }
    d.column_mut(3).fill(f64::NAN);

    let x = solver(1 << 30).solve(DesignMatrix::Shared(g.view()), d.view()).unwrap();
    assert!(x.column(0).iter().all(|v| v.is_finite()));
    assert!(x.column(1).iter().all(|v| v.is_nan()));
    assert!(x.column(2).iter().all(|v| v.is_finite()));
    assert!(x.column(3).iter().all(|v| v.is_nan()));
}

#[test]
fn test_per_pixel_patching_does_not_change_result() {
    let (n_pt, n_obs) = (20, 6);
    // pixel p samples t at a different rate
    let g = Array3::from_shape_fn((n_pt, n_obs, 2), |(p, i, j)| {
        if j == 0 {
            i as f64 * (1.0 + p as f64 * 0.1)
        } else {
            1.0
        }
    });
    let mut d = Array2::from_shape_fn((n_obs, n_pt), |(i, p)| {
        2.0 * g[[p, i, 0]] - p as f64
    });
    d[[2, 5]] = f64::NAN;

    let whole = solver(u64::MAX).solve(DesignMatrix::PerPixel(g.view()), d.view()).unwrap();
    let patched = solver(100).solve(DesignMatrix::PerPixel(g.view()), d.view()).unwrap();

    assert_eq!(patched.dim(), (2, n_pt));
    for (a, b) in whole.iter().zip(patched.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
    for p in 0..n_pt {
        assert_abs_diff_eq!(patched[[0, p]], 2.0, epsilon = 1e-8);
        assert_abs_diff_eq!(patched[[1, p]], -(p as f64), epsilon = 1e-8);
    }
}
