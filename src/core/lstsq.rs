//! Batched least squares with per-column missing data.
//!
//! Every column `j` of the observation matrix `d` is solved independently as
//! `min_x || M_j * (G x - d_j) ||`, where `M_j` masks the NaN entries of the
//! column. Columns with no more valid observations than parameters, or with a
//! singular normal matrix, are returned as NaN.

use crate::types::{InsarError, InsarResult, Real};
use nalgebra::{DMatrix, DVector};
use ndarray::{s, Array2, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, Zip};
use num_traits::Float;
use std::ops::Range;
use sysinfo::System;

/// Source of the memory budget used to size patches
pub trait MemoryEstimator: Send + Sync {
    /// Currently available memory in bytes
    fn available_bytes(&self) -> u64;
}

/// Available memory reported by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemory;

impl MemoryEstimator for SystemMemory {
    fn available_bytes(&self) -> u64 {
        let mut system = System::new();
        system.refresh_memory();
        system.available_memory()
    }
}

/// Fixed memory budget in bytes
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub u64);

impl MemoryEstimator for FixedMemory {
    fn available_bytes(&self) -> u64 {
        self.0
    }
}

/// Design matrix of a batched problem
#[derive(Debug, Clone, Copy)]
pub enum DesignMatrix<'a, T> {
    /// One `(n_obs, n_param)` matrix shared by all columns
    Shared(ArrayView2<'a, T>),
    /// One matrix per column, shape `(n_pt, n_obs, n_param)`
    PerPixel(ArrayView3<'a, T>),
}

impl<'a, T> DesignMatrix<'a, T> {
    pub fn n_params(&self) -> usize {
        match self {
            DesignMatrix::Shared(g) => g.ncols(),
            DesignMatrix::PerPixel(g) => g.dim().2,
        }
    }

    fn check_shape(&self, n_obs: usize, n_pt: usize) -> InsarResult<()> {
        match self {
            DesignMatrix::Shared(g) if g.nrows() != n_obs => Err(InsarError::Shape(format!(
                "G has {} rows but d has {} rows",
                g.nrows(),
                n_obs
            ))),
            DesignMatrix::PerPixel(g) if g.dim().0 != n_pt || g.dim().1 != n_obs => {
                Err(InsarError::Shape(format!(
                    "per-pixel G has shape {:?}, expected ({}, {}, n_param)",
                    g.dim(),
                    n_pt,
                    n_obs
                )))
            }
            _ => Ok(()),
        }
    }

    /// Columns `range` of the problem
    fn patch(&self, range: Range<usize>) -> DesignMatrix<'_, T> {
        match self {
            DesignMatrix::Shared(g) => DesignMatrix::Shared(g.view()),
            DesignMatrix::PerPixel(g) => DesignMatrix::PerPixel(g.slice(s![range, .., ..])),
        }
    }
}

/// Batched least-squares parameters
#[derive(Debug, Clone)]
pub struct BatchLstsqParams {
    /// Headroom multiplier on the estimated memory use of a patch
    pub safety_factor: f64,
    /// Log the progress of every patch at info level
    pub progress: bool,
}

impl Default for BatchLstsqParams {
    fn default() -> Self {
        Self {
            safety_factor: 2.0,
            progress: true,
        }
    }
}

/// Split `n_pt` columns into near-equal patches fitting the memory budget.
///
/// The memory needed for all columns is estimated as
/// `n_obs * n_pt * n_param^2 * itemsize * safety_factor`.
pub fn patch_columns(
    n_obs: usize,
    n_pt: usize,
    n_param: usize,
    itemsize: usize,
    safety_factor: f64,
    available_bytes: u64,
) -> Vec<Range<usize>> {
    if n_pt == 0 {
        return Vec::new();
    }
    let needed = n_obs as f64 * n_pt as f64 * (n_param * n_param) as f64 * itemsize as f64 * safety_factor;
    let budget = available_bytes.max(1) as f64;
    let rough = ((needed / budget).ceil() as usize).clamp(1, n_pt);

    let width = n_pt.div_ceil(rough);
    let n_patch = n_pt.div_ceil(width);
    (0..n_patch)
        .map(|i| i * width..((i + 1) * width).min(n_pt))
        .collect()
}

/// Batched least-squares solver with memory-aware patching
pub struct BatchSolver {
    params: BatchLstsqParams,
    memory: Box<dyn MemoryEstimator>,
}

impl BatchSolver {
    /// Create a solver with default parameters probing system memory
    pub fn new() -> Self {
        Self::with_params(BatchLstsqParams::default())
    }

    /// Create a solver with custom parameters probing system memory
    pub fn with_params(params: BatchLstsqParams) -> Self {
        Self {
            params,
            memory: Box::new(SystemMemory),
        }
    }

    /// Replace the memory probe
    pub fn with_memory_estimator(mut self, memory: Box<dyn MemoryEstimator>) -> Self {
        self.memory = memory;
        self
    }

    pub fn params(&self) -> &BatchLstsqParams {
        &self.params
    }

    /// Solve every column of `d`, returning a `(n_param, n_pt)` matrix
    pub fn solve<T: Real>(&self, g: DesignMatrix<'_, T>, d: ArrayView2<'_, T>) -> InsarResult<Array2<T>> {
        let safety_factor = self.params.safety_factor;
        if !(safety_factor.is_finite() && safety_factor > 0.0) {
            return Err(InsarError::InvalidParameter(format!(
                "safety factor must be positive, got {}",
                safety_factor
            )));
        }
        let (n_obs, n_pt) = d.dim();
        g.check_shape(n_obs, n_pt)?;
        let n_param = g.n_params();

        let available = self.memory.available_bytes();
        let patches = patch_columns(
            n_obs,
            n_pt,
            n_param,
            std::mem::size_of::<T>(),
            safety_factor,
            available,
        );
        log::debug!(
            "Batch least squares: {} observations x {} columns, {} parameters, {} patches ({} MB available, {} threads)",
            n_obs,
            n_pt,
            n_param,
            patches.len(),
            available / (1024 * 1024),
            rayon::current_num_threads()
        );

        let mut result = Array2::from_elem((n_param, n_pt), <T as Float>::nan());
        let n_patch = patches.len();
        for (i, cols) in patches.into_iter().enumerate() {
            let solved = censored_lstsq(g.patch(cols.clone()), d.slice(s![.., cols.clone()]))?;
            result.slice_mut(s![.., cols.clone()]).assign(&solved);
            if self.params.progress {
                log::info!("Batch least squares: patch {}/{} (columns {}..{})", i + 1, n_patch, cols.start, cols.end);
            } else {
                log::debug!("Batch least squares: patch {}/{} (columns {}..{})", i + 1, n_patch, cols.start, cols.end);
            }
        }
        Ok(result)
    }
}

impl Default for BatchSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Solve every column of `d` with default parameters and system memory probing
pub fn batch_lstsq<T: Real>(g: DesignMatrix<'_, T>, d: ArrayView2<'_, T>) -> InsarResult<Array2<T>> {
    BatchSolver::new().solve(g, d)
}

/// Least squares of all columns at once, tolerating NaN observations.
///
/// Returns a `(n_param, n_pt)` matrix; unsolvable columns are NaN.
pub fn censored_lstsq<T: Real>(g: DesignMatrix<'_, T>, d: ArrayView2<'_, T>) -> InsarResult<Array2<T>> {
    let (n_obs, n_pt) = d.dim();
    g.check_shape(n_obs, n_pt)?;
    let n_param = g.n_params();

    let mut x = Array2::from_elem((n_param, n_pt), <T as Float>::nan());
    match g {
        DesignMatrix::Shared(g) => {
            let zip = Zip::from(x.columns_mut()).and(d.columns());
            #[cfg(feature = "parallel")]
            zip.par_for_each(|out, obs| solve_column(g, obs, out));
            #[cfg(not(feature = "parallel"))]
            zip.for_each(|out, obs| solve_column(g, obs, out));
        }
        DesignMatrix::PerPixel(g) => {
            let zip = Zip::from(x.columns_mut()).and(d.columns()).and(g.outer_iter());
            #[cfg(feature = "parallel")]
            zip.par_for_each(|out, obs, g| solve_column(g, obs, out));
            #[cfg(not(feature = "parallel"))]
            zip.for_each(|out, obs, g| solve_column(g, obs, out));
        }
    }
    Ok(x)
}

/// Solve the masked normal equations `Gᵀ M G x = Gᵀ M d` of one column.
///
/// `out` is left untouched (NaN) when the column is under-determined or the
/// normal matrix is singular.
fn solve_column<T: Real>(g: ArrayView2<'_, T>, obs: ArrayView1<'_, T>, mut out: ArrayViewMut1<'_, T>) {
    let n_param = g.ncols();
    let mut normal = DMatrix::<T>::zeros(n_param, n_param);
    let mut rhs = DVector::<T>::zeros(n_param);
    let mut n_valid = 0usize;

    for (row, &value) in g.rows().into_iter().zip(obs.iter()) {
        if Float::is_nan(value) {
            continue;
        }
        n_valid += 1;
        for a in 0..n_param {
            let ga = row[a];
            if ga == T::zero() {
                continue;
            }
            rhs[a] += ga * value;
            for b in 0..n_param {
                normal[(a, b)] += ga * row[b];
            }
        }
    }

    if n_valid <= n_param {
        return;
    }
    let Some(solution) = normal.lu().solve(&rhs) else {
        return;
    };
    if solution.iter().all(|v| Float::is_finite(*v)) {
        for (o, v) in out.iter_mut().zip(solution.iter()) {
            *o = *v;
        }
    }
}
