//! tsinsar: Time-Series InSAR Network Inversion
//!
//! This library models networks of interferometric pairs and inverts stacks of
//! pair-wise observations into per-acquisition time series using SBAS or
//! model-regularized NSBAS least squares, solved in memory-bounded batches.

pub mod types;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{DesignBlock, InsarError, InsarResult, Observations, Precision, Real, TimeUnit};

pub use crate::core::{
    batch_lstsq, censored_lstsq, Baselines, BatchLstsqParams, BatchSolver, DesignMatrix, InversionParams,
    InversionResult, LinearModel, NSBASInversion, NSBASMatrixFactory, Pair, Pairs, PairsFactory,
    TimeSeriesModel,
};
