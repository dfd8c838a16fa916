//! Core time-series InSAR modules

pub mod dates;
pub mod pairs;
pub mod pairs_factory;
pub mod tsmodels;
pub mod baselines;
pub mod lstsq;
pub mod inversion;

// Re-export main types
pub use dates::{parse_date, parse_date_with, season_of_month, str_to_dates, NameParser};
pub use pairs::{Pair, Pairs, PairsSelector, SortKey, PAIR_DATE_FORMAT};
pub use pairs_factory::PairsFactory;
pub use tsmodels::{AnnualSinusoidalModel, LinearModel, TimeSeriesModel, Timeline};
pub use baselines::Baselines;
pub use lstsq::{
    batch_lstsq, censored_lstsq, patch_columns, BatchLstsqParams, BatchSolver, DesignMatrix,
    FixedMemory, MemoryEstimator, SystemMemory,
};
pub use inversion::{
    fill_masked, InversionParams, InversionResult, NSBASInversion, NSBASMatrixFactory, DEFAULT_GAMMA,
};
