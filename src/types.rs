use nalgebra::RealField;
use ndarray::{Array2, LinalgScalar};
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// Pair-wise observation matrix (pairs x pixels). Missing values are NaN.
pub type Observations = Array2<f64>;

/// Design matrix mapping unknowns to observations
pub type DesignBlock = Array2<f64>;

/// Floating point type usable by the batched least-squares solver.
///
/// Implemented for `f32` and `f64`; selects the compute precision of an
/// inversion.
pub trait Real: RealField + Float + LinalgScalar + Send + Sync {}

impl Real for f32 {}
impl Real for f64 {}

/// Compute precision of an inversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    /// 32-bit floats
    Single,
    /// 64-bit floats
    #[default]
    Double,
}

/// Unit of the time spans used by time-series models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeUnit {
    #[default]
    Day,
    Year,
}

impl TimeUnit {
    /// Days per year used for unit conversion
    pub const DAYS_PER_YEAR: f64 = 365.25;

    /// Convert a span in days into this unit
    pub fn from_days(&self, days: f64) -> f64 {
        match self {
            TimeUnit::Day => days,
            TimeUnit::Year => days / Self::DAYS_PER_YEAR,
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeUnit::Day => write!(f, "day"),
            TimeUnit::Year => write!(f, "year"),
        }
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = InsarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(TimeUnit::Day),
            "year" => Ok(TimeUnit::Year),
            _ => Err(InsarError::InvalidParameter(format!(
                "unit must be either day or year, got '{}'",
                s
            ))),
        }
    }
}

/// Error types for pair networks and inversions
#[derive(Debug, thiserror::Error)]
pub enum InsarError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid pair name: {0}")]
    InvalidPairName(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Index {index} out of range. Pairs number is {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Time series model error: {0}")]
    Model(String),
}

/// Result type for network and inversion operations
pub type InsarResult<T> = Result<T, InsarError>;
