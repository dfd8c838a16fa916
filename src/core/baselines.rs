use crate::core::inversion::{InversionParams, NSBASInversion, NSBASMatrixFactory, DEFAULT_GAMMA};
use crate::core::lstsq::BatchLstsqParams;
use crate::core::pairs::Pairs;
use crate::core::tsmodels::LinearModel;
use crate::types::{InsarError, InsarResult, TimeUnit};
use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cumulative baseline of every acquisition, relative to the first one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baselines {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl Baselines {
    /// Create baselines from dates in any order; they are stored sorted by date
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> InsarResult<Self> {
        if dates.len() != values.len() {
            return Err(InsarError::Shape(format!(
                "The length of dates ({}) and values ({}) should be the same",
                dates.len(),
                values.len()
            )));
        }
        let mut entries: Vec<(NaiveDate, f64)> = dates.into_iter().zip(values).collect();
        entries.sort_by_key(|(date, _)| *date);
        if let Some(w) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(InsarError::InvalidDate(format!(
                "duplicate baseline date {}",
                w[0].0
            )));
        }
        let (dates, values) = entries.into_iter().unzip();
        Ok(Self { dates, values })
    }

    /// Invert pair-wise values (one per pair) into cumulative values per date.
    ///
    /// Uses an NSBAS inversion regularized by a linear model so that
    /// disconnected sub-networks still get consistent values.
    pub fn from_pair_wise(pairs: &Pairs, values: &[f64]) -> InsarResult<Self> {
        if values.len() != pairs.len() {
            return Err(InsarError::Shape(format!(
                "{} values given for {} pairs",
                values.len(),
                pairs.len()
            )));
        }
        let model = LinearModel::new(pairs.dates(), TimeUnit::Day)?;
        let unw = Array2::from_shape_vec((values.len(), 1), values.to_vec())
            .map_err(|e| InsarError::Shape(e.to_string()))?;
        let factory = NSBASMatrixFactory::new(unw, pairs.clone(), Some(Box::new(model)), DEFAULT_GAMMA)?;

        let params = InversionParams {
            batch: BatchLstsqParams {
                progress: false,
                ..BatchLstsqParams::default()
            },
            ..InversionParams::default()
        };
        let result = NSBASInversion::with_params(&factory, params).inverse()?;
        let cumulative = result.cumulative();

        Self::new(pairs.dates().to_vec(), cumulative.column(0).to_vec())
    }

    /// Pair-wise differences `value[secondary] - value[primary]` keyed by pair name
    pub fn to_pair_wise(&self, pairs: &Pairs) -> InsarResult<Vec<(String, f64)>> {
        pairs
            .iter()
            .map(|pair| {
                let primary = self.value_at(pair.primary())?;
                let secondary = self.value_at(pair.secondary())?;
                Ok((pair.name(), secondary - primary))
            })
            .collect()
    }

    fn value_at(&self, date: NaiveDate) -> InsarResult<f64> {
        self.get(date)
            .ok_or_else(|| InsarError::InvalidDate(format!("no baseline for date {}", date)))
    }

    /// Baseline of `date`, if it is an acquisition
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|i| self.values[i])
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(date, value)` of every acquisition
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }
}

impl fmt::Display for Baselines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Baselines(num={})", self.len())
    }
}
