use crate::types::{InsarError, InsarResult, TimeUnit};
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use std::f64::consts::PI;
use std::fmt;

/// Parametric time-series model used to regularize an NSBAS inversion.
///
/// A model provides the bottom-right block `G_br` of the NSBAS design matrix,
/// one row per acquisition date and one column per model parameter.
pub trait TimeSeriesModel: fmt::Debug + Send + Sync {
    /// Short model name used in logs
    fn name(&self) -> &'static str;

    /// Acquisition dates the model is evaluated at
    fn dates(&self) -> &[NaiveDate];

    fn unit(&self) -> TimeUnit;

    /// Time since the first acquisition, in [`TimeSeriesModel::unit`]
    fn date_spans(&self) -> &Array1<f64>;

    /// Model block of the design matrix, shape `(n_dates, n_params)`
    fn g_br(&self) -> &Array2<f64>;

    fn param_names(&self) -> &[&'static str];

    fn n_params(&self) -> usize {
        self.param_names().len()
    }
}

/// Dates and time spans shared by all models
#[derive(Debug, Clone)]
pub struct Timeline {
    dates: Vec<NaiveDate>,
    unit: TimeUnit,
    date_spans: Array1<f64>,
}

impl Timeline {
    pub fn new(dates: &[NaiveDate], unit: TimeUnit) -> InsarResult<Self> {
        let Some(first) = dates.first() else {
            return Err(InsarError::Model(
                "a time series model needs at least one date".to_string(),
            ));
        };
        let date_spans = dates
            .iter()
            .map(|d| unit.from_days((*d - *first).num_days() as f64))
            .collect();
        Ok(Self {
            dates: dates.to_vec(),
            unit,
            date_spans,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn date_spans(&self) -> &Array1<f64> {
        &self.date_spans
    }

    /// Change the unit, rescaling the existing spans
    pub fn set_unit(&mut self, unit: TimeUnit) {
        if unit == self.unit {
            return;
        }
        let factor = match unit {
            TimeUnit::Year => 1.0 / TimeUnit::DAYS_PER_YEAR,
            TimeUnit::Day => TimeUnit::DAYS_PER_YEAR,
        };
        self.date_spans.mapv_inplace(|s| s * factor);
        self.unit = unit;
    }

    /// Replace the dates, recomputing the spans in the current unit
    pub fn set_dates(&mut self, dates: &[NaiveDate]) -> InsarResult<()> {
        *self = Self::new(dates, self.unit)?;
        Ok(())
    }
}

/// Linear model: `velocity * t + constant`
#[derive(Debug, Clone)]
pub struct LinearModel {
    timeline: Timeline,
    g_br: Array2<f64>,
}

impl LinearModel {
    const PARAM_NAMES: [&'static str; 2] = ["velocity", "constant"];

    pub fn new(dates: &[NaiveDate], unit: TimeUnit) -> InsarResult<Self> {
        let timeline = Timeline::new(dates, unit)?;
        let g_br = Self::design(timeline.date_spans());
        Ok(Self { timeline, g_br })
    }

    fn design(spans: &Array1<f64>) -> Array2<f64> {
        Array2::from_shape_fn((spans.len(), 2), |(i, j)| if j == 0 { spans[i] } else { 1.0 })
    }

    pub fn set_unit(&mut self, unit: TimeUnit) {
        self.timeline.set_unit(unit);
        self.g_br = Self::design(self.timeline.date_spans());
    }

    pub fn set_dates(&mut self, dates: &[NaiveDate]) -> InsarResult<()> {
        self.timeline.set_dates(dates)?;
        self.g_br = Self::design(self.timeline.date_spans());
        Ok(())
    }
}

impl TimeSeriesModel for LinearModel {
    fn name(&self) -> &'static str {
        "LinearModel"
    }

    fn dates(&self) -> &[NaiveDate] {
        self.timeline.dates()
    }

    fn unit(&self) -> TimeUnit {
        self.timeline.unit()
    }

    fn date_spans(&self) -> &Array1<f64> {
        self.timeline.date_spans()
    }

    fn g_br(&self) -> &Array2<f64> {
        &self.g_br
    }

    fn param_names(&self) -> &[&'static str] {
        &Self::PARAM_NAMES
    }
}

/// Linear trend plus an annual sinusoid.
///
/// Columns: `t`, `sin(ωt)`, `cos(ωt)`, `1` with a period of one year.
#[derive(Debug, Clone)]
pub struct AnnualSinusoidalModel {
    timeline: Timeline,
    g_br: Array2<f64>,
}

impl AnnualSinusoidalModel {
    const PARAM_NAMES: [&'static str; 4] = ["velocity", "sine", "cosine", "constant"];

    pub fn new(dates: &[NaiveDate], unit: TimeUnit) -> InsarResult<Self> {
        let timeline = Timeline::new(dates, unit)?;
        let g_br = Self::design(timeline.date_spans(), unit);
        Ok(Self { timeline, g_br })
    }

    fn design(spans: &Array1<f64>, unit: TimeUnit) -> Array2<f64> {
        let omega = match unit {
            TimeUnit::Day => 2.0 * PI / TimeUnit::DAYS_PER_YEAR,
            TimeUnit::Year => 2.0 * PI,
        };
        Array2::from_shape_fn((spans.len(), 4), |(i, j)| match j {
            0 => spans[i],
            1 => (omega * spans[i]).sin(),
            2 => (omega * spans[i]).cos(),
            _ => 1.0,
        })
    }

    pub fn set_unit(&mut self, unit: TimeUnit) {
        self.timeline.set_unit(unit);
        self.g_br = Self::design(self.timeline.date_spans(), unit);
    }

    pub fn set_dates(&mut self, dates: &[NaiveDate]) -> InsarResult<()> {
        self.timeline.set_dates(dates)?;
        self.g_br = Self::design(self.timeline.date_spans(), self.timeline.unit());
        Ok(())
    }
}

impl TimeSeriesModel for AnnualSinusoidalModel {
    fn name(&self) -> &'static str {
        "AnnualSinusoidalModel"
    }

    fn dates(&self) -> &[NaiveDate] {
        self.timeline.dates()
    }

    fn unit(&self) -> TimeUnit {
        self.timeline.unit()
    }

    fn date_spans(&self) -> &Array1<f64> {
        self.timeline.date_spans()
    }

    fn g_br(&self) -> &Array2<f64> {
        &self.g_br
    }

    fn param_names(&self) -> &[&'static str] {
        &Self::PARAM_NAMES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn dates() -> Vec<NaiveDate> {
        ["2020-01-01", "2020-01-13", "2020-02-06", "2021-01-01"]
            .iter()
            .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap())
            .collect()
    }

    #[test]
    fn test_linear_model_design() {
        let model = LinearModel::new(&dates(), TimeUnit::Day).unwrap();
        assert_eq!(model.g_br().dim(), (4, 2));
        assert_eq!(model.param_names(), &["velocity", "constant"]);
        assert_eq!(model.date_spans().to_vec(), vec![0.0, 12.0, 36.0, 366.0]);
        assert_eq!(model.g_br()[[2, 0]], 36.0);
        assert!(model.g_br().column(1).iter().all(|v| *v == 1.0));
    }

    #[test]
    fn test_unit_rescaling() {
        let mut model = LinearModel::new(&dates(), TimeUnit::Day).unwrap();
        model.set_unit(TimeUnit::Year);
        assert_eq!(model.unit(), TimeUnit::Year);
        assert_abs_diff_eq!(model.date_spans()[3], 366.0 / 365.25, epsilon = 1e-12);
        assert_abs_diff_eq!(model.g_br()[[3, 0]], 366.0 / 365.25, epsilon = 1e-12);

        model.set_unit(TimeUnit::Day);
        assert_abs_diff_eq!(model.date_spans()[1], 12.0, epsilon = 1e-9);

        let yearly = LinearModel::new(&dates(), TimeUnit::Year).unwrap();
        assert_abs_diff_eq!(yearly.date_spans()[2], 36.0 / 365.25, epsilon = 1e-12);
    }

    #[test]
    fn test_set_dates_rebuilds_design() {
        let mut model = AnnualSinusoidalModel::new(&dates(), TimeUnit::Day).unwrap();
        assert_eq!(model.n_params(), 4);
        model.set_dates(&dates()[..2]).unwrap();
        assert_eq!(model.g_br().dim(), (2, 4));
        assert_abs_diff_eq!(model.g_br()[[0, 2]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(model.g_br()[[0, 1]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_dates_rejected() {
        assert!(matches!(
            LinearModel::new(&[], TimeUnit::Day),
            Err(InsarError::Model(_))
        ));
        assert!("week".parse::<TimeUnit>().is_err());
    }
}
