use crate::core::lstsq::{BatchLstsqParams, BatchSolver, DesignMatrix, MemoryEstimator};
use crate::core::pairs::Pairs;
use crate::core::tsmodels::TimeSeriesModel;
use crate::types::{DesignBlock, InsarError, InsarResult, Observations, Precision};
use ndarray::{concatenate, s, Array2, Axis};
use std::fmt;

/// Default weight of the model block in an NSBAS design matrix
pub const DEFAULT_GAMMA: f64 = 1e-4;

/// Replace masked observations with NaN, the missing-data convention of the
/// solver. `mask == true` marks a missing value.
pub fn fill_masked(values: &Observations, mask: &Array2<bool>) -> InsarResult<Observations> {
    if values.dim() != mask.dim() {
        return Err(InsarError::Shape(format!(
            "mask shape {:?} does not match values shape {:?}",
            mask.dim(),
            values.dim()
        )));
    }
    let mut filled = values.clone();
    ndarray::Zip::from(&mut filled).and(mask).for_each(|v, &missing| {
        if missing {
            *v = f64::NAN;
        }
    });
    Ok(filled)
}

/// Builds the SBAS/NSBAS system `d = G m`.
///
/// `G` depends only on the pair network (and the model), so the observations
/// can be swapped with [`NSBASMatrixFactory::rebind_observations`] to invert
/// several tiles without rebuilding it.
pub struct NSBASMatrixFactory {
    pairs: Pairs,
    model: Option<Box<dyn TimeSeriesModel>>,
    gamma: f64,
    g: DesignBlock,
    d: Observations,
}

impl NSBASMatrixFactory {
    /// Create a factory from observations `unw` of shape `(n_pairs, n_pixels)`.
    ///
    /// Without a model the plain SBAS matrix is used and `gamma` is ignored.
    pub fn new(
        unw: Observations,
        pairs: Pairs,
        model: Option<Box<dyn TimeSeriesModel>>,
        gamma: f64,
    ) -> InsarResult<Self> {
        let g = match &model {
            Some(model) => {
                if !(gamma > 0.0) {
                    return Err(InsarError::InvalidParameter(format!(
                        "gamma must be positive, got {}",
                        gamma
                    )));
                }
                Self::make_nsbas_matrix(&pairs, &**model, gamma)?
            }
            None => pairs.to_matrix(),
        };

        let mut factory = Self {
            pairs,
            model,
            gamma,
            g,
            d: Array2::zeros((0, 0)),
        };
        factory.rebind_observations(unw)?;

        log::info!("Built {}", factory);
        log::debug!("G shape: {:?}, d shape: {:?}", factory.g.dim(), factory.d.dim());
        Ok(factory)
    }

    /// Plain SBAS system without a time-series model
    pub fn sbas(unw: Observations, pairs: Pairs) -> InsarResult<Self> {
        Self::new(unw, pairs, None, DEFAULT_GAMMA)
    }

    /// Create a factory from pair names, kept in the given order
    pub fn from_names<S: AsRef<str>>(
        unw: Observations,
        names: &[S],
        model: Option<Box<dyn TimeSeriesModel>>,
        gamma: f64,
    ) -> InsarResult<Self> {
        Self::new(unw, Pairs::from_names(names)?, model, gamma)
    }

    fn make_nsbas_matrix(pairs: &Pairs, model: &dyn TimeSeriesModel, gamma: f64) -> InsarResult<DesignBlock> {
        let n_date = pairs.dates().len();
        let n_pair = pairs.len();
        if n_date == 0 {
            return Err(InsarError::Model(
                "cannot build an NSBAS matrix for an empty pair network".to_string(),
            ));
        }
        let g_br = model.g_br();
        if g_br.nrows() != n_date {
            return Err(InsarError::Model(format!(
                "{} has {} dates but the pairs have {} dates",
                model.name(),
                g_br.nrows(),
                n_date
            )));
        }
        let n_param = g_br.ncols();
        let n_inc = n_date - 1;

        let mut g = Array2::zeros((n_pair + n_date, n_inc + n_param));
        g.slice_mut(s![..n_pair, ..n_inc]).assign(&pairs.to_matrix());
        // cumulative increments up to each date follow the model
        for i in 1..n_date {
            g.slice_mut(s![n_pair + i, ..i]).fill(gamma);
        }
        g.slice_mut(s![n_pair.., n_inc..]).assign(&(g_br * gamma));
        Ok(g)
    }

    /// Replace the observations, keeping `G`.
    ///
    /// `unw` must have one row per pair; it is padded with one zero row per
    /// date when a model is present.
    pub fn rebind_observations(&mut self, unw: Observations) -> InsarResult<()> {
        if unw.nrows() != self.pairs.len() {
            return Err(InsarError::Shape(format!(
                "input unw must have the same rows number as pairs number ({} != {})",
                unw.nrows(),
                self.pairs.len()
            )));
        }
        self.d = match self.model {
            Some(_) => {
                let padding = Array2::zeros((self.pairs.dates().len(), unw.ncols()));
                concatenate(Axis(0), &[unw.view(), padding.view()])
                    .map_err(|e| InsarError::Shape(e.to_string()))?
            }
            None => unw,
        };
        Ok(())
    }

    pub fn pairs(&self) -> &Pairs {
        &self.pairs
    }

    pub fn model(&self) -> Option<&dyn TimeSeriesModel> {
        self.model.as_deref()
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Design matrix `G`
    pub fn g(&self) -> &DesignBlock {
        &self.g
    }

    /// Observation matrix `d`, including the zero padding of the model block
    pub fn d(&self) -> &Observations {
        &self.d
    }

    /// Number of model parameters, zero without a model
    pub fn n_params(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.n_params())
    }
}

impl fmt::Display for NSBASMatrixFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = match &self.model {
            Some(m) => format!("{}(dates: {}, unit: {})", m.name(), m.dates().len(), m.unit()),
            None => "None".to_string(),
        };
        write!(
            f,
            "NSBASMatrixFactory(pairs: {}, model: {}, gamma: {}, G shape: {:?}, d shape: {:?})",
            self.pairs,
            model,
            self.gamma,
            self.g.dim(),
            self.d.dim()
        )
    }
}

/// NSBAS inversion parameters
#[derive(Debug, Clone, Default)]
pub struct InversionParams {
    /// Floating point precision of the solve
    pub precision: Precision,
    /// Patching and progress options of the batched solver
    pub batch: BatchLstsqParams,
}

/// Output of an NSBAS inversion, one column per pixel
#[derive(Debug, Clone)]
pub struct InversionResult {
    /// Increments between consecutive dates, `(n_dates - 1, n_pt)`
    pub incs: Array2<f64>,
    /// Model parameters, `(n_params, n_pt)`.
    ///
    /// The model rows are `gamma * (cumsum(incs) + G_br * params) = 0`, so the
    /// parameters describe the negated cumulative series: a series growing at
    /// `v` per unit time yields a velocity of `-v`.
    pub params: Array2<f64>,
    /// Residual of the pair observations, `(n_pairs, n_pt)`
    pub residual_pair: Array2<f64>,
    /// Residual of the model block, `(n_dates, n_pt)` or empty without a model
    pub residual_tsm: Array2<f64>,
}

impl InversionResult {
    /// `(incs, params, residual_pair, residual_tsm)`
    pub fn into_parts(self) -> (Array2<f64>, Array2<f64>, Array2<f64>, Array2<f64>) {
        (self.incs, self.params, self.residual_pair, self.residual_tsm)
    }

    /// Cumulative values per date, starting at zero, `(n_dates, n_pt)`
    pub fn cumulative(&self) -> Array2<f64> {
        let (n_inc, n_pt) = self.incs.dim();
        let mut cum = Array2::zeros((n_inc + 1, n_pt));
        for i in 0..n_inc {
            let next = &cum.row(i) + &self.incs.row(i);
            cum.row_mut(i + 1).assign(&next);
        }
        cum
    }
}

/// Batched NSBAS inversion over all columns of a factory's observations
pub struct NSBASInversion<'a> {
    factory: &'a NSBASMatrixFactory,
    solver: BatchSolver,
    precision: Precision,
}

impl<'a> NSBASInversion<'a> {
    pub fn new(factory: &'a NSBASMatrixFactory) -> Self {
        Self::with_params(factory, InversionParams::default())
    }

    pub fn with_params(factory: &'a NSBASMatrixFactory, params: InversionParams) -> Self {
        Self {
            factory,
            solver: BatchSolver::with_params(params.batch),
            precision: params.precision,
        }
    }

    /// Replace the memory probe used to size patches
    pub fn with_memory_estimator(mut self, memory: Box<dyn MemoryEstimator>) -> Self {
        self.solver = self.solver.with_memory_estimator(memory);
        self
    }

    /// Solve the system and split unknowns and residuals.
    ///
    /// Columns that could not be solved are NaN in every output.
    pub fn inverse(&self) -> InsarResult<InversionResult> {
        let g = self.factory.g();
        let d = self.factory.d();
        let n_pair = self.factory.pairs().len();
        let n_param = self.factory.n_params();
        let n_unknown = g.ncols();
        log::info!(
            "NSBAS inversion: {} pairs, {} unknowns, {} columns ({:?} precision)",
            n_pair,
            n_unknown,
            d.ncols(),
            self.precision
        );

        let x = match self.precision {
            Precision::Double => self.solver.solve(DesignMatrix::Shared(g.view()), d.view())?,
            Precision::Single => {
                let g32 = g.mapv(|v| v as f32);
                let d32 = d.mapv(|v| v as f32);
                self.solver
                    .solve(DesignMatrix::Shared(g32.view()), d32.view())?
                    .mapv(f64::from)
            }
        };

        let residual = d - &g.dot(&x);
        let n_inc = n_unknown - n_param;

        let result = InversionResult {
            incs: x.slice(s![..n_inc, ..]).to_owned(),
            params: x.slice(s![n_inc.., ..]).to_owned(),
            residual_pair: residual.slice(s![..n_pair, ..]).to_owned(),
            residual_tsm: residual.slice(s![n_pair.., ..]).to_owned(),
        };
        let unsolved = result
            .incs
            .columns()
            .into_iter()
            .filter(|c| c.iter().any(|v| v.is_nan()))
            .count();
        if unsolved > 0 {
            log::debug!("{} of {} columns could not be solved", unsolved, d.ncols());
        }
        log::info!("NSBAS inversion finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tsmodels::LinearModel;
    use crate::types::TimeUnit;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn example_pairs() -> Pairs {
        Pairs::from_names(&["20200101_20200201", "20200201_20200301", "20200101_20200301"]).unwrap()
    }

    fn quiet() -> InversionParams {
        InversionParams {
            batch: BatchLstsqParams {
                progress: false,
                ..BatchLstsqParams::default()
            },
            ..InversionParams::default()
        }
    }

    #[test]
    fn test_sbas_example() {
        let unw = array![[1.0], [2.0], [3.0]];
        let factory = NSBASMatrixFactory::sbas(unw, example_pairs()).unwrap();
        assert_eq!(factory.g().dim(), (3, 2));
        assert_eq!(factory.d().dim(), (3, 1));

        let result = NSBASInversion::with_params(&factory, quiet()).inverse().unwrap();
        assert_abs_diff_eq!(result.incs[[0, 0]], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(result.incs[[1, 0]], 2.0, epsilon = 1e-10);
        assert_eq!(result.params.dim(), (0, 1));
        assert_eq!(result.residual_tsm.dim(), (0, 1));
        assert!(result.residual_pair.iter().all(|r| r.abs() < 1e-10));
    }

    #[test]
    fn test_nsbas_matrix_layout() {
        let pairs = example_pairs();
        let model = LinearModel::new(pairs.dates(), TimeUnit::Day).unwrap();
        let unw = Array2::zeros((3, 4));
        let factory = NSBASMatrixFactory::new(unw, pairs, Some(Box::new(model)), 0.5).unwrap();

        let g = factory.g();
        assert_eq!(g.dim(), (6, 4));
        assert_eq!(factory.d().dim(), (6, 4));
        // pair block
        assert_eq!(g.slice(s![..3, ..2]), array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        assert!(g.slice(s![..3, 2..]).iter().all(|v| *v == 0.0));
        // lower triangular block scaled by gamma
        assert_eq!(g.slice(s![3.., ..2]), array![[0.0, 0.0], [0.5, 0.0], [0.5, 0.5]]);
        // model block: spans 0, 31, 60 days
        assert_eq!(g.slice(s![3.., 2..]), array![[0.0, 0.5], [15.5, 0.5], [30.0, 0.5]]);
        assert!(factory.d().slice(s![3.., ..]).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_factory_validation() {
        let pairs = example_pairs();
        let model = LinearModel::new(pairs.dates(), TimeUnit::Day).unwrap();
        let bad_gamma = NSBASMatrixFactory::new(
            Array2::zeros((3, 1)),
            pairs.clone(),
            Some(Box::new(model.clone())),
            0.0,
        );
        assert!(matches!(bad_gamma, Err(InsarError::InvalidParameter(_))));

        let bad_rows = NSBASMatrixFactory::sbas(Array2::zeros((2, 1)), pairs.clone());
        assert!(matches!(bad_rows, Err(InsarError::Shape(_))));

        let other = LinearModel::new(&pairs.dates()[..2], TimeUnit::Day).unwrap();
        let mismatch = NSBASMatrixFactory::new(Array2::zeros((3, 1)), pairs, Some(Box::new(other)), 1.0);
        assert!(matches!(mismatch, Err(InsarError::Model(_))));
    }

    #[test]
    fn test_rebind_observations() {
        let pairs = example_pairs();
        let model = LinearModel::new(pairs.dates(), TimeUnit::Day).unwrap();
        let mut factory =
            NSBASMatrixFactory::new(Array2::zeros((3, 1)), pairs, Some(Box::new(model)), DEFAULT_GAMMA).unwrap();
        let g_before = factory.g().clone();

        factory.rebind_observations(Array2::ones((3, 7))).unwrap();
        assert_eq!(factory.d().dim(), (6, 7));
        assert_eq!(factory.g(), &g_before);
        assert!(factory.rebind_observations(Array2::ones((4, 7))).is_err());
    }

    #[test]
    fn test_fill_masked() {
        let values = array![[1.0, 2.0], [3.0, 4.0]];
        let mask = array![[false, true], [false, false]];
        let filled = fill_masked(&values, &mask).unwrap();
        assert!(filled[[0, 1]].is_nan());
        assert_eq!(filled[[1, 1]], 4.0);
        assert!(fill_masked(&values, &Array2::from_elem((1, 2), false)).is_err());
    }

    #[test]
    fn test_cumulative() {
        let result = InversionResult {
            incs: array![[1.0, 2.0], [3.0, -1.0]],
            params: Array2::zeros((0, 2)),
            residual_pair: Array2::zeros((0, 2)),
            residual_tsm: Array2::zeros((0, 2)),
        };
        assert_eq!(result.cumulative(), array![[0.0, 0.0], [1.0, 2.0], [4.0, 1.0]]);
    }
}
