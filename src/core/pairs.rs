use crate::core::dates::{parse_date, NameParser};
use crate::types::{InsarError, InsarResult};
use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Date format used in pair names
pub const PAIR_DATE_FORMAT: &str = "%Y%m%d";

/// One interferometric pair of acquisition dates.
///
/// The primary date is always earlier than the secondary date; the order of
/// the inputs is normalized on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    primary: NaiveDate,
    secondary: NaiveDate,
}

impl Pair {
    /// Create a pair from two distinct dates in any order
    pub fn new(a: NaiveDate, b: NaiveDate) -> InsarResult<Self> {
        if a == b {
            return Err(InsarError::InvalidDate(format!(
                "A pair needs two different dates, got {} twice",
                a
            )));
        }
        let (primary, secondary) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { primary, secondary })
    }

    /// Create a pair from a name like `20200101_20200201`
    pub fn from_name(name: &str, parser: &NameParser) -> InsarResult<Self> {
        let (a, b) = parser.parse_pair(name)?;
        Self::new(a, b)
    }

    pub fn primary(&self) -> NaiveDate {
        self.primary
    }

    pub fn secondary(&self) -> NaiveDate {
        self.secondary
    }

    /// Time span of the pair in days
    pub fn days(&self) -> i64 {
        (self.secondary - self.primary).num_days()
    }

    /// Name with format `%Y%m%d_%Y%m%d`
    pub fn name(&self) -> String {
        format!(
            "{}_{}",
            self.primary.format(PAIR_DATE_FORMAT),
            self.secondary.format(PAIR_DATE_FORMAT)
        )
    }

    pub fn primary_string(&self, date_format: &str) -> String {
        self.primary.format(date_format).to_string()
    }

    pub fn secondary_string(&self, date_format: &str) -> String {
        self.secondary.format(date_format).to_string()
    }

    /// Whether the pair starts or ends at `date`
    pub fn touches(&self, date: NaiveDate) -> bool {
        self.primary == date || self.secondary == date
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Field used to order a [`Pairs`] network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Full (primary, secondary) tuple
    Pairs,
    Primary,
    Secondary,
    Days,
}

impl std::str::FromStr for SortKey {
    type Err = InsarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pairs" => Ok(SortKey::Pairs),
            "primary" => Ok(SortKey::Primary),
            "secondary" => Ok(SortKey::Secondary),
            "days" => Ok(SortKey::Days),
            _ => Err(InsarError::InvalidParameter(format!(
                "order should be one of ['pairs', 'primary', 'secondary', 'days'], but got '{}'",
                s
            ))),
        }
    }
}

/// Selection of a sub-network from [`Pairs`]
#[derive(Debug, Clone, PartialEq)]
pub enum PairsSelector {
    /// Positional slice, clamped to the network size like a slice
    Slice {
        start: Option<usize>,
        stop: Option<usize>,
        step: Option<usize>,
    },
    /// Pairs with both dates inside the inclusive range. Open ends default to
    /// the first/last acquisition.
    DateRange {
        start: Option<NaiveDate>,
        stop: Option<NaiveDate>,
    },
    /// Pairs touching the date
    Date(NaiveDate),
    /// Pairs at the given positions
    Indices(Vec<usize>),
    /// Pairs where the mask is true
    Mask(Vec<bool>),
}

/// Bound of a textual selector
enum Bound {
    Open,
    Position(usize),
    Date(NaiveDate),
}

fn parse_bound(token: &str) -> InsarResult<Bound> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(Bound::Open);
    }
    if token.len() != 8 {
        if let Ok(pos) = token.parse::<usize>() {
            return Ok(Bound::Position(pos));
        }
    }
    parse_date(token).map(Bound::Date)
}

/// A temporal network of interferometric pairs.
///
/// Keeps the sorted unique acquisition dates and the position of both ends of
/// every pair in those dates (the edge index).
#[derive(Debug, Clone, Default)]
pub struct Pairs {
    pairs: Vec<Pair>,
    dates: Vec<NaiveDate>,
    edge_index: Vec<[usize; 2]>,
}

impl Pairs {
    /// Build a sorted, deduplicated network from raw date pairs
    pub fn new<I>(raw: I) -> InsarResult<Self>
    where
        I: IntoIterator<Item = (NaiveDate, NaiveDate)>,
    {
        Self::with_sort(raw, true)
    }

    /// Build a network from raw date pairs, optionally sorting it
    pub fn with_sort<I>(raw: I, sort: bool) -> InsarResult<Self>
    where
        I: IntoIterator<Item = (NaiveDate, NaiveDate)>,
    {
        let pairs = raw
            .into_iter()
            .map(|(a, b)| Pair::new(a, b))
            .collect::<InsarResult<Vec<_>>>()?;
        Ok(Self::from_pairs(pairs, sort))
    }

    /// Build a network from [`Pair`] values
    pub fn from_pairs(pairs: Vec<Pair>, sort: bool) -> Self {
        let mut network = Self {
            pairs,
            ..Self::default()
        };
        network.parse_meta();
        if sort {
            network.sort_unchecked(&[SortKey::Pairs], true);
        }
        network
    }

    /// Build an unsorted network from pair names, keeping the input order
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> InsarResult<Self> {
        Self::from_names_with(names, &NameParser::default())
    }

    /// Build an unsorted network from pair names with a custom date parser
    pub fn from_names_with<S: AsRef<str>>(names: &[S], parser: &NameParser) -> InsarResult<Self> {
        Self::from_names_fn(names, |name| parser.parse_pair(name))
    }

    /// Build an unsorted network from pair names with a custom parse function
    pub fn from_names_fn<S, F>(names: &[S], parse: F) -> InsarResult<Self>
    where
        S: AsRef<str>,
        F: Fn(&str) -> InsarResult<(NaiveDate, NaiveDate)>,
    {
        let pairs = names
            .iter()
            .map(|name| {
                let (a, b) = parse(name.as_ref())?;
                Pair::new(a, b)
            })
            .collect::<InsarResult<Vec<_>>>()?;
        Ok(Self::from_pairs(pairs, false))
    }

    fn parse_meta(&mut self) {
        let dates: BTreeSet<NaiveDate> = self
            .pairs
            .iter()
            .flat_map(|p| [p.primary, p.secondary])
            .collect();
        self.dates = dates.into_iter().collect();
        self.edge_index = self
            .pairs
            .iter()
            .map(|p| {
                [
                    self.dates.partition_point(|d| *d < p.primary),
                    self.dates.partition_point(|d| *d < p.secondary),
                ]
            })
            .collect();
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Shape of the pair table `(n_pairs, 2)`
    pub fn shape(&self) -> (usize, usize) {
        (self.pairs.len(), 2)
    }

    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    /// Sorted unique acquisition dates of all pairs
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Positions of the primary and secondary date of each pair in [`Pairs::dates`]
    pub fn edge_index(&self) -> &[[usize; 2]] {
        &self.edge_index
    }

    pub fn primary(&self) -> Vec<NaiveDate> {
        self.pairs.iter().map(|p| p.primary).collect()
    }

    pub fn secondary(&self) -> Vec<NaiveDate> {
        self.pairs.iter().map(|p| p.secondary).collect()
    }

    /// Time span of all pairs in days
    pub fn days(&self) -> Vec<i64> {
        self.pairs.iter().map(Pair::days).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.to_names(None)
    }

    /// Pair names, optionally prefixed with `prefix_`
    pub fn to_names(&self, prefix: Option<&str>) -> Vec<String> {
        self.pairs
            .iter()
            .map(|p| match prefix {
                Some(prefix) if !prefix.is_empty() => format!("{}_{}", prefix, p.name()),
                _ => p.name(),
            })
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pair> {
        self.pairs.iter()
    }

    pub fn get(&self, index: usize) -> Option<Pair> {
        self.pairs.get(index).copied()
    }

    /// Pair at `index`
    pub fn pair(&self, index: usize) -> InsarResult<Pair> {
        self.get(index).ok_or(InsarError::IndexOutOfRange {
            index,
            len: self.len(),
        })
    }

    /// Select a sub-network. An empty network is returned when nothing matches.
    pub fn select(&self, selector: PairsSelector) -> InsarResult<Pairs> {
        let selected: Vec<Pair> = match selector {
            PairsSelector::Slice { start, stop, step } => {
                let stop = stop.unwrap_or(self.len()).min(self.len());
                let start = start.unwrap_or(0).min(stop);
                let step = step.unwrap_or(1);
                if step == 0 {
                    return Err(InsarError::InvalidParameter(
                        "slice step cannot be zero".to_string(),
                    ));
                }
                self.pairs[start..stop].iter().step_by(step).copied().collect()
            }
            PairsSelector::DateRange { start, stop } => {
                if let (Some(start), Some(stop)) = (start, stop) {
                    check_date_range(start, stop)?;
                }
                let (Some(first), Some(last)) = (self.dates.first(), self.dates.last()) else {
                    return Ok(Pairs::default());
                };
                let start = start.unwrap_or(*first);
                let stop = stop.unwrap_or(*last);
                check_date_range(start, stop)?;
                let inside = |d: NaiveDate| start <= d && d <= stop;
                self.pairs
                    .iter()
                    .filter(|p| inside(p.primary) && inside(p.secondary))
                    .copied()
                    .collect()
            }
            PairsSelector::Date(date) => self.pairs.iter().filter(|p| p.touches(date)).copied().collect(),
            PairsSelector::Indices(indices) => indices
                .into_iter()
                .map(|i| self.pair(i))
                .collect::<InsarResult<Vec<_>>>()?,
            PairsSelector::Mask(mask) => {
                if mask.len() != self.len() {
                    return Err(InsarError::InvalidRange(format!(
                        "mask length {} does not match pairs number {}",
                        mask.len(),
                        self.len()
                    )));
                }
                self.pairs
                    .iter()
                    .zip(mask)
                    .filter_map(|(p, keep)| keep.then_some(*p))
                    .collect()
            }
        };
        Ok(Pairs::from_pairs(selected, true))
    }

    /// Select with a textual expression: `start:stop` with positions or dates
    /// on either side (each may be empty), or a single date.
    ///
    /// A bound of exactly 8 digits is always read as a compact `YYYYMMDD` date,
    /// never as a position.
    ///
    /// Mixing a position and a date is not supported: a warning is logged and
    /// an empty network is returned.
    pub fn select_expr(&self, expr: &str) -> InsarResult<Pairs> {
        let Some((start, stop)) = expr.split_once(':') else {
            return self.select(PairsSelector::Date(parse_date(expr)?));
        };
        let selector = match (parse_bound(start)?, parse_bound(stop)?) {
            (Bound::Date(_), Bound::Position(_)) | (Bound::Position(_), Bound::Date(_)) => {
                log::warn!("Unsupported slice index '{}' for Pairs", expr);
                return Ok(Pairs::default());
            }
            (Bound::Date(start), Bound::Date(stop)) => PairsSelector::DateRange {
                start: Some(start),
                stop: Some(stop),
            },
            (Bound::Date(start), Bound::Open) => PairsSelector::DateRange {
                start: Some(start),
                stop: None,
            },
            (Bound::Open, Bound::Date(stop)) => PairsSelector::DateRange {
                start: None,
                stop: Some(stop),
            },
            (start, stop) => {
                let position = |b: Bound| match b {
                    Bound::Position(p) => Some(p),
                    _ => None,
                };
                PairsSelector::Slice {
                    start: position(start),
                    stop: position(stop),
                    step: None,
                }
            }
        };
        self.select(selector)
    }

    /// Mask of the pairs that are also in `other`
    pub fn mask_of(&self, other: &Pairs) -> Vec<bool> {
        let wanted: BTreeSet<&Pair> = other.pairs.iter().collect();
        self.pairs.iter().map(|p| wanted.contains(p)).collect()
    }

    /// Positions of the pairs that are also in `other`
    pub fn positions_of(&self, other: &Pairs) -> Vec<usize> {
        self.mask_of(other)
            .into_iter()
            .enumerate()
            .filter_map(|(i, hit)| hit.then_some(i))
            .collect()
    }

    /// Pairs present in both networks
    pub fn intersect(&self, other: &Pairs) -> Pairs {
        let kept = self
            .pairs
            .iter()
            .zip(self.mask_of(other))
            .filter_map(|(p, hit)| hit.then_some(*p))
            .collect();
        Pairs::from_pairs(kept, true)
    }

    /// Unique, sorted union of both networks
    pub fn union(&self, other: &Pairs) -> Pairs {
        let all: BTreeSet<Pair> = self.pairs.iter().chain(other.pairs.iter()).copied().collect();
        Pairs::from_pairs(all.into_iter().collect(), false)
    }

    /// Pairs of this network that are not in `other`, sorted
    pub fn difference(&self, other: &Pairs) -> Pairs {
        let removed: BTreeSet<&Pair> = other.pairs.iter().collect();
        let kept: BTreeSet<Pair> = self
            .pairs
            .iter()
            .filter(|p| !removed.contains(p))
            .copied()
            .collect();
        Pairs::from_pairs(kept.into_iter().collect(), false)
    }

    /// Sort in place by the given keys, dropping exact duplicates
    pub fn sort(&mut self, order: &[SortKey], ascending: bool) -> InsarResult<()> {
        if order.is_empty() {
            return Err(InsarError::InvalidParameter(
                "at least one sort key is required".to_string(),
            ));
        }
        self.sort_unchecked(order, ascending);
        Ok(())
    }

    /// Sorted copy and the original position of every kept pair
    pub fn sorted(&self, order: &[SortKey], ascending: bool) -> InsarResult<(Pairs, Vec<usize>)> {
        if order.is_empty() {
            return Err(InsarError::InvalidParameter(
                "at least one sort key is required".to_string(),
            ));
        }
        let index = self.sort_index(order, ascending);
        let pairs = index.iter().map(|&i| self.pairs[i]).collect();
        Ok((Pairs::from_pairs(pairs, false), index))
    }

    fn sort_unchecked(&mut self, order: &[SortKey], ascending: bool) {
        if self.is_empty() {
            return;
        }
        let index = self.sort_index(order, ascending);
        self.pairs = index.iter().map(|&i| self.pairs[i]).collect();
        self.parse_meta();
    }

    fn sort_index(&self, order: &[SortKey], ascending: bool) -> Vec<usize> {
        let key = |p: &Pair| -> Vec<i64> {
            let mut k: Vec<i64> = order
                .iter()
                .flat_map(|key| match key {
                    SortKey::Pairs => vec![day_number(p.primary), day_number(p.secondary)],
                    SortKey::Primary => vec![day_number(p.primary)],
                    SortKey::Secondary => vec![day_number(p.secondary)],
                    SortKey::Days => vec![p.days()],
                })
                .collect();
            // Full pair as the final tie-breaker keeps the order total
            k.extend([day_number(p.primary), day_number(p.secondary)]);
            k
        };

        let mut index: Vec<usize> = (0..self.len()).collect();
        index.sort_by_cached_key(|&i| key(&self.pairs[i]));
        index.dedup_by(|a, b| self.pairs[*a] == self.pairs[*b]);
        if !ascending {
            index.reverse();
        }
        index
    }

    /// SBAS design matrix of shape `(n_pairs, n_dates - 1)`.
    ///
    /// Row `i` is one over the intervals between the primary and the secondary
    /// date of pair `i` and zero elsewhere.
    pub fn to_matrix(&self) -> Array2<f64> {
        let n_dates = self.dates.len();
        if n_dates == 0 {
            return Array2::zeros((0, 0));
        }
        let mut matrix = Array2::zeros((self.len(), n_dates - 1));
        for (row, [start, end]) in self.edge_index.iter().enumerate() {
            matrix
                .slice_mut(ndarray::s![row, *start..*end])
                .fill(1.0);
        }
        matrix
    }

    /// Acquisitions never reached as the secondary date of any pair.
    ///
    /// The first acquisition is never a gap. Pairs in `pairs_removed` are
    /// ignored when looking for coverage.
    pub fn parse_gaps(&self, pairs_removed: Option<&Pairs>) -> Vec<NaiveDate> {
        if self.dates.len() <= 1 {
            return Vec::new();
        }
        let valid = match pairs_removed {
            Some(removed) => self.difference(removed),
            None => self.clone(),
        };
        let covered: BTreeSet<NaiveDate> = valid.pairs.iter().map(|p| p.secondary).collect();
        self.dates[1..]
            .iter()
            .filter(|d| !covered.contains(d))
            .copied()
            .collect()
    }
}

fn check_date_range(start: NaiveDate, stop: NaiveDate) -> InsarResult<()> {
    if start > stop {
        return Err(InsarError::InvalidRange(format!(
            "Index start {} should be earlier than index stop {}",
            start, stop
        )));
    }
    Ok(())
}

fn day_number(date: NaiveDate) -> i64 {
    i64::from(chrono::Datelike::num_days_from_ce(&date))
}

impl PartialEq for Pairs {
    fn eq(&self, other: &Self) -> bool {
        self.pairs == other.pairs
    }
}

impl Eq for Pairs {}

impl std::hash::Hash for Pairs {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.pairs.hash(state);
    }
}

impl fmt::Display for Pairs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pairs({})", self.len())
    }
}

impl<'a> IntoIterator for &'a Pairs {
    type Item = &'a Pair;
    type IntoIter = std::slice::Iter<'a, Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

impl From<Pair> for Pairs {
    fn from(pair: Pair) -> Self {
        Pairs::from_pairs(vec![pair], false)
    }
}

impl std::ops::Add for &Pairs {
    type Output = Pairs;

    fn add(self, other: &Pairs) -> Pairs {
        self.union(other)
    }
}

impl std::ops::Sub for &Pairs {
    type Output = Pairs;

    fn sub(self, other: &Pairs) -> Pairs {
        self.difference(other)
    }
}
