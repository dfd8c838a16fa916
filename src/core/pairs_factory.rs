use crate::core::dates::{month_day, mmdd_value};
use crate::core::pairs::Pairs;
use crate::types::InsarResult;
use chrono::{Datelike, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;

/// Generator of interferometric pair networks from acquisition dates
#[derive(Debug, Clone)]
pub struct PairsFactory {
    dates: Vec<NaiveDate>,
}

/// Acquisitions falling in one seasonal window
struct Window {
    year: i32,
    dates: Vec<NaiveDate>,
}

impl PairsFactory {
    /// Create a factory from acquisition dates in any order, duplicates allowed
    pub fn new<I: IntoIterator<Item = NaiveDate>>(dates: I) -> Self {
        let unique: BTreeSet<NaiveDate> = dates.into_iter().collect();
        Self {
            dates: unique.into_iter().collect(),
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    fn years(&self) -> Vec<i32> {
        let years: BTreeSet<i32> = self.dates.iter().map(|d| d.year()).collect();
        years.into_iter().collect()
    }

    fn between(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        self.dates
            .iter()
            .filter(|d| start <= **d && **d <= end)
            .copied()
            .collect()
    }

    /// Dates of the `MMDD` window starting in every year. A window whose end
    /// is not later in the year than its start wraps into the next year.
    fn windows(&self, start: &str, end: &str) -> InsarResult<Vec<Window>> {
        let same_year = mmdd_value(start)? < mmdd_value(end)?;
        let mut windows = Vec::new();
        for year in self.years() {
            let window_start = month_day(year, start)?;
            let window_end = if same_year {
                month_day(year, end)?
            } else {
                month_day(year + 1, end)?
            };
            let dates = self.between(window_start, window_end);
            if !dates.is_empty() {
                windows.push(Window { year, dates });
            }
        }
        Ok(windows)
    }

    fn build(raw: Vec<(NaiveDate, NaiveDate)>) -> InsarResult<Pairs> {
        Pairs::new(raw.into_iter().filter(|(a, b)| a != b))
    }

    /// Pair every acquisition with the next `max_interval` acquisitions whose
    /// time span is below `max_day` days.
    pub fn from_interval(&self, max_interval: usize, max_day: i64) -> InsarResult<Pairs> {
        let mut raw = Vec::new();
        for (i, date) in self.dates.iter().enumerate() {
            for next in self.dates.iter().skip(i + 1).take(max_interval) {
                if (*next - *date).num_days() >= max_day {
                    break;
                }
                raw.push((*date, *next));
            }
        }
        log::debug!("Generated {} pairs by interval", raw.len());
        Self::build(raw)
    }

    /// Pair randomly selected acquisitions of each winter with those of the
    /// following `max_winter_interval` winters.
    ///
    /// Winters are `MMDD` windows such as `0101`..`0331`; useful to link
    /// completely frozen periods across years in permafrost regions.
    pub fn linking_winter<R: Rng + ?Sized>(
        &self,
        winter_start: &str,
        winter_end: &str,
        n_per_winter: usize,
        max_winter_interval: usize,
        rng: &mut R,
    ) -> InsarResult<Pairs> {
        let mut winters = self.windows(winter_start, winter_end)?;
        for winter in winters.iter_mut() {
            winter.dates.shuffle(rng);
            winter.dates.truncate(n_per_winter);
        }

        let mut raw = Vec::new();
        for (i, winter) in winters.iter().enumerate() {
            for primary in &winter.dates {
                for later in winters.iter().skip(i + 1).take(max_winter_interval) {
                    raw.extend(later.dates.iter().map(|secondary| (*primary, *secondary)));
                }
            }
        }
        Self::build(raw)
    }

    /// Pair the acquisitions of each period with those of all later periods.
    ///
    /// `n_per_period` limits the randomly kept acquisitions per period,
    /// `n_primary_period` limits how many leading periods act as primaries and
    /// `primary_years` restricts primaries to the listed years.
    pub fn from_period<R: Rng + ?Sized>(
        &self,
        period_start: &str,
        period_end: &str,
        n_per_period: Option<usize>,
        n_primary_period: Option<usize>,
        primary_years: Option<&[i32]>,
        rng: &mut R,
    ) -> InsarResult<Pairs> {
        let mut periods = self.windows(period_start, period_end)?;
        for period in periods.iter_mut() {
            period.dates.shuffle(rng);
            if let Some(n) = n_per_period {
                period.dates.truncate(n);
            }
        }

        let mut raw = Vec::new();
        for (i, period) in periods.iter().enumerate() {
            if n_primary_period.is_some_and(|n| i + 1 > n) {
                break;
            }
            if primary_years.is_some_and(|years| !years.contains(&period.year)) {
                continue;
            }
            for primary in &period.dates {
                for later in &periods[i + 1..] {
                    raw.extend(later.dates.iter().map(|secondary| (*primary, *secondary)));
                }
            }
        }
        Self::build(raw)
    }

    /// Pair every summer with the preceding winter (thawing) and the
    /// following winter (freezing).
    pub fn from_summer_winter(
        &self,
        summer_start: &str,
        summer_end: &str,
        winter_start: &str,
        winter_end: &str,
    ) -> InsarResult<Pairs> {
        let summer_end_value = mmdd_value(summer_end)?;
        let winter_after_summer = mmdd_value(winter_start)? > summer_end_value;
        let winter_end_late = mmdd_value(winter_end)? > summer_end_value;

        let mut raw = Vec::new();
        for year in self.years() {
            let summer = self.between(month_day(year, summer_start)?, month_day(year, summer_end)?);

            let (w_start1, w_start2, w_end1, w_end2) = if winter_after_summer {
                let (end1, end2) = if winter_end_late {
                    (year - 1, year)
                } else {
                    (year, year + 1)
                };
                (
                    month_day(year - 1, winter_start)?,
                    month_day(year, winter_start)?,
                    month_day(end1, winter_end)?,
                    month_day(end2, winter_end)?,
                )
            } else {
                (
                    month_day(year, winter_start)?,
                    month_day(year + 1, winter_start)?,
                    month_day(year, winter_end)?,
                    month_day(year + 1, winter_end)?,
                )
            };

            let winter_before = self.between(w_start1, w_end1);
            let winter_after = self.between(w_start2, w_end2);

            for summer_date in &summer {
                raw.extend(winter_before.iter().map(|w| (*w, *summer_date)));
                raw.extend(winter_after.iter().map(|w| (*summer_date, *w)));
            }
        }
        Self::build(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn every_days(start: NaiveDate, step: i64, n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| start + chrono::Duration::days(step * i as i64))
            .collect()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_from_interval() {
        let factory = PairsFactory::new(every_days(ymd(2020, 1, 1), 12, 5));
        let pairs = factory.from_interval(2, 180).unwrap();
        // 4 neighbours + 3 second neighbours
        assert_eq!(pairs.len(), 7);
        assert!(pairs.days().iter().all(|d| *d == 12 || *d == 24));

        let short = factory.from_interval(3, 20).unwrap();
        assert_eq!(short.len(), 4);
    }

    #[test]
    fn test_linking_winter() {
        let dates: Vec<NaiveDate> = (2019..2022)
            .flat_map(|y| vec![ymd(y, 1, 10), ymd(y, 2, 10), ymd(y, 7, 1)])
            .collect();
        let factory = PairsFactory::new(dates);
        let mut rng = StdRng::seed_from_u64(7);
        let pairs = factory.linking_winter("0101", "0331", 5, 1, &mut rng).unwrap();
        // 2 winter dates x 2 winter dates for each of the two neighbouring winters
        assert_eq!(pairs.len(), 8);
        assert!(pairs.iter().all(|p| p.primary().month() <= 3 && p.secondary().month() <= 3));

        let limited = factory.linking_winter("0101", "0331", 1, 2, &mut rng).unwrap();
        assert_eq!(limited.len(), 3);
    }

    #[test]
    fn test_from_period() {
        let dates: Vec<NaiveDate> = (2019..2022).map(|y| ymd(y, 2, 1)).collect();
        let factory = PairsFactory::new(dates);
        let mut rng = StdRng::seed_from_u64(1);

        let all = factory
            .from_period("0101", "0331", None, None, None, &mut rng)
            .unwrap();
        assert_eq!(all.len(), 3);

        let first_only = factory
            .from_period("0101", "0331", None, Some(1), None, &mut rng)
            .unwrap();
        assert_eq!(first_only.len(), 2);

        let from_2020 = factory
            .from_period("0101", "0331", None, None, Some(&[2020][..]), &mut rng)
            .unwrap();
        assert_eq!(from_2020.names(), vec!["20200201_20210201"]);
    }

    #[test]
    fn test_from_summer_winter() {
        let dates = vec![ymd(2019, 12, 15), ymd(2020, 8, 15), ymd(2020, 12, 15)];
        let factory = PairsFactory::new(dates);
        let pairs = factory
            .from_summer_winter("0801", "1001", "1201", "0331")
            .unwrap();
        assert_eq!(
            pairs.names(),
            vec!["20191215_20200815", "20200815_20201215"]
        );
    }
}
