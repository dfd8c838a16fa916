use crate::types::{InsarError, InsarResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Date formats tried in order by the default parser
const DEFAULT_FORMATS: [&str; 4] = ["%Y%m%d", "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Parse a date string with the flexible default rules.
///
/// Accepts compact (`20200101`), dashed, slashed and dotted dates as well as
/// RFC 3339 / ISO timestamps, whose time part is dropped.
pub fn parse_date(s: &str) -> InsarResult<NaiveDate> {
    let s = s.trim();
    for fmt in DEFAULT_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.date());
    }
    Err(InsarError::InvalidDate(format!(
        "String '{}' cannot be converted to a date",
        s
    )))
}

/// Parse a date string with an explicit chrono format
pub fn parse_date_with(s: &str, format: &str) -> InsarResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), format).map_err(|e| {
        InsarError::InvalidDate(format!(
            "String '{}' does not match format '{}': {}",
            s, format, e
        ))
    })
}

/// Parser turning pair names such as `S1_20200101_20200201` into dates
#[derive(Debug, Clone, Default)]
pub struct NameParser {
    /// Chrono format of each date token. `None` uses [`parse_date`].
    pub date_format: Option<String>,
}

impl NameParser {
    /// Parser using the flexible default date rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser forcing a chrono format for the date tokens
    pub fn with_format(format: impl Into<String>) -> Self {
        Self {
            date_format: Some(format.into()),
        }
    }

    /// Parse a single date token
    pub fn parse_date(&self, token: &str) -> InsarResult<NaiveDate> {
        match &self.date_format {
            Some(fmt) => parse_date_with(token, fmt),
            None => parse_date(token),
        }
    }

    /// Parse the last two `_`-separated tokens of a name as dates
    pub fn parse_pair(&self, name: &str) -> InsarResult<(NaiveDate, NaiveDate)> {
        let dates = str_to_dates(name, 2, self)?;
        Ok((dates[0], dates[1]))
    }
}

/// Extract `length` dates from the last `_`-separated tokens of `date_str`.
///
/// `length == 0` parses every token.
pub fn str_to_dates(date_str: &str, length: usize, parser: &NameParser) -> InsarResult<Vec<NaiveDate>> {
    let items: Vec<&str> = date_str.split('_').collect();
    let tokens = if length == 0 {
        &items[..]
    } else if items.len() >= length {
        &items[items.len() - length..]
    } else {
        return Err(InsarError::InvalidPairName(format!(
            "The number of dates in {} is less than {}",
            date_str, length
        )));
    };

    tokens
        .iter()
        .map(|token| parser.parse_date(token))
        .collect::<InsarResult<Vec<_>>>()
        .map_err(|e| {
            log::error!("Dates in {} not recognized: {}", date_str, e);
            InsarError::InvalidPairName(format!("Dates in {} not recognized: {}", date_str, e))
        })
}

/// Season of a month: 1 spring, 2 summer, 3 fall, 4 winter
pub fn season_of_month(month: u32) -> InsarResult<u32> {
    if !(1..=12).contains(&month) {
        return Err(InsarError::InvalidDate(format!(
            "Month should be in range 1-12. But got '{}'",
            month
        )));
    }
    Ok((month + 9) % 12 / 3 + 1)
}

/// Build the date `year`-`MMDD`
pub(crate) fn month_day(year: i32, mmdd: &str) -> InsarResult<NaiveDate> {
    let invalid = || InsarError::InvalidDate(format!("'{}' is not a valid MMDD string", mmdd));
    if mmdd.len() != 4 || !mmdd.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let month: u32 = mmdd[..2].parse().map_err(|_| invalid())?;
    let day: u32 = mmdd[2..].parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        InsarError::InvalidDate(format!("{}{} is not a valid calendar date", year, mmdd))
    })
}

/// Numeric value of an `MMDD` string, used to compare window bounds
pub(crate) fn mmdd_value(mmdd: &str) -> InsarResult<u32> {
    mmdd.parse()
        .map_err(|_| InsarError::InvalidDate(format!("'{}' is not a valid MMDD string", mmdd)))
}
