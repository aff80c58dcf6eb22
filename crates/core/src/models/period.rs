use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::{FetchError, Result};

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2200;

/// Whether a period names a whole year or a single month.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Annual,
    Monthly,
}

/// A requested inflation period: a year, optionally narrowed to a month.
///
/// Serialized as its canonical key (`"2024"` or `"2024-03"`), which is also
/// the cache and session key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: Option<u32>,
}

impl Period {
    /// Creates a period, rejecting out-of-range years and months.
    pub fn new(year: i32, month: Option<u32>) -> Result<Self> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(FetchError::InvalidInput(format!(
                "year {} outside {}..={}",
                year, MIN_YEAR, MAX_YEAR
            )));
        }
        if let Some(m) = month {
            if !(1..=12).contains(&m) {
                return Err(FetchError::InvalidInput(format!("month {} outside 1..=12", m)));
            }
        }
        Ok(Self { year, month })
    }

    pub fn annual(year: i32) -> Result<Self> {
        Self::new(year, None)
    }

    pub fn monthly(year: i32, month: u32) -> Result<Self> {
        Self::new(year, Some(month))
    }

    /// The month containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: Some(date.month()),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> Option<u32> {
        self.month
    }

    pub fn kind(&self) -> PeriodKind {
        if self.month.is_some() {
            PeriodKind::Monthly
        } else {
            PeriodKind::Annual
        }
    }

    pub fn is_monthly(&self) -> bool {
        self.month.is_some()
    }

    /// Canonical key: `YYYY` or `YYYY-MM`.
    pub fn key(&self) -> String {
        match self.month {
            Some(m) => format!("{:04}-{:02}", self.year, m),
            None => format!("{:04}", self.year),
        }
    }

    /// First calendar day covered by the period.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last calendar day covered by the period.
    pub fn last_day(&self) -> NaiveDate {
        let (year, month) = match self.month {
            Some(12) | None => (self.year + 1, 1),
            Some(m) => (self.year, m + 1),
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// Distance in months between two periods of the same kind.
    ///
    /// Annual periods are measured in whole years expressed as months.
    pub fn months_between(&self, other: &Period) -> Option<i64> {
        if self.kind() != other.kind() {
            return None;
        }
        let index = |p: &Period| p.year as i64 * 12 + p.month.map(|m| m as i64 - 1).unwrap_or(0);
        Some((index(self) - index(other)).abs())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Period {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || FetchError::InvalidInput(format!("invalid period '{}'", s));
        match s.split_once('-') {
            Some((year, month)) => {
                let year = year.parse::<i32>().map_err(|_| invalid())?;
                let month = month.parse::<u32>().map_err(|_| invalid())?;
                Self::monthly(year, month)
            }
            None => Self::annual(s.parse::<i32>().map_err(|_| invalid())?),
        }
    }
}

impl TryFrom<String> for Period {
    type Error = FetchError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.key()
    }
}
