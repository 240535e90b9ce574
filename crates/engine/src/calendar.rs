//! Calendar helpers: month keys and month arithmetic with day clamping.

use std::{fmt, str::FromStr};

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// A calendar month, rendered as `YYYY-MM`.
///
/// Ordering is chronological, so keys can be compared and used as map keys
/// for per-month accumulations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, EngineError> {
        if !(1..=12).contains(&month) {
            return Err(EngineError::InvalidInput(format!(
                "month must be between 1 and 12, got {month}"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn prev(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn first_day(self) -> NaiveDate {
        safe_date(self.year, self.month, 1)
    }

    pub fn last_day(self) -> NaiveDate {
        safe_date(self.year, self.month, 31)
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        Self::of(date) == self
    }

    /// Every month from `self` to `end`, both included.
    pub fn through(self, end: MonthKey) -> Vec<MonthKey> {
        let mut out = Vec::new();
        let mut cursor = self;
        while cursor <= end {
            out.push(cursor);
            cursor = cursor.next();
        }
        out
    }

    /// Extracts the month of a loosely formatted date (`YYYY-MM-DD…` or `DD/MM/YYYY…`).
    pub fn from_loose_date(value: &str) -> Option<Self> {
        let value = value.trim();
        let bytes = value.as_bytes();
        if bytes.len() >= 7 && bytes[4] == b'-' {
            let year = value.get(0..4)?.parse().ok()?;
            let month = value.get(5..7)?.parse().ok()?;
            return Self::new(year, month).ok();
        }
        if bytes.len() >= 10 && bytes[2] == b'/' && bytes[5] == b'/' {
            let month = value.get(3..5)?.parse().ok()?;
            let year = value.get(6..10)?.parse().ok()?;
            return Self::new(year, month).ok();
        }
        None
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_loose_date(s)
            .ok_or_else(|| EngineError::InvalidInput(format!("invalid month key: {s}")))
    }
}

impl TryFrom<String> for MonthKey {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(value: MonthKey) -> Self {
        value.to_string()
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}

/// Builds a date, clamping `day` to the last day of the month.
pub fn safe_date(year: i32, month: u32, day: u32) -> NaiveDate {
    let month = month.clamp(1, 12);
    let day = day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// Moves `date` forward by `months`, placing it on `due_day` clamped to the
/// target month's length.
pub fn add_months_on_day(date: NaiveDate, months: u32, due_day: u32) -> NaiveDate {
    let target = date
        .with_day(1)
        .and_then(|d| d.checked_add_months(Months::new(months)))
        .unwrap_or(date);
    safe_date(target.year(), target.month(), due_day)
}

/// Parses a calendar date in `YYYY-MM-DD` or `DD/MM/YYYY` form.
pub fn parse_date(value: &str) -> Result<NaiveDate, EngineError> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
        .map_err(|_| EngineError::InvalidInput(format!("invalid date: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_key_parses_both_date_forms() {
        assert_eq!(
            MonthKey::from_loose_date("2024-03-15"),
            Some(MonthKey::new(2024, 3).unwrap())
        );
        assert_eq!(
            MonthKey::from_loose_date("15/03/2024"),
            Some(MonthKey::new(2024, 3).unwrap())
        );
        assert_eq!(MonthKey::from_loose_date("march"), None);
        assert_eq!(MonthKey::new(2024, 3).unwrap().to_string(), "2024-03");
    }

    #[test]
    fn month_key_wraps_years() {
        let dec = MonthKey::new(2023, 12).unwrap();
        assert_eq!(dec.next(), MonthKey::new(2024, 1).unwrap());
        assert_eq!(dec.next().prev(), dec);
        assert_eq!(dec.through(MonthKey::new(2024, 2).unwrap()).len(), 3);
    }

    #[test]
    fn add_months_clamps_to_month_end() {
        let base = date(2024, 1, 31);
        assert_eq!(add_months_on_day(base, 1, 31), date(2024, 2, 29));
        assert_eq!(add_months_on_day(base, 2, 31), date(2024, 3, 31));
        assert_eq!(add_months_on_day(base, 3, 31), date(2024, 4, 30));
        assert_eq!(add_months_on_day(date(2023, 11, 10), 2, 10), date(2024, 1, 10));
    }

    #[test]
    fn safe_date_clamps_day() {
        assert_eq!(safe_date(2023, 2, 30), date(2023, 2, 28));
        assert_eq!(safe_date(2024, 4, 0), date(2024, 4, 1));
    }

    #[test]
    fn parse_date_accepts_iso_and_brazilian_forms() {
        assert_eq!(parse_date("2024-05-06").unwrap(), date(2024, 5, 6));
        assert_eq!(parse_date("06/05/2024").unwrap(), date(2024, 5, 6));
        assert!(parse_date("2024/05/06").is_err());
    }
}
