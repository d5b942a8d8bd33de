//! Billing periods.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A billing month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    first_day: NaiveDate,
}

impl Period {
    /// Build a period from a year and a 1-based month.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the month is out of range.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|first_day| Self { first_day })
            .ok_or_else(|| Error::validation(format!("invalid period {year:04}-{month:02}")))
    }

    /// The period containing today (UTC).
    #[must_use]
    pub fn current() -> Self {
        Self::containing(Utc::now().date_naive())
    }

    /// The period containing `date`.
    #[must_use]
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            first_day: date.with_day(1).unwrap_or(date),
        }
    }

    /// First day of the month.
    #[must_use]
    pub fn first_day(self) -> NaiveDate {
        self.first_day
    }

    /// The date invoices of this period fall due.
    ///
    /// `due_day` is validated to 1..=28 by configuration, so it exists in
    /// every month; larger values are clamped to the 28th.
    #[must_use]
    pub fn due_date(self, due_day: u32) -> NaiveDate {
        self.first_day
            .with_day(due_day.clamp(1, 28))
            .unwrap_or(self.first_day)
    }

    /// The period `n` months earlier.
    #[must_use]
    pub fn months_back(self, n: u32) -> Self {
        Self {
            first_day: self
                .first_day
                .checked_sub_months(Months::new(n))
                .unwrap_or(self.first_day),
        }
    }

    /// The `count` periods ending with this one, oldest first.
    #[must_use]
    pub fn trailing(self, count: u32) -> Vec<Self> {
        (0..count).rev().map(|n| self.months_back(n)).collect()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.first_day.year(), self.first_day.month())
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::validation(format!("period '{s}' must be formatted YYYY-MM"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

impl rusqlite::types::ToSql for Period {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(rusqlite::types::ToSqlOutput::from(self.to_string()))
    }
}

impl rusqlite::types::FromSql for Period {
    fn column_result(
        value: rusqlite::types::ValueRef<'_>,
    ) -> rusqlite::types::FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: Error| rusqlite::types::FromSqlError::Other(e.to_string().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let period: Period = "2026-03".parse().unwrap();
        assert_eq!(period.to_string(), "2026-03");
        assert_eq!(period.first_day(), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("2026-13".parse::<Period>().is_err());
        assert!("2026-3".parse::<Period>().is_err());
        assert!("March".parse::<Period>().is_err());
        assert!("26-03".parse::<Period>().is_err());
    }

    #[test]
    fn test_due_date() {
        let period: Period = "2026-02".parse().unwrap();
        assert_eq!(
            period.due_date(15),
            NaiveDate::from_ymd_opt(2026, 2, 15).unwrap()
        );
        assert_eq!(
            period.due_date(31),
            NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()
        );
    }

    #[test]
    fn test_trailing_crosses_year() {
        let period: Period = "2026-02".parse().unwrap();
        let months: Vec<String> = period.trailing(4).iter().map(ToString::to_string).collect();
        assert_eq!(months, vec!["2025-11", "2025-12", "2026-01", "2026-02"]);
    }

    #[test]
    fn test_serde_as_string() {
        let period: Period = "2025-12".parse().unwrap();
        assert_eq!(serde_json::to_string(&period).unwrap(), "\"2025-12\"");
        let back: Period = serde_json::from_str("\"2025-12\"").unwrap();
        assert_eq!(back, period);
    }
}
