//! How often a recurring rule repeats and how to step from one occurrence to the next.

use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month};

use crate::Error;

/// How often a recurring rule repeats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// Every day.
    Daily,
    /// Every seven days.
    Weekly,
    /// A calendar month of variable length.
    Monthly,
    /// A calendar year, 365 or 366 days.
    Yearly,
}

impl Interval {
    /// The lowercase name used for serialization and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "daily",
            Interval::Weekly => "weekly",
            Interval::Monthly => "monthly",
            Interval::Yearly => "yearly",
        }
    }

    /// Advance `date` by exactly one interval.
    ///
    /// Monthly and yearly steps keep the day of the month. If the target month
    /// is too short, the extra days roll over into the following month, e.g.
    /// 2024-01-31 plus one month is 2024-03-02 and 2024-02-29 plus one year is
    /// 2025-03-01. The rolled over date is not snapped back to the end of the
    /// month.
    ///
    /// Dates saturate at [Date::MAX].
    pub fn advance(&self, date: Date) -> Date {
        match self {
            Interval::Daily => date.saturating_add(Duration::days(1)),
            Interval::Weekly => date.saturating_add(Duration::weeks(1)),
            Interval::Monthly => {
                let (year, month) = match date.month() {
                    Month::December => (date.year() + 1, Month::January),
                    month => (date.year(), month.next()),
                };

                add_calendar_day(year, month, date.day())
            }
            Interval::Yearly => add_calendar_day(date.year() + 1, date.month(), date.day()),
        }
    }
}

/// Resolve `day` within `year`/`month`, letting days past the end of the
/// month overflow into the next one.
fn add_calendar_day(year: i32, month: Month, day: u8) -> Date {
    Date::from_calendar_date(year, month, 1)
        .map(|first_of_month| first_of_month.saturating_add(Duration::days(i64::from(day) - 1)))
        .unwrap_or(Date::MAX)
}

impl Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = Error;

    /// Parse an interval name, ignoring case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an [Error::InvalidInterval] if `s` is not one of daily, weekly,
    /// monthly or yearly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Interval::Daily),
            "weekly" => Ok(Interval::Weekly),
            "monthly" => Ok(Interval::Monthly),
            "yearly" => Ok(Interval::Yearly),
            _ => Err(Error::InvalidInterval(s.to_owned())),
        }
    }
}

impl ToSql for Interval {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Interval {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;

        text.parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}
