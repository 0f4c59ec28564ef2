//! Time window derivation — week, month, and year windows with half-open
//! boundaries, always computed in UTC via calendar arithmetic.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use engage_core::{EngageError, EngageResult};

/// Window size. Weeks start on Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Week,
    Month,
    Year,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Granularity {
    type Err = EngageError;

    fn from_str(s: &str) -> EngageResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            other => Err(EngageError::Config(format!(
                "unknown granularity: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Prev,
    Next,
}

/// A half-open `[start, end)` span with both bounds at midnight UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Granularity,
}

impl TimeWindow {
    /// Start inclusive, end exclusive.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// The window of the given granularity containing `reference`.
///
/// A reference on a boundary truncates to its own window's start: the first
/// of March belongs to March, not February.
pub fn window_for(reference: DateTime<Utc>, granularity: Granularity) -> TimeWindow {
    let date = reference.date_naive();
    let start = window_start(date, granularity);
    let end = window_end(start, granularity);
    TimeWindow {
        start: midnight(start),
        end: midnight(end),
        granularity,
    }
}

/// Shifts the window one unit of its own granularity and re-derives the
/// boundaries. Month and year lengths vary, so the shift goes through
/// calendar arithmetic rather than a fixed offset.
pub fn navigate(window: &TimeWindow, direction: Direction) -> TimeWindow {
    let start = window.start.date_naive();
    let shifted = match (window.granularity, direction) {
        (Granularity::Week, Direction::Next) => start.checked_add_days(Days::new(7)),
        (Granularity::Week, Direction::Prev) => start.checked_sub_days(Days::new(7)),
        (Granularity::Month, Direction::Next) => start.checked_add_months(Months::new(1)),
        (Granularity::Month, Direction::Prev) => start.checked_sub_months(Months::new(1)),
        (Granularity::Year, Direction::Next) => start.checked_add_months(Months::new(12)),
        (Granularity::Year, Direction::Prev) => start.checked_sub_months(Months::new(12)),
    }
    .unwrap_or(start);

    window_for(midnight(shifted), window.granularity)
}

fn window_start(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Week => {
            let back = u64::from(date.weekday().num_days_from_sunday());
            date.checked_sub_days(Days::new(back)).unwrap_or(date)
        }
        Granularity::Month => date.with_day(1).unwrap_or(date),
        Granularity::Year => date
            .with_day(1)
            .and_then(|d| d.with_month(1))
            .unwrap_or(date),
    }
}

fn window_end(start: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Week => start.checked_add_days(Days::new(7)).unwrap_or(start),
        Granularity::Month => start.checked_add_months(Months::new(1)).unwrap_or(start),
        Granularity::Year => start.checked_add_months(Months::new(12)).unwrap_or(start),
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(NaiveTime::MIN), Utc)
}
