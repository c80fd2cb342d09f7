//! Event dates with explicit precision.
//!
//! Testimonies frequently know only the month or the year of the event they
//! describe. [`EventDate`] keeps the precision next to the date so the
//! date-based rules never treat `1994-04` as if it were `1994-04-01`.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// How much of an event date is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

/// A date of event, serialized as `YYYY-MM-DD`, `YYYY-MM` or `YYYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventDate {
    /// First day covered by the date (the day itself for day precision).
    pub date: NaiveDate,
    pub precision: DatePrecision,
}

impl EventDate {
    pub fn day(date: NaiveDate) -> Self {
        Self {
            date,
            precision: DatePrecision::Day,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.precision == DatePrecision::Day
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> Option<u32> {
        match self.precision {
            DatePrecision::Year => None,
            _ => Some(self.date.month()),
        }
    }

    /// Inclusive day interval covered by this date.
    pub fn interval(&self) -> (NaiveDate, NaiveDate) {
        match self.precision {
            DatePrecision::Day => (self.date, self.date),
            DatePrecision::Month => (self.date, last_day_of_month(self.date)),
            DatePrecision::Year => {
                let end = NaiveDate::from_ymd_opt(self.date.year(), 12, 31).unwrap_or(self.date);
                (self.date, end)
            }
        }
    }
}

fn last_day_of_month(first: NaiveDate) -> NaiveDate {
    let (y, m) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(first)
}

impl FromStr for EventDate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        // Timestamps from JSON clients ("1994-04-07T00:00:00.000Z") carry day precision.
        let s = match s.find('T') {
            Some(10) => &s[..10],
            _ => s,
        };

        let parts: Vec<&str> = s.split('-').collect();
        let parsed = match parts.as_slice() {
            [y, m, d] => {
                NaiveDate::from_ymd_opt(y.parse()?, m.parse()?, d.parse()?).map(|date| EventDate {
                    date,
                    precision: DatePrecision::Day,
                })
            }
            [y, m] => NaiveDate::from_ymd_opt(y.parse()?, m.parse()?, 1).map(|date| EventDate {
                date,
                precision: DatePrecision::Month,
            }),
            [y] => NaiveDate::from_ymd_opt(y.parse()?, 1, 1).map(|date| EventDate {
                date,
                precision: DatePrecision::Year,
            }),
            _ => None,
        };

        match parsed {
            Some(d) => Ok(d),
            None => bail!("invalid event date: '{}'", s),
        }
    }
}

impl fmt::Display for EventDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.precision {
            DatePrecision::Day => write!(f, "{}", self.date.format("%Y-%m-%d")),
            DatePrecision::Month => write!(f, "{}", self.date.format("%Y-%m")),
            DatePrecision::Year => write!(f, "{}", self.date.format("%Y")),
        }
    }
}

impl TryFrom<String> for EventDate {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EventDate> for String {
    fn from(value: EventDate) -> Self {
        value.to_string()
    }
}

/// A period the testimony covers, e.g. weeks spent in hiding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Inclusive interval with the endpoints in order.
    pub fn interval(&self) -> (NaiveDate, NaiveDate) {
        if self.start <= self.end {
            (self.start, self.end)
        } else {
            (self.end, self.start)
        }
    }
}

/// Number of days in an inclusive interval.
pub fn interval_days(interval: (NaiveDate, NaiveDate)) -> i64 {
    (interval.1 - interval.0).num_days() + 1
}

/// Days shared by two inclusive intervals (0 when disjoint).
pub fn overlap_days(a: (NaiveDate, NaiveDate), b: (NaiveDate, NaiveDate)) -> i64 {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    if end < start {
        0
    } else {
        (end - start).num_days() + 1
    }
}
