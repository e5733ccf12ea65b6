//! Calendar-day bucketing in the reporting timezone.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Timezone whose calendar days group sessions and signups.
///
/// `Local` follows the server clock's zone; `Named` pins an IANA zone so
/// results do not depend on where the service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportingTimezone {
    #[default]
    Local,
    Named(Tz),
}

impl ReportingTimezone {
    /// Calendar day that `ts` falls on.
    pub fn day_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Local => ts.with_timezone(&Local).date_naive(),
            Self::Named(tz) => ts.with_timezone(tz).date_naive(),
        }
    }

    /// First instant of `date`.
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        match self {
            Self::Local => local_midnight(&Local, date),
            Self::Named(tz) => local_midnight(tz, date),
        }
    }

    /// `[start, end)` covering one calendar day.
    pub fn day_range(&self, date: NaiveDate) -> TimeRange {
        TimeRange {
            from: Some(self.day_start(date)),
            to: Some(self.day_start(next_day(date))),
        }
    }

    /// IANA name. The local zone is named by `TZ` when that holds a known
    /// zone, and reads as `UTC` otherwise.
    pub fn name(&self) -> String {
        match self {
            Self::Local => local_zone_name(std::env::var("TZ").ok().as_deref()),
            Self::Named(tz) => tz.name().to_string(),
        }
    }
}

fn local_zone_name(tz_env: Option<&str>) -> String {
    tz_env
        .map(|v| v.trim().trim_start_matches(':'))
        .and_then(|v| v.parse::<Tz>().ok())
        .map_or_else(|| "UTC".to_string(), |tz| tz.name().to_string())
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX)
}

/// Midnight in `tz`. A midnight that falls in a DST gap resolves to the
/// same wall-clock time read as UTC.
fn local_midnight<T: TimeZone>(tz: &T, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

impl FromStr for ReportingTimezone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        s.parse::<Tz>()
            .map(Self::Named)
            .map_err(|e| Error::config(format!("unknown reporting timezone {:?}: {}", s, e)))
    }
}

impl fmt::Display for ReportingTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

impl Serialize for ReportingTimezone {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReportingTimezone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Half-open UTC time range; `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts < to)
    }
}

/// Inclusive calendar-date window as requested by a dashboard user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(Error::validation(format!(
                    "start_date {} is after end_date {}",
                    s, e
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// Parse optional `YYYY-MM-DD` strings.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        Self::new(
            start.map(parse_date).transpose()?,
            end.map(parse_date).transpose()?,
        )
    }

    /// UTC range covering every calendar day of the window.
    pub fn to_range(&self, tz: &ReportingTimezone) -> TimeRange {
        TimeRange {
            from: self.start.map(|d| tz.day_start(d)),
            to: self.end.map(|d| tz.day_start(next_day(d))),
        }
    }
}

/// Earliest year a report can ask for.
pub const MIN_REPORT_YEAR: i32 = 1970;

/// Latest year a report can ask for.
pub const MAX_REPORT_YEAR: i32 = 9999;

/// Parse a `YYYY-MM-DD` date within the reportable years.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| Error::validation(format!("invalid date {:?}, expected YYYY-MM-DD", s)))?;

    if !(MIN_REPORT_YEAR..=MAX_REPORT_YEAR).contains(&date.year()) {
        return Err(Error::validation(format!(
            "date {} outside {}-{}",
            date, MIN_REPORT_YEAR, MAX_REPORT_YEAR
        )));
    }
    Ok(date)
}
