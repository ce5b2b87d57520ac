//! Period resolution for analytics queries.
//!
//! Every aggregated endpoint is scoped by a half-open window `[start, end)`.
//! Windows come either from a named preset anchored at the request instant or
//! from explicit bounds; the comparison window is always the immediately
//! preceding window of identical length.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PulseError, Result};

/// Longest custom window accepted when config does not override it.
pub const DEFAULT_MAX_RANGE_DAYS: i64 = 366;

/// Explicit bounds must fall inside these calendar years.
const MIN_YEAR: i32 = 1970;
const MAX_YEAR: i32 = 9999;

/// Source of the anchor instant for named presets.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant (tests, reproducible exports).
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePreset {
    Last7Days,
    Last30Days,
    Last90Days,
    Custom,
}

impl RangePreset {
    pub fn days(self) -> Option<i64> {
        match self {
            RangePreset::Last7Days => Some(7),
            RangePreset::Last30Days => Some(30),
            RangePreset::Last90Days => Some(90),
            RangePreset::Custom => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RangePreset::Last7Days => "last-7-days",
            RangePreset::Last30Days => "last-30-days",
            RangePreset::Last90Days => "last-90-days",
            RangePreset::Custom => "custom",
        }
    }
}

impl FromStr for RangePreset {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last-7-days" => Ok(RangePreset::Last7Days),
            "last-30-days" => Ok(RangePreset::Last30Days),
            "last-90-days" => Ok(RangePreset::Last90Days),
            "custom" => Ok(RangePreset::Custom),
            other => Err(PulseError::InvalidRange(format!(
                "unknown range preset '{}'",
                other
            ))),
        }
    }
}

/// Half-open window `[start, end)`. `start < end` holds for every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(PulseError::InvalidRange(format!(
                "start ({}) must be before end ({})",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// `days` whole UTC days ending at the close of the anchor's day.
    pub fn trailing_days(anchor: DateTime<Utc>, days: i64) -> Result<Self> {
        if days <= 0 {
            return Err(PulseError::InvalidRange(format!(
                "preset length must be positive, got {} days",
                days
            )));
        }
        let end = midnight(anchor.date_naive()) + Duration::days(1);
        Self::new(end - Duration::days(days), end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The window of identical length ending where this one starts.
    pub fn previous(&self) -> Result<Self> {
        let start = self
            .start
            .checked_sub_signed(self.duration())
            .ok_or_else(|| PulseError::InvalidRange("preceding window is out of range".to_string()))?;
        Self::new(start, self.start)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Hourly buckets for windows up to 48 hours, daily otherwise.
    pub fn granularity(&self) -> Granularity {
        if self.duration() <= Duration::hours(48) {
            Granularity::Hour
        } else {
            Granularity::Day
        }
    }

    /// Start instant of every bucket overlapping the window, in order.
    pub fn bucket_starts(&self, granularity: Granularity) -> Vec<DateTime<Utc>> {
        let step = granularity.step();
        let mut cursor = granularity.truncate(self.start);
        let mut buckets = Vec::new();
        while cursor < self.end {
            buckets.push(cursor);
            cursor += step;
        }
        buckets
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
}

impl Granularity {
    pub fn step(self) -> Duration {
        match self {
            Granularity::Hour => Duration::hours(1),
            Granularity::Day => Duration::days(1),
        }
    }

    pub fn truncate(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let day = midnight(ts.date_naive());
        match self {
            Granularity::Hour => day + Duration::hours(i64::from(ts.hour())),
            Granularity::Day => day,
        }
    }
}

/// Raw period parameters as they arrive from a caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeriodQuery {
    pub range: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl PeriodQuery {
    pub fn explicit(start: &str, end: &str) -> Self {
        Self {
            range: None,
            start: Some(start.to_string()),
            end: Some(end.to_string()),
        }
    }

    pub fn preset(token: &str) -> Self {
        Self {
            range: Some(token.to_string()),
            start: None,
            end: None,
        }
    }
}

/// Resolve caller parameters into the current window.
///
/// A named preset wins over explicit bounds; `custom` or no preset at all
/// requires both `start` and `end`, at most `max_days` apart.
pub fn resolve(query: &PeriodQuery, anchor: DateTime<Utc>, max_days: i64) -> Result<DateRange> {
    let preset = match non_empty(query.range.as_deref()) {
        Some(token) => token.parse::<RangePreset>()?,
        None => RangePreset::Custom,
    };

    if let Some(days) = preset.days() {
        return DateRange::trailing_days(anchor, days);
    }

    match (non_empty(query.start.as_deref()), non_empty(query.end.as_deref())) {
        (Some(start), Some(end)) => {
            let range = DateRange::new(parse_bound(start)?, parse_bound(end)?)?;
            if range.duration() > Duration::days(max_days) {
                return Err(PulseError::InvalidRange(format!(
                    "custom range spans more than {} days",
                    max_days
                )));
            }
            Ok(range)
        }
        _ => Err(PulseError::InvalidRange(
            "custom range requires both start and end".to_string(),
        )),
    }
}

/// Accepts `YYYY-MM-DD` (midnight UTC), RFC 3339, or a zone-less
/// `YYYY-MM-DDTHH:MM:SS[.fff]` read as UTC. Years outside 1970..=9999 are
/// rejected.
pub fn parse_bound(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        midnight(date)
    } else if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        ts.with_timezone(&Utc)
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        naive.and_utc()
    } else {
        return Err(PulseError::InvalidRange(format!(
            "cannot parse '{}' as a date or timestamp",
            raw
        )));
    };

    if !(MIN_YEAR..=MAX_YEAR).contains(&parsed.year()) {
        return Err(PulseError::InvalidRange(format!(
            "'{}' is outside years {}..={}",
            raw, MIN_YEAR, MAX_YEAR
        )));
    }
    Ok(parsed)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
