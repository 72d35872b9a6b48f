//! # Temporal Selection
//!
//! Converts user time ranges into a contiguous index range along a dataset's
//! time axis.
//!
//! Bounds are either raw timestamps in the dataset's native units or partial
//! calendar dates `[year, month, day, hour, minute, second, microsecond]` with
//! trailing fields omitted. Partial dates are padded to the widest interval they
//! describe (`[1938, 5]` as a start means 1938-05-01, as an end 1938-05-31) and
//! converted to native units through the dataset's `"<unit> since <reference>"`
//! string.
//!
//! ```rust
//! use geoslice::time::{time_to_range, TimeBound, TimeRange};
//!
//! // Monthly data, days since 2000-01-01
//! let time = vec![0.0, 31.0, 60.0, 91.0];
//! let range = TimeRange {
//!     start: Some(TimeBound::date(&[2000, 2])),
//!     end: Some(TimeBound::date(&[2000, 3])),
//! };
//! let slice = time_to_range(&time, "days since 2000-01-01", &range)?;
//! assert_eq!(slice, 1..3);
//! # Ok::<(), geoslice::error::ExtractError>(())
//! ```

use crate::coords::{max_of, min_of};
use crate::error::{ExtractError, Result};
use chrono::{Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

const SECONDS_PER_DAY: f64 = 86_400.0;
/// udunits year (tropical year)
const SECONDS_PER_YEAR: f64 = 3.155_692_597_47e7;

/// Unit of a time coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    /// udunits month, a twelfth of a tropical year
    Months,
    /// udunits tropical year
    Years,
}

impl TimeUnit {
    pub fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3_600.0,
            TimeUnit::Days => SECONDS_PER_DAY,
            TimeUnit::Weeks => 7.0 * SECONDS_PER_DAY,
            TimeUnit::Months => SECONDS_PER_YEAR / 12.0,
            TimeUnit::Years => SECONDS_PER_YEAR,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let unit = match name.to_ascii_lowercase().as_str() {
            "second" | "seconds" | "sec" | "secs" | "s" => TimeUnit::Seconds,
            "minute" | "minutes" | "min" | "mins" => TimeUnit::Minutes,
            "hour" | "hours" | "hr" | "hrs" | "h" => TimeUnit::Hours,
            "day" | "days" | "d" => TimeUnit::Days,
            "week" | "weeks" => TimeUnit::Weeks,
            "month" | "months" => TimeUnit::Months,
            "year" | "years" | "yr" | "yrs" => TimeUnit::Years,
            _ => return None,
        };
        Some(unit)
    }
}

/// Parsed `"<unit> since <reference>"` string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    /// Reference epoch, normalized to UTC
    pub reference: NaiveDateTime,
}

impl TimeUnits {
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || ExtractError::InvalidTimeUnits(text.to_string());

        let lowered = text.to_ascii_lowercase();
        let since = lowered.find(" since ").ok_or_else(invalid)?;
        let unit = TimeUnit::from_name(text[..since].trim()).ok_or_else(invalid)?;
        let reference = parse_reference(&text[since + " since ".len()..]).ok_or_else(invalid)?;

        Ok(TimeUnits { unit, reference })
    }

    /// Converts a calendar instant into the native numeric time value.
    pub fn to_value(&self, datetime: NaiveDateTime) -> f64 {
        let delta = datetime - self.reference;
        let seconds = match delta.num_microseconds() {
            Some(micros) => micros as f64 / 1e6,
            None => delta.num_seconds() as f64,
        };
        seconds / self.unit.seconds()
    }

    /// Converts a native numeric time value back to a calendar instant.
    pub fn to_datetime(&self, value: f64) -> Option<NaiveDateTime> {
        if !value.is_finite() {
            return None;
        }
        let micros = (value * self.unit.seconds() * 1e6).round();
        if micros.abs() >= i64::MAX as f64 {
            return None;
        }
        self.reference
            .checked_add_signed(TimeDelta::microseconds(micros as i64))
    }
}

impl FromStr for TimeUnits {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        TimeUnits::parse(s)
    }
}

fn parse_reference(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    let split = text.char_indices().find(|&(_, c)| c == 'T' || c.is_whitespace());
    let (date_part, rest) = match split {
        Some((pos, c)) => (&text[..pos], text[pos + c.len_utf8()..].trim()),
        None => (text, ""),
    };

    let date = parse_reference_date(date_part)?;
    let mut time = NaiveTime::MIN;
    let mut offset_minutes = 0i64;

    for (i, token) in rest.split_whitespace().enumerate() {
        let is_clock = token.starts_with(|c: char| c.is_ascii_digit());
        if i == 0 && is_clock {
            // "00:00:00Z" or "00:00:00+05:00"
            let zone_at = token.find(|c: char| c == 'Z' || c == '+' || c == '-');
            let (clock, zone) = match zone_at {
                Some(pos) => (&token[..pos], &token[pos..]),
                None => (token, ""),
            };
            time = parse_clock(clock)?;
            offset_minutes = parse_zone(zone)?;
        } else {
            offset_minutes = parse_zone(token)?;
        }
    }

    NaiveDateTime::new(date, time).checked_sub_signed(TimeDelta::minutes(offset_minutes))
}

fn parse_reference_date(text: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = text.split('-').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let year: i32 = parts[0].parse().ok()?;
    let month: u32 = match parts.get(1) {
        Some(m) => m.parse().ok()?,
        None => 1,
    };
    let day: u32 = match parts.get(2) {
        Some(d) => d.parse().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_clock(text: &str) -> Option<NaiveTime> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let hour: u32 = parts[0].parse().ok()?;
    let minute: u32 = match parts.get(1) {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    let (second, micro) = match parts.get(2) {
        Some(s) => parse_seconds(s)?,
        None => (0, 0),
    };
    NaiveTime::from_hms_micro_opt(hour, minute, second, micro)
}

fn parse_seconds(text: &str) -> Option<(u32, u32)> {
    match text.split_once('.') {
        Some((whole, frac)) => {
            let second: u32 = whole.parse().ok()?;
            if frac.is_empty() {
                return Some((second, 0));
            }
            let digits: String = frac.chars().chain(std::iter::repeat('0')).take(6).collect();
            let micro: u32 = digits.parse().ok()?;
            Some((second, micro))
        }
        None => Some((text.parse().ok()?, 0)),
    }
}

/// Zone designator to an offset east of UTC, in minutes.
fn parse_zone(text: &str) -> Option<i64> {
    match text {
        "" | "Z" | "z" | "UTC" | "utc" | "GMT" | "gmt" => return Some(0),
        _ if !text.is_ascii() => return None,
        _ => {}
    }
    let (sign, body) = match text.as_bytes()[0] {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let (hours, minutes): (i64, i64) = match body.split_once(':') {
        Some((h, m)) => (h.parse().ok()?, m.parse().ok()?),
        None if body.len() > 2 => (body[..body.len() - 2].parse().ok()?, body[body.len() - 2..].parse().ok()?),
        None => (body.parse().ok()?, 0),
    };
    Some(sign * (hours * 60 + minutes))
}

/// One end of a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeBound {
    /// Timestamp in the dataset's native units
    Raw(f64),
    /// `[year, month, day, hour, minute, second, microsecond]`, trailing fields optional
    Date(Vec<i64>),
}

impl TimeBound {
    pub fn date(fields: &[i64]) -> Self {
        TimeBound::Date(fields.to_vec())
    }
}

impl fmt::Display for TimeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBound::Raw(value) => write!(f, "{}", value),
            TimeBound::Date(fields) => {
                let parts: Vec<String> = fields.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Time interval to restrict the data to. Missing ends default to the first and
/// last observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<TimeBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<TimeBound>,
}

impl TimeRange {
    pub fn new(start: Option<TimeBound>, end: Option<TimeBound>) -> Self {
        TimeRange { start, end }
    }

    pub fn swapped(&self) -> Self {
        TimeRange {
            start: self.end.clone(),
            end: self.start.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Vertical range placeholder. Height indexing is not implemented.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeightRange {
    #[serde(default)]
    pub bottom: Option<f64>,
    #[serde(default)]
    pub top: Option<f64>,
}

/// Pads a partial start date to its earliest instant.
pub fn create_start_time(fields: &[i64]) -> Result<NaiveDateTime> {
    if fields.is_empty() {
        return Err(invalid_date(fields, "a year is required"));
    }
    let mut padded = fields.to_vec();
    if padded.len() < 3 {
        padded.extend_from_slice(&[1, 1][padded.len() - 1..]);
    }
    build_datetime(fields, &padded)
}

/// Pads a partial end date to the last day it covers.
///
/// Only the day is padded: `[1938]` becomes 1938-12-31 00:00 and `[1938, 2]`
/// becomes 1938-02-28 00:00.
pub fn create_end_time(fields: &[i64]) -> Result<NaiveDateTime> {
    if fields.is_empty() {
        return Err(invalid_date(fields, "a year is required"));
    }
    let mut padded = fields.to_vec();
    if padded.len() == 1 {
        padded.extend_from_slice(&[12, 31]);
    }
    if padded.len() == 2 {
        let year = to_i32(fields, padded[0])?;
        let month = to_u32(fields, padded[1])?;
        let last_day = days_in_month(year, month)
            .ok_or_else(|| invalid_date(fields, "month out of range"))?;
        padded.push(i64::from(last_day));
    }
    build_datetime(fields, &padded)
}

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    Some(next.signed_duration_since(first).num_days() as u32)
}

fn build_datetime(original: &[i64], padded: &[i64]) -> Result<NaiveDateTime> {
    if padded.len() > 7 {
        return Err(invalid_date(original, "at most 7 fields are allowed"));
    }
    let field = |i: usize| padded.get(i).copied().unwrap_or(0);

    let year = to_i32(original, field(0))?;
    let date = NaiveDate::from_ymd_opt(year, to_u32(original, field(1))?, to_u32(original, field(2))?)
        .ok_or_else(|| invalid_date(original, "day or month out of range"))?;
    let time = NaiveTime::from_hms_micro_opt(
        to_u32(original, field(3))?,
        to_u32(original, field(4))?,
        to_u32(original, field(5))?,
        to_u32(original, field(6))?,
    )
    .ok_or_else(|| invalid_date(original, "time of day out of range"))?;

    Ok(NaiveDateTime::new(date, time))
}

fn to_i32(original: &[i64], value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| invalid_date(original, "year out of range"))
}

fn to_u32(original: &[i64], value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| invalid_date(original, "negative field"))
}

fn invalid_date(fields: &[i64], reason: &str) -> ExtractError {
    ExtractError::InvalidDate {
        fields: fields.to_vec(),
        reason: reason.to_string(),
    }
}

enum Edge {
    Start,
    End,
}

fn resolve_bound(bound: Option<&TimeBound>, edge: Edge, time: &[f64], time_units: &str) -> Result<f64> {
    let value = match bound {
        None => match edge {
            Edge::Start => min_of(time),
            Edge::End => max_of(time),
        },
        Some(TimeBound::Raw(value)) => *value,
        Some(TimeBound::Date(fields)) => {
            let datetime = match edge {
                Edge::Start => create_start_time(fields)?,
                Edge::End => create_end_time(fields)?,
            };
            TimeUnits::parse(time_units)?.to_value(datetime)
        }
    };
    Ok(value)
}

fn resolve_pair(time: &[f64], time_units: &str, time_range: &TimeRange) -> Result<(f64, f64)> {
    let t_start = resolve_bound(time_range.start.as_ref(), Edge::Start, time, time_units)?;
    debug!("start time: {:?} -> {}", time_range.start, t_start);
    let t_end = resolve_bound(time_range.end.as_ref(), Edge::End, time, time_units)?;
    debug!("end time: {:?} -> {}", time_range.end, t_end);
    Ok((t_start, t_end))
}

/// Returns the index range `first..last + 1` of timestamps within `time_range`.
///
/// An inverted range is not an error: the start and end bounds are exchanged
/// and resolved again, so `{start: A, end: B}` and `{start: B, end: A}` select
/// the same steps. Only ranges with both bounds given are exchanged; a single
/// bound past the end (or before the start) of the record selects nothing.
/// The time axis is assumed to be sorted ascending.
///
/// # Errors
///
/// - [`ExtractError::EmptySelection`] if no timestamp falls inside the range
/// - [`ExtractError::InvalidDate`] / [`ExtractError::InvalidTimeUnits`] for
///   unusable partial dates or unit strings
pub fn time_to_range(time: &[f64], time_units: &str, time_range: &TimeRange) -> Result<Range<usize>> {
    debug!("time units: {}", time_units);

    let (mut t_start, mut t_end) = resolve_pair(time, time_units, time_range)?;
    if t_start > t_end {
        // With one side open the default is the record's edge, so there is
        // nothing to exchange: the bound lies past the data.
        if time_range.start.is_none() || time_range.end.is_none() {
            debug!("time bound {} to {} lies outside the record", t_start, t_end);
            return Err(ExtractError::EmptySelection {
                axis: "time".to_string(),
            });
        }
        debug!("inverted time range, swapping start and end");
        (t_start, t_end) = resolve_pair(time, time_units, &time_range.swapped())?;
    }

    let mut matches = time
        .iter()
        .enumerate()
        .filter(|(_, t)| t_start <= **t && **t <= t_end)
        .map(|(idx, _)| idx);

    let first = matches.next().ok_or_else(|| ExtractError::EmptySelection {
        axis: "time".to_string(),
    })?;
    let last = matches.last().unwrap_or(first);
    debug!("time indices: {}-{}", first, last);

    Ok(first..last + 1)
}

/// Converts a height or pressure range into indices. Not implemented.
pub fn height_to_range(heights: &[f64], height: &HeightRange) -> Result<Range<usize>> {
    debug!("height selection {:?} requested over {} levels", height, heights.len());
    Err(ExtractError::HeightNotSupported)
}
