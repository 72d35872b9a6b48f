//! # Coordinate Resolution
//!
//! Bounding boxes arrive in mixed notations: plain numbers (`-61.0`), numeric
//! strings (`"91"`), or cardinal-suffixed strings (`"61S"`, `"120W"`, `"45N"`).
//! This module turns a [`CoordBounds`] into four signed floating bounds,
//! filling in missing sides from the dataset's coordinate extents.
//!
//! Resolution is pure: the caller's bounds are never modified, so a single
//! [`CoordBounds`] can be shared between concurrent extractions.

use crate::error::{ExtractError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single bound as supplied by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordValue {
    /// Signed decimal degrees
    Number(f64),
    /// Numeric or cardinal-suffixed text such as `"61S"` or `"271"`
    Text(String),
}

impl CoordValue {
    pub fn to_degrees(&self) -> Result<f64> {
        match self {
            CoordValue::Number(value) => Ok(*value),
            CoordValue::Text(text) => parse_coordinate(text),
        }
    }
}

impl From<f64> for CoordValue {
    fn from(value: f64) -> Self {
        CoordValue::Number(value)
    }
}

impl From<&str> for CoordValue {
    fn from(value: &str) -> Self {
        CoordValue::Text(value.to_string())
    }
}

impl fmt::Display for CoordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordValue::Number(value) => write!(f, "{}", value),
            CoordValue::Text(text) => write!(f, "{}", text),
        }
    }
}

/// The region to restrict the data to. Every side is optional.
///
/// # Examples
///
/// ```rust
/// use geoslice::coords::CoordBounds;
///
/// let bounds = CoordBounds::new()
///     .top("61N")
///     .bottom("61S")
///     .left(91.0)
///     .right(271.0);
/// assert!(bounds.top.is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordBounds {
    /// Northernmost latitude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<CoordValue>,
    /// Southernmost latitude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<CoordValue>,
    /// Westernmost longitude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<CoordValue>,
    /// Easternmost longitude
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<CoordValue>,
}

impl CoordBounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top(mut self, value: impl Into<CoordValue>) -> Self {
        self.top = Some(value.into());
        self
    }

    pub fn bottom(mut self, value: impl Into<CoordValue>) -> Self {
        self.bottom = Some(value.into());
        self
    }

    pub fn left(mut self, value: impl Into<CoordValue>) -> Self {
        self.left = Some(value.into());
        self
    }

    pub fn right(mut self, value: impl Into<CoordValue>) -> Self {
        self.right = Some(value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none() && self.bottom.is_none() && self.left.is_none() && self.right.is_none()
    }
}

/// Signed bounds in decimal degrees.
///
/// No ordering is enforced: `top < bottom` or `left > right` is allowed and
/// simply selects nothing downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedBounds {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl ResolvedBounds {
    pub fn contains_lat(&self, lat: f64) -> bool {
        self.top >= lat && lat >= self.bottom
    }

    pub fn contains_lon(&self, lon: f64) -> bool {
        self.left <= lon && lon <= self.right
    }
}

/// Parses a coordinate string into signed decimal degrees.
///
/// `S` and `W` negate the value, `N` and `E` keep its sign. The letters are
/// stripped from both ends of the string before parsing, so `"61S"` and `"S61"`
/// are both `-61.0`.
pub fn parse_coordinate(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    let malformed = || ExtractError::MalformedCoordinate(text.to_string());

    if trimmed.contains('S') || trimmed.contains('W') {
        let number = trimmed.trim_matches(|c| c == 'S' || c == 'W');
        let value: f64 = number.trim().parse().map_err(|_| malformed())?;
        Ok(-value)
    } else if trimmed.contains('N') || trimmed.contains('E') {
        let number = trimmed.trim_matches(|c| c == 'N' || c == 'E');
        number.trim().parse().map_err(|_| malformed())
    } else {
        trimmed.parse().map_err(|_| malformed())
    }
}

/// Resolves `coords` against the dataset's coordinate arrays.
///
/// Missing sides default to the coordinate extents: `top = max(lat)`,
/// `bottom = min(lat)`, `left = min(lon)`, `right = max(lon)`.
pub fn resolve_bounds(lat: &[f64], lon: &[f64], coords: &CoordBounds) -> Result<ResolvedBounds> {
    debug!("original coords: {:?}", coords);

    let resolve = |value: &Option<CoordValue>, default: f64| -> Result<f64> {
        match value {
            Some(value) => value.to_degrees(),
            None => Ok(default),
        }
    };

    let bounds = ResolvedBounds {
        top: resolve(&coords.top, max_of(lat))?,
        bottom: resolve(&coords.bottom, min_of(lat))?,
        left: resolve(&coords.left, min_of(lon))?,
        right: resolve(&coords.right, max_of(lon))?,
    };

    debug!("converted coords: {:?}", bounds);
    Ok(bounds)
}

pub(crate) fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

pub(crate) fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}
