//! Masked reductions over extracted data.
//!
//! NaN values and values equal to the dataset's missing value are left out of
//! every reduction. A lane with nothing left reduces to NaN.

use crate::error::Result;
use crate::extract::normalize_axis;
use ndarray::{ArrayD, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Mean,
    /// Population standard deviation
    Std,
}

impl Statistic {
    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Std => "std",
        }
    }

    /// Reduces `data` along `axis` (negative counts from the end).
    pub fn apply(&self, data: &ArrayD<f64>, axis: isize, missing_value: Option<f64>) -> Result<ArrayD<f64>> {
        let axis = normalize_axis(axis, data.ndim())?;
        let reduced = match self {
            Statistic::Mean => data.map_axis(Axis(axis), |lane| masked_mean(lane, missing_value)),
            Statistic::Std => data.map_axis(Axis(axis), |lane| masked_std(lane, missing_value)),
        };
        Ok(reduced)
    }
}

impl FromStr for Statistic {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mean" => Ok(Statistic::Mean),
            "std" => Ok(Statistic::Std),
            _ => Err(format!("Unknown statistic '{}', expected 'mean' or 'std'", s)),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn valid(lane: ArrayView1<'_, f64>, missing_value: Option<f64>) -> impl Iterator<Item = f64> + '_ {
    lane.into_iter()
        .copied()
        .filter(move |v| !v.is_nan() && Some(*v) != missing_value)
}

fn masked_mean(lane: ArrayView1<'_, f64>, missing_value: Option<f64>) -> f64 {
    let (sum, count) = valid(lane, missing_value).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 { f64::NAN } else { sum / count as f64 }
}

fn masked_std(lane: ArrayView1<'_, f64>, missing_value: Option<f64>) -> f64 {
    let mean = masked_mean(lane.view(), missing_value);
    if mean.is_nan() {
        return f64::NAN;
    }
    let (ssd, count) = valid(lane, missing_value).fold((0.0, 0usize), |(s, n), v| (s + (v - mean).powi(2), n + 1));
    (ssd / count as f64).sqrt()
}
