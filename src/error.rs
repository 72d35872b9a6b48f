//! # Error Types
//!
//! Every fallible operation in the library returns [`ExtractError`]. Nothing is
//! retried or recovered internally: selection and extraction are pure computation
//! over already-open data, so the caller decides whether to abort or retry with
//! corrected input.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving selections or extracting data
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Malformed coordinate '{0}'")]
    MalformedCoordinate(String),

    #[error("Invalid date {fields:?}: {reason}")]
    InvalidDate { fields: Vec<i64>, reason: String },

    #[error("Invalid time units '{0}'")]
    InvalidTimeUnits(String),

    #[error("Selection on the {axis} axis is empty")]
    EmptySelection { axis: String },

    #[error("Index {index} is out of bounds for the {axis} axis of length {len}")]
    IndexOutOfBounds { axis: String, index: usize, len: usize },

    #[error("Unhandled dimension: {ndim} axes with gridded={gridded}")]
    UnhandledDimension { ndim: usize, gridded: bool },

    #[error("Selection addresses {found} axes but the source has {expected}")]
    SelectionRank { expected: usize, found: usize },

    #[error("Height/depth indexing is not supported")]
    HeightNotSupported,

    #[error("Cannot reshape array of shape {from:?} into {to:?}: {reason}")]
    ReshapeMismatch {
        from: Vec<usize>,
        to: Vec<isize>,
        reason: String,
    },

    #[error("Invalid dataset descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Variable '{0}' not found")]
    MissingVariable(String),

    #[error("Attribute '{attribute}' not found on variable '{variable}'")]
    MissingAttribute { variable: String, attribute: String },

    #[error("No variable matches the coordinate names {0:?}")]
    CoordinateNotFound(Vec<String>),

    #[error("No data variable spans the lat/lon/time dimensions")]
    DataVariableNotFound,

    #[error("No input files found at {0}")]
    NoInputFiles(PathBuf),

    #[error("Axis {axis} is out of range for an array with {ndim} dimensions")]
    InvalidAxis { axis: isize, ndim: usize },

    #[error("Cannot concatenate extracted arrays: {0}")]
    Concatenation(String),

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for selection and extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;
