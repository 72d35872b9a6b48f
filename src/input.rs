//! # Input Configuration Module
//!
//! This module provides configuration parsing for geoslice extraction jobs.
//! A job names a NetCDF dataset, a selection over it, and where the result
//! should be written. Jobs are stored as JSON or YAML.
//!
//! ## Configuration Structure
//!
//! A configuration file specifies:
//! - **input**: NetCDF file, directory of files, or wildcard pattern
//! - **dataset**: optional overrides for metadata detection (variable names, labels)
//! - **selection**: bounding box, time range, reshape and masking options
//! - **output**: path of the `.parquet` or `.json` result
//! - **statistic**: optional reduction (`mean`/`std`) applied before writing
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use geoslice::input::ExtractionJob;
//!
//! // Load from file
//! let job = ExtractionJob::from_file("job.yaml")?;
//!
//! // Load from JSON string
//! let json = r#"
//! {
//!   "input": "gistemp.nc",
//!   "output": "tropics.parquet",
//!   "selection": {
//!     "coords": {"top": "23N", "bottom": "23S"},
//!     "time_range": {"start": [1950], "end": [1999]}
//!   }
//! }"#;
//! let job = ExtractionJob::from_json(json)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::extract::SelectionRequest;
use crate::stats::Statistic;
use crate::unpack::UnpackOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_concat_axis() -> isize {
    -1
}

/// Main configuration structure for geoslice jobs.
///
/// # Examples
///
/// ```rust
/// use geoslice::coords::CoordBounds;
/// use geoslice::extract::SelectionRequest;
/// use geoslice::input::ExtractionJob;
///
/// let job = ExtractionJob::new("sst.nc", "sst_pacific.json").with_selection(
///     SelectionRequest::new().with_coords(CoordBounds::new().left(120.0).right(280.0)),
/// );
/// assert_eq!(job.concat_axis, -1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionJob {
    /// NetCDF file, directory or wildcard pattern
    pub input: String,
    /// Metadata detection overrides
    #[serde(default)]
    pub dataset: UnpackOptions,
    /// What to extract
    #[serde(default)]
    pub selection: SelectionRequest,
    /// Output path, `.parquet` or `.json`
    pub output: String,
    /// Axis multi-file pieces are joined along
    #[serde(default = "default_concat_axis")]
    pub concat_axis: isize,
    /// Explicit file list, replacing the files found from `input`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<PathBuf>>,
    /// Reduction applied to the extracted array before writing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistic: Option<StatisticConfig>,
}

/// A reduction and the axis it runs along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatisticConfig {
    pub kind: Statistic,
    #[serde(default)]
    pub axis: isize,
}

/// Output encodings, picked from the output path's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Parquet,
    Json,
}

impl OutputKind {
    pub fn from_path(path: &str) -> Option<Self> {
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some("parquet") | Some("pq") => Some(OutputKind::Parquet),
            Some("json") => Some(OutputKind::Json),
            _ => None,
        }
    }
}

impl ExtractionJob {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        ExtractionJob {
            input: input.into(),
            dataset: UnpackOptions::default(),
            selection: SelectionRequest::default(),
            output: output.into(),
            concat_axis: default_concat_axis(),
            files: None,
            statistic: None,
        }
    }

    pub fn with_selection(mut self, selection: SelectionRequest) -> Self {
        self.selection = selection;
        self
    }

    /// Loads a job from a JSON or YAML file.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, anything else as
    /// JSON.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use geoslice::input::ExtractionJob;
    ///
    /// let job = ExtractionJob::from_file("monthly_anomalies.yaml")?;
    /// println!("Reading from: {}", job.input);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    /// Loads a job from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let job: ExtractionJob = serde_json::from_str(json_str)?;
        Ok(job)
    }

    /// Loads a job from a YAML string.
    pub fn from_yaml(yaml_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let job: ExtractionJob = serde_yaml::from_str(yaml_str)?;
        Ok(job)
    }

    pub fn to_json(&self) -> Result<String, Box<dyn std::error::Error>> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String, Box<dyn std::error::Error>> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks the job without reading any data.
    ///
    /// Returns one message per problem found: unsupported output extension,
    /// missing input, listed files that do not exist, or a reshape with more
    /// than one inferred dimension.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.input.trim().is_empty() {
            problems.push("input path is empty".to_string());
        } else if !self.input.contains('*') && !Path::new(&self.input).exists() {
            problems.push(format!("input '{}' does not exist", self.input));
        }

        if OutputKind::from_path(&self.output).is_none() {
            problems.push(format!(
                "output '{}' must end in .parquet or .json",
                self.output
            ));
        }

        if let Some(files) = &self.files {
            if files.is_empty() {
                problems.push("file list is empty".to_string());
            }
            for file in files.iter().filter(|f| !f.exists()) {
                problems.push(format!("listed file '{}' does not exist", file.display()));
            }
        }

        if let Some(crate::extract::DataReshape::Shape(dims)) = &self.selection.data_reshape
            && dims.iter().filter(|&&d| d == -1).count() > 1
        {
            problems.push("reshape can infer at most one dimension".to_string());
        }

        if self.selection.height.is_some() {
            problems.push("height selection is not supported".to_string());
        }

        problems
    }
}
