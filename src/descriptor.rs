//! # Dataset Descriptors
//!
//! A [`DatasetDescriptor`] carries everything needed to turn a selection request
//! into array indices for one dataset: the on-disk shape, the coordinate and
//! time arrays, packing coefficients, the missing value and where the data
//! lives. Descriptors are immutable once built and are validated at
//! construction.
//!
//! Descriptors are usually produced by [`crate::unpack::from_netcdf`], but can
//! also be written out by hand and loaded through [`DescriptorConfig`]:
//!
//! ```json
//! {
//!   "shape": [12, 3, 4],
//!   "lat": [-10.0, 0.0, 10.0],
//!   "lon": [0.0, 90.0, 180.0, 270.0],
//!   "time": [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334],
//!   "time_units": "days since 2001-01-01",
//!   "data_key": "tas",
//!   "source": "tas_2001.nc"
//! }
//! ```

use crate::error::{ExtractError, Result};
use crate::extract::{ArraySource, SelectionRequest};
use log::debug;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Display strings for the dataset and its axes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Labels {
    pub dataset: String,
    pub variable: String,
    pub latitude: String,
    pub longitude: String,
    pub time: String,
}

/// Where the data lives: one file, or an ordered list of files holding
/// consecutive pieces of the same variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataSource {
    Single(PathBuf),
    Multi(Vec<PathBuf>),
}

impl DataSource {
    pub fn files(&self) -> Vec<PathBuf> {
        match self {
            DataSource::Single(path) => vec![path.clone()],
            DataSource::Multi(paths) => paths.clone(),
        }
    }

    pub fn is_multifile(&self) -> bool {
        matches!(self, DataSource::Multi(_))
    }
}

/// Storage format of the data files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageFormat {
    #[default]
    #[serde(rename = "netcdf")]
    NetCdf,
}

impl StorageFormat {
    pub fn reader(&self) -> &'static dyn DatasetReader {
        match self {
            StorageFormat::NetCdf => &NETCDF_READER,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StorageFormat::NetCdf => "netcdf",
        }
    }
}

/// Reads data out of a single file of a given format.
pub trait DatasetReader: Sync {
    /// Extracts, squeezes and unpacks `request` from the file.
    fn extract(
        &self,
        descriptor: &DatasetDescriptor,
        path: &Path,
        request: &SelectionRequest,
    ) -> Result<ArrayD<f64>>;

    /// Reads a raw block of the data variable.
    fn read_block(
        &self,
        descriptor: &DatasetDescriptor,
        path: &Path,
        start: &[usize],
        count: &[usize],
    ) -> Result<ArrayD<f64>>;
}

static NETCDF_READER: NetCdfReader = NetCdfReader;

pub struct NetCdfReader;

impl DatasetReader for NetCdfReader {
    fn extract(
        &self,
        descriptor: &DatasetDescriptor,
        path: &Path,
        request: &SelectionRequest,
    ) -> Result<ArrayD<f64>> {
        debug!("opening {}", path.display());
        let file = netcdf::open(path)?;
        let var = file
            .variable(descriptor.data_key())
            .ok_or_else(|| ExtractError::MissingVariable(descriptor.data_key().to_string()))?;

        let data = descriptor.get_data(&var, request)?;
        drop(var);
        file.close()?;
        Ok(data)
    }

    fn read_block(
        &self,
        descriptor: &DatasetDescriptor,
        path: &Path,
        start: &[usize],
        count: &[usize],
    ) -> Result<ArrayD<f64>> {
        debug!("opening {}", path.display());
        let file = netcdf::open(path)?;
        let var = file
            .variable(descriptor.data_key())
            .ok_or_else(|| ExtractError::MissingVariable(descriptor.data_key().to_string()))?;

        let block = var.read_block(start, count)?;
        drop(var);
        file.close()?;
        Ok(block)
    }
}

fn default_gridded() -> bool {
    true
}

fn default_scale_factor() -> f64 {
    1.0
}

/// Serializable form of a [`DatasetDescriptor`].
///
/// Omitted fields take these defaults: `gridded = true`, `scale_factor = 1`,
/// `add_offset = 0`, no `missing_value`, no `height`, empty labels and the
/// `netcdf` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DescriptorConfig {
    pub shape: Vec<usize>,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub time: Vec<f64>,
    pub time_units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Vec<f64>>,
    #[serde(default = "default_gridded")]
    pub gridded: bool,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    #[serde(default)]
    pub add_offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_value: Option<f64>,
    pub data_key: String,
    #[serde(default)]
    pub labels: Labels,
    pub source: DataSource,
    /// Number of time steps held by each file of a multi-file source, in file
    /// order. `time` is then the concatenation of every file's time axis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_steps: Option<Vec<usize>>,
    #[serde(default)]
    pub format: StorageFormat,
}

/// Immutable metadata for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DescriptorConfig", into = "DescriptorConfig")]
pub struct DatasetDescriptor {
    shape: Vec<usize>,
    lat: Vec<f64>,
    lon: Vec<f64>,
    time: Vec<f64>,
    time_units: String,
    height: Option<Vec<f64>>,
    gridded: bool,
    scale_factor: f64,
    add_offset: f64,
    missing_value: Option<f64>,
    data_key: String,
    labels: Labels,
    source: DataSource,
    file_steps: Option<Vec<usize>>,
    format: StorageFormat,
}

impl DatasetDescriptor {
    /// Validates `config` and builds the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidDescriptor`] if the shape does not have 2
    /// to 4 axes, site coordinates are not paired, packing coefficients are not
    /// finite, or the file list is empty.
    pub fn from_config(config: DescriptorConfig) -> Result<Self> {
        let ndim = config.shape.len();
        if !(2..=4).contains(&ndim) {
            return Err(ExtractError::InvalidDescriptor(format!(
                "shape {:?} must have between 2 and 4 axes",
                config.shape
            )));
        }
        if !config.gridded && config.lat.len() != config.lon.len() {
            return Err(ExtractError::InvalidDescriptor(format!(
                "site-based data needs paired coordinates, got {} latitudes and {} longitudes",
                config.lat.len(),
                config.lon.len()
            )));
        }
        if !config.scale_factor.is_finite() || !config.add_offset.is_finite() {
            return Err(ExtractError::InvalidDescriptor(
                "scale_factor and add_offset must be finite".to_string(),
            ));
        }
        if let DataSource::Multi(paths) = &config.source
            && paths.is_empty()
        {
            return Err(ExtractError::InvalidDescriptor("empty file list".to_string()));
        }
        if let Some(steps) = &config.file_steps {
            let DataSource::Multi(paths) = &config.source else {
                return Err(ExtractError::InvalidDescriptor(
                    "file_steps needs a multi-file source".to_string(),
                ));
            };
            if steps.len() != paths.len() || steps.iter().sum::<usize>() != config.time.len() {
                return Err(ExtractError::InvalidDescriptor(format!(
                    "file_steps {:?} do not split {} time steps over {} files",
                    steps,
                    config.time.len(),
                    paths.len()
                )));
            }
        }

        debug!(
            "descriptor for '{}': shape {:?}, gridded={}, scale={}, offset={}",
            config.data_key, config.shape, config.gridded, config.scale_factor, config.add_offset
        );

        Ok(DatasetDescriptor {
            shape: config.shape,
            lat: config.lat,
            lon: config.lon,
            time: config.time,
            time_units: config.time_units,
            height: config.height,
            gridded: config.gridded,
            scale_factor: config.scale_factor,
            add_offset: config.add_offset,
            missing_value: config.missing_value,
            data_key: config.data_key,
            labels: config.labels,
            source: config.source,
            file_steps: config.file_steps,
            format: config.format,
        })
    }

    /// Loads a descriptor from a JSON or YAML file, picked by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: DescriptorConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        Ok(Self::from_config(config)?)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn time_units(&self) -> &str {
        &self.time_units
    }

    pub fn height(&self) -> Option<&[f64]> {
        self.height.as_deref()
    }

    pub fn gridded(&self) -> bool {
        self.gridded
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn add_offset(&self) -> f64 {
        self.add_offset
    }

    pub fn missing_value(&self) -> Option<f64> {
        self.missing_value
    }

    pub fn data_key(&self) -> &str {
        &self.data_key
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    pub fn format(&self) -> StorageFormat {
        self.format
    }

    pub fn is_multifile(&self) -> bool {
        self.source.is_multifile()
    }

    /// This descriptor narrowed to `path`, one file of a joined multi-file
    /// source, with that file's own share of the time axis.
    pub fn file_descriptor(&self, path: &Path) -> Option<Self> {
        let spans = self.file_time_spans()?;
        let position = self.source.files().iter().position(|file| file == path)?;
        let span = spans.get(position)?.clone();

        let mut view = self.clone();
        view.time = self.time.get(span.clone())?.to_vec();
        if let Some(first_axis) = view.shape.first_mut() {
            *first_axis = span.len();
        }
        view.source = DataSource::Single(path.to_path_buf());
        view.file_steps = None;
        Some(view)
    }

    /// Positions of each source file's steps on the descriptor's time axis,
    /// when the time axis was joined from several files.
    pub fn file_time_spans(&self) -> Option<Vec<Range<usize>>> {
        let steps = self.file_steps.as_ref()?;
        let mut offset = 0;
        let spans = steps
            .iter()
            .map(|&n| {
                let span = offset..offset + n;
                offset += n;
                span
            })
            .collect();
        Some(spans)
    }
}

impl TryFrom<DescriptorConfig> for DatasetDescriptor {
    type Error = ExtractError;

    fn try_from(config: DescriptorConfig) -> Result<Self> {
        DatasetDescriptor::from_config(config)
    }
}

impl From<DatasetDescriptor> for DescriptorConfig {
    fn from(descriptor: DatasetDescriptor) -> Self {
        DescriptorConfig {
            shape: descriptor.shape,
            lat: descriptor.lat,
            lon: descriptor.lon,
            time: descriptor.time,
            time_units: descriptor.time_units,
            height: descriptor.height,
            gridded: descriptor.gridded,
            scale_factor: descriptor.scale_factor,
            add_offset: descriptor.add_offset,
            missing_value: descriptor.missing_value,
            data_key: descriptor.data_key,
            labels: descriptor.labels,
            source: descriptor.source,
            file_steps: descriptor.file_steps,
            format: descriptor.format,
        }
    }
}
