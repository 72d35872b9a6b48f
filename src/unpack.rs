//! # NetCDF Metadata Unpacking
//!
//! Builds a [`DatasetDescriptor`] by reading NetCDF headers instead of writing
//! one by hand.
//!
//! Coordinate variables are found by common names (case-insensitive):
//!
//! | axis      | names                       |
//! |-----------|-----------------------------|
//! | latitude  | `latitude`, `lat`, `y`      |
//! | longitude | `longitude`, `lon`, `x`     |
//! | time      | `time`, `t`                 |
//!
//! The data variable is the first other variable whose shape contains the
//! length of every coordinate. Any name can be forced through
//! [`UnpackOptions`].
//!
//! A directory, or a path whose file name contains `*`, describes a multi-file
//! dataset. Its metadata is read from the first file in sorted order, except
//! for the time axis, which is joined from every file so that a time range can
//! be resolved against the whole record.

use crate::descriptor::{DataSource, DatasetDescriptor, DescriptorConfig, Labels, StorageFormat};
use crate::error::{ExtractError, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const LAT_NAMES: &[&str] = &["latitude", "lat", "y"];
const LON_NAMES: &[&str] = &["longitude", "lon", "x"];
const TIME_NAMES: &[&str] = &["time", "t"];

/// Overrides for metadata detection. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnpackOptions {
    /// Dataset name, used as the dataset label when the file has none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Regular lat/lon grid (default) or paired site coordinates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gridded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_key: Option<String>,
    /// Label for the data variable when it has no `long_name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// Reads dataset metadata from a NetCDF file, directory or wildcard pattern.
///
/// # Errors
///
/// - [`ExtractError::NoInputFiles`] if a directory or pattern matches nothing
/// - [`ExtractError::CoordinateNotFound`] / [`ExtractError::MissingVariable`]
///   when coordinate or data variables cannot be located
/// - [`ExtractError::MissingAttribute`] if the time variable has no `units`
/// - [`ExtractError::NetCdf`] for unreadable files
pub fn from_netcdf<P: AsRef<Path>>(path: P, options: &UnpackOptions) -> Result<DatasetDescriptor> {
    let path = path.as_ref();
    let source = resolve_source(path)?;
    let files = source.files();
    let first = files.first().ok_or_else(|| ExtractError::NoInputFiles(path.to_path_buf()))?;
    debug!("reading metadata from {}", first.display());

    let file = netcdf::open(first)?;
    let names: Vec<String> = file.variables().map(|v| v.name()).collect();
    debug!("variables: {:?}", names);

    let lat_key = pick_key(&names, options.lat_key.as_deref(), LAT_NAMES)?;
    let lon_key = pick_key(&names, options.lon_key.as_deref(), LON_NAMES)?;
    let time_key = pick_key(&names, options.time_key.as_deref(), TIME_NAMES)?;

    let lat_var = variable(&file, &lat_key)?;
    let lon_var = variable(&file, &lon_key)?;
    let time_var = variable(&file, &time_key)?;

    let lat: Vec<f64> = lat_var.get_values::<f64, _>(..)?;
    let lon: Vec<f64> = lon_var.get_values::<f64, _>(..)?;
    let time: Vec<f64> = time_var.get_values::<f64, _>(..)?;

    let data_key = match &options.data_key {
        Some(key) => key.clone(),
        None => find_data_key(&file, &[&lat_key, &lon_key, &time_key], &[lat.len(), lon.len(), time.len()])?,
    };
    let data_var = variable(&file, &data_key)?;
    let shape: Vec<usize> = data_var.dimensions().iter().map(|d| d.len()).collect();

    let time_units = attr_string(&time_var, "units").ok_or_else(|| ExtractError::MissingAttribute {
        variable: time_key.clone(),
        attribute: "units".to_string(),
    })?;

    let dataset = attr_string(&data_var, "dataset")
        .or_else(|| options.name.as_ref().map(|n| n.to_uppercase()))
        .unwrap_or_else(|| dataset_from_filename(first));

    let labels = Labels {
        dataset,
        variable: field_label(&data_var, options.variable.as_deref(), &capitalize(&data_key)),
        latitude: field_label(&lat_var, options.latitude.as_deref(), "Latitude"),
        longitude: field_label(&lon_var, options.longitude.as_deref(), "Longitude"),
        time: field_label(&time_var, options.time.as_deref(), "Time"),
    };

    let missing_value = attr_f64(&data_var, "missing_value").or_else(|| attr_f64(&data_var, "_FillValue"));
    let mut config = DescriptorConfig {
        shape,
        lat,
        lon,
        time,
        time_units,
        height: None,
        gridded: options.gridded.unwrap_or(true),
        scale_factor: attr_f64(&data_var, "scale_factor").unwrap_or(1.0),
        add_offset: attr_f64(&data_var, "add_offset").unwrap_or(0.0),
        missing_value,
        data_key,
        labels,
        source,
        file_steps: None,
        format: StorageFormat::NetCdf,
    };

    drop((lat_var, lon_var, time_var, data_var));
    file.close()?;

    if files.len() > 1 {
        let mut steps = vec![config.time.len()];
        for path in &files[1..] {
            let part = read_time(path, &time_key, &config.time_units)?;
            steps.push(part.len());
            config.time.extend(part);
        }
        debug!("time steps per file: {:?}", steps);
        if let Some(first_axis) = config.shape.first_mut() {
            *first_axis = config.time.len();
        }
        config.file_steps = Some(steps);
    }

    DatasetDescriptor::from_config(config)
}

/// Reads the time axis of one file of a multi-file dataset.
fn read_time(path: &Path, time_key: &str, time_units: &str) -> Result<Vec<f64>> {
    debug!("reading time axis of {}", path.display());
    let file = netcdf::open(path)?;
    let var = variable(&file, time_key)?;
    if let Some(units) = attr_string(&var, "units")
        && units != time_units
    {
        warn!("{} has time units '{}', expected '{}'", path.display(), units, time_units);
    }
    let time: Vec<f64> = var.get_values::<f64, _>(..)?;
    drop(var);
    file.close()?;
    Ok(time)
}

/// Decides whether `path` is a single file, a directory or a wildcard pattern.
pub fn resolve_source(path: &Path) -> Result<DataSource> {
    if path.is_dir() {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        return multi_source(path, files);
    }

    let pattern = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if pattern.contains('*') {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if entry.file_type()?.is_file() && wildcard_match(pattern, &name.to_string_lossy()) {
                files.push(entry.path());
            }
        }
        files.sort();
        return multi_source(path, files);
    }

    Ok(DataSource::Single(path.to_path_buf()))
}

fn multi_source(path: &Path, files: Vec<PathBuf>) -> Result<DataSource> {
    if files.is_empty() {
        return Err(ExtractError::NoInputFiles(path.to_path_buf()));
    }
    debug!("{} files in {}", files.len(), path.display());
    Ok(DataSource::Multi(files))
}

/// `*` matches any run of characters, everything else matches literally.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return name.is_empty(),
    };
    let Some(mut remaining) = name.strip_prefix(first) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last)
}

fn pick_key(names: &[String], requested: Option<&str>, common: &[&str]) -> Result<String> {
    if let Some(key) = requested {
        return Ok(key.to_string());
    }
    let found: Vec<&String> = names
        .iter()
        .filter(|name| common.contains(&name.to_lowercase().as_str()))
        .collect();
    debug!("keys found for {:?}: {:?}", common, found);
    if found.len() > 1 {
        warn!("several candidates {:?}, using '{}'", found, found[0]);
    }
    found
        .first()
        .map(|name| name.to_string())
        .ok_or_else(|| ExtractError::CoordinateNotFound(common.iter().map(|s| s.to_string()).collect()))
}

fn find_data_key(file: &netcdf::File, coord_keys: &[&str], coord_lens: &[usize]) -> Result<String> {
    let candidates: Vec<String> = file
        .variables()
        .filter(|var| !coord_keys.contains(&var.name().as_str()))
        .filter(|var| {
            let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
            coord_lens.iter().all(|len| shape.contains(len))
        })
        .map(|var| var.name())
        .collect();
    debug!("fields found: {:?}", candidates);
    candidates.into_iter().next().ok_or(ExtractError::DataVariableNotFound)
}

fn variable<'f>(file: &'f netcdf::File, name: &str) -> Result<netcdf::Variable<'f>> {
    file.variable(name)
        .ok_or_else(|| ExtractError::MissingVariable(name.to_string()))
}

fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

pub(crate) fn attr_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let value = var.attribute_value(name)?.ok()?;
    f64::try_from(value).ok()
}

pub(crate) fn attr_string(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(text) => Some(text),
        _ => None,
    }
}

/// `"long_name (units)"`, falling back to the override and then `fallback`.
/// Units are appended whenever present and not already part of the label.
fn field_label(var: &netcdf::Variable, overridden: Option<&str>, fallback: &str) -> String {
    let units = attr_string(var, "units");
    let mut label = match (attr_string(var, "long_name"), overridden) {
        (Some(long_name), _) => long_name,
        (None, Some(text)) => text.to_string(),
        (None, None) => fallback.to_string(),
    };
    if let Some(units) = units
        && !label.contains(&units)
    {
        label = format!("{} ({})", label, units);
    }
    label
}

fn dataset_from_filename(path: &Path) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_uppercase()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}
