//! # Dataset Inspection
//!
//! Summarizes what geoslice can extract from a file, directory or wildcard
//! pattern: the coordinate extents, the time span as calendar dates, the
//! packing attributes and the variables that could be selected with `-n`.

use crate::descriptor::{DatasetDescriptor, Labels};
use crate::time::TimeUnits;
use crate::unpack::{attr_string, from_netcdf, resolve_source, UnpackOptions};
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One variable of the first file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    /// Every attribute, filled in detailed mode only
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// The dataset as geoslice sees it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetLayout {
    pub data_key: String,
    pub shape: Vec<usize>,
    pub gridded: bool,
    pub lat_range: Option<(f64, f64)>,
    pub lon_range: Option<(f64, f64)>,
    pub time_steps: usize,
    pub time_units: String,
    pub first_time: Option<String>,
    pub last_time: Option<String>,
    pub scale_factor: f64,
    pub add_offset: f64,
    pub missing_value: Option<f64>,
    pub labels: Labels,
}

impl DatasetLayout {
    pub fn from_descriptor(descriptor: &DatasetDescriptor) -> Self {
        let units = TimeUnits::parse(descriptor.time_units()).ok();
        let render = |value: Option<&f64>| {
            let value = *value?;
            units.as_ref()?.to_datetime(value).map(|d| d.to_string())
        };
        DatasetLayout {
            data_key: descriptor.data_key().to_string(),
            shape: descriptor.shape().to_vec(),
            gridded: descriptor.gridded(),
            lat_range: extent(descriptor.lat()),
            lon_range: extent(descriptor.lon()),
            time_steps: descriptor.time().len(),
            time_units: descriptor.time_units().to_string(),
            first_time: render(descriptor.time().first()),
            last_time: render(descriptor.time().last()),
            scale_factor: descriptor.scale_factor(),
            add_offset: descriptor.add_offset(),
            missing_value: descriptor.missing_value(),
            labels: descriptor.labels().clone(),
        }
    }
}

fn extent(values: &[f64]) -> Option<(f64, f64)> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    finite.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Report for one dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub path: String,
    /// Number of files behind `path`
    pub files: usize,
    /// File the variables were listed from
    pub first_file: String,
    pub file_size: Option<u64>,
    pub dimensions: BTreeMap<String, usize>,
    pub variables: Vec<FieldInfo>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub global_attributes: BTreeMap<String, String>,
    /// `None` when coordinates or a data variable cannot be detected
    pub layout: Option<DatasetLayout>,
}

/// Inspects a NetCDF file, directory or wildcard pattern.
///
/// `variable` restricts the listing to one variable and is used as the data
/// variable of the layout. `detailed` adds every attribute.
pub fn dataset_info(path: &str, variable: Option<&str>, detailed: bool) -> Result<DatasetInfo> {
    let files = resolve_source(Path::new(path))
        .with_context(|| format!("Failed to resolve {}", path))?
        .files();
    let first = files.first().with_context(|| format!("No files found at {}", path))?;
    debug!("inspecting {} ({} files)", first.display(), files.len());

    let file = netcdf::open(first).with_context(|| format!("Failed to open NetCDF file: {}", first.display()))?;

    let dimensions = file.dimensions().map(|d| (d.name().to_string(), d.len())).collect();

    let mut variables = Vec::new();
    for var in file.variables() {
        if let Some(name) = variable
            && var.name() != name
        {
            continue;
        }
        let attributes = if detailed {
            var.attributes()
                .filter_map(|attr| Some((attr.name().to_string(), render_attribute(&attr.value().ok()?))))
                .collect()
        } else {
            BTreeMap::new()
        };
        variables.push(FieldInfo {
            name: var.name(),
            dimensions: var.dimensions().iter().map(|d| d.name().to_string()).collect(),
            shape: var.dimensions().iter().map(|d| d.len()).collect(),
            long_name: attr_string(&var, "long_name"),
            units: attr_string(&var, "units"),
            attributes,
        });
    }

    let global_attributes = if detailed {
        file.attributes()
            .filter_map(|attr| Some((attr.name().to_string(), render_attribute(&attr.value().ok()?))))
            .collect()
    } else {
        BTreeMap::new()
    };

    file.close().context("Failed to close NetCDF file")?;

    let options = UnpackOptions {
        data_key: variable.map(str::to_string),
        ..Default::default()
    };
    let layout = match from_netcdf(path, &options) {
        Ok(descriptor) => Some(DatasetLayout::from_descriptor(&descriptor)),
        Err(e) => {
            warn!("Could not detect dataset layout: {}", e);
            None
        }
    };

    Ok(DatasetInfo {
        path: path.to_string(),
        files: files.len(),
        first_file: first.display().to_string(),
        file_size: std::fs::metadata(first).ok().map(|m| m.len()),
        dimensions,
        variables,
        global_attributes,
        layout,
    })
}

fn render_attribute(value: &netcdf::AttributeValue) -> String {
    match value {
        netcdf::AttributeValue::Str(text) => text.clone(),
        netcdf::AttributeValue::Double(v) => v.to_string(),
        netcdf::AttributeValue::Float(v) => v.to_string(),
        other => format!("{:?}", other),
    }
}

pub fn print_info_human(info: &DatasetInfo) {
    println!("Dataset: {}", info.path);
    if info.files > 1 {
        println!("  Files: {} (listing {})", info.files, info.first_file);
    }
    if let Some(size) = info.file_size {
        println!("  Size: {:.2} MB", size as f64 / 1_048_576.0);
    }

    match &info.layout {
        Some(layout) => {
            println!("  Name: {}", layout.labels.dataset);
            println!("  Data variable: {} {:?}", layout.data_key, layout.shape);
            println!("  Topology: {}", if layout.gridded { "gridded" } else { "sites" });
            if let Some((lo, hi)) = layout.lat_range {
                println!("  Latitude: {} to {}", lo, hi);
            }
            if let Some((lo, hi)) = layout.lon_range {
                println!("  Longitude: {} to {}", lo, hi);
            }
            match (&layout.first_time, &layout.last_time) {
                (Some(first), Some(last)) => {
                    println!("  Time: {} steps, {} to {}", layout.time_steps, first, last)
                }
                _ => println!("  Time: {} steps ({})", layout.time_steps, layout.time_units),
            }
            println!("  Packing: value * {} + {}", layout.scale_factor, layout.add_offset);
            if let Some(missing) = layout.missing_value {
                println!("  Missing value: {}", missing);
            }
        }
        None => println!("  No extractable variable detected"),
    }

    println!("  Variables:");
    for var in &info.variables {
        let label = match (&var.long_name, &var.units) {
            (Some(name), Some(units)) => format!(" {} ({})", name, units),
            (Some(name), None) => format!(" {}", name),
            (None, Some(units)) => format!(" ({})", units),
            (None, None) => String::new(),
        };
        println!("    {} [{}]{}", var.name, var.dimensions.join(", "), label);
        for (name, value) in &var.attributes {
            println!("      @{}: {}", name, value);
        }
    }
    for (name, value) in &info.global_attributes {
        println!("  @{}: {}", name, value);
    }
}

pub fn print_info_json(info: &DatasetInfo) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(info)?);
    Ok(())
}

pub fn print_info_yaml(info: &DatasetInfo) -> Result<()> {
    let yaml = serde_yaml::to_string(info).context("Failed to serialize dataset info to YAML")?;
    println!("{}", yaml);
    Ok(())
}

/// One row per variable, flagging the detected data variable
pub fn print_info_csv(info: &DatasetInfo) -> Result<()> {
    let data_key = info.layout.as_ref().map(|l| l.data_key.as_str());
    println!("variable,dimensions,shape,units,data_variable");
    for var in &info.variables {
        let shape: Vec<String> = var.shape.iter().map(|s| s.to_string()).collect();
        println!(
            "{},\"{}\",\"{}\",\"{}\",{}",
            var.name,
            var.dimensions.join(";"),
            shape.join(";"),
            var.units.as_deref().unwrap_or(""),
            data_key == Some(var.name.as_str())
        );
    }
    Ok(())
}
