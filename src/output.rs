//! # Output Module
//!
//! Writes extraction results to disk.
//!
//! ## Formats
//!
//! - **Parquet**: a long table with one row per value. When the result still
//!   lines up with the selection (no reshape, reduction or concatenation), the
//!   rows carry `time`, `date`, `lat` and `lon` (plus `site` for site-based
//!   data). Otherwise they carry `dim_0`, `dim_1`, ... positions.
//! - **JSON**: `{"shape": [...], "data": [...]}` with data in row-major order
//!   and NaN written as `null`.

use crate::descriptor::DatasetDescriptor;
use crate::extract::{AxisSelector, AxisSlice};
use crate::time::TimeUnits;
use log::{debug, warn};
use ndarray::ArrayD;
use polars::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;

#[derive(Serialize)]
struct JsonArray<'a> {
    shape: &'a [usize],
    data: Vec<Option<f64>>,
}

/// Builds a long table labelled with coordinate values.
///
/// `selection` must be the selection `data` was read with, so that the
/// product of the selector lengths equals the number of values.
pub fn selection_to_dataframe(
    descriptor: &DatasetDescriptor,
    selection: &[AxisSlice],
    data: &ArrayD<f64>,
) -> Result<DataFrame, Box<dyn std::error::Error>> {
    let positions: Vec<Vec<usize>> = selection
        .iter()
        .map(|slice| match &slice.selector {
            AxisSelector::Range(range) => range.clone().collect(),
            AxisSelector::Indices(indices) => indices.clone(),
        })
        .collect();
    let lens: Vec<usize> = positions.iter().map(|p| p.len()).collect();
    let expected: usize = lens.iter().product();
    if expected != data.len() {
        return Err(format!(
            "selection covers {} values but the array holds {}",
            expected,
            data.len()
        )
        .into());
    }

    let units = TimeUnits::parse(descriptor.time_units()).ok();
    let mut time = Vec::with_capacity(data.len());
    let mut dates = Vec::with_capacity(data.len());
    let mut sites: Vec<u32> = Vec::new();
    let mut lat = Vec::with_capacity(data.len());
    let mut lon = Vec::with_capacity(data.len());
    let mut values = Vec::with_capacity(data.len());

    let mut cursor = vec![0usize; lens.len()];
    for value in data.iter() {
        for (axis, slice) in selection.iter().enumerate() {
            let pos = positions[axis][cursor[axis]];
            match slice.axis {
                "time" => {
                    let t = descriptor.time()[pos];
                    time.push(t);
                    let date = units
                        .as_ref()
                        .and_then(|u| u.to_datetime(t))
                        .map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string());
                    dates.push(date);
                }
                "lat" => lat.push(descriptor.lat()[pos]),
                "lon" => lon.push(descriptor.lon()[pos]),
                "site" => {
                    sites.push(pos as u32);
                    lat.push(descriptor.lat()[pos]);
                    lon.push(descriptor.lon()[pos]);
                }
                other => warn!("no coordinate column for axis '{}'", other),
            }
        }
        values.push(*value);

        for axis in (0..cursor.len()).rev() {
            cursor[axis] += 1;
            if cursor[axis] < lens[axis] {
                break;
            }
            cursor[axis] = 0;
        }
    }

    let mut columns: Vec<Column> = vec![
        Series::new("time".into(), time).into(),
        Series::new("date".into(), dates).into(),
    ];
    if !sites.is_empty() {
        columns.push(Series::new("site".into(), sites).into());
    }
    columns.push(Series::new("lat".into(), lat).into());
    columns.push(Series::new("lon".into(), lon).into());
    columns.push(Series::new(descriptor.data_key().into(), values).into());

    Ok(DataFrame::new(columns)?)
}

/// Builds a long table indexed by array positions.
pub fn array_to_dataframe(data: &ArrayD<f64>, value_name: &str) -> Result<DataFrame, Box<dyn std::error::Error>> {
    let mut dims: Vec<Vec<u32>> = vec![Vec::with_capacity(data.len()); data.ndim()];
    let mut values = Vec::with_capacity(data.len());
    for (index, value) in data.indexed_iter() {
        for (axis, column) in dims.iter_mut().enumerate() {
            column.push(index[axis] as u32);
        }
        values.push(*value);
    }

    let mut columns: Vec<Column> = dims
        .into_iter()
        .enumerate()
        .map(|(axis, column)| Series::new(format!("dim_{}", axis).into(), column).into())
        .collect();
    columns.push(Series::new(value_name.into(), values).into());
    Ok(DataFrame::new(columns)?)
}

/// Writes a DataFrame to a Parquet file.
///
/// # Errors
///
/// This function will return an error if:
/// - The output path is not writable
/// - The DataFrame contains unsupported data types for Parquet
pub fn write_dataframe_to_parquet(df: &DataFrame, output_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    debug!("Writing DataFrame to parquet file: {}", output_path);
    debug!("DataFrame shape: {:?}", df.shape());
    debug!("DataFrame schema:\n{:?}", df.schema());
    debug!("First few rows:\n{}", df.head(Some(5)));

    let file = File::create(output_path)?;
    let mut df_clone = df.clone();
    ParquetWriter::new(file).finish(&mut df_clone).map_err(|e| {
        debug!("ParquetWriter failed: {}", e);
        e
    })?;

    debug!("Successfully wrote parquet file: {}", output_path);
    Ok(())
}

/// Writes an array as `{"shape": [...], "data": [...]}`.
pub fn write_array_to_json(data: &ArrayD<f64>, output_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    debug!("Writing array of shape {:?} to {}", data.shape(), output_path);
    let payload = JsonArray {
        shape: data.shape(),
        data: data.iter().map(|v| if v.is_nan() { None } else { Some(*v) }).collect(),
    };
    let writer = BufWriter::new(File::create(output_path)?);
    serde_json::to_writer(writer, &payload)?;
    Ok(())
}
