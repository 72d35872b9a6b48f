//! # geoslice
//!
//! A Rust library for cutting spatial and temporal subsets out of geophysical
//! NetCDF datasets.
//!
//! ## Features
//!
//! - **Flexible coordinates**: signed degrees or cardinal notation (`"61S"`, `"120W"`)
//! - **Partial dates**: `[1938]` covers the whole year, `[1938, 5]` the whole month
//! - **Two topologies**: regular lat/lon grids and paired site coordinates
//! - **Packed data**: `scale_factor`/`add_offset` unpacking and missing-value masking
//! - **Multi-file datasets**: directories and wildcard patterns, concatenated in order
//! - **Reductions**: mean and standard deviation that skip missing values
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use geoslice::coords::CoordBounds;
//! use geoslice::extract::SelectionRequest;
//! use geoslice::time::{TimeBound, TimeRange};
//! use geoslice::unpack::{from_netcdf, UnpackOptions};
//!
//! let descriptor = from_netcdf("gistemp1200_ERSST.nc", &UnpackOptions::default())?;
//! let request = SelectionRequest::new()
//!     .with_coords(CoordBounds::new().top("61N").bottom("61S").left(91.0).right(271.0))
//!     .with_time_range(TimeRange::new(
//!         Some(TimeBound::date(&[1913, 5])),
//!         Some(TimeBound::date(&[1971, 9])),
//!     ));
//! let data = descriptor.get_all_data(&request, None, -1)?;
//! println!("{:?}", data.shape());
//! # Ok::<(), geoslice::error::ExtractError>(())
//! ```
//!
//! ## Job Example
//!
//! ```json
//! {
//!   "input": "gistemp1200_ERSST.nc",
//!   "output": "pacific.parquet",
//!   "selection": {
//!     "coords": {"top": "61N", "bottom": "61S", "left": 91, "right": 271},
//!     "time_range": {"start": [1913, 5], "end": [1971, 9]},
//!     "mask_missing": true
//!   }
//! }
//! ```

pub mod coords;
pub mod descriptor;
pub mod error;
pub mod extract;
pub mod info;
pub mod input;
pub mod log;
pub mod output;
pub mod spatial;
pub mod stats;
pub mod time;
pub mod unpack;

pub mod cli;


#[cfg(test)]
mod cli_tests;

use crate::descriptor::DatasetDescriptor;
use crate::input::{ExtractionJob, OutputKind};
use crate::output::{array_to_dataframe, selection_to_dataframe, write_array_to_json, write_dataframe_to_parquet};
use ndarray::ArrayD;
use std::path::Path;

/// Reads the dataset metadata a job refers to.
pub fn load_descriptor(job: &ExtractionJob) -> error::Result<DatasetDescriptor> {
    unpack::from_netcdf(&job.input, &job.dataset)
}

/// Extracts the job's selection from every file and applies its statistic.
///
/// `on_file` is called after each file has been read.
pub fn extract_job<F>(job: &ExtractionJob, descriptor: &DatasetDescriptor, on_file: F) -> error::Result<ArrayD<f64>>
where
    F: FnMut(usize, &Path),
{
    let data = descriptor.get_all_data_with(&job.selection, job.files.as_deref(), job.concat_axis, on_file)?;
    match &job.statistic {
        Some(stat) => stat.kind.apply(&data, stat.axis, descriptor.missing_value()),
        None => Ok(data),
    }
}

/// Writes extracted data to the job's output path.
///
/// Parquet output is labelled with coordinate values when the array still
/// matches the selection one to one.
pub fn write_output(
    job: &ExtractionJob,
    descriptor: &DatasetDescriptor,
    data: &ArrayD<f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    match OutputKind::from_path(&job.output) {
        Some(OutputKind::Parquet) => {
            let labelled = job.selection.data_reshape.is_none()
                && job.statistic.is_none()
                && job.files.is_none()
                && !descriptor.is_multifile();
            let df = if labelled {
                let selection = descriptor.selection(
                    &job.selection.time_range,
                    &job.selection.coords,
                    job.selection.height.as_ref(),
                )?;
                selection_to_dataframe(descriptor, &selection, data)?
            } else {
                array_to_dataframe(data, descriptor.data_key())?
            };
            write_dataframe_to_parquet(&df, &job.output)
        }
        Some(OutputKind::Json) => write_array_to_json(data, &job.output),
        None => Err(format!("Unsupported output '{}': use .parquet or .json", job.output).into()),
    }
}

/// Runs an extraction job end to end.
///
/// This function orchestrates the entire pipeline:
/// 1. Reads the dataset metadata from the input's NetCDF headers
/// 2. Resolves the bounding box and time range into indices
/// 3. Extracts, unpacks and concatenates the data of every file
/// 4. Applies the optional statistic
/// 5. Writes the result to Parquet or JSON
///
/// # Examples
///
/// ```rust,no_run
/// use geoslice::{run_extraction_job, input::ExtractionJob};
///
/// let job = ExtractionJob::from_file("pacific.json")?;
/// let data = run_extraction_job(&job)?;
/// println!("extracted {:?}", data.shape());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Errors
///
/// This function will return an error if:
/// - The input cannot be opened or its coordinates cannot be detected
/// - The selection is empty or cannot be applied to the data's dimensions
/// - The output file cannot be written
pub fn run_extraction_job(job: &ExtractionJob) -> Result<ArrayD<f64>, Box<dyn std::error::Error>> {
    let descriptor = load_descriptor(job)?;
    let data = extract_job(job, &descriptor, |_, _| {})?;
    write_output(job, &descriptor, &data)?;
    Ok(data)
}
