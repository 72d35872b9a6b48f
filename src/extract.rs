//! # Data Extraction
//!
//! This module turns a [`SelectionRequest`] into a dense `f64` array.
//!
//! ## Key Components
//!
//! - [`ArraySource`]: anything that can hand out a rectangular block of values,
//!   implemented for NetCDF variables and in-memory arrays
//! - [`read_selection`]: applies one [`AxisSelector`] per axis
//! - [`DatasetDescriptor::get_data`]: slice, squeeze, reshape, mask and unpack
//! - [`DatasetDescriptor::get_all_data`]: the same over every file of a dataset,
//!   concatenated along one axis
//!
//! Selections are applied in two steps. The bounding block of every axis
//! selector is read from the source in one call, then index lists are applied
//! axis by axis on the in-memory block. Selecting latitudes `[3, 4]` and
//! longitudes `[7, 9]` therefore yields a 2×2 block (outer indexing), not two
//! points.

use crate::coords::CoordBounds;
use crate::descriptor::DatasetDescriptor;
use crate::error::{ExtractError, Result};
use crate::spatial::{coord_to_indices, SpatialSelector};
use crate::time::{height_to_range, time_to_range, HeightRange, TimeRange};
use log::{debug, info};
use ndarray::{concatenate, ArrayD, ArrayView, Axis, IxDyn, Slice};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A multi-dimensional array that can be read block by block.
pub trait ArraySource {
    /// Extent of every axis.
    fn dims(&self) -> Vec<usize>;

    /// Reads the block starting at `start` with `count` elements along each axis.
    fn read_block(&self, start: &[usize], count: &[usize]) -> Result<ArrayD<f64>>;
}

impl ArraySource for netcdf::Variable<'_> {
    fn dims(&self) -> Vec<usize> {
        self.dimensions().iter().map(|d| d.len()).collect()
    }

    fn read_block(&self, start: &[usize], count: &[usize]) -> Result<ArrayD<f64>> {
        let values: Vec<f64> = self.get_values::<f64, _>((start, count))?;
        ArrayD::from_shape_vec(IxDyn(count), values).map_err(|e| ExtractError::ReshapeMismatch {
            from: vec![count.iter().product()],
            to: count.iter().map(|&c| c as isize).collect(),
            reason: e.to_string(),
        })
    }
}

impl ArraySource for ArrayD<f64> {
    fn dims(&self) -> Vec<usize> {
        self.shape().to_vec()
    }

    fn read_block(&self, start: &[usize], count: &[usize]) -> Result<ArrayD<f64>> {
        let shape = self.shape();
        for axis in 0..shape.len() {
            let end = start[axis] + count[axis];
            if end > shape[axis] {
                return Err(ExtractError::IndexOutOfBounds {
                    axis: axis.to_string(),
                    index: end - 1,
                    len: shape[axis],
                });
            }
        }
        let block = self.slice_each_axis(|ax| {
            let axis = ax.axis.index();
            Slice::from(start[axis]..start[axis] + count[axis])
        });
        Ok(block.to_owned())
    }
}

/// Positions to keep along one axis.
#[derive(Debug, Clone, PartialEq)]
pub enum AxisSelector {
    /// Contiguous half-open range
    Range(Range<usize>),
    /// Explicit positions, kept in the given order (repeats allowed)
    Indices(Vec<usize>),
}

impl AxisSelector {
    pub fn len(&self) -> usize {
        match self {
            AxisSelector::Range(range) => range.len(),
            AxisSelector::Indices(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest covering range, `None` when empty.
    pub fn bounds(&self) -> Option<Range<usize>> {
        match self {
            AxisSelector::Range(range) if range.is_empty() => None,
            AxisSelector::Range(range) => Some(range.clone()),
            AxisSelector::Indices(indices) => {
                let min = *indices.iter().min()?;
                let max = *indices.iter().max()?;
                Some(min..max + 1)
            }
        }
    }
}

/// An [`AxisSelector`] tagged with the name of the axis it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSlice {
    pub axis: &'static str,
    pub selector: AxisSelector,
}

impl AxisSlice {
    pub fn new(axis: &'static str, selector: AxisSelector) -> Self {
        AxisSlice { axis, selector }
    }
}

/// Reads `selection` out of `source`, one selector per axis in storage order.
///
/// # Errors
///
/// - [`ExtractError::SelectionRank`] if the number of selectors differs from the
///   number of axes
/// - [`ExtractError::EmptySelection`] if any selector keeps nothing
/// - [`ExtractError::IndexOutOfBounds`] if a selector reaches past its axis
pub fn read_selection<S: ArraySource + ?Sized>(source: &S, selection: &[AxisSlice]) -> Result<ArrayD<f64>> {
    let dims = source.dims();
    if selection.len() != dims.len() {
        return Err(ExtractError::SelectionRank {
            expected: dims.len(),
            found: selection.len(),
        });
    }

    let mut start = Vec::with_capacity(dims.len());
    let mut count = Vec::with_capacity(dims.len());
    for (slice, &len) in selection.iter().zip(&dims) {
        let bounds = slice.selector.bounds().ok_or_else(|| ExtractError::EmptySelection {
            axis: slice.axis.to_string(),
        })?;
        if bounds.end > len {
            return Err(ExtractError::IndexOutOfBounds {
                axis: slice.axis.to_string(),
                index: bounds.end - 1,
                len,
            });
        }
        start.push(bounds.start);
        count.push(bounds.len());
    }
    debug!("reading block start={:?} count={:?}", start, count);

    let mut block = source.read_block(&start, &count)?;
    for (axis, slice) in selection.iter().enumerate() {
        if let AxisSelector::Indices(indices) = &slice.selector {
            let relative: Vec<usize> = indices.iter().map(|&i| i - start[axis]).collect();
            let contiguous = relative.iter().enumerate().all(|(pos, &i)| pos == i);
            if !(contiguous && relative.len() == count[axis]) {
                block = block.select(Axis(axis), &relative);
            }
        }
    }
    Ok(block)
}

/// Target shape for extracted data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReshapeRepr", into = "ReshapeRepr")]
pub enum DataReshape {
    /// Keep the first axis and flatten the rest, `("time", "latlon")`
    TimeLatLon,
    /// Literal shape, at most one `-1` to be inferred
    Shape(Vec<isize>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ReshapeRepr {
    Shape(Vec<isize>),
    Symbolic(Vec<String>),
}

impl TryFrom<ReshapeRepr> for DataReshape {
    type Error = String;

    fn try_from(repr: ReshapeRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            ReshapeRepr::Shape(dims) => Ok(DataReshape::Shape(dims)),
            ReshapeRepr::Symbolic(names) if names == ["time", "latlon"] => Ok(DataReshape::TimeLatLon),
            ReshapeRepr::Symbolic(names) => Err(format!(
                "unknown reshape {:?}, expected [\"time\", \"latlon\"] or a list of integers",
                names
            )),
        }
    }
}

impl From<DataReshape> for ReshapeRepr {
    fn from(reshape: DataReshape) -> Self {
        match reshape {
            DataReshape::TimeLatLon => ReshapeRepr::Symbolic(vec!["time".into(), "latlon".into()]),
            DataReshape::Shape(dims) => ReshapeRepr::Shape(dims),
        }
    }
}

impl FromStr for DataReshape {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts == ["time", "latlon"] {
            return Ok(DataReshape::TimeLatLon);
        }
        parts
            .iter()
            .map(|p| p.parse::<isize>().map_err(|_| format!("Invalid reshape dimension '{}'", p)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(DataReshape::Shape)
    }
}

impl fmt::Display for DataReshape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataReshape::TimeLatLon => write!(f, "time,latlon"),
            DataReshape::Shape(dims) => {
                let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

impl DataReshape {
    /// Concrete dimensions for an array of `shape`, with `-1` inferred.
    pub fn resolve(&self, shape: &[usize]) -> Result<Vec<usize>> {
        let requested = match self {
            DataReshape::TimeLatLon => match shape.first() {
                Some(&first) => vec![first as isize, -1],
                None => {
                    return Err(reshape_error(shape, &[], "array has no axes"));
                }
            },
            DataReshape::Shape(dims) => dims.clone(),
        };

        let total: usize = shape.iter().product();
        let mut inferred = None;
        let mut known: usize = 1;
        for (pos, &dim) in requested.iter().enumerate() {
            match dim {
                -1 if inferred.is_none() => inferred = Some(pos),
                -1 => return Err(reshape_error(shape, &requested, "only one dimension can be -1")),
                d if d < 0 => return Err(reshape_error(shape, &requested, "negative dimension")),
                d => known *= d as usize,
            }
        }

        let mut dims: Vec<usize> = requested.iter().map(|&d| d.max(0) as usize).collect();
        match inferred {
            Some(pos) => {
                if known == 0 || total % known != 0 {
                    return Err(reshape_error(
                        shape,
                        &requested,
                        &format!("{} elements do not divide into the known dimensions", total),
                    ));
                }
                dims[pos] = total / known;
            }
            None if known != total => {
                return Err(reshape_error(
                    shape,
                    &requested,
                    &format!("{} elements cannot fill {} slots", total, known),
                ));
            }
            None => {}
        }
        Ok(dims)
    }
}

fn reshape_error(shape: &[usize], to: &[isize], reason: &str) -> ExtractError {
    ExtractError::ReshapeMismatch {
        from: shape.to_vec(),
        to: to.to_vec(),
        reason: reason.to_string(),
    }
}

/// Drops every axis of length one.
pub fn squeeze(mut data: ArrayD<f64>) -> ArrayD<f64> {
    for axis in (0..data.ndim()).rev() {
        if data.shape()[axis] == 1 {
            data = data.index_axis_move(Axis(axis), 0);
        }
    }
    data
}

/// Reshapes `data` in logical (row-major) element order.
pub fn reshape(data: ArrayD<f64>, reshape: &DataReshape) -> Result<ArrayD<f64>> {
    let dims = reshape.resolve(data.shape())?;
    let from = data.shape().to_vec();
    let values: Vec<f64> = data.iter().copied().collect();
    ArrayD::from_shape_vec(IxDyn(&dims), values).map_err(|e| ExtractError::ReshapeMismatch {
        from,
        to: dims.iter().map(|&d| d as isize).collect(),
        reason: e.to_string(),
    })
}

/// Everything a caller can ask of one extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionRequest {
    #[serde(default)]
    pub coords: CoordBounds,
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<HeightRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_reshape: Option<DataReshape>,
    /// Replace raw values equal to the missing value with NaN before unpacking
    #[serde(default)]
    pub mask_missing: bool,
}

impl SelectionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coords(mut self, coords: CoordBounds) -> Self {
        self.coords = coords;
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn with_reshape(mut self, reshape: DataReshape) -> Self {
        self.data_reshape = Some(reshape);
        self
    }

    pub fn with_mask_missing(mut self, mask_missing: bool) -> Self {
        self.mask_missing = mask_missing;
        self
    }
}

impl DatasetDescriptor {
    /// Builds the per-axis selectors for a request, in storage order:
    /// time, then height (4-D data only), then lat and lon or sites.
    pub fn selection(
        &self,
        time_range: &TimeRange,
        coords: &CoordBounds,
        height: Option<&HeightRange>,
    ) -> Result<Vec<AxisSlice>> {
        let ndim = self.ndim();
        let mut selection = vec![AxisSlice::new(
            "time",
            AxisSelector::Range(time_to_range(self.time(), self.time_units(), time_range)?),
        )];

        if ndim == 4 || height.is_some() {
            let whole_column = HeightRange::default();
            let levels = height_to_range(self.height().unwrap_or(&[]), height.unwrap_or(&whole_column))?;
            selection.push(AxisSlice::new("height", AxisSelector::Range(levels)));
        }

        let spatial = coord_to_indices(self.lat(), self.lon(), coords, self.gridded())?;
        match spatial {
            SpatialSelector::Grid { lat, lon } if self.gridded() => {
                debug!("grid selection: {} lats x {} lons", lat.len(), lon.len());
                selection.push(AxisSlice::new("lat", AxisSelector::Indices(lat)));
                selection.push(AxisSlice::new("lon", AxisSelector::Indices(lon)));
            }
            SpatialSelector::Sites(sites) if ndim == 2 => {
                debug!("site selection: {} sites", sites.len());
                selection.push(AxisSlice::new("site", AxisSelector::Indices(sites)));
            }
            _ => {
                return Err(ExtractError::UnhandledDimension {
                    ndim,
                    gridded: self.gridded(),
                });
            }
        }

        if selection.len() != ndim {
            return Err(ExtractError::UnhandledDimension {
                ndim,
                gridded: self.gridded(),
            });
        }
        Ok(selection)
    }

    /// Reads the raw (still packed) values selected by the time range and
    /// bounding box.
    pub fn get_slice<S: ArraySource + ?Sized>(
        &self,
        source: &S,
        time_range: &TimeRange,
        coords: &CoordBounds,
        height: Option<&HeightRange>,
    ) -> Result<ArrayD<f64>> {
        let selection = self.selection(time_range, coords, height)?;
        read_selection(source, &selection)
    }

    /// Extracts, squeezes, reshapes, masks and unpacks the requested data.
    ///
    /// Unpacking computes `add_offset + value * scale_factor`. A result with
    /// no axes left after squeezing is returned as a one-element array.
    pub fn get_data<S: ArraySource + ?Sized>(&self, source: &S, request: &SelectionRequest) -> Result<ArrayD<f64>> {
        let data = self.get_slice(
            source,
            &request.time_range,
            &request.coords,
            request.height.as_ref(),
        )?;
        debug!("shape before squeeze: {:?}", data.shape());
        let mut data = squeeze(data);
        debug!("shape after squeeze: {:?}", data.shape());

        if let Some(target) = &request.data_reshape {
            data = reshape(data, target)?;
            debug!("shape after reshape: {:?}", data.shape());
        }

        if request.mask_missing
            && let Some(missing) = self.missing_value()
        {
            data.mapv_inplace(|v| if v == missing { f64::NAN } else { v });
        }

        let (scale, offset) = (self.scale_factor(), self.add_offset());
        data.mapv_inplace(|v| offset + v * scale);

        if data.ndim() == 0 {
            let value = data.iter().next().copied().unwrap_or(f64::NAN);
            data = ArrayD::from_elem(IxDyn(&[1]), value);
        }
        Ok(data)
    }

    /// Extracts from one file through the reader for the dataset's format.
    pub fn extract_file(&self, path: &Path, request: &SelectionRequest) -> Result<ArrayD<f64>> {
        self.format().reader().extract(self, path, request)
    }

    /// Extracts from every file of the dataset and concatenates the pieces.
    ///
    /// `file_list` overrides the descriptor's own source. `concat_axis` may be
    /// negative to count from the last axis.
    ///
    /// Without `file_list`, a multi-file dataset whose time axis was joined
    /// from its files (see [`crate::unpack::from_netcdf`]) is read as one array:
    /// the time range is resolved against the joined axis, each file is read
    /// over its share of the selected steps, and the raw blocks are stacked
    /// along time before squeezing and unpacking. `concat_axis` does not apply
    /// there. Files holding none of the selected steps are not opened.
    ///
    /// Files of an explicit `file_list` are extracted one by one and joined
    /// along `concat_axis`. A listed file of the joined source is read against
    /// its own share of the time axis and left out when it holds no selected
    /// step. Any other file is read as if it held the descriptor's time axis.
    pub fn get_all_data(
        &self,
        request: &SelectionRequest,
        file_list: Option<&[PathBuf]>,
        concat_axis: isize,
    ) -> Result<ArrayD<f64>> {
        self.get_all_data_with(request, file_list, concat_axis, |_, _| {})
    }

    /// [`get_all_data`](Self::get_all_data) with a callback invoked after each
    /// file has been read.
    pub fn get_all_data_with<F>(
        &self,
        request: &SelectionRequest,
        file_list: Option<&[PathBuf]>,
        concat_axis: isize,
        mut on_file: F,
    ) -> Result<ArrayD<f64>>
    where
        F: FnMut(usize, &Path),
    {
        let files = match file_list {
            Some(files) => files.to_vec(),
            None => self.source().files(),
        };
        if files.is_empty() {
            return Err(ExtractError::NoInputFiles(PathBuf::new()));
        }

        if file_list.is_none()
            && let Some(spans) = self.file_time_spans()
        {
            info!("extracting from {} files joined along time", files.len());
            let joined = JoinedSource {
                descriptor: self,
                files: &files,
                spans,
                on_file: RefCell::new(on_file),
            };
            return self.get_data(&joined, request);
        }

        if files.len() > 1 {
            info!("extracting from {} files", files.len());
        }
        let mut pieces = Vec::with_capacity(files.len());
        for (i, path) in files.iter().enumerate() {
            match self.file_descriptor(path) {
                Some(view) => match view.extract_file(path, request) {
                    Err(ExtractError::EmptySelection { axis }) if axis == "time" => {
                        debug!("{}: no selected steps, skipped", path.display());
                    }
                    piece => pieces.push(piece?),
                },
                None => pieces.push(self.extract_file(path, request)?),
            }
            on_file(i, path);
        }

        match pieces.len() {
            0 => Err(ExtractError::EmptySelection {
                axis: "time".to_string(),
            }),
            1 => Ok(pieces.remove(0)),
            _ => concat(&pieces, concat_axis),
        }
    }
}

/// The files of a multi-file dataset seen as one array, stacked along time.
struct JoinedSource<'a, F> {
    descriptor: &'a DatasetDescriptor,
    files: &'a [PathBuf],
    spans: Vec<Range<usize>>,
    on_file: RefCell<F>,
}

impl<F> ArraySource for JoinedSource<'_, F>
where
    F: FnMut(usize, &Path),
{
    fn dims(&self) -> Vec<usize> {
        self.descriptor.shape().to_vec()
    }

    fn read_block(&self, start: &[usize], count: &[usize]) -> Result<ArrayD<f64>> {
        let wanted = start[0]..start[0] + count[0];
        let reader = self.descriptor.format().reader();
        let mut blocks = Vec::new();

        for (i, (path, span)) in self.files.iter().zip(&self.spans).enumerate() {
            let first = wanted.start.max(span.start);
            let end = wanted.end.min(span.end);
            if first >= end {
                debug!("{}: no selected steps, skipped", path.display());
                continue;
            }
            let mut local_start = start.to_vec();
            let mut local_count = count.to_vec();
            local_start[0] = first - span.start;
            local_count[0] = end - first;
            debug!("{}: steps {}..{}", path.display(), local_start[0], local_start[0] + local_count[0]);

            blocks.push(reader.read_block(self.descriptor, path, &local_start, &local_count)?);
            (*self.on_file.borrow_mut())(i, path);
        }

        if blocks.is_empty() {
            return Err(ExtractError::EmptySelection {
                axis: "time".to_string(),
            });
        }
        concat(&blocks, 0)
    }
}

/// Concatenates arrays along `axis`, negative values counting from the end.
pub fn concat(pieces: &[ArrayD<f64>], axis: isize) -> Result<ArrayD<f64>> {
    let ndim = pieces.first().map(|p| p.ndim()).unwrap_or(0);
    let resolved = normalize_axis(axis, ndim)?;
    let views: Vec<ArrayView<f64, IxDyn>> = pieces.iter().map(|p| p.view()).collect();
    concatenate(Axis(resolved), &views).map_err(|e| ExtractError::Concatenation(e.to_string()))
}

pub(crate) fn normalize_axis(axis: isize, ndim: usize) -> Result<usize> {
    let resolved = if axis < 0 { ndim as isize + axis } else { axis };
    if resolved < 0 || resolved >= ndim as isize {
        return Err(ExtractError::InvalidAxis { axis, ndim });
    }
    Ok(resolved as usize)
}
