use crate::coords::{resolve_bounds, CoordBounds, ResolvedBounds};
use crate::error::Result;
use log::debug;

/// Spatial part of a selection.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialSelector {
    /// Outer-product selection over independent latitude and longitude axes
    Grid { lat: Vec<usize>, lon: Vec<usize> },
    /// Positions along a flat list of paired (lat, lon) sites
    Sites(Vec<usize>),
}

impl SpatialSelector {
    pub fn as_grid(&self) -> Option<(&Vec<usize>, &Vec<usize>)> {
        match self {
            SpatialSelector::Grid { lat, lon } => Some((lat, lon)),
            _ => None,
        }
    }

    /// Number of spatial points the selector addresses.
    pub fn len(&self) -> usize {
        match self {
            SpatialSelector::Grid { lat, lon } => lat.len() * lon.len(),
            SpatialSelector::Sites(sites) => sites.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns the selector for the region bounded by `coords`.
///
/// Gridded datasets select the full rectangle spanned by the matching latitude
/// and longitude positions. Site-based datasets pair `lat[i]` with `lon[i]` and
/// select the sites inside the box. An empty match is returned as an empty
/// selector; the extraction engine decides how to report it.
pub fn coord_to_indices(
    lat: &[f64],
    lon: &[f64],
    coords: &CoordBounds,
    gridded: bool,
) -> Result<SpatialSelector> {
    let bounds = resolve_bounds(lat, lon, coords)?;
    let selector = if gridded {
        grid_indices(lat, lon, &bounds)
    } else {
        site_indices(lat, lon, &bounds)
    };
    Ok(selector)
}

pub fn grid_indices(lat: &[f64], lon: &[f64], bounds: &ResolvedBounds) -> SpatialSelector {
    let lat_inds: Vec<usize> = lat
        .iter()
        .enumerate()
        .filter(|(_, la)| bounds.contains_lat(**la))
        .map(|(idx, _)| idx)
        .collect();
    debug!("lat matches: {}", lat_inds.len());

    let lon_inds: Vec<usize> = lon
        .iter()
        .enumerate()
        .filter(|(_, lo)| bounds.contains_lon(**lo))
        .map(|(idx, _)| idx)
        .collect();
    debug!("lon matches: {}", lon_inds.len());

    SpatialSelector::Grid {
        lat: lat_inds,
        lon: lon_inds,
    }
}

/// Site selection.
///
/// Each matching site contributes the position of the *first* site with the
/// same (lat, lon) pair, so duplicated pairs all resolve to one index (repeated
/// once per duplicate). The lookup is a linear scan per match, O(n²) overall.
pub fn site_indices(lat: &[f64], lon: &[f64], bounds: &ResolvedBounds) -> SpatialSelector {
    let sites: Vec<(f64, f64)> = lat.iter().copied().zip(lon.iter().copied()).collect();

    let found: Vec<usize> = sites
        .iter()
        .filter(|(la, lo)| bounds.contains_lat(*la) && bounds.contains_lon(*lo))
        .filter_map(|&(la, lo)| sites.iter().position(|&(a, b)| a == la && b == lo))
        .collect();
    debug!("number of sites found: {}", found.len());

    SpatialSelector::Sites(found)
}
