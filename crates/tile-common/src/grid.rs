//! Decoded scalar fields and their geographic sampling.
//!
//! Storage convention for regular lat/lon grids: row 0 is the northernmost
//! row and latitude decreases by `dlat` per row; column 0 sits at
//! `origin_lon` and longitude increases east by `dlon` per column. Decoders
//! flip south-to-north payloads into this order. Query longitudes in any
//! range are normalized relative to `origin_lon`, so a 0..360 grid answers
//! -180..180 queries.
//!
//! Lambert conformal grids keep their payload order, with row `j` growing
//! north from the first grid point.

use crate::projection::{normalize_lon, LambertConformal};
use crate::BoundingBox;
use chrono::{DateTime, Utc};

/// Sub-cell distance under which a fractional index counts as exact.
const INDEX_EPSILON: f64 = 1e-9;

/// How grid indices map onto the globe.
#[derive(Debug, Clone, PartialEq)]
pub enum GridGeometry {
    LatLon {
        origin_lat: f64,
        origin_lon: f64,
        /// Positive latitude step between rows (southward)
        dlat: f64,
        /// Positive longitude step between columns (eastward)
        dlon: f64,
    },
    Lambert(LambertConformal),
}

/// An immutable row-major scalar field.
#[derive(Debug, Clone)]
pub struct Grid {
    geometry: GridGeometry,
    rows: usize,
    cols: usize,
    values: Vec<f32>,
    reference_time: Option<DateTime<Utc>>,
    bbox: BoundingBox,
    wraps_longitude: bool,
}

impl Grid {
    /// Build a regular lat/lon grid. `values` must hold `rows * cols` cells.
    pub fn lat_lon(
        origin_lat: f64,
        origin_lon: f64,
        dlat: f64,
        dlon: f64,
        rows: usize,
        cols: usize,
        values: Vec<f32>,
    ) -> Result<Self, String> {
        if rows == 0 || cols == 0 {
            return Err("grid has no cells".to_string());
        }
        if values.len() != rows * cols {
            return Err(format!(
                "grid expects {} values ({}x{}), got {}",
                rows * cols,
                rows,
                cols,
                values.len()
            ));
        }
        if !(dlat > 0.0 && dlon > 0.0) {
            return Err(format!("invalid resolution dlat={dlat} dlon={dlon}"));
        }

        let min_lat = origin_lat - (rows - 1) as f64 * dlat;
        let max_lon = origin_lon + (cols - 1) as f64 * dlon;
        let wraps_longitude = (cols as f64 * dlon - 360.0).abs() < 1e-6;

        Ok(Self {
            geometry: GridGeometry::LatLon {
                origin_lat,
                origin_lon,
                dlat,
                dlon,
            },
            rows,
            cols,
            values,
            reference_time: None,
            bbox: BoundingBox::new(origin_lon, min_lat, max_lon, origin_lat),
            wraps_longitude,
        })
    }

    /// Build a Lambert conformal grid in payload order.
    pub fn lambert(
        projection: LambertConformal,
        rows: usize,
        cols: usize,
        values: Vec<f32>,
    ) -> Result<Self, String> {
        if rows == 0 || cols == 0 {
            return Err("grid has no cells".to_string());
        }
        if values.len() != rows * cols {
            return Err(format!(
                "grid expects {} values ({}x{}), got {}",
                rows * cols,
                rows,
                cols,
                values.len()
            ));
        }

        let bbox = lambert_bbox(&projection, rows, cols);
        Ok(Self {
            geometry: GridGeometry::Lambert(projection),
            rows,
            cols,
            values,
            reference_time: None,
            bbox,
            wraps_longitude: false,
        })
    }

    pub fn with_reference_time(mut self, time: DateTime<Utc>) -> Self {
        self.reference_time = Some(time);
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.reference_time
    }

    /// Geographic extent covered by the cell centres.
    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    /// Value stored at (row, col), if inside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            self.values.get(row * self.cols + col).copied()
        } else {
            None
        }
    }

    /// Continuous (row, col) of a geographic point, or None when the point
    /// is outside the grid.
    pub fn fractional_index(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }

        let (row, col) = match &self.geometry {
            GridGeometry::LatLon {
                origin_lat,
                origin_lon,
                dlat,
                dlon,
            } => {
                let offset = (lon - origin_lon).rem_euclid(360.0);
                ((origin_lat - lat) / dlat, offset / dlon)
            }
            GridGeometry::Lambert(proj) => {
                let (i, j) = proj.geo_to_grid(lat, normalize_lon(lon));
                (j, i)
            }
        };

        let row = snap(row);
        let col = snap(col);
        let max_col = if self.wraps_longitude {
            self.cols as f64
        } else {
            (self.cols - 1) as f64
        };

        if row < 0.0 || row > (self.rows - 1) as f64 || col < 0.0 || col > max_col {
            return None;
        }
        Some((row, col))
    }

    /// Sample the field at a geographic point.
    ///
    /// Exact grid positions return the stored cell, positions on a grid line
    /// interpolate along the other axis only, and everything else blends the
    /// surrounding 2x2 cells. Points outside the grid return 0.
    pub fn bilinear_interpolation(&self, lat: f64, lon: f64) -> f32 {
        let Some((row, col)) = self.fractional_index(lat, lon) else {
            return 0.0;
        };

        let r0 = row.floor() as usize;
        let c0 = col.floor() as usize;
        let row_exact = row.fract() == 0.0;
        let col_exact = col.fract() == 0.0;

        match (row_exact, col_exact) {
            (true, true) => self.cell(r0, c0),
            (true, false) => {
                let t = col - c0 as f64;
                lerp(self.cell(r0, c0), self.cell(r0, c0 + 1), t)
            }
            (false, true) => {
                let t = row - r0 as f64;
                lerp(self.cell(r0, c0), self.cell(r0 + 1, c0), t)
            }
            (false, false) => {
                let tr = row - r0 as f64;
                let tc = col - c0 as f64;
                let top = lerp(self.cell(r0, c0), self.cell(r0, c0 + 1), tc);
                let bottom = lerp(self.cell(r0 + 1, c0), self.cell(r0 + 1, c0 + 1), tc);
                lerp(top, bottom, tr)
            }
        }
    }

    /// Cell lookup where the column wraps on global grids and rows clamp.
    fn cell(&self, row: usize, col: usize) -> f32 {
        let row = row.min(self.rows - 1);
        let col = if self.wraps_longitude {
            col % self.cols
        } else {
            col.min(self.cols - 1)
        };
        self.values[row * self.cols + col]
    }
}

fn snap(index: f64) -> f64 {
    let rounded = index.round();
    if (index - rounded).abs() < INDEX_EPSILON {
        rounded
    } else {
        index
    }
}

fn lerp(a: f32, b: f32, t: f64) -> f32 {
    (a as f64 + (b as f64 - a as f64) * t) as f32
}

fn lambert_bbox(proj: &LambertConformal, rows: usize, cols: usize) -> BoundingBox {
    let (mut min_lat, mut max_lat) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_lon, mut max_lon) = (f64::INFINITY, f64::NEG_INFINITY);
    let last_row = (rows - 1) as f64;
    let last_col = (cols - 1) as f64;

    let edge = (0..cols)
        .flat_map(|c| [(0.0, c as f64), (last_row, c as f64)])
        .chain((0..rows).flat_map(|r| [(r as f64, 0.0), (r as f64, last_col)]));

    for (row, col) in edge {
        let (lat, lon) = proj.grid_to_geo(col, row);
        min_lat = min_lat.min(lat);
        max_lat = max_lat.max(lat);
        min_lon = min_lon.min(lon);
        max_lon = max_lon.max(lon);
    }

    BoundingBox::new(min_lon, min_lat, max_lon, max_lat)
}
