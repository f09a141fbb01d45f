//! Lambert Conformal Conic projection.
//!
//! HRRR publishes its native grid on this projection (GRIB2 template 3.30).
//! The cone constant and scaling follow Snyder, "Map Projections: A Working
//! Manual", eqs. 15-1 to 15-5, on a sphere.

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Earth radius used by NCEP grids (GRIB2 shape of the earth 6).
pub const EARTH_RADIUS_M: f64 = 6_371_229.0;

/// Lambert Conformal projection bound to a grid.
///
/// Grid index `i` grows east and `j` grows north from the first grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambertConformal {
    /// Central meridian (LoV) in radians
    lon0: f64,
    /// Grid spacing in metres
    dx: f64,
    dy: f64,
    /// Cone constant
    n: f64,
    /// Scaled F constant (R·F)
    rf: f64,
    /// Projected position of the first grid point
    x1: f64,
    y1: f64,
}

impl LambertConformal {
    /// Build from the GRIB2 template 3.30 parameters (all angles in degrees).
    pub fn from_grib2(
        lat1_deg: f64,
        lon1_deg: f64,
        lov_deg: f64,
        latin1_deg: f64,
        latin2_deg: f64,
        dx: f64,
        dy: f64,
    ) -> Self {
        let latin1 = latin1_deg.to_radians();
        let latin2 = latin2_deg.to_radians();

        let n = if (latin1 - latin2).abs() < 1e-10 {
            latin1.sin()
        } else {
            (latin1.cos() / latin2.cos()).ln()
                / ((FRAC_PI_4 + latin2 / 2.0).tan() / (FRAC_PI_4 + latin1 / 2.0).tan()).ln()
        };
        let f = latin1.cos() * (FRAC_PI_4 + latin1 / 2.0).tan().powf(n) / n;

        let mut proj = Self {
            lon0: normalize_lon(lov_deg).to_radians(),
            dx,
            dy,
            n,
            rf: EARTH_RADIUS_M * f,
            x1: 0.0,
            y1: 0.0,
        };
        let (x1, y1) = proj.project(lat1_deg, lon1_deg);
        proj.x1 = x1;
        proj.y1 = y1;
        proj
    }

    fn project(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        let mut dlon = normalize_lon(lon_deg).to_radians() - self.lon0;
        if dlon > PI {
            dlon -= 2.0 * PI;
        } else if dlon < -PI {
            dlon += 2.0 * PI;
        }

        let rho = self.rf / (FRAC_PI_4 + lat / 2.0).tan().powf(self.n);
        let theta = self.n * dlon;
        (rho * theta.sin(), -rho * theta.cos())
    }

    /// Fractional grid indices (i, j) of a geographic point.
    pub fn geo_to_grid(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let (x, y) = self.project(lat_deg, lon_deg);
        ((x - self.x1) / self.dx, (y - self.y1) / self.dy)
    }

    /// Geographic position (lat, lon) of fractional grid indices.
    pub fn grid_to_geo(&self, i: f64, j: f64) -> (f64, f64) {
        let x = self.x1 + i * self.dx;
        let y = self.y1 + j * self.dy;

        let rho = self.n.signum() * (x * x + y * y).sqrt();
        let theta = (x * self.n.signum()).atan2(-y * self.n.signum());
        let lat = 2.0 * (self.rf / rho).powf(1.0 / self.n).atan() - FRAC_PI_2;
        let lon = self.lon0 + theta / self.n;

        (lat.to_degrees(), normalize_lon(lon.to_degrees()))
    }
}

/// Wrap a longitude into [-180, 180).
pub fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}
