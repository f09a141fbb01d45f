//! XYZ web-Mercator tile math.

use crate::BoundingBox;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Edge length of every rendered tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// A tile coordinate (z/x/y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Whether x and y fall inside the 2^z × 2^z matrix.
    pub fn is_valid(&self) -> bool {
        if self.z > 30 {
            return false;
        }
        let n = 1u64 << self.z;
        (self.x as u64) < n && (self.y as u64) < n
    }

    /// Get the parent tile (zoom - 1).
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            return None;
        }
        Some(TileCoord {
            z: self.z - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Get the four children tiles (zoom + 1).
    pub fn children(&self) -> [TileCoord; 4] {
        let x = self.x * 2;
        let y = self.y * 2;
        let z = self.z + 1;
        [
            TileCoord { z, x, y },
            TileCoord { z, x: x + 1, y },
            TileCoord { z, x, y: y + 1 },
            TileCoord { z, x: x + 1, y: y + 1 },
        ]
    }
}

/// Longitude of the west edge of tile column `x`.
pub fn tile_to_longitude(x: u32, z: u32) -> f64 {
    x as f64 / 2f64.powi(z as i32) * 360.0 - 180.0
}

/// Latitude of the north edge of tile row `y` (inverse Mercator).
pub fn tile_to_latitude(y: u32, z: u32) -> f64 {
    (PI - 2.0 * PI * y as f64 / 2f64.powi(z as i32))
        .sinh()
        .atan()
        .to_degrees()
}

/// Geographic bounds of an XYZ tile.
pub fn tile_bbox(coord: &TileCoord) -> BoundingBox {
    let lon_min = tile_to_longitude(coord.x, coord.z);
    let lon_max = tile_to_longitude(coord.x + 1, coord.z);
    let lat_max = tile_to_latitude(coord.y, coord.z);
    let lat_min = tile_to_latitude(coord.y + 1, coord.z);

    BoundingBox::new(lon_min, lat_min, lon_max, lat_max)
}

/// Per-pixel sampling geometry of a tile.
///
/// Pixel (px, py) samples at `left_longitude + px * angular_pixel_width`,
/// `top_latitude - py * angular_pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileInfo {
    pub left_longitude: f64,
    pub top_latitude: f64,
    pub angular_pixel_width: f64,
    pub angular_pixel_height: f64,
}

impl TileInfo {
    pub fn new(coord: &TileCoord) -> Self {
        let bbox = tile_bbox(coord);
        Self {
            left_longitude: bbox.min_x,
            top_latitude: bbox.max_y,
            angular_pixel_width: bbox.width() / TILE_SIZE as f64,
            angular_pixel_height: bbox.height() / TILE_SIZE as f64,
        }
    }

    /// Latitude/longitude sampled by a pixel.
    pub fn pixel_lat_lon(&self, px: u32, py: u32) -> (f64, f64) {
        (
            self.top_latitude - self.angular_pixel_height * py as f64,
            self.left_longitude + self.angular_pixel_width * px as f64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_bbox() {
        let bbox = tile_bbox(&TileCoord::new(0, 0, 0));
        assert!((bbox.min_x - (-180.0)).abs() < 1e-9);
        assert!((bbox.max_x - 180.0).abs() < 1e-9);
        assert!((bbox.max_y - 85.0511).abs() < 0.001);
        assert!((bbox.min_y + 85.0511).abs() < 0.001);
    }

    #[test]
    fn test_tile_validity() {
        assert!(TileCoord::new(2, 3, 3).is_valid());
        assert!(!TileCoord::new(2, 4, 0).is_valid());
        assert!(!TileCoord::new(0, 0, 1).is_valid());
    }

    #[test]
    fn test_tile_info_pixel_origin() {
        let coord = TileCoord::new(1, 1, 0);
        let info = TileInfo::new(&coord);
        let (lat, lon) = info.pixel_lat_lon(0, 0);
        assert!((lon - 0.0).abs() < 1e-9);
        assert!((lat - tile_to_latitude(0, 1)).abs() < 1e-9);
        assert!((info.angular_pixel_width - 180.0 / 256.0).abs() < 1e-12);
    }
}
