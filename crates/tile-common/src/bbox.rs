//! Geographic bounding boxes.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees (x = longitude, y = latitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// A box with zero or negative extent on either axis.
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Whether (lon, lat) lies inside, edges included.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Whether `other` nests inside this box within `epsilon` degrees.
    pub fn contains_bbox(&self, other: &BoundingBox, epsilon: f64) -> bool {
        other.min_x >= self.min_x - epsilon
            && other.max_x <= self.max_x + epsilon
            && other.min_y >= self.min_y - epsilon
            && other.max_y <= self.max_y + epsilon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        let outer = BoundingBox::new(-180.0, -85.0, 0.0, 0.0);
        assert!(outer.contains_point(-90.0, -40.0));
        assert!(outer.contains_point(0.0, 0.0));
        assert!(!outer.contains_point(10.0, -40.0));
        assert!(outer.contains_bbox(&BoundingBox::new(-90.0, -40.0, 0.0, 1e-12), 1e-9));
        assert!(!outer.contains_bbox(&BoundingBox::new(-90.0, -40.0, 1.0, 0.0), 1e-9));
    }

    #[test]
    fn test_degenerate() {
        assert!(BoundingBox::new(1.0, 1.0, 1.0, 2.0).is_degenerate());
        assert!(!BoundingBox::new(0.0, 0.0, 0.5, 0.5).is_degenerate());
    }
}
