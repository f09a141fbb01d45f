//! RGBA raster a tile is drawn into.

use crate::colorer::{Color, Point};
use crate::{png, RenderError};
use rayon::prelude::*;

/// Row-major RGBA8 buffer, non-premultiplied alpha, origin top-left.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Raster {
    /// Fully transparent raster.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height * 4],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        let p = &self.pixels[i..i + 4];
        Some(Color::new(p[0], p[1], p[2], p[3]))
    }

    /// Overwrite one pixel; out-of-range coordinates are ignored.
    pub fn set(&mut self, x: usize, y: usize, color: Color) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y * self.width + x) * 4;
        self.pixels[i..i + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
    }

    /// Source-over blend of `color` onto one pixel, clipped to the raster.
    pub fn composite(&mut self, x: i32, y: i32, color: Color) {
        if x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        let Some(dst) = self.get(x, y) else {
            return;
        };
        self.set(x, y, blend_over(color, dst));
    }

    /// Fill every row in parallel. The closure gets the row index and that
    /// row's `width * 4` bytes.
    pub fn fill_rows<F>(&mut self, fill: F)
    where
        F: Fn(usize, &mut [u8]) + Sync + Send,
    {
        let row_bytes = self.width * 4;
        if row_bytes == 0 {
            return;
        }
        self.pixels
            .par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(y, row)| fill(y, row));
    }

    /// Bresenham line, composited pixel by pixel.
    pub fn draw_line(&mut self, from: Point, to: Point, color: Color) {
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.composite(x, y, color);
            if x == to.0 && y == to.1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, RenderError> {
        png::encode(&self.pixels, self.width, self.height)
    }
}

/// Write one color into a row slice at column `x`.
pub fn put_pixel(row: &mut [u8], x: usize, color: Color) {
    let i = x * 4;
    if let Some(p) = row.get_mut(i..i + 4) {
        p.copy_from_slice(&[color.r, color.g, color.b, color.a]);
    }
}

fn blend_over(src: Color, dst: Color) -> Color {
    if src.a == 255 || dst.a == 0 {
        return src;
    }
    if src.a == 0 {
        return dst;
    }

    let sa = src.a as f32 / 255.0;
    let da = dst.a as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let channel = |s: u8, d: u8| {
        ((s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a).round() as u8
    };

    Color::new(
        channel(src.r, dst.r),
        channel(src.g, dst.g),
        channel(src.b, dst.b),
        (out_a * 255.0).round() as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Color = Color::rgb(255, 255, 255);

    #[test]
    fn test_new_is_transparent() {
        let raster = Raster::new(4, 3);
        assert_eq!(raster.pixels().len(), 48);
        assert!(raster.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_composite_clips() {
        let mut raster = Raster::new(2, 2);
        raster.composite(-1, 0, WHITE);
        raster.composite(0, 5, WHITE);
        assert!(raster.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_composite_over_translucent() {
        let mut raster = Raster::new(1, 1);
        raster.set(0, 0, Color::new(0, 0, 255, 128));
        raster.composite(0, 0, Color::new(255, 0, 0, 128));
        let c = raster.get(0, 0).unwrap();
        assert!(c.a > 128);
        assert!(c.r > c.b);
    }

    #[test]
    fn test_draw_line_endpoints() {
        let mut raster = Raster::new(10, 10);
        raster.draw_line((1, 1), (8, 4), WHITE);
        assert_eq!(raster.get(1, 1), Some(WHITE));
        assert_eq!(raster.get(8, 4), Some(WHITE));
        assert_eq!(raster.get(0, 9), Some(Color::transparent()));
    }

    #[test]
    fn test_draw_line_diagonal() {
        let mut raster = Raster::new(5, 5);
        raster.draw_line((4, 4), (0, 0), WHITE);
        for i in 0..5 {
            assert_eq!(raster.get(i, i), Some(WHITE));
        }
    }

    #[test]
    fn test_fill_rows() {
        let mut raster = Raster::new(3, 4);
        raster.fill_rows(|y, row| {
            for x in 0..3 {
                put_pixel(row, x, Color::new(x as u8, y as u8, 0, 255));
            }
        });
        assert_eq!(raster.get(2, 3), Some(Color::new(2, 3, 0, 255)));
    }
}
