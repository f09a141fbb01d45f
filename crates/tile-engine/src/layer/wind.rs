//! 1000 hPa wind: speed shading with an 8x8 grid of direction arrows.

use super::{lookup, shade_tile, Layer, Scale, Shading, Sources, TileOptions};
use renderer::{arrow_geometry, draw_vector, Color, ColorScheme, Colorer, Raster};
use tile_common::{Grid, TileCoord, TileInfo, TileResult, TILE_SIZE};

/// Arrow cell edge in pixels.
const BLOCK: u32 = 32;
/// Pixel stride of the samples averaged per cell.
const SAMPLE_STRIDE: u32 = 4;
/// Pixels per m/s of arrow length.
const PIXELS_PER_MPS: f32 = 1.0;
const MAX_ARROW: f32 = 14.0;
/// Cells slower than this get no arrow, in m/s.
const CALM: f32 = 0.5;

const SHADING: Shading = Shading {
    range: 625.0,
    scheme: ColorScheme::Plasma,
    opacity: None,
};

pub struct WindLayer {
    shading: Shading,
    arrow_color: Color,
}

impl Default for WindLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl WindLayer {
    pub fn new() -> Self {
        Self {
            shading: SHADING,
            arrow_color: Color::rgb(255, 255, 255),
        }
    }

    /// Mean (u, v) over one cell's sample points.
    fn cell_mean(info: &TileInfo, u: &Grid, v: &Grid, bx: u32, by: u32) -> (f32, f32) {
        let (mut su, mut sv, mut n) = (0.0f32, 0.0f32, 0u32);
        for py in (by * BLOCK..(by + 1) * BLOCK).step_by(SAMPLE_STRIDE as usize) {
            for px in (bx * BLOCK..(bx + 1) * BLOCK).step_by(SAMPLE_STRIDE as usize) {
                let (lat, lon) = info.pixel_lat_lon(px, py);
                su += u.bilinear_interpolation(lat, lon);
                sv += v.bilinear_interpolation(lat, lon);
                n += 1;
            }
        }
        (su / n as f32, sv / n as f32)
    }

    fn draw_arrows(&self, raster: &mut Raster, coord: &TileCoord, u: &Grid, v: &Grid) {
        let info = TileInfo::new(coord);
        let cells = TILE_SIZE / BLOCK;
        for by in 0..cells {
            for bx in 0..cells {
                let (mean_u, mean_v) = Self::cell_mean(&info, u, v, bx, by);
                let speed = mean_u.hypot(mean_v);
                if speed < CALM {
                    continue;
                }

                let length = (speed * PIXELS_PER_MPS).min(MAX_ARROW);
                // North is up, so v points against the pixel y axis
                let dx = mean_u / speed * length;
                let dy = -mean_v / speed * length;
                let center = ((bx * BLOCK + BLOCK / 2) as f32, (by * BLOCK + BLOCK / 2) as f32);
                let (head, a, b) = arrow_geometry(center, dx, dy);
                let origin = (center.0 as i32, center.1 as i32);
                draw_vector(raster, origin, head, a, b, self.arrow_color);
            }
        }
    }
}

impl Layer for WindLayer {
    fn name(&self) -> &str {
        "wind"
    }

    fn supported_sources(&self) -> &[&'static str] {
        &["gfs"]
    }

    fn scale(&self, colorer: &Colorer) -> Option<Scale> {
        Some(self.shading.scale(colorer))
    }

    fn generate_tile(
        &self,
        coord: &TileCoord,
        options: &TileOptions,
        sources: &Sources,
        colorer: &Colorer,
    ) -> TileResult<Vec<u8>> {
        let source = lookup(sources, &options.source)?;
        let u = source.get_data("windU", options.forecast_hour)?;
        let v = source.get_data("windV", options.forecast_hour)?;

        let mut raster = shade_tile(coord, colorer, &self.shading, |lat, lon| {
            let (u, v) = (
                u.bilinear_interpolation(lat, lon),
                v.bilinear_interpolation(lat, lon),
            );
            u * u + v * v
        });
        self.draw_arrows(&mut raster, coord, &u, &v);
        Ok(raster.encode_png()?)
    }
}
