//! Tile rasterization for weather layers.
//!
//! - [`colorer`]: discretized color ramps and the wind-arrow primitive
//! - [`raster`]: RGBA tile buffer with parallel row fill
//! - [`png`]: PNG encoding (indexed when the tile fits a palette)

pub mod colorer;
pub mod png;
pub mod raster;

pub use colorer::{arrow_geometry, draw_vector, Color, ColorScheme, Colorer, SHADES};
pub use raster::Raster;

use thiserror::Error;
use tile_common::TileError;

/// Errors raised while turning a raster into image bytes.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Raster is {actual} bytes, expected {expected} for {width}x{height}")]
    BufferSize {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("PNG compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

impl From<RenderError> for TileError {
    fn from(err: RenderError) -> Self {
        TileError::Render(err.to_string())
    }
}
