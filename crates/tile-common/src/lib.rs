//! Common types and utilities shared across the weather tile workspace.

pub mod bbox;
pub mod error;
pub mod grid;
pub mod projection;
pub mod run;
pub mod tile;

pub use bbox::BoundingBox;
pub use error::{TileError, TileResult};
pub use grid::{Grid, GridGeometry};
pub use projection::LambertConformal;
pub use run::RunId;
pub use tile::{tile_bbox, TileCoord, TileInfo, TILE_SIZE};
