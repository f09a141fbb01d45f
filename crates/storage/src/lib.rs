//! Tile cache storage for rendered tiles.
//!
//! Provides one cache abstraction with two backends:
//! - Filesystem, where existence of `{dir}/{key}` is the cache signal
//! - In-memory LRU for single-process fast-cache mode
//!
//! plus per-key in-flight locks so a missing tile is rendered once.

pub mod inflight;
pub mod memory_cache;
pub mod tile_cache;

pub use inflight::{InflightGuard, InflightLocks};
pub use memory_cache::{MemoryTileCache, MemoryTileCacheStats};
pub use tile_cache::{FsTileCache, TileCache};
