//! Weather map tile engine.
//!
//! - [`layer`]: how each map layer turns source grids into a tile
//! - [`orchestrator`]: validation, cache lookup and deduplicated rendering
//! - [`refresh`]: the download coordinator and the supervised worker pool
//! - [`metrics`]: Prometheus counters and histograms

pub mod layer;
pub mod metrics;
pub mod orchestrator;
pub mod refresh;

pub use layer::{Layer, LayerMeta, RawOptions, Scale, Sources, TileOptions};
pub use orchestrator::{MapMeta, Orchestrator, OrchestratorConfig, TileResponse};
pub use refresh::{Coordinator, OrchestratorFactory, RefreshMessage, WorkerPool};
