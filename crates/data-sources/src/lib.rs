//! Upstream data sources for the tile engine.
//!
//! A source owns the decoded grids of its latest loaded run and swaps them
//! wholesale when a newer run finishes loading. GFS and HRRR read GRIB2
//! payloads fetched from NOMADS; lightning is simulated deterministically.

pub mod fetch;
pub mod gfs;
pub mod hrrr;
pub mod lightning;
pub mod listing;
pub mod model;
pub mod source;

pub use fetch::{sync_file, Fetcher, HttpFetcher, Probe};
pub use gfs::{Gfs, GfsSource};
pub use hrrr::{Hrrr, HrrrSource};
pub use lightning::{Clock, Epicenter, LightningConfig, LightningSource, Simulator, Strike};
pub use model::{GribSource, GribSourceConfig, Model, Variable};
pub use source::{DataSource, Horizon, LoadedSet, LoadedState, SourceMeta};
