//! Weather map tile server.
//!
//! Serves map tiles, source metadata and lightning strikes over HTTP. The
//! download coordinator and the worker pool do the actual work; see
//! `tile_engine::refresh`.

pub mod config;
pub mod handlers;
pub mod state;

pub use config::{Args, Config, LogFormat};
pub use handlers::router;
pub use state::{AppState, Components};
