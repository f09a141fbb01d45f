//! Prometheus instrumentation of the tile pipeline.
//!
//! Recorded through the `metrics` facade; the server installs the exporter.
//! Without an installed recorder every call is a no-op.

use metrics::{counter, histogram};
use std::time::Duration;
use tile_common::{TileError, TileResult};

/// Outcome label of a tile request.
pub fn request_result<T>(result: &TileResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(TileError::Validation { .. }) => "invalid",
        Err(TileError::UnknownLayer(_) | TileError::UnknownSource(_)) => "unknown",
        Err(TileError::NotLoaded(_)) => "not_loaded",
        Err(TileError::Timeout) => "timeout",
        Err(_) => "error",
    }
}

pub fn record_request<T>(layer: &str, result: &TileResult<T>) {
    counter!(
        "tile_requests_total",
        "layer" => layer.to_string(),
        "result" => request_result(result)
    )
    .increment(1);
}

pub fn record_cache_hit() {
    counter!("tile_cache_hits_total").increment(1);
}

pub fn record_cache_miss() {
    counter!("tile_cache_misses_total").increment(1);
}

pub fn record_render(layer: &str, elapsed: Duration) {
    histogram!("tile_render_duration_seconds", "layer" => layer.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_load(source: &str, result: &TileResult<bool>) {
    let label = match result {
        Ok(true) => "loaded",
        Ok(false) => "kept_previous",
        Err(_) => "error",
    };
    counter!(
        "source_loads_total",
        "source" => source.to_string(),
        "result" => label
    )
    .increment(1);
}

pub fn record_worker_restart(worker: usize) {
    counter!("worker_restarts_total", "worker" => worker.to_string()).increment(1);
}
