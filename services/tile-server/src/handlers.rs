//! HTTP handlers. They only translate between HTTP and the worker pool.

use crate::state::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tile_common::{TileCoord, TileError};
use tile_engine::{RawOptions, TileResponse};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

const TILE_CACHE_CONTROL: &str = "public, max-age=3600";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/map", get(map_handler))
        .route("/api/map/:layer/:z/:x/:y/tile.png", get(tile_handler))
        .route("/api/lightning", get(lightning_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

/// JSON error body with the status of `err`.
fn error_response(err: TileError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, status = status.as_u16(), "Request failed");
    } else {
        warn!(error = %err, status = status.as_u16(), "Request rejected");
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

pub async fn map_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.pool.meta().await {
        Ok(meta) => Json(meta).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn tile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((layer, z, x, y)): Path<(String, String, String, String)>,
    Query(options): Query<RawOptions>,
    headers: HeaderMap,
) -> Response {
    let coord = match parse_coord(&z, &x, &y) {
        Ok(coord) => coord,
        Err(e) => return error_response(e),
    };
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let response = state
        .pool
        .get_tile(&layer, coord, options, if_none_match)
        .await;

    match response {
        Ok(TileResponse::Fresh { etag, bytes }) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/png".to_string()),
                (header::ETAG, etag),
                (header::CACHE_CONTROL, TILE_CACHE_CONTROL.to_string()),
            ],
            bytes,
        )
            .into_response(),
        Ok(TileResponse::NotModified { etag }) => (
            StatusCode::NOT_MODIFIED,
            [
                (header::ETAG, etag),
                (header::CACHE_CONTROL, TILE_CACHE_CONTROL.to_string()),
            ],
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Tile path segments as a coordinate; range checks happen downstream.
fn parse_coord(z: &str, x: &str, y: &str) -> Result<TileCoord, TileError> {
    let parse = |name: &str, text: &str| {
        text.parse::<u32>().map_err(|_| {
            TileError::validation(name, format!("'{}' is not a non-negative integer", text))
        })
    };
    Ok(TileCoord::new(parse("z", z)?, parse("x", x)?, parse("y", y)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct LightningQuery {
    /// Epoch milliseconds, exclusive
    pub since: Option<String>,
}

pub async fn lightning_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<LightningQuery>,
) -> Response {
    let to = (state.clock)().timestamp_millis();
    let since = query
        .since
        .as_deref()
        .and_then(|text| text.trim().parse::<i64>().ok())
        .unwrap_or(to);

    match state.pool.lightning_between(since, to).await {
        Ok(strikes) => Json(json!({
            "meta": { "since": since, "to": to },
            "data": strikes,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
