//! HTTP routes against a worker pool with local sources.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use data_sources::{Clock, GfsSource, GribSourceConfig, HttpFetcher, LightningConfig, LightningSource};
use renderer::Colorer;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use storage::{InflightLocks, MemoryTileCache, TileCache};
use tile_common::RunId;
use tile_engine::layer::default_layers;
use tile_engine::{Orchestrator, OrchestratorConfig, RefreshMessage, WorkerPool};
use tile_server::{router, AppState};
use tokio::sync::broadcast;
use tower::ServiceExt;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, 12, 30, 0).unwrap()
}

fn clock() -> Clock {
    Arc::new(now)
}

struct TestServer {
    app: Router,
    pool: Arc<WorkerPool>,
    _shutdown: broadcast::Sender<()>,
    _data: tempfile::TempDir,
}

/// Two workers serving an unloaded GFS source and the simulated lightning
/// feed frozen at 12:30 UTC.
fn server() -> TestServer {
    let data = tempfile::tempdir().unwrap();
    let data_dir = data.path().to_path_buf();
    let cache: Arc<dyn TileCache> = Arc::new(MemoryTileCache::new(64));
    let inflight = Arc::new(InflightLocks::new());
    let colorer = Arc::new(Colorer::new());
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(5)).unwrap());

    let factory = Arc::new(move || {
        let mut orchestrator = Orchestrator::new(
            cache.clone(),
            inflight.clone(),
            colorer.clone(),
            OrchestratorConfig::default(),
        );
        let gfs = GfsSource::gfs(
            GribSourceConfig {
                base_url: "http://127.0.0.1:9/gfs/prod/".to_string(),
                data_dir: data_dir.clone(),
                production: false,
            },
            fetcher.clone(),
        );
        orchestrator.register_source("gfs", Arc::new(gfs));
        orchestrator.register_source(
            "lightning",
            Arc::new(LightningSource::with_clock(LightningConfig::default(), clock())),
        );
        for layer in default_layers() {
            let name = layer.name().to_string();
            orchestrator.register_layer(&name, layer);
        }
        orchestrator
    });

    let (shutdown, _) = broadcast::channel(1);
    let pool = Arc::new(WorkerPool::start(2, factory, &shutdown));
    let state = AppState::new(pool.clone(), None).with_clock(clock());

    TestServer {
        app: router(Arc::new(state)),
        pool,
        _shutdown: shutdown,
        _data: data,
    }
}

async fn load_lightning(server: &TestServer) {
    let run = RunId::from_datetime(now());
    server.pool.broadcast(RefreshMessage::Loaded {
        source: "lightning".to_string(),
        run,
    });
    let mut confirmed = 0;
    for _ in 0..1000 {
        let meta = server.pool.meta().await.unwrap();
        if meta.sources["lightning"].latest == Some(run) {
            confirmed += 1;
            if confirmed >= 4 {
                return;
            }
            continue;
        }
        confirmed = 0;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("lightning never loaded");
}

async fn get(app: &Router, uri: &str, if_none_match: Option<&str>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let mut request = Request::builder().uri(uri);
    if let Some(etag) = if_none_match {
        request = request.header(header::IF_NONE_MATCH, etag);
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

// ============================================================================
// Metadata and health
// ============================================================================

#[tokio::test]
async fn test_health_and_metrics() {
    let server = server();

    let (status, _, body) = get(&server.app, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok".to_vec());

    let (status, _, _) = get(&server.app, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_map_lists_sources_and_layers() {
    let server = server();

    let (status, _, body) = get(&server.app, "/api/map", None).await;
    assert_eq!(status, StatusCode::OK);
    let meta = json(&body);

    assert_eq!(meta["sources"]["gfs"]["forecastHours"], 6);
    assert_eq!(meta["sources"]["gfs"]["forecastHourStep"], 3);
    assert!(meta["sources"]["gfs"]["latest"].is_null());
    assert_eq!(meta["sources"]["lightning"]["forecastHours"], 0);

    for layer in ["cape", "wind", "temperature", "vorticity", "lightningProbability"] {
        assert!(meta["layers"][layer].is_object(), "missing layer {}", layer);
    }
    assert_eq!(
        meta["layers"]["cape"]["supportedSources"],
        serde_json::json!(["gfs", "hrrr"])
    );
}

// ============================================================================
// Tiles
// ============================================================================

#[tokio::test]
async fn test_tile_errors_map_to_status_codes() {
    let server = server();

    let (status, _, body) = get(&server.app, "/api/map/cape/2/1/1/tile.png", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json(&body)["error"].as_str().unwrap().contains("gfs"));

    let (status, _, _) = get(&server.app, "/api/map/snowfall/2/1/1/tile.png", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = get(
        &server.app,
        "/api/map/cape/2/1/1/tile.png?forecastHour=5",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].as_str().unwrap().contains("forecastHour"));

    let (status, _, _) = get(&server.app, "/api/map/cape/2/9/1/tile.png", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = get(&server.app, "/api/map/cape/two/1/1/tile.png", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].as_str().unwrap().contains("two"));

    let (status, _, body) = get(&server.app, "/api/map/cape/2/1/-1/tile.png", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].is_string());
}

#[tokio::test]
async fn test_tile_is_png_with_validators() {
    let server = server();
    load_lightning(&server).await;

    let uri = "/api/map/lightningProbability/3/2/2/tile.png";
    let (status, headers, body) = get(&server.app, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
    assert_eq!(&body[..8], b"\x89PNG\r\n\x1a\n");

    let etag = headers[header::ETAG].to_str().unwrap().to_string();
    assert_eq!(etag, "\"lightningProbability-lightning-2024-3-14-12-0-2-2-3.png\"");

    let (status, headers, body) = get(&server.app, uri, Some(&etag)).await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert_eq!(headers[header::ETAG], etag.as_str());
    assert!(body.is_empty());
}

// ============================================================================
// Lightning
// ============================================================================

#[tokio::test]
async fn test_lightning_window() {
    let server = server();
    load_lightning(&server).await;

    let to = now().timestamp_millis();
    let since = to - 30 * 60_000;
    let (status, _, body) = get(&server.app, &format!("/api/lightning?since={}", since), None).await;
    assert_eq!(status, StatusCode::OK);

    let response = json(&body);
    assert_eq!(response["meta"]["since"], since);
    assert_eq!(response["meta"]["to"], to);
    for strike in response["data"].as_array().unwrap() {
        let time = strike["time"].as_i64().unwrap();
        assert!(time > since && time <= to, "strike at {} outside window", time);
        assert!(strike["latitude"].as_f64().unwrap().abs() <= 90.0);
        assert!(strike["longitude"].as_f64().unwrap().abs() <= 180.0);
    }
}

#[tokio::test]
async fn test_lightning_without_since_is_empty() {
    let server = server();
    load_lightning(&server).await;

    for uri in ["/api/lightning", "/api/lightning?since=yesterday"] {
        let (status, _, body) = get(&server.app, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let response = json(&body);
        assert_eq!(response["meta"]["since"], response["meta"]["to"]);
        assert!(response["data"].as_array().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_lightning_before_load_is_unavailable() {
    let server = server();

    let (status, _, _) = get(&server.app, "/api/lightning?since=0", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
