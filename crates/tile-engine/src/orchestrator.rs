//! Tile orchestration: options, cache keys, deduplicated rendering and
//! source refresh.

use crate::layer::{Layer, LayerMeta, RawOptions, Sources, TileOptions};
use crate::metrics;
use bytes::Bytes;
use data_sources::{DataSource, SourceMeta, Strike};
use futures::future::join_all;
use renderer::Colorer;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{InflightLocks, TileCache};
use tile_common::{RunId, TileCoord, TileError, TileResult};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub render_timeout: Duration,
    /// Skip cache reads and writes; every request renders
    pub bypass_cache: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            render_timeout: Duration::from_secs(30),
            bypass_cache: false,
        }
    }
}

/// `/api/map` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMeta {
    pub sources: BTreeMap<String, SourceMeta>,
    pub layers: BTreeMap<String, LayerMeta>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TileResponse {
    Fresh { etag: String, bytes: Bytes },
    NotModified { etag: String },
}

impl TileResponse {
    pub fn etag(&self) -> &str {
        match self {
            TileResponse::Fresh { etag, .. } | TileResponse::NotModified { etag } => etag,
        }
    }
}

/// Whether an `If-None-Match` header value matches `etag`.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

pub struct Orchestrator {
    sources: Arc<Sources>,
    layers: BTreeMap<String, Arc<dyn Layer>>,
    cache: Arc<dyn TileCache>,
    inflight: Arc<InflightLocks>,
    colorer: Arc<Colorer>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// `inflight` should be shared by every orchestrator writing to `cache`.
    pub fn new(
        cache: Arc<dyn TileCache>,
        inflight: Arc<InflightLocks>,
        colorer: Arc<Colorer>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            sources: Arc::new(Sources::new()),
            layers: BTreeMap::new(),
            cache,
            inflight,
            colorer,
            config,
        }
    }

    pub fn register_source(&mut self, name: &str, source: Arc<dyn DataSource>) {
        Arc::make_mut(&mut self.sources).insert(name.to_string(), source);
    }

    pub fn register_layer(&mut self, name: &str, layer: Arc<dyn Layer>) {
        self.layers.insert(name.to_string(), layer);
    }

    pub fn source(&self, name: &str) -> TileResult<&Arc<dyn DataSource>> {
        self.sources
            .get(name)
            .ok_or_else(|| TileError::UnknownSource(name.to_string()))
    }

    pub fn layer(&self, name: &str) -> TileResult<&Arc<dyn Layer>> {
        self.layers
            .get(name)
            .ok_or_else(|| TileError::UnknownLayer(name.to_string()))
    }

    pub fn meta(&self) -> MapMeta {
        MapMeta {
            sources: self
                .sources
                .iter()
                .map(|(name, source)| (name.clone(), source.meta()))
                .collect(),
            layers: self
                .layers
                .iter()
                .map(|(name, layer)| (name.clone(), layer.meta(&self.colorer)))
                .collect(),
        }
    }

    /// Serve one tile, rendering it at most once per key across concurrent
    /// callers sharing the in-flight locks.
    #[instrument(skip(self, raw, if_none_match), fields(z = coord.z, x = coord.x, y = coord.y))]
    pub async fn get_tile(
        &self,
        layer: &str,
        coord: TileCoord,
        raw: &RawOptions,
        if_none_match: Option<&str>,
    ) -> TileResult<TileResponse> {
        let result = self.serve_tile(layer, coord, raw, if_none_match).await;
        metrics::record_request(layer, &result);
        result
    }

    async fn serve_tile(
        &self,
        layer_name: &str,
        coord: TileCoord,
        raw: &RawOptions,
        if_none_match: Option<&str>,
    ) -> TileResult<TileResponse> {
        let layer = self.layer(layer_name)?.clone();
        if !coord.is_valid() {
            return Err(TileError::validation(
                "tile",
                format!("{}/{}/{} is outside the tile matrix", coord.z, coord.x, coord.y),
            ));
        }
        let options = layer.get_options(raw, &self.sources)?;
        let key = layer.get_path(&coord, &options, &self.sources)?;
        let etag = format!("\"{}\"", key);

        if self.config.bypass_cache {
            let bytes = self.render(layer, coord, options).await?;
            return Ok(TileResponse::Fresh { etag, bytes });
        }

        if if_none_match.is_some_and(|value| etag_matches(value, &etag)) {
            return Ok(TileResponse::NotModified { etag });
        }

        if let Some(bytes) = self.cache.read(&key).await? {
            metrics::record_cache_hit();
            return Ok(TileResponse::Fresh { etag, bytes });
        }
        metrics::record_cache_miss();

        let _guard = self.inflight.acquire(&key).await;
        // Another request may have rendered it while we waited
        if let Some(bytes) = self.cache.read(&key).await? {
            return Ok(TileResponse::Fresh { etag, bytes });
        }

        let bytes = self.render(layer, coord, options).await?;
        if let Err(e) = self.cache.write(&key, bytes.clone()).await {
            warn!(key = %key, error = %e, "Failed to cache tile");
        }
        Ok(TileResponse::Fresh { etag, bytes })
    }

    async fn render(
        &self,
        layer: Arc<dyn Layer>,
        coord: TileCoord,
        options: TileOptions,
    ) -> TileResult<Bytes> {
        let started = Instant::now();
        let name = layer.name().to_string();
        let sources = self.sources.clone();
        let colorer = self.colorer.clone();

        let task = tokio::task::spawn_blocking(move || {
            layer.generate_tile(&coord, &options, &sources, &colorer)
        });
        let png = match tokio::time::timeout(self.config.render_timeout, task).await {
            Err(_) => return Err(TileError::Timeout),
            Ok(Err(e)) => return Err(TileError::Internal(format!("Render task failed: {}", e))),
            Ok(Ok(result)) => result?,
        };

        metrics::record_render(&name, started.elapsed());
        debug!(layer = %name, bytes = png.len(), "Rendered tile");
        Ok(Bytes::from(png))
    }

    /// Run `download()` on every source concurrently and report each new run.
    pub async fn download_all<F>(&self, mut on_new_run: F)
    where
        F: FnMut(&str, RunId),
    {
        let downloads = self.sources.iter().map(|(name, source)| async move {
            (name, source.download().await, source.pending_run())
        });

        for (name, result, pending) in join_all(downloads).await {
            match (result, pending) {
                (Ok(true), Some(run)) => {
                    info!(source = %name, run = %run, "New run downloaded");
                    on_new_run(name, run);
                }
                (Ok(_), _) => debug!(source = %name, "No new run"),
                (Err(e), _) => warn!(source = %name, error = %e, "Download failed"),
            }
        }
    }

    /// Load `run` into a source and drop that source's cached tiles from
    /// older runs. Tiles of `run` itself may already come from a worker that
    /// loaded first, so they stay.
    #[instrument(skip(self))]
    pub async fn load(&self, source: &str, run: RunId) -> TileResult<bool> {
        let data_source = self.source(source)?.clone();
        let result = data_source.load(run).await;
        metrics::record_load(source, &result);
        if !result? {
            return Ok(false);
        }

        for layer in self.layers.values() {
            if layer.supported_sources().iter().any(|s| *s == source) {
                let prefix = format!("{}-{}-", layer.name(), source);
                let current = format!("{}{}-", prefix, run);
                self.cache
                    .invalidate_except(&prefix, Some(&current))
                    .await?;
            }
        }
        Ok(true)
    }

    pub fn lightning_between(&self, since: i64, to: i64) -> TileResult<Vec<Strike>> {
        self.source("lightning")?.strikes_between(since, to)
    }
}
