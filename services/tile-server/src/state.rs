//! Application state and the composition root.

use crate::config::Config;
use anyhow::{Context, Result};
use chrono::Utc;
use data_sources::{
    Clock, Fetcher, GfsSource, GribSourceConfig, HrrrSource, HttpFetcher, LightningSource,
};
use metrics_exporter_prometheus::PrometheusHandle;
use renderer::Colorer;
use std::sync::Arc;
use storage::{FsTileCache, InflightLocks, MemoryTileCache, TileCache};
use tile_engine::layer::default_layers;
use tile_engine::{Coordinator, Orchestrator, OrchestratorConfig, OrchestratorFactory, WorkerPool};
use tokio::sync::broadcast;
use tracing::info;

/// Shared application state.
pub struct AppState {
    pub pool: Arc<WorkerPool>,
    pub metrics: Option<PrometheusHandle>,
    /// Source of "now" for lightning queries
    pub clock: Clock,
}

impl AppState {
    pub fn new(pool: Arc<WorkerPool>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            pool,
            metrics,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

/// Everything an orchestrator is assembled from. Cloning shares the cache,
/// the in-flight locks and the upstream client.
#[derive(Clone)]
pub struct Components {
    pub config: Config,
    pub fetcher: Arc<dyn Fetcher>,
    pub cache: Arc<dyn TileCache>,
    pub inflight: Arc<InflightLocks>,
    pub colorer: Arc<Colorer>,
}

impl Components {
    pub async fn new(config: &Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.request_timeout())?;
        let cache: Arc<dyn TileCache> = if config.fast_cache {
            info!(capacity = config.fast_cache_capacity, "Using in-memory tile cache");
            Arc::new(MemoryTileCache::new(config.fast_cache_capacity))
        } else {
            let dir = config.tiles_dir();
            info!(dir = %dir.display(), "Using filesystem tile cache");
            Arc::new(
                FsTileCache::open(dir)
                    .await
                    .context("Failed to open tile cache")?,
            )
        };

        Ok(Self {
            config: config.clone(),
            fetcher: Arc::new(fetcher),
            cache,
            inflight: Arc::new(InflightLocks::new()),
            colorer: Arc::new(Colorer::new()),
        })
    }

    /// A fresh orchestrator with its own sources and every default layer.
    pub fn orchestrator(&self) -> Orchestrator {
        let config = &self.config;
        let mut orchestrator = Orchestrator::new(
            self.cache.clone(),
            self.inflight.clone(),
            self.colorer.clone(),
            OrchestratorConfig {
                render_timeout: config.render_timeout(),
                bypass_cache: config.bypass_cache,
            },
        );

        let grib_config = |base_url: &str| GribSourceConfig {
            base_url: base_url.to_string(),
            data_dir: config.data_dir.clone(),
            production: config.production,
        };
        orchestrator.register_source(
            "gfs",
            Arc::new(GfsSource::gfs(
                grib_config(&config.gfs_base_url),
                self.fetcher.clone(),
            )),
        );
        orchestrator.register_source(
            "hrrr",
            Arc::new(HrrrSource::hrrr(
                grib_config(&config.hrrr_base_url),
                self.fetcher.clone(),
            )),
        );
        orchestrator.register_source(
            "lightning",
            Arc::new(LightningSource::new(config.lightning.clone())),
        );

        for layer in default_layers() {
            let name = layer.name().to_string();
            orchestrator.register_layer(&name, layer);
        }
        orchestrator
    }

    pub fn factory(&self) -> OrchestratorFactory {
        let components = self.clone();
        Arc::new(move || components.orchestrator())
    }
}

/// Start the worker pool and build the coordinator that feeds it.
pub async fn build(
    config: &Config,
    shutdown: &broadcast::Sender<()>,
    metrics: Option<PrometheusHandle>,
) -> Result<(Arc<AppState>, Coordinator)> {
    let components = Components::new(config).await?;

    let pool = Arc::new(WorkerPool::start(
        config.workers(),
        components.factory(),
        shutdown,
    ));
    let coordinator = Coordinator::new(
        components.orchestrator(),
        pool.clone(),
        config.poll_interval(),
    );

    Ok((Arc::new(AppState::new(pool, metrics)), coordinator))
}
