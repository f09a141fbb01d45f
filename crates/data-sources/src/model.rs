//! GRIB2-backed sources: shared download and load logic, parameterized by the
//! model's listing format, URLs and variables.

use crate::fetch::{sync_file, Fetcher, Probe};
use crate::source::{DataSource, Horizon, LoadedSet, LoadedState};
use async_trait::async_trait;
use bytes::Bytes;
use grib2_parser::Selector;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tile_common::{Grid, RunId, TileError, TileResult};
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

/// A named field extracted from every payload of a model.
#[derive(Debug, Clone, Copy)]
pub struct Variable {
    pub name: &'static str,
    pub selector: Selector,
}

/// What distinguishes one upstream model from another.
#[async_trait]
pub trait Model: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn horizon(&self, production: bool) -> Horizon;

    fn variables(&self) -> &'static [Variable];

    fn payload_url(&self, base_url: &str, run: RunId, forecast_hour: u32) -> String;

    /// Runs listed upstream, oldest first.
    async fn list_runs(&self, fetcher: &dyn Fetcher, base_url: &str) -> TileResult<Vec<RunId>>;
}

#[derive(Debug, Clone)]
pub struct GribSourceConfig {
    /// Directory URL ending in `/`
    pub base_url: String,
    /// Payloads land in `{data_dir}/grib/`
    pub data_dir: PathBuf,
    /// Serve the full forecast horizon
    pub production: bool,
}

pub struct GribSource<M: Model> {
    model: M,
    config: GribSourceConfig,
    fetcher: Arc<dyn Fetcher>,
    state: LoadedState,
    pending: Mutex<Option<RunId>>,
}

type DecodedHour = Vec<(&'static str, Grid)>;

impl<M: Model> GribSource<M> {
    pub fn new(model: M, config: GribSourceConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            model,
            config,
            fetcher,
            state: LoadedState::new(),
            pending: Mutex::new(None),
        }
    }

    /// `{data_dir}/grib/{source}-{year}-{month}-{day}-{cycle}-{fh}.grib2`
    pub fn payload_path(&self, run: RunId, forecast_hour: u32) -> PathBuf {
        self.config.data_dir.join("grib").join(format!(
            "{}-{}-{}.grib2",
            self.model.name(),
            run,
            forecast_hour
        ))
    }

    pub fn payload_url(&self, run: RunId, forecast_hour: u32) -> String {
        self.model
            .payload_url(&self.config.base_url, run, forecast_hour)
    }

    /// Newest run either downloaded or loaded.
    fn current_run(&self) -> Option<RunId> {
        self.pending_run().max(self.state.run())
    }

    async fn decode_hour(&self, run: RunId, forecast_hour: u32) -> TileResult<DecodedHour> {
        let path = self.payload_path(run, forecast_hour);
        let data = fs::read(&path)
            .await
            .map_err(|e| TileError::Decode(format!("{}: {}", path.display(), e)))?;
        let bytes = Bytes::from(data);
        let variables = self.model.variables();

        tokio::task::spawn_blocking(move || {
            variables
                .iter()
                .map(|var| Ok((var.name, grib2_parser::decode(bytes.clone(), &var.selector)?)))
                .collect::<TileResult<DecodedHour>>()
        })
        .await
        .map_err(|e| TileError::Internal(format!("Decode task failed: {}", e)))?
    }

    /// Decode one hour, re-downloading it once if the local payload is bad.
    /// `None` means the retry failed too.
    async fn decode_with_retry(
        &self,
        run: RunId,
        forecast_hour: u32,
    ) -> TileResult<Option<DecodedHour>> {
        let first = match self.decode_hour(run, forecast_hour).await {
            Ok(grids) => return Ok(Some(grids)),
            Err(e) if e.is_retryable_decode() => e,
            Err(e) => return Err(e),
        };

        warn!(
            source = self.model.name(),
            run = %run,
            forecast_hour = forecast_hour,
            error = %first,
            "Decode failed, forcing re-download"
        );
        let url = self.payload_url(run, forecast_hour);
        let path = self.payload_path(run, forecast_hour);
        if let Err(e) = sync_file(self.fetcher.as_ref(), &url, &path, true).await {
            error!(url = %url, error = %e, "Re-download failed");
            return Ok(None);
        }

        match self.decode_hour(run, forecast_hour).await {
            Ok(grids) => Ok(Some(grids)),
            Err(e) => {
                error!(
                    source = self.model.name(),
                    run = %run,
                    forecast_hour = forecast_hour,
                    error = %e,
                    "Decode failed after re-download"
                );
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl<M: Model> DataSource for GribSource<M> {
    fn name(&self) -> &str {
        self.model.name()
    }

    fn horizon(&self) -> Horizon {
        self.model.horizon(self.config.production)
    }

    async fn available_runs(&self) -> TileResult<Vec<RunId>> {
        self.model
            .list_runs(self.fetcher.as_ref(), &self.config.base_url)
            .await
    }

    /// Probe the latest listed run, falling back one run when its first
    /// payload is not yet published. Runs no newer than the current one are
    /// never probed.
    #[instrument(skip(self), fields(source = self.model.name()))]
    async fn download(&self) -> TileResult<bool> {
        let runs = self.available_runs().await?;
        let current = self.current_run();
        let candidates: Vec<RunId> = runs
            .iter()
            .rev()
            .take(2)
            .copied()
            .filter(|run| current.map_or(true, |current| *run > current))
            .collect();

        let mut chosen = None;
        for run in candidates {
            match self.fetcher.probe(&self.payload_url(run, 0)).await? {
                Probe::Present { .. } => {
                    chosen = Some(run);
                    break;
                }
                Probe::Missing => debug!(run = %run, "Run not yet published"),
            }
        }

        let run = match (chosen, current) {
            (Some(run), _) => run,
            (None, Some(current)) => {
                debug!(current = %current, "No new run");
                return Ok(false);
            }
            (None, None) => {
                return Err(TileError::DataNotAvailable(format!(
                    "no published {} run",
                    self.model.name()
                )))
            }
        };

        let mut fetched = 0;
        for forecast_hour in self.horizon().hours() {
            let url = self.payload_url(run, forecast_hour);
            let path = self.payload_path(run, forecast_hour);
            if sync_file(self.fetcher.as_ref(), &url, &path, false).await? {
                fetched += 1;
            }
        }

        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(run);
        info!(run = %run, fetched = fetched, "Downloaded run");
        Ok(true)
    }

    #[instrument(skip(self), fields(source = self.model.name()))]
    async fn load(&self, run: RunId) -> TileResult<bool> {
        let mut set = LoadedSet::new(run);
        for forecast_hour in self.horizon().hours() {
            let Some(grids) = self.decode_with_retry(run, forecast_hour).await? else {
                warn!(run = %run, "Keeping previous run");
                return Ok(false);
            };
            for (name, grid) in grids {
                set.insert(forecast_hour, name, grid);
            }
        }

        self.state.replace(set);
        info!(run = %run, "Loaded run");
        Ok(true)
    }

    fn get_data(&self, variable: &str, forecast_hour: u32) -> TileResult<Arc<Grid>> {
        self.state.get(self.model.name(), variable, forecast_hour)
    }

    fn pending_run(&self) -> Option<RunId> {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn loaded_run(&self) -> Option<RunId> {
        self.state.run()
    }
}
