//! The `DataSource` trait and the loaded-run state shared by implementations.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tile_common::{Grid, RunId, TileError, TileResult};

/// Forecast hours a source serves: `0..=forecast_hours` in `step` increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Horizon {
    pub forecast_hours: u32,
    pub step: u32,
}

impl Horizon {
    pub const fn new(forecast_hours: u32, step: u32) -> Self {
        Self {
            forecast_hours,
            step,
        }
    }

    pub fn hours(&self) -> impl Iterator<Item = u32> {
        (0..=self.forecast_hours).step_by(self.step.max(1) as usize)
    }

    pub fn contains(&self, hour: i64) -> bool {
        hour >= 0 && hour <= self.forecast_hours as i64 && hour % self.step.max(1) as i64 == 0
    }
}

/// Source description published in `/api/map`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMeta {
    pub forecast_hours: u32,
    pub forecast_hour_step: u32,
    pub latest: Option<RunId>,
}

/// Producer of gridded variables for a range of forecast hours.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    fn horizon(&self) -> Horizon;

    /// Runs published upstream, oldest first.
    async fn available_runs(&self) -> TileResult<Vec<RunId>>;

    /// Fetch the newest publishable run. Returns false when nothing changed.
    async fn download(&self) -> TileResult<bool>;

    /// Decode `run` and swap it in. Returns false when decoding failed after
    /// a retry; the previous run stays served in that case.
    async fn load(&self, run: RunId) -> TileResult<bool>;

    fn get_data(&self, variable: &str, forecast_hour: u32) -> TileResult<Arc<Grid>>;

    /// Run fetched by the last successful `download`.
    fn pending_run(&self) -> Option<RunId>;

    /// Run currently served, if any.
    fn loaded_run(&self) -> Option<RunId>;

    fn meta(&self) -> SourceMeta {
        let horizon = self.horizon();
        SourceMeta {
            forecast_hours: horizon.forecast_hours,
            forecast_hour_step: horizon.step,
            latest: self.loaded_run(),
        }
    }

    fn validate_forecast_hour(&self, hour: i64) -> TileResult<u32> {
        let horizon = self.horizon();
        if !horizon.contains(hour) {
            return Err(TileError::validation(
                "forecastHour",
                format!(
                    "{} is not in 0..={} with step {} for source {}",
                    hour,
                    horizon.forecast_hours,
                    horizon.step,
                    self.name()
                ),
            ));
        }
        Ok(hour as u32)
    }

    /// Strikes with `since < time <= to`, in epoch milliseconds. Only
    /// meaningful for lightning sources.
    fn strikes_between(&self, _since: i64, _to: i64) -> TileResult<Vec<crate::Strike>> {
        Err(TileError::DataNotAvailable(format!(
            "source {} has no lightning feed",
            self.name()
        )))
    }
}

/// One fully decoded run: forecast hour -> variable -> grid.
#[derive(Debug, Clone)]
pub struct LoadedSet {
    pub run: RunId,
    pub hours: HashMap<u32, HashMap<String, Arc<Grid>>>,
}

impl LoadedSet {
    pub fn new(run: RunId) -> Self {
        Self {
            run,
            hours: HashMap::new(),
        }
    }

    pub fn insert(&mut self, forecast_hour: u32, variable: impl Into<String>, grid: Grid) {
        self.hours
            .entry(forecast_hour)
            .or_default()
            .insert(variable.into(), Arc::new(grid));
    }
}

/// Current loaded set of a source. Readers clone the `Arc` and never block a
/// load for longer than the pointer swap.
#[derive(Debug, Default)]
pub struct LoadedState {
    current: RwLock<Option<Arc<LoadedSet>>>,
}

impl LoadedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<Arc<LoadedSet>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn replace(&self, set: LoadedSet) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(set));
    }

    pub fn run(&self) -> Option<RunId> {
        self.snapshot().map(|set| set.run)
    }

    /// Look up a grid, distinguishing "nothing loaded" from "no such field".
    pub fn get(&self, source: &str, variable: &str, forecast_hour: u32) -> TileResult<Arc<Grid>> {
        let set = self
            .snapshot()
            .ok_or_else(|| TileError::NotLoaded(source.to_string()))?;
        set.hours
            .get(&forecast_hour)
            .and_then(|vars| vars.get(variable))
            .cloned()
            .ok_or_else(|| {
                TileError::DataNotAvailable(format!(
                    "{} has no {} at forecast hour {}",
                    source, variable, forecast_hour
                ))
            })
    }
}
