//! In-process sources and layers for orchestrator and worker tests.

#![allow(dead_code)]

use async_trait::async_trait;
use data_sources::{DataSource, Horizon, LoadedSet, LoadedState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage::{InflightLocks, MemoryTileCache, TileCache};
use tile_common::{Grid, RunId, TileCoord, TileResult};
use tile_engine::layer::{cape_layer, WindLayer};
use tile_engine::{Layer, Orchestrator, OrchestratorConfig, Scale, Sources, TileOptions};
use renderer::Colorer;

pub const RUN_A: RunId = RunId {
    year: 2024,
    month: 3,
    day: 14,
    model_cycle: 6,
};

pub const RUN_B: RunId = RunId {
    year: 2024,
    month: 3,
    day: 14,
    model_cycle: 12,
};

/// State shared by every `FakeSource` built from it, standing in for what
/// is published upstream.
#[derive(Clone, Default)]
pub struct FakeUpstream {
    published: Arc<Mutex<Option<RunId>>>,
    panicking_loads: Arc<AtomicUsize>,
    loads: Arc<AtomicUsize>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, run: RunId) {
        *self.published.lock().unwrap() = Some(run);
    }

    /// Make the next `count` loads panic.
    pub fn panic_on_next_loads(&self, count: usize) {
        self.panicking_loads.store(count, Ordering::SeqCst);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

/// Source serving constant grids for forecast hours 0, 3 and 6.
pub struct FakeSource {
    name: String,
    upstream: FakeUpstream,
    state: LoadedState,
    pending: Mutex<Option<RunId>>,
}

impl FakeSource {
    pub fn new(name: &str, upstream: &FakeUpstream) -> Self {
        Self {
            name: name.to_string(),
            upstream: upstream.clone(),
            state: LoadedState::new(),
            pending: Mutex::new(None),
        }
    }
}

/// Constant global 1-degree grid.
pub fn constant_grid(value: f32) -> Grid {
    Grid::lat_lon(90.0, -180.0, 1.0, 1.0, 181, 360, vec![value; 181 * 360]).unwrap()
}

#[async_trait]
impl DataSource for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn horizon(&self) -> Horizon {
        Horizon::new(6, 3)
    }

    async fn available_runs(&self) -> TileResult<Vec<RunId>> {
        Ok(self.upstream.published.lock().unwrap().iter().copied().collect())
    }

    async fn download(&self) -> TileResult<bool> {
        let Some(published) = *self.upstream.published.lock().unwrap() else {
            return Ok(false);
        };
        let mut pending = self.pending.lock().unwrap();
        if pending.is_some_and(|run| run >= published) {
            return Ok(false);
        }
        *pending = Some(published);
        Ok(true)
    }

    async fn load(&self, run: RunId) -> TileResult<bool> {
        self.upstream.loads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.upstream.panicking_loads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.upstream
                .panicking_loads
                .store(remaining - 1, Ordering::SeqCst);
            panic!("corrupt grid for {}", run);
        }

        let mut set = LoadedSet::new(run);
        for fh in self.horizon().hours() {
            set.insert(fh, "cape", constant_grid(1000.0 + fh as f32));
            set.insert(fh, "windU", constant_grid(6.0));
            set.insert(fh, "windV", constant_grid(-8.0));
        }
        self.state.replace(set);
        Ok(true)
    }

    fn get_data(&self, variable: &str, forecast_hour: u32) -> TileResult<Arc<Grid>> {
        self.state.get(&self.name, variable, forecast_hour)
    }

    fn pending_run(&self) -> Option<RunId> {
        *self.pending.lock().unwrap()
    }

    fn loaded_run(&self) -> Option<RunId> {
        self.state.run()
    }
}

/// Layer over the `fake` source that counts renders and emits
/// `cape={value}` instead of a PNG.
pub struct CountingLayer {
    renders: AtomicUsize,
    delay: Duration,
}

impl CountingLayer {
    pub fn new() -> Self {
        Self::with_delay(Duration::from_millis(20))
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            renders: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl Layer for CountingLayer {
    fn name(&self) -> &str {
        "counting"
    }

    fn supported_sources(&self) -> &[&'static str] {
        &["fake"]
    }

    fn scale(&self, _colorer: &Colorer) -> Option<Scale> {
        None
    }

    fn generate_tile(
        &self,
        _coord: &TileCoord,
        options: &TileOptions,
        sources: &Sources,
        _colorer: &Colorer,
    ) -> TileResult<Vec<u8>> {
        let source = sources
            .get(&options.source)
            .ok_or_else(|| tile_common::TileError::UnknownSource(options.source.clone()))?;
        let grid = source.get_data("cape", options.forecast_hour)?;
        std::thread::sleep(self.delay);
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(format!("cape={}", grid.values()[0]).into_bytes())
    }
}

/// Everything one test needs to build orchestrators sharing a cache.
pub struct Harness {
    pub upstream: FakeUpstream,
    pub cache: Arc<MemoryTileCache>,
    pub inflight: Arc<InflightLocks>,
    pub colorer: Arc<Colorer>,
    pub layer: Arc<CountingLayer>,
    pub config: OrchestratorConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_layer(CountingLayer::new())
    }

    pub fn with_layer(layer: CountingLayer) -> Self {
        Self {
            upstream: FakeUpstream::new(),
            cache: Arc::new(MemoryTileCache::new(128)),
            inflight: Arc::new(InflightLocks::new()),
            colorer: Arc::new(Colorer::new()),
            layer: Arc::new(layer),
            config: OrchestratorConfig::default(),
        }
    }

    /// Orchestrator with a `fake` source, the counting layer, and the real
    /// cape and wind layers over a `gfs` source.
    pub fn orchestrator(&self) -> Orchestrator {
        let cache: Arc<dyn TileCache> = self.cache.clone();
        let mut orchestrator = Orchestrator::new(
            cache,
            self.inflight.clone(),
            self.colorer.clone(),
            self.config.clone(),
        );
        orchestrator.register_source("fake", Arc::new(FakeSource::new("fake", &self.upstream)));
        orchestrator.register_source("gfs", Arc::new(FakeSource::new("gfs", &self.upstream)));
        let layer: Arc<dyn Layer> = self.layer.clone();
        orchestrator.register_layer("counting", layer);
        orchestrator.register_layer("cape", Arc::new(cape_layer()));
        orchestrator.register_layer("wind", Arc::new(WindLayer::new()));
        orchestrator
    }
}

pub fn counting_key(run: RunId, fh: u32, coord: TileCoord) -> String {
    format!(
        "counting-fake-{}-{}-{}-{}-{}.png",
        run, fh, coord.x, coord.y, coord.z
    )
}
