//! Simulated global lightning feed.
//!
//! Storm epicenters are born, drift and die minute by minute; each one emits
//! strikes scattered around it. The simulation is a pure function of the
//! configured seed and the run hour, so every worker that loads the same run
//! holds identical strikes.

use crate::source::{DataSource, Horizon};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};
use tile_common::{Grid, RunId, TileError, TileResult};
use tracing::{debug, info, instrument};

/// Strikes per hour of the most active storm.
pub const MAX_INTENSITY: f64 = 600.0;

const MINUTE_MS: i64 = 60_000;

/// Probability grid resolution in degrees.
const PROBABILITY_STEP: f64 = 0.5;
const PROBABILITY_ROWS: usize = 361;
const PROBABILITY_COLS: usize = 720;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightningConfig {
    pub seed: u64,
    pub max_storms: usize,
    /// Expected storm births per hour
    pub genesis_rate: f64,
    /// Per-storm death probability per hour
    pub death_rate: f64,
    /// Minutes of strikes kept before the run hour
    pub history_minutes: u32,
    /// Minutes simulated and discarded before the history window
    pub warmup_minutes: u32,
}

impl Default for LightningConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed_1157,
            max_storms: 40,
            genesis_rate: 30.0,
            death_rate: 1.0,
            history_minutes: 60,
            warmup_minutes: 180,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Strike {
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch milliseconds
    pub time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epicenter {
    pub latitude: f64,
    pub longitude: f64,
    /// Maximum drift per minute on each axis, in degrees
    pub speed: f64,
    /// Strikes per hour
    pub intensity: f64,
    /// Strike scatter on each axis, in degrees
    pub spread: f64,
}

fn in_bounds(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

pub struct Simulator {
    config: LightningConfig,
    rng: StdRng,
    epicenters: Vec<Epicenter>,
}

impl Simulator {
    pub fn new(config: LightningConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            epicenters: Vec::new(),
        }
    }

    pub fn epicenters(&self) -> &[Epicenter] {
        &self.epicenters
    }

    fn spawn(&mut self) -> Epicenter {
        let rng = &mut self.rng;
        Epicenter {
            latitude: rng.gen_range(-60.0..=60.0),
            longitude: rng.gen_range(-180.0..180.0),
            speed: rng.gen_range(0.01..0.1),
            intensity: rng.gen_range(30.0..MAX_INTENSITY),
            spread: rng.gen_range(0.1..1.0),
        }
    }

    /// Advance one minute beginning at `minute_start` (epoch ms), appending
    /// the minute's strikes to `out`.
    pub fn step(&mut self, minute_start: i64, out: &mut Vec<Strike>) {
        let death = (self.config.death_rate / 60.0).clamp(0.0, 1.0);
        let genesis = (self.config.genesis_rate / 60.0).clamp(0.0, 1.0);

        let rng = &mut self.rng;
        self.epicenters.retain(|_| !rng.gen_bool(death));

        if self.epicenters.len() < self.config.max_storms && self.rng.gen_bool(genesis) {
            let born = self.spawn();
            self.epicenters.push(born);
        }

        let rng = &mut self.rng;
        let mut survivors = Vec::with_capacity(self.epicenters.len());
        for mut storm in std::mem::take(&mut self.epicenters) {
            storm.latitude += rng.gen_range(-storm.speed..=storm.speed);
            storm.longitude += rng.gen_range(-storm.speed..=storm.speed);
            if !in_bounds(storm.latitude, storm.longitude) {
                continue;
            }

            let expected = storm.intensity / 60.0;
            let mut count = expected.floor() as u32;
            if rng.gen::<f64>() < expected.fract() {
                count += 1;
            }

            let mut alive = true;
            for _ in 0..count {
                let latitude = storm.latitude + rng.gen_range(-storm.spread..=storm.spread);
                let longitude = storm.longitude + rng.gen_range(-storm.spread..=storm.spread);
                if !in_bounds(latitude, longitude) {
                    alive = false;
                    break;
                }
                out.push(Strike {
                    latitude,
                    longitude,
                    time: minute_start + rng.gen_range(0..MINUTE_MS),
                });
            }
            if alive {
                survivors.push(storm);
            }
        }
        self.epicenters = survivors;
    }
}

/// 0.5 degree global grid of strike likelihood around the given storms.
pub fn probability_grid(epicenters: &[Epicenter]) -> TileResult<Grid> {
    let mut values = vec![0f32; PROBABILITY_ROWS * PROBABILITY_COLS];

    for storm in epicenters {
        let sigma = 3.0 * storm.spread;
        let weight = (storm.intensity / MAX_INTENSITY).min(1.0);
        let reach = 4.0 * sigma;

        let row_min = ((90.0 - (storm.latitude + reach)) / PROBABILITY_STEP)
            .floor()
            .max(0.0) as usize;
        let row_max = (((90.0 - (storm.latitude - reach)) / PROBABILITY_STEP).ceil() as usize)
            .min(PROBABILITY_ROWS - 1);
        let span = (reach / PROBABILITY_STEP).ceil() as i64;
        let center = ((storm.longitude + 180.0) / PROBABILITY_STEP).round() as i64;

        for row in row_min..=row_max {
            let dlat = 90.0 - row as f64 * PROBABILITY_STEP - storm.latitude;
            for offset in -span..=span {
                let col = (center + offset).rem_euclid(PROBABILITY_COLS as i64) as usize;
                let lon = -180.0 + col as f64 * PROBABILITY_STEP;
                let mut dlon = (lon - storm.longitude).abs();
                if dlon > 180.0 {
                    dlon = 360.0 - dlon;
                }
                let d2 = dlat * dlat + dlon * dlon;
                values[row * PROBABILITY_COLS + col] +=
                    (weight * (-d2 / (2.0 * sigma * sigma)).exp()) as f32;
            }
        }
    }

    for value in &mut values {
        *value = value.min(1.0);
    }

    Grid::lat_lon(
        90.0,
        -180.0,
        PROBABILITY_STEP,
        PROBABILITY_STEP,
        PROBABILITY_ROWS,
        PROBABILITY_COLS,
        values,
    )
    .map_err(TileError::Internal)
}

/// Replayed output of one run.
#[derive(Debug)]
struct Simulation {
    run: RunId,
    /// Sorted by time
    strikes: Vec<Strike>,
    probability: Arc<Grid>,
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct LightningSource {
    config: LightningConfig,
    clock: Clock,
    pending: Mutex<Option<RunId>>,
    current: RwLock<Option<Arc<Simulation>>>,
}

impl LightningSource {
    pub fn new(config: LightningConfig) -> Self {
        Self::with_clock(config, Arc::new(Utc::now))
    }

    pub fn with_clock(config: LightningConfig, clock: Clock) -> Self {
        Self {
            config,
            clock,
            pending: Mutex::new(None),
            current: RwLock::new(None),
        }
    }

    fn snapshot(&self) -> Option<Arc<Simulation>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Warm up, then replay `[run hour - history, run hour + 60 min)`.
fn simulate_run(config: &LightningConfig, run: RunId) -> TileResult<Simulation> {
    let start = run
        .to_datetime()
        .ok_or_else(|| TileError::Internal(format!("invalid run {}", run)))?
        .timestamp_millis();
    let window_start = start - config.history_minutes as i64 * MINUTE_MS;
    let warmup_start = window_start - config.warmup_minutes as i64 * MINUTE_MS;

    let mut simulator = Simulator::new(config.clone(), config.seed ^ run.hash64());
    let mut discarded = Vec::new();
    for minute in 0..config.warmup_minutes as i64 {
        simulator.step(warmup_start + minute * MINUTE_MS, &mut discarded);
        discarded.clear();
    }

    let mut strikes = Vec::new();
    let mut at_run_hour = None;
    let minutes = config.history_minutes as i64 + 60;
    for minute in 0..minutes {
        let minute_start = window_start + minute * MINUTE_MS;
        if minute_start == start {
            at_run_hour = Some(simulator.epicenters().to_vec());
        }
        simulator.step(minute_start, &mut strikes);
    }
    strikes.sort_by_key(|strike| strike.time);

    let storms = at_run_hour.unwrap_or_else(|| simulator.epicenters().to_vec());
    Ok(Simulation {
        run,
        strikes,
        probability: Arc::new(probability_grid(&storms)?),
    })
}

#[async_trait]
impl DataSource for LightningSource {
    fn name(&self) -> &str {
        "lightning"
    }

    fn horizon(&self) -> Horizon {
        Horizon::new(0, 1)
    }

    async fn available_runs(&self) -> TileResult<Vec<RunId>> {
        Ok(vec![RunId::from_datetime((self.clock)())])
    }

    /// Advances to the current UTC hour.
    async fn download(&self) -> TileResult<bool> {
        let run = RunId::from_datetime((self.clock)());
        let current = self.pending_run().max(self.loaded_run());
        if current.is_some_and(|current| run <= current) {
            return Ok(false);
        }
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(run);
        debug!(run = %run, "Lightning hour advanced");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn load(&self, run: RunId) -> TileResult<bool> {
        let config = self.config.clone();
        let simulation = tokio::task::spawn_blocking(move || simulate_run(&config, run))
            .await
            .map_err(|e| TileError::Internal(format!("Lightning simulation failed: {}", e)))??;
        info!(
            run = %run,
            strikes = simulation.strikes.len(),
            "Simulated lightning"
        );
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(simulation));
        Ok(true)
    }

    fn get_data(&self, variable: &str, forecast_hour: u32) -> TileResult<Arc<Grid>> {
        let simulation = self
            .snapshot()
            .ok_or_else(|| TileError::NotLoaded(self.name().to_string()))?;
        if variable == "probability" && forecast_hour == 0 {
            Ok(simulation.probability.clone())
        } else {
            Err(TileError::DataNotAvailable(format!(
                "lightning has no {} at forecast hour {}",
                variable, forecast_hour
            )))
        }
    }

    fn pending_run(&self) -> Option<RunId> {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn loaded_run(&self) -> Option<RunId> {
        self.snapshot().map(|simulation| simulation.run)
    }

    fn strikes_between(&self, since: i64, to: i64) -> TileResult<Vec<Strike>> {
        if to <= since {
            return Ok(Vec::new());
        }
        let simulation = self
            .snapshot()
            .ok_or_else(|| TileError::NotLoaded(self.name().to_string()))?;
        let strikes = &simulation.strikes;
        let lo = strikes.partition_point(|s| s.time <= since);
        let hi = strikes.partition_point(|s| s.time <= to);
        Ok(strikes[lo..hi].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_strikes() {
        let run = RunId::new(2024, 3, 14, 12);
        let a = simulate_run(&LightningConfig::default(), run).unwrap();
        let b = simulate_run(&LightningConfig::default(), run).unwrap();
        assert_eq!(a.strikes, b.strikes);
        assert!(!a.strikes.is_empty());
    }

    #[test]
    fn test_strikes_sorted_inside_window() {
        let run = RunId::new(2024, 3, 14, 12);
        let config = LightningConfig::default();
        let simulation = simulate_run(&config, run).unwrap();

        let start = run.to_datetime().unwrap().timestamp_millis();
        let from = start - config.history_minutes as i64 * MINUTE_MS;
        let to = start + 60 * MINUTE_MS;
        assert!(simulation
            .strikes
            .windows(2)
            .all(|pair| pair[0].time <= pair[1].time));
        assert!(simulation
            .strikes
            .iter()
            .all(|s| s.time >= from && s.time < to));
    }

    #[test]
    fn test_probability_peaks_at_storm() {
        let storm = Epicenter {
            latitude: 10.0,
            longitude: 20.0,
            speed: 0.05,
            intensity: MAX_INTENSITY,
            spread: 0.5,
        };
        let grid = probability_grid(&[storm]).unwrap();
        assert!((grid.bilinear_interpolation(10.0, 20.0) - 1.0).abs() < 1e-6);
        assert!(grid.bilinear_interpolation(10.0, 21.0) < 1.0);
        assert_eq!(grid.bilinear_interpolation(-40.0, 100.0), 0.0);
    }

    #[test]
    fn test_probability_wraps_dateline() {
        let storm = Epicenter {
            latitude: 0.0,
            longitude: 179.9,
            speed: 0.05,
            intensity: MAX_INTENSITY,
            spread: 1.0,
        };
        let grid = probability_grid(&[storm]).unwrap();
        assert!(grid.bilinear_interpolation(0.0, -179.5) > 0.9);
    }
}
