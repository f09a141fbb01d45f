//! Server configuration.
//!
//! Built-in defaults, overlaid by an optional YAML file, overlaid by command
//! line flags and their environment variables.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use data_sources::gfs::GFS_BASE_URL;
use data_sources::hrrr::HRRR_BASE_URL;
use data_sources::LightningConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Parser, Debug, Default)]
#[command(name = "tile-server")]
#[command(about = "Weather map tile server")]
pub struct Args {
    /// YAML file overlaying the built-in defaults
    #[arg(long, env = "TILE_SERVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address
    #[arg(long, env = "LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// Directory holding `grib/` payloads and `tiles/`
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Full forecast horizons and one worker per core
    #[arg(long, env = "PRODUCTION")]
    pub production: Option<bool>,

    /// Worker count (default: cores in production, 1 otherwise)
    #[arg(long, env = "WORKERS")]
    pub workers: Option<usize>,

    #[arg(long, env = "POLL_INTERVAL_SECS")]
    pub poll_interval_secs: Option<u64>,

    /// Upstream request timeout
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    #[arg(long, env = "RENDER_TIMEOUT_SECS")]
    pub render_timeout_secs: Option<u64>,

    /// Keep tiles in memory instead of on disk
    #[arg(long, env = "FAST_CACHE")]
    pub fast_cache: Option<bool>,

    #[arg(long, env = "FAST_CACHE_CAPACITY")]
    pub fast_cache_capacity: Option<usize>,

    /// Render every request
    #[arg(long, env = "BYPASS_CACHE")]
    pub bypass_cache: Option<bool>,

    #[arg(long, env = "GFS_BASE_URL")]
    pub gfs_base_url: Option<String>,

    #[arg(long, env = "HRRR_BASE_URL")]
    pub hrrr_base_url: Option<String>,

    #[arg(long, env = "LIGHTNING_SEED")]
    pub lightning_seed: Option<u64>,

    #[arg(long, env = "LIGHTNING_MAX_STORMS")]
    pub lightning_max_storms: Option<usize>,

    #[arg(long, env = "LIGHTNING_GENESIS_RATE")]
    pub lightning_genesis_rate: Option<f64>,

    #[arg(long, env = "LIGHTNING_DEATH_RATE")]
    pub lightning_death_rate: Option<f64>,

    #[arg(long, env = "LIGHTNING_HISTORY_MINUTES")]
    pub lightning_history_minutes: Option<u32>,

    /// Default filter when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "json")]
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub data_dir: PathBuf,
    pub production: bool,
    pub workers: Option<usize>,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub render_timeout_secs: u64,
    pub fast_cache: bool,
    pub fast_cache_capacity: usize,
    pub bypass_cache: bool,
    pub gfs_base_url: String,
    pub hrrr_base_url: String,
    pub lightning: LightningConfig,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            data_dir: PathBuf::from("data"),
            production: false,
            workers: None,
            poll_interval_secs: 3600,
            request_timeout_secs: 300,
            render_timeout_secs: 30,
            fast_cache: false,
            fast_cache_capacity: 10_000,
            bypass_cache: false,
            gfs_base_url: GFS_BASE_URL.to_string(),
            hrrr_base_url: HRRR_BASE_URL.to_string(),
            lightning: LightningConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

macro_rules! overlay {
    ($target:expr, $value:expr) => {
        if let Some(value) = $value {
            $target = value;
        }
    };
}

impl Config {
    /// Resolve the configuration for `args`, reading the YAML file if given.
    pub fn load(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(args);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    fn apply(&mut self, args: &Args) {
        overlay!(self.listen_addr, args.listen_addr.clone());
        overlay!(self.data_dir, args.data_dir.clone());
        overlay!(self.production, args.production);
        if args.workers.is_some() {
            self.workers = args.workers;
        }
        overlay!(self.poll_interval_secs, args.poll_interval_secs);
        overlay!(self.request_timeout_secs, args.request_timeout_secs);
        overlay!(self.render_timeout_secs, args.render_timeout_secs);
        overlay!(self.fast_cache, args.fast_cache);
        overlay!(self.fast_cache_capacity, args.fast_cache_capacity);
        overlay!(self.bypass_cache, args.bypass_cache);
        overlay!(self.gfs_base_url, args.gfs_base_url.clone());
        overlay!(self.hrrr_base_url, args.hrrr_base_url.clone());
        overlay!(self.lightning.seed, args.lightning_seed);
        overlay!(self.lightning.max_storms, args.lightning_max_storms);
        overlay!(self.lightning.genesis_rate, args.lightning_genesis_rate);
        overlay!(self.lightning.death_rate, args.lightning_death_rate);
        overlay!(self.lightning.history_minutes, args.lightning_history_minutes);
        overlay!(self.log_level, args.log_level.clone());
    }

    pub fn workers(&self) -> usize {
        match self.workers {
            Some(n) => n.max(1),
            None if self.production => num_cpus::get(),
            None => 1,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn tiles_dir(&self) -> PathBuf {
        self.data_dir.join("tiles")
    }

    pub fn grib_dir(&self) -> PathBuf {
        self.data_dir.join("grib")
    }

    /// Create `tiles/` and `grib/` under the data directory.
    pub fn prepare_dirs(&self) -> Result<()> {
        for dir in [self.tiles_dir(), self.grib_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_development() {
        let config = Config::load(&Args::default()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.workers(), 1);
        assert_eq!(config.poll_interval(), Duration::from_secs(3600));
        assert!(config.gfs_base_url.ends_with("/gfs/prod/"));
    }

    #[test]
    fn test_yaml_overlays_defaults() {
        let config = Config::from_yaml(
            "production: true\nworkers: 3\nfast_cache: true\nlightning:\n  max_storms: 5\n",
        )
        .unwrap();
        assert!(config.production);
        assert_eq!(config.workers(), 3);
        assert!(config.fast_cache);
        assert_eq!(config.lightning.max_storms, 5);
        // Untouched fields keep their defaults
        assert_eq!(config.lightning.history_minutes, 60);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_flags_override_yaml() {
        let mut config = Config::from_yaml("workers: 3\nbypass_cache: true\n").unwrap();
        let args = Args::parse_from([
            "tile-server",
            "--workers",
            "8",
            "--data-dir",
            "/srv/tiles",
            "--lightning-seed",
            "7",
        ]);
        config.apply(&args);

        assert_eq!(config.workers(), 8);
        assert!(config.bypass_cache);
        assert_eq!(config.data_dir, PathBuf::from("/srv/tiles"));
        assert_eq!(config.grib_dir(), PathBuf::from("/srv/tiles/grib"));
        assert_eq!(config.lightning.seed, 7);
    }

    #[test]
    fn test_unknown_yaml_types_are_rejected() {
        assert!(Config::from_yaml("workers: many\n").is_err());
    }

    #[test]
    fn test_prepare_dirs_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().join("data"),
            ..Config::default()
        };
        config.prepare_dirs().unwrap();
        assert!(config.tiles_dir().is_dir());
        assert!(config.grib_dir().is_dir());
    }
}
