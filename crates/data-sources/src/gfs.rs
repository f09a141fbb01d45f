//! NCEP Global Forecast System, 0.5 degree global output.

use crate::fetch::Fetcher;
use crate::listing::parse_gfs_runs;
use crate::model::{GribSource, GribSourceConfig, Model, Variable};
use crate::source::Horizon;
use async_trait::async_trait;
use grib2_parser::Selector;
use std::sync::Arc;
use tile_common::{RunId, TileResult};

pub const GFS_BASE_URL: &str = "http://www.nomads.ncep.noaa.gov/pub/data/nccf/com/gfs/prod/";

const VARIABLES: &[Variable] = &[
    Variable {
        name: "cape",
        selector: Selector::new(0, 7, 6, 1),
    },
    Variable {
        name: "windU",
        selector: Selector::new(0, 2, 2, 100).at(100_000.0),
    },
    Variable {
        name: "windV",
        selector: Selector::new(0, 2, 3, 100).at(100_000.0),
    },
    Variable {
        name: "temperature",
        selector: Selector::new(0, 0, 0, 1),
    },
    Variable {
        name: "vorticity",
        selector: Selector::new(0, 2, 10, 100).at(50_000.0),
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Gfs;

pub type GfsSource = GribSource<Gfs>;

impl GribSource<Gfs> {
    pub fn gfs(config: GribSourceConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        GribSource::new(Gfs, config, fetcher)
    }
}

#[async_trait]
impl Model for Gfs {
    fn name(&self) -> &'static str {
        "gfs"
    }

    fn horizon(&self, production: bool) -> Horizon {
        if production {
            Horizon::new(24, 3)
        } else {
            Horizon::new(6, 3)
        }
    }

    fn variables(&self) -> &'static [Variable] {
        VARIABLES
    }

    fn payload_url(&self, base_url: &str, run: RunId, forecast_hour: u32) -> String {
        format!(
            "{}gfs.{}{:02}/gfs.t{:02}z.pgrb2.0p50.f{:03}",
            base_url,
            run.date_compact(),
            run.model_cycle,
            run.model_cycle,
            forecast_hour
        )
    }

    async fn list_runs(&self, fetcher: &dyn Fetcher, base_url: &str) -> TileResult<Vec<RunId>> {
        let html = fetcher.get_text(base_url).await?;
        Ok(parse_gfs_runs(&html))
    }
}
