//! NCEP High-Resolution Rapid Refresh, 3 km CONUS output on a Lambert grid.

use crate::fetch::Fetcher;
use crate::listing::{parse_hrrr_days, parse_hrrr_runs};
use crate::model::{GribSource, GribSourceConfig, Model, Variable};
use crate::source::Horizon;
use async_trait::async_trait;
use grib2_parser::Selector;
use std::sync::Arc;
use tile_common::{RunId, TileResult};
use tracing::debug;

pub const HRRR_BASE_URL: &str = "http://www.nomads.ncep.noaa.gov/pub/data/nccf/com/hrrr/prod/";

const VARIABLES: &[Variable] = &[Variable {
    name: "cape",
    selector: Selector::new(0, 7, 6, 1),
}];

/// Day directories scanned for cycles; the newest day may hold none yet.
const DAYS_SCANNED: usize = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct Hrrr;

pub type HrrrSource = GribSource<Hrrr>;

impl GribSource<Hrrr> {
    pub fn hrrr(config: GribSourceConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        GribSource::new(Hrrr, config, fetcher)
    }
}

fn day_url(base_url: &str, day: (i32, u32, u32)) -> String {
    format!(
        "{}hrrr.{:04}{:02}{:02}/conus/",
        base_url, day.0, day.1, day.2
    )
}

#[async_trait]
impl Model for Hrrr {
    fn name(&self) -> &'static str {
        "hrrr"
    }

    fn horizon(&self, production: bool) -> Horizon {
        if production {
            Horizon::new(18, 1)
        } else {
            Horizon::new(10, 1)
        }
    }

    fn variables(&self) -> &'static [Variable] {
        VARIABLES
    }

    fn payload_url(&self, base_url: &str, run: RunId, forecast_hour: u32) -> String {
        format!(
            "{}hrrr.{}/conus/hrrr.t{:02}z.wrfsfcf{:02}.grib2",
            base_url,
            run.date_compact(),
            run.model_cycle,
            forecast_hour
        )
    }

    async fn list_runs(&self, fetcher: &dyn Fetcher, base_url: &str) -> TileResult<Vec<RunId>> {
        let days = parse_hrrr_days(&fetcher.get_text(base_url).await?);
        let skip = days.len().saturating_sub(DAYS_SCANNED);

        let mut runs = Vec::new();
        for day in &days[skip..] {
            let html = fetcher.get_text(&day_url(base_url, *day)).await?;
            let found = parse_hrrr_runs(&html, *day);
            debug!(day = ?day, cycles = found.len(), "Scanned HRRR day");
            runs.extend(found);
        }
        runs.sort();
        Ok(runs)
    }
}
