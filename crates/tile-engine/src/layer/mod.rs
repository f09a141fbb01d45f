//! Map layers.
//!
//! A layer validates request options against its sources, names the cache
//! key of a tile and renders it. Layers hold no per-request state; sources
//! are passed in by the orchestrator.

pub mod cape;
pub mod lightning_probability;
pub mod temperature;
pub mod vorticity;
pub mod wind;

use data_sources::DataSource;
use renderer::raster::put_pixel;
use renderer::{ColorScheme, Colorer, Raster};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tile_common::{Grid, TileCoord, TileError, TileInfo, TileResult, TILE_SIZE};

pub use cape::cape_layer;
pub use lightning_probability::lightning_probability_layer;
pub use temperature::temperature_layer;
pub use vorticity::vorticity_layer;
pub use wind::WindLayer;

/// Registered sources by name.
pub type Sources = BTreeMap<String, Arc<dyn DataSource>>;

/// Query options as received, before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOptions {
    pub source: Option<String>,
    pub forecast_hour: Option<String>,
}

impl RawOptions {
    pub fn new(source: Option<&str>, forecast_hour: Option<&str>) -> Self {
        Self {
            source: source.map(str::to_string),
            forecast_hour: forecast_hour.map(str::to_string),
        }
    }
}

/// Validated options of one tile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileOptions {
    /// Canonical source name
    pub source: String,
    pub forecast_hour: u32,
}

/// Legend of a layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scale {
    pub colors: Vec<String>,
    pub min_value: f32,
    pub max_value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerMeta {
    pub supported_sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<Scale>,
}

pub(crate) fn lookup<'a>(sources: &'a Sources, name: &str) -> TileResult<&'a Arc<dyn DataSource>> {
    sources
        .get(name)
        .ok_or_else(|| TileError::UnknownSource(name.to_string()))
}

pub trait Layer: Send + Sync {
    fn name(&self) -> &str;

    /// Sources this layer renders, default first.
    fn supported_sources(&self) -> &[&'static str];

    fn scale(&self, colorer: &Colorer) -> Option<Scale>;

    fn generate_tile(
        &self,
        coord: &TileCoord,
        options: &TileOptions,
        sources: &Sources,
        colorer: &Colorer,
    ) -> TileResult<Vec<u8>>;

    fn meta(&self, colorer: &Colorer) -> LayerMeta {
        LayerMeta {
            supported_sources: self
                .supported_sources()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            scale: self.scale(colorer),
        }
    }

    /// Resolve the source (case-insensitive, default first supported) and the
    /// forecast hour (default 0), validating both.
    fn get_options(&self, raw: &RawOptions, sources: &Sources) -> TileResult<TileOptions> {
        let supported = self.supported_sources();
        let source = match raw.source.as_deref().map(str::trim) {
            None | Some("") => supported.first().copied().ok_or_else(|| {
                TileError::Internal(format!("layer {} has no sources", self.name()))
            })?,
            Some(requested) => supported
                .iter()
                .copied()
                .find(|s| s.eq_ignore_ascii_case(requested))
                .ok_or_else(|| {
                    TileError::validation(
                        "source",
                        format!("layer {} does not support source '{}'", self.name(), requested),
                    )
                })?,
        };
        let data_source = lookup(sources, source)?;

        let forecast_hour = match raw.forecast_hour.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(text) => {
                let hour: i64 = text.parse().map_err(|_| {
                    TileError::validation("forecastHour", format!("'{}' is not an integer", text))
                })?;
                data_source.validate_forecast_hour(hour)?
            }
        };

        Ok(TileOptions {
            source: source.to_string(),
            forecast_hour,
        })
    }

    /// `{layer}-{source}-{year}-{month}-{day}-{cycle}-{fh}-{x}-{y}-{z}.png`
    fn get_path(
        &self,
        coord: &TileCoord,
        options: &TileOptions,
        sources: &Sources,
    ) -> TileResult<String> {
        let run = lookup(sources, &options.source)?
            .loaded_run()
            .ok_or_else(|| TileError::NotLoaded(options.source.clone()))?;
        Ok(format!(
            "{}-{}-{}-{}-{}-{}-{}.png",
            self.name(),
            options.source,
            run,
            options.forecast_hour,
            coord.x,
            coord.y,
            coord.z
        ))
    }
}

/// Colour ramp settings of a shaded field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shading {
    pub range: f32,
    pub scheme: ColorScheme,
    /// None scales opacity with the value
    pub opacity: Option<f32>,
}

impl Shading {
    fn scale(&self, colorer: &Colorer) -> Scale {
        Scale {
            colors: colorer.scale(self.scheme),
            min_value: 0.0,
            max_value: self.range,
        }
    }
}

/// Fill a tile raster by sampling `value_at(lat, lon)` at every pixel.
pub(crate) fn shade_tile<F>(
    coord: &TileCoord,
    colorer: &Colorer,
    shading: &Shading,
    value_at: F,
) -> Raster
where
    F: Fn(f64, f64) -> f32 + Sync + Send,
{
    let info = TileInfo::new(coord);
    let mut raster = Raster::new(TILE_SIZE as usize, TILE_SIZE as usize);
    raster.fill_rows(|py, row| {
        for px in 0..TILE_SIZE {
            let (lat, lon) = info.pixel_lat_lon(px, py as u32);
            let color = colorer.render(
                value_at(lat, lon),
                shading.range,
                shading.scheme,
                shading.opacity,
            );
            put_pixel(row, px as usize, color);
        }
    });
    raster
}

/// A layer that shades one variable after a per-value transform.
pub struct ScalarLayer {
    pub name: &'static str,
    pub sources: &'static [&'static str],
    pub variable: &'static str,
    pub shading: Shading,
    pub transform: fn(f32) -> f32,
}

impl ScalarLayer {
    pub fn value_at(&self, grid: &Grid, lat: f64, lon: f64) -> f32 {
        (self.transform)(grid.bilinear_interpolation(lat, lon))
    }
}

impl Layer for ScalarLayer {
    fn name(&self) -> &str {
        self.name
    }

    fn supported_sources(&self) -> &[&'static str] {
        self.sources
    }

    fn scale(&self, colorer: &Colorer) -> Option<Scale> {
        Some(self.shading.scale(colorer))
    }

    fn generate_tile(
        &self,
        coord: &TileCoord,
        options: &TileOptions,
        sources: &Sources,
        colorer: &Colorer,
    ) -> TileResult<Vec<u8>> {
        let grid = lookup(sources, &options.source)?.get_data(self.variable, options.forecast_hour)?;
        let raster = shade_tile(coord, colorer, &self.shading, |lat, lon| {
            self.value_at(&grid, lat, lon)
        });
        Ok(raster.encode_png()?)
    }
}

/// Every layer served by default.
pub fn default_layers() -> Vec<Arc<dyn Layer>> {
    vec![
        Arc::new(cape_layer()),
        Arc::new(WindLayer::new()),
        Arc::new(temperature_layer()),
        Arc::new(vorticity_layer()),
        Arc::new(lightning_probability_layer()),
    ]
}
