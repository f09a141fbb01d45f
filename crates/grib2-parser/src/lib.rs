//! GRIB2 decoding into sampled grids (WMO FM 92 GRIB Edition 2).
//!
//! Section headers are parsed here; simple packing is unpacked in-house and
//! every other data template is handed to the `grib` crate.

pub mod sections;
pub mod unpacking;

use bytes::Bytes;
use sections::{
    bitmap_indicator, parse_data_representation, parse_grid_definition, parse_identification,
    parse_indicator, parse_product_definition, split_sections, DataRepresentation,
    GridDefinition, Identification, Indicator, ProductDefinition,
};
use std::fmt;
use thiserror::Error;
use tile_common::{Grid, LambertConformal, TileError};
use tracing::debug;

/// Errors raised while decoding GRIB2 payloads.
#[derive(Debug, Error)]
pub enum Grib2Error {
    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Unsupported template {template} in section {section}")]
    UnsupportedTemplate { section: u8, template: u16 },

    #[error("Unpacking failed: {0}")]
    UnpackingError(String),

    #[error("No field matching {0}")]
    NotFound(String),
}

impl From<Grib2Error> for TileError {
    fn from(err: Grib2Error) -> Self {
        TileError::Decode(err.to_string())
    }
}

/// Picks one field out of a multi-field payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selector {
    pub discipline: u8,
    pub category: u8,
    pub parameter: u8,
    pub surface_type: u8,
    /// Value of the first fixed surface; ignored when None.
    pub surface_value: Option<f64>,
}

impl Selector {
    pub const fn new(discipline: u8, category: u8, parameter: u8, surface_type: u8) -> Self {
        Self {
            discipline,
            category,
            parameter,
            surface_type,
            surface_value: None,
        }
    }

    pub const fn at(mut self, surface_value: f64) -> Self {
        self.surface_value = Some(surface_value);
        self
    }

    pub fn matches(&self, discipline: u8, product: &ProductDefinition) -> bool {
        self.discipline == discipline
            && self.category == product.parameter_category
            && self.parameter == product.parameter_number
            && self.surface_type == product.surface_type
            && self
                .surface_value
                .map_or(true, |v| (v - product.surface_value).abs() < 1e-6)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (surface {}",
            sections::parameter_short_name(self.discipline, self.category, self.parameter),
            self.surface_type
        )?;
        if let Some(value) = self.surface_value {
            write!(f, " = {}", value)?;
        }
        write!(f, ")")
    }
}

/// One data field (Sections 3-7) inside a message.
#[derive(Debug, Clone)]
pub struct Field {
    /// Position of this field's Section 7 within the message
    pub index: usize,
    pub grid: GridDefinition,
    pub product: ProductDefinition,
    pub representation: DataRepresentation,
    pub bitmap: Option<Bytes>,
    pub data: Bytes,
}

/// A parsed GRIB2 message.
#[derive(Debug, Clone)]
pub struct Grib2Message {
    pub indicator: Indicator,
    pub identification: Identification,
    pub fields: Vec<Field>,
    pub raw: Bytes,
}

impl Grib2Message {
    /// Decode a field into a Grid in the workspace's storage convention.
    pub fn decode_field(&self, field: &Field) -> Result<Grid, Grib2Error> {
        let num_points = field.grid.num_points();
        let values = match field.representation.template {
            0 => unpacking::unpack_simple(
                &field.data,
                num_points,
                field.representation.bits_per_value,
                field.representation.reference_value,
                field.representation.binary_scale_factor,
                field.representation.decimal_scale_factor,
                field.bitmap.as_deref(),
            )?,
            _ => unpacking::unpack_with_grib_crate(&self.raw, field.index)?,
        };

        if values.len() != num_points {
            return Err(Grib2Error::UnpackingError(format!(
                "Decoded {} values for a grid of {} points",
                values.len(),
                num_points
            )));
        }

        // Missing points sample as 0, like points outside the grid
        let values: Vec<f32> = values.into_iter().map(|v| v.unwrap_or(0.0)).collect();
        let grid = build_grid(&field.grid, values)?;
        Ok(grid.with_reference_time(self.identification.reference_time))
    }
}

/// Sequential reader over concatenated GRIB2 messages.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
}

impl Grib2Reader {
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    /// Parse the next message, skipping any bytes before its "GRIB" marker.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>, Grib2Error> {
        let Some(start) = find_magic(&self.data[self.offset..]).map(|p| p + self.offset) else {
            if self.offset == 0 {
                return Err(Grib2Error::InvalidFormat(
                    "No GRIB message found in payload".to_string(),
                ));
            }
            return Ok(None);
        };

        let indicator = parse_indicator(&self.data[start..])?;
        let length = indicator.message_length as usize;
        if length < 20 || start + length > self.data.len() {
            return Err(Grib2Error::InvalidFormat(format!(
                "Message at offset {} declares {} bytes, {} available",
                start,
                length,
                self.data.len() - start
            )));
        }

        let raw = self.data.slice(start..start + length);
        self.offset = start + length;
        parse_message(indicator, raw).map(Some)
    }
}

fn find_magic(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"GRIB")
}

fn parse_message(indicator: Indicator, raw: Bytes) -> Result<Grib2Message, Grib2Error> {
    let section_refs = split_sections(&raw)?;

    let mut identification = None;
    let mut grid = None;
    let mut product = None;
    let mut representation = None;
    let mut bitmap: Option<Bytes> = None;
    let mut previous_bitmap: Option<Bytes> = None;
    let mut fields = Vec::new();

    for section in section_refs {
        let body = section.slice(&raw);
        match section.number {
            1 => identification = Some(parse_identification(body)?),
            2 => {}
            3 => grid = Some(parse_grid_definition(body)?),
            4 => product = Some(parse_product_definition(body)?),
            5 => representation = Some(parse_data_representation(body)?),
            6 => {
                bitmap = match bitmap_indicator(body)? {
                    0 => {
                        let bm = raw.slice(section.offset + 6..section.offset + section.length);
                        previous_bitmap = Some(bm.clone());
                        Some(bm)
                    }
                    254 => previous_bitmap.clone(),
                    255 => None,
                    other => {
                        return Err(Grib2Error::UnsupportedTemplate {
                            section: 6,
                            template: other as u16,
                        })
                    }
                }
            }
            7 => {
                let missing = |n: u8| Grib2Error::InvalidSection {
                    section: n,
                    reason: "Data section without preceding definition".to_string(),
                };
                fields.push(Field {
                    index: fields.len(),
                    grid: grid.clone().ok_or_else(|| missing(3))?,
                    product: product.clone().ok_or_else(|| missing(4))?,
                    representation: representation.clone().ok_or_else(|| missing(5))?,
                    bitmap: bitmap.clone(),
                    data: raw.slice(section.offset + 5..section.offset + section.length),
                });
            }
            other => {
                return Err(Grib2Error::InvalidSection {
                    section: other,
                    reason: "Unexpected section number".to_string(),
                })
            }
        }
    }

    let identification = identification.ok_or(Grib2Error::InvalidSection {
        section: 1,
        reason: "Missing identification section".to_string(),
    })?;

    Ok(Grib2Message {
        indicator,
        identification,
        fields,
        raw,
    })
}

/// Lay decoded values out in the Grid convention (north row first, east
/// columns) and attach the geometry.
fn build_grid(definition: &GridDefinition, mut values: Vec<f32>) -> Result<Grid, Grib2Error> {
    let scan = definition.scanning_mode();
    if scan.j_consecutive() {
        return Err(Grib2Error::UnsupportedTemplate {
            section: 3,
            template: scan.0 as u16,
        });
    }

    match definition {
        GridDefinition::LatLon(g) => {
            if scan.i_negative() {
                for row in values.chunks_mut(g.ni) {
                    row.reverse();
                }
            }
            if scan.j_positive() {
                flip_rows(&mut values, g.ni);
            }

            let north = g.la1.max(g.la2);
            let west = if scan.i_negative() { g.lo2 } else { g.lo1 };
            let east = if scan.i_negative() { g.lo1 } else { g.lo2 };
            let dlat = g
                .dj
                .filter(|d| *d > 0.0)
                .unwrap_or_else(|| (g.la1 - g.la2).abs() / (g.nj.max(2) - 1) as f64);
            let dlon = g
                .di
                .filter(|d| *d > 0.0)
                .unwrap_or_else(|| (east - west).rem_euclid(360.0) / (g.ni.max(2) - 1) as f64);

            Grid::lat_lon(north, west, dlat, dlon, g.nj, g.ni, values)
                .map_err(Grib2Error::InvalidFormat)
        }
        GridDefinition::Lambert(g) => {
            if !scan.j_positive() || scan.i_negative() {
                return Err(Grib2Error::UnsupportedTemplate {
                    section: 3,
                    template: scan.0 as u16,
                });
            }
            let projection =
                LambertConformal::from_grib2(g.la1, g.lo1, g.lov, g.latin1, g.latin2, g.dx, g.dy);
            Grid::lambert(projection, g.ny, g.nx, values).map_err(Grib2Error::InvalidFormat)
        }
    }
}

fn flip_rows(values: &mut [f32], cols: usize) {
    let rows = values.len() / cols;
    for r in 0..rows / 2 {
        let (top, bottom) = values.split_at_mut((rows - 1 - r) * cols);
        top[r * cols..(r + 1) * cols].swap_with_slice(&mut bottom[..cols]);
    }
}

/// Decode the first field in `bytes` matching `selector`.
pub fn decode(bytes: Bytes, selector: &Selector) -> Result<Grid, Grib2Error> {
    let mut reader = Grib2Reader::new(bytes);
    let mut scanned = 0usize;

    while let Some(message) = reader.next_message()? {
        scanned += 1;
        let discipline = message.indicator.discipline;
        if let Some(field) = message
            .fields
            .iter()
            .find(|f| selector.matches(discipline, &f.product))
        {
            debug!(selector = %selector, message = scanned, "Decoding GRIB2 field");
            return message.decode_field(field);
        }
    }

    Err(Grib2Error::NotFound(selector.to_string()))
}
