//! GRIB2 section parsing.
//!
//! A GRIB2 message is Section 0 (16 bytes), Section 1, then one or more
//! repetitions of Sections 2-7, closed by the "7777" end marker. Every
//! section after Section 0 starts with a 4-byte length and a 1-byte number.
//! Offsets in comments below are 0-based from the start of the section.

use crate::Grib2Error;
use chrono::{DateTime, NaiveDate, Utc};

/// Sentinel for an absent 4-byte value.
const MISSING_U32: u32 = 0xFFFF_FFFF;

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub reference_time: DateTime<Utc>,
}

/// Template 3.0: regular latitude/longitude grid (degrees).
#[derive(Debug, Clone, PartialEq)]
pub struct LatLonGrid {
    pub ni: usize,
    pub nj: usize,
    pub la1: f64,
    pub lo1: f64,
    pub la2: f64,
    pub lo2: f64,
    pub di: Option<f64>,
    pub dj: Option<f64>,
    pub scanning_mode: u8,
}

/// Template 3.30: Lambert conformal grid (degrees, metres).
#[derive(Debug, Clone, PartialEq)]
pub struct LambertGrid {
    pub nx: usize,
    pub ny: usize,
    pub la1: f64,
    pub lo1: f64,
    pub lov: f64,
    pub latin1: f64,
    pub latin2: f64,
    pub dx: f64,
    pub dy: f64,
    pub scanning_mode: u8,
}

/// Section 3: Grid Definition Section
#[derive(Debug, Clone, PartialEq)]
pub enum GridDefinition {
    LatLon(LatLonGrid),
    Lambert(LambertGrid),
}

impl GridDefinition {
    pub fn num_points(&self) -> usize {
        match self {
            GridDefinition::LatLon(g) => g.ni * g.nj,
            GridDefinition::Lambert(g) => g.nx * g.ny,
        }
    }

    pub fn scanning_mode(&self) -> ScanMode {
        match self {
            GridDefinition::LatLon(g) => ScanMode(g.scanning_mode),
            GridDefinition::Lambert(g) => ScanMode(g.scanning_mode),
        }
    }
}

/// Scanning mode flags (Flag Table 3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanMode(pub u8);

impl ScanMode {
    /// Points along a row run westward.
    pub fn i_negative(&self) -> bool {
        self.0 & 0x80 != 0
    }

    /// Rows run northward.
    pub fn j_positive(&self) -> bool {
        self.0 & 0x40 != 0
    }

    /// Adjacent points are consecutive along a column instead of a row.
    pub fn j_consecutive(&self) -> bool {
        self.0 & 0x20 != 0
    }
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDefinition {
    pub template: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub forecast_time: u32,
    pub surface_type: u8,
    pub surface_value: f64,
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone, PartialEq)]
pub struct DataRepresentation {
    pub num_data_points: u32,
    pub template: u16,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
}

/// A section located inside a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRef {
    pub number: u8,
    pub offset: usize,
    pub length: usize,
}

impl SectionRef {
    pub fn slice<'a>(&self, message: &'a [u8]) -> &'a [u8] {
        &message[self.offset..self.offset + self.length]
    }
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, Grib2Error> {
    if data.len() < 16 {
        return Err(Grib2Error::InvalidFormat(
            "Not enough data for indicator section".to_string(),
        ));
    }

    if &data[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat(
            "Invalid GRIB magic bytes".to_string(),
        ));
    }

    // 0-3 "GRIB", 4-5 reserved, 6 discipline, 7 edition, 8-15 total length
    let discipline = data[6];
    let edition = data[7];
    let message_length = u64::from_be_bytes([
        data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
    ]);

    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "Expected GRIB edition 2, got {}",
            edition
        )));
    }

    Ok(Indicator {
        discipline,
        edition,
        message_length,
    })
}

/// Walk the sections following Section 0 up to the end marker.
pub fn split_sections(message: &[u8]) -> Result<Vec<SectionRef>, Grib2Error> {
    let mut sections = Vec::new();
    let mut offset = 16;

    loop {
        if offset + 4 <= message.len() && &message[offset..offset + 4] == b"7777" {
            return Ok(sections);
        }
        if offset + 5 > message.len() {
            return Err(Grib2Error::InvalidFormat(
                "Message truncated before end marker".to_string(),
            ));
        }

        let length = read_u32(&message[offset..]) as usize;
        let number = message[offset + 4];

        if length < 5 || offset + length > message.len() {
            return Err(Grib2Error::InvalidSection {
                section: number,
                reason: format!("Invalid section length {} at offset {}", length, offset),
            });
        }
        if !(1..=7).contains(&number) {
            return Err(Grib2Error::InvalidSection {
                section: number,
                reason: format!("Unexpected section number at offset {}", offset),
            });
        }

        sections.push(SectionRef {
            number,
            offset,
            length,
        });
        offset += length;
    }
}

/// Parse Section 1 (Identification)
pub fn parse_identification(section: &[u8]) -> Result<Identification, Grib2Error> {
    if section.len() < 19 {
        return Err(Grib2Error::InvalidSection {
            section: 1,
            reason: "Not enough data".to_string(),
        });
    }

    // 5-6 centre, 7-8 sub-centre, 12-13 year, 14 month, 15 day, 16-18 h:m:s
    let center = u16::from_be_bytes([section[5], section[6]]);
    let sub_center = u16::from_be_bytes([section[7], section[8]]);
    let year = u16::from_be_bytes([section[12], section[13]]);
    let (month, day) = (section[14], section[15]);
    let (hour, minute, second) = (section[16], section[17], section[18]);

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 1,
            reason: format!(
                "Invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
        })?;

    Ok(Identification {
        center,
        sub_center,
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
    })
}

/// Parse Section 3 (Grid Definition)
pub fn parse_grid_definition(section: &[u8]) -> Result<GridDefinition, Grib2Error> {
    if section.len() < 14 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: "Not enough data".to_string(),
        });
    }

    // 12-13 grid definition template number, template data from 14
    let template = u16::from_be_bytes([section[12], section[13]]);

    match template {
        0 => {
            require_len(section, 72, 3, "Template 3.0")?;
            // 30-33 Ni, 34-37 Nj, 46-49 La1, 50-53 Lo1, 55-58 La2,
            // 59-62 Lo2, 63-66 Di, 67-70 Dj, 71 scanning mode
            let di = read_u32(&section[63..]);
            let dj = read_u32(&section[67..]);
            let (ni, nj) = grid_dimensions(section)?;
            Ok(GridDefinition::LatLon(LatLonGrid {
                ni,
                nj,
                la1: micro_degrees(&section[46..]),
                lo1: micro_degrees(&section[50..]),
                la2: micro_degrees(&section[55..]),
                lo2: micro_degrees(&section[59..]),
                di: (di != MISSING_U32).then(|| di as f64 * 1e-6),
                dj: (dj != MISSING_U32).then(|| dj as f64 * 1e-6),
                scanning_mode: section[71],
            }))
        }
        30 => {
            require_len(section, 73, 3, "Template 3.30")?;
            // 30-33 Nx, 34-37 Ny, 38-41 La1, 42-45 Lo1, 51-54 LoV,
            // 55-58 Dx (mm), 59-62 Dy (mm), 64 scanning mode,
            // 65-68 Latin1, 69-72 Latin2
            let (nx, ny) = grid_dimensions(section)?;
            Ok(GridDefinition::Lambert(LambertGrid {
                nx,
                ny,
                la1: micro_degrees(&section[38..]),
                lo1: micro_degrees(&section[42..]),
                lov: micro_degrees(&section[51..]),
                dx: read_u32(&section[55..]) as f64 * 1e-3,
                dy: read_u32(&section[59..]) as f64 * 1e-3,
                scanning_mode: section[64],
                latin1: micro_degrees(&section[65..]),
                latin2: micro_degrees(&section[69..]),
            }))
        }
        other => Err(Grib2Error::UnsupportedTemplate {
            section: 3,
            template: other,
        }),
    }
}

/// Points along a parallel and along a meridian (octets 31-38), both non-zero.
fn grid_dimensions(section: &[u8]) -> Result<(usize, usize), Grib2Error> {
    let columns = read_u32(&section[30..]) as usize;
    let rows = read_u32(&section[34..]) as usize;
    if columns == 0 || rows == 0 {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!("Empty grid {}x{}", columns, rows),
        });
    }
    Ok((columns, rows))
}

/// Parse Section 4 (Product Definition)
pub fn parse_product_definition(section: &[u8]) -> Result<ProductDefinition, Grib2Error> {
    require_len(section, 28, 4, "Product definition")?;

    // 7-8 template, 9 category, 10 number, 17 time unit, 18-21 forecast time,
    // 22 first surface type, 23 scale factor, 24-27 scaled value
    let template = u16::from_be_bytes([section[7], section[8]]);
    let scale = decode_grib2_signed_u8(section[23]);
    let scaled = read_u32(&section[24..]);
    let surface_value = if scaled == MISSING_U32 {
        0.0
    } else {
        scaled as f64 / 10f64.powi(scale as i32)
    };

    Ok(ProductDefinition {
        template,
        parameter_category: section[9],
        parameter_number: section[10],
        forecast_time: read_u32(&section[18..]),
        surface_type: section[22],
        surface_value,
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(section: &[u8]) -> Result<DataRepresentation, Grib2Error> {
    require_len(section, 20, 5, "Data representation")?;

    // 5-8 number of packed values, 9-10 template, then for 5.0 / 5.2 / 5.3 /
    // 5.40 / 5.41: 11-14 R (IEEE float), 15-16 E, 17-18 D, 19 bits per value
    Ok(DataRepresentation {
        num_data_points: read_u32(&section[5..]),
        template: u16::from_be_bytes([section[9], section[10]]),
        reference_value: f32::from_be_bytes([section[11], section[12], section[13], section[14]]),
        binary_scale_factor: decode_grib2_signed_i16(&section[15..17]),
        decimal_scale_factor: decode_grib2_signed_i16(&section[17..19]),
        bits_per_value: section[19],
    })
}

/// Bitmap indicator of Section 6 (5): 0 present, 254 reuse previous, 255 none.
pub fn bitmap_indicator(section: &[u8]) -> Result<u8, Grib2Error> {
    section.get(5).copied().ok_or(Grib2Error::InvalidSection {
        section: 6,
        reason: "Missing bitmap indicator".to_string(),
    })
}

/// Decode a 4-byte GRIB2 sign-magnitude integer (MSB set means negative).
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    let raw = read_u32(bytes);
    let magnitude = (raw & 0x7FFF_FFFF) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Decode a 2-byte GRIB2 sign-magnitude integer.
pub fn decode_grib2_signed_i16(bytes: &[u8]) -> i16 {
    let raw = u16::from_be_bytes([bytes[0], bytes[1]]);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn decode_grib2_signed_u8(byte: u8) -> i8 {
    let magnitude = (byte & 0x7F) as i8;
    if byte & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Short name for the parameters this service knows, for logging.
pub fn parameter_short_name(discipline: u8, category: u8, number: u8) -> String {
    match (discipline, category, number) {
        (0, 0, 0) => "TMP".to_string(),
        (0, 2, 2) => "UGRD".to_string(),
        (0, 2, 3) => "VGRD".to_string(),
        (0, 2, 10) => "ABSV".to_string(),
        (0, 7, 6) => "CAPE".to_string(),
        (0, 7, 7) => "CIN".to_string(),
        _ => format!("P{}_{}_{}", discipline, category, number),
    }
}

// ===== Helper Functions =====

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn micro_degrees(bytes: &[u8]) -> f64 {
    decode_grib2_signed(bytes) as f64 * 1e-6
}

fn require_len(section: &[u8], len: usize, number: u8, what: &str) -> Result<(), Grib2Error> {
    if section.len() < len {
        return Err(Grib2Error::InvalidSection {
            section: number,
            reason: format!("{} needs at least {} bytes, got {}", what, len, section.len()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_mode_flags() {
        let mode = ScanMode(0x40);
        assert!(mode.j_positive());
        assert!(!mode.i_negative());
        assert!(!mode.j_consecutive());
        assert!(ScanMode(0x80).i_negative());
        assert!(ScanMode(0x20).j_consecutive());
    }

    #[test]
    fn test_signed_i16() {
        assert_eq!(decode_grib2_signed_i16(&[0x00, 0x05]), 5);
        assert_eq!(decode_grib2_signed_i16(&[0x80, 0x0A]), -10);
    }

    #[test]
    fn test_signed_u8() {
        assert_eq!(decode_grib2_signed_u8(0x02), 2);
        assert_eq!(decode_grib2_signed_u8(0x82), -2);
    }

    #[test]
    fn test_rejects_wrong_edition() {
        let mut header = *b"GRIB\0\0\0\x01\0\0\0\0\0\0\0\x10";
        assert!(parse_indicator(&header).is_err());
        header[7] = 2;
        let indicator = parse_indicator(&header).unwrap();
        assert_eq!(indicator.message_length, 16);
    }

    #[test]
    fn test_split_sections_requires_end_marker() {
        let mut message = b"GRIB\0\0\0\x02".to_vec();
        message.extend_from_slice(&30u64.to_be_bytes());
        // Section 1 of length 5 with no body, then garbage
        message.extend_from_slice(&[0, 0, 0, 5, 1]);
        message.extend_from_slice(&[0, 0, 0, 99, 3]);
        assert!(split_sections(&message).is_err());
    }
}
