//! GRIB2 data unpacking.
//!
//! Simple packing (template 5.0) is decoded here. Complex packing, spatial
//! differencing, JPEG2000 and PNG templates go through the `grib` crate.

use crate::Grib2Error;
use std::io::Cursor;

/// Unpack simple packed GRIB2 data.
///
/// value = (R + X * 2^E) * 10^(-D). With a bitmap, only points whose bit is
/// set consume a packed value; the rest are `None`.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: usize,
    bits_per_value: u8,
    reference_value: f32,
    binary_scale_factor: i16,
    decimal_scale_factor: i16,
    bitmap: Option<&[u8]>,
) -> Result<Vec<Option<f32>>, Grib2Error> {
    let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);
    let decimal_scale = 10.0_f64.powi(-(decimal_scale_factor as i32));
    let reference = reference_value as f64;
    let bits_per_value = bits_per_value as usize;

    let mut values = Vec::with_capacity(num_points);
    let mut bit_position = 0;

    for i in 0..num_points {
        if let Some(bm) = bitmap {
            let present = bm
                .get(i / 8)
                .map(|byte| (byte >> (7 - (i % 8))) & 1 == 1)
                .ok_or_else(|| {
                    Grib2Error::UnpackingError(format!("Bitmap too short for point {}", i))
                })?;
            if !present {
                values.push(None);
                continue;
            }
        }

        let packed_value = if bits_per_value == 0 {
            0
        } else {
            extract_bits(packed_data, bit_position, bits_per_value)
                .map_err(|e| Grib2Error::UnpackingError(format!("Failed to extract bits: {}", e)))?
        };
        bit_position += bits_per_value;

        let value = (reference + packed_value as f64 * binary_scale) * decimal_scale;
        values.push(Some(value as f32));
    }

    Ok(values)
}

/// Decode one field of a single GRIB2 message with the `grib` crate.
///
/// `field_index` counts Section 7 occurrences within the message.
pub fn unpack_with_grib_crate(
    message: &[u8],
    field_index: usize,
) -> Result<Vec<Option<f32>>, Grib2Error> {
    let grib_file = grib::from_reader(Cursor::new(message))
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate parse failed: {}", e)))?;

    let (_, submessage) = grib_file.iter().nth(field_index).ok_or_else(|| {
        Grib2Error::UnpackingError(format!("Submessage {} not found", field_index))
    })?;

    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate decoder: {}", e)))?;
    let values = decoder
        .dispatch()
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate dispatch: {}", e)))?;

    Ok(values
        .map(|v| if v.is_nan() { None } else { Some(v) })
        .collect())
}

/// Extract bits from a byte array, most significant bit first.
fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Result<u32, String> {
    if num_bits > 32 || num_bits == 0 {
        return Err(format!("Invalid number of bits: {}", num_bits));
    }
    if (start_bit + num_bits + 7) / 8 > data.len() {
        return Err("Not enough data to extract bits".to_string());
    }

    let mut result = 0u32;
    for i in 0..num_bits {
        let absolute_bit = start_bit + i;
        let bit = (data[absolute_bit / 8] >> (7 - (absolute_bit % 8))) & 1;
        result = (result << 1) | (bit as u32);
    }

    Ok(result)
}
