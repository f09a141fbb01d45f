//! PNG encoding for RGBA tiles.
//!
//! Weather tiles are drawn from a handful of palette shades, so most fit in
//! an indexed PNG (color type 3, with a tRNS chunk for alpha). Tiles with
//! more than 256 distinct colors fall back to truecolor RGBA (color type 6).

use crate::RenderError;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

const COLOR_TYPE_INDEXED: u8 = 3;
const COLOR_TYPE_RGBA: u8 = 6;

/// Maximum colors for indexed PNG (PNG8)
const MAX_PALETTE_SIZE: usize = 256;

/// Pixel count above which palette extraction runs in parallel
const PARALLEL_THRESHOLD: usize = 4096;

/// Encode RGBA pixels, choosing indexed output when the colors fit.
pub fn encode(pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>, RenderError> {
    check_size(pixels, width, height)?;

    let palette = if width * height >= PARALLEL_THRESHOLD {
        extract_palette_parallel(pixels)
    } else {
        extract_palette(pixels)
    };

    match palette {
        Some((colors, indices)) => encode_indexed(&colors, &indices, width, height),
        None => encode_rgba(pixels, width, height),
    }
}

/// Encode RGBA pixels as truecolor with alpha.
pub fn encode_rgba(pixels: &[u8], width: usize, height: usize) -> Result<Vec<u8>, RenderError> {
    check_size(pixels, width, height)?;

    let mut out = Vec::with_capacity(pixels.len() / 2);
    out.extend_from_slice(&SIGNATURE);
    write_chunk(&mut out, b"IHDR", &header(width, height, COLOR_TYPE_RGBA));
    write_chunk(&mut out, b"IDAT", &deflate_scanlines(pixels, width * 4, height)?);
    write_chunk(&mut out, b"IEND", &[]);
    Ok(out)
}

/// Encode palette indices (one byte per pixel) against `palette`.
pub fn encode_indexed(
    palette: &[[u8; 4]],
    indices: &[u8],
    width: usize,
    height: usize,
) -> Result<Vec<u8>, RenderError> {
    if indices.len() != width * height {
        return Err(RenderError::BufferSize {
            width,
            height,
            expected: width * height,
            actual: indices.len(),
        });
    }

    let mut out = Vec::new();
    out.extend_from_slice(&SIGNATURE);
    write_chunk(&mut out, b"IHDR", &header(width, height, COLOR_TYPE_INDEXED));

    let plte: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
    write_chunk(&mut out, b"PLTE", &plte);

    if palette.iter().any(|c| c[3] < 255) {
        let trns: Vec<u8> = palette.iter().map(|c| c[3]).collect();
        write_chunk(&mut out, b"tRNS", &trns);
    }

    write_chunk(&mut out, b"IDAT", &deflate_scanlines(indices, width, height)?);
    write_chunk(&mut out, b"IEND", &[]);
    Ok(out)
}

fn check_size(pixels: &[u8], width: usize, height: usize) -> Result<(), RenderError> {
    let expected = width * height * 4;
    if pixels.len() != expected {
        return Err(RenderError::BufferSize {
            width,
            height,
            expected,
            actual: pixels.len(),
        });
    }
    Ok(())
}

/// IHDR body: 8-bit depth, deflate, adaptive filtering, no interlace.
fn header(width: usize, height: usize, color_type: u8) -> [u8; 13] {
    let mut ihdr = [0u8; 13];
    ihdr[0..4].copy_from_slice(&(width as u32).to_be_bytes());
    ihdr[4..8].copy_from_slice(&(height as u32).to_be_bytes());
    ihdr[8] = 8;
    ihdr[9] = color_type;
    ihdr
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(data);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
}

/// Prefix each scanline with filter type 0 and zlib-compress.
fn deflate_scanlines(data: &[u8], row_bytes: usize, height: usize) -> Result<Vec<u8>, RenderError> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(data.len() / 4),
        Compression::fast(),
    );
    for row in data.chunks_exact(row_bytes.max(1)).take(height) {
        encoder.write_all(&[0])?;
        encoder.write_all(row)?;
    }
    Ok(encoder.finish()?)
}

type Palette = (Vec<[u8; 4]>, Vec<u8>);

#[inline(always)]
fn pack(p: &[u8]) -> u32 {
    u32::from_le_bytes([p[0], p[1], p[2], p[3]])
}

/// Palette and per-pixel indices, or None past 256 colors.
fn extract_palette(pixels: &[u8]) -> Option<Palette> {
    let mut lookup: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices = Vec::with_capacity(pixels.len() / 4);

    for px in pixels.chunks_exact(4) {
        let key = pack(px);
        let index = match lookup.get(&key) {
            Some(&i) => i,
            None => {
                if palette.len() == MAX_PALETTE_SIZE {
                    return None;
                }
                let i = palette.len() as u8;
                palette.push([px[0], px[1], px[2], px[3]]);
                lookup.insert(key, i);
                i
            }
        };
        indices.push(index);
    }

    Some((palette, indices))
}

/// Same result shape as [`extract_palette`], with the color census and the
/// index mapping split across rayon workers.
fn extract_palette_parallel(pixels: &[u8]) -> Option<Palette> {
    let rows = (pixels.len() / 4 / rayon::current_num_threads()).max(256);
    let chunk_bytes = rows * 4;

    let mut census: Vec<u32> = pixels
        .par_chunks(chunk_bytes)
        .map(|chunk| {
            let mut seen: HashMap<u32, ()> = HashMap::with_capacity(64);
            for px in chunk.chunks_exact(4) {
                seen.insert(pack(px), ());
                if seen.len() > MAX_PALETTE_SIZE {
                    break;
                }
            }
            seen.into_keys().collect::<Vec<_>>()
        })
        .flatten()
        .collect();
    census.sort_unstable();
    census.dedup();

    if census.len() > MAX_PALETTE_SIZE {
        return None;
    }

    let lookup: HashMap<u32, u8> = census
        .iter()
        .enumerate()
        .map(|(i, &key)| (key, i as u8))
        .collect();
    let palette = census.iter().map(|key| key.to_le_bytes()).collect();
    let indices = pixels
        .par_chunks_exact(4)
        .map(|px| lookup.get(&pack(px)).copied().unwrap_or(0))
        .collect();

    Some((palette, indices))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_dedups() {
        let pixels = [
            255, 0, 0, 255, //
            0, 255, 0, 128, //
            255, 0, 0, 255,
        ];
        let (palette, indices) = extract_palette(&pixels).unwrap();
        assert_eq!(palette.len(), 2);
        assert_eq!(indices, vec![0, 1, 0]);
        assert_eq!(palette[1], [0, 255, 0, 128]);
    }

    #[test]
    fn test_parallel_matches_sequential_colors() {
        let mut pixels = Vec::with_capacity(128 * 128 * 4);
        for y in 0..128u32 {
            for x in 0..128u32 {
                let shade = ((x / 16 + y / 16) % 15) as u8;
                pixels.extend_from_slice(&[shade * 10, 200 - shade * 5, 40, 180]);
            }
        }

        let (seq_palette, _) = extract_palette(&pixels).unwrap();
        let (par_palette, par_indices) = extract_palette_parallel(&pixels).unwrap();
        assert_eq!(seq_palette.len(), 15);
        assert_eq!(par_palette.len(), 15);
        // Every index resolves back to the original pixel
        for (px, &i) in pixels.chunks_exact(4).zip(&par_indices) {
            assert_eq!(&par_palette[i as usize][..], px);
        }
    }

    #[test]
    fn test_too_many_colors() {
        let pixels: Vec<u8> = (0..300u32)
            .flat_map(|i| [(i % 256) as u8, (i / 256) as u8, 0, 255])
            .collect();
        assert!(extract_palette(&pixels).is_none());
    }

    #[test]
    fn test_header_fields() {
        let ihdr = header(256, 128, COLOR_TYPE_INDEXED);
        assert_eq!(&ihdr[0..4], &256u32.to_be_bytes());
        assert_eq!(&ihdr[4..8], &128u32.to_be_bytes());
        assert_eq!(ihdr[8], 8);
        assert_eq!(ihdr[9], 3);
    }
}
