//! PNG and TIFF predictors used with Flate and LZW payloads.
//!
//! Predictor 1 is the identity, 2 is TIFF horizontal differencing, 10-15
//! are the PNG row filters where every row carries its own filter byte.

use super::{FilterError, FilterResult};
use crate::types::CodecParams;

#[derive(Debug, Clone, Copy)]
enum Predictor {
    None,
    Tiff,
    Png,
}

struct Geometry {
    bytes_per_pixel: usize,
    bytes_per_row: usize,
}

fn geometry(params: &CodecParams) -> Geometry {
    let colors = params.colors.unwrap_or(1).max(1) as usize;
    let bpc = params.bits_per_component.unwrap_or(8).max(1) as usize;
    let columns = params.columns.unwrap_or(1).max(1) as usize;
    Geometry {
        bytes_per_pixel: (colors * bpc).div_ceil(8),
        bytes_per_row: (columns * colors * bpc).div_ceil(8),
    }
}

fn predictor_kind(params: &CodecParams) -> Predictor {
    match params.predictor.unwrap_or(1) {
        2 => Predictor::Tiff,
        10..=15 => Predictor::Png,
        _ => Predictor::None,
    }
}

/// Invert the predictor named in `params` over decompressed data.
pub fn decode(data: Vec<u8>, params: &CodecParams) -> FilterResult<Vec<u8>> {
    match predictor_kind(params) {
        Predictor::None => Ok(data),
        Predictor::Tiff => tiff_decode(data, &geometry(params)),
        Predictor::Png => png_decode(&data, &geometry(params)),
    }
}

/// Apply the predictor named in `params` before compression. PNG output
/// uses the Up filter for every row, which any conforming reader accepts.
pub fn encode(data: Vec<u8>, params: &CodecParams) -> FilterResult<Vec<u8>> {
    match predictor_kind(params) {
        Predictor::None => Ok(data),
        Predictor::Tiff => tiff_encode(data, &geometry(params)),
        Predictor::Png => png_encode(&data, &geometry(params)),
    }
}

fn tiff_decode(mut data: Vec<u8>, geo: &Geometry) -> FilterResult<Vec<u8>> {
    if geo.bytes_per_row == 0 || data.len() % geo.bytes_per_row != 0 {
        return Err(FilterError::InvalidData(
            "TIFF predictor: data length not a whole number of rows".to_string(),
        ));
    }
    for row in data.chunks_exact_mut(geo.bytes_per_row) {
        for i in geo.bytes_per_pixel..row.len() {
            row[i] = row[i].wrapping_add(row[i - geo.bytes_per_pixel]);
        }
    }
    Ok(data)
}

fn tiff_encode(mut data: Vec<u8>, geo: &Geometry) -> FilterResult<Vec<u8>> {
    if geo.bytes_per_row == 0 || data.len() % geo.bytes_per_row != 0 {
        return Err(FilterError::InvalidData(
            "TIFF predictor: data length not a whole number of rows".to_string(),
        ));
    }
    for row in data.chunks_exact_mut(geo.bytes_per_row) {
        for i in (geo.bytes_per_pixel..row.len()).rev() {
            row[i] = row[i].wrapping_sub(row[i - geo.bytes_per_pixel]);
        }
    }
    Ok(data)
}

fn png_decode(data: &[u8], geo: &Geometry) -> FilterResult<Vec<u8>> {
    let row_length = geo.bytes_per_row + 1;
    if row_length == 1 || data.len() % row_length != 0 {
        return Err(FilterError::InvalidData(
            "PNG predictor: data length not a whole number of tagged rows".to_string(),
        ));
    }

    let bpp = geo.bytes_per_pixel;
    let mut result = Vec::with_capacity(data.len() - data.len() / row_length);
    let mut previous = vec![0u8; geo.bytes_per_row];

    for chunk in data.chunks_exact(row_length) {
        let filter = chunk[0];
        let row = &chunk[1..];
        let mut decoded = vec![0u8; geo.bytes_per_row];

        match filter {
            0 => decoded.copy_from_slice(row),
            1 => {
                for i in 0..row.len() {
                    let left = if i >= bpp { decoded[i - bpp] } else { 0 };
                    decoded[i] = row[i].wrapping_add(left);
                }
            }
            2 => {
                for i in 0..row.len() {
                    decoded[i] = row[i].wrapping_add(previous[i]);
                }
            }
            3 => {
                for i in 0..row.len() {
                    let left = if i >= bpp { decoded[i - bpp] as u16 } else { 0 };
                    let up = previous[i] as u16;
                    decoded[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row.len() {
                    let left = if i >= bpp { decoded[i - bpp] } else { 0 };
                    let up = previous[i];
                    let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
                    decoded[i] = row[i].wrapping_add(paeth(left, up, up_left));
                }
            }
            other => {
                return Err(FilterError::InvalidData(format!(
                    "PNG predictor: unknown row filter {}",
                    other
                )));
            }
        }

        result.extend_from_slice(&decoded);
        previous = decoded;
    }

    Ok(result)
}

fn png_encode(data: &[u8], geo: &Geometry) -> FilterResult<Vec<u8>> {
    if geo.bytes_per_row == 0 || data.len() % geo.bytes_per_row != 0 {
        return Err(FilterError::InvalidData(
            "PNG predictor: data length not a whole number of rows".to_string(),
        ));
    }

    let mut result = Vec::with_capacity(data.len() + data.len() / geo.bytes_per_row);
    let mut previous = vec![0u8; geo.bytes_per_row];

    for row in data.chunks_exact(geo.bytes_per_row) {
        result.push(2); // Up filter
        for i in 0..row.len() {
            result.push(row[i].wrapping_sub(previous[i]));
        }
        previous = row.to_vec();
    }

    Ok(result)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i32 + b as i32 - c as i32;
    let pa = (p - a as i32).abs();
    let pb = (p - b as i32).abs();
    let pc = (p - c as i32).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(predictor: i32, columns: i32) -> CodecParams {
        CodecParams {
            predictor: Some(predictor),
            columns: Some(columns),
            ..Default::default()
        }
    }

    #[test]
    fn identity_predictor() {
        let data = vec![1, 2, 3, 4];
        assert_eq!(decode(data.clone(), &params(1, 4)).unwrap(), data);
    }

    #[test]
    fn png_sub_row() {
        // filter 1 (Sub) over one 4-byte row of deltas
        let data = vec![1, 10, 5, 3, 7];
        let out = decode(data, &params(10, 4)).unwrap();
        assert_eq!(out, vec![10, 15, 18, 25]);
    }

    #[test]
    fn png_up_rows() {
        let data = vec![0, 10, 20, 2, 5, 8];
        let out = decode(data, &params(12, 2)).unwrap();
        assert_eq!(out, vec![10, 20, 15, 28]);
    }

    #[test]
    fn png_roundtrip() {
        let payload: Vec<u8> = (0..64u8).collect();
        let p = params(12, 8);
        let encoded = encode(payload.clone(), &p).unwrap();
        assert_eq!(encoded.len(), payload.len() + 8);
        assert_eq!(decode(encoded, &p).unwrap(), payload);
    }

    #[test]
    fn tiff_roundtrip() {
        let payload = vec![10u8, 20, 30, 40, 50, 60, 70, 80];
        let p = params(2, 4);
        let encoded = encode(payload.clone(), &p).unwrap();
        assert_eq!(decode(encoded, &p).unwrap(), payload);
    }

    #[test]
    fn paeth_picks_nearest() {
        assert_eq!(paeth(10, 0, 0), 10);
        assert_eq!(paeth(0, 10, 0), 10);
        assert_eq!(paeth(4, 5, 9), 4);
    }
}
