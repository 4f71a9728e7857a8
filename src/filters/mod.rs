use crate::types::StreamFilter;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

pub mod predictor;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("decompression error: {0}")]
    Decompression(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("filter is not invertible: {0}")]
    NotInvertible(&'static str),
}

pub type FilterResult<T> = Result<T, FilterError>;

/// Decode a payload through the filter chain, first filter first.
/// An unsupported filter stops decoding with `NotInvertible`; callers that
/// want pass-through behavior check `is_supported` up front and keep the
/// raw bytes instead.
pub fn decode_chain(data: &[u8], filters: &[StreamFilter]) -> FilterResult<Vec<u8>> {
    let mut result = data.to_vec();
    for filter in filters {
        result = decode_single(&result, filter)?;
    }
    Ok(result)
}

/// Encode a payload through the filter chain, last filter first, so that
/// `decode_chain(encode_chain(b)) == b`.
pub fn encode_chain(data: &[u8], filters: &[StreamFilter]) -> FilterResult<Vec<u8>> {
    let mut result = data.to_vec();
    for filter in filters.iter().rev() {
        result = encode_single(&result, filter)?;
    }
    Ok(result)
}

fn decode_single(data: &[u8], filter: &StreamFilter) -> FilterResult<Vec<u8>> {
    match filter {
        StreamFilter::AsciiHexDecode => decode_ascii_hex(data),
        StreamFilter::Ascii85Decode => decode_ascii85(data),
        StreamFilter::FlateDecode(params) => {
            let decoded = decode_flate(data)?;
            predictor::decode(decoded, params)
        }
        StreamFilter::LzwDecode(params) => {
            let decoded = decode_lzw(data, params.early_change.unwrap_or(true))?;
            predictor::decode(decoded, params)
        }
        StreamFilter::RunLengthDecode => decode_run_length(data),
        other => Err(FilterError::NotInvertible(other.name())),
    }
}

fn encode_single(data: &[u8], filter: &StreamFilter) -> FilterResult<Vec<u8>> {
    match filter {
        StreamFilter::AsciiHexDecode => Ok(encode_ascii_hex(data)),
        StreamFilter::Ascii85Decode => Ok(encode_ascii85(data)),
        StreamFilter::FlateDecode(params) => {
            let predicted = predictor::encode(data.to_vec(), params)?;
            encode_flate(&predicted)
        }
        StreamFilter::LzwDecode(params) => {
            let predicted = predictor::encode(data.to_vec(), params)?;
            encode_lzw(&predicted, params.early_change.unwrap_or(true))
        }
        StreamFilter::RunLengthDecode => Ok(encode_run_length(data)),
        other => Err(FilterError::NotInvertible(other.name())),
    }
}

fn decode_ascii_hex(data: &[u8]) -> FilterResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;

    for &byte in data {
        if byte.is_ascii_whitespace() {
            continue;
        }
        if byte == b'>' {
            break;
        }
        let digit = (byte as char)
            .to_digit(16)
            .ok_or_else(|| FilterError::InvalidData(format!("invalid hex digit 0x{:02x}", byte)))?
            as u8;
        match pending.take() {
            Some(high) => result.push(high << 4 | digit),
            None => pending = Some(digit),
        }
    }

    // Odd digit count: final digit is padded with 0.
    if let Some(high) = pending {
        result.push(high << 4);
    }

    Ok(result)
}

fn encode_ascii_hex(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2 + 1);
    for byte in data {
        out.extend_from_slice(format!("{:02X}", byte).as_bytes());
    }
    out.push(b'>');
    out
}

/// Powers of 85: [85^4, 85^3, 85^2, 85, 1].
const ASCII85_POWERS: [u32; 5] = [52200625, 614125, 7225, 85, 1];

fn decode_ascii85(data: &[u8]) -> FilterResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() * 4 / 5);
    let mut tuple: Vec<u8> = Vec::with_capacity(5);
    let mut data = data;
    if data.starts_with(b"<~") {
        data = &data[2..];
    }

    for &byte in data {
        if byte.is_ascii_whitespace() {
            continue;
        }
        if byte == b'~' {
            break;
        }
        if byte == b'z' && tuple.is_empty() {
            result.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        if !(b'!'..=b'u').contains(&byte) {
            return Err(FilterError::InvalidData(format!(
                "invalid base-85 character 0x{:02x}",
                byte
            )));
        }
        tuple.push(byte - b'!');
        if tuple.len() == 5 {
            let value = ascii85_tuple(&tuple);
            result.extend_from_slice(&value.to_be_bytes());
            tuple.clear();
        }
    }

    if !tuple.is_empty() {
        let keep = tuple.len() - 1;
        tuple.resize(5, 84);
        let value = ascii85_tuple(&tuple);
        result.extend_from_slice(&value.to_be_bytes()[..keep]);
    }

    Ok(result)
}

fn ascii85_tuple(tuple: &[u8]) -> u32 {
    tuple
        .iter()
        .zip(ASCII85_POWERS.iter())
        .fold(0u32, |acc, (&digit, &power)| {
            acc.wrapping_add(digit as u32 * power)
        })
}

fn encode_ascii85(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 5 / 4 + 2);
    for chunk in data.chunks(4) {
        if chunk.len() == 4 && chunk == [0, 0, 0, 0] {
            out.push(b'z');
            continue;
        }
        let mut padded = [0u8; 4];
        padded[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(padded);
        let mut digits = [0u8; 5];
        for d in digits.iter_mut().rev() {
            *d = (value % 85) as u8 + b'!';
            value /= 85;
        }
        out.extend_from_slice(&digits[..chunk.len() + 1]);
    }
    out.extend_from_slice(b"~>");
    out
}

fn decode_flate(data: &[u8]) -> FilterResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut result = Vec::new();
    match decoder.read_to_end(&mut result) {
        Ok(_) => Ok(result),
        Err(zlib_err) => {
            // Some producers emit raw deflate without the zlib wrapper.
            let mut fallback = flate2::read::DeflateDecoder::new(data);
            result.clear();
            fallback
                .read_to_end(&mut result)
                .map_err(|_| FilterError::Decompression(format!("flate: {}", zlib_err)))?;
            Ok(result)
        }
    }
}

fn encode_flate(data: &[u8]) -> FilterResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder
        .finish()
        .map_err(|e| FilterError::Compression(format!("flate: {}", e)))
}

fn decode_lzw(data: &[u8], early_change: bool) -> FilterResult<Vec<u8>> {
    // EarlyChange=1 (the default) bumps the code width one code early,
    // which is weezl's TIFF mode.
    let mut decoder = if early_change {
        weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
    } else {
        weezl::decode::Decoder::new(weezl::BitOrder::Msb, 8)
    };
    decoder
        .decode(data)
        .map_err(|e| FilterError::Decompression(format!("lzw: {:?}", e)))
}

fn encode_lzw(data: &[u8], early_change: bool) -> FilterResult<Vec<u8>> {
    let mut encoder = if early_change {
        weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
    } else {
        weezl::encode::Encoder::new(weezl::BitOrder::Msb, 8)
    };
    encoder
        .encode(data)
        .map_err(|e| FilterError::Compression(format!("lzw: {:?}", e)))
}

fn decode_run_length(data: &[u8]) -> FilterResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        if length == 128 {
            break;
        }
        if length < 128 {
            let count = length as usize + 1;
            if i + 1 + count > data.len() {
                return Err(FilterError::InvalidData(
                    "run-length literal run exceeds input".to_string(),
                ));
            }
            result.extend_from_slice(&data[i + 1..i + 1 + count]);
            i += 1 + count;
        } else {
            if i + 1 >= data.len() {
                return Err(FilterError::InvalidData(
                    "run-length repeat run missing byte".to_string(),
                ));
            }
            let count = 257 - length as usize;
            let byte = data[i + 1];
            result.resize(result.len() + count, byte);
            i += 2;
        }
    }

    Ok(result)
}

fn encode_run_length(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;

    while i < data.len() {
        // Measure the repeat run starting here.
        let byte = data[i];
        let mut run = 1;
        while run < 128 && i + run < data.len() && data[i + run] == byte {
            run += 1;
        }
        if run >= 2 {
            out.push((257 - run) as u8);
            out.push(byte);
            i += run;
            continue;
        }
        // Literal run: up to 128 bytes until a 3-byte repeat shows up.
        let start = i;
        let mut len = 0;
        while len < 128 && i < data.len() {
            let ahead = data.len() - i;
            if ahead >= 3 && data[i] == data[i + 1] && data[i] == data[i + 2] {
                break;
            }
            i += 1;
            len += 1;
        }
        out.push((len - 1) as u8);
        out.extend_from_slice(&data[start..start + len]);
    }

    out.push(128);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamFilter;

    fn roundtrip(filter: StreamFilter, payload: &[u8]) {
        let filters = [filter];
        let encoded = encode_chain(payload, &filters).unwrap();
        let decoded = decode_chain(&encoded, &filters).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn ascii_hex_roundtrip() {
        roundtrip(StreamFilter::AsciiHexDecode, b"pdfmill \x00\xff\x80 payload");
    }

    #[test]
    fn ascii_hex_odd_length_pads() {
        assert_eq!(decode_ascii_hex(b"41 42 4>").unwrap(), b"AB\x40");
    }

    #[test]
    fn ascii85_roundtrip() {
        roundtrip(StreamFilter::Ascii85Decode, b"Man is distinguished");
        roundtrip(StreamFilter::Ascii85Decode, &[0u8; 9]);
        roundtrip(StreamFilter::Ascii85Decode, b"x");
    }

    #[test]
    fn run_length_roundtrip() {
        roundtrip(StreamFilter::RunLengthDecode, b"aaaaaaaabcdefgh");
        roundtrip(StreamFilter::RunLengthDecode, &[7u8; 300]);
        roundtrip(StreamFilter::RunLengthDecode, b"");
    }

    #[test]
    fn flate_roundtrip() {
        let payload: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        roundtrip(StreamFilter::FlateDecode(Default::default()), &payload);
    }

    #[test]
    fn lzw_roundtrip() {
        let payload = b"TOBEORNOTTOBEORTOBEORNOT".repeat(8);
        roundtrip(StreamFilter::LzwDecode(Default::default()), &payload);
    }

    #[test]
    fn chain_order_is_inverted_on_encode() {
        let filters = [
            StreamFilter::Ascii85Decode,
            StreamFilter::FlateDecode(Default::default()),
        ];
        let payload = b"chained payload bytes";
        let encoded = encode_chain(payload, &filters).unwrap();
        let decoded = decode_chain(&encoded, &filters).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn unsupported_filter_refuses_decode() {
        let err = decode_chain(b"xx", &[StreamFilter::DctDecode]).unwrap_err();
        assert!(matches!(err, FilterError::NotInvertible("DCTDecode")));
    }
}
