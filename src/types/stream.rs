use crate::types::{PdfDictionary, PdfName, PdfValue};
use std::fmt;

/// A stream object: its dictionary plus the payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    pub data: StreamData,
}

/// Payload state. `Raw` holds the bytes exactly as they sit on the wire
/// (filters still applied, encryption already removed); the writer emits
/// them verbatim so unsupported filters round-trip losslessly. `Decoded`
/// holds plain bytes; the writer re-applies the dictionary's filter chain.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamData {
    Raw(Vec<u8>),
    Decoded(Vec<u8>),
}

impl StreamData {
    pub fn bytes(&self) -> &[u8] {
        match self {
            StreamData::Raw(b) | StreamData::Decoded(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, StreamData::Decoded(_))
    }
}

/// Stream filters the pipeline knows about. The last five are recognized
/// but never decoded; their payloads pass through opaque.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFilter {
    AsciiHexDecode,
    Ascii85Decode,
    LzwDecode(CodecParams),
    FlateDecode(CodecParams),
    RunLengthDecode,
    CcittFaxDecode,
    Jbig2Decode,
    DctDecode,
    JpxDecode,
    Crypt,
}

impl StreamFilter {
    pub fn from_name(name: &PdfName, params: Option<&PdfDictionary>) -> Option<Self> {
        match name.without_slash() {
            "ASCIIHexDecode" | "AHx" => Some(StreamFilter::AsciiHexDecode),
            "ASCII85Decode" | "A85" => Some(StreamFilter::Ascii85Decode),
            "LZWDecode" | "LZW" => Some(StreamFilter::LzwDecode(CodecParams::from_dict(params))),
            "FlateDecode" | "Fl" => Some(StreamFilter::FlateDecode(CodecParams::from_dict(params))),
            "RunLengthDecode" | "RL" => Some(StreamFilter::RunLengthDecode),
            "CCITTFaxDecode" | "CCF" => Some(StreamFilter::CcittFaxDecode),
            "JBIG2Decode" => Some(StreamFilter::Jbig2Decode),
            "DCTDecode" | "DCT" => Some(StreamFilter::DctDecode),
            "JPXDecode" => Some(StreamFilter::JpxDecode),
            "Crypt" => Some(StreamFilter::Crypt),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StreamFilter::AsciiHexDecode => "ASCIIHexDecode",
            StreamFilter::Ascii85Decode => "ASCII85Decode",
            StreamFilter::LzwDecode(_) => "LZWDecode",
            StreamFilter::FlateDecode(_) => "FlateDecode",
            StreamFilter::RunLengthDecode => "RunLengthDecode",
            StreamFilter::CcittFaxDecode => "CCITTFaxDecode",
            StreamFilter::Jbig2Decode => "JBIG2Decode",
            StreamFilter::DctDecode => "DCTDecode",
            StreamFilter::JpxDecode => "JPXDecode",
            StreamFilter::Crypt => "Crypt",
        }
    }

    /// Whether the pipeline can invert this filter. Anything else passes
    /// through opaque; it is not an error.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            StreamFilter::AsciiHexDecode
                | StreamFilter::Ascii85Decode
                | StreamFilter::LzwDecode(_)
                | StreamFilter::FlateDecode(_)
                | StreamFilter::RunLengthDecode
        )
    }
}

/// Decode parameters shared by Flate and LZW: the optional predictor and
/// its geometry, plus LZW's EarlyChange switch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodecParams {
    pub predictor: Option<i32>,
    pub colors: Option<i32>,
    pub bits_per_component: Option<i32>,
    pub columns: Option<i32>,
    pub early_change: Option<bool>,
}

impl CodecParams {
    pub fn from_dict(params: Option<&PdfDictionary>) -> Self {
        let Some(params) = params else {
            return CodecParams::default();
        };
        CodecParams {
            predictor: params.get_integer("Predictor").map(|v| v as i32),
            colors: params.get_integer("Colors").map(|v| v as i32),
            bits_per_component: params.get_integer("BitsPerComponent").map(|v| v as i32),
            columns: params.get_integer("Columns").map(|v| v as i32),
            early_change: params.get("EarlyChange").and_then(|v| match v {
                PdfValue::Boolean(b) => Some(*b),
                PdfValue::Integer(i) => Some(*i != 0),
                _ => None,
            }),
        }
    }
}

impl PdfStream {
    pub fn new(dict: PdfDictionary, data: Vec<u8>) -> Self {
        PdfStream {
            dict,
            data: StreamData::Raw(data),
        }
    }

    pub fn new_decoded(dict: PdfDictionary, data: Vec<u8>) -> Self {
        PdfStream {
            dict,
            data: StreamData::Decoded(data),
        }
    }

    /// The filter chain named by `/Filter`, with `/DecodeParms` aligned
    /// positionally. Unknown filter names are skipped with their position.
    pub fn filters(&self) -> Vec<StreamFilter> {
        let filter_names: Vec<&PdfName> = match self.dict.get("Filter") {
            Some(PdfValue::Name(name)) => vec![name],
            Some(PdfValue::Array(array)) => array.iter().filter_map(|v| v.as_name()).collect(),
            _ => Vec::new(),
        };
        if filter_names.is_empty() {
            return Vec::new();
        }

        let mut decode_parms: Vec<Option<&PdfDictionary>> = match self.dict.get("DecodeParms") {
            Some(PdfValue::Dictionary(dict)) => vec![Some(dict)],
            Some(PdfValue::Array(array)) => array.iter().map(|v| v.as_dict()).collect(),
            _ => Vec::new(),
        };
        decode_parms.resize(filter_names.len(), None);

        filter_names
            .iter()
            .zip(decode_parms)
            .filter_map(|(name, parms)| StreamFilter::from_name(name, parms))
            .collect()
    }

    /// True when every filter in the chain is invertible, so the payload
    /// can be decoded and re-encoded without loss.
    pub fn has_supported_filters(&self) -> bool {
        self.filters().iter().all(|f| f.is_supported())
    }

    /// Plain payload bytes: decodes `Raw` data through the filter chain,
    /// returns `Decoded` data as-is.
    pub fn decoded_bytes(&self) -> Result<Vec<u8>, crate::filters::FilterError> {
        match &self.data {
            StreamData::Decoded(b) => Ok(b.clone()),
            StreamData::Raw(b) => {
                let filters = self.filters();
                if filters.is_empty() {
                    Ok(b.clone())
                } else {
                    crate::filters::decode_chain(b, &filters)
                }
            }
        }
    }
}

impl fmt::Display for PdfStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.data {
            StreamData::Raw(_) => "raw",
            StreamData::Decoded(_) => "decoded",
        };
        write!(f, "{} stream[{} bytes {}]", self.dict, self.data.len(), state)
    }
}
