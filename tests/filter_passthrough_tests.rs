//! Stream-filter behavior at the document level: chained supported
//! filters decode transparently, unsupported filters pass through with
//! their payload bytes untouched.

use pdfmill::api;
use pdfmill::builder::DocumentBuilder;
use pdfmill::config::Configuration;
use pdfmill::filters::encode_chain;
use pdfmill::types::{
    PdfArray, PdfDictionary, PdfName, PdfStream, PdfValue, StreamFilter,
};

fn conf() -> Configuration {
    Configuration::default()
}

/// Attach a stream object to the catalog so it survives the reachability
/// sweep.
fn adopt_stream(doc: &mut pdfmill::Document, stream: PdfStream) -> pdfmill::types::PdfReference {
    let r = doc.alloc_object(PdfValue::Stream(stream));
    let mut catalog = doc.catalog().unwrap().clone();
    catalog.insert("PieceInfo", PdfValue::Reference(r));
    let root = doc.root;
    doc.set_object(root, PdfValue::Dictionary(catalog));
    r
}

#[test]
fn chained_filters_decode_through_the_document() {
    let payload = b"chained filter payload, repeated: chained filter payload".to_vec();
    let filters = [
        StreamFilter::Ascii85Decode,
        StreamFilter::FlateDecode(Default::default()),
    ];
    let encoded = encode_chain(&payload, &filters).unwrap();

    let mut dict = PdfDictionary::new();
    let mut names = PdfArray::new();
    names.push(PdfValue::Name(PdfName::new("ASCII85Decode")));
    names.push(PdfValue::Name(PdfName::new("FlateDecode")));
    dict.insert("Filter", PdfValue::Array(names));

    let mut doc = DocumentBuilder::new().pages(1).build();
    let r = adopt_stream(&mut doc, PdfStream::new(dict, encoded));

    let bytes = api::write_bytes(&doc, &conf()).unwrap();
    let reread = api::read(&bytes[..], &conf()).unwrap();
    let stream = reread.deref(r).unwrap().as_stream().unwrap();
    assert_eq!(stream.decoded_bytes().unwrap(), payload);
}

#[test]
fn unsupported_filter_payload_is_preserved_verbatim() {
    // A fake DCT payload: not decodable, must round-trip untouched.
    let payload: Vec<u8> = (0..=255u8).collect();
    let mut dict = PdfDictionary::new();
    dict.insert("Filter", PdfValue::Name(PdfName::new("DCTDecode")));

    let mut doc = DocumentBuilder::new().pages(1).build();
    let r = adopt_stream(&mut doc, PdfStream::new(dict, payload.clone()));

    let bytes = api::write_bytes(&doc, &conf()).unwrap();
    let reread = api::read(&bytes[..], &conf()).unwrap();
    let stream = reread.deref(r).unwrap().as_stream().unwrap();
    assert!(!stream.has_supported_filters());
    assert_eq!(stream.data.bytes(), payload.as_slice());

    // A second cycle stays byte-identical too.
    let again = api::write_bytes(&reread, &conf()).unwrap();
    let third = api::read(&again[..], &conf()).unwrap();
    let stream = third.deref(r).unwrap().as_stream().unwrap();
    assert_eq!(stream.data.bytes(), payload.as_slice());
}

#[test]
fn lzw_stream_with_predictor_decodes() {
    use pdfmill::types::CodecParams;

    let rows: Vec<u8> = (0..64u8).collect();
    let params = CodecParams {
        predictor: Some(12),
        columns: Some(8),
        ..Default::default()
    };
    let filter = StreamFilter::LzwDecode(params);
    let encoded = encode_chain(&rows, &[filter]).unwrap();

    let mut parms = PdfDictionary::new();
    parms.insert("Predictor", PdfValue::Integer(12));
    parms.insert("Columns", PdfValue::Integer(8));
    let mut dict = PdfDictionary::new();
    dict.insert("Filter", PdfValue::Name(PdfName::new("LZWDecode")));
    dict.insert("DecodeParms", PdfValue::Dictionary(parms));

    let mut doc = DocumentBuilder::new().pages(1).build();
    let r = adopt_stream(&mut doc, PdfStream::new(dict, encoded));

    let bytes = api::write_bytes(&doc, &conf()).unwrap();
    let reread = api::read(&bytes[..], &conf()).unwrap();
    let stream = reread.deref(r).unwrap().as_stream().unwrap();
    assert_eq!(stream.decoded_bytes().unwrap(), rows);
}
