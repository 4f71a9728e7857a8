//! Write-then-read invariants over the public API.

use pdfmill::api;
use pdfmill::builder::DocumentBuilder;
use pdfmill::config::{Configuration, Eol, ValidationMode};
use pdfmill::document::PdfVersion;
use pdfmill::types::PdfValue;
use pdfmill::xref::XRefEntry;

fn conf() -> Configuration {
    Configuration::default()
}

#[test]
fn single_page_document_roundtrips() {
    let doc = DocumentBuilder::new().pages(1).title("One").build();
    let bytes = api::write_bytes(&doc, &conf()).unwrap();
    assert!(bytes.starts_with(b"%PDF-1.4"));
    assert!(bytes.ends_with(b"%%EOF\n"));

    let reread = api::read_validated(&bytes[..], &conf()).unwrap();
    assert_eq!(reread.page_count().unwrap(), 1);
    let info = api::info(&reread).unwrap();
    assert_eq!(info.title.as_deref(), Some("One"));
}

#[test]
fn reparse_preserves_page_count_and_content() {
    let doc = DocumentBuilder::new().pages(5).build();
    let bytes = api::write_bytes(&doc, &conf()).unwrap();
    let reread = api::read_validated(&bytes[..], &conf()).unwrap();
    assert_eq!(reread.page_count().unwrap(), 5);

    // write(parse(write(doc))) is byte-stable once normalized.
    let second = api::write_bytes(&reread, &conf()).unwrap();
    let third_doc = api::read_validated(&second[..], &conf()).unwrap();
    let third = api::write_bytes(&third_doc, &conf()).unwrap();
    assert_eq!(second, third);
}

#[test]
fn content_streams_survive_filter_reapplication() {
    // Builder content is held decoded with a Flate filter; the writer
    // compresses, the reader must decompress back to the same text.
    let doc = DocumentBuilder::new().pages(2).build();
    let bytes = api::write_bytes(&doc, &conf()).unwrap();
    let reread = api::read(&bytes[..], &conf()).unwrap();

    let page = reread.page_refs().unwrap()[0];
    let page_dict = reread.deref(page).unwrap().as_dict().unwrap();
    let contents = page_dict.get("Contents").unwrap();
    let stream = reread.resolve_stream(contents).unwrap();
    let text = stream.decoded_bytes().unwrap();
    assert!(text.starts_with(b"BT /F1 12 Tf"));
}

#[test]
fn eol_variants_parse_back() {
    for eol in [Eol::Lf, Eol::Cr, Eol::CrLf] {
        let doc = DocumentBuilder::new().pages(2).build();
        let conf = Configuration {
            eol,
            ..Default::default()
        };
        let bytes = api::write_bytes(&doc, &conf).unwrap();
        let reread = api::read_validated(&bytes[..], &conf).unwrap();
        assert_eq!(reread.page_count().unwrap(), 2, "eol {:?}", eol);
    }
}

#[test]
fn xref_stream_output_parses_back() {
    let doc = DocumentBuilder::new()
        .pages(3)
        .version(PdfVersion::V1_5)
        .build();
    let conf = Configuration {
        write_xref_stream: true,
        ..Default::default()
    };
    let bytes = api::write_bytes(&doc, &conf).unwrap();
    let text = String::from_utf8_lossy(&bytes);
    // No classic table: the xref is carried by a stream object.
    assert!(!text.contains("\nxref\n"));
    assert!(text.contains("/Type /XRef"));

    let reread = api::read_validated(&bytes[..], &conf).unwrap();
    assert_eq!(reread.page_count().unwrap(), 3);
}

#[test]
fn xref_stream_falls_back_to_classic_below_1_5() {
    let doc = DocumentBuilder::new()
        .pages(1)
        .version(PdfVersion::V1_4)
        .build();
    let conf = Configuration {
        write_xref_stream: true,
        ..Default::default()
    };
    let bytes = api::write_bytes(&doc, &conf).unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("\nxref\n"));
    assert!(text.contains("trailer"));
}

#[test]
fn huge_object_number_is_accepted_and_written() {
    let mut doc = DocumentBuilder::new().pages(1).build();
    let huge = i32::MAX as u32;
    doc.xref.insert(
        huge,
        XRefEntry::InUse {
            offset: 0,
            generation: 0,
            object: Some(PdfValue::Integer(1234)),
        },
    );
    // Wire the huge object into the catalog so it survives the sweep.
    let mut catalog = doc.catalog().unwrap().clone();
    catalog.insert(
        "PieceInfo",
        PdfValue::Reference(pdfmill::types::PdfReference::new(huge, 0)),
    );
    let root = doc.root;
    doc.set_object(root, PdfValue::Dictionary(catalog));

    let bytes = api::write_bytes(&doc, &conf()).unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains(&format!("{} 0 obj", huge)));
    assert!(text.contains(&format!("{} 1", huge))); // its own xref subsection

    let reread = api::read(&bytes[..], &conf()).unwrap();
    let value = reread
        .deref(pdfmill::types::PdfReference::new(huge, 0))
        .unwrap();
    assert_eq!(value, &PdfValue::Integer(1234));
}

#[test]
fn optimize_then_write_still_validates() {
    let mut doc = DocumentBuilder::new().pages(4).build();
    doc.alloc_object(PdfValue::Integer(9)); // orphan
    api::optimize(&mut doc).unwrap();
    let bytes = api::write_bytes(&doc, &conf()).unwrap();
    let reread = api::read(&bytes[..], &conf()).unwrap();
    assert!(pdfmill::validate::validate(&reread, ValidationMode::Strict).is_ok());
    assert_eq!(reread.page_count().unwrap(), 4);
}

#[test]
fn full_process_pipeline() {
    let doc = DocumentBuilder::new().pages(2).build();
    let input = api::write_bytes(&doc, &conf()).unwrap();
    let mut output = Vec::new();
    api::process(&input[..], &mut output, &conf()).unwrap();
    let reread = api::read_validated(&output[..], &conf()).unwrap();
    assert_eq!(reread.page_count().unwrap(), 2);
}
