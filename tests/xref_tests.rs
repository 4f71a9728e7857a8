//! Cross-reference loading: classic tables, xref streams, hybrid
//! precedence, object streams, and the relaxed-mode repair scan.

use pdfmill::api;
use pdfmill::builder::DocumentBuilder;
use pdfmill::config::{Configuration, ValidationMode};
use pdfmill::error::Error;

fn relaxed() -> Configuration {
    Configuration::default()
}

fn strict() -> Configuration {
    Configuration::with_mode(ValidationMode::Strict)
}

/// Incrementally assembled PDF file tracking object offsets.
struct FileAssembler {
    buf: Vec<u8>,
}

impl FileAssembler {
    fn new(version: &str) -> Self {
        FileAssembler {
            buf: format!("%PDF-{}\n", version).into_bytes(),
        }
    }

    fn offset(&self) -> usize {
        self.buf.len()
    }

    fn push(&mut self, text: &str) -> usize {
        let at = self.buf.len();
        self.buf.extend_from_slice(text.as_bytes());
        at
    }

    fn push_stream_object(&mut self, number: u32, dict_body: &str, payload: &[u8]) -> usize {
        let at = self.buf.len();
        let header = format!(
            "{} 0 obj\n<<{} /Length {}>>\nstream\n",
            number,
            dict_body,
            payload.len()
        );
        self.buf.extend_from_slice(header.as_bytes());
        self.buf.extend_from_slice(payload);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        at
    }
}

/// Pack xref-stream records with W [1 2 2].
fn records_122(entries: &[(u8, u64, u16)]) -> Vec<u8> {
    let mut out = Vec::new();
    for &(kind, f2, f3) in entries {
        out.push(kind);
        out.extend_from_slice(&(f2 as u16).to_be_bytes());
        out.extend_from_slice(&f3.to_be_bytes());
    }
    out
}

#[test]
fn classic_table_loads() {
    let mut f = FileAssembler::new("1.4");
    let o1 = f.push("1 0 obj\n<</Type /Catalog /Pages 2 0 R>>\nendobj\n");
    let o2 = f.push("2 0 obj\n<</Type /Pages /Kids [3 0 R] /Count 1>>\nendobj\n");
    let o3 = f.push(
        "3 0 obj\n<</Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources <<>>>>\nendobj\n",
    );
    let xref = f.offset();
    f.push(&format!(
        "xref\n0 4\n0000000000 65535 f \n{:010} 00000 n \n{:010} 00000 n \n{:010} 00000 n \ntrailer\n<</Size 4 /Root 1 0 R>>\nstartxref\n{}\n%%EOF\n",
        o1, o2, o3, xref
    ));

    let doc = api::read_validated(&f.buf[..], &strict()).unwrap();
    assert_eq!(doc.page_count().unwrap(), 1);
}

#[test]
fn prev_chain_newest_entry_wins() {
    let mut f = FileAssembler::new("1.4");
    let o1 = f.push("1 0 obj\n<</Type /Catalog /Pages 2 0 R>>\nendobj\n");
    let o2 = f.push("2 0 obj\n<</Type /Pages /Kids [3 0 R] /Count 1>>\nendobj\n");
    let o3_old = f.push(
        "3 0 obj\n<</Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources <<>>>>\nendobj\n",
    );
    // First (older) xref section.
    let xref1 = f.offset();
    f.push(&format!(
        "xref\n0 4\n0000000000 65535 f \n{:010} 00000 n \n{:010} 00000 n \n{:010} 00000 n \ntrailer\n<</Size 4 /Root 1 0 R>>\n",
        o1, o2, o3_old
    ));
    // Incremental update redefines page 3 with a different MediaBox.
    let o3_new = f.push(
        "3 0 obj\n<</Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Resources <<>>>>\nendobj\n",
    );
    let xref2 = f.offset();
    f.push(&format!(
        "xref\n3 1\n{:010} 00000 n \ntrailer\n<</Size 4 /Root 1 0 R /Prev {}>>\nstartxref\n{}\n%%EOF\n",
        o3_new, xref1, xref2
    ));

    let doc = api::read_validated(&f.buf[..], &relaxed()).unwrap();
    let page = doc.page_refs().unwrap()[0];
    let media = doc
        .deref(page)
        .unwrap()
        .as_dict()
        .unwrap()
        .get_array("MediaBox")
        .unwrap();
    assert_eq!(media[2].as_real(), Some(200.0));
}

#[test]
fn hybrid_xref_stream_entries_override_classic() {
    let mut f = FileAssembler::new("1.5");
    let o1 = f.push("1 0 obj\n<</Type /Catalog /Pages 2 0 R>>\nendobj\n");
    let o2 = f.push("2 0 obj\n<</Type /Pages /Kids [3 0 R] /Count 1>>\nendobj\n");
    let o3_classic = f.push(
        "3 0 obj\n<</Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources <<>>>>\nendobj\n",
    );
    let o3_stream = f.push(
        "3 0 obj\n<</Type /Page /Parent 2 0 R /MediaBox [0 0 100 100] /Resources <<>>>>\nendobj\n",
    );

    // The hybrid xref stream redirects object 3.
    let records = records_122(&[(1, o3_stream as u64, 0)]);
    let o4 = f.push_stream_object(
        4,
        "/Type /XRef /Size 5 /W [1 2 2] /Index [3 1]",
        &records,
    );

    let xref = f.offset();
    f.push(&format!(
        "xref\n0 4\n0000000000 65535 f \n{:010} 00000 n \n{:010} 00000 n \n{:010} 00000 n \ntrailer\n<</Size 5 /Root 1 0 R /XRefStm {}>>\nstartxref\n{}\n%%EOF\n",
        o1, o2, o3_classic, o4, xref
    ));

    let doc = api::read_validated(&f.buf[..], &relaxed()).unwrap();
    let page = doc.page_refs().unwrap()[0];
    let media = doc
        .deref(page)
        .unwrap()
        .as_dict()
        .unwrap()
        .get_array("MediaBox")
        .unwrap();
    assert_eq!(media[2].as_real(), Some(100.0));
}

#[test]
fn objects_inside_object_stream_materialize() {
    let mut f = FileAssembler::new("1.5");

    // Three objects packed into one object stream.
    let packed = [
        "<</Type /Catalog /Pages 2 0 R>>",
        "<</Type /Pages /Kids [3 0 R] /Count 1>>",
        "<</Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources <<>>>>",
    ];
    let mut body = String::new();
    let mut header = String::new();
    for (i, obj) in packed.iter().enumerate() {
        if i > 0 {
            header.push(' ');
        }
        header.push_str(&format!("{} {}", i + 1, body.len()));
        body.push_str(obj);
        body.push(' ');
    }
    let first = header.len() + 1;
    let payload = format!("{}\n{}", header, body);

    let o4 = f.push_stream_object(
        4,
        &format!("/Type /ObjStm /N 3 /First {}", first),
        payload.as_bytes(),
    );

    let records = records_122(&[
        (0, 0, 65535),
        (2, 4, 0), // object 1 in stream 4 index 0
        (2, 4, 1),
        (2, 4, 2),
        (1, o4 as u64, 0),
    ]);
    // The xref stream describes itself as entry 5.
    let xref = f.offset();
    let records_all = {
        let mut r = records.clone();
        r.extend_from_slice(&records_122(&[(1, xref as u64, 0)]));
        r
    };
    f.push_stream_object(
        5,
        "/Type /XRef /Size 6 /W [1 2 2] /Root 1 0 R",
        &records_all,
    );
    f.push(&format!("startxref\n{}\n%%EOF\n", xref));

    let doc = api::read_validated(&f.buf[..], &relaxed()).unwrap();
    assert_eq!(doc.page_count().unwrap(), 1);
    assert!(doc.catalog().unwrap().is_type("Catalog"));

    // Round trip: the compressed objects come back inline.
    let bytes = api::write_bytes(&doc, &relaxed()).unwrap();
    let reread = api::read_validated(&bytes[..], &relaxed()).unwrap();
    assert_eq!(reread.page_count().unwrap(), 1);
}

#[test]
fn truncated_tail_is_repaired_in_relaxed_mode() {
    let doc = DocumentBuilder::new().pages(3).build();
    let bytes = api::write_bytes(&doc, &relaxed()).unwrap();
    let truncated = &bytes[..bytes.len() - 200];

    let repaired = api::read_validated(truncated, &relaxed()).unwrap();
    assert_eq!(repaired.page_count().unwrap(), 3);

    match api::read(truncated, &strict()) {
        Err(Error::CorruptXref(_)) => {}
        other => panic!("expected CorruptXref, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn garbage_before_header_is_tolerated() {
    let doc = DocumentBuilder::new().pages(1).build();
    let bytes = api::write_bytes(&doc, &relaxed()).unwrap();

    // Junk before %PDF shifts every stored offset; the repair scan
    // recovers the objects anyway.
    let mut shifted = b"GARBAGE".to_vec();
    shifted.extend_from_slice(&bytes);
    let reread = api::read_validated(&shifted[..], &relaxed()).unwrap();
    assert_eq!(reread.page_count().unwrap(), 1);
}

#[test]
fn missing_header_is_fatal() {
    assert!(matches!(
        api::read(&b"no pdf at all"[..], &relaxed()),
        Err(Error::CorruptXref(_))
    ));
}

#[test]
fn dangling_reference_reported_on_deref() {
    let mut f = FileAssembler::new("1.4");
    let o1 = f.push("1 0 obj\n<</Type /Catalog /Pages 9 0 R>>\nendobj\n");
    let xref = f.offset();
    f.push(&format!(
        "xref\n0 2\n0000000000 65535 f \n{:010} 00000 n \ntrailer\n<</Size 2 /Root 1 0 R>>\nstartxref\n{}\n%%EOF\n",
        o1, xref
    ));

    let doc = api::read(&f.buf[..], &relaxed()).unwrap();
    assert!(matches!(
        doc.deref(pdfmill::types::PdfReference::new(9, 0)),
        Err(Error::DanglingReference(9, 0))
    ));
}
