//! End-to-end page transformations through write/read cycles.

use pdfmill::api;
use pdfmill::builder::DocumentBuilder;
use pdfmill::config::Configuration;
use pdfmill::error::Error;

fn conf() -> Configuration {
    Configuration::default()
}

/// Page marker text from the content stream, for order assertions.
fn page_markers(doc: &pdfmill::Document) -> Vec<String> {
    doc.page_refs()
        .unwrap()
        .iter()
        .map(|&page| {
            let dict = doc.deref(page).unwrap().as_dict().unwrap();
            let contents = dict.get("Contents").unwrap();
            let payload = doc
                .resolve_stream(contents)
                .unwrap()
                .decoded_bytes()
                .unwrap();
            let text = String::from_utf8_lossy(&payload);
            let start = text.find('(').unwrap() + 1;
            let end = text.find(')').unwrap();
            text[start..end].to_string()
        })
        .collect()
}

#[test]
fn merge_preserves_order_and_first_catalog() {
    let a = DocumentBuilder::new().pages(2).title("A").build();
    let b = DocumentBuilder::new().pages(1).title("B").build();
    let c = DocumentBuilder::new().pages(3).title("C").build();

    let merged = api::merge(vec![a, b, c]).unwrap();
    assert_eq!(merged.page_count().unwrap(), 6);

    let markers = page_markers(&merged);
    assert_eq!(
        markers,
        vec![
            "Page 1 of 2",
            "Page 2 of 2",
            "Page 1 of 1",
            "Page 1 of 3",
            "Page 2 of 3",
            "Page 3 of 3",
        ]
    );

    // The first document's info (and catalog) wins.
    let info = api::info(&merged).unwrap();
    assert_eq!(info.title.as_deref(), Some("A"));

    // The merged graph still validates and survives a rewrite.
    let bytes = api::write_bytes(&merged, &conf()).unwrap();
    let reread = api::read_validated(&bytes[..], &conf()).unwrap();
    assert_eq!(reread.page_count().unwrap(), 6);
}

#[test]
fn merge_deduplicates_identical_fonts() {
    let a = DocumentBuilder::new().pages(1).build();
    let b = DocumentBuilder::new().pages(1).build();

    let mut merged = api::merge(vec![a, b]).unwrap();
    let before = merged.xref.in_use_numbers().len();
    api::optimize(&mut merged).unwrap();
    let after = merged.xref.in_use_numbers().len();
    // Both documents carried an identical Helvetica object; one is gone.
    assert!(after < before, "{} -> {}", before, after);

    let bytes = api::write_bytes(&merged, &conf()).unwrap();
    assert_eq!(
        String::from_utf8_lossy(&bytes).matches("/Helvetica").count(),
        1
    );
}

#[test]
fn split_by_span_of_three() {
    let doc = DocumentBuilder::new().pages(7).build();
    let parts = api::split(&doc, 3).unwrap();
    assert_eq!(parts.len(), 3);

    let sizes: Vec<usize> = parts.iter().map(|p| p.page_count().unwrap()).collect();
    assert_eq!(sizes, vec![3, 3, 1]);

    // Each part writes and validates on its own.
    for part in &parts {
        let bytes = api::write_bytes(part, &conf()).unwrap();
        api::read_validated(&bytes[..], &conf()).unwrap();
    }

    let last = &parts[2];
    assert_eq!(page_markers(last), vec!["Page 7 of 7"]);
}

#[test]
fn split_then_merge_restores_page_order() {
    let doc = DocumentBuilder::new().pages(4).build();
    let original = page_markers(&doc);

    let parts = api::split(&doc, 1).unwrap();
    assert_eq!(parts.len(), 4);
    let merged = api::merge(parts).unwrap();
    assert_eq!(merged.page_count().unwrap(), 4);
    assert_eq!(page_markers(&merged), original);
}

#[test]
fn rotate_selected_page_only() {
    let mut doc = DocumentBuilder::new().pages(4).build();

    // Page 2 starts at 90 degrees.
    api::rotate(&mut doc, "2", 90).unwrap();
    // The operation under test: another 90.
    api::rotate(&mut doc, "2", 90).unwrap();

    let bytes = api::write_bytes(&doc, &conf()).unwrap();
    let reread = api::read_validated(&bytes[..], &conf()).unwrap();
    let refs = reread.page_refs().unwrap();
    for (index, &page) in refs.iter().enumerate() {
        let rotate = reread
            .deref(page)
            .unwrap()
            .as_dict()
            .unwrap()
            .get_integer("Rotate");
        if index == 1 {
            assert_eq!(rotate, Some(180));
        } else {
            assert_eq!(rotate, None);
        }
    }
}

#[test]
fn rotate_identities() {
    let mut doc = DocumentBuilder::new().pages(2).build();
    let before = api::write_bytes(&doc, &conf()).unwrap();

    api::rotate(&mut doc, "1-", 0).unwrap();
    assert_eq!(api::write_bytes(&doc, &conf()).unwrap(), before);

    api::rotate(&mut doc, "1-", 360).unwrap();
    assert_eq!(api::write_bytes(&doc, &conf()).unwrap(), before);

    api::rotate(&mut doc, "1-", 90).unwrap();
    api::rotate(&mut doc, "1-", 270).unwrap();
    assert_eq!(api::write_bytes(&doc, &conf()).unwrap(), before);
}

#[test]
fn trim_roundtrip_validates() {
    let doc = DocumentBuilder::new().pages(5).build();
    let trimmed = api::trim(&doc, "2,4-5").unwrap();
    assert_eq!(trimmed.page_count().unwrap(), 3);
    assert_eq!(
        page_markers(&trimmed),
        vec!["Page 2 of 5", "Page 4 of 5", "Page 5 of 5"]
    );

    let bytes = api::write_bytes(&trimmed, &conf()).unwrap();
    let reread = api::read_validated(&bytes[..], &conf()).unwrap();
    assert_eq!(reread.page_count().unwrap(), 3);
}

#[test]
fn trimmed_output_drops_unselected_objects() {
    let doc = DocumentBuilder::new().pages(5).build();
    let trimmed = api::trim(&doc, "1").unwrap();
    let bytes = api::write_bytes(&trimmed, &conf()).unwrap();
    // Content streams of dropped pages must not be written.
    let reread = api::read(&bytes[..], &conf()).unwrap();
    let kept: usize = reread.xref.in_use_numbers().len();
    let full = api::write_bytes(&doc, &conf()).unwrap();
    let full_doc = api::read(&full[..], &conf()).unwrap();
    assert!(kept < full_doc.xref.in_use_numbers().len());
}

#[test]
fn insert_and_remove_pages_roundtrip() {
    let mut doc = DocumentBuilder::new().pages(3).build();
    api::insert_pages(&mut doc, "2").unwrap();
    assert_eq!(doc.page_count().unwrap(), 4);

    let bytes = api::write_bytes(&doc, &conf()).unwrap();
    let reread = api::read_validated(&bytes[..], &conf()).unwrap();
    assert_eq!(reread.page_count().unwrap(), 4);

    let removed = api::remove_pages(&reread, "2").unwrap();
    assert_eq!(removed.page_count().unwrap(), 3);
    assert_eq!(
        page_markers(&removed),
        vec!["Page 1 of 3", "Page 2 of 3", "Page 3 of 3"]
    );
}

#[test]
fn transformed_documents_keep_validating() {
    // Validator success must be preserved by every transformation.
    let doc = DocumentBuilder::new().pages(6).build();
    api::validate(&doc, &conf()).unwrap();

    let trimmed = api::trim(&doc, "even").unwrap();
    api::validate(&trimmed, &conf()).unwrap();

    let parts = api::split(&doc, 2).unwrap();
    for part in &parts {
        api::validate(part, &conf()).unwrap();
    }

    let merged = api::merge(parts).unwrap();
    api::validate(&merged, &conf()).unwrap();

    let mut rotated = doc.clone();
    api::rotate(&mut rotated, "odd", 270).unwrap();
    api::validate(&rotated, &conf()).unwrap();
}

#[test]
fn selection_errors_surface() {
    let doc = DocumentBuilder::new().pages(3).build();
    assert!(matches!(
        api::trim(&doc, "7"),
        Err(Error::PageIndexOutOfRange { index: 7, count: 3 })
    ));
    assert!(matches!(
        api::trim(&doc, "nonsense"),
        Err(Error::InvalidPageSelection(_))
    ));
}

#[test]
fn attachments_survive_write_cycles() {
    let mut doc = DocumentBuilder::new().pages(1).build();
    api::add_attachment(&mut doc, "readme.txt", b"hello attachment").unwrap();

    let bytes = api::write_bytes(&doc, &conf()).unwrap();
    let reread = api::read_validated(&bytes[..], &conf()).unwrap();
    assert_eq!(api::list_attachments(&reread).unwrap(), vec!["readme.txt"]);
    assert_eq!(
        api::extract_attachment(&reread, "readme.txt").unwrap(),
        b"hello attachment"
    );
}

#[test]
fn merge_unions_attachments() {
    let mut a = DocumentBuilder::new().pages(1).build();
    let mut b = DocumentBuilder::new().pages(1).build();
    api::add_attachment(&mut a, "a.txt", b"A").unwrap();
    api::add_attachment(&mut b, "b.txt", b"B").unwrap();

    let merged = api::merge(vec![a, b]).unwrap();
    let mut names = api::list_attachments(&merged).unwrap();
    names.sort();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
    assert_eq!(api::extract_attachment(&merged, "b.txt").unwrap(), b"B");
}

#[test]
fn blank_page_values_serialize() {
    let mut doc = DocumentBuilder::new().pages(1).build();
    api::insert_pages(&mut doc, "1").unwrap();
    let bytes = api::write_bytes(&doc, &conf()).unwrap();
    let reread = api::read_validated(&bytes[..], &conf()).unwrap();

    let first = reread.page_refs().unwrap()[0];
    let dict = reread.deref(first).unwrap().as_dict().unwrap();
    assert!(dict.get("Contents").is_none());
    assert!(dict.get_array("MediaBox").is_some());
}
