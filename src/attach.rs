//! Embedded-file attachments backed by the catalog's
//! `/Names` -> `/EmbeddedFiles` name tree.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::filters::encode_chain;
use crate::names;
use crate::types::{
    PdfDictionary, PdfName, PdfStream, PdfString, PdfValue, StreamFilter,
};
use log::info;

/// Names of all attached files, in tree order.
pub fn list(doc: &Document) -> Result<Vec<String>> {
    let pairs = attachment_pairs(doc)?;
    Ok(pairs
        .into_iter()
        .map(|(name, _)| String::from_utf8_lossy(&name).into_owned())
        .collect())
}

/// Attach `payload` under `name`, replacing an existing attachment of the
/// same name.
pub fn add(doc: &mut Document, name: &str, payload: &[u8]) -> Result<()> {
    let compressed = encode_chain(payload, &[StreamFilter::FlateDecode(Default::default())])?;

    let mut params = PdfDictionary::new();
    params.insert("Size", PdfValue::Integer(payload.len() as i64));

    let mut stream_dict = PdfDictionary::new();
    stream_dict.insert("Type", PdfValue::Name(PdfName::new("EmbeddedFile")));
    stream_dict.insert("Filter", PdfValue::Name(PdfName::new("FlateDecode")));
    stream_dict.insert("Params", PdfValue::Dictionary(params));
    let file_stream = doc.alloc_object(PdfValue::Stream(PdfStream::new(stream_dict, compressed)));

    let mut ef = PdfDictionary::new();
    ef.insert("F", PdfValue::Reference(file_stream));

    let mut filespec = PdfDictionary::new();
    filespec.insert("Type", PdfValue::Name(PdfName::new("Filespec")));
    filespec.insert("F", PdfValue::String(PdfString::from(name)));
    filespec.insert("UF", PdfValue::String(PdfString::from(name)));
    filespec.insert("EF", PdfValue::Dictionary(ef));
    let filespec_ref = doc.alloc_object(PdfValue::Dictionary(filespec));

    let mut pairs = attachment_pairs(doc).unwrap_or_default();
    pairs.retain(|(existing, _)| existing != name.as_bytes());
    pairs.push((name.as_bytes().to_vec(), PdfValue::Reference(filespec_ref)));
    set_attachment_pairs(doc, pairs)?;
    info!("attached {}", name);
    Ok(())
}

/// Remove the named attachments; unknown names are an error.
pub fn remove(doc: &mut Document, names_to_remove: &[&str]) -> Result<()> {
    let mut pairs = attachment_pairs(doc)?;
    for name in names_to_remove {
        let before = pairs.len();
        pairs.retain(|(existing, _)| existing != name.as_bytes());
        if pairs.len() == before {
            return Err(Error::AttachmentNotFound(name.to_string()));
        }
    }
    set_attachment_pairs(doc, pairs)
}

/// Decode the named attachment back to its plain bytes.
pub fn extract(doc: &Document, name: &str) -> Result<Vec<u8>> {
    let pairs = attachment_pairs(doc)?;
    let (_, filespec) = pairs
        .into_iter()
        .find(|(existing, _)| existing == name.as_bytes())
        .ok_or_else(|| Error::AttachmentNotFound(name.to_string()))?;

    let filespec = doc
        .resolve_dict(&filespec)
        .ok_or_else(|| Error::AttachmentNotFound(name.to_string()))?;
    let ef = filespec
        .get("EF")
        .map(|v| doc.resolve_or_null(v))
        .and_then(|v| v.as_dict())
        .ok_or_else(|| Error::SchemaViolation {
            path: "Filespec.EF".to_string(),
            reason: "missing embedded file dictionary".to_string(),
        })?;
    let stream = ef
        .get("F")
        .map(|v| doc.resolve_or_null(v))
        .and_then(|v| v.as_stream())
        .ok_or_else(|| Error::SchemaViolation {
            path: "Filespec.EF.F".to_string(),
            reason: "missing embedded file stream".to_string(),
        })?;

    Ok(stream.decoded_bytes()?)
}

fn attachment_pairs(doc: &Document) -> Result<Vec<(Vec<u8>, PdfValue)>> {
    let catalog = doc.catalog()?;
    let Some(tree) = catalog
        .get("Names")
        .map(|v| doc.resolve_or_null(v))
        .and_then(|v| v.as_dict())
        .and_then(|names| names.get("EmbeddedFiles"))
    else {
        return Ok(Vec::new());
    };
    names::flatten(doc, tree)
}

fn set_attachment_pairs(doc: &mut Document, pairs: Vec<(Vec<u8>, PdfValue)>) -> Result<()> {
    let mut catalog = doc.catalog()?.clone();
    let mut names_dict = catalog
        .get("Names")
        .map(|v| doc.resolve_or_null(v).clone())
        .and_then(|v| v.as_dict().cloned())
        .unwrap_or_default();

    if pairs.is_empty() {
        names_dict.remove("EmbeddedFiles");
    } else {
        names_dict.insert("EmbeddedFiles", PdfValue::Dictionary(names::build(pairs)));
    }

    if names_dict.is_empty() {
        catalog.remove("Names");
    } else {
        catalog.insert("Names", PdfValue::Dictionary(names_dict));
    }
    let root = doc.root;
    doc.set_object(root, PdfValue::Dictionary(catalog));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DocumentBuilder;

    #[test]
    fn add_list_extract_remove_roundtrip() {
        let mut doc = DocumentBuilder::new().pages(1).build();
        assert!(list(&doc).unwrap().is_empty());

        add(&mut doc, "notes.txt", b"attachment payload").unwrap();
        add(&mut doc, "data.bin", &[0u8, 1, 2, 0xFF]).unwrap();

        let mut names = list(&doc).unwrap();
        names.sort();
        assert_eq!(names, vec!["data.bin", "notes.txt"]);

        assert_eq!(extract(&doc, "notes.txt").unwrap(), b"attachment payload");
        assert_eq!(extract(&doc, "data.bin").unwrap(), vec![0u8, 1, 2, 0xFF]);

        remove(&mut doc, &["notes.txt"]).unwrap();
        assert_eq!(list(&doc).unwrap(), vec!["data.bin"]);
        assert!(matches!(
            extract(&doc, "notes.txt"),
            Err(Error::AttachmentNotFound(_))
        ));
    }

    #[test]
    fn add_replaces_same_name() {
        let mut doc = DocumentBuilder::new().build();
        add(&mut doc, "a.txt", b"one").unwrap();
        add(&mut doc, "a.txt", b"two").unwrap();
        assert_eq!(list(&doc).unwrap().len(), 1);
        assert_eq!(extract(&doc, "a.txt").unwrap(), b"two");
    }

    #[test]
    fn remove_unknown_fails() {
        let mut doc = DocumentBuilder::new().build();
        assert!(matches!(
            remove(&mut doc, &["ghost"]),
            Err(Error::AttachmentNotFound(_))
        ));
    }
}
