//! Graph optimization: resource deduplication, unreachable-object
//! collection, and free-list threading. Object numbers are never
//! renumbered; the optimized set of `(n, g) -> content` pairs is always a
//! subset of the input's.

use crate::document::Document;
use crate::error::Result;
use crate::types::{PdfDictionary, PdfReference, PdfValue};
use crate::writer::serialize::serialize_dict;
use log::debug;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Run all three passes. A second run is a no-op: dedup leaves a single
/// canonical object per digest and the sweep is idempotent.
pub fn optimize(doc: &mut Document) -> Result<()> {
    dedup_resources(doc)?;
    collect_unreachable(doc);
    doc.xref.thread_free_list();
    Ok(())
}

/// Object numbers reachable from the catalog, the info dictionary and the
/// encryption dictionary, in ascending order. Dangling references are
/// skipped, matching their null semantics.
pub fn reachable(doc: &Document) -> BTreeSet<u32> {
    let mut marked = BTreeSet::new();
    let mut stack: Vec<u32> = vec![doc.root.number];
    if let Some(info) = doc.info {
        stack.push(info.number);
    }
    if let Some(encrypt) = doc.encrypt_ref {
        stack.push(encrypt.number);
    }

    while let Some(number) = stack.pop() {
        if !marked.insert(number) {
            continue;
        }
        let Some(entry) = doc.xref.get(number) else {
            continue;
        };
        if let Some(value) = entry.object() {
            collect_references(value, &mut stack);
        }
    }

    marked.retain(|&n| doc.xref.get(n).map(|e| e.is_in_use()).unwrap_or(false));
    marked
}

fn collect_references(value: &PdfValue, out: &mut Vec<u32>) {
    match value {
        PdfValue::Reference(r) => out.push(r.number),
        PdfValue::Array(arr) => {
            for v in arr.iter() {
                collect_references(v, out);
            }
        }
        PdfValue::Dictionary(dict) => {
            for (_, v) in dict.iter() {
                collect_references(v, out);
            }
        }
        PdfValue::Stream(stream) => {
            for (_, v) in stream.dict.iter() {
                collect_references(v, out);
            }
        }
        _ => {}
    }
}

/// Pass 2: mark-and-sweep. Unmarked in-use entries become free.
fn collect_unreachable(doc: &mut Document) {
    let marked = reachable(doc);
    let all: Vec<u32> = doc.xref.in_use_numbers();
    let mut freed = 0usize;
    for number in all {
        if !marked.contains(&number) {
            doc.xref.free(number);
            freed += 1;
        }
    }
    if freed > 0 {
        debug!("collected {} unreachable objects", freed);
    }
}

/// Pass 1: within each page's resource dictionary, font and image XObject
/// references whose underlying content hashes identically are merged onto
/// the lowest object number; every referrer in the document is rewritten.
fn dedup_resources(doc: &mut Document) -> Result<()> {
    let pages = match doc.page_refs() {
        Ok(pages) => pages,
        Err(_) => return Ok(()), // nothing to dedup without a page tree
    };

    // digest -> canonical object number (lowest wins)
    let mut canonical: HashMap<[u8; 32], u32> = HashMap::new();
    // displaced object number -> canonical replacement
    let mut remap: HashMap<u32, PdfReference> = HashMap::new();

    let mut candidates: Vec<PdfReference> = Vec::new();
    for page in &pages {
        let Some(resources) = doc
            .deref(*page)
            .ok()
            .and_then(|v| v.as_dict())
            .and_then(|d| d.get("Resources"))
            .map(|v| doc.resolve_or_null(v))
            .and_then(|v| v.as_dict())
        else {
            continue;
        };
        for category in ["Font", "XObject"] {
            let Some(group) = resources
                .get(category)
                .map(|v| doc.resolve_or_null(v))
                .and_then(|v| v.as_dict())
            else {
                continue;
            };
            for (_, value) in group.iter() {
                if let Some(r) = value.as_reference() {
                    candidates.push(r);
                }
            }
        }
    }

    // Sort so the lowest object number becomes the canonical one.
    candidates.sort();
    candidates.dedup();

    let mut seen: HashSet<u32> = HashSet::new();
    for reference in candidates {
        if !seen.insert(reference.number) {
            continue;
        }
        let Some(digest) = content_digest(doc, reference) else {
            continue;
        };
        match canonical.get(&digest) {
            None => {
                canonical.insert(digest, reference.number);
            }
            Some(&winner) if winner != reference.number => {
                let target = PdfReference::new(
                    winner,
                    doc.xref.get(winner).map(|e| e.generation()).unwrap_or(0),
                );
                remap.insert(reference.number, target);
            }
            Some(_) => {}
        }
    }

    if remap.is_empty() {
        return Ok(());
    }
    debug!("deduplicating {} resource objects", remap.len());

    // One sweep rewriting every referrer, then the displaced slots go
    // free; the subsequent sweep pass reclaims anything they dragged in.
    let numbers = doc.xref.in_use_numbers();
    for number in numbers {
        if let Some(value) = doc.xref.object_mut(number) {
            rewrite_references(value, &remap);
        }
    }
    for &displaced in remap.keys() {
        doc.xref.free(displaced);
    }
    Ok(())
}

fn rewrite_references(value: &mut PdfValue, remap: &HashMap<u32, PdfReference>) {
    match value {
        PdfValue::Reference(r) => {
            if let Some(target) = remap.get(&r.number) {
                *r = *target;
            }
        }
        PdfValue::Array(arr) => {
            for v in arr.iter_mut() {
                rewrite_references(v, remap);
            }
        }
        PdfValue::Dictionary(dict) => {
            for (_, v) in dict.iter_mut() {
                rewrite_references(v, remap);
            }
        }
        PdfValue::Stream(stream) => {
            for (_, v) in stream.dict.iter_mut() {
                rewrite_references(v, remap);
            }
        }
        _ => {}
    }
}

/// SHA-256 over the filter-decoded payload plus the canonicalized
/// dictionary with volatile entries dropped. Objects whose payload cannot
/// be decoded hash over the raw bytes instead.
fn content_digest(doc: &Document, reference: PdfReference) -> Option<[u8; 32]> {
    let value = doc.deref(reference).ok()?;
    let mut hasher = Sha256::new();

    match value {
        PdfValue::Stream(stream) => {
            let mut dict = stream.dict.clone();
            dict.remove("Length");
            hasher.update(canonical_dict_bytes(&dict));
            match stream.decoded_bytes() {
                Ok(plain) => hasher.update(&plain),
                Err(_) => hasher.update(stream.data.bytes()),
            }
        }
        PdfValue::Dictionary(dict) => {
            hasher.update(canonical_dict_bytes(dict));
        }
        _ => return None,
    }

    Some(hasher.finalize().into())
}

/// Serialized dictionary with keys sorted, so insertion order does not
/// defeat deduplication.
fn canonical_dict_bytes(dict: &PdfDictionary) -> Vec<u8> {
    let mut sorted: Vec<(&crate::types::PdfName, &PdfValue)> = dict.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let canonical: PdfDictionary = sorted
        .into_iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let mut out = Vec::new();
    serialize_dict(&mut out, &canonical);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PdfVersion;
    use crate::types::{PdfArray, PdfName};

    fn doc_with_pages() -> Document {
        let mut doc = Document::new(PdfVersion::V1_4, PdfReference::new(0, 0));

        let pages_root = doc.alloc_object(PdfValue::Null);
        let page = {
            let mut dict = PdfDictionary::new();
            dict.insert("Type", PdfValue::Name(PdfName::new("Page")));
            dict.insert("Parent", PdfValue::Reference(pages_root));
            doc.alloc_object(PdfValue::Dictionary(dict))
        };

        let mut kids = PdfArray::new();
        kids.push(PdfValue::Reference(page));
        let mut root_dict = PdfDictionary::new();
        root_dict.insert("Type", PdfValue::Name(PdfName::new("Pages")));
        root_dict.insert("Kids", PdfValue::Array(kids));
        root_dict.insert("Count", PdfValue::Integer(1));
        doc.set_object(pages_root, PdfValue::Dictionary(root_dict));

        let mut catalog = PdfDictionary::new();
        catalog.insert("Type", PdfValue::Name(PdfName::new("Catalog")));
        catalog.insert("Pages", PdfValue::Reference(pages_root));
        let root = doc.alloc_object(PdfValue::Dictionary(catalog));
        doc.root = root;
        doc
    }

    fn font_dict(name: &str) -> PdfDictionary {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfValue::Name(PdfName::new("Font")));
        dict.insert("Subtype", PdfValue::Name(PdfName::new("Type1")));
        dict.insert("BaseFont", PdfValue::Name(PdfName::new(name)));
        dict
    }

    #[test]
    fn sweep_frees_unreachable() {
        let mut doc = doc_with_pages();
        let orphan = doc.alloc_object(PdfValue::Integer(42));
        optimize(&mut doc).unwrap();
        assert!(doc.xref.get(orphan.number).unwrap().is_free());
        assert!(doc.xref.get(doc.root.number).unwrap().is_in_use());
    }

    #[test]
    fn identical_fonts_merge_to_lowest_number() {
        let mut doc = doc_with_pages();
        let page = doc.page_refs().unwrap()[0];

        let font_a = doc.alloc_object(PdfValue::Dictionary(font_dict("Helvetica")));
        let font_b = doc.alloc_object(PdfValue::Dictionary(font_dict("Helvetica")));
        assert!(font_a.number < font_b.number);

        let mut fonts = PdfDictionary::new();
        fonts.insert("F1", PdfValue::Reference(font_a));
        fonts.insert("F2", PdfValue::Reference(font_b));
        let mut resources = PdfDictionary::new();
        resources.insert("Font", PdfValue::Dictionary(fonts));

        let mut page_dict = doc.deref(page).unwrap().as_dict().unwrap().clone();
        page_dict.insert("Resources", PdfValue::Dictionary(resources));
        doc.set_object(page, PdfValue::Dictionary(page_dict));

        optimize(&mut doc).unwrap();

        assert!(doc.xref.get(font_a.number).unwrap().is_in_use());
        assert!(doc.xref.get(font_b.number).unwrap().is_free());

        let page_dict = doc.deref(page).unwrap().as_dict().unwrap();
        let fonts = page_dict.get_dict("Resources").unwrap().get_dict("Font").unwrap();
        assert_eq!(fonts.get_reference("F1"), Some(font_a));
        assert_eq!(fonts.get_reference("F2"), Some(font_a));
    }

    #[test]
    fn double_optimize_is_fixed_point() {
        let mut doc = doc_with_pages();
        doc.alloc_object(PdfValue::Integer(1));
        optimize(&mut doc).unwrap();
        let snapshot = format!("{:?}", doc.xref);
        optimize(&mut doc).unwrap();
        assert_eq!(format!("{:?}", doc.xref), snapshot);
    }
}
