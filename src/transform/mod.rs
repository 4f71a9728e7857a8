//! Document-level transformations on the validated object graph: merge,
//! split, trim, rotate, and page insertion/removal. All of them operate on
//! the arena, never on bytes.

pub mod selection;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::names;
use crate::pages;
use crate::types::{PdfDictionary, PdfReference, PdfValue};
use crate::xref::XRefEntry;
use log::warn;
use std::collections::HashMap;

/// Add `delta` (a multiple of 90) to each selected page's rotation.
pub fn rotate(doc: &mut Document, page_indices: &[usize], delta: i64) -> Result<()> {
    if delta % 90 != 0 {
        return Err(Error::InvalidRotation(delta));
    }
    let refs = doc.page_refs()?;

    for &index in page_indices {
        let page = *refs.get(index).ok_or(Error::PageIndexOutOfRange {
            index: index + 1,
            count: refs.len(),
        })?;
        let current = pages::inherited_attrs(doc, page)?.rotate;
        let rotated = (current + delta).rem_euclid(360);

        let mut dict = doc
            .deref(page)?
            .as_dict()
            .ok_or_else(|| Error::SchemaViolation {
                path: "Page".to_string(),
                reason: "page is not a dictionary".to_string(),
            })?
            .clone();
        if rotated == 0 {
            dict.remove("Rotate");
        } else {
            dict.insert("Rotate", PdfValue::Integer(rotated));
        }
        doc.set_object(page, PdfValue::Dictionary(dict));
    }
    Ok(())
}

/// Produce a document containing only the selected pages, in order. The
/// source is untouched; unselected pages become unreachable in the clone.
pub fn trim(doc: &Document, page_indices: &[usize]) -> Result<Document> {
    if page_indices.is_empty() {
        return Err(Error::InvalidPageSelection(
            "selection is empty".to_string(),
        ));
    }
    let mut out = doc.clone();
    let refs = out.page_refs()?;

    let mut kept = Vec::with_capacity(page_indices.len());
    for &index in page_indices {
        let page = *refs.get(index).ok_or(Error::PageIndexOutOfRange {
            index: index + 1,
            count: refs.len(),
        })?;
        kept.push(page);
    }

    // Leaves must carry their inherited attributes before the tree is
    // flattened underneath them.
    for &page in &kept {
        pages::flatten_inherited(&mut out, page)?;
    }
    for (index, &page) in refs.iter().enumerate() {
        if !page_indices.contains(&index) {
            out.xref.free(page.number);
        }
    }
    pages::rebuild_page_tree(&mut out, &kept)?;
    Ok(out)
}

/// Split into spans of `span` pages; the last document may be shorter.
pub fn split(doc: &Document, span: usize) -> Result<Vec<Document>> {
    if span == 0 {
        return Err(Error::InvalidSpan(span));
    }
    let count = doc.page_count()?;
    let mut out = Vec::new();
    let mut first = 0usize;
    while first < count {
        let last = (first + span).min(count);
        let indices: Vec<usize> = (first..last).collect();
        out.push(trim(doc, &indices)?);
        first = last;
    }
    Ok(out)
}

/// Remove the selected pages; at least one page must survive.
pub fn remove_pages(doc: &Document, page_indices: &[usize]) -> Result<Document> {
    let count = doc.page_count()?;
    let keep: Vec<usize> = (0..count).filter(|i| !page_indices.contains(i)).collect();
    if keep.is_empty() {
        return Err(Error::InvalidPageSelection(
            "removal would leave no pages".to_string(),
        ));
    }
    trim(doc, &keep)
}

/// Splice a blank page before each selected index, sharing the MediaBox
/// of its right neighbor.
pub fn insert_pages(doc: &mut Document, page_indices: &[usize]) -> Result<()> {
    let refs = doc.page_refs()?;
    for &index in page_indices {
        if index >= refs.len() {
            return Err(Error::PageIndexOutOfRange {
                index: index + 1,
                count: refs.len(),
            });
        }
    }

    for &page in &refs {
        pages::flatten_inherited(doc, page)?;
    }

    let mut leaves: Vec<PdfReference> = Vec::with_capacity(refs.len() + page_indices.len());
    for (index, &page) in refs.iter().enumerate() {
        if page_indices.contains(&index) {
            let media_box = pages::inherited_attrs(doc, page)?
                .media_box
                .unwrap_or_else(|| pages::media_box_for("A4").unwrap());
            let blank = pages::blank_page(doc, media_box);
            leaves.push(blank);
        }
        leaves.push(page);
    }
    pages::rebuild_page_tree(doc, &leaves)
}

/// Merge documents left to right: the first document's catalog wins, the
/// others' objects are renumbered into its free range and their page trees
/// spliced under its page tree root.
pub fn merge(mut docs: Vec<Document>) -> Result<Document> {
    if docs.is_empty() {
        return Err(Error::InvalidPageSelection("nothing to merge".to_string()));
    }
    let mut target = docs.remove(0);

    for source in docs {
        merge_into(&mut target, source)?;
    }
    Ok(target)
}

fn merge_into(target: &mut Document, source: Document) -> Result<()> {
    // Renumber every source object into the target's free range in one
    // sweep, generations reset to zero.
    let base = target.xref.size();
    let mut map: HashMap<u32, u32> = HashMap::new();
    let mut next = base;
    for (number, entry) in source.xref.iter() {
        if entry.is_in_use() {
            map.insert(number, next);
            next += 1;
        }
    }

    let source_pages_root = source.pages_root()?;
    let source_page_count = source.page_count()? as i64;
    let source_catalog = source.catalog()?.clone();

    for (number, entry) in source.xref.iter() {
        let Some(&mapped) = map.get(&number) else {
            continue;
        };
        let mut value = match entry.object() {
            Some(v) => v.clone(),
            None => continue,
        };
        renumber_references(&mut value, &map);
        target.xref.insert(
            mapped,
            XRefEntry::InUse {
                offset: 0,
                generation: 0,
                object: Some(value),
            },
        );
    }

    let mapped_pages_root = PdfReference::new(map[&source_pages_root.number], 0);

    // Splice the source page tree under the target root.
    let target_root = target.pages_root()?;
    let mut root_dict = target
        .deref(target_root)?
        .as_dict()
        .ok_or_else(|| Error::SchemaViolation {
            path: "Pages".to_string(),
            reason: "page tree root is not a dictionary".to_string(),
        })?
        .clone();
    let kids_value = root_dict.get("Kids").cloned().unwrap_or(PdfValue::Null);
    let mut kids = target
        .resolve_or_null(&kids_value)
        .as_array()
        .cloned()
        .unwrap_or_default();
    kids.push(PdfValue::Reference(mapped_pages_root));
    let count_value = root_dict.get("Count").cloned().unwrap_or(PdfValue::Null);
    let count = target.resolve_integer(&count_value).unwrap_or(0) + source_page_count;
    root_dict.insert("Kids", PdfValue::Array(kids));
    root_dict.insert("Count", PdfValue::Integer(count));
    target.set_object(target_root, PdfValue::Dictionary(root_dict));

    let mut spliced = target
        .deref(mapped_pages_root)?
        .as_dict()
        .ok_or_else(|| Error::SchemaViolation {
            path: "Pages".to_string(),
            reason: "spliced page tree root is not a dictionary".to_string(),
        })?
        .clone();
    spliced.insert("Parent", PdfValue::Reference(target_root));
    target.set_object(mapped_pages_root, PdfValue::Dictionary(spliced));

    merge_names(target, &source_catalog, &map)?;
    merge_acroform(target, &source_catalog, &map)?;
    Ok(())
}

fn renumber_references(value: &mut PdfValue, map: &HashMap<u32, u32>) {
    match value {
        PdfValue::Reference(r) => {
            if let Some(&mapped) = map.get(&r.number) {
                *r = PdfReference::new(mapped, 0);
            }
        }
        PdfValue::Array(arr) => {
            for v in arr.iter_mut() {
                renumber_references(v, map);
            }
        }
        PdfValue::Dictionary(dict) => {
            for (_, v) in dict.iter_mut() {
                renumber_references(v, map);
            }
        }
        PdfValue::Stream(stream) => {
            for (_, v) in stream.dict.iter_mut() {
                renumber_references(v, map);
            }
        }
        _ => {}
    }
}

/// Union the catalogs' `/Names` subtrees. The source catalog has already
/// been renumbered into the target numbering via `map`.
fn merge_names(
    target: &mut Document,
    source_catalog: &PdfDictionary,
    map: &HashMap<u32, u32>,
) -> Result<()> {
    let mut source_names = match source_catalog.get("Names") {
        Some(v) => v.clone(),
        None => return Ok(()),
    };
    renumber_references(&mut source_names, map);
    // The renumbered value may be a reference into the target table now.
    let source_names = target.resolve_or_null(&source_names).clone();
    let Some(source_names) = source_names.as_dict() else {
        return Ok(());
    };

    let catalog = target.catalog()?.clone();
    let mut target_names = catalog
        .get("Names")
        .map(|v| target.resolve_or_null(v).clone())
        .and_then(|v| v.as_dict().cloned())
        .unwrap_or_default();

    for (key, subtree) in source_names.iter() {
        let key = key.without_slash().to_string();
        match target_names.get(&key) {
            None => {
                let pairs = names::flatten(target, subtree)?;
                target_names.insert(key.as_str(), PdfValue::Dictionary(names::build(pairs)));
            }
            Some(existing) => {
                let existing = existing.clone();
                if target.resolve_dict(&existing).is_none() {
                    return Err(Error::DuplicateCatalogSlot(format!("Names.{}", key)));
                }
                let mut pairs = names::flatten(target, &existing)?;
                let incoming = names::flatten(target, subtree)?;
                pairs.extend(incoming);
                // build() keeps the first binding on key collisions; the
                // target's entries come first.
                target_names.insert(key.as_str(), PdfValue::Dictionary(names::build(pairs)));
            }
        }
    }

    let mut catalog = catalog;
    catalog.insert("Names", PdfValue::Dictionary(target_names));
    let root = target.root;
    target.set_object(root, PdfValue::Dictionary(catalog));
    Ok(())
}

/// Union AcroForm field arrays; the first document's form dictionary
/// provides everything else.
fn merge_acroform(
    target: &mut Document,
    source_catalog: &PdfDictionary,
    map: &HashMap<u32, u32>,
) -> Result<()> {
    let mut source_form = match source_catalog.get("AcroForm") {
        Some(v) => v.clone(),
        None => return Ok(()),
    };
    renumber_references(&mut source_form, map);
    let source_form = target.resolve_or_null(&source_form).clone();
    let Some(source_form) = source_form.as_dict() else {
        return Ok(());
    };
    let source_fields = source_form
        .get("Fields")
        .map(|v| target.resolve_or_null(v).clone())
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default();

    let catalog = target.catalog()?.clone();
    let merged_form = match catalog
        .get("AcroForm")
        .map(|v| target.resolve_or_null(v).clone())
        .and_then(|v| v.as_dict().cloned())
    {
        Some(mut existing) => {
            let mut fields = existing
                .get("Fields")
                .map(|v| target.resolve_or_null(v).clone())
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default();
            for field in source_fields.iter() {
                fields.push(field.clone());
            }
            existing.insert("Fields", PdfValue::Array(fields));
            existing
        }
        None => {
            if source_fields.is_empty() && source_form.is_empty() {
                return Ok(());
            }
            source_form.clone()
        }
    };

    if merged_form.contains_key("XFA") {
        warn!("merged AcroForm carries XFA; dynamic form behavior is not reconciled");
    }

    let mut catalog = catalog;
    catalog.insert("AcroForm", PdfValue::Dictionary(merged_form));
    let root = target.root;
    target.set_object(root, PdfValue::Dictionary(catalog));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DocumentBuilder;

    fn sample(pages: usize) -> Document {
        DocumentBuilder::new().pages(pages).build()
    }

    #[test]
    fn rotate_rejects_off_grid_delta() {
        let mut doc = sample(2);
        assert!(matches!(
            rotate(&mut doc, &[0], 45),
            Err(Error::InvalidRotation(45))
        ));
    }

    #[test]
    fn rotate_accumulates_mod_360() {
        let mut doc = sample(2);
        rotate(&mut doc, &[1], 90).unwrap();
        rotate(&mut doc, &[1], 90).unwrap();
        let page = doc.page_refs().unwrap()[1];
        let dict = doc.deref(page).unwrap().as_dict().unwrap();
        assert_eq!(dict.get_integer("Rotate"), Some(180));

        rotate(&mut doc, &[1], 180).unwrap();
        let dict = doc.deref(page).unwrap().as_dict().unwrap();
        // back to zero: the entry disappears
        assert_eq!(dict.get_integer("Rotate"), None);
    }

    #[test]
    fn trim_keeps_selected_in_order() {
        let doc = sample(5);
        let trimmed = trim(&doc, &[1, 3]).unwrap();
        assert_eq!(trimmed.page_count().unwrap(), 2);
        // source untouched
        assert_eq!(doc.page_count().unwrap(), 5);
    }

    #[test]
    fn split_spans() {
        let doc = sample(7);
        let parts = split(&doc, 3).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].page_count().unwrap(), 3);
        assert_eq!(parts[2].page_count().unwrap(), 1);
        assert!(matches!(split(&doc, 0), Err(Error::InvalidSpan(0))));
    }

    #[test]
    fn remove_requires_survivor() {
        let doc = sample(2);
        assert!(remove_pages(&doc, &[0, 1]).is_err());
        let kept = remove_pages(&doc, &[0]).unwrap();
        assert_eq!(kept.page_count().unwrap(), 1);
    }

    #[test]
    fn insert_blank_page_shares_neighbor_media_box() {
        let mut doc = sample(2);
        insert_pages(&mut doc, &[1]).unwrap();
        assert_eq!(doc.page_count().unwrap(), 3);

        let refs = doc.page_refs().unwrap();
        let blank = doc.deref(refs[1]).unwrap().as_dict().unwrap();
        let neighbor = doc.deref(refs[2]).unwrap().as_dict().unwrap();
        assert_eq!(blank.get_array("MediaBox"), neighbor.get_array("MediaBox"));
    }

    #[test]
    fn merge_orders_pages_and_keeps_first_catalog() {
        let a = sample(2);
        let b = sample(1);
        let c = sample(3);
        let a_root = a.root;

        let merged = merge(vec![a, b, c]).unwrap();
        assert_eq!(merged.page_count().unwrap(), 6);
        assert_eq!(merged.root, a_root);
    }
}
