//! Name-tree access: flattening a `/Names`/`/Kids` tree to its pairs and
//! rebuilding a single balanced-enough node from a pair list. Rebuilt
//! trees are a single leaf node, which every conforming reader accepts.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::types::{PdfArray, PdfDictionary, PdfString, PdfValue};
use std::collections::HashSet;

/// Flatten a name tree rooted at `node` into `(key, value)` pairs in
/// tree order.
pub fn flatten(doc: &Document, node: &PdfValue) -> Result<Vec<(Vec<u8>, PdfValue)>> {
    let mut pairs = Vec::new();
    let mut visited = HashSet::new();
    walk(doc, node, &mut pairs, &mut visited)?;
    Ok(pairs)
}

fn walk(
    doc: &Document,
    node: &PdfValue,
    pairs: &mut Vec<(Vec<u8>, PdfValue)>,
    visited: &mut HashSet<u32>,
) -> Result<()> {
    if let Some(r) = node.as_reference() {
        if !visited.insert(r.number) {
            return Err(Error::SchemaViolation {
                path: "Names".to_string(),
                reason: format!("name tree cycle through object {}", r.number),
            });
        }
    }
    let dict = doc
        .resolve_dict(node)
        .ok_or_else(|| Error::SchemaViolation {
            path: "Names".to_string(),
            reason: "name tree node is not a dictionary".to_string(),
        })?;

    if let Some(kids) = dict.get("Kids").map(|v| doc.resolve_or_null(v)) {
        let kids = kids.as_array().ok_or_else(|| Error::SchemaViolation {
            path: "Names.Kids".to_string(),
            reason: "kids is not an array".to_string(),
        })?;
        for kid in kids.iter() {
            walk(doc, kid, pairs, visited)?;
        }
        return Ok(());
    }

    if let Some(names) = dict.get("Names").map(|v| doc.resolve_or_null(v)) {
        let names = names.as_array().ok_or_else(|| Error::SchemaViolation {
            path: "Names.Names".to_string(),
            reason: "names is not an array".to_string(),
        })?;
        let mut i = 0;
        while i + 1 < names.len() {
            let key = names[i]
                .as_string()
                .map(|s| s.as_bytes().to_vec())
                .ok_or_else(|| Error::SchemaViolation {
                    path: "Names.Names".to_string(),
                    reason: "name key is not a string".to_string(),
                })?;
            pairs.push((key, names[i + 1].clone()));
            i += 2;
        }
    }
    Ok(())
}

/// Build a single-node name tree from sorted pairs. Keys are sorted and
/// deduplicated here; on duplicates the first occurrence wins.
pub fn build(mut pairs: Vec<(Vec<u8>, PdfValue)>) -> PdfDictionary {
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs.dedup_by(|b, a| a.0 == b.0);

    let mut names = PdfArray::with_capacity(pairs.len() * 2);
    for (key, value) in pairs {
        names.push(PdfValue::String(PdfString::new_literal(key)));
        names.push(value);
    }
    let mut node = PdfDictionary::new();
    node.insert("Names", PdfValue::Array(names));
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PdfVersion;
    use crate::types::PdfReference;

    #[test]
    fn flatten_leaf_and_rebuild() {
        let doc = Document::new(PdfVersion::V1_4, PdfReference::new(1, 0));

        let mut names = PdfArray::new();
        names.push(PdfValue::String(PdfString::new_literal(b"b".to_vec())));
        names.push(PdfValue::Integer(2));
        names.push(PdfValue::String(PdfString::new_literal(b"a".to_vec())));
        names.push(PdfValue::Integer(1));
        let mut node = PdfDictionary::new();
        node.insert("Names", PdfValue::Array(names));

        let pairs = flatten(&doc, &PdfValue::Dictionary(node)).unwrap();
        assert_eq!(pairs.len(), 2);

        let rebuilt = build(pairs);
        let arr = rebuilt.get_array("Names").unwrap();
        // sorted on rebuild
        assert_eq!(arr[0].as_string().unwrap().as_bytes(), b"a");
        assert_eq!(arr[2].as_string().unwrap().as_bytes(), b"b");
    }

    #[test]
    fn duplicate_keys_keep_first() {
        let pairs = vec![
            (b"x".to_vec(), PdfValue::Integer(1)),
            (b"x".to_vec(), PdfValue::Integer(2)),
        ];
        let rebuilt = build(pairs);
        let arr = rebuilt.get_array("Names").unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[1], PdfValue::Integer(1));
    }
}
