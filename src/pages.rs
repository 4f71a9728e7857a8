//! Page-tree helpers: attribute inheritance, tree rebuilding, blank pages
//! and the paper formats backing them.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::types::{PdfArray, PdfDictionary, PdfName, PdfReference, PdfValue};

/// Attributes a leaf either carries or inherits from its ancestors.
#[derive(Debug, Clone, Default)]
pub struct PageAttrs {
    pub media_box: Option<PdfArray>,
    pub crop_box: Option<PdfArray>,
    pub resources: Option<PdfValue>,
    pub rotate: i64,
}

/// Inheritable page attributes per ISO 32000-1 table 31, nearest ancestor
/// winning.
pub fn inherited_attrs(doc: &Document, page: PdfReference) -> Result<PageAttrs> {
    let mut attrs = PageAttrs::default();
    let mut rotate_seen = false;
    let mut current = Some(page);
    let mut hops = 0;

    while let Some(node_ref) = current {
        hops += 1;
        if hops > 64 {
            return Err(Error::SchemaViolation {
                path: "Pages.Parent".to_string(),
                reason: "parent chain too deep".to_string(),
            });
        }
        let node = doc
            .deref(node_ref)?
            .as_dict()
            .ok_or_else(|| Error::SchemaViolation {
                path: "Pages".to_string(),
                reason: format!("node {} is not a dictionary", node_ref.number),
            })?;

        if attrs.media_box.is_none() {
            if let Some(v) = node.get("MediaBox") {
                attrs.media_box = doc.resolve_array(v).cloned();
            }
        }
        if attrs.crop_box.is_none() {
            if let Some(v) = node.get("CropBox") {
                attrs.crop_box = doc.resolve_array(v).cloned();
            }
        }
        if attrs.resources.is_none() {
            if let Some(v) = node.get("Resources") {
                attrs.resources = Some(v.clone());
            }
        }
        if !rotate_seen {
            if let Some(v) = node.get("Rotate") {
                if let Some(r) = doc.resolve_integer(v) {
                    attrs.rotate = r.rem_euclid(360);
                    rotate_seen = true;
                }
            }
        }

        current = node.get_reference("Parent");
    }

    Ok(attrs)
}

/// Copy inherited attributes down onto the leaf itself, so the leaf stays
/// self-contained when intermediate tree nodes are dropped.
pub fn flatten_inherited(doc: &mut Document, page: PdfReference) -> Result<()> {
    let attrs = inherited_attrs(doc, page)?;
    let dict = doc
        .deref(page)?
        .as_dict()
        .ok_or_else(|| Error::SchemaViolation {
            path: "Page".to_string(),
            reason: "page is not a dictionary".to_string(),
        })?
        .clone();

    let mut dict = dict;
    if !dict.contains_key("MediaBox") {
        if let Some(mb) = attrs.media_box {
            dict.insert("MediaBox", PdfValue::Array(mb));
        }
    }
    if !dict.contains_key("Resources") {
        if let Some(res) = attrs.resources {
            dict.insert("Resources", res);
        }
    }
    if !dict.contains_key("Rotate") && attrs.rotate != 0 {
        dict.insert("Rotate", PdfValue::Integer(attrs.rotate));
    }
    doc.set_object(page, PdfValue::Dictionary(dict));
    Ok(())
}

/// Rebuild the page tree as a single flat `Pages` node over `leaves`,
/// reusing the existing root object number. Leaves must already carry
/// their inherited attributes.
pub fn rebuild_page_tree(doc: &mut Document, leaves: &[PdfReference]) -> Result<()> {
    let root_ref = doc.pages_root()?;

    let mut kids = PdfArray::with_capacity(leaves.len());
    for &leaf in leaves {
        kids.push(PdfValue::Reference(leaf));
    }

    let mut root = PdfDictionary::new();
    root.insert("Type", PdfValue::Name(PdfName::new("Pages")));
    root.insert("Kids", PdfValue::Array(kids));
    root.insert("Count", PdfValue::Integer(leaves.len() as i64));
    doc.set_object(root_ref, PdfValue::Dictionary(root));

    for &leaf in leaves {
        let mut dict = doc
            .deref(leaf)?
            .as_dict()
            .ok_or_else(|| Error::SchemaViolation {
                path: "Page".to_string(),
                reason: "page is not a dictionary".to_string(),
            })?
            .clone();
        dict.insert("Parent", PdfValue::Reference(root_ref));
        doc.set_object(leaf, PdfValue::Dictionary(dict));
    }
    Ok(())
}

/// Create a blank page leaf sharing `media_box`, parented later by the
/// tree rebuild.
pub fn blank_page(doc: &mut Document, media_box: PdfArray) -> PdfReference {
    let mut dict = PdfDictionary::new();
    dict.insert("Type", PdfValue::Name(PdfName::new("Page")));
    dict.insert("MediaBox", PdfValue::Array(media_box));
    dict.insert("Resources", PdfValue::Dictionary(PdfDictionary::new()));
    doc.alloc_object(PdfValue::Dictionary(dict))
}

/// A rectangle `[0 0 w h]`.
pub fn rect(width: f64, height: f64) -> PdfArray {
    let mut arr = PdfArray::with_capacity(4);
    arr.push(PdfValue::Integer(0));
    arr.push(PdfValue::Integer(0));
    arr.push(PdfValue::Real(width));
    arr.push(PdfValue::Real(height));
    arr
}

/// Supported paper formats, dimensions in PostScript points.
pub const PAPER_SIZES: &[(&str, f64, f64)] = &[
    ("A0", 2384.0, 3370.0),
    ("A1", 1684.0, 2384.0),
    ("A2", 1191.0, 1684.0),
    ("A3", 842.0, 1191.0),
    ("A4", 595.0, 842.0),
    ("A5", 420.0, 595.0),
    ("A6", 298.0, 420.0),
    ("A7", 210.0, 298.0),
    ("A8", 147.0, 210.0),
    ("A9", 105.0, 147.0),
    ("A10", 74.0, 105.0),
    ("Letter", 612.0, 792.0),
    ("Legal", 612.0, 1008.0),
    ("Ledger", 1224.0, 792.0),
    ("Tabloid", 792.0, 1224.0),
];

/// The MediaBox for a named paper format, case-insensitive.
pub fn media_box_for(paper: &str) -> Option<PdfArray> {
    PAPER_SIZES
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(paper))
        .map(|&(_, w, h)| rect(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_lookup_is_case_insensitive() {
        assert!(media_box_for("a4").is_some());
        assert!(media_box_for("LETTER").is_some());
        assert!(media_box_for("B5").is_none());
    }

    #[test]
    fn rect_shape() {
        let r = rect(595.0, 842.0);
        assert_eq!(r.len(), 4);
        assert_eq!(r[2].as_real(), Some(595.0));
    }
}
