//! Structural validation: the catalog walk, bottom-up page-tree checks
//! with inherited-attribute caching, content-stream resolution and
//! name-tree shape checks.

use crate::config::ValidationMode;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::names;
use crate::pages::{self, PageAttrs};
use crate::types::{PdfDictionary, PdfReference, PdfValue};
use crate::validate::rules::{self, check_dict};
use crate::validate::{Severity, ValidationIssue};
use std::collections::HashSet;

/// Cached per-leaf facts produced while validating the page tree.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub reference: PdfReference,
    pub attrs: PageAttrs,
    pub content_streams: usize,
}

pub struct StructureOutcome {
    pub issues: Vec<ValidationIssue>,
    pub pages: Vec<PageRecord>,
}

/// Walk the document. Failures that make the graph unwritable (no
/// catalog, unwalkable page tree) surface as hard errors in every mode;
/// everything else lands in the issue list.
pub fn validate_structure(doc: &Document, mode: ValidationMode) -> Result<StructureOutcome> {
    let mut issues = Vec::new();
    let version = doc.effective_version();

    let catalog = doc.catalog()?;
    check_dict(doc, catalog, &rules::CATALOG_RULES, mode, version, &mut issues);

    if let Some(info) = doc.info_dict() {
        check_dict(doc, info, &rules::INFO_RULES, mode, version, &mut issues);
    }

    if let Some(encrypt) = catalog_encrypt(doc) {
        check_dict(doc, &encrypt, &rules::ENCRYPT_RULES, mode, version, &mut issues);
    }

    let pages_root = doc.pages_root()?;
    let mut records = Vec::new();
    let mut visited = HashSet::new();
    let leaf_count = validate_tree_node(
        doc,
        pages_root,
        mode,
        &mut issues,
        &mut records,
        &mut visited,
    )?;
    if leaf_count == 0 {
        issues.push(ValidationIssue {
            severity: Severity::Error,
            path: "Pages".to_string(),
            reason: "document has no pages".to_string(),
        });
    }

    validate_name_trees(doc, &mut issues);

    Ok(StructureOutcome {
        issues,
        pages: records,
    })
}

fn catalog_encrypt(doc: &Document) -> Option<PdfDictionary> {
    let r = doc.encrypt_ref?;
    doc.deref(r).ok().and_then(|v| v.as_dict()).cloned()
}

/// Bottom-up page-tree validation. Returns the number of leaf descendants
/// so every interior `Count` can be checked against reality.
fn validate_tree_node(
    doc: &Document,
    node_ref: PdfReference,
    mode: ValidationMode,
    issues: &mut Vec<ValidationIssue>,
    records: &mut Vec<PageRecord>,
    visited: &mut HashSet<u32>,
) -> Result<usize> {
    if !visited.insert(node_ref.number) {
        return Err(Error::SchemaViolation {
            path: "Pages".to_string(),
            reason: format!("page tree cycle through object {}", node_ref.number),
        });
    }
    let version = doc.effective_version();
    let node = doc
        .deref(node_ref)?
        .as_dict()
        .ok_or_else(|| Error::SchemaViolation {
            path: "Pages".to_string(),
            reason: format!("node {} is not a dictionary", node_ref.number),
        })?;

    match node.type_name().map(|n| n.without_slash()) {
        Some("Pages") => {
            check_dict(doc, node, &rules::PAGES_RULES, mode, version, issues);
            let kids = node
                .get("Kids")
                .map(|v| doc.resolve_or_null(v))
                .and_then(|v| v.as_array())
                .ok_or_else(|| Error::SchemaViolation {
                    path: "Pages.Kids".to_string(),
                    reason: "missing kids array".to_string(),
                })?;

            let mut leaves = 0usize;
            for kid in kids.iter() {
                let kid_ref = kid.as_reference().ok_or_else(|| Error::SchemaViolation {
                    path: "Pages.Kids".to_string(),
                    reason: "kid is not an indirect reference".to_string(),
                })?;
                leaves += validate_tree_node(doc, kid_ref, mode, issues, records, visited)?;
            }

            let declared = node
                .get("Count")
                .and_then(|v| doc.resolve_integer(v))
                .unwrap_or(-1);
            if declared != leaves as i64 {
                issues.push(ValidationIssue {
                    severity: demoted(mode),
                    path: format!("Pages({}).Count", node_ref.number),
                    reason: format!("declares {} pages, tree has {}", declared, leaves),
                });
            }
            Ok(leaves)
        }
        Some("Page") => {
            validate_leaf(doc, node_ref, node, mode, issues, records)?;
            Ok(1)
        }
        other => Err(Error::SchemaViolation {
            path: "Pages".to_string(),
            reason: format!(
                "node {} has type {:?}, expected Pages or Page",
                node_ref.number,
                other.unwrap_or("missing")
            ),
        }),
    }
}

fn validate_leaf(
    doc: &Document,
    leaf_ref: PdfReference,
    leaf: &PdfDictionary,
    mode: ValidationMode,
    issues: &mut Vec<ValidationIssue>,
    records: &mut Vec<PageRecord>,
) -> Result<()> {
    let version = doc.effective_version();
    check_dict(doc, leaf, &rules::PAGE_RULES, mode, version, issues);

    let attrs = pages::inherited_attrs(doc, leaf_ref)?;
    let path = |key: &str| format!("Page({}).{}", leaf_ref.number, key);

    // MediaBox and Resources are required but inheritable.
    if attrs.media_box.is_none() {
        issues.push(ValidationIssue {
            severity: Severity::Error,
            path: path("MediaBox"),
            reason: "missing and not inherited".to_string(),
        });
    }
    if attrs.resources.is_none() {
        issues.push(ValidationIssue {
            severity: demoted(mode),
            path: path("Resources"),
            reason: "missing and not inherited".to_string(),
        });
    }

    if let Some(rotate) = leaf.get("Rotate").and_then(|v| doc.resolve_integer(v)) {
        if rotate % 90 != 0 {
            issues.push(ValidationIssue {
                severity: demoted(mode),
                path: path("Rotate"),
                reason: format!("{} is not a multiple of 90", rotate),
            });
        }
    }

    // /Contents resolves to one stream or an array of streams.
    let mut content_streams = 0usize;
    if let Some(contents) = leaf.get("Contents") {
        match doc.resolve_or_null(contents) {
            PdfValue::Stream(_) => content_streams = 1,
            PdfValue::Array(arr) => {
                for item in arr.iter() {
                    if doc.resolve_stream(item).is_some() {
                        content_streams += 1;
                    } else {
                        issues.push(ValidationIssue {
                            severity: demoted(mode),
                            path: path("Contents"),
                            reason: "array element is not a stream".to_string(),
                        });
                    }
                }
            }
            PdfValue::Null => issues.push(ValidationIssue {
                severity: demoted(mode),
                path: path("Contents"),
                reason: "dangling reference".to_string(),
            }),
            other => issues.push(ValidationIssue {
                severity: Severity::Error,
                path: path("Contents"),
                reason: format!("expected stream or array, found {}", other.type_name()),
            }),
        }
    }

    records.push(PageRecord {
        reference: leaf_ref,
        attrs,
        content_streams,
    });
    Ok(())
}

/// Every catalog `/Names` subtree must be a readable name tree with
/// ordered keys.
fn validate_name_trees(doc: &Document, issues: &mut Vec<ValidationIssue>) {
    let Ok(catalog) = doc.catalog() else { return };
    let Some(names_dict) = catalog
        .get("Names")
        .map(|v| doc.resolve_or_null(v))
        .and_then(|v| v.as_dict())
    else {
        return;
    };

    for (key, subtree) in names_dict.iter() {
        match names::flatten(doc, subtree) {
            Ok(pairs) => {
                let sorted = pairs.windows(2).all(|w| w[0].0 <= w[1].0);
                if !sorted {
                    issues.push(ValidationIssue {
                        severity: Severity::Warning,
                        path: format!("Names.{}", key.without_slash()),
                        reason: "name tree keys are not sorted".to_string(),
                    });
                }
            }
            Err(err) => issues.push(ValidationIssue {
                severity: Severity::Error,
                path: format!("Names.{}", key.without_slash()),
                reason: err.to_string(),
            }),
        }
    }
}

fn demoted(mode: ValidationMode) -> Severity {
    if mode.is_strict() {
        Severity::Error
    } else {
        Severity::Warning
    }
}
