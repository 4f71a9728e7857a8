//! Document validation against the ISO 32000-1 dictionary shapes.
//!
//! `Strict` enforces ISO 32000-1 to the letter; `Relaxed` demotes failures on
//! entries not critical for writing to logged warnings; `None` skips
//! validation entirely. Failures that make the document unwritable are
//! hard errors in every mode.

pub mod rules;
pub mod structure;

use crate::config::ValidationMode;
use crate::document::Document;
use crate::error::{Error, Result};
use log::warn;
use serde::Serialize;
pub use structure::PageRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    /// Per-leaf cache of inherited attributes and resolved content
    /// streams, filled as a side effect of the page-tree walk.
    #[serde(skip)]
    pub pages: Vec<PageRecord>,
}

impl ValidationReport {
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Validate the document in the given mode. Warnings are logged and
/// returned; the first error aborts with `SchemaViolation`.
pub fn validate(doc: &Document, mode: ValidationMode) -> Result<ValidationReport> {
    if mode == ValidationMode::None {
        return Ok(ValidationReport::default());
    }

    let outcome = structure::validate_structure(doc, mode)?;
    let report = ValidationReport {
        issues: outcome.issues,
        pages: outcome.pages,
    };

    for warning in report.warnings() {
        warn!("validation: {}: {}", warning.path, warning.reason);
    }

    if let Some(first) = report.errors().next() {
        return Err(Error::SchemaViolation {
            path: first.path.clone(),
            reason: first.reason.clone(),
        });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DocumentBuilder;
    use crate::types::{PdfName, PdfValue};

    #[test]
    fn builder_document_is_valid_in_both_modes() {
        let doc = DocumentBuilder::new().pages(2).build();
        assert!(validate(&doc, ValidationMode::Relaxed).is_ok());
        assert!(validate(&doc, ValidationMode::Strict).is_ok());
    }

    #[test]
    fn bad_count_warns_relaxed_fails_strict() {
        let mut doc = DocumentBuilder::new().pages(2).build();
        let root = doc.pages_root().unwrap();
        let mut dict = doc.deref(root).unwrap().as_dict().unwrap().clone();
        dict.insert("Count", PdfValue::Integer(9));
        doc.set_object(root, PdfValue::Dictionary(dict));

        let report = validate(&doc, ValidationMode::Relaxed).unwrap();
        assert!(report.warnings().count() > 0);
        assert!(matches!(
            validate(&doc, ValidationMode::Strict),
            Err(Error::SchemaViolation { .. })
        ));
    }

    #[test]
    fn wrong_node_type_is_fatal_in_every_mode() {
        let mut doc = DocumentBuilder::new().pages(1).build();
        let page = doc.page_refs().unwrap()[0];
        let mut dict = doc.deref(page).unwrap().as_dict().unwrap().clone();
        dict.insert("Type", PdfValue::Name(PdfName::new("NotAPage")));
        doc.set_object(page, PdfValue::Dictionary(dict));

        assert!(validate(&doc, ValidationMode::Relaxed).is_err());
        assert!(validate(&doc, ValidationMode::Strict).is_err());
    }

    #[test]
    fn none_mode_skips_everything() {
        let mut doc = DocumentBuilder::new().pages(1).build();
        let root = doc.root;
        doc.set_object(root, PdfValue::Integer(0)); // catalog destroyed
        assert!(validate(&doc, ValidationMode::None).is_ok());
    }

    #[test]
    fn page_records_cache_inherited_attrs() {
        let doc = DocumentBuilder::new().pages(3).build();
        let report = validate(&doc, ValidationMode::Relaxed).unwrap();
        assert_eq!(report.pages.len(), 3);
        for record in &report.pages {
            assert!(record.attrs.media_box.is_some());
            assert_eq!(record.content_streams, 1);
        }
    }
}
