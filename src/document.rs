//! The in-memory document: cross-reference table, trailer slots, and the
//! resolution helpers everything downstream traverses with.

use crate::crypto::Encryption;
use crate::error::{Error, Result};
use crate::types::{
    PdfArray, PdfDictionary, PdfName, PdfReference, PdfStream, PdfString, PdfValue,
};
use crate::xref::{XRefEntry, XRefTable};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A PDF header version, `x.y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        PdfVersion { major, minor }
    }

    pub const V1_4: PdfVersion = PdfVersion { major: 1, minor: 4 };
    pub const V1_5: PdfVersion = PdfVersion { major: 1, minor: 5 };
    pub const V1_7: PdfVersion = PdfVersion { major: 1, minor: 7 };
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PdfVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| Error::UnsupportedVersion(s.to_string()))?;
        let major: u8 = major
            .parse()
            .map_err(|_| Error::UnsupportedVersion(s.to_string()))?;
        let minor: u8 = minor
            .parse()
            .map_err(|_| Error::UnsupportedVersion(s.to_string()))?;
        if major == 0 || major > 2 {
            return Err(Error::UnsupportedVersion(s.to_string()));
        }
        Ok(PdfVersion { major, minor })
    }
}

/// A parsed document rooted at its cross-reference table. Holds exclusive
/// ownership from parse through write; lazy dereferencing fills entry
/// caches, nothing else is shared.
#[derive(Debug, Clone)]
pub struct Document {
    pub xref: XRefTable,
    /// Version from the file header.
    pub version: PdfVersion,
    /// Catalog `/Version` override, if newer.
    pub root_version: Option<PdfVersion>,
    /// The catalog.
    pub root: PdfReference,
    pub info: Option<PdfReference>,
    pub id: Option<(PdfString, PdfString)>,
    /// Authenticated encryption state; present on encrypted input and
    /// after an encrypt operation. The writer re-encrypts when set.
    pub encryption: Option<Encryption>,
    /// The `/Encrypt` dictionary's own slot; excluded from encryption and
    /// from resource reclamation.
    pub encrypt_ref: Option<PdfReference>,
}

impl Document {
    pub fn new(version: PdfVersion, root: PdfReference) -> Self {
        Document {
            xref: XRefTable::new(),
            version,
            root_version: None,
            root,
            info: None,
            id: None,
            encryption: None,
            encrypt_ref: None,
        }
    }

    /// The version that governs writer features: the catalog override when
    /// it is newer than the header.
    pub fn effective_version(&self) -> PdfVersion {
        match self.root_version {
            Some(v) if v > self.version => v,
            _ => self.version,
        }
    }

    /// Dereference an indirect reference. The entry must be in use with a
    /// matching generation and a materialized object.
    pub fn deref(&self, reference: PdfReference) -> Result<&PdfValue> {
        let dangling = || Error::DanglingReference(reference.number, reference.generation);
        match self.xref.get(reference.number) {
            Some(XRefEntry::InUse {
                generation, object, ..
            }) => {
                if *generation != reference.generation {
                    return Err(dangling());
                }
                object.as_ref().ok_or_else(dangling)
            }
            Some(XRefEntry::Compressed { object, .. }) => {
                // Objects in object streams always have generation 0.
                if reference.generation != 0 {
                    return Err(dangling());
                }
                object.as_ref().ok_or_else(dangling)
            }
            _ => Err(dangling()),
        }
    }

    /// Follow references until a direct value; a dangling reference in
    /// relaxed pipelines is substituted by the caller, here it is an error.
    /// Reference-to-reference chains are legal but bounded.
    pub fn resolve<'a>(&'a self, value: &'a PdfValue) -> Result<&'a PdfValue> {
        let mut current = value;
        for _ in 0..32 {
            match current {
                PdfValue::Reference(r) => current = self.deref(*r)?,
                direct => return Ok(direct),
            }
        }
        Err(Error::Internal("reference chain too deep".to_string()))
    }

    /// Like `resolve`, but dangling references collapse to `Null`.
    pub fn resolve_or_null<'a>(&'a self, value: &'a PdfValue) -> &'a PdfValue {
        self.resolve(value).unwrap_or(&PdfValue::Null)
    }

    pub fn resolve_dict<'a>(&'a self, value: &'a PdfValue) -> Option<&'a PdfDictionary> {
        self.resolve(value).ok().and_then(|v| v.as_dict())
    }

    pub fn resolve_array<'a>(&'a self, value: &'a PdfValue) -> Option<&'a PdfArray> {
        self.resolve(value).ok().and_then(|v| v.as_array())
    }

    pub fn resolve_stream<'a>(&'a self, value: &'a PdfValue) -> Option<&'a PdfStream> {
        self.resolve(value).ok().and_then(|v| v.as_stream())
    }

    pub fn resolve_integer(&self, value: &PdfValue) -> Option<i64> {
        self.resolve(value).ok().and_then(|v| v.as_integer())
    }

    pub fn resolve_name<'a>(&'a self, value: &'a PdfValue) -> Option<&'a PdfName> {
        self.resolve(value).ok().and_then(|v| v.as_name())
    }

    /// Dictionary entry of `dict` with references resolved.
    pub fn dict_entry<'a>(&'a self, dict: &'a PdfDictionary, key: &str) -> Option<&'a PdfValue> {
        let v = dict.get(key)?;
        let resolved = self.resolve_or_null(v);
        if resolved.is_null() {
            None
        } else {
            Some(resolved)
        }
    }

    pub fn catalog(&self) -> Result<&PdfDictionary> {
        self.deref(self.root)?
            .as_dict()
            .ok_or_else(|| Error::SchemaViolation {
                path: "Root".to_string(),
                reason: "catalog is not a dictionary".to_string(),
            })
    }

    pub fn info_dict(&self) -> Option<&PdfDictionary> {
        let info = self.info?;
        self.deref(info).ok().and_then(|v| v.as_dict())
    }

    /// The page tree root reference from the catalog.
    pub fn pages_root(&self) -> Result<PdfReference> {
        self.catalog()?
            .get_reference("Pages")
            .ok_or_else(|| Error::SchemaViolation {
                path: "Root.Pages".to_string(),
                reason: "missing or direct page tree root".to_string(),
            })
    }

    /// Leaf pages in document order. Cycles and malformed kids fail rather
    /// than loop; annotations pointing back at pages never enter the walk.
    pub fn page_refs(&self) -> Result<Vec<PdfReference>> {
        let root = self.pages_root()?;
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        self.collect_pages(root, &mut pages, &mut visited)?;
        Ok(pages)
    }

    fn collect_pages(
        &self,
        node_ref: PdfReference,
        pages: &mut Vec<PdfReference>,
        visited: &mut HashSet<u32>,
    ) -> Result<()> {
        if !visited.insert(node_ref.number) {
            return Err(Error::SchemaViolation {
                path: "Pages".to_string(),
                reason: format!("page tree cycle through object {}", node_ref.number),
            });
        }
        let node = self
            .deref(node_ref)?
            .as_dict()
            .ok_or_else(|| Error::SchemaViolation {
                path: "Pages".to_string(),
                reason: format!("page tree node {} is not a dictionary", node_ref.number),
            })?;

        match node.type_name().map(|n| n.without_slash()) {
            Some("Pages") => {
                let kids = node
                    .get("Kids")
                    .map(|v| self.resolve_or_null(v))
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| Error::SchemaViolation {
                        path: "Pages.Kids".to_string(),
                        reason: "missing kids array".to_string(),
                    })?;
                for kid in kids.iter() {
                    let kid_ref = kid.as_reference().ok_or_else(|| Error::SchemaViolation {
                        path: "Pages.Kids".to_string(),
                        reason: "kid is not an indirect reference".to_string(),
                    })?;
                    self.collect_pages(kid_ref, pages, visited)?;
                }
            }
            Some("Page") => pages.push(node_ref),
            other => {
                return Err(Error::SchemaViolation {
                    path: "Pages".to_string(),
                    reason: format!(
                        "page tree node {} has type {:?}",
                        node_ref.number,
                        other.unwrap_or("missing")
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn page_count(&self) -> Result<usize> {
        Ok(self.page_refs()?.len())
    }

    /// Insert a brand-new object and return its reference.
    pub fn alloc_object(&mut self, value: PdfValue) -> PdfReference {
        self.xref.alloc(value)
    }

    /// Overwrite the object behind a reference in place.
    pub fn set_object(&mut self, reference: PdfReference, value: PdfValue) {
        self.xref.set_object(reference.number, value);
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parse_and_order() {
        let v: PdfVersion = "1.4".parse().unwrap();
        assert_eq!(v, PdfVersion::V1_4);
        assert!(PdfVersion::V1_5 > PdfVersion::V1_4);
        assert!("3.0".parse::<PdfVersion>().is_err());
        assert!("junk".parse::<PdfVersion>().is_err());
    }

    #[test]
    fn effective_version_prefers_newer_override() {
        let mut doc = Document::new(PdfVersion::V1_4, PdfReference::new(1, 0));
        assert_eq!(doc.effective_version(), PdfVersion::V1_4);
        doc.root_version = Some(PdfVersion::V1_7);
        assert_eq!(doc.effective_version(), PdfVersion::V1_7);
        doc.root_version = Some(PdfVersion::new(1, 2));
        assert_eq!(doc.effective_version(), PdfVersion::V1_4);
    }

    #[test]
    fn deref_checks_generation() {
        let mut doc = Document::new(PdfVersion::V1_4, PdfReference::new(1, 0));
        let r = doc.alloc_object(PdfValue::Integer(7));
        assert_eq!(doc.deref(r).unwrap(), &PdfValue::Integer(7));

        let stale = PdfReference::new(r.number, 3);
        assert!(matches!(
            doc.deref(stale),
            Err(Error::DanglingReference(_, 3))
        ));
    }
}
