//! Declarative dictionary shape rules: required and optional entries with
//! a type class and the PDF version that introduced them. The engine
//! resolves indirect values before narrowing.

use crate::config::ValidationMode;
use crate::document::{Document, PdfVersion};
use crate::types::{PdfDictionary, PdfValue};
use crate::validate::{Severity, ValidationIssue};

#[derive(Debug, Clone, Copy)]
pub enum TypeClass {
    Boolean,
    Integer,
    Number,
    Name,
    /// A name drawn from a closed set.
    NameIn(&'static [&'static str]),
    String,
    /// A PDF date string, `D:YYYYMMDDHHmmSSOHH'mm`.
    Date,
    /// Four-number array.
    Rectangle,
    Array,
    Dict,
    Stream,
    /// `/Trapped`: a name in strict mode, with the historical boolean and
    /// case quirks tolerated in relaxed mode.
    Trapped,
    Any,
}

#[derive(Debug, Clone, Copy)]
pub struct EntryRule {
    pub key: &'static str,
    pub class: TypeClass,
    pub required: bool,
    pub since: PdfVersion,
}

impl EntryRule {
    pub const fn required(key: &'static str, class: TypeClass) -> Self {
        EntryRule {
            key,
            class,
            required: true,
            since: PdfVersion { major: 1, minor: 0 },
        }
    }

    pub const fn optional(key: &'static str, class: TypeClass) -> Self {
        EntryRule {
            key,
            class,
            required: false,
            since: PdfVersion { major: 1, minor: 0 },
        }
    }

    pub const fn since(mut self, major: u8, minor: u8) -> Self {
        self.since = PdfVersion { major, minor };
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DictRules {
    pub path: &'static str,
    pub entries: &'static [EntryRule],
}

pub const CATALOG_RULES: DictRules = DictRules {
    path: "Root",
    entries: &[
        EntryRule::required("Type", TypeClass::NameIn(&["Catalog"])),
        EntryRule::required("Pages", TypeClass::Dict),
        EntryRule::optional("Version", TypeClass::Name).since(1, 4),
        EntryRule::optional("PageLayout", TypeClass::NameIn(&[
            "SinglePage",
            "OneColumn",
            "TwoColumnLeft",
            "TwoColumnRight",
            "TwoPageLeft",
            "TwoPageRight",
        ])),
        EntryRule::optional("PageMode", TypeClass::NameIn(&[
            "UseNone",
            "UseOutlines",
            "UseThumbs",
            "FullScreen",
            "UseOC",
            "UseAttachments",
        ])),
        EntryRule::optional("Dests", TypeClass::Dict).since(1, 1),
        EntryRule::optional("Names", TypeClass::Dict).since(1, 2),
        EntryRule::optional("Outlines", TypeClass::Dict),
        EntryRule::optional("Threads", TypeClass::Array).since(1, 1),
        EntryRule::optional("OpenAction", TypeClass::Any).since(1, 1),
        EntryRule::optional("AA", TypeClass::Dict).since(1, 2),
        EntryRule::optional("URI", TypeClass::Dict).since(1, 1),
        EntryRule::optional("AcroForm", TypeClass::Dict).since(1, 2),
        EntryRule::optional("Metadata", TypeClass::Stream).since(1, 4),
        EntryRule::optional("StructTreeRoot", TypeClass::Dict).since(1, 3),
        EntryRule::optional("MarkInfo", TypeClass::Dict).since(1, 4),
        EntryRule::optional("Lang", TypeClass::String).since(1, 4),
        EntryRule::optional("SpiderInfo", TypeClass::Dict).since(1, 3),
        EntryRule::optional("OutputIntents", TypeClass::Array).since(1, 4),
        EntryRule::optional("PieceInfo", TypeClass::Dict).since(1, 4),
        EntryRule::optional("OCProperties", TypeClass::Dict).since(1, 5),
        EntryRule::optional("Perms", TypeClass::Dict).since(1, 5),
        EntryRule::optional("Legal", TypeClass::Dict).since(1, 5),
        EntryRule::optional("Requirements", TypeClass::Array).since(1, 7),
        EntryRule::optional("Collection", TypeClass::Dict).since(1, 7),
        EntryRule::optional("NeedsRendering", TypeClass::Boolean).since(1, 7),
    ],
};

pub const PAGES_RULES: DictRules = DictRules {
    path: "Pages",
    entries: &[
        EntryRule::required("Type", TypeClass::NameIn(&["Pages"])),
        EntryRule::required("Kids", TypeClass::Array),
        EntryRule::required("Count", TypeClass::Integer),
        EntryRule::optional("Parent", TypeClass::Dict),
        EntryRule::optional("MediaBox", TypeClass::Rectangle),
        EntryRule::optional("CropBox", TypeClass::Rectangle),
        EntryRule::optional("Resources", TypeClass::Dict),
        EntryRule::optional("Rotate", TypeClass::Integer),
    ],
};

pub const PAGE_RULES: DictRules = DictRules {
    path: "Page",
    entries: &[
        EntryRule::required("Type", TypeClass::NameIn(&["Page"])),
        EntryRule::required("Parent", TypeClass::Dict),
        EntryRule::optional("MediaBox", TypeClass::Rectangle),
        EntryRule::optional("CropBox", TypeClass::Rectangle),
        EntryRule::optional("BleedBox", TypeClass::Rectangle).since(1, 3),
        EntryRule::optional("TrimBox", TypeClass::Rectangle).since(1, 3),
        EntryRule::optional("ArtBox", TypeClass::Rectangle).since(1, 3),
        EntryRule::optional("Resources", TypeClass::Dict),
        EntryRule::optional("Contents", TypeClass::Any),
        EntryRule::optional("Rotate", TypeClass::Integer),
        EntryRule::optional("Annots", TypeClass::Array),
        EntryRule::optional("Thumb", TypeClass::Stream),
        EntryRule::optional("Dur", TypeClass::Number).since(1, 1),
        EntryRule::optional("Trans", TypeClass::Dict).since(1, 1),
        EntryRule::optional("AA", TypeClass::Dict).since(1, 2),
        EntryRule::optional("Metadata", TypeClass::Stream).since(1, 4),
        EntryRule::optional("PieceInfo", TypeClass::Dict).since(1, 3),
        EntryRule::optional("StructParents", TypeClass::Integer).since(1, 3),
        EntryRule::optional("ID", TypeClass::String).since(1, 3),
        EntryRule::optional("UserUnit", TypeClass::Number).since(1, 6),
        EntryRule::optional("Group", TypeClass::Dict).since(1, 4),
        EntryRule::optional("Tabs", TypeClass::NameIn(&["R", "C", "S"])).since(1, 5),
    ],
};

pub const INFO_RULES: DictRules = DictRules {
    path: "Info",
    entries: &[
        EntryRule::optional("Title", TypeClass::String).since(1, 1),
        EntryRule::optional("Author", TypeClass::String),
        EntryRule::optional("Subject", TypeClass::String).since(1, 1),
        EntryRule::optional("Keywords", TypeClass::String).since(1, 1),
        EntryRule::optional("Creator", TypeClass::String),
        EntryRule::optional("Producer", TypeClass::String),
        EntryRule::optional("CreationDate", TypeClass::Date),
        EntryRule::optional("ModDate", TypeClass::Date).since(1, 1),
        EntryRule::optional("Trapped", TypeClass::Trapped).since(1, 3),
    ],
};

pub const FILESPEC_RULES: DictRules = DictRules {
    path: "Filespec",
    entries: &[
        EntryRule::optional("Type", TypeClass::NameIn(&["Filespec", "F"])),
        EntryRule::optional("F", TypeClass::String),
        EntryRule::optional("UF", TypeClass::String).since(1, 7),
        EntryRule::optional("Desc", TypeClass::String).since(1, 6),
        EntryRule::optional("EF", TypeClass::Dict).since(1, 3),
    ],
};

pub const ENCRYPT_RULES: DictRules = DictRules {
    path: "Encrypt",
    entries: &[
        EntryRule::required("Filter", TypeClass::Name),
        EntryRule::optional("SubFilter", TypeClass::Name).since(1, 3),
        EntryRule::optional("V", TypeClass::Integer),
        EntryRule::optional("R", TypeClass::Integer),
        EntryRule::optional("Length", TypeClass::Integer).since(1, 4),
        EntryRule::optional("O", TypeClass::String),
        EntryRule::optional("U", TypeClass::String),
        EntryRule::optional("OE", TypeClass::String).since(1, 7),
        EntryRule::optional("UE", TypeClass::String).since(1, 7),
        EntryRule::optional("P", TypeClass::Integer),
        EntryRule::optional("Perms", TypeClass::String).since(1, 7),
        EntryRule::optional("EncryptMetadata", TypeClass::Boolean).since(1, 5),
        EntryRule::optional("CF", TypeClass::Dict).since(1, 5),
        EntryRule::optional("StmF", TypeClass::Name).since(1, 5),
        EntryRule::optional("StrF", TypeClass::Name).since(1, 5),
    ],
};

/// Check one dictionary against its rule table, appending findings.
pub fn check_dict(
    doc: &Document,
    dict: &PdfDictionary,
    rules: &DictRules,
    mode: ValidationMode,
    version: PdfVersion,
    issues: &mut Vec<ValidationIssue>,
) {
    for rule in rules.entries {
        let path = format!("{}.{}", rules.path, rule.key);
        let value = dict.get(rule.key).map(|v| doc.resolve_or_null(v));

        let Some(value) = value else {
            if rule.required {
                issues.push(ValidationIssue {
                    severity: Severity::Error,
                    path,
                    reason: "required entry is missing".to_string(),
                });
            }
            continue;
        };

        if rule.since > version {
            issues.push(ValidationIssue {
                severity: gate_severity(mode),
                path: path.clone(),
                reason: format!("entry requires PDF {}", rule.since),
            });
        }

        check_class(value, rule.class, mode, &path, issues);
    }
}

fn gate_severity(mode: ValidationMode) -> Severity {
    if mode.is_strict() {
        Severity::Error
    } else {
        Severity::Warning
    }
}

pub fn check_class(
    value: &PdfValue,
    class: TypeClass,
    mode: ValidationMode,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let mut fail = |reason: String, issues: &mut Vec<ValidationIssue>| {
        issues.push(ValidationIssue {
            severity: Severity::Error,
            path: path.to_string(),
            reason,
        });
    };

    match class {
        TypeClass::Any => {}
        TypeClass::Boolean => {
            if value.as_bool().is_none() {
                fail(format!("expected boolean, found {}", value.type_name()), issues);
            }
        }
        TypeClass::Integer => {
            if value.as_integer().is_none() {
                fail(format!("expected integer, found {}", value.type_name()), issues);
            }
        }
        TypeClass::Number => {
            if value.as_real().is_none() {
                fail(format!("expected number, found {}", value.type_name()), issues);
            }
        }
        TypeClass::Name => {
            if value.as_name().is_none() {
                fail(format!("expected name, found {}", value.type_name()), issues);
            }
        }
        // Name matching is case-sensitive in every mode; /Trapped below
        // carries the only sanctioned case leniency.
        TypeClass::NameIn(allowed) => match value.as_name() {
            None => fail(format!("expected name, found {}", value.type_name()), issues),
            Some(name) => {
                if !allowed.contains(&name.without_slash()) {
                    fail(format!("name {} not in {:?}", name, allowed), issues);
                }
            }
        },
        TypeClass::String => {
            if value.as_string().is_none() {
                fail(format!("expected string, found {}", value.type_name()), issues);
            }
        }
        TypeClass::Date => match value.as_string() {
            None => fail(format!("expected date string, found {}", value.type_name()), issues),
            Some(s) => {
                if !is_valid_date(&s.decode_text()) {
                    if mode.is_relaxed() {
                        issues.push(ValidationIssue {
                            severity: Severity::Warning,
                            path: path.to_string(),
                            reason: "string is not a well-formed PDF date".to_string(),
                        });
                    } else {
                        fail("string is not a well-formed PDF date".to_string(), issues);
                    }
                }
            }
        },
        TypeClass::Rectangle => {
            let ok = value
                .as_array()
                .map(|arr| arr.len() == 4 && arr.iter().all(|v| v.as_real().is_some()))
                .unwrap_or(false);
            if !ok {
                fail("expected rectangle (array of four numbers)".to_string(), issues);
            }
        }
        TypeClass::Array => {
            if value.as_array().is_none() {
                fail(format!("expected array, found {}", value.type_name()), issues);
            }
        }
        TypeClass::Dict => {
            if value.as_dict().is_none() {
                fail(format!("expected dictionary, found {}", value.type_name()), issues);
            }
        }
        TypeClass::Stream => {
            if value.as_stream().is_none() {
                fail(format!("expected stream, found {}", value.type_name()), issues);
            }
        }
        TypeClass::Trapped => match value {
            PdfValue::Name(name) => {
                let bare = name.without_slash();
                if ["True", "False", "Unknown"].contains(&bare) {
                    return;
                }
                if mode.is_relaxed()
                    && ["true", "false", "unknown"]
                        .iter()
                        .any(|a| a.eq_ignore_ascii_case(bare))
                {
                    issues.push(ValidationIssue {
                        severity: Severity::Warning,
                        path: path.to_string(),
                        reason: format!("Trapped value {} has non-canonical case", name),
                    });
                } else {
                    fail(format!("Trapped name {} invalid", name), issues);
                }
            }
            PdfValue::Boolean(_) if mode.is_relaxed() => {
                issues.push(ValidationIssue {
                    severity: Severity::Warning,
                    path: path.to_string(),
                    reason: "Trapped is a boolean, expected a name".to_string(),
                });
            }
            other => fail(format!("expected name, found {}", other.type_name()), issues),
        },
    }
}

/// `D:YYYY` with optional month, day, time and timezone parts, each
/// further part only valid when its predecessor is present.
pub fn is_valid_date(s: &str) -> bool {
    let Some(rest) = s.strip_prefix("D:") else {
        return false;
    };
    if !rest.is_ascii() {
        return false;
    }
    let bytes = rest.as_bytes();

    // Fixed-width numeric fields with their inclusive ranges.
    let fields: [(usize, u32, u32); 6] = [
        (4, 0, 9999), // year
        (2, 1, 12),   // month
        (2, 1, 31),   // day
        (2, 0, 23),   // hour
        (2, 0, 59),   // minute
        (2, 0, 59),   // second
    ];

    let mut pos = 0usize;
    for (width, min, max) in fields {
        if pos == bytes.len() || matches!(bytes[pos], b'+' | b'-' | b'Z') {
            break;
        }
        if pos + width > bytes.len() {
            return false;
        }
        let Ok(field) = rest[pos..pos + width].parse::<u32>() else {
            return false;
        };
        if field < min || field > max {
            return false;
        }
        pos += width;
    }

    // The year is mandatory; anything after it is optional.
    if pos < 4 {
        return false;
    }
    if pos == bytes.len() {
        return true;
    }

    // Timezone: Z (optionally followed by an hour/minute suffix), or
    // +HH'mm' / -HH'mm' with the minutes optional.
    match bytes[pos] {
        b'Z' => rest[pos + 1..]
            .chars()
            .all(|c| c.is_ascii_digit() || c == '\''),
        b'+' | b'-' => {
            pos += 1;
            if pos + 2 > bytes.len() {
                return false;
            }
            let Ok(hours) = rest[pos..pos + 2].parse::<u32>() else {
                return false;
            };
            if hours > 23 {
                return false;
            }
            pos += 2;
            if pos == bytes.len() {
                return true;
            }
            if bytes[pos] != b'\'' {
                return false;
            }
            pos += 1;
            if pos == bytes.len() {
                return true;
            }
            if pos + 2 > bytes.len() {
                return false;
            }
            let Ok(minutes) = rest[pos..pos + 2].parse::<u32>() else {
                return false;
            };
            if minutes > 59 {
                return false;
            }
            pos += 2;
            pos == bytes.len() || (bytes[pos] == b'\'' && pos + 1 == bytes.len())
        }
        _ => false,
    }
}
