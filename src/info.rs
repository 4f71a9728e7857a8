//! Document properties: the validated top-level facts cached after a
//! read, rendered by the CLI `info` command as text or JSON.

use crate::crypto::Permissions;
use crate::document::Document;
use crate::error::Result;
use crate::types::PdfValue;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub version: String,
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub tagged: bool,
    pub encrypted: bool,
    pub encryption_mode: Option<String>,
    pub permissions: Option<Vec<String>>,
    pub attachment_count: usize,
}

pub fn document_info(doc: &Document) -> Result<DocumentInfo> {
    let text = |key: &str| -> Option<String> {
        let dict = doc.info_dict()?;
        let value = dict.get(key)?;
        match doc.resolve_or_null(value) {
            PdfValue::String(s) => Some(s.decode_text()),
            _ => None,
        }
    };

    let tagged = doc
        .catalog()
        .ok()
        .and_then(|c| c.get("MarkInfo").map(|v| doc.resolve_or_null(v)))
        .and_then(|v| v.as_dict())
        .and_then(|mark| mark.get("Marked"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let permissions: Option<Permissions> = doc.encryption.as_ref().map(|e| e.permissions);

    Ok(DocumentInfo {
        version: doc.effective_version().to_string(),
        page_count: doc.page_count()?,
        title: text("Title"),
        author: text("Author"),
        subject: text("Subject"),
        creator: text("Creator"),
        producer: text("Producer"),
        creation_date: text("CreationDate"),
        modification_date: text("ModDate"),
        tagged,
        encrypted: doc.is_encrypted(),
        encryption_mode: doc.encryption.as_ref().map(|e| e.mode.name().to_string()),
        permissions: permissions
            .map(|p| p.granted().iter().map(|s| s.to_string()).collect()),
        attachment_count: crate::attach::list(doc).map(|l| l.len()).unwrap_or(0),
    })
}

impl DocumentInfo {
    /// Plain-text rendering, one property per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut line = |k: &str, v: &str| {
            out.push_str(&format!("{:>18}: {}\n", k, v));
        };
        line("PDF version", &self.version);
        line("Page count", &self.page_count.to_string());
        if let Some(v) = &self.title {
            line("Title", v);
        }
        if let Some(v) = &self.author {
            line("Author", v);
        }
        if let Some(v) = &self.subject {
            line("Subject", v);
        }
        if let Some(v) = &self.creator {
            line("Creator", v);
        }
        if let Some(v) = &self.producer {
            line("Producer", v);
        }
        if let Some(v) = &self.creation_date {
            line("Created", v);
        }
        if let Some(v) = &self.modification_date {
            line("Modified", v);
        }
        line("Tagged", if self.tagged { "yes" } else { "no" });
        line("Encrypted", if self.encrypted { "yes" } else { "no" });
        if let Some(mode) = &self.encryption_mode {
            line("Encryption", mode);
        }
        if let Some(perms) = &self.permissions {
            let rendered = if perms.is_empty() {
                "none".to_string()
            } else {
                perms.join(", ")
            };
            line("Permissions", &rendered);
        }
        if self.attachment_count > 0 {
            line("Attachments", &self.attachment_count.to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DocumentBuilder;

    #[test]
    fn info_reflects_builder_metadata() {
        let doc = DocumentBuilder::new().pages(2).title("Quarterly").build();
        let info = document_info(&doc).unwrap();
        assert_eq!(info.page_count, 2);
        assert_eq!(info.title.as_deref(), Some("Quarterly"));
        assert_eq!(info.producer.as_deref(), Some("pdfmill"));
        assert!(!info.encrypted);

        let rendered = info.render();
        assert!(rendered.contains("Quarterly"));
        assert!(rendered.contains("Page count"));
    }
}
