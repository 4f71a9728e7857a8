//! In-memory construction of small but complete documents: catalog, page
//! tree, shared font, per-page content streams and an info dictionary.
//! Tests build their inputs with this instead of shipping binary fixtures,
//! and blank-page synthesis reuses its pieces.

use crate::document::{Document, PdfVersion};
use crate::pages;
use crate::types::{
    PdfArray, PdfDictionary, PdfName, PdfReference, PdfStream, PdfString, PdfValue,
};

pub struct DocumentBuilder {
    page_count: usize,
    paper: &'static str,
    title: Option<String>,
    version: PdfVersion,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        DocumentBuilder {
            page_count: 1,
            paper: "A4",
            title: None,
            version: PdfVersion::V1_4,
        }
    }

    pub fn pages(mut self, count: usize) -> Self {
        self.page_count = count.max(1);
        self
    }

    pub fn paper(mut self, paper: &'static str) -> Self {
        self.paper = paper;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn version(mut self, version: PdfVersion) -> Self {
        self.version = version;
        self
    }

    pub fn build(self) -> Document {
        let mut doc = Document::new(self.version, PdfReference::new(0, 0));

        let font = {
            let mut dict = PdfDictionary::new();
            dict.insert("Type", PdfValue::Name(PdfName::new("Font")));
            dict.insert("Subtype", PdfValue::Name(PdfName::new("Type1")));
            dict.insert("BaseFont", PdfValue::Name(PdfName::new("Helvetica")));
            doc.alloc_object(PdfValue::Dictionary(dict))
        };

        let pages_root = doc.alloc_object(PdfValue::Null);
        let media_box = pages::media_box_for(self.paper)
            .unwrap_or_else(|| pages::media_box_for("A4").unwrap());

        let mut kids = PdfArray::with_capacity(self.page_count);
        for number in 1..=self.page_count {
            let content = {
                let text = format!(
                    "BT /F1 12 Tf 72 720 Td (Page {} of {}) Tj ET",
                    number, self.page_count
                );
                let mut dict = PdfDictionary::new();
                dict.insert("Filter", PdfValue::Name(PdfName::new("FlateDecode")));
                // Held decoded; the writer applies the filter chain.
                doc.alloc_object(PdfValue::Stream(PdfStream::new_decoded(
                    dict,
                    text.into_bytes(),
                )))
            };

            let mut fonts = PdfDictionary::new();
            fonts.insert("F1", PdfValue::Reference(font));
            let mut resources = PdfDictionary::new();
            resources.insert("Font", PdfValue::Dictionary(fonts));

            let mut page = PdfDictionary::new();
            page.insert("Type", PdfValue::Name(PdfName::new("Page")));
            page.insert("Parent", PdfValue::Reference(pages_root));
            page.insert("MediaBox", PdfValue::Array(media_box.clone()));
            page.insert("Resources", PdfValue::Dictionary(resources));
            page.insert("Contents", PdfValue::Reference(content));
            let page_ref = doc.alloc_object(PdfValue::Dictionary(page));
            kids.push(PdfValue::Reference(page_ref));
        }

        let mut root_dict = PdfDictionary::new();
        root_dict.insert("Type", PdfValue::Name(PdfName::new("Pages")));
        root_dict.insert("Kids", PdfValue::Array(kids));
        root_dict.insert("Count", PdfValue::Integer(self.page_count as i64));
        doc.set_object(pages_root, PdfValue::Dictionary(root_dict));

        let mut catalog = PdfDictionary::new();
        catalog.insert("Type", PdfValue::Name(PdfName::new("Catalog")));
        catalog.insert("Pages", PdfValue::Reference(pages_root));
        doc.root = doc.alloc_object(PdfValue::Dictionary(catalog));

        let mut info = PdfDictionary::new();
        if let Some(title) = self.title {
            info.insert("Title", PdfValue::String(PdfString::from(title)));
        }
        info.insert(
            "Producer",
            PdfValue::String(PdfString::from("pdfmill")),
        );
        info.insert(
            "CreationDate",
            PdfValue::String(PdfString::from("D:20240101120000Z")),
        );
        doc.info = Some(doc.alloc_object(PdfValue::Dictionary(info)));

        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_requested_page_count() {
        let doc = DocumentBuilder::new().pages(3).build();
        assert_eq!(doc.page_count().unwrap(), 3);
        assert!(doc.info.is_some());
        assert!(doc.catalog().unwrap().is_type("Catalog"));
    }

    #[test]
    fn single_page_minimum() {
        let doc = DocumentBuilder::new().pages(0).build();
        assert_eq!(doc.page_count().unwrap(), 1);
    }
}
