//! pdfmill: a PDF 1.0-1.7 object-layer processor.
//!
//! This crate reads a PDF byte stream into an in-memory object graph
//! rooted at the cross-reference table, validates and normalizes it,
//! applies document-level transformations (merge, split, trim, rotate,
//! page insertion/removal, attachments, encryption changes), and writes a
//! conforming PDF back out.
//!
//! The public entry points live in [`api`]; the layers underneath follow
//! the data flow: [`parser`] turns bytes into objects located through the
//! [`xref`] arena, [`validate`] enforces dictionary shapes, [`optimize`]
//! deduplicates and sweeps, [`transform`] mutates the page graph and
//! [`writer`] serializes everything back. [`filters`] and [`crypto`]
//! interpose on stream payloads and string values.

/// Top-level operations in byte-source and file flavors.
pub mod api;
/// Embedded-file attachments.
pub mod attach;
/// In-memory construction of complete test documents.
pub mod builder;
/// Flat option record carried by every command.
pub mod config;
/// The standard security handler and permission flags.
pub mod crypto;
/// The document root: trailer slots, dereferencing, page access.
pub mod document;
/// Crate-wide error type.
pub mod error;
/// Stream filter pipeline: Flate, LZW, ASCII85, ASCIIHex, RunLength.
pub mod filters;
/// Document property extraction.
pub mod info;
/// Name-tree flattening and rebuilding.
pub mod names;
/// Resource dedup, mark-and-sweep, free-list threading.
pub mod optimize;
/// Page-tree helpers and paper formats.
pub mod pages;
/// Lexer, object parser, xref loader and repair scan.
pub mod parser;
/// Page-graph transformations and the page-selection syntax.
pub mod transform;
/// Typed PDF values.
pub mod types;
/// Dictionary shape validation.
pub mod validate;
/// Body, xref table/stream and trailer emission.
pub mod writer;
/// The cross-reference arena.
pub mod xref;

pub use api::{process, read, read_file, read_validated, read_validated_file, write, write_file};
pub use config::{Configuration, Eol, ValidationMode};
pub use crypto::{EncryptionMode, Permissions};
pub use document::{Document, PdfVersion};
pub use error::{Error, Result};
pub use types::{
    ObjectId, PdfArray, PdfDictionary, PdfName, PdfReference, PdfStream, PdfString, PdfValue,
};
