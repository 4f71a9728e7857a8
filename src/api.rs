//! The operation surface. Every operation exists in a byte-source flavor
//! and a file flavor; the file flavor opens the paths and calls the other
//! one. Commands carry their `Configuration` in, nothing is global.

use crate::builder::DocumentBuilder;
use crate::config::Configuration;
use crate::crypto::{Encryption, EncryptionMode, Permissions};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::info::{document_info, DocumentInfo};
use crate::transform::{self, selection};
use crate::types::PdfString;
use crate::validate::ValidationReport;
use crate::{attach, optimize as optimize_mod, parser, validate as validate_mod, writer};
use log::debug;
use rand::RngCore;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

/// Parse a document from a byte source.
pub fn read<R: Read>(source: R, conf: &Configuration) -> Result<Document> {
    parser::read_document(source, conf)
}

pub fn read_file<P: AsRef<Path>>(path: P, conf: &Configuration) -> Result<Document> {
    let file = File::open(path)?;
    read(BufReader::new(file), conf)
}

/// Parse and validate in one step, the way most commands start.
pub fn read_validated<R: Read>(source: R, conf: &Configuration) -> Result<Document> {
    let doc = read(source, conf)?;
    validate_mod::validate(&doc, conf.validation_mode)?;
    Ok(doc)
}

pub fn read_validated_file<P: AsRef<Path>>(path: P, conf: &Configuration) -> Result<Document> {
    let file = File::open(path)?;
    read_validated(BufReader::new(file), conf)
}

pub fn validate(doc: &Document, conf: &Configuration) -> Result<ValidationReport> {
    validate_mod::validate(doc, conf.validation_mode)
}

pub fn optimize(doc: &mut Document) -> Result<()> {
    optimize_mod::optimize(doc)
}

pub fn write<W: Write>(doc: &Document, conf: &Configuration, sink: &mut W) -> Result<()> {
    writer::write_document(doc, conf, sink)
}

pub fn write_file<P: AsRef<Path>>(doc: &Document, conf: &Configuration, path: P) -> Result<()> {
    let file = File::create(path)?;
    let mut sink = BufWriter::new(file);
    write(doc, conf, &mut sink)
}

pub fn write_bytes(doc: &Document, conf: &Configuration) -> Result<Vec<u8>> {
    writer::write_document_bytes(doc, conf)
}

/// Full pipeline: read, validate, optimize, write.
pub fn process<R: Read, W: Write>(source: R, sink: &mut W, conf: &Configuration) -> Result<()> {
    let mut doc = read_validated(source, conf)?;
    let objects_before = doc.xref.in_use_numbers().len();
    optimize(&mut doc)?;
    write(&doc, conf, sink)?;

    if let Some(stats_path) = &conf.stats_file_name {
        let line = format!(
            "pages={} objects_before={} objects_after={}\n",
            doc.page_count().unwrap_or(0),
            objects_before,
            doc.xref.in_use_numbers().len(),
        );
        std::fs::write(stats_path, line)?;
    }
    Ok(())
}

pub fn page_count<P: AsRef<Path>>(path: P, conf: &Configuration) -> Result<usize> {
    read_validated_file(path, conf)?.page_count()
}

pub fn info(doc: &Document) -> Result<DocumentInfo> {
    document_info(doc)
}

// Page-level transformations

/// Parse a selection string against the document.
pub fn select_pages(doc: &Document, selection: &str) -> Result<Vec<usize>> {
    selection::parse(selection, doc.page_count()?)
}

pub fn rotate(doc: &mut Document, selection: &str, delta: i64) -> Result<()> {
    let pages = select_pages(doc, selection)?;
    transform::rotate(doc, &pages, delta)
}

pub fn trim(doc: &Document, selection: &str) -> Result<Document> {
    let pages = select_pages(doc, selection)?;
    transform::trim(doc, &pages)
}

pub fn split(doc: &Document, span: usize) -> Result<Vec<Document>> {
    transform::split(doc, span)
}

pub fn merge(docs: Vec<Document>) -> Result<Document> {
    transform::merge(docs)
}

pub fn insert_pages(doc: &mut Document, selection: &str) -> Result<()> {
    let pages = select_pages(doc, selection)?;
    transform::insert_pages(doc, &pages)
}

pub fn remove_pages(doc: &Document, selection: &str) -> Result<Document> {
    let pages = select_pages(doc, selection)?;
    transform::remove_pages(doc, &pages)
}

/// Build a fresh n-page document, the blank-page donor for tests and
/// `pages insert` on empty input.
pub fn new_document(pages: usize) -> Document {
    DocumentBuilder::new().pages(pages).build()
}

// Encryption operations

/// Turn encryption on. The mode comes from the configuration's key length
/// and AES switch; passwords may be empty.
pub fn encrypt(doc: &mut Document, conf: &Configuration) -> Result<()> {
    if doc.is_encrypted() {
        return Err(Error::AlreadyEncrypted);
    }
    conf.validate_key_length()?;
    let mode = EncryptionMode::from_key_length(conf.encrypt_key_length, conf.encrypt_using_aes)?;

    ensure_file_id(doc);
    let id0 = doc
        .id
        .as_ref()
        .map(|(a, _)| a.as_bytes().to_vec())
        .unwrap_or_default();

    let encryption = Encryption::new_for_writing(
        mode,
        conf.permissions,
        &conf.user_pw,
        &conf.owner_pw,
        &id0,
        conf.encrypt_metadata,
    )
    .map_err(Error::Crypto)?;

    let encrypt_ref = doc.alloc_object(crate::types::PdfValue::Dictionary(encryption.to_dict()));
    doc.encrypt_ref = Some(encrypt_ref);
    doc.encryption = Some(encryption);
    log::info!("encryption enabled: {}", mode.name());
    Ok(())
}

/// Turn encryption off. Payloads were already decrypted at read time;
/// this drops the dictionary so the writer emits plaintext.
pub fn decrypt(doc: &mut Document) -> Result<()> {
    if !doc.is_encrypted() {
        return Err(Error::NotEncrypted);
    }
    if let Some(r) = doc.encrypt_ref.take() {
        doc.xref.free(r.number);
    }
    doc.encryption = None;
    debug!("encryption removed");
    Ok(())
}

/// Replace the user password with `user_pw_new`. The current owner
/// password (possibly empty) must be in the configuration too, because
/// the owner key is derived from both passwords.
pub fn change_user_password(doc: &mut Document, conf: &Configuration) -> Result<()> {
    let new_pw = conf
        .user_pw_new
        .as_deref()
        .ok_or_else(|| Error::Internal("no new user password configured".to_string()))?;
    rekey(doc, new_pw, &conf.owner_pw)
}

/// Replace the owner password with `owner_pw_new`; the current user
/// password rides along unchanged from the configuration.
pub fn change_owner_password(doc: &mut Document, conf: &Configuration) -> Result<()> {
    let new_pw = conf
        .owner_pw_new
        .as_deref()
        .ok_or_else(|| Error::Internal("no new owner password configured".to_string()))?;
    rekey(doc, &conf.user_pw, new_pw)
}

fn rekey(doc: &mut Document, user_pw: &str, owner_pw: &str) -> Result<()> {
    let current = doc.encryption.as_ref().ok_or(Error::NotEncrypted)?;
    let mode = current.mode;
    let permissions = current.permissions;
    let encrypt_metadata = current.encrypt_metadata;

    let id0 = doc
        .id
        .as_ref()
        .map(|(a, _)| a.as_bytes().to_vec())
        .unwrap_or_default();

    doc.encryption = Some(
        Encryption::new_for_writing(mode, permissions, user_pw, owner_pw, &id0, encrypt_metadata)
            .map_err(Error::Crypto)?,
    );
    Ok(())
}

/// Current permission flags, `None` for unencrypted documents.
pub fn list_permissions(doc: &Document) -> Option<Permissions> {
    doc.encryption.as_ref().map(|e| e.permissions)
}

/// Rewrite the permission flags; requires the document to have been
/// opened with the owner password.
pub fn set_permissions(doc: &mut Document, permissions: Permissions) -> Result<()> {
    doc.encryption
        .as_mut()
        .ok_or(Error::NotEncrypted)?
        .set_permissions(permissions)
}

// Attachments

pub fn list_attachments(doc: &Document) -> Result<Vec<String>> {
    attach::list(doc)
}

pub fn add_attachment(doc: &mut Document, name: &str, payload: &[u8]) -> Result<()> {
    attach::add(doc, name, payload)
}

pub fn remove_attachments(doc: &mut Document, names: &[&str]) -> Result<()> {
    attach::remove(doc, names)
}

pub fn extract_attachment(doc: &Document, name: &str) -> Result<Vec<u8>> {
    attach::extract(doc, name)
}

/// Run an operation with panic containment, for embedders: a panic
/// surfaces as `Error::Internal` instead of tearing the process down.
pub fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(Error::Internal(message))
        }
    }
}

/// Documents being encrypted need `/ID`; generate a random pair when the
/// file never had one.
fn ensure_file_id(doc: &mut Document) {
    if doc.id.is_some() {
        return;
    }
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let id = PdfString::new_hex(bytes.to_vec());
    doc.id = Some((id.clone(), id));
}
