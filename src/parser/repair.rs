//! Relaxed-mode xref reconstruction by full-file scan.
//!
//! The file is read sequentially looking for `n g obj` headers; each hit
//! records the header's byte offset and the scan resumes past the matching
//! `endobj`. Later definitions of the same object number override earlier
//! ones, which replays incremental updates in file order.

use crate::error::{Error, Result};
use crate::parser::lexer;
use crate::parser::object_parser::parse_value;
use crate::parser::reader::{find, rfind};
use crate::types::{PdfDictionary, PdfValue};
use crate::xref::{XRefEntry, XRefTable};
use log::{debug, warn};

pub struct Repaired {
    pub table: XRefTable,
    pub trailer: PdfDictionary,
}

pub fn scan(buf: &[u8]) -> Result<Repaired> {
    let mut table = XRefTable::new();
    let mut found = 0usize;
    let mut pos = 0usize;

    while pos < buf.len() {
        let Some(candidate) = next_header_candidate(buf, pos) else {
            break;
        };

        match try_header(&buf[candidate..]) {
            Some((number, generation, header_len)) => {
                table.insert(
                    number,
                    XRefEntry::InUse {
                        offset: candidate as u64,
                        generation,
                        object: None,
                    },
                );
                found += 1;
                // Resume after the object body so digits inside stream
                // payloads are not mistaken for headers.
                let body_start = candidate + header_len;
                pos = match find(&buf[body_start..], b"endobj") {
                    Some(end) => body_start + end + b"endobj".len(),
                    None => body_start,
                };
            }
            None => pos = candidate + 1,
        }
    }

    if found == 0 {
        return Err(Error::CorruptXref(
            "file scan found no objects".to_string(),
        ));
    }
    debug!("file scan recovered {} objects", found);

    Ok(Repaired {
        table,
        trailer: reconstruct_trailer(buf),
    })
}

/// Position of the next digit that starts a token.
fn next_header_candidate(buf: &[u8], from: usize) -> Option<usize> {
    (from..buf.len()).find(|&i| {
        buf[i].is_ascii_digit()
            && (i == 0 || lexer::is_whitespace(buf[i - 1]) || lexer::is_delimiter(buf[i - 1]))
    })
}

/// Match `n g obj` at the start of the slice, returning the header length.
fn try_header(slice: &[u8]) -> Option<(u32, u16, usize)> {
    let (rest, number) = lexer::unsigned(slice).ok()?;
    let (rest, _) = lexer::whitespace1(rest).ok()?;
    let (rest, generation) = lexer::unsigned(rest).ok()?;
    let (rest, _) = lexer::whitespace1(rest).ok()?;
    let (rest, _) = lexer::keyword("obj")(rest).ok()?;
    if number == 0 || number > u32::MAX as u64 || generation > u16::MAX as u64 {
        return None;
    }
    Some((
        number as u32,
        generation as u16,
        slice.len() - rest.len(),
    ))
}

/// Rebuild the trailer dictionary: prefer the last parseable `trailer`
/// dict in the file; the loader falls back to catalog discovery when the
/// result has no `/Root`.
fn reconstruct_trailer(buf: &[u8]) -> PdfDictionary {
    let mut tail = buf;
    while let Some(pos) = rfind(tail, b"trailer") {
        let after = &tail[pos + b"trailer".len()..];
        if let Ok((_, PdfValue::Dictionary(mut dict))) = parse_value(after) {
            // Chain bookkeeping from the dead xref is meaningless now.
            dict.remove("Prev");
            dict.remove("XRefStm");
            if dict.contains_key("Root") {
                return dict;
            }
        }
        warn!("unreadable trailer candidate at offset {}", pos);
        tail = &tail[..pos];
    }
    PdfDictionary::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_finds_headers_and_skips_bodies() {
        let buf = b"%PDF-1.4\n1 0 obj\n(17 0 obj inside a string)\nendobj\n2 0 obj\n<< /X 1 >>\nendobj\n";
        let repaired = scan(buf).unwrap();
        assert!(matches!(
            repaired.table.get(1),
            Some(XRefEntry::InUse { offset: 9, .. })
        ));
        assert!(repaired.table.contains(2));
        assert!(!repaired.table.contains(17));
    }

    #[test]
    fn later_definition_wins() {
        let buf = b"1 0 obj 1 endobj\n1 0 obj 2 endobj\n";
        let repaired = scan(buf).unwrap();
        match repaired.table.get(1) {
            Some(XRefEntry::InUse { offset, .. }) => assert_eq!(*offset, 17),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn trailer_reconstruction() {
        let buf =
            b"1 0 obj 1 endobj\ntrailer\n<< /Size 2 /Root 1 0 R /Prev 99 >>\nstartxref\n0\n%%EOF";
        let repaired = scan(buf).unwrap();
        assert!(repaired.trailer.contains_key("Root"));
        assert!(!repaired.trailer.contains_key("Prev"));
    }

    #[test]
    fn empty_input_fails() {
        assert!(scan(b"nothing here").is_err());
    }
}
