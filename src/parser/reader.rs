//! Document loading: header, cross-reference chain (classic, stream and
//! hybrid), object materialization, object-stream unpacking and the
//! decryption interposition point.

use crate::config::{Configuration, ValidationMode};
use crate::crypto::Encryption;
use crate::document::{Document, PdfVersion};
use crate::error::{Error, Result};
use crate::parser::object_parser::{parse_indirect_header, parse_value};
use crate::parser::{lexer, repair, xref_parse};
use crate::types::*;
use crate::xref::{XRefEntry, XRefTable};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::io::Read;

/// How far from end-of-file the `startxref` keyword is searched for.
const TAIL_SCAN: usize = 2048;
/// How far into the file the header may be preceded by junk.
const HEADER_SCAN: usize = 1024;

/// Read a document from any byte source. Parsing requires random access,
/// so the source is buffered whole up front; payloads stay pinned for the
/// lifetime of the returned document.
pub fn read_document<R: Read>(mut source: R, conf: &Configuration) -> Result<Document> {
    let mut buf = Vec::new();
    source.read_to_end(&mut buf)?;
    read_document_bytes(&buf, conf)
}

pub fn read_document_bytes(buf: &[u8], conf: &Configuration) -> Result<Document> {
    Loader {
        buf,
        conf,
        table: XRefTable::new(),
        trailer: PdfDictionary::new(),
    }
    .load()
}

struct Loader<'a> {
    buf: &'a [u8],
    conf: &'a Configuration,
    table: XRefTable,
    trailer: PdfDictionary,
}

impl<'a> Loader<'a> {
    fn relaxed(&self) -> bool {
        self.conf.validation_mode != ValidationMode::Strict
    }

    fn load(mut self) -> Result<Document> {
        let version = self.parse_header()?;

        debug!("loading xref chain");
        if let Err(err) = self.load_xref_chain() {
            if !self.relaxed() {
                return Err(err);
            }
            warn!("xref unreadable ({}), falling back to file scan", err);
            let repaired = repair::scan(self.buf)?;
            self.table = repaired.table;
            self.trailer = repaired.trailer;
        }

        debug!("materializing {} objects", self.table.in_use_numbers().len());
        self.materialize_objects()?;

        let encryption = self.setup_encryption()?;
        self.materialize_compressed()?;
        self.finish(version, encryption)
    }

    fn parse_header(&self) -> Result<PdfVersion> {
        let window = &self.buf[..self.buf.len().min(HEADER_SCAN)];
        let pos = find(window, b"%PDF-")
            .ok_or_else(|| Error::CorruptXref("missing %PDF header".to_string()))?;
        let (_, (major, minor)) = lexer::pdf_header(&self.buf[pos..])
            .map_err(|_| Error::CorruptXref("malformed %PDF header".to_string()))?;
        let version = PdfVersion::new(major, minor);
        if version.major != 1 {
            return Err(Error::UnsupportedVersion(version.to_string()));
        }
        Ok(version)
    }

    fn find_startxref(&self) -> Result<u64> {
        let tail_start = self.buf.len().saturating_sub(TAIL_SCAN);
        let tail = &self.buf[tail_start..];
        let pos = rfind(tail, b"startxref")
            .ok_or_else(|| Error::CorruptXref("no startxref in file tail".to_string()))?;
        let after = &tail[pos + b"startxref".len()..];
        let (_, offset) = nom::sequence::preceded(lexer::skip_ws, lexer::unsigned)(after)
            .map_err(|_| Error::CorruptXref("startxref offset unreadable".to_string()))?;
        Ok(offset)
    }

    fn slice_at(&self, offset: u64) -> Result<&'a [u8]> {
        let offset = offset as usize;
        if offset >= self.buf.len() {
            return Err(Error::CorruptXref(format!(
                "offset {} beyond end of file",
                offset
            )));
        }
        Ok(&self.buf[offset..])
    }

    fn load_xref_chain(&mut self) -> Result<()> {
        let mut offset = self.find_startxref()?;
        let mut visited = HashSet::new();

        loop {
            if !visited.insert(offset) {
                return Err(Error::CorruptXref("cyclic /Prev chain".to_string()));
            }
            let slice = self.slice_at(offset)?;
            let (trimmed, _) = lexer::skip_ws(slice)
                .map_err(|_| Error::CorruptXref("unreadable xref section".to_string()))?;

            let prev = if trimmed.starts_with(b"xref") {
                self.load_classic_section(trimmed)?
            } else {
                self.load_stream_section(trimmed)?
            };

            match prev {
                Some(p) => offset = p,
                None => break,
            }
        }

        if self.trailer.get("Root").is_none() {
            return Err(Error::CorruptXref("trailer has no /Root".to_string()));
        }
        Ok(())
    }

    fn load_classic_section(&mut self, slice: &'a [u8]) -> Result<Option<u64>> {
        let (_, section) = xref_parse::parse_classic_section(slice)
            .map_err(|e| Error::CorruptXref(format!("classic xref: {}", e)))?;

        // Hybrid file: the /XRefStm entries take precedence over the
        // classic entries of the same section, so they go in first.
        if let Some(stm_offset) = section.trailer.get_integer("XRefStm") {
            let slice = self.slice_at(stm_offset as u64)?;
            let (trimmed, _) = lexer::skip_ws(slice)
                .map_err(|_| Error::CorruptXref("unreadable hybrid xref stream".to_string()))?;
            match self.load_stream_section(trimmed) {
                Ok(_) => {}
                Err(err) if self.relaxed() => {
                    warn!("hybrid /XRefStm unreadable, ignoring: {}", err)
                }
                Err(err) => return Err(err),
            }
        }

        for (number, entry) in section.entries {
            self.table.insert_if_absent(number, entry);
        }
        let prev = section.trailer.get_integer("Prev").map(|v| v as u64);
        self.merge_trailer(&section.trailer);
        Ok(prev)
    }

    fn load_stream_section(&mut self, slice: &'a [u8]) -> Result<Option<u64>> {
        let (id, stream) = self.parse_stream_object_direct(slice)?;
        if !stream.dict.is_type("XRef") {
            return Err(Error::CorruptXref(format!(
                "object {} at xref offset is not an xref stream",
                id.number
            )));
        }

        let layout = xref_parse::stream_layout(&stream)?;
        let decoded = stream
            .decoded_bytes()
            .map_err(|e| Error::CorruptXref(format!("xref stream decode: {}", e)))?;
        for (number, entry) in xref_parse::parse_stream_entries(&layout, &decoded)? {
            self.table.insert_if_absent(number, entry);
        }

        // The xref stream carries its own entry; make sure it is present
        // even when the /Index windows do not cover it.
        self.table.insert_if_absent(
            id.number,
            XRefEntry::InUse {
                offset: offset_of(self.buf, slice),
                generation: id.generation,
                object: None,
            },
        );

        let prev = stream.dict.get_integer("Prev").map(|v| v as u64);
        self.merge_trailer(&stream.dict);
        Ok(prev)
    }

    /// Parse `n g obj << ... >> stream ... endstream` where `/Length` must
    /// be direct. Only xref streams are read this way; everything else
    /// goes through `parse_object_at` with full reference resolution.
    fn parse_stream_object_direct(&self, slice: &'a [u8]) -> Result<(ObjectId, PdfStream)> {
        let corrupt = |what: &str| Error::CorruptXref(format!("xref stream object: {}", what));

        let (rest, id) = parse_indirect_header(slice).map_err(|_| corrupt("missing header"))?;
        let (rest, value) = parse_value(rest).map_err(|_| corrupt("unparseable dictionary"))?;
        let dict = match value {
            PdfValue::Dictionary(d) => d,
            _ => return Err(corrupt("not a stream dictionary")),
        };
        let (rest, _) = lexer::skip_ws(rest).map_err(|_| corrupt("truncated"))?;
        let rest = rest
            .strip_prefix(b"stream")
            .ok_or_else(|| corrupt("missing stream keyword"))?;
        let body = strip_stream_eol(rest, true).ok_or_else(|| corrupt("bad stream EOL"))?;

        let length = dict
            .get_integer("Length")
            .ok_or_else(|| corrupt("indirect or missing /Length"))? as usize;
        if length > body.len() {
            return Err(corrupt("/Length beyond end of file"));
        }
        Ok((id, PdfStream::new(dict, body[..length].to_vec())))
    }

    fn merge_trailer(&mut self, dict: &PdfDictionary) {
        // The chain is walked newest first: the first value seen wins.
        for key in ["Size", "Root", "Info", "ID", "Encrypt"] {
            if self.trailer.get(key).is_none() {
                if let Some(value) = dict.get(key) {
                    self.trailer.insert(key, value.clone());
                }
            }
        }
    }

    fn materialize_objects(&mut self) -> Result<()> {
        let numbers: Vec<u32> = self
            .table
            .iter()
            .filter_map(|(n, e)| match e {
                XRefEntry::InUse { object: None, .. } => Some(n),
                _ => None,
            })
            .collect();

        for number in numbers {
            match self.parse_object_at(number) {
                Ok(value) => {
                    if let Some(XRefEntry::InUse { object, .. }) = self.table.get_mut(number) {
                        *object = Some(value);
                    }
                }
                Err(err) if self.relaxed() => {
                    warn!("skipping unreadable object {}: {}", number, err);
                    self.table.free(number);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn parse_object_at(&self, number: u32) -> Result<PdfValue> {
        let corrupt = |reason: String| Error::CorruptObject {
            object_number: number,
            reason,
        };

        let offset = match self.table.get(number) {
            Some(XRefEntry::InUse { offset, .. }) => *offset,
            _ => return Err(corrupt("no in-use entry".to_string())),
        };
        let slice = self
            .slice_at(offset)
            .map_err(|e| corrupt(e.to_string()))?;

        let (rest, id) =
            parse_indirect_header(slice).map_err(|_| corrupt("missing object header".to_string()))?;
        if id.number != number {
            return Err(corrupt(format!(
                "xref points at object {} instead",
                id.number
            )));
        }

        let (rest, value) =
            parse_value(rest).map_err(|_| corrupt("unparseable value".to_string()))?;
        let (rest, _) = lexer::skip_ws(rest).map_err(|_| corrupt("truncated".to_string()))?;

        let Some(after_stream) = rest.strip_prefix(b"stream") else {
            return Ok(value);
        };

        let dict = match value {
            PdfValue::Dictionary(d) => d,
            _ => return Err(corrupt("stream keyword after non-dictionary".to_string())),
        };

        let body = strip_stream_eol(after_stream, self.relaxed())
            .ok_or_else(|| corrupt("stream keyword not followed by LF or CRLF".to_string()))?;

        let payload = match self.resolve_length(&dict) {
            Some(length) if length <= body.len() => {
                let payload = &body[..length];
                // The terminator must follow; a wrong /Length is repaired
                // by scanning in relaxed mode.
                if endstream_follows(&body[length..]) {
                    payload.to_vec()
                } else if self.relaxed() {
                    warn!("object {}: /Length {} does not reach endstream", number, length);
                    scan_to_endstream(body)
                        .ok_or_else(|| corrupt("no endstream marker".to_string()))?
                } else {
                    return Err(corrupt(format!("/Length {} is wrong", length)));
                }
            }
            _ if self.relaxed() => scan_to_endstream(body)
                .ok_or_else(|| corrupt("no endstream marker".to_string()))?,
            _ => return Err(corrupt("missing or invalid /Length".to_string())),
        };

        Ok(PdfValue::Stream(PdfStream::new(dict, payload)))
    }

    /// `/Length` may be an indirect reference to an integer object that is
    /// parsed on demand straight from its offset.
    fn resolve_length(&self, dict: &PdfDictionary) -> Option<usize> {
        match dict.get("Length") {
            Some(PdfValue::Integer(n)) if *n >= 0 => Some(*n as usize),
            Some(PdfValue::Reference(r)) => {
                let offset = match self.table.get(r.number) {
                    Some(XRefEntry::InUse { offset, .. }) => *offset,
                    _ => return None,
                };
                let slice = self.slice_at(offset).ok()?;
                let (rest, _) = parse_indirect_header(slice).ok()?;
                match parse_value(rest).ok()?.1 {
                    PdfValue::Integer(n) if n >= 0 => Some(n as usize),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn setup_encryption(&mut self) -> Result<Option<(Encryption, Option<PdfReference>)>> {
        let (encrypt_dict, encrypt_ref) = match self.trailer.get("Encrypt") {
            None => return Ok(None),
            Some(PdfValue::Dictionary(d)) => (d.clone(), None),
            Some(PdfValue::Reference(r)) => {
                let dict = self
                    .table
                    .object(r.number)
                    .and_then(|v| v.as_dict())
                    .cloned()
                    .ok_or_else(|| Error::CorruptXref("unresolvable /Encrypt".to_string()))?;
                (dict, Some(*r))
            }
            Some(_) => return Err(Error::CorruptXref("/Encrypt is not a dictionary".to_string())),
        };

        let id0 = self
            .trailer
            .get_array("ID")
            .and_then(|arr| arr.get(0))
            .and_then(|v| v.as_string())
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_default();

        debug!("document is encrypted, authenticating");
        let encryption = Encryption::from_encrypt_dict(
            &encrypt_dict,
            &id0,
            &self.conf.user_pw,
            &self.conf.owner_pw,
        )?;

        // Decrypt every materialized object. The encryption dictionary is
        // never encrypted itself, and neither are xref streams.
        let numbers = self.table.in_use_numbers();
        for number in numbers {
            if encrypt_ref.map(|r| r.number) == Some(number) {
                continue;
            }
            let Some(XRefEntry::InUse {
                generation, object, ..
            }) = self.table.get_mut(number)
            else {
                continue;
            };
            let generation = *generation;
            if let Some(value) = object {
                if value
                    .as_stream()
                    .map(|s| s.dict.is_type("XRef"))
                    .unwrap_or(false)
                {
                    continue;
                }
                let mut taken = std::mem::replace(value, PdfValue::Null);
                encryption
                    .decrypt_value(ObjectId::new(number, generation), &mut taken)
                    .map_err(Error::Crypto)?;
                *value = taken;
            }
        }

        Ok(Some((encryption, encrypt_ref)))
    }

    fn materialize_compressed(&mut self) -> Result<()> {
        let pending: Vec<(u32, u32, u32)> = self
            .table
            .iter()
            .filter_map(|(n, e)| match e {
                XRefEntry::Compressed {
                    stream_number,
                    index,
                    object: None,
                } => Some((n, *stream_number, *index)),
                _ => None,
            })
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        // Decode each object stream once and serve every contained object
        // from the cache.
        let mut cache: HashMap<u32, ObjStm> = HashMap::new();

        for (number, stream_number, index) in pending {
            let objstm = match cache.entry(stream_number) {
                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    match ObjStm::load(&self.table, stream_number) {
                        Ok(objstm) => e.insert(objstm),
                        Err(err) if self.relaxed() => {
                            warn!("object stream {} unreadable: {}", stream_number, err);
                            self.table.free(number);
                            continue;
                        }
                        Err(err) => return Err(err),
                    }
                }
            };

            match objstm.extract(number, index) {
                Ok(value) => {
                    if let Some(XRefEntry::Compressed { object, .. }) =
                        self.table.get_mut(number)
                    {
                        *object = Some(value);
                    }
                }
                Err(err) if self.relaxed() => {
                    warn!("compressed object {} unreadable: {}", number, err);
                    self.table.free(number);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn finish(
        mut self,
        version: PdfVersion,
        encryption: Option<(Encryption, Option<PdfReference>)>,
    ) -> Result<Document> {
        if self.trailer.get("Root").is_none() {
            self.reconstruct_root()?;
        }
        let root = self
            .trailer
            .get_reference("Root")
            .ok_or_else(|| Error::CorruptXref("trailer /Root is not a reference".to_string()))?;

        let id = self.trailer.get_array("ID").and_then(|arr| {
            match (
                arr.get(0).and_then(|v| v.as_string()),
                arr.get(1).and_then(|v| v.as_string()),
            ) {
                (Some(a), Some(b)) => Some((a.clone(), b.clone())),
                _ => None,
            }
        });

        let info = self.trailer.get_reference("Info");
        let (encryption, encrypt_ref) = match encryption {
            Some((enc, r)) => (Some(enc), r),
            None => (None, None),
        };

        let mut doc = Document {
            xref: self.table,
            version,
            root_version: None,
            root,
            info,
            id,
            encryption,
            encrypt_ref,
        };

        // Catalog /Version may override the header version.
        if let Ok(catalog) = doc.catalog() {
            if let Some(v) = catalog.get_name("Version") {
                if let Ok(parsed) = v.without_slash().parse::<PdfVersion>() {
                    doc.root_version = Some(parsed);
                }
            }
        }

        Ok(doc)
    }

    /// Last-ditch root discovery for repaired files whose trailer was
    /// lost: the first materialized catalog dictionary wins.
    fn reconstruct_root(&mut self) -> Result<()> {
        for (number, entry) in self.table.iter() {
            if let Some(dict) = entry.object().and_then(|v| v.as_dict()) {
                if dict.is_type("Catalog") {
                    let root = PdfReference::new(number, entry.generation());
                    self.trailer.insert("Root", PdfValue::Reference(root));
                    return Ok(());
                }
            }
        }
        Err(Error::CorruptXref(
            "no catalog object found during repair".to_string(),
        ))
    }
}

/// Structure of one unpacked `/Type /ObjStm` stream.
struct ObjStm {
    data: Vec<u8>,
    first: usize,
    pairs: Vec<(u32, usize)>,
}

impl ObjStm {
    fn load(table: &XRefTable, stream_number: u32) -> Result<ObjStm> {
        let corrupt = |reason: String| Error::CorruptObject {
            object_number: stream_number,
            reason,
        };

        let stream = table
            .object(stream_number)
            .and_then(|v| v.as_stream())
            .ok_or_else(|| corrupt("container is not a stream".to_string()))?;
        if !stream.dict.is_type("ObjStm") {
            return Err(corrupt("container is not /Type /ObjStm".to_string()));
        }

        let count = stream
            .dict
            .get_integer("N")
            .ok_or_else(|| corrupt("missing /N".to_string()))? as usize;
        let first = stream
            .dict
            .get_integer("First")
            .ok_or_else(|| corrupt("missing /First".to_string()))? as usize;
        let data = stream
            .decoded_bytes()
            .map_err(|e| corrupt(format!("payload decode: {}", e)))?;
        if first > data.len() {
            return Err(corrupt("/First beyond payload".to_string()));
        }

        // /N is untrusted; capacity grows as pairs parse.
        let mut pairs = Vec::with_capacity(count.min(1024));
        let mut header = &data[..first];
        for _ in 0..count {
            let parsed = nom::sequence::tuple((
                lexer::skip_ws,
                lexer::unsigned,
                lexer::whitespace1,
                lexer::unsigned,
            ))(header);
            match parsed {
                Ok((rest, (_, number, _, offset))) => {
                    pairs.push((number as u32, offset as usize));
                    header = rest;
                }
                Err(_) => return Err(corrupt("malformed pair table".to_string())),
            }
        }

        Ok(ObjStm { data, first, pairs })
    }

    fn extract(&self, number: u32, index: u32) -> Result<PdfValue> {
        let corrupt = |reason: String| Error::CorruptObject {
            object_number: number,
            reason,
        };

        let &(stored_number, offset) = self
            .pairs
            .get(index as usize)
            .ok_or_else(|| corrupt(format!("index {} beyond pair table", index)))?;
        if stored_number != number {
            return Err(corrupt(format!(
                "pair table lists object {} at this index",
                stored_number
            )));
        }
        let start = self.first + offset;
        if start > self.data.len() {
            return Err(corrupt("offset beyond payload".to_string()));
        }
        parse_value(&self.data[start..])
            .map(|(_, v)| v)
            .map_err(|_| corrupt("unparseable value".to_string()))
    }
}

/// Consume the line terminator after the `stream` keyword: LF or CRLF,
/// never a bare CR; relaxed mode tolerates the bare CR anyway.
fn strip_stream_eol(data: &[u8], relaxed: bool) -> Option<&[u8]> {
    if let Some(rest) = data.strip_prefix(b"\r\n") {
        return Some(rest);
    }
    if let Some(rest) = data.strip_prefix(b"\n") {
        return Some(rest);
    }
    if relaxed {
        if let Some(rest) = data.strip_prefix(b"\r") {
            return Some(rest);
        }
    }
    None
}

fn endstream_follows(data: &[u8]) -> bool {
    let mut i = 0;
    while i < data.len() && lexer::is_whitespace(data[i]) {
        i += 1;
    }
    data[i..].starts_with(b"endstream")
}

/// Recover a payload by scanning for the `endstream` marker, trimming the
/// EOL that precedes it.
fn scan_to_endstream(data: &[u8]) -> Option<Vec<u8>> {
    let pos = find(data, b"endstream")?;
    let mut end = pos;
    if end > 0 && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && data[end - 1] == b'\r' {
        end -= 1;
    }
    Some(data[..end].to_vec())
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub(crate) fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

fn offset_of(buf: &[u8], slice: &[u8]) -> u64 {
    (slice.as_ptr() as usize - buf.as_ptr() as usize) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_eol_rules() {
        assert_eq!(strip_stream_eol(b"\nXY", false), Some(&b"XY"[..]));
        assert_eq!(strip_stream_eol(b"\r\nXY", false), Some(&b"XY"[..]));
        assert_eq!(strip_stream_eol(b"\rXY", false), None);
        assert_eq!(strip_stream_eol(b"\rXY", true), Some(&b"XY"[..]));
    }

    #[test]
    fn endstream_scan_trims_eol() {
        assert_eq!(
            scan_to_endstream(b"payload\r\nendstream").unwrap(),
            b"payload"
        );
        assert_eq!(scan_to_endstream(b"payload\nendstream").unwrap(), b"payload");
        assert!(scan_to_endstream(b"no marker").is_none());
    }
}
