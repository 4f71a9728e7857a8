//! Serializes a document back to conforming PDF bytes: header, body with
//! recorded offsets, then either a classic xref table or a cross-reference
//! stream, trailer and `startxref`.

pub mod serialize;

use crate::config::Configuration;
use crate::document::{Document, PdfVersion};
use crate::error::{Error, Result};
use crate::filters::encode_chain;
use crate::optimize::reachable;
use crate::types::{ObjectId, PdfDictionary, PdfName, PdfStream, PdfValue, StreamData};
use log::debug;
use serialize::{serialize_dict, serialize_value};
use std::collections::BTreeMap;
use std::io::Write;

/// Binary-marker comment after the header, four bytes with the high bit
/// set so transfer software treats the file as binary.
const BINARY_MARKER: [u8; 4] = [0xE2, 0xE3, 0xCF, 0xD3];

pub fn write_document<W: Write>(doc: &Document, conf: &Configuration, sink: &mut W) -> Result<()> {
    let bytes = write_document_bytes(doc, conf)?;
    sink.write_all(&bytes)?;
    sink.flush()?;
    Ok(())
}

pub fn write_document_bytes(doc: &Document, conf: &Configuration) -> Result<Vec<u8>> {
    Emitter {
        doc,
        conf,
        out: Vec::new(),
        offsets: BTreeMap::new(),
    }
    .run()
}

struct Emitter<'a> {
    doc: &'a Document,
    conf: &'a Configuration,
    out: Vec<u8>,
    offsets: BTreeMap<u32, (u64, u16)>,
}

impl<'a> Emitter<'a> {
    fn eol(&mut self) {
        self.out.extend_from_slice(self.conf.eol.as_bytes());
    }

    fn run(mut self) -> Result<Vec<u8>> {
        let version = self.doc.effective_version();
        self.out
            .extend_from_slice(format!("%PDF-{}", version).as_bytes());
        self.eol();
        self.out.push(b'%');
        self.out.extend_from_slice(&BINARY_MARKER);
        self.eol();

        let live = reachable(self.doc);
        debug!("writing {} reachable objects", live.len());

        for number in &live {
            let entry = match self.doc.xref.get(*number) {
                Some(entry) if entry.is_in_use() => entry,
                _ => continue,
            };
            let generation = entry.generation();

            // The encryption dictionary is re-synthesized so password and
            // permission changes always land on disk.
            let refreshed;
            let value = if self.doc.encrypt_ref.map(|r| r.number) == Some(*number) {
                let enc = self
                    .doc
                    .encryption
                    .as_ref()
                    .ok_or_else(|| Error::Internal("encrypt ref without state".to_string()))?;
                refreshed = PdfValue::Dictionary(enc.to_dict());
                &refreshed
            } else {
                match entry.object() {
                    Some(v) => v,
                    None => continue,
                }
            };

            self.emit_object(*number, generation, value)?;
        }

        let use_xref_stream = self.conf.write_xref_stream && version >= PdfVersion::V1_5;
        if use_xref_stream {
            self.finish_with_xref_stream()
        } else {
            self.finish_with_classic_table()
        }
    }

    fn emit_object(&mut self, number: u32, generation: u16, value: &PdfValue) -> Result<()> {
        self.offsets
            .insert(number, (self.out.len() as u64, generation));
        self.out
            .extend_from_slice(format!("{} {} obj", number, generation).as_bytes());
        self.eol();

        let prepared = self.prepare(number, generation, value)?;
        match prepared {
            PdfValue::Stream(stream) => self.emit_stream(&stream),
            other => {
                serialize_value(&mut self.out, &other);
                self.eol();
            }
        }

        self.out.extend_from_slice(b"endobj");
        self.eol();
        Ok(())
    }

    /// Re-encode payloads held decoded and apply encryption. Payloads read
    /// raw are preserved verbatim so opaque filters never round-trip
    /// lossily.
    fn prepare(&self, number: u32, generation: u16, value: &PdfValue) -> Result<PdfValue> {
        let mut value = value.clone();
        reencode_streams(&mut value)?;

        if let Some(enc) = &self.doc.encryption {
            // The encryption dictionary itself and xref streams are never
            // encrypted.
            let is_encrypt_dict = self.doc.encrypt_ref.map(|r| r.number) == Some(number);
            let is_xref_stream = value
                .as_stream()
                .map(|s| s.dict.is_type("XRef"))
                .unwrap_or(false);
            if !is_encrypt_dict && !is_xref_stream {
                enc.encrypt_value(ObjectId::new(number, generation), &mut value)
                    .map_err(Error::Crypto)?;
            }
        }
        Ok(value)
    }

    fn emit_stream(&mut self, stream: &PdfStream) {
        let payload = stream.data.bytes();
        let mut dict = stream.dict.clone();
        dict.insert("Length", PdfValue::Integer(payload.len() as i64));

        serialize_dict(&mut self.out, &dict);
        self.eol();
        self.out.extend_from_slice(b"stream");
        self.stream_eol();
        self.out.extend_from_slice(payload);
        self.stream_eol();
        self.out.extend_from_slice(b"endstream");
        self.eol();
    }

    /// The EOL around stream payloads must be LF or CRLF, never a bare CR.
    fn stream_eol(&mut self) {
        match self.conf.eol {
            crate::config::Eol::CrLf => self.out.extend_from_slice(b"\r\n"),
            _ => self.out.push(b'\n'),
        }
    }

    fn trailer_dict(&self, size: u32) -> PdfDictionary {
        let mut trailer = PdfDictionary::new();
        trailer.insert("Size", PdfValue::Integer(size as i64));
        trailer.insert("Root", PdfValue::Reference(self.doc.root));
        if let Some(info) = self.doc.info {
            trailer.insert("Info", PdfValue::Reference(info));
        }
        if let Some((a, b)) = &self.doc.id {
            let mut id = crate::types::PdfArray::with_capacity(2);
            id.push(PdfValue::String(a.clone()));
            id.push(PdfValue::String(b.clone()));
            trailer.insert("ID", PdfValue::Array(id));
        }
        if let Some(enc) = &self.doc.encryption {
            match self.doc.encrypt_ref {
                Some(r) => {
                    trailer.insert("Encrypt", PdfValue::Reference(r));
                }
                None => {
                    // Direct encryption dictionary in the trailer.
                    trailer.insert("Encrypt", PdfValue::Dictionary(enc.to_dict()));
                }
            }
        }
        trailer
    }

    /// Covered object numbers: the free-list head plus everything written.
    /// The xref only describes these; gaps stay unlisted, which keeps a
    /// document with one object numbered near 2^31 writable.
    fn covered_numbers(&self, extra: Option<u32>) -> Vec<u32> {
        let mut covered: Vec<u32> = Vec::with_capacity(self.offsets.len() + 2);
        covered.push(0);
        covered.extend(self.offsets.keys().copied());
        if let Some(n) = extra {
            covered.push(n);
        }
        covered.sort_unstable();
        covered.dedup();
        covered
    }

    fn finish_with_classic_table(mut self) -> Result<Vec<u8>> {
        let covered = self.covered_numbers(None);
        let size = covered.last().copied().unwrap_or(0) + 1;
        let xref_offset = self.out.len() as u64;

        self.out.extend_from_slice(b"xref");
        self.eol();

        for run in contiguous_runs(&covered) {
            self.out
                .extend_from_slice(format!("{} {}", run[0], run.len()).as_bytes());
            self.eol();
            for &number in run {
                // Entries are exactly 20 bytes including the two-byte EOL.
                let line = match self.offsets.get(&number) {
                    Some((offset, generation)) => {
                        format!("{:010} {:05} n\r\n", offset, generation)
                    }
                    None => "0000000000 65535 f\r\n".to_string(),
                };
                self.out.extend_from_slice(line.as_bytes());
            }
        }

        self.out.extend_from_slice(b"trailer");
        self.eol();
        let trailer = self.trailer_dict(size);
        serialize_dict(&mut self.out, &trailer);
        self.eol();
        self.finish_startxref(xref_offset)
    }

    fn finish_with_xref_stream(mut self) -> Result<Vec<u8>> {
        let max_written = self.offsets.keys().max().copied().unwrap_or(0);
        let stream_number = max_written + 1;
        let covered = self.covered_numbers(Some(stream_number));
        let size = stream_number + 1;
        let xref_offset = self.out.len() as u64;

        // Offsets fit in w2 bytes; the stream's own entry points here.
        let max_offset = xref_offset;
        let w2 = (((64 - max_offset.leading_zeros() as usize) + 7) / 8).max(1);

        let mut records = Vec::with_capacity(covered.len() * (3 + w2));
        for &number in &covered {
            if number == stream_number {
                push_record(&mut records, 1, xref_offset, 0, w2);
            } else if let Some((offset, generation)) = self.offsets.get(&number) {
                push_record(&mut records, 1, *offset, *generation, w2);
            } else {
                push_record(&mut records, 0, 0, 65535, w2);
            }
        }

        let encoded = encode_chain(
            &records,
            &[crate::types::StreamFilter::FlateDecode(Default::default())],
        )?;

        let mut dict = self.trailer_dict(size);
        dict.insert("Type", PdfValue::Name(PdfName::new("XRef")));
        let mut w = crate::types::PdfArray::with_capacity(3);
        w.push(PdfValue::Integer(1));
        w.push(PdfValue::Integer(w2 as i64));
        w.push(PdfValue::Integer(2));
        dict.insert("W", PdfValue::Array(w));
        let mut index = crate::types::PdfArray::new();
        for run in contiguous_runs(&covered) {
            index.push(PdfValue::Integer(run[0] as i64));
            index.push(PdfValue::Integer(run.len() as i64));
        }
        dict.insert("Index", PdfValue::Array(index));
        dict.insert("Filter", PdfValue::Name(PdfName::new("FlateDecode")));
        dict.insert("Length", PdfValue::Integer(encoded.len() as i64));

        self.out
            .extend_from_slice(format!("{} 0 obj", stream_number).as_bytes());
        self.eol();
        serialize_dict(&mut self.out, &dict);
        self.eol();
        self.out.extend_from_slice(b"stream");
        self.stream_eol();
        self.out.extend_from_slice(&encoded);
        self.stream_eol();
        self.out.extend_from_slice(b"endstream");
        self.eol();
        self.out.extend_from_slice(b"endobj");
        self.eol();

        self.finish_startxref(xref_offset)
    }

    fn finish_startxref(mut self, xref_offset: u64) -> Result<Vec<u8>> {
        self.out.extend_from_slice(b"startxref");
        self.eol();
        self.out
            .extend_from_slice(xref_offset.to_string().as_bytes());
        self.eol();
        self.out.extend_from_slice(b"%%EOF");
        self.eol();
        Ok(self.out)
    }
}

/// Split a sorted number list into runs of consecutive values.
fn contiguous_runs(sorted: &[u32]) -> Vec<&[u32]> {
    let mut runs = Vec::new();
    let mut start = 0usize;
    for i in 1..=sorted.len() {
        if i == sorted.len() || sorted[i] != sorted[i - 1] + 1 {
            runs.push(&sorted[start..i]);
            start = i;
        }
    }
    runs
}

fn push_record(records: &mut Vec<u8>, kind: u8, field2: u64, field3: u16, w2: usize) {
    records.push(kind);
    let bytes = field2.to_be_bytes();
    records.extend_from_slice(&bytes[8 - w2..]);
    records.extend_from_slice(&field3.to_be_bytes());
}

/// Re-apply filter chains to payloads that were held decoded; raw payloads
/// are untouched.
fn reencode_streams(value: &mut PdfValue) -> Result<()> {
    match value {
        PdfValue::Stream(stream) => {
            if let StreamData::Decoded(plain) = &stream.data {
                let filters = stream.filters();
                let encoded = if filters.is_empty() {
                    plain.clone()
                } else {
                    encode_chain(plain, &filters)?
                };
                stream.data = StreamData::Raw(encoded);
            }
        }
        PdfValue::Array(arr) => {
            for v in arr.iter_mut() {
                reencode_streams(v)?;
            }
        }
        PdfValue::Dictionary(dict) => {
            for (_, v) in dict.iter_mut() {
                reencode_streams(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}
