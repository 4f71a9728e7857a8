//! Cross-reference parsing: classic `xref` sections with their trailer,
//! and the packed binary records of `/Type /XRef` streams.

use crate::error::{Error, Result};
use crate::parser::lexer::*;
use crate::parser::object_parser::parse_value;
use crate::types::{PdfDictionary, PdfStream, PdfValue};
use crate::xref::XRefEntry;
use nom::{
    branch::alt,
    character::complete::char,
    combinator::map,
    multi::many1,
    IResult,
};

/// A parsed classic section: its entries and the trailer dictionary that
/// terminates it.
pub struct ClassicSection {
    pub entries: Vec<(u32, XRefEntry)>,
    pub trailer: PdfDictionary,
}

/// Parse `xref` + subsections + `trailer <<...>>` at the start of `input`.
pub fn parse_classic_section(input: &[u8]) -> IResult<&[u8], ClassicSection> {
    let (input, _) = keyword("xref")(input)?;
    let (input, _) = skip_ws(input)?;
    let (input, sections) = many1(parse_subsection)(input)?;
    let (input, _) = skip_ws(input)?;
    let (input, _) = keyword("trailer")(input)?;
    let (input, trailer_value) = parse_value(input)?;

    let trailer = match trailer_value {
        PdfValue::Dictionary(d) => d,
        _ => {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )))
        }
    };

    let mut entries = Vec::new();
    for section in sections {
        entries.extend(section);
    }
    Ok((input, ClassicSection { entries, trailer }))
}

fn parse_subsection(input: &[u8]) -> IResult<&[u8], Vec<(u32, XRefEntry)>> {
    let (input, first) = unsigned(input)?;
    let (input, _) = whitespace1(input)?;
    let (input, count) = unsigned(input)?;
    let (input, _) = skip_ws(input)?;

    // The declared count is untrusted; capacity grows as entries parse.
    let mut entries = Vec::with_capacity(count.min(1024) as usize);
    let mut rest = input;
    for i in 0..count {
        let (next, entry) = parse_entry(rest)?;
        entries.push((first as u32 + i as u32, entry));
        rest = next;
    }
    Ok((rest, entries))
}

/// One 20-byte entry: `oooooooooo ggggg n|f` plus its two-byte terminator.
fn parse_entry(input: &[u8]) -> IResult<&[u8], XRefEntry> {
    let (input, offset) = unsigned(input)?;
    let (input, _) = whitespace1(input)?;
    let (input, generation) = unsigned(input)?;
    let (input, _) = whitespace1(input)?;
    let (input, status) = alt((char('n'), char('f')))(input)?;
    let (input, _) = map(whitespace0, |_| ())(input)?;

    let entry = match status {
        'n' => XRefEntry::InUse {
            offset,
            generation: generation as u16,
            object: None,
        },
        _ => XRefEntry::Free {
            next_free: offset as u32,
            generation: generation as u16,
        },
    };
    Ok((input, entry))
}

/// Field widths of an xref stream, `/W [w1 w2 w3]`.
pub struct XRefStreamLayout {
    pub widths: [usize; 3],
    pub index: Vec<(u32, u32)>,
}

pub fn stream_layout(stream: &PdfStream) -> Result<XRefStreamLayout> {
    let dict = &stream.dict;
    let w = dict
        .get_array("W")
        .ok_or_else(|| Error::CorruptXref("xref stream missing /W".to_string()))?;
    if w.len() != 3 {
        return Err(Error::CorruptXref(format!(
            "xref stream /W has {} entries",
            w.len()
        )));
    }
    let widths = [
        w[0].as_integer().unwrap_or(0) as usize,
        w[1].as_integer().unwrap_or(0) as usize,
        w[2].as_integer().unwrap_or(0) as usize,
    ];
    if widths.iter().sum::<usize>() == 0 || widths.iter().any(|&n| n > 8) {
        return Err(Error::CorruptXref(format!("invalid /W {:?}", widths)));
    }

    let index = match dict.get_array("Index") {
        Some(arr) => {
            let nums: Vec<i64> = arr.iter().filter_map(|v| v.as_integer()).collect();
            if nums.len() % 2 != 0 {
                return Err(Error::CorruptXref("odd /Index length".to_string()));
            }
            nums.chunks(2).map(|c| (c[0] as u32, c[1] as u32)).collect()
        }
        None => {
            let size = dict.get_integer("Size").unwrap_or(0);
            vec![(0, size as u32)]
        }
    };

    Ok(XRefStreamLayout { widths, index })
}

/// Unpack the decoded payload of an xref stream into entries.
pub fn parse_stream_entries(
    layout: &XRefStreamLayout,
    decoded: &[u8],
) -> Result<Vec<(u32, XRefEntry)>> {
    let [w1, w2, w3] = layout.widths;
    let record = w1 + w2 + w3;
    let mut entries = Vec::new();
    let mut pos = 0usize;

    for &(first, count) in &layout.index {
        for i in 0..count {
            if pos + record > decoded.len() {
                return Ok(entries);
            }
            let data = &decoded[pos..pos + record];
            pos += record;

            // Field 1 defaults to type 1 when absent.
            let kind = if w1 > 0 { be_int(&data[..w1]) } else { 1 };
            let f2 = be_int(&data[w1..w1 + w2]);
            let f3 = be_int(&data[w1 + w2..]);

            let entry = match kind {
                0 => XRefEntry::Free {
                    next_free: f2 as u32,
                    generation: f3 as u16,
                },
                1 => XRefEntry::InUse {
                    offset: f2,
                    generation: f3 as u16,
                    object: None,
                },
                2 => XRefEntry::Compressed {
                    stream_number: f2 as u32,
                    index: f3 as u32,
                    object: None,
                },
                other => {
                    return Err(Error::CorruptXref(format!(
                        "xref stream entry type {}",
                        other
                    )))
                }
            };
            entries.push((first + i, entry));
        }
    }

    Ok(entries)
}

fn be_int(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PdfName;

    #[test]
    fn classic_section_with_two_subsections() {
        let input = b"xref\n0 2\n0000000000 65535 f \n0000000017 00000 n \n4 1\n0000000123 00000 n \ntrailer\n<< /Size 5 /Root 1 0 R >>\nstartxref";
        let (rest, section) = parse_classic_section(input).unwrap();
        assert_eq!(section.entries.len(), 3);
        assert_eq!(section.entries[0].0, 0);
        assert!(matches!(
            section.entries[0].1,
            XRefEntry::Free {
                generation: 65535,
                ..
            }
        ));
        assert!(matches!(
            section.entries[1].1,
            XRefEntry::InUse { offset: 17, .. }
        ));
        assert_eq!(section.entries[2].0, 4);
        assert_eq!(section.trailer.get_integer("Size"), Some(5));
        assert!(rest.starts_with(b"startxref"));
    }

    #[test]
    fn stream_entries_decode() {
        // W [1 2 1], Index [0 3]
        let mut dict = PdfDictionary::new();
        let mut w = crate::types::PdfArray::new();
        w.push(PdfValue::Integer(1));
        w.push(PdfValue::Integer(2));
        w.push(PdfValue::Integer(1));
        dict.insert("W", PdfValue::Array(w));
        dict.insert("Size", PdfValue::Integer(3));
        dict.insert("Type", PdfValue::Name(PdfName::new("XRef")));
        let stream = PdfStream::new(dict, Vec::new());
        let layout = stream_layout(&stream).unwrap();

        let data = [
            0u8, 0, 0, 255, // free, next 0, gen 255
            1, 0, 17, 0, // in use at 17
            2, 0, 5, 2, // compressed in stream 5 index 2
        ];
        let entries = parse_stream_entries(&layout, &data).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[0].1, XRefEntry::Free { .. }));
        assert!(matches!(
            entries[1].1,
            XRefEntry::InUse { offset: 17, .. }
        ));
        assert!(matches!(
            entries[2].1,
            XRefEntry::Compressed {
                stream_number: 5,
                index: 2,
                ..
            }
        ));
    }
}
