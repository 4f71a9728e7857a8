//! Canonical wire form for every object type. One space between tokens,
//! names `#`-escaped, reals in their shortest exponent-free decimal form.

use crate::parser::lexer::is_regular;
use crate::types::{PdfArray, PdfDictionary, PdfName, PdfString, PdfValue};

pub fn serialize_value(out: &mut Vec<u8>, value: &PdfValue) {
    match value {
        PdfValue::Null => out.extend_from_slice(b"null"),
        PdfValue::Boolean(true) => out.extend_from_slice(b"true"),
        PdfValue::Boolean(false) => out.extend_from_slice(b"false"),
        PdfValue::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        PdfValue::Real(r) => out.extend_from_slice(format_real(*r).as_bytes()),
        PdfValue::String(s) => serialize_string(out, s),
        PdfValue::Name(n) => serialize_name(out, n),
        PdfValue::Array(a) => serialize_array(out, a),
        PdfValue::Dictionary(d) => serialize_dict(out, d),
        PdfValue::Reference(r) => {
            out.extend_from_slice(format!("{} {} R", r.number, r.generation).as_bytes())
        }
        // Stream payload emission needs the surrounding object context;
        // the writer handles it and only the dictionary is emitted here.
        PdfValue::Stream(s) => serialize_dict(out, &s.dict),
    }
}

pub fn serialize_name(out: &mut Vec<u8>, name: &PdfName) {
    out.push(b'/');
    for &byte in name.without_slash().as_bytes() {
        if is_regular(byte) && (0x21..0x7F).contains(&byte) && byte != b'#' {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{:02X}", byte).as_bytes());
        }
    }
}

pub fn serialize_string(out: &mut Vec<u8>, string: &PdfString) {
    match string {
        PdfString::Literal(bytes) => {
            out.push(b'(');
            for &byte in bytes {
                match byte {
                    b'(' | b')' | b'\\' => {
                        out.push(b'\\');
                        out.push(byte);
                    }
                    _ => out.push(byte),
                }
            }
            out.push(b')');
        }
        PdfString::Hexadecimal(bytes) => {
            out.push(b'<');
            for byte in bytes {
                out.extend_from_slice(format!("{:02X}", byte).as_bytes());
            }
            out.push(b'>');
        }
    }
}

pub fn serialize_array(out: &mut Vec<u8>, array: &PdfArray) {
    out.push(b'[');
    for (i, value) in array.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        serialize_value(out, value);
    }
    out.push(b']');
}

pub fn serialize_dict(out: &mut Vec<u8>, dict: &PdfDictionary) {
    out.extend_from_slice(b"<<");
    for (i, (key, value)) in dict.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        serialize_name(out, key);
        out.push(b' ');
        serialize_value(out, value);
    }
    out.extend_from_slice(b">>");
}

/// Shortest decimal form that round-trips, never using an exponent.
pub fn format_real(r: f64) -> String {
    if !r.is_finite() {
        return "0".to_string();
    }
    let shortest = format!("{:?}", r);
    if !shortest.contains(['e', 'E']) {
        return shortest;
    }
    // Exponent range: fall back to plain expansion and trim.
    let mut expanded = format!("{:.10}", r);
    while expanded.ends_with('0') {
        expanded.pop();
    }
    if expanded.ends_with('.') {
        expanded.pop();
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PdfReference;

    fn rendered(value: &PdfValue) -> String {
        let mut out = Vec::new();
        serialize_value(&mut out, value);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn scalars() {
        assert_eq!(rendered(&PdfValue::Null), "null");
        assert_eq!(rendered(&PdfValue::Boolean(true)), "true");
        assert_eq!(rendered(&PdfValue::Integer(-7)), "-7");
        assert_eq!(rendered(&PdfValue::Real(2.5)), "2.5");
        assert_eq!(
            rendered(&PdfValue::Reference(PdfReference::new(12, 0))),
            "12 0 R"
        );
    }

    #[test]
    fn reals_have_no_exponent() {
        assert_eq!(format_real(4.0), "4.0");
        assert_eq!(format_real(0.5), "0.5");
        assert!(!format_real(1e-7).contains('e'));
        assert!(!format_real(0.1 + 0.2).contains('e'));
    }

    #[test]
    fn names_escape_irregular_bytes() {
        let mut out = Vec::new();
        serialize_name(&mut out, &PdfName::new("A B#C"));
        assert_eq!(out, b"/A#20B#23C");
    }

    #[test]
    fn literal_string_escapes() {
        let mut out = Vec::new();
        serialize_string(&mut out, &PdfString::new_literal(b"a(b)c\\d".to_vec()));
        assert_eq!(out, br"(a\(b\)c\\d)");
    }

    #[test]
    fn hex_string_uppercase() {
        let mut out = Vec::new();
        serialize_string(&mut out, &PdfString::new_hex(vec![0xAB, 0x01]));
        assert_eq!(out, b"<AB01>");
    }

    #[test]
    fn nested_structure() {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfValue::Name(PdfName::new("Page")));
        let mut arr = PdfArray::new();
        arr.push(PdfValue::Integer(0));
        arr.push(PdfValue::Real(612.0));
        dict.insert("MediaBox", PdfValue::Array(arr));
        assert_eq!(
            rendered(&PdfValue::Dictionary(dict)),
            "<</Type /Page /MediaBox [0 612.0]>>"
        );
    }
}
