//! Recursive-descent object parsing over the lexer's primitives.
//!
//! Stream payloads are not consumed here: the reader slices them out by
//! `/Length` after resolving it through the xref table.

use crate::parser::lexer::*;
use crate::types::*;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char,
    combinator::{map, value},
    multi::many0,
    sequence::{preceded, separated_pair, terminated},
    IResult,
};

const MAX_NESTING_DEPTH: usize = 256;

/// Parse one object value, leading whitespace and comments skipped.
pub fn parse_value(input: &[u8]) -> IResult<&[u8], PdfValue> {
    parse_value_at_depth(input, 0)
}

fn parse_value_at_depth(input: &[u8], depth: usize) -> IResult<&[u8], PdfValue> {
    if depth > MAX_NESTING_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TooLarge,
        )));
    }

    preceded(
        skip_ws,
        alt((
            parse_null,
            parse_boolean,
            parse_reference,
            parse_number,
            parse_string,
            parse_name_value,
            |i| parse_array(i, depth + 1),
            |i| parse_dictionary(i, depth + 1),
        )),
    )(input)
}

fn parse_null(input: &[u8]) -> IResult<&[u8], PdfValue> {
    value(PdfValue::Null, keyword("null"))(input)
}

fn parse_boolean(input: &[u8]) -> IResult<&[u8], PdfValue> {
    alt((
        value(PdfValue::Boolean(true), keyword("true")),
        value(PdfValue::Boolean(false), keyword("false")),
    ))(input)
}

fn parse_number(input: &[u8]) -> IResult<&[u8], PdfValue> {
    alt((map(real, PdfValue::Real), map(integer, PdfValue::Integer)))(input)
}

fn parse_string(input: &[u8]) -> IResult<&[u8], PdfValue> {
    alt((
        map(literal_string, |b| {
            PdfValue::String(PdfString::new_literal(b))
        }),
        map(hex_string, |b| PdfValue::String(PdfString::new_hex(b))),
    ))(input)
}

fn parse_name_value(input: &[u8]) -> IResult<&[u8], PdfValue> {
    map(name, |n| PdfValue::Name(PdfName::new(n)))(input)
}

/// Two bare non-negative integers followed by `R` collapse into an
/// indirect reference; tried before plain numbers so `1 0 R` does not
/// parse as an integer.
fn parse_reference(input: &[u8]) -> IResult<&[u8], PdfValue> {
    map(
        separated_pair(
            unsigned,
            whitespace1,
            terminated(unsigned, preceded(whitespace1, keyword("R"))),
        ),
        |(number, generation)| {
            PdfValue::Reference(PdfReference::new(number as u32, generation as u16))
        },
    )(input)
}

fn parse_array(input: &[u8], depth: usize) -> IResult<&[u8], PdfValue> {
    let (input, _) = char('[')(input)?;
    let (input, values) = many0(|i| parse_value_at_depth(i, depth + 1))(input)?;
    let (input, _) = preceded(skip_ws, char(']'))(input)?;
    Ok((input, PdfValue::Array(PdfArray::from(values))))
}

fn parse_dictionary(input: &[u8], depth: usize) -> IResult<&[u8], PdfValue> {
    let (input, _) = tag(b"<<")(input)?;
    let (input, pairs) = many0(preceded(
        skip_ws,
        separated_pair(name, skip_ws, |i| parse_value_at_depth(i, depth + 1)),
    ))(input)?;
    let (input, _) = preceded(skip_ws, tag(b">>"))(input)?;

    let mut dict = PdfDictionary::new();
    for (key, value) in pairs {
        dict.insert(key, value);
    }
    Ok((input, PdfValue::Dictionary(dict)))
}

/// The `n g obj` header of an indirect object.
pub fn parse_indirect_header(input: &[u8]) -> IResult<&[u8], ObjectId> {
    let (input, _) = skip_ws(input)?;
    let (input, number) = unsigned(input)?;
    let (input, _) = whitespace1(input)?;
    let (input, generation) = unsigned(input)?;
    let (input, _) = whitespace1(input)?;
    let (input, _) = keyword("obj")(input)?;
    Ok((input, ObjectId::new(number as u32, generation as u16)))
}
