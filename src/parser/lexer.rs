//! Byte-level token primitives. No character-set assumptions beyond the
//! PDF whitespace and delimiter classes.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, map_res, opt, recognize, rest, value},
    multi::many0,
    sequence::{pair, preceded, tuple},
    IResult,
};

pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

pub fn is_delimiter(c: u8) -> bool {
    matches!(
        c,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

pub fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

pub fn whitespace0(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(is_whitespace)(input)
}

pub fn whitespace1(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_whitespace)(input)
}

pub fn comment(input: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(
        char('%'),
        alt((take_until("\n"), take_until("\r"), rest)),
    )(input)
}

/// Whitespace and `%` comments, any number of either.
pub fn skip_ws(input: &[u8]) -> IResult<&[u8], ()> {
    value(
        (),
        many0(alt((value((), whitespace1), value((), comment)))),
    )(input)
}

pub fn integer(input: &[u8]) -> IResult<&[u8], i64> {
    map_res(recognize(pair(opt(one_of("+-")), digit1)), |s: &[u8]| {
        // digits only, always valid UTF-8
        std::str::from_utf8(s).unwrap().parse::<i64>()
    })(input)
}

pub fn unsigned(input: &[u8]) -> IResult<&[u8], u64> {
    map_res(digit1, |s: &[u8]| {
        std::str::from_utf8(s).unwrap().parse::<u64>()
    })(input)
}

pub fn real(input: &[u8]) -> IResult<&[u8], f64> {
    map_res(
        recognize(tuple((
            opt(one_of("+-")),
            alt((
                recognize(tuple((digit1, char('.'), opt(digit1)))),
                recognize(pair(char('.'), digit1)),
            )),
        ))),
        |s: &[u8]| std::str::from_utf8(s).unwrap().parse::<f64>(),
    )(input)
}

/// A name with `#xx` escapes resolved. The empty name `/` is legal.
pub fn name(input: &[u8]) -> IResult<&[u8], String> {
    preceded(
        char('/'),
        map(take_while(is_regular), |bytes: &[u8]| {
            let mut out = String::with_capacity(bytes.len());
            let mut iter = bytes.iter();
            while let Some(&c) = iter.next() {
                if c == b'#' {
                    let hi = iter.next().copied();
                    let lo = iter.next().copied();
                    if let (Some(hi), Some(lo)) = (hi, lo) {
                        let pair = [hi, lo];
                        if let Ok(byte) =
                            u8::from_str_radix(&String::from_utf8_lossy(&pair), 16)
                        {
                            out.push(byte as char);
                            continue;
                        }
                    }
                    out.push('#');
                } else {
                    out.push(c as char);
                }
            }
            out
        }),
    )(input)
}

/// A parenthesized literal string: balanced parens, backslash escapes,
/// octal escapes, and `\<EOL>` line continuations.
pub fn literal_string(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let err = || nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char));
    if input.first() != Some(&b'(') {
        return Err(err());
    }

    let mut out = Vec::new();
    let mut depth = 1usize;
    let mut i = 1usize;

    while i < input.len() {
        match input[i] {
            b'(' => {
                depth += 1;
                out.push(b'(');
                i += 1;
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[i + 1..], out));
                }
                out.push(b')');
                i += 1;
            }
            b'\\' => {
                i += 1;
                let Some(&escaped) = input.get(i) else { break };
                match escaped {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0C),
                    b'(' => out.push(b'('),
                    b')' => out.push(b')'),
                    b'\\' => out.push(b'\\'),
                    b'0'..=b'7' => {
                        let mut code = 0u16;
                        let mut digits = 0;
                        while digits < 3 {
                            match input.get(i) {
                                Some(&d @ b'0'..=b'7') => {
                                    code = code * 8 + (d - b'0') as u16;
                                    i += 1;
                                    digits += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push(code as u8);
                        continue;
                    }
                    b'\r' => {
                        // line continuation, swallow an optional LF too
                        if input.get(i + 1) == Some(&b'\n') {
                            i += 1;
                        }
                    }
                    b'\n' => {}
                    other => out.push(other),
                }
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }

    Err(err())
}

/// An angle-bracketed hex string; whitespace is ignored and an odd final
/// digit is padded with 0.
pub fn hex_string(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let err = || nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char));
    if input.first() != Some(&b'<') || input.get(1) == Some(&b'<') {
        return Err(err());
    }

    let mut out = Vec::new();
    let mut pending: Option<u8> = None;
    let mut i = 1usize;

    while i < input.len() {
        let byte = input[i];
        if byte == b'>' {
            if let Some(high) = pending {
                out.push(high << 4);
            }
            return Ok((&input[i + 1..], out));
        }
        if is_whitespace(byte) {
            i += 1;
            continue;
        }
        let digit = (byte as char).to_digit(16).ok_or_else(err)? as u8;
        match pending.take() {
            Some(high) => out.push(high << 4 | digit),
            None => pending = Some(digit),
        }
        i += 1;
    }

    Err(err())
}

/// Match one of the PDF keywords at a token boundary.
pub fn keyword<'a>(kw: &'static str) -> impl Fn(&'a [u8]) -> IResult<&'a [u8], &'a [u8]> {
    move |input: &'a [u8]| {
        let (rest, matched) = tag(kw.as_bytes())(input)?;
        // Keywords are regular characters; the next byte must not extend
        // the token, otherwise `null` would match `nulls`.
        if rest.first().copied().map(is_regular).unwrap_or(false) {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        }
        Ok((rest, matched))
    }
}

/// The `%PDF-x.y` header.
pub fn pdf_header(input: &[u8]) -> IResult<&[u8], (u8, u8)> {
    let (input, _) = tag(b"%PDF-")(input)?;
    let (input, major) = map_res(digit1, |s: &[u8]| {
        std::str::from_utf8(s).unwrap().parse::<u8>()
    })(input)?;
    let (input, _) = char('.')(input)?;
    let (input, minor) = map_res(digit1, |s: &[u8]| {
        std::str::from_utf8(s).unwrap().parse::<u8>()
    })(input)?;
    Ok((input, (major, minor)))
}
