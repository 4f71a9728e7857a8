//! Page-selection syntax: comma-separated terms composed by union.
//!
//! `3` one page, `2-5` inclusive range, `-4` pages 1..4, `7-` pages
//! 7..end, `even` / `odd` by one-based position.

use crate::error::{Error, Result};
use std::collections::BTreeSet;

/// Parse a selection against a known page count into sorted zero-based
/// indices.
pub fn parse(selection: &str, page_count: usize) -> Result<Vec<usize>> {
    let bad = |term: &str| Error::InvalidPageSelection(term.to_string());

    let mut picked: BTreeSet<usize> = BTreeSet::new();
    for raw in selection.split(',') {
        let term = raw.trim();
        if term.is_empty() {
            return Err(bad(raw));
        }
        match term {
            "even" => picked.extend((1..=page_count).filter(|n| n % 2 == 0).map(|n| n - 1)),
            "odd" => picked.extend((1..=page_count).filter(|n| n % 2 == 1).map(|n| n - 1)),
            _ => {
                let (first, last) = parse_range(term, page_count)?;
                picked.extend((first - 1)..last);
            }
        }
    }
    Ok(picked.into_iter().collect())
}

/// One-based inclusive range of a single numeric term.
fn parse_range(term: &str, page_count: usize) -> Result<(usize, usize)> {
    let bad = || Error::InvalidPageSelection(term.to_string());

    let (first, last) = if let Some(rest) = term.strip_prefix('-') {
        // "-N": 1..N
        (1, rest.parse::<usize>().map_err(|_| bad())?)
    } else if let Some(rest) = term.strip_suffix('-') {
        // "N-": N..end
        (rest.parse::<usize>().map_err(|_| bad())?, page_count)
    } else if let Some((a, b)) = term.split_once('-') {
        (
            a.trim().parse::<usize>().map_err(|_| bad())?,
            b.trim().parse::<usize>().map_err(|_| bad())?,
        )
    } else {
        let n = term.parse::<usize>().map_err(|_| bad())?;
        (n, n)
    };

    if first == 0 || last < first {
        return Err(bad());
    }
    if last > page_count {
        return Err(Error::PageIndexOutOfRange {
            index: last,
            count: page_count,
        });
    }
    Ok((first, last))
}
