// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fast Direct Parsing Module
//!
//! Zero-allocation scanning helpers shared by the text formats (ASCII STL
//! and OBJ). Lines are located with memchr and numbers are parsed straight
//! from the byte slice, bypassing `str` conversion entirely.

/// Check if byte is a digit, sign, or decimal point (start of number)
#[inline(always)]
fn is_number_start(b: u8) -> bool {
    b.is_ascii_digit() || b == b'-' || b == b'+' || b == b'.'
}

/// Iterator over lines of a byte buffer, yielding `(line_number, line)`.
///
/// Line numbers start at 1. Trailing `\r` is stripped.
pub struct Lines<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Lines<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            line: 0,
        }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = (usize, &'a [u8]);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let rest = &self.bytes[self.pos..];
        let end = memchr::memchr(b'\n', rest).unwrap_or(rest.len());
        let mut line = &rest[..end];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        self.pos += end + 1;
        self.line += 1;
        Some((self.line, line))
    }
}

/// Cut a partial text buffer at its last newline so only complete lines remain
#[inline]
pub fn complete_lines(bytes: &[u8]) -> &[u8] {
    match memchr::memrchr(b'\n', bytes) {
        Some(idx) => &bytes[..=idx],
        None => &[],
    }
}

/// Strip leading ASCII whitespace
#[inline]
pub fn trim_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// Split off the first whitespace-delimited keyword of a line
#[inline]
pub fn split_keyword(line: &[u8]) -> (&[u8], &[u8]) {
    let line = trim_start(line);
    let end = line
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(line.len());
    (&line[..end], &line[end..])
}

/// Parse up to `N` floats from a byte slice.
///
/// Returns `None` when fewer than `N` numbers are present.
///
/// # Performance
/// - Zero intermediate allocations
/// - Uses fast-float for SIMD-accelerated parsing
#[inline]
pub fn parse_floats<const N: usize>(bytes: &[u8]) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    let mut found = 0;
    let mut pos = 0;
    let len = bytes.len();

    while pos < len && found < N {
        while pos < len && !is_number_start(bytes[pos]) {
            pos += 1;
        }
        if pos >= len {
            break;
        }

        match fast_float::parse_partial::<f32, _>(&bytes[pos..]) {
            Ok((value, consumed)) if consumed > 0 => {
                out[found] = value;
                found += 1;
                pos += consumed;
            }
            _ => {
                pos += 1;
            }
        }
    }

    (found == N).then_some(out)
}

/// Parse a signed integer at the start of `bytes`, returning the value and
/// the number of bytes consumed.
#[inline]
pub fn parse_int_prefix(bytes: &[u8]) -> Option<(i64, usize)> {
    match lexical_core::parse_partial::<i64>(bytes) {
        Ok((value, consumed)) if consumed > 0 => Some((value, consumed)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_floats_exact() {
        let parsed = parse_floats::<3>(b"  1.5 -2e1 +3.").unwrap();
        assert!((parsed[0] - 1.5).abs() < 1e-6);
        assert!((parsed[1] + 20.0).abs() < 1e-6);
        assert!((parsed[2] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_floats_too_few() {
        assert!(parse_floats::<3>(b"1.0 2.0").is_none());
    }

    #[test]
    fn test_lines_strip_carriage_return() {
        let lines: Vec<_> = Lines::new(b"v 1 2 3\r\nf 1 2 3\n").collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (1, &b"v 1 2 3"[..]));
        assert_eq!(lines[1], (2, &b"f 1 2 3"[..]));
    }

    #[test]
    fn test_complete_lines_drops_tail() {
        assert_eq!(complete_lines(b"a\nb\npartial"), b"a\nb\n");
        assert!(complete_lines(b"no newline yet").is_empty());
    }

    #[test]
    fn test_parse_int_prefix() {
        assert_eq!(parse_int_prefix(b"-12/3"), Some((-12, 3)));
        assert_eq!(parse_int_prefix(b"/3"), None);
    }

    #[test]
    fn test_split_keyword() {
        let (kw, rest) = split_keyword(b"  vertex 1 2 3");
        assert_eq!(kw, b"vertex");
        assert_eq!(rest, b" 1 2 3");
    }
}
