// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model format identification.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Size of the binary STL header (80-byte comment + u32 triangle count)
pub const STL_HEADER_LEN: usize = 84;

/// Size of one binary STL facet record
pub const STL_FACET_LEN: usize = 50;

/// Supported model file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ModelFormat {
    Stl,
    Obj,
}

impl ModelFormat {
    /// Lowercase name as used in file extensions and cache records
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::Stl => "stl",
            ModelFormat::Obj => "obj",
        }
    }

    /// Guess the format from a path or URL, ignoring query strings
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let ext = path.rsplit_once('.')?.1;
        ext.parse().ok()
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stl" => Ok(ModelFormat::Stl),
            "obj" => Ok(ModelFormat::Obj),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// STL encoding variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StlEncoding {
    Binary,
    Ascii,
}

/// Decide whether STL bytes are ASCII or binary.
///
/// Binary files may also begin with `solid`, so the declared facet count is
/// checked against the buffer length first. For partial buffers the length
/// check cannot succeed, so the presence of a `facet` keyword near the start
/// decides.
pub fn detect_stl_encoding(bytes: &[u8]) -> StlEncoding {
    if bytes.len() >= STL_HEADER_LEN {
        let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
        let expected = count
            .checked_mul(STL_FACET_LEN)
            .and_then(|body| body.checked_add(STL_HEADER_LEN));
        if expected == Some(bytes.len()) {
            return StlEncoding::Binary;
        }
    }

    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let body = &bytes[start..];
    if body.len() >= 5 && body[..5].eq_ignore_ascii_case(b"solid") {
        let probe = &body[..body.len().min(1024)];
        if memchr::memmem::find(probe, b"facet").is_some() || body.len() < STL_HEADER_LEN {
            return StlEncoding::Ascii;
        }
    }

    StlEncoding::Binary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(ModelFormat::from_path("models/part.STL"), Some(ModelFormat::Stl));
        assert_eq!(
            ModelFormat::from_path("/uploads/bracket.obj?v=1.0.0&id=42"),
            Some(ModelFormat::Obj)
        );
        assert_eq!(ModelFormat::from_path("archive.zip"), None);
        assert_eq!(ModelFormat::from_path("no_extension"), None);
    }

    #[test]
    fn test_format_from_str_rejects_unknown() {
        assert!(matches!(
            "3mf".parse::<ModelFormat>(),
            Err(Error::UnsupportedFormat(_))
        ));
        assert_eq!(" OBJ ".parse::<ModelFormat>().unwrap(), ModelFormat::Obj);
    }

    #[test]
    fn test_detect_binary_with_solid_header() {
        let mut bytes = vec![0u8; STL_HEADER_LEN + STL_FACET_LEN];
        bytes[..5].copy_from_slice(b"solid");
        bytes[80..84].copy_from_slice(&1u32.to_le_bytes());
        assert_eq!(detect_stl_encoding(&bytes), StlEncoding::Binary);
    }

    #[test]
    fn test_detect_huge_declared_count_is_not_binary() {
        let mut bytes = vec![0u8; STL_HEADER_LEN + STL_FACET_LEN];
        bytes[..5].copy_from_slice(b"solid");
        bytes[80..84].copy_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(b"\n facet normal 0 0 1\n");
        assert_eq!(detect_stl_encoding(&bytes), StlEncoding::Ascii);
    }

    #[test]
    fn test_detect_ascii() {
        let text = b"solid cube\n facet normal 0 0 1\n  outer loop\n";
        assert_eq!(detect_stl_encoding(text), StlEncoding::Ascii);
    }
}
