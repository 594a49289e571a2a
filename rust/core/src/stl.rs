// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STL decoding (binary and ASCII).
//!
//! STL stores a triangle soup. Corners are welded on their exact bit
//! pattern while decoding so the output is an indexed mesh with shared
//! vertices, which the simplifier needs for edge collapses.

use crate::decoder::{DecodeMode, ParsedGeometry};
use crate::error::{Error, Result};
use crate::fast_parse::{complete_lines, parse_floats, split_keyword, Lines};
use crate::format::{detect_stl_encoding, ModelFormat, StlEncoding, STL_FACET_LEN, STL_HEADER_LEN};
use rustc_hash::FxHashMap;

/// Welds identical positions into shared vertices
struct Welder {
    positions: Vec<f32>,
    indices: Vec<u32>,
    lookup: FxHashMap<[u32; 3], u32>,
}

impl Welder {
    fn with_capacity(triangles: usize) -> Self {
        Self {
            positions: Vec::with_capacity(triangles * 3),
            indices: Vec::with_capacity(triangles * 3),
            lookup: FxHashMap::with_capacity_and_hasher(triangles, Default::default()),
        }
    }

    #[inline]
    fn key(p: [f32; 3]) -> [u32; 3] {
        // -0.0 and 0.0 must weld together
        let norm = |v: f32| if v == 0.0 { 0.0f32.to_bits() } else { v.to_bits() };
        [norm(p[0]), norm(p[1]), norm(p[2])]
    }

    #[inline]
    fn push_corner(&mut self, p: [f32; 3]) {
        let next = (self.positions.len() / 3) as u32;
        let idx = *self.lookup.entry(Self::key(p)).or_insert_with(|| {
            self.positions.extend_from_slice(&p);
            next
        });
        self.indices.push(idx);
    }

    fn push_triangle(&mut self, corners: [[f32; 3]; 3]) {
        if corners.iter().flatten().any(|v| !v.is_finite()) {
            return;
        }
        for corner in corners {
            self.push_corner(corner);
        }
    }

    fn finish(self) -> Result<ParsedGeometry> {
        if self.indices.is_empty() {
            return Err(Error::EmptyGeometry("STL"));
        }
        Ok(ParsedGeometry {
            format: ModelFormat::Stl,
            positions: self.positions,
            indices: self.indices,
        })
    }
}

/// Decode STL bytes, auto-detecting binary vs ASCII encoding
pub fn decode_stl(bytes: &[u8], mode: DecodeMode) -> Result<ParsedGeometry> {
    match detect_stl_encoding(bytes) {
        StlEncoding::Binary => decode_binary(bytes, mode),
        StlEncoding::Ascii => decode_ascii(bytes, mode),
    }
}

#[inline]
fn read_vec3(record: &[u8], offset: usize) -> [f32; 3] {
    let f = |o: usize| {
        f32::from_le_bytes([
            record[offset + o],
            record[offset + o + 1],
            record[offset + o + 2],
            record[offset + o + 3],
        ])
    };
    [f(0), f(4), f(8)]
}

fn decode_binary(bytes: &[u8], mode: DecodeMode) -> Result<ParsedGeometry> {
    if bytes.len() < STL_HEADER_LEN {
        return Err(Error::TruncatedStl {
            expected: STL_HEADER_LEN,
            actual: bytes.len(),
        });
    }

    let declared = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    let available = (bytes.len() - STL_HEADER_LEN) / STL_FACET_LEN;

    let count = match mode {
        DecodeMode::Complete if available < declared => {
            return Err(Error::TruncatedStl {
                expected: declared
                    .saturating_mul(STL_FACET_LEN)
                    .saturating_add(STL_HEADER_LEN),
                actual: bytes.len(),
            });
        }
        DecodeMode::Complete => declared,
        DecodeMode::Partial => declared.min(available),
    };

    let mut welder = Welder::with_capacity(count);
    let body = &bytes[STL_HEADER_LEN..STL_HEADER_LEN + count * STL_FACET_LEN];
    for record in body.chunks_exact(STL_FACET_LEN) {
        // Skip the stored facet normal (offset 0); normals are recomputed downstream
        welder.push_triangle([
            read_vec3(record, 12),
            read_vec3(record, 24),
            read_vec3(record, 36),
        ]);
    }

    welder.finish()
}

fn decode_ascii(bytes: &[u8], mode: DecodeMode) -> Result<ParsedGeometry> {
    let text = match mode {
        DecodeMode::Complete => bytes,
        DecodeMode::Partial => complete_lines(bytes),
    };

    let mut welder = Welder::with_capacity(text.len() / 256);
    let mut corners = [[0.0f32; 3]; 3];
    let mut filled = 0usize;
    let mut offset = 0usize;

    for (_, line) in Lines::new(text) {
        let (keyword, rest) = split_keyword(line);
        match keyword {
            b"vertex" => {
                let p = parse_floats::<3>(rest).ok_or_else(|| Error::MalformedStl {
                    offset,
                    message: "vertex needs three coordinates".into(),
                })?;
                if filled < 3 {
                    corners[filled] = p;
                }
                filled += 1;
            }
            b"endloop" => {
                if filled == 3 {
                    welder.push_triangle(corners);
                } else if mode == DecodeMode::Complete {
                    return Err(Error::MalformedStl {
                        offset,
                        message: format!("facet has {} vertices", filled),
                    });
                }
                filled = 0;
            }
            _ => {}
        }
        offset += line.len() + 1;
    }

    welder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_stl(triangles: &[[[f32; 3]; 3]]) -> Vec<u8> {
        let mut out = vec![0u8; 80];
        out.extend_from_slice(&(triangles.len() as u32).to_le_bytes());
        for tri in triangles {
            out.extend_from_slice(&[0u8; 12]);
            for corner in tri {
                for v in corner {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            out.extend_from_slice(&[0u8; 2]);
        }
        out
    }

    const QUAD: [[[f32; 3]; 3]; 2] = [
        [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0]],
        [[0.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
    ];

    #[test]
    fn test_binary_welds_shared_corners() {
        let geometry = decode_stl(&binary_stl(&QUAD), DecodeMode::Complete).unwrap();
        assert_eq!(geometry.triangle_count(), 2);
        assert_eq!(geometry.vertex_count(), 4);
        assert_eq!(geometry.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_binary_truncated_complete_fails() {
        let mut bytes = binary_stl(&QUAD);
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(
            decode_stl(&bytes, DecodeMode::Complete),
            Err(Error::TruncatedStl { .. })
        ));
    }

    #[test]
    fn test_binary_partial_keeps_complete_facets() {
        let mut bytes = binary_stl(&QUAD);
        bytes.truncate(bytes.len() - 10);
        let geometry = decode_stl(&bytes, DecodeMode::Partial).unwrap();
        assert_eq!(geometry.triangle_count(), 1);
    }

    #[test]
    fn test_binary_huge_declared_count() {
        let mut bytes = binary_stl(&QUAD);
        bytes[80..84].copy_from_slice(&u32::MAX.to_le_bytes());

        match decode_stl(&bytes, DecodeMode::Complete) {
            Err(Error::TruncatedStl { expected, actual }) => {
                assert_eq!(actual, bytes.len());
                assert!(expected > actual);
            }
            other => panic!("expected TruncatedStl, got {:?}", other),
        }

        let geometry = decode_stl(&bytes, DecodeMode::Partial).unwrap();
        assert_eq!(geometry.triangle_count(), 2);
    }

    #[test]
    fn test_ascii_decoding() {
        let text = b"solid quad
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 1 1 0
    endloop
  endfacet
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 1 0
      vertex 0 1 0
    endloop
  endfacet
endsolid quad
";
        let geometry = decode_stl(text, DecodeMode::Complete).unwrap();
        assert_eq!(geometry.triangle_count(), 2);
        assert_eq!(geometry.vertex_count(), 4);
    }

    #[test]
    fn test_ascii_partial_drops_open_facet() {
        let text = b"solid quad
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 1 1 0
    endloop
  endfacet
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 1";
        let geometry = decode_stl(text, DecodeMode::Partial).unwrap();
        assert_eq!(geometry.triangle_count(), 1);
    }

    #[test]
    fn test_empty_binary_is_error() {
        let bytes = binary_stl(&[]);
        assert_eq!(
            decode_stl(&bytes, DecodeMode::Complete),
            Err(Error::EmptyGeometry("STL"))
        );
    }
}
