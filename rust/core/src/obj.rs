// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wavefront OBJ decoding.
//!
//! Only geometry is read: `v` positions and `f` faces. Texture coordinates,
//! normals, groups and material statements are skipped; normals are
//! recomputed after decoding. Polygons are fan-triangulated.

use crate::decoder::{DecodeMode, ParsedGeometry};
use crate::error::{Error, Result};
use crate::fast_parse::{complete_lines, parse_floats, parse_int_prefix, split_keyword, Lines};
use crate::format::ModelFormat;
use smallvec::SmallVec;

/// Resolve a 1-based (or negative, relative) OBJ index to 0-based
#[inline]
fn resolve_index(raw: i64, vertex_count: usize) -> Option<u32> {
    let resolved = if raw > 0 {
        raw - 1
    } else if raw < 0 {
        vertex_count as i64 + raw
    } else {
        return None;
    };
    (resolved >= 0 && (resolved as usize) < vertex_count).then_some(resolved as u32)
}

/// Parse the position indices of a face statement (`1 2 3`, `1/4/7 ...`, `1//7 ...`)
fn parse_face(rest: &[u8], vertex_count: usize, line: usize) -> Result<SmallVec<[u32; 8]>> {
    let mut corners = SmallVec::new();
    for token in rest.split(|b| b.is_ascii_whitespace()).filter(|t| !t.is_empty()) {
        let (raw, _) = parse_int_prefix(token)
            .ok_or_else(|| Error::obj(line, "face corner is not an index"))?;
        let idx = resolve_index(raw, vertex_count).ok_or_else(|| {
            Error::obj(
                line,
                format!("vertex index {} out of range ({} vertices)", raw, vertex_count),
            )
        })?;
        corners.push(idx);
    }
    if corners.len() < 3 {
        return Err(Error::obj(line, "face needs at least three corners"));
    }
    Ok(corners)
}

/// Decode OBJ text.
///
/// In `Partial` mode a trailing incomplete line is ignored and faces that
/// cannot be resolved yet are skipped instead of failing.
pub fn decode_obj(bytes: &[u8], mode: DecodeMode) -> Result<ParsedGeometry> {
    let text = match mode {
        DecodeMode::Complete => bytes,
        DecodeMode::Partial => complete_lines(bytes),
    };

    let mut positions: Vec<f32> = Vec::with_capacity(text.len() / 12);
    let mut indices: Vec<u32> = Vec::with_capacity(text.len() / 8);

    for (line_no, line) in Lines::new(text) {
        let (keyword, rest) = split_keyword(line);
        match keyword {
            b"v" => match parse_floats::<3>(rest) {
                Some(p) => positions.extend_from_slice(&p),
                None if mode == DecodeMode::Partial => continue,
                None => return Err(Error::obj(line_no, "vertex needs three coordinates")),
            },
            b"f" => {
                let corners = match parse_face(rest, positions.len() / 3, line_no) {
                    Ok(c) => c,
                    Err(_) if mode == DecodeMode::Partial => continue,
                    Err(e) => return Err(e),
                };
                for i in 1..corners.len() - 1 {
                    indices.extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if indices.is_empty() {
        return Err(Error::EmptyGeometry("OBJ"));
    }

    Ok(ParsedGeometry {
        format: ModelFormat::Obj,
        positions,
        indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUBE_FACE: &[u8] = b"# a quad
o plate
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
f 1//1 2//1 3//1 4//1
";

    #[test]
    fn test_quad_is_fan_triangulated() {
        let geometry = decode_obj(CUBE_FACE, DecodeMode::Complete).unwrap();
        assert_eq!(geometry.vertex_count(), 4);
        assert_eq!(geometry.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_negative_indices() {
        let text = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let geometry = decode_obj(text, DecodeMode::Complete).unwrap();
        assert_eq!(geometry.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_out_of_range_index_fails() {
        let text = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n";
        assert!(matches!(
            decode_obj(text, DecodeMode::Complete),
            Err(Error::MalformedObj { line: 4, .. })
        ));
    }

    #[test]
    fn test_partial_skips_incomplete_tail() {
        let text = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\nv 1 1";
        let geometry = decode_obj(text, DecodeMode::Partial).unwrap();
        assert_eq!(geometry.vertex_count(), 3);
        assert_eq!(geometry.triangle_count(), 1);
    }

    #[test]
    fn test_no_faces_is_error() {
        let text = b"v 0 0 0\nv 1 0 0\n";
        assert_eq!(
            decode_obj(text, DecodeMode::Complete),
            Err(Error::EmptyGeometry("OBJ"))
        );
    }
}
