// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Format dispatch for model decoding.

use crate::error::Result;
use crate::format::ModelFormat;
use crate::obj::decode_obj;
use crate::stl::decode_stl;

/// How strictly a buffer is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// The buffer holds the whole file; truncation is an error
    Complete,
    /// The buffer is a prefix of the file (streaming preview); only
    /// fully-received primitives are decoded
    Partial,
}

/// Indexed triangle geometry produced by a decoder
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGeometry {
    /// Source format
    pub format: ModelFormat,
    /// Vertex positions (x, y, z triplets)
    pub positions: Vec<f32>,
    /// Triangle indices into `positions`
    pub indices: Vec<u32>,
}

impl ParsedGeometry {
    /// Number of distinct vertices
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Number of triangles
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Decode a complete model file
pub fn decode(bytes: &[u8], format: ModelFormat) -> Result<ParsedGeometry> {
    decode_with_mode(bytes, format, DecodeMode::Complete)
}

/// Decode whatever complete primitives a partially received buffer holds
pub fn decode_partial(bytes: &[u8], format: ModelFormat) -> Result<ParsedGeometry> {
    decode_with_mode(bytes, format, DecodeMode::Partial)
}

pub fn decode_with_mode(bytes: &[u8], format: ModelFormat, mode: DecodeMode) -> Result<ParsedGeometry> {
    match format {
        ModelFormat::Stl => decode_stl(bytes, mode),
        ModelFormat::Obj => decode_obj(bytes, mode),
    }
}
