// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # PrintView Core
//!
//! Decoders for the model formats accepted by the print shop: binary and
//! ASCII STL, and Wavefront OBJ.
//!
//! ## Overview
//!
//! - **Format detection**: from file extension and, for STL, by sniffing
//!   binary vs ASCII encoding
//! - **Indexed output**: STL triangle soup is welded into shared vertices
//! - **Partial decoding**: a prefix of a file decodes to the primitives it
//!   fully contains, which drives streaming previews
//! - **Number parsing**: [fast-float](https://docs.rs/fast-float) and
//!   [lexical-core](https://docs.rs/lexical-core) straight from bytes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use printview_core::{decode, decode_partial, ModelFormat};
//!
//! let geometry = decode(&bytes, ModelFormat::Stl)?;
//! println!("{} triangles", geometry.triangle_count());
//!
//! // Streaming preview from the first chunk only
//! let preview = decode_partial(&bytes[..4096], ModelFormat::Stl)?;
//! ```

pub mod decoder;
pub mod error;
pub mod fast_parse;
pub mod format;
pub mod obj;
pub mod stl;

pub use decoder::{decode, decode_partial, decode_with_mode, DecodeMode, ParsedGeometry};
pub use error::{Error, Result};
pub use format::{detect_stl_encoding, ModelFormat, StlEncoding};
