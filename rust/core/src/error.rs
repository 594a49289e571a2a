// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for decoding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding model files
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(String),

    #[error("Truncated STL: expected at least {expected} bytes, got {actual}")]
    TruncatedStl { expected: usize, actual: usize },

    #[error("Malformed STL at byte {offset}: {message}")]
    MalformedStl { offset: usize, message: String },

    #[error("Malformed OBJ at line {line}: {message}")]
    MalformedObj { line: usize, message: String },

    #[error("No triangles found in {0} data")]
    EmptyGeometry(&'static str),
}

impl Error {
    pub(crate) fn obj(line: usize, message: impl Into<String>) -> Self {
        Error::MalformedObj {
            line,
            message: message.into(),
        }
    }
}
