use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during geometry processing
#[derive(Error, Debug)]
pub enum Error {
    #[error("Empty mesh: {0}")]
    EmptyMesh(String),

    #[error("Invalid simplification ratio: {0}")]
    InvalidRatio(f64),

    #[error("Edge collapse stalled at {reached} triangles (target {target})")]
    SimplificationStalled { reached: usize, target: usize },

    #[error("Index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("Decode error: {0}")]
    CoreError(#[from] printview_core::Error),
}
