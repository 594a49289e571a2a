use thiserror::Error;

/// Result type for loading operations
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors that can end a model load
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Decode failed: {0}")]
    Decode(#[from] printview_core::Error),

    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] printview_geometry::Error),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl LoadError {
    /// Whether a standard (non-streaming) retry might succeed
    pub fn is_decode(&self) -> bool {
        matches!(self, LoadError::Decode(_))
    }
}

impl From<tokio::task::JoinError> for LoadError {
    fn from(e: tokio::task::JoinError) -> Self {
        LoadError::Worker(e.to_string())
    }
}

impl From<reqwest::Error> for LoadError {
    fn from(e: reqwest::Error) -> Self {
        LoadError::Network(e.to_string())
    }
}

/// Errors from hardware capability probes and the render benchmark
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("GPU probe failed: {0}")]
    Gpu(String),

    #[error("Benchmark failed: {0}")]
    Benchmark(String),
}

/// Errors loading engine configuration from a file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by a renderer hook
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Renderer error: {0}")]
pub struct RenderError(pub String);
