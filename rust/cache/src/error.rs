// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Errors raised by a [`PersistentStore`](crate::PersistentStore) backend.
///
/// [`AssetCache`](crate::AssetCache) logs and swallows these.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Disk cache error: {0}")]
    Disk(#[from] cacache::Error),

    #[error("Corrupt record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage quota exceeded writing {key} ({bytes} bytes)")]
    QuotaExceeded { key: String, bytes: usize },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced to callers of [`AssetCache`](crate::AssetCache).
#[derive(Debug, Error, PartialEq)]
pub enum CacheError {
    #[error("Model too large ({size} bytes) for maximum cache size ({max} bytes)")]
    OversizedAsset { size: u64, max: u64 },

    #[error("Invalid cache entry: {0}")]
    InvalidEntry(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
