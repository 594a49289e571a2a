// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cache configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MAX_CACHE_SIZE_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_ENTRIES: usize = 100;
pub const DEFAULT_EXPIRATION_WINDOW_MS: u64 = 30 * 24 * 60 * 60 * 1000;
pub const DEFAULT_CLEAN_TARGET_RATIO: f64 = 0.7;

/// Which storage backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Transactional, then flat, then no-op
    #[default]
    Auto,
    /// SQLite database in the cache directory
    Transactional,
    /// String-keyed records in the cache directory
    Flat,
    /// String-keyed records in process memory
    Memory,
    /// Caching disabled
    None,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Auto => "auto",
            StoreKind::Transactional => "transactional",
            StoreKind::Flat => "flat",
            StoreKind::Memory => "memory",
            StoreKind::None => "none",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(StoreKind::Auto),
            "transactional" | "sqlite" => Ok(StoreKind::Transactional),
            "flat" => Ok(StoreKind::Flat),
            "memory" => Ok(StoreKind::Memory),
            "none" | "off" => Ok(StoreKind::None),
            other => Err(format!("unknown store kind '{}'", other)),
        }
    }
}

/// Asset cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Maximum aggregate size of cached entries in bytes.
    pub max_cache_size_bytes: u64,
    /// Maximum number of cached entries.
    pub max_entries: usize,
    /// Entries older than this (by creation time) are treated as misses.
    pub expiration_window_ms: u64,
    /// Fraction of capacity a default cleanup shrinks the cache to.
    pub clean_target_ratio: f64,
    /// Backend preference.
    pub store: StoreKind,
    /// Directory holding the on-disk backends.
    pub cache_dir: PathBuf,
    /// Schema/content version written to the flat backend's metadata record.
    pub version: String,
}

impl CacheConfig {
    /// Default cleanup target in bytes
    pub fn clean_target_bytes(&self) -> u64 {
        (self.max_cache_size_bytes as f64 * self.clean_target_ratio.clamp(0.0, 1.0)) as u64
    }

    /// Location of the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.cache_dir.join("models.sqlite")
    }

    /// Location of the flat record store
    pub fn flat_dir(&self) -> PathBuf {
        self.cache_dir.join("flat")
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size_bytes: DEFAULT_MAX_CACHE_SIZE_BYTES,
            max_entries: DEFAULT_MAX_ENTRIES,
            expiration_window_ms: DEFAULT_EXPIRATION_WINDOW_MS,
            clean_target_ratio: DEFAULT_CLEAN_TARGET_RATIO,
            store: StoreKind::Auto,
            cache_dir: std::env::current_dir()
                .map(|dir| dir.join(".cache").join("printview"))
                .unwrap_or_else(|_| PathBuf::from("./.cache/printview")),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
