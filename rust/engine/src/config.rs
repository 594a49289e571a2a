// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine configuration loaded from environment variables or a JSON file.

use crate::error::ConfigError;
use crate::profiler::{FpsThresholds, ProfileClass};
use printview_cache::{CacheConfig, StoreKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 30_000;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Asset cache limits and storage.
    pub cache: CacheConfig,
    /// Memory watchdog period in milliseconds.
    pub cleanup_interval_ms: u64,
    /// Per-profile FPS threshold overrides.
    pub lod_thresholds: BTreeMap<ProfileClass, FpsThresholds>,
    /// Stream downloads with previews; when off every load is a plain GET.
    pub streaming: bool,
    /// Directory holding the persisted hardware profile.
    pub profile_cache_dir: PathBuf,
    /// Version tag appended to model URLs and written to flat store metadata.
    pub cache_version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            profile_cache_dir: cache.cache_dir.join("profile"),
            cache_version: cache.version.clone(),
            cache,
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
            lod_thresholds: BTreeMap::new(),
            streaming: true,
        }
    }
}

/// Parse an environment variable, falling back to `default` when it is
/// unset or invalid
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let cache_dir = std::env::var("PRINTVIEW_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| defaults.cache.cache_dir.clone());
        let cache_version = std::env::var("PRINTVIEW_CACHE_VERSION")
            .unwrap_or_else(|_| defaults.cache_version.clone());

        Self {
            cache: CacheConfig {
                max_cache_size_bytes: env_or(
                    "PRINTVIEW_MAX_CACHE_SIZE_BYTES",
                    defaults.cache.max_cache_size_bytes,
                ),
                max_entries: env_or("PRINTVIEW_MAX_ENTRIES", defaults.cache.max_entries),
                expiration_window_ms: env_or(
                    "PRINTVIEW_EXPIRATION_WINDOW_MS",
                    defaults.cache.expiration_window_ms,
                ),
                store: env_or("PRINTVIEW_STORE", StoreKind::Auto),
                version: cache_version.clone(),
                cache_dir: cache_dir.clone(),
                ..defaults.cache
            },
            cleanup_interval_ms: env_or("PRINTVIEW_CLEANUP_INTERVAL_MS", defaults.cleanup_interval_ms),
            lod_thresholds: BTreeMap::new(),
            streaming: env_or("PRINTVIEW_STREAMING", true),
            profile_cache_dir: std::env::var("PRINTVIEW_PROFILE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| cache_dir.join("profile")),
            cache_version,
        }
    }

    /// Load configuration from a JSON file; missing fields take defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// FPS thresholds for `class`, honouring overrides
    pub fn thresholds_for(&self, class: ProfileClass) -> FpsThresholds {
        self.lod_thresholds
            .get(&class)
            .copied()
            .unwrap_or_else(|| class.fps_thresholds())
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms.max(1))
    }
}
