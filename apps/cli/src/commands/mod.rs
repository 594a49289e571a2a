// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod cache;
pub mod model;
pub mod profile;

use printview_cache::{AssetCache, SystemClock};
use printview_engine::EngineConfig;
use std::sync::Arc;

/// Open the asset cache described by `config`.
///
/// A cache without a usable store still answers every call; it just holds
/// nothing.
pub async fn open_cache(config: &EngineConfig) -> AssetCache {
    let cache = AssetCache::new(config.cache.clone(), Arc::new(SystemClock));
    match cache.init().await {
        Some(kind) => tracing::debug!(store = kind.as_str(), "Asset cache ready"),
        None => tracing::warn!("No cache store available, continuing uncached"),
    }
    cache
}
