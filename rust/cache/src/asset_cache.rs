// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded model cache with LRU eviction and age-based expiration.
//!
//! Every operation takes the instance's state lock for its whole duration.
//! The lock is a fair tokio mutex, so operations run in the order they were
//! requested, including those issued while the backend is still opening.

use crate::clock::Clock;
use crate::config::{CacheConfig, StoreKind};
use crate::entry::{CacheEntry, CacheStats, EntryMetadata, ModelType, Payload};
use crate::error::{CacheError, Result};
use crate::store::{open_store, PersistentStore};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum State {
    Uninitialized,
    Ready(Arc<dyn PersistentStore>),
    Disposed,
}

impl State {
    async fn initialize(&mut self, config: &CacheConfig) {
        if matches!(self, State::Uninitialized) {
            *self = State::Ready(open_store(config).await);
        }
    }
}

/// Client-side model cache.
///
/// Storage failures never reach callers: reads degrade to misses and
/// writes to no-ops.
#[derive(Clone)]
pub struct AssetCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<State>>,
}

impl AssetCache {
    /// Create a cache; no storage is touched until [`init`](Self::init),
    /// [`start`](Self::start) or the first operation.
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Arc::new(Mutex::new(State::Uninitialized)),
        }
    }

    /// Create a cache over an already opened store
    pub fn with_store(
        config: CacheConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn PersistentStore>,
    ) -> Self {
        Self {
            config,
            clock,
            state: Arc::new(Mutex::new(State::Ready(store))),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Open the storage backend if that has not happened yet.
    pub async fn init(&self) -> Option<StoreKind> {
        let mut state = self.state.lock().await;
        state.initialize(&self.config).await;
        match &*state {
            State::Ready(store) => Some(store.kind()),
            _ => None,
        }
    }

    /// Open the backend in the background and return immediately.
    ///
    /// The lock is taken before returning, so any operation issued after
    /// this call waits for initialisation and then runs in order.
    pub fn start(&self) -> JoinHandle<()> {
        let config = self.config.clone();
        match self.state.clone().try_lock_owned() {
            Ok(mut state) => tokio::spawn(async move {
                state.initialize(&config).await;
            }),
            Err(_) => {
                let state = self.state.clone();
                tokio::spawn(async move {
                    state.lock_owned().await.initialize(&config).await;
                })
            }
        }
    }

    /// Release the backend. Later operations miss and write nothing.
    pub async fn dispose(&self) {
        let mut state = self.state.lock().await;
        if let State::Ready(store) = &*state {
            store.close().await;
        }
        *state = State::Disposed;
        debug!("Asset cache disposed");
    }

    /// Backend in use, or `None` before init and after dispose
    pub async fn store_kind(&self) -> Option<StoreKind> {
        match &*self.state.lock().await {
            State::Ready(store) => Some(store.kind()),
            _ => None,
        }
    }

    /// Lock the instance, opening the backend lazily
    async fn acquire(&self) -> Option<(MutexGuard<'_, State>, Arc<dyn PersistentStore>)> {
        let mut state = self.state.lock().await;
        state.initialize(&self.config).await;
        match &*state {
            State::Ready(store) => {
                let store = store.clone();
                Some((state, store))
            }
            _ => None,
        }
    }

    /// Store a model, evicting older entries to make room.
    ///
    /// Fails only for an empty id or a payload larger than the whole cache;
    /// storage errors are logged and the insert is skipped.
    pub async fn add_model(
        &self,
        id: impl Into<String>,
        model_type: ModelType,
        data: Payload,
    ) -> Result<()> {
        let entry = CacheEntry::new(id, model_type, data, self.clock.now_ms());
        if entry.id.is_empty() {
            return Err(CacheError::InvalidEntry("model id is empty".into()));
        }
        if entry.size_bytes > self.config.max_cache_size_bytes {
            return Err(CacheError::OversizedAsset {
                size: entry.size_bytes,
                max: self.config.max_cache_size_bytes,
            });
        }

        let Some((_state, store)) = self.acquire().await else {
            return Ok(());
        };
        self.ensure_space(store.as_ref(), entry.size_bytes, Some(&entry.id))
            .await;
        match store.put(&entry).await {
            Ok(()) => debug!(id = %entry.id, size = entry.size_bytes, "Cached model"),
            Err(e) => warn!(id = %entry.id, error = %e, "Failed to cache model"),
        }
        Ok(())
    }

    /// Look up a model, refreshing its access time.
    ///
    /// Entries past the expiration window are deleted and reported as a miss.
    pub async fn get_model(&self, id: &str) -> Option<CacheEntry> {
        let (_state, store) = self.acquire().await?;
        let mut entry = match store.get(id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(id = %id, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Cache lookup failed");
                return None;
            }
        };

        let now = self.clock.now_ms();
        if now.saturating_sub(entry.created_at) > self.config.expiration_window_ms {
            debug!(id = %id, created_at = entry.created_at, "Cached model expired");
            if let Err(e) = store.delete(id).await {
                warn!(id = %id, error = %e, "Failed to delete expired model");
            }
            return None;
        }

        entry.last_accessed_at = entry.last_accessed_at.max(now);
        if let Err(e) = store.touch(id, entry.last_accessed_at).await {
            warn!(id = %id, error = %e, "Failed to refresh access time");
        }
        debug!(id = %id, size = entry.size_bytes, "Cache hit");
        Some(entry)
    }

    pub async fn has_model(&self, id: &str) -> bool {
        self.get_model(id).await.is_some()
    }

    pub async fn remove_model(&self, id: &str) {
        let Some((_state, store)) = self.acquire().await else {
            return;
        };
        if let Err(e) = store.delete(id).await {
            warn!(id = %id, error = %e, "Failed to remove model");
        }
    }

    pub async fn clear_cache(&self) {
        let Some((_state, store)) = self.acquire().await else {
            return;
        };
        match store.clear().await {
            Ok(()) => info!("Model cache cleared"),
            Err(e) => warn!(error = %e, "Failed to clear model cache"),
        }
    }

    /// Evict least recently used entries until the total size is at most
    /// `target` bytes (default: the configured clean target).
    ///
    /// Returns the evicted ids in eviction order.
    pub async fn clean_cache(&self, target: Option<u64>) -> Vec<String> {
        let Some((_state, store)) = self.acquire().await else {
            return Vec::new();
        };
        let mut entries = match store.get_all().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to list cache entries");
                return Vec::new();
            }
        };
        let target = target.unwrap_or_else(|| self.config.clean_target_bytes());
        evict_to_size(store.as_ref(), &mut entries, target).await
    }

    /// Make room for `size_bytes` more.
    ///
    /// Errors fail open; the caller goes ahead with the insert.
    pub async fn check_space(&self, size_bytes: u64) {
        if let Some((_state, store)) = self.acquire().await {
            self.ensure_space(store.as_ref(), size_bytes, None).await;
        }
    }

    async fn ensure_space(
        &self,
        store: &dyn PersistentStore,
        size_bytes: u64,
        incoming: Option<&str>,
    ) {
        let mut entries = match store.get_all().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Space check failed, allowing insert");
                return;
            }
        };
        // A replaced entry frees its own slot and bytes
        if let Some(id) = incoming {
            entries.retain(|e| e.id != id);
        }

        let max_entries = self.config.max_entries;
        if entries.len() >= max_entries {
            evict_to_size(store, &mut entries, self.config.clean_target_bytes()).await;
            sort_lru(&mut entries);
            while entries.len() >= max_entries && !entries.is_empty() {
                let oldest = entries.remove(0);
                if !evict(store, &oldest).await {
                    break;
                }
            }
        }

        // Zero-size entries skip the size check
        if size_bytes == 0 {
            return;
        }
        let current: u64 = entries.iter().map(|e| e.size_bytes).sum();
        let max = self.config.max_cache_size_bytes;
        if current + size_bytes > max {
            evict_to_size(store, &mut entries, max.saturating_sub(size_bytes)).await;
        }
    }

    pub async fn get_cache_stats(&self) -> CacheStats {
        let Some((_state, store)) = self.acquire().await else {
            return CacheStats::default();
        };
        match store.get_all().await {
            Ok(entries) => CacheStats::from_entries(&entries),
            Err(e) => {
                warn!(error = %e, "Failed to compute cache stats");
                CacheStats::default()
            }
        }
    }

    /// Delete every entry past the expiration window; returns their ids
    pub async fn purge_expired(&self) -> Vec<String> {
        let Some((_state, store)) = self.acquire().await else {
            return Vec::new();
        };
        let entries = match store.get_all().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to list cache entries");
                return Vec::new();
            }
        };

        let now = self.clock.now_ms();
        let window = self.config.expiration_window_ms;
        let mut purged = Vec::new();
        for meta in entries.iter().filter(|e| e.is_expired(now, window)) {
            if evict(store.as_ref(), meta).await {
                purged.push(meta.id.clone());
            }
        }
        if !purged.is_empty() {
            info!(count = purged.len(), "Purged expired models");
        }
        purged
    }
}

/// Strict LRU order; ties go to the older entry, then by id
fn sort_lru(entries: &mut [EntryMetadata]) {
    entries.sort_by(|a, b| {
        a.last_accessed_at
            .cmp(&b.last_accessed_at)
            .then(a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

async fn evict(store: &dyn PersistentStore, meta: &EntryMetadata) -> bool {
    match store.delete(&meta.id).await {
        Ok(()) => {
            debug!(id = %meta.id, size = meta.size_bytes, "Evicted model");
            true
        }
        Err(e) => {
            warn!(id = %meta.id, error = %e, "Failed to evict model");
            false
        }
    }
}

/// Delete entries in LRU order while their total exceeds `target`.
///
/// `entries` is left sorted and holding only the survivors.
async fn evict_to_size(
    store: &dyn PersistentStore,
    entries: &mut Vec<EntryMetadata>,
    target: u64,
) -> Vec<String> {
    let mut total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    if total <= target {
        return Vec::new();
    }

    sort_lru(entries);
    let mut evicted = Vec::new();
    while total > target && !entries.is_empty() {
        if !evict(store, &entries[0]).await {
            break;
        }
        let meta = entries.remove(0);
        total -= meta.size_bytes;
        evicted.push(meta.id);
    }
    evicted
}
