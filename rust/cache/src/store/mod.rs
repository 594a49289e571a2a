// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Storage backends behind a single async key/value contract.

mod flat;
mod noop;
mod transactional;

pub use flat::{CacacheBackend, FlatBackend, FlatStore, MemoryBackend};
pub use noop::NoopStore;
pub use transactional::TransactionalStore;

use crate::config::{CacheConfig, StoreKind};
use crate::entry::{CacheEntry, EntryMetadata};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;

/// Key/value persistence for cache entries.
///
/// Single-record operations are atomic; nothing else is. Implementations
/// must tolerate records disappearing underneath them (the host may wipe
/// storage at any time).
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Backend in use
    fn kind(&self) -> StoreKind;

    /// Insert or replace an entry
    async fn put(&self, entry: &CacheEntry) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Delete an entry; deleting a missing id is not an error
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Metadata of every entry, without payloads
    async fn get_all(&self) -> Result<Vec<EntryMetadata>, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    /// Refresh `last_accessed_at` without rewriting the payload
    async fn touch(&self, id: &str, accessed_at: u64) -> Result<(), StoreError>;

    /// Release backend resources
    async fn close(&self) {}
}

async fn open_transactional(config: &CacheConfig) -> Option<Arc<dyn PersistentStore>> {
    if let Err(e) = tokio::fs::create_dir_all(&config.cache_dir).await {
        tracing::warn!(
            error = %e,
            path = %config.cache_dir.display(),
            "Failed to create cache directory"
        );
        return None;
    }
    match TransactionalStore::open(&config.database_path()).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!(error = %e, "Transactional store unavailable");
            None
        }
    }
}

fn open_flat(config: &CacheConfig) -> Option<Arc<dyn PersistentStore>> {
    let backend = CacacheBackend::new(config.flat_dir());
    match FlatStore::open(backend, &config.version) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!(error = %e, "Flat store unavailable");
            None
        }
    }
}

/// Open the backend named by `config.store`, degrading to a no-op store
/// when nothing usable is available. Never fails.
pub async fn open_store(config: &CacheConfig) -> Arc<dyn PersistentStore> {
    let store = match config.store {
        StoreKind::Auto => match open_transactional(config).await {
            Some(store) => Some(store),
            None => open_flat(config),
        },
        StoreKind::Transactional => open_transactional(config).await,
        StoreKind::Flat => open_flat(config),
        StoreKind::Memory => FlatStore::open(MemoryBackend::new(), &config.version)
            .ok()
            .map(|s| Arc::new(s) as Arc<dyn PersistentStore>),
        StoreKind::None => None,
    };

    match store {
        Some(store) => {
            tracing::info!(
                backend = %store.kind(),
                path = %config.cache_dir.display(),
                "Model cache ready"
            );
            store
        }
        None => {
            if config.store != StoreKind::None {
                tracing::warn!("No storage backend available, model cache disabled");
            }
            Arc::new(NoopStore)
        }
    }
}
