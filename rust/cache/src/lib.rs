//! PrintView Model Cache
//!
//! Persists downloaded models across sessions with bounded size and entry
//! count, LRU eviction and age-based expiration.
//!
//! Storage goes through [`PersistentStore`]: SQLite when available, a flat
//! string-keyed store otherwise, and a no-op store when neither works.
//! Callers never see storage failures.
//!
//! # Example
//!
//! ```rust,no_run
//! use printview_cache::{AssetCache, CacheConfig, ModelType, Payload, SystemClock};
//! use std::sync::Arc;
//!
//! # async fn run() -> printview_cache::Result<()> {
//! let cache = AssetCache::new(CacheConfig::default(), Arc::new(SystemClock));
//! cache.init().await;
//! cache.add_model("benchy", ModelType::Stl, Payload::Binary(vec![0; 84])).await?;
//! if let Some(entry) = cache.get_model("benchy").await {
//!     println!("{} bytes", entry.size_bytes);
//! }
//! # Ok(())
//! # }
//! ```

pub mod asset_cache;
pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod store;

pub use asset_cache::AssetCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfig, StoreKind, DEFAULT_CLEAN_TARGET_RATIO, DEFAULT_EXPIRATION_WINDOW_MS,
    DEFAULT_MAX_CACHE_SIZE_BYTES, DEFAULT_MAX_ENTRIES,
};
pub use entry::{CacheEntry, CacheStats, EntryMetadata, ModelType, Payload};
pub use error::{CacheError, Result, StoreError};
pub use store::{
    open_store, CacacheBackend, FlatBackend, FlatStore, MemoryBackend, NoopStore,
    PersistentStore, TransactionalStore,
};
