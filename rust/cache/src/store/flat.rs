// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flat string-keyed store.
//!
//! Layout over any [`FlatBackend`]:
//!
//! - `printview_index`: JSON object mapping id to entry metadata
//! - `printview_metadata`: JSON `{version, lastCleaned}`
//! - `printview_model_<id>`: the payload, base64 for binary data
//!
//! Backends are synchronous; the async contract is satisfied trivially.

use super::PersistentStore;
use crate::clock::{Clock, SystemClock};
use crate::config::StoreKind;
use crate::entry::{CacheEntry, EntryMetadata, ModelType, Payload};
use crate::error::StoreError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

const INDEX_KEY: &str = "printview_index";
const METADATA_KEY: &str = "printview_metadata";
const PROBE_KEY: &str = "printview_probe";

fn payload_key(id: &str) -> String {
    format!("printview_model_{}", id)
}

/// Synchronous string key/value storage
pub trait FlatBackend: Send + Sync {
    fn kind(&self) -> StoreKind;
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

/// Records on disk in a content-addressable cacache directory
#[derive(Debug, Clone)]
pub struct CacacheBackend {
    dir: PathBuf,
}

impl CacacheBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FlatBackend for CacacheBackend {
    fn kind(&self) -> StoreKind {
        StoreKind::Flat
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        match cacache::read_sync(&self.dir, key) {
            Ok(data) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
            Err(cacache::Error::EntryNotFound(_, _)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        cacache::write_sync(&self.dir, key, value.as_bytes())?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        cacache::remove_sync(&self.dir, key)?;
        Ok(())
    }
}

/// Records in process memory, with an optional byte quota like browser
/// local storage
#[derive(Debug, Default)]
pub struct MemoryBackend {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: Mutex::default(),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn items(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.items
            .lock()
            .map_err(|_| StoreError::Unavailable("memory backend poisoned".into()))
    }
}

impl FlatBackend for MemoryBackend {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut items = self.items()?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    bytes: value.len(),
                });
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.items()?.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Encoding {
    Text,
    Base64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexRecord {
    id: String,
    model_type: ModelType,
    size_bytes: u64,
    created_at: u64,
    last_accessed_at: u64,
    encoding: Encoding,
}

impl IndexRecord {
    fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            id: self.id.clone(),
            model_type: self.model_type,
            size_bytes: self.size_bytes,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreMetadata {
    version: String,
    last_cleaned: Option<u64>,
}

type Index = BTreeMap<String, IndexRecord>;

/// Entry store over a [`FlatBackend`]
pub struct FlatStore<B> {
    backend: B,
    version: String,
    /// Serializes read-modify-write cycles on the index record
    index_lock: Mutex<()>,
}

impl<B: FlatBackend> FlatStore<B> {
    /// Probe the backend and create the index and metadata records if absent
    pub fn open(backend: B, version: &str) -> Result<Self, StoreError> {
        backend.set_item(PROBE_KEY, PROBE_KEY)?;
        backend.remove_item(PROBE_KEY)?;

        if backend.get_item(METADATA_KEY)?.is_none() {
            let meta = StoreMetadata {
                version: version.to_string(),
                last_cleaned: None,
            };
            backend.set_item(METADATA_KEY, &serde_json::to_string(&meta)?)?;
        }
        if backend.get_item(INDEX_KEY)?.is_none() {
            backend.set_item(INDEX_KEY, "{}")?;
        }

        Ok(Self {
            backend,
            version: version.to_string(),
            index_lock: Mutex::new(()),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, StoreError> {
        self.index_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("flat store index lock poisoned".into()))
    }

    /// Current index; a missing record reads as empty
    fn read_index(&self) -> Result<Index, StoreError> {
        match self.backend.get_item(INDEX_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Index::new()),
        }
    }

    fn write_index(&self, index: &Index) -> Result<(), StoreError> {
        self.backend.set_item(INDEX_KEY, &serde_json::to_string(index)?)
    }

    fn put_sync(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        let (encoding, content) = match &entry.data {
            Payload::Text(text) => (Encoding::Text, text.clone()),
            Payload::Binary(bytes) => (Encoding::Base64, STANDARD.encode(bytes)),
        };

        let _guard = self.lock()?;
        let mut index = self.read_index()?;
        index.insert(
            entry.id.clone(),
            IndexRecord {
                id: entry.id.clone(),
                model_type: entry.model_type,
                size_bytes: entry.size_bytes,
                created_at: entry.created_at,
                last_accessed_at: entry.last_accessed_at,
                encoding,
            },
        );
        self.write_index(&index)?;
        if let Err(e) = self.backend.set_item(&payload_key(&entry.id), &content) {
            // Don't leave an index entry pointing at nothing
            index.remove(&entry.id);
            self.write_index(&index)?;
            return Err(e);
        }
        Ok(())
    }

    fn get_sync(&self, id: &str) -> Result<Option<CacheEntry>, StoreError> {
        let _guard = self.lock()?;
        let mut index = self.read_index()?;
        let Some(record) = index.get(id).cloned() else {
            return Ok(None);
        };

        let Some(content) = self.backend.get_item(&payload_key(id))? else {
            tracing::debug!(id = %id, "Payload record missing, dropping index entry");
            index.remove(id);
            self.write_index(&index)?;
            return Ok(None);
        };

        let data = match record.encoding {
            Encoding::Text => Payload::Text(content),
            Encoding::Base64 => Payload::Binary(STANDARD.decode(content.as_bytes())?),
        };
        Ok(Some(CacheEntry::from_parts(record.metadata(), data)))
    }

    fn delete_sync(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        let mut index = self.read_index()?;
        if index.remove(id).is_some() {
            self.write_index(&index)?;
        }
        self.backend.remove_item(&payload_key(id))
    }

    fn clear_sync(&self, now_ms: u64) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        let index = self.read_index()?;
        for id in index.keys() {
            self.backend.remove_item(&payload_key(id))?;
        }
        self.write_index(&Index::new())?;
        let meta = StoreMetadata {
            version: self.version.clone(),
            last_cleaned: Some(now_ms),
        };
        self.backend
            .set_item(METADATA_KEY, &serde_json::to_string(&meta)?)
    }

    fn touch_sync(&self, id: &str, accessed_at: u64) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        let mut index = self.read_index()?;
        if let Some(record) = index.get_mut(id) {
            record.last_accessed_at = accessed_at;
            self.write_index(&index)?;
        }
        Ok(())
    }

    /// Timestamp of the last full clear, if any
    pub fn last_cleaned(&self) -> Result<Option<u64>, StoreError> {
        match self.backend.get_item(METADATA_KEY)? {
            Some(raw) => Ok(serde_json::from_str::<StoreMetadata>(&raw)?.last_cleaned),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<B: FlatBackend> PersistentStore for FlatStore<B> {
    fn kind(&self) -> StoreKind {
        self.backend.kind()
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        self.put_sync(entry)
    }

    async fn get(&self, id: &str) -> Result<Option<CacheEntry>, StoreError> {
        self.get_sync(id)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.delete_sync(id)
    }

    async fn get_all(&self) -> Result<Vec<EntryMetadata>, StoreError> {
        let _guard = self.lock()?;
        Ok(self.read_index()?.values().map(IndexRecord::metadata).collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let now = SystemClock.now_ms();
        self.clear_sync(now)
    }

    async fn touch(&self, id: &str, accessed_at: u64) -> Result<(), StoreError> {
        self.touch_sync(id, accessed_at)
    }
}
