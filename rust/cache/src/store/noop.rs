// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::PersistentStore;
use crate::config::StoreKind;
use crate::entry::{CacheEntry, EntryMetadata};
use crate::error::StoreError;
use async_trait::async_trait;

/// Store used when no backend is available: writes vanish, reads miss.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

#[async_trait]
impl PersistentStore for NoopStore {
    fn kind(&self) -> StoreKind {
        StoreKind::None
    }

    async fn put(&self, _entry: &CacheEntry) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, _id: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(None)
    }

    async fn delete(&self, _id: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<EntryMetadata>, StoreError> {
        Ok(Vec::new())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn touch(&self, _id: &str, _accessed_at: u64) -> Result<(), StoreError> {
        Ok(())
    }
}
