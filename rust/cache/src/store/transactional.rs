// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SQLite-backed store with indexes for eviction scans.

use super::PersistentStore;
use crate::config::StoreKind;
use crate::entry::{CacheEntry, EntryMetadata, ModelType, Payload};
use crate::error::StoreError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Bumped whenever the table layout changes
const SCHEMA_VERSION: i64 = 1;

type EntryRow = (String, String, Vec<u8>, bool, i64, i64, i64);
type MetadataRow = (String, String, i64, i64, i64);

/// Cache entries in a single SQLite table keyed by id.
#[derive(Debug, Clone)]
pub struct TransactionalStore {
    pool: SqlitePool,
}

impl TransactionalStore {
    /// Open (creating if needed) the database at `path` and upgrade its schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.upgrade().await?;
        Ok(store)
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory() -> Result<Self, StoreError> {
        // Every connection to :memory: is its own database, so keep exactly one
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.upgrade().await?;
        Ok(store)
    }

    /// Bring the schema to `SCHEMA_VERSION`.
    ///
    /// The table only holds cache data, so an upgrade drops and re-creates
    /// it. Running it again at the current version does nothing.
    async fn upgrade(&self) -> Result<(), StoreError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        if version == SCHEMA_VERSION {
            return Ok(());
        }

        tracing::info!(from = version, to = SCHEMA_VERSION, "Upgrading model cache schema");

        let mut tx = self.pool.begin().await?;
        sqlx::query("DROP TABLE IF EXISTS models")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            CREATE TABLE models (
                id               TEXT PRIMARY KEY NOT NULL,
                model_type       TEXT NOT NULL,
                payload          BLOB NOT NULL,
                is_text          INTEGER NOT NULL,
                size_bytes       INTEGER NOT NULL,
                created_at       INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;
        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_models_last_accessed ON models (last_accessed_at)",
            "CREATE INDEX IF NOT EXISTS idx_models_size ON models (size_bytes)",
            "CREATE INDEX IF NOT EXISTS idx_models_type ON models (model_type)",
        ] {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        let set_version = format!("PRAGMA user_version = {}", SCHEMA_VERSION);
        sqlx::query(&set_version).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn metadata_from_row(row: MetadataRow) -> EntryMetadata {
    let (id, model_type, size_bytes, created_at, last_accessed_at) = row;
    EntryMetadata {
        id,
        model_type: model_type.parse().unwrap_or(ModelType::Unknown),
        size_bytes: size_bytes.max(0) as u64,
        created_at: created_at.max(0) as u64,
        last_accessed_at: last_accessed_at.max(0) as u64,
    }
}

#[async_trait]
impl PersistentStore for TransactionalStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Transactional
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO models
                (id, model_type, payload, is_text, size_bytes, created_at, last_accessed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.model_type.as_str())
        .bind(entry.data.as_bytes())
        .bind(entry.data.is_text())
        .bind(entry.size_bytes as i64)
        .bind(entry.created_at as i64)
        .bind(entry.last_accessed_at as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CacheEntry>, StoreError> {
        let row = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, model_type, payload, is_text, size_bytes, created_at, last_accessed_at
            FROM models
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, model_type, payload, is_text, size, created, accessed)) = row else {
            return Ok(None);
        };
        let data = if is_text {
            match String::from_utf8(payload) {
                Ok(text) => Payload::Text(text),
                Err(e) => Payload::Binary(e.into_bytes()),
            }
        } else {
            Payload::Binary(payload)
        };
        let meta = metadata_from_row((id, model_type, size, created, accessed));
        Ok(Some(CacheEntry::from_parts(meta, data)))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM models WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<EntryMetadata>, StoreError> {
        let rows = sqlx::query_as::<_, MetadataRow>(
            r#"
            SELECT id, model_type, size_bytes, created_at, last_accessed_at
            FROM models
            ORDER BY last_accessed_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(metadata_from_row).collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM models").execute(&self.pool).await?;
        Ok(())
    }

    async fn touch(&self, id: &str, accessed_at: u64) -> Result<(), StoreError> {
        sqlx::query("UPDATE models SET last_accessed_at = ?1 WHERE id = ?2")
            .bind(accessed_at as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(id: &str, data: Payload, at: u64) -> CacheEntry {
        CacheEntry::new(id, ModelType::Stl, data, at)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = TransactionalStore::in_memory().await.unwrap();
        let binary = entry("bin", Payload::Binary(vec![0, 159, 146, 150]), 10);
        let text = entry("txt", Payload::Text("solid x\nendsolid x\n".into()), 20);
        store.put(&binary).await.unwrap();
        store.put(&text).await.unwrap();

        assert_eq!(store.get("bin").await.unwrap(), Some(binary));
        assert_eq!(store.get("txt").await.unwrap(), Some(text));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_all_and_touch() {
        let store = TransactionalStore::in_memory().await.unwrap();
        store.put(&entry("a", Payload::Binary(vec![1; 10]), 100)).await.unwrap();
        store.put(&entry("b", Payload::Binary(vec![1; 20]), 200)).await.unwrap();
        store.touch("a", 300).await.unwrap();

        let all = store.get_all().await.unwrap();
        let ids: Vec<_> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(all[1].last_accessed_at, 300);
        assert_eq!(all[1].created_at, 100);
        assert_eq!(all[1].size_bytes, 10);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = TransactionalStore::in_memory().await.unwrap();
        store.put(&entry("a", Payload::Binary(vec![1]), 1)).await.unwrap();
        store.put(&entry("b", Payload::Binary(vec![2]), 2)).await.unwrap();
        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.get_all().await.unwrap().len(), 1);
        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_keeps_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models.sqlite");

        let store = TransactionalStore::open(&path).await.unwrap();
        store.put(&entry("kept", Payload::Binary(vec![7; 3]), 5)).await.unwrap();
        store.close().await;

        // Second open sees the current schema version and leaves data alone
        let reopened = TransactionalStore::open(&path).await.unwrap();
        assert!(reopened.get("kept").await.unwrap().is_some());
        reopened.close().await;
    }
}
