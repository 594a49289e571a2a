// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end cache behaviour over real backends.

use printview_cache::{
    AssetCache, CacheConfig, FlatStore, ManualClock, MemoryBackend, ModelType, Payload,
    StoreKind,
};
use std::sync::Arc;
use tempfile::TempDir;

const MB: u64 = 1024 * 1024;

fn config(dir: &TempDir, store: StoreKind) -> CacheConfig {
    CacheConfig {
        store,
        cache_dir: dir.path().to_path_buf(),
        ..CacheConfig::default()
    }
}

fn payload(len: u64, seed: u8) -> Payload {
    Payload::Binary((0..len).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect())
}

#[tokio::test]
async fn test_second_large_model_evicts_first() {
    let dir = TempDir::new().unwrap();
    let cache = AssetCache::new(
        CacheConfig {
            max_cache_size_bytes: 15 * MB,
            ..config(&dir, StoreKind::Transactional)
        },
        Arc::new(ManualClock::new(1_000)),
    );
    assert_eq!(cache.init().await, Some(StoreKind::Transactional));

    let m2 = payload(10 * MB, 2);
    cache.add_model("m1", ModelType::Stl, payload(10 * MB, 1)).await.unwrap();
    cache.add_model("m2", ModelType::Stl, m2.clone()).await.unwrap();

    assert!(cache.get_model("m1").await.is_none());
    let hit = cache.get_model("m2").await.unwrap();
    assert_eq!(hit.data, m2);
    cache.dispose().await;
}

#[tokio::test]
async fn test_hit_returns_identical_bytes_and_newer_access_time() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(5_000));
    let cache = AssetCache::new(config(&dir, StoreKind::Auto), clock.clone());

    let stl = payload(4096, 9);
    let obj = Payload::Text("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n".into());
    cache.add_model("part", ModelType::Stl, stl.clone()).await.unwrap();
    cache.add_model("plate", ModelType::Obj, obj.clone()).await.unwrap();

    clock.advance(250);
    let first = cache.get_model("part").await.unwrap();
    assert_eq!(first.data, stl);
    assert_eq!(first.created_at, 5_000);
    assert_eq!(first.last_accessed_at, 5_250);

    clock.advance(250);
    let second = cache.get_model("part").await.unwrap();
    assert!(second.last_accessed_at >= first.last_accessed_at);

    assert_eq!(cache.get_model("plate").await.unwrap().data, obj);
    cache.dispose().await;
}

#[tokio::test]
async fn test_eviction_removes_lru_prefix() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let cache = AssetCache::new(config(&dir, StoreKind::Flat), clock.clone());

    for (i, id) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        cache.add_model(*id, ModelType::Stl, payload(100, i as u8)).await.unwrap();
        clock.advance(10);
    }
    // Access order is now b, d, a, c, e from oldest to newest
    for id in ["a", "c", "e"] {
        cache.get_model(id).await.unwrap();
        clock.advance(10);
    }

    let evicted = cache.clean_cache(Some(250)).await;
    assert_eq!(evicted, vec!["b".to_string(), "d".to_string(), "a".to_string()]);

    let stats = cache.get_cache_stats().await;
    assert_eq!(stats.count, 2);
    assert_eq!(stats.size, 200);
}

#[tokio::test]
async fn test_expired_entries_are_never_returned() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let cache = AssetCache::new(
        CacheConfig {
            expiration_window_ms: 60_000,
            ..config(&dir, StoreKind::Transactional)
        },
        clock.clone(),
    );
    cache.add_model("stale", ModelType::Stl, payload(10, 0)).await.unwrap();

    clock.set(60_000);
    assert!(cache.get_model("stale").await.is_some());

    // Accessing does not extend the lifetime
    clock.set(60_001);
    assert!(cache.get_model("stale").await.is_none());
    assert_eq!(cache.get_cache_stats().await.count, 0);
    cache.dispose().await;
}

#[tokio::test]
async fn test_bounds_hold_after_every_insert() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let limits = CacheConfig {
        max_cache_size_bytes: 1_000,
        max_entries: 4,
        ..config(&dir, StoreKind::Memory)
    };
    let cache = AssetCache::new(limits.clone(), clock.clone());

    for i in 0..20u64 {
        let size = 50 + (i * 97) % 400;
        cache
            .add_model(format!("model-{i}"), ModelType::Stl, payload(size, i as u8))
            .await
            .unwrap();
        clock.advance(5);

        let stats = cache.get_cache_stats().await;
        assert!(stats.count <= limits.max_entries, "count {} after insert {i}", stats.count);
        assert!(stats.size <= limits.max_cache_size_bytes, "size {} after insert {i}", stats.size);
        assert!(cache.get_model(&format!("model-{i}")).await.is_some());
    }
}

#[tokio::test]
async fn test_operations_before_init_run_in_order() {
    let dir = TempDir::new().unwrap();
    let cache = AssetCache::new(config(&dir, StoreKind::Memory), Arc::new(ManualClock::new(0)));
    cache.start();

    let writer = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache.add_model("queued", ModelType::Stl, payload(8, 1)).await.unwrap();
        })
    };
    let reader = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_model("queued").await })
    };

    writer.await.unwrap();
    assert!(reader.await.unwrap().is_some());
    assert_eq!(cache.store_kind().await, Some(StoreKind::Memory));
}

#[tokio::test]
async fn test_storage_quota_failure_is_swallowed() {
    let store = FlatStore::open(MemoryBackend::with_quota(1024), "test").unwrap();
    let cache = AssetCache::with_store(
        CacheConfig::default(),
        Arc::new(ManualClock::new(0)),
        Arc::new(store),
    );

    cache.add_model("small", ModelType::Stl, payload(64, 0)).await.unwrap();
    // Fits the cache limits but not the backend quota
    cache.add_model("large", ModelType::Stl, payload(4096, 0)).await.unwrap();

    assert!(cache.get_model("small").await.is_some());
    assert!(cache.get_model("large").await.is_none());
    assert_eq!(cache.get_cache_stats().await.count, 1);
}

#[tokio::test]
async fn test_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let data = payload(512, 3);
    {
        let cache = AssetCache::new(config(&dir, StoreKind::Auto), clock.clone());
        cache.add_model("kept", ModelType::Stl, data.clone()).await.unwrap();
        cache.dispose().await;
    }
    let cache = AssetCache::new(config(&dir, StoreKind::Auto), clock);
    assert_eq!(cache.get_model("kept").await.unwrap().data, data);
    cache.dispose().await;
}
