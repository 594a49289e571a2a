// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `cache` subcommands.

use clap::Subcommand;
use printview_engine::EngineConfig;

use super::open_cache;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Print entry count, total size, timestamps and per-type counts as JSON
    Stats,
    /// Delete every cached model
    Clear,
    /// Evict least recently used models until the cache fits a size
    Evict {
        /// Target size in bytes; defaults to the configured clean target
        #[arg(long)]
        target: Option<u64>,
    },
    /// Delete models older than the expiry window
    Purge,
    /// Delete one model
    Remove {
        /// Model id
        id: String,
    },
}

fn print_removed(verb: &str, ids: &[String]) {
    println!("{} {} model(s)", verb, ids.len());
    for id in ids {
        println!("  {}", id);
    }
}

pub async fn run(config: &EngineConfig, command: CacheCommand) -> anyhow::Result<()> {
    let cache = open_cache(config).await;

    match command {
        CacheCommand::Stats => {
            let stats = cache.get_cache_stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        CacheCommand::Clear => {
            cache.clear_cache().await;
            println!("cache cleared");
        }
        CacheCommand::Evict { target } => {
            let removed = cache.clean_cache(target).await;
            print_removed("evicted", &removed);
        }
        CacheCommand::Purge => {
            let removed = cache.purge_expired().await;
            print_removed("purged", &removed);
        }
        CacheCommand::Remove { id } => {
            if cache.has_model(&id).await {
                cache.remove_model(&id).await;
                println!("removed '{}'", id);
            } else {
                println!("'{}' is not cached", id);
            }
        }
    }

    cache.dispose().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use printview_cache::{ModelType, Payload, StoreKind};

    fn memory_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.cache.store = StoreKind::Memory;
        config
    }

    #[tokio::test]
    async fn test_commands_against_memory_store() {
        let config = memory_config();
        // Each command opens its own cache; with the memory store they
        // start empty and must still succeed
        run(&config, CacheCommand::Stats).await.unwrap();
        run(&config, CacheCommand::Evict { target: Some(0) }).await.unwrap();
        run(&config, CacheCommand::Purge).await.unwrap();
        run(&config, CacheCommand::Remove { id: "missing".into() }).await.unwrap();
        run(&config, CacheCommand::Clear).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_cache_holds_models() {
        let cache = open_cache(&memory_config()).await;
        cache
            .add_model("benchy", ModelType::Stl, Payload::Binary(vec![1; 128]))
            .await
            .unwrap();
        let stats = cache.get_cache_stats().await;
        assert_eq!(stats.count, 1);
        assert_eq!(stats.size, 128);
        cache.dispose().await;
    }
}
