// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wiring for one viewer: cache, profiler, controller, watchdog and adapter.

use crate::adaptive::{spawn_memory_watchdog, AdaptiveController};
use crate::config::EngineConfig;
use crate::loader::{ProgressiveLoader, Transport};
use crate::profiler::{BenchmarkTarget, CapabilityProbe, DeviceProfiler, HardwareProfile};
use crate::telemetry::TelemetrySink;
use crate::viewer::{Renderer, ViewerAdapter};
use crate::worker::LodWorker;
use printview_cache::{AssetCache, CacacheBackend, Clock, FlatBackend};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

/// Host integrations the engine drives
pub struct EngineParts {
    pub renderer: Arc<dyn Renderer>,
    pub probe: Box<dyn CapabilityProbe>,
    pub benchmark: Box<dyn BenchmarkTarget>,
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
    pub telemetry: Option<Arc<dyn TelemetrySink>>,
    /// Where the hardware profile persists; defaults to an on-disk store
    /// under `profile_cache_dir`
    pub profile_store: Option<Arc<dyn FlatBackend>>,
}

/// A running engine
pub struct Engine {
    config: EngineConfig,
    cache: AssetCache,
    profile: HardwareProfile,
    controller: Arc<Mutex<AdaptiveController>>,
    adapter: Arc<ViewerAdapter>,
    watchdog: JoinHandle<()>,
}

impl Engine {
    /// Open the cache in the background, classify the device, then start
    /// the memory watchdog.
    pub async fn start(config: EngineConfig, parts: EngineParts) -> Self {
        let EngineParts {
            renderer,
            probe,
            benchmark,
            transport,
            clock,
            telemetry,
            profile_store,
        } = parts;

        let cache = AssetCache::new(config.cache.clone(), clock.clone());
        cache.start();

        let store = profile_store
            .unwrap_or_else(|| Arc::new(CacacheBackend::new(&config.profile_cache_dir)) as Arc<dyn FlatBackend>);
        let profile = DeviceProfiler::new(probe, benchmark, clock.clone())
            .with_store(store)
            .detect_hardware_capabilities()
            .await;

        let mut controller = AdaptiveController::from_profile(&profile, &config, clock);
        if let Some(sink) = telemetry {
            controller = controller.with_telemetry(sink);
        }
        let controller = Arc::new(Mutex::new(controller));

        let loader = ProgressiveLoader::new(transport).with_streaming(config.streaming);
        let adapter = Arc::new(
            ViewerAdapter::new(cache.clone(), loader, LodWorker::default(), renderer)
                .with_controller(controller.clone())
                .with_cache_version(config.cache_version.clone()),
        );

        let watchdog = spawn_memory_watchdog(
            controller.clone(),
            adapter.clone(),
            config.cleanup_interval(),
        );

        info!(
            profile = %profile.profile_class,
            score = profile.score,
            budget_mb = profile.memory_budget_mb(),
            "Engine started"
        );

        Self {
            config,
            cache,
            profile,
            controller,
            adapter,
            watchdog,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    pub fn profile(&self) -> &HardwareProfile {
        &self.profile
    }

    pub fn controller(&self) -> &Arc<Mutex<AdaptiveController>> {
        &self.controller
    }

    pub fn viewer(&self) -> &ViewerAdapter {
        &self.adapter
    }

    /// Stop the watchdog, drop any load in flight and release storage
    pub async fn shutdown(self) {
        self.watchdog.abort();
        self.adapter.dispose();
        self.cache.dispose().await;
        info!("Engine stopped");
    }
}
