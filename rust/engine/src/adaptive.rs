// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Closed-loop LOD selection from frame rate and memory readings.

use crate::config::EngineConfig;
use crate::profiler::{FpsThresholds, HardwareProfile};
use crate::telemetry::{TelemetryReport, TelemetrySink};
use crate::viewer::ViewerAdapter;
use printview_cache::Clock;
use printview_geometry::LodLevel;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Samples averaged for each decision
pub const WINDOW_SIZE: usize = 10;

/// Samples retained for inspection
pub const HISTORY_SIZE: usize = 60;

/// Fraction of the memory budget that triggers a cleanup pass
pub const CLEANUP_RATIO: f64 = 0.8;

/// Fraction of the memory budget that also forces a low LOD
pub const CRITICAL_RATIO: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsSample {
    pub timestamp_ms: u64,
    pub fps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryState {
    pub current_mb: f64,
    pub peak_mb: f64,
    pub budget_mb: f64,
    pub last_cleanup_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemoryPressure {
    Normal,
    /// Above 80% of budget
    High,
    /// Above 90% of budget
    Critical,
}

/// Per-viewer adaptive quality state
pub struct AdaptiveController {
    thresholds: FpsThresholds,
    current_lod: LodLevel,
    window: VecDeque<f64>,
    history: VecDeque<FpsSample>,
    memory: MemoryState,
    clock: Arc<dyn Clock>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    samples_since_report: usize,
}

impl AdaptiveController {
    pub fn new(
        thresholds: FpsThresholds,
        initial_lod: LodLevel,
        memory_budget_mb: f64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            thresholds,
            current_lod: initial_lod,
            window: VecDeque::with_capacity(WINDOW_SIZE),
            history: VecDeque::with_capacity(HISTORY_SIZE),
            memory: MemoryState {
                current_mb: 0.0,
                peak_mb: 0.0,
                budget_mb: memory_budget_mb,
                last_cleanup_ms: None,
            },
            clock,
            telemetry: None,
            samples_since_report: 0,
        }
    }

    /// Seed thresholds, initial level and budget from a device profile
    pub fn from_profile(
        profile: &HardwareProfile,
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            config.thresholds_for(profile.profile_class),
            profile.initial_lod(),
            profile.memory_budget_mb(),
            clock,
        )
    }

    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub fn current_lod(&self) -> LodLevel {
        self.current_lod
    }

    pub fn thresholds(&self) -> FpsThresholds {
        self.thresholds
    }

    pub fn memory(&self) -> MemoryState {
        self.memory
    }

    /// Most recent samples, oldest first
    pub fn history(&self) -> impl Iterator<Item = &FpsSample> {
        self.history.iter()
    }

    /// Mean of the rolling window, once it is full
    pub fn mean_fps(&self) -> Option<f64> {
        (self.window.len() == WINDOW_SIZE)
            .then(|| self.window.iter().sum::<f64>() / WINDOW_SIZE as f64)
    }

    /// Feed one frame-rate sample and optional memory reading.
    ///
    /// Returns the new level when the controller switches. Nothing switches
    /// until the window is full or while the user is interacting.
    pub fn record_sample(
        &mut self,
        fps: f64,
        memory_mb: Option<f64>,
        interacting: bool,
    ) -> Option<LodLevel> {
        if self.window.len() == WINDOW_SIZE {
            self.window.pop_front();
        }
        self.window.push_back(fps);
        if self.history.len() == HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(FpsSample {
            timestamp_ms: self.clock.now_ms(),
            fps,
        });

        if let Some(mb) = memory_mb {
            self.memory.current_mb = mb;
            self.memory.peak_mb = self.memory.peak_mb.max(mb);
        }

        let mean = self.mean_fps();
        let switched = match mean {
            Some(mean) if !interacting => {
                let target = self.thresholds.select(mean);
                (target != self.current_lod).then(|| {
                    info!(from = %self.current_lod, to = %target, fps = mean, "Adjusting LOD");
                    self.current_lod = target;
                    target
                })
            }
            _ => None,
        };

        self.samples_since_report += 1;
        if self.samples_since_report >= WINDOW_SIZE {
            self.samples_since_report = 0;
            if let (Some(sink), Some(mean)) = (&self.telemetry, mean) {
                sink.report(TelemetryReport {
                    fps: mean,
                    memory_usage_mb: memory_mb,
                    lod_level: self.current_lod,
                });
            }
        }

        switched
    }

    /// Switch level regardless of frame rate
    pub fn force_lod(&mut self, level: LodLevel) {
        if self.current_lod != level {
            info!(from = %self.current_lod, to = %level, "Forcing LOD");
            self.current_lod = level;
        }
    }

    pub fn memory_pressure(&self) -> MemoryPressure {
        let usage = self.memory.current_mb;
        let budget = self.memory.budget_mb;
        if usage > budget * CRITICAL_RATIO {
            MemoryPressure::Critical
        } else if usage > budget * CLEANUP_RATIO {
            MemoryPressure::High
        } else {
            MemoryPressure::Normal
        }
    }

    fn mark_cleanup(&mut self) {
        self.memory.last_cleanup_ms = Some(self.clock.now_ms());
    }
}

/// One watchdog pass: release GPU resources, request GC and trim the asset
/// cache when memory is high; additionally force `low` LOD when critical.
///
/// The forced level goes through [`ViewerAdapter::apply_lod`], so the
/// renderer is only switched to a level the displayed model has.
/// Renderer and cache failures are logged and swallowed.
pub async fn run_memory_cleanup(
    controller: &Mutex<AdaptiveController>,
    viewer: &ViewerAdapter,
) -> MemoryPressure {
    let (pressure, memory) = match controller.lock() {
        Ok(mut controller) => {
            let pressure = controller.memory_pressure();
            if pressure > MemoryPressure::Normal {
                controller.mark_cleanup();
            }
            (pressure, controller.memory())
        }
        Err(_) => {
            warn!("Adaptive controller lock poisoned, skipping memory check");
            return MemoryPressure::Normal;
        }
    };

    if pressure == MemoryPressure::Normal {
        debug!(usage_mb = memory.current_mb, budget_mb = memory.budget_mb, "Memory within budget");
        return pressure;
    }

    info!(
        usage_mb = memory.current_mb,
        budget_mb = memory.budget_mb,
        peak_mb = memory.peak_mb,
        "Performing memory cleanup"
    );
    let renderer = viewer.renderer();
    if let Err(e) = renderer.dispose_gpu_resources() {
        warn!(error = %e, "Failed to dispose GPU resources");
    }
    if let Err(e) = renderer.request_gc() {
        warn!(error = %e, "Garbage collection request failed");
    }
    let evicted = viewer.cache().clean_cache(None).await;
    debug!(count = evicted.len(), "Trimmed asset cache");

    if pressure == MemoryPressure::Critical {
        if let Ok(mut controller) = controller.lock() {
            controller.force_lod(LodLevel::Low);
        }
        let applied = viewer.apply_lod(LodLevel::Low);
        debug!(?applied, "Forced low detail");
    }
    pressure
}

/// Run [`run_memory_cleanup`] every `period` until the handle is aborted
pub fn spawn_memory_watchdog(
    controller: Arc<Mutex<AdaptiveController>>,
    viewer: Arc<ViewerAdapter>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        loop {
            ticker.tick().await;
            run_memory_cleanup(&controller, &viewer).await;
        }
    })
}
