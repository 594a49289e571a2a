// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Whole-engine scenarios: profiling, cached and streamed loads, adaptive
//! level switches.

use approx::assert_relative_eq;
use async_trait::async_trait;
use printview_cache::{CacheConfig, ManualClock, MemoryBackend, StoreKind};
use printview_engine::{
    BenchmarkTarget, CapabilityProbe, ChannelSink, Engine, EngineConfig, EngineParts, GpuInfo,
    LoadError, LoadProgress, LoadedModel, LodWorker, MemoryTransport, ModelRequest, Preview,
    ProbeError, ProfileClass, Renderer, ScreenInfo, WorkerJob, WorkerOutput,
};
use printview_geometry::{plane_grid, LodConfig, LodLevel, Mesh, SimplifyStrategy};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct DesktopProbe;

impl CapabilityProbe for DesktopProbe {
    fn webgl_version(&self) -> Option<u8> {
        Some(2)
    }

    fn gpu_info(&self) -> Result<Option<GpuInfo>, ProbeError> {
        Ok(Some(GpuInfo {
            renderer: "ANGLE (NVIDIA GeForce RTX 3060)".into(),
            vendor: "Google Inc. (NVIDIA)".into(),
            max_texture_size: Some(16_384),
            ..GpuInfo::default()
        }))
    }

    fn memory_mb(&self) -> Option<u64> {
        None
    }

    fn screen(&self) -> Option<ScreenInfo> {
        Some(ScreenInfo {
            width: 2560,
            height: 1440,
            pixel_ratio: 1.0,
        })
    }

    fn user_agent(&self) -> Option<String> {
        Some("Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0".into())
    }

    fn viewport_width(&self) -> Option<u32> {
        Some(2560)
    }
}

/// Renders at a steady 100 frames per second
struct SteadyTarget;

#[async_trait]
impl BenchmarkTarget for SteadyTarget {
    async fn render_frame(&mut self, _mesh: &Mesh, _rotation: [f32; 2]) -> Result<(), ProbeError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(())
    }
}

#[derive(Default)]
struct TestRenderer {
    loaded: Mutex<Vec<(String, LodLevel, bool)>>,
    lods: Mutex<Vec<LodLevel>>,
    progress: Mutex<Vec<LoadProgress>>,
    previews: Mutex<Vec<u8>>,
    errors: Mutex<Vec<String>>,
}

impl Renderer for TestRenderer {
    fn on_progress(&self, progress: LoadProgress) {
        self.progress.lock().unwrap().push(progress);
    }

    fn on_preview(&self, preview: &Preview) {
        self.previews.lock().unwrap().push(preview.checkpoint);
    }

    fn on_model_loaded(&self, model: &LoadedModel) {
        self.loaded
            .lock()
            .unwrap()
            .push((model.model_id.clone(), model.lod, model.from_cache));
    }

    fn apply_lod(&self, level: LodLevel) {
        self.lods.lock().unwrap().push(level);
    }

    fn on_error(&self, error: &LoadError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

/// Serialize a mesh as binary STL triangle soup
fn to_binary_stl(mesh: &Mesh) -> Vec<u8> {
    let mut out = vec![0u8; 80];
    out.extend_from_slice(&(mesh.triangle_count() as u32).to_le_bytes());
    for tri in mesh.indices.chunks_exact(3) {
        out.extend_from_slice(&[0u8; 12]);
        for &i in tri {
            let base = i as usize * 3;
            for c in &mesh.positions[base..base + 3] {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        out.extend_from_slice(&[0u8; 2]);
    }
    out
}

fn config() -> EngineConfig {
    EngineConfig {
        cache: CacheConfig {
            store: StoreKind::Memory,
            ..CacheConfig::default()
        },
        ..EngineConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_engine_end_to_end() {
    // 143 * 143 = 20_449 vertices: very high, high and medium levels
    let model = to_binary_stl(&plane_grid(142, 142));
    let transport = MemoryTransport::new()
        .with_route("https://cdn.test/uploads/plate.stl", model.clone())
        .with_chunk_size(model.len() / 8 + 1);
    let renderer = Arc::new(TestRenderer::default());
    let (sink, mut reports) = ChannelSink::new();

    let engine = Engine::start(
        config(),
        EngineParts {
            renderer: renderer.clone(),
            probe: Box::new(DesktopProbe),
            benchmark: Box::new(SteadyTarget),
            transport: Arc::new(transport.clone()),
            clock: Arc::new(ManualClock::new(1_700_000_000_000)),
            telemetry: Some(Arc::new(sink)),
            profile_store: Some(Arc::new(MemoryBackend::new())),
        },
    )
    .await;

    let profile = engine.profile().clone();
    assert_eq!(profile.profile_class, ProfileClass::HighEnd);
    assert_eq!(profile.memory_estimate_mb, 1024);
    assert_eq!(profile.gpu_string, "ANGLE (NVIDIA GeForce RTX 3060) (Google Inc. (NVIDIA))");
    assert_relative_eq!(profile.benchmark_fps, 100.0, max_relative = 0.05);

    let request = ModelRequest::new("plate", "https://cdn.test/uploads/plate.stl", "stl");
    let first = engine.viewer().load_model(&request).await.unwrap().unwrap();
    assert!(!first.from_cache);
    assert_eq!(
        first.lod_set.levels(),
        vec![LodLevel::VeryHigh, LodLevel::High, LodLevel::Medium]
    );
    // High-end devices start one step below full detail
    assert_eq!(first.lod, LodLevel::High);
    assert_eq!(*renderer.previews.lock().unwrap(), vec![25, 50, 75]);
    assert_eq!(
        renderer.progress.lock().unwrap().last().and_then(|p| p.percent),
        Some(100.0)
    );

    let second = engine.viewer().load_model(&request).await.unwrap().unwrap();
    assert!(second.from_cache);
    assert_eq!(transport.request_count(), 1);
    assert_eq!(engine.cache().get_cache_stats().await.size, model.len() as u64);

    // A full window of poor frames drops to the coarsest level available
    let mut switched = None;
    for _ in 0..10 {
        switched = switched.or(engine.viewer().record_frame(8.0, Some(150.0), false));
    }
    assert_eq!(switched, Some(LodLevel::Medium));
    assert_eq!(*renderer.lods.lock().unwrap(), vec![LodLevel::Medium]);

    let report = reports.try_recv().unwrap();
    assert_eq!(report.lod_level, LodLevel::VeryLow);
    assert_eq!(report.memory_usage_mb, Some(150.0));
    assert!(renderer.errors.lock().unwrap().is_empty());

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_engine_reuses_persisted_profile() {
    let store = Arc::new(MemoryBackend::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let parts = |store: Arc<MemoryBackend>| EngineParts {
        renderer: Arc::new(TestRenderer::default()),
        probe: Box::new(DesktopProbe),
        benchmark: Box::new(SteadyTarget),
        transport: Arc::new(MemoryTransport::new()),
        clock: clock.clone(),
        telemetry: None,
        profile_store: Some(store),
    };

    let first = Engine::start(config(), parts(store.clone())).await;
    let detected_at = first.profile().detected_at;
    first.shutdown().await;

    clock.advance(60 * 60 * 1000);
    let second = Engine::start(config(), parts(store)).await;
    assert_eq!(second.profile().detected_at, detected_at);
    second.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_model_reports_error() {
    let renderer = Arc::new(TestRenderer::default());
    let engine = Engine::start(
        config(),
        EngineParts {
            renderer: renderer.clone(),
            probe: Box::new(DesktopProbe),
            benchmark: Box::new(SteadyTarget),
            transport: Arc::new(MemoryTransport::new()),
            clock: Arc::new(ManualClock::new(0)),
            telemetry: None,
            profile_store: Some(Arc::new(MemoryBackend::new())),
        },
    )
    .await;

    let err = engine
        .viewer()
        .load_model(&ModelRequest::new("x", "/missing.obj", "obj"))
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::HttpStatus { status: 404, .. }));
    assert_eq!(renderer.errors.lock().unwrap().len(), 1);
    assert!(!engine.cache().has_model("x").await);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_worker_builds_full_ladder_for_120k_vertices() {
    // 347 * 347 = 120_409 vertices
    let mesh = plane_grid(346, 346);
    let worker = LodWorker::new(LodConfig::default().with_strategy(SimplifyStrategy::Stride));

    let mut progress = Vec::new();
    let output = worker
        .submit(WorkerJob::BuildLods {
            mesh,
            format: None,
        })
        .finish_with_progress(|p| progress.push(p))
        .await
        .unwrap();
    let WorkerOutput::Loaded { lod_set, metadata } = output else {
        panic!("expected a LOD set");
    };

    assert_eq!(metadata.vertex_count, 120_409);
    assert_eq!(
        lod_set.levels(),
        vec![
            LodLevel::VeryHigh,
            LodLevel::High,
            LodLevel::Medium,
            LodLevel::Low,
            LodLevel::VeryLow
        ]
    );
    let triangles: Vec<usize> = lod_set.iter().map(|(_, m)| m.triangle_count).collect();
    assert!(triangles.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(progress.last(), Some(&100));

    let small = worker
        .submit(WorkerJob::BuildLods {
            mesh: plane_grid(70, 70),
            format: None,
        })
        .finish()
        .await
        .unwrap();
    let WorkerOutput::Loaded { lod_set, .. } = small else {
        panic!("expected a LOD set");
    };
    assert_eq!(lod_set.levels(), vec![LodLevel::VeryHigh]);
}
