// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Glue between a model viewer and the cache, loader and LOD worker.
//!
//! [`ViewerAdapter::load_model`] serves a model from the asset cache when it
//! can, downloads it progressively otherwise, builds its LOD ladder off the
//! async runtime and hands the result to the [`Renderer`]. Starting a new
//! load, [`cancel`](ViewerAdapter::cancel) or
//! [`dispose`](ViewerAdapter::dispose) supersede the load in flight; its
//! work still finishes but the result is dropped.

use crate::adaptive::AdaptiveController;
use crate::error::{LoadError, RenderError, Result};
use crate::loader::{cache_busting_url, LoadObserver, LoadProgress, ProgressiveLoader, Preview};
use crate::worker::{LodWorker, WorkerJob, WorkerOutput};
use printview_cache::{AssetCache, ModelType, Payload};
use printview_core::ModelFormat;
use printview_geometry::{LodLevel, LodSet, Mesh, ModelMetadata};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Rendering side of the viewer.
///
/// Hooks are called from async tasks and must not block. Everything except
/// [`on_model_loaded`](Renderer::on_model_loaded) defaults to a no-op.
pub trait Renderer: Send + Sync {
    fn on_progress(&self, _progress: LoadProgress) {}

    /// Show a coarse wireframe while the download continues
    fn on_preview(&self, _preview: &Preview) {}

    fn on_model_loaded(&self, model: &LoadedModel);

    /// Switch the displayed mesh to `level` of the current ladder
    fn apply_lod(&self, _level: LodLevel) {}

    /// Release textures, geometry buffers and render targets not in use
    fn dispose_gpu_resources(&self) -> std::result::Result<(), RenderError> {
        Ok(())
    }

    /// Ask the host for a garbage collection, where it exposes one
    fn request_gc(&self) -> std::result::Result<(), RenderError> {
        Ok(())
    }

    fn on_error(&self, _error: &LoadError) {}
}

/// What the viewer asked to display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    /// Cache key; an empty id bypasses the cache
    pub model_id: String,
    pub file_path: String,
    /// File extension such as `stl` or `obj`
    pub file_type: String,
}

impl ModelRequest {
    pub fn new(
        model_id: impl Into<String>,
        file_path: impl Into<String>,
        file_type: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            file_path: file_path.into(),
            file_type: file_type.into(),
        }
    }
}

/// State of the load in flight; dropped once it completes or fails
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSession {
    pub model_id: String,
    pub file_path: String,
    pub file_type: ModelFormat,
    pub current_lod: LodLevel,
    pub bytes_loaded: u64,
    pub bytes_total: Option<u64>,
}

/// A model ready to render
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub model_id: String,
    pub lod_set: LodSet,
    pub metadata: ModelMetadata,
    /// Level to display first
    pub lod: LodLevel,
    pub from_cache: bool,
}

impl LoadedModel {
    /// Mesh for the display level
    pub fn mesh(&self) -> Option<Mesh> {
        self.lod_set.get(self.lod).map(|m| m.to_mesh())
    }
}

#[derive(Default)]
struct Shared {
    generation: AtomicU64,
    session: Mutex<Option<LoadSession>>,
    current: Mutex<Option<LoadedModel>>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Drop the session of a load that finished or failed
    fn clear_session(&self, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        if let Ok(mut session) = self.session.lock() {
            *session = None;
        }
    }

    fn update_session(&self, generation: u64, update: impl FnOnce(&mut LoadSession)) {
        if !self.is_current(generation) {
            return;
        }
        if let Ok(mut session) = self.session.lock() {
            if let Some(session) = session.as_mut() {
                update(session);
            }
        }
    }
}

/// Forwards loader events to the renderer while its load is current
struct SessionObserver<'a> {
    shared: &'a Shared,
    renderer: &'a dyn Renderer,
    generation: u64,
}

impl LoadObserver for SessionObserver<'_> {
    fn on_progress(&self, progress: LoadProgress) {
        if !self.shared.is_current(self.generation) {
            return;
        }
        self.shared.update_session(self.generation, |session| {
            session.bytes_loaded = progress.loaded_bytes;
            session.bytes_total = progress.total_bytes;
        });
        self.renderer.on_progress(progress);
    }

    fn on_preview(&self, preview: Preview) {
        if self.shared.is_current(self.generation) {
            self.renderer.on_preview(&preview);
        }
    }
}

/// Intercepts model loads for one viewer
pub struct ViewerAdapter {
    cache: AssetCache,
    loader: ProgressiveLoader,
    worker: LodWorker,
    renderer: Arc<dyn Renderer>,
    controller: Option<Arc<Mutex<AdaptiveController>>>,
    cache_version: String,
    shared: Shared,
}

impl ViewerAdapter {
    pub fn new(
        cache: AssetCache,
        loader: ProgressiveLoader,
        worker: LodWorker,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let cache_version = cache.config().version.clone();
        Self {
            cache,
            loader,
            worker,
            renderer,
            controller: None,
            cache_version,
            shared: Shared::default(),
        }
    }

    /// Take the initial display level from `controller` and let
    /// [`record_frame`](Self::record_frame) drive it
    pub fn with_controller(mut self, controller: Arc<Mutex<AdaptiveController>>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn with_cache_version(mut self, version: impl Into<String>) -> Self {
        self.cache_version = version.into();
        self
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    /// Snapshot of the load in flight
    pub fn session(&self) -> Option<LoadSession> {
        self.shared.session.lock().ok().and_then(|s| s.clone())
    }

    /// The most recently displayed model
    pub fn current_model(&self) -> Option<LoadedModel> {
        self.shared.current.lock().ok().and_then(|m| m.clone())
    }

    /// Supersede the load in flight, if any
    pub fn cancel(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut session) = self.shared.session.lock() {
            *session = None;
        }
    }

    /// Cancel and forget the displayed model
    pub fn dispose(&self) {
        self.cancel();
        if let Ok(mut current) = self.shared.current.lock() {
            *current = None;
        }
    }

    fn preferred_lod(&self) -> LodLevel {
        self.controller
            .as_ref()
            .and_then(|c| c.lock().ok().map(|c| c.current_lod()))
            .unwrap_or(LodLevel::VeryHigh)
    }

    /// Load and display a model.
    ///
    /// Returns `Ok(None)` when the load was superseded before it finished.
    /// Errors are also reported to the renderer's error hook.
    pub async fn load_model(&self, request: &ModelRequest) -> Result<Option<LoadedModel>> {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let format = match request.file_type.parse::<ModelFormat>() {
            Ok(format) => format,
            Err(_) => {
                let error = LoadError::UnsupportedFormat(request.file_type.clone());
                self.report_error(generation, &error);
                return Err(error);
            }
        };

        if let Ok(mut session) = self.shared.session.lock() {
            *session = Some(LoadSession {
                model_id: request.model_id.clone(),
                file_path: request.file_path.clone(),
                file_type: format,
                current_lod: self.preferred_lod(),
                bytes_loaded: 0,
                bytes_total: None,
            });
        }

        match self.load_inner(request, format, generation).await {
            Ok(model) => Ok(model),
            Err(error) => {
                self.report_error(generation, &error);
                Err(error)
            }
        }
    }

    async fn load_inner(
        &self,
        request: &ModelRequest,
        format: ModelFormat,
        generation: u64,
    ) -> Result<Option<LoadedModel>> {
        if !request.model_id.is_empty() {
            if let Some(model) = self.load_cached(request, format, generation).await {
                return Ok(self.present(model, generation));
            }
        }

        let observer = SessionObserver {
            shared: &self.shared,
            renderer: self.renderer.as_ref(),
            generation,
        };
        let url = if request.model_id.is_empty() {
            request.file_path.clone()
        } else {
            cache_busting_url(
                &request.file_path,
                &request.model_id,
                &self.cache_version,
                self.cache.clock().now_ms(),
            )
        };

        let asset = match self.loader.load_progressively(&url, format, &observer).await {
            Ok(asset) => asset,
            Err(e) if e.is_decode() => {
                warn!(url = %url, error = %e, "Streaming decode failed, retrying standard load");
                self.loader.load_standard(&url, format, &observer).await?
            }
            Err(e) => return Err(e),
        };

        if !self.shared.is_current(generation) {
            debug!(model_id = %request.model_id, "Discarding superseded download");
            return Ok(None);
        }

        let output = self
            .worker
            .submit(WorkerJob::BuildLods {
                mesh: asset.mesh,
                format: Some(format),
            })
            .finish()
            .await?;

        if !request.model_id.is_empty() {
            let payload = Payload::for_model(format, asset.bytes);
            if let Err(e) = self
                .cache
                .add_model(request.model_id.clone(), ModelType::from(format), payload)
                .await
            {
                warn!(model_id = %request.model_id, error = %e, "Model not cached");
            }
        }

        Ok(self.present(self.into_model(request, output, false)?, generation))
    }

    /// Cache hit path. A cached payload that no longer decodes is dropped
    /// from the cache and the caller falls back to the network.
    async fn load_cached(
        &self,
        request: &ModelRequest,
        format: ModelFormat,
        generation: u64,
    ) -> Option<LoadedModel> {
        let entry = self.cache.get_model(&request.model_id).await?;
        debug!(model_id = %request.model_id, size = entry.size_bytes, "Serving model from cache");

        let total = entry.size_bytes;
        let bytes = match entry.data {
            Payload::Binary(bytes) => bytes,
            Payload::Text(text) => text.into_bytes(),
        };
        self.shared.update_session(generation, |session| {
            session.bytes_loaded = total;
            session.bytes_total = Some(total);
        });

        let result = self
            .worker
            .submit(WorkerJob::LoadModel { bytes, format })
            .finish()
            .await
            .and_then(|output| self.into_model(request, output, true));
        match result {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(model_id = %request.model_id, error = %e, "Cached model unusable, refetching");
                self.cache.remove_model(&request.model_id).await;
                None
            }
        }
    }

    fn into_model(
        &self,
        request: &ModelRequest,
        output: WorkerOutput,
        from_cache: bool,
    ) -> Result<LoadedModel> {
        let WorkerOutput::Loaded { lod_set, metadata } = output else {
            return Err(LoadError::Worker("unexpected worker output".into()));
        };
        let (lod, _) = lod_set
            .resolve(self.preferred_lod())
            .ok_or_else(|| LoadError::Worker("empty LOD set".into()))?;
        Ok(LoadedModel {
            model_id: request.model_id.clone(),
            lod_set,
            metadata,
            lod,
            from_cache,
        })
    }

    fn present(&self, model: LoadedModel, generation: u64) -> Option<LoadedModel> {
        if !self.shared.is_current(generation) {
            debug!(model_id = %model.model_id, "Discarding superseded model");
            return None;
        }
        self.shared.clear_session(generation);
        info!(
            model_id = %model.model_id,
            triangles = model.metadata.triangle_count,
            levels = model.lod_set.len(),
            lod = %model.lod,
            from_cache = model.from_cache,
            "Model loaded"
        );
        self.renderer.on_model_loaded(&model);
        if let Ok(mut current) = self.shared.current.lock() {
            *current = Some(model.clone());
        }
        Some(model)
    }

    fn report_error(&self, generation: u64, error: &LoadError) {
        if self.shared.is_current(generation) {
            self.shared.clear_session(generation);
            warn!(error = %error, "Model load failed");
            self.renderer.on_error(error);
        }
    }

    /// Show `requested`, or the nearest coarser level the current ladder has.
    /// Returns the level actually applied.
    pub fn apply_lod(&self, requested: LodLevel) -> Option<LodLevel> {
        let (level, changed) = {
            let mut current = self.shared.current.lock().ok()?;
            let model = current.as_mut()?;
            let (level, _) = model.lod_set.resolve(requested)?;
            let changed = level != model.lod;
            model.lod = level;
            (level, changed)
        };
        // The renderer may call back into the adapter
        if changed {
            self.renderer.apply_lod(level);
        }
        Some(level)
    }

    /// Feed one frame-rate sample to the adaptive controller and apply any
    /// level switch it decides on
    pub fn record_frame(&self, fps: f64, memory_mb: Option<f64>, interacting: bool) -> Option<LodLevel> {
        let controller = self.controller.as_ref()?;
        let switched = controller
            .lock()
            .ok()?
            .record_sample(fps, memory_mb, interacting)?;
        self.apply_lod(switched)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::loader::MemoryTransport;
    use printview_cache::{CacheConfig, FlatStore, ManualClock, MemoryBackend};

    /// Renderer that records every hook call
    #[derive(Default)]
    pub(crate) struct RecordingRenderer {
        pub(crate) fail_dispose: Option<RenderError>,
        events: Mutex<Vec<String>>,
        loaded: Mutex<Vec<LoadedModel>>,
        lods: Mutex<Vec<LodLevel>>,
        disposals: Mutex<usize>,
    }

    impl RecordingRenderer {
        pub(crate) fn failing_dispose(error: RenderError) -> Self {
            Self {
                fail_dispose: Some(error),
                ..Self::default()
            }
        }

        pub(crate) fn disposals(&self) -> usize {
            *self.disposals.lock().unwrap()
        }

        pub(crate) fn applied_lods(&self) -> Vec<LodLevel> {
            self.lods.lock().unwrap().clone()
        }

        pub(crate) fn loaded(&self) -> Vec<LoadedModel> {
            self.loaded.lock().unwrap().clone()
        }

        pub(crate) fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Renderer for RecordingRenderer {
        fn on_progress(&self, progress: LoadProgress) {
            self.events
                .lock()
                .unwrap()
                .push(format!("progress:{}", progress.percent.unwrap_or(-1.0) as i32));
        }

        fn on_preview(&self, preview: &Preview) {
            self.events.lock().unwrap().push(format!("preview:{}", preview.checkpoint));
        }

        fn on_model_loaded(&self, model: &LoadedModel) {
            self.events.lock().unwrap().push(format!("loaded:{}", model.model_id));
            self.loaded.lock().unwrap().push(model.clone());
        }

        fn apply_lod(&self, level: LodLevel) {
            self.lods.lock().unwrap().push(level);
        }

        fn dispose_gpu_resources(&self) -> std::result::Result<(), RenderError> {
            *self.disposals.lock().unwrap() += 1;
            match &self.fail_dispose {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }

        fn on_error(&self, error: &LoadError) {
            self.events.lock().unwrap().push(format!("error:{}", error));
        }
    }

    fn triangle_stl() -> &'static str {
        "solid t\nfacet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nvertex 0 1 0\n\
endloop\nendfacet\nendsolid t\n"
    }

    pub(crate) fn adapter(transport: MemoryTransport, renderer: Arc<dyn Renderer>) -> ViewerAdapter {
        let cache = AssetCache::with_store(
            CacheConfig::default(),
            Arc::new(ManualClock::new(1_000)),
            Arc::new(FlatStore::open(MemoryBackend::new(), "1.0").unwrap()),
        );
        ViewerAdapter::new(
            cache,
            ProgressiveLoader::new(Arc::new(transport)),
            LodWorker::default(),
            renderer,
        )
    }

    /// Build the ladder for `mesh` and display it as the current model
    pub(crate) async fn show_mesh(adapter: &ViewerAdapter, id: &str, mesh: Mesh) -> LoadedModel {
        let output = LodWorker::default()
            .submit(WorkerJob::BuildLods { mesh, format: None })
            .finish()
            .await
            .unwrap();
        let model = adapter
            .into_model(&ModelRequest::new(id, format!("/{}.stl", id), "stl"), output, false)
            .unwrap();
        adapter
            .present(model, adapter.shared.generation.load(Ordering::SeqCst))
            .unwrap()
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let transport = MemoryTransport::new().with_route("/models/a.stl", triangle_stl());
        let renderer = Arc::new(RecordingRenderer::default());
        let adapter = adapter(transport.clone(), renderer.clone());
        let request = ModelRequest::new("a", "/models/a.stl", "STL");

        let first = adapter.load_model(&request).await.unwrap().unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.lod, LodLevel::VeryHigh);
        assert_eq!(first.metadata.triangle_count, 1);
        assert!(adapter.cache().has_model("a").await);

        let second = adapter.load_model(&request).await.unwrap().unwrap();
        assert!(second.from_cache);
        assert_eq!(transport.request_count(), 1);
        assert_eq!(renderer.loaded().len(), 2);
        assert!(adapter.session().is_none());
    }

    #[tokio::test]
    async fn test_empty_id_bypasses_cache() {
        let transport = MemoryTransport::new().with_route("/b.stl", triangle_stl());
        let renderer = Arc::new(RecordingRenderer::default());
        let adapter = adapter(transport, renderer);

        adapter
            .load_model(&ModelRequest::new("", "/b.stl", "stl"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(adapter.cache().get_cache_stats().await.count, 0);
    }

    #[tokio::test]
    async fn test_errors_reach_renderer() {
        let transport = MemoryTransport::new().with_status("/c.stl", 500);
        let renderer = Arc::new(RecordingRenderer::default());
        let adapter = adapter(transport, renderer.clone());

        let err = adapter
            .load_model(&ModelRequest::new("c", "/c.stl", "stl"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::HttpStatus { status: 500, .. }));

        let err = adapter
            .load_model(&ModelRequest::new("d", "/d.3mf", "3mf"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));

        let errors = renderer.events().into_iter().filter(|e| e.starts_with("error:")).count();
        assert_eq!(errors, 2);
        assert!(adapter.session().is_none());
    }

    #[tokio::test]
    async fn test_decode_failure_retries_once() {
        let transport = MemoryTransport::new().with_route("/e.obj", "# nothing here\n");
        let renderer = Arc::new(RecordingRenderer::default());
        let adapter = adapter(transport.clone(), renderer);

        let err = adapter
            .load_model(&ModelRequest::new("e", "/e.obj", "obj"))
            .await
            .unwrap_err();
        assert!(err.is_decode());
        assert_eq!(transport.request_count(), 2);
        assert!(!adapter.cache().has_model("e").await);
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_refetched() {
        let transport = MemoryTransport::new().with_route("/f.stl", triangle_stl());
        let renderer = Arc::new(RecordingRenderer::default());
        let adapter = adapter(transport.clone(), renderer);
        adapter
            .cache()
            .add_model("f", ModelType::Stl, Payload::Binary(b"garbage".to_vec()))
            .await
            .unwrap();

        let model = adapter
            .load_model(&ModelRequest::new("f", "/f.stl", "stl"))
            .await
            .unwrap()
            .unwrap();
        assert!(!model.from_cache);
        assert_eq!(transport.request_count(), 1);
        let cached = adapter.cache().get_model("f").await.unwrap();
        assert_eq!(cached.data.as_bytes(), triangle_stl().as_bytes());
    }

    #[tokio::test]
    async fn test_obj_is_cached_as_text() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let transport = MemoryTransport::new().with_route("/g.obj", obj);
        let adapter = adapter(transport, Arc::new(RecordingRenderer::default()));

        adapter
            .load_model(&ModelRequest::new("g", "/g.obj", "obj"))
            .await
            .unwrap();
        let entry = adapter.cache().get_model("g").await.unwrap();
        assert_eq!(entry.data, Payload::Text(obj.to_string()));
        assert_eq!(entry.model_type, ModelType::Obj);
    }

    #[tokio::test]
    async fn test_cancelled_load_is_discarded() {
        let transport = MemoryTransport::new().with_route("/h.stl", triangle_stl());
        let renderer = Arc::new(RecordingRenderer::default());
        let adapter = Arc::new(adapter(transport, renderer.clone()));

        let request = ModelRequest::new("h", "/h.stl", "stl");
        let load = {
            let adapter = adapter.clone();
            async move { adapter.load_model(&request).await }
        };
        // Poll the load once so it registers its generation, then cancel
        let mut load = Box::pin(load);
        assert!(futures::poll!(load.as_mut()).is_pending());
        let session = adapter.session().unwrap();
        assert_eq!(session.model_id, "h");
        assert_eq!(session.file_type, ModelFormat::Stl);
        adapter.cancel();

        assert!(load.await.unwrap().is_none());
        assert!(renderer.loaded().is_empty());
        assert!(adapter.session().is_none());
    }

    #[tokio::test]
    async fn test_record_frame_switches_displayed_level() {
        use crate::profiler::FpsThresholds;
        use printview_geometry::uv_sphere;

        let renderer = Arc::new(RecordingRenderer::default());
        let controller = Arc::new(Mutex::new(AdaptiveController::new(
            FpsThresholds::new(55.0, 40.0, 25.0, 15.0),
            LodLevel::VeryHigh,
            200.0,
            Arc::new(ManualClock::new(0)),
        )));
        let adapter = adapter(MemoryTransport::new(), renderer.clone()).with_controller(controller);
        show_mesh(&adapter, "s", uv_sphere(160, 160)).await;

        let mut applied = None;
        for _ in 0..10 {
            applied = applied.or(adapter.record_frame(5.0, None, false));
        }
        // The ladder stops at medium, the nearest level to very low
        assert_eq!(applied, Some(LodLevel::Medium));
        assert_eq!(renderer.applied_lods(), vec![LodLevel::Medium]);
    }

    /// Reads the adapter back from inside its LOD hook
    #[derive(Default)]
    struct ReentrantRenderer {
        viewer: std::sync::OnceLock<std::sync::Weak<ViewerAdapter>>,
        seen: Mutex<Vec<Option<LodLevel>>>,
    }

    impl Renderer for ReentrantRenderer {
        fn on_model_loaded(&self, _model: &LoadedModel) {}

        fn apply_lod(&self, _level: LodLevel) {
            if let Some(viewer) = self.viewer.get().and_then(std::sync::Weak::upgrade) {
                let lod = viewer.current_model().map(|m| m.lod);
                self.seen.lock().unwrap().push(lod);
            }
        }
    }

    #[tokio::test]
    async fn test_renderer_can_read_adapter_during_lod_switch() {
        use printview_geometry::uv_sphere;

        let renderer = Arc::new(ReentrantRenderer::default());
        let adapter = Arc::new(adapter(MemoryTransport::new(), renderer.clone()));
        renderer.viewer.set(Arc::downgrade(&adapter)).unwrap();
        show_mesh(&adapter, "r", uv_sphere(160, 160)).await;

        assert_eq!(adapter.apply_lod(LodLevel::Medium), Some(LodLevel::Medium));
        assert_eq!(*renderer.seen.lock().unwrap(), vec![Some(LodLevel::Medium)]);
    }
}
