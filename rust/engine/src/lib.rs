//! PrintView Engine
//!
//! Runs a model viewer's data side: serves models from the asset cache or
//! streams them with early previews, builds LOD ladders on blocking threads,
//! classifies the device once and then adapts the displayed level to the
//! measured frame rate and memory use.
//!
//! # Example
//!
//! ```rust,ignore
//! use printview_engine::{Engine, EngineConfig, EngineParts, ModelRequest};
//!
//! let engine = Engine::start(EngineConfig::from_env(), parts).await;
//! engine
//!     .viewer()
//!     .load_model(&ModelRequest::new("42", "/uploads/benchy.stl", "stl"))
//!     .await?;
//!
//! // Once per rendered batch of frames
//! engine.viewer().record_frame(fps, Some(memory_mb), interacting);
//! ```

pub mod adaptive;
pub mod config;
pub mod error;
pub mod loader;
pub mod profiler;
pub mod runtime;
pub mod telemetry;
pub mod viewer;
pub mod worker;

pub use adaptive::{
    run_memory_cleanup, spawn_memory_watchdog, AdaptiveController, FpsSample, MemoryPressure,
    MemoryState,
};
pub use config::{EngineConfig, DEFAULT_CLEANUP_INTERVAL_MS};
pub use error::{ConfigError, LoadError, ProbeError, RenderError, Result};
pub use loader::{
    cache_busting_url, HttpTransport, LoadObserver, LoadProgress, LoadedAsset, MemoryTransport,
    Preview, ProgressiveLoader, Transport, TransportResponse, PREVIEW_TRIANGLES,
};
pub use profiler::{
    classify, run_benchmark, BenchmarkResult, BenchmarkTarget, BrowserInfo, CapabilityProbe,
    ClassifyInput, DeviceClass, DeviceProfiler, DeviceTraits, FpsThresholds, GpuInfo,
    HardwareProfile, ProfileClass, ScreenInfo,
};
pub use runtime::{Engine, EngineParts};
pub use telemetry::{ChannelSink, TelemetryReport, TelemetrySink, TracingSink};
pub use viewer::{LoadSession, LoadedModel, ModelRequest, Renderer, ViewerAdapter};
pub use worker::{LodWorker, WorkerHandle, WorkerJob, WorkerMessage, WorkerOutput};
