// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device capability profiling.
//!
//! A [`CapabilityProbe`] reports what the host exposes, one optional
//! attribute at a time. A short render benchmark runs through a
//! [`BenchmarkTarget`]. [`classify`] turns the measurements into a
//! [`ProfileClass`] without touching the host, so scoring is testable on
//! its own.

use crate::error::ProbeError;
use async_trait::async_trait;
use printview_cache::{Clock, FlatBackend};
use printview_geometry::{box_mesh, LodLevel, Mesh, BENCHMARK_SEGMENTS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Record key of the persisted profile
pub const PROFILE_KEY: &str = "printview_hardware_profile";

/// Persisted profiles older than this are measured again
pub const PROFILE_MAX_AGE_MS: u64 = 24 * 60 * 60 * 1000;

pub const DEFAULT_BENCHMARK_DURATION: Duration = Duration::from_secs(1);

/// Discrete device capability class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileClass {
    HighEnd,
    MidRange,
    LowEnd,
    VeryLowEnd,
    Webgl1Only,
}

impl ProfileClass {
    pub const ALL: [ProfileClass; 5] = [
        ProfileClass::HighEnd,
        ProfileClass::MidRange,
        ProfileClass::LowEnd,
        ProfileClass::VeryLowEnd,
        ProfileClass::Webgl1Only,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileClass::HighEnd => "highEnd",
            ProfileClass::MidRange => "midRange",
            ProfileClass::LowEnd => "lowEnd",
            ProfileClass::VeryLowEnd => "veryLowEnd",
            ProfileClass::Webgl1Only => "webgl1Only",
        }
    }

    /// GPU/JS memory budget in MB
    pub fn memory_budget_mb(&self) -> f64 {
        match self {
            ProfileClass::HighEnd => 300.0,
            ProfileClass::MidRange => 200.0,
            ProfileClass::LowEnd => 120.0,
            ProfileClass::VeryLowEnd | ProfileClass::Webgl1Only => 80.0,
        }
    }

    /// Default frame-rate thresholds for LOD selection
    pub fn fps_thresholds(&self) -> FpsThresholds {
        match self {
            ProfileClass::HighEnd => FpsThresholds::new(55.0, 40.0, 25.0, 15.0),
            ProfileClass::MidRange => FpsThresholds::new(50.0, 35.0, 20.0, 10.0),
            ProfileClass::LowEnd => FpsThresholds::new(45.0, 30.0, 15.0, 5.0),
            ProfileClass::VeryLowEnd | ProfileClass::Webgl1Only => {
                FpsThresholds::new(30.0, 20.0, 10.0, 5.0)
            }
        }
    }

    /// Level to render before any frame-rate samples exist
    pub fn initial_lod(&self) -> LodLevel {
        match self {
            ProfileClass::HighEnd | ProfileClass::MidRange => LodLevel::High,
            ProfileClass::LowEnd => LodLevel::Low,
            ProfileClass::VeryLowEnd | ProfileClass::Webgl1Only => LodLevel::VeryLow,
        }
    }
}

impl fmt::Display for ProfileClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProfileClass::ALL
            .into_iter()
            .find(|class| class.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown profile class '{}'", s))
    }
}

/// Mean-FPS boundaries between detail levels.
///
/// A window mean at or below `very_low` selects `veryLow`, at or below
/// `low` selects `low`, and so on; above `high` selects `veryHigh`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FpsThresholds {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
    pub very_low: f64,
}

impl FpsThresholds {
    pub const fn new(high: f64, medium: f64, low: f64, very_low: f64) -> Self {
        Self {
            high,
            medium,
            low,
            very_low,
        }
    }

    pub fn select(&self, mean_fps: f64) -> LodLevel {
        if mean_fps <= self.very_low {
            LodLevel::VeryLow
        } else if mean_fps <= self.low {
            LodLevel::Low
        } else if mean_fps <= self.medium {
            LodLevel::Medium
        } else if mean_fps <= self.high {
            LodLevel::High
        } else {
            LodLevel::VeryHigh
        }
    }
}

impl Default for FpsThresholds {
    fn default() -> Self {
        ProfileClass::MidRange.fps_thresholds()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f64,
}

impl Default for ScreenInfo {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            pixel_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuInfo {
    pub renderer: String,
    pub vendor: String,
    pub max_texture_size: Option<u32>,
    pub max_viewport_dims: Option<[u32; 2]>,
    pub max_vertex_attribs: Option<u32>,
}

impl GpuInfo {
    /// "renderer (vendor)"
    pub fn description(&self) -> String {
        format!("{} ({})", self.renderer, self.vendor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Ios,
    Android,
    #[default]
    Desktop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInfo {
    pub name: String,
    pub version: u32,
}

impl Default for BrowserInfo {
    fn default() -> Self {
        Self {
            name: "unknown".into(),
            version: 0,
        }
    }
}

/// Host capability queries. Each returns `None` when the host does not
/// expose the attribute.
pub trait CapabilityProbe: Send + Sync {
    /// 0 (none), 1 or 2
    fn webgl_version(&self) -> Option<u8>;

    fn gpu_info(&self) -> Result<Option<GpuInfo>, ProbeError>;

    /// Direct memory reading in MB, such as a JS heap size limit
    fn memory_mb(&self) -> Option<u64>;

    fn screen(&self) -> Option<ScreenInfo>;

    fn user_agent(&self) -> Option<String>;

    fn viewport_width(&self) -> Option<u32>;
}

/// Something that can render the benchmark mesh
#[async_trait]
pub trait BenchmarkTarget: Send {
    /// Render one frame with the mesh rotated by `rotation` (x, y radians).
    ///
    /// Frame pacing is the target's job: the benchmark loop keeps calling
    /// this until its duration has elapsed.
    async fn render_frame(&mut self, mesh: &Mesh, rotation: [f32; 2]) -> Result<(), ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkResult {
    pub fps: f64,
    pub frames: u32,
    pub duration_ms: u64,
}

/// Render the rotating benchmark box for `duration`, counting frames
pub async fn run_benchmark(
    target: &mut (dyn BenchmarkTarget + '_),
    duration: Duration,
) -> Result<BenchmarkResult, ProbeError> {
    let mesh = box_mesh(BENCHMARK_SEGMENTS);
    let start = tokio::time::Instant::now();
    let mut rotation = [0.0f32; 2];
    let mut frames = 0u32;

    loop {
        frames += 1;
        rotation[0] += 0.01;
        rotation[1] += 0.01;
        target.render_frame(&mesh, rotation).await?;

        let elapsed = start.elapsed();
        if elapsed >= duration {
            return Ok(BenchmarkResult {
                fps: frames as f64 / elapsed.as_secs_f64(),
                frames,
                duration_ms: elapsed.as_millis() as u64,
            });
        }
    }
}

/// Facts derived from the user agent and viewport
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTraits {
    pub is_mobile: bool,
    pub device_class: DeviceClass,
    pub high_end_mobile: bool,
    pub browser: BrowserInfo,
}

const MOBILE_MARKERS: [&str; 8] = [
    "android",
    "webos",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
];

impl DeviceTraits {
    pub fn detect(user_agent: &str, viewport_width: Option<u32>, pixel_ratio: f64) -> Self {
        let lower = user_agent.to_ascii_lowercase();
        let is_mobile = MOBILE_MARKERS.iter().any(|m| lower.contains(m))
            || viewport_width.is_some_and(|w| w <= 768);

        let device_class = if ["iPad", "iPhone", "iPod"].iter().any(|m| user_agent.contains(m)) {
            DeviceClass::Ios
        } else if user_agent.contains("Android") {
            DeviceClass::Android
        } else {
            DeviceClass::Desktop
        };

        let recent_iphone = user_agent
            .match_indices("iPhone 1")
            .any(|(i, m)| matches!(user_agent.as_bytes().get(i + m.len()), Some(b'1'..=b'9')));
        let high_end_mobile = recent_iphone
            || user_agent.contains("iPhone X")
            || user_agent.contains("iPad Pro")
            || pixel_ratio >= 3.0;

        Self {
            is_mobile,
            device_class,
            high_end_mobile,
            browser: parse_browser(user_agent),
        }
    }

    /// Memory estimate in MB when no direct reading exists
    pub fn estimated_memory_mb(&self) -> u64 {
        if !self.is_mobile {
            return 1024;
        }
        match (self.device_class, self.high_end_mobile) {
            (DeviceClass::Ios, true) => 512,
            (DeviceClass::Ios, false) => 256,
            (_, true) => 384,
            (_, false) => 192,
        }
    }
}

/// Leading decimal digits of `s`
fn leading_number(s: &str) -> Option<u32> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

/// Version following the first of `tokens` that is directly followed by '/'
fn version_after(lower: &str, tokens: &[&str]) -> Option<u32> {
    tokens.iter().find_map(|token| {
        lower
            .match_indices(token)
            .find_map(|(i, _)| lower[i + token.len()..].strip_prefix('/'))
            .and_then(leading_number)
    })
}

fn parse_browser(user_agent: &str) -> BrowserInfo {
    let lower = user_agent.to_ascii_lowercase();
    let found = |name: &str, version: u32| BrowserInfo {
        name: name.into(),
        version,
    };

    if let Some(v) = version_after(&lower, &["chrome", "chromium", "crios"]) {
        return found("chrome", v);
    }
    if let Some(v) = version_after(&lower, &["firefox", "fxios"]) {
        return found("firefox", v);
    }
    if let Some(pos) = lower.find("version/") {
        let rest = &lower[pos + "version/".len()..];
        if rest.contains("safari") {
            if let Some(v) = leading_number(rest) {
                return found("safari", v);
            }
        }
    }
    if let Some(v) = version_after(&lower, &["edge"]) {
        return found("edge", v);
    }
    if let Some(pos) = lower.find("trident") {
        if let Some(rv) = lower[pos..].find("rv:") {
            if let Some(v) = leading_number(&lower[pos + rv + 3..]) {
                return found("ie", v);
            }
        }
    }
    BrowserInfo::default()
}

/// Inputs to [`classify`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifyInput {
    pub webgl_version: u8,
    pub benchmark_fps: f64,
    pub memory_mb: u64,
    pub screen: ScreenInfo,
    pub is_mobile: bool,
}

/// Score the measurements and pick a class.
///
/// WebGL 0 and 1 short-circuit to their own classes with a score of 0.
pub fn classify(input: &ClassifyInput) -> (ProfileClass, u32) {
    match input.webgl_version {
        0 => return (ProfileClass::VeryLowEnd, 0),
        1 => return (ProfileClass::Webgl1Only, 0),
        _ => {}
    }

    let mut score = 0;

    let fps = input.benchmark_fps;
    if fps >= 55.0 {
        score += 40;
    } else if fps >= 40.0 {
        score += 30;
    } else if fps >= 25.0 {
        score += 20;
    } else if fps > 0.0 {
        score += 10;
    }

    score += match input.memory_mb {
        m if m >= 768 => 30,
        m if m >= 384 => 20,
        m if m >= 192 => 10,
        _ => 5,
    };

    if input.screen.width >= 1920 || input.screen.height >= 1080 {
        score += 10;
    }
    if input.screen.pixel_ratio >= 2.0 {
        score += 10;
    }

    if !input.is_mobile {
        score += 20;
    }

    let class = match score {
        s if s >= 70 => ProfileClass::HighEnd,
        s if s >= 50 => ProfileClass::MidRange,
        s if s >= 30 => ProfileClass::LowEnd,
        _ => ProfileClass::VeryLowEnd,
    };
    (class, score)
}

/// Classified host capabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    pub webgl_version: u8,
    pub memory_estimate_mb: u64,
    pub screen_info: ScreenInfo,
    pub gpu_string: String,
    pub gpu: Option<GpuInfo>,
    pub benchmark_fps: f64,
    pub score: u32,
    pub profile_class: ProfileClass,
    pub is_mobile: bool,
    pub device_class: DeviceClass,
    pub browser: BrowserInfo,
    /// Milliseconds since the Unix epoch
    pub detected_at: u64,
}

impl HardwareProfile {
    /// Most conservative profile, used when probing fails
    pub fn fallback(detected_at: u64) -> Self {
        Self {
            webgl_version: 0,
            memory_estimate_mb: 0,
            screen_info: ScreenInfo::default(),
            gpu_string: "unknown".into(),
            gpu: None,
            benchmark_fps: 0.0,
            score: 0,
            profile_class: ProfileClass::VeryLowEnd,
            is_mobile: false,
            device_class: DeviceClass::Desktop,
            browser: BrowserInfo::default(),
            detected_at,
        }
    }

    pub fn memory_budget_mb(&self) -> f64 {
        self.profile_class.memory_budget_mb()
    }

    pub fn initial_lod(&self) -> LodLevel {
        self.profile_class.initial_lod()
    }

    pub fn is_fresh(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.detected_at) < PROFILE_MAX_AGE_MS
    }
}

/// One-time host classification with session and persisted caching
pub struct DeviceProfiler {
    probe: Box<dyn CapabilityProbe>,
    benchmark: tokio::sync::Mutex<Box<dyn BenchmarkTarget>>,
    store: Option<Arc<dyn FlatBackend>>,
    clock: Arc<dyn Clock>,
    benchmark_duration: Duration,
    session: Mutex<Option<HardwareProfile>>,
}

impl DeviceProfiler {
    pub fn new(
        probe: Box<dyn CapabilityProbe>,
        benchmark: Box<dyn BenchmarkTarget>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            probe,
            benchmark: tokio::sync::Mutex::new(benchmark),
            store: None,
            clock,
            benchmark_duration: DEFAULT_BENCHMARK_DURATION,
            session: Mutex::new(None),
        }
    }

    /// Persist profiles across sessions in `store`
    pub fn with_store(mut self, store: Arc<dyn FlatBackend>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_benchmark_duration(mut self, duration: Duration) -> Self {
        self.benchmark_duration = duration;
        self
    }

    fn session_profile(&self) -> Option<HardwareProfile> {
        self.session.lock().ok().and_then(|s| s.clone())
    }

    fn remember(&self, profile: &HardwareProfile) {
        if let Ok(mut session) = self.session.lock() {
            *session = Some(profile.clone());
        }
    }

    fn load_persisted(&self, now_ms: u64) -> Option<HardwareProfile> {
        let store = self.store.as_ref()?;
        let raw = match store.get_item(PROFILE_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read cached hardware profile");
                return None;
            }
        };
        match serde_json::from_str::<HardwareProfile>(&raw) {
            Ok(profile) if profile.is_fresh(now_ms) => Some(profile),
            Ok(_) => {
                debug!("Cached hardware profile is stale");
                None
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable hardware profile");
                None
            }
        }
    }

    fn persist(&self, profile: &HardwareProfile) {
        let Some(store) = &self.store else {
            return;
        };
        let result = serde_json::to_string(profile)
            .map_err(printview_cache::StoreError::from)
            .and_then(|json| store.set_item(PROFILE_KEY, &json));
        if let Err(e) = result {
            warn!(error = %e, "Unable to cache hardware profile");
        }
    }

    async fn measure(&self, now_ms: u64) -> Result<HardwareProfile, ProbeError> {
        let webgl_version = self.probe.webgl_version().unwrap_or(0);
        let screen = self.probe.screen().unwrap_or_default();
        let user_agent = self.probe.user_agent().unwrap_or_default();
        let traits = DeviceTraits::detect(&user_agent, self.probe.viewport_width(), screen.pixel_ratio);
        let memory_mb = self
            .probe
            .memory_mb()
            .unwrap_or_else(|| traits.estimated_memory_mb());
        let gpu = self.probe.gpu_info()?;

        // Scoring ignores the benchmark below WebGL 2
        let benchmark_fps = if webgl_version >= 2 {
            let mut target = self.benchmark.lock().await;
            run_benchmark(target.as_mut(), self.benchmark_duration).await?.fps
        } else {
            0.0
        };

        let (profile_class, score) = classify(&ClassifyInput {
            webgl_version,
            benchmark_fps,
            memory_mb,
            screen,
            is_mobile: traits.is_mobile,
        });

        Ok(HardwareProfile {
            webgl_version,
            memory_estimate_mb: memory_mb,
            screen_info: screen,
            gpu_string: gpu
                .as_ref()
                .map(GpuInfo::description)
                .unwrap_or_else(|| "unknown".into()),
            gpu,
            benchmark_fps,
            score,
            profile_class,
            is_mobile: traits.is_mobile,
            device_class: traits.device_class,
            browser: traits.browser,
            detected_at: now_ms,
        })
    }

    /// Classify the host, reusing this session's or a persisted profile
    /// younger than 24 hours. Probe failures yield the most conservative
    /// class.
    pub async fn detect_hardware_capabilities(&self) -> HardwareProfile {
        let now = self.clock.now_ms();
        if let Some(profile) = self.session_profile().filter(|p| p.is_fresh(now)) {
            return profile;
        }

        if let Some(profile) = self.load_persisted(now) {
            debug!(class = %profile.profile_class, "Using cached hardware profile");
            self.remember(&profile);
            return profile;
        }

        let profile = match self.measure(now).await {
            Ok(profile) => {
                info!(
                    class = %profile.profile_class,
                    score = profile.score,
                    webgl = profile.webgl_version,
                    memory_mb = profile.memory_estimate_mb,
                    fps = profile.benchmark_fps,
                    gpu = %profile.gpu_string,
                    "Device classified"
                );
                self.persist(&profile);
                profile
            }
            Err(e) => {
                warn!(error = %e, "Hardware profiling failed, assuming very low end");
                HardwareProfile::fallback(now)
            }
        };
        self.remember(&profile);
        profile
    }
}
