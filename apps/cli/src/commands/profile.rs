// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `profile`: classify a hardware report captured in a browser.

use anyhow::Context;
use printview_engine::{
    classify, BrowserInfo, ClassifyInput, DeviceClass, DeviceTraits, EngineConfig, FpsThresholds,
    ProfileClass, ScreenInfo,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Measurements as posted by the viewer's diagnostics page
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareReport {
    pub webgl_version: u8,
    pub benchmark_fps: f64,
    /// `navigator.deviceMemory` in MB, when the browser exposes it
    #[serde(default)]
    pub memory_mb: Option<u64>,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub viewport_width: Option<u32>,
    #[serde(default)]
    pub screen: ScreenInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub profile_class: ProfileClass,
    pub score: u32,
    pub memory_mb: u64,
    pub memory_budget_mb: f64,
    pub initial_lod: String,
    pub fps_thresholds: FpsThresholds,
    pub is_mobile: bool,
    pub device_class: DeviceClass,
    pub browser: BrowserInfo,
}

/// Classify `report`, applying any threshold overrides in `config`
pub fn classify_report(report: &HardwareReport, config: &EngineConfig) -> Classification {
    let traits = DeviceTraits::detect(
        &report.user_agent,
        report.viewport_width,
        report.screen.pixel_ratio,
    );
    let memory_mb = report
        .memory_mb
        .unwrap_or_else(|| traits.estimated_memory_mb());
    let (profile_class, score) = classify(&ClassifyInput {
        webgl_version: report.webgl_version,
        benchmark_fps: report.benchmark_fps,
        memory_mb,
        screen: report.screen,
        is_mobile: traits.is_mobile,
    });

    Classification {
        profile_class,
        score,
        memory_mb,
        memory_budget_mb: profile_class.memory_budget_mb(),
        initial_lod: profile_class.initial_lod().as_str().to_string(),
        fps_thresholds: config.thresholds_for(profile_class),
        is_mobile: traits.is_mobile,
        device_class: traits.device_class,
        browser: traits.browser,
    }
}

pub async fn run(config: &EngineConfig, report: &Path) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(report)
        .await
        .with_context(|| format!("failed to read {}", report.display()))?;
    let report: HardwareReport =
        serde_json::from_str(&raw).context("hardware report is not valid JSON")?;
    let classification = classify_report(&report, config);
    tracing::info!(
        class = classification.profile_class.as_str(),
        score = classification.score,
        "Classified hardware report"
    );
    println!("{}", serde_json::to_string_pretty(&classification)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(json: &str) -> HardwareReport {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_webgl1_short_circuits() {
        let result = classify_report(
            &report(r#"{"webglVersion": 1, "benchmarkFps": 120.0}"#),
            &EngineConfig::default(),
        );
        assert_eq!(result.profile_class, ProfileClass::Webgl1Only);
        assert_eq!(result.score, 0);
        assert_eq!(result.fps_thresholds, ProfileClass::Webgl1Only.fps_thresholds());
    }

    #[test]
    fn test_reported_memory_wins_over_estimate() {
        let result = classify_report(
            &report(
                r#"{
                    "webglVersion": 2,
                    "benchmarkFps": 60.0,
                    "memoryMb": 16384,
                    "userAgent": "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
                    "viewportWidth": 2560,
                    "screen": {"width": 2560, "height": 1440, "pixelRatio": 1.0}
                }"#,
            ),
            &EngineConfig::default(),
        );
        assert_eq!(result.memory_mb, 16384);
        assert!(!result.is_mobile);
        assert_eq!(result.initial_lod, result.profile_class.initial_lod().as_str());
    }

    #[test]
    fn test_threshold_override_applies() {
        let mut config = EngineConfig::default();
        let custom = FpsThresholds::new(70.0, 50.0, 30.0, 15.0);
        config.lod_thresholds.insert(ProfileClass::VeryLowEnd, custom);

        let result = classify_report(
            &report(r#"{"webglVersion": 0, "benchmarkFps": 0.0}"#),
            &config,
        );
        assert_eq!(result.profile_class, ProfileClass::VeryLowEnd);
        assert_eq!(result.fps_thresholds, custom);
    }
}
