// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fire-and-forget performance reports.

use printview_geometry::LodLevel;
use serde::Serialize;
use tokio::sync::mpsc;

/// One report per full window of frame-rate samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReport {
    /// Mean FPS over the window
    pub fps: f64,
    pub memory_usage_mb: Option<f64>,
    pub lod_level: LodLevel,
}

/// Receives reports. Must not block; failures are the sink's problem.
pub trait TelemetrySink: Send + Sync {
    fn report(&self, report: TelemetryReport);
}

/// Logs reports at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn report(&self, report: TelemetryReport) {
        tracing::debug!(
            fps = report.fps,
            memory_mb = report.memory_usage_mb,
            lod = %report.lod_level,
            "Performance sample"
        );
    }
}

/// Forwards reports to a channel; dropped silently once the receiver is gone
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TelemetryReport>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TelemetryReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TelemetrySink for ChannelSink {
    fn report(&self, report: TelemetryReport) {
        let _ = self.tx.send(report);
    }
}
