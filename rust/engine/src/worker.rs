// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Off-thread decoding and LOD generation.
//!
//! Each submitted job runs on its own blocking thread and reports back over
//! a channel. Dropping the [`WorkerHandle`] discards whatever the job
//! produces; the job itself runs to completion.

use crate::error::{LoadError, Result};
use printview_core::{decode, ModelFormat};
use printview_geometry::{
    build_lod_set_with_progress, simplify, LodConfig, LodSet, Mesh, ModelMetadata,
};
use tokio::sync::mpsc;
use tracing::debug;

/// Work accepted by the LOD worker
#[derive(Debug, Clone)]
pub enum WorkerJob {
    /// Decode a complete model file, then build its LOD ladder
    LoadModel { bytes: Vec<u8>, format: ModelFormat },
    /// Build the LOD ladder of an already decoded mesh
    BuildLods { mesh: Mesh, format: Option<ModelFormat> },
    /// Simplify a mesh to `ratio` of its triangles
    Simplify { mesh: Mesh, ratio: f64 },
}

impl WorkerJob {
    fn name(&self) -> &'static str {
        match self {
            WorkerJob::LoadModel { .. } => "loadModel",
            WorkerJob::BuildLods { .. } => "buildLods",
            WorkerJob::Simplify { .. } => "simplify",
        }
    }
}

/// Messages emitted while a job runs
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    LoadingStarted,
    /// Percent complete
    LoadingProgress(u8),
    ModelLoaded {
        lod_set: LodSet,
        metadata: ModelMetadata,
    },
    Simplified {
        mesh: Mesh,
    },
    Error(String),
}

/// Final result of a job
#[derive(Debug, Clone)]
pub enum WorkerOutput {
    Loaded {
        lod_set: LodSet,
        metadata: ModelMetadata,
    },
    Simplified(Mesh),
}

/// Receiving end of a submitted job
#[derive(Debug)]
pub struct WorkerHandle {
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl WorkerHandle {
    /// Next message, or `None` once the job has finished
    pub async fn next(&mut self) -> Option<WorkerMessage> {
        self.rx.recv().await
    }

    /// Wait for the job's result, forwarding progress to `on_progress`
    pub async fn finish_with_progress(mut self, mut on_progress: impl FnMut(u8)) -> Result<WorkerOutput> {
        while let Some(message) = self.rx.recv().await {
            match message {
                WorkerMessage::LoadingStarted => {}
                WorkerMessage::LoadingProgress(percent) => on_progress(percent),
                WorkerMessage::ModelLoaded { lod_set, metadata } => {
                    return Ok(WorkerOutput::Loaded { lod_set, metadata })
                }
                WorkerMessage::Simplified { mesh } => return Ok(WorkerOutput::Simplified(mesh)),
                WorkerMessage::Error(message) => return Err(LoadError::Worker(message)),
            }
        }
        Err(LoadError::Worker("worker exited without a result".into()))
    }

    /// Wait for the job's result
    pub async fn finish(self) -> Result<WorkerOutput> {
        self.finish_with_progress(|_| {}).await
    }
}

/// Spawns one blocking task per job
#[derive(Debug, Clone, Default)]
pub struct LodWorker {
    config: LodConfig,
}

impl LodWorker {
    pub fn new(config: LodConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    /// Start `job` on a blocking thread. Must be called within a tokio runtime.
    pub fn submit(&self, job: WorkerJob) -> WorkerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let name = job.name();
            // Send failures mean the handle was dropped; keep going quietly
            let _ = tx.send(WorkerMessage::LoadingStarted);
            let message = match run_job(job, &config, &tx) {
                Ok(message) => message,
                Err(e) => {
                    debug!(job = name, error = %e, "Worker job failed");
                    WorkerMessage::Error(e.to_string())
                }
            };
            let _ = tx.send(message);
        });
        WorkerHandle { rx }
    }
}

fn run_job(
    job: WorkerJob,
    config: &LodConfig,
    tx: &mpsc::UnboundedSender<WorkerMessage>,
) -> Result<WorkerMessage> {
    let progress = |percent: u8| {
        let _ = tx.send(WorkerMessage::LoadingProgress(percent));
    };

    match job {
        WorkerJob::LoadModel { bytes, format } => {
            let mesh = Mesh::from(decode(&bytes, format)?);
            build(&mesh, Some(format), config, progress)
        }
        WorkerJob::BuildLods { mesh, format } => build(&mesh, format, config, progress),
        WorkerJob::Simplify { mesh, ratio } => {
            let mesh = simplify(&mesh, ratio)?;
            progress(100);
            Ok(WorkerMessage::Simplified { mesh })
        }
    }
}

fn build(
    mesh: &Mesh,
    format: Option<ModelFormat>,
    config: &LodConfig,
    progress: impl FnMut(u8),
) -> Result<WorkerMessage> {
    let lod_set = build_lod_set_with_progress(mesh, config, progress)?;
    Ok(WorkerMessage::ModelLoaded {
        lod_set,
        metadata: ModelMetadata::from_mesh(mesh, format),
    })
}
