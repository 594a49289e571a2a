// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `load` and `fetch`.

use anyhow::{anyhow, bail, Context};
use printview_cache::{ModelType, Payload};
use printview_core::ModelFormat;
use printview_engine::{
    EngineConfig, HttpTransport, LoadError, LoadProgress, LoadedModel, LodWorker, ModelRequest,
    Preview, ProgressiveLoader, Renderer, ViewerAdapter, WorkerJob, WorkerOutput,
};
use printview_geometry::{LodConfig, LodSet, ModelMetadata, SimplifyStrategy};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use super::open_cache;

fn resolve_format(path: &str, explicit: Option<&str>) -> anyhow::Result<ModelFormat> {
    match explicit {
        Some(name) => Ok(name.parse::<ModelFormat>()?),
        None => ModelFormat::from_path(path)
            .ok_or_else(|| anyhow!("cannot tell the format of '{}', pass --format", path)),
    }
}

/// Human readable ladder, one line per level
fn summary_lines(lod_set: &LodSet, metadata: &ModelMetadata) -> Vec<String> {
    let mut lines = vec![format!(
        "{} vertices, {} triangles{}",
        metadata.vertex_count,
        metadata.triangle_count,
        metadata
            .format
            .map(|f| format!(" ({})", f.as_str()))
            .unwrap_or_default()
    )];
    for (level, mesh) in lod_set.iter() {
        lines.push(format!(
            "  {:<9} {:>9} vertices {:>9} triangles  {:?}",
            level.as_str(),
            mesh.vertex_count,
            mesh.triangle_count,
            mesh.method
        ));
    }
    lines.push(format!("  total     {} bytes", lod_set.byte_size()));
    lines
}

pub async fn load(
    config: &EngineConfig,
    file: &Path,
    format: Option<&str>,
    cache_id: Option<&str>,
    stride: bool,
) -> anyhow::Result<()> {
    let path = file.to_string_lossy();
    let format = resolve_format(&path, format)?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", path))?;
    info!(file = %path, size = bytes.len(), format = format.as_str(), "Loading model");

    let lod_config = if stride {
        LodConfig::default().with_strategy(SimplifyStrategy::Stride)
    } else {
        LodConfig::default()
    };
    let worker = LodWorker::new(lod_config);
    let output = worker
        .submit(WorkerJob::LoadModel {
            bytes: bytes.clone(),
            format,
        })
        .finish_with_progress(|percent| info!(percent, "Building levels of detail"))
        .await?;
    let WorkerOutput::Loaded { lod_set, metadata } = output else {
        bail!("worker returned no LOD ladder");
    };

    for line in summary_lines(&lod_set, &metadata) {
        println!("{}", line);
    }

    if let Some(id) = cache_id {
        let cache = open_cache(config).await;
        cache
            .add_model(id, ModelType::from(format), Payload::for_model(format, bytes))
            .await?;
        println!("cached as '{}'", id);
        cache.dispose().await;
    }
    Ok(())
}

/// Logs what a real renderer would draw
#[derive(Debug, Default)]
struct ConsoleRenderer;

impl Renderer for ConsoleRenderer {
    fn on_progress(&self, progress: LoadProgress) {
        if let Some(percent) = progress.percent {
            info!(
                loaded = progress.loaded_bytes,
                total = progress.total_bytes,
                "Downloading {:.0}%",
                percent
            );
        }
    }

    fn on_preview(&self, preview: &Preview) {
        info!(
            checkpoint = preview.checkpoint,
            triangles = preview.mesh.triangle_count(),
            source_triangles = preview.source_triangles,
            "Preview ready"
        );
    }

    fn on_model_loaded(&self, model: &LoadedModel) {
        info!(
            model = %model.model_id,
            lod = model.lod.as_str(),
            from_cache = model.from_cache,
            "Model ready"
        );
    }

    fn on_error(&self, err: &LoadError) {
        error!(error = %err, "Model failed to load");
    }
}

pub async fn fetch(
    config: &EngineConfig,
    url: &str,
    id: &str,
    format: Option<&str>,
) -> anyhow::Result<()> {
    let format = resolve_format(url, format)?;
    let cache = open_cache(config).await;
    let loader =
        ProgressiveLoader::new(Arc::new(HttpTransport::new())).with_streaming(config.streaming);
    let adapter = ViewerAdapter::new(
        cache.clone(),
        loader,
        LodWorker::default(),
        Arc::new(ConsoleRenderer),
    )
    .with_cache_version(config.cache_version.clone());

    let result = adapter
        .load_model(&ModelRequest::new(id, url, format.as_str()))
        .await;
    adapter.dispose();
    cache.dispose().await;

    match result? {
        Some(model) => {
            for line in summary_lines(&model.lod_set, &model.metadata) {
                println!("{}", line);
            }
            println!(
                "showing {}{}",
                model.lod.as_str(),
                if model.from_cache { " (from cache)" } else { "" }
            );
        }
        None => println!("load superseded"),
    }
    Ok(())
}
