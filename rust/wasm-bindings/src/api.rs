// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Worker entry points.
//!
//! Each call runs to completion synchronously; the hosting web worker posts
//! `loadingStarted`, `loadingProgress` and `modelLoaded` / `error` messages
//! around them.

use crate::mesh::{LodSetJs, MeshJs};
use crate::utils::js_error;
use js_sys::Function;
use printview_core::{decode, decode_partial, ModelFormat};
use printview_geometry::{
    build_lod_set_with_progress, sample_to_budget, simplify, stride_sample, LodConfig, Mesh,
    ModelMetadata,
};
use wasm_bindgen::prelude::*;

const DEFAULT_PREVIEW_TRIANGLES: usize = 500;

fn parse_format(file_type: &str) -> Result<ModelFormat, JsValue> {
    file_type
        .parse::<ModelFormat>()
        .map_err(|e| js_error("Unsupported file type", e))
}

fn build(mesh: &Mesh, format: Option<ModelFormat>, on_progress: Option<Function>) -> Result<LodSetJs, JsValue> {
    let report = |percent: u8| {
        if let Some(callback) = &on_progress {
            // A throwing progress callback must not abort the build
            let _ = callback.call1(&JsValue::NULL, &JsValue::from(percent));
        }
    };
    let set = build_lod_set_with_progress(mesh, &LodConfig::default(), report)
        .map_err(|e| js_error("LOD generation failed", e))?;
    Ok(LodSetJs::new(set, ModelMetadata::from_mesh(mesh, format)))
}

/// Decode a complete model file and build its LOD ladder.
///
/// `onProgress` receives the percent complete after each level.
#[wasm_bindgen(js_name = loadModel)]
pub fn load_model(
    bytes: &[u8],
    file_type: &str,
    on_progress: Option<Function>,
) -> Result<LodSetJs, JsValue> {
    let format = parse_format(file_type)?;
    let geometry = decode(bytes, format).map_err(|e| js_error("Failed to decode model", e))?;
    build(&Mesh::from(geometry), Some(format), on_progress)
}

/// Build the LOD ladder of an already decoded mesh
#[wasm_bindgen(js_name = buildLods)]
pub fn build_lods(
    positions: Vec<f32>,
    indices: Vec<u32>,
    on_progress: Option<Function>,
) -> Result<LodSetJs, JsValue> {
    let mesh = Mesh::from_buffers(positions, indices).map_err(|e| js_error("Invalid mesh", e))?;
    build(&mesh, None, on_progress)
}

/// Reduce a mesh to `ratio` of its triangles.
///
/// Falls back to keeping every Nth triangle when edge collapse cannot reach
/// the target.
#[wasm_bindgen(js_name = simplifyGeometry)]
pub fn simplify_geometry(positions: Vec<f32>, indices: Vec<u32>, ratio: f64) -> Result<MeshJs, JsValue> {
    let mesh = Mesh::from_buffers(positions, indices).map_err(|e| js_error("Invalid mesh", e))?;
    Ok(MeshJs::from(simplify_or_sample(&mesh, ratio)))
}

fn simplify_or_sample(mesh: &Mesh, ratio: f64) -> Mesh {
    match simplify(mesh, ratio) {
        Ok(simplified) => simplified,
        Err(_) => stride_sample(mesh, ratio),
    }
}

/// Decode the complete primitives in a partially downloaded file and thin
/// them to a preview budget (500 triangles by default)
#[wasm_bindgen(js_name = decodePreview)]
pub fn decode_preview(
    bytes: &[u8],
    file_type: &str,
    max_triangles: Option<usize>,
) -> Result<MeshJs, JsValue> {
    let format = parse_format(file_type)?;
    let geometry =
        decode_partial(bytes, format).map_err(|e| js_error("Failed to decode preview", e))?;
    let budget = max_triangles.unwrap_or(DEFAULT_PREVIEW_TRIANGLES);
    Ok(MeshJs::from(sample_to_budget(&Mesh::from(geometry), budget)))
}

/// Model format for a file path or URL, from its extension
#[wasm_bindgen(js_name = detectFormat)]
pub fn detect_format(path: &str) -> Option<String> {
    ModelFormat::from_path(path).map(|f| f.as_str().to_string())
}
