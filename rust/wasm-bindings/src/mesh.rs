// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh and LOD ladder handles returned to JavaScript.

use crate::utils::js_error;
use printview_geometry::{LodLevel, LodSet, Mesh, ModelMetadata};
use wasm_bindgen::prelude::*;

/// A triangle mesh; buffers are copied out on access
#[wasm_bindgen]
pub struct MeshJs {
    positions: Vec<f32>,
    normals: Vec<f32>,
    indices: Vec<u32>,
}

#[wasm_bindgen]
impl MeshJs {
    /// Get positions as Float32Array (copy to JS)
    #[wasm_bindgen(getter)]
    pub fn positions(&self) -> js_sys::Float32Array {
        js_sys::Float32Array::from(&self.positions[..])
    }

    /// Get normals as Float32Array (copy to JS)
    #[wasm_bindgen(getter)]
    pub fn normals(&self) -> js_sys::Float32Array {
        js_sys::Float32Array::from(&self.normals[..])
    }

    /// Get indices as Uint32Array (copy to JS)
    #[wasm_bindgen(getter)]
    pub fn indices(&self) -> js_sys::Uint32Array {
        js_sys::Uint32Array::from(&self.indices[..])
    }

    #[wasm_bindgen(getter, js_name = vertexCount)]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    #[wasm_bindgen(getter, js_name = triangleCount)]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

impl From<Mesh> for MeshJs {
    fn from(mesh: Mesh) -> Self {
        Self {
            positions: mesh.positions,
            normals: mesh.normals,
            indices: mesh.indices,
        }
    }
}

/// Levels of detail for one model plus facts about its source mesh
#[wasm_bindgen]
pub struct LodSetJs {
    set: LodSet,
    metadata: ModelMetadata,
}

impl LodSetJs {
    pub fn new(set: LodSet, metadata: ModelMetadata) -> Self {
        Self { set, metadata }
    }

    pub(crate) fn level_names(&self) -> Vec<String> {
        self.set.levels().iter().map(|l| l.as_str().to_string()).collect()
    }
}

#[wasm_bindgen]
impl LodSetJs {
    /// Level names present, finest first
    #[wasm_bindgen(getter)]
    pub fn levels(&self) -> Vec<String> {
        self.level_names()
    }

    /// Mesh for `level` (`veryHigh`, `high`, ... `minimal`), if built
    #[wasm_bindgen]
    pub fn get(&self, level: &str) -> Option<MeshJs> {
        let level = level.parse::<LodLevel>().ok()?;
        self.set.get(level).map(|m| MeshJs::from(m.to_mesh()))
    }

    /// Name of the level that would be shown for `level`: the level itself,
    /// else the nearest coarser, else the nearest finer
    #[wasm_bindgen]
    pub fn resolve(&self, level: &str) -> Option<String> {
        let level = level.parse::<LodLevel>().ok()?;
        self.set.resolve(level).map(|(l, _)| l.as_str().to_string())
    }

    /// Bounds, vertex and triangle counts and format of the source mesh
    #[wasm_bindgen(getter)]
    pub fn metadata(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.metadata).map_err(|e| js_error("metadata", e))
    }

    /// Total buffer size across levels in bytes
    #[wasm_bindgen(getter, js_name = byteSize)]
    pub fn byte_size(&self) -> usize {
        self.set.byte_size()
    }
}
