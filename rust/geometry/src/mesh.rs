// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh data structures

use crate::error::{Error, Result};
use crate::normals::calculate_normals;
use nalgebra::{Point3, Vector3};
use printview_core::ParsedGeometry;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    /// Length of the box diagonal
    #[inline]
    pub fn diagonal(&self) -> f32 {
        let dx = self.max[0] - self.min[0];
        let dy = self.max[1] - self.min[1];
        let dz = self.max[2] - self.min[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Box center
    #[inline]
    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }
}

/// Indexed triangle mesh
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mesh {
    /// Vertex positions (x, y, z)
    pub positions: Vec<f32>,
    /// Vertex normals (nx, ny, nz)
    pub normals: Vec<f32>,
    /// Triangle indices (i0, i1, i2)
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Create a mesh with capacity
    pub fn with_capacity(vertex_count: usize, index_count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertex_count * 3),
            normals: Vec::with_capacity(vertex_count * 3),
            indices: Vec::with_capacity(index_count),
        }
    }

    /// Build a mesh from raw buffers, validating indices and computing normals
    pub fn from_buffers(positions: Vec<f32>, indices: Vec<u32>) -> Result<Self> {
        let vertex_count = positions.len() / 3;
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(Error::IndexOutOfRange {
                index,
                vertex_count,
            });
        }
        let mut mesh = Self {
            positions,
            normals: Vec::new(),
            indices,
        };
        mesh.indices.truncate(mesh.indices.len() / 3 * 3);
        calculate_normals(&mut mesh);
        Ok(mesh)
    }

    /// Add a vertex with normal
    #[inline]
    pub fn add_vertex(&mut self, position: Point3<f64>, normal: Vector3<f64>) {
        self.positions.push(position.x as f32);
        self.positions.push(position.y as f32);
        self.positions.push(position.z as f32);

        self.normals.push(normal.x as f32);
        self.normals.push(normal.y as f32);
        self.normals.push(normal.z as f32);
    }

    /// Add a triangle
    #[inline]
    pub fn add_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        self.indices.push(i0);
        self.indices.push(i1);
        self.indices.push(i2);
    }

    /// Merge another mesh into this one
    #[inline]
    pub fn merge(&mut self, other: &Mesh) {
        if other.is_empty() {
            return;
        }

        let vertex_offset = (self.positions.len() / 3) as u32;

        self.positions.reserve(other.positions.len());
        self.normals.reserve(other.normals.len());
        self.indices.reserve(other.indices.len());

        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.indices
            .extend(other.indices.iter().map(|&i| i + vertex_offset));
    }

    /// Get vertex count
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Get triangle count
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check if mesh is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.is_empty()
    }

    /// Position of vertex `i`
    #[inline]
    pub fn position(&self, i: u32) -> Point3<f32> {
        let base = i as usize * 3;
        Point3::new(
            self.positions[base],
            self.positions[base + 1],
            self.positions[base + 2],
        )
    }

    /// Calculate bounds - optimized with chunk iteration
    #[inline]
    pub fn bounds(&self) -> Bounds {
        if self.positions.is_empty() {
            return Bounds::default();
        }

        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];

        self.positions.chunks_exact(3).for_each(|chunk| {
            for axis in 0..3 {
                min[axis] = min[axis].min(chunk[axis]);
                max[axis] = max[axis].max(chunk[axis]);
            }
        });

        Bounds { min, max }
    }

    /// Build a new mesh from a subset of triangles, dropping vertices that
    /// are no longer referenced. Normals are recomputed.
    pub fn from_triangles<'a>(
        source: &Mesh,
        triangles: impl IntoIterator<Item = &'a [u32]>,
    ) -> Mesh {
        let mut remap = vec![u32::MAX; source.vertex_count()];
        let mut out = Mesh::new();

        for tri in triangles {
            for &old in tri {
                let slot = &mut remap[old as usize];
                if *slot == u32::MAX {
                    *slot = (out.positions.len() / 3) as u32;
                    let base = old as usize * 3;
                    out.positions
                        .extend_from_slice(&source.positions[base..base + 3]);
                }
                out.indices.push(*slot);
            }
        }

        calculate_normals(&mut out);
        out
    }

    /// Drop unreferenced vertices, keeping triangle order
    pub fn compact(&self) -> Mesh {
        Mesh::from_triangles(self, self.indices.chunks_exact(3))
    }

    /// Clear the mesh
    #[inline]
    pub fn clear(&mut self) {
        self.positions.clear();
        self.normals.clear();
        self.indices.clear();
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ParsedGeometry> for Mesh {
    fn from(geometry: ParsedGeometry) -> Self {
        let mut mesh = Mesh {
            positions: geometry.positions,
            normals: Vec::new(),
            indices: geometry.indices,
        };
        calculate_normals(&mut mesh);
        mesh
    }
}
