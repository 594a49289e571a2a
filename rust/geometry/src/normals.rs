// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Smooth vertex normals from triangle connectivity.

use crate::mesh::Mesh;
use nalgebra::{Point3, Vector3};

/// Below this many triangles the face pass runs sequentially
#[cfg(not(target_arch = "wasm32"))]
const PARALLEL_THRESHOLD: usize = 16_384;

#[inline]
fn point(positions: &[f32], i: usize) -> Point3<f64> {
    Point3::new(
        positions[i * 3] as f64,
        positions[i * 3 + 1] as f64,
        positions[i * 3 + 2] as f64,
    )
}

/// Area-weighted face normal (unnormalized cross product)
#[inline]
fn face_normal(positions: &[f32], tri: &[u32]) -> Vector3<f64> {
    let v0 = point(positions, tri[0] as usize);
    let v1 = point(positions, tri[1] as usize);
    let v2 = point(positions, tri[2] as usize);
    (v1 - v0).cross(&(v2 - v0))
}

/// Recompute `mesh.normals` from positions and indices.
///
/// Face normals are accumulated per vertex weighted by triangle area and then
/// normalized. Vertices with no usable faces get `(0, 0, 1)`.
pub fn calculate_normals(mesh: &mut Mesh) {
    let vertex_count = mesh.vertex_count();
    if vertex_count == 0 {
        mesh.normals.clear();
        return;
    }

    // Face pass: independent per triangle
    let positions = &mesh.positions;
    let face_normals: Vec<Vector3<f64>> = {
        #[cfg(not(target_arch = "wasm32"))]
        {
            use rayon::prelude::*;
            if mesh.indices.len() / 3 >= PARALLEL_THRESHOLD {
                mesh.indices
                    .par_chunks_exact(3)
                    .map(|tri| face_normal(positions, tri))
                    .collect()
            } else {
                mesh.indices
                    .chunks_exact(3)
                    .map(|tri| face_normal(positions, tri))
                    .collect()
            }
        }
        #[cfg(target_arch = "wasm32")]
        {
            mesh.indices
                .chunks_exact(3)
                .map(|tri| face_normal(positions, tri))
                .collect()
        }
    };

    // Accumulate face normals
    let mut accumulated = vec![Vector3::<f64>::zeros(); vertex_count];
    for (tri, normal) in mesh.indices.chunks_exact(3).zip(&face_normals) {
        for &i in tri {
            accumulated[i as usize] += normal;
        }
    }

    mesh.normals.clear();
    mesh.normals.reserve(vertex_count * 3);
    for n in accumulated {
        let unit = n.try_normalize(1e-12).unwrap_or_else(Vector3::z);
        mesh.normals.push(unit.x as f32);
        mesh.normals.push(unit.y as f32);
        mesh.normals.push(unit.z as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_flat_quad_normals_point_up() {
        let mut mesh = Mesh {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            normals: Vec::new(),
            indices: vec![0, 1, 2, 0, 2, 3],
        };
        calculate_normals(&mut mesh);
        assert_eq!(mesh.normals.len(), 12);
        for n in mesh.normals.chunks_exact(3) {
            assert_relative_eq!(n[0], 0.0);
            assert_relative_eq!(n[1], 0.0);
            assert_relative_eq!(n[2], 1.0);
        }
    }

    #[test]
    fn test_shared_edge_normals_are_averaged() {
        // Two faces folded 90 degrees along the x axis
        let mut mesh = Mesh {
            positions: vec![
                0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, //
                0.0, 0.0, 1.0, //
            ],
            normals: Vec::new(),
            indices: vec![0, 1, 2, 0, 3, 1],
        };
        calculate_normals(&mut mesh);
        let n0 = &mesh.normals[0..3];
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert_relative_eq!(n0[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(n0[1], expected, epsilon = 1e-6);
        assert_relative_eq!(n0[2], expected, epsilon = 1e-6);
    }

    #[test]
    fn test_degenerate_triangle_gets_fallback_normal() {
        let mut mesh = Mesh {
            positions: vec![0.0; 9],
            normals: Vec::new(),
            indices: vec![0, 1, 2],
        };
        calculate_normals(&mut mesh);
        assert_eq!(mesh.normals, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
    }
}
