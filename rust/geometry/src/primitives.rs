// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Procedural meshes: the profiler's benchmark box and test surfaces.

use crate::mesh::Mesh;
use crate::normals::calculate_normals;
use std::f32::consts::PI;

/// Segments per axis of the render benchmark box
pub const BENCHMARK_SEGMENTS: u32 = 8;

/// Unit cube centred on the origin, each face subdivided into
/// `segments × segments` quads. Faces do not share vertices, so edges stay
/// hard when shaded.
pub fn box_mesh(segments: u32) -> Mesh {
    let segments = segments.max(1);
    let per_face = ((segments + 1) * (segments + 1)) as usize;
    let mut mesh = Mesh::with_capacity(per_face * 6, (segments * segments * 36) as usize);

    // (normal axis, sign, u axis, v axis) with u × v along +axis
    const FACES: [(usize, f32, usize, usize); 6] = [
        (0, 1.0, 1, 2),
        (0, -1.0, 1, 2),
        (1, 1.0, 2, 0),
        (1, -1.0, 2, 0),
        (2, 1.0, 0, 1),
        (2, -1.0, 0, 1),
    ];

    for (axis, sign, u_axis, v_axis) in FACES {
        let base = mesh.vertex_count() as u32;
        for j in 0..=segments {
            for i in 0..=segments {
                let mut p = [0.0f32; 3];
                p[axis] = 0.5 * sign;
                p[u_axis] = i as f32 / segments as f32 - 0.5;
                p[v_axis] = j as f32 / segments as f32 - 0.5;
                mesh.positions.extend_from_slice(&p);
            }
        }

        let row = segments + 1;
        for j in 0..segments {
            for i in 0..segments {
                let a = base + j * row + i;
                let b = a + 1;
                let c = a + row;
                let d = c + 1;
                // Keep every face wound outward
                if sign > 0.0 {
                    mesh.add_triangle(a, b, d);
                    mesh.add_triangle(a, d, c);
                } else {
                    mesh.add_triangle(a, d, b);
                    mesh.add_triangle(a, c, d);
                }
            }
        }
    }

    calculate_normals(&mut mesh);
    mesh
}

/// Flat grid on the XY plane spanning `[0, 1] × [0, 1]`
pub fn plane_grid(cols: u32, rows: u32) -> Mesh {
    let cols = cols.max(1);
    let rows = rows.max(1);
    let mut mesh = Mesh::with_capacity(
        ((cols + 1) * (rows + 1)) as usize,
        (cols * rows * 6) as usize,
    );

    for j in 0..=rows {
        for i in 0..=cols {
            mesh.positions.extend_from_slice(&[
                i as f32 / cols as f32,
                j as f32 / rows as f32,
                0.0,
            ]);
        }
    }

    let row = cols + 1;
    for j in 0..rows {
        for i in 0..cols {
            let a = j * row + i;
            mesh.add_triangle(a, a + 1, a + row + 1);
            mesh.add_triangle(a, a + row + 1, a + row);
        }
    }

    calculate_normals(&mut mesh);
    mesh
}

/// Closed unit sphere with shared pole vertices.
///
/// `segments` around the axis (min 3), `rings` from pole to pole (min 2).
pub fn uv_sphere(segments: u32, rings: u32) -> Mesh {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut mesh = Mesh::with_capacity(
        (2 + (rings - 1) * segments) as usize,
        (segments * (rings - 1) * 6) as usize,
    );

    mesh.positions.extend_from_slice(&[0.0, 1.0, 0.0]);
    for r in 1..rings {
        let phi = PI * r as f32 / rings as f32;
        for s in 0..segments {
            let theta = 2.0 * PI * s as f32 / segments as f32;
            mesh.positions.extend_from_slice(&[
                phi.sin() * theta.cos(),
                phi.cos(),
                phi.sin() * theta.sin(),
            ]);
        }
    }
    mesh.positions.extend_from_slice(&[0.0, -1.0, 0.0]);

    let top = 0;
    let bottom = 1 + (rings - 1) * segments;
    let ring = |r: u32, s: u32| 1 + (r - 1) * segments + s % segments;

    for s in 0..segments {
        mesh.add_triangle(top, ring(1, s + 1), ring(1, s));
    }
    for r in 1..rings - 1 {
        for s in 0..segments {
            let a = ring(r, s);
            let b = ring(r, s + 1);
            let c = ring(r + 1, s);
            let d = ring(r + 1, s + 1);
            mesh.add_triangle(a, b, c);
            mesh.add_triangle(b, d, c);
        }
    }
    for s in 0..segments {
        mesh.add_triangle(ring(rings - 1, s), ring(rings - 1, s + 1), bottom);
    }

    calculate_normals(&mut mesh);
    mesh
}
