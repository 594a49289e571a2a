// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decode-to-ladder scenarios across the core and geometry crates.

use printview_core::{decode, ModelFormat};
use printview_geometry::{
    build_lod_set, uv_sphere, LodConfig, LodLevel, Mesh, SimplifyStrategy,
};

/// Serialize a mesh as binary STL triangle soup
fn to_binary_stl(mesh: &Mesh) -> Vec<u8> {
    let mut out = vec![0u8; 80];
    out.extend_from_slice(&(mesh.triangle_count() as u32).to_le_bytes());
    for tri in mesh.indices.chunks_exact(3) {
        out.extend_from_slice(&[0u8; 12]);
        for &i in tri {
            let base = i as usize * 3;
            for c in &mesh.positions[base..base + 3] {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        out.extend_from_slice(&[0u8; 2]);
    }
    out
}

fn assert_monotone(set: &printview_geometry::LodSet) {
    let levels: Vec<_> = set.iter().collect();
    for pair in levels.windows(2) {
        let (finer, coarser) = (pair[0].1, pair[1].1);
        assert!(
            coarser.triangle_count <= finer.triangle_count,
            "{} has more triangles than {}",
            pair[1].0,
            pair[0].0
        );
        assert!(coarser.vertex_count <= finer.vertex_count);
    }
}

#[test]
fn test_120k_vertex_mesh_gets_five_levels() {
    // 2 + 300 * 400 = 120_002 vertices
    let mesh = uv_sphere(400, 301);
    assert!(mesh.vertex_count() > 120_000);

    let config = LodConfig::default().with_strategy(SimplifyStrategy::Stride);
    let set = build_lod_set(&mesh, &config).unwrap();

    assert_eq!(
        set.levels(),
        vec![
            LodLevel::VeryHigh,
            LodLevel::High,
            LodLevel::Medium,
            LodLevel::Low,
            LodLevel::VeryLow,
        ]
    );
    assert_monotone(&set);

    let source = set.source().unwrap();
    assert_eq!(source.triangle_count, mesh.triangle_count());
    let very_low = set.get(LodLevel::VeryLow).unwrap();
    assert!(very_low.triangle_count <= mesh.triangle_count() / 10 + 1);
}

#[test]
fn test_5k_vertex_mesh_gets_one_level() {
    // 2 + 49 * 100 = 4_902 vertices
    let mesh = uv_sphere(100, 50);
    let set = build_lod_set(&mesh, &LodConfig::default()).unwrap();
    assert_eq!(set.levels(), vec![LodLevel::VeryHigh]);
}

#[test]
fn test_level_names_are_deterministic() {
    let mesh = uv_sphere(120, 100);
    let config = LodConfig::default();
    let first = build_lod_set(&mesh, &config).unwrap();
    let second = build_lod_set(&mesh, &config).unwrap();
    assert_eq!(first.levels(), second.levels());
    assert_monotone(&first);
}

#[test]
fn test_decoded_stl_is_source_level() {
    let sphere = uv_sphere(64, 32);
    let bytes = to_binary_stl(&sphere);

    let geometry = decode(&bytes, ModelFormat::Stl).unwrap();
    assert_eq!(geometry.vertex_count(), sphere.vertex_count());
    assert_eq!(geometry.triangle_count(), sphere.triangle_count());

    let mesh = Mesh::from(geometry);
    let set = build_lod_set(&mesh, &LodConfig::default()).unwrap();
    let source = set.source().unwrap();
    assert_eq!(source.positions, mesh.positions);
    assert_eq!(source.indices, mesh.indices);
    assert_eq!(source.normals.len(), source.positions.len());
}
