// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Level-of-detail ladders.
//!
//! A [`LodSet`] always holds the source mesh as [`LodLevel::VeryHigh`].
//! Coarser levels are added only when the source is complex enough to make
//! them worthwhile; each is simplified from the previous level, so triangle
//! and vertex counts never increase down the ladder.

use crate::error::{Error, Result};
use crate::mesh::{Bounds, Mesh};
use crate::simplify::{simplify_to, stride_sample, target_for_ratio};
use printview_core::ModelFormat;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Detail level, ordered finest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum LodLevel {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
    Minimal,
}

impl LodLevel {
    pub const ALL: [LodLevel; 6] = [
        LodLevel::VeryHigh,
        LodLevel::High,
        LodLevel::Medium,
        LodLevel::Low,
        LodLevel::VeryLow,
        LodLevel::Minimal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LodLevel::VeryHigh => "veryHigh",
            LodLevel::High => "high",
            LodLevel::Medium => "medium",
            LodLevel::Low => "low",
            LodLevel::VeryLow => "veryLow",
            LodLevel::Minimal => "minimal",
        }
    }

    /// Next coarser level, if any
    pub fn coarser(&self) -> Option<LodLevel> {
        let idx = *self as usize;
        LodLevel::ALL.get(idx + 1).copied()
    }
}

impl fmt::Display for LodLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LodLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        LodLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown LOD level '{}'", s))
    }
}

/// How coarser levels are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum SimplifyStrategy {
    /// Quadric edge collapse, falling back to stride sampling
    #[default]
    EdgeCollapse,
    /// Stride sampling only
    Stride,
}

/// How a level's geometry was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum SimplifyMethod {
    Source,
    EdgeCollapse,
    Stride,
    /// Simplification failed; the previous level was reused
    Unsimplified,
}

/// One rung of the ladder: `level` is built at `ratio` of the source
/// triangles once the source has more than `min_source_vertices` vertices
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct LodRung {
    pub level: LodLevel,
    pub min_source_vertices: usize,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct LodConfig {
    /// Rungs below `VeryHigh`, finest first
    pub rungs: Vec<LodRung>,
    pub strategy: SimplifyStrategy,
}

impl Default for LodConfig {
    fn default() -> Self {
        let rung = |level, min_source_vertices, ratio| LodRung {
            level,
            min_source_vertices,
            ratio,
        };
        Self {
            rungs: vec![
                rung(LodLevel::High, 10_000, 0.75),
                rung(LodLevel::Medium, 20_000, 0.5),
                rung(LodLevel::Low, 50_000, 0.25),
                rung(LodLevel::VeryLow, 100_000, 0.1),
                rung(LodLevel::Minimal, 500_000, 0.05),
            ],
            strategy: SimplifyStrategy::EdgeCollapse,
        }
    }
}

impl LodConfig {
    pub fn with_strategy(mut self, strategy: SimplifyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Levels that would be built for a source with `vertex_count` vertices
    pub fn planned_levels(&self, vertex_count: usize) -> Vec<LodLevel> {
        std::iter::once(LodLevel::VeryHigh)
            .chain(
                self.rungs
                    .iter()
                    .filter(|r| vertex_count > r.min_source_vertices)
                    .map(|r| r.level),
            )
            .collect()
    }
}

/// Mesh payload of a single level
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct LodMesh {
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u32>,
    pub method: SimplifyMethod,
}

impl LodMesh {
    fn new(mesh: Mesh, method: SimplifyMethod) -> Self {
        Self {
            vertex_count: mesh.vertex_count(),
            triangle_count: mesh.triangle_count(),
            positions: mesh.positions,
            normals: mesh.normals,
            indices: mesh.indices,
            method,
        }
    }

    pub fn to_mesh(&self) -> Mesh {
        Mesh {
            positions: self.positions.clone(),
            normals: self.normals.clone(),
            indices: self.indices.clone(),
        }
    }

    /// Approximate in-memory size of the buffers
    pub fn byte_size(&self) -> usize {
        (self.positions.len() + self.normals.len()) * 4 + self.indices.len() * 4
    }
}

/// Ladder of simplified meshes keyed by level
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LodSet {
    levels: BTreeMap<LodLevel, LodMesh>,
}

impl LodSet {
    pub fn get(&self, level: LodLevel) -> Option<&LodMesh> {
        self.levels.get(&level)
    }

    pub fn contains(&self, level: LodLevel) -> bool {
        self.levels.contains_key(&level)
    }

    /// Level names present, finest first
    pub fn levels(&self) -> Vec<LodLevel> {
        self.levels.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LodLevel, &LodMesh)> {
        self.levels.iter().map(|(level, mesh)| (*level, mesh))
    }

    /// The unsimplified source mesh
    pub fn source(&self) -> Option<&LodMesh> {
        self.get(LodLevel::VeryHigh)
    }

    /// Best available level for a request: the requested level, else the
    /// nearest coarser one, else the nearest finer one
    pub fn resolve(&self, requested: LodLevel) -> Option<(LodLevel, &LodMesh)> {
        self.levels
            .range(requested..)
            .next()
            .or_else(|| self.levels.range(..requested).next_back())
            .map(|(level, mesh)| (*level, mesh))
    }

    pub fn insert(&mut self, level: LodLevel, mesh: LodMesh) {
        self.levels.insert(level, mesh);
    }

    /// Total buffer size across levels
    pub fn byte_size(&self) -> usize {
        self.levels.values().map(LodMesh::byte_size).sum()
    }
}

/// Facts about the decoded source mesh
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ModelMetadata {
    pub format: Option<ModelFormat>,
    pub bounds: Bounds,
    pub vertex_count: usize,
    pub triangle_count: usize,
}

impl ModelMetadata {
    pub fn from_mesh(mesh: &Mesh, format: Option<ModelFormat>) -> Self {
        Self {
            format,
            bounds: mesh.bounds(),
            vertex_count: mesh.vertex_count(),
            triangle_count: mesh.triangle_count(),
        }
    }
}

/// Produce one level from the previous one
fn build_level(previous: &Mesh, target: usize, strategy: SimplifyStrategy) -> (Mesh, SimplifyMethod) {
    if previous.triangle_count() <= target {
        return (previous.clone(), SimplifyMethod::Unsimplified);
    }

    if strategy == SimplifyStrategy::EdgeCollapse {
        if let Ok(mesh) = simplify_to(previous, target) {
            return (mesh, SimplifyMethod::EdgeCollapse);
        }
    }

    let ratio = target as f64 / previous.triangle_count() as f64;
    let sampled = stride_sample(previous, ratio);
    if sampled.is_empty() {
        (previous.clone(), SimplifyMethod::Unsimplified)
    } else {
        (sampled, SimplifyMethod::Stride)
    }
}

/// Build the LOD ladder for `mesh`
pub fn build_lod_set(mesh: &Mesh, config: &LodConfig) -> Result<LodSet> {
    build_lod_set_with_progress(mesh, config, |_| {})
}

/// Build the LOD ladder, reporting percent complete after each level
pub fn build_lod_set_with_progress(
    mesh: &Mesh,
    config: &LodConfig,
    mut progress: impl FnMut(u8),
) -> Result<LodSet> {
    if mesh.is_empty() {
        return Err(Error::EmptyMesh("cannot build levels of detail".into()));
    }

    let source_vertices = mesh.vertex_count();
    let source_triangles = mesh.triangle_count();
    let rungs: Vec<&LodRung> = config
        .rungs
        .iter()
        .filter(|r| source_vertices > r.min_source_vertices)
        .collect();
    let steps = rungs.len() + 1;

    let mut set = LodSet::default();
    set.insert(LodLevel::VeryHigh, LodMesh::new(mesh.clone(), SimplifyMethod::Source));
    progress((100 / steps) as u8);

    let mut previous = mesh.clone();
    for (i, rung) in rungs.into_iter().enumerate() {
        let target = target_for_ratio(source_triangles, rung.ratio.clamp(0.0, 1.0));
        let (level_mesh, method) = build_level(&previous, target, config.strategy);
        set.insert(rung.level, LodMesh::new(level_mesh.clone(), method));
        previous = level_mesh;
        progress(((i + 2) * 100 / steps) as u8);
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{plane_grid, uv_sphere};

    #[test]
    fn test_level_names_round_trip() {
        for level in LodLevel::ALL {
            assert_eq!(level.as_str().parse::<LodLevel>().unwrap(), level);
        }
        assert_eq!(" VERYLOW ".parse::<LodLevel>().unwrap(), LodLevel::VeryLow);
        assert!("ultra".parse::<LodLevel>().is_err());
        assert_eq!(LodLevel::Low.coarser(), Some(LodLevel::VeryLow));
        assert_eq!(LodLevel::Minimal.coarser(), None);
    }

    #[test]
    fn test_planned_levels() {
        let config = LodConfig::default();
        assert_eq!(config.planned_levels(5_000), vec![LodLevel::VeryHigh]);
        assert_eq!(config.planned_levels(10_000), vec![LodLevel::VeryHigh]);
        assert_eq!(
            config.planned_levels(25_000),
            vec![LodLevel::VeryHigh, LodLevel::High, LodLevel::Medium]
        );
        assert_eq!(config.planned_levels(120_000).len(), 5);
        assert_eq!(config.planned_levels(600_000).len(), 6);
    }

    #[test]
    fn test_small_mesh_only_source_level() {
        let mesh = plane_grid(40, 40);
        let set = build_lod_set(&mesh, &LodConfig::default()).unwrap();
        assert_eq!(set.levels(), vec![LodLevel::VeryHigh]);
        let source = set.source().unwrap();
        assert_eq!(source.positions, mesh.positions);
        assert_eq!(source.method, SimplifyMethod::Source);
    }

    #[test]
    fn test_edge_collapse_ladder_is_monotone() {
        // 2 + 159 * 160 = 25_442 vertices
        let mesh = uv_sphere(160, 160);
        let mut reported = Vec::new();
        let set = build_lod_set_with_progress(&mesh, &LodConfig::default(), |p| reported.push(p))
            .unwrap();

        assert_eq!(
            set.levels(),
            vec![LodLevel::VeryHigh, LodLevel::High, LodLevel::Medium]
        );
        let counts: Vec<(usize, usize)> = set
            .iter()
            .map(|(_, m)| (m.vertex_count, m.triangle_count))
            .collect();
        for pair in counts.windows(2) {
            assert!(pair[1].0 <= pair[0].0);
            assert!(pair[1].1 <= pair[0].1);
        }
        assert_eq!(reported, vec![33, 66, 100]);
    }

    #[test]
    fn test_empty_mesh_is_rejected() {
        assert!(matches!(
            build_lod_set(&Mesh::new(), &LodConfig::default()),
            Err(Error::EmptyMesh(_))
        ));
    }

    #[test]
    fn test_resolve_prefers_coarser() {
        let mesh = plane_grid(10, 10);
        let config = LodConfig {
            rungs: vec![
                LodRung { level: LodLevel::Medium, min_source_vertices: 0, ratio: 0.5 },
                LodRung { level: LodLevel::VeryLow, min_source_vertices: 0, ratio: 0.1 },
            ],
            strategy: SimplifyStrategy::Stride,
        };
        let set = build_lod_set(&mesh, &config).unwrap();
        assert_eq!(set.resolve(LodLevel::High).unwrap().0, LodLevel::Medium);
        assert_eq!(set.resolve(LodLevel::Low).unwrap().0, LodLevel::VeryLow);
        assert_eq!(set.resolve(LodLevel::Minimal).unwrap().0, LodLevel::VeryLow);
        assert_eq!(set.resolve(LodLevel::VeryHigh).unwrap().0, LodLevel::VeryHigh);
        assert_eq!(set.get(LodLevel::Medium).unwrap().method, SimplifyMethod::Stride);
    }

    #[test]
    fn test_metadata() {
        let mesh = plane_grid(4, 2);
        let meta = ModelMetadata::from_mesh(&mesh, Some(ModelFormat::Obj));
        assert_eq!(meta.vertex_count, 15);
        assert_eq!(meta.triangle_count, 16);
        assert_eq!(meta.bounds.max, [1.0, 1.0, 0.0]);
    }
}
