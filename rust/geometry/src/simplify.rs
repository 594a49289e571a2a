// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh decimation.
//!
//! Two strategies reduce a mesh toward a triangle budget:
//!
//! - [`EdgeCollapser`]: quadric error metric edge collapse (Garland-Heckbert).
//!   Good quality, may stall on meshes it cannot reduce without folding.
//! - [`stride_sample`]: keeps every Nth triangle. Ugly but always terminates
//!   and never fails, so it backs up the collapser and builds previews.
//!
//! Both recompute normals and drop unreferenced vertices.

use crate::error::{Error, Result};
use crate::mesh::Mesh;
use nalgebra::{Matrix3, Vector3};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A collapse run that ends above `target × STALL_TOLERANCE` triangles is
/// reported as stalled
const STALL_TOLERANCE: f64 = 1.25;

/// Symmetric 4x4 quadric stored as its upper triangle:
/// `[aa, ab, ac, ad, bb, bc, bd, cc, cd, dd]`
#[derive(Debug, Clone, Copy, Default)]
struct Quadric([f64; 10]);

impl Quadric {
    fn from_plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self([
            a * a,
            a * b,
            a * c,
            a * d,
            b * b,
            b * c,
            b * d,
            c * c,
            c * d,
            d * d,
        ])
    }

    #[inline]
    fn add(&self, other: &Quadric) -> Quadric {
        let mut q = self.0;
        for (lhs, rhs) in q.iter_mut().zip(other.0.iter()) {
            *lhs += rhs;
        }
        Quadric(q)
    }

    #[inline]
    fn add_assign(&mut self, other: &Quadric) {
        *self = self.add(other);
    }

    /// Squared distance error `vᵀ Q v` at `p`
    #[inline]
    fn error(&self, p: &Vector3<f64>) -> f64 {
        let q = &self.0;
        let (x, y, z) = (p.x, p.y, p.z);
        q[0] * x * x
            + 2.0 * q[1] * x * y
            + 2.0 * q[2] * x * z
            + 2.0 * q[3] * x
            + q[4] * y * y
            + 2.0 * q[5] * y * z
            + 2.0 * q[6] * y
            + q[7] * z * z
            + 2.0 * q[8] * z
            + q[9]
    }

    /// Position minimizing the error, if the system is well conditioned
    fn optimum(&self) -> Option<Vector3<f64>> {
        let q = &self.0;
        let a = Matrix3::new(q[0], q[1], q[2], q[1], q[4], q[5], q[2], q[5], q[7]);
        if a.determinant().abs() < 1e-12 {
            return None;
        }
        let inverse = a.try_inverse()?;
        let p = inverse * Vector3::new(-q[3], -q[6], -q[8]);
        p.iter().all(|c| c.is_finite()).then_some(p)
    }
}

/// Candidate edge collapse; `keep` survives at `target`, `drop` is removed
#[derive(Debug, Clone)]
struct Candidate {
    cost: f64,
    keep: u32,
    drop: u32,
    keep_version: u32,
    drop_version: u32,
    target: Vector3<f64>,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (lowest cost first), ties broken by
        // vertex ids so runs are deterministic
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.keep.cmp(&self.keep))
            .then_with(|| other.drop.cmp(&self.drop))
    }
}

/// Quadric error metric edge collapse decimator.
///
/// Adjacency is kept per vertex so each collapse only touches the triangles
/// around the edge. Heap entries carry vertex version stamps and are skipped
/// once either endpoint has changed.
pub struct EdgeCollapser {
    positions: Vec<Vector3<f64>>,
    quadrics: Vec<Quadric>,
    boundary: Vec<bool>,
    removed: Vec<bool>,
    version: Vec<u32>,
    triangles: Vec<[u32; 3]>,
    alive: Vec<bool>,
    vertex_tris: Vec<SmallVec<[u32; 8]>>,
    live_triangles: usize,
    boundary_penalty: f64,
}

impl EdgeCollapser {
    /// Weight applied (times the squared bounding diagonal) to collapses
    /// touching an open boundary
    pub const BOUNDARY_WEIGHT: f64 = 0.5;

    pub fn new(mesh: &Mesh) -> Self {
        let vertex_count = mesh.vertex_count();
        let positions: Vec<Vector3<f64>> = mesh
            .positions
            .chunks_exact(3)
            .map(|p| Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64))
            .collect();

        let mut triangles = Vec::with_capacity(mesh.triangle_count());
        let mut alive = Vec::with_capacity(mesh.triangle_count());
        let mut vertex_tris: Vec<SmallVec<[u32; 8]>> = vec![SmallVec::new(); vertex_count];
        let mut live_triangles = 0;

        for tri in mesh.indices.chunks_exact(3) {
            let t = [tri[0], tri[1], tri[2]];
            let degenerate = t[0] == t[1] || t[1] == t[2] || t[2] == t[0];
            let id = triangles.len() as u32;
            triangles.push(t);
            alive.push(!degenerate);
            if !degenerate {
                live_triangles += 1;
                for &v in &t {
                    vertex_tris[v as usize].push(id);
                }
            }
        }

        let diagonal = mesh.bounds().diagonal().max(1e-3) as f64;

        let mut collapser = Self {
            positions,
            quadrics: vec![Quadric::default(); vertex_count],
            boundary: vec![false; vertex_count],
            removed: vec![false; vertex_count],
            version: vec![0; vertex_count],
            triangles,
            alive,
            vertex_tris,
            live_triangles,
            boundary_penalty: Self::BOUNDARY_WEIGHT * diagonal * diagonal,
        };
        collapser.mark_boundaries();
        collapser.accumulate_quadrics();
        collapser
    }

    /// Triangles currently alive
    pub fn triangle_count(&self) -> usize {
        self.live_triangles
    }

    fn mark_boundaries(&mut self) {
        let mut edge_count: FxHashMap<(u32, u32), u32> = FxHashMap::default();
        for (tri, _) in self.triangles.iter().zip(&self.alive).filter(|(_, a)| **a) {
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                *edge_count.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        for ((a, b), count) in edge_count {
            if count == 1 {
                self.boundary[a as usize] = true;
                self.boundary[b as usize] = true;
            }
        }
    }

    fn accumulate_quadrics(&mut self) {
        for (tri, _) in self.triangles.iter().zip(&self.alive).filter(|(_, a)| **a) {
            let p0 = self.positions[tri[0] as usize];
            let p1 = self.positions[tri[1] as usize];
            let p2 = self.positions[tri[2] as usize];
            let Some(n) = (p1 - p0).cross(&(p2 - p0)).try_normalize(1e-12) else {
                continue;
            };
            let plane = Quadric::from_plane(n.x, n.y, n.z, -n.dot(&p0));
            for &v in tri {
                self.quadrics[v as usize].add_assign(&plane);
            }
        }
    }

    /// Distinct live neighbours of `v`
    fn neighbors(&self, v: u32) -> SmallVec<[u32; 16]> {
        let mut out: SmallVec<[u32; 16]> = SmallVec::new();
        for &t in &self.vertex_tris[v as usize] {
            if !self.alive[t as usize] {
                continue;
            }
            for &u in &self.triangles[t as usize] {
                if u != v && !out.contains(&u) {
                    out.push(u);
                }
            }
        }
        out
    }

    fn candidate(&self, a: u32, b: u32) -> Candidate {
        let (ai, bi) = (a as usize, b as usize);
        let q = self.quadrics[ai].add(&self.quadrics[bi]);
        let pa = self.positions[ai];
        let pb = self.positions[bi];

        let mid = (pa + pb) * 0.5;
        let reach = (pa - pb).norm();

        // Boundary vertices stay put when collapsing onto the interior
        let target = match (self.boundary[ai], self.boundary[bi]) {
            (true, false) => pa,
            (false, true) => pb,
            _ => q
                .optimum()
                .filter(|p| (p - mid).norm() <= reach)
                .unwrap_or_else(|| {
                    [pa, pb, mid]
                        .into_iter()
                        .min_by(|x, y| q.error(x).total_cmp(&q.error(y)))
                        .unwrap_or(mid)
                }),
        };

        let mut cost = q.error(&target).max(0.0);
        if self.boundary[ai] || self.boundary[bi] {
            cost += self.boundary_penalty;
        }

        // The endpoint that ends up farther from the target is dropped
        let (keep, drop) = if (target - pa).norm_squared() <= (target - pb).norm_squared() {
            (a, b)
        } else {
            (b, a)
        };

        Candidate {
            cost,
            keep,
            drop,
            keep_version: self.version[keep as usize],
            drop_version: self.version[drop as usize],
            target,
        }
    }

    fn is_stale(&self, c: &Candidate) -> bool {
        self.removed[c.keep as usize]
            || self.removed[c.drop as usize]
            || self.version[c.keep as usize] != c.keep_version
            || self.version[c.drop as usize] != c.drop_version
    }

    /// Link condition plus normal-flip check for collapsing `drop` into
    /// `keep` at `target`
    fn is_valid(&self, keep: u32, drop: u32, target: &Vector3<f64>) -> bool {
        let keep_ring = self.neighbors(keep);
        let drop_ring = self.neighbors(drop);
        let shared = keep_ring.iter().filter(|v| drop_ring.contains(v)).count();
        let edge_faces = self.vertex_tris[drop as usize]
            .iter()
            .filter(|&&t| self.alive[t as usize] && self.triangles[t as usize].contains(&keep))
            .count();
        if edge_faces == 0 || shared != edge_faces {
            return false;
        }

        for &v in &[keep, drop] {
            for &t in &self.vertex_tris[v as usize] {
                let tri = &self.triangles[t as usize];
                if !self.alive[t as usize] || (tri.contains(&keep) && tri.contains(&drop)) {
                    continue;
                }
                let p = |u: u32| -> Vector3<f64> {
                    if u == keep || u == drop {
                        *target
                    } else {
                        self.positions[u as usize]
                    }
                };
                let before = (self.positions[tri[1] as usize] - self.positions[tri[0] as usize])
                    .cross(&(self.positions[tri[2] as usize] - self.positions[tri[0] as usize]));
                let after = (p(tri[1]) - p(tri[0])).cross(&(p(tri[2]) - p(tri[0])));
                if after.norm_squared() < 1e-24 || before.dot(&after) <= 0.0 {
                    return false;
                }
            }
        }
        true
    }

    fn collapse(&mut self, keep: u32, drop: u32, target: Vector3<f64>) {
        let (ki, di) = (keep as usize, drop as usize);
        self.positions[ki] = target;
        let dropped = self.quadrics[di];
        self.quadrics[ki].add_assign(&dropped);
        self.boundary[ki] |= self.boundary[di];
        self.removed[di] = true;
        self.version[ki] += 1;
        self.version[di] += 1;

        let moved = std::mem::take(&mut self.vertex_tris[di]);
        for t in moved {
            let ti = t as usize;
            if !self.alive[ti] {
                continue;
            }
            if self.triangles[ti].contains(&keep) {
                self.alive[ti] = false;
                self.live_triangles -= 1;
            } else {
                for v in self.triangles[ti].iter_mut() {
                    if *v == drop {
                        *v = keep;
                    }
                }
                self.vertex_tris[ki].push(t);
            }
        }
        let alive = &self.alive;
        self.vertex_tris[ki].retain(|t| alive[*t as usize]);
    }

    /// Collapse edges until at most `target_triangles` remain or no valid
    /// collapse is left.
    pub fn run(&mut self, target_triangles: usize) {
        if self.live_triangles <= target_triangles {
            return;
        }

        let mut heap = BinaryHeap::new();
        let mut seen: FxHashSet<(u32, u32)> = FxHashSet::default();
        for (tri, _) in self.triangles.iter().zip(&self.alive).filter(|(_, a)| **a) {
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                if seen.insert((a.min(b), a.max(b))) {
                    heap.push(self.candidate(a.min(b), a.max(b)));
                }
            }
        }

        while self.live_triangles > target_triangles {
            let Some(c) = heap.pop() else {
                break;
            };
            if self.is_stale(&c) || !self.is_valid(c.keep, c.drop, &c.target) {
                continue;
            }
            self.collapse(c.keep, c.drop, c.target);
            for n in self.neighbors(c.keep) {
                heap.push(self.candidate(c.keep, n));
            }
        }
    }

    /// Current state as a compacted mesh with fresh normals
    pub fn to_mesh(&self) -> Mesh {
        let source = Mesh {
            positions: self
                .positions
                .iter()
                .flat_map(|p| [p.x as f32, p.y as f32, p.z as f32])
                .collect(),
            normals: Vec::new(),
            indices: Vec::new(),
        };
        Mesh::from_triangles(
            &source,
            self.triangles
                .iter()
                .zip(&self.alive)
                .filter(|(_, a)| **a)
                .map(|(t, _)| &t[..]),
        )
    }
}

/// Triangle target for `ratio` of `triangles`, never below one
#[inline]
pub fn target_for_ratio(triangles: usize, ratio: f64) -> usize {
    ((triangles as f64 * ratio).round() as usize).max(1)
}

fn check_ratio(ratio: f64) -> Result<()> {
    if ratio.is_finite() && ratio > 0.0 && ratio <= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidRatio(ratio))
    }
}

/// Edge-collapse `mesh` down to about `target_triangles`.
///
/// Fails with [`Error::SimplificationStalled`] when the collapser cannot get
/// within tolerance of the target.
pub fn simplify_to(mesh: &Mesh, target_triangles: usize) -> Result<Mesh> {
    if mesh.is_empty() {
        return Err(Error::EmptyMesh("nothing to simplify".into()));
    }
    let target = target_triangles.max(1);
    if mesh.triangle_count() <= target {
        return Ok(mesh.compact());
    }

    let mut collapser = EdgeCollapser::new(mesh);
    collapser.run(target);

    let reached = collapser.triangle_count();
    if reached == 0 || reached as f64 > target as f64 * STALL_TOLERANCE {
        return Err(Error::SimplificationStalled { reached, target });
    }
    Ok(collapser.to_mesh())
}

/// Edge-collapse `mesh` to `ratio` of its triangles
pub fn simplify(mesh: &Mesh, ratio: f64) -> Result<Mesh> {
    check_ratio(ratio)?;
    simplify_to(mesh, target_for_ratio(mesh.triangle_count(), ratio))
}

/// Keep every Nth triangle, `N = round(1 / ratio)`.
///
/// Never fails: a non-empty input always keeps at least its first triangle.
pub fn stride_sample(mesh: &Mesh, ratio: f64) -> Mesh {
    let stride = if ratio.is_finite() && ratio > 0.0 {
        ((1.0 / ratio).round() as usize).max(1)
    } else {
        usize::MAX
    };
    Mesh::from_triangles(mesh, mesh.indices.chunks_exact(3).step_by(stride))
}

/// Evenly pick at most `max_triangles` triangles, for coarse previews
pub fn sample_to_budget(mesh: &Mesh, max_triangles: usize) -> Mesh {
    let total = mesh.triangle_count();
    if total <= max_triangles {
        return mesh.compact();
    }
    let max_triangles = max_triangles.max(1);
    let step = total as f64 / max_triangles as f64;
    Mesh::from_triangles(
        mesh,
        (0..max_triangles).map(|i| {
            let t = ((i as f64 * step) as usize).min(total - 1);
            &mesh.indices[t * 3..t * 3 + 3]
        }),
    )
}
