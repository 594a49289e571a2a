//! PrintView Geometry Processing
//!
//! Mesh simplification and level-of-detail ladders for decoded print models,
//! using nalgebra for the quadric math.

pub mod error;
pub mod lod;
pub mod mesh;
pub mod normals;
pub mod primitives;
pub mod simplify;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};

pub use error::{Error, Result};
pub use lod::{
    build_lod_set, build_lod_set_with_progress, LodConfig, LodLevel, LodMesh, LodRung, LodSet,
    ModelMetadata, SimplifyMethod, SimplifyStrategy,
};
pub use mesh::{Bounds, Mesh};
pub use normals::calculate_normals;
pub use primitives::{box_mesh, plane_grid, uv_sphere, BENCHMARK_SEGMENTS};
pub use simplify::{sample_to_budget, simplify, simplify_to, stride_sample, EdgeCollapser};
