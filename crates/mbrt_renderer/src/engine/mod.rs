//! CPU acceleration-structure engine.
//!
//! Geometries are built from triangle buffers or from custom primitive
//! boxes, scenes from instances of those geometries with keyframed rigid
//! transforms. Traversal hands custom primitives and hit filtering to the
//! callbacks registered in a [`FuncTable`], keyed by geometry type and ray
//! type.

mod func_table;
mod geometry;
mod scene;

pub use func_table::{FuncTable, HitCallbacks};
pub use geometry::{build_geometry, Geometry, GeometryBuildInput, TriangleMeshInput};
pub use scene::{build_scene, SceneBuildInput, TraceOptions, TraversableScene};

pub use crate::bvh::BuildQuality;

/// Geometry type of engine-intersected triangle meshes.
pub const TRIANGLE_MESH: u32 = 0;
/// Geometry type of meshes with baked deformation steps, built from
/// swept boxes and intersected by callbacks.
pub const DEFORMED_MESH: u32 = 1;
/// Number of geometry types a function table needs rows for.
pub const GEOMETRY_TYPE_COUNT: u32 = 2;

/// Ray mask matching every instance.
pub const FULL_RAY_MASK: u32 = !0;
