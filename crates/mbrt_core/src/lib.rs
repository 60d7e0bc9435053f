//! mbrt Core - Meshes, deformation and scene description for motion-blur rendering.
//!
//! This crate provides:
//!
//! - **Meshes**: `TriangleMesh` with baked deformation steps
//! - **Mesh IO**: OBJ and STL readers plus procedural shapes
//! - **Keyframes**: rigid per-instance motion (`FrameSrt`, `TransformHeader`)
//! - **Scene description**: instances, trajectories and the geometry descriptor table
//!
//! # Example
//!
//! ```ignore
//! use mbrt_core::{procedural, SceneDescription, GeometryTable};
//!
//! let mut mesh = procedural::unit_triangle()?;
//! mesh.deform(2, mbrt_core::mesh::DEFAULT_DISPLACEMENT)?;
//! let scene = SceneDescription::one_instance_per_mesh(vec![mesh]);
//! let table = GeometryTable::build(&scene)?;
//! println!("{} instances", table.len());
//! ```

pub mod descriptor;
pub mod io;
pub mod keyframe;
pub mod mesh;
pub mod procedural;
pub mod scene;

// Re-export commonly used types
pub use descriptor::{GeometryDescriptor, GeometryTable, GeometryView};
pub use io::{load_mesh, load_obj, load_stl};
pub use keyframe::{setup_transform, FrameSrt, KeyframeBuffer, Trajectory, TransformHeader};
pub use mesh::{MeshError, MeshResult, TriangleMesh};
pub use scene::{InstanceDesc, SceneDescription, SceneError, SceneResult, Transform};
