//! mbrt renderer - CPU motion-blur ray tracing
//!
//! Builds per-mesh geometry and an instanced scene whose instances move
//! along keyframed transforms, traces rays at a per-ray shutter time, and
//! shades the results with a family of small test integrators.
//!
//! Deforming meshes are handled through user callbacks registered in a
//! [`engine::FuncTable`], so one time value drives both rigid motion and
//! vertex deformation.

mod bvh;
mod camera;
mod case;
mod deform;
mod error;
mod hit;
mod integrator;
mod renderer;
mod sampling;
mod triangle;

pub mod engine;

pub use bvh::{BuildQuality, TRAVERSAL_STACK_SIZE};
pub use camera::Camera;
pub use case::{
    preset, render_case_image, run_render_case, DeformationConfig, InstanceLayout, IntegratorConfig, MeshSource,
    RenderCaseConfig, PRESET_NAMES,
};
pub use deform::{frame_pair, interpolated_triangle, AnyHitPolicy, DeformedMeshCallbacks, MAX_SAMPLE_TIME};
pub use error::{RenderError, Result};
pub use hit::Hit;
pub use integrator::{
    instance_color, AmbientOcclusion, AoMotionBlur, CameraMask, DeformationShading, GeometryMask, HitDistance,
    Integrator, MotionBlur, Pixel, ShadingContext, TimeSampling, INSTANCE_PALETTE,
};
pub use renderer::{ImageBuffer, RenderContext, RenderStats, DEFAULT_MAX_PIXELS};
pub use sampling::{color_to_rgba, gamma_correct, gen_f32, pixel_seed, sample_hemisphere_cosine, tea, Lcg};
pub use triangle::{intersect_triangle, TriangleHit};

/// Re-export Vec3 and common math types from mbrt_math
pub use mbrt_math::{Aabb, Interval, Quat, Ray, Vec3};
