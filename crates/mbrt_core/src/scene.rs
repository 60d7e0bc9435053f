//! Scene description: meshes, instances and how instances move.
//!
//! This is the host-side input of a render. It is turned into keyframe
//! buffers ([`SceneDescription::build_keyframes`]) and a geometry table
//! ([`crate::GeometryTable`]) before anything is traced.

use std::sync::Arc;

use mbrt_math::{Aabb, Mat4, Mat4Ext, Quat, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keyframe::{KeyframeBuffer, Trajectory};
use crate::mesh::TriangleMesh;

/// Errors raised while assembling a scene.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Scene has no instances")]
    NoInstances,

    #[error("Instance {instance} references geometry {geometry}, but the scene has {count}")]
    BadGeometry {
        instance: usize,
        geometry: usize,
        count: usize,
    },

    #[error("Instance {0} needs at least one keyframe")]
    NoMotionSteps(usize),

    #[error("Invalid keyframes: {0}")]
    BadKeyframes(String),

    #[error("Instance ids must be dense: expected {expected}, found {found}")]
    SparseInstanceId { expected: u32, found: u32 },

    #[error("Descriptor of instance {instance} does not match mesh '{mesh}'")]
    StaleDescriptor { instance: usize, mesh: String },
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;

/// Transform components that can be composed into a matrix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform with only translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Convert to a 4x4 transformation matrix.
    ///
    /// Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// One placement of a mesh, optionally moving over the shutter interval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceDesc {
    /// Index into [`SceneDescription::meshes`].
    pub geometry: usize,
    /// Transform at time 0.
    #[serde(default)]
    pub start: Transform,
    /// Number of rigid keyframes; 1 means static.
    #[serde(default = "one")]
    pub motion_steps: u32,
    #[serde(default)]
    pub trajectory: Trajectory,
}

fn one() -> u32 {
    1
}

impl InstanceDesc {
    /// An instance that never moves.
    pub fn fixed(geometry: usize, transform: Transform) -> Self {
        Self {
            geometry,
            start: transform,
            motion_steps: 1,
            trajectory: Trajectory::default(),
        }
    }

    /// An instance with `motion_steps` keyframes along `trajectory`.
    pub fn moving(geometry: usize, start: Transform, motion_steps: u32, trajectory: Trajectory) -> Self {
        Self {
            geometry,
            start,
            motion_steps,
            trajectory,
        }
    }
}

/// Meshes plus the instances placing them.
///
/// Instance `i` gets instance id `i`; ids are dense by construction.
#[derive(Clone, Debug, Default)]
pub struct SceneDescription {
    pub meshes: Vec<Arc<TriangleMesh>>,
    pub instances: Vec<InstanceDesc>,
}

impl SceneDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mesh and return its geometry index.
    pub fn add_mesh(&mut self, mesh: TriangleMesh) -> usize {
        self.meshes.push(Arc::new(mesh));
        self.meshes.len() - 1
    }

    /// Add an instance and return its instance id.
    pub fn add_instance(&mut self, instance: InstanceDesc) -> u32 {
        self.instances.push(instance);
        (self.instances.len() - 1) as u32
    }

    /// One static instance per mesh at the origin.
    pub fn one_instance_per_mesh(meshes: Vec<TriangleMesh>) -> Self {
        let mut scene = Self::new();
        for mesh in meshes {
            let geometry = scene.add_mesh(mesh);
            scene.add_instance(InstanceDesc::fixed(geometry, Transform::default()));
        }
        scene
    }

    /// Check every instance references an existing mesh and has keyframes.
    pub fn validate(&self) -> SceneResult<()> {
        if self.instances.is_empty() {
            return Err(SceneError::NoInstances);
        }
        for (i, instance) in self.instances.iter().enumerate() {
            if instance.geometry >= self.meshes.len() {
                return Err(SceneError::BadGeometry {
                    instance: i,
                    geometry: instance.geometry,
                    count: self.meshes.len(),
                });
            }
            if instance.motion_steps == 0 {
                return Err(SceneError::NoMotionSteps(i));
            }
        }
        Ok(())
    }

    /// Flatten every instance's keyframes, in instance order.
    pub fn build_keyframes(&self) -> SceneResult<KeyframeBuffer> {
        self.validate()?;
        let mut buffer = KeyframeBuffer::new();
        for instance in &self.instances {
            buffer.push_instance(instance.motion_steps, &instance.start, &instance.trajectory)?;
        }
        log::debug!(
            "Keyframes: {} frames for {} instances",
            buffer.frames().len(),
            buffer.instance_count()
        );
        Ok(buffer)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Triangle count over all instances, counting every deformation step.
    pub fn total_triangle_count(&self) -> usize {
        self.instances
            .iter()
            .filter_map(|i| self.meshes.get(i.geometry))
            .map(|m| m.triangle_count())
            .sum()
    }

    /// World bounds over every keyframe of every instance.
    pub fn world_bounds(&self) -> SceneResult<Aabb> {
        let keyframes = self.build_keyframes()?;
        let mut bounds = Aabb::EMPTY;
        for (instance, desc) in self.instances.iter().enumerate() {
            let local = self.meshes[desc.geometry].bounds();
            for frame in keyframes.instance_frames(instance).unwrap_or_default() {
                bounds = Aabb::surrounding(&bounds, &frame.to_matrix().transform_aabb(&local));
            }
        }
        Ok(bounds)
    }
}
