//! Per-instance geometry descriptors.
//!
//! A [`GeometryDescriptor`] is a flat snapshot of the counts the hit
//! callbacks need; it refers to its mesh by geometry index rather than by
//! address. The [`GeometryTable`] owns the descriptors (indexed by instance
//! id) together with the meshes they index, so a lookup during traversal is
//! two bounds-checked array reads.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use mbrt_math::Vec3;

use crate::mesh::TriangleMesh;
use crate::scene::{SceneDescription, SceneError, SceneResult};

/// Read-only snapshot describing one instance's geometry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct GeometryDescriptor {
    pub geometry_id: u32,
    pub instance_id: u32,
    pub unique_triangle_count: u32,
    pub unique_vertex_count: u32,
    pub triangle_count: u32,
    pub vertex_count: u32,
    pub step_count: u32,
}

impl GeometryDescriptor {
    pub fn describe(mesh: &TriangleMesh, geometry_id: u32, instance_id: u32) -> Self {
        Self {
            geometry_id,
            instance_id,
            unique_triangle_count: mesh.unique_triangle_count() as u32,
            unique_vertex_count: mesh.unique_vertex_count() as u32,
            triangle_count: mesh.triangle_count() as u32,
            vertex_count: mesh.vertex_count() as u32,
            step_count: mesh.step_count(),
        }
    }

    /// True while the snapshot still agrees with `mesh`.
    pub fn matches(&self, mesh: &TriangleMesh) -> bool {
        *self == Self::describe(mesh, self.geometry_id, self.instance_id)
    }
}

/// Descriptors for every instance plus the meshes they reference.
#[derive(Debug, Clone, Default)]
pub struct GeometryTable {
    descriptors: Vec<GeometryDescriptor>,
    meshes: Vec<Arc<TriangleMesh>>,
}

impl GeometryTable {
    /// Snapshot every instance of `scene`. Rebuild after changing a mesh.
    pub fn build(scene: &SceneDescription) -> SceneResult<Self> {
        scene.validate()?;
        let descriptors = scene
            .instances
            .iter()
            .enumerate()
            .map(|(instance_id, instance)| {
                GeometryDescriptor::describe(
                    &scene.meshes[instance.geometry],
                    instance.geometry as u32,
                    instance_id as u32,
                )
            })
            .collect();
        Self::from_parts(descriptors, scene.meshes.clone())
    }

    /// Assemble a table from prebuilt descriptors.
    ///
    /// Descriptor `i` must carry instance id `i` and describe the mesh its
    /// geometry id points at.
    pub fn from_parts(descriptors: Vec<GeometryDescriptor>, meshes: Vec<Arc<TriangleMesh>>) -> SceneResult<Self> {
        for (position, descriptor) in descriptors.iter().enumerate() {
            if descriptor.instance_id as usize != position {
                return Err(SceneError::SparseInstanceId {
                    expected: position as u32,
                    found: descriptor.instance_id,
                });
            }
            let mesh = meshes
                .get(descriptor.geometry_id as usize)
                .ok_or(SceneError::BadGeometry {
                    instance: position,
                    geometry: descriptor.geometry_id as usize,
                    count: meshes.len(),
                })?;
            if !descriptor.matches(mesh) {
                return Err(SceneError::StaleDescriptor {
                    instance: position,
                    mesh: mesh.name().to_string(),
                });
            }
        }
        Ok(Self { descriptors, meshes })
    }

    /// Geometry seen by a hit on `instance_id`.
    pub fn get(&self, instance_id: u32) -> Option<GeometryView<'_>> {
        let descriptor = self.descriptors.get(instance_id as usize)?;
        let mesh = self.meshes.get(descriptor.geometry_id as usize)?;
        Some(GeometryView { descriptor, mesh })
    }

    pub fn descriptors(&self) -> &[GeometryDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// One descriptor resolved against its mesh.
#[derive(Debug, Clone, Copy)]
pub struct GeometryView<'a> {
    pub descriptor: &'a GeometryDescriptor,
    mesh: &'a TriangleMesh,
}

impl<'a> GeometryView<'a> {
    pub fn mesh(&self) -> &'a TriangleMesh {
        self.mesh
    }

    pub fn step_count(&self) -> u32 {
        self.descriptor.step_count
    }

    /// Corners of unique triangle `prim` at deformation step `step`.
    pub fn triangle(&self, prim: u32, step: u32) -> Option<[Vec3; 3]> {
        if prim >= self.descriptor.unique_triangle_count || step >= self.descriptor.step_count {
            return None;
        }
        Some(self.mesh.triangle_at_step(prim as usize, step))
    }

    /// Vertex normals at the three corners of `prim`.
    pub fn corner_normals(&self, prim: u32) -> Option<[Vec3; 3]> {
        let tri = self.mesh.indices().get(prim as usize)?;
        let normals = self.mesh.vertex_normals()?;
        Some(tri.map(|i| normals[i as usize]))
    }

    /// Face normal of `prim` at deformation step `step`.
    pub fn triangle_normal(&self, prim: u32, step: u32) -> Option<Vec3> {
        if step >= self.descriptor.step_count {
            return None;
        }
        let index = step as usize * self.descriptor.unique_triangle_count as usize + prim as usize;
        self.mesh.triangle_normals().get(index).copied()
    }
}
