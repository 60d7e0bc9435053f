//! Triangle meshes with baked deformation steps.
//!
//! A [`TriangleMesh`] stores its vertex positions as `step_count` blocks of
//! `unique_vertex_count` positions each. Step `s` lives in
//! `vertices[s * unique_vertex_count .. (s + 1) * unique_vertex_count]`.
//! Triangle indices always address a vertex *within* a block, so the same
//! index buffer serves every step; callers add the block offset themselves.
//!
//! Triangle normals follow the same layout, one block of
//! `unique_triangle_count` normals per step. Vertex normals exist once per
//! unique vertex and give the displacement direction used by [`TriangleMesh::deform`].

use mbrt_math::{Aabb, Vec3};
use thiserror::Error;

/// Distance each deformation step moves a vertex along its normal.
pub const DEFAULT_DISPLACEMENT: f32 = 1.5;

/// Errors raised while loading, building or baking a mesh.
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OBJ load error: {0}")]
    Obj(#[from] tobj::LoadError),

    #[error("STL parse error: {0}")]
    Stl(String),

    #[error("Unsupported mesh format: {0}")]
    UnsupportedFormat(String),

    #[error("No shapes found in {0}")]
    NoShapes(String),

    #[error("Mesh '{0}' has no triangles")]
    Empty(String),

    #[error("Mesh '{name}' has no vertex normals and cannot be deformed")]
    MissingNormals { name: String },

    #[error("Mesh '{name}': index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        name: String,
        index: u32,
        vertex_count: usize,
    },

    #[error("Mesh '{name}': {normal_count} vertex normals for {vertex_count} vertices")]
    NormalCountMismatch {
        name: String,
        normal_count: usize,
        vertex_count: usize,
    },
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// An indexed triangle mesh, optionally carrying several deformation steps.
#[derive(Clone, Debug)]
pub struct TriangleMesh {
    name: String,
    vertices: Vec<Vec3>,
    indices: Vec<[u32; 3]>,
    vertex_normals: Option<Vec<Vec3>>,
    triangle_normals: Vec<Vec3>,
    unique_vertex_count: usize,
    step_count: u32,
}

impl TriangleMesh {
    /// Create a single-step mesh.
    ///
    /// Triangle normals are the normalized average of the three vertex
    /// normals when vertex normals are given, otherwise the geometric
    /// normal of the counter-clockwise triangle.
    pub fn new(
        name: impl Into<String>,
        positions: Vec<Vec3>,
        indices: Vec<[u32; 3]>,
        vertex_normals: Option<Vec<Vec3>>,
    ) -> MeshResult<Self> {
        let name = name.into();
        if indices.is_empty() {
            return Err(MeshError::Empty(name));
        }

        let vertex_count = positions.len();
        if let Some(&index) = indices.iter().flatten().find(|&&i| i as usize >= vertex_count) {
            return Err(MeshError::IndexOutOfRange {
                name,
                index,
                vertex_count,
            });
        }

        if let Some(normals) = &vertex_normals {
            if normals.len() != vertex_count {
                return Err(MeshError::NormalCountMismatch {
                    name,
                    normal_count: normals.len(),
                    vertex_count,
                });
            }
        }

        let triangle_normals = indices
            .iter()
            .map(|tri| triangle_normal(&positions, vertex_normals.as_deref(), tri))
            .collect();

        Ok(Self {
            name,
            vertices: positions,
            indices,
            vertex_normals,
            triangle_normals,
            unique_vertex_count: vertex_count,
            step_count: 1,
        })
    }

    /// Append `steps` deformation steps.
    ///
    /// Every new step is the base positions (step 0) displaced by
    /// `displacement` along the normalized vertex normal, so all deformed
    /// steps share one offset and re-baking appends the same block. Indices, vertex
    /// normals and unique counts are untouched; triangle normals are copied
    /// unchanged into the new step block. `steps == 0` leaves the mesh as is.
    pub fn deform(&mut self, steps: u32, displacement: f32) -> MeshResult<()> {
        if steps == 0 {
            return Ok(());
        }

        let normals = self
            .vertex_normals
            .as_ref()
            .ok_or_else(|| MeshError::MissingNormals {
                name: self.name.clone(),
            })?;

        let unique = self.unique_vertex_count;
        let unique_triangles = self.indices.len();
        self.vertices.reserve(unique * steps as usize);
        self.triangle_normals.reserve(unique_triangles * steps as usize);

        for _ in 0..steps {
            for (i, normal) in normals.iter().enumerate() {
                let displaced = self.vertices[i] + normal.normalize_or_zero() * displacement;
                self.vertices.push(displaced);
            }
            self.triangle_normals.extend_from_within(0..unique_triangles);
        }

        self.step_count += steps;
        log::debug!(
            "Deformed mesh '{}': {} steps, {} vertices",
            self.name,
            self.step_count,
            self.vertices.len()
        );
        Ok(())
    }

    /// Replace vertex normals with smooth normals averaged from face normals.
    ///
    /// Only meaningful before deformation, since it reads the first step.
    pub fn compute_vertex_normals(&mut self) {
        let base = &self.vertices[..self.unique_vertex_count];
        let mut normals = vec![Vec3::ZERO; self.unique_vertex_count];

        for tri in &self.indices {
            let [a, b, c] = tri.map(|i| base[i as usize]);
            let face_normal = (b - a).cross(c - a);
            for &i in tri {
                normals[i as usize] += face_normal;
            }
        }

        for normal in &mut normals {
            *normal = normal.try_normalize().unwrap_or(Vec3::Z);
        }
        self.vertex_normals = Some(normals);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All vertex positions, every step block in order.
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Positions of one deformation step.
    pub fn step_vertices(&self, step: u32) -> &[Vec3] {
        let start = step as usize * self.unique_vertex_count;
        &self.vertices[start..start + self.unique_vertex_count]
    }

    /// Unique triangles; indices are relative to a step block.
    pub fn indices(&self) -> &[[u32; 3]] {
        &self.indices
    }

    pub fn vertex_normals(&self) -> Option<&[Vec3]> {
        self.vertex_normals.as_deref()
    }

    pub fn has_vertex_normals(&self) -> bool {
        self.vertex_normals.is_some()
    }

    /// Triangle normals, one block per step.
    pub fn triangle_normals(&self) -> &[Vec3] {
        &self.triangle_normals
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn unique_vertex_count(&self) -> usize {
        self.unique_vertex_count
    }

    pub fn unique_triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Vertex count across all steps.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Triangle count across all steps.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() * self.step_count as usize
    }

    /// The three corners of `prim` at deformation step `step`.
    pub fn triangle_at_step(&self, prim: usize, step: u32) -> [Vec3; 3] {
        let offset = step as usize * self.unique_vertex_count;
        self.indices[prim].map(|i| self.vertices[offset + i as usize])
    }

    /// Bounds of one triangle swept over every deformation step.
    pub fn swept_triangle_bounds(&self, prim: usize) -> Aabb {
        (0..self.step_count).fold(Aabb::EMPTY, |acc, step| {
            let [a, b, c] = self.triangle_at_step(prim, step);
            Aabb::surrounding(&acc, &Aabb::from_triangle(a, b, c))
        })
    }

    /// One swept box per unique triangle, the primitive list of a
    /// deforming mesh.
    pub fn swept_bounds_list(&self) -> Vec<Aabb> {
        (0..self.indices.len())
            .map(|prim| self.swept_triangle_bounds(prim))
            .collect()
    }

    /// Bounds over every vertex of every step.
    pub fn bounds(&self) -> Aabb {
        self.vertices
            .iter()
            .fold(Aabb::EMPTY, |acc, &v| acc.include_point(v))
    }

    /// Raw vertex buffer (12-byte stride, every step).
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Raw index buffer (12-byte stride).
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

fn triangle_normal(positions: &[Vec3], vertex_normals: Option<&[Vec3]>, tri: &[u32; 3]) -> Vec3 {
    let averaged = vertex_normals.and_then(|normals| {
        let sum: Vec3 = tri.iter().map(|&i| normals[i as usize]).sum();
        (sum / 3.0).try_normalize()
    });

    averaged.unwrap_or_else(|| {
        let [a, b, c] = tri.map(|i| positions[i as usize]);
        (b - a).cross(c - a).try_normalize().unwrap_or_else(|| {
            log::warn!("Degenerate triangle {:?}, using +Z as its normal", tri);
            Vec3::Z
        })
    })
}
