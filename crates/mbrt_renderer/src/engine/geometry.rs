use std::borrow::Cow;

use mbrt_core::TriangleMesh;
use mbrt_math::{Aabb, Interval, Ray, Vec3};

use super::{TraceOptions, DEFORMED_MESH, TRIANGLE_MESH};
use crate::bvh::{BuildQuality, Bvh};
use crate::error::{RenderError, Result};
use crate::hit::Hit;
use crate::triangle::intersect_triangle;

/// Raw triangle buffers handed to [`build_geometry`].
///
/// Vertices are read as three `f32` and indices as three `u32` at the
/// start of each stride; any trailing bytes of a stride are skipped.
#[derive(Debug, Clone)]
pub struct TriangleMeshInput<'a> {
    pub vertices: Cow<'a, [u8]>,
    pub vertex_stride: usize,
    pub vertex_count: usize,
    pub indices: Cow<'a, [u8]>,
    pub index_stride: usize,
    pub triangle_count: usize,
}

impl<'a> TriangleMeshInput<'a> {
    /// First step of `mesh`, borrowing its buffers.
    pub fn from_mesh(mesh: &'a TriangleMesh) -> Self {
        let vertex_count = mesh.unique_vertex_count();
        Self {
            vertices: Cow::Borrowed(&mesh.vertex_bytes()[..vertex_count * 12]),
            vertex_stride: 12,
            vertex_count,
            indices: Cow::Borrowed(mesh.index_bytes()),
            index_stride: 12,
            triangle_count: mesh.unique_triangle_count(),
        }
    }

    /// Every step of `mesh` as independent triangles, step blocks in order.
    pub fn all_steps(mesh: &'a TriangleMesh) -> Self {
        let unique = mesh.unique_vertex_count() as u32;
        let indices: Vec<[u32; 3]> = (0..mesh.step_count())
            .flat_map(|step| {
                mesh.indices()
                    .iter()
                    .map(move |tri| tri.map(|i| i + step * unique))
            })
            .collect();

        Self {
            vertices: Cow::Borrowed(mesh.vertex_bytes()),
            vertex_stride: 12,
            vertex_count: mesh.vertex_count(),
            triangle_count: indices.len(),
            indices: Cow::Owned(bytemuck::cast_slice(&indices).to_vec()),
            index_stride: 12,
        }
    }
}

/// What a geometry is built from.
#[derive(Debug, Clone)]
pub enum GeometryBuildInput<'a> {
    /// Triangles intersected by the engine.
    Triangles(TriangleMeshInput<'a>),
    /// Boxes whose contents are intersected by the callbacks registered
    /// for `geom_type`.
    Custom { aabbs: Vec<Aabb>, geom_type: u32 },
}

impl<'a> GeometryBuildInput<'a> {
    /// Static meshes build as triangles, deformed meshes as one swept box
    /// per unique triangle.
    pub fn for_mesh(mesh: &'a TriangleMesh) -> Self {
        if mesh.step_count() >= 2 {
            GeometryBuildInput::Custom {
                aabbs: mesh.swept_bounds_list(),
                geom_type: DEFORMED_MESH,
            }
        } else {
            GeometryBuildInput::Triangles(TriangleMeshInput::from_mesh(mesh))
        }
    }
}

#[derive(Debug)]
enum Primitives {
    Triangles(Vec<[Vec3; 3]>),
    Custom { count: usize, geom_type: u32 },
}

/// A built, traversable geometry in its own object space.
#[derive(Debug)]
pub struct Geometry {
    primitives: Primitives,
    bvh: Bvh,
}

/// Build a geometry and its BVH. Fails on malformed buffers; nothing of a
/// failed build is kept.
pub fn build_geometry(input: &GeometryBuildInput, quality: BuildQuality) -> Result<Geometry> {
    let (primitives, boxes) = match input {
        GeometryBuildInput::Triangles(mesh) => {
            let corners = decode_triangles(mesh)?;
            let boxes = corners
                .iter()
                .map(|[a, b, c]| Aabb::from_triangle(*a, *b, *c))
                .collect::<Vec<_>>();
            (Primitives::Triangles(corners), boxes)
        }
        GeometryBuildInput::Custom { aabbs, geom_type } => {
            if aabbs.is_empty() {
                return Err(RenderError::Build("custom geometry has no primitives".into()));
            }
            let primitives = Primitives::Custom {
                count: aabbs.len(),
                geom_type: *geom_type,
            };
            (primitives, aabbs.clone())
        }
    };

    let bvh = Bvh::build(&boxes, quality);
    log::debug!(
        "Built geometry: {} primitives, {} BVH nodes, depth {}",
        boxes.len(),
        bvh.node_count(),
        bvh.depth()
    );
    Ok(Geometry { primitives, bvh })
}

fn decode_triangles(input: &TriangleMeshInput) -> Result<Vec<[Vec3; 3]>> {
    if input.triangle_count == 0 || input.vertex_count == 0 {
        return Err(RenderError::Build("triangle mesh is empty".into()));
    }
    if input.vertex_stride < 12 || input.index_stride < 12 {
        return Err(RenderError::Build(format!(
            "strides must be at least 12 bytes (vertex {}, index {})",
            input.vertex_stride, input.index_stride
        )));
    }

    let needed = |count: usize, stride: usize| (count - 1) * stride + 12;
    if input.vertices.len() < needed(input.vertex_count, input.vertex_stride) {
        return Err(RenderError::Build(format!(
            "vertex buffer holds {} bytes, {} vertices need {}",
            input.vertices.len(),
            input.vertex_count,
            needed(input.vertex_count, input.vertex_stride)
        )));
    }
    if input.indices.len() < needed(input.triangle_count, input.index_stride) {
        return Err(RenderError::Build(format!(
            "index buffer holds {} bytes, {} triangles need {}",
            input.indices.len(),
            input.triangle_count,
            needed(input.triangle_count, input.index_stride)
        )));
    }

    let vertices: Vec<Vec3> = (0..input.vertex_count)
        .map(|i| {
            let offset = i * input.vertex_stride;
            let xyz: [f32; 3] = bytemuck::pod_read_unaligned(&input.vertices[offset..offset + 12]);
            Vec3::from_array(xyz)
        })
        .collect();

    (0..input.triangle_count)
        .map(|i| {
            let offset = i * input.index_stride;
            let tri: [u32; 3] = bytemuck::pod_read_unaligned(&input.indices[offset..offset + 12]);
            match tri.iter().find(|&&index| index as usize >= vertices.len()) {
                Some(index) => Err(RenderError::Build(format!(
                    "triangle {} references vertex {} of {}",
                    i,
                    index,
                    vertices.len()
                ))),
                None => Ok(tri.map(|index| vertices[index as usize])),
            }
        })
        .collect()
}

impl Geometry {
    pub fn primitive_count(&self) -> usize {
        match &self.primitives {
            Primitives::Triangles(corners) => corners.len(),
            Primitives::Custom { count, .. } => *count,
        }
    }

    /// Geometry type used to look up callbacks.
    pub fn geom_type(&self) -> u32 {
        match self.primitives {
            Primitives::Triangles(_) => TRIANGLE_MESH,
            Primitives::Custom { geom_type, .. } => geom_type,
        }
    }

    /// Object-space bounds, covering every step of a deformed mesh.
    pub fn bounds(&self) -> Aabb {
        self.bvh.bounds()
    }

    /// Trace an object-space ray. Returns the closest accepted hit, or the
    /// first accepted one with `first_hit`.
    pub(crate) fn trace(
        &self,
        ray: &Ray,
        ray_t: Interval,
        instance_id: u32,
        opts: &TraceOptions,
        first_hit: bool,
    ) -> Option<Hit> {
        let callbacks = opts
            .funcs
            .and_then(|funcs| funcs.get(self.geom_type(), opts.ray_type));
        let mut best: Option<Hit> = None;

        self.bvh.traverse(ray, ray_t, first_hit, |prim, ray_t| {
            let hit = match &self.primitives {
                Primitives::Triangles(corners) => {
                    let tri = intersect_triangle(ray, &corners[prim as usize], ray_t)?;
                    Hit {
                        t: tri.t,
                        u: tri.u,
                        v: tri.v,
                        normal: tri.normal,
                        instance_id,
                        prim_id: prim,
                    }
                }
                Primitives::Custom { .. } => {
                    let hit = callbacks?.intersect(ray, instance_id, prim, ray_t)?;
                    if !ray_t.contains(hit.t) {
                        return None;
                    }
                    hit
                }
            };

            if let Some(callbacks) = callbacks {
                if !callbacks.filter(ray, &hit) {
                    return None;
                }
            }
            best = Some(hit);
            Some(hit.t)
        });

        best
    }
}
