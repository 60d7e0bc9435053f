//! Built-in meshes so render cases can run without asset files.

use std::f32::consts::PI;

use mbrt_math::Vec3;

use crate::mesh::{MeshResult, TriangleMesh};

/// The reference triangle `{(0,0,0), (1,0,0), (0.5,1,0)}`, facing +Z.
pub fn unit_triangle() -> MeshResult<TriangleMesh> {
    triangle(
        "unit_triangle",
        [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.5, 1.0, 0.0),
        ],
    )
}

/// A single triangle with flat vertex normals.
pub fn triangle(name: &str, corners: [Vec3; 3]) -> MeshResult<TriangleMesh> {
    let [a, b, c] = corners;
    let normal = (b - a).cross(c - a).try_normalize().unwrap_or(Vec3::Z);
    TriangleMesh::new(name, corners.to_vec(), vec![[0, 1, 2]], Some(vec![normal; 3]))
}

/// Square of side `2 * half_extent` in the plane `y = height`, facing +Y.
pub fn ground_plane(half_extent: f32, height: f32) -> MeshResult<TriangleMesh> {
    let h = half_extent;
    let positions = vec![
        Vec3::new(-h, height, -h),
        Vec3::new(h, height, -h),
        Vec3::new(h, height, h),
        Vec3::new(-h, height, h),
    ];
    TriangleMesh::new(
        "ground_plane",
        positions,
        vec![[0, 3, 2], [0, 2, 1]],
        Some(vec![Vec3::Y; 4]),
    )
}

/// Latitude/longitude sphere centred at the origin with outward normals.
///
/// `sectors` wraps around the Y axis, `stacks` runs pole to pole.
pub fn uv_sphere(radius: f32, sectors: u32, stacks: u32) -> MeshResult<TriangleMesh> {
    let sectors = sectors.max(3);
    let stacks = stacks.max(2);

    let mut positions = Vec::with_capacity(((stacks + 1) * (sectors + 1)) as usize);
    let mut normals = Vec::with_capacity(positions.capacity());
    for i in 0..=stacks {
        let polar = PI * i as f32 / stacks as f32;
        for j in 0..=sectors {
            let azimuth = 2.0 * PI * j as f32 / sectors as f32;
            let n = Vec3::new(polar.sin() * azimuth.cos(), polar.cos(), polar.sin() * azimuth.sin());
            positions.push(n * radius);
            normals.push(n);
        }
    }

    let mut indices = Vec::new();
    for i in 0..stacks {
        let k1 = i * (sectors + 1);
        let k2 = k1 + sectors + 1;
        for j in 0..sectors {
            // Skip the zero-area triangles at the poles
            if i != 0 {
                indices.push([k1 + j, k1 + j + 1, k2 + j]);
            }
            if i != stacks - 1 {
                indices.push([k1 + j + 1, k2 + j + 1, k2 + j]);
            }
        }
    }

    TriangleMesh::new("uv_sphere", positions, indices, Some(normals))
}
