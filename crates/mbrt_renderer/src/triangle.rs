//! Ray-triangle intersection.
//!
//! Uses the Möller-Trumbore algorithm.

use mbrt_math::{Interval, Ray, Vec3};

/// Result of a successful ray-triangle test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    pub t: f32,
    /// Weight of the second corner.
    pub u: f32,
    /// Weight of the third corner.
    pub v: f32,
    /// Unnormalized geometric normal, `(v1 - v0) x (v2 - v0)`.
    pub normal: Vec3,
}

/// Intersect `ray` with the triangle `corners` inside `ray_t`.
///
/// Near-parallel rays and zero-area triangles are misses.
pub fn intersect_triangle(ray: &Ray, corners: &[Vec3; 3], ray_t: Interval) -> Option<TriangleHit> {
    let [v0, v1, v2] = *corners;
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);

    // Ray is parallel to triangle, or the triangle has no area
    if a.abs() < 1e-8 {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    if !ray_t.contains(t) {
        return None;
    }

    Some(TriangleHit {
        t,
        u,
        v,
        normal: edge1.cross(edge2),
    })
}
