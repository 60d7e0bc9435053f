//! Math primitives shared by the mbrt crates.
//!
//! Re-exports glam and adds the small set of ray tracing types the
//! mesh, engine and integrator code agree on: [`Ray`] (with its sample
//! time), [`Interval`], [`Aabb`] and the [`Mat4Ext`] helpers.

// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod interval;
mod ray;
mod transform;

pub use aabb::Aabb;
pub use interval::Interval;
pub use ray::Ray;
pub use transform::Mat4Ext;

/// Linear interpolation between two points.
#[inline]
pub fn lerp3(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lerp3_endpoints() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(3.0, 2.0, 1.0);
        assert_eq!(lerp3(a, b, 0.0), a);
        assert_eq!(lerp3(a, b, 1.0), b);
        assert_eq!(lerp3(a, b, 0.5), Vec3::new(2.0, 2.0, 2.0));
    }
}
