// Transform utilities for Mat4
//
// glam::Mat4 already provides transform_point3(), transform_vector3() and
// inverse(); these fill in the ray tracing specific pieces.

use crate::{Aabb, Ray};
use glam::{Mat3, Mat4, Vec3};

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform a surface normal (inverse transpose of the upper 3x3).
    fn transform_normal(&self, normal: Vec3) -> Vec3;

    /// Transform a ray into the space this matrix maps to, keeping its
    /// sample time. The direction is not renormalized so hit distances
    /// stay comparable across spaces.
    fn transform_ray(&self, ray: &Ray) -> Ray;

    /// Bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;
}

impl Mat4Ext for Mat4 {
    fn transform_normal(&self, normal: Vec3) -> Vec3 {
        Mat3::from_mat4(*self).inverse().transpose() * normal
    }

    fn transform_ray(&self, ray: &Ray) -> Ray {
        Ray::new(
            self.transform_point3(ray.origin),
            self.transform_vector3(ray.direction),
            ray.time,
        )
    }

    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        if aabb.is_empty() {
            return Aabb::EMPTY;
        }
        aabb.corners()
            .iter()
            .fold(Aabb::EMPTY, |acc, &corner| {
                acc.include_point(self.transform_point3(corner))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_transform_normal_non_uniform_scale() {
        // Plane x = y scaled by 2 along x: the normal must tilt towards y
        let mat = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let n = Vec3::new(1.0, -1.0, 0.0).normalize();
        let transformed = mat.transform_normal(n).normalize();

        let tangent = mat.transform_vector3(Vec3::new(1.0, 1.0, 0.0));
        assert!(transformed.dot(tangent).abs() < 1e-5);
    }

    #[test]
    fn test_transform_ray_round_trip() {
        let mat = Mat4::from_rotation_y(PI / 3.0) * Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let ray = Ray::new(Vec3::new(0.5, 0.0, -2.0), Vec3::Z, 0.4);

        let local = mat.inverse().transform_ray(&ray);
        let back = mat.transform_ray(&local);

        assert!((back.origin - ray.origin).length() < 1e-4);
        assert!((back.direction - ray.direction).length() < 1e-4);
        assert_eq!(back.time, 0.4);
        // Same parameter, same point
        assert!((mat.transform_point3(local.at(2.0)) - ray.at(2.0)).length() < 1e-4);
    }

    #[test]
    fn test_transform_aabb_translation() {
        let mat = Mat4::from_translation(Vec3::splat(5.0));
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::ONE);
        let transformed = mat.transform_aabb(&aabb);

        assert!((transformed.min() - Vec3::splat(5.0)).length() < 0.001);
        assert!((transformed.max() - Vec3::splat(6.0)).length() < 0.001);
    }

    #[test]
    fn test_transform_aabb_rotation_grows_box() {
        let mat = Mat4::from_rotation_z(PI / 4.0);
        let aabb = Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0));
        let transformed = mat.transform_aabb(&aabb);

        let half_diag = 2.0_f32.sqrt();
        assert!((transformed.x.max - half_diag).abs() < 1e-4);
        assert!((transformed.z.max - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_transform_empty_aabb_stays_empty() {
        let mat = Mat4::from_translation(Vec3::ONE);
        assert!(mat.transform_aabb(&Aabb::EMPTY).is_empty());
    }
}
