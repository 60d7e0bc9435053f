use mbrt_math::Vec3;

/// A hit reported by traversal.
///
/// `normal` is the object-space face normal of the triangle that was hit,
/// neither normalized nor interpolated; integrators move it to world space
/// with [`crate::TraversableScene::object_to_world_vector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub t: f32,
    pub u: f32,
    pub v: f32,
    pub normal: Vec3,
    pub instance_id: u32,
    pub prim_id: u32,
}

impl Hit {
    /// World-space hit point along the traced ray.
    pub fn point(&self, ray: &mbrt_math::Ray) -> Vec3 {
        ray.at(self.t)
    }
}
