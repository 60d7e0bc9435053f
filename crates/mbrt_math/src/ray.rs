use crate::Vec3;

/// A ray with origin, direction and sample time.
///
/// The `time` field is the normalized sample time in `[0, 1)` at which the
/// ray observes the scene. The traversal engine reads it to interpolate
/// rigid instance transforms, and the deformation callbacks read the very
/// same value to pick vertex keyframes, so one ray always sees one
/// consistent moment of the animation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub time: f32,
}

impl Ray {
    /// Create a new ray.
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3, time: f32) -> Self {
        Self {
            origin,
            direction,
            time,
        }
    }

    /// Get the point along the ray at parameter t.
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Same ray observed at a different sample time.
    #[inline]
    pub fn with_time(self, time: f32) -> Self {
        Self { time, ..self }
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            direction: Vec3::Z,
            time: 0.0,
        }
    }
}
