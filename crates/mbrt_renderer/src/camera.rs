//! Pinhole camera for ray generation.

use mbrt_math::{Quat, Ray, Vec2, Vec3};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::sampling::gen_f32;

/// Sensor height in scene units; the width follows the image aspect.
const SENSOR_HEIGHT: f32 = 0.024;

/// Camera placed by a translation and a rotation.
///
/// Unrotated, it looks down -Z with +X to the right and +Y up. Pixel row 0
/// is the bottom row of the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    pub translation: Vec3,
    pub rotation: Quat,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            translation: Vec3::new(0.0, 0.0, 5.8),
            rotation: Quat::IDENTITY,
            fov_degrees: 45.0,
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set camera position.
    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    /// Set camera orientation.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set vertical field of view.
    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov_degrees = fov_degrees;
        self
    }

    /// Ray through pixel `(x, y)` of a `width` x `height` image, at time 0.
    ///
    /// Without `jitter` the ray passes through the pixel centre and `rng` is
    /// not touched. With `jitter` one random offset in `[0, 1)` is drawn and
    /// applied to both axes.
    pub fn generate_ray(&self, x: u32, y: u32, width: u32, height: u32, rng: &mut dyn RngCore, jitter: bool) -> Ray {
        let offset = if jitter { gen_f32(rng) } else { 0.5 };

        let aspect = width as f32 / height as f32;
        let sensor = Vec2::new(SENSOR_HEIGHT * aspect, SENSOR_HEIGHT);
        let xy = Vec2::new(
            (x as f32 + offset) / width as f32,
            (y as f32 + offset) / height as f32,
        ) - 0.5;

        let right = self.rotation * Vec3::X;
        let up = self.rotation * Vec3::Y;
        let view = self.rotation * Vec3::NEG_Z;
        let focal = sensor.y / (2.0 * (self.fov_degrees.to_radians() / 2.0).tan());

        let direction = xy.x * sensor.x * right + xy.y * sensor.y * up + focal * view;
        Ray::new(self.translation, direction.normalize(), 0.0)
    }
}
