//! Per-pixel estimators.
//!
//! Each integrator shades one pixel from scratch: it seeds its own
//! generator per sample, traces, and reduces its samples to one RGBA
//! value. Nothing is shared between pixels, which is what lets the
//! renderer run them in any order on any thread.

use mbrt_core::GeometryTable;
use mbrt_math::{Interval, Ray, Vec3};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::engine::{FuncTable, TraceOptions, TraversableScene};
use crate::hit::Hit;
use crate::sampling::{color_to_rgba, gamma_correct, gen_f32, sample_hemisphere_cosine, Lcg};

/// Flat colours given to instances, indexed by `instance_id % len`.
pub const INSTANCE_PALETTE: [Vec3; 2] = [Vec3::new(1.0, 0.0, 0.5), Vec3::new(0.0, 0.5, 1.0)];

/// Palette colour of an instance.
pub fn instance_color(instance_id: u32) -> Vec3 {
    INSTANCE_PALETTE[instance_id as usize % INSTANCE_PALETTE.len()]
}

/// Shading points are pulled back along the primary ray by this fraction
/// of the hit distance before occlusion rays leave them.
const SURFACE_BIAS: f32 = 1e-2;

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];

/// Everything an integrator reads while shading.
#[derive(Clone, Copy)]
pub struct ShadingContext<'a> {
    pub scene: &'a TraversableScene,
    pub funcs: &'a FuncTable,
    pub geometry: &'a GeometryTable,
    pub camera: &'a Camera,
    pub width: u32,
    pub height: u32,
    pub ao_radius: f32,
}

impl<'a> ShadingContext<'a> {
    fn options(&self) -> TraceOptions<'a> {
        TraceOptions::new().with_funcs(self.funcs)
    }

    fn pixel_index(&self, x: u32, y: u32) -> u32 {
        y * self.width + x
    }

    fn camera_ray(&self, x: u32, y: u32, rng: &mut Lcg, jitter: bool) -> Ray {
        self.camera.generate_ray(x, y, self.width, self.height, rng, jitter)
    }

    fn closest(&self, ray: &Ray) -> Option<Hit> {
        self.scene
            .trace_closest(ray, Interval::new(0.0, f32::INFINITY), &self.options())
    }

    /// World-space geometric normal at `hit`, facing against `ray`.
    fn facing_normal(&self, ray: &Ray, hit: &Hit) -> Option<Vec3> {
        let n = self
            .scene
            .object_to_world_vector(hit.normal, hit.instance_id, ray.time)?;
        let n = if ray.direction.dot(n) > 0.0 { -n } else { n };
        n.try_normalize()
    }

    /// Cast `samples` occlusion rays from the surface hit by `ray`.
    ///
    /// Returns the number that escaped within the AO radius and the hit of
    /// the last ray that did not.
    fn occlusion(&self, ray: &Ray, hit: &Hit, samples: u32, rng: &mut Lcg) -> (u32, Option<Hit>) {
        let Some(normal) = self.facing_normal(ray, hit) else {
            return (0, None);
        };
        let surface = ray.origin + hit.t * (1.0 - SURFACE_BIAS) * ray.direction;
        let range = Interval::new(0.0, self.ao_radius);
        let opts = self.options();

        let mut open = 0;
        let mut occluder = None;
        for _ in 0..samples {
            let dir = sample_hemisphere_cosine(normal, rng);
            let ao_ray = Ray::new(surface, dir, ray.time);
            match self.scene.trace_any(&ao_ray, range, &opts) {
                Some(blocked) => occluder = Some(blocked),
                None => open += 1,
            }
        }
        (open, occluder)
    }
}

/// One shaded pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub rgba: [u8; 4],
    /// Whether any primary ray hit geometry.
    pub hit: bool,
}

impl Pixel {
    fn background() -> Self {
        Self {
            rgba: BACKGROUND,
            hit: false,
        }
    }
}

/// A per-pixel estimator.
pub trait Integrator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Shade pixel `(x, y)`; row 0 is the bottom of the image.
    fn shade(&self, x: u32, y: u32, ctx: &ShadingContext) -> Pixel;
}

fn position_color(x: u32, y: u32, ctx: &ShadingContext) -> [u8; 4] {
    [
        (x as f32 / ctx.width as f32 * 255.0) as u8,
        (y as f32 / ctx.height as f32 * 255.0) as u8,
        0,
        255,
    ]
}

/// Orthographic hit mask: one ray per pixel from `(x/W, y/H, -1)` along +Z.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometryMask;

impl Integrator for GeometryMask {
    fn name(&self) -> &'static str {
        "geometry_mask"
    }

    fn shade(&self, x: u32, y: u32, ctx: &ShadingContext) -> Pixel {
        let origin = Vec3::new(x as f32 / ctx.width as f32, y as f32 / ctx.height as f32, -1.0);
        let ray = Ray::new(origin, Vec3::Z, 0.0);
        match ctx.closest(&ray) {
            Some(_) => Pixel {
                rgba: position_color(x, y, ctx),
                hit: true,
            },
            None => Pixel::background(),
        }
    }
}

/// Hit mask through the perspective camera.
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraMask;

impl Integrator for CameraMask {
    fn name(&self) -> &'static str {
        "camera_mask"
    }

    fn shade(&self, x: u32, y: u32, ctx: &ShadingContext) -> Pixel {
        let mut rng = Lcg::for_sample(ctx.pixel_index(x, y), 0);
        let ray = ctx.camera_ray(x, y, &mut rng, false);
        match ctx.closest(&ray) {
            Some(_) => Pixel {
                rgba: position_color(x, y, ctx),
                hit: true,
            },
            None => Pixel::background(),
        }
    }
}

/// Grey level proportional to the primary hit distance, `t / scale`.
#[derive(Debug, Clone, Copy)]
pub struct HitDistance {
    pub scale: f32,
}

impl Integrator for HitDistance {
    fn name(&self) -> &'static str {
        "hit_distance"
    }

    fn shade(&self, x: u32, y: u32, ctx: &ShadingContext) -> Pixel {
        let mut rng = Lcg::for_sample(ctx.pixel_index(x, y), 0);
        let ray = ctx.camera_ray(x, y, &mut rng, false);
        match ctx.closest(&ray) {
            Some(hit) => Pixel {
                rgba: color_to_rgba(Vec3::splat(hit.t / self.scale)),
                hit: true,
            },
            None => Pixel::background(),
        }
    }
}

/// Ambient occlusion of a white surface at time 0.
#[derive(Debug, Clone, Copy)]
pub struct AmbientOcclusion {
    pub spp: u32,
    pub ao_samples: u32,
}

impl AmbientOcclusion {
    /// Fraction of occlusion rays that escaped, over all samples of the pixel.
    pub fn open_fraction(&self, x: u32, y: u32, ctx: &ShadingContext) -> Option<f32> {
        let index = ctx.pixel_index(x, y);
        let mut open = 0u64;
        let mut hit_any = false;

        for p in 0..self.spp {
            let mut rng = Lcg::for_sample(index, p);
            let ray = ctx.camera_ray(x, y, &mut rng, true);
            if let Some(hit) = ctx.closest(&ray) {
                hit_any = true;
                open += ctx.occlusion(&ray, &hit, self.ao_samples, &mut rng).0 as u64;
            }
        }

        let total = self.spp as u64 * self.ao_samples as u64;
        (hit_any && total > 0).then(|| open as f32 / total as f32)
    }
}

impl Integrator for AmbientOcclusion {
    fn name(&self) -> &'static str {
        "ambient_occlusion"
    }

    fn shade(&self, x: u32, y: u32, ctx: &ShadingContext) -> Pixel {
        match self.open_fraction(x, y, ctx) {
            Some(ao) => Pixel {
                rgba: color_to_rgba(Vec3::ONE * ao),
                hit: true,
            },
            None => Pixel::background(),
        }
    }
}

/// Ambient occlusion at a random sample time per primary sample, tinted
/// with the palette colour of the last surface seen.
#[derive(Debug, Clone, Copy)]
pub struct AoMotionBlur {
    pub spp: u32,
    pub ao_samples: u32,
}

impl Integrator for AoMotionBlur {
    fn name(&self) -> &'static str {
        "ao_motion_blur"
    }

    fn shade(&self, x: u32, y: u32, ctx: &ShadingContext) -> Pixel {
        let index = ctx.pixel_index(x, y);
        let mut open = 0u64;
        let mut diffuse = Vec3::ONE;
        let mut hit_any = false;

        for p in 0..self.spp {
            let mut rng = Lcg::for_sample(index, p);
            let time = gen_f32(&mut rng);
            let ray = ctx.camera_ray(x, y, &mut rng, true).with_time(time);

            if let Some(hit) = ctx.closest(&ray) {
                hit_any = true;
                diffuse = instance_color(hit.instance_id);
                let (escaped, occluder) = ctx.occlusion(&ray, &hit, self.ao_samples, &mut rng);
                open += escaped as u64;
                if let Some(occluder) = occluder {
                    diffuse = instance_color(occluder.instance_id);
                }
            }
        }

        if !hit_any {
            return Pixel::background();
        }
        let total = (self.spp as u64 * self.ao_samples as u64).max(1);
        let ao = open as f32 / total as f32;
        Pixel {
            rgba: color_to_rgba(diffuse * ao),
            hit: true,
        }
    }
}

/// How sample times are drawn across a pixel's samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSampling {
    /// Sample `i` of `n` at time `i / n`.
    #[default]
    Stratified,
    /// Uniform random time per sample.
    Random,
}

/// Average palette colour of the instances hit over the shutter interval.
#[derive(Debug, Clone, Copy)]
pub struct MotionBlur {
    pub samples: u32,
    pub time_sampling: TimeSampling,
}

impl Integrator for MotionBlur {
    fn name(&self) -> &'static str {
        match self.time_sampling {
            TimeSampling::Stratified => "motion_blur_stratified",
            TimeSampling::Random => "motion_blur_random",
        }
    }

    fn shade(&self, x: u32, y: u32, ctx: &ShadingContext) -> Pixel {
        if self.samples == 0 {
            return Pixel::background();
        }
        let index = ctx.pixel_index(x, y);
        let mut color = Vec3::ZERO;
        let mut hit_any = false;

        for i in 0..self.samples {
            let mut rng = Lcg::for_sample(index, i);
            let ray = match self.time_sampling {
                TimeSampling::Random => {
                    let time = gen_f32(&mut rng);
                    ctx.camera_ray(x, y, &mut rng, true).with_time(time)
                }
                TimeSampling::Stratified => {
                    let time = i as f32 / self.samples as f32;
                    ctx.camera_ray(x, y, &mut rng, true).with_time(time)
                }
            };

            if let Some(hit) = ctx.closest(&ray) {
                hit_any = true;
                color += instance_color(hit.instance_id);
            }
        }

        Pixel {
            rgba: color_to_rgba(gamma_correct(color / self.samples as f32)),
            hit: hit_any,
        }
    }
}

/// Smooth world-space normals of deformed meshes as colours, stratified in time.
#[derive(Debug, Clone, Copy)]
pub struct DeformationShading {
    pub samples: u32,
}

impl DeformationShading {
    /// Shading normal at `hit`, blended from the three vertex normals.
    ///
    /// `None` when the mesh has no vertex normals; shading then uses the
    /// geometric normal.
    ///
    /// Weights are `1 - u + v`, `u` and `v` for the three corners.
    pub fn shading_normal(ray: &Ray, hit: &Hit, ctx: &ShadingContext) -> Option<Vec3> {
        let view = ctx.geometry.get(hit.instance_id)?;
        let unique = view.descriptor.unique_triangle_count.max(1);
        let [n0, n1, n2] = view.corner_normals(hit.prim_id % unique)?;

        let alpha = 1.0 - hit.u + hit.v;
        let beta = hit.u;
        let gamma = hit.v;
        let blended = alpha * n0 + beta * n1 + gamma * n2;

        ctx.scene
            .object_to_world_vector(blended, hit.instance_id, ray.time)?
            .try_normalize()
    }
}

impl Integrator for DeformationShading {
    fn name(&self) -> &'static str {
        "deformation_shading"
    }

    fn shade(&self, x: u32, y: u32, ctx: &ShadingContext) -> Pixel {
        if self.samples == 0 {
            return Pixel::background();
        }
        let index = ctx.pixel_index(x, y);
        let mut color = Vec3::ZERO;
        let mut hit_any = false;

        for i in 0..self.samples {
            let mut rng = Lcg::for_sample(index, i);
            let time = i as f32 / self.samples as f32;
            let ray = ctx.camera_ray(x, y, &mut rng, true).with_time(time);

            let Some(hit) = ctx.closest(&ray) else {
                continue;
            };
            hit_any = true;
            let normal = Self::shading_normal(&ray, &hit, ctx).or_else(|| {
                ctx.scene
                    .object_to_world_vector(hit.normal, hit.instance_id, ray.time)?
                    .try_normalize()
            });
            if let Some(n) = normal {
                color += 0.5 * n + 0.5;
            }
        }

        Pixel {
            rgba: color_to_rgba(gamma_correct(color / self.samples as f32)),
            hit: hit_any,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::deform::{AnyHitPolicy, DeformedMeshCallbacks};
    use crate::engine::{
        build_geometry, build_scene, BuildQuality, GeometryBuildInput, SceneBuildInput, DEFORMED_MESH,
        GEOMETRY_TYPE_COUNT, TRIANGLE_MESH,
    };
    use mbrt_core::mesh::DEFAULT_DISPLACEMENT;
    use mbrt_core::procedural::{triangle, unit_triangle};
    use mbrt_core::{FrameSrt, SceneDescription, TriangleMesh};

    struct Fixture {
        scene: TraversableScene,
        funcs: FuncTable,
        table: GeometryTable,
        camera: Camera,
    }

    impl Fixture {
        fn new(mesh: TriangleMesh) -> Self {
            let description = SceneDescription::one_instance_per_mesh(vec![mesh]);
            let table = GeometryTable::build(&description).unwrap();
            let geometry = build_geometry(
                &GeometryBuildInput::for_mesh(&description.meshes[0]),
                BuildQuality::PreferFastBuild,
            )
            .unwrap();
            let scene = build_scene(
                SceneBuildInput {
                    geometries: vec![Arc::new(geometry)],
                    instance_geometry: vec![0],
                    frames: vec![FrameSrt::identity()],
                    ..Default::default()
                },
                BuildQuality::PreferFastBuild,
            )
            .unwrap();

            let callbacks = Arc::new(DeformedMeshCallbacks::new(Arc::new(table.clone()), AnyHitPolicy::AcceptAll));
            let mut funcs = FuncTable::new(GEOMETRY_TYPE_COUNT, 1);
            funcs.set(TRIANGLE_MESH, 0, callbacks.clone()).unwrap();
            funcs.set(DEFORMED_MESH, 0, callbacks).unwrap();

            Self {
                scene,
                funcs,
                table,
                camera: Camera::new().with_translation(Vec3::new(0.0, 0.0, 3.0)),
            }
        }

        fn ctx(&self, width: u32, height: u32) -> ShadingContext<'_> {
            ShadingContext {
                scene: &self.scene,
                funcs: &self.funcs,
                geometry: &self.table,
                camera: &self.camera,
                width,
                height,
                ao_radius: 100.0,
            }
        }
    }

    fn big_triangle() -> TriangleMesh {
        triangle(
            "big",
            [
                Vec3::new(-10.0, -10.0, 0.0),
                Vec3::new(10.0, -10.0, 0.0),
                Vec3::new(0.0, 10.0, 0.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(instance_color(0), Vec3::new(1.0, 0.0, 0.5));
        assert_eq!(instance_color(3), instance_color(1));
    }

    #[test]
    fn test_geometry_mask_colors_by_position() {
        let fixture = Fixture::new(unit_triangle().unwrap());
        let ctx = fixture.ctx(8, 8);

        let inside = GeometryMask.shade(4, 2, &ctx);
        assert!(inside.hit);
        assert_eq!(inside.rgba, [127, 63, 0, 255]);

        let outside = GeometryMask.shade(0, 7, &ctx);
        assert!(!outside.hit);
        assert_eq!(outside.rgba, BACKGROUND);
    }

    #[test]
    fn test_hit_distance_grey() {
        let fixture = Fixture::new(big_triangle());
        let ctx = fixture.ctx(1, 1);

        let pixel = HitDistance { scale: 15.0 }.shade(0, 0, &ctx);
        // t = 3 maps to 0.2 of full scale
        assert!(pixel.hit);
        assert!((pixel.rgba[0] as i32 - 51).abs() <= 1, "grey {}", pixel.rgba[0]);
        assert_eq!(pixel.rgba[0], pixel.rgba[2]);
    }

    #[test]
    fn test_unoccluded_ao_saturates() {
        let fixture = Fixture::new(big_triangle());
        let ctx = fixture.ctx(4, 4);

        let ao = AmbientOcclusion { spp: 4, ao_samples: 16 };
        let open = ao.open_fraction(2, 2, &ctx).unwrap();
        assert_eq!(open, 1.0);
        assert_eq!(ao.shade(2, 2, &ctx).rgba, [255, 255, 255, 255]);
    }

    #[test]
    fn test_motion_blur_averages_palette() {
        let fixture = Fixture::new(big_triangle());
        let ctx = fixture.ctx(2, 2);

        let mb = MotionBlur {
            samples: 3,
            time_sampling: TimeSampling::Stratified,
        };
        let pixel = mb.shade(1, 1, &ctx);
        assert!(pixel.hit);
        assert_eq!(pixel.rgba, color_to_rgba(gamma_correct(instance_color(0))));
    }

    #[test]
    fn test_deformation_shading_alpha_convention() {
        let mut mesh = TriangleMesh::new(
            "corners",
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![[0, 1, 2]],
            Some(vec![Vec3::X, Vec3::Y, Vec3::Z]),
        )
        .unwrap();
        mesh.deform(2, DEFAULT_DISPLACEMENT).unwrap();
        let fixture = Fixture::new(mesh);
        let ctx = fixture.ctx(1, 1);

        let (u, v) = (0.2, 0.3);
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z, 0.0);
        let expected = ((1.0 - u + v) * Vec3::X + u * Vec3::Y + v * Vec3::Z).normalize();
        let standard = ((1.0 - u - v) * Vec3::X + u * Vec3::Y + v * Vec3::Z).normalize();
        assert!((expected - standard).length() > 0.1);

        // Primitive ids in later step blocks map back to the same corners
        for prim_id in [0, 1, 2] {
            let hit = Hit {
                t: 1.0,
                u,
                v,
                normal: Vec3::Z,
                instance_id: 0,
                prim_id,
            };
            let n = DeformationShading::shading_normal(&ray, &hit, &ctx).unwrap();
            assert!((n - expected).length() < 1e-6, "prim {}: {:?}", prim_id, n);
        }
    }

    #[test]
    fn test_deformation_shading_without_normals_uses_geometric_normal() {
        let mesh = TriangleMesh::new(
            "bare",
            vec![Vec3::new(-10.0, -10.0, 0.0), Vec3::new(10.0, -10.0, 0.0), Vec3::new(0.0, 10.0, 0.0)],
            vec![[0, 1, 2]],
            None,
        )
        .unwrap();
        let fixture = Fixture::new(mesh);
        let ctx = fixture.ctx(1, 1);

        let pixel = DeformationShading { samples: 2 }.shade(0, 0, &ctx);
        assert!(pixel.hit);
        // Normal +Z maps to (0.5, 0.5, 1.0) before gamma
        assert_eq!(pixel.rgba, color_to_rgba(gamma_correct(Vec3::new(0.5, 0.5, 1.0))));
    }
}
