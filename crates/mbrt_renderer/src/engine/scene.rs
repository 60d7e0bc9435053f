use std::ops::Range;
use std::sync::Arc;

use mbrt_core::keyframe::validate_headers;
use mbrt_core::{FrameSrt, SceneError, TransformHeader};
use mbrt_math::{Aabb, Interval, Mat4, Mat4Ext, Ray, Vec3};

use super::{FuncTable, Geometry, FULL_RAY_MASK};
use crate::bvh::{BuildQuality, Bvh};
use crate::error::{RenderError, Result};
use crate::hit::Hit;

/// Samples per keyframe segment when bounding an instance's motion.
const MOTION_BOUND_SUBSTEPS: u32 = 8;

/// Instances and keyframes handed to [`build_scene`].
#[derive(Debug, Clone, Default)]
pub struct SceneBuildInput {
    pub geometries: Vec<Arc<Geometry>>,
    /// Geometry index of each instance; position is the instance id.
    pub instance_geometry: Vec<usize>,
    /// Keyframes of every instance, flattened in instance order.
    pub frames: Vec<FrameSrt>,
    /// Keyframe range of each instance. `None` means one frame per instance.
    pub headers: Option<Vec<TransformHeader>>,
    /// Visibility mask of each instance. `None` means every ray sees every instance.
    pub masks: Option<Vec<u32>>,
}

/// Per-trace settings.
#[derive(Debug, Clone, Copy)]
pub struct TraceOptions<'a> {
    pub funcs: Option<&'a FuncTable>,
    pub mask: u32,
    pub ray_type: u32,
}

impl Default for TraceOptions<'_> {
    fn default() -> Self {
        Self {
            funcs: None,
            mask: FULL_RAY_MASK,
            ray_type: 0,
        }
    }
}

impl<'a> TraceOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_funcs(mut self, funcs: &'a FuncTable) -> Self {
        self.funcs = Some(funcs);
        self
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_ray_type(mut self, ray_type: u32) -> Self {
        self.ray_type = ray_type;
        self
    }
}

#[derive(Debug)]
struct Instance {
    geometry: usize,
    frames: Range<usize>,
    mask: u32,
}

/// Instances of built geometries, moving along their keyframes.
#[derive(Debug)]
pub struct TraversableScene {
    geometries: Vec<Arc<Geometry>>,
    instances: Vec<Instance>,
    frames: Vec<FrameSrt>,
    tlas: Bvh,
}

/// Build the top-level structure over every instance.
///
/// Each instance is bounded over its whole motion, so one structure serves
/// every sample time.
pub fn build_scene(input: SceneBuildInput, quality: BuildQuality) -> Result<TraversableScene> {
    let SceneBuildInput {
        geometries,
        instance_geometry,
        frames,
        headers,
        masks,
    } = input;

    let instance_count = instance_geometry.len();
    if instance_count == 0 {
        return Err(SceneError::NoInstances.into());
    }
    if let Some((instance, &geometry)) = instance_geometry
        .iter()
        .enumerate()
        .find(|(_, g)| **g >= geometries.len())
    {
        return Err(SceneError::BadGeometry {
            instance,
            geometry,
            count: geometries.len(),
        }
        .into());
    }

    let headers = match headers {
        Some(headers) => headers,
        None => (0..instance_count as u32)
            .map(|i| TransformHeader {
                frame_index: i,
                frame_count: 1,
            })
            .collect(),
    };
    if headers.len() != instance_count {
        return Err(SceneError::BadKeyframes(format!(
            "{} headers for {} instances",
            headers.len(),
            instance_count
        ))
        .into());
    }
    validate_headers(&headers, frames.len())?;

    let masks = masks.unwrap_or_else(|| vec![FULL_RAY_MASK; instance_count]);
    if masks.len() != instance_count {
        return Err(RenderError::Build(format!(
            "{} masks for {} instances",
            masks.len(),
            instance_count
        )));
    }

    let instances: Vec<Instance> = instance_geometry
        .iter()
        .zip(&headers)
        .zip(&masks)
        .map(|((&geometry, header), &mask)| Instance {
            geometry,
            frames: header.range(),
            mask,
        })
        .collect();

    for (instance_id, instance) in instances.iter().enumerate() {
        let own = &frames[instance.frames.clone()];
        if own.windows(2).any(|pair| pair[1].time < pair[0].time) {
            return Err(SceneError::BadKeyframes(format!(
                "instance {} keyframe times go backwards",
                instance_id
            ))
            .into());
        }
    }

    let boxes: Vec<Aabb> = instances
        .iter()
        .map(|instance| motion_bounds(&geometries[instance.geometry].bounds(), &frames[instance.frames.clone()]))
        .collect();
    let tlas = Bvh::build(&boxes, quality);

    log::info!(
        "Built scene: {} instances, {} geometries, {} keyframes",
        instances.len(),
        geometries.len(),
        frames.len()
    );

    Ok(TraversableScene {
        geometries,
        instances,
        frames,
        tlas,
    })
}

/// World bounds of `local` swept along `frames`.
fn motion_bounds(local: &Aabb, frames: &[FrameSrt]) -> Aabb {
    let [first, rest @ ..] = frames else {
        return Aabb::EMPTY;
    };
    let mut bounds = first.to_matrix().transform_aabb(local);
    if rest.is_empty() {
        return bounds;
    }

    for pair in frames.windows(2) {
        for k in 1..=MOTION_BOUND_SUBSTEPS {
            let frame = FrameSrt::interpolate(&pair[0], &pair[1], k as f32 / MOTION_BOUND_SUBSTEPS as f32);
            bounds = Aabb::surrounding(&bounds, &frame.to_matrix().transform_aabb(local));
        }
    }

    // Rotation arcs bulge slightly past the sampled boxes
    let pad = bounds.diagonal() * 0.01;
    Aabb::new(bounds.x.expand(pad), bounds.y.expand(pad), bounds.z.expand(pad))
}

impl TraversableScene {
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// World bounds over the whole shutter interval.
    pub fn bounds(&self) -> Aabb {
        self.tlas.bounds()
    }

    /// Rigid transform of `instance_id` at `time`.
    pub fn instance_transform(&self, instance_id: u32, time: f32) -> Option<FrameSrt> {
        let instance = self.instances.get(instance_id as usize)?;
        Some(FrameSrt::sample(&self.frames[instance.frames.clone()], time))
    }

    /// Move an object-space normal of `instance_id` to world space at `time`.
    pub fn object_to_world_vector(&self, v: Vec3, instance_id: u32, time: f32) -> Option<Vec3> {
        let frame = self.instance_transform(instance_id, time)?;
        Some(frame.to_matrix().transform_normal(v))
    }

    /// Closest accepted hit along `ray` at `ray.time`.
    pub fn trace_closest(&self, ray: &Ray, ray_t: Interval, opts: &TraceOptions) -> Option<Hit> {
        self.trace(ray, ray_t, opts, false)
    }

    /// Any accepted hit along `ray`; traversal stops at the first one.
    pub fn trace_any(&self, ray: &Ray, ray_t: Interval, opts: &TraceOptions) -> Option<Hit> {
        self.trace(ray, ray_t, opts, true)
    }

    fn trace(&self, ray: &Ray, ray_t: Interval, opts: &TraceOptions, first_hit: bool) -> Option<Hit> {
        let mut best = None;

        self.tlas.traverse(ray, ray_t, first_hit, |instance_id, ray_t| {
            let instance = &self.instances[instance_id as usize];
            if instance.mask & opts.mask == 0 {
                return None;
            }

            let world: Mat4 = FrameSrt::sample(&self.frames[instance.frames.clone()], ray.time).to_matrix();
            let local = world.inverse().transform_ray(ray);
            let hit = self.geometries[instance.geometry].trace(&local, ray_t, instance_id, opts, first_hit)?;
            best = Some(hit);
            Some(hit.t)
        });

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{build_geometry, GeometryBuildInput, HitCallbacks};
    use mbrt_core::procedural::unit_triangle;
    use mbrt_core::{KeyframeBuffer, Trajectory, Transform};
    use mbrt_math::Quat;

    fn triangle_geometry() -> Arc<Geometry> {
        let mesh = unit_triangle().unwrap();
        Arc::new(build_geometry(&GeometryBuildInput::for_mesh(&mesh), BuildQuality::PreferFastBuild).unwrap())
    }

    fn down(x: f32, y: f32, time: f32) -> Ray {
        Ray::new(Vec3::new(x, y, 5.0), Vec3::NEG_Z, time)
    }

    fn all() -> Interval {
        Interval::new(0.0, f32::INFINITY)
    }

    /// One static instance at (-1, 1, 0) and one moving from (-1, -1, 0)
    /// with two keyframes.
    fn two_instance_scene() -> TraversableScene {
        let mut keyframes = KeyframeBuffer::new();
        keyframes.push_static(&Transform::from_translation(Vec3::new(-1.0, 1.0, 0.0)));
        keyframes
            .push_instance(
                2,
                &Transform::from_translation(Vec3::new(-1.0, -1.0, 0.0)),
                &Trajectory::default(),
            )
            .unwrap();
        let (frames, headers) = keyframes.into_parts();

        let input = SceneBuildInput {
            geometries: vec![triangle_geometry()],
            instance_geometry: vec![0, 0],
            frames,
            headers: Some(headers),
            masks: None,
        };
        build_scene(input, BuildQuality::PreferFastBuild).unwrap()
    }

    #[test]
    fn test_static_instance_hit() {
        let scene = two_instance_scene();
        let hit = scene
            .trace_closest(&down(-0.5, 1.3, 0.7), all(), &TraceOptions::new())
            .unwrap();

        assert_eq!(hit.instance_id, 0);
        assert_eq!(hit.prim_id, 0);
        assert!((hit.t - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_moving_instance_follows_ray_time() {
        let scene = two_instance_scene();
        let opts = TraceOptions::new();

        // Start position
        let hit = scene.trace_closest(&down(-0.5, -0.7, 0.0), all(), &opts).unwrap();
        assert_eq!(hit.instance_id, 1);

        // Gone by the second keyframe
        assert!(scene.trace_closest(&down(-0.5, -0.7, 0.5), all(), &opts).is_none());

        // Halfway between keyframes it sits at (-0.25, -0.25, 0)
        let hit = scene.trace_closest(&down(0.25, 0.0, 0.25), all(), &opts).unwrap();
        assert_eq!(hit.instance_id, 1);
        assert!((hit.u - 0.375).abs() < 1e-4);
    }

    #[test]
    fn test_motion_bounds_cover_every_keyframe() {
        let scene = two_instance_scene();
        let bounds = scene.bounds();

        assert!(bounds.x.min <= -1.0);
        assert!(bounds.x.max >= 1.5);
        assert!(bounds.y.max >= 2.0);
    }

    #[test]
    fn test_mask_hides_instance() {
        let input = SceneBuildInput {
            geometries: vec![triangle_geometry()],
            instance_geometry: vec![0],
            frames: vec![FrameSrt::identity()],
            headers: None,
            masks: Some(vec![0b10]),
        };
        let scene = build_scene(input, BuildQuality::PreferHighQuality).unwrap();
        let ray = down(0.5, 0.3, 0.0);

        assert!(scene.trace_any(&ray, all(), &TraceOptions::new().with_mask(0b01)).is_none());
        assert!(scene.trace_any(&ray, all(), &TraceOptions::new().with_mask(0b10)).is_some());
    }

    #[test]
    fn test_filter_rejects_triangle_hits() {
        struct RejectAll;
        impl HitCallbacks for RejectAll {
            fn filter(&self, _ray: &Ray, _hit: &Hit) -> bool {
                false
            }
        }

        let scene = two_instance_scene();
        let mut funcs = FuncTable::new(2, 1);
        funcs.set(0, 0, Arc::new(RejectAll)).unwrap();

        let ray = down(-0.5, 1.3, 0.0);
        assert!(scene.trace_closest(&ray, all(), &TraceOptions::new()).is_some());
        assert!(scene
            .trace_closest(&ray, all(), &TraceOptions::new().with_funcs(&funcs))
            .is_none());
    }

    #[test]
    fn test_object_to_world_vector_uses_rotation() {
        let frames = vec![FrameSrt::new(
            Vec3::ZERO,
            Quat::from_rotation_x(std::f32::consts::FRAC_PI_2),
            Vec3::ONE,
            0.0,
        )];
        let input = SceneBuildInput {
            geometries: vec![triangle_geometry()],
            instance_geometry: vec![0],
            frames,
            headers: None,
            masks: None,
        };
        let scene = build_scene(input, BuildQuality::PreferFastBuild).unwrap();

        let n = scene.object_to_world_vector(Vec3::Z, 0, 0.3).unwrap();
        assert!((n - Vec3::NEG_Y).length() < 1e-5);
        assert!(scene.object_to_world_vector(Vec3::Z, 1, 0.0).is_none());
    }

    #[test]
    fn test_inconsistent_input_rejected() {
        let missing_frame = SceneBuildInput {
            geometries: vec![triangle_geometry()],
            instance_geometry: vec![0, 0],
            frames: vec![FrameSrt::identity()],
            headers: None,
            masks: None,
        };
        assert!(matches!(
            build_scene(missing_frame, BuildQuality::PreferFastBuild),
            Err(RenderError::Scene(SceneError::BadKeyframes(_)))
        ));

        let bad_geometry = SceneBuildInput {
            geometries: vec![triangle_geometry()],
            instance_geometry: vec![1],
            frames: vec![FrameSrt::identity()],
            headers: None,
            masks: None,
        };
        assert!(matches!(
            build_scene(bad_geometry, BuildQuality::PreferFastBuild),
            Err(RenderError::Scene(SceneError::BadGeometry { geometry: 1, .. }))
        ));

        let overlapping = SceneBuildInput {
            geometries: vec![triangle_geometry()],
            instance_geometry: vec![0, 0],
            frames: vec![FrameSrt::identity(), FrameSrt::identity()],
            headers: Some(vec![
                TransformHeader { frame_index: 0, frame_count: 2 },
                TransformHeader { frame_index: 0, frame_count: 2 },
            ]),
            masks: None,
        };
        assert!(build_scene(overlapping, BuildQuality::PreferFastBuild).is_err());
    }
}
