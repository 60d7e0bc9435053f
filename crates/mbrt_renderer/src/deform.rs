//! Time-interpolated intersection for deformed meshes.
//!
//! A deformed mesh is built as one swept box per unique triangle. When a
//! ray reaches such a box, [`DeformedMeshCallbacks`] reads the triangle's
//! corners at the two deformation steps bracketing `ray.time`, blends
//! them, and intersects the blended triangle. The engine interpolates the
//! instance's rigid transform from the very same `ray.time`, so one ray
//! sees rigid motion and deformation at one consistent moment.

use std::sync::Arc;

use mbrt_core::{GeometryTable, GeometryView};
use mbrt_math::{lerp3, Interval, Ray, Vec3};
use serde::{Deserialize, Serialize};

use crate::engine::HitCallbacks;
use crate::hit::Hit;
use crate::triangle::intersect_triangle;

/// Latest sample time used for interpolation, keeping the upper frame in range.
pub const MAX_SAMPLE_TIME: f32 = 0.99999;

/// Deformation steps bracketing `time`, and the blend weight between them.
///
/// Returns `(frame0, frame1, frac)` with `frame1 == min(frame0 + 1, steps - 1)`.
/// Meshes with fewer than two steps always get `(0, 0, 0.0)`.
pub fn frame_pair(step_count: u32, time: f32) -> (u32, u32, f32) {
    if step_count < 2 {
        return (0, 0, 0.0);
    }
    let last = step_count - 1;
    let scaled = last as f32 * time.clamp(0.0, MAX_SAMPLE_TIME);
    let floor = scaled.floor();
    let frame0 = (floor as u32).min(last);
    let frame1 = (frame0 + 1).min(last);
    (frame0, frame1, scaled - floor)
}

/// Corners of unique triangle `prim` at sample time `time`.
pub fn interpolated_triangle(view: &GeometryView, prim: u32, time: f32) -> Option<[Vec3; 3]> {
    let (frame0, frame1, frac) = frame_pair(view.step_count(), time);
    let a = view.triangle(prim, frame0)?;
    let b = view.triangle(prim, frame1)?;
    Some([0, 1, 2].map(|i| lerp3(a[i], b[i], frac)))
}

/// Which candidate hits the any-hit filter keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnyHitPolicy {
    /// Every candidate is a hit.
    #[default]
    AcceptAll,
    /// The shutter interval is cut into `slices` equal parts; during part
    /// `k` only primitives of step block `k` (`prim_id / unique_triangles`)
    /// are visible.
    TimeSliced { slices: u32 },
}

impl AnyHitPolicy {
    pub fn accepts(&self, prim_id: u32, unique_triangles: u32, time: f32) -> bool {
        match *self {
            AnyHitPolicy::AcceptAll => true,
            AnyHitPolicy::TimeSliced { slices } => {
                if slices == 0 || unique_triangles == 0 {
                    return true;
                }
                let slice = ((time.max(0.0) * slices as f32) as u32).min(slices - 1);
                prim_id / unique_triangles == slice
            }
        }
    }
}

/// Intersection and any-hit callbacks for deformed meshes.
///
/// Installed for every geometry type, so the filter also sees hits on
/// plain triangle meshes.
#[derive(Debug, Clone)]
pub struct DeformedMeshCallbacks {
    table: Arc<GeometryTable>,
    policy: AnyHitPolicy,
}

impl DeformedMeshCallbacks {
    pub fn new(table: Arc<GeometryTable>, policy: AnyHitPolicy) -> Self {
        Self { table, policy }
    }

    pub fn policy(&self) -> AnyHitPolicy {
        self.policy
    }
}

impl HitCallbacks for DeformedMeshCallbacks {
    fn intersect(&self, ray: &Ray, instance_id: u32, prim_id: u32, ray_t: Interval) -> Option<Hit> {
        let view = self.table.get(instance_id)?;
        let corners = interpolated_triangle(&view, prim_id, ray.time)?;
        let tri = intersect_triangle(ray, &corners, ray_t)?;
        Some(Hit {
            t: tri.t,
            u: tri.u,
            v: tri.v,
            normal: tri.normal,
            instance_id,
            prim_id,
        })
    }

    fn filter(&self, ray: &Ray, hit: &Hit) -> bool {
        let unique = self
            .table
            .get(hit.instance_id)
            .map_or(0, |view| view.descriptor.unique_triangle_count);
        self.policy.accepts(hit.prim_id, unique, ray.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        build_geometry, build_scene, BuildQuality, FuncTable, GeometryBuildInput, SceneBuildInput, TraceOptions,
        TriangleMeshInput, DEFORMED_MESH, GEOMETRY_TYPE_COUNT, TRIANGLE_MESH,
    };
    use mbrt_core::mesh::DEFAULT_DISPLACEMENT;
    use mbrt_core::procedural::unit_triangle;
    use mbrt_core::{InstanceDesc, SceneDescription, Trajectory, Transform};

    fn all() -> Interval {
        Interval::new(0.0, f32::INFINITY)
    }

    fn deformed_table(steps: u32) -> Arc<GeometryTable> {
        let mut mesh = unit_triangle().unwrap();
        mesh.deform(steps, DEFAULT_DISPLACEMENT).unwrap();
        let scene = SceneDescription::one_instance_per_mesh(vec![mesh]);
        Arc::new(GeometryTable::build(&scene).unwrap())
    }

    #[test]
    fn test_frame_pair_at_boundaries() {
        assert_eq!(frame_pair(3, 0.0), (0, 1, 0.0));
        assert_eq!(frame_pair(3, 0.5), (1, 2, 0.0));
        assert_eq!(frame_pair(1, 0.7), (0, 0, 0.0));

        let (f0, f1, frac) = frame_pair(3, 1.0 - 1e-7);
        assert_eq!((f0, f1), (1, 2));
        assert!(frac > 0.9999);
    }

    #[test]
    fn test_frame_pair_never_out_of_range() {
        for steps in 2..8u32 {
            for i in 0..1000 {
                let time = i as f32 / 1000.0;
                let (f0, f1, frac) = frame_pair(steps, time);
                assert!(f0 < steps && f1 < steps, "steps {} time {}", steps, time);
                assert!(f1 == (f0 + 1).min(steps - 1));
                assert!((0.0..1.0).contains(&frac));
            }
        }
    }

    #[test]
    fn test_interpolation_converges_to_last_step() {
        let table = deformed_table(2);
        let view = table.get(0).unwrap();

        let late = interpolated_triangle(&view, 0, 0.999_999).unwrap();
        let last = view.triangle(0, 2).unwrap();
        for (a, b) in late.iter().zip(&last) {
            assert!((*a - *b).length() < 1e-3);
        }

        let early = interpolated_triangle(&view, 0, 0.0).unwrap();
        assert_eq!(early, view.triangle(0, 0).unwrap());
        assert!(interpolated_triangle(&view, 1, 0.5).is_none());
    }

    #[test]
    fn test_callback_intersects_blended_triangle() {
        let callbacks = DeformedMeshCallbacks::new(deformed_table(2), AnyHitPolicy::default());

        // Steps sit at z = 0, 1.5 and 1.5; t = 0.25 blends halfway into the first pair
        let ray = Ray::new(Vec3::new(0.5, 0.3, 5.0), Vec3::NEG_Z, 0.25);
        let hit = callbacks.intersect(&ray, 0, 0, all()).unwrap();
        assert!((hit.t - 4.25).abs() < 1e-4);
        assert!(hit.normal.z > 0.0);

        let ray = Ray::new(Vec3::new(0.5, 0.3, 5.0), Vec3::NEG_Z, 0.5);
        let hit = callbacks.intersect(&ray, 0, 0, all()).unwrap();
        assert!((hit.t - 3.5).abs() < 1e-4);

        // Unknown instance and out-of-interval hits are misses
        assert!(callbacks.intersect(&ray, 4, 0, all()).is_none());
        assert!(callbacks.intersect(&ray, 0, 0, Interval::new(0.0, 1.0)).is_none());
    }

    #[test]
    fn test_time_sliced_policy() {
        let policy = AnyHitPolicy::TimeSliced { slices: 3 };

        assert!(policy.accepts(0, 1, 0.1));
        assert!(!policy.accepts(0, 1, 0.5));
        assert!(policy.accepts(1, 1, 0.5));
        assert!(policy.accepts(2, 1, 0.99));
        assert!(!policy.accepts(2, 1, 0.2));
        assert!(AnyHitPolicy::TimeSliced { slices: 0 }.accepts(5, 1, 0.2));
        assert!(AnyHitPolicy::AcceptAll.accepts(5, 1, 0.2));
    }

    #[test]
    fn test_policy_deserializes() {
        let policy: AnyHitPolicy = serde_json::from_str(r#"{"kind": "time_sliced", "slices": 3}"#).unwrap();
        assert_eq!(policy, AnyHitPolicy::TimeSliced { slices: 3 });
        let policy: AnyHitPolicy = serde_json::from_str(r#"{"kind": "accept_all"}"#).unwrap();
        assert_eq!(policy, AnyHitPolicy::AcceptAll);
    }

    #[test]
    fn test_time_sliced_filter_picks_step_block() {
        let mut mesh = unit_triangle().unwrap();
        mesh.deform(2, DEFAULT_DISPLACEMENT).unwrap();
        let geometry = build_geometry(
            &GeometryBuildInput::Triangles(TriangleMeshInput::all_steps(&mesh)),
            BuildQuality::PreferFastBuild,
        )
        .unwrap();

        let table = Arc::new(GeometryTable::build(&SceneDescription::one_instance_per_mesh(vec![mesh])).unwrap());
        let scene = build_scene(
            SceneBuildInput {
                geometries: vec![Arc::new(geometry)],
                instance_geometry: vec![0],
                frames: vec![mbrt_core::FrameSrt::identity()],
                ..Default::default()
            },
            BuildQuality::PreferFastBuild,
        )
        .unwrap();

        let mut funcs = FuncTable::new(GEOMETRY_TYPE_COUNT, 1);
        funcs
            .set(
                TRIANGLE_MESH,
                0,
                Arc::new(DeformedMeshCallbacks::new(table, AnyHitPolicy::TimeSliced { slices: 3 })),
            )
            .unwrap();
        let opts = TraceOptions::new().with_funcs(&funcs);

        let early = Ray::new(Vec3::new(0.5, 0.3, 5.0), Vec3::NEG_Z, 0.1);
        assert_eq!(scene.trace_closest(&early, all(), &opts).unwrap().prim_id, 0);

        let late = Ray::new(Vec3::new(0.5, 0.3, 5.0), Vec3::NEG_Z, 0.9);
        assert_eq!(scene.trace_closest(&late, all(), &opts).unwrap().prim_id, 2);
    }

    #[test]
    fn test_one_time_drives_motion_and_deformation() {
        let mut mesh = unit_triangle().unwrap();
        mesh.deform(2, DEFAULT_DISPLACEMENT).unwrap();

        let mut description = SceneDescription::new();
        let geometry_index = description.add_mesh(mesh);
        description.add_instance(InstanceDesc::moving(
            geometry_index,
            Transform::default(),
            2,
            Trajectory::Linear {
                offset_per_step: Vec3::new(2.0, 0.0, 0.0),
            },
        ));
        let table = Arc::new(GeometryTable::build(&description).unwrap());
        let (frames, headers) = description.build_keyframes().unwrap().into_parts();

        let geometry = build_geometry(
            &GeometryBuildInput::for_mesh(&description.meshes[0]),
            BuildQuality::PreferFastBuild,
        )
        .unwrap();
        let scene = build_scene(
            SceneBuildInput {
                geometries: vec![Arc::new(geometry)],
                instance_geometry: vec![0],
                frames,
                headers: Some(headers),
                masks: None,
            },
            BuildQuality::PreferFastBuild,
        )
        .unwrap();

        let mut funcs = FuncTable::new(GEOMETRY_TYPE_COUNT, 1);
        let callbacks = Arc::new(DeformedMeshCallbacks::new(table, AnyHitPolicy::AcceptAll));
        funcs.set(DEFORMED_MESH, 0, callbacks.clone()).unwrap();
        funcs.set(TRIANGLE_MESH, 0, callbacks).unwrap();
        let opts = TraceOptions::new().with_funcs(&funcs);

        // At time 0.25 the instance has moved +1 in x and the surface sits at z = 0.75
        let ray = Ray::new(Vec3::new(1.5, 0.3, 5.0), Vec3::NEG_Z, 0.25);
        let hit = scene.trace_closest(&ray, all(), &opts).unwrap();
        assert!((hit.t - 4.25).abs() < 1e-4);

        // The same ray at time 0 misses: the triangle has not arrived yet
        assert!(scene.trace_closest(&ray.with_time(0.0), all(), &opts).is_none());
    }
}
