//! Render cases: one parameterized pipeline from configuration to PNG.
//!
//! A case loads its meshes, bakes deformation, keyframes its instances,
//! builds geometries and the scene, installs the deformation callbacks,
//! dispatches its integrator and writes the image. Every resource it
//! creates is owned by the call and released when it returns.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use mbrt_core::mesh::DEFAULT_DISPLACEMENT;
use mbrt_core::procedural::{ground_plane, unit_triangle, uv_sphere};
use mbrt_core::{
    load_mesh, GeometryTable, InstanceDesc, MeshError, SceneDescription, Trajectory, Transform, TriangleMesh,
};
use mbrt_math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::deform::{AnyHitPolicy, DeformedMeshCallbacks};
use crate::engine::{
    build_geometry, build_scene, BuildQuality, FuncTable, GeometryBuildInput, HitCallbacks, SceneBuildInput,
    GEOMETRY_TYPE_COUNT,
};
use crate::error::{RenderError, Result};
use crate::integrator::{
    AmbientOcclusion, AoMotionBlur, CameraMask, DeformationShading, GeometryMask, HitDistance, Integrator,
    MotionBlur, ShadingContext, TimeSampling,
};
use crate::renderer::{ImageBuffer, RenderContext, RenderStats};

/// Where a case's meshes come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeshSource {
    /// OBJ or STL file, chosen by extension.
    File {
        path: PathBuf,
        #[serde(default)]
        material_dir: Option<PathBuf>,
    },
    UnitTriangle,
    UvSphere { radius: f32, sectors: u32, stacks: u32 },
    Plane { half_extent: f32, height: f32 },
}

impl MeshSource {
    pub fn from_path(path: impl Into<PathBuf>, material_dir: Option<PathBuf>) -> Self {
        MeshSource::File {
            path: path.into(),
            material_dir,
        }
    }

    /// The default sphere used when a case names no mesh file.
    pub fn sphere() -> Self {
        MeshSource::UvSphere {
            radius: 0.5,
            sectors: 64,
            stacks: 32,
        }
    }

    pub fn load(&self) -> Result<Vec<TriangleMesh>> {
        let meshes = match self {
            MeshSource::File { path, material_dir } => load_mesh(path, material_dir.as_deref())?,
            MeshSource::UnitTriangle => vec![unit_triangle()?],
            MeshSource::UvSphere {
                radius,
                sectors,
                stacks,
            } => vec![uv_sphere(*radius, *sectors, *stacks)?],
            MeshSource::Plane { half_extent, height } => vec![ground_plane(*half_extent, *height)?],
        };
        Ok(meshes)
    }
}

fn one() -> u32 {
    1
}

/// How loaded meshes become instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstanceLayout {
    /// Mesh `i` becomes instance `i`, all sharing one motion.
    OnePerMesh {
        #[serde(default)]
        start: Transform,
        #[serde(default = "one")]
        motion_steps: u32,
        #[serde(default)]
        trajectory: Trajectory,
    },
    /// Instances listed explicitly, indexing the loaded meshes.
    Explicit { instances: Vec<InstanceDesc> },
}

impl Default for InstanceLayout {
    fn default() -> Self {
        InstanceLayout::OnePerMesh {
            start: Transform::default(),
            motion_steps: 1,
            trajectory: Trajectory::default(),
        }
    }
}

impl InstanceLayout {
    pub fn describe(&self, meshes: Vec<TriangleMesh>) -> SceneDescription {
        let mut scene = SceneDescription::new();
        let geometry: Vec<usize> = meshes.into_iter().map(|mesh| scene.add_mesh(mesh)).collect();

        match self {
            InstanceLayout::OnePerMesh {
                start,
                motion_steps,
                trajectory,
            } => {
                for index in geometry {
                    scene.add_instance(InstanceDesc::moving(index, *start, *motion_steps, *trajectory));
                }
            }
            InstanceLayout::Explicit { instances } => {
                for instance in instances {
                    scene.add_instance(instance.clone());
                }
            }
        }
        scene
    }
}

fn default_displacement() -> f32 {
    DEFAULT_DISPLACEMENT
}

/// Deformation steps baked into every mesh of a case.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeformationConfig {
    pub steps: u32,
    #[serde(default = "default_displacement")]
    pub displacement: f32,
}

fn scene_distance_scale() -> f32 {
    15.0
}

/// Integrator selection with its sample counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegratorConfig {
    GeometryMask,
    CameraMask,
    HitDistance {
        #[serde(default = "scene_distance_scale")]
        scale: f32,
    },
    AmbientOcclusion {
        spp: u32,
        ao_samples: u32,
    },
    AoMotionBlur {
        spp: u32,
        ao_samples: u32,
    },
    MotionBlur {
        samples: u32,
        #[serde(default)]
        time_sampling: TimeSampling,
    },
    DeformationShading {
        samples: u32,
    },
}

impl IntegratorConfig {
    pub fn build(&self) -> Box<dyn Integrator> {
        match *self {
            IntegratorConfig::GeometryMask => Box::new(GeometryMask),
            IntegratorConfig::CameraMask => Box::new(CameraMask),
            IntegratorConfig::HitDistance { scale } => Box::new(HitDistance { scale }),
            IntegratorConfig::AmbientOcclusion { spp, ao_samples } => Box::new(AmbientOcclusion { spp, ao_samples }),
            IntegratorConfig::AoMotionBlur { spp, ao_samples } => Box::new(AoMotionBlur { spp, ao_samples }),
            IntegratorConfig::MotionBlur { samples, time_sampling } => Box::new(MotionBlur {
                samples,
                time_sampling,
            }),
            IntegratorConfig::DeformationShading { samples } => Box::new(DeformationShading { samples }),
        }
    }
}

fn default_width() -> u32 {
    960
}

fn default_height() -> u32 {
    540
}

fn default_ao_radius() -> f32 {
    1.4
}

/// Everything one render case needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderCaseConfig {
    pub name: String,
    pub meshes: Vec<MeshSource>,
    #[serde(default)]
    pub deformation: Option<DeformationConfig>,
    #[serde(default)]
    pub layout: InstanceLayout,
    pub output: PathBuf,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub camera: Camera,
    #[serde(default = "default_ao_radius")]
    pub ao_radius: f32,
    pub integrator: IntegratorConfig,
    #[serde(default)]
    pub any_hit: AnyHitPolicy,
    #[serde(default)]
    pub build_quality: BuildQuality,
    /// Worker threads; all cores when unset.
    #[serde(default)]
    pub threads: Option<usize>,
}

impl RenderCaseConfig {
    /// A case with default settings for everything but its essentials.
    pub fn new(name: impl Into<String>, meshes: Vec<MeshSource>, integrator: IntegratorConfig) -> Self {
        let name = name.into();
        Self {
            output: PathBuf::from("output").join(format!("{}.png", name)),
            name,
            meshes,
            deformation: None,
            layout: InstanceLayout::default(),
            width: default_width(),
            height: default_height(),
            camera: Camera::default(),
            ao_radius: default_ao_radius(),
            integrator,
            any_hit: AnyHitPolicy::default(),
            build_quality: BuildQuality::default(),
            threads: None,
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Replace the case's meshes with a file.
    pub fn with_mesh(mut self, path: impl Into<PathBuf>, material_dir: Option<PathBuf>) -> Self {
        self.meshes = vec![MeshSource::from_path(path, material_dir)];
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    fn with_layout(mut self, layout: InstanceLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Names accepted by [`preset`].
pub const PRESET_NAMES: [&str; 9] = [
    "geometry-debug",
    "geometry-debug-camera",
    "geometry-hit-distance",
    "scene-hit-distance",
    "scene-ao",
    "mb-sampling",
    "mb-slerp",
    "mb-ao-slerp-two-instances",
    "mb-deformation",
];

/// Three keyframes moving right and up from (-1, -1, 0).
fn moving_right(motion_steps: u32) -> InstanceLayout {
    InstanceLayout::OnePerMesh {
        start: Transform::from_translation(Vec3::new(-1.0, -1.0, 0.0)),
        motion_steps,
        trajectory: Trajectory::default(),
    }
}

/// Built-in render case `name`.
pub fn preset(name: &str) -> Result<RenderCaseConfig> {
    let sphere = || vec![MeshSource::sphere()];

    let config = match name {
        "geometry-debug" => RenderCaseConfig::new(name, vec![MeshSource::UnitTriangle], IntegratorConfig::GeometryMask),
        "geometry-debug-camera" => {
            RenderCaseConfig::new(name, vec![MeshSource::UnitTriangle], IntegratorConfig::CameraMask)
        }
        "geometry-hit-distance" => RenderCaseConfig::new(name, sphere(), IntegratorConfig::HitDistance { scale: 50.0 }),
        "scene-hit-distance" => RenderCaseConfig::new(name, sphere(), IntegratorConfig::HitDistance { scale: 15.0 }),
        "scene-ao" => {
            let mut config = RenderCaseConfig::new(
                name,
                vec![
                    MeshSource::sphere(),
                    MeshSource::Plane {
                        half_extent: 4.0,
                        height: -0.5,
                    },
                ],
                IntegratorConfig::AmbientOcclusion {
                    spp: 512,
                    ao_samples: 32,
                },
            );
            // Raised and tilted down onto the sphere resting on the plane
            config.camera = Camera::new()
                .with_translation(Vec3::new(0.0, 2.0, 4.8))
                .with_rotation(Quat::from_rotation_x(-0.4));
            config
        }
        "mb-sampling" => RenderCaseConfig::new(
            name,
            sphere(),
            IntegratorConfig::MotionBlur {
                samples: 3,
                time_sampling: TimeSampling::Stratified,
            },
        )
        .with_layout(moving_right(3)),
        "mb-slerp" => RenderCaseConfig::new(
            name,
            sphere(),
            IntegratorConfig::MotionBlur {
                samples: 512,
                time_sampling: TimeSampling::Random,
            },
        )
        .with_layout(moving_right(3)),
        "mb-ao-slerp-two-instances" => {
            let mut config = RenderCaseConfig::new(
                name,
                sphere(),
                IntegratorConfig::AoMotionBlur {
                    spp: 512,
                    ao_samples: 64,
                },
            )
            .with_layout(InstanceLayout::Explicit {
                instances: vec![
                    InstanceDesc::fixed(0, Transform::from_translation(Vec3::new(-1.0, 1.0, 0.0))),
                    InstanceDesc::moving(
                        0,
                        Transform::from_translation(Vec3::new(-1.0, -1.0, 0.0)),
                        2,
                        Trajectory::default(),
                    ),
                ],
            });
            config.ao_radius = 0.4;
            config
        }
        "mb-deformation" => {
            let mut config =
                RenderCaseConfig::new(name, sphere(), IntegratorConfig::DeformationShading { samples: 3 })
                    .with_layout(moving_right(3));
            config.deformation = Some(DeformationConfig {
                steps: 2,
                displacement: DEFAULT_DISPLACEMENT,
            });
            config
        }
        _ => return Err(RenderError::UnknownCase(name.to_string())),
    };
    Ok(config)
}

/// Run the case pipeline up to the shaded image.
///
/// Returns the image and the number of pixels whose primary rays hit.
pub fn render_case_image(render: &RenderContext, config: &RenderCaseConfig) -> Result<(ImageBuffer, u64)> {
    let mut meshes = Vec::new();
    for source in &config.meshes {
        meshes.extend(source.load()?);
    }
    if meshes.is_empty() {
        return Err(MeshError::NoShapes(config.name.clone()).into());
    }

    if matches!(config.integrator, IntegratorConfig::DeformationShading { .. }) {
        if let Some(mesh) = meshes.iter().find(|mesh| !mesh.has_vertex_normals()) {
            return Err(MeshError::MissingNormals {
                name: mesh.name().to_string(),
            }
            .into());
        }
    }

    if let Some(deformation) = config.deformation {
        for mesh in &mut meshes {
            mesh.deform(deformation.steps, deformation.displacement)?;
        }
    }

    let description = config.layout.describe(meshes);
    let table = Arc::new(GeometryTable::build(&description)?);
    let (frames, headers) = description.build_keyframes()?.into_parts();

    let geometries = description
        .meshes
        .iter()
        .map(|mesh| build_geometry(&GeometryBuildInput::for_mesh(mesh), config.build_quality).map(Arc::new))
        .collect::<Result<Vec<_>>>()?;

    let scene = build_scene(
        SceneBuildInput {
            geometries,
            instance_geometry: description.instances.iter().map(|i| i.geometry).collect(),
            frames,
            headers: Some(headers),
            masks: None,
        },
        config.build_quality,
    )?;

    let callbacks: Arc<dyn HitCallbacks> = Arc::new(DeformedMeshCallbacks::new(table.clone(), config.any_hit));
    let mut funcs = FuncTable::new(GEOMETRY_TYPE_COUNT, 1);
    for geom_type in 0..GEOMETRY_TYPE_COUNT {
        funcs.set(geom_type, 0, callbacks.clone())?;
    }

    let integrator = config.integrator.build();
    let ctx = ShadingContext {
        scene: &scene,
        funcs: &funcs,
        geometry: &table,
        camera: &config.camera,
        width: config.width,
        height: config.height,
        ao_radius: config.ao_radius,
    };
    render.dispatch(integrator.as_ref(), &ctx)
}

/// Render a case and write its PNG.
pub fn run_render_case(render: &RenderContext, config: &RenderCaseConfig) -> Result<RenderStats> {
    log::info!("Render case '{}'", config.name);
    let start = Instant::now();

    let (image, hit_pixels) = render_case_image(render, config)?;
    image.write_png(&config.output)?;

    let stats = RenderStats {
        name: config.name.clone(),
        width: config.width,
        height: config.height,
        elapsed: start.elapsed(),
        hit_pixels,
        output: Some(config.output.clone()),
    };
    log::info!(
        "Case '{}' finished in {:.2?}: {} of {} pixels hit",
        stats.name,
        stats.elapsed,
        stats.hit_pixels,
        stats.pixel_count()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_preset_resolves() {
        for name in PRESET_NAMES {
            let config = preset(name).unwrap();
            assert_eq!(config.name, name);
            assert_eq!(config.output, PathBuf::from("output").join(format!("{}.png", name)));
            assert_eq!((config.width, config.height), (960, 540));
        }
        assert!(matches!(preset("nope"), Err(RenderError::UnknownCase(_))));
    }

    #[test]
    fn test_preset_constants() {
        let ao = preset("mb-ao-slerp-two-instances").unwrap();
        assert_eq!(ao.ao_radius, 0.4);
        assert_eq!(
            ao.integrator,
            IntegratorConfig::AoMotionBlur {
                spp: 512,
                ao_samples: 64
            }
        );

        let scene_ao = preset("scene-ao").unwrap();
        assert_eq!(scene_ao.ao_radius, 1.4);
        assert_eq!(scene_ao.camera.translation, Vec3::new(0.0, 2.0, 4.8));

        let deformation = preset("mb-deformation").unwrap();
        assert_eq!(deformation.deformation.map(|d| d.steps), Some(2));
        assert_eq!(deformation.any_hit, AnyHitPolicy::AcceptAll);
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let json = r#"{
            "name": "tri",
            "meshes": [{"kind": "unit_triangle"}],
            "output": "out/tri.png",
            "integrator": {"kind": "motion_blur", "samples": 8}
        }"#;
        let config: RenderCaseConfig = serde_json::from_str(json).unwrap();

        assert_eq!((config.width, config.height), (960, 540));
        assert_eq!(config.camera, Camera::default());
        assert_eq!(config.layout, InstanceLayout::default());
        assert_eq!(config.build_quality, BuildQuality::PreferFastBuild);
        assert_eq!(
            config.integrator,
            IntegratorConfig::MotionBlur {
                samples: 8,
                time_sampling: TimeSampling::Stratified
            }
        );
    }

    #[test]
    fn test_config_file_round_trip() {
        let config = preset("mb-ao-slerp-two-instances").unwrap();
        let path = std::env::temp_dir().join("mbrt_case_test.json");
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = RenderCaseConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(&path);

        assert!(matches!(
            RenderCaseConfig::from_json_file(Path::new("/nonexistent/case.json")),
            Err(RenderError::Io(_))
        ));
    }

    #[test]
    fn test_explicit_layout_instances() {
        let layout = preset("mb-ao-slerp-two-instances").unwrap().layout;
        let scene = layout.describe(vec![unit_triangle().unwrap()]);

        assert_eq!(scene.instance_count(), 2);
        let keyframes = scene.build_keyframes().unwrap();
        assert_eq!(keyframes.frames().len(), 3);
    }

    #[test]
    fn test_deforming_mesh_without_normals_fails_before_render() {
        let path = std::env::temp_dir().join("mbrt_no_normals.obj");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();

        let mut config = RenderCaseConfig::new("no-normals", vec![], IntegratorConfig::GeometryMask)
            .with_mesh(&path, None)
            .with_resolution(4, 4);
        config.deformation = Some(DeformationConfig {
            steps: 2,
            displacement: 1.0,
        });

        let render = RenderContext::new(Some(1)).unwrap();
        assert!(matches!(
            render_case_image(&render, &config),
            Err(RenderError::Mesh(MeshError::MissingNormals { .. }))
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_deformation_shading_requires_vertex_normals() {
        let path = std::env::temp_dir().join("mbrt_shading_no_normals.obj");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();

        let config = RenderCaseConfig::new("shading-no-normals", vec![], IntegratorConfig::DeformationShading {
            samples: 1,
        })
        .with_mesh(&path, None)
        .with_resolution(4, 4);

        let render = RenderContext::new(Some(1)).unwrap();
        assert!(matches!(
            render_case_image(&render, &config),
            Err(RenderError::Mesh(MeshError::MissingNormals { .. }))
        ));
        let _ = std::fs::remove_file(&path);
    }
}
