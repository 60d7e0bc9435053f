use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use mbrt_math::Vec3;

use crate::mesh::{MeshError, MeshResult, TriangleMesh};

fn load_options() -> tobj::LoadOptions {
    // single_index deduplicates corners by their (position, normal, uv) triple
    tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

/// Load every shape of an OBJ file as its own mesh.
///
/// Material libraries are resolved against `material_dir`, or the OBJ's own
/// directory when none is given. A missing material library is logged and
/// otherwise ignored; meshes carry no material data.
pub fn load_obj(path: impl AsRef<Path>, material_dir: Option<&Path>) -> MeshResult<Vec<TriangleMesh>> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let material_dir: PathBuf = material_dir
        .or_else(|| path.parent())
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let (models, materials) = tobj::load_obj_buf(&mut reader, &load_options(), |mtl| {
        tobj::load_mtl(material_dir.join(mtl))
    })?;

    match materials {
        Ok(materials) => log::debug!("{}: {} materials", path.display(), materials.len()),
        Err(e) => log::warn!("{}: material library not loaded ({})", path.display(), e),
    }

    meshes_from_models(models, &path.display().to_string())
}

/// Parse OBJ text; `mtllib` statements are ignored.
pub fn load_obj_from_str(source: &str) -> MeshResult<Vec<TriangleMesh>> {
    let mut reader = source.as_bytes();
    let (models, _) = tobj::load_obj_buf(&mut reader, &load_options(), |_| {
        Err(tobj::LoadError::OpenFileFailed)
    })?;
    meshes_from_models(models, "<memory>")
}

fn meshes_from_models(models: Vec<tobj::Model>, source: &str) -> MeshResult<Vec<TriangleMesh>> {
    let mut meshes = Vec::with_capacity(models.len());

    for model in models {
        let mesh = model.mesh;
        if mesh.indices.is_empty() {
            log::warn!("{}: skipping empty shape '{}'", source, model.name);
            continue;
        }

        let positions = to_vec3(&mesh.positions);
        let normals = (!mesh.normals.is_empty()).then(|| to_vec3(&mesh.normals));
        let indices = mesh
            .indices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();

        let mesh = TriangleMesh::new(model.name, positions, indices, normals)?;
        log::info!(
            "{}: shape '{}' with {} vertices, {} triangles",
            source,
            mesh.name(),
            mesh.unique_vertex_count(),
            mesh.unique_triangle_count()
        );
        meshes.push(mesh);
    }

    if meshes.is_empty() {
        return Err(MeshError::NoShapes(source.to_string()));
    }
    Ok(meshes)
}

fn to_vec3(flat: &[f32]) -> Vec<Vec3> {
    flat.chunks_exact(3).map(Vec3::from_slice).collect()
}
