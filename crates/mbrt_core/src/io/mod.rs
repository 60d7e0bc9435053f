//! Mesh file readers.
//!
//! - OBJ through `tobj`, one [`TriangleMesh`] per shape
//! - STL (ASCII or binary), first solid only

mod obj;
mod stl;

pub use obj::{load_obj, load_obj_from_str};
pub use stl::{load_stl, parse_stl};

use std::path::Path;

use crate::mesh::{MeshError, MeshResult, TriangleMesh};

/// Load a mesh file, picking the reader from the file extension.
///
/// `material_dir` is only used by OBJ files; it defaults to the directory
/// holding the mesh.
pub fn load_mesh(path: impl AsRef<Path>, material_dir: Option<&Path>) -> MeshResult<Vec<TriangleMesh>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "obj" => load_obj(path, material_dir),
        "stl" => Ok(vec![load_stl(path)?]),
        _ => Err(MeshError::UnsupportedFormat(path.display().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_extension_rejected() {
        let result = load_mesh("scene.usda", None);
        assert!(matches!(result, Err(MeshError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_mesh("definitely/not/here.stl", None);
        assert!(matches!(result, Err(MeshError::Io(_))));
    }
}
