use std::path::Path;

use mbrt_math::Vec3;

use crate::mesh::{MeshError, MeshResult, TriangleMesh};

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

struct Facet {
    normal: Vec3,
    corners: [Vec3; 3],
}

/// Load the first solid of an STL file.
pub fn load_stl(path: impl AsRef<Path>) -> MeshResult<TriangleMesh> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stl".to_string());
    parse_stl(&bytes, &name)
}

/// Parse STL bytes, ASCII or binary.
///
/// Every facet becomes one triangle with its own three vertices; positions
/// are kept verbatim and the facet normal is used as the vertex normal of
/// all three corners.
pub fn parse_stl(bytes: &[u8], name: &str) -> MeshResult<TriangleMesh> {
    let facets = if is_binary(bytes) {
        parse_binary(bytes)
    } else if bytes.trim_ascii_start().starts_with(b"solid") {
        parse_ascii(bytes)?
    } else {
        return Err(MeshError::Stl("neither ASCII nor binary STL".to_string()));
    };

    log::info!("STL '{}': {} facets", name, facets.len());

    let mut positions = Vec::with_capacity(facets.len() * 3);
    let mut normals = Vec::with_capacity(facets.len() * 3);
    let mut indices = Vec::with_capacity(facets.len());

    for facet in facets {
        let [a, b, c] = facet.corners;
        let normal = facet
            .normal
            .try_normalize()
            .or_else(|| (b - a).cross(c - a).try_normalize())
            .unwrap_or(Vec3::Z);

        let base = positions.len() as u32;
        positions.extend_from_slice(&facet.corners);
        normals.extend_from_slice(&[normal; 3]);
        indices.push([base, base + 1, base + 2]);
    }

    TriangleMesh::new(name, positions, indices, Some(normals))
}

/// Binary files announce their facet count right after the header, and the
/// file length must agree with it. ASCII files that happen to start with
/// "solid" fail that check.
fn is_binary(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_LEN + 4 {
        return false;
    }
    let count = read_u32(bytes, HEADER_LEN) as usize;
    bytes.len() == HEADER_LEN + 4 + count * FACET_LEN
}

fn parse_binary(bytes: &[u8]) -> Vec<Facet> {
    bytes[HEADER_LEN + 4..]
        .chunks_exact(FACET_LEN)
        .map(|record| Facet {
            normal: read_vec3(record, 0),
            corners: [read_vec3(record, 12), read_vec3(record, 24), read_vec3(record, 36)],
        })
        .collect()
}

fn parse_ascii(bytes: &[u8]) -> MeshResult<Vec<Facet>> {
    let text = std::str::from_utf8(bytes).map_err(|e| MeshError::Stl(e.to_string()))?;

    let mut facets = Vec::new();
    let mut normal = Vec3::ZERO;
    let mut corners = Vec::with_capacity(3);

    for (line_no, line) in text.lines().enumerate() {
        let line_no = line_no + 1;
        let mut words = line.split_whitespace();
        match words.next() {
            Some("facet") => {
                if words.next() != Some("normal") {
                    return Err(stl_error(line_no, "expected 'facet normal'"));
                }
                normal = parse_vec3(&mut words, line_no)?;
                corners.clear();
            }
            Some("vertex") => {
                if corners.len() == 3 {
                    return Err(stl_error(line_no, "more than three vertices in facet"));
                }
                corners.push(parse_vec3(&mut words, line_no)?);
            }
            Some("endfacet") => {
                let corners: [Vec3; 3] = corners
                    .as_slice()
                    .try_into()
                    .map_err(|_| stl_error(line_no, "facet needs exactly three vertices"))?;
                facets.push(Facet { normal, corners });
            }
            // Only the first solid is read
            Some("endsolid") => break,
            _ => {}
        }
    }

    Ok(facets)
}

fn parse_vec3<'a>(words: &mut impl Iterator<Item = &'a str>, line_no: usize) -> MeshResult<Vec3> {
    let mut v = [0.0f32; 3];
    for component in &mut v {
        let word = words
            .next()
            .ok_or_else(|| stl_error(line_no, "expected three numbers"))?;
        *component = word
            .parse()
            .map_err(|_| stl_error(line_no, &format!("invalid number '{}'", word)))?;
    }
    Ok(Vec3::from_array(v))
}

fn stl_error(line: usize, message: &str) -> MeshError {
    MeshError::Stl(format!("line {}: {}", line, message))
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_vec3(bytes: &[u8], offset: usize) -> Vec3 {
    let f = |i: usize| f32::from_bits(read_u32(bytes, offset + 4 * i));
    Vec3::new(f(0), f(1), f(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII: &str = "\
solid pyramid
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 0 1 0
    endloop
  endfacet
  facet normal 0 0 0
    outer loop
      vertex 0 0 0
      vertex 0 1 0
      vertex 0 0 1
    endloop
  endfacet
endsolid pyramid
solid ignored
  facet normal 0 0 1
    outer loop
      vertex 5 5 5
      vertex 6 5 5
      vertex 5 6 5
    endloop
  endfacet
endsolid ignored
";

    fn binary(facets: &[[f32; 12]]) -> Vec<u8> {
        let mut bytes = vec![b' '; HEADER_LEN];
        bytes[..5].copy_from_slice(b"solid");
        bytes.extend_from_slice(&(facets.len() as u32).to_le_bytes());
        for facet in facets {
            for value in facet {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            bytes.extend_from_slice(&0u16.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_ascii_first_solid_only() {
        let mesh = parse_stl(ASCII.as_bytes(), "pyramid").unwrap();

        assert_eq!(mesh.unique_triangle_count(), 2);
        assert_eq!(mesh.unique_vertex_count(), 6);
        assert_eq!(mesh.vertices()[1], Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_zero_facet_normal_falls_back_to_geometry() {
        let mesh = parse_stl(ASCII.as_bytes(), "pyramid").unwrap();
        let normals = mesh.vertex_normals().unwrap();

        // (0,0,0), (0,1,0), (0,0,1) winds towards +X
        assert!((normals[3] - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn test_binary_even_with_solid_header() {
        let bytes = binary(&[[0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 0.0]]);
        let mesh = parse_stl(&bytes, "binary").unwrap();

        assert_eq!(mesh.unique_triangle_count(), 1);
        assert_eq!(mesh.vertices()[1], Vec3::new(2.0, 0.0, 0.0));
        assert!((mesh.triangle_normals()[0] - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_bad_vertex_reports_line() {
        let source = "solid x\nfacet normal 0 0 1\nvertex 0 0\n";
        let err = parse_stl(source.as_bytes(), "x").unwrap_err();
        assert!(err.to_string().contains("line 3"), "{}", err);
    }

    #[test]
    fn test_empty_solid_is_an_error() {
        let result = parse_stl(b"solid empty\nendsolid empty\n", "empty");
        assert!(matches!(result, Err(MeshError::Empty(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(parse_stl(b"hello", "junk"), Err(MeshError::Stl(_))));
    }
}
