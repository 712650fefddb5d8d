use std::io::BufRead;
use std::path::Path;

use crate::mesh::TriangleMesh;

/// Error types for the OBJ module.
#[derive(Debug, thiserror::Error)]
pub enum ObjError {
    /// Failed to read OBJ file
    #[error("Failed to read OBJ file")]
    Io(#[from] std::io::Error),

    /// A line cannot be parsed
    #[error("Invalid OBJ line {line}: {content}")]
    InvalidLine {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// A face references a vertex or a normal that does not exist
    #[error("Invalid vertex reference {index} on line {line}")]
    InvalidIndex {
        /// 1-based line number.
        line: usize,
        /// The raw index as written in the file.
        index: i64,
    },
}

/// Geometry decoded from an OBJ file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ObjData {
    /// Vertex positions (`v` lines).
    pub vertices: Vec<[f64; 3]>,
    /// Triangles (`f` lines), polygons are fan triangulated.
    pub faces: Vec<[usize; 3]>,
    /// Per-vertex normals, present when every face corner references a `vn`.
    pub vertex_normals: Option<Vec<[f64; 3]>>,
}

// resolve a 1-based or negative OBJ reference against `count` entries
fn resolve_index(raw: i64, count: usize, line: usize) -> Result<usize, ObjError> {
    let count = count as i64;
    match raw {
        r if r > 0 && r <= count => Ok((r - 1) as usize),
        r if r < 0 && -r <= count => Ok((count + r) as usize),
        _ => Err(ObjError::InvalidIndex { line, index: raw }),
    }
}

fn parse_triplet<'a>(
    mut tokens: impl Iterator<Item = &'a str>,
    invalid: impl Fn() -> ObjError,
) -> Result<[f64; 3], ObjError> {
    let mut coords = [0.0; 3];
    for c in coords.iter_mut() {
        *c = tokens
            .next()
            .and_then(|t| t.parse::<f64>().ok())
            .ok_or_else(&invalid)?;
    }
    Ok(coords)
}

/// Parse Wavefront OBJ content from a reader.
///
/// Only `v`, `vn` and `f` statements are used; texture coordinates and groups
/// are ignored. Negative indices are resolved relative to the entries read so
/// far. Normals referenced by face corners are attached to the corner vertex,
/// the last reference wins.
pub fn parse_obj<R: BufRead>(reader: R) -> Result<ObjData, ObjError> {
    let mut data = ObjData::default();
    let mut normals = Vec::new();
    // normal index of each face corner, in face order
    let mut corner_normals = Vec::new();

    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = line_idx + 1;
        let invalid = || ObjError::InvalidLine {
            line: line_no,
            content: line.clone(),
        };

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => data.vertices.push(parse_triplet(tokens, invalid)?),
            Some("vn") => normals.push(parse_triplet(tokens, invalid)?),
            Some("f") => {
                let mut polygon = Vec::new();
                for token in tokens {
                    // `v`, `v/vt`, `v//vn` or `v/vt/vn`
                    let mut fields = token.split('/');
                    let raw = fields
                        .next()
                        .and_then(|t| t.parse::<i64>().ok())
                        .ok_or_else(invalid)?;
                    let vertex = resolve_index(raw, data.vertices.len(), line_no)?;
                    let normal = match fields.nth(1).filter(|t| !t.is_empty()) {
                        Some(t) => {
                            let raw = t.parse::<i64>().map_err(|_| invalid())?;
                            Some(resolve_index(raw, normals.len(), line_no)?)
                        }
                        None => None,
                    };
                    polygon.push((vertex, normal));
                }
                if polygon.len() < 3 {
                    return Err(invalid());
                }
                for pair in polygon[1..].windows(2) {
                    let corners = [polygon[0], pair[0], pair[1]];
                    data.faces.push(corners.map(|(v, _)| v));
                    corner_normals.extend(corners);
                }
            }
            _ => {}
        }
    }

    if !corner_normals.is_empty() && corner_normals.iter().all(|(_, n)| n.is_some()) {
        let mut vertex_normals = vec![[0.0; 3]; data.vertices.len()];
        for (vertex, normal) in corner_normals {
            if let Some(normal) = normal {
                vertex_normals[vertex] = normals[normal];
            }
        }
        data.vertex_normals = Some(vertex_normals);
    }

    Ok(data)
}

/// Read the vertices and faces of a Wavefront OBJ file.
pub fn read_obj(path: impl AsRef<Path>) -> Result<ObjData, ObjError> {
    let file = std::fs::File::open(path)?;
    let data = parse_obj(std::io::BufReader::new(file))?;
    log::debug!(
        "Read OBJ with {} vertices and {} triangles",
        data.vertices.len(),
        data.faces.len()
    );
    Ok(data)
}

/// Read a Wavefront OBJ file as a triangle mesh.
///
/// The mesh carries vertex normals when the faces reference `vn` entries.
pub fn read_obj_mesh(path: impl AsRef<Path>) -> Result<TriangleMesh, crate::io::IoError> {
    let data = read_obj(path)?;
    Ok(TriangleMesh::new(
        data.vertices,
        data.faces,
        data.vertex_normals,
    )?)
}
