use std::io::{BufRead, Read};
use std::path::Path;

use super::{
    properties::{PlyDataType, PlyElement, PlyFormat, PlyPropertyDefinition, PlyPropertyKind},
    PlyError,
};
use crate::mesh::TriangleMesh;
use crate::pointcloud::PointCloud;

/// Parsed PLY header.
#[derive(Debug, PartialEq)]
pub struct PlyHeader {
    /// Body encoding.
    pub format: PlyFormat,
    /// Elements in file order.
    pub elements: Vec<PlyElement>,
}

/// Geometry decoded from a PLY file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlyData {
    /// Vertex positions.
    pub vertices: Vec<[f64; 3]>,
    /// Vertex normals if the file has `nx ny nz`.
    pub normals: Option<Vec<[f64; 3]>>,
    /// Triangles, polygons are fan triangulated.
    pub faces: Vec<[usize; 3]>,
}

/// Parse the header of a PLY file up to and including `end_header`.
pub fn parse_header<R: BufRead>(reader: &mut R) -> Result<PlyHeader, PlyError> {
    let mut line = String::new();
    let mut format = None;
    let mut elements: Vec<PlyElement> = Vec::new();

    reader.read_line(&mut line)?;
    if line.trim() != "ply" {
        return Err(PlyError::MalformedHeader("missing magic number".into()));
    }

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PlyError::MalformedHeader("missing end_header".into()));
        }
        let parts = line.split_whitespace().collect::<Vec<_>>();

        match parts.as_slice() {
            ["end_header"] => break,
            ["format", kind, _version] => {
                format = Some(match *kind {
                    "ascii" => PlyFormat::Ascii,
                    "binary_little_endian" => PlyFormat::BinaryLittleEndian,
                    "binary_big_endian" => PlyFormat::BinaryBigEndian,
                    _ => return Err(PlyError::MalformedHeader(format!("format {kind}"))),
                });
            }
            ["element", name, count] => {
                let count = count
                    .parse()
                    .map_err(|_| PlyError::MalformedHeader(format!("element count {count}")))?;
                elements.push(PlyElement {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            ["property", "list", count, item, name] => {
                let element = elements.last_mut().ok_or_else(|| {
                    PlyError::MalformedHeader("property before element".into())
                })?;
                element.properties.push(PlyPropertyDefinition {
                    name: name.to_string(),
                    kind: PlyPropertyKind::List {
                        count: PlyDataType::parse(count)?,
                        item: PlyDataType::parse(item)?,
                    },
                });
            }
            ["property", data_type, name] => {
                let element = elements.last_mut().ok_or_else(|| {
                    PlyError::MalformedHeader("property before element".into())
                })?;
                element.properties.push(PlyPropertyDefinition {
                    name: name.to_string(),
                    kind: PlyPropertyKind::Scalar(PlyDataType::parse(data_type)?),
                });
            }
            ["comment", ..] | ["obj_info", ..] | [] => {}
            _ => return Err(PlyError::MalformedHeader(line.trim().to_string())),
        }
    }

    let format = format.ok_or_else(|| PlyError::MalformedHeader("missing format".into()))?;
    Ok(PlyHeader { format, elements })
}

/// Source of scalar values for the body, independent of its encoding.
trait ValueReader {
    fn read_value(&mut self, data_type: PlyDataType) -> Result<f64, PlyError>;
}

struct AsciiReader<'a> {
    tokens: std::str::SplitWhitespace<'a>,
}

impl ValueReader for AsciiReader<'_> {
    fn read_value(&mut self, _data_type: PlyDataType) -> Result<f64, PlyError> {
        let token = self
            .tokens
            .next()
            .ok_or_else(|| PlyError::InvalidValue("unexpected end of data".into()))?;
        token
            .parse::<f64>()
            .map_err(|_| PlyError::InvalidValue(token.to_string()))
    }
}

struct BinaryReader<R: Read> {
    reader: R,
    format: PlyFormat,
    buffer: [u8; 8],
}

impl<R: Read> ValueReader for BinaryReader<R> {
    fn read_value(&mut self, data_type: PlyDataType) -> Result<f64, PlyError> {
        let bytes = &mut self.buffer[..data_type.size()];
        self.reader.read_exact(bytes)?;
        Ok(data_type.decode(bytes, self.format))
    }
}

fn read_body<V: ValueReader>(header: &PlyHeader, values: &mut V) -> Result<PlyData, PlyError> {
    let mut data = PlyData::default();
    let mut record = Vec::new();
    let mut list = Vec::new();

    for element in header.elements.iter() {
        let is_vertex = element.name == "vertex";
        let is_face = element.name == "face";

        let xyz = if is_vertex {
            Some([
                element.property_index("x").ok_or(PlyError::MissingProperty("x"))?,
                element.property_index("y").ok_or(PlyError::MissingProperty("y"))?,
                element.property_index("z").ok_or(PlyError::MissingProperty("z"))?,
            ])
        } else {
            None
        };
        let normal_idx = match (
            element.property_index("nx"),
            element.property_index("ny"),
            element.property_index("nz"),
        ) {
            (Some(nx), Some(ny), Some(nz)) if is_vertex => Some([nx, ny, nz]),
            _ => None,
        };
        let face_idx = if is_face {
            element
                .property_index("vertex_indices")
                .or_else(|| element.property_index("vertex_index"))
        } else {
            None
        };

        let mut normals = Vec::new();
        for _ in 0..element.count {
            record.clear();
            for (prop_idx, prop) in element.properties.iter().enumerate() {
                match prop.kind {
                    PlyPropertyKind::Scalar(data_type) => {
                        record.push(values.read_value(data_type)?);
                    }
                    PlyPropertyKind::List { count, item } => {
                        let n = values.read_value(count)?;
                        if n < 0.0 {
                            return Err(PlyError::InvalidValue(format!("list length {n}")));
                        }
                        list.clear();
                        for _ in 0..n as usize {
                            list.push(values.read_value(item)?);
                        }
                        // keeps record indices aligned with property indices
                        record.push(n);
                        if Some(prop_idx) == face_idx {
                            triangulate_fan(&list, &mut data.faces)?;
                        }
                    }
                }
            }

            if let Some([x, y, z]) = xyz {
                data.vertices.push([record[x], record[y], record[z]]);
            }
            if let Some([nx, ny, nz]) = normal_idx {
                normals.push([record[nx], record[ny], record[nz]]);
            }
        }

        if normal_idx.is_some() {
            data.normals = Some(normals);
        }
    }

    Ok(data)
}

fn triangulate_fan(indices: &[f64], faces: &mut Vec<[usize; 3]>) -> Result<(), PlyError> {
    let as_index = |v: f64| -> Result<usize, PlyError> {
        if v < 0.0 || v.fract() != 0.0 {
            return Err(PlyError::InvalidValue(format!("vertex index {v}")));
        }
        Ok(v as usize)
    };
    if indices.len() < 3 {
        return Ok(());
    }
    let first = as_index(indices[0])?;
    for pair in indices[1..].windows(2) {
        faces.push([first, as_index(pair[0])?, as_index(pair[1])?]);
    }
    Ok(())
}

/// Read the vertices, normals and faces of a PLY file.
///
/// Supports `ascii`, `binary_little_endian` and `binary_big_endian` bodies.
/// Elements other than `vertex` and `face` are parsed and skipped.
pub fn read_ply(path: impl AsRef<Path>) -> Result<PlyData, PlyError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let header = parse_header(&mut reader)?;

    let data = match header.format {
        PlyFormat::Ascii => {
            let mut body = String::new();
            reader.read_to_string(&mut body)?;
            read_body(
                &header,
                &mut AsciiReader {
                    tokens: body.split_whitespace(),
                },
            )?
        }
        PlyFormat::BinaryLittleEndian | PlyFormat::BinaryBigEndian => read_body(
            &header,
            &mut BinaryReader {
                reader,
                format: header.format,
                buffer: [0u8; 8],
            },
        )?,
    };

    log::debug!(
        "Read PLY with {} vertices and {} triangles",
        data.vertices.len(),
        data.faces.len()
    );

    Ok(data)
}

/// Read a PLY file as a point cloud, ignoring the faces.
pub fn read_ply_point_cloud(path: impl AsRef<Path>) -> Result<PointCloud, PlyError> {
    let data = read_ply(path)?;
    Ok(PointCloud::new(data.vertices, data.normals))
}

/// Read a PLY file as a triangle mesh.
pub fn read_ply_mesh(path: impl AsRef<Path>) -> Result<TriangleMesh, crate::io::IoError> {
    let data = read_ply(path)?;
    Ok(TriangleMesh::new(data.vertices, data.faces, data.normals)?)
}
