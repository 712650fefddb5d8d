use std::io::{BufRead, Read};
use std::path::Path;

use super::PcdError;
use crate::pointcloud::PointCloud;

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;

/// Encoding of the PCD body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PcdEncoding {
    /// Whitespace separated text, one point per line.
    Ascii,
    /// Packed little endian records.
    Binary,
}

/// A single field in a PCD point record.
#[derive(Debug, Clone, PartialEq)]
struct PcdField {
    name: String,
    size: usize,
    count: usize,
    // 'F' = float, 'U' = unsigned int, 'I' = signed int
    kind: char,
}

/// Layout of a PCD file as declared by its header.
#[derive(Debug)]
pub(crate) struct PcdLayout {
    fields: Vec<PcdField>,
    num_points: usize,
    encoding: PcdEncoding,
}

impl PcdLayout {
    /// Offset of a field in values (ascii) and in bytes (binary).
    fn offsets(&self, name: &str) -> Option<(usize, usize)> {
        let mut value_offset = 0;
        let mut byte_offset = 0;
        for field in self.fields.iter() {
            if field.name == name {
                return Some((value_offset, byte_offset));
            }
            value_offset += field.count;
            byte_offset += field.size * field.count;
        }
        None
    }

    fn point_step(&self) -> usize {
        self.fields.iter().map(|f| f.size * f.count).sum()
    }

    fn values_per_point(&self) -> usize {
        self.fields.iter().map(|f| f.count).sum()
    }

    fn field(&self, name: &str) -> Option<&PcdField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub(crate) fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, PcdError> {
    let mut names: Vec<String> = Vec::new();
    let mut sizes = Vec::new();
    let mut types = Vec::new();
    let mut counts = Vec::new();
    let mut num_points = None;
    let mut width_height = None;

    let parse_usize = |v: &str| v.parse::<usize>().map_err(|_| PcdError::MalformedHeader);

    let encoding = loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(PcdError::MalformedHeader);
        }
        let mut it = line.split_whitespace();
        match it.next() {
            Some("DATA") => match it.next() {
                Some("ascii") => break PcdEncoding::Ascii,
                Some("binary") => break PcdEncoding::Binary,
                Some(other) => return Err(PcdError::UnsupportedEncoding(other.to_string())),
                None => return Err(PcdError::MalformedHeader),
            },
            Some("FIELDS") => names = it.map(String::from).collect(),
            Some("SIZE") => sizes = it.map(parse_usize).collect::<Result<Vec<_>, _>>()?,
            Some("COUNT") => counts = it.map(parse_usize).collect::<Result<Vec<_>, _>>()?,
            Some("TYPE") => {
                types = it
                    .map(|v| v.chars().next().ok_or(PcdError::MalformedHeader))
                    .collect::<Result<Vec<_>, _>>()?
            }
            Some("POINTS") => {
                num_points = Some(parse_usize(it.next().ok_or(PcdError::MalformedHeader)?)?)
            }
            Some("WIDTH") => {
                let w = parse_usize(it.next().ok_or(PcdError::MalformedHeader)?)?;
                width_height = Some(width_height.map_or(w, |h: usize| h * w));
            }
            Some("HEIGHT") => {
                let h = parse_usize(it.next().ok_or(PcdError::MalformedHeader)?)?;
                width_height = Some(width_height.map_or(h, |w: usize| h * w));
            }
            // comments, VERSION and VIEWPOINT do not affect the layout
            _ => {}
        }
    };

    if names.is_empty()
        || sizes.len() != names.len()
        || types.len() != names.len()
        || (!counts.is_empty() && counts.len() != names.len())
    {
        return Err(PcdError::MalformedHeader);
    }

    let fields = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| PcdField {
            name,
            size: sizes[i],
            // if COUNT is omitted every field has a single element
            count: counts.get(i).copied().unwrap_or(1),
            kind: types[i],
        })
        .collect::<Vec<_>>();

    let layout = PcdLayout {
        fields,
        num_points: num_points.or(width_height).ok_or(PcdError::MalformedHeader)?,
        encoding,
    };

    if layout.point_step() == 0 || layout.point_step() > MAX_POINT_STEP {
        return Err(PcdError::MalformedHeader);
    }
    if layout.num_points > MAX_POINTS {
        return Err(PcdError::MalformedHeader);
    }

    Ok(layout)
}

/// Decode one binary value of a field as f64.
fn decode_value(field: &PcdField, bytes: &[u8]) -> Result<f64, PcdError> {
    macro_rules! le {
        ($t:ty) => {{
            let mut buf = [0u8; std::mem::size_of::<$t>()];
            buf.copy_from_slice(bytes);
            <$t>::from_le_bytes(buf) as f64
        }};
    }
    Ok(match (field.kind, field.size) {
        ('F', 4) => le!(f32),
        ('F', 8) => le!(f64),
        ('U', 1) => le!(u8),
        ('U', 2) => le!(u16),
        ('U', 4) => le!(u32),
        ('I', 1) => le!(i8),
        ('I', 2) => le!(i16),
        ('I', 4) => le!(i32),
        _ => return Err(PcdError::UnsupportedProperty(field.name.clone())),
    })
}

/// Read a PCD file in `ascii` or `binary` encoding.
///
/// # Arguments
/// * `path` - Path to a `.pcd` file.
///
/// # Returns
/// A [`PointCloud`] with the `x y z` positions and, when all three are present,
/// the `normal_x normal_y normal_z` (or `nx ny nz`) normals.
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let layout = parse_pcd_layout(&mut reader)?;

    for name in ["x", "y", "z"] {
        let field = layout.field(name).ok_or(PcdError::MissingField(name))?;
        if field.kind != 'F' || field.count != 1 {
            return Err(PcdError::UnsupportedProperty(name.to_string()));
        }
    }
    let position_fields = ["x", "y", "z"];
    let normal_fields = if layout.field("normal_x").is_some() {
        ["normal_x", "normal_y", "normal_z"]
    } else {
        ["nx", "ny", "nz"]
    };
    let has_normals = normal_fields.iter().all(|n| layout.field(n).is_some());

    let offsets_of = |names: [&str; 3]| -> Option<[(usize, usize); 3]> {
        Some([
            layout.offsets(names[0])?,
            layout.offsets(names[1])?,
            layout.offsets(names[2])?,
        ])
    };
    let position_offsets = offsets_of(position_fields).ok_or(PcdError::MissingField("x"))?;
    let normal_offsets = if has_normals {
        offsets_of(normal_fields)
    } else {
        None
    };

    let mut points = Vec::with_capacity(layout.num_points);
    let mut normals = Vec::with_capacity(if has_normals { layout.num_points } else { 0 });

    match layout.encoding {
        PcdEncoding::Ascii => {
            let mut body = String::new();
            reader.read_to_string(&mut body)?;
            let mut lines = body.lines().filter(|l| !l.trim().is_empty());
            for _ in 0..layout.num_points {
                let line = lines.next().ok_or(PcdError::Truncated)?;
                let values = line
                    .split_whitespace()
                    .map(|v| v.parse::<f64>().map_err(|_| PcdError::InvalidValue(v.to_string())))
                    .collect::<Result<Vec<_>, _>>()?;
                if values.len() != layout.values_per_point() {
                    return Err(PcdError::Truncated);
                }
                let pick = |offsets: &[(usize, usize); 3]| {
                    [values[offsets[0].0], values[offsets[1].0], values[offsets[2].0]]
                };
                points.push(pick(&position_offsets));
                if let Some(offsets) = normal_offsets.as_ref() {
                    normals.push(pick(offsets));
                }
            }
        }
        PcdEncoding::Binary => {
            let mut buffer = vec![0u8; layout.point_step()];
            let decode = |buffer: &[u8], name: &str, offset: usize| -> Result<f64, PcdError> {
                let field = layout.field(name).ok_or(PcdError::MissingField("x"))?;
                let bytes = buffer
                    .get(offset..offset + field.size)
                    .ok_or(PcdError::Truncated)?;
                decode_value(field, bytes)
            };
            for _ in 0..layout.num_points {
                reader.read_exact(&mut buffer).map_err(|e| match e.kind() {
                    std::io::ErrorKind::UnexpectedEof => PcdError::Truncated,
                    _ => PcdError::Io(e),
                })?;
                let mut p = [0.0; 3];
                for k in 0..3 {
                    p[k] = decode(&buffer, position_fields[k], position_offsets[k].1)?;
                }
                points.push(p);
                if let Some(offsets) = normal_offsets.as_ref() {
                    let mut n = [0.0; 3];
                    for k in 0..3 {
                        n[k] = decode(&buffer, normal_fields[k], offsets[k].1)?;
                    }
                    normals.push(n);
                }
            }
        }
    }

    log::debug!(
        "Read PCD with {} points (normals: {})",
        points.len(),
        has_normals
    );

    Ok(PointCloud::new(points, has_normals.then_some(normals)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn parses_valid_binary_header() -> Result<(), PcdError> {
        let data = b"# .PCD v0.7\nVERSION 0.7\nFIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nCOUNT 1 1 1\nWIDTH 10\nHEIGHT 1\nPOINTS 10\nDATA binary\n";
        let mut reader = Cursor::new(&data[..]);
        let layout = parse_pcd_layout(&mut reader)?;
        assert_eq!(layout.num_points, 10);
        assert_eq!(layout.encoding, PcdEncoding::Binary);
        assert_eq!(layout.point_step(), 12);
        assert_eq!(layout.offsets("z"), Some((2, 8)));
        Ok(())
    }

    #[test]
    fn rejects_compressed() {
        let data = b"FIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nPOINTS 1\nDATA binary_compressed\n";
        let mut reader = Cursor::new(&data[..]);
        assert!(matches!(
            parse_pcd_layout(&mut reader),
            Err(PcdError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn reads_ascii_with_normals() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        let content = "FIELDS x y z rgb normal_x normal_y normal_z\nSIZE 4 4 4 4 4 4 4\nTYPE F F F U F F F\nCOUNT 1 1 1 1 1 1 1\nWIDTH 2\nHEIGHT 1\nPOINTS 2\nDATA ascii\n1 2 3 0 0 0 1\n4 5 6 0 1 0 0\n";
        file.write_all(content.as_bytes())?;

        let cloud = read_pcd(file.path())?;
        assert_eq!(cloud.points(), &[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(
            cloud.normals().map(|n| n.to_vec()),
            Some(vec![[0.0, 0.0, 1.0], [1.0, 0.0, 0.0]])
        );
        Ok(())
    }

    #[test]
    fn reads_binary_xyz() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        let header = "FIELDS x y z intensity\nSIZE 4 4 4 2\nTYPE F F F U\nCOUNT 1 1 1 1\nPOINTS 2\nDATA binary\n";
        file.write_all(header.as_bytes())?;
        let mut data = Vec::new();
        for p in [[1.0f32, 2.0, 3.0], [-1.0, 0.5, 0.25]] {
            for c in p {
                data.extend_from_slice(&c.to_le_bytes());
            }
            data.extend_from_slice(&7u16.to_le_bytes());
        }
        file.write_all(&data)?;

        let cloud = read_pcd(file.path())?;
        assert_eq!(cloud.points(), &[[1.0, 2.0, 3.0], [-1.0, 0.5, 0.25]]);
        assert!(cloud.normals().is_none());
        Ok(())
    }

    #[test]
    fn fails_on_truncated_binary() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        let header = "FIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nPOINTS 2\nDATA binary\n";
        file.write_all(header.as_bytes())?;
        file.write_all(&1.0f32.to_le_bytes())?;
        assert!(matches!(read_pcd(file.path()), Err(PcdError::Truncated)));
        Ok(())
    }
}
