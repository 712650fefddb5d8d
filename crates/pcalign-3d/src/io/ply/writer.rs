use std::io::Write;
use std::path::Path;

use super::PlyError;
use crate::pointcloud::PointCloud;

/// Write a point cloud as an ASCII PLY file with double precision coordinates.
///
/// Normals are written as `nx ny nz` when the point cloud has them.
pub fn write_ply_ascii(path: impl AsRef<Path>, pointcloud: &PointCloud) -> Result<(), PlyError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", pointcloud.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(writer, "property double {axis}")?;
    }
    if pointcloud.normals().is_some() {
        for axis in ["nx", "ny", "nz"] {
            writeln!(writer, "property double {axis}")?;
        }
    }
    writeln!(writer, "end_header")?;

    match pointcloud.normals() {
        Some(normals) => {
            for (p, n) in pointcloud.points().iter().zip(normals.iter()) {
                writeln!(
                    writer,
                    "{} {} {} {} {} {}",
                    p[0], p[1], p[2], n[0], n[1], n[2]
                )?;
            }
        }
        None => {
            for p in pointcloud.points() {
                writeln!(writer, "{} {} {}", p[0], p[1], p[2])?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}
