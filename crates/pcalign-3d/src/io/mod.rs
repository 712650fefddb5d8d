use std::path::Path;

use crate::mesh::{MeshError, TriangleMesh};
use crate::pointcloud::{PointCloud, PointCloudError};

/// Wavefront OBJ reader.
pub mod obj;

/// Point Cloud Library PCD reader.
pub mod pcd;

/// Stanford PLY reader and writer.
pub mod ply;

/// Error types for reading geometry from disk.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Error from the PLY reader
    #[error(transparent)]
    Ply(#[from] ply::PlyError),

    /// Error from the OBJ reader
    #[error(transparent)]
    Obj(#[from] obj::ObjError),

    /// Error from the PCD reader
    #[error(transparent)]
    Pcd(#[from] pcd::PcdError),

    /// The decoded mesh is not valid
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// The decoded point cloud is not valid
    #[error(transparent)]
    PointCloud(#[from] PointCloudError),

    /// The file extension does not match a known format
    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),
}

/// A geometry read from disk.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// A triangle mesh.
    Mesh(TriangleMesh),
    /// A point cloud without connectivity.
    Cloud(PointCloud),
}

impl Geometry {
    /// Number of vertices or points.
    pub fn num_points(&self) -> usize {
        match self {
            Geometry::Mesh(mesh) => mesh.vertices().len(),
            Geometry::Cloud(cloud) => cloud.len(),
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Read a mesh or a point cloud, dispatching on the file extension.
///
/// `.ply` files with at least one face and all `.obj` files are returned as
/// meshes, `.pcd` files and PLY files without faces as point clouds.
pub fn read_geometry(path: impl AsRef<Path>) -> Result<Geometry, IoError> {
    let path = path.as_ref();
    match extension(path).as_str() {
        "ply" => {
            let data = ply::read_ply(path)?;
            if data.faces.is_empty() {
                let cloud = PointCloud::try_new(data.vertices, data.normals)?;
                Ok(Geometry::Cloud(cloud))
            } else {
                let mesh = TriangleMesh::new(data.vertices, data.faces, data.normals)?;
                Ok(Geometry::Mesh(mesh))
            }
        }
        "obj" => Ok(Geometry::Mesh(obj::read_obj_mesh(path)?)),
        "pcd" => {
            let (points, normals) = pcd::read_pcd(path)?.into_parts();
            Ok(Geometry::Cloud(PointCloud::try_new(points, normals)?))
        }
        other => Err(IoError::UnsupportedExtension(other.to_string())),
    }
}

/// Read a triangle mesh from a `.ply` or `.obj` file.
pub fn read_mesh(path: impl AsRef<Path>) -> Result<TriangleMesh, IoError> {
    let path = path.as_ref();
    match extension(path).as_str() {
        "ply" => ply::read_ply_mesh(path),
        "obj" => obj::read_obj_mesh(path),
        other => Err(IoError::UnsupportedExtension(other.to_string())),
    }
}

/// Read the points of any supported file; mesh faces are dropped.
pub fn read_point_cloud(path: impl AsRef<Path>) -> Result<PointCloud, IoError> {
    match read_geometry(path)? {
        Geometry::Mesh(mesh) => Ok(mesh.to_point_cloud()),
        Geometry::Cloud(cloud) => Ok(cloud),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_geometry_dispatch() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;

        let obj_path = dir.path().join("tri.OBJ");
        std::fs::File::create(&obj_path)?.write_all(b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n")?;
        assert!(matches!(read_geometry(&obj_path)?, Geometry::Mesh(_)));

        let ply_path = dir.path().join("cloud.ply");
        ply::write_ply_ascii(&ply_path, &PointCloud::new(vec![[1.0, 2.0, 3.0]], None))?;
        let geometry = read_geometry(&ply_path)?;
        assert!(matches!(geometry, Geometry::Cloud(_)));
        assert_eq!(geometry.num_points(), 1);

        assert!(read_mesh(&ply_path).is_err());
        assert_eq!(read_point_cloud(&obj_path)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            read_geometry("cloud.xyz"),
            Err(IoError::UnsupportedExtension(ext)) if ext == "xyz"
        ));
    }

    #[test]
    fn test_rejects_non_finite_points() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nan.pcd");
        std::fs::File::create(&path)?.write_all(
            b"FIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nPOINTS 1\nDATA ascii\nnan 0 0\n",
        )?;
        assert!(matches!(
            read_geometry(&path),
            Err(IoError::PointCloud(PointCloudError::NonFinitePoint(0)))
        ));
        Ok(())
    }

    #[test]
    fn test_rejects_non_finite_mesh_vertices() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;

        let obj_path = dir.path().join("nan.obj");
        std::fs::File::create(&obj_path)?
            .write_all(b"v 0 0 0\nv 1 0 0\nv 0 nan 0\nf 1 2 3\n")?;
        assert!(matches!(
            read_geometry(&obj_path),
            Err(IoError::Mesh(MeshError::NonFiniteVertex(2)))
        ));

        let ply_path = dir.path().join("nan.ply");
        std::fs::File::create(&ply_path)?.write_all(
            b"ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\nproperty float z\nelement face 1\nproperty list uchar int vertex_indices\nend_header\nnan 0 0\n1 0 0\n0 1 0\n3 0 1 2\n",
        )?;
        assert!(matches!(
            read_geometry(&ply_path),
            Err(IoError::Mesh(MeshError::NonFiniteVertex(0)))
        ));
        assert!(matches!(
            read_mesh(&ply_path),
            Err(IoError::Mesh(MeshError::NonFiniteVertex(0)))
        ));
        Ok(())
    }
}
