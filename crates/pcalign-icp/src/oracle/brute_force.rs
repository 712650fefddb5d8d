use pcalign_3d::linalg::distance_sq3;
use pcalign_3d::mesh::TriangleMesh;
use pcalign_3d::pointcloud::PointCloud;

use super::{closest_point_on_triangle, ClosestPoint, ClosestPointOracle};
use crate::error::IcpError;

enum Target {
    Points(PointCloud),
    Mesh(TriangleMesh),
}

/// Oracle scanning every target point or triangle.
///
/// Linear in the target size per query; meant as a reference for the indexed
/// oracles and for very small targets.
pub struct BruteForceOracle {
    target: Target,
}

impl BruteForceOracle {
    /// Scan the points of a point cloud.
    pub fn from_point_cloud(target: &PointCloud) -> Result<Self, IcpError> {
        if target.is_empty() {
            return Err(IcpError::EmptyTarget);
        }
        Ok(Self {
            target: Target::Points(target.clone()),
        })
    }

    /// Scan the triangles of a mesh.
    pub fn from_mesh(target: &TriangleMesh) -> Result<Self, IcpError> {
        if target.num_faces() == 0 {
            return Err(IcpError::EmptyTarget);
        }
        Ok(Self {
            target: Target::Mesh(target.clone()),
        })
    }
}

impl ClosestPointOracle for BruteForceOracle {
    fn closest_point(&self, query: &[f64; 3]) -> ClosestPoint {
        match &self.target {
            Target::Points(cloud) => {
                let mut best = (0, distance_sq3(query, &cloud.points()[0]));
                for (idx, p) in cloud.points().iter().enumerate().skip(1) {
                    let d = distance_sq3(query, p);
                    // strict comparison keeps the lowest index on ties
                    if d < best.1 {
                        best = (idx, d);
                    }
                }
                let (index, distance_sq) = best;
                ClosestPoint {
                    point: cloud.points()[index],
                    normal: cloud.normals().map(|n| n[index]),
                    index,
                    distance_sq,
                }
            }
            Target::Mesh(mesh) => {
                let mut best: Option<(usize, [f64; 3], [f64; 3], f64)> = None;
                for face in 0..mesh.num_faces() {
                    let [a, b, c] = mesh.triangle(face);
                    let (point, barycentric) = closest_point_on_triangle(query, &a, &b, &c);
                    let d = distance_sq3(query, &point);
                    if best.map_or(true, |(_, _, _, best_d)| d < best_d) {
                        best = Some((face, point, barycentric, d));
                    }
                }
                let (index, point, barycentric, distance_sq) =
                    best.unwrap_or((0, [f64::NAN; 3], [0.0; 3], f64::INFINITY));
                ClosestPoint {
                    point,
                    normal: mesh
                        .interpolate_normal(index, &barycentric)
                        .or_else(|| mesh.face_normal(index)),
                    index,
                    distance_sq,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ties_resolve_to_lowest_index() -> Result<(), IcpError> {
        let target = PointCloud::new(vec![[1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]], None);
        let oracle = BruteForceOracle::from_point_cloud(&target)?;
        let closest = oracle.closest_point(&[0.0, 0.0, 0.0]);
        assert_eq!(closest.index, 0);
        assert_eq!(closest.distance_sq, 1.0);
        Ok(())
    }

    #[test]
    fn test_mesh_scan() -> Result<(), Box<dyn std::error::Error>> {
        let mesh = TriangleMesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 5.0],
                [1.0, 0.0, 5.0],
                [0.0, 1.0, 5.0],
            ],
            vec![[0, 1, 2], [3, 4, 5]],
            None,
        )?;
        let oracle = BruteForceOracle::from_mesh(&mesh)?;
        let closest = oracle.closest_point(&[0.1, 0.1, 4.0]);
        assert_eq!(closest.index, 1);
        assert_relative_eq!(closest.point[2], 5.0, epsilon = 1e-12);
        assert_relative_eq!(closest.distance_sq, 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_empty_targets() {
        let empty = PointCloud::new(vec![], None);
        assert!(matches!(
            BruteForceOracle::from_point_cloud(&empty),
            Err(IcpError::EmptyTarget)
        ));
    }
}
