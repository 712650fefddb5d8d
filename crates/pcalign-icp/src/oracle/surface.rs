use pcalign_3d::linalg::{add3, distance_sq3, dot3, scale3, sub3};
use pcalign_3d::mesh::TriangleMesh;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use super::{ClosestPoint, ClosestPointOracle};
use crate::error::IcpError;

/// A mesh face stored in the R-tree.
#[derive(Debug, Clone)]
pub struct IndexedTriangle {
    /// Index of the face in the mesh.
    pub face: usize,
    /// Corner positions of the face.
    pub corners: [[f64; 3]; 3],
}

impl RTreeObject for IndexedTriangle {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        let [a, b, c] = &self.corners;
        let mut min = *a;
        let mut max = *a;
        for corner in [b, c] {
            for k in 0..3 {
                min[k] = min[k].min(corner[k]);
                max[k] = max[k].max(corner[k]);
            }
        }
        AABB::from_corners(min, max)
    }
}

impl PointDistance for IndexedTriangle {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let [a, b, c] = &self.corners;
        let (closest, _) = closest_point_on_triangle(point, a, b, c);
        distance_sq3(point, &closest)
    }
}

/// Closest point oracle over the surface of a triangle mesh.
///
/// The faces are bulk loaded into an R-tree and queried by nearest neighbour,
/// so the result is the exact closest point on the surface: inside a face, on
/// an edge or at a vertex. Faces at the same distance resolve to the lowest
/// face index.
pub struct MeshOracle {
    mesh: TriangleMesh,
    tree: RTree<IndexedTriangle>,
}

impl MeshOracle {
    /// Index the faces of `mesh`.
    ///
    /// # Errors
    ///
    /// Returns [`IcpError::EmptyTarget`] if the mesh has no faces.
    pub fn new(mesh: &TriangleMesh) -> Result<Self, IcpError> {
        if mesh.num_faces() == 0 {
            return Err(IcpError::EmptyTarget);
        }

        let triangles = (0..mesh.num_faces())
            .map(|face| IndexedTriangle {
                face,
                corners: mesh.triangle(face),
            })
            .collect::<Vec<_>>();
        let tree = RTree::bulk_load(triangles);

        log::debug!("Built R-tree over {} triangles", tree.size());

        Ok(Self {
            mesh: mesh.clone(),
            tree,
        })
    }

    /// The indexed mesh.
    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }
}

impl ClosestPointOracle for MeshOracle {
    fn closest_point(&self, query: &[f64; 3]) -> ClosestPoint {
        let mut hits = self
            .tree
            .nearest_neighbor_iter(query)
            .map(|triangle| (triangle, triangle.distance_2(query)));
        let Some((first, best_distance_sq)) = hits.next() else {
            return ClosestPoint {
                point: [f64::NAN; 3],
                normal: None,
                index: 0,
                distance_sq: f64::INFINITY,
            };
        };

        // hits come by non-decreasing distance, keep the lowest face among ties
        let best = hits
            .take_while(|(_, d)| *d == best_distance_sq)
            .fold(first, |best, (triangle, _)| {
                if triangle.face < best.face {
                    triangle
                } else {
                    best
                }
            });

        let [a, b, c] = &best.corners;
        let (point, barycentric) = closest_point_on_triangle(query, a, b, c);
        let normal = self
            .mesh
            .interpolate_normal(best.face, &barycentric)
            .or_else(|| self.mesh.face_normal(best.face));

        ClosestPoint {
            point,
            normal,
            index: best.face,
            distance_sq: best_distance_sq,
        }
    }
}

// closest point on the segment [a, b] and its parameter along it
fn closest_point_on_segment(p: &[f64; 3], a: &[f64; 3], b: &[f64; 3]) -> ([f64; 3], f64) {
    let ab = sub3(b, a);
    let len_sq = dot3(&ab, &ab);
    if len_sq <= 0.0 {
        return (*a, 0.0);
    }
    let t = (dot3(&sub3(p, a), &ab) / len_sq).clamp(0.0, 1.0);
    (add3(a, &scale3(&ab, t)), t)
}

/// Closest point to `p` on the triangle `(a, b, c)`.
///
/// Classifies `p` against the Voronoi regions of the vertices, edges and face
/// of the triangle. Returns the point and its barycentric coordinates with
/// respect to `(a, b, c)`. Degenerate triangles fall back to the closest point
/// on their edges.
pub fn closest_point_on_triangle(
    p: &[f64; 3],
    a: &[f64; 3],
    b: &[f64; 3],
    c: &[f64; 3],
) -> ([f64; 3], [f64; 3]) {
    let ab = sub3(b, a);
    let ac = sub3(c, a);

    // vertex region a
    let ap = sub3(p, a);
    let d1 = dot3(&ab, &ap);
    let d2 = dot3(&ac, &ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (*a, [1.0, 0.0, 0.0]);
    }

    // vertex region b
    let bp = sub3(p, b);
    let d3 = dot3(&ab, &bp);
    let d4 = dot3(&ac, &bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (*b, [0.0, 1.0, 0.0]);
    }

    // edge region ab
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (add3(a, &scale3(&ab, v)), [1.0 - v, v, 0.0]);
    }

    // vertex region c
    let cp = sub3(p, c);
    let d5 = dot3(&ab, &cp);
    let d6 = dot3(&ac, &cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (*c, [0.0, 0.0, 1.0]);
    }

    // edge region ac
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (add3(a, &scale3(&ac, w)), [1.0 - w, 0.0, w]);
    }

    // edge region bc
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (add3(b, &scale3(&sub3(c, b), w)), [0.0, 1.0 - w, w]);
    }

    let denom = va + vb + vc;
    if denom.abs() <= f64::EPSILON * (dot3(&ab, &ab) * dot3(&ac, &ac)) {
        // zero area: the closest point lies on one of the edges
        let candidates = [
            closest_point_on_segment(p, a, b),
            closest_point_on_segment(p, a, c),
            closest_point_on_segment(p, b, c),
        ];
        let barycentrics = [
            [1.0 - candidates[0].1, candidates[0].1, 0.0],
            [1.0 - candidates[1].1, 0.0, candidates[1].1],
            [0.0, 1.0 - candidates[2].1, candidates[2].1],
        ];
        let best = (0..3)
            .min_by(|&i, &j| {
                distance_sq3(p, &candidates[i].0).total_cmp(&distance_sq3(p, &candidates[j].0))
            })
            .unwrap_or(0);
        return (candidates[best].0, barycentrics[best]);
    }

    // face region
    let v = vb / denom;
    let w = vc / denom;
    (
        add3(&add3(a, &scale3(&ab, v)), &scale3(&ac, w)),
        [1.0 - v - w, v, w],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::BruteForceOracle;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn sphere_mesh(rings: usize, segments: usize) -> Result<TriangleMesh, Box<dyn std::error::Error>> {
        let mut vertices = vec![[0.0, 0.0, 1.0]];
        for i in 1..rings {
            let theta = std::f64::consts::PI * i as f64 / rings as f64;
            for j in 0..segments {
                let phi = 2.0 * std::f64::consts::PI * j as f64 / segments as f64;
                vertices.push([theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos()]);
            }
        }
        vertices.push([0.0, 0.0, -1.0]);
        let south = vertices.len() - 1;

        let ring = |i: usize, j: usize| 1 + (i - 1) * segments + j % segments;
        let mut faces = Vec::new();
        for j in 0..segments {
            faces.push([0, ring(1, j), ring(1, j + 1)]);
            faces.push([south, ring(rings - 1, j + 1), ring(rings - 1, j)]);
        }
        for i in 1..rings - 1 {
            for j in 0..segments {
                faces.push([ring(i, j), ring(i + 1, j), ring(i + 1, j + 1)]);
                faces.push([ring(i, j), ring(i + 1, j + 1), ring(i, j + 1)]);
            }
        }
        Ok(TriangleMesh::new(vertices, faces, None)?)
    }

    #[test]
    fn test_closest_point_on_triangle_regions() {
        let a = [0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        let c = [0.0, 1.0, 0.0];

        // face interior
        let (p, bary) = closest_point_on_triangle(&[0.25, 0.25, 2.0], &a, &b, &c);
        assert_eq!(p, [0.25, 0.25, 0.0]);
        assert_relative_eq!(bary[0], 0.5);
        assert_relative_eq!(bary[1], 0.25);
        assert_relative_eq!(bary[2], 0.25);

        // vertex regions
        assert_eq!(closest_point_on_triangle(&[-1.0, -1.0, 0.5], &a, &b, &c).0, a);
        assert_eq!(closest_point_on_triangle(&[2.0, -0.5, 0.0], &a, &b, &c).0, b);
        assert_eq!(closest_point_on_triangle(&[-0.5, 3.0, 0.0], &a, &b, &c).0, c);

        // edge regions
        let (p, _) = closest_point_on_triangle(&[0.5, -1.0, 0.0], &a, &b, &c);
        assert_eq!(p, [0.5, 0.0, 0.0]);
        let (p, bary) = closest_point_on_triangle(&[1.0, 1.0, 0.0], &a, &b, &c);
        assert_relative_eq!(p[0], 0.5);
        assert_relative_eq!(p[1], 0.5);
        assert_relative_eq!(bary[1], 0.5);
        assert_relative_eq!(bary[2], 0.5);
    }

    #[test]
    fn test_closest_point_degenerate_triangle() {
        let a = [0.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        let c = [2.0, 0.0, 0.0];
        let (p, _) = closest_point_on_triangle(&[1.5, 1.0, 0.0], &a, &b, &c);
        assert_relative_eq!(p[0], 1.5);
        assert_relative_eq!(p[1], 0.0);
        assert!(p.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_rtree_matches_brute_force() -> Result<(), Box<dyn std::error::Error>> {
        let mesh = sphere_mesh(12, 24)?;
        let oracle = MeshOracle::new(&mesh)?;
        let brute = BruteForceOracle::from_mesh(&mesh)?;

        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..300 {
            let q = [
                rng.random::<f64>() * 3.0 - 1.5,
                rng.random::<f64>() * 3.0 - 1.5,
                rng.random::<f64>() * 3.0 - 1.5,
            ];
            let a = oracle.closest_point(&q);
            let b = brute.closest_point(&q);
            assert_relative_eq!(a.distance_sq, b.distance_sq, epsilon = 1e-12);
            assert_eq!(a.index, b.index);
            for k in 0..3 {
                assert_relative_eq!(a.point[k], b.point[k], epsilon = 1e-9);
            }
            assert!(a.normal.is_some());
        }
        Ok(())
    }

    #[test]
    fn test_mesh_oracle_normals() -> Result<(), Box<dyn std::error::Error>> {
        let mesh = TriangleMesh::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0, 1, 2]],
            None,
        )?;
        let oracle = MeshOracle::new(&mesh)?;
        let closest = oracle.closest_point(&[0.2, 0.2, -3.0]);
        assert_eq!(closest.index, 0);
        assert_eq!(closest.normal, Some([0.0, 0.0, 1.0]));
        assert_relative_eq!(closest.distance_sq, 9.0, epsilon = 1e-12);

        let smooth = mesh.with_estimated_vertex_normals();
        let oracle = MeshOracle::new(&smooth)?;
        let normal = oracle
            .closest_point(&[0.2, 0.2, 1.0])
            .normal
            .ok_or("missing normal")?;
        assert_relative_eq!(normal[2], 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_shared_vertex_resolves_to_lowest_face() -> Result<(), Box<dyn std::error::Error>> {
        // four faces around the origin, listed in reverse
        let mesh = TriangleMesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [-1.0, 0.0, 0.0],
                [0.0, -1.0, 0.0],
            ],
            vec![[0, 4, 1], [0, 3, 4], [0, 2, 3], [0, 1, 2]],
            None,
        )?;
        let oracle = MeshOracle::new(&mesh)?;
        let closest = oracle.closest_point(&[0.0, 0.0, 2.0]);
        assert_eq!(closest.index, 0);
        assert_eq!(closest.point, [0.0, 0.0, 0.0]);
        assert_relative_eq!(closest.distance_sq, 4.0);
        Ok(())
    }

    #[test]
    fn test_envelope_bounds_corners() {
        let triangle = IndexedTriangle {
            face: 3,
            corners: [[1.0, -2.0, 0.5], [0.0, 4.0, 0.5], [2.0, 1.0, -1.0]],
        };
        let envelope = triangle.envelope();
        assert_eq!(envelope.lower(), [0.0, -2.0, -1.0]);
        assert_eq!(envelope.upper(), [2.0, 4.0, 0.5]);
        assert_eq!(triangle.distance_2(&[1.0, -2.0, 0.5]), 0.0);
        assert_relative_eq!(triangle.distance_2(&[1.0, -3.0, 0.5]), 1.0);
    }
}
