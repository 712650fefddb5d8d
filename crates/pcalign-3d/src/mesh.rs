use crate::linalg::{add3, cross3, norm3, normalize3, scale3, sub3};
use crate::pointcloud::PointCloud;

/// Error types for the triangle mesh container.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MeshError {
    /// The mesh has no vertices.
    #[error("Mesh has no vertices")]
    NoVertices,

    /// The mesh has no faces.
    #[error("Mesh has no faces")]
    NoFaces,

    /// A face references a vertex that does not exist.
    #[error("Face {face} references vertex {vertex} but the mesh has {num_vertices} vertices")]
    InvalidIndex {
        /// Index of the offending face.
        face: usize,
        /// The out of range vertex index.
        vertex: usize,
        /// Number of vertices in the mesh.
        num_vertices: usize,
    },

    /// A vertex has a NaN or infinite coordinate.
    #[error("Vertex {0} has a non-finite coordinate")]
    NonFiniteVertex(usize),

    /// The vertex normals are not index-aligned with the vertices.
    #[error("Number of vertex normals ({normals}) does not match number of vertices ({vertices})")]
    NormalsMismatch {
        /// Number of vertices.
        vertices: usize,
        /// Number of normals.
        normals: usize,
    },
}

/// A triangle mesh with optional per-vertex normals.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    vertices: Vec<[f64; 3]>,
    faces: Vec<[usize; 3]>,
    vertex_normals: Option<Vec<[f64; 3]>>,
}

impl TriangleMesh {
    /// Create a new triangle mesh validating the vertices and face indices.
    pub fn new(
        vertices: Vec<[f64; 3]>,
        faces: Vec<[usize; 3]>,
        vertex_normals: Option<Vec<[f64; 3]>>,
    ) -> Result<Self, MeshError> {
        if vertices.is_empty() {
            return Err(MeshError::NoVertices);
        }
        if faces.is_empty() {
            return Err(MeshError::NoFaces);
        }

        if let Some(idx) = vertices
            .iter()
            .position(|v| v.iter().any(|c| !c.is_finite()))
        {
            return Err(MeshError::NonFiniteVertex(idx));
        }

        for (face_idx, face) in faces.iter().enumerate() {
            if let Some(&vertex) = face.iter().find(|&&v| v >= vertices.len()) {
                return Err(MeshError::InvalidIndex {
                    face: face_idx,
                    vertex,
                    num_vertices: vertices.len(),
                });
            }
        }

        if let Some(normals) = vertex_normals.as_ref() {
            if normals.len() != vertices.len() {
                return Err(MeshError::NormalsMismatch {
                    vertices: vertices.len(),
                    normals: normals.len(),
                });
            }
        }

        Ok(Self {
            vertices,
            faces,
            vertex_normals,
        })
    }

    /// The mesh vertices.
    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    /// The mesh faces as vertex index triplets.
    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    /// The per-vertex normals, if any.
    pub fn vertex_normals(&self) -> Option<&[[f64; 3]]> {
        self.vertex_normals.as_deref()
    }

    /// Number of faces.
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// The three corners of a face.
    #[inline]
    pub fn triangle(&self, face: usize) -> [[f64; 3]; 3] {
        let [a, b, c] = self.faces[face];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    /// Area of a face.
    pub fn face_area(&self, face: usize) -> f64 {
        let [a, b, c] = self.triangle(face);
        0.5 * norm3(&cross3(&sub3(&b, &a), &sub3(&c, &a)))
    }

    /// Unit normal of a face following the counter-clockwise winding.
    ///
    /// Degenerate faces yield `None`.
    pub fn face_normal(&self, face: usize) -> Option<[f64; 3]> {
        let [a, b, c] = self.triangle(face);
        normalize3(&cross3(&sub3(&b, &a), &sub3(&c, &a)))
    }

    /// Total surface area.
    pub fn area(&self) -> f64 {
        (0..self.faces.len()).map(|f| self.face_area(f)).sum()
    }

    /// Return a copy of the mesh with area-weighted vertex normals.
    ///
    /// Vertices not touched by any non-degenerate face get a zero normal.
    pub fn with_estimated_vertex_normals(&self) -> Self {
        let mut normals = vec![[0.0; 3]; self.vertices.len()];
        for face in 0..self.faces.len() {
            let [a, b, c] = self.triangle(face);
            // the cross product norm is twice the face area: it is the weight
            let weighted = cross3(&sub3(&b, &a), &sub3(&c, &a));
            for &v in self.faces[face].iter() {
                normals[v] = add3(&normals[v], &weighted);
            }
        }
        for n in normals.iter_mut() {
            *n = normalize3(n).unwrap_or([0.0; 3]);
        }

        Self {
            vertices: self.vertices.clone(),
            faces: self.faces.clone(),
            vertex_normals: Some(normals),
        }
    }

    /// The mesh vertices as a point cloud, carrying the vertex normals.
    pub fn to_point_cloud(&self) -> PointCloud {
        PointCloud::new(self.vertices.clone(), self.vertex_normals.clone())
    }

    /// Interpolate the vertex normals of a face at barycentric coordinates.
    ///
    /// Returns `None` when the mesh has no vertex normals or the result is degenerate.
    pub fn interpolate_normal(&self, face: usize, barycentric: &[f64; 3]) -> Option<[f64; 3]> {
        let normals = self.vertex_normals.as_ref()?;
        let [a, b, c] = self.faces[face];
        let n = add3(
            &add3(
                &scale3(&normals[a], barycentric[0]),
                &scale3(&normals[b], barycentric[1]),
            ),
            &scale3(&normals[c], barycentric[2]),
        );
        normalize3(&n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> Result<TriangleMesh, MeshError> {
        TriangleMesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            vec![[0, 1, 2], [0, 2, 3]],
            None,
        )
    }

    #[test]
    fn test_mesh_area_and_normals() -> Result<(), MeshError> {
        let mesh = unit_square()?;
        assert_eq!(mesh.num_faces(), 2);
        assert_relative_eq!(mesh.area(), 1.0);
        assert_eq!(mesh.face_normal(0), Some([0.0, 0.0, 1.0]));

        let mesh = mesh.with_estimated_vertex_normals();
        let normals = mesh.vertex_normals().unwrap();
        for n in normals {
            assert_relative_eq!(n[2], 1.0);
        }
        assert_eq!(
            mesh.interpolate_normal(1, &[0.2, 0.3, 0.5]),
            Some([0.0, 0.0, 1.0])
        );
        Ok(())
    }

    #[test]
    fn test_mesh_invalid() {
        assert_eq!(
            TriangleMesh::new(vec![], vec![[0, 1, 2]], None),
            Err(MeshError::NoVertices)
        );
        assert_eq!(
            TriangleMesh::new(vec![[0.0; 3]], vec![], None),
            Err(MeshError::NoFaces)
        );
        assert_eq!(
            TriangleMesh::new(vec![[0.0; 3]; 3], vec![[0, 1, 3]], None),
            Err(MeshError::InvalidIndex {
                face: 0,
                vertex: 3,
                num_vertices: 3
            })
        );
        assert_eq!(
            TriangleMesh::new(
                vec![[0.0; 3], [1.0, f64::NAN, 0.0], [0.0, 1.0, f64::INFINITY]],
                vec![[0, 1, 2]],
                None
            ),
            Err(MeshError::NonFiniteVertex(1))
        );
    }

    #[test]
    fn test_mesh_degenerate_face() -> Result<(), MeshError> {
        let mesh = TriangleMesh::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            vec![[0, 1, 2]],
            None,
        )?;
        assert_eq!(mesh.face_normal(0), None);
        assert_relative_eq!(mesh.face_area(0), 0.0);
        Ok(())
    }
}
