/// Error types for the point cloud container.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PointCloudError {
    /// The normals are not index-aligned with the points.
    #[error("Number of normals ({normals}) does not match number of points ({points})")]
    NormalsMismatch {
        /// Number of points.
        points: usize,
        /// Number of normals.
        normals: usize,
    },

    /// A point has a NaN or infinite coordinate.
    #[error("Point {0} has a non-finite coordinate")]
    NonFinitePoint(usize),
}

/// An ordered set of 3D points with optional per-point normals.
///
/// The container is immutable once built: transformed copies are produced as
/// new buffers and the original positions are never touched.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The normals of the points, index-aligned with `points`.
    normals: Option<Vec<[f64; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points and normals (optional).
    ///
    /// PRECONDITION: if present, `normals` has the same length as `points`.
    pub fn new(points: Vec<[f64; 3]>, normals: Option<Vec<[f64; 3]>>) -> Self {
        debug_assert!(normals.as_ref().map_or(true, |n| n.len() == points.len()));
        Self { points, normals }
    }

    /// Create a new point cloud validating its content.
    ///
    /// Fails when the normals are not index-aligned or a point is not finite.
    pub fn try_new(
        points: Vec<[f64; 3]>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Result<Self, PointCloudError> {
        if let Some(normals) = normals.as_ref() {
            if normals.len() != points.len() {
                return Err(PointCloudError::NormalsMismatch {
                    points: points.len(),
                    normals: normals.len(),
                });
            }
        }

        if let Some(idx) = points
            .iter()
            .position(|p| p.iter().any(|v| !v.is_finite()))
        {
            return Err(PointCloudError::NonFinitePoint(idx));
        }

        Ok(Self { points, normals })
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    /// Return a new point cloud with the points at the given indices.
    ///
    /// PRECONDITION: every index is in range.
    pub fn select(&self, indices: &[usize]) -> Self {
        let points = indices.iter().map(|&i| self.points[i]).collect();
        let normals = self
            .normals
            .as_ref()
            .map(|n| indices.iter().map(|&i| n[i]).collect());
        Self { points, normals }
    }

    /// Consume the point cloud returning its points and normals.
    pub fn into_parts(self) -> (Vec<[f64; 3]>, Option<Vec<[f64; 3]>>) {
        (self.points, self.normals)
    }
}
