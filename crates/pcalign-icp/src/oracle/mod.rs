mod brute_force;
pub use brute_force::BruteForceOracle;

mod surface;
pub use surface::{closest_point_on_triangle, IndexedTriangle, MeshOracle};

mod kdtree;
pub use kdtree::KdTreeOracle;

/// Result of a closest point query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    /// The closest point on the target.
    pub point: [f64; 3],
    /// The target normal at `point`, if the target carries normals.
    pub normal: Option<[f64; 3]>,
    /// Index of the matched target point, or of the matched triangle for meshes.
    pub index: usize,
    /// Squared Euclidean distance between the query and `point`.
    pub distance_sq: f64,
}

/// Answers nearest point queries against a fixed target.
///
/// Implementations must return the globally nearest point and be deterministic
/// for identical inputs. Queries are issued from several threads at once.
pub trait ClosestPointOracle: Sync {
    /// Find the point of the target closest to `query`.
    fn closest_point(&self, query: &[f64; 3]) -> ClosestPoint;
}

impl<O: ClosestPointOracle + ?Sized> ClosestPointOracle for &O {
    fn closest_point(&self, query: &[f64; 3]) -> ClosestPoint {
        (**self).closest_point(query)
    }
}

impl<O: ClosestPointOracle + ?Sized> ClosestPointOracle for Box<O> {
    fn closest_point(&self, query: &[f64; 3]) -> ClosestPoint {
        (**self).closest_point(query)
    }
}
