use kiddo::immutable::float::kdtree::ImmutableKdTree;
use pcalign_3d::pointcloud::PointCloud;

use super::{ClosestPoint, ClosestPointOracle};
use crate::error::IcpError;

/// Nearest neighbour oracle over a point cloud backed by a k-d tree.
pub struct KdTreeOracle {
    tree: ImmutableKdTree<f64, u32, 3, 32>,
    target: PointCloud,
}

impl KdTreeOracle {
    /// Build the k-d tree over the target points.
    ///
    /// # Errors
    ///
    /// Returns [`IcpError::EmptyTarget`] if the point cloud is empty.
    pub fn new(target: &PointCloud) -> Result<Self, IcpError> {
        if target.is_empty() {
            return Err(IcpError::EmptyTarget);
        }
        if target.len() > u32::MAX as usize {
            return Err(IcpError::InvalidInput(format!(
                "target has {} points, at most {} are supported",
                target.len(),
                u32::MAX
            )));
        }

        let tree: ImmutableKdTree<f64, u32, 3, 32> =
            ImmutableKdTree::new_from_slice(target.points());
        log::debug!("Built k-d tree over {} target points", target.len());

        Ok(Self {
            tree,
            target: target.clone(),
        })
    }

    /// The indexed point cloud.
    pub fn target(&self) -> &PointCloud {
        &self.target
    }
}

impl ClosestPointOracle for KdTreeOracle {
    fn closest_point(&self, query: &[f64; 3]) -> ClosestPoint {
        let nn = self.tree.nearest_one::<kiddo::SquaredEuclidean>(query);
        let index = nn.item as usize;
        ClosestPoint {
            point: self.target.points()[index],
            normal: self.target.normals().map(|n| n[index]),
            index,
            distance_sq: nn.distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::BruteForceOracle;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_kdtree_matches_brute_force() -> Result<(), IcpError> {
        let mut rng = StdRng::seed_from_u64(5);
        let points = (0..500)
            .map(|_| [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()])
            .collect::<Vec<_>>();
        let target = PointCloud::new(points, None);

        let kdtree = KdTreeOracle::new(&target)?;
        let brute = BruteForceOracle::from_point_cloud(&target)?;

        for _ in 0..200 {
            let q = [
                rng.random::<f64>() * 1.4 - 0.2,
                rng.random::<f64>() * 1.4 - 0.2,
                rng.random::<f64>() * 1.4 - 0.2,
            ];
            let a = kdtree.closest_point(&q);
            let b = brute.closest_point(&q);
            assert_relative_eq!(a.distance_sq, b.distance_sq, epsilon = 1e-12);
            assert_eq!(a.point, target.points()[a.index]);
        }
        Ok(())
    }

    #[test]
    fn test_kdtree_returns_normals() -> Result<(), IcpError> {
        let target = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            Some(vec![[0.0, 0.0, 1.0], [0.0, 1.0, 0.0]]),
        );
        let oracle = KdTreeOracle::new(&target)?;
        let closest = oracle.closest_point(&[0.9, 0.1, 0.0]);
        assert_eq!(closest.index, 1);
        assert_eq!(closest.normal, Some([0.0, 1.0, 0.0]));
        assert_relative_eq!(closest.distance_sq, 0.02, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_kdtree_empty_target() {
        let target = PointCloud::new(vec![], None);
        assert!(matches!(
            KdTreeOracle::new(&target),
            Err(IcpError::EmptyTarget)
        ));
    }
}
