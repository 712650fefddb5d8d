use crate::transform::RigidTransform;

/// Error types for the ICP module.
#[derive(Debug, thiserror::Error)]
pub enum IcpError {
    /// The moving point set has no points.
    #[error("Source point set is empty")]
    EmptySource,

    /// The target point set or surface has nothing to match against.
    #[error("Target point set or surface is empty")]
    EmptyTarget,

    /// The input geometry is malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A parameter is out of its valid range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Every candidate correspondence was rejected or trimmed away.
    #[error("No correspondence survived the rejection of {candidates} candidates")]
    NoCorrespondences {
        /// Number of queried source points.
        candidates: usize,
    },

    /// The correspondence geometry does not determine a rigid transform.
    #[error("Degenerate correspondences: {0}")]
    Degenerate(String),

    /// An iteration failed; the transform accumulated so far is kept for inspection.
    #[error("ICP failed at iteration {iteration}: {source}")]
    Failed {
        /// Zero-based index of the failing iteration.
        iteration: usize,
        /// Transform accumulated before the failing iteration.
        transform: RigidTransform,
        /// The underlying correspondence or estimation error.
        source: Box<IcpError>,
    },

    /// Error while reading geometry.
    #[error(transparent)]
    Io(#[from] pcalign_3d::io::IoError),

    /// Error while sampling or filtering the source.
    #[error(transparent)]
    Sampling(#[from] pcalign_3d::sampling::SamplingError),

    /// Invalid point cloud.
    #[error(transparent)]
    PointCloud(#[from] pcalign_3d::pointcloud::PointCloudError),

    /// Invalid triangle mesh.
    #[error(transparent)]
    Mesh(#[from] pcalign_3d::mesh::MeshError),
}
