#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::IcpError;

/// Closest point queries against a point cloud or a triangle mesh.
pub mod oracle;

/// Correspondence search with distance, normal and trimming rejection.
pub mod correspondence;

/// Closed form rigid transform estimation from correspondences.
pub mod estimator;

/// Human readable output of transforms.
pub mod format;

mod icp;
pub use icp::*;

/// Mesh and point cloud registration entry points, and the Chamfer distance.
pub mod pipeline;

mod svd;

mod transform;
pub use transform::RigidTransform;
