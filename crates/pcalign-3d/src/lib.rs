#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// I/O utilities for reading and writing 3D data.
pub mod io;

/// Linear algebra utilities.
pub mod linalg;

/// Triangle mesh container.
pub mod mesh;

/// Point cloud container.
pub mod pointcloud;

/// Surface sampling and point cloud filtering.
pub mod sampling;

/// 3D transforms algorithms.
pub mod transforms;
