#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Facing, normal and third axis selection for bounding boxes.
pub mod axes;

/// I/O utilities for reading and writing point cloud arrays.
pub mod io;

/// Linear algebra utilities.
pub mod linalg;

/// Surface normal estimation.
pub mod normals;

/// Oriented bounding boxes.
pub mod obb;

/// Operations on 3D data processing.
pub mod ops;

/// Point cloud types.
pub mod pointcloud;

/// Rigid 6D pose frames.
pub mod pose;

/// Camera to world frame transforms.
pub mod transforms;
