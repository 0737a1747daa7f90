#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use graspose_3d as g3d;

/// Estimator configuration loaded from JSON.
pub mod config;

/// Staged pose estimation of point cloud segments.
pub mod estimator;

/// Grasp prediction interface and grasp result files.
pub mod grasp;
