use std::num::NonZeroUsize;

use glam::DVec3;
use kiddo::{immutable::float::kdtree::ImmutableKdTree, SquaredEuclidean};
use serde::{Deserialize, Serialize};

use crate::{linalg::symmetric_eigen3, ops::mean_and_covariance};

/// Error types for the normal estimation module.
#[derive(Debug, thiserror::Error)]
pub enum NormalsError {
    /// Not enough points to fit a local plane
    #[error("Normal estimation requires at least 3 points, got {0}")]
    NotEnoughPoints(usize),
}

/// Parameters of the k-nearest-neighbour normal estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalEstimationParams {
    /// Number of neighbours used to fit the local plane (the query point included).
    pub knn: usize,
    /// Point the normals are oriented towards, usually the camera center.
    pub viewpoint: [f64; 3],
}

impl Default for NormalEstimationParams {
    fn default() -> Self {
        Self {
            knn: 30,
            viewpoint: [0.0, 0.0, 0.0],
        }
    }
}

/// Estimate per-point normals from the local neighbourhood of each point.
///
/// Each normal is the direction of least variance of the `knn` nearest
/// neighbours, flipped to face `params.viewpoint`.
///
/// # Arguments
///
/// * `points` - The points of the cloud.
/// * `params` - The estimation parameters.
///
/// # Returns
///
/// One unit normal per input point, in input order.
pub fn estimate_normals(
    points: &[[f64; 3]],
    params: &NormalEstimationParams,
) -> Result<Vec<[f64; 3]>, NormalsError> {
    if points.len() < 3 {
        return Err(NormalsError::NotEnoughPoints(points.len()));
    }

    // at least a triangle, at most the whole cloud
    let knn = params.knn.clamp(3, points.len());
    let max_qty = NonZeroUsize::new(knn).ok_or(NormalsError::NotEnoughPoints(points.len()))?;

    let kdtree: ImmutableKdTree<f64, u32, 3, 32> = ImmutableKdTree::new_from_slice(points);

    let viewpoint = DVec3::from_array(params.viewpoint);
    let mut neighbours = Vec::with_capacity(knn);

    let normals = points
        .iter()
        .map(|p| {
            neighbours.clear();
            neighbours.extend(
                kdtree
                    .nearest_n::<SquaredEuclidean>(p, max_qty)
                    .into_iter()
                    .map(|nn| points[nn.item as usize]),
            );

            let normal = match mean_and_covariance(&neighbours) {
                Some((_, cov)) => symmetric_eigen3(&cov).1.z_axis,
                None => DVec3::Z,
            };

            // orient towards the viewpoint
            let to_view = viewpoint - DVec3::from_array(*p);
            let normal = if normal.dot(to_view) < 0.0 {
                -normal
            } else {
                normal
            };
            normal.to_array()
        })
        .collect::<Vec<_>>();

    log::debug!("estimated {} normals with knn={}", normals.len(), knn);

    Ok(normals)
}
