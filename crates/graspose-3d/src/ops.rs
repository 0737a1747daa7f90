use glam::{DMat3, DVec3};

use crate::pointcloud::PointCloud;

/// Compute the centroid of a set of points.
///
/// Returns `None` when `points` is empty.
pub fn centroid(points: &[[f64; 3]]) -> Option<DVec3> {
    if points.is_empty() {
        return None;
    }
    let sum = points
        .iter()
        .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p));
    Some(sum / points.len() as f64)
}

/// Compute the mean and the (biased) covariance matrix of a set of points.
///
/// Returns `None` when `points` is empty.
pub fn mean_and_covariance(points: &[[f64; 3]]) -> Option<(DVec3, DMat3)> {
    let mean = centroid(points)?;
    let mut cov = DMat3::ZERO;
    for p in points {
        let d = DVec3::from_array(*p) - mean;
        cov += DMat3::from_cols(d * d.x, d * d.y, d * d.z);
    }
    Some((mean, cov * (1.0 / points.len() as f64)))
}

/// Keep only the points whose depth lies in `[z_range[0], z_range[1]]`.
///
/// Colors and normals, when present, stay aligned with the kept points.
///
/// Example:
/// ```
/// use graspose_3d::{ops::crop_z_range, pointcloud::PointCloud};
///
/// let cloud = PointCloud::from_points(vec![[0.0, 0.0, 0.1], [0.0, 0.0, 1.0]]);
/// let cropped = crop_z_range(&cloud, [0.2, 1.8]);
/// assert_eq!(cropped.len(), 1);
/// ```
pub fn crop_z_range(cloud: &PointCloud, z_range: [f64; 2]) -> PointCloud {
    let keep = cloud
        .points()
        .iter()
        .map(|p| p[2] >= z_range[0] && p[2] <= z_range[1])
        .collect::<Vec<_>>();

    let points = select(cloud.points(), &keep);
    let colors = cloud.colors().map(|c| select(c, &keep));
    let normals = cloud.normals().map(|n| select(n, &keep));

    let dropped = cloud.len() - points.len();
    if dropped > 0 {
        log::debug!(
            "z-range [{}, {}] dropped {} of {} points",
            z_range[0],
            z_range[1],
            dropped,
            cloud.len()
        );
    }

    PointCloud::new(points, colors, normals)
}

fn select<T: Copy>(values: &[T], keep: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(keep)
        .filter_map(|(v, &k)| k.then_some(*v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_centroid() {
        assert!(centroid(&[]).is_none());
        let c = centroid(&[[0.0, 0.0, 0.0], [2.0, 4.0, -2.0]]).unwrap();
        assert_eq!(c, DVec3::new(1.0, 2.0, -1.0));
    }

    #[test]
    fn test_covariance_along_axis() {
        // points spread along x only
        let points = [[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let (mean, cov) = mean_and_covariance(&points).unwrap();
        assert_eq!(mean, DVec3::ZERO);
        assert_relative_eq!(cov.x_axis.x, 1.0);
        assert_relative_eq!(cov.y_axis.y, 0.0);
        assert_relative_eq!(cov.z_axis.z, 0.0);
        assert_relative_eq!(cov.y_axis.x, 0.0);
    }

    #[test]
    fn test_crop_z_range_keeps_attributes_aligned() {
        let cloud = PointCloud::new(
            vec![[0.0, 0.0, 0.1], [1.0, 0.0, 0.5], [2.0, 0.0, 1.8], [3.0, 0.0, 2.5]],
            Some(vec![[1, 1, 1], [2, 2, 2], [3, 3, 3], [4, 4, 4]]),
            None,
        );
        let cropped = crop_z_range(&cloud, [0.2, 1.8]);
        assert_eq!(cropped.points(), &[[1.0, 0.0, 0.5], [2.0, 0.0, 1.8]]);
        assert_eq!(cropped.colors(), Some(&[[2u8, 2, 2], [3, 3, 3]][..]));
        assert!(cropped.normals().is_none());
    }
}
