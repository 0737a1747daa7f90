use glam::{DMat3, DVec3};

use crate::{
    linalg::symmetric_eigen3,
    normals::{estimate_normals, NormalEstimationParams, NormalsError},
    ops::mean_and_covariance,
    pointcloud::PointCloud,
};

/// Minimum number of points for a bounding box with volume.
pub const MIN_OBB_POINTS: usize = 4;

/// Relative variance below which a principal direction is considered flat.
pub const DEGENERATE_EPS: f64 = 1e-12;

/// Why a point set cannot be enclosed by an oriented box.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum DegenerateReason {
    /// Fewer points than [`MIN_OBB_POINTS`].
    #[error("at least 4 points are required, got {0}")]
    NotEnoughPoints(usize),
    /// All points lie on a line or on a single location.
    #[error("points are collinear or coincident")]
    Collinear,
    /// A coordinate is NaN or infinite.
    #[error("points contain non-finite coordinates")]
    NonFinite,
}

/// Error types for the oriented bounding box module.
#[derive(Debug, thiserror::Error)]
pub enum ObbError {
    /// The point set has no spatial extent to fit a box on.
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(DegenerateReason),

    /// Normal estimation failed.
    #[error(transparent)]
    Normals(#[from] NormalsError),
}

/// A box enclosing a point set, aligned to the set's principal directions.
///
/// The rotation columns are the box axes ordered by decreasing spread of the
/// points and always form a right-handed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedBoundingBox {
    center: DVec3,
    rotation: DMat3,
    extent: DVec3,
}

impl OrientedBoundingBox {
    /// Create a box from its center, axes (as rotation columns) and full side lengths.
    pub fn new(center: DVec3, rotation: DMat3, extent: DVec3) -> Self {
        Self {
            center,
            rotation,
            extent,
        }
    }

    /// The center of the box.
    pub fn center(&self) -> DVec3 {
        self.center
    }

    /// The box axes as the columns of a rotation matrix.
    pub fn rotation(&self) -> DMat3 {
        self.rotation
    }

    /// Full side lengths along each box axis.
    pub fn extent(&self) -> DVec3 {
        self.extent
    }

    /// The eight corners of the box.
    ///
    /// Corner 0 is the `(-, -, -)` corner; corners 1, 2 and 3 are its
    /// neighbours along the first, second and third axis.
    pub fn corners(&self) -> [DVec3; 8] {
        let a = self.rotation.x_axis * (0.5 * self.extent.x);
        let b = self.rotation.y_axis * (0.5 * self.extent.y);
        let c = self.rotation.z_axis * (0.5 * self.extent.z);
        let o = self.center;
        [
            o - a - b - c,
            o + a - b - c,
            o - a + b - c,
            o - a - b + c,
            o + a + b + c,
            o - a + b + c,
            o + a - b + c,
            o + a + b - c,
        ]
    }

    /// The three edge vectors at corner 0, as `corner[0] - corner[k]` for `k = 1, 2, 3`.
    pub fn edge_vectors(&self) -> [DVec3; 3] {
        let corners = self.corners();
        [
            corners[0] - corners[1],
            corners[0] - corners[2],
            corners[0] - corners[3],
        ]
    }

    /// Lengths of [`Self::edge_vectors`].
    pub fn edge_lengths(&self) -> [f64; 3] {
        self.edge_vectors().map(|v| v.length())
    }
}

/// Compute the oriented bounding box of a set of points.
///
/// The box axes are the eigenvectors of the point covariance. The points are
/// projected on these axes to find the tight extent along each of them.
///
/// # Arguments
///
/// * `points` - At least [`MIN_OBB_POINTS`] points, not all collinear.
///
/// # Returns
///
/// The oriented bounding box, or [`ObbError::DegenerateGeometry`].
///
/// Example:
///
/// ```
/// use graspose_3d::obb::compute_obb;
///
/// let points = [
///     [0.0, 0.0, 0.0],
///     [2.0, 0.0, 0.0],
///     [0.0, 1.0, 0.0],
///     [0.0, 0.0, 0.5],
///     [2.0, 1.0, 0.5],
/// ];
/// let obb = compute_obb(&points).unwrap();
/// assert_eq!(obb.corners().len(), 8);
/// ```
pub fn compute_obb(points: &[[f64; 3]]) -> Result<OrientedBoundingBox, ObbError> {
    if points.len() < MIN_OBB_POINTS {
        return Err(ObbError::DegenerateGeometry(
            DegenerateReason::NotEnoughPoints(points.len()),
        ));
    }
    if points.iter().flatten().any(|v| !v.is_finite()) {
        return Err(ObbError::DegenerateGeometry(DegenerateReason::NonFinite));
    }

    let (mean, cov) = mean_and_covariance(points).ok_or(ObbError::DegenerateGeometry(
        DegenerateReason::NotEnoughPoints(0),
    ))?;
    let (variances, mut rotation) = symmetric_eigen3(&cov);

    if variances[1] <= DEGENERATE_EPS * variances[0] {
        return Err(ObbError::DegenerateGeometry(DegenerateReason::Collinear));
    }

    // keep the frame right handed
    if rotation.determinant() < 0.0 {
        rotation.z_axis = -rotation.z_axis;
    }

    let rotation_t = rotation.transpose();
    let (min, max) = points.iter().fold(
        (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
        |(min, max), p| {
            let local = rotation_t * (DVec3::from_array(*p) - mean);
            (min.min(local), max.max(local))
        },
    );

    let center = mean + rotation * ((min + max) * 0.5);
    let extent = max - min;

    log::debug!(
        "obb fitted on {} points: center {:?}, extent {:?}",
        points.len(),
        center,
        extent
    );

    Ok(OrientedBoundingBox::new(center, rotation, extent))
}

/// Fits oriented bounding boxes on clouds after estimating their normals.
#[derive(Debug, Clone, Default)]
pub struct ObbAnalyzer {
    params: NormalEstimationParams,
}

impl ObbAnalyzer {
    /// Create an analyzer with the given normal estimation parameters.
    pub fn new(params: NormalEstimationParams) -> Self {
        Self { params }
    }

    /// The normal estimation parameters.
    pub fn params(&self) -> &NormalEstimationParams {
        &self.params
    }

    /// Estimate normals on a copy of `cloud` and fit its oriented bounding box.
    ///
    /// # Returns
    ///
    /// The cloud with normals attached and its oriented bounding box.
    pub fn analyze(
        &self,
        cloud: &PointCloud,
    ) -> Result<(PointCloud, OrientedBoundingBox), ObbError> {
        if cloud.len() < MIN_OBB_POINTS {
            return Err(ObbError::DegenerateGeometry(
                DegenerateReason::NotEnoughPoints(cloud.len()),
            ));
        }

        let normals = estimate_normals(cloud.points(), &self.params)?;
        let obb = compute_obb(cloud.points())?;

        Ok((cloud.with_normals(normals), obb))
    }
}
