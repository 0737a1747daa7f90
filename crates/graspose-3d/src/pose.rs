//! # 6D pose frames
//!
//! A [`PoseMatrix`] is a 4x4 homogeneous transform `[R t; 0 1]` stored column
//! major: the first three columns are the frame axes expressed in the parent
//! frame, the last column is the frame origin.
//!
//! [`build_pose`] is the only constructor that guarantees a proper rotation
//! block. Matrices built with [`PoseMatrix::from_rows`] or
//! [`PoseMatrix::from_mat4`] are taken as given.

use glam::{DMat3, DMat4, DVec3, DVec4};

/// Tolerance of the unit-norm and orthogonality checks of [`build_pose`].
pub const FRAME_TOL: f64 = 1e-6;

/// Error types for pose frame construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    /// The x axis is not a unit vector.
    #[error("Invalid frame: x axis is not unit length (norm {norm})")]
    XAxisNotUnit {
        /// Norm of the supplied axis.
        norm: f64,
    },

    /// The z axis is not a unit vector.
    #[error("Invalid frame: z axis is not unit length (norm {norm})")]
    ZAxisNotUnit {
        /// Norm of the supplied axis.
        norm: f64,
    },

    /// The x and z axes are not orthogonal.
    #[error("Invalid frame: x and z axes are not orthogonal (dot {dot})")]
    NotOrthogonal {
        /// Dot product of the supplied axes.
        dot: f64,
    },
}

/// A 4x4 homogeneous rigid-body transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseMatrix(DMat4);

impl Default for PoseMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl PoseMatrix {
    /// The identity transform.
    pub const IDENTITY: Self = Self(DMat4::IDENTITY);

    /// Wrap a 4x4 matrix.
    pub fn from_mat4(mat: DMat4) -> Self {
        Self(mat)
    }

    /// Build a transform from a rotation block and a translation.
    pub fn from_rotation_translation(rotation: DMat3, translation: DVec3) -> Self {
        Self(DMat4::from_cols(
            rotation.x_axis.extend(0.0),
            rotation.y_axis.extend(0.0),
            rotation.z_axis.extend(0.0),
            translation.extend(1.0),
        ))
    }

    /// Build a pure translation.
    pub fn from_translation(translation: DVec3) -> Self {
        Self(DMat4::from_translation(translation))
    }

    /// Build a transform from row-major nested arrays, as written in config files.
    pub fn from_rows(rows: &[[f64; 4]; 4]) -> Self {
        Self(DMat4::from_cols_array_2d(rows).transpose())
    }

    /// Row-major nested arrays of the matrix.
    pub fn to_rows(&self) -> [[f64; 4]; 4] {
        self.0.transpose().to_cols_array_2d()
    }

    /// The underlying 4x4 matrix.
    pub fn matrix(&self) -> DMat4 {
        self.0
    }

    /// The upper-left 3x3 block.
    pub fn rotation(&self) -> DMat3 {
        DMat3::from_mat4(self.0)
    }

    /// The upper-right 3x1 block.
    pub fn translation(&self) -> DVec3 {
        self.0.w_axis.truncate()
    }

    /// First column of the rotation block.
    pub fn x_axis(&self) -> DVec3 {
        self.0.x_axis.truncate()
    }

    /// Second column of the rotation block.
    pub fn y_axis(&self) -> DVec3 {
        self.0.y_axis.truncate()
    }

    /// Third column of the rotation block.
    pub fn z_axis(&self) -> DVec3 {
        self.0.z_axis.truncate()
    }

    /// Replace the translation, keeping the rotation block.
    pub fn with_translation(&self, translation: DVec3) -> Self {
        let mut mat = self.0;
        mat.w_axis = translation.extend(1.0);
        Self(mat)
    }

    /// Compose two transforms: `self · other`.
    pub fn compose(&self, other: &PoseMatrix) -> Self {
        Self(self.0 * other.0)
    }

    /// Inverse of a rigid transform: `[Rᵀ −Rᵀt; 0 1]`.
    ///
    /// PRECONDITION: the rotation block is orthonormal.
    pub fn inverse_rigid(&self) -> Self {
        let rotation_t = self.rotation().transpose();
        Self::from_rotation_translation(rotation_t, -(rotation_t * self.translation()))
    }

    /// Apply the transform to a point.
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.0.transform_point3(point)
    }

    /// Apply the rotation block to a direction.
    pub fn transform_vector(&self, vector: DVec3) -> DVec3 {
        self.0.transform_vector3(vector)
    }

    /// Check the rotation block is orthonormal with determinant +1 and the last
    /// row is `[0, 0, 0, 1]`, within `tol`.
    pub fn is_rigid(&self, tol: f64) -> bool {
        let rotation = self.rotation();
        crate::linalg::is_orthonormal(&rotation, tol)
            && (rotation.determinant() - 1.0).abs() <= tol
            && self.0.row(3).abs_diff_eq(DVec4::W, tol)
    }
}

/// Build a right-handed 6D pose from two orthogonal unit axes and a translation.
///
/// The y axis is `normalize(x × z)`, negated when `(x × y) · z < 0` so the
/// rotation block has determinant +1. The rotation columns are `[x, y, z]`.
///
/// # Arguments
///
/// * `x_axis` - Unit x axis of the frame, in the parent frame.
/// * `z_axis` - Unit z axis of the frame, orthogonal to `x_axis`.
/// * `translation` - Origin of the frame, in the parent frame.
///
/// # Errors
///
/// [`FrameError`] naming the first failed check, tested in order: x unit
/// norm, z unit norm, orthogonality. Each uses the tolerance [`FRAME_TOL`].
/// The axes are never corrected.
///
/// Example:
///
/// ```
/// use glam::DVec3;
/// use graspose_3d::pose::build_pose;
///
/// let pose = build_pose(DVec3::X, DVec3::Z, DVec3::new(0.0, 0.0, 0.5)).unwrap();
/// assert_eq!(pose.y_axis(), DVec3::Y);
/// ```
pub fn build_pose(
    x_axis: DVec3,
    z_axis: DVec3,
    translation: DVec3,
) -> Result<PoseMatrix, FrameError> {
    let x_norm = x_axis.length();
    if !within_tol(x_norm, 1.0) {
        return Err(FrameError::XAxisNotUnit { norm: x_norm });
    }
    let z_norm = z_axis.length();
    if !within_tol(z_norm, 1.0) {
        return Err(FrameError::ZAxisNotUnit { norm: z_norm });
    }
    let dot = x_axis.dot(z_axis);
    if !within_tol(dot, 0.0) {
        return Err(FrameError::NotOrthogonal { dot });
    }

    let mut y_axis = x_axis.cross(z_axis).normalize();
    if x_axis.cross(y_axis).dot(z_axis) < 0.0 {
        y_axis = -y_axis;
    }

    let rotation = DMat3::from_cols(x_axis, y_axis, z_axis);
    Ok(PoseMatrix::from_rotation_translation(rotation, translation))
}

// false for NaN
#[inline]
fn within_tol(value: f64, target: f64) -> bool {
    (value - target).abs() <= FRAME_TOL
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_orthonormal_pair(rng: &mut StdRng) -> (DVec3, DVec3) {
        let rotation = DMat3::from_euler(
            glam::EulerRot::ZYX,
            rng.random_range(-3.0..3.0),
            rng.random_range(-1.5..1.5),
            rng.random_range(-3.0..3.0),
        );
        (rotation.x_axis, rotation.z_axis)
    }

    fn assert_proper_rotation(rotation: &DMat3) {
        let gram = rotation.transpose() * *rotation;
        for (c, e) in gram
            .to_cols_array()
            .iter()
            .zip(DMat3::IDENTITY.to_cols_array().iter())
        {
            assert_relative_eq!(*c, *e, epsilon = 1e-6);
        }
        assert_relative_eq!(rotation.determinant(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_build_pose_is_proper_rotation() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let (x, z) = random_orthonormal_pair(&mut rng);
            // swapping the roles exercises both orientations of the input pair
            for (a, b) in [(x, z), (z, x), (-x, z), (x, -z)] {
                let t = DVec3::new(rng.random(), rng.random(), rng.random());
                let pose = build_pose(a, b, t)?;
                assert_proper_rotation(&pose.rotation());
                assert_eq!(pose.x_axis(), a);
                assert_eq!(pose.z_axis(), b);
                assert_eq!(pose.translation(), t);
                assert_eq!(pose.matrix().row(3), DVec4::W);
            }
        }
        Ok(())
    }

    #[test]
    fn test_handedness_flip_negates_naive_cross() -> Result<(), Box<dyn std::error::Error>> {
        let x = DVec3::X;
        let z = DVec3::Z;
        let naive_y = x.cross(z).normalize();
        // the naive cross product gives a left-handed frame
        assert!(x.cross(naive_y).dot(z) < 0.0);

        let pose = build_pose(x, z, DVec3::ZERO)?;
        assert_eq!(pose.y_axis(), -naive_y);
        assert_relative_eq!(pose.rotation().determinant(), 1.0);
        assert_eq!(pose.y_axis(), DVec3::Y);
        Ok(())
    }

    #[test]
    fn test_rotation_columns_are_the_axes() -> Result<(), Box<dyn std::error::Error>> {
        let x = DVec3::new(0.0, 1.0, 0.0);
        let z = DVec3::new(1.0, 0.0, 0.0);
        let pose = build_pose(x, z, DVec3::new(1.0, 2.0, 3.0))?;

        // column major: the axes are columns, not rows
        let rows = pose.to_rows();
        assert_eq!(rows[0], [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(rows[1], [1.0, 0.0, 0.0, 2.0]);
        assert_eq!(rows[2], [0.0, 1.0, 0.0, 3.0]);
        assert_eq!(rows[3], [0.0, 0.0, 0.0, 1.0]);

        assert_eq!(pose.transform_vector(DVec3::X), x);
        assert_eq!(pose.transform_vector(DVec3::Z), z);
        Ok(())
    }

    #[test]
    fn test_not_orthogonal() {
        let x = DVec3::X;
        let z = DVec3::new(0.0, 0.6, 0.8);
        let z_tilted = (z + DVec3::X * 1e-3).normalize();

        assert!(build_pose(x, z, DVec3::ZERO).is_ok());
        let res = build_pose(x, z_tilted, DVec3::ZERO);
        assert!(matches!(res, Err(FrameError::NotOrthogonal { .. })));
    }

    #[test]
    fn test_not_unit() {
        let res = build_pose(DVec3::X * 1.01, DVec3::Z, DVec3::ZERO);
        assert!(matches!(res, Err(FrameError::XAxisNotUnit { .. })));

        let res = build_pose(DVec3::X, DVec3::Z * 0.5, DVec3::ZERO);
        assert!(matches!(res, Err(FrameError::ZAxisNotUnit { norm }) if norm == 0.5));

        // the x check runs first
        let res = build_pose(DVec3::ZERO, DVec3::ZERO, DVec3::ZERO);
        assert!(matches!(res, Err(FrameError::XAxisNotUnit { .. })));

        let res = build_pose(DVec3::new(f64::NAN, 0.0, 0.0), DVec3::Z, DVec3::ZERO);
        assert!(matches!(res, Err(FrameError::XAxisNotUnit { .. })));
    }

    #[test]
    fn test_within_tolerance_is_accepted() -> Result<(), Box<dyn std::error::Error>> {
        let x = DVec3::X * (1.0 + 5e-7);
        let z = (DVec3::Z + DVec3::X * 5e-7).normalize();
        let pose = build_pose(x, z, DVec3::ZERO)?;
        assert_relative_eq!(pose.rotation().determinant(), 1.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_inverse_recovers_points() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let (x, z) = random_orthonormal_pair(&mut rng);
            let t = DVec3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(0.2..1.8),
            );
            let pose = build_pose(x, z, t)?;
            let p = DVec3::new(rng.random(), rng.random(), rng.random());

            let back = pose.inverse_rigid().transform_point(pose.transform_point(p));
            assert_relative_eq!(back.x, p.x, epsilon = 1e-9);
            assert_relative_eq!(back.y, p.y, epsilon = 1e-9);
            assert_relative_eq!(back.z, p.z, epsilon = 1e-9);

            let identity = pose.inverse_rigid().compose(&pose);
            assert!(identity.matrix().abs_diff_eq(DMat4::IDENTITY, 1e-9));
        }
        Ok(())
    }

    #[test]
    fn test_rows_roundtrip_and_rigidity() {
        let rows = [
            [0.0, -1.0, 0.0, 0.1],
            [1.0, 0.0, 0.0, 0.2],
            [0.0, 0.0, 1.0, 0.3],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let pose = PoseMatrix::from_rows(&rows);
        assert_eq!(pose.to_rows(), rows);
        assert_eq!(pose.translation(), DVec3::new(0.1, 0.2, 0.3));
        assert_eq!(pose.x_axis(), DVec3::Y);
        assert!(pose.is_rigid(1e-9));

        let scaled = PoseMatrix::from_mat4(pose.matrix() * DMat4::from_scale(DVec3::splat(2.0)));
        assert!(!scaled.is_rigid(1e-6));

        let moved = pose.with_translation(DVec3::ONE);
        assert_eq!(moved.rotation(), pose.rotation());
        assert_eq!(moved.translation(), DVec3::ONE);
    }
}
