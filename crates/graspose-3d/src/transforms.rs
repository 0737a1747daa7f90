use crate::pose::PoseMatrix;

/// Determinant magnitude at or below which a transform is treated as singular.
pub const SINGULAR_DET_EPS: f64 = 1e-9;

/// Which caller-supplied frame of a [`FrameChain`] is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFrame {
    /// The initial end-effector pose.
    InitEf,
    /// The camera-to-end-effector offset.
    CamOffset,
}

impl std::fmt::Display for ChainFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainFrame::InitEf => write!(f, "init_ef"),
            ChainFrame::CamOffset => write!(f, "cam_offset"),
        }
    }
}

/// Error types for frame chain composition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    /// The camera offset cannot be inverted.
    #[error("Singular camera offset transform (determinant {det})")]
    Singular {
        /// Determinant of the offending matrix.
        det: f64,
    },

    /// A frame of the chain is not a rigid transform.
    #[error("Frame {frame} is not a rigid transform")]
    NotRigid {
        /// The offending frame.
        frame: ChainFrame,
    },
}

/// Map a camera-frame pose to the world frame.
///
/// Computes `init_ef_pose · inverse(cam_offset) · pose_camera`, in this order.
///
/// # Arguments
///
/// * `pose_camera` - The pose expressed in the camera frame.
/// * `init_ef_pose` - The end-effector pose in the world frame when the cloud was captured.
/// * `cam_offset` - The camera pose in the end-effector frame.
///
/// # Errors
///
/// [`TransformError::Singular`] when `|det(cam_offset)| <= SINGULAR_DET_EPS`
/// or the determinant is not finite.
///
/// Example:
///
/// ```
/// use glam::DVec3;
/// use graspose_3d::{pose::PoseMatrix, transforms::to_world_frame};
///
/// let pose = PoseMatrix::from_translation(DVec3::new(0.0, 0.0, 0.5));
/// let init_ef = PoseMatrix::from_translation(DVec3::new(0.3, 0.0, 0.4));
/// let world = to_world_frame(&pose, &init_ef, &PoseMatrix::IDENTITY).unwrap();
/// assert_eq!(world.translation(), DVec3::new(0.3, 0.0, 0.9));
/// ```
pub fn to_world_frame(
    pose_camera: &PoseMatrix,
    init_ef_pose: &PoseMatrix,
    cam_offset: &PoseMatrix,
) -> Result<PoseMatrix, TransformError> {
    let det = cam_offset.matrix().determinant();
    if !det.is_finite() || det.abs() <= SINGULAR_DET_EPS {
        return Err(TransformError::Singular { det });
    }
    let offset_inv = PoseMatrix::from_mat4(cam_offset.matrix().inverse());

    Ok(init_ef_pose.compose(&offset_inv).compose(pose_camera))
}

/// The fixed frames that map camera-space poses to the robot world frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameChain {
    /// The end-effector pose in the world frame at capture time.
    pub init_ef: PoseMatrix,
    /// The camera pose in the end-effector frame.
    pub cam_offset: PoseMatrix,
}

impl FrameChain {
    /// Create a chain from its two frames.
    pub fn new(init_ef: PoseMatrix, cam_offset: PoseMatrix) -> Self {
        Self {
            init_ef,
            cam_offset,
        }
    }

    /// Map a camera-frame pose to the world frame, see [`to_world_frame`].
    pub fn to_world(&self, pose_camera: &PoseMatrix) -> Result<PoseMatrix, TransformError> {
        to_world_frame(pose_camera, &self.init_ef, &self.cam_offset)
    }

    /// Check that both frames are rigid transforms within `tol`.
    pub fn validate_rigid(&self, tol: f64) -> Result<(), TransformError> {
        if !self.init_ef.is_rigid(tol) {
            return Err(TransformError::NotRigid {
                frame: ChainFrame::InitEf,
            });
        }
        if !self.cam_offset.is_rigid(tol) {
            return Err(TransformError::NotRigid {
                frame: ChainFrame::CamOffset,
            });
        }
        Ok(())
    }
}
