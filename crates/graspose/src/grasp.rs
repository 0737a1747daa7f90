use std::collections::BTreeMap;
use std::path::Path;

use graspose_3d::{
    io::npy::{read_npy, write_npy_f64, NpyArray, NpyError},
    pointcloud::PointCloud,
    pose::PoseMatrix,
    transforms::{FrameChain, TransformError},
};

const POSES_FILE: &str = "pred_grasps_cam.npy";
const SCORES_FILE: &str = "scores.npy";
const CONTACTS_FILE: &str = "contact_pts.npy";
const OPENINGS_FILE: &str = "gripper_openings.npy";

/// Error types for the grasp module.
#[derive(Debug, thiserror::Error)]
pub enum GraspError {
    /// The per-grasp arrays do not have the same length
    #[error(
        "Mismatched grasp arrays: {poses} poses, {scores} scores, \
         {contacts} contact points, {openings} gripper openings"
    )]
    MismatchedLengths {
        /// Number of poses.
        poses: usize,
        /// Number of scores.
        scores: usize,
        /// Number of contact points.
        contacts: usize,
        /// Number of gripper openings.
        openings: usize,
    },

    /// Failed to create the output directory
    #[error("Failed to create grasp directory")]
    Io(#[from] std::io::Error),

    /// Failed to read or write a grasp array
    #[error(transparent)]
    Npy(#[from] NpyError),

    /// Failed to move the grasps to the world frame
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// A single grasp candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grasp {
    /// Gripper pose.
    pub pose: PoseMatrix,
    /// Confidence of the predictor.
    pub score: f64,
    /// Contact point on the object.
    pub contact_point: [f64; 3],
    /// Gripper opening width in meters.
    pub gripper_opening: f64,
}

/// The grasp candidates predicted for one segment, stored as parallel arrays.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SegmentGrasps {
    poses: Vec<PoseMatrix>,
    scores: Vec<f64>,
    contact_points: Vec<[f64; 3]>,
    gripper_openings: Vec<f64>,
}

/// Grasp candidates keyed by segment id.
pub type SceneGrasps = BTreeMap<u32, SegmentGrasps>;

impl SegmentGrasps {
    /// Create the grasps of a segment from parallel arrays.
    ///
    /// # Errors
    ///
    /// [`GraspError::MismatchedLengths`] unless all arrays have the same length.
    pub fn new(
        poses: Vec<PoseMatrix>,
        scores: Vec<f64>,
        contact_points: Vec<[f64; 3]>,
        gripper_openings: Vec<f64>,
    ) -> Result<Self, GraspError> {
        let n = poses.len();
        if scores.len() != n || contact_points.len() != n || gripper_openings.len() != n {
            return Err(GraspError::MismatchedLengths {
                poses: n,
                scores: scores.len(),
                contacts: contact_points.len(),
                openings: gripper_openings.len(),
            });
        }

        Ok(Self {
            poses,
            scores,
            contact_points,
            gripper_openings,
        })
    }

    /// Number of grasps.
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// Whether there is no grasp.
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// The gripper poses.
    pub fn poses(&self) -> &[PoseMatrix] {
        &self.poses
    }

    /// The scores.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// The contact points.
    pub fn contact_points(&self) -> &[[f64; 3]] {
        &self.contact_points
    }

    /// The gripper openings.
    pub fn gripper_openings(&self) -> &[f64] {
        &self.gripper_openings
    }

    /// Iterate over the grasps.
    pub fn iter(&self) -> impl Iterator<Item = Grasp> + '_ {
        (0..self.len()).map(|i| Grasp {
            pose: self.poses[i],
            score: self.scores[i],
            contact_point: self.contact_points[i],
            gripper_opening: self.gripper_openings[i],
        })
    }

    /// The grasp with the highest score, ignoring NaN scores.
    pub fn best(&self) -> Option<Grasp> {
        self.iter()
            .filter(|g| !g.score.is_nan())
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }

    /// Keep the grasps scoring at least `min_score`.
    pub fn filter_by_score(&self, min_score: f64) -> Self {
        let mut out = Self::default();
        for grasp in self.iter().filter(|g| g.score >= min_score) {
            out.push(grasp);
        }
        out
    }

    /// Map every grasp to the world frame.
    ///
    /// Poses go through the chain, contact points are mapped as points.
    pub fn to_world_frame(&self, chain: &FrameChain) -> Result<Self, GraspError> {
        let identity = chain.to_world(&PoseMatrix::IDENTITY)?;

        let poses = self
            .poses
            .iter()
            .map(|pose| chain.to_world(pose))
            .collect::<Result<Vec<_>, _>>()?;
        let contact_points = self
            .contact_points
            .iter()
            .map(|p| identity.transform_point(glam::DVec3::from_array(*p)).to_array())
            .collect();

        Ok(Self {
            poses,
            scores: self.scores.clone(),
            contact_points,
            gripper_openings: self.gripper_openings.clone(),
        })
    }

    fn push(&mut self, grasp: Grasp) {
        self.poses.push(grasp.pose);
        self.scores.push(grasp.score);
        self.contact_points.push(grasp.contact_point);
        self.gripper_openings.push(grasp.gripper_opening);
    }
}

/// A grasp detector predicting grasps for the segments of a scene.
///
/// Model loading and device setup happen once, when the implementor is built.
pub trait GraspPredictor {
    /// The error type of the predictor.
    type Error: std::error::Error;

    /// Predict grasps for every segment of a scene.
    ///
    /// # Arguments
    ///
    /// * `full` - The whole scene cloud, in the camera frame.
    /// * `segments` - The object clouds keyed by segment id.
    ///
    /// # Returns
    ///
    /// The camera frame grasps keyed by segment id.
    fn predict_scene_grasps(
        &mut self,
        full: &PointCloud,
        segments: &BTreeMap<u32, PointCloud>,
    ) -> Result<SceneGrasps, Self::Error>;
}

/// Write the grasps of a segment to `dir` as four `.npy` files.
///
/// The files are `pred_grasps_cam.npy` (N, 4, 4), `scores.npy` (N),
/// `contact_pts.npy` (N, 3) and `gripper_openings.npy` (N). The directory is
/// created if needed.
pub fn save_segment_grasps(
    dir: impl AsRef<Path>,
    grasps: &SegmentGrasps,
) -> Result<(), GraspError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let n = grasps.len();
    let poses = grasps
        .poses
        .iter()
        .flat_map(|pose| pose.to_rows().into_iter().flatten())
        .collect::<Vec<_>>();
    let contacts = grasps
        .contact_points
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>();

    write_npy_f64(dir.join(POSES_FILE), &[n, 4, 4], &poses)?;
    write_npy_f64(dir.join(SCORES_FILE), &[n], &grasps.scores)?;
    write_npy_f64(dir.join(CONTACTS_FILE), &[n, 3], &contacts)?;
    write_npy_f64(dir.join(OPENINGS_FILE), &[n], &grasps.gripper_openings)?;

    log::debug!("saved {} grasps to {}", n, dir.display());

    Ok(())
}

/// Read the grasps written by [`save_segment_grasps`].
pub fn load_segment_grasps(dir: impl AsRef<Path>) -> Result<SegmentGrasps, GraspError> {
    let dir = dir.as_ref();

    let poses = read_shaped(&dir.join(POSES_FILE), &[4, 4], "(N, 4, 4)")?
        .data
        .chunks_exact(16)
        .map(|m| {
            PoseMatrix::from_rows(&[
                [m[0], m[1], m[2], m[3]],
                [m[4], m[5], m[6], m[7]],
                [m[8], m[9], m[10], m[11]],
                [m[12], m[13], m[14], m[15]],
            ])
        })
        .collect();
    let scores = read_shaped(&dir.join(SCORES_FILE), &[], "(N,)")?.data;
    let contact_points = read_shaped(&dir.join(CONTACTS_FILE), &[3], "(N, 3)")?
        .data
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect();
    let gripper_openings = read_shaped(&dir.join(OPENINGS_FILE), &[], "(N,)")?.data;

    SegmentGrasps::new(poses, scores, contact_points, gripper_openings)
}

// reads an array of shape (N, inner..)
fn read_shaped(
    path: &Path,
    inner: &[usize],
    expected: &'static str,
) -> Result<NpyArray, NpyError> {
    let array = read_npy(path)?;
    if array.shape.len() != inner.len() + 1 || array.shape[1..] != *inner {
        return Err(NpyError::InvalidShape {
            actual: array.shape,
            expected,
        });
    }
    Ok(array)
}
