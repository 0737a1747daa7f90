//! # Pose estimation
//!
//! A segment goes through a fixed chain of stages:
//!
//! ```text
//! PoseEstimator
//!   ── load ──────────────────▶ PointCloudsLoaded
//!   ── compute_bounding_box ──▶ BoundingBoxComputed
//!   ── classify_axes ─────────▶ AxesClassified
//!   ── build_pose ────────────▶ PoseBuilt
//!   ── to_world_frame ────────▶ WorldFrameComputed
//! ```
//!
//! Every stage is a value that consumes the previous one, so a stage cannot be
//! skipped or run on stale inputs. Loading a segment again starts a new chain.

use std::collections::BTreeMap;
use std::path::Path;

use graspose_3d::{
    axes::{classify_axes_with, AxisClassification, AxisError, AxisPolicy, ShortestFacingPolicy},
    io::npy::{read_npy_points, NpyError},
    obb::{ObbAnalyzer, ObbError, OrientedBoundingBox},
    ops::crop_z_range,
    pointcloud::{PointCloud, PointCloudSegment},
    pose::{build_pose, FrameError, PoseMatrix, FRAME_TOL},
    transforms::{FrameChain, TransformError},
};

use crate::config::EstimatorConfig;

/// Error types for the pose estimation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PoseEstimationError {
    /// The segment has no points left to fit a box on.
    #[error("Segment {0} has no points")]
    EmptySegment(u32),

    /// Failed to read a point cloud file.
    #[error(transparent)]
    Npy(#[from] NpyError),

    /// The bounding box could not be fitted.
    #[error(transparent)]
    Obb(#[from] ObbError),

    /// A box axis is degenerate.
    #[error(transparent)]
    Axis(#[from] AxisError),

    /// The pose frame is invalid.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The camera to world chain failed.
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// The stages a segment goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EstimationState {
    /// No point cloud loaded yet.
    Uninitialized,
    /// Clean and noisy clouds are in memory.
    PointCloudsLoaded,
    /// The oriented bounding box is fitted.
    BoundingBoxComputed,
    /// Facing and normal axes are selected.
    AxesClassified,
    /// The camera frame pose is built.
    PoseBuilt,
    /// The pose is expressed in the world frame.
    WorldFrameComputed,
}

impl std::fmt::Display for EstimationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EstimationState::Uninitialized => "uninitialized",
            EstimationState::PointCloudsLoaded => "point clouds loaded",
            EstimationState::BoundingBoxComputed => "bounding box computed",
            EstimationState::AxesClassified => "axes classified",
            EstimationState::PoseBuilt => "pose built",
            EstimationState::WorldFrameComputed => "world frame computed",
        };
        write!(f, "{name}")
    }
}

/// A value standing for one stage of the estimation.
pub trait EstimationStage {
    /// The stage this value stands for.
    const STATE: EstimationState;

    /// The stage this value stands for.
    fn state(&self) -> EstimationState {
        Self::STATE
    }
}

/// A segment whose clouds are loaded and cropped.
#[derive(Debug, Clone)]
pub struct PointCloudsLoaded {
    segment: PointCloudSegment,
}

impl EstimationStage for PointCloudsLoaded {
    const STATE: EstimationState = EstimationState::PointCloudsLoaded;
}

impl PointCloudsLoaded {
    /// The loaded segment.
    pub fn segment(&self) -> &PointCloudSegment {
        &self.segment
    }

    /// Estimate normals and fit the oriented bounding box of the segment.
    ///
    /// The box is fitted on the noisy cloud when the segment has one.
    pub fn compute_bounding_box(
        self,
        analyzer: &ObbAnalyzer,
    ) -> Result<BoundingBoxComputed, PoseEstimationError> {
        let cloud = self.segment.fitting_cloud();
        if cloud.is_empty() {
            return Err(PoseEstimationError::EmptySegment(self.segment.id));
        }

        let (cloud, obb) = analyzer.analyze(cloud)?;

        log::debug!(
            "segment {}: box extent {:?} on {} points",
            self.segment.id,
            obb.extent(),
            cloud.len()
        );

        Ok(BoundingBoxComputed {
            segment: self.segment,
            cloud,
            obb,
        })
    }
}

/// A segment with its fitted bounding box.
#[derive(Debug, Clone)]
pub struct BoundingBoxComputed {
    segment: PointCloudSegment,
    cloud: PointCloud,
    obb: OrientedBoundingBox,
}

impl EstimationStage for BoundingBoxComputed {
    const STATE: EstimationState = EstimationState::BoundingBoxComputed;
}

impl BoundingBoxComputed {
    /// The fitted box.
    pub fn obb(&self) -> &OrientedBoundingBox {
        &self.obb
    }

    /// The cloud the box was fitted on, with its normals.
    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    /// Select the facing and normal axes with [`ShortestFacingPolicy`].
    pub fn classify_axes(self) -> Result<AxesClassified, PoseEstimationError> {
        self.classify_axes_with(&ShortestFacingPolicy)
    }

    /// Select the facing and normal axes with a custom policy.
    pub fn classify_axes_with(
        self,
        policy: &dyn AxisPolicy,
    ) -> Result<AxesClassified, PoseEstimationError> {
        let axes = classify_axes_with(
            policy,
            &self.obb.edge_vectors(),
            &self.obb.edge_lengths(),
            self.obb.center(),
        )?;

        Ok(AxesClassified {
            segment_id: self.segment.id,
            cloud: self.cloud,
            obb: self.obb,
            axes,
        })
    }
}

/// A segment with its box axes assigned to roles.
#[derive(Debug, Clone)]
pub struct AxesClassified {
    segment_id: u32,
    cloud: PointCloud,
    obb: OrientedBoundingBox,
    axes: AxisClassification,
}

impl EstimationStage for AxesClassified {
    const STATE: EstimationState = EstimationState::AxesClassified;
}

impl AxesClassified {
    /// The axis roles.
    pub fn axes(&self) -> &AxisClassification {
        &self.axes
    }

    /// Build the camera frame pose: x is the facing axis, z the normal axis
    /// and the origin the box center.
    pub fn build_pose(self) -> Result<PoseBuilt, PoseEstimationError> {
        let pose_camera = build_pose(
            self.axes.facing.unit,
            self.axes.normal.unit,
            self.obb.center(),
        )?;

        Ok(PoseBuilt {
            segment_id: self.segment_id,
            cloud: self.cloud,
            obb: self.obb,
            axes: self.axes,
            pose_camera,
        })
    }
}

/// A segment with its pose in the camera frame.
#[derive(Debug, Clone)]
pub struct PoseBuilt {
    segment_id: u32,
    cloud: PointCloud,
    obb: OrientedBoundingBox,
    axes: AxisClassification,
    pose_camera: PoseMatrix,
}

impl EstimationStage for PoseBuilt {
    const STATE: EstimationState = EstimationState::PoseBuilt;
}

impl PoseBuilt {
    /// The pose in the camera frame.
    pub fn pose_camera(&self) -> &PoseMatrix {
        &self.pose_camera
    }

    /// Express the pose in the world frame.
    pub fn to_world_frame(
        self,
        chain: &FrameChain,
    ) -> Result<WorldFrameComputed, PoseEstimationError> {
        let pose_world = chain.to_world(&self.pose_camera)?;

        Ok(WorldFrameComputed {
            estimate: PoseEstimate {
                segment_id: self.segment_id,
                cloud: self.cloud,
                obb: self.obb,
                axes: self.axes,
                pose_camera: self.pose_camera,
                pose_world,
            },
        })
    }
}

/// A segment with its pose in the world frame.
#[derive(Debug, Clone)]
pub struct WorldFrameComputed {
    estimate: PoseEstimate,
}

impl EstimationStage for WorldFrameComputed {
    const STATE: EstimationState = EstimationState::WorldFrameComputed;
}

impl WorldFrameComputed {
    /// The pose in the world frame.
    pub fn pose_world(&self) -> &PoseMatrix {
        &self.estimate.pose_world
    }

    /// Unwrap the final estimate.
    pub fn into_estimate(self) -> PoseEstimate {
        self.estimate
    }
}

/// Everything computed for one segment.
#[derive(Debug, Clone)]
pub struct PoseEstimate {
    /// Id of the segment.
    pub segment_id: u32,
    /// The cloud the box was fitted on, with normals.
    pub cloud: PointCloud,
    /// The fitted box.
    pub obb: OrientedBoundingBox,
    /// The axis roles, with arrows anchored at the box center.
    pub axes: AxisClassification,
    /// The pose in the camera frame.
    pub pose_camera: PoseMatrix,
    /// The pose in the world frame.
    pub pose_world: PoseMatrix,
}

impl PoseEstimate {
    /// Distance from the box center to the face along the normal axis.
    pub fn approach_offset(&self) -> f64 {
        self.axes.approach_offset()
    }
}

/// Runs the estimation stages with a fixed configuration.
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    analyzer: ObbAnalyzer,
    chain: FrameChain,
    z_range: Option<[f64; 2]>,
}

impl EstimationStage for PoseEstimator {
    const STATE: EstimationState = EstimationState::Uninitialized;
}

impl PoseEstimator {
    /// Create an estimator.
    ///
    /// # Errors
    ///
    /// With `strict_frames` set, [`TransformError::NotRigid`] when a matrix of
    /// the frame chain is not a rigid transform.
    pub fn new(config: &EstimatorConfig) -> Result<Self, PoseEstimationError> {
        let chain = config.frame_chain();
        if config.strict_frames {
            chain.validate_rigid(FRAME_TOL)?;
        }

        Ok(Self {
            analyzer: ObbAnalyzer::new(config.normals.clone()),
            chain,
            z_range: config.z_range,
        })
    }

    /// The camera to world frame chain.
    pub fn frame_chain(&self) -> &FrameChain {
        &self.chain
    }

    /// Start a new estimation chain for `segment`, cropping its clouds to the
    /// configured z range.
    pub fn load(&self, segment: PointCloudSegment) -> PointCloudsLoaded {
        let Some(z_range) = self.z_range else {
            return PointCloudsLoaded { segment };
        };

        let mut cropped =
            PointCloudSegment::new(segment.id, crop_z_range(segment.clean(), z_range));
        if let Some(noisy) = segment.noisy() {
            cropped = cropped.with_noisy(crop_z_range(noisy, z_range));
        }
        if cropped.fitting_cloud().is_empty() && !segment.fitting_cloud().is_empty() {
            log::warn!(
                "segment {}: all {} points outside z range {:?}",
                segment.id,
                segment.fitting_cloud().len(),
                z_range
            );
        }

        PointCloudsLoaded { segment: cropped }
    }

    /// Load a segment from `(N, 3)` `.npy` files.
    ///
    /// # Arguments
    ///
    /// * `id` - Segment identifier.
    /// * `clean_path` - The clean cloud.
    /// * `noisy_path` - The noisy cloud used for box fitting, if any.
    pub fn load_files(
        &self,
        id: u32,
        clean_path: impl AsRef<Path>,
        noisy_path: Option<&Path>,
    ) -> Result<PointCloudsLoaded, PoseEstimationError> {
        let mut segment = PointCloudSegment::new(id, read_npy_points(clean_path)?);
        if let Some(path) = noisy_path {
            segment = segment.with_noisy(read_npy_points(path)?);
        }
        Ok(self.load(segment))
    }

    /// Run every stage on `segment`.
    pub fn estimate(
        &self,
        segment: PointCloudSegment,
    ) -> Result<PoseEstimate, PoseEstimationError> {
        let id = segment.id;
        let world = self
            .load(segment)
            .compute_bounding_box(&self.analyzer)?
            .classify_axes()?
            .build_pose()?
            .to_world_frame(&self.chain)?;

        log::debug!("segment {}: world pose {:?}", id, world.pose_world());

        Ok(world.into_estimate())
    }

    /// Run every stage on each segment independently.
    pub fn estimate_all(
        &self,
        segments: impl IntoIterator<Item = PointCloudSegment>,
    ) -> BTreeMap<u32, Result<PoseEstimate, PoseEstimationError>> {
        segments
            .into_iter()
            .map(|segment| (segment.id, self.estimate(segment)))
            .collect()
    }

    /// The normal estimation and box fitting stage runner.
    pub fn analyzer(&self) -> &ObbAnalyzer {
        &self.analyzer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{DMat3, DVec3};
    use graspose_3d::{axes::ZERO_LENGTH_EPS, obb::DegenerateReason};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const SIZE: DVec3 = DVec3::new(0.2, 0.1, 0.05);

    /// Points filling a box of the given size, rotated and placed at `center`.
    fn solid_box(center: DVec3, rotation: DMat3, size: DVec3, seed: u64) -> PointCloud {
        let mut rng = StdRng::seed_from_u64(seed);
        let points = (0..600)
            .map(|_| {
                let local = DVec3::new(
                    rng.random_range(-0.5..0.5) * size.x,
                    rng.random_range(-0.5..0.5) * size.y,
                    rng.random_range(-0.5..0.5) * size.z,
                );
                (center + rotation * local).to_array()
            })
            .collect();
        PointCloud::from_points(points)
    }

    #[test]
    fn test_stages_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let estimator = PoseEstimator::new(&EstimatorConfig::default())?;
        assert_eq!(estimator.state(), EstimationState::Uninitialized);

        let cloud = solid_box(DVec3::new(0.0, 0.0, 0.8), DMat3::IDENTITY, SIZE, 1);
        let loaded = estimator.load(PointCloudSegment::new(3, cloud));
        assert_eq!(loaded.state(), EstimationState::PointCloudsLoaded);

        let boxed = loaded.compute_bounding_box(estimator.analyzer())?;
        assert_eq!(boxed.state(), EstimationState::BoundingBoxComputed);
        assert!(boxed.cloud().normals().is_some());

        let classified = boxed.classify_axes()?;
        assert_eq!(classified.state(), EstimationState::AxesClassified);

        let built = classified.build_pose()?;
        assert_eq!(built.state(), EstimationState::PoseBuilt);

        let world = built.to_world_frame(estimator.frame_chain())?;
        assert_eq!(world.state(), EstimationState::WorldFrameComputed);

        let estimate = world.into_estimate();
        assert_eq!(estimate.segment_id, 3);
        // identity chain
        assert_eq!(estimate.pose_world, estimate.pose_camera);
        Ok(())
    }

    #[test]
    fn test_pose_follows_box_axes() -> Result<(), Box<dyn std::error::Error>> {
        let rotation = DMat3::from_rotation_z(0.5);
        let center = DVec3::new(0.1, -0.05, 0.9);
        let cloud = solid_box(center, rotation, DVec3::new(0.3, 0.12, 0.05), 2);

        let estimator = PoseEstimator::new(&EstimatorConfig::default())?;
        let estimate = estimator.estimate(PointCloudSegment::new(0, cloud))?;
        let pose = estimate.pose_camera;

        // x along the shortest box side, z along the longest
        assert_relative_eq!(pose.x_axis().dot(rotation.z_axis).abs(), 1.0, epsilon = 1e-2);
        assert_relative_eq!(pose.z_axis().dot(rotation.x_axis).abs(), 1.0, epsilon = 1e-2);
        assert!(pose.is_rigid(1e-9));
        assert!(pose.translation().abs_diff_eq(center, 1e-2));
        assert_relative_eq!(estimate.approach_offset(), 0.15, epsilon = 1e-2);
        Ok(())
    }

    #[test]
    fn test_noisy_cloud_is_fitted() -> Result<(), Box<dyn std::error::Error>> {
        let clean = solid_box(DVec3::new(0.0, 0.0, 0.5), DMat3::IDENTITY, SIZE, 3);
        let noisy = solid_box(DVec3::new(0.0, 0.0, 1.5), DMat3::IDENTITY, SIZE, 4);
        let segment = PointCloudSegment::new(1, clean).with_noisy(noisy);

        let estimator = PoseEstimator::new(&EstimatorConfig::default())?;
        let estimate = estimator.estimate(segment)?;
        assert_relative_eq!(estimate.obb.center().z, 1.5, epsilon = 1e-2);
        Ok(())
    }

    #[test]
    fn test_z_range_crop_on_load() -> Result<(), Box<dyn std::error::Error>> {
        let config = EstimatorConfig {
            z_range: Some([0.0, 1.0]),
            ..Default::default()
        };
        let estimator = PoseEstimator::new(&config)?;

        let far = solid_box(DVec3::new(0.0, 0.0, 1.5), DMat3::IDENTITY, SIZE, 5);
        let loaded = estimator.load(PointCloudSegment::new(7, far));
        assert!(loaded.segment().clean().is_empty());

        let res = loaded.compute_bounding_box(estimator.analyzer());
        assert!(matches!(res, Err(PoseEstimationError::EmptySegment(7))));
        Ok(())
    }

    #[test]
    fn test_degenerate_segment() -> Result<(), Box<dyn std::error::Error>> {
        let estimator = PoseEstimator::new(&EstimatorConfig::default())?;
        let line = PointCloud::from_points((0..10).map(|i| [i as f64 * 0.01, 0.0, 1.0]).collect());

        let res = estimator.estimate(PointCloudSegment::new(0, line));
        assert!(matches!(
            res,
            Err(PoseEstimationError::Obb(ObbError::DegenerateGeometry(
                DegenerateReason::Collinear
            )))
        ));
        Ok(())
    }

    #[test]
    fn test_planar_segment_has_zero_length_axis() -> Result<(), Box<dyn std::error::Error>> {
        let estimator = PoseEstimator::new(&EstimatorConfig::default())?;
        let plane = PointCloud::from_points(
            (0..100)
                .map(|i| [(i % 10) as f64 * 0.02, (i / 10) as f64 * 0.01, 1.0])
                .collect(),
        );

        // the box fit succeeds, its thickness is zero
        let boxed = estimator
            .load(PointCloudSegment::new(5, plane.clone()))
            .compute_bounding_box(estimator.analyzer())?;
        assert!(boxed.obb().extent().min_element() <= ZERO_LENGTH_EPS);

        let res = estimator.estimate(PointCloudSegment::new(5, plane));
        assert!(matches!(
            res,
            Err(PoseEstimationError::Axis(AxisError::ZeroLengthAxis { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_strict_frames() {
        let mut config = EstimatorConfig::default();
        config.cam_offset_matrix[0][0] = 2.0;

        assert!(PoseEstimator::new(&config).is_ok());

        config.strict_frames = true;
        let res = PoseEstimator::new(&config);
        assert!(matches!(
            res,
            Err(PoseEstimationError::Transform(TransformError::NotRigid { .. }))
        ));
    }

    #[test]
    fn test_reload_starts_over() -> Result<(), Box<dyn std::error::Error>> {
        let estimator = PoseEstimator::new(&EstimatorConfig::default())?;
        let a = solid_box(DVec3::new(0.0, 0.0, 0.5), DMat3::IDENTITY, SIZE, 6);
        let b = solid_box(DVec3::new(0.3, 0.0, 0.5), DMat3::IDENTITY, SIZE, 7);

        let first = estimator.estimate(PointCloudSegment::new(0, a))?;
        let second = estimator.estimate(PointCloudSegment::new(0, b))?;
        assert_relative_eq!(first.obb.center().x, 0.0, epsilon = 1e-2);
        assert_relative_eq!(second.obb.center().x, 0.3, epsilon = 1e-2);
        Ok(())
    }

    #[test]
    fn test_estimate_all_keeps_failures_per_segment() -> Result<(), Box<dyn std::error::Error>> {
        let estimator = PoseEstimator::new(&EstimatorConfig::default())?;
        let good = solid_box(DVec3::new(0.0, 0.0, 0.5), DMat3::IDENTITY, SIZE, 8);

        let results = estimator.estimate_all([
            PointCloudSegment::new(1, good),
            PointCloudSegment::new(2, PointCloud::default()),
        ]);
        assert!(results[&1].is_ok());
        assert!(matches!(results[&2], Err(PoseEstimationError::EmptySegment(2))));
        Ok(())
    }
}
