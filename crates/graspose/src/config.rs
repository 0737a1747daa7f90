use std::path::Path;

use graspose_3d::{normals::NormalEstimationParams, pose::PoseMatrix, transforms::FrameChain};
use serde::{Deserialize, Serialize};

/// Depth range in meters kept by the z crop when it is enabled without bounds.
pub const DEFAULT_Z_RANGE: [f64; 2] = [0.2, 1.8];

const IDENTITY_ROWS: [[f64; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Error types for the configuration module.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON for [`EstimatorConfig`]
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The z range is empty or not finite
    #[error("Invalid z range [{0}, {1}]")]
    InvalidZRange(f64, f64),
}

/// Configuration of a [`crate::estimator::PoseEstimator`].
///
/// Matrices are given row major, as written in a JSON file:
///
/// ```json
/// {
///   "init_ef_matrix": [[1, 0, 0, 0.4], [0, 1, 0, 0], [0, 0, 1, 0.6], [0, 0, 0, 1]],
///   "cam_offset_matrix": [[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0.1], [0, 0, 0, 1]],
///   "normals": { "knn": 30 },
///   "z_range": [0.2, 1.8],
///   "strict_frames": true
/// }
/// ```
///
/// Every field is optional and falls back to [`EstimatorConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// End-effector pose in the world frame when the clouds were captured.
    pub init_ef_matrix: [[f64; 4]; 4],
    /// Camera pose in the end-effector frame.
    pub cam_offset_matrix: [[f64; 4]; 4],
    /// Normal estimation run before the box fit.
    pub normals: NormalEstimationParams,
    /// Keep only points whose depth lies in this closed range, if set.
    pub z_range: Option<[f64; 2]>,
    /// Reject non rigid `init_ef_matrix` or `cam_offset_matrix`.
    pub strict_frames: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            init_ef_matrix: IDENTITY_ROWS,
            cam_offset_matrix: IDENTITY_ROWS,
            normals: NormalEstimationParams::default(),
            z_range: None,
            strict_frames: false,
        }
    }
}

impl EstimatorConfig {
    /// Parse and validate a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a configuration from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Serialize the configuration as pretty printed JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the z range, when set, is finite and not reversed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some([z_min, z_max]) = self.z_range {
            if !z_min.is_finite() || !z_max.is_finite() || z_min > z_max {
                return Err(ConfigError::InvalidZRange(z_min, z_max));
            }
        }
        Ok(())
    }

    /// The camera to world frame chain described by the two matrices.
    pub fn frame_chain(&self) -> FrameChain {
        FrameChain::new(
            PoseMatrix::from_rows(&self.init_ef_matrix),
            PoseMatrix::from_rows(&self.cam_offset_matrix),
        )
    }
}
