use glam::DVec3;

use crate::obb::OrientedBoundingBox;

/// Edge length at or below which a box axis has no usable direction.
pub const ZERO_LENGTH_EPS: f64 = 1e-9;

/// Error types for the axis selection module.
#[derive(Debug, thiserror::Error)]
pub enum AxisError {
    /// A box edge has (almost) zero length, so it has no direction.
    #[error("Box axis {index} has zero length ({length})")]
    ZeroLengthAxis {
        /// Index of the offending edge.
        index: usize,
        /// Its length.
        length: f64,
    },

    /// The axis policy returned indices that are out of range or equal.
    #[error("Invalid axis selection: facing {facing}, normal {normal}")]
    InvalidSelection {
        /// Facing index returned by the policy.
        facing: usize,
        /// Normal index returned by the policy.
        normal: usize,
    },
}

/// A direction anchored at a point, as drawn for a box axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisArrow {
    /// Where the arrow starts.
    pub origin: DVec3,
    /// Unit direction of the arrow.
    pub direction: DVec3,
    /// Length of the box edge the arrow stands for.
    pub length: f64,
}

/// One box axis with its semantic role resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedAxis {
    /// Index of the axis among the three box edges.
    pub index: usize,
    /// The raw edge vector.
    pub vector: DVec3,
    /// `vector` divided by its norm.
    pub unit: DVec3,
    /// Arrow anchored at the box center.
    pub arrow: AxisArrow,
}

impl SelectedAxis {
    /// Length of the edge.
    pub fn length(&self) -> f64 {
        self.arrow.length
    }
}

/// Facing, normal and third roles assigned to three distinct box axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisClassification {
    /// The grasp-approach direction.
    pub facing: SelectedAxis,
    /// The dominant surface-normal direction.
    pub normal: SelectedAxis,
    /// The remaining axis.
    pub third: SelectedAxis,
}

impl AxisClassification {
    /// Offset along the normal axis from the box center to its face: half the
    /// normal edge length.
    pub fn approach_offset(&self) -> f64 {
        0.5 * self.normal.length()
    }
}

/// Decides which box axis plays which role.
pub trait AxisPolicy {
    /// Return the `(facing, normal)` edge indices for the given edge lengths.
    ///
    /// The two indices must differ and be in `0..3`, otherwise the
    /// classification fails with [`AxisError::InvalidSelection`].
    fn select(&self, edge_lengths: &[f64; 3]) -> (usize, usize);
}

/// The shortest edge faces the gripper, the longest edge is the surface normal.
///
/// Ties resolve to the lower index. When all three lengths are equal the
/// normal role goes to the lowest index other than the facing one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortestFacingPolicy;

impl AxisPolicy for ShortestFacingPolicy {
    fn select(&self, edge_lengths: &[f64; 3]) -> (usize, usize) {
        let mut facing = 0;
        let mut normal = 0;
        for (i, &length) in edge_lengths.iter().enumerate().skip(1) {
            if length < edge_lengths[facing] {
                facing = i;
            }
            if length > edge_lengths[normal] {
                normal = i;
            }
        }
        if facing == normal {
            normal = if facing == 0 { 1 } else { 0 };
        }
        (facing, normal)
    }
}

/// Classify three box edges into facing, normal and third axes.
///
/// # Arguments
///
/// * `edge_vectors` - The three edge vectors of a box.
/// * `edge_lengths` - Their lengths.
///
/// # Returns
///
/// The classification with arrows anchored at the origin, or
/// [`AxisError::ZeroLengthAxis`] if any edge is degenerate.
///
/// Example:
///
/// ```
/// use glam::DVec3;
/// use graspose_3d::axes::classify_axes;
///
/// let vectors = [DVec3::X, DVec3::Y * 2.0, DVec3::Z * 0.5];
/// let axes = classify_axes(&vectors, &[1.0, 2.0, 0.5]).unwrap();
/// assert_eq!(axes.facing.index, 2);
/// assert_eq!(axes.normal.index, 1);
/// ```
pub fn classify_axes(
    edge_vectors: &[DVec3; 3],
    edge_lengths: &[f64; 3],
) -> Result<AxisClassification, AxisError> {
    classify_axes_with(&ShortestFacingPolicy, edge_vectors, edge_lengths, DVec3::ZERO)
}

/// Classify the edges of a box, anchoring the arrows at the box center.
pub fn classify_box_axes(obb: &OrientedBoundingBox) -> Result<AxisClassification, AxisError> {
    classify_axes_with(
        &ShortestFacingPolicy,
        &obb.edge_vectors(),
        &obb.edge_lengths(),
        obb.center(),
    )
}

/// Classify three box edges with a custom role policy.
///
/// # Arguments
///
/// * `policy` - Picks the facing and normal edges.
/// * `edge_vectors` - The three edge vectors of a box.
/// * `edge_lengths` - Their lengths.
/// * `origin` - Anchor of the returned arrows.
pub fn classify_axes_with<P: AxisPolicy + ?Sized>(
    policy: &P,
    edge_vectors: &[DVec3; 3],
    edge_lengths: &[f64; 3],
    origin: DVec3,
) -> Result<AxisClassification, AxisError> {
    for (index, &length) in edge_lengths.iter().enumerate() {
        if !length.is_finite() || length <= ZERO_LENGTH_EPS {
            return Err(AxisError::ZeroLengthAxis { index, length });
        }
    }

    let (facing, normal) = policy.select(edge_lengths);
    if facing >= 3 || normal >= 3 || facing == normal {
        return Err(AxisError::InvalidSelection { facing, normal });
    }
    let third = 3 - facing - normal;

    let select = |index: usize| -> Result<SelectedAxis, AxisError> {
        let vector = edge_vectors[index];
        let norm = vector.length();
        if norm <= ZERO_LENGTH_EPS {
            return Err(AxisError::ZeroLengthAxis {
                index,
                length: norm,
            });
        }
        let unit = vector / norm;
        Ok(SelectedAxis {
            index,
            vector,
            unit,
            arrow: AxisArrow {
                origin,
                direction: unit,
                length: edge_lengths[index],
            },
        })
    };

    let classification = AxisClassification {
        facing: select(facing)?,
        normal: select(normal)?,
        third: select(third)?,
    };

    log::debug!(
        "axes: facing #{} ({:.4} m), normal #{} ({:.4} m)",
        facing,
        edge_lengths[facing],
        normal,
        edge_lengths[normal]
    );

    Ok(classification)
}
