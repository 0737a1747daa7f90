/// A point cloud with points, colors, and normals.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The colors of the points.
    colors: Option<Vec<[u8; 3]>>,
    // The normals of the points.
    normals: Option<Vec<[f64; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points, colors (optional), and normals (optional).
    pub fn new(
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[u8; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Self {
        Self {
            points,
            colors,
            normals,
        }
    }

    /// Create a point cloud holding only positions.
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        Self::new(points, None, None)
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the colors of the points in the point cloud.
    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    /// Return a copy of the cloud carrying the given normals.
    ///
    /// PRECONDITION: `normals.len() == self.len()`.
    pub fn with_normals(&self, normals: Vec<[f64; 3]>) -> Self {
        assert_eq!(normals.len(), self.points.len());
        Self {
            points: self.points.clone(),
            colors: self.colors.clone(),
            normals: Some(normals),
        }
    }
}

/// One object instance: a clean cloud, optionally paired with a noisy capture
/// of the same object.
#[derive(Debug, Clone)]
pub struct PointCloudSegment {
    /// Segment identifier as assigned by the segmentation / grasp network.
    pub id: u32,
    clean: PointCloud,
    noisy: Option<PointCloud>,
}

impl PointCloudSegment {
    /// Create a segment from its clean cloud.
    pub fn new(id: u32, clean: PointCloud) -> Self {
        Self {
            id,
            clean,
            noisy: None,
        }
    }

    /// Attach the noisy variant used for box fitting.
    pub fn with_noisy(mut self, noisy: PointCloud) -> Self {
        self.noisy = Some(noisy);
        self
    }

    /// The clean cloud.
    pub fn clean(&self) -> &PointCloud {
        &self.clean
    }

    /// The noisy cloud, if any.
    pub fn noisy(&self) -> Option<&PointCloud> {
        self.noisy.as_ref()
    }

    /// The cloud the bounding box is fitted on: the noisy variant when present.
    pub fn fitting_cloud(&self) -> &PointCloud {
        self.noisy.as_ref().unwrap_or(&self.clean)
    }
}
