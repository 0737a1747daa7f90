use glam::{DMat3, DVec3};

/// Eigendecomposition of a symmetric 3x3 matrix.
///
/// # Arguments
///
/// * `mat` - A symmetric matrix, e.g. a covariance matrix.
///
/// # Returns
///
/// The eigenvalues sorted in decreasing order and the matrix whose columns are
/// the corresponding unit eigenvectors.
///
/// PRECONDITION: `mat` is symmetric. Only the lower triangle is read.
///
/// Example:
///
/// ```
/// use glam::{DMat3, DVec3};
/// use graspose_3d::linalg::symmetric_eigen3;
///
/// let m = DMat3::from_diagonal(DVec3::new(1.0, 3.0, 2.0));
/// let (values, _vectors) = symmetric_eigen3(&m);
/// assert!((values[0] - 3.0).abs() < 1e-12);
/// ```
pub fn symmetric_eigen3(mat: &DMat3) -> ([f64; 3], DMat3) {
    let m = faer::Mat::<f64>::from_fn(3, 3, |i, j| mat.col(j)[i]);
    let eig = m.selfadjoint_eigendecomposition(faer::Side::Lower);
    let u = eig.u();

    let mut pairs = (0..3)
        .map(|j| {
            let v = DVec3::new(u.read(0, j), u.read(1, j), u.read(2, j));
            // Rayleigh quotient of a unit vector is its eigenvalue
            (v.dot(*mat * v), v)
        })
        .collect::<Vec<_>>();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    (
        [pairs[0].0, pairs[1].0, pairs[2].0],
        DMat3::from_cols(pairs[0].1, pairs[1].1, pairs[2].1),
    )
}

/// Check whether the columns of `mat` form an orthonormal basis.
///
/// Tests `|RᵀR − I| <= tol` entry-wise.
pub fn is_orthonormal(mat: &DMat3, tol: f64) -> bool {
    let gram = mat.transpose() * *mat;
    gram.abs_diff_eq(DMat3::IDENTITY, tol)
}
