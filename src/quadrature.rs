//! Gauss quadrature on the reference cube `[-1, 1]^D` and its faces.
use itertools::Itertools;
use nalgebra::{DMatrix, SVector};
use std::cmp::Ordering;

/// A quadrature rule given as a pair of weights and points.
pub type Rule<const D: usize> = (Vec<f64>, Vec<SVector<f64, D>>);

/// Symmetric tridiagonal Jacobi matrix of the Legendre polynomials.
///
/// The three-term recurrence `x P_k = b_{k+1} P_{k+1} + b_k P_{k-1}` for the orthonormal
/// Legendre polynomials has zero diagonal and `b_k = k / sqrt(4 k^2 - 1)`.
fn legendre_jacobi_matrix(n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| {
        if i.abs_diff(j) == 1 {
            let k = i.max(j) as f64;
            k / (4.0 * k * k - 1.0).sqrt()
        } else {
            0.0
        }
    })
}

/// Gauss quadrature for the reference interval [-1, 1], with points in ascending order.
///
/// Given `n` points, the rule integrates polynomials of order up to `2 n - 1` exactly.
/// Points are the eigenvalues of the Jacobi matrix and each weight is `2 v_0^2`, where `v` is
/// the normalized eigenvector of the point (Golub-Welsch).
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> (Vec<f64>, Vec<f64>) {
    assert!(num_points > 0, "number of points must be positive");
    let eigen = legendre_jacobi_matrix(num_points).symmetric_eigen();

    let (points, weights): (Vec<_>, Vec<_>) = eigen
        .eigenvalues
        .iter()
        .zip(eigen.eigenvectors.row(0).iter())
        .map(|(&x, &v0)| (x, 2.0 * v0 * v0))
        .sorted_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal))
        .unzip();

    // The rule is symmetric about the origin
    let n = num_points;
    let points: Vec<f64> = (0..n).map(|i| 0.5 * (points[i] - points[n - 1 - i])).collect();
    let weights: Vec<f64> = (0..n).map(|i| 0.5 * (weights[i] + weights[n - 1 - i])).collect();
    (weights, points)
}

/// Tensor-product Gauss rule on the reference cube `[-1, 1]^D`.
///
/// Points are ordered lexicographically with the first coordinate varying fastest.
pub fn tensor_gauss<const D: usize>(num_points_per_dim: usize) -> Rule<D> {
    let (weights1d, points1d) = gauss(num_points_per_dim);
    let n = num_points_per_dim;
    let total = n.pow(D as u32);

    let mut weights = Vec::with_capacity(total);
    let mut points = Vec::with_capacity(total);
    for index in 0..total {
        let mut remainder = index;
        let mut w = 1.0;
        let mut xi = SVector::<f64, D>::zeros();
        for k in 0..D {
            let i = remainder % n;
            remainder /= n;
            w *= weights1d[i];
            xi[k] = points1d[i];
        }
        weights.push(w);
        points.push(xi);
    }
    (weights, points)
}

/// Gauss rule on a face of the reference cube, expressed in reference cube coordinates.
///
/// Faces are numbered `2 k + s`, where `k` is the coordinate held fixed and `s = 0` places it
/// at `-1`, `s = 1` at `+1`. The weights integrate over the `(D - 1)`-dimensional reference face.
pub fn face_gauss<const D: usize>(num_points_per_dim: usize, local_face: usize) -> Rule<D> {
    assert!(local_face < 2 * D, "face index out of range");
    let fixed_dim = local_face / 2;
    let fixed_value = if local_face % 2 == 0 { -1.0 } else { 1.0 };

    let (weights1d, points1d) = gauss(num_points_per_dim);
    let n = num_points_per_dim;
    let total = n.pow(D as u32 - 1);

    let mut weights = Vec::with_capacity(total);
    let mut points = Vec::with_capacity(total);
    for index in 0..total {
        let mut remainder = index;
        let mut w = 1.0;
        let mut xi = SVector::<f64, D>::zeros();
        for k in (0..D).filter(|&k| k != fixed_dim) {
            let i = remainder % n;
            remainder /= n;
            w *= weights1d[i];
            xi[k] = points1d[i];
        }
        xi[fixed_dim] = fixed_value;
        weights.push(w);
        points.push(xi);
    }
    (weights, points)
}
