//! Dense direct solves for small sparse systems.
use nalgebra::{DMatrix, DVectorView, DVectorViewMut, RealField};
use nalgebra_sparse::CsrMatrix;
use std::error::Error;
use std::fmt;

/// The system matrix is singular to working precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingularMatrixError {
    pub dimension: usize,
}

impl fmt::Display for SingularMatrixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LU factorization of {0}x{0} system matrix is singular", self.dimension)
    }
}

impl Error for SingularMatrixError {}

/// Solves `A x = b` by densifying `A` and performing an LU factorization with partial pivoting.
///
/// Intended for small systems and for verification, where robustness matters more than cost.
pub fn solve_dense_lu<'a, T>(
    matrix: &CsrMatrix<T>,
    b: impl Into<DVectorView<'a, T>>,
    x: impl Into<DVectorViewMut<'a, T>>,
) -> Result<(), SingularMatrixError>
where
    T: RealField + Copy,
{
    let b = b.into();
    let mut x = x.into();
    assert_eq!(matrix.nrows(), matrix.ncols(), "direct solve requires a square matrix");
    assert_eq!(matrix.nrows(), b.len());
    assert_eq!(b.len(), x.len());

    let dense = DMatrix::from(matrix);
    let solution = dense
        .lu()
        .solve(&b)
        .ok_or(SingularMatrixError { dimension: b.len() })?;
    x.copy_from(&solution);
    Ok(())
}
