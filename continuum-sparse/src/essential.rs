//! Elimination of essential (Dirichlet) degrees of freedom from assembled CSR systems.
//!
//! All functions take sorted lists of constrained degrees of freedom. The sparsity pattern is
//! never modified, so constrained rows are expected to contain their diagonal entry, which holds
//! for any matrix assembled from a conforming finite element discretization.
use nalgebra::{DVector, DVectorView, RealField};
use nalgebra_sparse::CsrMatrix;

fn is_constrained(sorted_dofs: &[usize], index: usize) -> bool {
    sorted_dofs.binary_search(&index).is_ok()
}

fn assert_sorted(dofs: &[usize]) {
    assert!(
        dofs.windows(2).all(|w| w[0] < w[1]),
        "constrained degrees of freedom must be sorted and unique"
    );
}

/// Zeros every row of `matrix` that corresponds to a constrained degree of freedom.
pub fn zero_rows_csr<T: RealField + Copy>(matrix: &mut CsrMatrix<T>, dofs: &[usize]) {
    assert_sorted(dofs);
    for &i in dofs {
        let mut row = matrix.row_mut(i);
        row.values_mut().fill(T::zero());
    }
}

/// Zeros the rows and columns of the constrained degrees of freedom, and places a unit value on
/// the diagonal of each constrained row.
///
/// # Panics
///
/// Panics if the matrix is not square or a constrained row has no diagonal entry.
pub fn apply_homogeneous_essential_dofs_csr<T: RealField + Copy>(matrix: &mut CsrMatrix<T>, dofs: &[usize]) {
    assert_eq!(matrix.nrows(), matrix.ncols(), "essential dof elimination requires a square matrix");
    assert_sorted(dofs);

    for i in 0..matrix.nrows() {
        let row_is_constrained = is_constrained(dofs, i);
        let mut found_diagonal = false;
        let mut row = matrix.row_mut(i);
        let (cols, values) = row.cols_and_values_mut();
        for (&j, v) in cols.iter().zip(values.iter_mut()) {
            if row_is_constrained && i == j {
                *v = T::one();
                found_diagonal = true;
            } else if row_is_constrained || is_constrained(dofs, j) {
                *v = T::zero();
            }
        }
        assert!(
            !row_is_constrained || found_diagonal,
            "constrained row {} has no diagonal entry in the sparsity pattern",
            i
        );
    }
}

/// Eliminates constrained degrees of freedom from the system `A x = b` for prescribed values
/// `x_i = g_i`.
///
/// Column contributions of the prescribed values are moved to the right-hand side, after which
/// the constrained rows and columns are replaced by unit rows, and `b_i = g_i` for every
/// constrained `i`. The solution of the modified system therefore satisfies the constraints
/// exactly.
pub fn eliminate_essential_dofs_csr<'a, T: RealField + Copy>(
    matrix: &mut CsrMatrix<T>,
    rhs: &mut DVector<T>,
    dofs: &[usize],
    values: impl Into<DVectorView<'a, T>>,
) {
    let values = values.into();
    assert_eq!(matrix.nrows(), rhs.len());
    assert_eq!(matrix.ncols(), values.len());
    assert_sorted(dofs);

    for (i, j, &v) in matrix.triplet_iter() {
        if !is_constrained(dofs, i) && is_constrained(dofs, j) {
            rhs[i] -= v * values[j];
        }
    }
    for &i in dofs {
        rhs[i] = values[i];
    }
    apply_homogeneous_essential_dofs_csr(matrix, dofs);
}
