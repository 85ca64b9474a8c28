use continuum_sparse::direct::{solve_dense_lu, SingularMatrixError};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

#[test]
fn dense_lu_solves_nonsymmetric_system() {
    #[rustfmt::skip]
    let dense = DMatrix::from_row_slice(3, 3, &[
        4.0, 1.0, 0.0,
        2.0, 5.0, 1.0,
        0.0, 3.0, 6.0,
    ]);
    let a = CsrMatrix::from(&dense);
    let x0 = DVector::from_column_slice(&[1.0, -2.0, 3.0]);
    let b = &dense * &x0;

    let mut x = DVector::zeros(3);
    solve_dense_lu(&a, &b, &mut x).unwrap();
    assert_matrix_eq!(x, x0, comp = abs, tol = 1e-12);
}

#[test]
fn dense_lu_detects_singular_matrix() {
    let dense = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
    let a = CsrMatrix::from(&dense);
    let b = DVector::from_column_slice(&[1.0, 1.0]);
    let mut x = DVector::zeros(2);
    assert_eq!(solve_dense_lu(&a, &b, &mut x), Err(SingularMatrixError { dimension: 2 }));
}
