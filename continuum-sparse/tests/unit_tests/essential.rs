use continuum_sparse::direct::solve_dense_lu;
use continuum_sparse::essential::{apply_homogeneous_essential_dofs_csr, eliminate_essential_dofs_csr, zero_rows_csr};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

#[rustfmt::skip]
fn system_matrix() -> DMatrix<f64> {
    DMatrix::from_row_slice(4, 4, &[
         4.0, -1.0,  0.0, -1.0,
        -1.0,  4.0, -1.0,  0.0,
         0.0, -1.0,  4.0, -1.0,
        -1.0,  0.0, -1.0,  4.0,
    ])
}

#[test]
fn homogeneous_elimination_replaces_rows_and_columns_by_identity() {
    let mut a = CsrMatrix::from(&system_matrix());
    apply_homogeneous_essential_dofs_csr(&mut a, &[0, 2]);

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(4, 4, &[
        1.0,  0.0, 0.0,  0.0,
        0.0,  4.0, 0.0,  0.0,
        0.0,  0.0, 1.0,  0.0,
        0.0,  0.0, 0.0,  4.0,
    ]);
    assert_matrix_eq!(DMatrix::from(&a), expected);
}

#[test]
fn zero_rows_keeps_columns() {
    let mut a = CsrMatrix::from(&system_matrix());
    zero_rows_csr(&mut a, &[1]);
    let dense = DMatrix::from(&a);
    assert_eq!(dense.row(1).norm(), 0.0);
    assert_eq!(dense[(0, 1)], -1.0);
}

#[test]
fn elimination_with_prescribed_values_matches_constrained_solution() {
    let a_dense = system_matrix();
    let b = DVector::from_column_slice(&[1.0, 2.0, 3.0, 4.0]);
    let g = DVector::from_column_slice(&[0.5, 0.0, -1.0, 0.0]);
    let constrained = [0, 2];

    let mut a = CsrMatrix::from(&a_dense);
    let mut rhs = b.clone();
    eliminate_essential_dofs_csr(&mut a, &mut rhs, &constrained, &g);
    let mut x = DVector::zeros(4);
    solve_dense_lu(&a, &rhs, &mut x).unwrap();

    // Solve the reduced system for the free unknowns directly
    let free = [1, 3];
    let a_ff = DMatrix::from_fn(2, 2, |i, j| a_dense[(free[i], free[j])]);
    let rhs_f = DVector::from_fn(2, |i, _| {
        b[free[i]] - constrained.iter().map(|&c| a_dense[(free[i], c)] * g[c]).sum::<f64>()
    });
    let x_f = a_ff.lu().solve(&rhs_f).unwrap();

    assert_eq!(x[0], 0.5);
    assert_eq!(x[2], -1.0);
    assert_matrix_eq!(DVector::from_column_slice(&[x[1], x[3]]), x_f, comp = abs, tol = 1e-12);
}

#[test]
#[should_panic(expected = "sorted and unique")]
fn unsorted_dofs_are_rejected() {
    let mut a = CsrMatrix::from(&system_matrix());
    apply_homogeneous_essential_dofs_csr(&mut a, &[2, 0]);
}
