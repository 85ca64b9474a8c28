use continuum_optimize::calculus::*;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};

#[test]
fn approximate_jacobian_simple_function() {
    let f = |x: DVectorView<f64>, mut f: DVectorViewMut<f64>| {
        let (x1, x2) = (x[0], x[1]);
        f[0] = x1 * x2 + 3.0;
        f[1] = x1 * x1 + x2 * x2 + x1 + 5.0;
    };

    let mut x = DVector::from_column_slice(&[3.0, 4.0]);
    let j = approximate_jacobian_fd(2, f, &mut x, 1e-6);

    // J = [   x2           x1 ]
    //     [ 2*x1 + 1     2*x2 ]
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(2, 2,
                                           &[4.0, 3.0,
                                             7.0, 8.0]);

    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-6);
    // The evaluation point is restored
    assert_eq!(x, DVector::from_column_slice(&[3.0, 4.0]));
}

#[test]
fn test_approximate_gradient_fd() {
    let f = |x: DVectorView<f64>| {
        let (x, y, z) = (x[0], x[1], x[2]);
        3.0 * x * x * x + 3.0 * x * y - 5.0 * z * z + 2.0
    };
    let f_grad = |x: &DVector<f64>| {
        let (x, y, z) = (x[0], x[1], x[2]);
        DVector::from_column_slice(&[9.0 * x * x + 3.0 * y, 3.0 * x, -10.0 * z])
    };

    let mut x = DVector::from_column_slice(&[3.0, 4.0, 5.0]);
    let f_grad_fd = approximate_gradient_fd(f, &mut x, 1e-6);

    assert_matrix_eq!(f_grad_fd, f_grad(&x), comp = abs, tol = 1e-6);
}

#[test]
fn vector_function_builder_forwards_calls() {
    let mut function = VectorFunctionBuilder::with_dimension(2).with_function(
        |f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| -> Result<(), FunctionError> {
            f[0] = 2.0 * x[0];
            f[1] = x[0] + x[1];
            Ok(())
        },
    );

    let x = DVector::from_column_slice(&[1.0, 2.0]);
    let mut f = DVector::zeros(2);
    function
        .eval_into(&mut DVectorViewMut::from(&mut f), &DVectorView::from(&x))
        .unwrap();
    assert_eq!(function.dimension(), 2);
    assert_eq!(f, DVector::from_column_slice(&[2.0, 3.0]));
}
