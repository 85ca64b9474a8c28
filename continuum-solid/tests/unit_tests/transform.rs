use continuum::error::NumericError;
use continuum::proptest::displacement_gradient;
use continuum::{seeded, Real};
use continuum_solid::kirchhoff_to_piola;
use matrixcompare::assert_matrix_eq;
use nalgebra::{matrix, Matrix2, Matrix3};
use proptest::prelude::*;

#[test]
fn piola_equals_kirchhoff_without_deformation() {
    let tau = matrix![1.0, 2.0;
                      2.0, -3.0];
    let piola = kirchhoff_to_piola(&tau, &Matrix2::zeros()).unwrap();
    assert_matrix_eq!(piola, tau, comp = abs, tol = 1e-15);
}

#[test]
fn piola_of_uniform_stretch() {
    // F = diag(2, 1, 1) gives P = τ F^{-T}
    let du_dx = matrix![1.0, 0.0, 0.0;
                        0.0, 0.0, 0.0;
                        0.0, 0.0, 0.0];
    let tau = matrix![4.0, 0.0, 1.0;
                      0.0, 2.0, 0.0;
                      1.0, 0.0, 3.0];
    let expected = matrix![2.0, 0.0, 1.0;
                           0.0, 2.0, 0.0;
                           0.5, 0.0, 3.0];
    let piola = kirchhoff_to_piola(&tau, &du_dx).unwrap();
    assert_matrix_eq!(piola, expected, comp = abs, tol = 1e-14);
}

#[test]
fn singular_deformation_is_reported() {
    let du_dx = -Matrix3::<f64>::identity();
    let tau = Matrix3::identity();
    assert!(matches!(
        kirchhoff_to_piola(&tau, &du_dx),
        Err(NumericError::SingularDeformation)
    ));

    // Rank deficient deformation gradient: the second row of F vanishes
    let du_dx = matrix![0.0, 0.0;
                        0.0, -1.0];
    assert!(kirchhoff_to_piola(&Matrix2::identity(), &du_dx).is_err());
}

#[test]
fn transform_propagates_derivatives() {
    let du_dx = matrix![0.1, 0.0;
                        0.0, 0.0];
    let tau = Matrix2::<f64>::identity();
    let mut dual_du_dx = du_dx.map(|v| seeded(v, 0.0));
    dual_du_dx[(0, 0)] = seeded(0.1, 1.0);

    let piola = kirchhoff_to_piola(&tau.map(|v| seeded(v, 0.0)), &dual_du_dx).unwrap();
    // P_00 = 1 / (1 + H_00)
    assert!((piola[(0, 0)].value() - 1.0 / 1.1).abs() < 1e-14);
    assert!((Real::derivative(&piola[(0, 0)]) + 1.0 / (1.1 * 1.1)).abs() < 1e-14);
    assert!(Real::derivative(&piola[(1, 1)]).abs() < 1e-14);
}

proptest! {
    #[test]
    fn piola_transform_round_trip(
        du_dx in displacement_gradient::<3>(0.3),
        a in displacement_gradient::<3>(10.0),
    ) {
        let tau = a + a.transpose();
        let piola = kirchhoff_to_piola(&tau, &du_dx).unwrap();
        let deformation_gradient = Matrix3::identity() + du_dx;
        let recovered = piola * deformation_gradient.transpose();
        prop_assert!((recovered - tau).norm() <= 1e-10 * (1.0 + tau.norm()));
    }
}
