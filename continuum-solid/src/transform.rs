use continuum::error::NumericError;
use continuum::Real;
use nalgebra::{Const, DimMin, SMatrix};

/// Transforms the Kirchhoff stress $\vec \tau$ to the first Piola-Kirchhoff stress
/// $\vec P = \vec \tau \vec F^{-T}$ with $\vec F = \vec I + \nabla \vec u$.
///
/// The transform solves $\vec F \vec X = \vec \tau^T$ and returns $\vec P = \vec X^T$, which
/// equals $\vec \tau \vec F^{-T}$ without forming the inverse.
///
/// Fails with [`NumericError::SingularDeformation`] if $\vec F$ is singular.
pub fn kirchhoff_to_piola<T, const D: usize>(
    kirchhoff: &SMatrix<T, D, D>,
    du_dx: &SMatrix<T, D, D>,
) -> Result<SMatrix<T, D, D>, NumericError>
where
    T: Real,
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    let deformation_gradient = du_dx + SMatrix::<T, D, D>::identity();
    let lu = deformation_gradient.lu();
    if !lu.is_invertible() {
        return Err(NumericError::SingularDeformation);
    }
    lu.solve(&kirchhoff.transpose())
        .map(|x| x.transpose())
        .ok_or(NumericError::SingularDeformation)
}
