//! Strategies for property-based testing of meshes and constitutive models.
use crate::mesh::procedural::create_box_mesh;
use crate::mesh::Mesh;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::{SMatrix, SVector};

pub fn point<const D: usize>() -> impl Strategy<Value = SVector<f64, D>> {
    // Keep coordinates in a moderate range so that derived quantities stay well conditioned
    vec(-10.0..10.0f64, D).prop_map(|coords| SVector::from_column_slice(&coords))
}

/// Displacement gradients `H = ∇u` with entries bounded by `max_entry`.
///
/// For `max_entry < 1 / D` the deformation gradient `F = I + H` is guaranteed to be invertible
/// with a positive determinant.
pub fn displacement_gradient<const D: usize>(max_entry: f64) -> impl Strategy<Value = SMatrix<f64, D, D>> {
    vec(-max_entry..=max_entry, D * D).prop_map(|entries| SMatrix::from_column_slice(&entries))
}

/// Box meshes with between one and `max_cells_per_dim` cells along each axis and
/// extents in `[0.5, 2]`.
pub fn box_mesh<const D: usize>(max_cells_per_dim: usize) -> impl Strategy<Value = Mesh> {
    let cells = vec(1..=max_cells_per_dim.max(1), D);
    let extents = vec(0.5..=2.0f64, D);
    (extents, cells).prop_map(|(extents, cells)| {
        create_box_mesh::<D>(std::array::from_fn(|i| extents[i]), std::array::from_fn(|i| cells[i]))
    })
}
