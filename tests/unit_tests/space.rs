use continuum::boundary::{BoundaryConditions, Coefficient};
use continuum::error::{CoefficientRank, ConfigurationError};
use continuum::mesh::procedural::{create_rectangular_uniform_quad_mesh, create_unit_square_uniform_quad_mesh};
use continuum::space::{FiniteElementDual, FiniteElementSpace, FiniteElementState};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DVector, Vector2};
use std::sync::Arc;

fn scalar_space(cells: usize) -> Arc<FiniteElementSpace<2>> {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh(cells));
    Arc::new(FiniteElementSpace::new(mesh, 1).unwrap())
}

fn vector_space(cells: usize) -> Arc<FiniteElementSpace<2>> {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh(cells));
    Arc::new(FiniteElementSpace::new(mesh, 2).unwrap())
}

#[test]
fn dofs_are_node_major() {
    let space = vector_space(2);
    assert_eq!(space.num_nodes(), 9);
    assert_eq!(space.true_vsize(), 18);
    assert_eq!(space.num_element_dofs(), 8);
    // Cell 0 has the vertices [0, 1, 3, 4]
    assert_eq!(space.element_dofs(0), &[0, 1, 2, 3, 6, 7, 8, 9]);
}

#[test]
fn space_rejects_mesh_of_wrong_dimension() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh(1));
    let err = FiniteElementSpace::<3>::new(mesh, 1).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigurationError>(),
        Some(&ConfigurationError::DimensionMismatch { expected: 3, actual: 2 })
    );
}

#[test]
fn boundary_dofs_are_sorted_and_filtered_by_component() {
    let space = vector_space(2);
    // The left side x = 0 holds the nodes 0, 3 and 6
    assert_eq!(space.boundary_dofs(&[1], None), vec![0, 1, 6, 7, 12, 13]);
    assert_eq!(space.boundary_dofs(&[1], Some(1)), vec![1, 7, 13]);
    // Left and bottom share node 0
    assert_eq!(space.boundary_dofs(&[1, 3], Some(0)), vec![0, 2, 4, 6, 12]);
    assert!(space.boundary_dofs(&[42], None).is_empty());
}

#[test]
fn projection_interpolates_at_nodes() {
    let mesh = Arc::new(create_rectangular_uniform_quad_mesh(2.0, 1.0, 2, 1));
    let space = FiniteElementSpace::<2>::new(mesh, 1).unwrap();
    let values = space
        .project(&Coefficient::scalar(|x, t| x[0] + 2.0 * x[1] + t), 0.5)
        .unwrap();
    let expected = DVector::from_vec(vec![0.5, 1.5, 2.5, 2.5, 3.5, 4.5]);
    assert_matrix_eq!(values, expected, comp = abs, tol = 1e-14);
}

#[test]
fn coefficient_rank_is_checked() {
    let scalar = scalar_space(1);
    let vector = vector_space(1);
    let constant_vector = Coefficient::constant_vector(Vector2::new(1.0, 2.0));

    let err = scalar.project(&constant_vector, 0.0).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigurationError>(),
        Some(&ConfigurationError::CoefficientRank {
            expected: CoefficientRank::Scalar,
            found: CoefficientRank::Vector
        })
    );

    assert!(vector
        .check_coefficient(&Coefficient::constant_scalar(1.0), None)
        .is_err());
    assert!(vector
        .check_coefficient(&Coefficient::constant_scalar(1.0), Some(1))
        .is_ok());
    assert_eq!(
        vector.check_coefficient(&Coefficient::constant_scalar(1.0), Some(2)),
        Err(ConfigurationError::ComponentOutOfRange {
            component: 2,
            components: 2
        })
    );

    let values = vector.project(&constant_vector, 0.0).unwrap();
    assert_eq!(values.as_slice(), &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
}

#[test]
fn state_gather_and_scatter() {
    let space = scalar_space(1);
    let mut state = FiniteElementState::new("temperature", space.clone());
    assert_eq!(state.name(), "temperature");

    state.true_vec_mut().fill(3.0);
    // The local representation is only updated by an explicit scatter
    assert_eq!(state.grid_function().sum(), 0.0);
    state.distribute_shared_dofs();
    assert_eq!(state.grid_function().sum(), 12.0);

    state.true_vec_mut().fill(0.0);
    state.initialize_true_vec();
    assert_eq!(state.true_vec().sum(), 12.0);

    state.set_true_vec(&DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]));
    assert_eq!(state.grid_function().as_slice(), &[1.0, 2.0, 3.0, 4.0]);

    let dual = FiniteElementDual::new("load", space);
    assert_eq!(dual.true_vec().len(), 4);
}

#[test]
fn boundary_conditions_collect_and_project() {
    let space = vector_space(2);
    let mut bcs = BoundaryConditions::default();
    bcs.add_essential(&[1], Coefficient::constant_vector(Vector2::new(0.0, 0.0)), None);
    bcs.add_essential(&[2], Coefficient::scalar(|x, t| x[1] * t), Some(0));
    bcs.setup(&space).unwrap();

    assert_eq!(bcs.essential()[0].dofs(), &[0, 1, 6, 7, 12, 13]);
    assert_eq!(bcs.essential()[1].dofs(), &[4, 10, 16]);
    assert_eq!(bcs.true_dofs(), vec![0, 1, 4, 6, 7, 10, 12, 13, 16]);

    let mut target = DVector::from_element(space.true_vsize(), -1.0);
    bcs.project(&space, 2.0, &mut target);
    assert_eq!(target[0], 0.0);
    assert_eq!(target[4], 0.0);
    assert_eq!(target[10], 1.0);
    assert_eq!(target[16], 2.0);
    // Unconstrained entries are untouched
    assert_eq!(target[5], -1.0);
}

#[test]
fn boundary_condition_with_wrong_rank_fails_setup() {
    let space = scalar_space(1);
    let mut bcs = BoundaryConditions::default();
    bcs.add_essential(&[1], Coefficient::constant_vector(Vector2::new(1.0, 0.0)), None);
    assert!(matches!(
        bcs.setup(&space),
        Err(ConfigurationError::CoefficientRank { .. })
    ));
}
