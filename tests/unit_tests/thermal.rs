use continuum::boundary::Coefficient;
use continuum::error::ConfigurationError;
use continuum::mesh::procedural::{create_rectangular_uniform_hex_mesh, create_unit_square_uniform_quad_mesh};
use continuum::mesh::Mesh;
use continuum::solvers::{
    default_dynamic_options, default_quasistatic_options, DirichletEnforcementMethod, LinearSolverMethod,
    LinearSolverOptions, NonlinearSolverOptions, SolverOptions, TimesteppingOptions,
};
use continuum::space::FiniteElementDual;
use continuum::thermal::{
    ConstantFlux, ConstantSource, ConvectiveFlux, LinearIsotropicConductor, ParameterizedLinearIsotropicConductor,
    SourceFunction, ThermalConduction,
};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, Vector2};
use std::sync::Arc;

fn tight(mut options: SolverOptions) -> SolverOptions {
    options.linear = LinearSolverOptions {
        method: LinearSolverMethod::Direct,
        ..LinearSolverOptions::default()
    };
    options.nonlinear = NonlinearSolverOptions {
        rel_tol: 1e-12,
        abs_tol: 1e-12,
        max_iter: 20,
        ..NonlinearSolverOptions::default()
    };
    options
}

fn unit_square(cells: usize) -> Arc<Mesh> {
    Arc::new(create_unit_square_uniform_quad_mesh(cells))
}

fn node_x(thermal: &ThermalConduction<2>, node: usize) -> f64 {
    thermal.space().node_coordinates(node)[0]
}

fn assert_nodal_values(thermal: &ThermalConduction<2>, exact: impl Fn(f64) -> f64) {
    let u = thermal.temperature().true_vec();
    for node in 0..u.len() {
        assert_scalar_eq!(u[node], exact(node_x(thermal, node)), comp = abs, tol = 1e-10);
    }
}

#[test]
fn quasistatic_linear_profile() {
    let mut thermal = ThermalConduction::<2>::new(unit_square(4), tight(default_quasistatic_options()), "thermal", 0).unwrap();
    thermal.set_material(LinearIsotropicConductor::default()).unwrap();
    thermal.set_temperature_bcs(&[1], Coefficient::constant_scalar(1.0));
    thermal.set_temperature_bcs(&[2], Coefficient::constant_scalar(3.0));
    thermal.complete_setup().unwrap();
    assert_eq!(thermal.temperature().name(), "thermal_temperature");

    let dt = thermal.advance_timestep(1.0).unwrap();
    assert_eq!(dt, 1.0);
    assert_eq!(thermal.cycle(), 1);
    assert_eq!(thermal.time(), 1.0);
    assert_nodal_values(&thermal, |x| 1.0 + 2.0 * x);
    // The local representation is synchronized after the step
    assert_eq!(thermal.temperature().grid_function(), thermal.temperature().true_vec());
}

#[test]
fn quasistatic_source_and_flux() {
    // -u'' = 2 with u(0) = 0 and an outward flux of 1 at x = 1
    let mut thermal = ThermalConduction::<2>::new(unit_square(4), tight(default_quasistatic_options()), "", 0).unwrap();
    thermal.set_material(LinearIsotropicConductor::default()).unwrap();
    thermal.set_source(ConstantSource { value: 2.0 }).unwrap();
    thermal.set_flux_bcs(&[2], ConstantFlux { value: 1.0 }).unwrap();
    thermal.set_temperature_bcs(&[1], Coefficient::constant_scalar(0.0));
    thermal.complete_setup().unwrap();
    thermal.advance_timestep(1.0).unwrap();
    assert_nodal_values(&thermal, |x| x - x * x);
}

#[test]
fn quasistatic_source_function() {
    // -u'' = 6 x with u(0) = u(1) = 0 has the solution x - x^3, which Q1 elements
    // reproduce at the nodes
    let mut thermal = ThermalConduction::<2>::new(unit_square(4), tight(default_quasistatic_options()), "", 0).unwrap();
    thermal.set_material(LinearIsotropicConductor::default()).unwrap();
    thermal
        .set_source(SourceFunction::new(|x: &Vector2<f64>, _| 6.0 * x[0]))
        .unwrap();
    thermal.set_temperature_bcs(&[1, 2], Coefficient::constant_scalar(0.0));
    thermal.complete_setup().unwrap();
    thermal.advance_timestep(1.0).unwrap();
    let u = thermal.temperature().true_vec();
    // Node 2 lies at x = 0.5
    assert_scalar_eq!(u[2], 0.5 - 0.125, comp = abs, tol = 1e-3);
    assert_eq!(thermal.essential_dofs().len(), 10);
}

#[test]
fn quasistatic_convection() {
    // u(0) = 0 and -u'(1) = h (u(1) - u_ambient) with h = 1, u_ambient = 2 give u = x
    let mut thermal = ThermalConduction::<2>::new(unit_square(3), tight(default_quasistatic_options()), "", 0).unwrap();
    thermal.set_material(LinearIsotropicConductor::default()).unwrap();
    thermal
        .set_flux_bcs(
            &[2],
            ConvectiveFlux {
                heat_transfer_coefficient: 1.0,
                ambient_temperature: 2.0,
            },
        )
        .unwrap();
    thermal.set_temperature_bcs(&[1], Coefficient::constant_scalar(0.0));
    thermal.complete_setup().unwrap();
    thermal.advance_timestep(1.0).unwrap();
    assert_nodal_values(&thermal, |x| x);
}

#[test]
fn quasistatic_linear_profile_3d() {
    let mesh = Arc::new(create_rectangular_uniform_hex_mesh([1.0, 1.0, 1.0], [2, 2, 2]));
    let mut thermal = ThermalConduction::<3>::new(mesh, tight(default_quasistatic_options()), "", 0).unwrap();
    thermal.set_material(LinearIsotropicConductor::default()).unwrap();
    thermal.set_temperature_bcs(&[5], Coefficient::constant_scalar(0.0));
    thermal.set_temperature_bcs(&[6], Coefficient::constant_scalar(2.0));
    thermal.complete_setup().unwrap();
    thermal.advance_timestep(1.0).unwrap();
    let u = thermal.temperature().true_vec();
    for node in 0..u.len() {
        let z = thermal.space().node_coordinates(node)[2];
        assert_scalar_eq!(u[node], 2.0 * z, comp = abs, tol = 1e-10);
    }
}

#[test]
fn dynamic_uniform_heating() {
    // Without boundary conditions and gradients, rho c_p du/dt = s holds exactly
    let material = LinearIsotropicConductor {
        density: 2.0,
        specific_heat_capacity: 1.0,
        conductivity: 1.0,
    };
    let mut thermal = ThermalConduction::<2>::new(unit_square(2), tight(default_dynamic_options()), "", 0).unwrap();
    thermal.set_material(material).unwrap();
    thermal.set_source(ConstantSource { value: 2.0 }).unwrap();
    thermal.complete_setup().unwrap();
    thermal
        .set_temperature(&Coefficient::constant_scalar(1.0))
        .unwrap();
    for _ in 0..3 {
        thermal.advance_timestep(0.1).unwrap();
    }
    let u = thermal.temperature().true_vec();
    assert_matrix_eq!(u, DVector::from_element(u.len(), 1.3), comp = abs, tol = 1e-10);
    assert_scalar_eq!(thermal.time(), 0.3, comp = abs, tol = 1e-14);
    assert_eq!(thermal.cycle(), 3);
}

fn cooling_plate(enforcement_method: DirichletEnforcementMethod) -> ThermalConduction<2> {
    let mut options = tight(default_dynamic_options());
    options.dynamic = Some(TimesteppingOptions {
        enforcement_method,
        ..TimesteppingOptions::default()
    });
    let mut thermal = ThermalConduction::<2>::new(unit_square(3), options, "plate", 0).unwrap();
    thermal.set_material(LinearIsotropicConductor::default()).unwrap();
    thermal.set_temperature_bcs(&[1], Coefficient::scalar(|_, t| -t));
    thermal.complete_setup().unwrap();
    thermal
        .set_temperature(&Coefficient::constant_scalar(1.0))
        .unwrap();
    thermal
}

#[test]
fn dynamic_boundary_values_are_reached() {
    for method in [DirichletEnforcementMethod::RateControl, DirichletEnforcementMethod::DirectControl] {
        let mut thermal = cooling_plate(method);
        thermal.advance_timestep(0.1).unwrap();
        thermal.advance_timestep(0.1).unwrap();
        let dofs = thermal.essential_dofs().to_vec();
        assert_eq!(dofs.len(), 4);
        for &i in &dofs {
            assert_scalar_eq!(thermal.temperature().true_vec()[i], -0.2, comp = abs, tol = 1e-12);
        }
        let u = thermal.temperature().true_vec();
        assert!((0..u.len())
            .filter(|i| !dofs.contains(i))
            .any(|i| u[i] < 1.0 - 1e-6));
    }
}

#[test]
fn dynamic_jacobian_is_reused_for_constant_timestep() {
    let mut thermal = cooling_plate(DirichletEnforcementMethod::RateControl);
    assert!(thermal.tangent_operator().is_none());

    for _ in 0..3 {
        thermal.advance_timestep(0.1).unwrap();
    }
    assert_eq!(thermal.jacobian_assembly_count(), 1);

    thermal.advance_timestep(0.05).unwrap();
    assert_eq!(thermal.jacobian_assembly_count(), 2);
    thermal.advance_timestep(0.05).unwrap();
    assert_eq!(thermal.jacobian_assembly_count(), 2);
    assert!(thermal.tangent_operator().is_some());
}

#[test]
#[should_panic(expected = "thermal state not initialized")]
fn dynamic_step_requires_initial_temperature() {
    let mut thermal = ThermalConduction::<2>::new(unit_square(1), default_dynamic_options(), "", 0).unwrap();
    thermal.set_material(LinearIsotropicConductor::default()).unwrap();
    thermal.complete_setup().unwrap();
    let _ = thermal.advance_timestep(0.1);
}

#[test]
fn quasistatic_default_iterative_solver_matches_direct_solver() {
    let solve = |options: SolverOptions| {
        let mut thermal = ThermalConduction::<2>::new(unit_square(6), options, "", 0).unwrap();
        thermal.set_material(LinearIsotropicConductor::default()).unwrap();
        thermal
            .set_source(SourceFunction::new(|x: &Vector2<f64>, _| 1.0 + x[0] * x[1]))
            .unwrap();
        thermal.set_temperature_bcs(&[1, 3], Coefficient::constant_scalar(0.0));
        thermal.complete_setup().unwrap();
        thermal.advance_timestep(1.0).unwrap();
        thermal.temperature().true_vec().clone()
    };

    let options = default_quasistatic_options();
    assert_eq!(options.linear.method, LinearSolverMethod::Cg);
    let iterative = solve(options);
    let direct = solve(tight(default_quasistatic_options()));

    assert!(direct.amax() > 0.0);
    assert_matrix_eq!(iterative, direct, comp = abs, tol = 1e-4 * direct.amax());
}

fn parameterized_problem() -> ThermalConduction<2> {
    let mut thermal = ThermalConduction::<2>::new(unit_square(3), tight(default_quasistatic_options()), "", 1).unwrap();
    thermal
        .set_material(ParameterizedLinearIsotropicConductor {
            density: 1.0,
            specific_heat_capacity: 1.0,
            conductivity_offset: 1.0,
        })
        .unwrap();
    thermal.set_source(ConstantSource { value: 1.0 }).unwrap();
    thermal.set_temperature_bcs(&[1, 2], Coefficient::constant_scalar(0.0));
    thermal
        .set_parameter(0, &Coefficient::scalar(|x, _| 0.5 + x[0] * x[1]))
        .unwrap();
    thermal.complete_setup().unwrap();
    thermal
}

#[test]
fn adjoint_solves_transposed_tangent_system() {
    let mut thermal = parameterized_problem();
    thermal.advance_timestep(1.0).unwrap();

    let n = thermal.space().true_vsize();
    let mut load = FiniteElementDual::new("load", thermal.space().clone());
    load.true_vec_mut()
        .copy_from(&DVector::from_fn(n, |i, _| 1.0 + 0.1 * i as f64));
    let adjoint = thermal.solve_adjoint(&load, None).unwrap().true_vec().clone();

    let tangent = thermal.tangent_operator().unwrap();
    let lhs = &tangent.transpose() * &adjoint;
    let dofs = thermal.essential_dofs().to_vec();
    for i in 0..n {
        if dofs.contains(&i) {
            assert_scalar_eq!(adjoint[i], 0.0, comp = abs, tol = 1e-14);
        } else {
            assert_scalar_eq!(lhs[i], load.true_vec()[i], comp = abs, tol = 1e-10);
        }
    }
}

#[test]
fn adjoint_of_unit_load_is_a_column_of_the_inverse_transposed_tangent() {
    let mut thermal = parameterized_problem();
    thermal.advance_timestep(1.0).unwrap();

    let n = thermal.space().true_vsize();
    let dofs = thermal.essential_dofs().to_vec();
    let inverse_transpose = DMatrix::from(thermal.tangent_operator().unwrap())
        .transpose()
        .try_inverse()
        .unwrap();

    for k in (0..n).filter(|k| !dofs.contains(k)) {
        let mut load = FiniteElementDual::new("load", thermal.space().clone());
        load.true_vec_mut()[k] = 1.0;
        let adjoint = thermal.solve_adjoint(&load, None).unwrap().true_vec().clone();
        assert_matrix_eq!(adjoint, inverse_transpose.column(k).into_owned(), comp = abs, tol = 1e-10);
    }
}

#[test]
fn adjoint_takes_essential_values() {
    let mut thermal = parameterized_problem();
    thermal.advance_timestep(1.0).unwrap();

    let n = thermal.space().true_vsize();
    let load = FiniteElementDual::new("load", thermal.space().clone());
    let mut essential = FiniteElementDual::new("essential", thermal.space().clone());
    essential.true_vec_mut().fill(0.25);
    let adjoint = thermal
        .solve_adjoint(&load, Some(&essential))
        .unwrap()
        .true_vec()
        .clone();
    assert!(!thermal.essential_dofs().is_empty());
    // Constant fields are in the kernel of the conduction operator, so the boundary values
    // extend to the whole domain
    assert_matrix_eq!(adjoint, DVector::from_element(n, 0.25), comp = abs, tol = 1e-10);
}

#[test]
fn sensitivity_matches_finite_differences() {
    let mut thermal = parameterized_problem();
    thermal.advance_timestep(1.0).unwrap();
    let n = thermal.space().true_vsize();

    // The quantity of interest is J(u) = sum_i u_i, so the adjoint load is a vector of ones
    let mut load = FiniteElementDual::new("load", thermal.space().clone());
    load.true_vec_mut().fill(1.0);
    thermal.solve_adjoint(&load, None).unwrap();
    let sensitivity = thermal.compute_sensitivity(0).unwrap().true_vec().clone();
    assert_eq!(thermal.sensitivity(0).name(), "sensitivity_0");

    let p = thermal.parameter(0).true_vec().clone();
    let h = 1e-5;
    for i in [0, 5, 6, 10, 15] {
        let mut evaluate = |delta: f64| {
            let mut perturbed = p.clone();
            perturbed[i] += delta;
            thermal.set_parameter_values(0, &perturbed);
            thermal.advance_timestep(1.0).unwrap();
            thermal.temperature().true_vec().sum()
        };
        let derivative = (evaluate(h) - evaluate(-h)) / (2.0 * h);
        assert_scalar_eq!(-sensitivity[i], derivative, comp = abs, tol = 1e-7);
    }
    assert_eq!(sensitivity.len(), n);
}

#[test]
fn mesh_dimension_is_checked() {
    let mesh = Arc::new(create_rectangular_uniform_hex_mesh([1.0, 1.0, 1.0], [1, 1, 1]));
    let err = ThermalConduction::<2>::new(mesh, default_quasistatic_options(), "", 0)
        .err()
        .unwrap();
    assert_eq!(
        err.downcast_ref::<ConfigurationError>(),
        Some(&ConfigurationError::DimensionMismatch { expected: 2, actual: 3 })
    );
}

#[test]
fn parameter_count_is_checked() {
    let mut thermal = ThermalConduction::<2>::new(unit_square(1), default_quasistatic_options(), "", 2).unwrap();
    let err = thermal
        .set_material(ParameterizedLinearIsotropicConductor {
            density: 1.0,
            specific_heat_capacity: 1.0,
            conductivity_offset: 1.0,
        })
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigurationError>(),
        Some(&ConfigurationError::ParameterCountMismatch { expected: 2, declared: 1 })
    );
    // Models without parameters ignore the parameter fields
    thermal.set_material(LinearIsotropicConductor::default()).unwrap();
}

#[test]
fn setup_requires_a_material() {
    let mut thermal = ThermalConduction::<2>::new(unit_square(1), default_quasistatic_options(), "", 0).unwrap();
    let err = thermal.complete_setup().unwrap_err();
    assert_eq!(err.downcast_ref::<ConfigurationError>(), Some(&ConfigurationError::MissingMaterial));
}

#[test]
fn temperature_bcs_require_scalar_coefficients() {
    let mut thermal = ThermalConduction::<2>::new(unit_square(1), default_quasistatic_options(), "", 0).unwrap();
    thermal.set_material(LinearIsotropicConductor::default()).unwrap();
    thermal.set_temperature_bcs(&[1], Coefficient::constant_vector(Vector2::new(1.0, 0.0)));
    let err = thermal.complete_setup().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigurationError>(),
        Some(ConfigurationError::CoefficientRank { .. })
    ));
}

#[test]
#[should_panic]
fn material_can_only_be_attached_once() {
    let mut thermal = ThermalConduction::<2>::new(unit_square(1), default_quasistatic_options(), "", 0).unwrap();
    thermal.set_material(LinearIsotropicConductor::default()).unwrap();
    let _ = thermal.set_material(LinearIsotropicConductor::default());
}

#[test]
#[should_panic]
fn configuration_is_frozen_after_setup() {
    let mut thermal = ThermalConduction::<2>::new(unit_square(1), default_quasistatic_options(), "", 0).unwrap();
    thermal.set_material(LinearIsotropicConductor::default()).unwrap();
    thermal.complete_setup().unwrap();
    thermal.set_temperature_bcs(&[1], Coefficient::constant_scalar(0.0));
}

#[test]
#[should_panic]
fn adjoint_requires_a_primal_solve() {
    let mut thermal = parameterized_problem();
    let load = FiniteElementDual::new("load", thermal.space().clone());
    let _ = thermal.solve_adjoint(&load, None);
}

#[test]
#[should_panic]
fn sensitivity_requires_an_adjoint_solve() {
    let mut thermal = parameterized_problem();
    thermal.advance_timestep(1.0).unwrap();
    let _ = thermal.compute_sensitivity(0);
}
