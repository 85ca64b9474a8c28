//! Heat conduction with optional parameter fields, adjoints and parameter sensitivities.
//!
//! The weak residual is split into a mass-like functional `M` and a stiffness-like functional
//! `K`,
//!
//! ```text
//! M(u̇; u, p) = ∫ ρ c_p u̇ v dx
//! K(u; p)    = ∫ κ ∇u · ∇v dx - ∫ s v dx + ∫_Γ q_n v ds,
//! ```
//!
//! so that a quasi-static step solves `K(u) = 0`, and a backward Euler step solves
//! `M(u̇; u) + K(u + dt u̇) = 0` for the rate `u̇`.
use crate::boundary::{BoundaryConditions, Coefficient};
use crate::error::ConfigurationError;
use crate::functional::{
    BoundaryIntegrand, BoundaryPoint, DomainIntegrand, FieldValue, Functional, Integrand, QuadraturePoint,
};
use crate::mesh::Mesh;
use crate::physics::{BasePhysics, PhysicsPhase, QuasiStaticOperator, TangentCache};
use crate::solvers::{DirichletEnforcementMethod, EquationSolver, NonlinearOperator, SolverOptions};
use crate::space::{FiniteElementDual, FiniteElementSpace, FiniteElementState};
use continuum_sparse::essential::eliminate_essential_dofs_csr;
use continuum_traits::Real;
use log::info;
use nalgebra::{Const, DVector, DimMin, SVector};
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;

pub mod materials;

pub use materials::*;

fn parameter_values<T: Real>(fields: &[FieldValue<T>], parameterized: bool) -> Vec<T> {
    if parameterized {
        fields.iter().map(|field| field.scalar()).collect()
    } else {
        Vec::new()
    }
}

/// Resolves whether a model uses the parameter fields of the module.
fn check_parameters(declared: Option<usize>, expected: usize) -> Result<bool, ConfigurationError> {
    match declared {
        None => Ok(false),
        Some(n) if n == expected => Ok(true),
        Some(n) => Err(ConfigurationError::ParameterCountMismatch {
            expected,
            declared: n,
        }),
    }
}

/// `ρ c_p u̇` with fields `[rate, temperature, parameters...]`.
struct HeatCapacityIntegrand<M> {
    material: Arc<M>,
    parameterized: bool,
}

impl<const D: usize, M: ThermalMaterial<D>> DomainIntegrand<D> for HeatCapacityIntegrand<M> {
    type State = ();

    fn initial_state(&self) -> Self::State {}

    fn evaluate<T: Real>(&self, _: &(), point: &QuadraturePoint<D>, fields: &[FieldValue<T>]) -> eyre::Result<Integrand<T>> {
        let rate = fields[0].scalar();
        let temperature = &fields[1];
        let parameters = parameter_values(&fields[2..], self.parameterized);
        let response = self.material.response(
            &point.x,
            temperature.scalar(),
            &temperature.scalar_gradient(),
            &parameters,
        );
        Ok(Integrand::scalar(
            response.density * response.specific_heat_capacity * rate,
            SVector::<T, D>::zeros(),
        ))
    }
}

/// `-q · ∇v` with fields `[temperature, parameters...]`.
struct ConductionIntegrand<M> {
    material: Arc<M>,
    parameterized: bool,
}

impl<const D: usize, M: ThermalMaterial<D>> DomainIntegrand<D> for ConductionIntegrand<M> {
    type State = ();

    fn initial_state(&self) -> Self::State {}

    fn evaluate<T: Real>(&self, _: &(), point: &QuadraturePoint<D>, fields: &[FieldValue<T>]) -> eyre::Result<Integrand<T>> {
        let temperature = &fields[0];
        let parameters = parameter_values(&fields[1..], self.parameterized);
        let response = self.material.response(
            &point.x,
            temperature.scalar(),
            &temperature.scalar_gradient(),
            &parameters,
        );
        Ok(Integrand::scalar(T::zero(), -response.heat_flux))
    }
}

struct SourceIntegrand<S> {
    source: S,
    parameterized: bool,
}

impl<const D: usize, S: ThermalSource<D>> DomainIntegrand<D> for SourceIntegrand<S> {
    type State = ();

    fn initial_state(&self) -> Self::State {}

    fn evaluate<T: Real>(&self, _: &(), point: &QuadraturePoint<D>, fields: &[FieldValue<T>]) -> eyre::Result<Integrand<T>> {
        let temperature = &fields[0];
        let parameters = parameter_values(&fields[1..], self.parameterized);
        let s = self.source.source(
            &point.x,
            point.time,
            temperature.scalar(),
            &temperature.scalar_gradient(),
            &parameters,
        );
        Ok(Integrand::scalar(-s, SVector::<T, D>::zeros()))
    }
}

struct FluxIntegrand<F> {
    flux: F,
    parameterized: bool,
}

impl<const D: usize, F: ThermalFluxBoundary<D>> BoundaryIntegrand<D> for FluxIntegrand<F> {
    fn evaluate<T: Real>(&self, point: &BoundaryPoint<D>, fields: &[FieldValue<T>]) -> eyre::Result<DVector<T>> {
        let parameters = parameter_values(&fields[1..], self.parameterized);
        let q = self
            .flux
            .flux(&point.x, &point.normal, fields[0].scalar(), &parameters);
        Ok(DVector::from_element(1, q))
    }
}

/// Backward Euler residual in terms of the unknown rate.
struct FirstOrderOperator<'a, const D: usize> {
    mass: &'a Functional<D>,
    stiffness: &'a Functional<D>,
    u: &'a DVector<f64>,
    parameters: Vec<&'a DVector<f64>>,
    dt: f64,
    time: f64,
    tangent: &'a mut TangentCache,
}

impl<'a, const D: usize> FirstOrderOperator<'a, D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    fn predicted(&self, du_dt: &DVector<f64>) -> DVector<f64> {
        self.u + du_dt * self.dt
    }

    fn with_parameters<'b>(&'b self, mut args: Vec<&'b DVector<f64>>) -> Vec<&'b DVector<f64>> {
        args.extend(self.parameters.iter().copied());
        args
    }
}

impl<'a, const D: usize> NonlinearOperator for FirstOrderOperator<'a, D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    fn dimension(&self) -> usize {
        self.stiffness.test_space().true_vsize()
    }

    fn residual(&mut self, du_dt: &DVector<f64>, r: &mut DVector<f64>) -> eyre::Result<()> {
        let u_pred = self.predicted(du_dt);
        let m = self
            .mass
            .residual(&self.with_parameters(vec![du_dt, self.u]), self.time)?;
        let k = self
            .stiffness
            .residual(&self.with_parameters(vec![&u_pred]), self.time)?;
        *r = m + k;
        Ok(())
    }

    fn jacobian(&mut self, du_dt: &DVector<f64>) -> eyre::Result<&CsrMatrix<f64>> {
        let u_pred = self.predicted(du_dt);
        let mut mass_args = vec![du_dt, self.u];
        mass_args.extend(self.parameters.iter().copied());
        let mut stiffness_args = vec![&u_pred];
        stiffness_args.extend(self.parameters.iter().copied());
        let (mass, stiffness, dt, time) = (self.mass, self.stiffness, self.dt, self.time);
        self.tangent.get_or_assemble(dt, || {
            let (_, m) = mass.residual_and_gradient(&mass_args, time, 0)?;
            let (_, k) = stiffness.residual_and_gradient(&stiffness_args, time, 0)?;
            Ok(&m + &(&k * dt))
        })
    }
}

/// Heat conduction physics on a `D`-dimensional mesh.
pub struct ThermalConduction<const D: usize> {
    base: BasePhysics,
    options: SolverOptions,
    space: Arc<FiniteElementSpace<D>>,
    temperature: FiniteElementState<D>,
    adjoint_temperature: FiniteElementState<D>,
    parameters: Vec<FiniteElementState<D>>,
    sensitivities: Vec<FiniteElementDual<D>>,
    bcs: BoundaryConditions<D>,
    mass: Functional<D>,
    stiffness: Functional<D>,
    material_attached: bool,
    temperature_initialized: bool,
    solver: EquationSolver,
    tangent: TangentCache,
    du_dt: DVector<f64>,
}

impl<const D: usize> ThermalConduction<D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    /// Creates a thermal module with `num_parameters` scalar parameter fields.
    ///
    /// Fails with [`ConfigurationError::DimensionMismatch`] if the mesh is not `D`-dimensional.
    pub fn new(mesh: Arc<Mesh>, options: SolverOptions, name: &str, num_parameters: usize) -> eyre::Result<Self> {
        let base = BasePhysics::new(name);
        let space = Arc::new(FiniteElementSpace::new(mesh, 1)?);

        let parameters: Vec<_> = (0..num_parameters)
            .map(|i| FiniteElementState::new(base.field_name(&format!("parameter_{}", i)), space.clone()))
            .collect();
        let sensitivities = (0..num_parameters)
            .map(|i| FiniteElementDual::new(base.field_name(&format!("sensitivity_{}", i)), space.clone()))
            .collect();

        let parameter_spaces = vec![space.clone(); num_parameters];
        let mass_trials = [vec![space.clone(), space.clone()], parameter_spaces.clone()].concat();
        let stiffness_trials = [vec![space.clone()], parameter_spaces].concat();

        let n = space.true_vsize();
        Ok(Self {
            temperature: FiniteElementState::new(base.field_name("temperature"), space.clone()),
            adjoint_temperature: FiniteElementState::new(base.field_name("adjoint_temperature"), space.clone()),
            parameters,
            sensitivities,
            bcs: BoundaryConditions::default(),
            mass: Functional::new(space.clone(), mass_trials),
            stiffness: Functional::new(space.clone(), stiffness_trials),
            material_attached: false,
            temperature_initialized: false,
            solver: EquationSolver::new(options.nonlinear, options.linear),
            tangent: TangentCache::new(),
            du_dt: DVector::zeros(n),
            space,
            options,
            base,
        })
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    /// Attaches the conduction material.
    ///
    /// # Panics
    ///
    /// Panics if a material is already attached or setup has been completed.
    pub fn set_material<M: ThermalMaterial<D>>(&mut self, material: M) -> eyre::Result<()> {
        self.base.assert_configuring();
        assert!(!self.material_attached, "a thermal material is already attached");
        let parameterized = check_parameters(material.num_parameters(), self.num_parameters())?;
        let material = Arc::new(material);
        self.stiffness.add_domain_integral(ConductionIntegrand {
            material: material.clone(),
            parameterized,
        });
        self.mass
            .add_domain_integral(HeatCapacityIntegrand { material, parameterized });
        self.material_attached = true;
        Ok(())
    }

    pub fn set_source<S: ThermalSource<D>>(&mut self, source: S) -> eyre::Result<()> {
        self.base.assert_configuring();
        let parameterized = check_parameters(source.num_parameters(), self.num_parameters())?;
        self.stiffness
            .add_domain_integral(SourceIntegrand { source, parameterized });
        Ok(())
    }

    /// Applies a boundary flux on the boundary faces with the given attributes.
    pub fn set_flux_bcs<F: ThermalFluxBoundary<D>>(&mut self, markers: &[usize], flux: F) -> eyre::Result<()> {
        self.base.assert_configuring();
        let parameterized = check_parameters(flux.num_parameters(), self.num_parameters())?;
        self.stiffness
            .add_boundary_integral(markers, FluxIntegrand { flux, parameterized });
        Ok(())
    }

    /// Prescribes the temperature on the boundary faces with the given attributes.
    ///
    /// The coefficient rank is validated by [`complete_setup`](Self::complete_setup).
    pub fn set_temperature_bcs(&mut self, markers: &[usize], coefficient: Coefficient<D>) {
        self.base.assert_configuring();
        self.bcs.add_essential(markers, coefficient, None);
    }

    /// Sets the temperature field from a coefficient.
    pub fn set_temperature(&mut self, coefficient: &Coefficient<D>) -> eyre::Result<()> {
        self.temperature.project(coefficient, self.base.time())?;
        self.temperature_initialized = true;
        Ok(())
    }

    /// Sets parameter field `index` from a coefficient.
    pub fn set_parameter(&mut self, index: usize, coefficient: &Coefficient<D>) -> eyre::Result<()> {
        self.parameters[index].project(coefficient, self.base.time())
    }

    /// Sets parameter field `index` from its algebraic vector.
    pub fn set_parameter_values(&mut self, index: usize, values: &DVector<f64>) {
        self.parameters[index].set_true_vec(values);
    }

    /// Validates the configuration, eliminates the essential dofs and projects boundary values.
    pub fn complete_setup(&mut self) -> eyre::Result<()> {
        if !self.material_attached {
            return Err(ConfigurationError::MissingMaterial.into());
        }
        self.bcs.setup(&self.space)?;
        let dofs = self.bcs.true_dofs();
        self.mass.set_essential_bcs(&dofs);
        self.stiffness.set_essential_bcs(&dofs);

        self.temperature.initialize_true_vec();
        self.bcs
            .project(&self.space, self.base.time(), self.temperature.true_vec_mut());
        self.temperature.distribute_shared_dofs();
        self.base.complete_setup();
        info!(
            "{}: setup complete with {} dofs, {} constrained",
            self.base.name(),
            self.space.true_vsize(),
            dofs.len()
        );
        Ok(())
    }

    fn parameter_vectors(&self) -> Vec<&DVector<f64>> {
        self.parameters.iter().map(|p| p.true_vec()).collect()
    }

    /// Advances the temperature by `dt` and returns the timestep taken.
    ///
    /// # Panics
    ///
    /// Panics if setup is not complete, or, in dynamic mode, if no initial temperature was set.
    pub fn advance_timestep(&mut self, dt: f64) -> eyre::Result<f64> {
        self.base.assert_setup_complete();
        let time = self.base.time() + dt;
        self.temperature.initialize_true_vec();

        match self.options.dynamic {
            None => {
                let mut u = self.temperature.true_vec().clone();
                self.bcs.project(&self.space, time, &mut u);
                let mut operator = QuasiStaticOperator {
                    stiffness: &self.stiffness,
                    auxiliary: self.parameters.iter().map(|p| p.true_vec()).collect(),
                    time,
                    tangent: &mut self.tangent,
                };
                self.solver.solve(&mut operator, &mut u)?;
                self.temperature.true_vec_mut().copy_from(&u);
            }
            Some(dynamic) => {
                assert!(self.temperature_initialized, "thermal state not initialized");
                let u = self.temperature.true_vec().clone();
                let mut boundary_values = u.clone();
                self.bcs.project(&self.space, time, &mut boundary_values);
                let dofs = self.bcs.true_dofs();

                let mut du_dt = self.du_dt.clone();
                for &i in &dofs {
                    du_dt[i] = match dynamic.enforcement_method {
                        DirichletEnforcementMethod::RateControl => (boundary_values[i] - u[i]) / dt,
                        DirichletEnforcementMethod::DirectControl => 0.0,
                    };
                }

                let mut operator = FirstOrderOperator {
                    mass: &self.mass,
                    stiffness: &self.stiffness,
                    u: &u,
                    parameters: self.parameters.iter().map(|p| p.true_vec()).collect(),
                    dt,
                    time,
                    tangent: &mut self.tangent,
                };
                self.solver.solve(&mut operator, &mut du_dt)?;

                let mut u_new = &u + &du_dt * dt;
                if dynamic.enforcement_method == DirichletEnforcementMethod::DirectControl {
                    for &i in &dofs {
                        u_new[i] = boundary_values[i];
                    }
                }
                self.temperature.true_vec_mut().copy_from(&u_new);
                self.du_dt = du_dt;
            }
        }

        let mut args = vec![self.temperature.true_vec()];
        args.extend(self.parameters.iter().map(|p| p.true_vec()));
        self.stiffness.update_state(&args, time)?;

        self.temperature.distribute_shared_dofs();
        self.base.finish_step(dt);
        info!(
            "{}: step {} complete, t = {}",
            self.base.name(),
            self.base.cycle(),
            self.base.time()
        );
        Ok(dt)
    }

    /// Solves the adjoint problem `J^T λ = load` at the current primal solution.
    ///
    /// `essential` optionally supplies values of the adjoint field on constrained dofs, which
    /// are zero otherwise.
    ///
    /// # Panics
    ///
    /// Panics if no primal solve has been performed.
    pub fn solve_adjoint(
        &mut self,
        load: &FiniteElementDual<D>,
        essential: Option<&FiniteElementDual<D>>,
    ) -> eyre::Result<&FiniteElementState<D>> {
        self.base.assert_primal_solved();
        let mut args = vec![self.temperature.true_vec()];
        args.extend(self.parameter_vectors());
        let (_, jacobian) = self
            .stiffness
            .residual_and_unconstrained_gradient(&args, self.base.time(), 0)?;
        let mut jacobian_t = jacobian.transpose();

        let n = self.space.true_vsize();
        let mut rhs = load.true_vec().clone();
        let boundary_values = essential
            .map(|dual| dual.true_vec().clone())
            .unwrap_or_else(|| DVector::zeros(n));
        eliminate_essential_dofs_csr(&mut jacobian_t, &mut rhs, self.stiffness.essential_dofs(), &boundary_values);

        let mut adjoint = DVector::zeros(n);
        self.solver
            .linear_solver()
            .solve(&jacobian_t, &rhs, &mut adjoint)?;
        self.adjoint_temperature.set_true_vec(&adjoint);
        self.base.finish_adjoint();
        Ok(&self.adjoint_temperature)
    }

    /// Computes the sensitivity `(∂K/∂p)^T λ` of parameter field `parameter`.
    ///
    /// # Panics
    ///
    /// Panics if no adjoint solution is available.
    pub fn compute_sensitivity(&mut self, parameter: usize) -> eyre::Result<&FiniteElementDual<D>> {
        assert_eq!(
            self.base.phase(),
            PhysicsPhase::AdjointSolved,
            "sensitivities require an adjoint solution"
        );
        assert!(parameter < self.num_parameters(), "parameter index out of range");
        let mut args = vec![self.temperature.true_vec()];
        args.extend(self.parameter_vectors());
        let (_, gradient) = self
            .stiffness
            .residual_and_gradient(&args, self.base.time(), parameter + 1)?;
        let sensitivity = &gradient.transpose() * self.adjoint_temperature.true_vec();
        self.sensitivities[parameter]
            .true_vec_mut()
            .copy_from(&sensitivity);
        Ok(&self.sensitivities[parameter])
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn time(&self) -> f64 {
        self.base.time()
    }

    pub fn cycle(&self) -> usize {
        self.base.cycle()
    }

    pub fn space(&self) -> &Arc<FiniteElementSpace<D>> {
        &self.space
    }

    pub fn temperature(&self) -> &FiniteElementState<D> {
        &self.temperature
    }

    pub fn adjoint_temperature(&self) -> &FiniteElementState<D> {
        &self.adjoint_temperature
    }

    pub fn parameter(&self, index: usize) -> &FiniteElementState<D> {
        &self.parameters[index]
    }

    pub fn sensitivity(&self, index: usize) -> &FiniteElementDual<D> {
        &self.sensitivities[index]
    }

    /// Constrained temperature dofs. Empty before setup is complete.
    pub fn essential_dofs(&self) -> &[usize] {
        self.stiffness.essential_dofs()
    }

    /// The most recently assembled Jacobian of the step residual.
    pub fn tangent_operator(&self) -> Option<&CsrMatrix<f64>> {
        self.tangent.matrix()
    }

    /// Number of Jacobian assemblies performed by time stepping.
    pub fn jacobian_assembly_count(&self) -> usize {
        self.tangent.assembly_count()
    }
}
