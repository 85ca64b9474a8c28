//! Quasi-static and dynamic solid mechanics.
//!
//! The weak residual is split into
//!
//! ```text
//! M(a)    = ∫ ρ a · v dx
//! C(v̇)   = ∫ η ∇v̇ : ∇v dx
//! K(u)    = ∫ σ(u) : ∇v dx - ∫ f · v dx - ∫_Γt t · v ds + ∫_Γp p n · v ds,
//! ```
//!
//! where `σ` is the material stress, or its Piola transform when geometric nonlinearities are
//! enabled. A quasi-static step solves `K(u) = 0`. A dynamic step solves
//! `M(a) + C(v + dt a) + K(u + dt (v + dt a)) = 0` for the acceleration `a`.
use crate::kirchhoff_to_piola;
use crate::loads::{BodyForce, Pressure, Traction};
use crate::materials::SolidMaterial;
use continuum::boundary::{BoundaryConditions, Coefficient};
use continuum::error::ConfigurationError;
use continuum::functional::{
    BoundaryIntegrand, BoundaryPoint, DomainIntegrand, FieldValue, Functional, Integrand, QuadraturePoint,
};
use continuum::mesh::Mesh;
use continuum::physics::{BasePhysics, QuasiStaticOperator, TangentCache};
use continuum::solvers::{DirichletEnforcementMethod, EquationSolver, NonlinearOperator, SolverOptions};
use continuum::space::{FiniteElementSpace, FiniteElementState};
use continuum::Real;
use log::{info, warn};
use nalgebra::{Const, DVector, DimMin, SMatrix, SVector};
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;

/// Material stress with fields `[displacement]`.
struct StressIntegrand<M> {
    material: Arc<M>,
    geometric_nonlinearities: bool,
}

impl<const D: usize, M: SolidMaterial<D>> DomainIntegrand<D> for StressIntegrand<M>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    type State = M::State;

    fn initial_state(&self) -> Self::State {
        self.material.initial_state()
    }

    fn evaluate<T: Real>(
        &self,
        state: &M::State,
        _point: &QuadraturePoint<D>,
        fields: &[FieldValue<T>],
    ) -> eyre::Result<Integrand<T>> {
        let du_dx: SMatrix<T, D, D> = fields[0].vector_gradient();
        let mut probe = state.clone();
        let stress = self.material.stress(&mut probe, &du_dx);
        let flux = if self.geometric_nonlinearities {
            kirchhoff_to_piola(&stress, &du_dx)?
        } else {
            stress
        };
        Ok(Integrand::vector(SVector::zeros(), flux))
    }

    fn commit(
        &self,
        state: &mut M::State,
        _point: &QuadraturePoint<D>,
        fields: &[FieldValue<f64>],
    ) -> eyre::Result<()> {
        self.material.stress(state, &fields[0].vector_gradient::<D>());
        Ok(())
    }
}

/// `ρ a` with fields `[acceleration]`.
struct InertiaIntegrand {
    density: f64,
}

impl<const D: usize> DomainIntegrand<D> for InertiaIntegrand {
    type State = ();

    fn initial_state(&self) -> Self::State {}

    fn evaluate<T: Real>(
        &self,
        _: &(),
        _: &QuadraturePoint<D>,
        fields: &[FieldValue<T>],
    ) -> eyre::Result<Integrand<T>> {
        let acceleration: SVector<T, D> = fields[0].vector();
        Ok(Integrand::vector(acceleration * T::from_value(self.density), SMatrix::zeros()))
    }
}

/// Vector diffusion `η ∇v` with fields `[velocity]`.
struct ViscosityIntegrand {
    viscosity: f64,
}

impl<const D: usize> DomainIntegrand<D> for ViscosityIntegrand {
    type State = ();

    fn initial_state(&self) -> Self::State {}

    fn evaluate<T: Real>(
        &self,
        _: &(),
        _: &QuadraturePoint<D>,
        fields: &[FieldValue<T>],
    ) -> eyre::Result<Integrand<T>> {
        let dv_dx: SMatrix<T, D, D> = fields[0].vector_gradient();
        Ok(Integrand::vector(SVector::zeros(), dv_dx * T::from_value(self.viscosity)))
    }
}

struct BodyForceIntegrand<F> {
    force: F,
}

impl<const D: usize, F: BodyForce<D>> DomainIntegrand<D> for BodyForceIntegrand<F> {
    type State = ();

    fn initial_state(&self) -> Self::State {}

    fn evaluate<T: Real>(&self, _: &(), point: &QuadraturePoint<D>, _: &[FieldValue<T>]) -> eyre::Result<Integrand<T>> {
        let f = self.force.force(&point.x, point.time).map(T::from_value);
        Ok(Integrand::vector(-f, SMatrix::zeros()))
    }
}

struct TractionIntegrand<F> {
    traction: F,
}

impl<const D: usize, F: Traction<D>> BoundaryIntegrand<D> for TractionIntegrand<F> {
    fn evaluate<T: Real>(&self, point: &BoundaryPoint<D>, _: &[FieldValue<T>]) -> eyre::Result<DVector<T>> {
        let t = self.traction.traction(&point.x, &point.normal, point.time);
        Ok(DVector::from_fn(D, |i, _| T::from_value(-t[i])))
    }
}

struct PressureIntegrand<P> {
    pressure: P,
}

impl<const D: usize, P: Pressure<D>> BoundaryIntegrand<D> for PressureIntegrand<P> {
    fn evaluate<T: Real>(&self, point: &BoundaryPoint<D>, _: &[FieldValue<T>]) -> eyre::Result<DVector<T>> {
        let p = self.pressure.pressure(&point.x, point.time);
        Ok(DVector::from_fn(D, |i, _| T::from_value(p * point.normal[i])))
    }
}

/// Backward Euler residual of the second order system in terms of the unknown acceleration.
struct SecondOrderOperator<'a, const D: usize> {
    mass: &'a Functional<D>,
    damping: Option<&'a Functional<D>>,
    stiffness: &'a Functional<D>,
    u: &'a DVector<f64>,
    v: &'a DVector<f64>,
    dt: f64,
    time: f64,
    tangent: &'a mut TangentCache,
}

impl<'a, const D: usize> SecondOrderOperator<'a, D> {
    /// Predicted velocity and displacement at the end of the step.
    fn predicted(&self, a: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
        let v_pred = self.v + a * self.dt;
        let u_pred = self.u + &v_pred * self.dt;
        (v_pred, u_pred)
    }
}

impl<'a, const D: usize> NonlinearOperator for SecondOrderOperator<'a, D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    fn dimension(&self) -> usize {
        self.stiffness.test_space().true_vsize()
    }

    fn residual(&mut self, a: &DVector<f64>, r: &mut DVector<f64>) -> eyre::Result<()> {
        let (v_pred, u_pred) = self.predicted(a);
        let mut residual = self.mass.residual(&[a], self.time)? + self.stiffness.residual(&[&u_pred], self.time)?;
        if let Some(damping) = self.damping {
            residual += damping.residual(&[&v_pred], self.time)?;
        }
        *r = residual;
        Ok(())
    }

    fn jacobian(&mut self, a: &DVector<f64>) -> eyre::Result<&CsrMatrix<f64>> {
        let (v_pred, u_pred) = self.predicted(a);
        let (mass, damping, stiffness, dt, time) = (self.mass, self.damping, self.stiffness, self.dt, self.time);
        self.tangent.get_or_assemble(dt, || {
            let (_, m) = mass.residual_and_gradient(&[a], time, 0)?;
            let (_, k) = stiffness.residual_and_gradient(&[&u_pred], time, 0)?;
            let mut jacobian = &m + &(&k * (dt * dt));
            if let Some(damping) = damping {
                let (_, c) = damping.residual_and_gradient(&[&v_pred], time, 0)?;
                jacobian = &jacobian + &(&c * dt);
            }
            Ok(jacobian)
        })
    }
}

/// Solid mechanics physics on a `D`-dimensional mesh with material `M`.
pub struct SolidMechanics<const D: usize, M: SolidMaterial<D>> {
    base: BasePhysics,
    options: SolverOptions,
    geometric_nonlinearities: bool,
    space: Arc<FiniteElementSpace<D>>,
    displacement: FiniteElementState<D>,
    velocity: FiniteElementState<D>,
    displacement_initialized: bool,
    velocity_initialized: bool,
    bcs: BoundaryConditions<D>,
    mass: Functional<D>,
    damping: Functional<D>,
    stiffness: Functional<D>,
    material: Option<Arc<M>>,
    viscosity: Option<f64>,
    solver: EquationSolver,
    tangent: TangentCache,
    acceleration: DVector<f64>,
}

impl<const D: usize, M: SolidMaterial<D>> SolidMechanics<D, M>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    /// Creates a solid mechanics module.
    ///
    /// With `geometric_nonlinearities` the material stress is interpreted as the Kirchhoff stress
    /// and transformed to the Piola stress. Otherwise it is integrated directly.
    ///
    /// Fails with [`ConfigurationError::DimensionMismatch`] if the mesh is not `D`-dimensional.
    pub fn new(
        mesh: Arc<Mesh>,
        options: SolverOptions,
        geometric_nonlinearities: bool,
        name: &str,
    ) -> eyre::Result<Self> {
        let base = BasePhysics::new(name);
        let space = Arc::new(FiniteElementSpace::new(mesh, D)?);
        let functional = || Functional::new(space.clone(), vec![space.clone()]);
        let n = space.true_vsize();
        Ok(Self {
            displacement: FiniteElementState::new(base.field_name("displacement"), space.clone()),
            velocity: FiniteElementState::new(base.field_name("velocity"), space.clone()),
            displacement_initialized: false,
            velocity_initialized: false,
            bcs: BoundaryConditions::default(),
            mass: functional(),
            damping: functional(),
            stiffness: functional(),
            material: None,
            viscosity: None,
            solver: EquationSolver::new(options.nonlinear, options.linear),
            tangent: TangentCache::new(),
            acceleration: DVector::zeros(n),
            geometric_nonlinearities,
            space,
            options,
            base,
        })
    }

    /// Attaches the material.
    ///
    /// # Panics
    ///
    /// Panics if a material is already attached or setup has been completed.
    pub fn set_material(&mut self, material: M) {
        self.base.assert_configuring();
        assert!(self.material.is_none(), "a solid material is already attached");
        let material = Arc::new(material);
        self.mass.add_domain_integral(InertiaIntegrand {
            density: material.density(),
        });
        self.stiffness.add_domain_integral(StressIntegrand {
            material: material.clone(),
            geometric_nonlinearities: self.geometric_nonlinearities,
        });
        self.material = Some(material);
    }

    pub fn set_body_force<F: BodyForce<D>>(&mut self, force: F) {
        self.base.assert_configuring();
        self.stiffness.add_domain_integral(BodyForceIntegrand { force });
    }

    /// Applies a traction on the boundary faces with the given attributes.
    pub fn set_traction_bcs<F: Traction<D>>(&mut self, markers: &[usize], traction: F) {
        self.base.assert_configuring();
        self.stiffness.add_boundary_integral(markers, TractionIntegrand { traction });
    }

    /// Applies a pressure on the boundary faces with the given attributes.
    pub fn set_pressure_bcs<P: Pressure<D>>(&mut self, markers: &[usize], pressure: P) {
        self.base.assert_configuring();
        self.stiffness.add_boundary_integral(markers, PressureIntegrand { pressure });
    }

    /// Prescribes all displacement components on the boundary faces with the given attributes.
    ///
    /// The coefficient must be vector-valued, which is validated by
    /// [`complete_setup`](Self::complete_setup).
    pub fn set_displacement_bcs(&mut self, markers: &[usize], coefficient: Coefficient<D>) {
        self.base.assert_configuring();
        self.bcs.add_essential(markers, coefficient, None);
    }

    /// Prescribes a single displacement component with a scalar coefficient.
    pub fn set_displacement_bcs_component(&mut self, markers: &[usize], coefficient: Coefficient<D>, component: usize) {
        self.base.assert_configuring();
        self.bcs.add_essential(markers, coefficient, Some(component));
    }

    pub fn set_displacement(&mut self, coefficient: &Coefficient<D>) -> eyre::Result<()> {
        self.displacement.project(coefficient, self.base.time())?;
        self.displacement_initialized = true;
        Ok(())
    }

    pub fn set_velocity(&mut self, coefficient: &Coefficient<D>) -> eyre::Result<()> {
        self.velocity.project(coefficient, self.base.time())?;
        self.velocity_initialized = true;
        Ok(())
    }

    /// Adds linear viscous damping to dynamic steps.
    ///
    /// # Panics
    ///
    /// Panics if a viscosity is already set or setup has been completed.
    pub fn set_viscosity(&mut self, viscosity: f64) {
        self.base.assert_configuring();
        assert!(self.viscosity.is_none(), "a viscosity is already set");
        self.damping.add_domain_integral(ViscosityIntegrand { viscosity });
        self.viscosity = Some(viscosity);
    }

    /// Validates the configuration, eliminates the essential dofs and projects boundary values.
    pub fn complete_setup(&mut self) -> eyre::Result<()> {
        if self.material.is_none() {
            return Err(ConfigurationError::MissingMaterial.into());
        }
        if self.viscosity.is_some() && !self.options.is_dynamic() {
            warn!("{}: viscosity has no effect on quasi-static steps", self.base.name());
        }
        self.bcs.setup(&self.space)?;
        let dofs = self.bcs.true_dofs();
        for functional in [&mut self.mass, &mut self.damping, &mut self.stiffness] {
            functional.set_essential_bcs(&dofs);
        }

        self.displacement.initialize_true_vec();
        self.bcs.project(&self.space, self.base.time(), self.displacement.true_vec_mut());
        self.displacement.distribute_shared_dofs();
        self.base.complete_setup();
        info!(
            "{}: setup complete with {} dofs, {} constrained",
            self.base.name(),
            self.space.true_vsize(),
            dofs.len()
        );
        Ok(())
    }

    /// Advances the displacement and velocity by `dt` and returns the timestep taken.
    ///
    /// # Panics
    ///
    /// Panics if setup is not complete, or, in dynamic mode, if the initial displacement and
    /// velocity were not both set.
    pub fn advance_timestep(&mut self, dt: f64) -> eyre::Result<f64> {
        self.base.assert_setup_complete();
        let time = self.base.time() + dt;
        self.displacement.initialize_true_vec();
        self.velocity.initialize_true_vec();

        match self.options.dynamic {
            None => {
                let mut u = self.displacement.true_vec().clone();
                self.bcs.project(&self.space, time, &mut u);
                let mut operator = QuasiStaticOperator {
                    stiffness: &self.stiffness,
                    auxiliary: Vec::new(),
                    time,
                    tangent: &mut self.tangent,
                };
                self.solver.solve(&mut operator, &mut u)?;
                self.displacement.true_vec_mut().copy_from(&u);
            }
            Some(dynamic) => {
                assert!(
                    self.displacement_initialized && self.velocity_initialized,
                    "solid state not initialized"
                );
                let u = self.displacement.true_vec().clone();
                let v = self.velocity.true_vec().clone();
                let mut boundary_values = u.clone();
                self.bcs.project(&self.space, time, &mut boundary_values);
                let dofs = self.bcs.true_dofs();

                let mut a = self.acceleration.clone();
                for &i in &dofs {
                    a[i] = match dynamic.enforcement_method {
                        DirichletEnforcementMethod::RateControl => (boundary_values[i] - u[i] - dt * v[i]) / (dt * dt),
                        DirichletEnforcementMethod::DirectControl => 0.0,
                    };
                }

                let mut operator = SecondOrderOperator {
                    mass: &self.mass,
                    damping: self.viscosity.map(|_| &self.damping),
                    stiffness: &self.stiffness,
                    u: &u,
                    v: &v,
                    dt,
                    time,
                    tangent: &mut self.tangent,
                };
                self.solver.solve(&mut operator, &mut a)?;

                let mut v_new = &v + &a * dt;
                let mut u_new = &u + &v_new * dt;
                if dynamic.enforcement_method == DirichletEnforcementMethod::DirectControl {
                    for &i in &dofs {
                        u_new[i] = boundary_values[i];
                        v_new[i] = (boundary_values[i] - u[i]) / dt;
                    }
                }
                self.displacement.true_vec_mut().copy_from(&u_new);
                self.velocity.true_vec_mut().copy_from(&v_new);
                self.acceleration = a;
            }
        }

        self.stiffness.update_state(&[self.displacement.true_vec()], time)?;

        self.displacement.distribute_shared_dofs();
        self.velocity.distribute_shared_dofs();
        self.base.finish_step(dt);
        info!(
            "{}: step {} complete, t = {}",
            self.base.name(),
            self.base.cycle(),
            self.base.time()
        );
        Ok(dt)
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

    pub fn displacement(&self) -> &FiniteElementState<D> {
        &self.displacement
    }

    pub fn velocity(&self) -> &FiniteElementState<D> {
        &self.velocity
    }

    /// The acceleration of the most recent dynamic step.
    pub fn acceleration(&self) -> &DVector<f64> {
        &self.acceleration
    }

    /// Committed material history, one entry per quadrature point. Empty before a material is
    /// attached.
    pub fn material_states(&self) -> &[M::State] {
        self.stiffness.states::<StressIntegrand<M>>().unwrap_or(&[])
    }

    /// Constrained displacement dofs. Empty before setup is complete.
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
