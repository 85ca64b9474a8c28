//! State shared by all physics modules.
use crate::functional::Functional;
use crate::solvers::NonlinearOperator;
use log::debug;
use nalgebra::{Const, DVector, DimMin};
use nalgebra_sparse::CsrMatrix;

/// Lifecycle of a physics module.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PhysicsPhase {
    /// Boundary conditions, materials and loads may be attached.
    Configured,
    /// Essential dofs are known and the residual operators are built.
    SetupComplete,
    /// At least one step has been taken.
    Stepping,
    /// An adjoint solution is available for the current primal solution.
    AdjointSolved,
}

/// Name, time and cycle bookkeeping of a physics module.
#[derive(Debug, Clone, PartialEq)]
pub struct BasePhysics {
    name: String,
    time: f64,
    cycle: usize,
    phase: PhysicsPhase,
}

impl BasePhysics {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            time: 0.0,
            cycle: 0,
            phase: PhysicsPhase::Configured,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefixes a field name with the module name.
    pub fn field_name(&self, field: &str) -> String {
        if self.name.is_empty() {
            field.to_string()
        } else {
            format!("{}_{}", self.name, field)
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn cycle(&self) -> usize {
        self.cycle
    }

    pub fn phase(&self) -> PhysicsPhase {
        self.phase
    }

    /// # Panics
    ///
    /// Panics if setup has already been completed.
    pub fn assert_configuring(&self) {
        assert_eq!(
            self.phase,
            PhysicsPhase::Configured,
            "{}: the module can not be reconfigured after setup is complete",
            self.name
        );
    }

    /// # Panics
    ///
    /// Panics if setup has not been completed.
    pub fn assert_setup_complete(&self) {
        assert!(
            self.phase >= PhysicsPhase::SetupComplete,
            "{}: complete_setup must be called first",
            self.name
        );
    }

    pub fn complete_setup(&mut self) {
        self.assert_configuring();
        self.phase = PhysicsPhase::SetupComplete;
    }

    /// Records a completed step of size `dt`.
    pub fn finish_step(&mut self, dt: f64) {
        self.time += dt;
        self.cycle += 1;
        self.phase = PhysicsPhase::Stepping;
    }

    /// # Panics
    ///
    /// Panics if no primal solve has been performed.
    pub fn assert_primal_solved(&self) {
        assert!(
            self.phase >= PhysicsPhase::Stepping,
            "{}: the adjoint problem requires a converged primal solve",
            self.name
        );
    }

    pub fn finish_adjoint(&mut self) {
        self.assert_primal_solved();
        self.phase = PhysicsPhase::AdjointSolved;
    }
}

/// The cached Jacobian of a residual operator.
///
/// The Jacobian of a dynamic step depends explicitly on the timestep, so a matrix assembled with
/// [`get_or_assemble`](Self::get_or_assemble) is reused for as long as the timestep is unchanged.
/// Reassembly always rebuilds the matrix from scratch.
#[derive(Debug, Clone, Default)]
pub struct TangentCache {
    matrix: Option<CsrMatrix<f64>>,
    dt: Option<f64>,
    assembly_count: usize,
}

impl TangentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached matrix if it was assembled for the same `dt`, otherwise assembles it.
    pub fn get_or_assemble(
        &mut self,
        dt: f64,
        assemble: impl FnOnce() -> eyre::Result<CsrMatrix<f64>>,
    ) -> eyre::Result<&CsrMatrix<f64>> {
        let matrix = match self.matrix.take() {
            Some(matrix) if self.dt == Some(dt) => matrix,
            _ => {
                debug!("Reassembling tangent for dt = {}", dt);
                let matrix = assemble()?;
                self.assembly_count += 1;
                matrix
            }
        };
        self.dt = Some(dt);
        Ok(&*self.matrix.insert(matrix))
    }

    /// Unconditionally assembles the matrix and clears the timestep key.
    pub fn assemble(&mut self, assemble: impl FnOnce() -> eyre::Result<CsrMatrix<f64>>) -> eyre::Result<&CsrMatrix<f64>> {
        self.matrix = None;
        self.dt = None;
        let matrix = assemble()?;
        self.assembly_count += 1;
        Ok(&*self.matrix.insert(matrix))
    }

    pub fn invalidate(&mut self) {
        self.matrix = None;
        self.dt = None;
    }

    pub fn matrix(&self) -> Option<&CsrMatrix<f64>> {
        self.matrix.as_ref()
    }

    /// The number of assemblies performed by this cache.
    pub fn assembly_count(&self) -> usize {
        self.assembly_count
    }
}

/// The quasi-static residual `K(u; aux...) = 0` of a functional whose first trial field is the
/// unknown and whose remaining trial fields are held fixed.
pub struct QuasiStaticOperator<'a, const D: usize> {
    pub stiffness: &'a Functional<D>,
    pub auxiliary: Vec<&'a DVector<f64>>,
    pub time: f64,
    pub tangent: &'a mut TangentCache,
}

impl<'a, const D: usize> QuasiStaticOperator<'a, D> {
    fn args<'b>(&'b self, u: &'b DVector<f64>) -> Vec<&'b DVector<f64>> {
        let mut args = vec![u];
        args.extend(self.auxiliary.iter().copied());
        args
    }
}

impl<'a, const D: usize> NonlinearOperator for QuasiStaticOperator<'a, D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    fn dimension(&self) -> usize {
        self.stiffness.test_space().true_vsize()
    }

    fn residual(&mut self, u: &DVector<f64>, r: &mut DVector<f64>) -> eyre::Result<()> {
        *r = self.stiffness.residual(&self.args(u), self.time)?;
        Ok(())
    }

    fn jacobian(&mut self, u: &DVector<f64>) -> eyre::Result<&CsrMatrix<f64>> {
        let (_, jacobian) = self
            .stiffness
            .residual_and_gradient(&self.args(u), self.time, 0)?;
        self.tangent.assemble(|| Ok(jacobian))
    }
}
