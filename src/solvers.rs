//! Solver configuration and the nonlinear equation solver used by physics modules.
use crate::error::NumericError;
use continuum_optimize::calculus::{DifferentiableVectorFunction, FunctionError, VectorFunction};
use continuum_optimize::newton::{newton, newton_line_search, BacktrackingLineSearch, NewtonSettings};
use continuum_sparse::cg::{CgWorkspace, ConjugateGradient, JacobiPreconditioner, ResidualCriterion};
use continuum_sparse::direct::solve_dense_lu;
use log::{debug, info};
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearSolverMethod {
    /// Preconditioned conjugate gradient. Requires a symmetric positive definite operator.
    Cg,
    /// Dense LU factorization. Intended for small problems.
    Direct,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preconditioner {
    None,
    Jacobi,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverOptions {
    pub method: LinearSolverMethod,
    pub preconditioner: Preconditioner,
    pub rel_tol: f64,
    pub abs_tol: f64,
    pub max_iter: usize,
    /// Values above zero log iterative progress at info level instead of debug level.
    pub print_level: usize,
}

impl Default for LinearSolverOptions {
    fn default() -> Self {
        Self {
            method: LinearSolverMethod::Cg,
            preconditioner: Preconditioner::Jacobi,
            rel_tol: 1.0e-6,
            abs_tol: 1.0e-12,
            max_iter: 200,
            print_level: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSearchMethod {
    None,
    Backtracking,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearSolverOptions {
    pub rel_tol: f64,
    pub abs_tol: f64,
    pub max_iter: usize,
    pub print_level: usize,
    pub line_search: LineSearchMethod,
}

impl Default for NonlinearSolverOptions {
    fn default() -> Self {
        Self {
            rel_tol: 1.0e-4,
            abs_tol: 1.0e-8,
            max_iter: 500,
            print_level: 0,
            line_search: LineSearchMethod::None,
        }
    }
}

#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestepMethod {
    BackwardEuler,
}

/// How essential boundary values are enforced during dynamic steps.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirichletEnforcementMethod {
    /// Prescribe the rate of constrained dofs so that the step lands on the boundary value.
    RateControl,
    /// Hold the rate of constrained dofs at zero and overwrite the values after the step.
    DirectControl,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimesteppingOptions {
    pub method: TimestepMethod,
    pub enforcement_method: DirichletEnforcementMethod,
}

impl Default for TimesteppingOptions {
    fn default() -> Self {
        Self {
            method: TimestepMethod::BackwardEuler,
            enforcement_method: DirichletEnforcementMethod::RateControl,
        }
    }
}

/// Complete solver configuration of a physics module.
///
/// Absence of time stepping options means the module is quasi-static.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub linear: LinearSolverOptions,
    pub nonlinear: NonlinearSolverOptions,
    pub dynamic: Option<TimesteppingOptions>,
}

impl SolverOptions {
    pub fn is_dynamic(&self) -> bool {
        self.dynamic.is_some()
    }
}

pub fn default_linear_options() -> LinearSolverOptions {
    LinearSolverOptions::default()
}

pub fn default_nonlinear_options() -> NonlinearSolverOptions {
    NonlinearSolverOptions::default()
}

pub fn default_quasistatic_options() -> SolverOptions {
    SolverOptions::default()
}

pub fn default_dynamic_options() -> SolverOptions {
    SolverOptions {
        dynamic: Some(TimesteppingOptions::default()),
        ..SolverOptions::default()
    }
}

/// A linear solver for assembled CSR systems, configured by [`LinearSolverOptions`].
#[derive(Debug)]
pub struct LinearSolver {
    options: LinearSolverOptions,
    workspace: CgWorkspace<f64>,
}

impl LinearSolver {
    pub fn new(options: LinearSolverOptions) -> Self {
        Self {
            options,
            workspace: CgWorkspace::default(),
        }
    }

    pub fn options(&self) -> &LinearSolverOptions {
        &self.options
    }

    /// Solves `A x = b`. The content of `x` is used as the initial guess for iterative methods.
    pub fn solve(&mut self, matrix: &CsrMatrix<f64>, b: &DVector<f64>, x: &mut DVector<f64>) -> Result<(), NumericError> {
        let options = self.options;
        match options.method {
            LinearSolverMethod::Direct => {
                solve_dense_lu(matrix, b, &mut *x).map_err(|err| NumericError::LinearSolve(Box::new(err)))
            }
            LinearSolverMethod::Cg => {
                let criterion = ResidualCriterion::new(options.abs_tol, options.rel_tol);
                let cg = ConjugateGradient::with_workspace(&mut self.workspace)
                    .with_operator(matrix)
                    .with_max_iter(options.max_iter);
                let result = match options.preconditioner {
                    Preconditioner::None => cg.with_stopping_criterion(criterion).solve_with_guess(b, &mut *x),
                    Preconditioner::Jacobi => cg
                        .with_preconditioner(JacobiPreconditioner::from_csr(matrix))
                        .with_stopping_criterion(criterion)
                        .solve_with_guess(b, &mut *x),
                };
                let output = result.map_err(|err| NumericError::LinearSolve(Box::new(err)))?;
                if options.print_level > 0 {
                    info!("CG converged in {} iterations", output.num_iterations);
                } else {
                    debug!("CG converged in {} iterations", output.num_iterations);
                }
                Ok(())
            }
        }
    }
}

/// A square nonlinear system `r(x) = 0` with an assembled Jacobian.
pub trait NonlinearOperator {
    fn dimension(&self) -> usize;

    fn residual(&mut self, x: &DVector<f64>, r: &mut DVector<f64>) -> eyre::Result<()>;

    /// Returns the Jacobian at `x`, assembling it if necessary.
    fn jacobian(&mut self, x: &DVector<f64>) -> eyre::Result<&CsrMatrix<f64>>;
}

struct NewtonSystem<'a, Op> {
    operator: &'a mut Op,
    linear: &'a mut LinearSolver,
}

impl<'a, Op: NonlinearOperator> VectorFunction<f64> for NewtonSystem<'a, Op> {
    fn dimension(&self) -> usize {
        self.operator.dimension()
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) -> Result<(), FunctionError> {
        let mut r = DVector::zeros(f.len());
        self.operator
            .residual(&x.clone_owned(), &mut r)
            .map_err(FunctionError::from)?;
        f.copy_from(&r);
        Ok(())
    }
}

impl<'a, Op: NonlinearOperator> DifferentiableVectorFunction<f64> for NewtonSystem<'a, Op> {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        x: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> Result<(), FunctionError> {
        let jacobian = self
            .operator
            .jacobian(&x.clone_owned())
            .map_err(FunctionError::from)?;
        let mut solution = DVector::zeros(sol.len());
        self.linear.solve(jacobian, &rhs.clone_owned(), &mut solution)?;
        sol.copy_from(&solution);
        Ok(())
    }
}

/// Newton's method combined with a configured linear solver.
#[derive(Debug)]
pub struct EquationSolver {
    options: NonlinearSolverOptions,
    linear: LinearSolver,
}

impl EquationSolver {
    pub fn new(nonlinear: NonlinearSolverOptions, linear: LinearSolverOptions) -> Self {
        Self {
            options: nonlinear,
            linear: LinearSolver::new(linear),
        }
    }

    pub fn options(&self) -> &NonlinearSolverOptions {
        &self.options
    }

    pub fn linear_solver(&mut self) -> &mut LinearSolver {
        &mut self.linear
    }

    /// Solves `r(x) = 0` starting from the current content of `x`.
    ///
    /// Returns the number of Newton iterations. Non-convergence is reported as
    /// [`NumericError::NonlinearSolve`] and is not retried.
    pub fn solve(&mut self, operator: &mut impl NonlinearOperator, x: &mut DVector<f64>) -> eyre::Result<usize> {
        let n = operator.dimension();
        assert_eq!(x.len(), n, "initial guess does not match the operator dimension");
        let settings = NewtonSettings {
            max_iterations: Some(self.options.max_iter),
            abs_tolerance: self.options.abs_tol,
            rel_tolerance: self.options.rel_tol,
        };
        let mut f = DVector::zeros(n);
        let mut dx = DVector::zeros(n);
        let system = NewtonSystem {
            operator,
            linear: &mut self.linear,
        };

        let result = match self.options.line_search {
            LineSearchMethod::None => newton(system, &mut *x, &mut f, &mut dx, settings),
            LineSearchMethod::Backtracking => newton_line_search(
                system,
                &mut *x,
                &mut f,
                &mut dx,
                settings,
                &mut BacktrackingLineSearch::default(),
            ),
        };
        let iterations = result.map_err(NumericError::NonlinearSolve)?;
        if self.options.print_level > 0 {
            info!("Newton converged in {} iterations (residual norm {:.3e})", iterations, f.norm());
        } else {
            debug!("Newton converged in {} iterations (residual norm {:.3e})", iterations, f.norm());
        }
        Ok(iterations)
    }
}
