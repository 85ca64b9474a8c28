//! Preconditioned conjugate gradient for the symmetric positive definite systems produced by
//! essential-DOF elimination.
use core::fmt;
use nalgebra::{ClosedAdd, ClosedMul, DVector, DVectorView, DVectorViewMut, RealField, Scalar};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use num::{One, Zero};
use std::error::Error;

/// Error type produced by operators during a solve.
pub type OperatorError = Box<dyn Error + Send + Sync>;

/// A linear map `y = A x`.
pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        (**self).apply(y, x)
    }
}

impl<T> LinearOperator<T> for CsrMatrix<T>
where
    T: Scalar + Zero + One + ClosedMul + ClosedAdd,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        y.copy_from(&x);
        Ok(())
    }
}

/// Jacobi (diagonal) preconditioner `P = diag(A)^{-1}`.
///
/// Zero diagonal entries are treated as ones.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner<T: Scalar> {
    inverse_diagonal: DVector<T>,
}

impl<T: RealField + Copy> JacobiPreconditioner<T> {
    pub fn from_csr(matrix: &CsrMatrix<T>) -> Self {
        assert_eq!(matrix.nrows(), matrix.ncols(), "Jacobi preconditioner requires a square matrix");
        let mut inverse_diagonal = DVector::repeat(matrix.nrows(), T::one());
        for (i, j, &v) in matrix.triplet_iter() {
            if i == j && v != T::zero() {
                inverse_diagonal[i] = T::one() / v;
            }
        }
        Self { inverse_diagonal }
    }
}

impl<T: RealField + Copy> LinearOperator<T> for JacobiPreconditioner<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        y.copy_from(&x);
        y.component_mul_assign(&self.inverse_diagonal);
        Ok(())
    }
}

/// Decides convergence from the recursively updated residual of CG.
///
/// The recursive residual can drift from the true residual `b - Ax` on ill-conditioned
/// problems.
pub trait StoppingCriterion<T> {
    fn has_converged(&self, residual_norm: T, rhs_norm: T, iteration: usize) -> bool;
}

/// `||r|| <= tol * ||b||`
#[derive(Debug, Clone)]
pub struct RelativeResidualCriterion<T> {
    tol: T,
}

impl<T> RelativeResidualCriterion<T> {
    pub fn new(tol: T) -> Self {
        Self { tol }
    }
}

impl Default for RelativeResidualCriterion<f64> {
    fn default() -> Self {
        Self::new(1e-8)
    }
}

impl<T: RealField + Copy> StoppingCriterion<T> for RelativeResidualCriterion<T> {
    fn has_converged(&self, residual_norm: T, rhs_norm: T, _iteration: usize) -> bool {
        residual_norm <= self.tol * rhs_norm
    }
}

/// `||r|| <= max(abs_tol, rel_tol * ||b||)`
#[derive(Debug, Clone)]
pub struct ResidualCriterion<T> {
    abs_tol: T,
    rel_tol: T,
}

impl<T> ResidualCriterion<T> {
    pub fn new(abs_tol: T, rel_tol: T) -> Self {
        Self { abs_tol, rel_tol }
    }
}

impl<T: RealField + Copy> StoppingCriterion<T> for ResidualCriterion<T> {
    fn has_converged(&self, residual_norm: T, rhs_norm: T, _iteration: usize) -> bool {
        residual_norm <= T::max(self.abs_tol, self.rel_tol * rhs_norm)
    }
}

/// Scratch vectors reused between solves of equal or smaller dimension.
#[derive(Debug, Clone)]
pub struct CgWorkspace<T: Scalar> {
    residual: DVector<T>,
    preconditioned: DVector<T>,
    direction: DVector<T>,
    operator_direction: DVector<T>,
}

impl<T: Scalar + Zero> Default for CgWorkspace<T> {
    fn default() -> Self {
        Self {
            residual: DVector::zeros(0),
            preconditioned: DVector::zeros(0),
            direction: DVector::zeros(0),
            operator_direction: DVector::zeros(0),
        }
    }
}

impl<T: Scalar + Zero> CgWorkspace<T> {
    fn resize(&mut self, dim: usize) {
        for buffer in [
            &mut self.residual,
            &mut self.preconditioned,
            &mut self.direction,
            &mut self.operator_direction,
        ] {
            buffer.resize_vertically_mut(dim, T::zero());
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum CgErrorKind {
    Operator(OperatorError),
    Preconditioner(OperatorError),
    IndefiniteOperator,
    IndefinitePreconditioner,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for CgErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator(err) => write!(f, "error applying operator: {err}"),
            Self::Preconditioner(err) => write!(f, "error applying preconditioner: {err}"),
            Self::IndefiniteOperator => write!(f, "operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "preconditioner appears to be indefinite"),
            Self::MaxIterationsReached { max_iter } => write!(f, "max iterations ({max_iter}) reached"),
        }
    }
}

#[derive(Debug)]
pub struct CgError {
    /// Iterations completed before the failure.
    pub iterations: usize,
    pub kind: CgErrorKind,
}

impl fmt::Display for CgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CG failed after {} iterations: {}", self.iterations, self.kind)
    }
}

impl Error for CgError {}

#[derive(Debug, Clone)]
pub struct CgOutput {
    /// Number of updates made to the initial guess.
    pub num_iterations: usize,
}

/// Builder-style conjugate gradient solver.
///
/// Without an explicit workspace, each solve allocates its own scratch vectors.
pub struct ConjugateGradient<'a, T: Scalar, A, P, C> {
    workspace: Option<&'a mut CgWorkspace<T>>,
    operator: A,
    preconditioner: P,
    criterion: C,
    max_iter: Option<usize>,
}

impl<'a, T: Scalar> ConjugateGradient<'a, T, (), IdentityOperator, ()> {
    pub fn new() -> Self {
        Self {
            workspace: None,
            operator: (),
            preconditioner: IdentityOperator,
            criterion: (),
            max_iter: None,
        }
    }

    pub fn with_workspace(workspace: &'a mut CgWorkspace<T>) -> Self {
        Self {
            workspace: Some(workspace),
            ..Self::new()
        }
    }
}

impl<'a, T: Scalar, A, P, C> ConjugateGradient<'a, T, A, P, C> {
    pub fn with_operator<A2>(self, operator: A2) -> ConjugateGradient<'a, T, A2, P, C> {
        ConjugateGradient {
            workspace: self.workspace,
            operator,
            preconditioner: self.preconditioner,
            criterion: self.criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<'a, T, A, P2, C> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner,
            criterion: self.criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_stopping_criterion<C2>(self, criterion: C2) -> ConjugateGradient<'a, T, A, P, C2> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner: self.preconditioner,
            criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

impl<'a, T, A, P, C> ConjugateGradient<'a, T, A, P, C>
where
    T: RealField + Copy,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
    C: StoppingCriterion<T>,
{
    /// Solves `A x = b`, using the contents of `x` as the initial guess.
    pub fn solve_with_guess<'b>(
        &mut self,
        b: impl Into<DVectorView<'b, T>>,
        x: impl Into<DVectorViewMut<'b, T>>,
    ) -> Result<CgOutput, CgError> {
        let mut local = None;
        let workspace = match self.workspace.as_deref_mut() {
            Some(workspace) => workspace,
            None => local.insert(CgWorkspace::default()),
        };
        solve(
            workspace,
            &self.operator,
            &self.preconditioner,
            &self.criterion,
            self.max_iter,
            b.into(),
            x.into(),
        )
    }
}

fn solve<T, A, P, C>(
    workspace: &mut CgWorkspace<T>,
    a: &A,
    preconditioner: &P,
    criterion: &C,
    max_iter: Option<usize>,
    b: DVectorView<T>,
    mut x: DVectorViewMut<T>,
) -> Result<CgOutput, CgError>
where
    T: RealField + Copy,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
    C: StoppingCriterion<T>,
{
    assert_eq!(b.len(), x.len(), "right-hand side and solution must have equal length");
    let fail = |iterations, kind| Err(CgError { iterations, kind });

    let b_norm = b.norm();
    if b_norm == T::zero() {
        x.fill(T::zero());
        return Ok(CgOutput { num_iterations: 0 });
    }

    workspace.resize(x.len());
    let CgWorkspace {
        residual: r,
        preconditioned: z,
        direction: p,
        operator_direction: ap,
    } = workspace;

    // r = b - A x
    if let Err(err) = a.apply((&mut *r).into(), (&x).into()) {
        return fail(0, CgErrorKind::Operator(err));
    }
    r.zip_apply(&b, |r_i, b_i| *r_i = b_i - *r_i);

    if let Err(err) = preconditioner.apply((&mut *z).into(), (&*r).into()) {
        return fail(0, CgErrorKind::Preconditioner(err));
    }
    p.copy_from(&*z);
    let mut z_dot_r = z.dot(&*r);

    let mut iterations = 0;
    while !criterion.has_converged(r.norm(), b_norm, iterations) {
        if let Some(max_iter) = max_iter.filter(|&max_iter| iterations >= max_iter) {
            return fail(iterations, CgErrorKind::MaxIterationsReached { max_iter });
        }

        if let Err(err) = a.apply((&mut *ap).into(), (&*p).into()) {
            return fail(iterations, CgErrorKind::Operator(err));
        }
        let p_dot_ap = p.dot(&*ap);
        if p_dot_ap <= T::zero() {
            return fail(iterations, CgErrorKind::IndefiniteOperator);
        }
        if z_dot_r <= T::zero() {
            return fail(iterations, CgErrorKind::IndefinitePreconditioner);
        }

        let alpha = z_dot_r / p_dot_ap;
        x.axpy(alpha, &*p, T::one());
        r.axpy(-alpha, &*ap, T::one());
        iterations += 1;

        if let Err(err) = preconditioner.apply((&mut *z).into(), (&*r).into()) {
            return fail(iterations, CgErrorKind::Preconditioner(err));
        }
        let z_dot_r_next = z.dot(&*r);
        let beta = z_dot_r_next / z_dot_r;
        // p = z + beta p
        p.axpy(T::one(), &*z, beta);
        z_dot_r = z_dot_r_next;
    }

    Ok(CgOutput {
        num_iterations: iterations,
    })
}
