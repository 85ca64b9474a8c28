use crate::calculus::{DifferentiableVectorFunction, FunctionError, VectorFunction};
use continuum_traits::Real;
use itertools::iterate;
use log::debug;
use nalgebra::{DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewtonSettings<T> {
    pub max_iterations: Option<usize>,
    /// Absolute tolerance on the residual norm.
    pub abs_tolerance: T,
    /// Tolerance on the residual norm relative to the norm of the initial residual.
    pub rel_tolerance: T,
}

impl<T: Real> NewtonSettings<T> {
    /// The residual norm below which iterations stop, given the initial residual norm.
    pub fn threshold(&self, initial_residual_norm: T) -> T {
        T::max(self.abs_tolerance, self.rel_tolerance * initial_residual_norm)
    }
}

#[derive(Debug)]
pub enum NewtonError {
    /// The procedure failed because the maximum number of iterations was reached.
    MaximumIterationsReached(usize),
    /// The procedure failed because evaluating the function failed.
    FunctionError(FunctionError),
    /// The procedure failed because solving the Jacobian system failed.
    JacobianError(FunctionError),
    /// The line search failed to produce a valid step direction.
    LineSearchError(FunctionError),
    /// The residual norm became infinite or NaN after the given number of iterations.
    NonFiniteResidual(usize),
}

impl Display for NewtonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            &NewtonError::MaximumIterationsReached(maxit) => {
                write!(f, "Failed to converge within maximum number of iterations ({}).", maxit)
            }
            &NewtonError::FunctionError(ref err) => {
                write!(f, "Failed to evaluate function. Error: {}", err)
            }
            &NewtonError::JacobianError(ref err) => {
                write!(f, "Failed to solve Jacobian system. Error: {}", err)
            }
            &NewtonError::LineSearchError(ref err) => {
                write!(f, "Line search failed to produce valid step direction. Error: {}", err)
            }
            &NewtonError::NonFiniteResidual(iter) => {
                write!(f, "Residual norm is not finite after {} iterations.", iter)
            }
        }
    }
}

impl Error for NewtonError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NewtonError::MaximumIterationsReached(_) | NewtonError::NonFiniteResidual(_) => None,
            NewtonError::FunctionError(err) | NewtonError::JacobianError(err) | NewtonError::LineSearchError(err) => {
                Some(err.as_ref())
            }
        }
    }
}

/// Attempts to solve the non-linear equation F(u) = 0.
///
/// No heap allocation is performed. The solution is said to have converged if
/// ```|F(u)|_2 <= max(abs_tolerance, rel_tolerance * |F(u_0)|_2)```,
/// where `u_0` is the initial value of `x`.
///
/// A residual norm that is infinite or NaN at any iterate is reported as
/// [`NewtonError::NonFiniteResidual`].
///
/// If successful, returns the number of iterations performed.
pub fn newton<'a, T, F>(
    function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
) -> Result<usize, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    newton_line_search(function, x, f, dx, settings, &mut NoLineSearch {})
}

/// Same as `newton`, but allows specifying a line search.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn newton_line_search<'a, T, F>(
    mut function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
    line_search: &mut impl LineSearch<T, F>,
) -> Result<usize, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    let mut x = x.into();
    let mut f = f.into();
    let mut minus_dx = dx.into();

    assert_eq!(x.nrows(), f.nrows());
    assert_eq!(minus_dx.nrows(), f.nrows());

    function
        .eval_into(&mut f, &DVectorView::from(&x))
        .map_err(NewtonError::FunctionError)?;

    let threshold = settings.threshold(f.norm());
    debug!("Newton initial residual norm: {}, threshold: {}", f.norm(), threshold);

    let mut iter = 0;

    loop {
        let residual_norm = f.norm();
        if !residual_norm.is_finite() {
            return Err(NewtonError::NonFiniteResidual(iter));
        } else if residual_norm <= threshold {
            break;
        }

        if settings
            .max_iterations
            .map(|max_iter| iter == max_iter)
            .unwrap_or(false)
        {
            return Err(NewtonError::MaximumIterationsReached(iter));
        }

        // Solve the system J dx = -f   <=>   J (-dx) = f
        function
            .solve_jacobian_system(&mut minus_dx, &DVectorView::from(&x), &DVectorView::from(&f))
            .map_err(NewtonError::JacobianError)?;

        // Flip sign to make it consistent with line search
        minus_dx *= -1.0;
        let dx = &minus_dx;

        let step_length = line_search
            .step(
                &mut function,
                DVectorViewMut::from(&mut f),
                DVectorViewMut::from(&mut x),
                DVectorView::from(dx),
            )
            .map_err(NewtonError::LineSearchError)?;
        iter += 1;
        debug!(
            "Newton iteration {}: step length {}, residual norm {}",
            iter,
            step_length,
            f.norm()
        );
    }

    Ok(iter)
}

pub trait LineSearch<T: Scalar, F: VectorFunction<T>> {
    fn step(
        &mut self,
        function: &mut F,
        f: DVectorViewMut<T>,
        x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, FunctionError>;
}

/// Trivial implementation of line search. Equivalent to a single, full Newton step.
#[derive(Clone, Debug)]
pub struct NoLineSearch;

impl<T, F> LineSearch<T, F> for NoLineSearch
where
    T: Real,
    F: VectorFunction<T>,
{
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, FunctionError> {
        let p = direction;
        x.axpy(T::one(), &p, T::one());
        function.eval_into(&mut f, &DVectorView::from(&x))?;
        Ok(T::one())
    }
}

/// Standard backtracking line search using the Armijo condition.
///
/// See Jorge & Nocedal (2006), Numerical Optimization, Chapter 3.1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BacktrackingLineSearch<T> {
    /// Sufficient decrease parameter in `(0, 1)`.
    pub sufficient_decrease: T,
    /// The smallest step length attempted before giving up.
    pub min_step_length: T,
}

impl Default for BacktrackingLineSearch<f64> {
    fn default() -> Self {
        Self {
            sufficient_decrease: 1e-4,
            min_step_length: 1e-6,
        }
    }
}

impl<T, F> LineSearch<T, F> for BacktrackingLineSearch<T>
where
    T: Real,
    F: VectorFunction<T>,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, FunctionError> {
        // We seek to solve
        //  F(x) = 0
        // by minimizing
        //  g(x) = (1/2) || F(x) ||^2
        // The sufficient decrease condition becomes
        //  g(x_k + alpha * p_k) <= (1 - c * alpha) * g(x_k)
        // under the assumption that grad F^T p_k ~= - F(x_k), which holds
        // when p_k solves the Newton step equation.
        let c = self.sufficient_decrease;
        let alpha_min = self.min_step_length;

        let p = direction;
        let g_initial = 0.5 * f.magnitude_squared();

        // Decrease slowly at first, then geometrically
        let step_lengths = [1.0, 0.75, 0.5]
            .into_iter()
            .chain(iterate(0.25, |alpha_i| 0.25 * *alpha_i));

        let mut alpha_prev = 0.0;
        for alpha in step_lengths {
            // x^{k + 1} = x^k + (alpha^k - alpha^{k - 1}) * p
            x.axpy(alpha - alpha_prev, &p, T::one());
            function.eval_into(&mut f, &DVectorView::from(&x))?;

            let g = 0.5 * f.magnitude_squared();
            if g <= (1.0 - c * alpha) * g_initial {
                return Ok(alpha);
            } else if alpha < alpha_min {
                return Err(Box::from(format!(
                    "Failed to produce valid step direction. \
                    Alpha {} is smaller than minimum allowed alpha {}.",
                    alpha, alpha_min
                )));
            }
            alpha_prev = alpha;
        }
        unreachable!("the step length sequence is infinite")
    }
}
