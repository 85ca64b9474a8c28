//! Error types shared by physics modules.
//!
//! Public fallible operations return [`eyre::Result`]. The typed errors below are the causes
//! attached to those reports and can be recovered with `Report::downcast_ref`.
use continuum_optimize::newton::NewtonError;
use std::error::Error;
use std::fmt;

/// The rank of a coefficient used for projections and boundary conditions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CoefficientRank {
    Scalar,
    Vector,
}

impl fmt::Display for CoefficientRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Vector => write!(f, "vector"),
        }
    }
}

/// Invalid problem setup. These indicate programming errors and are not recoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The runtime mesh dimension does not match the dimension of the physics module.
    DimensionMismatch { expected: usize, actual: usize },
    /// A coefficient of the wrong rank was supplied for a field or field component.
    CoefficientRank {
        expected: CoefficientRank,
        found: CoefficientRank,
    },
    /// A field component index exceeds the number of components of the field.
    ComponentOutOfRange { component: usize, components: usize },
    /// A parameterized model declares a different number of parameters than the module has.
    ParameterCountMismatch { expected: usize, declared: usize },
    /// Setup was completed without attaching a material.
    MissingMaterial,
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { expected, actual } => write!(
                f,
                "Mesh dimension ({}) does not match the dimension of the physics module ({}).",
                actual, expected
            ),
            Self::CoefficientRank { expected, found } => {
                write!(f, "Expected a {} coefficient, but a {} coefficient was given.", expected, found)
            }
            Self::ComponentOutOfRange { component, components } => write!(
                f,
                "Component {} is out of range for a field with {} components.",
                component, components
            ),
            Self::ParameterCountMismatch { expected, declared } => write!(
                f,
                "Model declares {} parameter fields, but the physics module has {}.",
                declared, expected
            ),
            Self::MissingMaterial => write!(f, "No material has been attached."),
        }
    }
}

impl Error for ConfigurationError {}

/// Numerical failures surfaced from evaluation or solves. These are never retried internally.
#[derive(Debug)]
pub enum NumericError {
    /// The deformation gradient `I + grad u` is singular.
    SingularDeformation,
    /// The reference-to-physical map of an element has a singular Jacobian.
    DegenerateElement { element: usize },
    /// The nonlinear solver failed to converge.
    NonlinearSolve(NewtonError),
    /// A linear solve failed.
    LinearSolve(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for NumericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingularDeformation => write!(f, "Deformation gradient is singular."),
            Self::DegenerateElement { element } => write!(f, "Element {} has a singular Jacobian.", element),
            Self::NonlinearSolve(err) => write!(f, "Nonlinear solve failed: {}", err),
            Self::LinearSolve(err) => write!(f, "Linear solve failed: {}", err),
        }
    }
}

impl Error for NumericError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NonlinearSolve(err) => Some(err),
            Self::LinearSolve(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
