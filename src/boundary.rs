//! Coefficients and essential boundary conditions.
use crate::error::{CoefficientRank, ConfigurationError};
use crate::space::FiniteElementSpace;
use nalgebra::{Const, DVector, DimMin, SVector};
use std::fmt;
use std::sync::Arc;

pub type ScalarFunction<const D: usize> = dyn Fn(&SVector<f64, D>, f64) -> f64 + Send + Sync;
pub type VectorFunction<const D: usize> = dyn Fn(&SVector<f64, D>, f64) -> SVector<f64, D> + Send + Sync;

/// A space- and time-dependent function used for projections and boundary values.
#[derive(Clone)]
pub enum Coefficient<const D: usize> {
    Scalar(Arc<ScalarFunction<D>>),
    Vector(Arc<VectorFunction<D>>),
}

impl<const D: usize> Coefficient<D> {
    pub fn scalar(f: impl Fn(&SVector<f64, D>, f64) -> f64 + Send + Sync + 'static) -> Self {
        Self::Scalar(Arc::new(f))
    }

    pub fn vector(f: impl Fn(&SVector<f64, D>, f64) -> SVector<f64, D> + Send + Sync + 'static) -> Self {
        Self::Vector(Arc::new(f))
    }

    pub fn constant_scalar(value: f64) -> Self {
        Self::scalar(move |_, _| value)
    }

    pub fn constant_vector(value: SVector<f64, D>) -> Self {
        Self::vector(move |_, _| value)
    }

    pub fn rank(&self) -> CoefficientRank {
        match self {
            Self::Scalar(_) => CoefficientRank::Scalar,
            Self::Vector(_) => CoefficientRank::Vector,
        }
    }
}

impl<const D: usize> fmt::Debug for Coefficient<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coefficient::{:?}", self.rank())
    }
}

/// An essential (Dirichlet) condition on boundary faces with the given attributes.
#[derive(Debug, Clone)]
pub struct EssentialBoundaryCondition<const D: usize> {
    markers: Vec<usize>,
    coefficient: Coefficient<D>,
    component: Option<usize>,
    dofs: Vec<usize>,
}

impl<const D: usize> EssentialBoundaryCondition<D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    /// Constrains all components if `component` is `None`, otherwise only the given one.
    pub fn new(markers: &[usize], coefficient: Coefficient<D>, component: Option<usize>) -> Self {
        Self {
            markers: markers.to_vec(),
            coefficient,
            component,
            dofs: Vec::new(),
        }
    }

    /// Validates the coefficient rank against the space and collects the constrained dofs.
    pub fn setup(&mut self, space: &FiniteElementSpace<D>) -> Result<(), ConfigurationError> {
        space.check_coefficient(&self.coefficient, self.component)?;
        self.dofs = space.boundary_dofs(&self.markers, self.component);
        Ok(())
    }

    pub fn markers(&self) -> &[usize] {
        &self.markers
    }

    pub fn component(&self) -> Option<usize> {
        self.component
    }

    pub fn coefficient(&self) -> &Coefficient<D> {
        &self.coefficient
    }

    /// Sorted constrained dofs. Empty until [`setup`](Self::setup) has been called.
    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    /// Writes the boundary values at time `time` into the constrained entries of `target`.
    pub fn project(&self, space: &FiniteElementSpace<D>, time: f64, target: &mut DVector<f64>) {
        for &dof in &self.dofs {
            target[dof] = space.evaluate_at_dof(&self.coefficient, dof, time);
        }
    }
}

/// The collection of essential conditions of a field.
#[derive(Debug, Clone)]
pub struct BoundaryConditions<const D: usize> {
    essential: Vec<EssentialBoundaryCondition<D>>,
}

impl<const D: usize> Default for BoundaryConditions<D> {
    fn default() -> Self {
        Self { essential: Vec::new() }
    }
}

impl<const D: usize> BoundaryConditions<D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    pub fn add_essential(&mut self, markers: &[usize], coefficient: Coefficient<D>, component: Option<usize>) {
        self.essential
            .push(EssentialBoundaryCondition::new(markers, coefficient, component));
    }

    pub fn essential(&self) -> &[EssentialBoundaryCondition<D>] {
        &self.essential
    }

    pub fn setup(&mut self, space: &FiniteElementSpace<D>) -> Result<(), ConfigurationError> {
        for bc in &mut self.essential {
            bc.setup(space)?;
        }
        Ok(())
    }

    /// The sorted union of all constrained dofs.
    pub fn true_dofs(&self) -> Vec<usize> {
        let mut dofs: Vec<usize> = self
            .essential
            .iter()
            .flat_map(|bc| bc.dofs().iter().copied())
            .collect();
        dofs.sort_unstable();
        dofs.dedup();
        dofs
    }

    /// Projects every condition at time `time`. Later conditions take precedence on shared dofs.
    pub fn project(&self, space: &FiniteElementSpace<D>, time: f64, target: &mut DVector<f64>) {
        for bc in &self.essential {
            bc.project(space, time, target);
        }
    }
}
