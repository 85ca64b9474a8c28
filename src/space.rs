//! Finite element spaces and the field and dual vectors defined on them.
use crate::boundary::Coefficient;
use crate::element::Q1Element;
use crate::error::{CoefficientRank, ConfigurationError};
use crate::mesh::Mesh;
use nalgebra::{Const, DVector, DimMin, SVector};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A (possibly vector-valued) first-order Lagrange space on a [`Mesh`].
///
/// Degrees of freedom are numbered node-major, `components * node + component`.
#[derive(Debug, Clone)]
pub struct FiniteElementSpace<const D: usize> {
    mesh: Arc<Mesh>,
    components: usize,
    element_dofs: Vec<usize>,
}

impl<const D: usize> FiniteElementSpace<D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    /// Creates a space with the given number of components per node.
    ///
    /// Fails with [`ConfigurationError::DimensionMismatch`] if the mesh dimension is not `D`.
    pub fn new(mesh: Arc<Mesh>, components: usize) -> eyre::Result<Self> {
        assert!(components > 0, "a space must have at least one component");
        if mesh.dimension() != D {
            return Err(ConfigurationError::DimensionMismatch {
                expected: D,
                actual: mesh.dimension(),
            }
            .into());
        }
        let mut space = Self {
            mesh,
            components,
            element_dofs: Vec::new(),
        };
        space.build_dof_lookup_tables();
        Ok(space)
    }

    /// Rebuilds the element-to-dof table from the mesh connectivity.
    pub fn build_dof_lookup_tables(&mut self) {
        let c = self.components;
        self.element_dofs = (0..self.mesh.num_cells())
            .flat_map(|cell| self.mesh.cell_vertices(cell).to_vec())
            .flat_map(|v| (0..c).map(move |i| c * v + i))
            .collect();
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn num_nodes(&self) -> usize {
        self.mesh.num_vertices()
    }

    /// The size of the non-redundant algebraic vector.
    pub fn true_vsize(&self) -> usize {
        self.components * self.num_nodes()
    }

    pub fn num_element_dofs(&self) -> usize {
        self.components * self.mesh.vertices_per_cell()
    }

    pub fn element_dofs(&self, cell: usize) -> &[usize] {
        let n = self.num_element_dofs();
        &self.element_dofs[n * cell..n * (cell + 1)]
    }

    pub fn element(&self, cell: usize) -> Q1Element<D> {
        Q1Element::from_mesh_cell(&self.mesh, cell)
    }

    pub fn node_coordinates(&self, node: usize) -> SVector<f64, D> {
        SVector::from_column_slice(self.mesh.vertex(node))
    }

    /// Sorted degrees of freedom on boundary faces with any of the given attributes.
    ///
    /// If `component` is given, only the degrees of freedom of that component are returned.
    pub fn boundary_dofs(&self, markers: &[usize], component: Option<usize>) -> Vec<usize> {
        let c = self.components;
        let nodes: BTreeSet<usize> = self
            .mesh
            .boundary_faces()
            .iter()
            .filter(|face| markers.contains(&face.attribute))
            .flat_map(|face| self.mesh.face_vertices(face))
            .collect();
        nodes
            .into_iter()
            .flat_map(|node| {
                let components: Vec<usize> = match component {
                    Some(i) => vec![i],
                    None => (0..c).collect(),
                };
                components.into_iter().map(move |i| c * node + i)
            })
            .collect()
    }

    /// Checks that a coefficient has the rank expected for this space, or for one of its
    /// components.
    pub fn check_coefficient(&self, coefficient: &Coefficient<D>, component: Option<usize>) -> Result<(), ConfigurationError> {
        if let Some(i) = component {
            if i >= self.components {
                return Err(ConfigurationError::ComponentOutOfRange {
                    component: i,
                    components: self.components,
                });
            }
        }
        let expected = if component.is_some() || self.components == 1 {
            CoefficientRank::Scalar
        } else {
            CoefficientRank::Vector
        };
        if expected == CoefficientRank::Vector && self.components != D {
            return Err(ConfigurationError::DimensionMismatch {
                expected: self.components,
                actual: D,
            });
        }
        let found = coefficient.rank();
        if found != expected {
            return Err(ConfigurationError::CoefficientRank { expected, found });
        }
        Ok(())
    }

    /// Evaluates the coefficient at the node associated with the degree of freedom `dof`.
    pub fn evaluate_at_dof(&self, coefficient: &Coefficient<D>, dof: usize, time: f64) -> f64 {
        let node = dof / self.components;
        let component = dof % self.components;
        let x = self.node_coordinates(node);
        match coefficient {
            Coefficient::Scalar(f) => f(&x, time),
            Coefficient::Vector(f) => f(&x, time)[component],
        }
    }

    /// Interpolates the coefficient at the nodes of the space.
    pub fn project(&self, coefficient: &Coefficient<D>, time: f64) -> eyre::Result<DVector<f64>> {
        self.check_coefficient(coefficient, None)?;
        Ok(DVector::from_fn(self.true_vsize(), |dof, _| {
            self.evaluate_at_dof(coefficient, dof, time)
        }))
    }
}

/// A named field on a finite element space.
///
/// The field has a non-redundant algebraic representation (`true_vec`) and a local
/// representation (`grid_function`) that is read by assembly. The two are synchronized
/// explicitly with [`initialize_true_vec`](Self::initialize_true_vec) (gather) and
/// [`distribute_shared_dofs`](Self::distribute_shared_dofs) (scatter).
#[derive(Debug, Clone)]
pub struct FiniteElementState<const D: usize> {
    name: String,
    space: Arc<FiniteElementSpace<D>>,
    grid_function: DVector<f64>,
    true_vec: DVector<f64>,
}

impl<const D: usize> FiniteElementState<D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    pub fn new(name: impl Into<String>, space: Arc<FiniteElementSpace<D>>) -> Self {
        let n = space.true_vsize();
        Self {
            name: name.into(),
            space,
            grid_function: DVector::zeros(n),
            true_vec: DVector::zeros(n),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space(&self) -> &Arc<FiniteElementSpace<D>> {
        &self.space
    }

    pub fn true_vec(&self) -> &DVector<f64> {
        &self.true_vec
    }

    pub fn true_vec_mut(&mut self) -> &mut DVector<f64> {
        &mut self.true_vec
    }

    pub fn grid_function(&self) -> &DVector<f64> {
        &self.grid_function
    }

    /// Gathers the local representation into the true vector.
    pub fn initialize_true_vec(&mut self) {
        self.true_vec.copy_from(&self.grid_function);
    }

    /// Scatters the true vector into the local representation.
    pub fn distribute_shared_dofs(&mut self) {
        self.grid_function.copy_from(&self.true_vec);
    }

    /// Sets both representations from a coefficient.
    pub fn project(&mut self, coefficient: &Coefficient<D>, time: f64) -> eyre::Result<()> {
        self.true_vec = self.space.project(coefficient, time)?;
        self.distribute_shared_dofs();
        Ok(())
    }

    /// Sets both representations from an algebraic vector.
    pub fn set_true_vec(&mut self, values: &DVector<f64>) {
        assert_eq!(values.len(), self.true_vec.len(), "vector size does not match the space");
        self.true_vec.copy_from(values);
        self.distribute_shared_dofs();
    }
}

/// A named dual vector (load or sensitivity) on a finite element space.
#[derive(Debug, Clone)]
pub struct FiniteElementDual<const D: usize> {
    name: String,
    space: Arc<FiniteElementSpace<D>>,
    true_vec: DVector<f64>,
}

impl<const D: usize> FiniteElementDual<D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    pub fn new(name: impl Into<String>, space: Arc<FiniteElementSpace<D>>) -> Self {
        let n = space.true_vsize();
        Self {
            name: name.into(),
            space,
            true_vec: DVector::zeros(n),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space(&self) -> &Arc<FiniteElementSpace<D>> {
        &self.space
    }

    pub fn true_vec(&self) -> &DVector<f64> {
        &self.true_vec
    }

    pub fn true_vec_mut(&mut self) -> &mut DVector<f64> {
        &mut self.true_vec
    }
}
