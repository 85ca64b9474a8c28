//! Differentiable assembly of weak-form residuals.
//!
//! A [`Functional`] maps an ordered list of trial fields to a residual vector in the test space.
//! Its contributions are written once as generic [`DomainIntegrand`]s and [`BoundaryIntegrand`]s
//! over [`Real`] numbers. Residuals are evaluated with `f64`, while gradients with respect to a
//! trial field are obtained by forward-mode differentiation with [`Dual64`], sweeping once per
//! local degree of freedom of that field.
//!
//! Integrands may carry per-quadrature-point history. Residual and gradient evaluations only
//! ever see the committed history (probe mode), and history is mutated exclusively by
//! [`Functional::update_state`] (commit mode). A commit is all or nothing: if any point fails,
//! the previously committed history is kept.
use crate::element::{FaceGeometry, PointGeometry};
use crate::mesh::BoundaryFace;
use crate::quadrature::{face_gauss, tensor_gauss, Rule};
use crate::space::FiniteElementSpace;
use continuum_sparse::essential::{apply_homogeneous_essential_dofs_csr, zero_rows_csr};
use continuum_traits::{seeded, Dual64, Real};
use itertools::izip;
use log::debug;
use nalgebra::{Const, DMatrix, DVector, DimMin, SMatrix, SVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Number of Gauss points per dimension used for all integrals.
pub const QUADRATURE_POINTS_PER_DIM: usize = 2;

/// Value and gradient of a (possibly vector-valued) field at a point.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue<T> {
    /// One entry per component.
    pub value: DVector<T>,
    /// `gradient[(c, j)] = ∂u_c / ∂x_j`.
    pub gradient: DMatrix<T>,
}

impl<T: Real> FieldValue<T> {
    pub fn scalar(&self) -> T {
        self.value[0]
    }

    pub fn scalar_gradient<const D: usize>(&self) -> SVector<T, D> {
        SVector::from_fn(|j, _| self.gradient[(0, j)])
    }

    pub fn vector<const D: usize>(&self) -> SVector<T, D> {
        SVector::from_fn(|i, _| self.value[i])
    }

    pub fn vector_gradient<const D: usize>(&self) -> SMatrix<T, D, D> {
        SMatrix::from_fn(|i, j| self.gradient[(i, j)])
    }
}

/// The pointwise integrand `(source, flux)` of a domain integral.
///
/// The contribution to the residual entry of test basis function `N_a` and component `c` is
/// `source_c N_a + Σ_j flux_cj ∂N_a/∂x_j`.
#[derive(Debug, Clone, PartialEq)]
pub struct Integrand<T> {
    pub source: DVector<T>,
    pub flux: DMatrix<T>,
}

impl<T: Real> Integrand<T> {
    pub fn scalar<const D: usize>(source: T, flux: SVector<T, D>) -> Self {
        Self {
            source: DVector::from_element(1, source),
            flux: DMatrix::from_fn(1, D, |_, j| flux[j]),
        }
    }

    pub fn vector<const D: usize>(source: SVector<T, D>, flux: SMatrix<T, D, D>) -> Self {
        Self {
            source: DVector::from_fn(D, |i, _| source[i]),
            flux: DMatrix::from_fn(D, D, |i, j| flux[(i, j)]),
        }
    }
}

/// A quadrature point of a domain integral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraturePoint<const D: usize> {
    pub x: SVector<f64, D>,
    pub element: usize,
    /// Index of the point within its element.
    pub index: usize,
    /// Global index of the point, used to address per-point history.
    pub id: usize,
    pub time: f64,
}

/// A quadrature point of a boundary integral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryPoint<const D: usize> {
    pub x: SVector<f64, D>,
    /// Outward unit normal in the reference configuration.
    pub normal: SVector<f64, D>,
    pub element: usize,
    pub attribute: usize,
    pub time: f64,
}

/// A domain integrand, generic over the number type used for evaluation.
pub trait DomainIntegrand<const D: usize>: Send + Sync + 'static {
    /// Per-quadrature-point history. Use `()` for stateless integrands.
    type State: Clone + Send + Sync + 'static;

    fn initial_state(&self) -> Self::State;

    /// Evaluates the integrand given the committed history of the point.
    fn evaluate<T: Real>(
        &self,
        state: &Self::State,
        point: &QuadraturePoint<D>,
        fields: &[FieldValue<T>],
    ) -> eyre::Result<Integrand<T>>;

    /// Updates the history of the point after a converged step.
    fn commit(
        &self,
        _state: &mut Self::State,
        _point: &QuadraturePoint<D>,
        _fields: &[FieldValue<f64>],
    ) -> eyre::Result<()> {
        Ok(())
    }
}

/// A boundary integrand. Only a source term is supported on boundaries.
pub trait BoundaryIntegrand<const D: usize>: Send + Sync + 'static {
    fn evaluate<T: Real>(&self, point: &BoundaryPoint<D>, fields: &[FieldValue<T>]) -> eyre::Result<DVector<T>>;
}

/// Object-safe form of a [`DomainIntegrand`] together with its history arena.
pub trait DomainIntegral<const D: usize>: Send + Sync {
    fn evaluate_value(&self, point: &QuadraturePoint<D>, fields: &[FieldValue<f64>]) -> eyre::Result<Integrand<f64>>;
    fn evaluate_dual(
        &self,
        point: &QuadraturePoint<D>,
        fields: &[FieldValue<Dual64>],
    ) -> eyre::Result<Integrand<Dual64>>;
    /// Copies the committed history into the staging buffer written by [`commit`](Self::commit).
    fn stage(&mut self);
    fn commit(&mut self, point: &QuadraturePoint<D>, fields: &[FieldValue<f64>]) -> eyre::Result<()>;
    /// Makes the staged history the committed history.
    fn publish(&mut self);
    fn as_any(&self) -> &dyn Any;
}

/// Object-safe form of a [`BoundaryIntegrand`].
pub trait BoundaryIntegral<const D: usize>: Send + Sync {
    fn evaluate_value(&self, point: &BoundaryPoint<D>, fields: &[FieldValue<f64>]) -> eyre::Result<DVector<f64>>;
    fn evaluate_dual(&self, point: &BoundaryPoint<D>, fields: &[FieldValue<Dual64>]) -> eyre::Result<DVector<Dual64>>;
}

impl<const D: usize, I: BoundaryIntegrand<D>> BoundaryIntegral<D> for I {
    fn evaluate_value(&self, point: &BoundaryPoint<D>, fields: &[FieldValue<f64>]) -> eyre::Result<DVector<f64>> {
        self.evaluate(point, fields)
    }

    fn evaluate_dual(&self, point: &BoundaryPoint<D>, fields: &[FieldValue<Dual64>]) -> eyre::Result<DVector<Dual64>> {
        self.evaluate(point, fields)
    }
}

struct StatefulIntegral<const D: usize, I: DomainIntegrand<D>> {
    integrand: I,
    states: Vec<I::State>,
    staged: Vec<I::State>,
}

impl<const D: usize, I: DomainIntegrand<D>> DomainIntegral<D> for StatefulIntegral<D, I> {
    fn evaluate_value(&self, point: &QuadraturePoint<D>, fields: &[FieldValue<f64>]) -> eyre::Result<Integrand<f64>> {
        self.integrand.evaluate(&self.states[point.id], point, fields)
    }

    fn evaluate_dual(
        &self,
        point: &QuadraturePoint<D>,
        fields: &[FieldValue<Dual64>],
    ) -> eyre::Result<Integrand<Dual64>> {
        self.integrand.evaluate(&self.states[point.id], point, fields)
    }

    fn stage(&mut self) {
        self.staged.clone_from(&self.states);
    }

    fn commit(&mut self, point: &QuadraturePoint<D>, fields: &[FieldValue<f64>]) -> eyre::Result<()> {
        self.integrand
            .commit(&mut self.staged[point.id], point, fields)
    }

    fn publish(&mut self) {
        std::mem::swap(&mut self.states, &mut self.staged);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Dispatches evaluation of erased integrals to the entry point matching the number type.
trait Evaluate<const D: usize>: Real {
    fn domain(
        integral: &dyn DomainIntegral<D>,
        point: &QuadraturePoint<D>,
        fields: &[FieldValue<Self>],
    ) -> eyre::Result<Integrand<Self>>;

    fn boundary(
        integral: &dyn BoundaryIntegral<D>,
        point: &BoundaryPoint<D>,
        fields: &[FieldValue<Self>],
    ) -> eyre::Result<DVector<Self>>;
}

impl<const D: usize> Evaluate<D> for f64 {
    fn domain(
        integral: &dyn DomainIntegral<D>,
        point: &QuadraturePoint<D>,
        fields: &[FieldValue<Self>],
    ) -> eyre::Result<Integrand<Self>> {
        integral.evaluate_value(point, fields)
    }

    fn boundary(
        integral: &dyn BoundaryIntegral<D>,
        point: &BoundaryPoint<D>,
        fields: &[FieldValue<Self>],
    ) -> eyre::Result<DVector<Self>> {
        integral.evaluate_value(point, fields)
    }
}

impl<const D: usize> Evaluate<D> for Dual64 {
    fn domain(
        integral: &dyn DomainIntegral<D>,
        point: &QuadraturePoint<D>,
        fields: &[FieldValue<Self>],
    ) -> eyre::Result<Integrand<Self>> {
        integral.evaluate_dual(point, fields)
    }

    fn boundary(
        integral: &dyn BoundaryIntegral<D>,
        point: &BoundaryPoint<D>,
        fields: &[FieldValue<Self>],
    ) -> eyre::Result<DVector<Self>> {
        integral.evaluate_dual(point, fields)
    }
}

/// Interpolates local element values at a point with the given basis values and gradients.
fn interpolate<T: Real, const D: usize>(
    shape: &[f64],
    gradients: &[SVector<f64, D>],
    local_values: &DVector<T>,
    components: usize,
) -> FieldValue<T> {
    let mut value = DVector::zeros(components);
    let mut gradient = DMatrix::zeros(components, D);
    for (a, n_a, grad_a) in izip!(0.., shape, gradients) {
        for c in 0..components {
            let u = local_values[components * a + c];
            value[c] += u * T::from_value(*n_a);
            for j in 0..D {
                gradient[(c, j)] += u * T::from_value(grad_a[j]);
            }
        }
    }
    FieldValue { value, gradient }
}

/// A unit of assembly work: the domain integrals of one cell, or one boundary integral on one
/// boundary face.
#[derive(Debug, Clone, Copy)]
enum Task {
    Cell(usize),
    Face { face: BoundaryFace, integral: usize },
}

impl Task {
    fn cell(&self) -> usize {
        match self {
            Task::Cell(cell) => *cell,
            Task::Face { face, .. } => face.cell,
        }
    }
}

enum TaskGeometry<const D: usize> {
    Cell(Vec<PointGeometry<D>>),
    Face(Vec<FaceGeometry<D>>),
}

/// A weak-form residual operator with contributions from domain and boundary integrals.
pub struct Functional<const D: usize> {
    test: Arc<FiniteElementSpace<D>>,
    trials: Vec<Arc<FiniteElementSpace<D>>>,
    domain_integrals: Vec<Box<dyn DomainIntegral<D>>>,
    boundary_integrals: Vec<(Vec<usize>, Box<dyn BoundaryIntegral<D>>)>,
    essential_dofs: Vec<usize>,
    quadrature: Rule<D>,
    face_quadratures: Vec<Rule<D>>,
    gradient_assembly_count: AtomicUsize,
}

impl<const D: usize> Functional<D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    /// Creates a functional with the given test space and ordered trial spaces.
    ///
    /// # Panics
    ///
    /// Panics if no trial space is given, or if the spaces are not defined on the same mesh.
    pub fn new(test: Arc<FiniteElementSpace<D>>, trials: Vec<Arc<FiniteElementSpace<D>>>) -> Self {
        assert!(!trials.is_empty(), "a functional needs at least one trial space");
        assert!(
            trials
                .iter()
                .all(|trial| Arc::ptr_eq(trial.mesh(), test.mesh())),
            "test and trial spaces must share the same mesh"
        );
        Self {
            test,
            trials,
            domain_integrals: Vec::new(),
            boundary_integrals: Vec::new(),
            essential_dofs: Vec::new(),
            quadrature: tensor_gauss(QUADRATURE_POINTS_PER_DIM),
            face_quadratures: (0..2 * D)
                .map(|face| face_gauss(QUADRATURE_POINTS_PER_DIM, face))
                .collect(),
            gradient_assembly_count: AtomicUsize::new(0),
        }
    }

    pub fn test_space(&self) -> &Arc<FiniteElementSpace<D>> {
        &self.test
    }

    pub fn trial_space(&self, index: usize) -> &Arc<FiniteElementSpace<D>> {
        &self.trials[index]
    }

    pub fn num_trials(&self) -> usize {
        self.trials.len()
    }

    pub fn quadrature_points_per_element(&self) -> usize {
        self.quadrature.0.len()
    }

    pub fn num_quadrature_points(&self) -> usize {
        self.test.mesh().num_cells() * self.quadrature_points_per_element()
    }

    /// Attaches a domain integral and allocates its per-point history.
    pub fn add_domain_integral<I: DomainIntegrand<D>>(&mut self, integrand: I) {
        let states = vec![integrand.initial_state(); self.num_quadrature_points()];
        self.domain_integrals
            .push(Box::new(StatefulIntegral {
                integrand,
                states,
                staged: Vec::new(),
            }));
    }

    /// Attaches a boundary integral on the boundary faces carrying any of the given attributes.
    pub fn add_boundary_integral<I: BoundaryIntegrand<D>>(&mut self, markers: &[usize], integrand: I) {
        let integral: Box<dyn BoundaryIntegral<D>> = Box::new(integrand);
        self.boundary_integrals.push((markers.to_vec(), integral));
    }

    /// Sets the constrained test space dofs. The list is sorted and deduplicated.
    pub fn set_essential_bcs(&mut self, dofs: &[usize]) {
        let mut dofs = dofs.to_vec();
        dofs.sort_unstable();
        dofs.dedup();
        self.essential_dofs = dofs;
    }

    pub fn essential_dofs(&self) -> &[usize] {
        &self.essential_dofs
    }

    /// The committed history of the first attached domain integrand of type `I`.
    pub fn states<I: DomainIntegrand<D>>(&self) -> Option<&[I::State]> {
        self.domain_integrals.iter().find_map(|integral| {
            integral
                .as_any()
                .downcast_ref::<StatefulIntegral<D, I>>()
                .map(|stateful| stateful.states.as_slice())
        })
    }

    /// Number of gradient assemblies performed so far.
    pub fn gradient_assembly_count(&self) -> usize {
        self.gradient_assembly_count.load(Ordering::Relaxed)
    }

    fn check_args(&self, args: &[&DVector<f64>]) {
        assert_eq!(args.len(), self.trials.len(), "one argument per trial space is required");
        for (arg, trial) in args.iter().zip(&self.trials) {
            assert_eq!(arg.len(), trial.true_vsize(), "argument size does not match its trial space");
        }
    }

    fn tasks(&self) -> Vec<Task> {
        let mesh = self.test.mesh();
        let mut tasks: Vec<Task> = if self.domain_integrals.is_empty() {
            Vec::new()
        } else {
            (0..mesh.num_cells()).map(Task::Cell).collect()
        };
        for (integral, (markers, _)) in self.boundary_integrals.iter().enumerate() {
            tasks.extend(
                mesh.boundary_faces()
                    .iter()
                    .filter(|face| markers.contains(&face.attribute))
                    .map(|&face| Task::Face { face, integral }),
            );
        }
        tasks
    }

    fn task_geometry(&self, task: &Task) -> eyre::Result<TaskGeometry<D>> {
        let element = self.test.element(task.cell());
        Ok(match task {
            Task::Cell(_) => TaskGeometry::Cell(
                self.quadrature
                    .1
                    .iter()
                    .map(|xi| element.geometry_at(xi))
                    .collect::<Result<_, _>>()?,
            ),
            Task::Face { face, .. } => TaskGeometry::Face(
                self.face_quadratures[face.local_face]
                    .1
                    .iter()
                    .map(|xi| element.face_geometry_at(xi, face.local_face))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    fn gather<T: Real>(&self, cell: usize, args: &[&DVector<f64>]) -> Vec<DVector<T>> {
        args.iter()
            .zip(&self.trials)
            .map(|(arg, trial)| {
                let dofs = trial.element_dofs(cell);
                DVector::from_iterator(dofs.len(), dofs.iter().map(|&i| T::from_value(arg[i])))
            })
            .collect()
    }

    fn interpolate_all<T: Real>(
        &self,
        shape: &[f64],
        gradients: &[SVector<f64, D>],
        local_values: &[DVector<T>],
    ) -> Vec<FieldValue<T>> {
        local_values
            .iter()
            .zip(&self.trials)
            .map(|(values, trial)| interpolate(shape, gradients, values, trial.components()))
            .collect()
    }

    fn local_residual<T: Evaluate<D>>(
        &self,
        task: &Task,
        geometry: &TaskGeometry<D>,
        local_values: &[DVector<T>],
        time: f64,
    ) -> eyre::Result<DVector<T>> {
        let components = self.test.components();
        let cell = task.cell();
        let mut local = DVector::zeros(self.test.num_element_dofs());

        match (task, geometry) {
            (Task::Cell(_), TaskGeometry::Cell(points)) => {
                let nq = self.quadrature_points_per_element();
                for (q, geometry, w) in izip!(0.., points, &self.quadrature.0) {
                    let point = QuadraturePoint {
                        x: geometry.x,
                        element: cell,
                        index: q,
                        id: cell * nq + q,
                        time,
                    };
                    let fields = self.interpolate_all(&geometry.shape, &geometry.gradients, local_values);
                    let weight = T::from_value(w * geometry.det);
                    for integral in &self.domain_integrals {
                        let integrand = T::domain(integral.as_ref(), &point, &fields)?;
                        assert_eq!(integrand.source.len(), components, "integrand source has wrong size");
                        assert_eq!(integrand.flux.shape(), (components, D), "integrand flux has wrong shape");
                        for (a, n_a, grad_a) in izip!(0.., &geometry.shape, &geometry.gradients) {
                            for c in 0..components {
                                let mut r = integrand.source[c] * T::from_value(*n_a);
                                for j in 0..D {
                                    r += integrand.flux[(c, j)] * T::from_value(grad_a[j]);
                                }
                                local[components * a + c] += r * weight;
                            }
                        }
                    }
                }
            }
            (Task::Face { face, integral }, TaskGeometry::Face(points)) => {
                let integral = self.boundary_integrals[*integral].1.as_ref();
                let weights = &self.face_quadratures[face.local_face].0;
                for (geometry, w) in points.iter().zip(weights) {
                    let point = BoundaryPoint {
                        x: geometry.x,
                        normal: geometry.normal,
                        element: cell,
                        attribute: face.attribute,
                        time,
                    };
                    let fields = self.interpolate_all(&geometry.shape, &geometry.gradients, local_values);
                    let weight = T::from_value(w * geometry.area_scale);
                    let source = T::boundary(integral, &point, &fields)?;
                    assert_eq!(source.len(), components, "boundary integrand has wrong size");
                    for (a, n_a) in geometry.shape.iter().enumerate() {
                        for c in 0..components {
                            local[components * a + c] += source[c] * T::from_value(*n_a) * weight;
                        }
                    }
                }
            }
            _ => unreachable!("task geometry is always computed for its own task"),
        }
        Ok(local)
    }

    /// Evaluates the residual for the given trial field values at the given time.
    ///
    /// Rows of constrained test dofs are zero.
    pub fn residual(&self, args: &[&DVector<f64>], time: f64) -> eyre::Result<DVector<f64>> {
        self.check_args(args);
        let contributions = self
            .tasks()
            .into_par_iter()
            .map(|task| -> eyre::Result<_> {
                let geometry = self.task_geometry(&task)?;
                let local_values = self.gather::<f64>(task.cell(), args);
                let local = self.local_residual(&task, &geometry, &local_values, time)?;
                Ok((task.cell(), local))
            })
            .collect::<eyre::Result<Vec<_>>>()?;

        let mut residual = DVector::zeros(self.test.true_vsize());
        for (cell, local) in contributions {
            for (&i, r) in self.test.element_dofs(cell).iter().zip(local.iter()) {
                residual[i] += *r;
            }
        }
        for &i in &self.essential_dofs {
            residual[i] = 0.0;
        }
        Ok(residual)
    }

    /// Evaluates the residual together with its gradient with respect to trial field `wrt`.
    ///
    /// Rows of constrained test dofs are zero in both. When differentiating with respect to the
    /// primary field (`wrt == 0`) on a square system, the constrained columns are zeroed as well
    /// and a unit diagonal is placed in the constrained rows.
    pub fn residual_and_gradient(
        &self,
        args: &[&DVector<f64>],
        time: f64,
        wrt: usize,
    ) -> eyre::Result<(DVector<f64>, CsrMatrix<f64>)> {
        let (mut residual, mut gradient) = self.residual_and_unconstrained_gradient(args, time, wrt)?;
        for &i in &self.essential_dofs {
            residual[i] = 0.0;
        }
        if wrt == 0 && gradient.nrows() == gradient.ncols() {
            apply_homogeneous_essential_dofs_csr(&mut gradient, &self.essential_dofs);
        } else {
            zero_rows_csr(&mut gradient, &self.essential_dofs);
        }
        Ok((residual, gradient))
    }

    /// Evaluates the residual and its gradient with respect to trial field `wrt`, ignoring the
    /// essential dofs.
    pub fn residual_and_unconstrained_gradient(
        &self,
        args: &[&DVector<f64>],
        time: f64,
        wrt: usize,
    ) -> eyre::Result<(DVector<f64>, CsrMatrix<f64>)> {
        self.check_args(args);
        assert!(wrt < self.trials.len(), "trial index out of range");
        self.gradient_assembly_count.fetch_add(1, Ordering::Relaxed);

        let num_wrt_dofs = self.trials[wrt].num_element_dofs();
        let contributions = self
            .tasks()
            .into_par_iter()
            .map(|task| -> eyre::Result<_> {
                let geometry = self.task_geometry(&task)?;
                let mut local_values = self.gather::<Dual64>(task.cell(), args);
                let mut local_residual = DVector::zeros(self.test.num_element_dofs());
                let mut local_matrix = DMatrix::zeros(self.test.num_element_dofs(), num_wrt_dofs);
                for k in 0..num_wrt_dofs {
                    local_values[wrt][k] = seeded(local_values[wrt][k].re, 1.0);
                    let local = self.local_residual(&task, &geometry, &local_values, time)?;
                    local_values[wrt][k] = seeded(local_values[wrt][k].re, 0.0);
                    for (i, r) in local.iter().enumerate() {
                        local_matrix[(i, k)] = r.derivative();
                        local_residual[i] = r.value();
                    }
                }
                Ok((task.cell(), local_residual, local_matrix))
            })
            .collect::<eyre::Result<Vec<_>>>()?;

        let n = self.test.true_vsize();
        let m = self.trials[wrt].true_vsize();
        let mut residual = DVector::zeros(n);
        let mut coo = CooMatrix::new(n, m);
        for (cell, local_residual, local_matrix) in contributions {
            let rows = self.test.element_dofs(cell);
            let cols = self.trials[wrt].element_dofs(cell);
            for (a, &i) in rows.iter().enumerate() {
                residual[i] += local_residual[a];
                for (b, &j) in cols.iter().enumerate() {
                    coo.push(i, j, local_matrix[(a, b)]);
                }
            }
        }

        let gradient = CsrMatrix::from(&coo);
        debug!(
            "Assembled {}x{} gradient with respect to trial {} ({} nonzeros)",
            n,
            m,
            wrt,
            gradient.nnz()
        );
        Ok((residual, gradient))
    }

    /// Commits the history of every stateful domain integrand for the given converged fields.
    ///
    /// On error no history is changed.
    pub fn update_state(&mut self, args: &[&DVector<f64>], time: f64) -> eyre::Result<()> {
        self.check_args(args);
        if self.domain_integrals.is_empty() {
            return Ok(());
        }
        let nq = self.quadrature_points_per_element();
        for integral in &mut self.domain_integrals {
            integral.stage();
        }
        for cell in 0..self.test.mesh().num_cells() {
            let geometry = match self.task_geometry(&Task::Cell(cell))? {
                TaskGeometry::Cell(points) => points,
                TaskGeometry::Face(_) => unreachable!("cell tasks have cell geometry"),
            };
            let local_values = self.gather::<f64>(cell, args);
            for (q, point_geometry) in geometry.iter().enumerate() {
                let point = QuadraturePoint {
                    x: point_geometry.x,
                    element: cell,
                    index: q,
                    id: cell * nq + q,
                    time,
                };
                let fields = self.interpolate_all(&point_geometry.shape, &point_geometry.gradients, &local_values);
                for integral in &mut self.domain_integrals {
                    integral.commit(&point, &fields)?;
                }
            }
        }
        for integral in &mut self.domain_integrals {
            integral.publish();
        }
        Ok(())
    }
}
