//! First-order tensor-product Lagrange elements.
use crate::error::NumericError;
use crate::mesh::Mesh;
use nalgebra::{Const, DimMin, SMatrix, SVector};

/// Geometry and basis data of an element at a single reference point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointGeometry<const D: usize> {
    /// The physical point.
    pub x: SVector<f64, D>,
    /// Basis function values, one per element node.
    pub shape: Vec<f64>,
    /// Basis function gradients with respect to physical coordinates, one per element node.
    pub gradients: Vec<SVector<f64, D>>,
    /// Determinant of the reference-to-physical Jacobian.
    pub det: f64,
}

/// Geometry and basis data of an element face at a single reference point.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceGeometry<const D: usize> {
    pub x: SVector<f64, D>,
    pub shape: Vec<f64>,
    pub gradients: Vec<SVector<f64, D>>,
    /// Outward unit normal in the reference (undeformed) configuration.
    pub normal: SVector<f64, D>,
    /// Ratio of physical to reference face measure.
    pub area_scale: f64,
}

/// A bilinear quadrilateral (`D = 2`) or trilinear hexahedron (`D = 3`).
///
/// Nodes follow the ordering of [`Mesh`]: bit `k` of the local node index selects `ξ_k = -1`
/// (bit cleared) or `ξ_k = +1` (bit set).
#[derive(Debug, Clone, PartialEq)]
pub struct Q1Element<const D: usize> {
    index: usize,
    vertices: Vec<SVector<f64, D>>,
}

fn node_sign(node: usize, k: usize) -> f64 {
    if (node >> k) & 1 == 1 {
        1.0
    } else {
        -1.0
    }
}

impl<const D: usize> Q1Element<D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    pub fn from_vertices(index: usize, vertices: Vec<SVector<f64, D>>) -> Self {
        assert_eq!(vertices.len(), 1 << D, "Q1 element requires 2^D vertices");
        Self { index, vertices }
    }

    /// # Panics
    ///
    /// Panics if the mesh dimension is not `D`.
    pub fn from_mesh_cell(mesh: &Mesh, cell: usize) -> Self {
        assert_eq!(mesh.dimension(), D, "mesh dimension must match element dimension");
        let vertices = mesh
            .cell_vertices(cell)
            .iter()
            .map(|&v| SVector::from_column_slice(mesh.vertex(v)))
            .collect();
        Self::from_vertices(cell, vertices)
    }

    pub fn num_nodes(&self) -> usize {
        1 << D
    }

    pub fn vertices(&self) -> &[SVector<f64, D>] {
        &self.vertices
    }

    /// Evaluates `N_a(ξ) = Π_k (1 + σ_ak ξ_k) / 2` for every node `a`.
    pub fn reference_shape(xi: &SVector<f64, D>) -> Vec<f64> {
        (0..1 << D)
            .map(|a| (0..D).map(|k| 0.5 * (1.0 + node_sign(a, k) * xi[k])).product::<f64>())
            .collect()
    }

    pub fn reference_gradients(xi: &SVector<f64, D>) -> Vec<SVector<f64, D>> {
        (0..1 << D)
            .map(|a| {
                SVector::from_fn(|j, _| {
                    let mut g = 0.5 * node_sign(a, j);
                    for k in (0..D).filter(|&k| k != j) {
                        g *= 0.5 * (1.0 + node_sign(a, k) * xi[k]);
                    }
                    g
                })
            })
            .collect()
    }

    pub fn map_reference_coords(&self, xi: &SVector<f64, D>) -> SVector<f64, D> {
        Self::reference_shape(xi)
            .iter()
            .zip(&self.vertices)
            .fold(SVector::zeros(), |x, (n, v)| x + v * *n)
    }

    /// The Jacobian `J_ij = ∂x_i / ∂ξ_j` of the reference-to-physical map.
    pub fn reference_jacobian(&self, xi: &SVector<f64, D>) -> SMatrix<f64, D, D> {
        Self::reference_gradients(xi)
            .iter()
            .zip(&self.vertices)
            .fold(SMatrix::zeros(), |j, (g, v)| j + v * g.transpose())
    }

    fn inverse_jacobian(&self, jacobian: &SMatrix<f64, D, D>) -> Result<(f64, SMatrix<f64, D, D>), NumericError> {
        let det = jacobian.determinant();
        let degenerate = NumericError::DegenerateElement { element: self.index };
        if !(det > 0.0) || !det.is_finite() {
            return Err(degenerate);
        }
        let inverse = jacobian.try_inverse().ok_or(degenerate)?;
        Ok((det, inverse))
    }

    /// Computes the physical point, basis values and physical basis gradients at `xi`.
    pub fn geometry_at(&self, xi: &SVector<f64, D>) -> Result<PointGeometry<D>, NumericError> {
        let jacobian = self.reference_jacobian(xi);
        let (det, j_inv) = self.inverse_jacobian(&jacobian)?;
        let j_inv_t = j_inv.transpose();
        let gradients = Self::reference_gradients(xi)
            .iter()
            .map(|g| j_inv_t * g)
            .collect();
        Ok(PointGeometry {
            x: self.map_reference_coords(xi),
            shape: Self::reference_shape(xi),
            gradients,
            det,
        })
    }

    /// Computes face data at the reference point `xi`, which must lie on the face `local_face`.
    ///
    /// The area element follows from Nanson's formula: `n dA = det(J) J^{-T} N_ref dA_ref`.
    pub fn face_geometry_at(&self, xi: &SVector<f64, D>, local_face: usize) -> Result<FaceGeometry<D>, NumericError> {
        let k = local_face / 2;
        let sign = if local_face % 2 == 0 { -1.0 } else { 1.0 };
        let jacobian = self.reference_jacobian(xi);
        let (det, j_inv) = self.inverse_jacobian(&jacobian)?;
        let j_inv_t = j_inv.transpose();

        let scaled_normal = j_inv_t.column(k) * (sign * det);
        let area_scale = scaled_normal.norm();
        Ok(FaceGeometry {
            x: self.map_reference_coords(xi),
            shape: Self::reference_shape(xi),
            gradients: Self::reference_gradients(xi)
                .iter()
                .map(|g| j_inv_t * g)
                .collect(),
            normal: scaled_normal / area_scale,
            area_scale,
        })
    }
}
