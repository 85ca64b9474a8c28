use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub mod procedural;

/// A face of a cell that lies on the boundary of the domain.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryFace {
    pub cell: usize,
    /// The local face index `2 k + s` of the reference cube, see [`crate::quadrature::face_gauss`].
    pub local_face: usize,
    /// The boundary attribute (marker) of the face. Attributes are positive.
    pub attribute: usize,
}

/// Index-based conforming mesh of tensor-product cells (quadrilaterals or hexahedra).
///
/// The spatial dimension is stored at runtime. Each cell has `2^dim` vertices, where bit `k` of
/// the local vertex index selects the lower (0) or upper (1) end of the cell along axis `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    dimension: usize,
    vertices: Vec<f64>,
    cells: Vec<usize>,
    boundary_faces: Vec<BoundaryFace>,
}

impl Mesh {
    /// Constructs a mesh from flattened vertex coordinates and flattened cell connectivity.
    ///
    /// # Panics
    ///
    /// Panics if the buffers are not consistent with the dimension, or if a cell or boundary
    /// face refers to a non-existent vertex or cell.
    pub fn from_parts(
        dimension: usize,
        vertices: Vec<f64>,
        cells: Vec<usize>,
        boundary_faces: Vec<BoundaryFace>,
    ) -> Self {
        assert!(dimension == 2 || dimension == 3, "only 2D and 3D meshes are supported");
        assert_eq!(vertices.len() % dimension, 0, "vertex buffer length must be a multiple of the dimension");
        let vertices_per_cell = 1 << dimension;
        assert_eq!(cells.len() % vertices_per_cell, 0, "cell buffer length must be a multiple of 2^dim");
        let num_vertices = vertices.len() / dimension;
        assert!(cells.iter().all(|&v| v < num_vertices), "cell refers to a non-existent vertex");
        let num_cells = cells.len() / vertices_per_cell;
        assert!(
            boundary_faces
                .iter()
                .all(|f| f.cell < num_cells && f.local_face < 2 * dimension),
            "boundary face refers to a non-existent cell or face"
        );

        Self {
            dimension,
            vertices,
            cells,
            boundary_faces,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn vertices_per_cell(&self) -> usize {
        1 << self.dimension
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len() / self.dimension
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len() / self.vertices_per_cell()
    }

    pub fn vertex(&self, index: usize) -> &[f64] {
        &self.vertices[self.dimension * index..self.dimension * (index + 1)]
    }

    pub fn vertices(&self) -> &[f64] {
        &self.vertices
    }

    pub fn vertices_mut(&mut self) -> &mut [f64] {
        &mut self.vertices
    }

    pub fn cell_vertices(&self, cell: usize) -> &[usize] {
        let n = self.vertices_per_cell();
        &self.cells[n * cell..n * (cell + 1)]
    }

    pub fn boundary_faces(&self) -> &[BoundaryFace] {
        &self.boundary_faces
    }

    /// The sorted set of distinct boundary attributes present in the mesh.
    pub fn boundary_attributes(&self) -> Vec<usize> {
        self.boundary_faces
            .iter()
            .map(|f| f.attribute)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Global vertex indices of a boundary face.
    pub fn face_vertices(&self, face: &BoundaryFace) -> Vec<usize> {
        let k = face.local_face / 2;
        let s = face.local_face % 2;
        self.cell_vertices(face.cell)
            .iter()
            .enumerate()
            .filter(|(a, _)| (a >> k) & 1 == s)
            .map(|(_, &v)| v)
            .collect()
    }
}
