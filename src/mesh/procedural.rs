//! Basic procedural mesh generation routines.
use crate::mesh::{BoundaryFace, Mesh};

/// Creates a uniform mesh of the box `[0, extents[0]] x ... x [0, extents[D - 1]]`.
///
/// Vertices are numbered lexicographically with the first axis varying fastest. Boundary faces
/// on the lower and upper side of axis `k` receive the attributes `2 k + 1` and `2 k + 2`,
/// so that in 3D the attributes 1 to 6 denote the faces `x = 0`, `x = L_x`, `y = 0`, `y = L_y`,
/// `z = 0` and `z = L_z`.
///
/// # Panics
///
/// Panics if `D` is not 2 or 3, or if any number of cells is zero.
pub fn create_box_mesh<const D: usize>(extents: [f64; D], cells_per_dim: [usize; D]) -> Mesh {
    assert!(cells_per_dim.iter().all(|&n| n > 0), "number of cells must be positive");

    let vertices_per_dim = cells_per_dim.map(|n| n + 1);
    let num_vertices: usize = vertices_per_dim.iter().product();
    let num_cells: usize = cells_per_dim.iter().product();

    let to_multi_index = |mut index: usize, sizes: &[usize; D]| {
        let mut multi = [0; D];
        for k in 0..D {
            multi[k] = index % sizes[k];
            index /= sizes[k];
        }
        multi
    };
    let to_global_vertex_index = |multi: &[usize; D]| {
        let mut index = 0;
        let mut stride = 1;
        for k in 0..D {
            index += stride * multi[k];
            stride *= vertices_per_dim[k];
        }
        index
    };

    let mut vertices = Vec::with_capacity(D * num_vertices);
    for v in 0..num_vertices {
        let multi = to_multi_index(v, &vertices_per_dim);
        for k in 0..D {
            vertices.push(extents[k] * multi[k] as f64 / cells_per_dim[k] as f64);
        }
    }

    let mut cells = Vec::with_capacity((1 << D) * num_cells);
    let mut boundary_faces = Vec::new();
    for c in 0..num_cells {
        let multi = to_multi_index(c, &cells_per_dim);
        for a in 0..(1 << D) {
            let mut corner = multi;
            for k in 0..D {
                corner[k] += (a >> k) & 1;
            }
            cells.push(to_global_vertex_index(&corner));
        }

        for k in 0..D {
            if multi[k] == 0 {
                boundary_faces.push(BoundaryFace {
                    cell: c,
                    local_face: 2 * k,
                    attribute: 2 * k + 1,
                });
            }
            if multi[k] + 1 == cells_per_dim[k] {
                boundary_faces.push(BoundaryFace {
                    cell: c,
                    local_face: 2 * k + 1,
                    attribute: 2 * k + 2,
                });
            }
        }
    }

    Mesh::from_parts(D, vertices, cells, boundary_faces)
}

pub fn create_rectangular_uniform_quad_mesh(length_x: f64, length_y: f64, cells_x: usize, cells_y: usize) -> Mesh {
    create_box_mesh([length_x, length_y], [cells_x, cells_y])
}

pub fn create_rectangular_uniform_hex_mesh(extents: [f64; 3], cells_per_dim: [usize; 3]) -> Mesh {
    create_box_mesh(extents, cells_per_dim)
}

pub fn create_unit_square_uniform_quad_mesh(cells_per_dim: usize) -> Mesh {
    create_box_mesh([1.0, 1.0], [cells_per_dim; 2])
}
