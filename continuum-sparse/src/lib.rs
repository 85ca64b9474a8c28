//! Sparse linear solvers and boundary condition handling for `continuum`.
pub mod cg;
pub mod direct;
pub mod essential;

pub use nalgebra_sparse;
pub use nalgebra_sparse::{CooMatrix, CsrMatrix};
