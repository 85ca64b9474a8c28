//! Differentiable weak-form assembly and physics modules for thermal and solid mechanics
//! problems on quadrilateral and hexahedral meshes.
pub mod boundary;
pub mod element;
pub mod error;
pub mod functional;
pub mod mesh;
pub mod physics;
pub mod quadrature;
pub mod solvers;
pub mod space;
pub mod thermal;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub mod optimize {
    pub use continuum_optimize::*;
}

pub mod sparse {
    pub use continuum_sparse::*;
}

pub use continuum_traits::{seeded, Dual64, Real};

pub extern crate eyre;
pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
