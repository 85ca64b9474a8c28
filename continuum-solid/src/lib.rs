//! Solid mechanics functionality for `continuum`.
//!
//! Materials return the Kirchhoff stress as a function of the displacement gradient and a
//! per-point history. The [`SolidMechanics`](mechanics::SolidMechanics) module integrates either
//! that stress directly (small strain) or its Piola transform (geometric nonlinearities).
pub mod loads;
pub mod materials;
pub mod mechanics;
mod transform;

pub use mechanics::SolidMechanics;
pub use transform::kirchhoff_to_piola;
