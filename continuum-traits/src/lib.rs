//! Number traits shared by the `continuum` crates.
//!
//! Constitutive models and integrands are written once against [`Real`] and evaluated either
//! with plain `f64` values or with the forward-mode dual number [`Dual64`], which carries a single
//! directional derivative alongside its value.
use nalgebra::RealField;

pub use nalgebra;
pub use num_dual;
pub use num_dual::Dual64;

/// A real number type usable in constitutive and integrand evaluation.
pub trait Real: RealField + Copy + Send + Sync {
    /// The value of the number with any derivative information stripped.
    fn value(&self) -> f64;

    /// The directional derivative carried by the number.
    ///
    /// Always zero for plain floating point types.
    fn derivative(&self) -> f64;

    /// Constructs a number with the given value and a zero derivative.
    fn from_value(value: f64) -> Self;
}

impl Real for f64 {
    fn value(&self) -> f64 {
        *self
    }

    fn derivative(&self) -> f64 {
        0.0
    }

    fn from_value(value: f64) -> Self {
        value
    }
}

impl Real for Dual64 {
    fn value(&self) -> f64 {
        self.re
    }

    fn derivative(&self) -> f64 {
        self.eps
    }

    fn from_value(value: f64) -> Self {
        Dual64::from(value)
    }
}

/// Constructs a dual number with the given value and derivative seed.
pub fn seeded(value: f64, derivative: f64) -> Dual64 {
    let mut dual = Dual64::from(value);
    dual.eps = derivative;
    dual
}
