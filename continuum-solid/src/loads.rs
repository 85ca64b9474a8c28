//! Body forces and boundary loads.
//!
//! Loads are stateless and only depend on the reference position, the reference outward normal
//! and time.
use nalgebra::SVector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A force per unit reference volume.
pub trait BodyForce<const D: usize>: Send + Sync + 'static {
    fn force(&self, x: &SVector<f64, D>, time: f64) -> SVector<f64, D>;
}

/// A force per unit reference area.
pub trait Traction<const D: usize>: Send + Sync + 'static {
    fn traction(&self, x: &SVector<f64, D>, normal: &SVector<f64, D>, time: f64) -> SVector<f64, D>;
}

/// A pressure acting against the outward normal of the boundary.
pub trait Pressure<const D: usize>: Send + Sync + 'static {
    fn pressure(&self, x: &SVector<f64, D>, time: f64) -> f64;
}

/// A uniform body force, e.g. gravity.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantBodyForce<const D: usize> {
    pub force: SVector<f64, D>,
}

impl<const D: usize> BodyForce<D> for ConstantBodyForce<D> {
    fn force(&self, _x: &SVector<f64, D>, _time: f64) -> SVector<f64, D> {
        self.force
    }
}

#[derive(Clone)]
pub struct BodyForceFunction<const D: usize> {
    function: Arc<dyn Fn(&SVector<f64, D>, f64) -> SVector<f64, D> + Send + Sync>,
}

impl<const D: usize> BodyForceFunction<D> {
    pub fn new(function: impl Fn(&SVector<f64, D>, f64) -> SVector<f64, D> + Send + Sync + 'static) -> Self {
        Self {
            function: Arc::new(function),
        }
    }
}

impl<const D: usize> BodyForce<D> for BodyForceFunction<D> {
    fn force(&self, x: &SVector<f64, D>, time: f64) -> SVector<f64, D> {
        (self.function)(x, time)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantTraction<const D: usize> {
    pub traction: SVector<f64, D>,
}

impl<const D: usize> Traction<D> for ConstantTraction<D> {
    fn traction(&self, _x: &SVector<f64, D>, _normal: &SVector<f64, D>, _time: f64) -> SVector<f64, D> {
        self.traction
    }
}

/// A traction given by a function of position, outward normal and time.
#[derive(Clone)]
pub struct TractionFunction<const D: usize> {
    function: Arc<dyn Fn(&SVector<f64, D>, &SVector<f64, D>, f64) -> SVector<f64, D> + Send + Sync>,
}

impl<const D: usize> TractionFunction<D> {
    pub fn new(
        function: impl Fn(&SVector<f64, D>, &SVector<f64, D>, f64) -> SVector<f64, D> + Send + Sync + 'static,
    ) -> Self {
        Self {
            function: Arc::new(function),
        }
    }
}

impl<const D: usize> Traction<D> for TractionFunction<D> {
    fn traction(&self, x: &SVector<f64, D>, normal: &SVector<f64, D>, time: f64) -> SVector<f64, D> {
        (self.function)(x, normal, time)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantPressure {
    pub pressure: f64,
}

impl<const D: usize> Pressure<D> for ConstantPressure {
    fn pressure(&self, _x: &SVector<f64, D>, _time: f64) -> f64 {
        self.pressure
    }
}

#[derive(Clone)]
pub struct PressureFunction<const D: usize> {
    function: Arc<dyn Fn(&SVector<f64, D>, f64) -> f64 + Send + Sync>,
}

impl<const D: usize> PressureFunction<D> {
    pub fn new(function: impl Fn(&SVector<f64, D>, f64) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            function: Arc::new(function),
        }
    }
}

impl<const D: usize> Pressure<D> for PressureFunction<D> {
    fn pressure(&self, x: &SVector<f64, D>, time: f64) -> f64 {
        (self.function)(x, time)
    }
}
