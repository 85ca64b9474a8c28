//! Thermal materials, heat sources and boundary fluxes.
//!
//! Every model may depend on parameter fields. A model that returns `None` from
//! `num_parameters` ignores them, while a model that returns `Some(n)` must be attached to a
//! module with exactly `n` parameter fields.
use continuum_traits::Real;
use nalgebra::SVector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pointwise response of a thermal material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalResponse<T, const D: usize> {
    pub density: T,
    pub specific_heat_capacity: T,
    /// The heat flux `q`, which points from hot to cold, i.e. `q = -κ ∇u` for Fourier's law.
    pub heat_flux: SVector<T, D>,
}

pub trait ThermalMaterial<const D: usize>: Send + Sync + 'static {
    fn num_parameters(&self) -> Option<usize> {
        None
    }

    fn response<T: Real>(
        &self,
        x: &SVector<f64, D>,
        temperature: T,
        temperature_gradient: &SVector<T, D>,
        parameters: &[T],
    ) -> ThermalResponse<T, D>;
}

/// A volumetric heat source `s(x, t, u, ∇u)`.
pub trait ThermalSource<const D: usize>: Send + Sync + 'static {
    fn num_parameters(&self) -> Option<usize> {
        None
    }

    fn source<T: Real>(
        &self,
        x: &SVector<f64, D>,
        time: f64,
        temperature: T,
        temperature_gradient: &SVector<T, D>,
        parameters: &[T],
    ) -> T;
}

/// A boundary heat flux `q_n(x, n, u)`, counted positive when it leaves the domain.
pub trait ThermalFluxBoundary<const D: usize>: Send + Sync + 'static {
    fn num_parameters(&self) -> Option<usize> {
        None
    }

    fn flux<T: Real>(&self, x: &SVector<f64, D>, normal: &SVector<f64, D>, temperature: T, parameters: &[T]) -> T;
}

/// Fourier conduction with constant properties.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearIsotropicConductor {
    pub density: f64,
    pub specific_heat_capacity: f64,
    pub conductivity: f64,
}

impl Default for LinearIsotropicConductor {
    fn default() -> Self {
        Self {
            density: 1.0,
            specific_heat_capacity: 1.0,
            conductivity: 1.0,
        }
    }
}

impl<const D: usize> ThermalMaterial<D> for LinearIsotropicConductor {
    fn response<T: Real>(
        &self,
        _x: &SVector<f64, D>,
        _temperature: T,
        temperature_gradient: &SVector<T, D>,
        _parameters: &[T],
    ) -> ThermalResponse<T, D> {
        ThermalResponse {
            density: T::from_value(self.density),
            specific_heat_capacity: T::from_value(self.specific_heat_capacity),
            heat_flux: temperature_gradient * T::from_value(-self.conductivity),
        }
    }
}

/// Fourier conduction whose conductivity is offset by the first parameter field,
/// `κ = κ_0 + p_0`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterizedLinearIsotropicConductor {
    pub density: f64,
    pub specific_heat_capacity: f64,
    pub conductivity_offset: f64,
}

impl<const D: usize> ThermalMaterial<D> for ParameterizedLinearIsotropicConductor {
    fn num_parameters(&self) -> Option<usize> {
        Some(1)
    }

    fn response<T: Real>(
        &self,
        _x: &SVector<f64, D>,
        _temperature: T,
        temperature_gradient: &SVector<T, D>,
        parameters: &[T],
    ) -> ThermalResponse<T, D> {
        let conductivity = T::from_value(self.conductivity_offset) + parameters[0];
        ThermalResponse {
            density: T::from_value(self.density),
            specific_heat_capacity: T::from_value(self.specific_heat_capacity),
            heat_flux: temperature_gradient * (-conductivity),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantSource {
    pub value: f64,
}

impl<const D: usize> ThermalSource<D> for ConstantSource {
    fn source<T: Real>(&self, _x: &SVector<f64, D>, _time: f64, _u: T, _du_dx: &SVector<T, D>, _p: &[T]) -> T {
        T::from_value(self.value)
    }
}

/// A heat source given by a function of position and time.
#[derive(Clone)]
pub struct SourceFunction<const D: usize> {
    function: Arc<dyn Fn(&SVector<f64, D>, f64) -> f64 + Send + Sync>,
}

impl<const D: usize> SourceFunction<D> {
    pub fn new(function: impl Fn(&SVector<f64, D>, f64) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            function: Arc::new(function),
        }
    }
}

impl<const D: usize> ThermalSource<D> for SourceFunction<D> {
    fn source<T: Real>(&self, x: &SVector<f64, D>, time: f64, _u: T, _du_dx: &SVector<T, D>, _p: &[T]) -> T {
        T::from_value((self.function)(x, time))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantFlux {
    pub value: f64,
}

impl<const D: usize> ThermalFluxBoundary<D> for ConstantFlux {
    fn flux<T: Real>(&self, _x: &SVector<f64, D>, _n: &SVector<f64, D>, _u: T, _p: &[T]) -> T {
        T::from_value(self.value)
    }
}

/// A boundary flux given by a function of position and outward normal.
#[derive(Clone)]
pub struct FluxFunction<const D: usize> {
    function: Arc<dyn Fn(&SVector<f64, D>, &SVector<f64, D>) -> f64 + Send + Sync>,
}

impl<const D: usize> FluxFunction<D> {
    pub fn new(function: impl Fn(&SVector<f64, D>, &SVector<f64, D>) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            function: Arc::new(function),
        }
    }
}

impl<const D: usize> ThermalFluxBoundary<D> for FluxFunction<D> {
    fn flux<T: Real>(&self, x: &SVector<f64, D>, n: &SVector<f64, D>, _u: T, _p: &[T]) -> T {
        T::from_value((self.function)(x, n))
    }
}

/// Convective (Robin) boundary flux `q_n = h (u - u_ambient)`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvectiveFlux {
    pub heat_transfer_coefficient: f64,
    pub ambient_temperature: f64,
}

impl<const D: usize> ThermalFluxBoundary<D> for ConvectiveFlux {
    fn flux<T: Real>(&self, _x: &SVector<f64, D>, _n: &SVector<f64, D>, u: T, _p: &[T]) -> T {
        (u - T::from_value(self.ambient_temperature)) * T::from_value(self.heat_transfer_coefficient)
    }
}
