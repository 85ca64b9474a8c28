//! Constitutive models for solids.
//!
//! All models are written in terms of the displacement gradient $\nabla \vec u$ and return the
//! Kirchhoff stress $\vec \tau$. For small strains the Kirchhoff, Cauchy and Piola stresses
//! coincide.
use continuum::Real;
use nalgebra::{Const, DimMin, Matrix3, RealField, SMatrix};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

/// A solid material model with per-point history.
pub trait SolidMaterial<const D: usize>: Send + Sync + 'static {
    /// History of a single quadrature point. Use `()` for history-free models.
    type State: Clone + Send + Sync + 'static;

    fn initial_state(&self) -> Self::State;

    /// Mass density in the reference configuration.
    fn density(&self) -> f64;

    /// Computes the Kirchhoff stress for the displacement gradient `du_dx`.
    ///
    /// Models with history update `state` as if the step were converged. Callers that only
    /// probe the response pass a copy of the committed state.
    fn stress<T: Real>(&self, state: &mut Self::State, du_dx: &SMatrix<T, D, D>) -> SMatrix<T, D, D>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LameParameters<T> {
    pub mu: T,
    pub lambda: T,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoungPoisson<T> {
    pub young: T,
    pub poisson: T,
}

/// Bulk modulus `K` and shear modulus `G`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkShear<T> {
    pub bulk: T,
    pub shear: T,
}

impl<T> From<YoungPoisson<T>> for LameParameters<T>
where
    T: RealField,
{
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn from(params: YoungPoisson<T>) -> Self {
        let YoungPoisson { young, poisson } = params;
        let mu = 0.5 * young / (1.0 + poisson.clone());
        let lambda = 2.0 * mu.clone() * poisson.clone() / (1.0 - 2.0 * poisson);
        Self { mu, lambda }
    }
}

impl<T> From<YoungPoisson<T>> for BulkShear<T>
where
    T: RealField,
{
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn from(params: YoungPoisson<T>) -> Self {
        let YoungPoisson { young, poisson } = params;
        Self {
            bulk: young.clone() / (3.0 * (1.0 - 2.0 * poisson.clone())),
            shear: 0.5 * young / (1.0 + poisson),
        }
    }
}

impl<T> From<BulkShear<T>> for LameParameters<T>
where
    T: RealField,
{
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn from(params: BulkShear<T>) -> Self {
        let BulkShear { bulk, shear } = params;
        Self {
            lambda: bulk - (2.0 / 3.0) * shear.clone(),
            mu: shear,
        }
    }
}

fn lame<T: Real>(bulk_modulus: f64, shear_modulus: f64) -> (T, T) {
    let lame = LameParameters::from(BulkShear {
        bulk: bulk_modulus,
        shear: shear_modulus,
    });
    (T::from_value(lame.lambda), T::from_value(lame.mu))
}

/// Linear isotropic elasticity,
/// $$
/// \vec \tau = \lambda \operatorname{tr}(\vec \epsilon) \vec I + 2 G \vec \epsilon,
/// \qquad \vec \epsilon = \tfrac{1}{2}(\nabla \vec u + \nabla \vec u^T),
/// $$
/// with $\lambda = K - \frac{2}{3} G$. In two dimensions this is the in-plane block of the
/// plane strain response.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearIsotropic {
    pub density: f64,
    pub bulk_modulus: f64,
    pub shear_modulus: f64,
}

impl<const D: usize> SolidMaterial<D> for LinearIsotropic {
    type State = ();

    fn initial_state(&self) -> Self::State {}

    fn density(&self) -> f64 {
        self.density
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn stress<T: Real>(&self, _state: &mut (), du_dx: &SMatrix<T, D, D>) -> SMatrix<T, D, D> {
        let (lambda, mu) = lame::<T>(self.bulk_modulus, self.shear_modulus);
        let strain = du_dx.symmetric_part();
        SMatrix::identity() * (lambda * strain.trace()) + strain * (2.0 * mu)
    }
}

/// The compressible Neo-Hookean model,
/// $$
/// \vec \tau = \lambda \ln \det(\vec I + \nabla \vec u) \vec I
///     + G (\nabla \vec u \nabla \vec u^T + \nabla \vec u^T + \nabla \vec u),
/// $$
/// where the last term is $\vec B - \vec I$ expressed without cancellation.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeoHookean {
    pub density: f64,
    pub bulk_modulus: f64,
    pub shear_modulus: f64,
}

impl<const D: usize> SolidMaterial<D> for NeoHookean
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    type State = ();

    fn initial_state(&self) -> Self::State {}

    fn density(&self) -> f64 {
        self.density
    }

    fn stress<T: Real>(&self, _state: &mut (), du_dx: &SMatrix<T, D, D>) -> SMatrix<T, D, D> {
        let (lambda, mu) = lame::<T>(self.bulk_modulus, self.shear_modulus);
        let identity = SMatrix::<T, D, D>::identity();
        let b_minus_i = du_dx * du_dx.transpose() + du_dx.transpose() + du_dx;
        let j = (identity + du_dx).determinant();
        identity * (lambda * j.ln()) + b_minus_i * mu
    }
}

/// History of the [`J2`] model.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct J2State {
    /// Back stress.
    pub beta: Matrix3<f64>,
    pub plastic_strain: Matrix3<f64>,
    pub accumulated_plastic_strain: f64,
}

impl Default for J2State {
    fn default() -> Self {
        Self {
            beta: Matrix3::zeros(),
            plastic_strain: Matrix3::zeros(),
            accumulated_plastic_strain: 0.0,
        }
    }
}

/// Small strain J2 plasticity with linear isotropic and kinematic hardening.
///
/// The stress is computed by an elastic predictor followed by a radial return onto the yield
/// surface $q = \sigma_y + H_i \bar\epsilon_p$. Only defined in three dimensions.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct J2 {
    pub young: f64,
    pub poisson: f64,
    pub isotropic_hardening: f64,
    pub kinematic_hardening: f64,
    pub yield_stress: f64,
    pub density: f64,
}

impl J2 {
    pub fn bulk_shear(&self) -> BulkShear<f64> {
        BulkShear::from(YoungPoisson {
            young: self.young,
            poisson: self.poisson,
        })
    }
}

impl SolidMaterial<3> for J2 {
    type State = J2State;

    fn initial_state(&self) -> Self::State {
        J2State::default()
    }

    fn density(&self) -> f64 {
        self.density
    }

    fn stress<T: Real>(&self, state: &mut J2State, du_dx: &SMatrix<T, 3, 3>) -> SMatrix<T, 3, 3> {
        let BulkShear { bulk, shear } = self.bulk_shear();
        let (k, g) = (T::from_value(bulk), T::from_value(shear));
        let (hi, hk) = (self.isotropic_hardening, self.kinematic_hardening);
        let identity = Matrix3::<T>::identity();

        // Elastic predictor
        let elastic_strain = du_dx.symmetric_part() - state.plastic_strain.map(T::from_value);
        let p = k * elastic_strain.trace();
        let deviator = elastic_strain - identity * (elastic_strain.trace() / T::from_value(3.0));
        let mut s = deviator * (T::from_value(2.0) * g);
        let mut eta = s - state.beta.map(T::from_value);
        let q = T::from_value(1.5f64.sqrt()) * eta.norm();
        let phi = q - T::from_value(self.yield_stress + hi * state.accumulated_plastic_strain);

        // Radial return
        if phi.value() > 0.0 {
            let increment = phi / (T::from_value(3.0) * g + T::from_value(hk + hi));
            eta /= eta.norm();
            s -= eta * (T::from_value(6.0f64.sqrt()) * g * increment);

            let increment = increment.value();
            let direction = eta.map(|v| v.value());
            state.accumulated_plastic_strain += increment;
            state.plastic_strain += direction * (1.5f64.sqrt() * increment);
            state.beta += direction * ((2.0f64 / 3.0).sqrt() * hk * increment);
        }

        s + identity * p
    }
}
