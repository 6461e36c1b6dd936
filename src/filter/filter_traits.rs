//! Traits representing the filtering algorithms

use crate::error::Result;
use cauchy::Scalar;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Data, Ix1};
use ndarray_linalg::Lapack;
use num_traits::Float;

/// Real floating point numbers the Gaussian filters can factorize with LAPACK.
///
/// Automatically implemented for every `T: Scalar + Lapack + Float`, in practice `f32` and `f64`.
pub trait RealScalar: Scalar + Lapack + Float {}

impl<T: Scalar + Lapack + Float> RealScalar for T {}

/// Filtering algorithm trait
///
/// This trait indicates that implementor is a recursive estimator operating on numbers of type
/// `T`. The estimator owns its belief about the hidden state and mutates it through the two
/// steps every filtering algorithm is split into:
/// * `predict` advances the belief by one time step using the process model, no measurement is
/// required
/// * `update` incorporates a measurement vector into the belief
///
/// Both steps are fallible. A returned error means the belief was left exactly as it was before
/// the call.
pub trait Filter<T> {
    /// Prediction step of the filtering algorithm.
    fn predict(&mut self) -> Result<()>;

    /// Update step of the filtering algorithm.
    ///
    /// The measurement has to match the measurement dimension the filter was configured with,
    /// otherwise `FilterError::DimensionMismatch` is returned.
    fn update<S: Data<Elem = T>>(&mut self, measurement: &ArrayBase<S, Ix1>) -> Result<()>;
}

/// Filter whose belief is a Gaussian, represented by a mean and a covariance matrix.
///
/// The accessors return read-only views of the current belief. They are meaningful after the
/// filter has been explicitly initialized or has completed at least one `predict`.
pub trait GaussianFilter<T>: Filter<T> {
    /// Current state estimate
    fn state(&self) -> ArrayView1<'_, T>;

    /// Current state covariance
    fn covariance(&self) -> ArrayView2<'_, T>;
}

/// Nonlinear model mapping a state to a state or measurement vector.
pub type VectorFunction<T> = Box<dyn Fn(&ArrayView1<T>) -> Array1<T> + Send + Sync>;

/// Jacobian of a [`VectorFunction`], evaluated at a state.
pub type JacobianFunction<T> = Box<dyn Fn(&ArrayView1<T>) -> Array2<T> + Send + Sync>;
