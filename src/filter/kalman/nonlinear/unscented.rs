//! Unscented Kalman filter. Instead of linearizing the models, the belief is represented by a
//! deterministic set of `2n + 1` sigma points which are propagated through the nonlinear
//! functions and recombined with fixed weights.

use crate::error::{FilterError, ModelKind, Result};
use crate::filter::filter_traits::{Filter, GaussianFilter, VectorFunction};
use crate::filter::kalman_common::{
    check_finite, check_len, check_shape, invert_innovation_covariance, symmetrize,
};
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix1, Ix2};
use ndarray_linalg::{Cholesky, UPLO};

/// Scaling parameters of the unscented transform.
///
/// * `alpha` controls the spread of the sigma points around the mean
/// * `beta` incorporates prior knowledge of the distribution, `2` is optimal for Gaussians
/// * `kappa` is a secondary scaling parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnscentedParameters {
    pub alpha: f64,
    pub beta: f64,
    pub kappa: f64,
}

impl Default for UnscentedParameters {
    fn default() -> Self {
        UnscentedParameters {
            alpha: 1e-3,
            beta: 2.0,
            kappa: 0.0,
        }
    }
}

impl UnscentedParameters {
    /// `λ = α²·(n + κ) − n`
    pub fn lambda(&self, state_dim: usize) -> f64 {
        let n = state_dim as f64;
        self.alpha * self.alpha * (n + self.kappa) - n
    }

    /// Mean and covariance weights of the `2n + 1` sigma points.
    ///
    /// The first weight belongs to the mean itself: `λ/(n+λ)` for the mean and
    /// `λ/(n+λ) + (1 − α² + β)` for the covariance. All remaining weights are `1/(2(n+λ))`.
    pub fn weights(&self, state_dim: usize) -> (Array1<f64>, Array1<f64>) {
        let lambda = self.lambda(state_dim);
        let denominator = state_dim as f64 + lambda;
        let point_count = 2 * state_dim + 1;

        let mut mean_weights = Array1::from_elem(point_count, 1.0 / (2.0 * denominator));
        let mut covariance_weights = mean_weights.clone();
        mean_weights[0] = lambda / denominator;
        covariance_weights[0] = lambda / denominator + (1.0 - self.alpha * self.alpha + self.beta);
        (mean_weights, covariance_weights)
    }
}

struct UnscentedModel {
    function: VectorFunction<f64>,
    noise: Array2<f64>,
}

/// Unscented Kalman filter with additive Gaussian noise
///
/// The filter is a two-phase protocol: `predict` generates the sigma points the following
/// `update` consumes. Calling `update` without a successful `predict` since the last update
/// returns `FilterError::MissingSigmaPoints`.
///
/// The belief starts at zero mean and identity covariance; use `initialize` to set it.
///
/// ```
/// use ndarray::{arr1, arr2, Array2};
/// use rusty_estimation::{Filter, GaussianFilter, UnscentedKalmanFilter};
///
/// let mut ukf = UnscentedKalmanFilter::new(2, 1).unwrap();
/// ukf.initialize(&arr1(&[0.0, 1.0]), &Array2::eye(2)).unwrap();
/// let process_noise = Array2::<f64>::eye(2) * 0.001;
/// ukf.set_process_model(|x| arr1(&[x[0] + x[1], x[1]]), &process_noise).unwrap();
/// ukf.set_measurement_model(|x| arr1(&[(x[0] * x[0] + 1.0).sqrt()]), &arr2(&[[0.1]])).unwrap();
/// ukf.predict().unwrap();
/// assert!((ukf.state()[0] - 1.0).abs() < 1e-6);
/// ukf.update(&arr1(&[1.5])).unwrap();
/// ```
pub struct UnscentedKalmanFilter {
    state_dim: usize,
    measurement_dim: usize,
    parameters: UnscentedParameters,
    lambda: f64,
    mean_weights: Array1<f64>,
    covariance_weights: Array1<f64>,
    state: Array1<f64>,
    covariance: Array2<f64>,
    sigma_points: Option<Array2<f64>>,
    process_model: Option<UnscentedModel>,
    measurement_model: Option<UnscentedModel>,
}

impl UnscentedKalmanFilter {
    /// Creates a filter for `state_dim`-dimensional states and `measurement_dim`-dimensional
    /// measurements with the default parameters.
    pub fn new(state_dim: usize, measurement_dim: usize) -> Result<Self> {
        Self::with_parameters(state_dim, measurement_dim, UnscentedParameters::default())
    }

    pub fn with_parameters(
        state_dim: usize,
        measurement_dim: usize,
        parameters: UnscentedParameters,
    ) -> Result<Self> {
        if state_dim == 0 || measurement_dim == 0 {
            return Err(FilterError::InvalidParameter(
                "state and measurement dimensions must be positive".to_string(),
            ));
        }
        let lambda = parameters.lambda(state_dim);
        let spread = state_dim as f64 + lambda;
        if !(spread > 0.0) || !spread.is_finite() {
            return Err(FilterError::InvalidParameter(format!(
                "n + lambda must be positive, got {}",
                spread
            )));
        }
        let (mean_weights, covariance_weights) = parameters.weights(state_dim);

        Ok(UnscentedKalmanFilter {
            state_dim,
            measurement_dim,
            parameters,
            lambda,
            mean_weights,
            covariance_weights,
            state: Array1::zeros(state_dim),
            covariance: Array2::eye(state_dim),
            sigma_points: None,
            process_model: None,
            measurement_model: None,
        })
    }

    /// Sets the belief. Sigma points of an earlier predict are discarded.
    pub fn initialize(
        &mut self,
        initial_state: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        initial_covariance: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<()> {
        let n = self.state_dim;
        check_len("initial state", initial_state, n)?;
        check_shape("initial covariance", initial_covariance, (n, n))?;
        check_finite("initial state", initial_state)?;
        check_finite("initial covariance", initial_covariance)?;
        self.state = initial_state.to_owned();
        self.covariance = initial_covariance.to_owned();
        self.sigma_points = None;
        Ok(())
    }

    /// Sets the process function `f: Rⁿ → Rⁿ` and the process noise covariance `Q`.
    pub fn set_process_model<F>(
        &mut self,
        function: F,
        transition_covariance: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<()>
    where
        F: Fn(&ArrayView1<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        let n = self.state_dim;
        check_shape("transition covariance", transition_covariance, (n, n))?;
        self.process_model = Some(UnscentedModel {
            function: Box::new(function),
            noise: transition_covariance.to_owned(),
        });
        Ok(())
    }

    /// Sets the measurement function `h: Rⁿ → Rᵐ` and the measurement noise covariance `R`.
    pub fn set_measurement_model<F>(
        &mut self,
        function: F,
        measurement_covariance: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<()>
    where
        F: Fn(&ArrayView1<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        let m = self.measurement_dim;
        check_shape("measurement covariance", measurement_covariance, (m, m))?;
        self.measurement_model = Some(UnscentedModel {
            function: Box::new(function),
            noise: measurement_covariance.to_owned(),
        });
        Ok(())
    }

    pub fn parameters(&self) -> UnscentedParameters {
        self.parameters
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn mean_weights(&self) -> ArrayView1<'_, f64> {
        self.mean_weights.view()
    }

    pub fn covariance_weights(&self) -> ArrayView1<'_, f64> {
        self.covariance_weights.view()
    }

    /// Sigma points awaiting the next `update`, one point per row.
    pub fn sigma_points(&self) -> Option<ArrayView2<'_, f64>> {
        self.sigma_points.as_ref().map(|points| points.view())
    }

    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub fn measurement_dim(&self) -> usize {
        self.measurement_dim
    }

    /// `{x, x + √(n+λ)·Lᵢ, x − √(n+λ)·Lᵢ}` for every column `Lᵢ` of the lower Cholesky
    /// factor.
    fn generate_sigma_points(
        &self,
        state: &Array1<f64>,
        covariance: &Array2<f64>,
    ) -> Result<Array2<f64>> {
        let lower = covariance.cholesky(UPLO::Lower).map_err(|err| {
            debug!("cholesky factorization of state covariance failed: {}", err);
            FilterError::NotPositiveDefinite
        })?;
        let scaling = (self.state_dim as f64 + self.lambda).sqrt();

        let mut points = Array2::zeros((2 * self.state_dim + 1, self.state_dim));
        points.row_mut(0).assign(state);
        for (i, column) in lower.columns().into_iter().enumerate() {
            let offset = &column * scaling;
            points.row_mut(2 * i + 1).assign(&(state + &offset));
            points.row_mut(2 * i + 2).assign(&(state - &offset));
        }
        check_finite("sigma points", &points)?;
        Ok(points)
    }

    /// `Σ Wcᵢ · lhsᵢ · rhsᵢᵀ` over the rows of both deviation matrices.
    fn weighted_outer_product(&self, lhs: &Array2<f64>, rhs: &Array2<f64>) -> Array2<f64> {
        let weighted = lhs * &self.covariance_weights.view().insert_axis(Axis(1));
        weighted.t().dot(rhs)
    }
}

/// Maps every row of `points` through `function`.
fn transform_points(
    points: &Array2<f64>,
    function: &dyn Fn(&ArrayView1<f64>) -> Array1<f64>,
    output_dim: usize,
    what: &'static str,
) -> Result<Array2<f64>> {
    let mut transformed = Array2::zeros((points.nrows(), output_dim));
    for (point, mut row) in points.outer_iter().zip(transformed.outer_iter_mut()) {
        let image = function(&point);
        check_len(what, &image, output_dim)?;
        row.assign(&image);
    }
    check_finite(what, &transformed)?;
    Ok(transformed)
}

impl Filter<f64> for UnscentedKalmanFilter {
    /// Propagates the sigma points of the current belief through `f` and recombines them into
    /// the predicted mean and covariance (plus `Q`). The sigma points of the predicted belief are
    /// then stored for the paired `update`. If the predicted covariance is only semi-definite the
    /// propagated points are stored instead.
    fn predict(&mut self) -> Result<()> {
        let model = self
            .process_model
            .as_ref()
            .ok_or(FilterError::MissingModel(ModelKind::Process))?;

        let points = self.generate_sigma_points(&self.state, &self.covariance)?;
        let propagated = transform_points(
            &points,
            &*model.function,
            self.state_dim,
            "process model output",
        )?;

        let predicted_state = self.mean_weights.dot(&propagated);
        let deviations = &propagated - &predicted_state;
        let predicted_covariance =
            symmetrize(&(self.weighted_outer_product(&deviations, &deviations) + &model.noise));
        // a singular predicted covariance has no Cholesky factor, the propagated points still
        // carry the predicted spread
        let next_points =
            match self.generate_sigma_points(&predicted_state, &predicted_covariance) {
                Ok(next_points) => next_points,
                Err(FilterError::NotPositiveDefinite) => {
                    debug!("predicted covariance is singular, keeping propagated sigma points");
                    propagated
                }
                Err(err) => return Err(err),
            };

        self.state = predicted_state;
        self.covariance = predicted_covariance;
        self.sigma_points = Some(next_points);
        Ok(())
    }

    /// Propagates the stored sigma points through `h`, then corrects the belief with
    /// `K = Tc·S⁻¹`, `x ← x + K·(z − ẑ)`, `P ← P − K·S·Kᵀ`.
    fn update<S: Data<Elem = f64>>(&mut self, measurement: &ArrayBase<S, Ix1>) -> Result<()> {
        let model = self
            .measurement_model
            .as_ref()
            .ok_or(FilterError::MissingModel(ModelKind::Measurement))?;
        check_len("measurement", measurement, self.measurement_dim)?;
        check_finite("measurement", measurement)?;
        let points = self
            .sigma_points
            .as_ref()
            .ok_or(FilterError::MissingSigmaPoints)?;

        let measurement_points = transform_points(
            points,
            &*model.function,
            self.measurement_dim,
            "measurement model output",
        )?;
        let expected_measurement = self.mean_weights.dot(&measurement_points);
        let measurement_deviations = &measurement_points - &expected_measurement;
        let state_deviations = points - &self.state;

        let innovation_covariance = symmetrize(
            &(self.weighted_outer_product(&measurement_deviations, &measurement_deviations)
                + &model.noise),
        );
        let cross_covariance =
            self.weighted_outer_product(&state_deviations, &measurement_deviations);
        let innovation_covariance_inv = invert_innovation_covariance(&innovation_covariance)?;
        let kalman_gain = cross_covariance.dot(&innovation_covariance_inv);

        let innovation = measurement - &expected_measurement;
        let updated_state = &self.state + &kalman_gain.dot(&innovation);
        let correction = kalman_gain.dot(&innovation_covariance).dot(&kalman_gain.t());
        let updated_covariance = symmetrize(&(&self.covariance - &correction));
        check_finite("updated state", &updated_state)?;
        check_finite("updated covariance", &updated_covariance)?;

        self.state = updated_state;
        self.covariance = updated_covariance;
        self.sigma_points = None;
        Ok(())
    }
}

impl GaussianFilter<f64> for UnscentedKalmanFilter {
    fn state(&self) -> ArrayView1<'_, f64> {
        self.state.view()
    }

    fn covariance(&self) -> ArrayView2<'_, f64> {
        self.covariance.view()
    }
}
