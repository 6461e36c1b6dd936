//! Here the first-order series approximation to the optimal filter is considered, known as the
//! extended Kalman filter.

use crate::error::{FilterError, ModelKind, Result};
use crate::filter::filter_traits::{
    Filter, GaussianFilter, JacobianFunction, RealScalar, VectorFunction,
};
use crate::filter::kalman_common::{
    check_finite, check_len, check_shape, check_square, linearized_update, propagate_covariance,
};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Data, Ix1, Ix2};

/// Point at which the process Jacobian is evaluated during `predict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linearization {
    /// Evaluate `F` at the propagated mean `f(x)`.
    Propagated,
    /// Evaluate `F` at the mean before propagation, as in the textbook formulation.
    Prior,
}

impl Default for Linearization {
    fn default() -> Self {
        Linearization::Propagated
    }
}

struct NonlinearModel<T> {
    function: VectorFunction<T>,
    jacobian: JacobianFunction<T>,
}

/// Extended Kalman filter with additive Gaussian noise
///
/// This struct represents the extended Kalman filter where transition function is parametrized only
/// by previous state, while the measurement function is solely parametrized by predicted state.
/// Further it is assumed that transition and measurement noise has zero-mean and is Gaussian.
///
/// Both models have to be supplied through `set_process_model` and `set_measurement_model`
/// before the filter is driven; calling `predict` or `update` without the corresponding model
/// returns `FilterError::MissingModel`.
///
/// ```
/// use ndarray::{arr1, arr2, Array2};
/// use rusty_estimation::{ExtendedKalmanFilter, Filter, GaussianFilter};
///
/// let dt = 1.0;
/// let mut ekf = ExtendedKalmanFilter::new(
///     &arr1(&[0.0, 1.0]),
///     &Array2::<f64>::eye(2),
///     &(Array2::<f64>::eye(2) * 0.001),
///     &arr2(&[[0.1]]),
/// ).unwrap();
/// ekf.set_process_model(
///     move |x| arr1(&[x[0] + x[1] * dt, x[1]]),
///     move |_| arr2(&[[1.0, dt], [0.0, 1.0]]),
/// );
/// ekf.set_measurement_model(
///     |x| arr1(&[(x[0] * x[0] + 1.0).sqrt()]),
///     |x| arr2(&[[x[0] / (x[0] * x[0] + 1.0).sqrt(), 0.0]]),
/// );
/// ekf.predict().unwrap();
/// assert!((ekf.state()[0] - 1.0).abs() < 1e-6);
/// ekf.update(&arr1(&[1.5])).unwrap();
/// ```
pub struct ExtendedKalmanFilter<T: RealScalar> {
    process_model: Option<NonlinearModel<T>>,
    measurement_model: Option<NonlinearModel<T>>,
    transition_covariance: Array2<T>,
    measurement_covariance: Array2<T>,
    state: Array1<T>,
    covariance: Array2<T>,
    linearization: Linearization,
}

impl<T: RealScalar> ExtendedKalmanFilter<T> {
    /// Creates a new extended Kalman filter from the initial belief and the noise covariances.
    ///
    /// The state dimension is taken from the initial state, the measurement dimension from the
    /// measurement covariance. Initial covariance and transition covariance have to be square
    /// matrices of state dimension.
    pub fn new(
        initial_state: &ArrayBase<impl Data<Elem = T>, Ix1>,
        initial_covariance: &ArrayBase<impl Data<Elem = T>, Ix2>,
        transition_covariance: &ArrayBase<impl Data<Elem = T>, Ix2>,
        measurement_covariance: &ArrayBase<impl Data<Elem = T>, Ix2>,
    ) -> Result<Self> {
        let state_dim = initial_state.len();
        check_finite("initial state", initial_state)?;
        check_shape("initial covariance", initial_covariance, (state_dim, state_dim))?;
        check_shape("transition covariance", transition_covariance, (state_dim, state_dim))?;
        check_square("measurement covariance", measurement_covariance)?;

        Ok(ExtendedKalmanFilter {
            process_model: None,
            measurement_model: None,
            transition_covariance: transition_covariance.to_owned(),
            measurement_covariance: measurement_covariance.to_owned(),
            state: initial_state.to_owned(),
            covariance: initial_covariance.to_owned(),
            linearization: Linearization::default(),
        })
    }

    /// Selects where the process Jacobian is evaluated.
    pub fn with_linearization(mut self, linearization: Linearization) -> Self {
        self.linearization = linearization;
        self
    }

    pub fn linearization(&self) -> Linearization {
        self.linearization
    }

    /// Sets the process function `f: Rⁿ → Rⁿ` and its Jacobian `F: Rⁿ → Rⁿˣⁿ`.
    pub fn set_process_model<F, J>(&mut self, function: F, jacobian: J)
    where
        F: Fn(&ArrayView1<T>) -> Array1<T> + Send + Sync + 'static,
        J: Fn(&ArrayView1<T>) -> Array2<T> + Send + Sync + 'static,
    {
        self.process_model = Some(NonlinearModel {
            function: Box::new(function),
            jacobian: Box::new(jacobian),
        });
    }

    /// Sets the measurement function `h: Rⁿ → Rᵐ` and its Jacobian `H: Rⁿ → Rᵐˣⁿ`.
    pub fn set_measurement_model<F, J>(&mut self, function: F, jacobian: J)
    where
        F: Fn(&ArrayView1<T>) -> Array1<T> + Send + Sync + 'static,
        J: Fn(&ArrayView1<T>) -> Array2<T> + Send + Sync + 'static,
    {
        self.measurement_model = Some(NonlinearModel {
            function: Box::new(function),
            jacobian: Box::new(jacobian),
        });
    }

    /// Replaces the process and measurement noise covariances. Dimensions may not change.
    pub fn set_noise(
        &mut self,
        transition_covariance: &ArrayBase<impl Data<Elem = T>, Ix2>,
        measurement_covariance: &ArrayBase<impl Data<Elem = T>, Ix2>,
    ) -> Result<()> {
        let (n, m) = (self.state_dim(), self.measurement_dim());
        check_shape("transition covariance", transition_covariance, (n, n))?;
        check_shape("measurement covariance", measurement_covariance, (m, m))?;
        self.transition_covariance = transition_covariance.to_owned();
        self.measurement_covariance = measurement_covariance.to_owned();
        Ok(())
    }

    pub fn state_dim(&self) -> usize {
        self.state.len()
    }

    pub fn measurement_dim(&self) -> usize {
        self.measurement_covariance.nrows()
    }
}

impl<T: RealScalar> Filter<T> for ExtendedKalmanFilter<T> {
    /// `x ← f(x)`, `P ← F·P·Fᵀ + Q` with `F` evaluated according to the configured
    /// [`Linearization`].
    fn predict(&mut self) -> Result<()> {
        let model = self
            .process_model
            .as_ref()
            .ok_or(FilterError::MissingModel(ModelKind::Process))?;
        let n = self.state_dim();

        let predicted_state = (model.function)(&self.state.view());
        check_len("process model output", &predicted_state, n)?;
        check_finite("predicted state", &predicted_state)?;

        let jacobian = match self.linearization {
            Linearization::Propagated => (model.jacobian)(&predicted_state.view()),
            Linearization::Prior => (model.jacobian)(&self.state.view()),
        };
        check_shape("process jacobian", &jacobian, (n, n))?;

        let predicted_covariance =
            propagate_covariance(&jacobian, &self.covariance, &self.transition_covariance)?;
        self.state = predicted_state;
        self.covariance = predicted_covariance;
        Ok(())
    }

    /// `y = z − h(x)`, followed by the Kalman correction linearized with `H(x)`.
    fn update<S: Data<Elem = T>>(&mut self, measurement: &ArrayBase<S, Ix1>) -> Result<()> {
        let model = self
            .measurement_model
            .as_ref()
            .ok_or(FilterError::MissingModel(ModelKind::Measurement))?;
        let (n, m) = (self.state_dim(), self.measurement_dim());
        check_len("measurement", measurement, m)?;
        check_finite("measurement", measurement)?;

        let expected_measurement = (model.function)(&self.state.view());
        check_len("measurement model output", &expected_measurement, m)?;
        let jacobian = (model.jacobian)(&self.state.view());
        check_shape("measurement jacobian", &jacobian, (m, n))?;

        let innovation = measurement - &expected_measurement;
        let (updated_state, updated_covariance) = linearized_update(
            &self.state,
            &self.covariance,
            &jacobian,
            &self.measurement_covariance,
            &innovation,
        )?;
        self.state = updated_state;
        self.covariance = updated_covariance;
        Ok(())
    }
}

impl<T: RealScalar> GaussianFilter<T> for ExtendedKalmanFilter<T> {
    fn state(&self) -> ArrayView1<'_, T> {
        self.state.view()
    }

    fn covariance(&self) -> ArrayView2<'_, T> {
        self.covariance.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::kalman::linear::KalmanFilter;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    const DT: f64 = 1.0;

    fn constant_velocity_ekf() -> ExtendedKalmanFilter<f64> {
        let mut ekf = ExtendedKalmanFilter::new(
            &arr1(&[0.0, 1.0]),
            &Array2::eye(2),
            &arr2(&[[0.001, 0.0], [0.0, 0.001]]),
            &arr2(&[[0.1]]),
        )
        .unwrap();
        ekf.set_process_model(
            |x| arr1(&[x[0] + x[1] * DT, x[1]]),
            |_| arr2(&[[1.0, DT], [0.0, 1.0]]),
        );
        ekf
    }

    #[test]
    fn predict_matches_constant_velocity_motion() {
        let mut ekf = constant_velocity_ekf();
        ekf.set_measurement_model(
            |x| arr1(&[(x[0] * x[0] + 1.0).sqrt()]),
            |x| arr2(&[[x[0] / (x[0] * x[0] + 1.0).sqrt(), 0.0]]),
        );
        ekf.predict().unwrap();
        assert_abs_diff_eq!(ekf.state(), arr1(&[1.0, 1.0]), epsilon = 1e-6);
    }

    #[test]
    fn agrees_with_linear_filter_for_linear_models() {
        let mut ekf = constant_velocity_ekf();
        ekf.set_measurement_model(|x| arr1(&[x[0]]), |_| arr2(&[[1.0, 0.0]]));

        let mut kf = KalmanFilter::new(
            DT,
            &arr2(&[[1.0, DT], [0.0, 1.0]]),
            &arr2(&[[1.0, 0.0]]),
            &arr2(&[[0.001, 0.0], [0.0, 0.001]]),
            &arr2(&[[0.1]]),
            &Array2::eye(2),
        )
        .unwrap();
        kf.init(&arr1(&[0.0, 1.0])).unwrap();

        for z in &[1.2, 2.1, 3.5, 4.3, 5.8] {
            ekf.predict().unwrap();
            kf.predict().unwrap();
            assert_abs_diff_eq!(ekf.state(), kf.state(), epsilon = 1e-9);
            let measurement = arr1(&[*z]);
            ekf.update(&measurement).unwrap();
            kf.update(&measurement).unwrap();
            assert_abs_diff_eq!(ekf.state(), kf.state(), epsilon = 1e-9);
            assert_abs_diff_eq!(ekf.covariance(), kf.covariance(), epsilon = 1e-9);
        }
    }

    #[test]
    fn missing_models_are_reported_without_touching_the_belief() {
        let mut ekf = ExtendedKalmanFilter::new(
            &arr1(&[0.0, 1.0]),
            &Array2::<f64>::eye(2),
            &Array2::<f64>::eye(2),
            &arr2(&[[0.1]]),
        )
        .unwrap();
        assert!(matches!(
            ekf.predict(),
            Err(FilterError::MissingModel(ModelKind::Process))
        ));
        assert!(matches!(
            ekf.update(&arr1(&[1.0])),
            Err(FilterError::MissingModel(ModelKind::Measurement))
        ));
        assert_abs_diff_eq!(ekf.state(), arr1(&[0.0, 1.0]), epsilon = 0.0);
    }

    #[test]
    fn linearization_point_is_configurable() {
        // f(x) = x², F(x) = 2x, starting at x = 2 with unit variance and no process noise
        let build = |linearization: Linearization| {
            let mut ekf = ExtendedKalmanFilter::<f64>::new(
                &arr1(&[2.0]),
                &arr2(&[[1.0]]),
                &arr2(&[[0.0]]),
                &arr2(&[[1.0]]),
            )
            .unwrap()
            .with_linearization(linearization);
            ekf.set_process_model(|x| x.mapv(|v| v * v), |x| arr2(&[[2.0 * x[0]]]));
            ekf
        };

        let mut propagated = build(Linearization::Propagated);
        propagated.predict().unwrap();
        assert_abs_diff_eq!(propagated.state()[0], 4.0);
        assert_abs_diff_eq!(propagated.covariance()[[0, 0]], 64.0, epsilon = 1e-12);

        let mut prior = build(Linearization::Prior);
        prior.predict().unwrap();
        assert_abs_diff_eq!(prior.state()[0], 4.0);
        assert_abs_diff_eq!(prior.covariance()[[0, 0]], 16.0, epsilon = 1e-12);
    }

    #[test]
    fn nonlinear_measurement_reduces_uncertainty() {
        let mut ekf = constant_velocity_ekf();
        ekf.set_measurement_model(
            |x| arr1(&[(x[0] * x[0] + 1.0).sqrt()]),
            |x| arr2(&[[x[0] / (x[0] * x[0] + 1.0).sqrt(), 0.0]]),
        );
        ekf.predict().unwrap();
        let prior_variance = ekf.covariance()[[0, 0]];
        ekf.update(&arr1(&[2.0_f64.sqrt() + 0.1])).unwrap();
        assert!(ekf.covariance()[[0, 0]] < prior_variance);
        assert!(ekf.state()[0] > 1.0);
    }

    #[test]
    fn model_output_of_wrong_dimension_is_reported() {
        let mut ekf = constant_velocity_ekf();
        ekf.set_measurement_model(|x| arr1(&[x[0], x[1]]), |_| arr2(&[[1.0, 0.0]]));
        assert!(matches!(
            ekf.update(&arr1(&[1.0])),
            Err(FilterError::DimensionMismatch { what: "measurement model output", .. })
        ));

        ekf.set_process_model(|x| arr1(&[x[0]]), |_| Array2::eye(2));
        assert!(matches!(
            ekf.predict(),
            Err(FilterError::DimensionMismatch { what: "process model output", .. })
        ));
    }

    #[test]
    fn construction_validates_shapes() {
        let x0 = arr1(&[0.0, 1.0]);
        let eye2 = Array2::<f64>::eye(2);
        assert!(ExtendedKalmanFilter::new(&x0, &Array2::eye(3), &eye2, &eye2).is_err());
        assert!(ExtendedKalmanFilter::new(&x0, &eye2, &Array2::eye(3), &eye2).is_err());
        assert!(ExtendedKalmanFilter::new(&x0, &eye2, &eye2, &Array2::ones([1, 2])).is_err());
        let ekf = ExtendedKalmanFilter::new(&x0, &eye2, &eye2, &Array2::eye(3)).unwrap();
        assert_eq!(ekf.measurement_dim(), 3);
        assert_eq!(ekf.linearization(), Linearization::Propagated);
    }
}
