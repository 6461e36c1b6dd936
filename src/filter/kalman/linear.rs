//! This module contains the implementation of the linear Kalman filter, the exact closed-form
//! recursive estimator for linear-Gaussian systems.
use crate::error::{FilterError, Result};
use crate::filter::filter_traits::{Filter, GaussianFilter, RealScalar};
use crate::filter::kalman_common::{
    check_finite, check_len, check_shape, check_square, linearized_update, propagate_covariance,
};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Data, Ix1, Ix2};

/// Basic linear Kalman filtering algorithm
///
/// This type encapsulates basic linear Kalman filtering algorithm for the system
///
/// ```text
/// x(k+1) = A·x(k) + w,  w ~ N(0, Q)
/// y(k)   = C·x(k) + v,  v ~ N(0, R)
/// ```
///
/// As some assumption have to hold with respect to dimensions of arrays, please use the associated
/// function `KalmanFilter::new` to create an instance. The filter starts uninitialized, `init`
/// sets the initial mean, after which `predict` and `update` may be called in any order.
///
/// Type parameter `T: RealScalar` is used to indicate that Kalman filter can contain any
/// matrices of real floating point numbers LAPACK can factorize.
///
/// ```
/// use ndarray::{arr1, arr2, Array2};
/// use rusty_estimation::{Filter, GaussianFilter, KalmanFilter};
///
/// let mut kf = KalmanFilter::new(
///     1.0,
///     &arr2(&[[1.0, 1.0], [0.0, 1.0]]),
///     &arr2(&[[1.0, 0.0]]),
///     &(Array2::<f64>::eye(2) * 0.001),
///     &arr2(&[[0.1]]),
///     &Array2::<f64>::eye(2),
/// ).unwrap();
/// kf.init(&arr1(&[0.0, 1.0])).unwrap();
/// kf.predict().unwrap();
/// assert!((kf.state()[0] - 1.0).abs() < 1e-6);
/// kf.update(&arr1(&[1.2])).unwrap();
/// ```
pub struct KalmanFilter<T: RealScalar> {
    dt: T,
    transition_matrix: Array2<T>,
    observation_matrix: Array2<T>,
    transition_covariance: Array2<T>,
    observation_covariance: Array2<T>,
    state: Array1<T>,
    covariance: Array2<T>,
    initialized: bool,
}

impl<T: RealScalar> KalmanFilter<T> {
    /// Creates new Kalman filter with given matrices
    ///
    /// This constructor expects following conditions to hold:
    /// * transition matrix, covariance matrices and initial covariance should be square
    /// * observation matrix has as many columns as the transition matrix, so that it can be
    /// used as left factor in multiplication with states
    /// * rows of the observation matrix and the dimension of observation covariance are equal
    ///
    /// If any of the conditions is not upheld, then the return value is the error variant,
    /// otherwise a well-formed, uninitialized Kalman filter is returned. The time step `dt` is
    /// recorded for the caller; the discretization is already contained in the transition matrix.
    pub fn new(
        dt: T,
        transition_matrix: &ArrayBase<impl Data<Elem = T>, Ix2>,
        observation_matrix: &ArrayBase<impl Data<Elem = T>, Ix2>,
        transition_covariance: &ArrayBase<impl Data<Elem = T>, Ix2>,
        observation_covariance: &ArrayBase<impl Data<Elem = T>, Ix2>,
        initial_covariance: &ArrayBase<impl Data<Elem = T>, Ix2>,
    ) -> Result<KalmanFilter<T>> {
        let (state_dim, _) = Self::check_dimension_compatibilities(
            transition_matrix,
            observation_matrix,
            transition_covariance,
            observation_covariance,
        )?;
        check_shape("initial covariance", initial_covariance, (state_dim, state_dim))?;

        Ok(KalmanFilter {
            dt,
            transition_matrix: transition_matrix.to_owned(),
            observation_matrix: observation_matrix.to_owned(),
            transition_covariance: transition_covariance.to_owned(),
            observation_covariance: observation_covariance.to_owned(),
            state: Array1::zeros(state_dim),
            covariance: initial_covariance.to_owned(),
            initialized: false,
        })
    }

    /// Returns `(state dimension, measurement dimension)` if the matrices fit together.
    fn check_dimension_compatibilities(
        transition_matrix: &ArrayBase<impl Data<Elem = T>, Ix2>,
        observation_matrix: &ArrayBase<impl Data<Elem = T>, Ix2>,
        transition_covariance: &ArrayBase<impl Data<Elem = T>, Ix2>,
        observation_covariance: &ArrayBase<impl Data<Elem = T>, Ix2>,
    ) -> Result<(usize, usize)> {
        let state_dim = check_square("transition matrix", transition_matrix)?;
        let measurement_dim = observation_matrix.nrows();
        check_shape("observation matrix", observation_matrix, (measurement_dim, state_dim))?;
        check_shape("transition covariance", transition_covariance, (state_dim, state_dim))?;
        check_shape(
            "observation covariance",
            observation_covariance,
            (measurement_dim, measurement_dim),
        )?;
        Ok((state_dim, measurement_dim))
    }

    /// Sets the initial mean and marks the filter as initialized.
    pub fn init(&mut self, initial_state: &ArrayBase<impl Data<Elem = T>, Ix1>) -> Result<()> {
        check_len("initial state", initial_state, self.state_dim())?;
        check_finite("initial state", initial_state)?;
        self.state = initial_state.to_owned();
        self.initialized = true;
        Ok(())
    }

    /// Replaces the transition and observation matrices. Dimensions may not change.
    pub fn set_system(
        &mut self,
        transition_matrix: &ArrayBase<impl Data<Elem = T>, Ix2>,
        observation_matrix: &ArrayBase<impl Data<Elem = T>, Ix2>,
    ) -> Result<()> {
        let (n, m) = (self.state_dim(), self.measurement_dim());
        check_shape("transition matrix", transition_matrix, (n, n))?;
        check_shape("observation matrix", observation_matrix, (m, n))?;
        self.transition_matrix = transition_matrix.to_owned();
        self.observation_matrix = observation_matrix.to_owned();
        Ok(())
    }

    /// Replaces the process and measurement noise covariances. Dimensions may not change.
    pub fn set_noise(
        &mut self,
        transition_covariance: &ArrayBase<impl Data<Elem = T>, Ix2>,
        observation_covariance: &ArrayBase<impl Data<Elem = T>, Ix2>,
    ) -> Result<()> {
        let (n, m) = (self.state_dim(), self.measurement_dim());
        check_shape("transition covariance", transition_covariance, (n, n))?;
        check_shape("observation covariance", observation_covariance, (m, m))?;
        self.transition_covariance = transition_covariance.to_owned();
        self.observation_covariance = observation_covariance.to_owned();
        Ok(())
    }

    /// Difference between `measurement` and the measurement predicted from the current state.
    pub fn innovation(
        &self,
        measurement: &ArrayBase<impl Data<Elem = T>, Ix1>,
    ) -> Result<Array1<T>> {
        if !self.initialized {
            return Err(FilterError::NotInitialized);
        }
        check_len("measurement", measurement, self.measurement_dim())?;
        check_finite("measurement", measurement)?;
        Ok(measurement - &self.observation_matrix.dot(&self.state))
    }

    pub fn dt(&self) -> T {
        self.dt
    }

    pub fn state_dim(&self) -> usize {
        self.transition_matrix.nrows()
    }

    pub fn measurement_dim(&self) -> usize {
        self.observation_matrix.nrows()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl<T: RealScalar> Filter<T> for KalmanFilter<T> {
    /// `x ← A·x`, `P ← A·P·Aᵀ + Q`
    fn predict(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(FilterError::NotInitialized);
        }
        let predicted_state = self.transition_matrix.dot(&self.state);
        check_finite("predicted state", &predicted_state)?;
        let predicted_covariance = propagate_covariance(
            &self.transition_matrix,
            &self.covariance,
            &self.transition_covariance,
        )?;
        self.state = predicted_state;
        self.covariance = predicted_covariance;
        Ok(())
    }

    fn update<S: Data<Elem = T>>(&mut self, measurement: &ArrayBase<S, Ix1>) -> Result<()> {
        let innovation = self.innovation(measurement)?;
        let (updated_state, updated_covariance) = linearized_update(
            &self.state,
            &self.covariance,
            &self.observation_matrix,
            &self.observation_covariance,
            &innovation,
        )?;
        self.state = updated_state;
        self.covariance = updated_covariance;
        Ok(())
    }
}

impl<T: RealScalar> GaussianFilter<T> for KalmanFilter<T> {
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
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    fn constant_velocity() -> KalmanFilter<f64> {
        let mut kf = KalmanFilter::new(
            1.0,
            &arr2(&[[1.0, 1.0], [0.0, 1.0]]),
            &arr2(&[[1.0, 0.0]]),
            &arr2(&[[0.001, 0.0], [0.0, 0.001]]),
            &arr2(&[[0.1]]),
            &Array2::eye(2),
        )
        .unwrap();
        kf.init(&arr1(&[0.0, 1.0])).unwrap();
        kf
    }

    #[test]
    fn transition_covariance_matrix_has_to_be_square() -> std::result::Result<(), String> {
        let kf = KalmanFilter::<f64>::new(
            1.0,
            &Array2::eye(8),
            &Array2::eye(8),
            &Array2::ones([8, 7]),
            &Array2::eye(8),
            &Array2::eye(8),
        );
        match kf {
            Err(_) => Ok(()),
            _ => Err(
                "Kalman filter can not accept non-square matrix as transition covariance matrix"
                    .to_string(),
            ),
        }
    }

    #[test]
    fn observation_covariance_matrix_has_to_be_square() -> std::result::Result<(), String> {
        let kf = KalmanFilter::<f64>::new(
            1.0,
            &Array2::eye(8),
            &Array2::eye(8),
            &Array2::eye(8),
            &Array2::ones([8, 7]),
            &Array2::eye(8),
        );
        match kf {
            Err(_) => Ok(()),
            _ => Err(
                "Kalman filter can not accept non-square matrix as observation covariance matrix"
                    .to_string(),
            ),
        }
    }

    #[test]
    fn transition_matrix_has_to_be_square() -> std::result::Result<(), String> {
        let kf = KalmanFilter::<f64>::new(
            1.0,
            &Array2::ones([7, 8]),
            &Array2::eye(8),
            &Array2::eye(8),
            &Array2::eye(8),
            &Array2::eye(8),
        );
        match kf {
            Err(_) => Ok(()),
            _ => Err(
                "Kalman filter can not accept non-square matrix as transition matrix".to_string(),
            ),
        }
    }

    #[test]
    fn outer_dimensions_of_transition_and_observation_matrix_have_to_match(
    ) -> std::result::Result<(), String> {
        let eye8 = &Array2::<f64>::eye(8);
        let eye7 = &Array2::<f64>::eye(7);
        let kf = KalmanFilter::new(1.0, eye8, eye7, eye8, eye8, eye8);
        match kf {
            Err(_) => Ok(()),
            _ => Err(
                "Outer dimensions of transition and observation matrix should have to be equal"
                    .to_string(),
            ),
        }
    }

    #[test]
    fn inner_dimensions_of_observation_matrix_and_observation_covariance_have_to_match(
    ) -> std::result::Result<(), String> {
        let eye8 = &Array2::<f64>::eye(8);
        let eye7 = &Array2::<f64>::eye(7);
        let kf = KalmanFilter::new(1.0, eye8, eye8, eye8, eye7, eye8);
        match kf {
            Err(_) => Ok(()),
            _ => Err("Inner dimensions of observation covariance matrix and observation matrix \
                      should have to be equal"
                .to_string()),
        }
    }

    #[test]
    fn initial_covariance_has_to_match_state_dimension() {
        let eye2 = &Array2::<f64>::eye(2);
        let kf = KalmanFilter::new(1.0, eye2, eye2, eye2, eye2, &Array2::<f64>::eye(3));
        assert!(matches!(kf, Err(FilterError::DimensionMismatch { .. })));
    }

    #[test]
    fn predict_moves_constant_velocity_state_by_one_step() {
        let mut kf = constant_velocity();
        kf.predict().unwrap();
        assert_abs_diff_eq!(kf.state(), arr1(&[1.0, 1.0]), epsilon = 1e-6);
    }

    #[test]
    fn predicted_covariance_is_a_p_at_plus_q_and_symmetric() {
        let mut kf = constant_velocity();
        kf.predict().unwrap();
        // A·I·Aᵀ + 0.001·I
        let expected = arr2(&[[2.001, 1.0], [1.0, 1.001]]);
        assert_abs_diff_eq!(kf.covariance(), expected.view(), epsilon = 1e-12);
        assert_abs_diff_eq!(kf.covariance(), kf.covariance().reversed_axes(), epsilon = 0.0);
    }

    #[test]
    fn predict_before_init_is_reported() {
        let mut kf = KalmanFilter::new(
            1.0,
            &Array2::<f64>::eye(2),
            &arr2(&[[1.0, 0.0]]),
            &Array2::<f64>::eye(2),
            &arr2(&[[1.0]]),
            &Array2::<f64>::eye(2),
        )
        .unwrap();
        assert!(!kf.is_initialized());
        assert!(matches!(kf.predict(), Err(FilterError::NotInitialized)));
        assert!(matches!(kf.update(&arr1(&[1.0])), Err(FilterError::NotInitialized)));
    }

    #[test]
    fn update_pulls_state_towards_measurement_and_shrinks_uncertainty() {
        let mut kf = constant_velocity();
        kf.predict().unwrap();
        let prior_variance = kf.covariance()[[0, 0]];
        kf.update(&arr1(&[1.2])).unwrap();
        assert!(kf.state()[0] > 1.0 && kf.state()[0] < 1.2);
        assert!(kf.covariance()[[0, 0]] < prior_variance);
    }

    #[test]
    fn tracks_noisy_constant_velocity_measurements() {
        let mut kf = constant_velocity();
        for z in &[1.2, 2.1, 3.5, 4.3, 5.8] {
            kf.predict().unwrap();
            kf.update(&arr1(&[*z])).unwrap();
        }
        let state = kf.state();
        assert!(state[0] > 5.2 && state[0] < 6.0, "position {}", state[0]);
        assert!(state[1] > 0.9 && state[1] < 1.4, "velocity {}", state[1]);
    }

    #[test]
    fn measurement_of_wrong_dimension_is_reported() {
        let mut kf = constant_velocity();
        let result = kf.update(&arr1(&[1.0, 2.0]));
        assert!(matches!(result, Err(FilterError::DimensionMismatch { what: "measurement", .. })));
    }

    #[test]
    fn singular_innovation_covariance_leaves_belief_untouched() {
        let mut kf = KalmanFilter::new(
            1.0,
            &Array2::<f64>::eye(2),
            &arr2(&[[0.0, 0.0]]),
            &Array2::<f64>::zeros([2, 2]),
            &arr2(&[[0.0]]),
            &Array2::<f64>::eye(2),
        )
        .unwrap();
        kf.init(&arr1(&[3.0, 4.0])).unwrap();
        assert!(matches!(kf.update(&arr1(&[1.0])), Err(FilterError::SingularMatrix)));
        assert_abs_diff_eq!(kf.state(), arr1(&[3.0, 4.0]), epsilon = 0.0);
        assert_abs_diff_eq!(kf.covariance(), Array2::<f64>::eye(2), epsilon = 0.0);
    }

    #[test]
    fn nan_measurement_is_rejected() {
        let mut kf = constant_velocity();
        assert!(matches!(kf.update(&arr1(&[f64::NAN])), Err(FilterError::NonFinite(_))));
    }

    #[test]
    fn system_can_be_reset_with_matching_dimensions_only() {
        let mut kf = constant_velocity();
        assert!(kf.set_system(&Array2::<f64>::eye(2), &arr2(&[[0.0, 1.0]])).is_ok());
        assert!(kf.set_system(&Array2::<f64>::eye(3), &arr2(&[[0.0, 1.0]])).is_err());
        assert!(kf.set_noise(&Array2::<f64>::eye(2), &Array2::<f64>::eye(2)).is_err());
        kf.predict().unwrap();
        assert_abs_diff_eq!(kf.state(), arr1(&[0.0, 1.0]), epsilon = 1e-12);
        assert_abs_diff_eq!(kf.innovation(&arr1(&[3.0])).unwrap(), arr1(&[2.0]), epsilon = 1e-12);
    }

    #[test]
    fn works_with_single_precision() {
        let mut kf = KalmanFilter::<f32>::new(
            0.5,
            &Array2::eye(1),
            &Array2::eye(1),
            &Array2::eye(1),
            &Array2::eye(1),
            &Array2::eye(1),
        )
        .unwrap();
        kf.init(&arr1(&[0.0f32])).unwrap();
        kf.predict().unwrap();
        kf.update(&arr1(&[2.0f32])).unwrap();
        // P = 2 after predict, gain 2/3
        assert!((kf.state()[0] - 4.0 / 3.0).abs() < 1e-5);
        assert_eq!(kf.dt(), 0.5);
    }
}
