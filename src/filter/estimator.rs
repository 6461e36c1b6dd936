//! Closed set of the estimators in this crate behind a single `Filter` implementation, so tracking
//! code can hold any of them without generics or trait objects.

use crate::error::Result;
use crate::filter::filter_traits::{Filter, GaussianFilter};
use crate::filter::kalman::linear::KalmanFilter;
use crate::filter::kalman::nonlinear::extended::ExtendedKalmanFilter;
use crate::filter::kalman::nonlinear::unscented::UnscentedKalmanFilter;
use crate::filter::particle::ParticleFilter;
use ndarray::{Array1, ArrayBase, ArrayView2, Data, Ix1};

/// Any of the four estimators, dispatched statically by `match`.
///
/// ```
/// use ndarray::{arr1, arr2, Array2};
/// use rusty_estimation::{Estimator, Filter, KalmanFilter};
///
/// let mut kf = KalmanFilter::new(
///     1.0,
///     &arr2(&[[1.0, 1.0], [0.0, 1.0]]),
///     &arr2(&[[1.0, 0.0]]),
///     &(Array2::<f64>::eye(2) * 0.001),
///     &arr2(&[[0.1]]),
///     &Array2::eye(2),
/// ).unwrap();
/// kf.init(&arr1(&[0.0, 1.0])).unwrap();
///
/// let mut estimator = Estimator::from(kf);
/// estimator.predict().unwrap();
/// estimator.update(&arr1(&[1.2])).unwrap();
/// assert_eq!(estimator.name(), "kalman");
/// assert!(estimator.covariance().is_some());
/// ```
pub enum Estimator {
    Kalman(KalmanFilter<f64>),
    Extended(ExtendedKalmanFilter<f64>),
    Unscented(UnscentedKalmanFilter),
    Particle(ParticleFilter),
}

impl Estimator {
    /// Point estimate of the state: the Gaussian mean, or the weighted particle mean.
    pub fn estimate(&self) -> Array1<f64> {
        match self {
            Estimator::Kalman(filter) => filter.state().to_owned(),
            Estimator::Extended(filter) => filter.state().to_owned(),
            Estimator::Unscented(filter) => filter.state().to_owned(),
            Estimator::Particle(filter) => filter.estimate(),
        }
    }

    /// State covariance of the Gaussian estimators, `None` for the particle filter.
    pub fn covariance(&self) -> Option<ArrayView2<'_, f64>> {
        match self {
            Estimator::Kalman(filter) => Some(filter.covariance()),
            Estimator::Extended(filter) => Some(filter.covariance()),
            Estimator::Unscented(filter) => Some(filter.covariance()),
            Estimator::Particle(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Estimator::Kalman(_) => "kalman",
            Estimator::Extended(_) => "extended kalman",
            Estimator::Unscented(_) => "unscented kalman",
            Estimator::Particle(_) => "particle",
        }
    }
}

impl Filter<f64> for Estimator {
    fn predict(&mut self) -> Result<()> {
        match self {
            Estimator::Kalman(filter) => filter.predict(),
            Estimator::Extended(filter) => filter.predict(),
            Estimator::Unscented(filter) => filter.predict(),
            Estimator::Particle(filter) => filter.predict(),
        }
    }

    fn update<S: Data<Elem = f64>>(&mut self, measurement: &ArrayBase<S, Ix1>) -> Result<()> {
        match self {
            Estimator::Kalman(filter) => filter.update(measurement),
            Estimator::Extended(filter) => filter.update(measurement),
            Estimator::Unscented(filter) => filter.update(measurement),
            Estimator::Particle(filter) => filter.update(measurement),
        }
    }
}

impl From<KalmanFilter<f64>> for Estimator {
    fn from(filter: KalmanFilter<f64>) -> Self {
        Estimator::Kalman(filter)
    }
}

impl From<ExtendedKalmanFilter<f64>> for Estimator {
    fn from(filter: ExtendedKalmanFilter<f64>) -> Self {
        Estimator::Extended(filter)
    }
}

impl From<UnscentedKalmanFilter> for Estimator {
    fn from(filter: UnscentedKalmanFilter) -> Self {
        Estimator::Unscented(filter)
    }
}

impl From<ParticleFilter> for Estimator {
    fn from(filter: ParticleFilter) -> Self {
        Estimator::Particle(filter)
    }
}
