pub mod estimator;
pub mod filter_traits;
pub mod kalman;
mod kalman_common;
pub mod particle;

pub use estimator::Estimator;
pub use filter_traits::*;
pub use kalman::linear::KalmanFilter;
pub use kalman::nonlinear::extended::{ExtendedKalmanFilter, Linearization};
pub use kalman::nonlinear::unscented::{UnscentedKalmanFilter, UnscentedParameters};
pub use particle::{Particle, ParticleFilter, ParticleFilterConfig};
