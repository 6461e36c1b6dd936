#![crate_name = "rusty_estimation"]
//! The `rusty-estimation` crate contains implementations of recursive Bayesian state estimation
//! algorithms. Given a sequence of noisy measurements of a partially observed dynamic system,
//! each estimator maintains a belief about the hidden state and refines it with a two-call
//! lifecycle: `predict` advances the belief through the process model, `update` folds in a new
//! measurement.
//!
//! ## Types of algorithms
//! - Linear Kalman filter, exact for linear-Gaussian systems
//! - Extended Kalman filter, linearizing caller-supplied nonlinear models through their Jacobians
//! - Unscented Kalman filter, propagating deterministic sigma points instead of Jacobians
//! - Particle filter (sequential Monte Carlo) with importance weighting and systematic
//!   resampling
//!
//! All four share the [`Filter`](filter::Filter) contract and can be driven interchangeably
//! through the [`Estimator`](filter::Estimator) sum type.
extern crate blas_src;

pub mod error;
pub mod filter;

pub use error::{FilterError, ModelKind, Result};
pub use filter::*;
