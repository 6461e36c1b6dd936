//! This module contains the implementations of non-linear approximations to Kalman filters:
//! the extended Kalman filter, which linearizes the models through their Jacobians, and the
//! unscented Kalman filter, which propagates deterministic sigma points.

pub mod extended;
pub mod unscented;
