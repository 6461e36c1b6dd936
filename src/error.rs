//! Error type shared by all estimators in the crate.

use std::fmt;
use thiserror::Error;

/// Names the nonlinear model a filter was missing when it was asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Process,
    Measurement,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Process => write!(f, "process"),
            ModelKind::Measurement => write!(f, "measurement"),
        }
    }
}

/// Errors produced while configuring or running a filter.
///
/// Configuration errors (`DimensionMismatch`, `MissingModel`, `NotInitialized`,
/// `MissingSigmaPoints`, `InvalidParameter`) indicate caller mistakes. Numerical errors
/// (`SingularMatrix`, `NotPositiveDefinite`, `NonFinite`) indicate that the belief can not be
/// advanced without producing garbage. In both cases the filter state is left as it was before
/// the failing call.
#[derive(Debug, Clone, Error)]
pub enum FilterError {
    #[error("{what} has shape {found:?}, expected {expected:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("{0} model has not been set")]
    MissingModel(ModelKind),

    #[error("filter state has not been initialized")]
    NotInitialized,

    #[error("update requires the sigma points of a preceding predict")]
    MissingSigmaPoints,

    #[error("innovation covariance is singular")]
    SingularMatrix,

    #[error("state covariance is not positive definite")]
    NotPositiveDefinite,

    #[error("{0} contains non-finite values")]
    NonFinite(&'static str),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl FilterError {
    pub(crate) fn shape(what: &'static str, expected: &[usize], found: &[usize]) -> Self {
        FilterError::DimensionMismatch {
            what,
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
