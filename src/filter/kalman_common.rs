use crate::error::{FilterError, Result};
use crate::filter::filter_traits::RealScalar;
use ndarray::{Array1, Array2, ArrayBase, Data, Dimension, Ix1, Ix2};
use ndarray_linalg::InverseC;
use num_traits::Float;

pub(in crate) fn check_square<T, S>(what: &'static str, arr: &ArrayBase<S, Ix2>) -> Result<usize>
where
    S: Data<Elem = T>,
{
    let (rows, cols) = arr.dim();
    if rows != cols {
        return Err(FilterError::shape(what, &[rows, rows], arr.shape()));
    }
    Ok(rows)
}

pub(in crate) fn check_shape<T, S>(
    what: &'static str,
    arr: &ArrayBase<S, Ix2>,
    expected: (usize, usize),
) -> Result<()>
where
    S: Data<Elem = T>,
{
    if arr.dim() != expected {
        return Err(FilterError::shape(what, &[expected.0, expected.1], arr.shape()));
    }
    Ok(())
}

pub(in crate) fn check_len<T, S>(
    what: &'static str,
    vec: &ArrayBase<S, Ix1>,
    len: usize,
) -> Result<()>
where
    S: Data<Elem = T>,
{
    if vec.len() != len {
        return Err(FilterError::shape(what, &[len], vec.shape()));
    }
    Ok(())
}

pub(in crate) fn check_finite<T, S, D>(what: &'static str, arr: &ArrayBase<S, D>) -> Result<()>
where
    T: Float,
    S: Data<Elem = T>,
    D: Dimension,
{
    if arr.iter().all(|v| Float::is_finite(*v)) {
        Ok(())
    } else {
        Err(FilterError::NonFinite(what))
    }
}

/// Returns `(P + Pᵀ) / 2`, removing the asymmetry rounding leaves behind.
pub(in crate) fn symmetrize<T: RealScalar>(covariance: &Array2<T>) -> Array2<T> {
    let two = T::one() + T::one();
    (covariance + &covariance.t()).mapv(|v| v / two)
}

/// Inverts an innovation covariance through its Cholesky factorization.
pub(in crate) fn invert_innovation_covariance<T: RealScalar>(
    u_matrix: &Array2<T>,
) -> Result<Array2<T>> {
    check_finite("innovation covariance", u_matrix)?;
    u_matrix.invc().map_err(|_| FilterError::SingularMatrix)
}

/// `F·P·Fᵀ + Q`
pub(in crate) fn propagate_covariance<T: RealScalar>(
    jacobian: &Array2<T>,
    covariance: &Array2<T>,
    transition_covariance: &Array2<T>,
) -> Result<Array2<T>> {
    let predicted = jacobian.dot(covariance).dot(&jacobian.t()) + transition_covariance;
    check_finite("predicted covariance", &predicted)?;
    Ok(symmetrize(&predicted))
}

/// Kalman correction of a Gaussian belief linearized around `observation_matrix`.
///
/// `L = P·Hᵀ`, `U = H·L + R`, `K = L·U⁻¹`, `x' = x + K·innovation` and
/// `P' = (I − K·H)·P`.
pub(in crate) fn linearized_update<T: RealScalar>(
    state: &Array1<T>,
    covariance: &Array2<T>,
    observation_matrix: &Array2<T>,
    observation_covariance: &Array2<T>,
    innovation: &Array1<T>,
) -> Result<(Array1<T>, Array2<T>)> {
    let l_matrix = covariance.dot(&observation_matrix.t());
    let u_matrix = observation_matrix.dot(&l_matrix) + observation_covariance;
    let u_matrix_inv = invert_innovation_covariance(&u_matrix)?;
    let kalman_gain = l_matrix.dot(&u_matrix_inv);

    let updated_state = state + &kalman_gain.dot(innovation);
    let identity = Array2::<T>::eye(state.len());
    let updated_covariance = (identity - kalman_gain.dot(observation_matrix)).dot(covariance);

    check_finite("updated state", &updated_state)?;
    check_finite("updated covariance", &updated_covariance)?;
    Ok((updated_state, symmetrize(&updated_covariance)))
}
