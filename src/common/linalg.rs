//! Linear algebra utilities
//!
//! Fixed-size Kalman predict/update steps and small matrix helpers shared by
//! every filter in the crate. All functions are generic over the state
//! dimension `N` and measurement dimension `M` so the compiler can unroll the
//! small (3x3, 9x9) products used by the joint filters.

use nalgebra::{SMatrix, SVector};

/// Kalman prediction step
///
/// Implements the Chapman-Kolmogorov prediction:
/// - `x' = F × x`
/// - `P' = F × P × Fᵀ + Q`
#[inline]
pub fn kalman_predict<const N: usize>(
    state: &SVector<f64, N>,
    covariance: &SMatrix<f64, N, N>,
    transition: &SMatrix<f64, N, N>,
    process_noise: &SMatrix<f64, N, N>,
) -> (SVector<f64, N>, SMatrix<f64, N, N>) {
    let x = transition * state;
    let p = transition * covariance * transition.transpose() + process_noise;
    (x, symmetrize(&p))
}

/// Kalman filter update step
///
/// Performs a single measurement update.
///
/// # Arguments
/// * `x_pred` - Predicted state mean
/// * `p_pred` - Predicted state covariance
/// * `z` - Measurement
/// * `h` - Observation matrix
/// * `r` - Measurement noise covariance
///
/// # Returns
/// Tuple of (updated mean, updated covariance). If the innovation covariance
/// cannot be inverted the prediction is returned unchanged.
pub fn kalman_update<const N: usize, const M: usize>(
    x_pred: &SVector<f64, N>,
    p_pred: &SMatrix<f64, N, N>,
    z: &SVector<f64, M>,
    h: &SMatrix<f64, M, N>,
    r: &SMatrix<f64, M, M>,
) -> (SVector<f64, N>, SMatrix<f64, N, N>) {
    let innovation = z - h * x_pred;

    // Innovation covariance
    let s = h * p_pred * h.transpose() + r;

    // Kalman gain K = P Hᵀ S⁻¹, computed as (S⁻¹ H P)ᵀ since P and S are symmetric
    let k: SMatrix<f64, N, M> = match s.cholesky() {
        Some(chol) => chol.solve(&(h * p_pred)).transpose(),
        None => match s.try_inverse() {
            Some(s_inv) => p_pred * h.transpose() * s_inv,
            None => return (*x_pred, *p_pred),
        },
    };

    let x_updated = x_pred + k * innovation;

    // Joseph form keeps the covariance positive semi-definite
    let i_minus_kh = SMatrix::<f64, N, N>::identity() - k * h;
    let p_updated = i_minus_kh * p_pred * i_minus_kh.transpose() + k * r * k.transpose();

    (x_updated, symmetrize(&p_updated))
}

/// Make matrix symmetric
///
/// Ensures a matrix is symmetric by averaging with its transpose
#[inline]
pub fn symmetrize<const N: usize>(matrix: &SMatrix<f64, N, N>) -> SMatrix<f64, N, N> {
    (matrix + matrix.transpose()) * 0.5
}

/// Natural log of the Frobenius norm of a covariance block.
///
/// Returns `f64::INFINITY` for non-finite input so callers treating large
/// values as "untrusted" also reject NaN covariances.
pub fn log_norm<const N: usize>(covariance: &SMatrix<f64, N, N>) -> f64 {
    let norm = covariance.norm();
    if !norm.is_finite() {
        return f64::INFINITY;
    }
    norm.ln()
}

/// Check that every entry of a matrix is finite
#[inline]
pub fn is_finite<const R: usize, const C: usize>(matrix: &SMatrix<f64, R, C>) -> bool {
    matrix.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix1, Matrix2, Vector1, Vector2};

    #[test]
    fn test_predict_constant_velocity() {
        let f = Matrix2::new(1.0, 1.0, 0.0, 1.0);
        let q = Matrix2::zeros();
        let (x, p) = kalman_predict(&Vector2::new(0.0, 2.0), &Matrix2::identity(), &f, &q);

        assert!((x[0] - 2.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
        // P' = F I Fᵀ = [[2,1],[1,1]]
        assert!((p[(0, 0)] - 2.0).abs() < 1e-12);
        assert!((p[(0, 1)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_scalar_update_matches_closed_form() {
        let (x, p) = kalman_update(
            &Vector1::new(0.0),
            &Matrix1::new(1.0),
            &Vector1::new(1.0),
            &Matrix1::new(1.0),
            &Matrix1::new(1.0),
        );

        // K = 1 / (1 + 1)
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!((p[(0, 0)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_update_singular_innovation_returns_prediction() {
        let x0 = Vector1::new(3.0);
        let (x, p) = kalman_update(
            &x0,
            &Matrix1::new(0.0),
            &Vector1::new(1.0),
            &Matrix1::new(1.0),
            &Matrix1::new(0.0),
        );
        assert_eq!(x, x0);
        assert_eq!(p[(0, 0)], 0.0);
    }

    #[test]
    fn test_log_norm() {
        let m = Matrix2::identity() * 2.0;
        assert!((log_norm(&m) - (8.0f64).sqrt().ln()).abs() < 1e-12);

        let bad = Matrix2::new(f64::NAN, 0.0, 0.0, 1.0);
        assert_eq!(log_norm(&bad), f64::INFINITY);
    }
}
