//! Constant-model Kalman filter core
//!
//! A filter is a [`KalmanModel`] (the transition, process-noise and
//! observation matrices as pure functions of the time step) plus a
//! [`KalmanCore`] holding the state estimate and its covariance. Concrete
//! filters are plain data records implementing the trait; the predict/update
//! recursion is written once here.

use nalgebra::{SMatrix, SVector};

use crate::common::linalg::{kalman_predict, kalman_update};

/// Matrices defining a linear Gaussian motion and observation model.
///
/// # Type Parameters
/// - `N` - state dimension
/// - `M` - measurement dimension
pub trait KalmanModel<const N: usize, const M: usize> {
    /// State transition matrix F(Δt)
    fn transition(&self, dt: f64) -> SMatrix<f64, N, N>;

    /// Process noise covariance Q(Δt)
    fn process_noise(&self, dt: f64) -> SMatrix<f64, N, N>;

    /// Observation matrix H
    fn observation(&self) -> SMatrix<f64, M, N>;
}

/// State estimate and covariance driven by a [`KalmanModel`].
///
/// Not synchronized; owners that share a core between threads wrap it in a
/// single lock so state and covariance always change together.
#[derive(Debug, Clone)]
pub struct KalmanCore<K, const N: usize, const M: usize> {
    model: K,
    state: SVector<f64, N>,
    covariance: SMatrix<f64, N, N>,
}

impl<K: KalmanModel<N, M>, const N: usize, const M: usize> KalmanCore<K, N, M> {
    /// Create a filter with an initial estimate
    pub fn new(model: K, state: SVector<f64, N>, covariance: SMatrix<f64, N, N>) -> Self {
        Self {
            model,
            state,
            covariance,
        }
    }

    /// Current state estimate
    #[inline]
    pub fn state(&self) -> &SVector<f64, N> {
        &self.state
    }

    /// Current state covariance
    #[inline]
    pub fn covariance(&self) -> &SMatrix<f64, N, N> {
        &self.covariance
    }

    /// Motion/observation model
    #[inline]
    pub fn model(&self) -> &K {
        &self.model
    }

    /// Extrapolate the estimate by `dt` without committing it
    pub fn predict(&self, dt: f64) -> (SVector<f64, N>, SMatrix<f64, N, N>) {
        kalman_predict(
            &self.state,
            &self.covariance,
            &self.model.transition(dt),
            &self.model.process_noise(dt),
        )
    }

    /// Predict by `dt`, then update with measurement `z` of noise covariance `r`
    pub fn step(&mut self, dt: f64, z: &SVector<f64, M>, r: &SMatrix<f64, M, M>) {
        let (x_pred, p_pred) = self.predict(dt);
        let (x, p) = kalman_update(&x_pred, &p_pred, z, &self.model.observation(), r);
        self.state = x;
        self.covariance = p;
    }

    /// Overwrite the estimate
    pub fn reset(&mut self, state: SVector<f64, N>, covariance: SMatrix<f64, N, N>) {
        self.state = state;
        self.covariance = covariance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix1, Matrix1x2, Matrix2, Vector1, Vector2};

    /// 1D constant velocity with white acceleration noise
    struct ConstantVelocity1d {
        q: f64,
    }

    impl KalmanModel<2, 1> for ConstantVelocity1d {
        fn transition(&self, dt: f64) -> Matrix2<f64> {
            Matrix2::new(1.0, dt, 0.0, 1.0)
        }

        fn process_noise(&self, dt: f64) -> Matrix2<f64> {
            let q = self.q;
            Matrix2::new(
                q * dt.powi(3) / 3.0,
                q * dt.powi(2) / 2.0,
                q * dt.powi(2) / 2.0,
                q * dt,
            )
        }

        fn observation(&self) -> Matrix1x2<f64> {
            Matrix1x2::new(1.0, 0.0)
        }
    }

    #[test]
    fn test_predict_does_not_commit() {
        let core = KalmanCore::new(
            ConstantVelocity1d { q: 1.0 },
            Vector2::new(0.0, 1.0),
            Matrix2::identity(),
        );
        let (x, _) = core.predict(2.0);
        assert!((x[0] - 2.0).abs() < 1e-12);
        assert_eq!(core.state()[0], 0.0);
    }

    #[test]
    fn test_step_tracks_ramp() {
        let mut core = KalmanCore::new(
            ConstantVelocity1d { q: 0.01 },
            Vector2::zeros(),
            Matrix2::identity() * 10.0,
        );
        let r = Matrix1::new(0.01);
        for k in 1..=100 {
            core.step(0.1, &Vector1::new(0.1 * k as f64), &r);
        }
        // Velocity of the ramp is 1 unit/s
        assert!((core.state()[1] - 1.0).abs() < 0.05);
        assert!((core.state()[0] - 10.0).abs() < 0.05);
    }
}
