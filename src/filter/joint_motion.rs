//! Constant-jerk 3D Kalman filter for one joint
//!
//! Each spatial axis is modelled independently with state
//! `[position, velocity, acceleration]`, driven by white-noise jerk. The full
//! state is laid out as `[px, py, pz, vx, vy, vz, ax, ay, az]`.
//!
//! Measurements are integrated in timestamp order only: a measurement older
//! than the last integrated one is discarded, never applied retroactively.

use chrono::{DateTime, Utc};
use nalgebra::{Matrix3, Point3, SMatrix, SVector, Vector3};
use parking_lot::Mutex;

use super::kalman::{KalmanCore, KalmanModel};
use crate::common::linalg::is_finite;
use crate::common::time::seconds_between;
use crate::config::MotionModelConfig;
use crate::skeleton::MeasurementNoise;

/// 9-element joint motion state
pub type MotionState = SVector<f64, 9>;

/// 9x9 joint motion covariance
pub type MotionCovariance = SMatrix<f64, 9, 9>;

/// Piecewise-constant jerk motion model.
///
/// Transition (per axis):
/// ```text
///     ┌ 1  Δt  Δt²/2 ┐
/// F = │ 0  1   Δt    │
///     └ 0  0   1     ┘
/// ```
/// Process noise (per axis, jerk variance q):
/// ```text
///         ┌ Δt⁵/20  Δt⁴/8  Δt³/6 ┐
/// Q = q · │ Δt⁴/8   Δt³/3  Δt²/2 │
///         └ Δt³/6   Δt²/2  Δt    ┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantJerkModel {
    /// Jerk variance per axis
    pub jerk_variance: Vector3<f64>,
}

impl ConstantJerkModel {
    /// Model with the given per-axis jerk variance
    pub fn new(jerk_variance: Vector3<f64>) -> Self {
        Self { jerk_variance }
    }
}

impl KalmanModel<9, 3> for ConstantJerkModel {
    fn transition(&self, dt: f64) -> MotionCovariance {
        let mut f = MotionCovariance::identity();
        let half_dt2 = 0.5 * dt * dt;
        for axis in 0..3 {
            f[(axis, 3 + axis)] = dt;
            f[(axis, 6 + axis)] = half_dt2;
            f[(3 + axis, 6 + axis)] = dt;
        }
        f
    }

    fn process_noise(&self, dt: f64) -> MotionCovariance {
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        let dt4 = dt3 * dt;
        let dt5 = dt4 * dt;

        let mut q = MotionCovariance::zeros();
        for axis in 0..3 {
            let s = self.jerk_variance[axis];
            let (p, v, a) = (axis, 3 + axis, 6 + axis);

            q[(p, p)] = s * dt5 / 20.0;
            q[(p, v)] = s * dt4 / 8.0;
            q[(p, a)] = s * dt3 / 6.0;
            q[(v, v)] = s * dt3 / 3.0;
            q[(v, a)] = s * dt2 / 2.0;
            q[(a, a)] = s * dt;

            q[(v, p)] = q[(p, v)];
            q[(a, p)] = q[(p, a)];
            q[(a, v)] = q[(v, a)];
        }
        q
    }

    fn observation(&self) -> SMatrix<f64, 3, 9> {
        let mut h = SMatrix::<f64, 3, 9>::zeros();
        for axis in 0..3 {
            h[(axis, axis)] = 1.0;
        }
        h
    }
}

/// Joint state extrapolated to some instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionPrediction {
    /// Full motion state
    pub state: MotionState,
    /// Full state covariance
    pub covariance: MotionCovariance,
}

impl MotionPrediction {
    /// Predicted position
    #[inline]
    pub fn position(&self) -> Point3<f64> {
        Point3::new(self.state[0], self.state[1], self.state[2])
    }

    /// Predicted velocity
    #[inline]
    pub fn velocity(&self) -> Vector3<f64> {
        Vector3::new(self.state[3], self.state[4], self.state[5])
    }

    /// Predicted acceleration
    #[inline]
    pub fn acceleration(&self) -> Vector3<f64> {
        Vector3::new(self.state[6], self.state[7], self.state[8])
    }

    /// Position block of the covariance
    #[inline]
    pub fn position_covariance(&self) -> Matrix3<f64> {
        self.covariance.fixed_view::<3, 3>(0, 0).into_owned()
    }
}

/// Result of [`JointMotionFilter::integrate_measurement`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationOutcome {
    /// Estimate after the call (unchanged when discarded)
    pub estimate: MotionPrediction,
    /// False when the measurement was out of order and dropped
    pub applied: bool,
}

#[derive(Debug)]
struct FilterState {
    core: KalmanCore<ConstantJerkModel, 9, 3>,
    last_integrated: Option<DateTime<Utc>>,
}

impl FilterState {
    fn estimate(&self) -> MotionPrediction {
        MotionPrediction {
            state: *self.core.state(),
            covariance: *self.core.covariance(),
        }
    }

    fn extrapolate(&self, dt: f64) -> MotionPrediction {
        let (state, covariance) = self.core.predict(dt);
        MotionPrediction { state, covariance }
    }
}

/// Per-joint constant-jerk filter.
///
/// State and covariance sit behind one lock; every method takes `&self` and
/// may be called concurrently.
#[derive(Debug)]
pub struct JointMotionFilter {
    inner: Mutex<FilterState>,
}

impl JointMotionFilter {
    /// Filter at the origin with the configured initial uncertainty
    pub fn new(config: &MotionModelConfig) -> Self {
        let model = ConstantJerkModel::new(Vector3::from(config.jerk_variance));

        let mut covariance = MotionCovariance::zeros();
        for axis in 0..3 {
            covariance[(axis, axis)] = config.initial_position_variance;
            covariance[(3 + axis, 3 + axis)] = config.initial_velocity_variance;
            covariance[(6 + axis, 6 + axis)] = config.initial_acceleration_variance;
        }

        Self {
            inner: Mutex::new(FilterState {
                core: KalmanCore::new(model, MotionState::zeros(), covariance),
                last_integrated: None,
            }),
        }
    }

    /// Integrate one position measurement.
    ///
    /// Δt is measured from the last integrated measurement (zero for the
    /// first). A negative Δt leaves the filter untouched and returns the
    /// current estimate with `applied == false`.
    pub fn integrate_measurement(
        &self,
        position: &Point3<f64>,
        observed_at: DateTime<Utc>,
        noise: impl Into<MeasurementNoise>,
    ) -> IntegrationOutcome {
        let noise = noise.into();
        let mut inner = self.inner.lock();

        let dt = match inner.last_integrated {
            Some(last) => seconds_between(observed_at, last),
            None => 0.0,
        };
        if dt < 0.0 {
            log::trace!("discarding out-of-order joint sample ({:.1} ms late)", -dt * 1e3);
            return IntegrationOutcome {
                estimate: inner.estimate(),
                applied: false,
            };
        }

        let z = position.coords;
        let r = Matrix3::from_diagonal(&noise.variances());

        let previous = (*inner.core.state(), *inner.core.covariance());
        inner.core.step(dt, &z, &r);

        if !is_finite(inner.core.covariance()) || !is_finite(inner.core.state()) {
            log::warn!("joint filter produced a non-finite estimate; measurement dropped");
            inner.core.reset(previous.0, previous.1);
            return IntegrationOutcome {
                estimate: inner.estimate(),
                applied: false,
            };
        }

        inner.last_integrated = Some(observed_at);
        IntegrationOutcome {
            estimate: inner.estimate(),
            applied: true,
        }
    }

    /// Extrapolate `dt` seconds past the last integration time without
    /// committing anything. Negative `dt` extrapolates backwards.
    pub fn predict_and_discard(&self, dt: f64) -> MotionPrediction {
        self.inner.lock().extrapolate(dt)
    }

    /// Extrapolate to `now + dt_from_now` without committing anything
    pub fn predict_and_discard_from_now(
        &self,
        dt_from_now: f64,
        now: DateTime<Utc>,
    ) -> MotionPrediction {
        let inner = self.inner.lock();
        let since_last = match inner.last_integrated {
            Some(last) => seconds_between(now, last),
            None => 0.0,
        };
        inner.extrapolate(since_last + dt_from_now)
    }

    /// Committed estimate at the last integration time
    pub fn estimate(&self) -> MotionPrediction {
        self.inner.lock().estimate()
    }

    /// Timestamp of the last applied measurement
    pub fn last_integrated(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_integrated
    }

    /// Whether any measurement was ever applied
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().last_integrated.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::milliseconds(ms)
    }

    /// Uniform 32 Hz frame times
    fn frame(k: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::microseconds(k * 31_250)
    }

    #[test]
    fn test_transition_integrates_constant_acceleration() {
        let model = ConstantJerkModel::new(Vector3::repeat(1.0));
        let mut x = MotionState::zeros();
        x[3] = 1.0; // vx
        x[7] = 2.0; // ay
        let x1 = model.transition(0.5) * x;
        assert!((x1[0] - 0.5).abs() < 1e-12);
        assert!((x1[1] - 0.25).abs() < 1e-12); // ½·2·0.5²
        assert!((x1[4] - 1.0).abs() < 1e-12); // vy = 2·0.5
    }

    #[test]
    fn test_process_noise_is_symmetric_and_zero_at_zero_dt() {
        let model = ConstantJerkModel::new(Vector3::new(1.0, 2.0, 3.0));
        let q = model.process_noise(0.1);
        assert!((q - q.transpose()).norm() < 1e-18);
        assert!((q[(1, 1)] - 2.0 * 1e-5 / 20.0).abs() < 1e-18);
        assert_eq!(model.process_noise(0.0), MotionCovariance::zeros());
    }

    #[test]
    fn test_out_of_order_sample_is_bit_identical_noop() {
        let filter = JointMotionFilter::new(&MotionModelConfig::default());
        filter.integrate_measurement(&Point3::new(0.1, 0.2, 0.3), t(100), 0.01);
        filter.integrate_measurement(&Point3::new(0.2, 0.2, 0.3), t(133), 0.01);
        let before = filter.estimate();

        let outcome = filter.integrate_measurement(&Point3::new(5.0, 5.0, 5.0), t(120), 0.01);
        assert!(!outcome.applied);
        assert_eq!(outcome.estimate, before);
        assert_eq!(filter.estimate(), before);
        assert_eq!(filter.last_integrated(), Some(t(133)));
    }

    #[test]
    fn test_equal_timestamp_is_applied() {
        let filter = JointMotionFilter::new(&MotionModelConfig::default());
        filter.integrate_measurement(&Point3::new(0.0, 0.0, 0.0), t(0), 0.01);
        let outcome = filter.integrate_measurement(&Point3::new(0.0, 0.0, 0.0), t(0), 0.01);
        assert!(outcome.applied);
    }

    #[test]
    fn test_converges_to_constant_position() {
        let filter = JointMotionFilter::new(&MotionModelConfig::default());
        let truth = Point3::new(0.5, -0.25, 2.0);

        let mut traces = Vec::new();
        for k in 0..1200 {
            let outcome = filter.integrate_measurement(&truth, frame(k), 0.01);
            assert!(outcome.applied);
            traces.push(outcome.estimate.covariance.trace());
        }

        let estimate = filter.estimate();
        assert!((estimate.position() - truth).norm() < 1e-3);

        for k in 1..traces.len() {
            assert!(
                traces[k] <= traces[k - 1] + 1e-9,
                "trace increased at step {}: {} -> {}",
                k,
                traces[k - 1],
                traces[k]
            );
        }
        assert!(traces[0] > traces[300]);
        assert!((traces[600] - traces[1199]).abs() < 1e-6);
    }

    #[test]
    fn test_per_axis_noise_weights_axes_differently() {
        let filter = JointMotionFilter::new(&MotionModelConfig::default());
        filter.integrate_measurement(&Point3::new(1.0, 1.0, 1.0), t(0), [0.001, 10.0, 0.001]);
        let p = filter.estimate().position();
        // Precise axes jump to the measurement, the noisy axis barely moves
        assert!((p.x - 1.0).abs() < 1e-3);
        assert!(p.y < 0.1);
    }

    #[test]
    fn test_predict_and_discard_extrapolates_velocity() {
        let filter = JointMotionFilter::new(&MotionModelConfig::default());
        for k in 0..60 {
            let x = 0.9 * k as f64 / 32.0; // 0.9 units/s
            filter.integrate_measurement(&Point3::new(x, 0.0, 0.0), frame(k), 0.001);
        }
        let committed = filter.estimate();
        let ahead = filter.predict_and_discard(0.5);
        assert!((ahead.position().x - committed.position().x - 0.45).abs() < 0.05);
        assert!(ahead.position_covariance()[(0, 0)] > committed.position_covariance()[(0, 0)]);
        assert_eq!(filter.estimate(), committed);

        let last = filter.last_integrated().unwrap();
        let from_now = filter.predict_and_discard_from_now(0.25, last + Duration::milliseconds(250));
        assert!((from_now.position() - ahead.position()).norm() < 1e-9);
    }
}
