//! Scalar constant-value Kalman filters
//!
//! [`ConstantValueFilter`] estimates a quantity assumed constant between
//! samples, with process noise supplied per update so the caller decides how
//! fast old information decays. [`HandStateFilter`] uses it to turn boolean
//! grab events into a smoothed "closed-ness" in [0, 1].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::common::time::millis_between;
use crate::config::HandStateConfig;

/// Degenerate one-state Kalman filter (F = H = 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantValueFilter {
    estimate: f64,
    variance: f64,
    measurement_variance: f64,
}

impl ConstantValueFilter {
    /// Create a filter with a prior estimate and variance
    pub fn new(initial_estimate: f64, initial_variance: f64, measurement_variance: f64) -> Self {
        Self {
            estimate: initial_estimate,
            variance: initial_variance,
            measurement_variance,
        }
    }

    /// Integrate one sample after inflating the variance by `process_noise`.
    ///
    /// Negative process noise is treated as zero.
    pub fn integrate(&mut self, measurement: f64, process_noise: f64) -> f64 {
        let predicted_variance = self.variance + process_noise.max(0.0);
        let gain = predicted_variance / (predicted_variance + self.measurement_variance);
        self.estimate += gain * (measurement - self.estimate);
        self.variance = (1.0 - gain) * predicted_variance;
        self.estimate
    }

    /// Current estimate
    #[inline]
    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Current estimate variance
    #[inline]
    pub fn variance(&self) -> f64 {
        self.variance
    }
}

#[derive(Debug)]
struct HandState {
    filter: ConstantValueFilter,
    last_update: Option<DateTime<Utc>>,
}

/// Smoothed hand grab state.
///
/// Process noise grows linearly with the time since the previous sample, so
/// an old estimate is trusted less the longer the hand went unobserved.
#[derive(Debug)]
pub struct HandStateFilter {
    inner: Mutex<HandState>,
    process_noise_per_ms: f64,
}

impl HandStateFilter {
    /// Open-hand prior
    pub fn new(config: &HandStateConfig) -> Self {
        Self {
            inner: Mutex::new(HandState {
                filter: ConstantValueFilter::new(
                    0.0,
                    config.initial_variance,
                    config.measurement_variance,
                ),
                last_update: None,
            }),
            process_noise_per_ms: config.process_noise_per_ms,
        }
    }

    /// Integrate one grab sample observed at `at`; returns the new estimate
    pub fn integrate_measurement(&self, hand_closed: bool, at: DateTime<Utc>) -> f64 {
        let mut inner = self.inner.lock();
        let age_ms = match inner.last_update {
            Some(last) => millis_between(at, last).max(0.0),
            None => 0.0,
        };
        let z = if hand_closed { 1.0 } else { 0.0 };
        let estimate = inner
            .filter
            .integrate(z, self.process_noise_per_ms * age_ms);
        if inner.last_update.map_or(true, |last| at > last) {
            inner.last_update = Some(at);
        }
        estimate
    }

    /// Boolean grab state: the estimate thresholded at 0.5
    pub fn predict_measurement(&self) -> bool {
        self.estimate() > 0.5
    }

    /// Continuous closed-ness estimate
    pub fn estimate(&self) -> f64 {
        self.inner.lock().filter.estimate()
    }
}
