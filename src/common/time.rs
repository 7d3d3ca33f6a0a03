//! Timestamps and clocks
//!
//! Observations carry absolute UTC timestamps. Everything that needs "now"
//! reads it through a [`Clock`] so simulated time can drive staleness and
//! prediction horizons in tests.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for simulations and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward (or backward, for a negative value) by `millis`
    pub fn advance_ms(&self, millis: i64) {
        *self.now.lock() += Duration::milliseconds(millis);
    }

    /// Move the clock forward by fractional seconds
    pub fn advance_secs(&self, secs: f64) {
        *self.now.lock() += duration_from_secs(secs);
    }

    /// Jump to an absolute time
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Signed difference `later - earlier` in seconds.
#[inline]
pub fn seconds_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    let delta = later - earlier;
    match delta.num_microseconds() {
        Some(us) => us as f64 * 1e-6,
        None => delta.num_milliseconds() as f64 * 1e-3,
    }
}

/// Signed difference `later - earlier` in milliseconds.
#[inline]
pub fn millis_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    seconds_between(later, earlier) * 1e3
}

/// Convert fractional seconds to a chrono duration (microsecond resolution).
#[inline]
pub fn duration_from_secs(secs: f64) -> Duration {
    Duration::microseconds((secs * 1e6).round() as i64)
}
