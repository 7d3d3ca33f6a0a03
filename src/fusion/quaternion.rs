//! Running weighted average of unit quaternions
//!
//! Each new sample is blended into the running average with weight
//! `1 / (n + 1)` using the closed-form optimum for two weighted quaternions
//! (the eigenvector of the weighted outer-product sum, solved analytically).
//! Sign ambiguity (`q` and `-q` are the same rotation) is handled by the sign
//! of the dot product.

use nalgebra::{Quaternion, UnitQuaternion};

/// Blend two unit quaternions with non-negative weights.
///
/// Returns `None` when the quaternions are exactly orthogonal in 4D and the
/// weights are equal; no single average exists in that case. When they are
/// orthogonal and the weights differ, the heavier quaternion is returned.
pub fn blend(
    q1: &UnitQuaternion<f64>,
    w1: f64,
    q2: &UnitQuaternion<f64>,
    w2: f64,
) -> Option<UnitQuaternion<f64>> {
    let dot = q1.coords.dot(&q2.coords);

    if dot == 0.0 {
        return if w1 > w2 {
            Some(*q1)
        } else if w2 > w1 {
            Some(*q2)
        } else {
            None
        };
    }

    let diff = w1 - w2;
    let z = (diff * diff + 4.0 * w1 * w2 * dot * dot).sqrt();
    let denom = z * (w1 + w2 + z);
    let c1 = (w1 * (diff + z) / denom).sqrt();
    let c2 = dot.signum() * (w2 * (z - diff) / denom).sqrt();

    let blended: Quaternion<f64> = q1.into_inner() * c1 + q2.into_inner() * c2;
    if blended.norm() == 0.0 || !blended.norm().is_finite() {
        return None;
    }
    Some(UnitQuaternion::from_quaternion(blended))
}

/// Incremental quaternion mean
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuaternionAverage {
    average: UnitQuaternion<f64>,
    count: usize,
}

impl QuaternionAverage {
    /// Empty average
    pub fn new() -> Self {
        Self {
            average: UnitQuaternion::identity(),
            count: 0,
        }
    }

    /// Blend in one sample with weight `1 / (count + 1)`.
    ///
    /// Returns false when the sample was skipped because it is exactly
    /// opposed to the running average with equal weight.
    pub fn add(&mut self, q: &UnitQuaternion<f64>) -> bool {
        if self.count == 0 {
            self.average = *q;
            self.count = 1;
            return true;
        }

        let n = self.count as f64;
        let w_avg = n / (n + 1.0);
        let w_new = 1.0 / (n + 1.0);
        match blend(&self.average, w_avg, q, w_new) {
            Some(avg) => {
                self.average = avg;
                self.count += 1;
                true
            }
            None => {
                log::trace!("skipping quaternion opposed to the running average");
                false
            }
        }
    }

    /// Current average, `None` before the first sample
    pub fn average(&self) -> Option<UnitQuaternion<f64>> {
        (self.count > 0).then_some(self.average)
    }

    /// Number of samples blended so far
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Default for QuaternionAverage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_single_sample_is_the_average() {
        let q = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let mut avg = QuaternionAverage::new();
        assert!(avg.average().is_none());
        assert!(avg.add(&q));
        assert!(avg.average().unwrap().angle_to(&q) < 1e-12);
    }

    #[test]
    fn test_two_samples_average_to_midpoint() {
        let a = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.0);
        let b = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.0);
        let mut avg = QuaternionAverage::new();
        avg.add(&a);
        avg.add(&b);
        let mid = avg.average().unwrap();
        assert!((mid.angle() - 0.5).abs() < 1e-9);
        assert_eq!(avg.count(), 2);
    }

    #[test]
    fn test_sign_flipped_sample_is_same_rotation() {
        let a = UnitQuaternion::from_euler_angles(0.3, -0.2, 0.1);
        let flipped = UnitQuaternion::new_unchecked(-a.into_inner());
        let mut avg = QuaternionAverage::new();
        avg.add(&a);
        avg.add(&flipped);
        assert!(avg.average().unwrap().angle_to(&a) < 1e-9);
    }

    #[test]
    fn test_running_average_weights_equally() {
        // Three samples at 0, 0.3 and 0.6 rad about one axis average to 0.3
        let mut avg = QuaternionAverage::new();
        for angle in [0.0, 0.3, 0.6] {
            avg.add(&UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angle));
        }
        assert!((avg.average().unwrap().angle() - 0.3).abs() < 5e-3);
    }

    #[test]
    fn test_opposed_equal_weight_is_skipped() {
        // 180 degrees apart as rotations: orthogonal in quaternion space
        let a = UnitQuaternion::identity();
        let b = UnitQuaternion::new_unchecked(Quaternion::new(0.0, 0.0, 1.0, 0.0));

        let mut avg = QuaternionAverage::new();
        avg.add(&a);
        let before = avg.average().unwrap();
        assert!(!avg.add(&b));
        assert_eq!(avg.count(), 1);
        assert_eq!(avg.average().unwrap(), before);
    }

    #[test]
    fn test_opposed_unequal_weight_keeps_heavier() {
        let a = UnitQuaternion::identity();
        let b = UnitQuaternion::new_unchecked(Quaternion::new(0.0, 1.0, 0.0, 0.0));
        assert_eq!(blend(&a, 0.75, &b, 0.25), Some(a));
        assert_eq!(blend(&a, 0.25, &b, 0.75), Some(b));
    }
}
