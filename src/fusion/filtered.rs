//! One tracked subject: a bank of per-joint filters plus hand filters
//!
//! A [`FilteredSkeleton`] is owned by the fusion engine. It is mutated only
//! by [`FilteredSkeleton::integrate_skeleton`] and read by the prediction
//! methods; every filter inside carries its own lock so integration and
//! prediction may run concurrently from different threads.

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use parking_lot::Mutex;

use crate::common::linalg::log_norm;
use crate::common::time::{duration_from_secs, millis_between};
use crate::config::FusionConfig;
use crate::filter::{HandStateFilter, JointMotionFilter};
use crate::skeleton::{
    Confidence, JointType, KinectSkeleton, SkeletonData, TrackingState, FUSED_SENSOR_ID,
    JOINT_SLOTS,
};

use super::orientation::reconstruct_orientations;

#[derive(Debug, Clone, Copy, Default)]
struct JointTimestamps {
    last_tracked: [Option<DateTime<Utc>>; JOINT_SLOTS],
    last_inferred: [Option<DateTime<Utc>>; JOINT_SLOTS],
}

/// Tracking state of a predicted joint from its position uncertainty and age.
///
/// # Arguments
/// * `log_norm` - natural log of the Frobenius norm of the position covariance
/// * `age_ms` - time since the joint was last observed as tracked
/// * `config` - thresholds
pub fn derive_tracking_state(log_norm: f64, age_ms: f64, config: &FusionConfig) -> TrackingState {
    if age_ms > config.tracked_age_ms as f64 {
        if log_norm < config.inferred_log_norm {
            TrackingState::Inferred
        } else {
            TrackingState::NotTracked
        }
    } else if log_norm < config.tracked_log_norm {
        TrackingState::Tracked
    } else if log_norm < config.inferred_log_norm {
        TrackingState::Inferred
    } else {
        TrackingState::NotTracked
    }
}

/// Skeleton-level state: the best state any joint reaches
pub fn skeleton_tracking_state(skeleton: &SkeletonData) -> TrackingState {
    let states = || skeleton.iter().map(|j| j.tracking_state);
    if states().any(|s| s == TrackingState::Tracked) {
        TrackingState::Tracked
    } else if states().any(|s| s == TrackingState::Inferred) {
        TrackingState::Inferred
    } else {
        TrackingState::NotTracked
    }
}

fn confidence_for(state: TrackingState) -> Confidence {
    match state {
        TrackingState::Tracked => Confidence::High,
        TrackingState::Inferred => Confidence::Low,
        _ => Confidence::Unknown,
    }
}

/// Filtered estimate of one real-world subject.
#[derive(Debug)]
pub struct FilteredSkeleton {
    id: u64,
    created_at: DateTime<Utc>,
    joints: [JointMotionFilter; JOINT_SLOTS],
    left_hand: HandStateFilter,
    right_hand: HandStateFilter,
    timestamps: Mutex<JointTimestamps>,
}

impl FilteredSkeleton {
    /// Fresh subject with every filter at its prior
    pub fn new(id: u64, config: &FusionConfig, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            joints: std::array::from_fn(|_| JointMotionFilter::new(&config.motion)),
            left_hand: HandStateFilter::new(&config.hand),
            right_hand: HandStateFilter::new(&config.hand),
            timestamps: Mutex::new(JointTimestamps::default()),
        }
    }

    /// Engine-assigned subject id
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Creation time
    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Filter for one joint
    #[inline]
    pub fn joint_filter(&self, joint_type: JointType) -> &JointMotionFilter {
        &self.joints[joint_type.index()]
    }

    /// Smoothed closed-ness of (left, right) hand
    pub fn hand_estimates(&self) -> (f64, f64) {
        (self.left_hand.estimate(), self.right_hand.estimate())
    }

    /// Integrate every tracked or inferred joint of an observation.
    ///
    /// Joints without a timestamp (own or frame) are skipped, as are samples
    /// older than the joint's last applied sample. Hands are updated when the
    /// matching hand joint is tracked. Returns the number of joints applied.
    pub fn integrate_skeleton(&self, observation: &KinectSkeleton, config: &FusionConfig) -> usize {
        let mut applied = 0;
        let mut updates: Vec<(usize, DateTime<Utc>, bool)> = Vec::with_capacity(JOINT_SLOTS);

        for (slot, joint) in observation.skeleton.iter().enumerate() {
            let tracked = match joint.tracking_state {
                TrackingState::Tracked => true,
                TrackingState::Inferred => false,
                _ => continue,
            };
            let Some(at) = observation.joint_time(slot) else {
                log::trace!("joint slot {slot} has no timestamp; skipped");
                continue;
            };

            let std_dev = if joint.spatial_error_std_dev.is_finite()
                && joint.spatial_error_std_dev > 0.0
            {
                joint.spatial_error_std_dev
            } else {
                config.default_std_dev_for(slot)
            };

            let outcome = self.joints[slot].integrate_measurement(&joint.position, at, std_dev);
            if outcome.applied {
                applied += 1;
                updates.push((slot, at, tracked));
            }
        }

        {
            let mut timestamps = self.timestamps.lock();
            for (slot, at, tracked) in updates {
                let entry = if tracked {
                    &mut timestamps.last_tracked[slot]
                } else {
                    &mut timestamps.last_inferred[slot]
                };
                if entry.map_or(true, |prev| at > prev) {
                    *entry = Some(at);
                }
            }
        }

        let hands = [
            (JointType::HandLeft, &self.left_hand, observation.left_hand_closed),
            (JointType::HandRight, &self.right_hand, observation.right_hand_closed),
        ];
        for (joint_type, filter, closed) in hands {
            if observation.skeleton[joint_type].tracking_state != TrackingState::Tracked {
                continue;
            }
            if let Some(at) = observation.joint_time(joint_type.index()) {
                filter.integrate_measurement(closed, at);
            }
        }

        applied
    }

    /// Mean signed offset between an observation's tracked joints and this
    /// subject's current joint estimates, as a distance.
    ///
    /// Only joints tracked in the observation and already estimated here
    /// contribute. `None` when no joint is comparable.
    pub fn correspondence_score(&self, observation: &KinectSkeleton) -> Option<f64> {
        let mut sum = Vector3::zeros();
        let mut count = 0usize;
        for (slot, joint) in observation.skeleton.iter().enumerate() {
            if joint.tracking_state != TrackingState::Tracked {
                continue;
            }
            let filter = &self.joints[slot];
            if !filter.is_initialized() {
                continue;
            }
            let predicted = filter.predict_and_discard(0.0).position();
            sum += joint.position - predicted;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let score = (sum / count as f64).norm();
        score.is_finite().then_some(score)
    }

    /// Latest time any joint was observed as tracked
    pub fn last_tracked_update(&self) -> Option<DateTime<Utc>> {
        self.timestamps.lock().last_tracked.iter().flatten().max().copied()
    }

    /// Latest time any joint was observed as inferred
    pub fn last_inferred_update(&self) -> Option<DateTime<Utc>> {
        self.timestamps.lock().last_inferred.iter().flatten().max().copied()
    }

    /// Milliseconds since the last tracked update (since creation if none)
    pub fn age_ms(&self, now: DateTime<Utc>) -> f64 {
        let since = self.last_tracked_update().unwrap_or(self.created_at);
        millis_between(now, since)
    }

    /// Joint positions and tracking states `dt_from_now` seconds after `now`.
    ///
    /// Orientations are left at the identity and hands are not evaluated.
    pub fn predict_positions_only(
        &self,
        dt_from_now: f64,
        now: DateTime<Utc>,
        config: &FusionConfig,
    ) -> SkeletonData {
        let timestamps = *self.timestamps.lock();
        let target = now + duration_from_secs(dt_from_now);
        let mut skeleton = SkeletonData::new();

        for (slot, filter) in self.joints.iter().enumerate() {
            if !filter.is_initialized() {
                continue;
            }
            let prediction = filter.predict_and_discard_from_now(dt_from_now, now);
            let covariance = prediction.position_covariance();
            let age_ms = timestamps.last_tracked[slot]
                .map_or(f64::INFINITY, |t| millis_between(now, t));
            let state = derive_tracking_state(log_norm(&covariance), age_ms, config);

            let joint = &mut skeleton[slot];
            joint.position = prediction.position();
            joint.tracking_state = state;
            joint.confidence = confidence_for(state);
            joint.observed_at = Some(target);
            joint.spatial_error_std_dev = (covariance.trace() / 3.0).max(0.0).sqrt();
        }
        skeleton
    }

    /// Full fused skeleton `dt_from_now` seconds after `now`
    pub fn predict_skeleton(
        &self,
        dt_from_now: f64,
        now: DateTime<Utc>,
        config: &FusionConfig,
    ) -> KinectSkeleton {
        let mut skeleton = self.predict_positions_only(dt_from_now, now, config);
        reconstruct_orientations(&mut skeleton);

        let mut out = KinectSkeleton::new(FUSED_SENSOR_ID, self.id)
            .with_hands(
                self.left_hand.predict_measurement(),
                self.right_hand.predict_measurement(),
            )
            .with_capture_time(now + duration_from_secs(dt_from_now));
        out.tracking_state = skeleton_tracking_state(&skeleton);
        out.skeleton = skeleton;
        out.position = out.joint_centroid();
        out
    }
}
