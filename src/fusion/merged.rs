//! Averaging fusion of concurrent same-subject observations
//!
//! [`MergedSkeleton`] accumulates observations of one subject reported by
//! different sensors at about the same time and produces their average:
//! positions are incremental means over tracked joints (inferred joints only
//! when no source tracks that joint), orientations are blended with
//! [`QuaternionAverage`], confidence is the best reported, and a hand is
//! closed when more than the configured fraction of sources tracking it
//! report it closed.

use chrono::{DateTime, Utc};
use nalgebra::{Point3, Vector3};

use crate::skeleton::{
    Confidence, JointType, KinectSkeleton, TrackingState, FUSED_SENSOR_ID, JOINT_SLOTS,
};

use super::filtered::skeleton_tracking_state;
use super::quaternion::QuaternionAverage;

#[derive(Debug, Clone, Copy, Default)]
struct RunningMean {
    mean: Vector3<f64>,
    count: usize,
}

impl RunningMean {
    fn add(&mut self, sample: &Vector3<f64>) {
        self.count += 1;
        self.mean += (sample - self.mean) / self.count as f64;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct JointAccumulator {
    tracked: RunningMean,
    inferred: RunningMean,
    orientation: QuaternionAverage,
    confidence: Confidence,
    latest: Option<DateTime<Utc>>,
    std_dev_sum: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct HandVotes {
    tracked: usize,
    closed: usize,
}

impl HandVotes {
    fn add(&mut self, tracked: bool, closed: bool) {
        if tracked {
            self.tracked += 1;
            if closed {
                self.closed += 1;
            }
        }
    }

    fn is_closed(&self, grab_fraction: f64) -> bool {
        if self.tracked == 0 {
            return false;
        }
        self.closed as f64 / self.tracked as f64 > grab_fraction
    }
}

/// Average of several sensors' observations of one subject.
#[derive(Debug, Clone)]
pub struct MergedSkeleton {
    tracking_id: u64,
    grab_fraction: f64,
    sources: usize,
    joints: [JointAccumulator; JOINT_SLOTS],
    centroid: RunningMean,
    left: HandVotes,
    right: HandVotes,
    captured_at: Option<DateTime<Utc>>,
}

impl MergedSkeleton {
    /// Empty merge producing a skeleton with `tracking_id`
    pub fn new(tracking_id: u64, grab_fraction: f64) -> Self {
        Self {
            tracking_id,
            grab_fraction,
            sources: 0,
            joints: [JointAccumulator::default(); JOINT_SLOTS],
            centroid: RunningMean::default(),
            left: HandVotes::default(),
            right: HandVotes::default(),
            captured_at: None,
        }
    }

    /// Number of observations merged so far
    #[inline]
    pub fn source_count(&self) -> usize {
        self.sources
    }

    /// Merge one observation
    pub fn add(&mut self, observation: &KinectSkeleton) {
        self.sources += 1;

        if matches!(
            observation.tracking_state,
            TrackingState::Tracked | TrackingState::PositionOnly
        ) {
            self.centroid.add(&observation.position.coords);
        }

        for (slot, joint) in observation.skeleton.iter().enumerate() {
            let acc = &mut self.joints[slot];
            match joint.tracking_state {
                TrackingState::Tracked => {
                    acc.tracked.add(&joint.position.coords);
                    acc.orientation.add(&joint.orientation);
                    acc.std_dev_sum += joint.spatial_error_std_dev.max(0.0);
                }
                TrackingState::Inferred => acc.inferred.add(&joint.position.coords),
                _ => continue,
            }
            acc.confidence = acc.confidence.max(joint.confidence);
            let at = observation.joint_time(slot);
            if at > acc.latest {
                acc.latest = at;
            }
        }

        let hand_tracked =
            |jt: JointType| observation.skeleton[jt].tracking_state == TrackingState::Tracked;
        self.left
            .add(hand_tracked(JointType::HandLeft), observation.left_hand_closed);
        self.right
            .add(hand_tracked(JointType::HandRight), observation.right_hand_closed);

        if observation.captured_at > self.captured_at {
            self.captured_at = observation.captured_at;
        }
    }

    /// Whether a hand is considered closed given the votes so far
    pub fn hand_closed(&self) -> (bool, bool) {
        (
            self.left.is_closed(self.grab_fraction),
            self.right.is_closed(self.grab_fraction),
        )
    }

    /// The averaged skeleton
    pub fn to_skeleton(&self) -> KinectSkeleton {
        let (left_closed, right_closed) = self.hand_closed();
        let mut out = KinectSkeleton::new(FUSED_SENSOR_ID, self.tracking_id)
            .with_hands(left_closed, right_closed);
        out.captured_at = self.captured_at;

        for (slot, acc) in self.joints.iter().enumerate() {
            let joint = &mut out.skeleton[slot];
            if acc.tracked.count > 0 {
                joint.position = Point3::from(acc.tracked.mean);
                joint.tracking_state = TrackingState::Tracked;
                joint.spatial_error_std_dev = acc.std_dev_sum
                    / acc.tracked.count as f64
                    / (acc.tracked.count as f64).sqrt();
            } else if acc.inferred.count > 0 {
                joint.position = Point3::from(acc.inferred.mean);
                joint.tracking_state = TrackingState::Inferred;
            } else {
                continue;
            }
            if let Some(q) = acc.orientation.average() {
                joint.orientation = q;
            }
            joint.confidence = acc.confidence;
            joint.observed_at = acc.latest;
        }

        out.tracking_state = skeleton_tracking_state(&out.skeleton);
        out.position = if self.centroid.count > 0 {
            Point3::from(self.centroid.mean)
        } else {
            out.joint_centroid()
        };
        out
    }
}
