//! Single-sensor skeleton observations

use chrono::{DateTime, Utc};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use super::data::SkeletonData;
use super::joint::{Joint, JointType, TrackingState};

/// Sensor id used on skeletons produced by the fusion engine
pub const FUSED_SENSOR_ID: &str = "fused";

/// One skeleton observed by one sensor at one instant.
///
/// Produced fresh every sensor frame and consumed once by the fusion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinectSkeleton {
    /// Joint observations
    pub skeleton: SkeletonData,
    /// Skeleton centroid
    pub position: Point3<f64>,
    /// Skeleton-level tracking state
    pub tracking_state: TrackingState,
    /// Left hand grab state
    pub left_hand_closed: bool,
    /// Right hand grab state
    pub right_hand_closed: bool,
    /// Sensor that produced the observation
    pub source_sensor_id: String,
    /// Stable per-sensor subject id
    pub tracking_id: u64,
    /// Frame capture time, used for joints without their own timestamp
    pub captured_at: Option<DateTime<Utc>>,
}

impl KinectSkeleton {
    /// Empty, untracked observation from a sensor
    pub fn new(source_sensor_id: impl Into<String>, tracking_id: u64) -> Self {
        Self {
            skeleton: SkeletonData::new(),
            position: Point3::origin(),
            tracking_state: TrackingState::NotTracked,
            left_hand_closed: false,
            right_hand_closed: false,
            source_sensor_id: source_sensor_id.into(),
            tracking_id,
            captured_at: None,
        }
    }

    /// Set a joint, builder style
    pub fn with_joint(mut self, joint_type: JointType, joint: Joint) -> Self {
        self.skeleton.set(joint_type, joint);
        self
    }

    /// Set the skeleton-level tracking state, builder style
    pub fn with_state(mut self, tracking_state: TrackingState) -> Self {
        self.tracking_state = tracking_state;
        self
    }

    /// Set the capture time, builder style
    pub fn with_capture_time(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }

    /// Set both hand grab states, builder style
    pub fn with_hands(mut self, left_closed: bool, right_closed: bool) -> Self {
        self.left_hand_closed = left_closed;
        self.right_hand_closed = right_closed;
        self
    }

    /// Time at which a slot was observed: its own timestamp, else the frame's
    pub fn joint_time(&self, slot: usize) -> Option<DateTime<Utc>> {
        self.skeleton
            .get(slot)
            .and_then(|j| j.observed_at)
            .or(self.captured_at)
    }

    /// Whether the skeleton-level state allows the observation to be fused
    #[inline]
    pub fn is_usable(&self) -> bool {
        matches!(
            self.tracking_state,
            TrackingState::Tracked | TrackingState::Inferred
        )
    }

    /// Mean of all joints that carry a position, or the origin
    pub fn joint_centroid(&self) -> Point3<f64> {
        let mut sum = nalgebra::Vector3::zeros();
        let mut count = 0usize;
        for joint in self.skeleton.iter() {
            if joint.tracking_state.has_position() {
                sum += joint.position.coords;
                count += 1;
            }
        }
        if count == 0 {
            return Point3::origin();
        }
        Point3::from(sum / count as f64)
    }
}
