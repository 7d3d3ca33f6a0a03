//! Joint identifiers and per-joint observations

use chrono::{DateTime, Utc};
use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Number of joint slots in a skeleton.
///
/// Both sensor generations are covered by one table: 25 distinct joints plus
/// three renamed aliases make 28 names, and skeletons reserve one slot per
/// name. The three trailing slots are never addressed by a [`JointType`] and
/// always stay [`TrackingState::NotTracked`].
pub const JOINT_SLOTS: usize = 28;

/// Anatomical joint identifier.
///
/// The discriminant is the joint's slot index in [`SkeletonData`](super::SkeletonData),
/// so a joint cannot be stored under the wrong key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum JointType {
    HipCenter = 0,
    Spine = 1,
    ShoulderCenter = 2,
    Head = 3,
    ShoulderLeft = 4,
    ElbowLeft = 5,
    WristLeft = 6,
    HandLeft = 7,
    ShoulderRight = 8,
    ElbowRight = 9,
    WristRight = 10,
    HandRight = 11,
    HipLeft = 12,
    KneeLeft = 13,
    AnkleLeft = 14,
    FootLeft = 15,
    HipRight = 16,
    KneeRight = 17,
    AnkleRight = 18,
    FootRight = 19,
    HandTipLeft = 20,
    ThumbLeft = 21,
    HandTipRight = 22,
    ThumbRight = 23,
    Neck = 24,
}

impl JointType {
    /// Second-generation name of [`JointType::HipCenter`]
    pub const SPINE_BASE: JointType = JointType::HipCenter;
    /// Second-generation name of [`JointType::Spine`]
    pub const SPINE_MID: JointType = JointType::Spine;
    /// Second-generation name of [`JointType::ShoulderCenter`]
    pub const SPINE_SHOULDER: JointType = JointType::ShoulderCenter;

    /// Number of distinct joint types
    pub const COUNT: usize = 25;

    /// All joint types in slot order
    pub const ALL: [JointType; JointType::COUNT] = [
        JointType::HipCenter,
        JointType::Spine,
        JointType::ShoulderCenter,
        JointType::Head,
        JointType::ShoulderLeft,
        JointType::ElbowLeft,
        JointType::WristLeft,
        JointType::HandLeft,
        JointType::ShoulderRight,
        JointType::ElbowRight,
        JointType::WristRight,
        JointType::HandRight,
        JointType::HipLeft,
        JointType::KneeLeft,
        JointType::AnkleLeft,
        JointType::FootLeft,
        JointType::HipRight,
        JointType::KneeRight,
        JointType::AnkleRight,
        JointType::FootRight,
        JointType::HandTipLeft,
        JointType::ThumbLeft,
        JointType::HandTipRight,
        JointType::ThumbRight,
        JointType::Neck,
    ];

    /// Slot index of this joint
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Joint stored at a slot, `None` for reserved slots
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Parse a joint name, accepting both sensor generations' names
    pub fn from_name(name: &str) -> Option<Self> {
        let joint = match name {
            "HipCenter" | "SpineBase" => JointType::HipCenter,
            "Spine" | "SpineMid" => JointType::Spine,
            "ShoulderCenter" | "SpineShoulder" => JointType::ShoulderCenter,
            "Head" => JointType::Head,
            "ShoulderLeft" => JointType::ShoulderLeft,
            "ElbowLeft" => JointType::ElbowLeft,
            "WristLeft" => JointType::WristLeft,
            "HandLeft" => JointType::HandLeft,
            "ShoulderRight" => JointType::ShoulderRight,
            "ElbowRight" => JointType::ElbowRight,
            "WristRight" => JointType::WristRight,
            "HandRight" => JointType::HandRight,
            "HipLeft" => JointType::HipLeft,
            "KneeLeft" => JointType::KneeLeft,
            "AnkleLeft" => JointType::AnkleLeft,
            "FootLeft" => JointType::FootLeft,
            "HipRight" => JointType::HipRight,
            "KneeRight" => JointType::KneeRight,
            "AnkleRight" => JointType::AnkleRight,
            "FootRight" => JointType::FootRight,
            "HandTipLeft" => JointType::HandTipLeft,
            "ThumbLeft" => JointType::ThumbLeft,
            "HandTipRight" => JointType::HandTipRight,
            "ThumbRight" => JointType::ThumbRight,
            "Neck" => JointType::Neck,
            _ => return None,
        };
        Some(joint)
    }
}

/// Per-joint or per-skeleton tracking quality reported by a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrackingState {
    #[default]
    NotTracked,
    Inferred,
    Tracked,
    PositionOnly,
}

impl TrackingState {
    /// Tracked or inferred: the position carries information
    #[inline]
    pub fn has_position(self) -> bool {
        matches!(
            self,
            TrackingState::Tracked | TrackingState::Inferred | TrackingState::PositionOnly
        )
    }
}

/// Sensor confidence in a joint. Ordered `Unknown < Low < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Confidence {
    #[default]
    Unknown,
    Low,
    High,
}

/// Sensor measurement noise for one position observation.
///
/// Sets the diagonal of the observation-noise matrix for a single
/// integration; axes are assumed uncorrelated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MeasurementNoise {
    /// Same standard deviation on every axis
    Scalar(f64),
    /// Per-axis standard deviations
    PerAxis(Vector3<f64>),
}

impl MeasurementNoise {
    /// Per-axis variances (squared standard deviations)
    #[inline]
    pub fn variances(&self) -> Vector3<f64> {
        match self {
            MeasurementNoise::Scalar(s) => Vector3::repeat(s * s),
            MeasurementNoise::PerAxis(v) => v.component_mul(v),
        }
    }

    /// True when every standard deviation is finite and strictly positive
    pub fn is_valid(&self) -> bool {
        match self {
            MeasurementNoise::Scalar(s) => s.is_finite() && *s > 0.0,
            MeasurementNoise::PerAxis(v) => v.iter().all(|s| s.is_finite() && *s > 0.0),
        }
    }
}

impl From<f64> for MeasurementNoise {
    fn from(std_dev: f64) -> Self {
        MeasurementNoise::Scalar(std_dev)
    }
}

impl From<Vector3<f64>> for MeasurementNoise {
    fn from(std_devs: Vector3<f64>) -> Self {
        MeasurementNoise::PerAxis(std_devs)
    }
}

impl From<[f64; 3]> for MeasurementNoise {
    fn from(std_devs: [f64; 3]) -> Self {
        MeasurementNoise::PerAxis(Vector3::from(std_devs))
    }
}

/// One joint's pose estimate at an instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    /// Position in sensor-native length units
    pub position: Point3<f64>,
    /// Orientation of the bone frame ending at this joint
    pub orientation: UnitQuaternion<f64>,
    /// Tracking quality
    pub tracking_state: TrackingState,
    /// Sensor confidence
    pub confidence: Confidence,
    /// Observation time; `None` when never updated
    pub observed_at: Option<DateTime<Utc>>,
    /// Measurement standard deviation; non-positive means "use the configured default"
    pub spatial_error_std_dev: f64,
}

impl Joint {
    /// A tracked joint observed at `at`
    pub fn tracked(position: Point3<f64>, at: DateTime<Utc>) -> Self {
        Self {
            position,
            tracking_state: TrackingState::Tracked,
            confidence: Confidence::High,
            observed_at: Some(at),
            ..Self::default()
        }
    }

    /// Same joint with a different tracking state
    pub fn with_state(mut self, tracking_state: TrackingState) -> Self {
        self.tracking_state = tracking_state;
        self
    }

    /// Same joint with a measurement standard deviation
    pub fn with_std_dev(mut self, std_dev: f64) -> Self {
        self.spatial_error_std_dev = std_dev;
        self
    }
}

impl Default for Joint {
    fn default() -> Self {
        Self {
            position: Point3::origin(),
            orientation: UnitQuaternion::identity(),
            tracking_state: TrackingState::NotTracked,
            confidence: Confidence::Unknown,
            observed_at: None,
            spatial_error_std_dev: 0.0,
        }
    }
}
