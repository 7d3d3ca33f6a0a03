//! Skeleton data model
//!
//! - [`joint`] - joint identifiers, tracking states, per-joint observations
//! - [`data`] - the fixed-size [`SkeletonData`] joint container
//! - [`observation`] - [`KinectSkeleton`], one sensor's view of one subject

pub mod data;
pub mod joint;
pub mod observation;

pub use data::SkeletonData;
pub use joint::{Confidence, Joint, JointType, MeasurementNoise, TrackingState, JOINT_SLOTS};
pub use observation::{KinectSkeleton, FUSED_SENSOR_ID};
