//! Multi-sensor skeleton fusion
//!
//! - [`engine`] - correspondence, subject lifecycle and prediction
//! - [`filtered`] - one tracked subject as a bank of joint filters
//! - [`merged`] - averaging of concurrent same-subject observations
//! - [`collection`] - subject list with scan-deferred mutation
//! - [`orientation`] - joint orientations rebuilt from positions
//! - [`quaternion`] - running quaternion average

pub mod collection;
pub mod engine;
pub mod filtered;
pub mod merged;
pub mod orientation;
pub mod quaternion;

pub use collection::{Scan, ScanCollection};
pub use engine::{MergeOutcome, SkeletonFusionEngine};
pub use filtered::{derive_tracking_state, skeleton_tracking_state, FilteredSkeleton};
pub use merged::MergedSkeleton;
pub use orientation::{reconstruct_orientations, rotation_to_quaternion};
pub use quaternion::QuaternionAverage;
