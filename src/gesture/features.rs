//! Subject-invariant gesture features
//!
//! A monitored joint's position is expressed relative to the shoulder
//! center, in the joint's own orientation frame, and in units of shoulder
//! width. The same gesture performed by a tall subject far from
//! the sensor and a short subject close to it then yields similar points.

use nalgebra::Point3;

use crate::skeleton::{JointType, KinectSkeleton, TrackingState};

/// Distance between the shoulders when both are tracked
pub fn shoulder_width(frame: &KinectSkeleton) -> Option<f64> {
    let left = &frame.skeleton[JointType::ShoulderLeft];
    let right = &frame.skeleton[JointType::ShoulderRight];
    if left.tracking_state != TrackingState::Tracked
        || right.tracking_state != TrackingState::Tracked
    {
        return None;
    }
    let width = (left.position - right.position).norm();
    (width.is_finite() && width > 0.0).then_some(width)
}

/// Mean shoulder width over the frames of a sequence that track both shoulders
pub fn mean_shoulder_width(sequence: &[KinectSkeleton]) -> Option<f64> {
    let widths: Vec<f64> = sequence.iter().filter_map(shoulder_width).collect();
    if widths.is_empty() {
        return None;
    }
    Some(widths.iter().sum::<f64>() / widths.len() as f64)
}

/// Reference point of the normalisation: the shoulder-center joint, or the
/// midpoint of the shoulders when it carries no position
fn shoulder_center(frame: &KinectSkeleton) -> Option<Point3<f64>> {
    let center = &frame.skeleton[JointType::ShoulderCenter];
    if center.tracking_state.has_position() {
        return Some(center.position);
    }
    let left = &frame.skeleton[JointType::ShoulderLeft];
    let right = &frame.skeleton[JointType::ShoulderRight];
    if left.tracking_state.has_position() && right.tracking_state.has_position() {
        return Some(nalgebra::center(&left.position, &right.position));
    }
    None
}

/// Normalised position of `joint` in `frame`.
///
/// `None` when the joint is not tracked, no shoulder reference exists, or
/// the width is not a positive finite number.
pub fn normalize_joint(
    frame: &KinectSkeleton,
    joint: JointType,
    shoulder_width: f64,
) -> Option<Point3<f64>> {
    if !(shoulder_width.is_finite() && shoulder_width > 0.0) {
        return None;
    }
    let monitored = &frame.skeleton[joint];
    if monitored.tracking_state != TrackingState::Tracked {
        return None;
    }
    let origin = shoulder_center(frame)?;
    let local = monitored
        .orientation
        .inverse_transform_vector(&(monitored.position - origin));
    Some(Point3::from(local / shoulder_width))
}

/// Normalised points of a whole sequence, skipping unusable frames.
///
/// `None` when no frame tracks both shoulders.
pub fn normalize_sequence(sequence: &[KinectSkeleton], joint: JointType) -> Option<Vec<Point3<f64>>> {
    let width = mean_shoulder_width(sequence)?;
    Some(
        sequence
            .iter()
            .filter_map(|frame| normalize_joint(frame, joint, width))
            .collect(),
    )
}
