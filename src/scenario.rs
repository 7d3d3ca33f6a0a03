//! Synthetic multi-sensor scenarios
//!
//! Generates standing and walking subjects seen by several sensors with
//! Gaussian joint noise, for the `fusion_sim` binary, benchmarks and
//! integration tests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nalgebra::{Point3, Vector3};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::common::time::{millis_between, Clock, ManualClock};
use crate::config::{KinectV2Settings, SensorPose, SensorSettings};
use crate::fusion::{MergeOutcome, SkeletonFusionEngine};
use crate::skeleton::{Joint, JointType, KinectSkeleton, TrackingState};

/// Joint offsets from the hip center of an upright subject facing the sensor
#[rustfmt::skip]
pub const STANDING_POSE: [(JointType, [f64; 3]); 20] = [
    (JointType::HipCenter,      [ 0.00, 0.00, 0.00]),
    (JointType::Spine,          [ 0.00, 0.25, 0.00]),
    (JointType::ShoulderCenter, [ 0.00, 0.50, 0.00]),
    (JointType::Head,           [ 0.00, 0.70, 0.00]),
    (JointType::ShoulderLeft,   [-0.20, 0.45, 0.00]),
    (JointType::ElbowLeft,      [-0.25, 0.20, 0.00]),
    (JointType::WristLeft,      [-0.27, 0.00, 0.02]),
    (JointType::HandLeft,       [-0.28, -0.08, 0.03]),
    (JointType::ShoulderRight,  [ 0.20, 0.45, 0.00]),
    (JointType::ElbowRight,     [ 0.25, 0.20, 0.00]),
    (JointType::WristRight,     [ 0.27, 0.00, 0.02]),
    (JointType::HandRight,      [ 0.28, -0.08, 0.03]),
    (JointType::HipLeft,        [-0.10, -0.05, 0.00]),
    (JointType::KneeLeft,       [-0.11, -0.45, 0.02]),
    (JointType::AnkleLeft,      [-0.11, -0.85, 0.00]),
    (JointType::FootLeft,       [-0.11, -0.90, -0.08]),
    (JointType::HipRight,       [ 0.10, -0.05, 0.00]),
    (JointType::KneeRight,      [ 0.11, -0.45, 0.02]),
    (JointType::AnkleRight,     [ 0.11, -0.85, 0.00]),
    (JointType::FootRight,      [ 0.11, -0.90, -0.08]),
];

/// Noise-free upright skeleton with its hip center at `root`, all joints tracked
pub fn standing_skeleton(
    sensor_id: &str,
    tracking_id: u64,
    root: Point3<f64>,
    at: DateTime<Utc>,
) -> KinectSkeleton {
    let mut skeleton = KinectSkeleton::new(sensor_id, tracking_id)
        .with_state(TrackingState::Tracked)
        .with_capture_time(at);
    for (joint_type, offset) in STANDING_POSE {
        skeleton = skeleton.with_joint(joint_type, Joint::tracked(root + Vector3::from(offset), at));
    }
    skeleton.position = root + Vector3::new(0.0, 0.25, 0.0);
    skeleton
}

/// Subject swaying on an ellipse around a fixed point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkingSubject {
    /// Hip center at t = 0
    pub origin: [f64; 3],
    /// Sway amplitude in x and z
    pub amplitude: f64,
    /// Angular rate in radians per second
    pub angular_rate: f64,
}

impl WalkingSubject {
    /// Hip center `t` seconds into the scenario
    pub fn root_at(&self, t: f64) -> Point3<f64> {
        let phase = self.angular_rate * t;
        Point3::new(
            self.origin[0] + self.amplitude * phase.sin(),
            self.origin[1],
            self.origin[2] + self.amplitude * (1.0 - phase.cos()),
        )
    }
}

/// What one sensor reports for a world-frame skeleton.
///
/// Joints are moved into the sensor frame and perturbed with `noise`; the
/// measurement standard deviation is left unset so the sensor's default is
/// applied when the view is brought back into the world frame.
pub fn sensor_view<R: Rng + ?Sized>(
    sensor: &SensorSettings,
    world: &KinectSkeleton,
    noise: &Normal<f64>,
    rng: &mut R,
) -> KinectSkeleton {
    let pose = sensor.pose();
    let inverse = pose.rotation().inverse();
    let translation = Vector3::from(pose.translation);
    let mut view = world.clone();
    for slot in 0..view.skeleton.len() {
        let joint = &mut view.skeleton[slot];
        if !joint.tracking_state.has_position() {
            continue;
        }
        let jitter = Vector3::new(noise.sample(rng), noise.sample(rng), noise.sample(rng));
        joint.position = Point3::from(inverse * (joint.position - translation)) + jitter;
        joint.spatial_error_std_dev = 0.0;
    }
    view.position = Point3::from(inverse * (view.position - translation));
    view.source_sensor_id = sensor.id().to_string();
    view
}

/// Scenario parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Subjects in the scene
    pub subjects: Vec<WalkingSubject>,
    /// Sensors observing every subject
    pub sensors: Vec<SensorSettings>,
    /// Frames to simulate
    pub frames: usize,
    /// Time between frames in milliseconds
    pub frame_ms: i64,
    /// Standard deviation of the joint noise
    pub noise_std_dev: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        let sensor = |id: &str, x: f64, yaw: f64| {
            SensorSettings::KinectV2(KinectV2Settings {
                id: id.to_string(),
                joint_std_dev: 0.01,
                pose: SensorPose {
                    translation: [x, 0.0, 0.0],
                    yaw_degrees: yaw,
                    ..SensorPose::default()
                },
            })
        };
        Self {
            subjects: vec![
                WalkingSubject {
                    origin: [-0.8, 0.9, 2.5],
                    amplitude: 0.3,
                    angular_rate: 0.8,
                },
                WalkingSubject {
                    origin: [0.9, 0.9, 3.0],
                    amplitude: 0.2,
                    angular_rate: 1.1,
                },
            ],
            sensors: vec![sensor("k2-left", -0.5, 10.0), sensor("k2-right", 0.5, -10.0)],
            frames: 150,
            frame_ms: 33,
            noise_std_dev: 0.01,
        }
    }
}

/// Outcome of a scenario run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Frames simulated
    pub frames: usize,
    /// Observations merged
    pub observations: usize,
    /// Observations routed to an existing subject
    pub matched: usize,
    /// Subjects created
    pub created: usize,
    /// Creations refused by the subject list
    pub rejected: usize,
    /// Subjects alive at the end
    pub final_subjects: usize,
    /// Mean distance between each fused head and the nearest true head
    pub mean_head_error: f64,
    /// Simulated duration in milliseconds
    pub duration_ms: f64,
}

impl ScenarioReport {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Serialize to pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Run a scenario through `engine`, advancing `clock` one frame at a time.
///
/// Returns `None` when the noise standard deviation is not a valid
/// normal-distribution parameter.
pub fn run_scenario<R: Rng + ?Sized>(
    engine: &SkeletonFusionEngine,
    clock: &Arc<ManualClock>,
    config: &ScenarioConfig,
    rng: &mut R,
) -> Option<ScenarioReport> {
    let noise = Normal::new(0.0, config.noise_std_dev).ok()?;
    let start = clock.now();
    let mut report = ScenarioReport {
        frames: config.frames,
        observations: 0,
        matched: 0,
        created: 0,
        rejected: 0,
        final_subjects: 0,
        mean_head_error: 0.0,
        duration_ms: 0.0,
    };

    let mut errors = Vec::new();
    for frame in 0..config.frames {
        clock.advance_ms(config.frame_ms);
        let now = clock.now();
        let t = millis_between(now, start) / 1000.0;

        let truths: Vec<KinectSkeleton> = config
            .subjects
            .iter()
            .enumerate()
            .map(|(i, s)| standing_skeleton("truth", i as u64, s.root_at(t), now))
            .collect();

        for sensor in &config.sensors {
            for truth in &truths {
                let mut view = sensor_view(sensor, truth, &noise, rng);
                sensor.to_world(&mut view);
                report.observations += 1;
                match engine.merge_skeleton(&view) {
                    MergeOutcome::Matched { .. } => report.matched += 1,
                    MergeOutcome::Created { .. } => report.created += 1,
                    MergeOutcome::Rejected(_) => report.rejected += 1,
                    MergeOutcome::Ignored => {}
                }
            }
        }

        // Skip the filters' settling period
        if frame * 2 < config.frames {
            continue;
        }
        for fused in engine.get_all_predicted_skeletons(0.0) {
            let head = fused.skeleton[JointType::Head].position;
            let nearest = truths
                .iter()
                .map(|truth| (truth.skeleton[JointType::Head].position - head).norm())
                .fold(f64::INFINITY, f64::min);
            errors.push(nearest);
        }
    }

    let end = clock.now();
    report.duration_ms = millis_between(end, start);
    report.final_subjects = engine.len();
    if !errors.is_empty() {
        report.mean_head_error = errors.iter().sum::<f64>() / errors.len() as f64;
    }
    Some(report)
}
