//! Configuration types
//!
//! Every tunable constant of the fusion engine, the filters and the gesture
//! recognizer lives here with its nominal default. All types are serde
//! structs so an embedding application can load them from JSON.
//!
//! Sensor-specific settings are a tagged union ([`SensorSettings`]) selected
//! once when the configuration is loaded.

use std::collections::BTreeMap;
use std::path::Path;

use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::skeleton::{JointType, KinectSkeleton};

/// Constant-jerk motion model parameters for the per-joint filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionModelConfig {
    /// Jerk variance per axis (expected human-motion magnitude)
    pub jerk_variance: [f64; 3],
    /// Initial position variance before the first measurement
    pub initial_position_variance: f64,
    /// Initial velocity variance
    pub initial_velocity_variance: f64,
    /// Initial acceleration variance
    pub initial_acceleration_variance: f64,
}

impl Default for MotionModelConfig {
    fn default() -> Self {
        Self {
            jerk_variance: [1.0, 1.0, 1.0],
            initial_position_variance: 1.0,
            initial_velocity_variance: 1.0,
            initial_acceleration_variance: 1.0,
        }
    }
}

impl MotionModelConfig {
    /// Check that all variances are finite and positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = self.jerk_variance.iter().chain([
            &self.initial_position_variance,
            &self.initial_velocity_variance,
            &self.initial_acceleration_variance,
        ]);
        for v in all {
            if !(v.is_finite() && *v > 0.0) {
                return Err(ConfigError::invalid(format!(
                    "motion model variances must be finite and positive, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Hand grab-state smoothing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandStateConfig {
    /// Variance of a single boolean grab sample
    pub measurement_variance: f64,
    /// Process noise added per millisecond since the last sample
    pub process_noise_per_ms: f64,
    /// Variance of the estimate before the first sample
    pub initial_variance: f64,
    /// Fraction of tracked reports that must say "closed" when averaging sensors
    pub grab_fraction: f64,
}

impl Default for HandStateConfig {
    fn default() -> Self {
        Self {
            measurement_variance: 0.25,
            process_noise_per_ms: 0.001,
            initial_variance: 1.0,
            grab_fraction: 0.45,
        }
    }
}

/// Fusion engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Subjects without a tracked update for longer than this are evicted
    pub staleness_timeout_ms: u64,
    /// Maximum mean joint offset for an observation to match a subject
    pub correspondence_threshold: f64,
    /// Age up to which a joint may still be reported as tracked
    pub tracked_age_ms: u64,
    /// Log covariance norm below which a fresh joint is tracked
    pub tracked_log_norm: f64,
    /// Log covariance norm below which a joint is inferred
    pub inferred_log_norm: f64,
    /// Bound on mutations queued behind an active scan
    pub max_pending_mutations: usize,
    /// Measurement standard deviation used when a joint carries none
    pub default_joint_std_dev: f64,
    /// Per-joint overrides of `default_joint_std_dev`
    pub joint_std_dev_overrides: BTreeMap<JointType, f64>,
    /// Per-joint motion model
    pub motion: MotionModelConfig,
    /// Hand grab-state model
    pub hand: HandStateConfig,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            staleness_timeout_ms: 5000,
            correspondence_threshold: 0.3,
            tracked_age_ms: 1000,
            tracked_log_norm: 0.75,
            inferred_log_norm: 2.0,
            max_pending_mutations: 256,
            default_joint_std_dev: 0.01,
            joint_std_dev_overrides: BTreeMap::new(),
            motion: MotionModelConfig::default(),
            hand: HandStateConfig::default(),
        }
    }
}

impl FusionConfig {
    /// Default measurement standard deviation for a joint slot
    pub fn default_std_dev_for(&self, slot: usize) -> f64 {
        JointType::from_index(slot)
            .and_then(|jt| self.joint_std_dev_overrides.get(&jt).copied())
            .unwrap_or(self.default_joint_std_dev)
    }

    /// Semantic validation
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.correspondence_threshold.is_finite() && self.correspondence_threshold > 0.0) {
            return Err(ConfigError::invalid(
                "correspondence_threshold must be finite and positive",
            ));
        }
        if self.staleness_timeout_ms == 0 {
            return Err(ConfigError::invalid("staleness_timeout_ms must be positive"));
        }
        if self.tracked_log_norm > self.inferred_log_norm {
            return Err(ConfigError::invalid(
                "tracked_log_norm must not exceed inferred_log_norm",
            ));
        }
        if self.max_pending_mutations == 0 {
            return Err(ConfigError::invalid("max_pending_mutations must be positive"));
        }
        let std_devs = std::iter::once(&self.default_joint_std_dev)
            .chain(self.joint_std_dev_overrides.values());
        for s in std_devs {
            if !(s.is_finite() && *s > 0.0) {
                return Err(ConfigError::invalid(format!(
                    "joint standard deviations must be finite and positive, got {s}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.hand.grab_fraction) {
            return Err(ConfigError::invalid("hand.grab_fraction must lie in [0, 1]"));
        }
        self.motion.validate()
    }
}

/// Baum-Welch training options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingOptions {
    /// Maximum number of re-estimation iterations
    pub max_iterations: usize,
    /// Minimum log-likelihood improvement to keep iterating
    pub tolerance: f64,
    /// Lower bound applied to every emission probability after re-estimation
    pub emission_floor: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            emission_floor: 0.0,
        }
    }
}

/// Gesture recognizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Number of k-means clusters (HMM symbol alphabet size)
    pub alphabet_size: usize,
    /// Number of left-to-right HMM states
    pub state_count: usize,
    /// Threshold = multiplier × mean training log-likelihood
    pub threshold_multiplier: f64,
    /// Safety cap on k-means iterations
    pub kmeans_max_iterations: usize,
    /// Baum-Welch options
    pub training: TrainingOptions,
    /// Measurement variance of the streaming shoulder-width filter
    pub shoulder_measurement_variance: f64,
    /// Process variance per frame of the streaming shoulder-width filter
    pub shoulder_process_variance: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            alphabet_size: 8,
            state_count: 4,
            threshold_multiplier: 2.0,
            kmeans_max_iterations: 100,
            training: TrainingOptions {
                emission_floor: 1e-3,
                ..TrainingOptions::default()
            },
            shoulder_measurement_variance: 1e-3,
            shoulder_process_variance: 1e-5,
        }
    }
}

impl GestureConfig {
    /// Semantic validation
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alphabet_size < 2 {
            return Err(ConfigError::invalid("alphabet_size must be at least 2"));
        }
        if self.state_count == 0 {
            return Err(ConfigError::invalid("state_count must be positive"));
        }
        if !(self.threshold_multiplier.is_finite() && self.threshold_multiplier > 0.0) {
            return Err(ConfigError::invalid(
                "threshold_multiplier must be finite and positive",
            ));
        }
        if self.kmeans_max_iterations == 0 {
            return Err(ConfigError::invalid("kmeans_max_iterations must be positive"));
        }
        if !(0.0..1.0).contains(&self.training.emission_floor)
            || self.training.emission_floor * self.alphabet_size as f64 >= 1.0
        {
            return Err(ConfigError::invalid(
                "training.emission_floor must leave room for a stochastic emission row",
            ));
        }
        Ok(())
    }
}

/// Placement of a sensor in the shared world frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorPose {
    /// Sensor origin in world coordinates
    pub translation: [f64; 3],
    /// Rotation about the vertical axis, degrees
    pub yaw_degrees: f64,
    /// Rotation about the lateral axis, degrees
    pub pitch_degrees: f64,
    /// Rotation about the viewing axis, degrees
    pub roll_degrees: f64,
}

impl Default for SensorPose {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            yaw_degrees: 0.0,
            pitch_degrees: 0.0,
            roll_degrees: 0.0,
        }
    }
}

impl SensorPose {
    /// Rotation taking sensor coordinates into world coordinates
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(
            self.pitch_degrees.to_radians(),
            self.yaw_degrees.to_radians(),
            self.roll_degrees.to_radians(),
        )
    }

    /// Transform a point from sensor to world coordinates
    pub fn to_world(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation() * p + Vector3::from(self.translation)
    }
}

/// First-generation depth camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinectV1Settings {
    /// Sensor id stamped on observations
    pub id: String,
    /// Joint measurement standard deviation
    #[serde(default = "KinectV1Settings::default_std_dev")]
    pub joint_std_dev: f64,
    /// Upper-body-only tracking
    #[serde(default)]
    pub seated_mode: bool,
    /// Sensor placement
    #[serde(default)]
    pub pose: SensorPose,
}

impl KinectV1Settings {
    fn default_std_dev() -> f64 {
        0.02
    }
}

/// Second-generation depth camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinectV2Settings {
    /// Sensor id stamped on observations
    pub id: String,
    /// Joint measurement standard deviation
    #[serde(default = "KinectV2Settings::default_std_dev")]
    pub joint_std_dev: f64,
    /// Sensor placement
    #[serde(default)]
    pub pose: SensorPose,
}

impl KinectV2Settings {
    fn default_std_dev() -> f64 {
        0.01
    }
}

/// Remote skeleton source reached over the tracking network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSensorSettings {
    /// Sensor id stamped on observations
    pub id: String,
    /// Remote tracker name on the bus
    pub server_name: String,
    /// Joint measurement standard deviation (remote sources cannot estimate it)
    #[serde(default = "NetworkSensorSettings::default_std_dev")]
    pub joint_std_dev: f64,
    /// Sensor placement
    #[serde(default)]
    pub pose: SensorPose,
}

impl NetworkSensorSettings {
    fn default_std_dev() -> f64 {
        0.05
    }
}

/// Sensor-kind specific settings, chosen when the configuration is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorSettings {
    KinectV1(KinectV1Settings),
    KinectV2(KinectV2Settings),
    Network(NetworkSensorSettings),
}

impl SensorSettings {
    /// Sensor id
    pub fn id(&self) -> &str {
        match self {
            SensorSettings::KinectV1(s) => &s.id,
            SensorSettings::KinectV2(s) => &s.id,
            SensorSettings::Network(s) => &s.id,
        }
    }

    /// Default joint measurement standard deviation of this sensor
    pub fn joint_std_dev(&self) -> f64 {
        match self {
            SensorSettings::KinectV1(s) => s.joint_std_dev,
            SensorSettings::KinectV2(s) => s.joint_std_dev,
            SensorSettings::Network(s) => s.joint_std_dev,
        }
    }

    /// Sensor placement
    pub fn pose(&self) -> &SensorPose {
        match self {
            SensorSettings::KinectV1(s) => &s.pose,
            SensorSettings::KinectV2(s) => &s.pose,
            SensorSettings::Network(s) => &s.pose,
        }
    }

    /// Bring a raw observation into the world frame.
    ///
    /// Rotates and translates every joint and the centroid, rotates joint
    /// orientations, stamps the sensor id and fills in the sensor's noise
    /// estimate on joints that carry none.
    pub fn to_world(&self, observation: &mut KinectSkeleton) {
        let pose = self.pose();
        let rotation = pose.rotation();
        let std_dev = self.joint_std_dev();

        for slot in 0..observation.skeleton.len() {
            let joint = &mut observation.skeleton[slot];
            joint.position = pose.to_world(&joint.position);
            joint.orientation = rotation * joint.orientation;
            if !(joint.spatial_error_std_dev.is_finite() && joint.spatial_error_std_dev > 0.0) {
                joint.spatial_error_std_dev = std_dev;
            }
        }
        observation.position = pose.to_world(&observation.position);
        observation.source_sensor_id = self.id().to_string();
    }

    /// Semantic validation
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id().is_empty() {
            return Err(ConfigError::invalid("sensor id must not be empty"));
        }
        let s = self.joint_std_dev();
        if !(s.is_finite() && s > 0.0) {
            return Err(ConfigError::invalid(format!(
                "sensor '{}' joint_std_dev must be finite and positive",
                self.id()
            )));
        }
        Ok(())
    }
}

/// Complete configuration consumed by the library
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Fusion engine
    pub fusion: FusionConfig,
    /// Gesture recognizer
    pub gesture: GestureConfig,
    /// Configured sensors
    pub sensors: Vec<SensorSettings>,
}

impl SystemConfig {
    /// Parse and validate from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Semantic validation of every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fusion.validate()?;
        self.gesture.validate()?;
        let mut seen = std::collections::HashSet::new();
        for sensor in &self.sensors {
            sensor.validate()?;
            if !seen.insert(sensor.id()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate sensor id '{}'",
                    sensor.id()
                )));
            }
        }
        Ok(())
    }

    /// Look up a sensor by id
    pub fn sensor(&self, id: &str) -> Option<&SensorSettings> {
        self.sensors.iter().find(|s| s.id() == id)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Serialize to pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{Joint, JointType};
    use chrono::{DateTime, Utc};

    #[test]
    fn test_defaults_are_valid() {
        let config = SystemConfig::default();
        config.validate().unwrap();
        assert_eq!(config.fusion.staleness_timeout_ms, 5000);
        assert!((config.fusion.correspondence_threshold - 0.3).abs() < 1e-12);
        assert!((config.fusion.hand.grab_fraction - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_json_round_trip_with_sensor_variants() {
        let json = r#"{
            "fusion": { "correspondence_threshold": 0.25,
                        "joint_std_dev_overrides": { "HandLeft": 0.03 } },
            "sensors": [
                { "kind": "kinect_v1", "id": "front", "seated_mode": true },
                { "kind": "network", "id": "remote", "server_name": "Tracker0@host" }
            ]
        }"#;
        let config = SystemConfig::from_json_str(json).unwrap();
        assert!((config.fusion.correspondence_threshold - 0.25).abs() < 1e-12);
        assert_eq!(config.fusion.staleness_timeout_ms, 5000);
        assert!((config.fusion.default_std_dev_for(JointType::HandLeft.index()) - 0.03).abs() < 1e-12);
        assert!((config.fusion.default_std_dev_for(JointType::Head.index()) - 0.01).abs() < 1e-12);

        match config.sensor("front") {
            Some(SensorSettings::KinectV1(s)) => {
                assert!(s.seated_mode);
                assert!((s.joint_std_dev - 0.02).abs() < 1e-12);
            }
            other => panic!("unexpected sensor settings: {:?}", other),
        }
        assert!((config.sensor("remote").unwrap().joint_std_dev() - 0.05).abs() < 1e-12);

        let reparsed = SystemConfig::from_json_str(&config.to_json()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let err = SystemConfig::from_json_str(r#"{"fusion": {"correspondence_threshold": -1.0}}"#);
        assert!(matches!(err, Err(ConfigError::Invalid { .. })));

        let err = SystemConfig::from_json_str(
            r#"{"sensors": [{"kind": "kinect_v2", "id": "a"}, {"kind": "kinect_v2", "id": "a"}]}"#,
        );
        assert!(matches!(err, Err(ConfigError::Invalid { .. })));

        let err = SystemConfig::from_json_str("not json");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_sensor_pose_transform() {
        let sensor = SensorSettings::KinectV2(KinectV2Settings {
            id: "side".into(),
            joint_std_dev: 0.01,
            pose: SensorPose {
                translation: [1.0, 0.0, 0.0],
                yaw_degrees: 90.0,
                ..SensorPose::default()
            },
        });
        let t = DateTime::<Utc>::UNIX_EPOCH;
        let mut obs = KinectSkeleton::new("raw", 3)
            .with_joint(JointType::Head, Joint::tracked(Point3::new(0.0, 0.0, 1.0), t));
        sensor.to_world(&mut obs);

        // 90° about +y maps +z to +x
        let head = obs.skeleton[JointType::Head];
        assert!((head.position - Point3::new(2.0, 0.0, 0.0)).norm() < 1e-9);
        assert!((head.spatial_error_std_dev - 0.01).abs() < 1e-12);
        assert_eq!(obs.source_sensor_id, "side");
    }

    #[test]
    fn test_load_from_file() {
        let mut config = SystemConfig::default();
        config.fusion.staleness_timeout_ms = 2500;
        config.gesture.alphabet_size = 6;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fusion.json");
        std::fs::write(&path, config.to_json_pretty()).unwrap();

        let loaded = SystemConfig::from_path(&path).unwrap();
        assert_eq!(loaded, config);

        let missing = SystemConfig::from_path(dir.path().join("absent.json"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
