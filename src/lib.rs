/*!
# Multi-sensor skeleton fusion

Fuses skeletal-tracking observations from several motion sensors into one
smoothed skeleton per subject, and recognises gestures on the fused stream.

## Features

- Per-joint constant-jerk Kalman filtering with prediction to any horizon
- Subject correspondence across sensors, averaging fusion of concurrent views
  and quaternion averaging of joint orientations
- Hand grab-state smoothing with a scalar constant-value filter
- Discrete HMM gesture recognition with k-means quantisation

## Modules

- [`skeleton`] - joints, tracking states and per-sensor observations
- [`filter`] - Kalman filters (joint motion, constant value, hand state)
- [`fusion`] - correspondence, subject lifecycle and averaging fusion
- [`gesture`] - HMM, k-means and the streaming gesture recognizer
- [`publisher`] - background thread pushing predictions downstream
- [`reporter`] - observability hooks for fusion decisions
- [`config`] - serde-backed configuration
- [`scenario`] - synthetic subjects and sensors for simulation and benchmarks
- [`common`] - linear algebra, RNG and time utilities

## Example

```rust
use multisensor_skeleton_fusion_rs::{
    FusionConfig, Joint, JointType, KinectSkeleton, MergeOutcome, SkeletonFusionEngine,
    TrackingState,
};
use chrono::Utc;
use nalgebra::Point3;

let engine = SkeletonFusionEngine::new(FusionConfig::default()).expect("default configuration");

let now = Utc::now();
let observation = KinectSkeleton::new("kinect-1", 7)
    .with_state(TrackingState::Tracked)
    .with_capture_time(now)
    .with_joint(JointType::Head, Joint::tracked(Point3::new(0.0, 1.6, 2.0), now));

assert!(matches!(engine.merge_skeleton(&observation), MergeOutcome::Created { .. }));
let fused = engine.get_all_predicted_skeletons(0.0);
assert_eq!(fused.len(), 1);
```
*/

// ============================================================================
// Core modules
// ============================================================================

/// Low-level utilities (linear algebra, RNG, clocks)
pub mod common;

/// Configuration surface
pub mod config;

/// Error types
pub mod errors;

/// Kalman filters
pub mod filter;

/// Multi-sensor skeleton fusion
pub mod fusion;

/// Gesture recognition
pub mod gesture;

/// Periodic publication of fused skeletons
pub mod publisher;

/// Observability hooks
pub mod reporter;

/// Synthetic multi-sensor scenarios
pub mod scenario;

/// Skeleton data model
pub mod skeleton;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// Data model
pub use skeleton::{
    Confidence, Joint, JointType, KinectSkeleton, MeasurementNoise, SkeletonData, TrackingState,
    FUSED_SENSOR_ID, JOINT_SLOTS,
};

// Configuration
pub use config::{
    FusionConfig, GestureConfig, HandStateConfig, MotionModelConfig, SensorSettings, SystemConfig,
    TrainingOptions,
};

// Errors
pub use errors::{CollectionError, ConfigError, GestureError, HmmError, WorkerError};

// Time
pub use common::time::{Clock, ManualClock, SystemClock};

// Filters
pub use filter::{ConstantValueFilter, HandStateFilter, JointMotionFilter, KalmanModel};

// Fusion
pub use fusion::{
    FilteredSkeleton, MergeOutcome, MergedSkeleton, QuaternionAverage, ScanCollection,
    SkeletonFusionEngine,
};

// Gesture
pub use gesture::{DiscreteHmm, GestureModel, GestureRecognizer, Topology, TrainingSummary};

// Publishing and observability
pub use publisher::{PredictionPublisher, PublisherConfig, PublisherTask, SkeletonSink};
pub use reporter::{FusionReporter, LoggingReporter, NoOpReporter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
