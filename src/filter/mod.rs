//! Kalman filters
//!
//! - [`kalman`] - the constant-model filter core and its [`KalmanModel`] trait
//! - [`joint_motion`] - per-joint constant-jerk position filter
//! - [`constant_value`] - scalar constant-value filter and hand grab smoothing

pub mod constant_value;
pub mod joint_motion;
pub mod kalman;

pub use constant_value::{ConstantValueFilter, HandStateFilter};
pub use joint_motion::{
    ConstantJerkModel, IntegrationOutcome, JointMotionFilter, MotionCovariance, MotionPrediction,
    MotionState,
};
pub use kalman::{KalmanCore, KalmanModel};
