//! Observability for the fusion engine.
//!
//! The [`FusionReporter`] trait receives callbacks at the decision points of
//! [`SkeletonFusionEngine`](crate::fusion::SkeletonFusionEngine) without
//! cluttering the correspondence logic.
//!
//! # Zero-Cost Default
//!
//! [`NoOpReporter`] has only empty callbacks and is what the engine uses
//! unless told otherwise.
//!
//! # Use Cases
//!
//! - **Tests**: [`DebugReporter`] records every event for later assertions
//! - **Logging**: [`LoggingReporter`] forwards events to the `log` facade
//! - **Both**: [`CompositeReporter`] fans events out to two reporters
//!
//! # Example
//!
//! ```
//! use multisensor_skeleton_fusion_rs::reporter::{DebugReporter, FusionReporter};
//!
//! let reporter = DebugReporter::new();
//! reporter.on_subject_created(4);
//! assert_eq!(reporter.created(), vec![4]);
//! ```

use parking_lot::Mutex;

use crate::errors::CollectionError;
use crate::skeleton::KinectSkeleton;

// ============================================================================
// FusionReporter Trait
// ============================================================================

/// Observability trait for fusion engine decisions.
///
/// All methods have default empty implementations, so an implementation
/// only overrides the events it cares about.
///
/// # Thread Safety
///
/// The engine is shared between sensor threads and publisher threads, so
/// callbacks take `&self` and reporters must be `Send + Sync`. Reporters
/// that record events use interior mutability.
pub trait FusionReporter: Send + Sync {
    /// An observation was dropped because its skeleton-level state is unusable
    fn on_observation_ignored(&self, _observation: &KinectSkeleton) {}

    /// An observation was routed to an existing subject
    fn on_correspondence(&self, _subject_id: u64, _score: f64) {}

    /// A new subject was allocated
    fn on_subject_created(&self, _subject_id: u64) {}

    /// A stale subject was scheduled for removal
    fn on_subject_evicted(&self, _subject_id: u64, _age_ms: f64) {}

    /// Predicted skeletons were produced
    fn on_prediction(&self, _skeletons: &[KinectSkeleton]) {}

    /// A collection mutation was refused
    fn on_mutation_rejected(&self, _error: &CollectionError) {}
}

// ============================================================================
// NoOpReporter
// ============================================================================

/// Reporter that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReporter;

impl NoOpReporter {
    /// Create a new no-op reporter.
    pub fn new() -> Self {
        Self
    }
}

impl FusionReporter for NoOpReporter {}

// ============================================================================
// DebugReporter
// ============================================================================

/// One recorded engine event
#[derive(Debug, Clone, PartialEq)]
pub enum FusionEvent {
    /// Observation ignored (sensor id, tracking id)
    ObservationIgnored {
        /// Reporting sensor
        sensor_id: String,
        /// Sensor-local subject id
        tracking_id: u64,
    },
    /// Observation matched a subject
    Correspondence {
        /// Matched subject
        subject_id: u64,
        /// Correspondence distance
        score: f64,
    },
    /// Subject allocated
    SubjectCreated {
        /// New subject
        subject_id: u64,
    },
    /// Subject evicted
    SubjectEvicted {
        /// Evicted subject
        subject_id: u64,
        /// Age at eviction
        age_ms: f64,
    },
    /// Prediction produced
    Prediction {
        /// Number of predicted skeletons
        count: usize,
    },
    /// Mutation refused
    MutationRejected(CollectionError),
}

/// Reporter that records every event for post-hoc inspection.
///
/// Stores events without bound; intended for tests and short research runs.
#[derive(Debug, Default)]
pub struct DebugReporter {
    events: Mutex<Vec<FusionEvent>>,
}

impl DebugReporter {
    /// Create a new debug reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all recorded events, oldest first
    pub fn events(&self) -> Vec<FusionEvent> {
        self.events.lock().clone()
    }

    /// Clear all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Ids of created subjects, in order
    pub fn created(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                FusionEvent::SubjectCreated { subject_id } => Some(*subject_id),
                _ => None,
            })
            .collect()
    }

    /// Ids of evicted subjects, in order
    pub fn evicted(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                FusionEvent::SubjectEvicted { subject_id, .. } => Some(*subject_id),
                _ => None,
            })
            .collect()
    }

    /// Total number of recorded events
    pub fn total_events(&self) -> usize {
        self.events.lock().len()
    }

    fn push(&self, event: FusionEvent) {
        self.events.lock().push(event);
    }
}

impl FusionReporter for DebugReporter {
    fn on_observation_ignored(&self, observation: &KinectSkeleton) {
        self.push(FusionEvent::ObservationIgnored {
            sensor_id: observation.source_sensor_id.clone(),
            tracking_id: observation.tracking_id,
        });
    }

    fn on_correspondence(&self, subject_id: u64, score: f64) {
        self.push(FusionEvent::Correspondence { subject_id, score });
    }

    fn on_subject_created(&self, subject_id: u64) {
        self.push(FusionEvent::SubjectCreated { subject_id });
    }

    fn on_subject_evicted(&self, subject_id: u64, age_ms: f64) {
        self.push(FusionEvent::SubjectEvicted { subject_id, age_ms });
    }

    fn on_prediction(&self, skeletons: &[KinectSkeleton]) {
        self.push(FusionEvent::Prediction {
            count: skeletons.len(),
        });
    }

    fn on_mutation_rejected(&self, error: &CollectionError) {
        self.push(FusionEvent::MutationRejected(*error));
    }
}

// ============================================================================
// LoggingReporter
// ============================================================================

/// Reporter that forwards events to the `log` facade.
///
/// # Log Levels
///
/// - `on_subject_created`, `on_subject_evicted`: INFO
/// - `on_correspondence`, `on_observation_ignored`: DEBUG
/// - `on_prediction`: TRACE
/// - `on_mutation_rejected`: WARN
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReporter {
    /// Whether to log per-skeleton detail on prediction
    verbose: bool,
}

impl LoggingReporter {
    /// Create a new logging reporter.
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Create a verbose logging reporter that includes per-skeleton details.
    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl FusionReporter for LoggingReporter {
    fn on_observation_ignored(&self, observation: &KinectSkeleton) {
        log::debug!(
            "Ignored observation from {} (tracking id {}, state {:?})",
            observation.source_sensor_id,
            observation.tracking_id,
            observation.tracking_state
        );
    }

    fn on_correspondence(&self, subject_id: u64, score: f64) {
        log::debug!("Observation matched subject {} (score {:.4})", subject_id, score);
    }

    fn on_subject_created(&self, subject_id: u64) {
        log::info!("Subject {} created", subject_id);
    }

    fn on_subject_evicted(&self, subject_id: u64, age_ms: f64) {
        log::info!("Subject {} evicted after {:.0} ms", subject_id, age_ms);
    }

    fn on_prediction(&self, skeletons: &[KinectSkeleton]) {
        log::trace!("Prediction complete: {} subjects", skeletons.len());
        if self.verbose {
            for s in skeletons {
                log::trace!(
                    "  Subject {}: state={:?}, centroid=({:.3}, {:.3}, {:.3})",
                    s.tracking_id,
                    s.tracking_state,
                    s.position.x,
                    s.position.y,
                    s.position.z
                );
            }
        }
    }

    fn on_mutation_rejected(&self, error: &CollectionError) {
        log::warn!("Subject collection mutation rejected: {}", error);
    }
}

// ============================================================================
// CompositeReporter
// ============================================================================

/// Reporter that forwards events to two child reporters.
#[derive(Debug, Default)]
pub struct CompositeReporter<A: FusionReporter, B: FusionReporter> {
    first: A,
    second: B,
}

impl<A: FusionReporter, B: FusionReporter> CompositeReporter<A, B> {
    /// Create a new composite reporter.
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    /// Get a reference to the first reporter.
    pub fn first(&self) -> &A {
        &self.first
    }

    /// Get a reference to the second reporter.
    pub fn second(&self) -> &B {
        &self.second
    }

    /// Consume and return both reporters.
    pub fn into_parts(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<A: FusionReporter, B: FusionReporter> FusionReporter for CompositeReporter<A, B> {
    fn on_observation_ignored(&self, observation: &KinectSkeleton) {
        self.first.on_observation_ignored(observation);
        self.second.on_observation_ignored(observation);
    }

    fn on_correspondence(&self, subject_id: u64, score: f64) {
        self.first.on_correspondence(subject_id, score);
        self.second.on_correspondence(subject_id, score);
    }

    fn on_subject_created(&self, subject_id: u64) {
        self.first.on_subject_created(subject_id);
        self.second.on_subject_created(subject_id);
    }

    fn on_subject_evicted(&self, subject_id: u64, age_ms: f64) {
        self.first.on_subject_evicted(subject_id, age_ms);
        self.second.on_subject_evicted(subject_id, age_ms);
    }

    fn on_prediction(&self, skeletons: &[KinectSkeleton]) {
        self.first.on_prediction(skeletons);
        self.second.on_prediction(skeletons);
    }

    fn on_mutation_rejected(&self, error: &CollectionError) {
        self.first.on_mutation_rejected(error);
        self.second.on_mutation_rejected(error);
    }
}

// ============================================================================
// Tests
// ============================================================================
