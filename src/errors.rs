//! Error types for fusion, gesture and configuration operations

use std::time::Duration;

/// Errors raised while building or training a discrete HMM
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HmmError {
    /// State or symbol list is empty
    #[error("{context} must not be empty")]
    Empty {
        /// Which list was empty ("states", "symbols")
        context: &'static str,
    },

    /// The same state or symbol appears twice
    #[error("duplicate entry in {context} at index {index}")]
    Duplicate {
        /// Which list contained the duplicate
        context: &'static str,
        /// Index of the second occurrence
        index: usize,
    },

    /// Dimension mismatch between expected and actual
    #[error("dimension mismatch for {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// What was being checked
        context: &'static str,
        /// What was expected
        expected: usize,
        /// What was received
        actual: usize,
    },

    /// A probability row does not sum to one
    #[error("row {row} of {context} sums to {sum}, expected 1 ± 0.01")]
    NotStochastic {
        /// Which matrix or vector
        context: &'static str,
        /// Offending row (0 for vectors)
        row: usize,
        /// Actual row sum
        sum: f64,
    },

    /// A probability entry is outside the admissible range
    #[error("entry ({row}, {col}) of {context} is {value}, outside [0, 1.01]")]
    OutOfRange {
        /// Which matrix or vector
        context: &'static str,
        /// Row index
        row: usize,
        /// Column index
        col: usize,
        /// Offending value
        value: f64,
    },

    /// Training was asked to run without any observation
    #[error("no training sequences with at least one observation")]
    NoTrainingData,

    /// An observation does not belong to the symbol alphabet
    #[error("observation at position {position} is not in the symbol alphabet")]
    UnknownSymbol {
        /// Position in the offending sequence
        position: usize,
    },
}

/// Errors raised by gesture training
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GestureError {
    /// None of the recorded sequences had usable frames
    #[error("no usable training sequence (monitored joint and both shoulders must be tracked)")]
    NoUsableSequences,

    /// Not enough distinct feature points to seed the quantizer
    #[error("need at least {required} distinct feature points, found {found}")]
    NotEnoughPoints {
        /// Alphabet size
        required: usize,
        /// Distinct points found
        found: usize,
    },

    /// Underlying HMM failure
    #[error("gesture model: {0}")]
    Model(#[from] HmmError),
}

/// Errors raised by the deferred-mutation skeleton collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    /// Too many mutations are queued behind an active scan
    #[error("pending mutation bound of {limit} reached while a scan is active")]
    PendingOverflow {
        /// Configured bound
        limit: usize,
    },

    /// Removal index does not address an element
    #[error("index {index} out of bounds for collection of length {len}")]
    OutOfBounds {
        /// Requested index
        index: usize,
        /// Collection length at request time
        len: usize,
    },
}

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading the configuration file failed
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON for the expected schema
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is semantically invalid
    #[error("invalid configuration: {description}")]
    Invalid {
        /// Description of the configuration issue
        description: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(description: impl Into<String>) -> Self {
        ConfigError::Invalid {
            description: description.into(),
        }
    }
}

/// Errors raised when stopping a background worker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// The worker did not observe the stop flag within the bounded wait
    #[error("worker '{name}' did not stop within {timeout:?}")]
    Timeout {
        /// Worker name
        name: String,
        /// Wait that was exceeded
        timeout: Duration,
    },

    /// The worker thread panicked
    #[error("worker '{name}' panicked")]
    Panicked {
        /// Worker name
        name: String,
    },
}
