//! Gesture recognition
//!
//! - [`hmm`] - discrete hidden Markov model with scaled Baum-Welch training
//! - [`kmeans`] - 3D vector quantisation
//! - [`features`] - shoulder-relative, shoulder-width-scaled joint features
//! - [`recognizer`] - training from recorded sequences and streaming scoring

pub mod features;
pub mod hmm;
pub mod kmeans;
pub mod recognizer;

pub use hmm::{DiscreteHmm, Topology, TrainingSummary};
pub use kmeans::{kmeans, Clustering};
pub use recognizer::{GestureModel, GestureRecognizer};
