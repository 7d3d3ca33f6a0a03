//! Streaming gesture recognition
//!
//! Training turns recorded skeleton sequences into normalised feature
//! points, quantises them with k-means into a small symbol alphabet and fits
//! a left-to-right [`DiscreteHmm`] on the resulting symbol sequences. The
//! acceptance threshold is a multiple of the mean training log-likelihood;
//! log-likelihoods are negative, so a larger multiplier accepts more.
//!
//! At run time frames are quantised one at a time into a FIFO window whose
//! length is derived from the training sequence lengths, and
//! [`GestureRecognizer::test_gesture`] compares the window's likelihood to
//! the threshold.

use std::collections::VecDeque;

use nalgebra::Point3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::GestureConfig;
use crate::errors::{ConfigError, GestureError};
use crate::filter::ConstantValueFilter;
use crate::skeleton::{JointType, KinectSkeleton, TrackingState};

use super::features::{normalize_joint, normalize_sequence, shoulder_width};
use super::hmm::{DiscreteHmm, Topology, TrainingSummary};
use super::kmeans::{kmeans, nearest_centroid};

/// Prior variance of the streaming shoulder-width estimate
const SHOULDER_PRIOR_VARIANCE: f64 = 1e3;

/// Everything learned by training; enough to restore a recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureModel {
    /// Joint whose trajectory defines the gesture
    pub joint: JointType,
    /// Quantisation centroids, one per symbol
    pub centroids: Vec<Point3<f64>>,
    /// Trained left-to-right model over symbol indices
    pub hmm: DiscreteHmm<usize, usize>,
    /// Raw acceptance threshold (negative)
    pub threshold: f64,
    /// Sliding window length in frames
    pub window_length: usize,
}

impl GestureModel {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Window length covering most training sequences: `ceil(mean + 2σ)`,
/// `ceil(mean)` with fewer than two sequences
fn window_length(lengths: &[usize]) -> usize {
    let n = lengths.len() as f64;
    let mean = lengths.iter().sum::<usize>() as f64 / n;
    let span = if lengths.len() < 2 {
        mean
    } else {
        let variance = lengths
            .iter()
            .map(|&l| (l as f64 - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        mean + 2.0 * variance.sqrt()
    };
    (span.ceil() as usize).max(1)
}

/// Symbol index of every point: its nearest centroid
fn quantize(points: &[Point3<f64>], centroids: &[Point3<f64>]) -> Vec<usize> {
    points.iter().map(|p| nearest_centroid(p, centroids)).collect()
}

/// One gesture's model plus the live window fed from a skeleton stream.
#[derive(Debug, Clone)]
pub struct GestureRecognizer {
    config: GestureConfig,
    model: Option<GestureModel>,
    window: VecDeque<usize>,
    shoulder: Option<ConstantValueFilter>,
}

impl GestureRecognizer {
    /// Untrained recognizer; fails when `config` is invalid
    pub fn new(config: GestureConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            model: None,
            window: VecDeque::new(),
            shoulder: None,
        })
    }

    /// Recognizer restored from a previously trained model
    pub fn from_model(config: GestureConfig, model: GestureModel) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            window: VecDeque::with_capacity(model.window_length),
            model: Some(model),
            config,
            shoulder: None,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// Whether a model has been trained or restored
    #[inline]
    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// Trained model, if any
    pub fn model(&self) -> Option<&GestureModel> {
        self.model.as_ref()
    }

    /// Joint the trained gesture follows
    pub fn monitored_joint(&self) -> Option<JointType> {
        self.model.as_ref().map(|m| m.joint)
    }

    /// Quantisation centroids; empty when untrained
    pub fn centroids(&self) -> &[Point3<f64>] {
        match &self.model {
            Some(model) => &model.centroids,
            None => &[],
        }
    }

    /// Raw acceptance threshold
    pub fn threshold(&self) -> Option<f64> {
        self.model.as_ref().map(|m| m.threshold)
    }

    /// Sliding window length; 0 when untrained
    pub fn window_length(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.window_length)
    }

    /// Symbols currently in the window
    pub fn window_fill(&self) -> usize {
        self.window.len()
    }

    /// Forget the live window and the streaming shoulder width
    pub fn reset_window(&mut self) {
        self.window.clear();
        self.shoulder = None;
    }

    /// Train the gesture from recorded sequences.
    ///
    /// Sequences without any frame tracking both shoulders, or without a
    /// single frame tracking `joint`, are skipped with a warning. Replaces
    /// any previous model and clears the live window.
    ///
    /// # Arguments
    /// * `rng` - randomness for k-means seeding
    /// * `sequences` - recorded performances of the gesture
    /// * `joint` - joint whose trajectory is learned
    pub fn train_gesture<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        sequences: &[Vec<KinectSkeleton>],
        joint: JointType,
    ) -> Result<TrainingSummary, GestureError> {
        let mut features: Vec<Vec<Point3<f64>>> = Vec::with_capacity(sequences.len());
        for (index, sequence) in sequences.iter().enumerate() {
            match normalize_sequence(sequence, joint) {
                Some(points) if !points.is_empty() => features.push(points),
                _ => log::warn!(
                    "training sequence {} dropped: no frame with tracked shoulders and {:?}",
                    index,
                    joint
                ),
            }
        }
        if features.is_empty() {
            return Err(GestureError::NoUsableSequences);
        }

        let pooled: Vec<Point3<f64>> = features.iter().flatten().copied().collect();
        let clustering = kmeans(
            &pooled,
            self.config.alphabet_size,
            self.config.kmeans_max_iterations,
            rng,
        )?;

        // Quantise against the final centroids, exactly as live frames are
        let symbols: Vec<Vec<usize>> = features
            .iter()
            .map(|points| quantize(points, &clustering.centroids))
            .collect();

        let mut hmm: DiscreteHmm<usize, usize> = DiscreteHmm::with_topology(
            (0..self.config.state_count).collect(),
            (0..self.config.alphabet_size).collect(),
            Topology::LeftToRight,
        )?;
        let summary = hmm.train_scaled(&symbols, &self.config.training)?;

        let mut total = 0.0;
        for sequence in &symbols {
            total += hmm.log_observation_probability(sequence)?;
        }
        let threshold = self.config.threshold_multiplier * total / symbols.len() as f64;
        let lengths: Vec<usize> = symbols.iter().map(Vec::len).collect();
        let window_length = window_length(&lengths);

        log::info!(
            "gesture trained on {} sequences: threshold {:.3}, window {} frames, {} Baum-Welch iterations",
            symbols.len(),
            threshold,
            window_length,
            summary.iterations
        );

        self.model = Some(GestureModel {
            joint,
            centroids: clustering.centroids,
            hmm,
            threshold,
            window_length,
        });
        self.reset_window();
        Ok(summary)
    }

    /// Feed one live frame.
    ///
    /// Accepted only when the recognizer is trained and `joint` is tracked in
    /// the frame; returns whether a symbol entered the window.
    pub fn add_data_point(&mut self, frame: &KinectSkeleton, joint: JointType) -> bool {
        let Some(model) = self.model.as_ref() else {
            return false;
        };
        if frame.skeleton[joint].tracking_state != TrackingState::Tracked {
            return false;
        }

        if let Some(width) = shoulder_width(frame) {
            let filter = self.shoulder.get_or_insert_with(|| {
                ConstantValueFilter::new(
                    0.0,
                    SHOULDER_PRIOR_VARIANCE,
                    self.config.shoulder_measurement_variance,
                )
            });
            filter.integrate(width, self.config.shoulder_process_variance);
        }
        let Some(width) = self.shoulder.as_ref().map(ConstantValueFilter::estimate) else {
            return false;
        };
        let Some(point) = normalize_joint(frame, joint, width) else {
            return false;
        };

        self.window.push_back(nearest_centroid(&point, &model.centroids));
        while self.window.len() > model.window_length {
            self.window.pop_front();
        }
        true
    }

    /// Relative probability of the current window.
    ///
    /// `log P(window) / (threshold × sensitivity)`: below 1.0 the gesture is
    /// detected. +∞ while untrained or while less than half the window is
    /// filled.
    pub fn test_gesture(&self, sensitivity: f64) -> f64 {
        let Some(model) = self.model.as_ref() else {
            return f64::INFINITY;
        };
        if self.window.len() * 2 < model.window_length {
            return f64::INFINITY;
        }
        let window: Vec<usize> = self.window.iter().copied().collect();
        match model.hmm.log_observation_probability(&window) {
            Ok(ll) => ll / (model.threshold * sensitivity),
            Err(_) => f64::INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use nalgebra::Vector3;

    use crate::common::rng::SimpleRng;
    use crate::skeleton::Joint;

    fn frame(k: i64, hand: Vector3<f64>) -> KinectSkeleton {
        let t = DateTime::<Utc>::UNIX_EPOCH + Duration::milliseconds(33 * k);
        let at = |x: f64, y: f64| Joint::tracked(Point3::new(x, y, 2.0), t);
        KinectSkeleton::new("k", 1)
            .with_state(TrackingState::Tracked)
            .with_joint(JointType::ShoulderCenter, at(0.0, 1.4))
            .with_joint(JointType::ShoulderLeft, at(-0.2, 1.4))
            .with_joint(JointType::ShoulderRight, at(0.2, 1.4))
            .with_joint(
                JointType::HandRight,
                Joint::tracked(Point3::from(Vector3::new(0.0, 1.4, 2.0) + hand), t),
            )
    }

    /// Hand sweeping right to left in front of the chest
    fn swipe(rng: &mut SimpleRng, frames: usize) -> Vec<KinectSkeleton> {
        (0..frames)
            .map(|k| {
                let s = k as f64 / (frames - 1) as f64;
                let noise = Vector3::new(
                    rng.gen_range(-0.01..0.01),
                    rng.gen_range(-0.01..0.01),
                    rng.gen_range(-0.01..0.01),
                );
                frame(k as i64, Vector3::new(0.5 - s, -0.2 + 0.1 * (s * 3.0).sin(), -0.3) + noise)
            })
            .collect()
    }

    #[test]
    fn test_window_length() {
        assert_eq!(window_length(&[10]), 10);
        assert_eq!(window_length(&[10, 10, 10]), 10);
        // mean 11, sample std 1.4142 -> 13.83
        assert_eq!(window_length(&[10, 12]), 14);
    }

    #[test]
    fn test_invalid_configuration_is_refused() {
        let single_symbol = GestureConfig {
            alphabet_size: 1,
            ..GestureConfig::default()
        };
        assert!(matches!(
            GestureRecognizer::new(single_symbol),
            Err(ConfigError::Invalid { .. })
        ));
        let no_states = GestureConfig {
            state_count: 0,
            ..GestureConfig::default()
        };
        assert!(GestureRecognizer::new(no_states).is_err());
    }

    #[test]
    fn test_untrained_recognizer() {
        let mut r = GestureRecognizer::new(GestureConfig::default()).unwrap();
        assert!(!r.is_trained());
        assert!(!r.add_data_point(&frame(0, Vector3::zeros()), JointType::HandRight));
        assert_eq!(r.test_gesture(1.0), f64::INFINITY);
        assert!(r.centroids().is_empty());
        assert_eq!(r.threshold(), None);
    }

    #[test]
    fn test_training_builds_model() {
        let mut rng = SimpleRng::new(42);
        let sequences: Vec<_> = (0..6).map(|i| swipe(&mut rng, 28 + i)).collect();
        let mut r = GestureRecognizer::new(GestureConfig::default()).unwrap();
        let summary = r.train_gesture(&mut rng, &sequences, JointType::HandRight).unwrap();

        assert!(r.is_trained());
        assert!(summary.final_log_likelihood >= summary.initial_log_likelihood);
        assert_eq!(r.centroids().len(), 8);
        assert_eq!(r.monitored_joint(), Some(JointType::HandRight));
        assert!(r.threshold().unwrap() < 0.0);
        // lengths 28..=33: mean 30.5, sample std 1.87
        assert_eq!(r.window_length(), 35);
    }

    #[test]
    fn test_training_symbols_match_live_quantisation() {
        let mut rng = SimpleRng::new(11);
        let sequences: Vec<_> = (0..6).map(|i| swipe(&mut rng, 24 + i)).collect();
        let config = GestureConfig {
            kmeans_max_iterations: 1,
            ..GestureConfig::default()
        };
        let mut r = GestureRecognizer::new(config.clone()).unwrap();
        r.train_gesture(&mut rng, &sequences, JointType::HandRight).unwrap();
        let model = r.model().unwrap();

        // Re-derive the training symbols the way live frames are quantised
        let mut total = 0.0;
        for sequence in &sequences {
            let points = normalize_sequence(sequence, JointType::HandRight).unwrap();
            let symbols = quantize(&points, &model.centroids);
            assert!(symbols.iter().all(|&s| s < config.alphabet_size));
            total += model.hmm.log_observation_probability(&symbols).unwrap();
        }
        let expected = config.threshold_multiplier * total / sequences.len() as f64;
        let threshold = r.threshold().unwrap();
        assert!(
            (threshold - expected).abs() < 1e-9 * expected.abs(),
            "{} vs {}",
            threshold,
            expected
        );
    }

    #[test]
    fn test_window_is_fifo_and_half_filled_rule() {
        let mut rng = SimpleRng::new(7);
        let sequences: Vec<_> = (0..4).map(|_| swipe(&mut rng, 20)).collect();
        let mut r = GestureRecognizer::new(GestureConfig::default()).unwrap();
        r.train_gesture(&mut rng, &sequences, JointType::HandRight).unwrap();
        assert_eq!(r.window_length(), 20);

        let live = swipe(&mut rng, 40);
        for (k, f) in live.iter().enumerate().take(9) {
            assert!(r.add_data_point(f, JointType::HandRight), "frame {}", k);
        }
        assert_eq!(r.test_gesture(1.0), f64::INFINITY);
        assert!(r.add_data_point(&live[9], JointType::HandRight));
        assert!(r.test_gesture(1.0).is_finite());

        for f in &live[10..] {
            r.add_data_point(f, JointType::HandRight);
        }
        assert_eq!(r.window_fill(), 20);

        r.reset_window();
        assert_eq!(r.window_fill(), 0);
    }

    #[test]
    fn test_frames_without_tracked_joint_rejected() {
        let mut rng = SimpleRng::new(8);
        let sequences: Vec<_> = (0..3).map(|_| swipe(&mut rng, 20)).collect();
        let mut r = GestureRecognizer::new(GestureConfig::default()).unwrap();
        r.train_gesture(&mut rng, &sequences, JointType::HandRight).unwrap();

        let mut f = frame(0, Vector3::new(0.2, 0.0, -0.3));
        f.skeleton[JointType::HandRight].tracking_state = TrackingState::Inferred;
        assert!(!r.add_data_point(&f, JointType::HandRight));

        // No shoulder estimate yet
        let mut g = frame(0, Vector3::new(0.2, 0.0, -0.3));
        g.skeleton[JointType::ShoulderLeft].tracking_state = TrackingState::NotTracked;
        assert!(!r.add_data_point(&g, JointType::HandRight));
        assert_eq!(r.window_fill(), 0);

        // Once the width is known, later frames may lack one shoulder
        assert!(r.add_data_point(&frame(1, Vector3::new(0.2, 0.0, -0.3)), JointType::HandRight));
        assert!(r.add_data_point(&g, JointType::HandRight));
        assert_eq!(r.window_fill(), 2);
    }

    #[test]
    fn test_training_errors() {
        let mut rng = SimpleRng::new(1);
        let mut r = GestureRecognizer::new(GestureConfig::default()).unwrap();
        assert_eq!(
            r.train_gesture(&mut rng, &[], JointType::HandRight),
            Err(GestureError::NoUsableSequences)
        );

        let mut no_shoulders = swipe(&mut rng, 10);
        for f in &mut no_shoulders {
            f.skeleton[JointType::ShoulderRight].tracking_state = TrackingState::Inferred;
        }
        assert_eq!(
            r.train_gesture(&mut rng, &[no_shoulders], JointType::HandRight),
            Err(GestureError::NoUsableSequences)
        );

        // A motionless hand yields a single distinct feature point
        let still: Vec<_> = (0..10).map(|k| frame(k, Vector3::new(0.1, 0.0, -0.3))).collect();
        assert!(matches!(
            r.train_gesture(&mut rng, &[still], JointType::HandRight),
            Err(GestureError::NotEnoughPoints { required: 8, found: 1 })
        ));
        assert!(!r.is_trained());
    }

    #[test]
    fn test_model_snapshot_restores_recognizer() {
        let mut rng = SimpleRng::new(5);
        let sequences: Vec<_> = (0..4).map(|_| swipe(&mut rng, 24)).collect();
        let mut r = GestureRecognizer::new(GestureConfig::default()).unwrap();
        r.train_gesture(&mut rng, &sequences, JointType::HandRight).unwrap();

        let json = r.model().unwrap().to_json();
        let model = GestureModel::from_json_str(&json).unwrap();
        assert_eq!(model.window_length, r.window_length());
        assert_eq!(model.centroids.len(), 8);

        let mut restored = GestureRecognizer::from_model(GestureConfig::default(), model).unwrap();
        let live = swipe(&mut rng, 24);
        for f in &live {
            r.add_data_point(f, JointType::HandRight);
            restored.add_data_point(f, JointType::HandRight);
        }
        let a = r.test_gesture(1.0);
        let b = restored.test_gesture(1.0);
        assert!((a - b).abs() < 1e-9 * a.abs().max(1.0));
    }
}
