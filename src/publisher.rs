//! Periodic publication of fused skeletons
//!
//! A [`PredictionPublisher`] owns a background thread that, every period,
//! asks the [`SkeletonFusionEngine`] for its predicted skeletons, hands them
//! to a [`SkeletonSink`] (the downstream pub/sub bus) and optionally feeds
//! the first subject into gesture recognizers, reporting each recognizer's
//! relative probability.
//!
//! Shutdown is cooperative: [`PredictionPublisher::stop`] raises a flag the
//! loop polls between ticks and waits a bounded time for the thread to
//! acknowledge it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::errors::WorkerError;
use crate::fusion::SkeletonFusionEngine;
use crate::gesture::GestureRecognizer;
use crate::skeleton::KinectSkeleton;

/// Longest single sleep of the worker loop, bounding stop latency
const POLL_SLICE: Duration = Duration::from_millis(5);

/// Error type sinks report failures with
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Relative probability of one gesture for one subject at one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    /// Gesture name
    pub gesture: String,
    /// Fused subject the recognizer follows
    pub tracking_id: u64,
    /// Below 1.0 means detected
    pub relative_probability: f64,
}

/// Downstream consumer of fused skeletons.
pub trait SkeletonSink: Send {
    /// Receive one tick's predicted skeletons
    fn publish(&mut self, skeletons: &[KinectSkeleton]) -> Result<(), SinkError>;

    /// Receive one recognizer's score for the tick
    fn publish_gesture(&mut self, _event: &GestureEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Sink forwarding every tick over a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    skeletons: mpsc::Sender<Vec<KinectSkeleton>>,
    gestures: Option<mpsc::Sender<GestureEvent>>,
}

impl ChannelSink {
    /// Sink for skeletons only
    pub fn new(skeletons: mpsc::Sender<Vec<KinectSkeleton>>) -> Self {
        Self {
            skeletons,
            gestures: None,
        }
    }

    /// Also forward gesture events
    pub fn with_gestures(mut self, gestures: mpsc::Sender<GestureEvent>) -> Self {
        self.gestures = Some(gestures);
        self
    }
}

impl SkeletonSink for ChannelSink {
    fn publish(&mut self, skeletons: &[KinectSkeleton]) -> Result<(), SinkError> {
        self.skeletons.send(skeletons.to_vec())?;
        Ok(())
    }

    fn publish_gesture(&mut self, event: &GestureEvent) -> Result<(), SinkError> {
        if let Some(tx) = &self.gestures {
            tx.send(event.clone())?;
        }
        Ok(())
    }
}

/// Publisher cadence and horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Thread name, also used in shutdown errors
    pub name: String,
    /// Time between ticks in milliseconds
    pub period_ms: u64,
    /// Prediction horizon past "now" in seconds
    pub horizon_secs: f64,
    /// Sensitivity passed to every recognizer's `test_gesture`
    pub gesture_sensitivity: f64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            name: "prediction-publisher".to_string(),
            period_ms: 33,
            horizon_secs: 0.0,
            gesture_sensitivity: 1.0,
        }
    }
}

/// One tick's worth of work, separated from the thread for direct use.
pub struct PublisherTask<S: SkeletonSink> {
    engine: Arc<SkeletonFusionEngine>,
    sink: S,
    recognizers: Vec<(String, GestureRecognizer)>,
    config: PublisherConfig,
}

impl<S: SkeletonSink> PublisherTask<S> {
    /// Task publishing `engine`'s predictions into `sink`
    pub fn new(engine: Arc<SkeletonFusionEngine>, sink: S, config: PublisherConfig) -> Self {
        Self {
            engine,
            sink,
            recognizers: Vec::new(),
            config,
        }
    }

    /// Attach a trained recognizer under a gesture name, builder style
    pub fn with_recognizer(mut self, name: impl Into<String>, recognizer: GestureRecognizer) -> Self {
        self.recognizers.push((name.into(), recognizer));
        self
    }

    /// The sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Attached recognizers with their names
    pub fn recognizers(&self) -> &[(String, GestureRecognizer)] {
        &self.recognizers
    }

    /// Predict, publish and score once; returns the number of skeletons published.
    ///
    /// Sink failures are logged and do not stop the publisher.
    pub fn tick(&mut self) -> usize {
        let skeletons = self
            .engine
            .get_all_predicted_skeletons(self.config.horizon_secs);
        if let Err(e) = self.sink.publish(&skeletons) {
            log::warn!("{}: sink rejected {} skeletons: {}", self.config.name, skeletons.len(), e);
        }

        if let Some(subject) = skeletons.first() {
            for (name, recognizer) in &mut self.recognizers {
                let Some(joint) = recognizer.monitored_joint() else {
                    continue;
                };
                recognizer.add_data_point(subject, joint);
                let event = GestureEvent {
                    gesture: name.clone(),
                    tracking_id: subject.tracking_id,
                    relative_probability: recognizer.test_gesture(self.config.gesture_sensitivity),
                };
                if let Err(e) = self.sink.publish_gesture(&event) {
                    log::warn!("{}: sink rejected gesture event: {}", self.config.name, e);
                }
            }
        }
        skeletons.len()
    }
}

/// Handle to a running publisher thread.
#[derive(Debug)]
pub struct PredictionPublisher {
    name: String,
    stop: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    done: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl PredictionPublisher {
    /// Start a thread running `task` every `config.period_ms`
    pub fn spawn<S: SkeletonSink + 'static>(mut task: PublisherTask<S>) -> std::io::Result<Self> {
        let name = task.config.name.clone();
        let period = Duration::from_millis(task.config.period_ms);
        let stop = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));
        let (done_tx, done) = mpsc::channel();

        let handle = {
            let stop = Arc::clone(&stop);
            let ticks = Arc::clone(&ticks);
            thread::Builder::new().name(name.clone()).spawn(move || {
                log::debug!("{} started", task.config.name);
                while !stop.load(Ordering::Acquire) {
                    let started = Instant::now();
                    task.tick();
                    ticks.fetch_add(1, Ordering::Relaxed);
                    while !stop.load(Ordering::Acquire) {
                        let elapsed = started.elapsed();
                        if elapsed >= period {
                            break;
                        }
                        thread::sleep((period - elapsed).min(POLL_SLICE));
                    }
                }
                log::debug!("{} stopped", task.config.name);
                let _ = done_tx.send(());
            })?
        };

        Ok(Self {
            name,
            stop,
            ticks,
            done,
            handle: Some(handle),
        })
    }

    /// Ticks completed so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Whether the stop flag has been raised
    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Signal the thread to stop and wait up to `timeout` for it.
    ///
    /// On timeout the thread is left detached and keeps the stop flag set.
    pub fn stop(mut self, timeout: Duration) -> Result<(), WorkerError> {
        self.stop.store(true, Ordering::Release);
        match self.done.recv_timeout(timeout) {
            Ok(()) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                log::error!("{} did not stop within {:?}", self.name, timeout);
                self.handle.take();
                Err(WorkerError::Timeout {
                    name: self.name.clone(),
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                let panicked = self
                    .handle
                    .take()
                    .map_or(false, |handle| handle.join().is_err());
                if panicked {
                    log::error!("{} panicked", self.name);
                    Err(WorkerError::Panicked {
                        name: self.name.clone(),
                    })
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl Drop for PredictionPublisher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}
