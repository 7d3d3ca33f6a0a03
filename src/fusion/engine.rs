//! Multi-sensor skeleton fusion engine
//!
//! The engine maps a stream of per-sensor [`KinectSkeleton`] observations
//! onto a changing set of tracked subjects, each a [`FilteredSkeleton`].
//!
//! # Correspondence
//!
//! An observation is compared against every subject's current joint
//! estimates (see [`FilteredSkeleton::correspondence_score`]). The subject
//! with the smallest score wins if that score is below the configured
//! threshold; otherwise a new subject is allocated.
//!
//! # Concurrency
//!
//! Sensor threads call [`SkeletonFusionEngine::merge_skeleton`] while
//! publisher threads call [`SkeletonFusionEngine::get_all_predicted_skeletons`].
//! The subject list is a [`ScanCollection`]: every pass over it runs inside a
//! scan, so allocation and eviction are queued and applied only once no pass
//! is in progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::common::time::{Clock, SystemClock};
use crate::config::FusionConfig;
use crate::errors::{CollectionError, ConfigError};
use crate::reporter::{FusionReporter, NoOpReporter};
use crate::skeleton::KinectSkeleton;

use super::collection::ScanCollection;
use super::filtered::FilteredSkeleton;
use super::merged::MergedSkeleton;

/// What [`SkeletonFusionEngine::merge_skeleton`] did with an observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeOutcome {
    /// Skeleton-level state was neither tracked nor inferred
    Ignored,
    /// Integrated into an existing subject
    Matched {
        /// Subject the observation was routed to
        subject_id: u64,
        /// Correspondence distance
        score: f64,
    },
    /// A new subject was allocated for the observation
    Created {
        /// Id of the new subject
        subject_id: u64,
    },
    /// A new subject was needed but the subject list refused it
    Rejected(CollectionError),
}

/// Index and score of the best-corresponding subject
fn best_match(
    subjects: &[Arc<FilteredSkeleton>],
    observation: &KinectSkeleton,
) -> Option<(usize, f64)> {
    subjects
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.correspondence_score(observation).map(|score| (i, score)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Fuses skeleton observations from many sensors into tracked subjects.
pub struct SkeletonFusionEngine {
    config: FusionConfig,
    subjects: ScanCollection<FilteredSkeleton>,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn FusionReporter>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SkeletonFusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkeletonFusionEngine")
            .field("config", &self.config)
            .field("subjects", &self.subjects.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl SkeletonFusionEngine {
    /// Engine on the system clock with no reporter
    pub fn new(config: FusionConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Engine reading the current time from `clock`.
    ///
    /// Fails when `config` does not pass [`FusionConfig::validate`].
    pub fn with_clock(config: FusionConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            subjects: ScanCollection::new(config.max_pending_mutations),
            config,
            clock,
            reporter: Arc::new(NoOpReporter),
            next_id: AtomicU64::new(1),
        })
    }

    /// Replace the reporter, builder style
    pub fn with_reporter(mut self, reporter: Arc<dyn FusionReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Active configuration
    #[inline]
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Clock the engine reads "now" from
    #[inline]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Route one observation to a subject and integrate it.
    pub fn merge_skeleton(&self, observation: &KinectSkeleton) -> MergeOutcome {
        if !observation.is_usable() {
            self.reporter.on_observation_ignored(observation);
            return MergeOutcome::Ignored;
        }

        {
            let scan = self.subjects.begin_scan();
            if let Some((index, score)) = best_match(scan.items(), observation) {
                if score < self.config.correspondence_threshold {
                    let subject = &scan.items()[index];
                    subject.integrate_skeleton(observation, &self.config);
                    log::debug!(
                        "{}:{} matched subject {} (score {:.4})",
                        observation.source_sensor_id,
                        observation.tracking_id,
                        subject.id(),
                        score
                    );
                    self.reporter.on_correspondence(subject.id(), score);
                    return MergeOutcome::Matched {
                        subject_id: subject.id(),
                        score,
                    };
                }
                log::debug!(
                    "{}:{} best score {:.4} above threshold; new subject",
                    observation.source_sensor_id,
                    observation.tracking_id,
                    score
                );
            }
        }

        // Not atomic with the match above: a concurrent merge of the same
        // unknown person may create a second subject
        let subject_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subject = FilteredSkeleton::new(subject_id, &self.config, self.clock.now());
        subject.integrate_skeleton(observation, &self.config);

        match self.subjects.add(subject) {
            Ok(_) => {
                log::info!(
                    "subject {} created from {}:{}",
                    subject_id,
                    observation.source_sensor_id,
                    observation.tracking_id
                );
                self.reporter.on_subject_created(subject_id);
                MergeOutcome::Created { subject_id }
            }
            Err(e) => {
                log::warn!("could not add subject {}: {}", subject_id, e);
                self.reporter.on_mutation_rejected(&e);
                MergeOutcome::Rejected(e)
            }
        }
    }

    /// Predict every live subject `dt_from_now` seconds ahead, evicting stale ones.
    ///
    /// A subject whose last tracked joint update is older than the staleness
    /// timeout is scheduled for removal and left out of the result.
    pub fn get_all_predicted_skeletons(&self, dt_from_now: f64) -> Vec<KinectSkeleton> {
        let now = self.clock.now();
        let timeout_ms = self.config.staleness_timeout_ms as f64;

        let scan = self.subjects.begin_scan();
        let mut live = Vec::with_capacity(scan.len());
        for (index, subject) in scan.iter().enumerate() {
            let age_ms = subject.age_ms(now);
            if age_ms <= timeout_ms {
                live.push(subject);
                continue;
            }
            match scan.remove_at(index) {
                Ok(()) => {
                    log::info!("subject {} evicted after {:.0} ms", subject.id(), age_ms);
                    self.reporter.on_subject_evicted(subject.id(), age_ms);
                }
                Err(e) => {
                    log::warn!("could not evict subject {}: {}", subject.id(), e);
                    self.reporter.on_mutation_rejected(&e);
                }
            }
        }

        #[cfg(feature = "rayon")]
        let predicted: Vec<KinectSkeleton> = live
            .par_iter()
            .map(|s| s.predict_skeleton(dt_from_now, now, &self.config))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let predicted: Vec<KinectSkeleton> = live
            .iter()
            .map(|s| s.predict_skeleton(dt_from_now, now, &self.config))
            .collect();

        drop(scan);
        self.reporter.on_prediction(&predicted);
        predicted
    }

    /// Average concurrently reported views of the same subjects.
    ///
    /// Observations are grouped by the subject they correspond to; each
    /// group is averaged with [`MergedSkeleton`]. Observations matching no
    /// subject are returned averaged on their own. Subjects are not updated.
    pub fn fuse_sensor_views(&self, observations: &[KinectSkeleton]) -> Vec<KinectSkeleton> {
        let scan = self.subjects.begin_scan();
        let mut groups: Vec<(Option<u64>, MergedSkeleton)> = Vec::new();

        for observation in observations.iter().filter(|o| o.is_usable()) {
            let subject_id = best_match(scan.items(), observation)
                .filter(|(_, score)| *score < self.config.correspondence_threshold)
                .map(|(index, _)| scan.items()[index].id());

            let existing = match subject_id {
                Some(id) => groups.iter_mut().find(|(key, _)| *key == Some(id)),
                None => None,
            };
            match existing {
                Some((_, merged)) => merged.add(observation),
                None => {
                    let tracking_id = subject_id.unwrap_or(observation.tracking_id);
                    let mut merged =
                        MergedSkeleton::new(tracking_id, self.config.hand.grab_fraction);
                    merged.add(observation);
                    groups.push((subject_id, merged));
                }
            }
        }

        groups.iter().map(|(_, merged)| merged.to_skeleton()).collect()
    }

    /// Shared handles to the visible subjects
    pub fn subjects(&self) -> Vec<Arc<FilteredSkeleton>> {
        self.subjects.snapshot()
    }

    /// Number of visible subjects
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    /// Whether no subject is tracked
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Number of queued subject additions and removals
    pub fn pending_mutations(&self) -> usize {
        self.subjects.pending()
    }

    /// Forget every subject
    pub fn clear(&self) {
        self.subjects.clear();
    }
}
