//! Per-asset inference pipeline and fleet
//!
//! ## Overview
//!
//! An [`AssetPipeline`] owns everything mutable about one monitored asset and
//! runs each window through the full chain:
//!
//! ```text
//! Window ─► extract ─► normalize ─► history ─► ensemble ─► classify ─► EnsembleResult
//!                                                              │
//!                        AdaptiveThreshold ◄── record_prediction
//!                        DriftMonitor      ◄── normalized vector (bounded check)
//!                        RulEstimator      ◄── health = 1 − composite
//! ```
//!
//! A [`Fleet`] maps asset ids to pipelines behind one async mutex each, so
//! windows of different assets never wait on each other while windows and
//! feedback of one asset are applied strictly in order.
//!
//! ## Error Handling
//!
//! Recoverable errors (a non-finite feature, no detector this tick) abort
//! only the window that raised them; batch and stream processing record the
//! window as skipped and continue. Fatal errors (missing or corrupt
//! calibration) are returned and the caller should stop the asset.
//!
//! ## Persistence
//!
//! `save_state` writes four artifacts per asset; `restore_state` reads them
//! back so classification after a restart matches classification without one.
//! The scoring history artifact also carries the tick sequence behind alert
//! ids, the last result and each detector's last fresh score, so alert ids
//! stay unique and the fallback policies answer the same after a restart.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use rotorguard_core::buffer::HistoryBuffer;
use rotorguard_core::errors::{AvailabilityError, InputError, StateCorruptionError};
use rotorguard_core::features::{FeatureExtractor, FEATURE_COUNT};
use rotorguard_core::normalize::{NormalizedVector, Normalizer};
use rotorguard_core::stream::StreamError;
use rotorguard_core::time::{SystemTime, TimeSource};
use rotorguard_core::traits::{Stream, Validate};
use rotorguard_core::window::{RawSample, StreamWindower, Window, Windower};
use rotorguard_schemas::artifact::{load_optional, save};
use rotorguard_schemas::{schemas, ArtifactKind, Versioned};

use crate::config::PipelineConfig;
use crate::detector::ScoringInput;
use crate::drift::{DriftDetected, DriftMonitor, DriftReference, DriftState};
use crate::ensemble::{EnsembleResult, EnsembleScorer, UnavailablePolicy};
use crate::registry::{HealthStatus, ModelRegistry};
use crate::rul::{HealthHistory, RulEstimate, RulEstimator};
use crate::threshold::{AdaptiveThreshold, Feedback, FeedbackOutcome, ThresholdState};
use crate::{MlError, MlResult};

/// Threshold state file inside an asset's state directory
pub const THRESHOLD_STATE_FILE: &str = "threshold_state.json";
/// Drift state file
pub const DRIFT_STATE_FILE: &str = "drift_state.json";
/// Health history file
pub const HEALTH_HISTORY_FILE: &str = "health_history.json";
/// Scoring history file
pub const SCORING_HISTORY_FILE: &str = "scoring_history.json";

/// Scoring context carried across restarts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringHistory {
    /// Normalized vectors buffered for sequence scoring, oldest first
    pub vectors: Vec<NormalizedVector>,
    /// Sequence number of the next alert id
    #[serde(default)]
    pub next_sequence: u64,
    /// Result repeated under [`UnavailablePolicy::ReuseLast`]
    #[serde(default)]
    pub last_result: Option<EnsembleResult>,
    /// Last fresh score per detector
    #[serde(default)]
    pub stale: BTreeMap<String, f64>,
}

impl Validate for ScoringHistory {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        let violated = |reason: String| StateCorruptionError::InvariantViolated { kind: "scoring_history".into(), reason };
        for v in &self.vectors {
            if v.values().len() != FEATURE_COUNT || v.values().iter().any(|x| !x.is_finite()) {
                return Err(violated(format!(
                    "window {} is not a finite {}-feature vector",
                    v.window_index(),
                    FEATURE_COUNT
                )));
            }
        }
        if let Some(last) = &self.last_result {
            if !(0.0..=1.0).contains(&last.composite) {
                return Err(violated(format!("last result {} has composite {}", last.alert_id, last.composite)));
            }
            last.cuts.validate()?;
        }
        if let Some((name, score)) = self.stale.iter().find(|(_, s)| !(0.0..=1.0).contains(*s)) {
            return Err(violated(format!("stale score of {} is {}", name, score)));
        }
        Ok(())
    }
}

impl Versioned for ScoringHistory {
    const KIND: ArtifactKind = ArtifactKind::ScoringHistory;
    const SCHEMA_VERSION: u32 = schemas::SCORING_HISTORY_V1;
}

/// Running totals of emitted results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionSummary {
    /// Results emitted
    pub total: u64,
    /// Results with `is_anomaly`
    pub anomalies: u64,
    /// Normal results
    pub normal: u64,
    /// Warning results
    pub warning: u64,
    /// Critical results
    pub critical: u64,
    score_sum: f64,
}

impl PredictionSummary {
    /// Count one result
    pub fn record(&mut self, result: &EnsembleResult) {
        use crate::ensemble::AlertLevel::*;

        self.total += 1;
        self.anomalies += u64::from(result.is_anomaly);
        match result.alert_level {
            Normal => self.normal += 1,
            Warning => self.warning += 1,
            Critical => self.critical += 1,
        }
        self.score_sum += result.composite;
    }

    /// Mean composite, zero before the first result
    pub fn average_score(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.score_sum / self.total as f64
        }
    }
}

/// Window dropped by batch or stream processing
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedWindow {
    /// Window index
    pub index: u64,
    /// Error message
    pub reason: String,
}

/// Outcome of processing a capture or a stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// One result per scored window
    pub results: Vec<EnsembleResult>,
    /// Windows dropped on recoverable errors
    pub skipped: Vec<SkippedWindow>,
    /// Trailing samples that could not fill a window
    pub tail: Option<InputError>,
}

/// Everything mutable about one monitored asset
pub struct AssetPipeline {
    asset_id: String,
    config: PipelineConfig,
    extractor: FeatureExtractor,
    normalizer: Normalizer,
    history: HistoryBuffer<NormalizedVector>,
    scorer: EnsembleScorer,
    threshold: AdaptiveThreshold,
    drift: DriftMonitor,
    rul: RulEstimator,
    summary: PredictionSummary,
    last_result: Option<EnsembleResult>,
    next_sequence: u64,
    drift_events: Vec<DriftDetected>,
    health: HealthStatus,
}

impl AssetPipeline {
    /// Fresh pipeline for `asset_id` over the registry's models
    pub fn new(asset_id: impl Into<String>, config: PipelineConfig, registry: &dyn ModelRegistry) -> MlResult<Self> {
        config.validate()?;
        let asset_id = asset_id.into();

        let extractor = FeatureExtractor::new(config.features.clone())?;
        let normalizer = Normalizer::with_stats(registry.normalization_stats())?;
        let scorer = EnsembleScorer::new(registry.detectors(), config.ensemble.clone())?;
        let reference = registry
            .drift_reference()
            .unwrap_or_else(|| DriftReference::standard_normal(FEATURE_COUNT));

        let pipeline = Self {
            history: HistoryBuffer::new(scorer.required_history()),
            threshold: AdaptiveThreshold::new(config.threshold.clone())?,
            drift: DriftMonitor::new(config.drift.clone(), reference)?,
            rul: RulEstimator::new(config.rul.clone())?,
            health: registry.health(),
            asset_id,
            config,
            extractor,
            normalizer,
            scorer,
            summary: PredictionSummary::default(),
            last_result: None,
            next_sequence: 0,
            drift_events: Vec::new(),
        };
        info!(
            "Registered asset {} with {} detectors ({})",
            pipeline.asset_id,
            pipeline.scorer.detector_count(),
            pipeline.health
        );
        Ok(pipeline)
    }

    /// Asset id
    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    /// Score one window
    ///
    /// Alert ids are `<asset>-<sequence>`, where the sequence counts every
    /// window that reached the ensemble since the asset was first registered.
    /// Window indices restart with each capture; the sequence does not.
    pub async fn process_window(&mut self, window: &Window) -> MlResult<EnsembleResult> {
        let features = self.extractor.extract(window)?;
        let normalized = self.normalizer.normalize(&features)?;
        self.history.push(normalized.clone());

        let alert_id = format!("{}-{}", self.asset_id, self.next_sequence);
        self.next_sequence += 1;
        let input = Arc::new(ScoringInput::new(self.history.to_vec())?);
        let combined = match self.scorer.score(input).await {
            Ok(combined) => combined,
            Err(rotorguard_core::Error::Availability(AvailabilityError::NoDetectorAvailable)) => {
                return self.reuse_last(window, alert_id);
            }
            Err(e) => return Err(e.into()),
        };

        let cuts = self.threshold.cuts();
        let alert_level = cuts.classify(combined.composite);
        let result = EnsembleResult {
            asset_id: self.asset_id.clone(),
            alert_id,
            window_index: window.index(),
            timestamp: window.start(),
            outcomes: combined.outcomes,
            composite: combined.composite,
            alert_level,
            is_anomaly: combined.composite > self.config.ensemble.anomaly_cut,
            cuts,
            adaptive: self.threshold.is_adaptive(),
            reused: false,
        };
        debug!(
            "{} window {}: composite {:.3} -> {}",
            self.asset_id, result.window_index, result.composite, result.alert_level
        );

        self.threshold
            .record_prediction(&result.alert_id, result.composite, alert_level, result.timestamp);
        self.check_drift(&normalized).await;
        self.rul.record(result.timestamp, 1.0 - result.composite);
        self.summary.record(&result);
        self.last_result = Some(result.clone());
        Ok(result)
    }

    fn reuse_last(&mut self, window: &Window, alert_id: String) -> MlResult<EnsembleResult> {
        match (self.config.ensemble.unavailable_policy, &self.last_result) {
            (UnavailablePolicy::ReuseLast, Some(last)) => {
                warn!("{} window {}: no detector available, reusing last result", self.asset_id, window.index());
                let result = last.reuse_for(alert_id, window.index(), window.start());
                self.summary.record(&result);
                self.last_result = Some(result.clone());
                Ok(result)
            }
            _ => Err(AvailabilityError::NoDetectorAvailable.into()),
        }
    }

    async fn check_drift(&mut self, normalized: &NormalizedVector) {
        let Some(check) = self.drift.record(normalized) else {
            return;
        };
        let budget = Duration::from_millis(self.drift.config().drift_timeout_ms);
        match tokio::time::timeout(budget, tokio::task::spawn_blocking(move || check.compute())).await {
            Ok(Ok(measurement)) => {
                if let Some(event) = self.drift.apply(measurement) {
                    self.drift_events.push(event);
                }
            }
            Ok(Err(e)) => warn!("{} drift check failed: {}", self.asset_id, e),
            Err(_) => warn!("{} drift check exceeded {:?}, skipped", self.asset_id, budget),
        }
    }

    async fn collect(&mut self, window: &Window, report: &mut BatchReport) -> MlResult<()> {
        match self.process_window(window).await {
            Ok(result) => report.results.push(result),
            Err(e) if e.is_recoverable() => {
                warn!("{} window {} skipped: {}", self.asset_id, window.index(), e);
                report.skipped.push(SkippedWindow { index: window.index(), reason: e.to_string() });
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Window and score a finite capture
    pub async fn process_samples(&mut self, samples: &[RawSample]) -> MlResult<BatchReport> {
        let windower = Windower::new(samples, self.config.window)?;
        let mut report = BatchReport::default();
        for item in windower.iter() {
            match item {
                Ok(window) => self.collect(&window, &mut report).await?,
                Err(tail) => report.tail = Some(tail),
            }
        }
        Ok(report)
    }

    /// Window and score a pull stream until it ends
    pub async fn process_stream<S, E>(&mut self, source: S) -> MlResult<BatchReport>
    where
        S: Stream<Item = RawSample, Error = StreamError<E>>,
        E: fmt::Debug,
    {
        let mut windower = StreamWindower::new(source, self.config.window)?;
        let mut report = BatchReport::default();
        loop {
            match windower.poll_next() {
                Ok(window) => self.collect(&window, &mut report).await?,
                Err(nb::Error::WouldBlock) => tokio::task::yield_now().await,
                Err(nb::Error::Other(StreamError::EndOfStream)) => break,
                Err(nb::Error::Other(err @ StreamError::Incomplete { .. })) => {
                    report.tail = err.as_input_error();
                }
                Err(nb::Error::Other(err)) => {
                    return Err(match err.as_input_error() {
                        Some(input) => input.into(),
                        None => MlError::Stream(format!("{:?}", err)),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Apply operator feedback to this asset's thresholds
    pub fn apply_feedback(&mut self, feedback: &Feedback) -> FeedbackOutcome {
        let outcome = self.threshold.apply_feedback(feedback);
        if let FeedbackOutcome::Applied { recalibrated: true } = outcome {
            let cuts = self.threshold.cuts();
            info!(
                "{} thresholds now warning {:.2}, critical {:.2}",
                self.asset_id, cuts.warning, cuts.critical
            );
        }
        outcome
    }

    /// Current remaining-useful-life projection
    pub fn rul(&self) -> RulEstimate {
        self.rul.estimate()
    }

    /// Totals so far
    pub fn summary(&self) -> &PredictionSummary {
        &self.summary
    }

    /// Threshold state machine
    pub fn threshold(&self) -> &AdaptiveThreshold {
        &self.threshold
    }

    /// Drift monitor
    pub fn drift(&self) -> &DriftMonitor {
        &self.drift
    }

    /// Take pending drift events
    pub fn drain_drift_events(&mut self) -> Vec<DriftDetected> {
        std::mem::take(&mut self.drift_events)
    }

    /// Model availability at registration
    pub fn health(&self) -> HealthStatus {
        self.health
    }

    /// Most recent result, fresh or reused
    pub fn last_result(&self) -> Option<&EnsembleResult> {
        self.last_result.as_ref()
    }

    /// Sequence number the next alert id will carry
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    fn scoring_history(&self) -> ScoringHistory {
        ScoringHistory {
            vectors: self.history.to_vec(),
            next_sequence: self.next_sequence,
            last_result: self.last_result.clone(),
            stale: self.scorer.stale_scores().clone(),
        }
    }

    /// Write per-asset state under `dir`
    pub fn save_state(&self, dir: impl AsRef<Path>) -> MlResult<()> {
        let dir = dir.as_ref();
        save(self.threshold.state(), dir.join(THRESHOLD_STATE_FILE))?;
        save(&self.drift.state(), dir.join(DRIFT_STATE_FILE))?;
        save(&self.rul.history(), dir.join(HEALTH_HISTORY_FILE))?;
        save(&self.scoring_history(), dir.join(SCORING_HISTORY_FILE))?;
        debug!("Saved state of {} to {}", self.asset_id, dir.display());
        Ok(())
    }

    /// Read per-asset state from `dir`; true when anything was restored
    ///
    /// Missing files leave the corresponding component fresh. Corrupt files
    /// are fatal.
    pub fn restore_state(&mut self, dir: impl AsRef<Path>) -> MlResult<bool> {
        let dir = dir.as_ref();
        let mut restored = false;

        if let Some(state) = load_optional::<ThresholdState>(dir.join(THRESHOLD_STATE_FILE))? {
            self.threshold = AdaptiveThreshold::from_state(self.config.threshold.clone(), state)?;
            restored = true;
        }
        if let Some(state) = load_optional::<DriftState>(dir.join(DRIFT_STATE_FILE))? {
            self.drift = DriftMonitor::from_state(self.config.drift.clone(), state)?;
            restored = true;
        }
        if let Some(history) = load_optional::<HealthHistory>(dir.join(HEALTH_HISTORY_FILE))? {
            self.rul = RulEstimator::from_history(self.config.rul.clone(), history)?;
            restored = true;
        }
        if let Some(history) = load_optional::<ScoringHistory>(dir.join(SCORING_HISTORY_FILE))? {
            self.history = HistoryBuffer::from_ordered(self.history.capacity(), history.vectors);
            self.next_sequence = history.next_sequence;
            self.last_result = history.last_result;
            self.scorer.restore_stale(history.stale);
            restored = true;
        }

        if restored {
            info!("Restored state of {} from {}", self.asset_id, dir.display());
        }
        Ok(restored)
    }
}

impl fmt::Debug for AssetPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetPipeline")
            .field("asset_id", &self.asset_id)
            .field("scorer", &self.scorer)
            .field("history", &self.history.len())
            .field("next_sequence", &self.next_sequence)
            .field("summary", &self.summary)
            .finish()
    }
}

/// Fleet-level availability report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetHealth {
    /// Derived from loaded vs expected detectors
    pub status: HealthStatus,
    /// Detectors loaded
    pub detectors_loaded: usize,
    /// Detectors a complete deployment has
    pub detectors_expected: usize,
    /// Registered assets
    pub assets: usize,
}

/// All monitored assets
pub struct Fleet {
    config: PipelineConfig,
    registry: Arc<dyn ModelRegistry>,
    clock: Arc<dyn TimeSource>,
    assets: RwLock<HashMap<String, Arc<Mutex<AssetPipeline>>>>,
}

impl Fleet {
    /// Empty fleet over `registry`
    pub fn new(config: PipelineConfig, registry: Arc<dyn ModelRegistry>) -> MlResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            clock: Arc::new(SystemTime),
            assets: RwLock::new(HashMap::new()),
        })
    }

    /// Stamp feedback from `clock` instead of the system clock
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Add an asset, restoring its state when a state directory is configured
    pub fn register(&self, asset_id: &str) -> MlResult<()> {
        let mut assets = self.assets.write().map_err(|_| MlError::Poisoned("fleet assets"))?;
        if assets.contains_key(asset_id) {
            return Err(MlError::AssetExists(asset_id.to_string()));
        }
        let mut pipeline = AssetPipeline::new(asset_id, self.config.clone(), self.registry.as_ref())?;
        if let Some(dir) = &self.config.state_dir {
            pipeline.restore_state(dir.join(asset_id))?;
        }
        assets.insert(asset_id.to_string(), Arc::new(Mutex::new(pipeline)));
        Ok(())
    }

    /// Pipeline of `asset_id`
    pub fn pipeline(&self, asset_id: &str) -> MlResult<Arc<Mutex<AssetPipeline>>> {
        let assets = self.assets.read().map_err(|_| MlError::Poisoned("fleet assets"))?;
        assets
            .get(asset_id)
            .cloned()
            .ok_or_else(|| MlError::UnknownAsset(asset_id.to_string()))
    }

    /// Registered asset ids, sorted
    pub fn assets(&self) -> MlResult<Vec<String>> {
        let assets = self.assets.read().map_err(|_| MlError::Poisoned("fleet assets"))?;
        let mut ids: Vec<String> = assets.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Score one window of `asset_id`
    pub async fn process_window(&self, asset_id: &str, window: &Window) -> MlResult<EnsembleResult> {
        let pipeline = self.pipeline(asset_id)?;
        let mut pipeline = pipeline.lock().await;
        pipeline.process_window(window).await
    }

    /// Route operator feedback to `asset_id`
    pub async fn feedback(&self, asset_id: &str, feedback: &Feedback) -> MlResult<FeedbackOutcome> {
        let pipeline = self.pipeline(asset_id)?;
        let mut pipeline = pipeline.lock().await;
        Ok(pipeline.apply_feedback(feedback))
    }

    /// Feedback stamped with the fleet clock
    pub async fn confirm(&self, asset_id: &str, alert_id: &str, confirmed: bool) -> MlResult<FeedbackOutcome> {
        let feedback = Feedback {
            alert_id: alert_id.to_string(),
            confirmed,
            timestamp: self.clock.now(),
        };
        self.feedback(asset_id, &feedback).await
    }

    /// Totals of `asset_id`
    pub async fn summary(&self, asset_id: &str) -> MlResult<PredictionSummary> {
        let pipeline = self.pipeline(asset_id)?;
        let pipeline = pipeline.lock().await;
        Ok(pipeline.summary().clone())
    }

    /// RUL projection of `asset_id`
    pub async fn rul(&self, asset_id: &str) -> MlResult<RulEstimate> {
        let pipeline = self.pipeline(asset_id)?;
        let pipeline = pipeline.lock().await;
        Ok(pipeline.rul())
    }

    /// Take pending drift events of `asset_id`
    pub async fn drift_events(&self, asset_id: &str) -> MlResult<Vec<DriftDetected>> {
        let pipeline = self.pipeline(asset_id)?;
        let mut pipeline = pipeline.lock().await;
        Ok(pipeline.drain_drift_events())
    }

    /// Save every asset's state; returns the number saved
    pub async fn save_all(&self) -> MlResult<usize> {
        let Some(dir) = &self.config.state_dir else {
            return Ok(0);
        };
        let pipelines: Vec<(String, Arc<Mutex<AssetPipeline>>)> = {
            let assets = self.assets.read().map_err(|_| MlError::Poisoned("fleet assets"))?;
            assets.iter().map(|(id, p)| (id.clone(), Arc::clone(p))).collect()
        };
        for (id, pipeline) in &pipelines {
            pipeline.lock().await.save_state(dir.join(id))?;
        }
        info!("Saved state of {} assets to {}", pipelines.len(), dir.display());
        Ok(pipelines.len())
    }

    /// Availability of the shared models
    pub fn health(&self) -> MlResult<FleetHealth> {
        let assets = self.assets.read().map_err(|_| MlError::Poisoned("fleet assets"))?.len();
        Ok(FleetHealth {
            status: self.registry.health(),
            detectors_loaded: self.registry.detectors().len(),
            detectors_expected: self.registry.expected_detectors(),
            assets,
        })
    }
}

impl fmt::Debug for Fleet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fleet")
            .field("config", &self.config)
            .field("detectors", &self.registry.detectors().len())
            .finish()
    }
}
