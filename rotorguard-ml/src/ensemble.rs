//! Ensemble scoring and alert classification
//!
//! ## Overview
//!
//! Every tick the ensemble runs each detector that has enough history on the
//! tokio blocking pool, waits for all of them up to one shared deadline, and
//! combines whoever answered:
//!
//! ```text
//! composite = Σ w_i · s_i      over available detectors i
//! w_i       = configured_i / Σ configured_j   (renormalized over the subset)
//! ```
//!
//! If every configured weight in the subset is zero the subset is weighted
//! equally. The composite is classified against [`Cuts`]: the bootstrap cuts
//! (0.3, 0.7) until the adaptive threshold takes over.
//!
//! ## Degradation
//!
//! | Situation                | Behavior                                   |
//! |--------------------------|--------------------------------------------|
//! | Too little history       | detector skipped, marked unavailable       |
//! | Detector error           | detector marked unavailable with reason    |
//! | Detector timeout         | [`TimeoutPolicy`] decides                  |
//! | Earlier call still running | not called again, [`TimeoutPolicy`] decides |
//! | Nobody answered          | `NoDetectorAvailable`, [`UnavailablePolicy`] decides |
//!
//! A blocking task cannot be cancelled, so a late call keeps its pool thread
//! until it returns. The scorer holds on to its handle and leaves that
//! detector out of later ticks until the call has finished, which keeps one
//! hung detector from taking a new thread every tick.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use rotorguard_core::errors::{AvailabilityError, CalibrationError, InputError, StateCorruptionError};
use rotorguard_core::time::Timestamp;
use rotorguard_core::traits::Validate;

use crate::detector::{Detector, DetectorScore, ScoringInput, ISOLATION, RECONSTRUCTION, TEMPORAL};

/// Default per-tick detector budget
pub const DEFAULT_DETECTOR_TIMEOUT_MS: u64 = 500;

/// Composite above which a window counts as an anomaly in summaries
pub const DEFAULT_ANOMALY_CUT: f64 = 0.5;

/// What to do with a detector that misses the deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Drop it from this tick
    Skip,
    /// Use its last successful score, marked stale
    ReuseStale,
    /// Fail the whole tick
    FailTick,
}

/// What to do when no detector answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailablePolicy {
    /// Repeat the previous result, flagged `reused`
    ReuseLast,
    /// Return `NoDetectorAvailable` to the caller
    ReportUnavailable,
}

/// Ensemble parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Configured weight per detector name; missing names weigh zero
    pub weights: BTreeMap<String, f64>,
    /// Budget shared by all detectors on one tick
    pub detector_timeout_ms: u64,
    /// Fallback for late detectors
    pub timeout_policy: TimeoutPolicy,
    /// Fallback when nobody answered
    pub unavailable_policy: UnavailablePolicy,
    /// Composite above which a window is counted as anomalous
    pub anomaly_cut: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        let weights = [(RECONSTRUCTION, 0.4), (ISOLATION, 0.3), (TEMPORAL, 0.3)]
            .into_iter()
            .map(|(name, w)| (name.to_string(), w))
            .collect();
        Self {
            weights,
            detector_timeout_ms: DEFAULT_DETECTOR_TIMEOUT_MS,
            timeout_policy: TimeoutPolicy::Skip,
            unavailable_policy: UnavailablePolicy::ReportUnavailable,
            anomaly_cut: DEFAULT_ANOMALY_CUT,
        }
    }
}

impl EnsembleConfig {
    /// Check parameters
    pub fn validate(&self) -> Result<(), InputError> {
        if let Some((name, w)) = self.weights.iter().find(|(_, w)| !(w.is_finite() && **w >= 0.0)) {
            return Err(InputError::InvalidConfig(format!(
                "weight of {} must be finite and non-negative, got {}",
                name, w
            )));
        }
        if self.detector_timeout_ms == 0 {
            return Err(InputError::InvalidConfig("detector_timeout_ms must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.anomaly_cut) {
            return Err(InputError::InvalidConfig(format!(
                "anomaly_cut must be in [0, 1], got {}",
                self.anomaly_cut
            )));
        }
        Ok(())
    }

    /// Configured weight of `name`
    pub fn weight(&self, name: &str) -> f64 {
        self.weights.get(name).copied().unwrap_or(0.0)
    }
}

/// Scale `raw` to sum to one; equal shares when the sum is zero
pub fn renormalize(raw: &[f64]) -> Vec<f64> {
    let total: f64 = raw.iter().sum();
    if total > 0.0 {
        raw.iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / raw.len().max(1) as f64; raw.len()]
    }
}

/// Alert classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    /// Below the warning cut
    Normal,
    /// Between the cuts
    Warning,
    /// At or above the critical cut
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertLevel::Normal => "normal",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        })
    }
}

/// Decision boundaries, `0 <= warning < critical <= 1`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cuts {
    /// Composite at or above which an alert is at least a warning
    pub warning: f64,
    /// Composite at or above which an alert is critical
    pub critical: f64,
}

impl Cuts {
    /// Cuts used before enough feedback exists
    pub const BOOTSTRAP: Cuts = Cuts { warning: 0.3, critical: 0.7 };

    /// Checked constructor
    pub fn new(warning: f64, critical: f64) -> Result<Self, CalibrationError> {
        let cuts = Self { warning, critical };
        if !cuts.is_ordered() {
            return Err(CalibrationError::InvalidThresholds { warning, critical });
        }
        Ok(cuts)
    }

    fn is_ordered(&self) -> bool {
        self.warning.is_finite()
            && self.critical.is_finite()
            && self.warning >= 0.0
            && self.critical <= 1.0
            && self.critical > self.warning
    }

    /// Level of `composite`
    pub fn classify(&self, composite: f64) -> AlertLevel {
        if composite >= self.critical {
            AlertLevel::Critical
        } else if composite >= self.warning {
            AlertLevel::Warning
        } else {
            AlertLevel::Normal
        }
    }
}

impl Default for Cuts {
    fn default() -> Self {
        Self::BOOTSTRAP
    }
}

impl Validate for Cuts {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        if !self.is_ordered() {
            return Err(StateCorruptionError::InvariantViolated {
                kind: "cuts".into(),
                reason: format!("warning {} must be below critical {} within [0, 1]", self.warning, self.critical),
            });
        }
        Ok(())
    }
}

/// How a detector took part in a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectorStatus {
    /// Fresh score
    Scored,
    /// Last good score reused after a timeout
    Stale,
    /// No contribution this tick
    Unavailable {
        /// Why
        reason: String,
    },
}

/// One detector's contribution to an [`EnsembleResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutcome {
    /// Detector name
    pub name: String,
    /// Participation
    pub status: DetectorStatus,
    /// Score used, if any
    pub score: Option<f64>,
    /// Renormalized weight, zero when unavailable
    pub weight: f64,
}

impl DetectorOutcome {
    /// True when the score entered the composite
    pub fn is_available(&self) -> bool {
        self.score.is_some()
    }
}

/// Per-window decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    /// Asset the window came from
    pub asset_id: String,
    /// Key for operator feedback
    pub alert_id: String,
    /// Source window index
    pub window_index: u64,
    /// Source window start
    pub timestamp: Timestamp,
    /// Every configured detector, available or not
    pub outcomes: Vec<DetectorOutcome>,
    /// Weighted score in `[0, 1]`
    pub composite: f64,
    /// Classification under `cuts`
    pub alert_level: AlertLevel,
    /// `composite > anomaly_cut`
    pub is_anomaly: bool,
    /// Cuts applied
    pub cuts: Cuts,
    /// True when `cuts` came from feedback rather than bootstrap
    pub adaptive: bool,
    /// True when this repeats an earlier result because nobody answered
    pub reused: bool,
}

impl EnsembleResult {
    /// Names of detectors that contributed
    pub fn contributors(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter(|o| o.is_available()).map(|o| o.name.as_str())
    }

    /// Copy of this result re-stamped for a later window
    pub fn reuse_for(&self, alert_id: String, window_index: u64, timestamp: Timestamp) -> Self {
        Self {
            alert_id,
            window_index,
            timestamp,
            reused: true,
            ..self.clone()
        }
    }
}

/// Detector reading before weighting
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Detector name
    pub name: String,
    /// Participation
    pub status: DetectorStatus,
    /// Score, if any
    pub score: Option<f64>,
}

impl Reading {
    fn unavailable(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: DetectorStatus::Unavailable { reason: reason.into() },
            score: None,
        }
    }
}

/// Weighted outcomes and their composite
#[derive(Debug, Clone, PartialEq)]
pub struct Combined {
    /// Per-detector outcomes with effective weights
    pub outcomes: Vec<DetectorOutcome>,
    /// Weighted score in `[0, 1]`
    pub composite: f64,
}

/// Per-detector work on one tick
enum Pending {
    Short(usize),
    Busy,
    Running(JoinHandle<rotorguard_core::Result<DetectorScore>>),
}

/// Runs detectors and combines their scores
pub struct EnsembleScorer {
    detectors: Vec<Arc<dyn Detector>>,
    config: EnsembleConfig,
    /// Last fresh score per detector, for [`TimeoutPolicy::ReuseStale`]
    stale: BTreeMap<String, f64>,
    /// Calls that missed their deadline and have not returned yet
    in_flight: HashMap<String, JoinHandle<rotorguard_core::Result<DetectorScore>>>,
}

impl EnsembleScorer {
    /// Scorer over `detectors` after validating `config`
    pub fn new(detectors: Vec<Arc<dyn Detector>>, config: EnsembleConfig) -> Result<Self, InputError> {
        config.validate()?;
        Ok(Self {
            detectors,
            config,
            stale: BTreeMap::new(),
            in_flight: HashMap::new(),
        })
    }

    /// Parameters in use
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Number of configured detectors
    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Longest history any detector asks for
    pub fn required_history(&self) -> usize {
        self.detectors.iter().map(|d| d.required_history()).max().unwrap_or(1)
    }

    /// Last fresh score per detector
    pub fn stale_scores(&self) -> &BTreeMap<String, f64> {
        &self.stale
    }

    /// Seed the last fresh scores, e.g. after a restart
    pub fn restore_stale(&mut self, stale: BTreeMap<String, f64>) {
        self.stale = stale;
    }

    /// Detectors whose timed-out call is still running
    pub fn busy_detectors(&mut self) -> Vec<String> {
        self.in_flight.retain(|_, handle| !handle.is_finished());
        let mut names: Vec<String> = self.in_flight.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run every eligible detector concurrently under one deadline
    ///
    /// Fails only on a fatal detector error or a timeout under
    /// [`TimeoutPolicy::FailTick`].
    pub async fn evaluate(&mut self, input: Arc<ScoringInput>) -> rotorguard_core::Result<Vec<Reading>> {
        let budget = Duration::from_millis(self.config.detector_timeout_ms);
        let deadline = tokio::time::Instant::now() + budget;
        let available = input.history().len();
        self.in_flight.retain(|_, handle| !handle.is_finished());

        let tasks: Vec<(String, Pending)> = self
            .detectors
            .iter()
            .map(|detector| {
                let name = detector.name().to_string();
                let required = detector.required_history();
                if available < required {
                    return (name, Pending::Short(required));
                }
                if self.in_flight.contains_key(&name) {
                    return (name, Pending::Busy);
                }
                let detector = Arc::clone(detector);
                let input = Arc::clone(&input);
                (name, Pending::Running(tokio::task::spawn_blocking(move || detector.score(&input))))
            })
            .collect();

        let mut readings = Vec::with_capacity(tasks.len());
        for (name, pending) in tasks {
            let mut handle = match pending {
                Pending::Short(required) => {
                    let reason = AvailabilityError::InsufficientHistory { required, available };
                    debug!("{} skipped: {}", name, reason);
                    readings.push(Reading::unavailable(&name, reason.to_string()));
                    continue;
                }
                Pending::Busy => {
                    let busy = AvailabilityError::DetectorBusy { detector: name.clone() };
                    warn!("{}", busy);
                    readings.push(self.late(name, busy)?);
                    continue;
                }
                Pending::Running(handle) => handle,
            };

            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(score))) => {
                    self.stale.insert(name.clone(), score.value());
                    readings.push(Reading { name, status: DetectorStatus::Scored, score: Some(score.value()) });
                }
                Ok(Ok(Err(err))) => {
                    if err.is_fatal() {
                        return Err(err);
                    }
                    warn!("{} unavailable: {}", name, err);
                    readings.push(Reading::unavailable(&name, err.to_string()));
                }
                Ok(Err(join)) => {
                    let reason = AvailabilityError::DetectorFailed { detector: name.clone(), reason: join.to_string() };
                    warn!("{}", reason);
                    readings.push(Reading::unavailable(&name, reason.to_string()));
                }
                Err(_) => {
                    let timeout = AvailabilityError::DetectorTimeout { detector: name.clone() };
                    warn!("{} after {:?}", timeout, budget);
                    self.in_flight.insert(name.clone(), handle);
                    readings.push(self.late(name, timeout)?);
                }
            }
        }
        Ok(readings)
    }

    /// Apply the timeout policy to a detector that did not answer in time
    fn late(&self, name: String, cause: AvailabilityError) -> rotorguard_core::Result<Reading> {
        match (self.config.timeout_policy, self.stale.get(&name)) {
            (TimeoutPolicy::FailTick, _) => Err(cause.into()),
            (TimeoutPolicy::ReuseStale, Some(&last)) => {
                Ok(Reading { name, status: DetectorStatus::Stale, score: Some(last) })
            }
            _ => Ok(Reading::unavailable(&name, cause.to_string())),
        }
    }

    /// Weight the available readings and compute the composite
    pub fn combine(&self, readings: Vec<Reading>) -> Result<Combined, AvailabilityError> {
        let raw: Vec<f64> = readings
            .iter()
            .filter(|r| r.score.is_some())
            .map(|r| self.config.weight(&r.name))
            .collect();
        if raw.is_empty() {
            return Err(AvailabilityError::NoDetectorAvailable);
        }
        let mut weights = renormalize(&raw).into_iter();

        let mut composite = 0.0;
        let outcomes = readings
            .into_iter()
            .map(|r| {
                let weight = match r.score {
                    Some(score) => {
                        let w = weights.next().unwrap_or(0.0);
                        composite += w * score;
                        w
                    }
                    None => 0.0,
                };
                DetectorOutcome { name: r.name, status: r.status, score: r.score, weight }
            })
            .collect();

        Ok(Combined { outcomes, composite: composite.clamp(0.0, 1.0) })
    }

    /// [`evaluate`](Self::evaluate) then [`combine`](Self::combine)
    pub async fn score(&mut self, input: Arc<ScoringInput>) -> rotorguard_core::Result<Combined> {
        let readings = self.evaluate(input).await?;
        Ok(self.combine(readings)?)
    }
}

impl fmt::Debug for EnsembleScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnsembleScorer")
            .field("detectors", &self.detectors.iter().map(|d| d.name()).collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}
