//! Feature drift monitoring
//!
//! ## Overview
//!
//! Detector calibration is fixed at load time, so the pipeline needs a
//! signal telling operators when live data no longer looks like the data the
//! detectors were calibrated on. Every `check_interval` windows the monitor
//! histograms the recent normalized vectors per feature over fixed z-space
//! bins and compares them to a reference with the Population Stability
//! Index:
//!
//! ```text
//! PSI_f = Σ_b (p_cur[b] − p_ref[b]) · ln(p_cur[b] / p_ref[b])
//! drift = mean_f PSI_f
//!
//! bins: (−∞, −3) [−3, −2.5) … [2.5, 3) [3, ∞)     (14 bins)
//! ```
//!
//! ## Hysteresis
//!
//! A single over-threshold check is never enough. [`DriftDetected`] is raised
//! once `consecutive_required` checks in a row exceed the threshold, and only
//! once per episode. An under-threshold check ends the episode.
//!
//! The monitor is advisory: it never touches thresholds or calibration.

use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use rotorguard_core::buffer::HistoryBuffer;
use rotorguard_core::errors::{InputError, StateCorruptionError};
use rotorguard_core::features::Feature;
use rotorguard_core::normalize::NormalizedVector;
use rotorguard_core::time::Timestamp;
use rotorguard_core::traits::Validate;
use rotorguard_schemas::{schemas, ArtifactKind, Versioned};

/// Inner bin edges in z-space
pub const BIN_EDGES: [f64; 13] = [-3.0, -2.5, -2.0, -1.5, -1.0, -0.5, 0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0];

/// Bins including the two open tails
pub const BIN_COUNT: usize = BIN_EDGES.len() + 1;

/// Drift monitor parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Windows between checks
    pub check_interval: u64,
    /// Recent vectors compared to the reference
    pub buffer_size: usize,
    /// Mean PSI above which a check counts as drifted
    pub threshold: f64,
    /// Consecutive drifted checks before an event
    pub consecutive_required: u32,
    /// Floor applied to bin proportions
    pub epsilon: f64,
    /// Budget for one check
    pub drift_timeout_ms: u64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            check_interval: 50,
            buffer_size: 200,
            threshold: 0.2,
            consecutive_required: 2,
            epsilon: 1e-4,
            drift_timeout_ms: 250,
        }
    }
}

impl DriftConfig {
    /// Check parameters
    pub fn validate(&self) -> Result<(), InputError> {
        if self.check_interval == 0 || self.buffer_size == 0 {
            return Err(InputError::InvalidConfig("check_interval and buffer_size must be positive".into()));
        }
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(InputError::InvalidConfig(format!("threshold must be positive, got {}", self.threshold)));
        }
        if self.consecutive_required == 0 {
            return Err(InputError::InvalidConfig("consecutive_required must be at least 1".into()));
        }
        if !(self.epsilon > 0.0 && self.epsilon < 1.0 / BIN_COUNT as f64) {
            return Err(InputError::InvalidConfig(format!("epsilon {} out of range", self.epsilon)));
        }
        if self.drift_timeout_ms == 0 {
            return Err(InputError::InvalidConfig("drift_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

fn bin_of(z: f64) -> usize {
    BIN_EDGES.iter().take_while(|edge| z >= **edge).count()
}

/// Per-feature bin proportions of `rows`
fn histogram<R: AsRef<[f64]>>(rows: &[R], dims: usize) -> Vec<Vec<f64>> {
    let mut counts = vec![vec![0.0; BIN_COUNT]; dims];
    for row in rows {
        for (feature, z) in row.as_ref().iter().take(dims).enumerate() {
            counts[feature][bin_of(*z)] += 1.0;
        }
    }
    let n = rows.len().max(1) as f64;
    for bins in &mut counts {
        bins.iter_mut().for_each(|c| *c /= n);
    }
    counts
}

/// Error function, Abramowitz and Stegun 7.1.26
fn erf(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.327_591_1 * x.abs());
    let poly = t * (0.254_829_592 + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let y = 1.0 - poly * (-x * x).exp();
    if x >= 0.0 {
        y
    } else {
        -y
    }
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Reference bin proportions per feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReference {
    /// `bins[feature][bin]`, each row summing to one
    pub bins: Vec<Vec<f64>>,
}

impl DriftReference {
    /// Histogram of healthy normalized vectors
    pub fn from_vectors(healthy: &[NormalizedVector]) -> Result<Self, InputError> {
        let dims = healthy.first().map(|v| v.values().len()).unwrap_or(0);
        if healthy.is_empty() || dims == 0 {
            return Err(InputError::InsufficientData { required: 1, available: 0 });
        }
        if healthy.iter().any(|v| v.values().len() != dims) {
            return Err(InputError::InvalidConfig("reference vectors differ in width".into()));
        }
        let rows: Vec<&[f64]> = healthy.iter().map(NormalizedVector::values).collect();
        Ok(Self { bins: histogram(&rows, dims) })
    }

    /// Standard normal bin masses for `dims` features
    pub fn standard_normal(dims: usize) -> Self {
        let mut masses = Vec::with_capacity(BIN_COUNT);
        let mut previous = 0.0;
        for edge in BIN_EDGES {
            let cdf = normal_cdf(edge);
            masses.push(cdf - previous);
            previous = cdf;
        }
        masses.push(1.0 - previous);
        Self { bins: vec![masses; dims] }
    }

    /// Number of features
    pub fn dimensions(&self) -> usize {
        self.bins.len()
    }
}

impl Validate for DriftReference {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        for (i, bins) in self.bins.iter().enumerate() {
            let total: f64 = bins.iter().sum();
            if bins.len() != BIN_COUNT || bins.iter().any(|p| !(p.is_finite() && *p >= 0.0)) || (total - 1.0).abs() > 1e-6 {
                return Err(StateCorruptionError::InvariantViolated {
                    kind: "drift_reference".into(),
                    reason: format!("feature {} does not hold {} proportions summing to one", i, BIN_COUNT),
                });
            }
        }
        if self.bins.is_empty() {
            return Err(StateCorruptionError::InvariantViolated {
                kind: "drift_reference".into(),
                reason: "no features".into(),
            });
        }
        Ok(())
    }
}

impl Versioned for DriftReference {
    const KIND: ArtifactKind = ArtifactKind::DriftReference;
    const SCHEMA_VERSION: u32 = schemas::DRIFT_REFERENCE_V1;
}

/// Snapshot handed to a (possibly off-thread) drift computation
#[derive(Debug, Clone)]
pub struct DriftCheck {
    reference: Arc<DriftReference>,
    recent: Vec<Vec<f64>>,
    epsilon: f64,
    timestamp: Timestamp,
}

impl DriftCheck {
    /// Compute PSI per feature and its mean
    pub fn compute(&self) -> DriftMeasurement {
        let dims = self.reference.dimensions();
        let current = histogram(&self.recent, dims);
        let eps = self.epsilon;
        let per_feature: Vec<f64> = current
            .iter()
            .zip(&self.reference.bins)
            .map(|(cur, reference)| {
                cur.iter()
                    .zip(reference)
                    .map(|(c, r)| {
                        let (c, r) = (c.max(eps), r.max(eps));
                        (c - r) * (c / r).ln()
                    })
                    .sum()
            })
            .collect();
        let score = per_feature.iter().sum::<f64>() / per_feature.len().max(1) as f64;
        DriftMeasurement { score, per_feature, current, timestamp: self.timestamp }
    }
}

/// Result of one check
#[derive(Debug, Clone, PartialEq)]
pub struct DriftMeasurement {
    /// Mean PSI
    pub score: f64,
    /// PSI per feature
    pub per_feature: Vec<f64>,
    /// Current bin proportions
    pub current: Vec<Vec<f64>>,
    /// Timestamp of the window that triggered the check
    pub timestamp: Timestamp,
}

/// Advisory event: live features have left the reference distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftDetected {
    /// Mean PSI of the check that raised the event
    pub score: f64,
    /// Consecutive drifted checks so far
    pub consecutive: u32,
    /// Timestamp of the triggering window
    pub timestamp: Timestamp,
    /// Up to three most drifted features with their PSI
    pub top_features: Vec<(String, f64)>,
}

/// Persisted per-asset drift state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftState {
    /// Reference proportions
    pub reference: DriftReference,
    /// Proportions at the last check
    pub current: Option<Vec<Vec<f64>>>,
    /// Mean PSI at the last check
    pub score: f64,
    /// Drifted checks in a row
    pub consecutive: u32,
    /// Timestamp of the last check
    pub last_check: Option<Timestamp>,
    /// True while an event has been raised and not yet resolved
    pub in_episode: bool,
    /// Windows seen since the last check
    pub since_check: u64,
    /// Recent normalized values, oldest first
    pub recent: Vec<Vec<f64>>,
}

impl Validate for DriftState {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        self.reference.validate()?;
        let dims = self.reference.dimensions();
        if !(self.score.is_finite() && self.score >= 0.0) {
            return Err(StateCorruptionError::InvariantViolated {
                kind: "drift_state".into(),
                reason: format!("score {} is not a valid divergence", self.score),
            });
        }
        if self.recent.iter().any(|r| r.len() != dims || r.iter().any(|v| !v.is_finite())) {
            return Err(StateCorruptionError::InvariantViolated {
                kind: "drift_state".into(),
                reason: format!("recent buffer does not hold finite {}-wide rows", dims),
            });
        }
        Ok(())
    }
}

impl Versioned for DriftState {
    const KIND: ArtifactKind = ArtifactKind::DriftState;
    const SCHEMA_VERSION: u32 = schemas::DRIFT_STATE_V1;
}

/// Per-asset drift monitor
#[derive(Debug, Clone)]
pub struct DriftMonitor {
    config: DriftConfig,
    reference: Arc<DriftReference>,
    recent: HistoryBuffer<Vec<f64>>,
    since_check: u64,
    current: Option<Vec<Vec<f64>>>,
    score: f64,
    consecutive: u32,
    last_check: Option<Timestamp>,
    in_episode: bool,
}

impl DriftMonitor {
    /// Monitor against `reference`
    pub fn new(config: DriftConfig, reference: DriftReference) -> crate::MlResult<Self> {
        config.validate()?;
        reference.validate()?;
        Ok(Self {
            recent: HistoryBuffer::new(config.buffer_size),
            config,
            reference: Arc::new(reference),
            since_check: 0,
            current: None,
            score: 0.0,
            consecutive: 0,
            last_check: None,
            in_episode: false,
        })
    }

    /// Resume from persisted state
    pub fn from_state(config: DriftConfig, state: DriftState) -> crate::MlResult<Self> {
        config.validate()?;
        state.validate()?;
        Ok(Self {
            recent: HistoryBuffer::from_ordered(config.buffer_size, state.recent),
            config,
            reference: Arc::new(state.reference),
            since_check: state.since_check,
            current: state.current,
            score: state.score,
            consecutive: state.consecutive,
            last_check: state.last_check,
            in_episode: state.in_episode,
        })
    }

    /// Snapshot for persistence
    pub fn state(&self) -> DriftState {
        DriftState {
            reference: (*self.reference).clone(),
            current: self.current.clone(),
            score: self.score,
            consecutive: self.consecutive,
            last_check: self.last_check,
            in_episode: self.in_episode,
            since_check: self.since_check,
            recent: self.recent.to_vec(),
        }
    }

    /// Parameters in use
    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Mean PSI at the last check
    pub fn score(&self) -> f64 {
        self.score
    }

    /// True while drift is being reported
    pub fn in_episode(&self) -> bool {
        self.in_episode
    }

    /// Buffer `vector`; returns a check when one is due
    pub fn record(&mut self, vector: &NormalizedVector) -> Option<DriftCheck> {
        self.recent.push(vector.values().to_vec());
        self.since_check += 1;
        if self.since_check < self.config.check_interval {
            return None;
        }
        self.since_check = 0;
        Some(DriftCheck {
            reference: Arc::clone(&self.reference),
            recent: self.recent.to_vec(),
            epsilon: self.config.epsilon,
            timestamp: vector.window_start(),
        })
    }

    /// Fold a finished check into the hysteresis state
    pub fn apply(&mut self, measurement: DriftMeasurement) -> Option<DriftDetected> {
        self.score = measurement.score;
        self.last_check = Some(measurement.timestamp);

        if measurement.score <= self.config.threshold {
            if self.in_episode {
                debug!("Drift resolved at score {:.3}", measurement.score);
            }
            self.consecutive = 0;
            self.in_episode = false;
            self.current = Some(measurement.current);
            return None;
        }

        self.consecutive += 1;
        debug!(
            "Drift check over threshold: {:.3} > {:.3} ({} in a row)",
            measurement.score, self.config.threshold, self.consecutive
        );
        let event = if self.consecutive >= self.config.consecutive_required && !self.in_episode {
            self.in_episode = true;
            let event = DriftDetected {
                score: measurement.score,
                consecutive: self.consecutive,
                timestamp: measurement.timestamp,
                top_features: top_features(&measurement.per_feature),
            };
            warn!("Drift detected: score {:.3}, top features {:?}", event.score, event.top_features);
            Some(event)
        } else {
            None
        };
        self.current = Some(measurement.current);
        event
    }

    /// Record, compute inline and apply
    pub fn observe(&mut self, vector: &NormalizedVector) -> Option<DriftDetected> {
        let check = self.record(vector)?;
        self.apply(check.compute())
    }
}

fn top_features(per_feature: &[f64]) -> Vec<(String, f64)> {
    let mut ranked: Vec<(usize, f64)> = per_feature.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
        .into_iter()
        .take(3)
        .map(|(i, psi)| {
            let name = Feature::ALL
                .get(i)
                .map(|f| f.name().to_string())
                .unwrap_or_else(|| format!("feature_{}", i));
            (name, psi)
        })
        .collect()
}
