//! Feedback-driven alert thresholds
//!
//! ## Overview
//!
//! Each asset starts on the bootstrap cuts. Every emitted result is recorded
//! as a pending prediction keyed by its alert id. When an operator confirms or
//! rejects an alert the pair `(composite, confirmed)` joins a rolling window
//! of labeled outcomes (7 days by default).
//!
//! Once the window holds enough labels of both classes, every new label
//! triggers a grid search over candidate cuts `0.00, 0.02, …, 1.00`:
//!
//! ```text
//! subject to   FPR(warning)  <= max_warning_fpr
//!              FPR(critical) <= max_critical_fpr
//!              warning < critical
//! maximize     recall(warning), then recall(critical)
//! then         lower FPR(warning), then smallest move from current cuts
//! ```
//!
//! `FPR(c)` is the share of rejected alerts whose composite reached `c`;
//! `recall(c)` the share of confirmed alerts that did. If no candidate pair
//! is feasible the current cuts stay.
//!
//! ## Idempotence
//!
//! Feedback is keyed by alert id. A second delivery of the same id is
//! reported as [`FeedbackOutcome::Duplicate`] and changes nothing.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use rotorguard_core::errors::{InputError, StateCorruptionError};
use rotorguard_core::time::{Timestamp, MICROS_PER_DAY};
use rotorguard_core::traits::Validate;
use rotorguard_schemas::{schemas, ArtifactKind, Versioned};

use crate::ensemble::{AlertLevel, Cuts};

/// Threshold calibration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Cuts used until the handoff
    pub bootstrap: Cuts,
    /// Length of the rolling feedback window in days
    pub window_days: u32,
    /// FPR ceiling for the warning cut
    pub max_warning_fpr: f64,
    /// FPR ceiling for the critical cut
    pub max_critical_fpr: f64,
    /// Labeled outcomes required before adaptive cuts are used
    pub min_feedback: usize,
    /// Labeled outcomes of each class required before adaptive cuts are used
    pub min_per_class: usize,
    /// Grid intervals; candidates are `k / grid_steps` for `k = 0..=grid_steps`
    pub grid_steps: u32,
    /// Pending predictions retained while awaiting feedback
    pub max_pending: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            bootstrap: Cuts::BOOTSTRAP,
            window_days: 7,
            max_warning_fpr: 0.2,
            max_critical_fpr: 0.05,
            min_feedback: 20,
            min_per_class: 3,
            grid_steps: 50,
            max_pending: 10_000,
        }
    }
}

impl ThresholdConfig {
    /// Check parameters
    pub fn validate(&self) -> Result<(), InputError> {
        self.bootstrap
            .validate()
            .map_err(|e| InputError::InvalidConfig(e.to_string()))?;
        if self.window_days == 0 {
            return Err(InputError::InvalidConfig("window_days must be positive".into()));
        }
        for (name, v) in [("max_warning_fpr", self.max_warning_fpr), ("max_critical_fpr", self.max_critical_fpr)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(InputError::InvalidConfig(format!("{} must be in [0, 1], got {}", name, v)));
            }
        }
        if self.grid_steps < 2 {
            return Err(InputError::InvalidConfig("grid_steps must be at least 2".into()));
        }
        if self.max_pending == 0 {
            return Err(InputError::InvalidConfig("max_pending must be positive".into()));
        }
        Ok(())
    }

    fn window_micros(&self) -> u64 {
        u64::from(self.window_days) * MICROS_PER_DAY
    }
}

/// Operator verdict on an alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// Alert being judged
    pub alert_id: String,
    /// True when the operator confirmed a real fault
    pub confirmed: bool,
    /// When the verdict was given
    pub timestamp: Timestamp,
}

/// What happened to a [`Feedback`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// Stored; `recalibrated` when the cuts changed
    Applied {
        /// Cuts moved as a result
        recalibrated: bool,
    },
    /// Alert already judged; ignored
    Duplicate,
    /// No pending prediction with this id
    UnknownAlert,
    /// Verdict not stored
    Rejected {
        /// Why
        reason: String,
    },
}

/// Prediction awaiting a verdict
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingPrediction {
    /// Composite score emitted
    pub composite: f64,
    /// Level emitted
    pub level: AlertLevel,
    /// Window timestamp
    pub timestamp: Timestamp,
}

/// Prediction with its verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledOutcome {
    /// Alert id
    pub alert_id: String,
    /// Composite score emitted
    pub composite: f64,
    /// Level emitted
    pub level: AlertLevel,
    /// Operator verdict
    pub confirmed: bool,
    /// When the verdict was given
    pub timestamp: Timestamp,
}

/// Persisted per-asset threshold state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdState {
    /// Cuts currently applied
    pub cuts: Cuts,
    /// Rolling false-positive rate at the warning cut
    pub false_positive_rate: f64,
    /// Rolling true-positive rate at the warning cut
    pub true_positive_rate: f64,
    /// Last time the cuts changed
    pub last_updated: Timestamp,
    /// True once feedback-derived cuts are in use
    pub adaptive: bool,
    /// Labeled outcomes inside the rolling window, oldest first
    pub feedback: Vec<LabeledOutcome>,
    /// Predictions awaiting a verdict, by alert id
    pub pending: BTreeMap<String, PendingPrediction>,
}

impl ThresholdState {
    /// Fresh state on `cuts`
    pub fn new(cuts: Cuts) -> Self {
        Self {
            cuts,
            false_positive_rate: 0.0,
            true_positive_rate: 0.0,
            last_updated: 0,
            adaptive: false,
            feedback: Vec::new(),
            pending: BTreeMap::new(),
        }
    }
}

impl Validate for ThresholdState {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        let violated = |reason: String| StateCorruptionError::InvariantViolated {
            kind: "threshold_state".into(),
            reason,
        };
        self.cuts.validate()?;
        for (name, rate) in [("false_positive_rate", self.false_positive_rate), ("true_positive_rate", self.true_positive_rate)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(violated(format!("{} {} outside [0, 1]", name, rate)));
            }
        }
        if let Some(o) = self.feedback.iter().find(|o| !o.composite.is_finite()) {
            return Err(violated(format!("feedback {} has a non-finite composite", o.alert_id)));
        }
        if let Some((id, _)) = self.pending.iter().find(|(_, p)| !p.composite.is_finite()) {
            return Err(violated(format!("pending {} has a non-finite composite", id)));
        }
        Ok(())
    }
}

impl Versioned for ThresholdState {
    const KIND: ArtifactKind = ArtifactKind::ThresholdState;
    const SCHEMA_VERSION: u32 = schemas::THRESHOLD_STATE_V1;
}

/// Rates of one candidate cut over the labeled window
#[derive(Debug, Clone, Copy)]
struct CutRates {
    cut: f64,
    fpr: f64,
    recall: f64,
}

/// Per-asset threshold state machine
#[derive(Debug, Clone)]
pub struct AdaptiveThreshold {
    config: ThresholdConfig,
    state: ThresholdState,
}

impl AdaptiveThreshold {
    /// Fresh thresholds on the bootstrap cuts
    pub fn new(config: ThresholdConfig) -> Result<Self, InputError> {
        config.validate()?;
        let state = ThresholdState::new(config.bootstrap);
        Ok(Self { config, state })
    }

    /// Resume from persisted state
    pub fn from_state(config: ThresholdConfig, state: ThresholdState) -> crate::MlResult<Self> {
        config.validate()?;
        state.validate()?;
        info!(
            "Restored thresholds: warning {:.2}, critical {:.2}, {} labeled, adaptive {}",
            state.cuts.warning,
            state.cuts.critical,
            state.feedback.len(),
            state.adaptive
        );
        Ok(Self { config, state })
    }

    /// Cuts to classify with
    pub fn cuts(&self) -> Cuts {
        self.state.cuts
    }

    /// True once feedback-derived cuts are in use
    pub fn is_adaptive(&self) -> bool {
        self.state.adaptive
    }

    /// Current state
    pub fn state(&self) -> &ThresholdState {
        &self.state
    }

    /// Parameters in use
    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Remember an emitted result so feedback can refer to it
    pub fn record_prediction(&mut self, alert_id: &str, composite: f64, level: AlertLevel, timestamp: Timestamp) {
        self.state
            .pending
            .insert(alert_id.to_string(), PendingPrediction { composite, level, timestamp });

        let horizon = timestamp.saturating_sub(self.config.window_micros());
        self.state.pending.retain(|_, p| p.timestamp >= horizon);
        while self.state.pending.len() > self.config.max_pending {
            let oldest = self
                .state
                .pending
                .iter()
                .min_by_key(|(_, p)| p.timestamp)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    self.state.pending.remove(&id);
                }
                None => break,
            }
        }
    }

    /// Apply one operator verdict
    pub fn apply_feedback(&mut self, feedback: &Feedback) -> FeedbackOutcome {
        if self.state.feedback.iter().any(|o| o.alert_id == feedback.alert_id) {
            debug!("Duplicate feedback for {}", feedback.alert_id);
            return FeedbackOutcome::Duplicate;
        }
        let newest = self.state.feedback.iter().map(|o| o.timestamp).max().unwrap_or(0);
        if feedback.timestamp.saturating_add(self.config.window_micros()) < newest {
            return FeedbackOutcome::Rejected {
                reason: format!("feedback at {} is older than the rolling window", feedback.timestamp),
            };
        }
        let Some(prediction) = self.state.pending.remove(&feedback.alert_id) else {
            debug!("Feedback for unknown alert {}", feedback.alert_id);
            return FeedbackOutcome::UnknownAlert;
        };

        self.state.feedback.push(LabeledOutcome {
            alert_id: feedback.alert_id.clone(),
            composite: prediction.composite,
            level: prediction.level,
            confirmed: feedback.confirmed,
            timestamp: feedback.timestamp,
        });
        let horizon = feedback.timestamp.max(newest).saturating_sub(self.config.window_micros());
        self.state.feedback.retain(|o| o.timestamp >= horizon);

        let recalibrated = self.ready() && self.recalibrate(feedback.timestamp);
        self.update_rates();
        FeedbackOutcome::Applied { recalibrated }
    }

    /// Labeled outcomes in the window as `(total, confirmed, rejected)`
    pub fn label_counts(&self) -> (usize, usize, usize) {
        let confirmed = self.state.feedback.iter().filter(|o| o.confirmed).count();
        let total = self.state.feedback.len();
        (total, confirmed, total - confirmed)
    }

    fn ready(&self) -> bool {
        let (total, positives, negatives) = self.label_counts();
        total >= self.config.min_feedback
            && positives >= self.config.min_per_class
            && negatives >= self.config.min_per_class
    }

    fn rates_at(&self, cut: f64) -> CutRates {
        let (mut tp, mut fp, mut pos, mut neg) = (0usize, 0usize, 0usize, 0usize);
        for o in &self.state.feedback {
            let alerted = o.composite >= cut;
            if o.confirmed {
                pos += 1;
                tp += alerted as usize;
            } else {
                neg += 1;
                fp += alerted as usize;
            }
        }
        let ratio = |a: usize, b: usize| if b == 0 { 0.0 } else { a as f64 / b as f64 };
        CutRates { cut, fpr: ratio(fp, neg), recall: ratio(tp, pos) }
    }

    fn update_rates(&mut self) {
        let rates = self.rates_at(self.state.cuts.warning);
        self.state.false_positive_rate = rates.fpr;
        self.state.true_positive_rate = rates.recall;
    }

    /// Grid search; true when the cuts changed
    fn recalibrate(&mut self, now: Timestamp) -> bool {
        let steps = self.config.grid_steps;
        let grid: Vec<CutRates> = (0..=steps)
            .map(|k| self.rates_at(f64::from(k) / f64::from(steps)))
            .collect();

        let current = self.state.cuts;
        let mut best: Option<(CutRates, CutRates)> = None;
        for (i, w) in grid.iter().enumerate() {
            if w.fpr > self.config.max_warning_fpr {
                continue;
            }
            for c in &grid[i + 1..] {
                if c.fpr > self.config.max_critical_fpr {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some((bw, bc)) => {
                        let moved = |w: f64, c: f64| (w - current.warning).abs() + (c - current.critical).abs();
                        let key = (w.recall, c.recall, -w.fpr, -moved(w.cut, c.cut));
                        let best_key = (bw.recall, bc.recall, -bw.fpr, -moved(bw.cut, bc.cut));
                        key > best_key
                    }
                };
                if better {
                    best = Some((*w, *c));
                }
            }
        }

        let Some((w, c)) = best else {
            warn!(
                "No feasible cuts for {} labeled outcomes; keeping warning {:.2}, critical {:.2}",
                self.state.feedback.len(),
                current.warning,
                current.critical
            );
            return false;
        };
        let Ok(cuts) = Cuts::new(w.cut, c.cut) else {
            warn!("Rejected threshold update to ({}, {})", w.cut, c.cut);
            return false;
        };

        if !self.state.adaptive {
            info!(
                "Threshold handoff after {} labeled outcomes: warning {:.2}, critical {:.2}",
                self.state.feedback.len(),
                cuts.warning,
                cuts.critical
            );
        }
        let changed = cuts != current;
        if changed {
            debug!(
                "Cuts moved from ({:.2}, {:.2}) to ({:.2}, {:.2}), recall {:.2}/{:.2}",
                current.warning, current.critical, cuts.warning, cuts.critical, w.recall, c.recall
            );
            self.state.last_updated = now;
        }
        self.state.cuts = cuts;
        self.state.adaptive = true;
        changed
    }
}
