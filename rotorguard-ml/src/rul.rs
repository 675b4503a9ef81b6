//! Remaining useful life projection
//!
//! Health is `1 − composite`. The estimator keeps a rolling health series,
//! fits a least-squares trend and projects when the trend crosses the
//! failure threshold:
//!
//! ```text
//! linear:       h(t) = a + b·t
//! exponential:  ln h(t) = a + b·t
//!
//! remaining = (y_fail − ŷ(t_last)) / b          (b < 0)
//! interval  = same with b ∓ z·se(b)
//! ```
//!
//! Time is measured in hours. The projection is anchored at the fitted value
//! at the newest point, so a noisy last sample does not jerk the estimate.

use log::debug;
use serde::{Deserialize, Serialize};

use rotorguard_core::buffer::HistoryBuffer;
use rotorguard_core::errors::{InputError, StateCorruptionError};
use rotorguard_core::time::{Timestamp, MICROS_PER_HOUR};
use rotorguard_core::traits::Validate;
use rotorguard_schemas::{schemas, ArtifactKind, Versioned};

/// Floor applied to health before taking logs
const MIN_LOG_HEALTH: f64 = 1e-6;

/// Shape of the fitted trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendModel {
    /// Straight-line decay
    Linear,
    /// Log-linear decay
    Exponential,
}

/// RUL parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulConfig {
    /// Points needed before a projection is attempted
    pub min_points: usize,
    /// Health at which the asset counts as failed
    pub failure_threshold: f64,
    /// Interval width in slope standard errors
    pub z: f64,
    /// Trend shape
    pub model: TrendModel,
    /// Health points retained
    pub capacity: usize,
}

impl Default for RulConfig {
    fn default() -> Self {
        Self {
            min_points: 10,
            failure_threshold: 0.2,
            z: 1.96,
            model: TrendModel::Linear,
            capacity: 1_000,
        }
    }
}

impl RulConfig {
    /// Check parameters
    pub fn validate(&self) -> Result<(), InputError> {
        if self.min_points < 3 {
            return Err(InputError::InvalidConfig("min_points must be at least 3".into()));
        }
        if !(self.failure_threshold > 0.0 && self.failure_threshold < 1.0) {
            return Err(InputError::InvalidConfig(format!(
                "failure_threshold must be in (0, 1), got {}",
                self.failure_threshold
            )));
        }
        if !(self.z.is_finite() && self.z >= 0.0) {
            return Err(InputError::InvalidConfig(format!("z must be non-negative, got {}", self.z)));
        }
        if self.capacity < self.min_points {
            return Err(InputError::InvalidConfig("capacity must hold at least min_points".into()));
        }
        Ok(())
    }
}

/// One health observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthPoint {
    /// Window timestamp
    pub timestamp: Timestamp,
    /// `1 − composite`
    pub health: f64,
}

/// Persisted health series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthHistory {
    /// Points, oldest first
    pub points: Vec<HealthPoint>,
}

impl Validate for HealthHistory {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        let violated = |reason: String| StateCorruptionError::InvariantViolated {
            kind: "health_history".into(),
            reason,
        };
        if let Some(p) = self.points.iter().find(|p| !(0.0..=1.0).contains(&p.health)) {
            return Err(violated(format!("health {} at {} outside [0, 1]", p.health, p.timestamp)));
        }
        if self.points.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
            return Err(violated("timestamps go backwards".into()));
        }
        Ok(())
    }
}

impl Versioned for HealthHistory {
    const KIND: ArtifactKind = ArtifactKind::HealthHistory;
    const SCHEMA_VERSION: u32 = schemas::HEALTH_HISTORY_V1;
}

/// Why no projection was made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RulUnavailable {
    /// Too few points
    InsufficientPoints {
        /// Points required
        required: usize,
        /// Points held
        available: usize,
    },
    /// Every point has the same timestamp
    NoTimeSpan,
    /// Health is flat or improving
    NotDegrading {
        /// Fitted slope per hour
        slope: f64,
    },
}

/// Projection outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RulEstimate {
    /// Projection made
    Available {
        /// Hours until the trend crosses the failure threshold
        remaining_hours: f64,
        /// Pessimistic bound
        lower_hours: f64,
        /// Optimistic bound, `None` when the optimistic slope is not degrading
        upper_hours: Option<f64>,
        /// Newest health value
        current_health: f64,
        /// Fitted slope per hour, in health units (linear) or log-health units (exponential)
        slope_per_hour: f64,
        /// Trend shape used
        model: TrendModel,
        /// Points fitted
        points: usize,
    },
    /// No projection
    Unavailable(RulUnavailable),
}

impl RulEstimate {
    /// Remaining hours when available
    pub fn remaining_hours(&self) -> Option<f64> {
        match self {
            RulEstimate::Available { remaining_hours, .. } => Some(*remaining_hours),
            RulEstimate::Unavailable(_) => None,
        }
    }
}

/// Least-squares line with slope standard error
struct Fit {
    intercept: f64,
    slope: f64,
    slope_se: f64,
}

fn least_squares(t: &[f64], y: &[f64]) -> Option<Fit> {
    let n = t.len() as f64;
    let t_mean = t.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;
    let sxx: f64 = t.iter().map(|ti| (ti - t_mean).powi(2)).sum();
    if sxx <= 0.0 {
        return None;
    }
    let sxy: f64 = t.iter().zip(y).map(|(ti, yi)| (ti - t_mean) * (yi - y_mean)).sum();
    let slope = sxy / sxx;
    let intercept = y_mean - slope * t_mean;
    let sse: f64 = t
        .iter()
        .zip(y)
        .map(|(ti, yi)| (yi - intercept - slope * ti).powi(2))
        .sum();
    let variance = if t.len() > 2 { sse / (n - 2.0) } else { 0.0 };
    Some(Fit { intercept, slope, slope_se: (variance / sxx).sqrt() })
}

/// Per-asset health trend projector
#[derive(Debug, Clone)]
pub struct RulEstimator {
    config: RulConfig,
    history: HistoryBuffer<HealthPoint>,
}

impl RulEstimator {
    /// Empty estimator
    pub fn new(config: RulConfig) -> Result<Self, InputError> {
        config.validate()?;
        Ok(Self { history: HistoryBuffer::new(config.capacity), config })
    }

    /// Resume from a persisted series
    pub fn from_history(config: RulConfig, history: HealthHistory) -> crate::MlResult<Self> {
        config.validate()?;
        history.validate()?;
        Ok(Self {
            history: HistoryBuffer::from_ordered(config.capacity, history.points),
            config,
        })
    }

    /// Snapshot for persistence
    pub fn history(&self) -> HealthHistory {
        HealthHistory { points: self.history.to_vec() }
    }

    /// Append a health observation, clamped into `[0, 1]`
    pub fn record(&mut self, timestamp: Timestamp, health: f64) {
        self.history.push(HealthPoint { timestamp, health: health.clamp(0.0, 1.0) });
    }

    /// Project time to failure from the current series
    pub fn estimate(&self) -> RulEstimate {
        let points = self.history.to_vec();
        if points.len() < self.config.min_points {
            return RulEstimate::Unavailable(RulUnavailable::InsufficientPoints {
                required: self.config.min_points,
                available: points.len(),
            });
        }

        let origin = points[0].timestamp;
        let t: Vec<f64> = points
            .iter()
            .map(|p| p.timestamp.saturating_sub(origin) as f64 / MICROS_PER_HOUR as f64)
            .collect();
        let transform = |h: f64| match self.config.model {
            TrendModel::Linear => h,
            TrendModel::Exponential => h.max(MIN_LOG_HEALTH).ln(),
        };
        let y: Vec<f64> = points.iter().map(|p| transform(p.health)).collect();

        let Some(fit) = least_squares(&t, &y) else {
            return RulEstimate::Unavailable(RulUnavailable::NoTimeSpan);
        };
        let current_health = points[points.len() - 1].health;
        let threshold = self.config.failure_threshold;

        let available = |remaining: f64, lower: f64, upper: Option<f64>| RulEstimate::Available {
            remaining_hours: remaining,
            lower_hours: lower,
            upper_hours: upper,
            current_health,
            slope_per_hour: fit.slope,
            model: self.config.model,
            points: points.len(),
        };

        if current_health <= threshold {
            return available(0.0, 0.0, Some(0.0));
        }
        if fit.slope >= 0.0 {
            return RulEstimate::Unavailable(RulUnavailable::NotDegrading { slope: fit.slope });
        }

        let t_last = t[t.len() - 1];
        let gap = transform(threshold) - (fit.intercept + fit.slope * t_last);
        let hours = |slope: f64| (gap / slope).max(0.0);

        let remaining = hours(fit.slope);
        let spread = self.config.z * fit.slope_se;
        let lower = hours(fit.slope - spread);
        let optimistic = fit.slope + spread;
        let upper = (optimistic < 0.0).then(|| hours(optimistic));

        debug!(
            "RUL {:.1} h ({:.1} to {:?}) from {} points, slope {:.5}/h",
            remaining,
            lower,
            upper,
            points.len(),
            fit.slope
        );
        available(remaining, lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator(model: TrendModel) -> RulEstimator {
        RulEstimator::new(RulConfig { model, ..Default::default() }).unwrap()
    }

    #[test]
    fn linear_decay_projects_crossing() {
        let mut rul = estimator(TrendModel::Linear);
        for h in 0..20u64 {
            rul.record(h * MICROS_PER_HOUR, 1.0 - 0.01 * h as f64);
        }
        let RulEstimate::Available { remaining_hours, lower_hours, upper_hours, slope_per_hour, .. } = rul.estimate() else {
            panic!("expected an estimate");
        };
        assert!((remaining_hours - 61.0).abs() < 1e-6);
        assert!((slope_per_hour + 0.01).abs() < 1e-12);
        assert!((lower_hours - remaining_hours).abs() < 1e-6);
        assert!((upper_hours.unwrap() - remaining_hours).abs() < 1e-6);
    }

    #[test]
    fn exponential_decay_projects_crossing() {
        let mut rul = estimator(TrendModel::Exponential);
        for h in 0..20u64 {
            rul.record(h * MICROS_PER_HOUR, (-0.02 * h as f64).exp());
        }
        let expected = (0.2f64.ln() + 0.02 * 19.0) / -0.02;
        assert!((rul.estimate().remaining_hours().unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn noisy_interval_brackets_estimate() {
        let mut rul = estimator(TrendModel::Linear);
        for h in 0..40u64 {
            let wobble = if h % 2 == 0 { 0.02 } else { -0.02 };
            rul.record(h * MICROS_PER_HOUR, 0.95 - 0.005 * h as f64 + wobble);
        }
        let RulEstimate::Available { remaining_hours, lower_hours, upper_hours, .. } = rul.estimate() else {
            panic!("expected an estimate");
        };
        assert!(lower_hours < remaining_hours);
        assert!(upper_hours.map_or(true, |u| u > remaining_hours));
    }

    #[test]
    fn unavailable_reasons() {
        let mut rul = estimator(TrendModel::Linear);
        for i in 0..5 {
            rul.record(i, 0.9);
        }
        assert!(matches!(rul.estimate(), RulEstimate::Unavailable(RulUnavailable::InsufficientPoints { available: 5, .. })));

        let mut flat_time = estimator(TrendModel::Linear);
        for i in 0..12 {
            flat_time.record(7, 0.9 - 0.01 * i as f64);
        }
        assert_eq!(flat_time.estimate(), RulEstimate::Unavailable(RulUnavailable::NoTimeSpan));

        let mut improving = estimator(TrendModel::Linear);
        for h in 0..12u64 {
            improving.record(h * MICROS_PER_HOUR, 0.5 + 0.01 * h as f64);
        }
        assert!(matches!(improving.estimate(), RulEstimate::Unavailable(RulUnavailable::NotDegrading { .. })));
    }

    #[test]
    fn failed_asset_has_zero_remaining() {
        let mut rul = estimator(TrendModel::Linear);
        for h in 0..12u64 {
            rul.record(h * MICROS_PER_HOUR, 0.5 - 0.03 * h as f64);
        }
        assert_eq!(rul.estimate().remaining_hours(), Some(0.0));
    }

    #[test]
    fn history_roundtrip() {
        let mut rul = estimator(TrendModel::Linear);
        for h in 0..15u64 {
            rul.record(h * MICROS_PER_HOUR, 1.0 - 0.02 * h as f64);
        }
        let resumed = RulEstimator::from_history(RulConfig::default(), rul.history()).unwrap();
        assert_eq!(resumed.estimate(), rul.estimate());

        let broken = HealthHistory { points: vec![HealthPoint { timestamp: 5, health: 0.5 }, HealthPoint { timestamp: 1, health: 0.5 }] };
        assert!(RulEstimator::from_history(RulConfig::default(), broken).is_err());
    }
}
