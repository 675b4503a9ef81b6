//! Uniform detector contract
//!
//! Every anomaly detector, whatever its internals, answers one question: how
//! unusual is the latest window, on a scale from 0 (healthy) to 1 (certainly
//! anomalous)? Detectors whose native output is unbounded are mapped onto
//! that scale by a [`PercentileScaler`] fit once on held-out healthy data.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use rotorguard_core::errors::{ComputationError, InputError, StateCorruptionError};
use rotorguard_core::normalize::NormalizedVector;
use rotorguard_core::traits::Validate;

/// Name of the autoencoder detector
pub const RECONSTRUCTION: &str = "reconstruction";
/// Name of the isolation forest detector
pub const ISOLATION: &str = "isolation";
/// Name of the sequence detector
pub const TEMPORAL: &str = "temporal";

/// Scoring capability shared by all detectors
///
/// Implementations must be pure with respect to `input`: the ensemble calls
/// them concurrently from the blocking pool. A call that misses its deadline
/// is not cancelled; it runs to completion on its pool thread, and the
/// ensemble does not call that detector again until it has returned.
pub trait Detector: Send + Sync {
    /// Stable name, used as the weight key
    fn name(&self) -> &str;

    /// Normalized vectors needed before `score` can answer
    fn required_history(&self) -> usize {
        1
    }

    /// Score the latest window
    ///
    /// Returns an `AvailabilityError` when the detector cannot answer this
    /// tick and a `ComputationError` when its output is not finite.
    fn score(&self, input: &ScoringInput) -> rotorguard_core::Result<DetectorScore>;
}

/// Immutable input shared by every detector on a tick
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringInput {
    latest: NormalizedVector,
    history: Arc<[NormalizedVector]>,
}

impl ScoringInput {
    /// Input from a history ordered oldest to newest; the last entry is scored
    pub fn new(history: Vec<NormalizedVector>) -> Result<Self, InputError> {
        let latest = history
            .last()
            .cloned()
            .ok_or(InputError::InsufficientData { required: 1, available: 0 })?;
        Ok(Self { latest, history: history.into() })
    }

    /// Input with no history beyond the scored vector
    pub fn single(latest: NormalizedVector) -> Self {
        Self {
            history: Arc::from(vec![latest.clone()]),
            latest,
        }
    }

    /// Vector being scored
    pub fn latest(&self) -> &NormalizedVector {
        &self.latest
    }

    /// Buffered vectors, oldest first, ending with [`latest`](Self::latest)
    pub fn history(&self) -> &[NormalizedVector] {
        &self.history
    }

    /// Last `n` vectors, or `None` when fewer are buffered
    pub fn tail(&self, n: usize) -> Option<&[NormalizedVector]> {
        let len = self.history.len();
        (len >= n).then(|| &self.history[len - n..])
    }
}

/// Detector output in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct DetectorScore(f64);

impl DetectorScore {
    /// Clamp `value` into `[0, 1]`, rejecting NaN and infinities
    pub fn new(value: f64, detector: &str) -> Result<Self, ComputationError> {
        if !value.is_finite() {
            return Err(ComputationError::NonFiniteScore { detector: detector.to_string() });
        }
        Ok(Self(value.clamp(0.0, 1.0)))
    }

    /// Score value
    pub fn value(self) -> f64 {
        self.0
    }
}

/// Default lower percentile mapped to 0
pub const DEFAULT_FLOOR_PERCENTILE: f64 = 50.0;

/// Default upper percentile mapped to 1
pub const DEFAULT_CEILING_PERCENTILE: f64 = 95.0;

/// Linear map from raw detector output to `[0, 1]`
///
/// `floor` maps to 0 and `ceiling` to 1, with clamping outside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileScaler {
    /// Raw value mapped to 0
    pub floor: f64,
    /// Raw value mapped to 1
    pub ceiling: f64,
}

impl PercentileScaler {
    /// Fit on held-out healthy raw outputs with the default percentiles
    pub fn fit(raw: &[f64]) -> Result<Self, InputError> {
        Self::fit_percentiles(raw, DEFAULT_FLOOR_PERCENTILE, DEFAULT_CEILING_PERCENTILE)
    }

    /// Fit with explicit percentiles in `[0, 100]`, `low < high`
    pub fn fit_percentiles(raw: &[f64], low: f64, high: f64) -> Result<Self, InputError> {
        if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low >= high {
            return Err(InputError::InvalidConfig(format!(
                "percentiles must satisfy 0 <= low < high <= 100, got {} and {}",
                low, high
            )));
        }
        let mut sorted: Vec<f64> = raw.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.len() < 2 {
            return Err(InputError::InsufficientData { required: 2, available: sorted.len() });
        }
        sorted.sort_by(f64::total_cmp);

        let floor = percentile(&sorted, low);
        let mut ceiling = percentile(&sorted, high);
        if ceiling - floor < f64::EPSILON {
            ceiling = floor + f64::EPSILON.max(floor.abs() * 1e-9);
        }
        Ok(Self { floor, ceiling })
    }

    /// Map a raw output onto `[0, 1]`
    pub fn scale(&self, raw: f64) -> f64 {
        ((raw - self.floor) / (self.ceiling - self.floor)).clamp(0.0, 1.0)
    }
}

impl Validate for PercentileScaler {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        if !(self.floor.is_finite() && self.ceiling.is_finite() && self.ceiling > self.floor) {
            return Err(StateCorruptionError::InvariantViolated {
                kind: "percentile_scaler".into(),
                reason: format!("ceiling {} must exceed floor {}", self.ceiling, self.floor),
            });
        }
        Ok(())
    }
}

/// Linear-interpolated percentile of sorted values
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Check a vector's width against a model's input width
pub(crate) fn check_dimensions(expected: usize, actual: usize) -> Result<(), ComputationError> {
    if expected != actual {
        return Err(ComputationError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(v: f64, index: u64) -> NormalizedVector {
        NormalizedVector::from_values(vec![v; 3], index, index * 10)
    }

    #[test]
    fn score_is_clamped() {
        assert_eq!(DetectorScore::new(1.7, "x").unwrap().value(), 1.0);
        assert_eq!(DetectorScore::new(-0.2, "x").unwrap().value(), 0.0);
        assert_eq!(
            DetectorScore::new(f64::NAN, "iso"),
            Err(ComputationError::NonFiniteScore { detector: "iso".into() })
        );
    }

    #[test]
    fn scaler_maps_percentiles() {
        let raw: Vec<f64> = (0..=100).map(f64::from).collect();
        let scaler = PercentileScaler::fit(&raw).unwrap();
        assert!((scaler.floor - 50.0).abs() < 1e-12);
        assert!((scaler.ceiling - 95.0).abs() < 1e-12);
        assert_eq!(scaler.scale(10.0), 0.0);
        assert!((scaler.scale(72.5) - 0.5).abs() < 1e-12);
        assert_eq!(scaler.scale(500.0), 1.0);
        assert!(scaler.validate().is_ok());
    }

    #[test]
    fn scaler_survives_constant_input() {
        let scaler = PercentileScaler::fit(&[2.0; 10]).unwrap();
        assert!(scaler.validate().is_ok());
        assert_eq!(scaler.scale(2.0), 0.0);
        assert_eq!(scaler.scale(3.0), 1.0);
    }

    #[test]
    fn scaler_rejects_bad_input() {
        assert!(PercentileScaler::fit(&[1.0]).is_err());
        assert!(PercentileScaler::fit_percentiles(&[1.0, 2.0], 90.0, 10.0).is_err());
    }

    #[test]
    fn scoring_input_history() {
        let input = ScoringInput::new((0..5).map(|i| vector(i as f64, i)).collect()).unwrap();
        assert_eq!(input.latest().window_index(), 4);
        assert_eq!(input.tail(2).unwrap().len(), 2);
        assert_eq!(input.tail(2).unwrap()[0].window_index(), 3);
        assert!(input.tail(6).is_none());
        assert!(ScoringInput::new(Vec::new()).is_err());

        let single = ScoringInput::single(vector(1.0, 9));
        assert_eq!(single.history().len(), 1);
    }
}
