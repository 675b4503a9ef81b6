//! Feature standardization against healthy-machine statistics
//!
//! Statistics are fit once, offline, on windows recorded while the machine
//! was known to be healthy. Fitting on mixed data would pull the mean toward
//! faulty behavior and shrink the z-scores that detectors rely on.
//!
//! ```rust
//! use rotorguard_core::features::{FeatureVector, FEATURE_COUNT};
//! use rotorguard_core::normalize::{NormalizationStats, Normalizer};
//!
//! let healthy: Vec<FeatureVector> = (0..10)
//!     .map(|i| FeatureVector::new([i as f64; FEATURE_COUNT], i, 0).unwrap())
//!     .collect();
//! let stats = NormalizationStats::fit(&healthy).unwrap();
//!
//! let mut normalizer = Normalizer::new();
//! normalizer.load(stats).unwrap();
//! let z = normalizer.normalize(&healthy[0]).unwrap();
//! assert!(z.values()[0] < 0.0);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{CalibrationError, InputError, StateCorruptionError};
use crate::features::{Feature, FeatureVector, FEATURE_COUNT};
use crate::time::Timestamp;
use crate::traits::Validate;

/// Lower bound applied to every standard deviation
pub const DEFAULT_STD_EPSILON: f64 = 1e-6;

/// Per-feature mean and standard deviation of healthy data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    /// Feature names in the order of `mean` and `std`
    pub features: Vec<String>,
    /// Per-feature mean
    pub mean: Vec<f64>,
    /// Per-feature standard deviation, clamped to at least `epsilon`
    pub std: Vec<f64>,
    /// Clamp applied to `std`
    pub epsilon: f64,
    /// Number of healthy vectors the stats were fit on
    pub sample_count: usize,
}

impl NormalizationStats {
    /// Fit on healthy vectors with the default epsilon
    pub fn fit(healthy: &[FeatureVector]) -> Result<Self, InputError> {
        Self::fit_with_epsilon(healthy, DEFAULT_STD_EPSILON)
    }

    /// Fit on healthy vectors, clamping std to at least `epsilon`
    pub fn fit_with_epsilon(healthy: &[FeatureVector], epsilon: f64) -> Result<Self, InputError> {
        if healthy.len() < 2 {
            return Err(InputError::InsufficientData { required: 2, available: healthy.len() });
        }
        if !(epsilon > 0.0 && epsilon.is_finite()) {
            return Err(InputError::InvalidConfig(format!("epsilon must be positive, got {}", epsilon)));
        }

        let n = healthy.len() as f64;
        let mut mean = vec![0.0; FEATURE_COUNT];
        for vector in healthy {
            for (m, v) in mean.iter_mut().zip(vector.values()) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut std = vec![0.0; FEATURE_COUNT];
        for vector in healthy {
            for ((s, v), m) in std.iter_mut().zip(vector.values()).zip(&mean) {
                *s += (v - m) * (v - m);
            }
        }
        std.iter_mut().for_each(|s| *s = (*s / n).sqrt().max(epsilon));

        Ok(Self {
            features: Feature::names(),
            mean,
            std,
            epsilon,
            sample_count: healthy.len(),
        })
    }

    /// Mean and std of one feature
    pub fn of(&self, feature: Feature) -> Option<(f64, f64)> {
        let idx = self.features.iter().position(|n| n == feature.name())?;
        Some((*self.mean.get(idx)?, *self.std.get(idx)?))
    }
}

impl Validate for NormalizationStats {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        let violated = |reason: String| StateCorruptionError::InvariantViolated {
            kind: "normalization_stats".into(),
            reason,
        };

        if self.features != Feature::names() {
            return Err(violated("feature layout does not match this build".into()));
        }
        if self.mean.len() != FEATURE_COUNT || self.std.len() != FEATURE_COUNT {
            return Err(violated(format!(
                "expected {} means and stds, found {} and {}",
                FEATURE_COUNT,
                self.mean.len(),
                self.std.len()
            )));
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(violated(format!("epsilon {} must be positive", self.epsilon)));
        }
        if let Some(i) = self.mean.iter().position(|m| !m.is_finite()) {
            return Err(violated(format!("mean of {} is not finite", Feature::ALL[i])));
        }
        if let Some(i) = self.std.iter().position(|s| !(s.is_finite() && *s >= self.epsilon)) {
            return Err(violated(format!("std of {} is below epsilon", Feature::ALL[i])));
        }
        Ok(())
    }
}

/// Feature vector expressed in z-scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedVector {
    values: Vec<f64>,
    window_index: u64,
    window_start: Timestamp,
}

impl NormalizedVector {
    /// Build from raw z-scores, mainly for tests and replays
    pub fn from_values(values: Vec<f64>, window_index: u64, window_start: Timestamp) -> Self {
        Self { values, window_index, window_start }
    }

    /// z-score of one feature
    pub fn get(&self, feature: Feature) -> f64 {
        self.values.get(feature.index()).copied().unwrap_or(0.0)
    }

    /// z-scores in layout order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Index of the source window
    pub fn window_index(&self) -> u64 {
        self.window_index
    }

    /// Start timestamp of the source window
    pub fn window_start(&self) -> Timestamp {
        self.window_start
    }
}

/// Applies loaded [`NormalizationStats`]
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    stats: Option<Arc<NormalizationStats>>,
}

impl Normalizer {
    /// Normalizer without statistics; `normalize` fails until `load` is called
    pub fn new() -> Self {
        Self { stats: None }
    }

    /// Normalizer sharing already-validated statistics
    pub fn with_stats(stats: Arc<NormalizationStats>) -> Result<Self, StateCorruptionError> {
        stats.validate()?;
        Ok(Self { stats: Some(stats) })
    }

    /// Validate and install statistics
    pub fn load(&mut self, stats: NormalizationStats) -> Result<(), StateCorruptionError> {
        stats.validate()?;
        self.stats = Some(Arc::new(stats));
        Ok(())
    }

    /// True once statistics are installed
    pub fn is_fitted(&self) -> bool {
        self.stats.is_some()
    }

    /// Installed statistics
    pub fn stats(&self) -> Option<&Arc<NormalizationStats>> {
        self.stats.as_ref()
    }

    /// `z = (v - mean) / std` for every feature
    pub fn normalize(&self, vector: &FeatureVector) -> Result<NormalizedVector, CalibrationError> {
        let stats = self.stats.as_ref().ok_or(CalibrationError::UnfittedStats)?;
        let values = vector
            .values()
            .iter()
            .zip(stats.mean.iter().zip(&stats.std))
            .map(|(v, (m, s))| (v - m) / s)
            .collect();
        Ok(NormalizedVector {
            values,
            window_index: vector.window_index(),
            window_start: vector.window_start(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors() -> Vec<FeatureVector> {
        (0..5)
            .map(|i| {
                let mut values = [1.0; FEATURE_COUNT];
                values[Feature::Rms.index()] = i as f64;
                FeatureVector::new(values, i, i * 100).unwrap()
            })
            .collect()
    }

    #[test]
    fn unfitted_normalizer_fails() {
        let normalizer = Normalizer::new();
        assert_eq!(
            normalizer.normalize(&vectors()[0]),
            Err(CalibrationError::UnfittedStats)
        );
    }

    #[test]
    fn fit_and_normalize() {
        let stats = NormalizationStats::fit(&vectors()).unwrap();
        let (mean, std) = stats.of(Feature::Rms).unwrap();
        assert_eq!(mean, 2.0);
        assert!((std - 2f64.sqrt()).abs() < 1e-12);

        let mut normalizer = Normalizer::new();
        normalizer.load(stats).unwrap();
        let z = normalizer.normalize(&vectors()[4]).unwrap();
        assert!((z.get(Feature::Rms) - 2.0 / 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(z.window_index(), 4);
        assert_eq!(z.window_start(), 400);
    }

    #[test]
    fn constant_features_are_clamped() {
        let stats = NormalizationStats::fit(&vectors()).unwrap();
        let (_, std) = stats.of(Feature::Peak).unwrap();
        assert_eq!(std, DEFAULT_STD_EPSILON);

        let normalizer = Normalizer::with_stats(Arc::new(stats)).unwrap();
        let z = normalizer.normalize(&vectors()[0]).unwrap();
        assert!(z.values().iter().all(|v| v.is_finite()));
        assert_eq!(z.get(Feature::Peak), 0.0);
    }

    #[test]
    fn fit_needs_two_vectors() {
        assert!(matches!(
            NormalizationStats::fit(&vectors()[..1]),
            Err(InputError::InsufficientData { required: 2, available: 1 })
        ));
    }

    #[test]
    fn tampered_stats_rejected() {
        let mut stats = NormalizationStats::fit(&vectors()).unwrap();
        stats.std[3] = 0.0;
        assert!(matches!(stats.validate(), Err(StateCorruptionError::InvariantViolated { .. })));

        let mut stats = NormalizationStats::fit(&vectors()).unwrap();
        stats.features.swap(0, 1);
        let mut normalizer = Normalizer::new();
        assert!(normalizer.load(stats).is_err());
        assert!(!normalizer.is_fitted());
    }

    #[test]
    fn stats_round_trip_json() {
        let stats = NormalizationStats::fit(&vectors()).unwrap();
        let json = serde_json::to_string(&stats).unwrap();
        let back: NormalizationStats = serde_json::from_str(&json).unwrap();
        assert_eq!(stats, back);
    }
}
