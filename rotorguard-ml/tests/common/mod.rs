//! Shared fixtures for scoring-layer integration tests
//!
//! Detectors here are stubs with known outputs so assertions can be exact.
//! Normalization statistics come from real feature extraction over the
//! synthetic rotor in [`generators`].

#![allow(dead_code)]

pub mod generators;

use std::sync::Arc;
use std::time::Duration;

use rotorguard_core::errors::AvailabilityError;
use rotorguard_core::features::{FeatureConfig, FeatureExtractor};
use rotorguard_core::normalize::{NormalizationStats, NormalizedVector, Normalizer};
use rotorguard_core::window::WindowConfig;
use rotorguard_ml::detector::{Detector, DetectorScore, ScoringInput};
use rotorguard_ml::registry::InMemoryRegistry;

use generators::RotorSignal;

/// Window length used throughout
pub const WINDOW: usize = 1024;

/// Detector answering a fixed score
pub struct ConstantDetector {
    pub name: &'static str,
    pub score: f64,
    pub required: usize,
    pub delay: Option<Duration>,
}

impl ConstantDetector {
    pub fn new(name: &'static str, score: f64) -> Self {
        Self { name, score, required: 1, delay: None }
    }

    pub fn requiring(mut self, required: usize) -> Self {
        self.required = required;
        self
    }

    pub fn sleeping(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Detector for ConstantDetector {
    fn name(&self) -> &str {
        self.name
    }

    fn required_history(&self) -> usize {
        self.required
    }

    fn score(&self, _input: &ScoringInput) -> rotorguard_core::Result<DetectorScore> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(DetectorScore::new(self.score, self.name)?)
    }
}

/// Detector answering a fixed score until window `from`, then failing or stalling
pub struct GoesOffline {
    pub name: &'static str,
    pub score: f64,
    pub from: u64,
    pub stall: Option<Duration>,
}

impl GoesOffline {
    /// Reports the sensor offline from window `from` on
    pub fn failing(name: &'static str, score: f64, from: u64) -> Self {
        Self { name, score, from, stall: None }
    }

    /// Takes `stall` per window from window `from` on
    pub fn stalling(name: &'static str, score: f64, from: u64, stall: Duration) -> Self {
        Self { name, score, from, stall: Some(stall) }
    }
}

impl Detector for GoesOffline {
    fn name(&self) -> &str {
        self.name
    }

    fn score(&self, input: &ScoringInput) -> rotorguard_core::Result<DetectorScore> {
        if input.latest().window_index() >= self.from {
            match self.stall {
                Some(stall) => std::thread::sleep(stall),
                None => {
                    return Err(AvailabilityError::DetectorFailed {
                        detector: self.name.into(),
                        reason: "sensor offline".into(),
                    }
                    .into())
                }
            }
        }
        Ok(DetectorScore::new(self.score, self.name)?)
    }
}

/// Detector whose score grows with the mean absolute z-score of the latest window
pub struct ResponsiveDetector {
    pub name: &'static str,
    pub scale: f64,
}

impl Detector for ResponsiveDetector {
    fn name(&self) -> &str {
        self.name
    }

    fn score(&self, input: &ScoringInput) -> rotorguard_core::Result<DetectorScore> {
        let values = input.latest().values();
        let mean_abs = values.iter().map(|v| v.abs()).sum::<f64>() / values.len() as f64;
        Ok(DetectorScore::new(1.0 - (-mean_abs / self.scale).exp(), self.name)?)
    }
}

/// Statistics fit on `count` healthy windows of the reference rotor
pub fn healthy_stats(count: usize) -> NormalizationStats {
    let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
    let mut signal = RotorSignal::new(7);
    let features: Vec<_> = (0..count)
        .map(|_| extractor.extract(&signal.window(WINDOW, 1.0)).unwrap())
        .collect();
    NormalizationStats::fit(&features).unwrap()
}

/// Normalized healthy vectors from an independent seed
pub fn healthy_vectors(stats: &NormalizationStats, count: usize, seed: u64) -> Vec<NormalizedVector> {
    let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
    let normalizer = Normalizer::with_stats(Arc::new(stats.clone())).unwrap();
    let mut signal = RotorSignal::new(seed);
    (0..count)
        .map(|_| {
            let features = extractor.extract(&signal.window(WINDOW, 1.0)).unwrap();
            normalizer.normalize(&features).unwrap()
        })
        .collect()
}

/// Registry over `detectors` with freshly fit statistics
pub fn registry(detectors: Vec<Arc<dyn Detector>>) -> InMemoryRegistry {
    InMemoryRegistry::new(healthy_stats(24), detectors).unwrap()
}

/// Window geometry with non-overlapping windows
pub fn tiled() -> WindowConfig {
    WindowConfig { window_size: WINDOW, hop_size: WINDOW }
}
