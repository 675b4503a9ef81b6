//! Isolation Forest detector
//!
//! ## Overview
//!
//! Isolation forests score a point by how few random axis-aligned cuts it
//! takes to separate it from the rest of the data. The forest is grown on
//! healthy normalized vectors; its raw score is then mapped onto `[0, 1]` by
//! a [`PercentileScaler`] fit on a held-out healthy set, so "typical healthy"
//! lands at 0 and "95th percentile healthy" at 1.
//!
//! ## Structure
//!
//! - [`node`]: flat-array tree nodes and the `c(n)` normalizer
//! - [`tree`]: recursive random partitioning
//! - [`forest`]: subsampling, ensemble path length, raw score
//!
//! ## Usage Example
//!
//! ```rust
//! use rotorguard_ml::isolation::{ForestConfig, IsolationModel};
//!
//! let healthy: Vec<Vec<f64>> = (0..200).map(|i| vec![(i % 7) as f64, (i % 11) as f64]).collect();
//! let holdout: Vec<Vec<f64>> = (0..50).map(|i| vec![(i % 5) as f64, (i % 3) as f64]).collect();
//! let config = ForestConfig { num_trees: 20, ..Default::default() };
//!
//! let model = IsolationModel::fit(&healthy, &holdout, &config).unwrap();
//! assert!(model.score(&[50.0, -50.0]).unwrap() > model.score(&[3.0, 5.0]).unwrap());
//! ```

pub mod forest;
pub mod node;
pub mod tree;

pub use forest::{ForestConfig, ForestStats, IsolationForest};
pub use node::{c_factor, Node, NodeType};
pub use tree::{IsolationTree, TreeConfig};

use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use rotorguard_core::errors::{ComputationError, InputError, StateCorruptionError};
use rotorguard_core::traits::Validate;
use rotorguard_schemas::{schemas, ArtifactKind, Versioned};

use crate::detector::{check_dimensions, Detector, DetectorScore, PercentileScaler, ScoringInput, ISOLATION};

/// Forest plus its score calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationModel {
    /// Trained forest
    pub forest: IsolationForest,
    /// Raw-score to `[0, 1]` map
    pub scaler: PercentileScaler,
}

impl IsolationModel {
    /// Grow on `healthy` and calibrate on the disjoint `holdout`
    pub fn fit(healthy: &[Vec<f64>], holdout: &[Vec<f64>], config: &ForestConfig) -> Result<Self, InputError> {
        let forest = IsolationForest::fit(healthy, config)?;
        let raw: Vec<f64> = holdout.iter().map(|x| forest.raw_score(x)).collect();
        let scaler = PercentileScaler::fit(&raw)?;
        info!(
            "Calibrated isolation forest: raw floor {:.4}, ceiling {:.4}",
            scaler.floor, scaler.ceiling
        );
        Ok(Self { forest, scaler })
    }

    /// Calibrated score of one vector
    pub fn score(&self, x: &[f64]) -> Result<f64, ComputationError> {
        check_dimensions(self.forest.dimensions(), x.len())?;
        let raw = self.forest.raw_score(x);
        if !raw.is_finite() {
            return Err(ComputationError::NonFiniteScore { detector: ISOLATION.into() });
        }
        Ok(self.scaler.scale(raw))
    }
}

impl Validate for IsolationModel {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        self.forest.validate()?;
        self.scaler.validate()
    }
}

impl Versioned for IsolationModel {
    const KIND: ArtifactKind = ArtifactKind::IsolationModel;
    const SCHEMA_VERSION: u32 = schemas::ISOLATION_MODEL_V1;
}

/// [`Detector`] backed by an [`IsolationModel`]
#[derive(Debug, Clone)]
pub struct IsolationDetector {
    model: Arc<IsolationModel>,
}

impl IsolationDetector {
    /// Wrap a loaded model
    pub fn new(model: IsolationModel) -> Self {
        Self { model: Arc::new(model) }
    }

    /// Underlying model
    pub fn model(&self) -> &IsolationModel {
        &self.model
    }
}

impl Detector for IsolationDetector {
    fn name(&self) -> &str {
        ISOLATION
    }

    fn score(&self, input: &ScoringInput) -> rotorguard_core::Result<DetectorScore> {
        let value = self.model.score(input.latest().values())?;
        Ok(DetectorScore::new(value, ISOLATION)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Rng;
    use rotorguard_core::normalize::NormalizedVector;
    use rotorguard_schemas::Artifact;

    fn gaussianish(rng: &mut Rng, n: usize, dims: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|_| {
                (0..dims)
                    .map(|_| (0..4).map(|_| rng.next_f64_range(-1.0, 1.0)).sum::<f64>() / 2.0)
                    .collect()
            })
            .collect()
    }

    fn model() -> IsolationModel {
        let mut rng = Rng::new(11);
        let healthy = gaussianish(&mut rng, 400, 4);
        let holdout = gaussianish(&mut rng, 100, 4);
        IsolationModel::fit(&healthy, &holdout, &ForestConfig { num_trees: 50, ..Default::default() }).unwrap()
    }

    #[test]
    fn outlier_scores_high() {
        let detector = IsolationDetector::new(model());
        let far = ScoringInput::single(NormalizedVector::from_values(vec![6.0; 4], 0, 0));
        let near = ScoringInput::single(NormalizedVector::from_values(vec![0.0; 4], 1, 0));

        assert_eq!(detector.score(&far).unwrap().value(), 1.0);
        assert!(detector.score(&near).unwrap().value() < 0.5);
    }

    #[test]
    fn wrong_width_is_a_computation_error() {
        let detector = IsolationDetector::new(model());
        let input = ScoringInput::single(NormalizedVector::from_values(vec![0.0; 3], 0, 0));
        let err = detector.score(&input).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn artifact_roundtrip_validates() {
        let model = model();
        let json = Artifact::new(model.clone()).to_json().unwrap();
        let back = Artifact::<IsolationModel>::from_json(&json).unwrap().into_payload();
        assert_eq!(back, model);

        let mut broken = model;
        broken.scaler.ceiling = broken.scaler.floor;
        let json = Artifact::new(broken).to_json().unwrap();
        assert!(Artifact::<IsolationModel>::from_json(&json).is_err());
    }
}
