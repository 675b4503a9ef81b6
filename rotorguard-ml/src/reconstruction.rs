//! Autoencoder reconstruction detector
//!
//! A dense autoencoder trained on healthy vectors reconstructs healthy input
//! well and everything else poorly. The raw score is the mean squared
//! reconstruction error, calibrated onto `[0, 1]` with a
//! [`PercentileScaler`] fit on held-out healthy errors.

use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use rotorguard_core::errors::{ComputationError, InputError, StateCorruptionError};
use rotorguard_core::traits::Validate;
use rotorguard_schemas::{schemas, ArtifactKind, Versioned};

use crate::detector::{check_dimensions, Detector, DetectorScore, PercentileScaler, ScoringInput, RECONSTRUCTION};
use crate::neural::{forward_stack, validate_stack, Activation, DenseLayer};
use crate::rng::Rng;

/// Layer widths of the default encoder, bottleneck last
pub const DEFAULT_ENCODER: [usize; 5] = [30, 128, 64, 32, 16];

/// Dense autoencoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Autoencoder {
    /// Encoder then decoder layers
    pub layers: Vec<DenseLayer>,
}

impl Autoencoder {
    /// Check shapes and wrap
    pub fn new(layers: Vec<DenseLayer>) -> Result<Self, StateCorruptionError> {
        let ae = Self { layers };
        ae.validate()?;
        Ok(ae)
    }

    /// Mirror-symmetric ReLU network with a linear output, randomly initialized
    ///
    /// `encoder` lists widths from input to bottleneck.
    pub fn seeded(encoder: &[usize], seed: u64) -> Self {
        let mut rng = Rng::new(seed);
        let mut widths = encoder.to_vec();
        widths.extend(encoder.iter().rev().skip(1));
        let last = widths.len().saturating_sub(2);
        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let activation = if i == last { Activation::Linear } else { Activation::Relu };
                DenseLayer::seeded(pair[0], pair[1], activation, &mut rng)
            })
            .collect();
        Self { layers }
    }

    /// Width of input and output
    pub fn dimensions(&self) -> usize {
        self.layers.first().map(DenseLayer::input_dim).unwrap_or(0)
    }

    /// Reconstruction of `x`
    pub fn reconstruct(&self, x: &[f64]) -> Vec<f64> {
        forward_stack(&self.layers, x)
    }

    /// Mean squared reconstruction error
    pub fn error(&self, x: &[f64]) -> f64 {
        let y = self.reconstruct(x);
        if x.is_empty() {
            return 0.0;
        }
        x.iter().zip(&y).map(|(a, b)| (a - b) * (a - b)).sum::<f64>() / x.len() as f64
    }
}

impl Validate for Autoencoder {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        validate_stack("autoencoder", &self.layers)?;
        let (Some(first), Some(last)) = (self.layers.first(), self.layers.last()) else {
            return Err(StateCorruptionError::InvariantViolated {
                kind: "autoencoder".into(),
                reason: "no layers".into(),
            });
        };
        if first.input_dim() != last.output_dim() {
            return Err(StateCorruptionError::InvariantViolated {
                kind: "autoencoder".into(),
                reason: format!(
                    "input width {} differs from output width {}",
                    first.input_dim(),
                    last.output_dim()
                ),
            });
        }
        Ok(())
    }
}

/// Autoencoder plus its score calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionModel {
    /// Trained network
    pub autoencoder: Autoencoder,
    /// Error to `[0, 1]` map
    pub scaler: PercentileScaler,
}

impl ReconstructionModel {
    /// Fit the scaler on held-out healthy vectors
    pub fn calibrate(autoencoder: Autoencoder, holdout: &[Vec<f64>]) -> Result<Self, InputError> {
        let errors: Vec<f64> = holdout.iter().map(|x| autoencoder.error(x)).collect();
        let scaler = PercentileScaler::fit(&errors)?;
        info!(
            "Calibrated autoencoder: error floor {:.5}, ceiling {:.5}",
            scaler.floor, scaler.ceiling
        );
        Ok(Self { autoencoder, scaler })
    }

    /// Calibrated score of one vector
    pub fn score(&self, x: &[f64]) -> Result<f64, ComputationError> {
        check_dimensions(self.autoencoder.dimensions(), x.len())?;
        let raw = self.autoencoder.error(x);
        if !raw.is_finite() {
            return Err(ComputationError::NonFiniteScore { detector: RECONSTRUCTION.into() });
        }
        Ok(self.scaler.scale(raw))
    }
}

impl Validate for ReconstructionModel {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        self.autoencoder.validate()?;
        self.scaler.validate()
    }
}

impl Versioned for ReconstructionModel {
    const KIND: ArtifactKind = ArtifactKind::ReconstructionModel;
    const SCHEMA_VERSION: u32 = schemas::RECONSTRUCTION_MODEL_V1;
}

/// [`Detector`] backed by a [`ReconstructionModel`]
#[derive(Debug, Clone)]
pub struct ReconstructionDetector {
    model: Arc<ReconstructionModel>,
}

impl ReconstructionDetector {
    /// Wrap a loaded model
    pub fn new(model: ReconstructionModel) -> Self {
        Self { model: Arc::new(model) }
    }
}

impl Detector for ReconstructionDetector {
    fn name(&self) -> &str {
        RECONSTRUCTION
    }

    fn score(&self, input: &ScoringInput) -> rotorguard_core::Result<DetectorScore> {
        let value = self.model.score(input.latest().values())?;
        Ok(DetectorScore::new(value, RECONSTRUCTION)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotorguard_core::normalize::NormalizedVector;

    /// Identity on two inputs through a ReLU pair that splits sign
    fn identity_ae() -> Autoencoder {
        Autoencoder::new(vec![
            DenseLayer::new(
                vec![vec![1.0, 0.0], vec![-1.0, 0.0], vec![0.0, 1.0], vec![0.0, -1.0]],
                vec![0.0; 4],
                Activation::Relu,
            )
            .unwrap(),
            DenseLayer::new(
                vec![vec![1.0, -1.0, 0.0, 0.0], vec![0.0, 0.0, 1.0, -1.0]],
                vec![0.0; 2],
                Activation::Linear,
            )
            .unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn identity_reconstructs_exactly() {
        let ae = identity_ae();
        assert_eq!(ae.reconstruct(&[0.5, -2.0]), vec![0.5, -2.0]);
        assert_eq!(ae.error(&[0.5, -2.0]), 0.0);
    }

    #[test]
    fn default_shape() {
        let ae = Autoencoder::seeded(&DEFAULT_ENCODER, 7);
        assert_eq!(ae.layers.len(), 8);
        assert_eq!(ae.dimensions(), 30);
        assert_eq!(ae.layers[3].output_dim(), 16);
        assert_eq!(ae.layers[7].activation, Activation::Linear);
        assert_eq!(ae.layers[6].activation, Activation::Relu);
        assert!(ae.validate().is_ok());
    }

    #[test]
    fn asymmetric_network_rejected() {
        let mut rng = Rng::new(1);
        let layers = vec![
            DenseLayer::seeded(4, 2, Activation::Relu, &mut rng),
            DenseLayer::seeded(2, 3, Activation::Linear, &mut rng),
        ];
        assert!(Autoencoder::new(layers).is_err());
        assert!(Autoencoder::new(Vec::new()).is_err());
    }

    #[test]
    fn detector_scales_error() {
        // Squash the second input so only the first is reconstructed
        let mut ae = identity_ae();
        ae.layers[1].weights[1] = vec![0.0; 4];
        let holdout: Vec<Vec<f64>> = (0..=20).map(|i| vec![0.0, i as f64 * 0.1]).collect();
        let model = ReconstructionModel::calibrate(ae, &holdout).unwrap();
        let detector = ReconstructionDetector::new(model);

        let calm = ScoringInput::single(NormalizedVector::from_values(vec![3.0, 0.0], 0, 0));
        let loud = ScoringInput::single(NormalizedVector::from_values(vec![0.0, 10.0], 1, 0));
        assert_eq!(detector.score(&calm).unwrap().value(), 0.0);
        assert_eq!(detector.score(&loud).unwrap().value(), 1.0);

        let wide = ScoringInput::single(NormalizedVector::from_values(vec![0.0; 30], 2, 0));
        assert!(detector.score(&wide).is_err());
    }
}
