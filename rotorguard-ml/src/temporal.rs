//! Sequence detector over recent feature history
//!
//! Stacked LSTM layers read the last K normalized vectors, oldest first. The
//! final hidden state feeds a small dense head ending in a sigmoid, so the
//! output is already a probability-like score in `[0, 1]` and needs no
//! percentile calibration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use rotorguard_core::errors::{AvailabilityError, ComputationError, StateCorruptionError};
use rotorguard_core::traits::Validate;
use rotorguard_schemas::{schemas, ArtifactKind, Versioned};

use crate::detector::{check_dimensions, Detector, DetectorScore, ScoringInput, TEMPORAL};
use crate::neural::{forward_stack, validate_stack, Activation, DenseLayer, LstmLayer};
use crate::rng::Rng;

/// Vectors consumed per score
pub const DEFAULT_SEQUENCE_LENGTH: usize = 100;

fn violated(reason: String) -> StateCorruptionError {
    StateCorruptionError::InvariantViolated { kind: "temporal_model".into(), reason }
}

/// LSTM stack plus dense head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceModel {
    /// Recurrent layers, applied in order
    pub lstm: Vec<LstmLayer>,
    /// Dense layers over the final hidden state; the last has one sigmoid output
    pub head: Vec<DenseLayer>,
    /// Number of vectors per sequence
    pub sequence_length: usize,
}

impl SequenceModel {
    /// Randomly initialized model: LSTM(64), LSTM(32), dense 16 ReLU, dense 1 sigmoid
    pub fn seeded(input_size: usize, sequence_length: usize, seed: u64) -> Self {
        let mut rng = Rng::new(seed);
        Self {
            lstm: vec![
                LstmLayer::seeded(input_size, 64, &mut rng),
                LstmLayer::seeded(64, 32, &mut rng),
            ],
            head: vec![
                DenseLayer::seeded(32, 16, Activation::Relu, &mut rng),
                DenseLayer::seeded(16, 1, Activation::Sigmoid, &mut rng),
            ],
            sequence_length,
        }
    }

    /// Width of each step
    pub fn input_size(&self) -> usize {
        self.lstm.first().map(|l| l.input_size).unwrap_or(0)
    }

    /// Score a sequence, oldest step first
    pub fn predict<S: AsRef<[f64]>>(&self, steps: &[S]) -> Result<f64, ComputationError> {
        for step in steps {
            check_dimensions(self.input_size(), step.as_ref().len())?;
        }
        let mut sequence: Vec<Vec<f64>> = steps.iter().map(|s| s.as_ref().to_vec()).collect();
        for layer in &self.lstm {
            sequence = layer.forward_sequence(&sequence);
        }
        let last = sequence.pop().unwrap_or_default();
        let out = forward_stack(&self.head, &last);
        match out.first() {
            Some(v) if v.is_finite() => Ok(*v),
            _ => Err(ComputationError::NonFiniteScore { detector: TEMPORAL.into() }),
        }
    }
}

impl Validate for SequenceModel {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        if self.sequence_length == 0 {
            return Err(violated("sequence length must be positive".into()));
        }
        if self.lstm.is_empty() {
            return Err(violated("no recurrent layers".into()));
        }
        for layer in &self.lstm {
            layer.validate()?;
        }
        for (i, pair) in self.lstm.windows(2).enumerate() {
            if pair[0].hidden_size != pair[1].input_size {
                return Err(violated(format!("lstm layer {} feeds {} into {}", i, pair[0].hidden_size, pair[1].input_size)));
            }
        }

        validate_stack("temporal_model", &self.head)?;
        let hidden = self.lstm.last().map(|l| l.hidden_size).unwrap_or(0);
        match (self.head.first(), self.head.last()) {
            (Some(first), Some(last)) => {
                if first.input_dim() != hidden {
                    return Err(violated(format!("head expects {} inputs, lstm yields {}", first.input_dim(), hidden)));
                }
                if last.output_dim() != 1 || last.activation != Activation::Sigmoid {
                    return Err(violated("head must end in one sigmoid output".into()));
                }
                Ok(())
            }
            _ => Err(violated("no head layers".into())),
        }
    }
}

impl Versioned for SequenceModel {
    const KIND: ArtifactKind = ArtifactKind::TemporalModel;
    const SCHEMA_VERSION: u32 = schemas::TEMPORAL_MODEL_V1;
}

/// [`Detector`] over the last `sequence_length` vectors
#[derive(Debug, Clone)]
pub struct TemporalDetector {
    model: Arc<SequenceModel>,
}

impl TemporalDetector {
    /// Wrap a loaded model
    pub fn new(model: SequenceModel) -> Self {
        Self { model: Arc::new(model) }
    }
}

impl Detector for TemporalDetector {
    fn name(&self) -> &str {
        TEMPORAL
    }

    fn required_history(&self) -> usize {
        self.model.sequence_length
    }

    fn score(&self, input: &ScoringInput) -> rotorguard_core::Result<DetectorScore> {
        let required = self.model.sequence_length;
        let Some(steps) = input.tail(required) else {
            return Err(AvailabilityError::InsufficientHistory {
                required,
                available: input.history().len(),
            }
            .into());
        };
        let steps: Vec<&[f64]> = steps.iter().map(|v| v.values()).collect();
        let value = self.model.predict(&steps)?;
        Ok(DetectorScore::new(value, TEMPORAL)?)
    }
}
