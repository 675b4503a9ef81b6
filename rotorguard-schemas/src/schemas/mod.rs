//! Artifact versions understood by this build
//!
//! Bump a constant when the payload layout of its kind changes, and register
//! the previous version as deprecated in [`defaults`] for as long as old files
//! should still load.

use crate::registry::ArtifactMetadata;
use crate::ArtifactKind;

/// Feature names, mean and std
pub const NORMALIZATION_STATS_V1: u32 = 1;

/// Cuts, rolling rates, feedback window and pending predictions
pub const THRESHOLD_STATE_V1: u32 = 1;

/// Reference and recent bin masses, episode counter, recent buffer
pub const DRIFT_STATE_V1: u32 = 1;

/// Timestamped health scores
pub const HEALTH_HISTORY_V1: u32 = 1;

/// Recent normalized vectors, next tick sequence, last result, stale scores
pub const SCORING_HISTORY_V1: u32 = 1;

/// Per-feature bin masses of the healthy training set
pub const DRIFT_REFERENCE_V1: u32 = 1;

/// Dense encoder/decoder layers and percentile scaler
pub const RECONSTRUCTION_MODEL_V1: u32 = 1;

/// Trees, subsample size and percentile scaler
pub const ISOLATION_MODEL_V1: u32 = 1;

/// LSTM stack, dense head and sequence length
pub const TEMPORAL_MODEL_V1: u32 = 1;

/// Metadata for every version this build reads
pub fn defaults() -> Vec<ArtifactMetadata> {
    [
        (ArtifactKind::NormalizationStats, NORMALIZATION_STATS_V1),
        (ArtifactKind::ThresholdState, THRESHOLD_STATE_V1),
        (ArtifactKind::DriftState, DRIFT_STATE_V1),
        (ArtifactKind::HealthHistory, HEALTH_HISTORY_V1),
        (ArtifactKind::ScoringHistory, SCORING_HISTORY_V1),
        (ArtifactKind::DriftReference, DRIFT_REFERENCE_V1),
        (ArtifactKind::ReconstructionModel, RECONSTRUCTION_MODEL_V1),
        (ArtifactKind::IsolationModel, ISOLATION_MODEL_V1),
        (ArtifactKind::TemporalModel, TEMPORAL_MODEL_V1),
    ]
    .into_iter()
    .map(|(kind, version)| ArtifactMetadata::new(kind, version))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_default() {
        let defaults = defaults();
        for kind in ArtifactKind::ALL {
            assert!(defaults.iter().any(|m| m.kind == kind));
        }
    }
}
