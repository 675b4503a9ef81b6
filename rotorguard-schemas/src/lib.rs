//! Versioned Artifacts for Models and Per-Asset State
//!
//! ## Overview
//!
//! Everything RotorGuard reads from or writes to disk travels inside one
//! envelope:
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "kind": "threshold_state",
//!   "payload": { "warning_cut": 0.3, "critical_cut": 0.7, "...": "..." }
//! }
//! ```
//!
//! The envelope lets a loader refuse a file before touching its payload: a
//! threshold state handed to the drift loader, or a version this build has
//! never seen, fails with a [`StateCorruptionError`] instead of decoding into
//! garbage.
//!
//! ## Why JSON?
//!
//! Artifacts are small (a few kilobytes for state, a few megabytes for
//! network weights), written rarely and read once at startup. Human-readable
//! files make incident review and hand-editing of thresholds practical, and
//! offline training tooling in any language can produce them.
//!
//! ## Evolution Strategy
//!
//! 1. **Version per kind**: each [`ArtifactKind`] evolves independently
//! 2. **Registry decides**: the [`ArtifactRegistry`] lists which versions a
//!    build reads; deprecated versions still load but log a warning
//! 3. **Validate after decode**: every payload implements
//!    [`Validate`](rotorguard_core::traits::Validate) and is checked before use
//!
//! ## Persistence
//!
//! [`Artifact::save`] writes to a sibling temporary file and renames it over
//! the target, so a crash mid-write leaves the previous file intact.
//!
//! ## Usage Example
//!
//! ```rust
//! use rotorguard_core::features::{FeatureVector, FEATURE_COUNT};
//! use rotorguard_core::normalize::NormalizationStats;
//! use rotorguard_schemas::Artifact;
//!
//! let healthy: Vec<FeatureVector> = (0..4)
//!     .map(|i| FeatureVector::new([i as f64; FEATURE_COUNT], i, 0).unwrap())
//!     .collect();
//! let stats = NormalizationStats::fit(&healthy)?;
//!
//! let json = Artifact::new(stats.clone()).to_json()?;
//! let restored = Artifact::<NormalizationStats>::from_json(&json)?;
//! assert_eq!(restored.payload, stats);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use core::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use rotorguard_core::errors::StateCorruptionError;
use rotorguard_core::normalize::NormalizationStats;
use rotorguard_core::traits::Validate;

pub mod artifact;
pub mod registry;
pub mod schemas;

pub use artifact::Artifact;
pub use registry::{ArtifactMetadata, ArtifactRegistry, GLOBAL_REGISTRY};

/// Result type for artifact operations
pub type ArtifactResult<T> = core::result::Result<T, ArtifactError>;

/// Artifact-related errors
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Reading or writing the file failed
    #[error("Artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope or payload is unusable
    #[error(transparent)]
    Corrupt(#[from] StateCorruptionError),

    /// Payload could not be serialized
    #[error("Failed to encode artifact: {0}")]
    Encode(String),

    /// Registry has no entry for the requested kind or version
    #[error("Artifact not registered: {0}")]
    NotFound(String),

    /// Registry entry already exists
    #[error("Artifact already registered: {0}")]
    AlreadyRegistered(String),
}

impl From<ArtifactError> for rotorguard_core::Error {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::Io(e) => rotorguard_core::Error::Io(e),
            ArtifactError::Corrupt(e) => rotorguard_core::Error::StateCorruption(e),
            other => rotorguard_core::Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                other.to_string(),
            )),
        }
    }
}

/// What an artifact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Healthy-data feature mean and std
    NormalizationStats,
    /// Per-asset alert cuts and feedback window
    ThresholdState,
    /// Per-asset drift reference and episode state
    DriftState,
    /// Per-asset rolling health scores
    HealthHistory,
    /// Per-asset normalized vectors, tick sequence and fallback scores
    ScoringHistory,
    /// Healthy-data feature bin masses for drift checks
    DriftReference,
    /// Autoencoder weights and score scaler
    ReconstructionModel,
    /// Isolation forest trees and score scaler
    IsolationModel,
    /// Sequence model weights
    TemporalModel,
}

impl ArtifactKind {
    /// Every kind
    pub const ALL: [ArtifactKind; 9] = [
        ArtifactKind::NormalizationStats,
        ArtifactKind::ThresholdState,
        ArtifactKind::DriftState,
        ArtifactKind::HealthHistory,
        ArtifactKind::ScoringHistory,
        ArtifactKind::DriftReference,
        ArtifactKind::ReconstructionModel,
        ArtifactKind::IsolationModel,
        ArtifactKind::TemporalModel,
    ];

    /// Stable name used in envelopes and file names
    pub const fn name(self) -> &'static str {
        match self {
            ArtifactKind::NormalizationStats => "normalization_stats",
            ArtifactKind::ThresholdState => "threshold_state",
            ArtifactKind::DriftState => "drift_state",
            ArtifactKind::HealthHistory => "health_history",
            ArtifactKind::ScoringHistory => "scoring_history",
            ArtifactKind::DriftReference => "drift_reference",
            ArtifactKind::ReconstructionModel => "reconstruction_model",
            ArtifactKind::IsolationModel => "isolation_model",
            ArtifactKind::TemporalModel => "temporal_model",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload type that can be stored in an [`Artifact`]
pub trait Versioned: Serialize + DeserializeOwned + Validate {
    /// Kind recorded in the envelope
    const KIND: ArtifactKind;

    /// Version this build writes
    const SCHEMA_VERSION: u32;
}

impl Versioned for NormalizationStats {
    const KIND: ArtifactKind = ArtifactKind::NormalizationStats;
    const SCHEMA_VERSION: u32 = schemas::NORMALIZATION_STATS_V1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_serde() {
        for kind in ArtifactKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
    }

    #[test]
    fn corrupt_maps_to_fatal_core_error() {
        let err: rotorguard_core::Error =
            ArtifactError::Corrupt(StateCorruptionError::Decode("bad".into())).into();
        assert!(err.is_fatal());

        let err: rotorguard_core::Error = ArtifactError::NotFound("x".into()).into();
        assert!(!err.is_fatal());
    }
}
