//! Model registries
//!
//! A registry hands the pipeline its read-only inputs: normalization
//! statistics and the detectors. Normalization statistics are mandatory.
//! Detectors are not; a registry missing one of them still serves, and
//! reports itself degraded.
//!
//! ## Directory layout
//!
//! ```text
//! models/
//! ├── normalization.json    required
//! ├── reconstruction.json   optional
//! ├── isolation.json        optional
//! ├── temporal.json         optional
//! └── drift_reference.json  optional
//! ```
//!
//! Each file is a versioned artifact. A missing detector file is skipped
//! with a warning; a present but unreadable one is an error. Without a
//! drift reference, drift is measured against the standard normal.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use rotorguard_core::normalize::NormalizationStats;
use rotorguard_core::traits::Validate;
use rotorguard_schemas::artifact::load_optional;
use rotorguard_schemas::{Artifact, ArtifactError};

use crate::detector::Detector;
use crate::drift::DriftReference;
use crate::isolation::{IsolationDetector, IsolationModel};
use crate::reconstruction::{ReconstructionDetector, ReconstructionModel};
use crate::temporal::{SequenceModel, TemporalDetector};
use crate::MlResult;

/// Normalization statistics file
pub const NORMALIZATION_FILE: &str = "normalization.json";
/// Autoencoder file
pub const RECONSTRUCTION_FILE: &str = "reconstruction.json";
/// Isolation forest file
pub const ISOLATION_FILE: &str = "isolation.json";
/// Sequence model file
pub const TEMPORAL_FILE: &str = "temporal.json";
/// Healthy-data drift reference file
pub const DRIFT_REFERENCE_FILE: &str = "drift_reference.json";

/// Detector count of a complete deployment
pub const EXPECTED_DETECTORS: usize = 3;

/// Model availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every expected detector loaded
    Healthy,
    /// Some detectors loaded
    Degraded,
    /// No detector loaded
    Unhealthy,
}

impl HealthStatus {
    /// Status for `loaded` of `expected` detectors
    pub fn from_counts(loaded: usize, expected: usize) -> Self {
        if loaded >= expected && loaded > 0 {
            HealthStatus::Healthy
        } else if loaded > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        })
    }
}

/// Source of read-only model inputs
pub trait ModelRegistry: Send + Sync {
    /// Statistics used by every asset's normalizer
    fn normalization_stats(&self) -> Arc<NormalizationStats>;

    /// Loaded detectors
    fn detectors(&self) -> Vec<Arc<dyn Detector>>;

    /// Detectors a complete deployment would have
    fn expected_detectors(&self) -> usize {
        EXPECTED_DETECTORS
    }

    /// Drift reference; the standard normal is used when `None`
    fn drift_reference(&self) -> Option<DriftReference> {
        None
    }

    /// Availability derived from loaded vs expected detectors
    fn health(&self) -> HealthStatus {
        HealthStatus::from_counts(self.detectors().len(), self.expected_detectors())
    }
}

/// Registry over already-built models
#[derive(Clone)]
pub struct InMemoryRegistry {
    stats: Arc<NormalizationStats>,
    detectors: Vec<Arc<dyn Detector>>,
    reference: Option<DriftReference>,
    expected: usize,
}

impl InMemoryRegistry {
    /// Registry over `stats` and `detectors`
    pub fn new(stats: NormalizationStats, detectors: Vec<Arc<dyn Detector>>) -> MlResult<Self> {
        stats.validate()?;
        Ok(Self {
            stats: Arc::new(stats),
            detectors,
            reference: None,
            expected: EXPECTED_DETECTORS,
        })
    }

    /// Use `reference` for drift checks
    pub fn with_drift_reference(mut self, reference: DriftReference) -> MlResult<Self> {
        reference.validate()?;
        self.reference = Some(reference);
        Ok(self)
    }

    /// Override the expected detector count
    pub fn with_expected_detectors(mut self, expected: usize) -> Self {
        self.expected = expected;
        self
    }
}

impl ModelRegistry for InMemoryRegistry {
    fn normalization_stats(&self) -> Arc<NormalizationStats> {
        Arc::clone(&self.stats)
    }

    fn detectors(&self) -> Vec<Arc<dyn Detector>> {
        self.detectors.clone()
    }

    fn expected_detectors(&self) -> usize {
        self.expected
    }

    fn drift_reference(&self) -> Option<DriftReference> {
        self.reference.clone()
    }
}

impl fmt::Debug for InMemoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRegistry")
            .field("detectors", &self.detectors.iter().map(|d| d.name()).collect::<Vec<_>>())
            .field("expected", &self.expected)
            .finish()
    }
}

/// Registry loaded from a model directory
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    root: PathBuf,
    inner: InMemoryRegistry,
}

impl DirectoryRegistry {
    /// Load every artifact under `dir`
    pub fn load(dir: impl AsRef<Path>) -> MlResult<Self> {
        let root = dir.as_ref().to_path_buf();
        let stats_path = root.join(NORMALIZATION_FILE);
        if !stats_path.exists() {
            return Err(ArtifactError::NotFound(stats_path.display().to_string()).into());
        }
        let stats = Artifact::<NormalizationStats>::load(&stats_path)?.into_payload();

        let mut detectors: Vec<Arc<dyn Detector>> = Vec::new();
        match load_optional::<ReconstructionModel>(root.join(RECONSTRUCTION_FILE))? {
            Some(model) => detectors.push(Arc::new(ReconstructionDetector::new(model))),
            None => warn!("{} missing; reconstruction detector disabled", RECONSTRUCTION_FILE),
        }
        match load_optional::<IsolationModel>(root.join(ISOLATION_FILE))? {
            Some(model) => detectors.push(Arc::new(IsolationDetector::new(model))),
            None => warn!("{} missing; isolation detector disabled", ISOLATION_FILE),
        }
        match load_optional::<SequenceModel>(root.join(TEMPORAL_FILE))? {
            Some(model) => detectors.push(Arc::new(TemporalDetector::new(model))),
            None => warn!("{} missing; temporal detector disabled", TEMPORAL_FILE),
        }

        let mut inner = InMemoryRegistry::new(stats, detectors)?;
        match load_optional::<DriftReference>(root.join(DRIFT_REFERENCE_FILE))? {
            Some(reference) => inner = inner.with_drift_reference(reference)?,
            None => info!("{} missing; drift measured against the standard normal", DRIFT_REFERENCE_FILE),
        }
        info!(
            "Loaded models from {}: {} detectors, {}, drift reference {}",
            root.display(),
            inner.detectors.len(),
            inner.health(),
            if inner.reference.is_some() { "loaded" } else { "default" }
        );
        Ok(Self { root, inner })
    }

    /// Directory the models came from
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ModelRegistry for DirectoryRegistry {
    fn normalization_stats(&self) -> Arc<NormalizationStats> {
        self.inner.normalization_stats()
    }

    fn detectors(&self) -> Vec<Arc<dyn Detector>> {
        self.inner.detectors()
    }

    fn expected_detectors(&self) -> usize {
        self.inner.expected_detectors()
    }

    fn drift_reference(&self) -> Option<DriftReference> {
        self.inner.drift_reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_from_counts() {
        assert_eq!(HealthStatus::from_counts(3, 3), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_counts(2, 3), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_counts(0, 3), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::from_counts(0, 0), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
    }

    #[test]
    fn missing_directory_reports_not_found() {
        let err = DirectoryRegistry::load("/nonexistent/rotorguard-models").unwrap_err();
        assert!(matches!(err, crate::MlError::Artifact(ArtifactError::NotFound(_))));
    }
}
