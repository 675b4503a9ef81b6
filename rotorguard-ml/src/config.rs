//! Pipeline configuration
//!
//! One [`PipelineConfig`] gathers every stage's parameters. All sections use
//! `#[serde(default)]`, so a JSON file only needs the values it changes:
//!
//! ```json
//! {
//!   "window": { "window_size": 2048, "hop_size": 1024 },
//!   "ensemble": { "timeout_policy": "reuse_stale" },
//!   "threshold": { "min_feedback": 30 }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use rotorguard_core::errors::InputError;
use rotorguard_core::features::FeatureConfig;
use rotorguard_core::window::WindowConfig;

use crate::drift::DriftConfig;
use crate::ensemble::EnsembleConfig;
use crate::rul::RulConfig;
use crate::threshold::ThresholdConfig;
use crate::MlResult;

/// Parameters for every pipeline stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Windowing
    pub window: WindowConfig,
    /// Feature extraction
    pub features: FeatureConfig,
    /// Detector combination
    pub ensemble: EnsembleConfig,
    /// Feedback calibration
    pub threshold: ThresholdConfig,
    /// Drift monitoring
    pub drift: DriftConfig,
    /// Remaining useful life
    pub rul: RulConfig,
    /// Where per-asset state is saved and restored, if anywhere
    pub state_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Parse and validate JSON
    pub fn from_json_str(json: &str) -> MlResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| InputError::InvalidConfig(format!("config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> MlResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(rotorguard_core::Error::from)?;
        let config = Self::from_json_str(&json)?;
        info!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    /// Check every section
    pub fn validate(&self) -> Result<(), InputError> {
        self.window.validate()?;
        self.features.validate()?;
        self.ensemble.validate()?;
        self.threshold.validate()?;
        self.drift.validate()?;
        self.rul.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::TimeoutPolicy;

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{"window": {"hop_size": 256}, "ensemble": {"timeout_policy": "reuse_stale"}}"#,
        )
        .unwrap();
        assert_eq!(config.window.hop_size, 256);
        assert_eq!(config.window.window_size, 1024);
        assert_eq!(config.ensemble.timeout_policy, TimeoutPolicy::ReuseStale);
        assert_eq!(config.threshold.min_feedback, 20);
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(PipelineConfig::from_json_str(r#"{"window": {"hop_size": 0}}"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{"drift": {"threshold": -1.0}}"#).is_err());
        assert!(PipelineConfig::from_json_str("not json").is_err());
    }
}
