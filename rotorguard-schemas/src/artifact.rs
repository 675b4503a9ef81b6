//! Artifact envelope and file IO

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use rotorguard_core::errors::StateCorruptionError;

use crate::registry::{ArtifactRegistry, GLOBAL_REGISTRY};
use crate::{ArtifactError, ArtifactKind, ArtifactResult, Versioned};

/// `{schema_version, kind, payload}` wrapper around a persisted value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact<T> {
    /// Layout version of `payload`
    pub schema_version: u32,
    /// What `payload` holds
    pub kind: ArtifactKind,
    /// The persisted value
    pub payload: T,
}

/// Envelope with the payload left undecoded
#[derive(Deserialize)]
struct RawEnvelope {
    schema_version: u32,
    kind: ArtifactKind,
    payload: serde_json::Value,
}

fn decode_error(err: serde_json::Error) -> ArtifactError {
    StateCorruptionError::Decode(err.to_string()).into()
}

impl<T: Versioned> Artifact<T> {
    /// Wrap `payload` at the version this build writes
    pub fn new(payload: T) -> Self {
        Self {
            schema_version: T::SCHEMA_VERSION,
            kind: T::KIND,
            payload,
        }
    }

    /// Unwrap the payload
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> ArtifactResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ArtifactError::Encode(e.to_string()))
    }

    /// Decode and check against the global registry
    pub fn from_json(json: &str) -> ArtifactResult<Self> {
        Self::from_json_with(json, &GLOBAL_REGISTRY)
    }

    /// Decode and check against `registry`
    ///
    /// Order of checks: envelope shape, kind, version, payload shape, payload
    /// invariants. The first failure is reported.
    pub fn from_json_with(json: &str, registry: &ArtifactRegistry) -> ArtifactResult<Self> {
        let raw: RawEnvelope = serde_json::from_str(json).map_err(decode_error)?;

        if raw.kind != T::KIND {
            return Err(StateCorruptionError::KindMismatch {
                expected: T::KIND.name().to_string(),
                found: raw.kind.name().to_string(),
            }
            .into());
        }
        registry.check(raw.kind, raw.schema_version)?;

        let payload: T = serde_json::from_value(raw.payload).map_err(decode_error)?;
        payload.validate()?;

        Ok(Self {
            schema_version: raw.schema_version,
            kind: raw.kind,
            payload,
        })
    }

    /// Write atomically to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> ArtifactResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = self.to_json()?;
        let tmp = temp_path(path);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;

        debug!("Saved {} artifact to {}", self.kind, path.display());
        Ok(())
    }

    /// Read and check `path` against the global registry
    pub fn load(path: impl AsRef<Path>) -> ArtifactResult<Self> {
        Self::load_with(path, &GLOBAL_REGISTRY)
    }

    /// Read and check `path` against `registry`
    pub fn load_with(path: impl AsRef<Path>, registry: &ArtifactRegistry) -> ArtifactResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let artifact = Self::from_json_with(&json, registry)?;
        debug!("Loaded {} artifact from {}", artifact.kind, path.display());
        Ok(artifact)
    }
}

/// Save `payload` wrapped at the current version
pub fn save<T: Versioned>(payload: &T, path: impl AsRef<Path>) -> ArtifactResult<()>
where
    T: Clone,
{
    Artifact::new(payload.clone()).save(path)
}

/// Load and unwrap a payload, `None` when the file does not exist
pub fn load_optional<T: Versioned>(path: impl AsRef<Path>) -> ArtifactResult<Option<T>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    Artifact::<T>::load(path).map(|a| Some(a.into_payload()))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotorguard_core::features::{FeatureVector, FEATURE_COUNT};
    use rotorguard_core::normalize::NormalizationStats;

    fn stats() -> NormalizationStats {
        let vectors: Vec<FeatureVector> = (0..3)
            .map(|i| FeatureVector::new([i as f64 * 2.0; FEATURE_COUNT], i, 0).unwrap())
            .collect();
        NormalizationStats::fit(&vectors).unwrap()
    }

    #[test]
    fn envelope_fields() {
        let json = Artifact::new(stats()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["kind"], "normalization_stats");
        assert!(value["payload"]["mean"].is_array());
    }

    #[test]
    fn wrong_kind_rejected() {
        let json = r#"{"schema_version": 1, "kind": "drift_state", "payload": {}}"#;
        match Artifact::<NormalizationStats>::from_json(json) {
            Err(ArtifactError::Corrupt(StateCorruptionError::KindMismatch { expected, found })) => {
                assert_eq!(expected, "normalization_stats");
                assert_eq!(found, "drift_state");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn future_version_rejected() {
        let mut artifact = Artifact::new(stats());
        artifact.schema_version = 7;
        let json = artifact.to_json().unwrap();
        assert!(matches!(
            Artifact::<NormalizationStats>::from_json(&json),
            Err(ArtifactError::Corrupt(StateCorruptionError::SchemaVersion { found: 7, .. }))
        ));
    }

    #[test]
    fn garbage_is_decode_error() {
        assert!(matches!(
            Artifact::<NormalizationStats>::from_json("{ not json"),
            Err(ArtifactError::Corrupt(StateCorruptionError::Decode(_)))
        ));
    }

    #[test]
    fn invariant_checked_after_decode() {
        let mut bad = stats();
        bad.std[0] = -1.0;
        let json = Artifact::new(bad).to_json().unwrap();
        assert!(matches!(
            Artifact::<NormalizationStats>::from_json(&json),
            Err(ArtifactError::Corrupt(StateCorruptionError::InvariantViolated { .. }))
        ));
    }

    #[test]
    fn temp_path_is_sibling() {
        let tmp = temp_path(Path::new("/state/pump-1/threshold.json"));
        assert_eq!(tmp, PathBuf::from("/state/pump-1/threshold.json.tmp"));
    }
}
