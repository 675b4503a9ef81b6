//! Artifacts on disk

use std::fs;

use rotorguard_core::errors::StateCorruptionError;
use rotorguard_core::features::{FeatureVector, FEATURE_COUNT};
use rotorguard_core::normalize::NormalizationStats;
use rotorguard_schemas::artifact::{load_optional, save};
use rotorguard_schemas::{
    Artifact, ArtifactError, ArtifactKind, ArtifactMetadata, ArtifactRegistry,
};
use tempfile::tempdir;

fn stats() -> NormalizationStats {
    let vectors: Vec<FeatureVector> = (0..6)
        .map(|i| {
            let mut values = [0.0; FEATURE_COUNT];
            for (j, v) in values.iter_mut().enumerate() {
                *v = (i * j) as f64 * 0.1;
            }
            FeatureVector::new(values, i as u64, 0).unwrap()
        })
        .collect();
    NormalizationStats::fit(&vectors).unwrap()
}

#[test]
fn save_then_load_reproduces_payload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("models").join("normalization.json");

    save(&stats(), &path).unwrap();
    assert!(path.exists());
    assert!(!dir.path().join("models").join("normalization.json.tmp").exists());

    let loaded = Artifact::<NormalizationStats>::load(&path).unwrap();
    assert_eq!(loaded.kind, ArtifactKind::NormalizationStats);
    assert_eq!(loaded.payload, stats());
}

#[test]
fn overwrite_replaces_previous() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("normalization.json");
    save(&stats(), &path).unwrap();

    let mut changed = stats();
    changed.mean[0] = 42.0;
    save(&changed, &path).unwrap();

    let loaded: NormalizationStats = load_optional(&path).unwrap().unwrap();
    assert_eq!(loaded.mean[0], 42.0);
}

#[test]
fn missing_file_is_none() {
    let dir = tempdir().unwrap();
    let loaded: Option<NormalizationStats> = load_optional(dir.path().join("absent.json")).unwrap();
    assert!(loaded.is_none());
}

#[test]
fn truncated_file_is_corruption() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("normalization.json");
    save(&stats(), &path).unwrap();

    let json = fs::read_to_string(&path).unwrap();
    fs::write(&path, &json[..json.len() / 2]).unwrap();

    let err = Artifact::<NormalizationStats>::load(&path).unwrap_err();
    assert!(matches!(err, ArtifactError::Corrupt(StateCorruptionError::Decode(_))));

    let core: rotorguard_core::Error = err.into();
    assert!(core.is_fatal());
}

#[test]
fn custom_registry_gates_versions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("normalization.json");
    save(&stats(), &path).unwrap();

    // A registry that only knows version 2 refuses version-1 files
    let registry = ArtifactRegistry::new();
    registry
        .register(ArtifactMetadata::new(ArtifactKind::NormalizationStats, 2))
        .unwrap();
    assert!(matches!(
        Artifact::<NormalizationStats>::load_with(&path, &registry),
        Err(ArtifactError::Corrupt(StateCorruptionError::SchemaVersion { found: 1, .. }))
    ));
}
