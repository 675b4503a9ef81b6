//! Artifact Registry for Version Management
//!
//! Central record of which artifact kinds and versions this build can read,
//! which version it writes, and which versions are on their way out.

use std::collections::HashMap;
use std::sync::RwLock;

use log::warn;

use rotorguard_core::errors::StateCorruptionError;

use crate::{ArtifactError, ArtifactKind, ArtifactResult};

/// Registry entry for one `(kind, version)` pair
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactMetadata {
    /// Artifact kind
    pub kind: ArtifactKind,

    /// Schema version
    pub version: u32,

    /// Qualified name (e.g., "threshold_state_v1")
    pub qualified_name: String,

    /// Whether this version is deprecated
    pub deprecated: bool,

    /// Version to migrate to when deprecated
    pub replacement: Option<u32>,
}

impl ArtifactMetadata {
    /// Fresh, non-deprecated entry
    pub fn new(kind: ArtifactKind, version: u32) -> Self {
        Self {
            kind,
            version,
            qualified_name: format!("{}_v{}", kind.name(), version),
            deprecated: false,
            replacement: None,
        }
    }
}

/// Thread-safe artifact registry with version management
pub struct ArtifactRegistry {
    /// Entries indexed by qualified name
    entries: RwLock<HashMap<String, ArtifactMetadata>>,

    /// Registered versions per kind
    versions: RwLock<HashMap<ArtifactKind, Vec<u32>>>,

    /// Latest version for each kind
    latest: RwLock<HashMap<ArtifactKind, u32>>,
}

fn poisoned() -> ArtifactError {
    ArtifactError::Io(std::io::Error::new(std::io::ErrorKind::Other, "Lock poisoned"))
}

impl ArtifactRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            versions: RwLock::new(HashMap::new()),
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// Registry preloaded with [`crate::schemas::defaults`]
    pub fn with_defaults() -> ArtifactResult<Self> {
        let registry = Self::new();
        registry.load_defaults()?;
        Ok(registry)
    }

    /// Register an entry
    pub fn register(&self, metadata: ArtifactMetadata) -> ArtifactResult<()> {
        let qualified_name = metadata.qualified_name.clone();
        let kind = metadata.kind;
        let version = metadata.version;

        {
            let mut entries = self.entries.write().map_err(|_| poisoned())?;
            if entries.contains_key(&qualified_name) {
                return Err(ArtifactError::AlreadyRegistered(qualified_name));
            }
            entries.insert(qualified_name, metadata);
        }

        {
            let mut versions = self.versions.write().map_err(|_| poisoned())?;
            let list = versions.entry(kind).or_default();
            list.push(version);
            list.sort_unstable();
        }

        {
            let mut latest = self.latest.write().map_err(|_| poisoned())?;
            let entry = latest.entry(kind).or_insert(version);
            if version > *entry {
                *entry = version;
            }
        }

        Ok(())
    }

    /// Entry for one version
    pub fn get(&self, kind: ArtifactKind, version: u32) -> ArtifactResult<ArtifactMetadata> {
        let name = format!("{}_v{}", kind.name(), version);
        let entries = self.entries.read().map_err(|_| poisoned())?;
        entries.get(&name).cloned().ok_or(ArtifactError::NotFound(name))
    }

    /// Highest registered version of `kind`
    pub fn latest(&self, kind: ArtifactKind) -> ArtifactResult<u32> {
        let latest = self.latest.read().map_err(|_| poisoned())?;
        latest
            .get(&kind)
            .copied()
            .ok_or_else(|| ArtifactError::NotFound(format!("No versions of {}", kind)))
    }

    /// All registered versions of `kind`, ascending
    pub fn versions(&self, kind: ArtifactKind) -> ArtifactResult<Vec<u32>> {
        let versions = self.versions.read().map_err(|_| poisoned())?;
        Ok(versions.get(&kind).cloned().unwrap_or_default())
    }

    /// Accept or refuse an envelope's `(kind, version)`
    ///
    /// Deprecated versions are accepted with a warning.
    pub fn check(&self, kind: ArtifactKind, version: u32) -> ArtifactResult<()> {
        match self.get(kind, version) {
            Ok(metadata) => {
                if metadata.deprecated {
                    warn!(
                        "Loading deprecated artifact {} (replacement: {:?})",
                        metadata.qualified_name, metadata.replacement
                    );
                }
                Ok(())
            }
            Err(ArtifactError::NotFound(_)) => {
                let supported = self
                    .versions(kind)?
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(StateCorruptionError::SchemaVersion {
                    kind: kind.name().to_string(),
                    found: version,
                    supported,
                }
                .into())
            }
            Err(e) => Err(e),
        }
    }

    /// Mark a version as deprecated
    pub fn deprecate(
        &self,
        kind: ArtifactKind,
        version: u32,
        replacement: Option<u32>,
    ) -> ArtifactResult<()> {
        let name = format!("{}_v{}", kind.name(), version);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let metadata = entries.get_mut(&name).ok_or(ArtifactError::NotFound(name))?;
        metadata.deprecated = true;
        metadata.replacement = replacement;
        Ok(())
    }

    /// Register every default entry
    pub fn load_defaults(&self) -> ArtifactResult<()> {
        for metadata in crate::schemas::defaults() {
            self.register(metadata)?;
        }
        Ok(())
    }
}

impl Default for ArtifactRegistry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    /// Registry of the versions this build reads
    pub static ref GLOBAL_REGISTRY: ArtifactRegistry = {
        let registry = ArtifactRegistry::new();
        // Defaults are distinct by construction
        let _ = registry.load_defaults();
        registry
    };
}
