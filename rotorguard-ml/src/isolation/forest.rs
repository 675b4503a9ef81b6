//! Isolation Forest implementation
//!
//! Combines many isolation trees, each grown on its own random subsample,
//! into one raw anomaly score `2^(-E[h(x)] / c(ψ))` where `ψ` is the
//! subsample size. Scores near 1 mean "isolated quickly", scores well below
//! 0.5 mean "deep inside the data".

use log::debug;
use serde::{Deserialize, Serialize};

use rotorguard_core::errors::{InputError, StateCorruptionError};
use rotorguard_core::traits::Validate;

use super::node::c_factor;
use super::tree::{IsolationTree, TreeConfig};
use crate::rng::Rng;

/// Default number of trees
pub const DEFAULT_NUM_TREES: usize = 100;

/// Default subsample size per tree
pub const DEFAULT_SAMPLE_SIZE: usize = 256;

/// Configuration for Isolation Forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub num_trees: usize,
    /// Subsample size for each tree
    pub sample_size: usize,
    /// Maximum tree depth, `ceil(log2(sample_size))` when unset
    pub max_depth: Option<u16>,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: DEFAULT_NUM_TREES,
            sample_size: DEFAULT_SAMPLE_SIZE,
            max_depth: None,
            seed: 42,
        }
    }
}

impl ForestConfig {
    /// Check parameters
    pub fn validate(&self) -> Result<(), InputError> {
        if self.num_trees == 0 {
            return Err(InputError::InvalidConfig("num_trees must be at least 1".into()));
        }
        if self.sample_size < 2 {
            return Err(InputError::InvalidConfig("sample_size must be at least 2".into()));
        }
        if self.max_depth == Some(0) {
            return Err(InputError::InvalidConfig("max_depth must be at least 1".into()));
        }
        Ok(())
    }

    fn depth_limit(&self, subsample: usize) -> u16 {
        self.max_depth
            .unwrap_or_else(|| (subsample as f64).log2().ceil().max(1.0) as u16)
    }
}

/// Isolation Forest over fixed-width vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    /// Subsample size actually used, `min(config.sample_size, n)`
    sample_size: usize,
    /// Width of the vectors the forest was grown on
    dimensions: usize,
}

impl IsolationForest {
    /// Grow a forest on `samples`
    pub fn fit(samples: &[Vec<f64>], config: &ForestConfig) -> Result<Self, InputError> {
        config.validate()?;
        if samples.len() < 2 {
            return Err(InputError::InsufficientData { required: 2, available: samples.len() });
        }
        let dimensions = samples[0].len();

        let subsample = config.sample_size.min(samples.len());
        let max_depth = config.depth_limit(subsample);
        let mut rng = Rng::new(config.seed);
        let mut indices: Vec<usize> = (0..samples.len()).collect();
        let mut trees = Vec::with_capacity(config.num_trees);

        for i in 0..config.num_trees {
            // Partial Fisher-Yates: the first `subsample` slots become the draw
            for j in 0..subsample {
                let k = j + rng.next_range(samples.len() - j);
                indices.swap(j, k);
            }
            let draw: Vec<&[f64]> = indices[..subsample].iter().map(|&k| samples[k].as_slice()).collect();
            let tree_config = TreeConfig {
                max_depth,
                seed: config.seed.wrapping_add(i as u64).wrapping_mul(0x9E37_79B9),
            };
            trees.push(IsolationTree::fit(&draw, tree_config)?);
        }

        let forest = Self { trees, sample_size: subsample, dimensions };
        debug!(
            "Grew isolation forest: {} trees, subsample {}, max depth {}",
            forest.trees.len(),
            subsample,
            max_depth
        );
        Ok(forest)
    }

    /// Mean path length of `x` across trees
    pub fn mean_path_length(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64
    }

    /// Raw anomaly score `2^(-E[h] / c(ψ))` in `(0, 1]`
    pub fn raw_score(&self, x: &[f64]) -> f64 {
        let c = c_factor(self.sample_size);
        if c <= 0.0 {
            return 0.5;
        }
        2f64.powf(-self.mean_path_length(x) / c)
    }

    /// Width of accepted vectors
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get forest statistics
    pub fn stats(&self) -> ForestStats {
        ForestStats {
            num_trees: self.trees.len(),
            total_nodes: self.trees.iter().map(IsolationTree::node_count).sum(),
            max_depth: self.trees.iter().map(IsolationTree::depth).max().unwrap_or(0),
            sample_size: self.sample_size,
        }
    }
}

impl Validate for IsolationForest {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        let violated = |reason: String| StateCorruptionError::InvariantViolated {
            kind: "isolation_forest".into(),
            reason,
        };
        if self.trees.is_empty() {
            return Err(violated("forest has no trees".into()));
        }
        if self.sample_size < 2 || self.dimensions == 0 {
            return Err(violated(format!(
                "sample size {} and dimensions {} must be positive",
                self.sample_size, self.dimensions
            )));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate()?;
            if tree.max_feature().is_some_and(|f| f >= self.dimensions) {
                return Err(violated(format!("tree {} splits on a feature beyond {}", i, self.dimensions)));
            }
        }
        Ok(())
    }
}

/// Forest statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestStats {
    /// Number of trees
    pub num_trees: usize,
    /// Total nodes across all trees
    pub total_nodes: usize,
    /// Deepest node in any tree
    pub max_depth: usize,
    /// Subsample size per tree
    pub sample_size: usize,
}
