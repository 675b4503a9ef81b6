//! Isolation tree implementation
//!
//! Trees are built by recursively partitioning a subsample on a random
//! feature at a random split value until every point is isolated or the
//! depth limit is reached. Anomalies need fewer splits to isolate, so they
//! end up on short paths.

use serde::{Deserialize, Serialize};

use rotorguard_core::errors::{InputError, StateCorruptionError};
use rotorguard_core::traits::Validate;

use super::node::{Node, NodeType};
use crate::rng::Rng;

/// Attempts at a random feature before scanning every feature
const RANDOM_SPLIT_ATTEMPTS: usize = 10;

/// Configuration for one isolation tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Maximum depth of tree
    pub max_depth: u16,
    /// Random seed for this tree
    pub seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { max_depth: 8, seed: 42 }
    }
}

/// Isolation tree in flat array representation, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    /// Grow a tree on `samples`, all of the same width
    pub fn fit(samples: &[&[f64]], config: TreeConfig) -> Result<Self, InputError> {
        if samples.is_empty() {
            return Err(InputError::InsufficientData { required: 1, available: 0 });
        }
        let dims = samples[0].len();
        if dims == 0 || samples.iter().any(|s| s.len() != dims) {
            return Err(InputError::InvalidConfig(
                "isolation tree samples must share a non-zero width".into(),
            ));
        }

        let mut builder = Builder {
            nodes: Vec::new(),
            rng: Rng::new(config.seed),
            max_depth: config.max_depth,
        };
        builder.build(samples.to_vec(), 0);
        Ok(Self { nodes: builder.nodes })
    }

    /// Path length of `x`, including the leaf adjustment
    pub fn path_length(&self, x: &[f64]) -> f64 {
        let mut index = 0usize;
        loop {
            let Some(node) = self.nodes.get(index) else {
                return 0.0;
            };
            match node.traverse(x) {
                Some(next) => index = next as usize,
                None => return node.path_length(),
            }
        }
    }

    /// Number of nodes in the tree
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest node
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth as usize).max().unwrap_or(0)
    }

    /// Largest feature index used by any split
    pub(crate) fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n.node_type {
                NodeType::Internal { feature, .. } => Some(feature),
                NodeType::External { .. } => None,
            })
            .max()
    }
}

impl Validate for IsolationTree {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        let violated = |reason: String| StateCorruptionError::InvariantViolated {
            kind: "isolation_tree".into(),
            reason,
        };
        if self.nodes.is_empty() {
            return Err(violated("tree has no nodes".into()));
        }
        let count = self.nodes.len() as u32;
        for (i, node) in self.nodes.iter().enumerate() {
            if let NodeType::Internal { split_value, left, right, .. } = node.node_type {
                let i = i as u32;
                if left <= i || right <= i || left >= count || right >= count {
                    return Err(violated(format!("node {} has invalid children {} and {}", i, left, right)));
                }
                if !split_value.is_finite() {
                    return Err(violated(format!("node {} has a non-finite split", i)));
                }
            }
        }
        Ok(())
    }
}

struct Builder {
    nodes: Vec<Node>,
    rng: Rng,
    max_depth: u16,
}

impl Builder {
    /// Build the subtree for `samples` and return its root index
    fn build(&mut self, samples: Vec<&[f64]>, depth: u16) -> u32 {
        let index = self.nodes.len() as u32;
        let size = samples.len() as u32;

        if depth >= self.max_depth || samples.len() <= 1 {
            self.nodes.push(Node::external(size, depth));
            return index;
        }
        let Some((feature, split_value)) = self.select_split(&samples) else {
            self.nodes.push(Node::external(size, depth));
            return index;
        };

        let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
            samples.into_iter().partition(|s| s[feature] < split_value);
        if left.is_empty() || right.is_empty() {
            self.nodes.push(Node::external(size, depth));
            return index;
        }

        // Reserve the slot so children land after the parent
        self.nodes.push(Node::external(size, depth));
        let left_index = self.build(left, depth + 1);
        let right_index = self.build(right, depth + 1);
        self.nodes[index as usize] = Node::internal(feature, split_value, left_index, right_index, depth);
        index
    }

    /// Random feature with a non-degenerate range and a split inside it
    ///
    /// `None` when every sample is identical.
    fn select_split(&mut self, samples: &[&[f64]]) -> Option<(usize, f64)> {
        let dims = samples[0].len();
        for _ in 0..RANDOM_SPLIT_ATTEMPTS {
            let feature = self.rng.next_range(dims);
            if let Some(split) = self.split_in(samples, feature) {
                return Some((feature, split));
            }
        }
        (0..dims).find_map(|feature| self.split_in(samples, feature).map(|s| (feature, s)))
    }

    fn split_in(&mut self, samples: &[&[f64]], feature: usize) -> Option<f64> {
        let (min, max) = samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s[feature]), hi.max(s[feature]))
        });
        if max - min <= f64::EPSILON * max.abs().max(1.0) {
            return None;
        }
        // Split strictly above min so the left side is never empty
        let split = self.rng.next_f64_range(min, max);
        Some(if split <= min { (min + max) / 2.0 } else { split })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Vec<f64>> {
        vec![
            vec![20.0, 50.0, 1013.0],
            vec![22.0, 55.0, 1012.0],
            vec![21.0, 52.0, 1014.0],
            vec![19.0, 48.0, 1013.0],
            vec![35.0, 90.0, 1000.0],
        ]
    }

    fn refs(data: &[Vec<f64>]) -> Vec<&[f64]> {
        data.iter().map(Vec::as_slice).collect()
    }

    #[test]
    fn test_tree_fit() {
        let data = samples();
        let tree = IsolationTree::fit(&refs(&data), TreeConfig { max_depth: 5, seed: 123 }).unwrap();
        assert!(tree.node_count() > 1);
        assert!(tree.depth() <= 5);
        assert!(tree.validate().is_ok());
        assert!(tree.max_feature().unwrap() < 3);
    }

    #[test]
    fn test_path_length() {
        let data = samples();
        let tree = IsolationTree::fit(&refs(&data), TreeConfig::default()).unwrap();
        for sample in &data {
            assert!(tree.path_length(sample) > 0.0);
        }
    }

    #[test]
    fn identical_samples_make_a_leaf() {
        let data = vec![vec![1.0, 2.0]; 8];
        let tree = IsolationTree::fit(&refs(&data), TreeConfig::default()).unwrap();
        assert_eq!(tree.node_count(), 1);
        assert!((tree.path_length(&[1.0, 2.0]) - super::super::node::c_factor(8)).abs() < 1e-12);
    }

    #[test]
    fn children_follow_parents() {
        let data: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64, (i * 7 % 13) as f64]).collect();
        let tree = IsolationTree::fit(&refs(&data), TreeConfig { max_depth: 10, seed: 9 }).unwrap();
        assert!(tree.validate().is_ok());

        let mut broken = tree.clone();
        broken.nodes[0] = Node::internal(0, 1.0, 0, 1, 0);
        assert!(broken.validate().is_err());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(IsolationTree::fit(&[], TreeConfig::default()).is_err());
        let ragged: Vec<&[f64]> = vec![&[1.0, 2.0], &[1.0]];
        assert!(IsolationTree::fit(&ragged, TreeConfig::default()).is_err());
    }
}
