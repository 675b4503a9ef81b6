//! Isolation tree node implementation
//!
//! Nodes live in a flat array; children are referenced by index. Children
//! always sit after their parent, which makes cycle detection on load a
//! single comparison per edge.

use serde::{Deserialize, Serialize};

/// Euler-Mascheroni constant
const EULER: f64 = 0.577_215_664_901_532_9;

/// Node type in the isolation tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeType {
    /// Internal node with split condition
    Internal {
        /// Feature index to split on
        feature: usize,
        /// Values below go left, the rest right
        split_value: f64,
        /// Left child index
        left: u32,
        /// Right child index
        right: u32,
    },
    /// Leaf node (external)
    External {
        /// Number of training samples that reached this leaf
        size: u32,
    },
}

/// Tree node with its depth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node type and data
    pub node_type: NodeType,
    /// Edges from the root
    pub depth: u16,
}

impl Node {
    /// Create an internal node
    pub fn internal(feature: usize, split_value: f64, left: u32, right: u32, depth: u16) -> Self {
        Self {
            node_type: NodeType::Internal { feature, split_value, left, right },
            depth,
        }
    }

    /// Create an external (leaf) node
    pub fn external(size: u32, depth: u16) -> Self {
        Self {
            node_type: NodeType::External { size },
            depth,
        }
    }

    /// Check if node is a leaf
    pub fn is_leaf(&self) -> bool {
        matches!(self.node_type, NodeType::External { .. })
    }

    /// Path length credited to a sample ending here
    ///
    /// Depth plus the expected depth of the unbuilt subtree below a leaf.
    pub fn path_length(&self) -> f64 {
        match self.node_type {
            NodeType::External { size } => self.depth as f64 + c_factor(size as usize),
            NodeType::Internal { .. } => self.depth as f64,
        }
    }

    /// Child index to visit for `x`, `None` at a leaf or when `x` is too short
    pub fn traverse(&self, x: &[f64]) -> Option<u32> {
        match self.node_type {
            NodeType::Internal { feature, split_value, left, right } => {
                let value = *x.get(feature)?;
                Some(if value < split_value { left } else { right })
            }
            NodeType::External { .. } => None,
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` keys
///
/// `c(n) = 2 H(n-1) - 2 (n-1) / n`, with `H(i) ≈ ln(i) + γ`.
pub fn c_factor(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER) - 2.0 * (n - 1.0) / n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_creation() {
        let internal = Node::internal(0, 25.0, 1, 2, 3);
        assert!(!internal.is_leaf());
        assert_eq!(internal.depth, 3);

        let external = Node::external(10, 5);
        assert!(external.is_leaf());
        assert!((external.path_length() - (5.0 + c_factor(10))).abs() < 1e-12);
    }

    #[test]
    fn test_node_traverse() {
        let node = Node::internal(1, 0.5, 1, 2, 0);
        assert_eq!(node.traverse(&[9.0, 0.2]), Some(1));
        assert_eq!(node.traverse(&[9.0, 0.5]), Some(2));
        assert_eq!(node.traverse(&[9.0]), None);
        assert_eq!(Node::external(1, 0).traverse(&[0.0]), None);
    }

    #[test]
    fn test_c_factor() {
        assert_eq!(c_factor(0), 0.0);
        assert_eq!(c_factor(1), 0.0);
        assert_eq!(c_factor(2), 1.0);
        assert!((c_factor(256) - 10.24).abs() < 0.01);
    }

    #[test]
    fn node_serde_tagged() {
        let json = serde_json::to_string(&Node::external(4, 2)).unwrap();
        assert!(json.contains("\"type\":\"external\""));
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Node::external(4, 2));
    }
}
