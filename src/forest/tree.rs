//! Regression tree storage and construction.
//!
//! Trees are stored as structure-of-arrays for cache-friendly traversal.
//! During growing, nodes are allocated as placeholders and filled in when
//! their split or leaf value is decided; `freeze` produces the immutable
//! form used for prediction and persistence.

use serde::{Deserialize, Serialize};

/// Node index local to one tree (0 = root).
pub type NodeId = u32;

/// Immutable SoA regression tree with numeric splits.
///
/// All site and driver features are continuous, so there is no categorical
/// or missing-value handling: a row goes left when its feature value is
/// strictly below the split threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    split_features: Vec<u32>,
    split_thresholds: Vec<f32>,
    left_children: Vec<u32>,
    right_children: Vec<u32>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f32>,
}

impl Tree {
    /// Number of nodes.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    /// Number of leaves.
    pub fn n_leaves(&self) -> usize {
        self.is_leaf.iter().filter(|&&l| l).count()
    }

    /// Traverse from the root to a leaf for one feature row.
    pub fn predict_row(&self, features: &[f32]) -> f32 {
        let mut idx: NodeId = 0;

        while !self.is_leaf[idx as usize] {
            let feature = self.split_features[idx as usize] as usize;
            idx = if features[feature] < self.split_thresholds[idx as usize] {
                self.left_children[idx as usize]
            } else {
                self.right_children[idx as usize]
            };
        }

        self.leaf_values[idx as usize]
    }
}

/// Mutable tree used during growing.
///
/// Supports the training pattern where a node is allocated first and later
/// resolved into either a split (allocating its children) or a leaf.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    split_features: Vec<u32>,
    split_thresholds: Vec<f32>,
    left_children: Vec<u32>,
    right_children: Vec<u32>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f32>,
}

impl TreeBuilder {
    /// Create a builder with the root pre-allocated.
    pub fn with_root() -> Self {
        let mut builder = Self::default();
        builder.allocate_node();
        builder
    }

    /// Allocate a placeholder node and return its id.
    pub fn allocate_node(&mut self) -> NodeId {
        let id = self.is_leaf.len() as NodeId;
        self.split_features.push(0);
        self.split_thresholds.push(0.0);
        self.left_children.push(0);
        self.right_children.push(0);
        self.is_leaf.push(false);
        self.leaf_values.push(0.0);
        id
    }

    /// Resolve `node` into a numeric split, allocating both children.
    ///
    /// Returns `(left_id, right_id)`.
    pub fn apply_split(&mut self, node: NodeId, feature: u32, threshold: f32) -> (NodeId, NodeId) {
        let left = self.allocate_node();
        let right = self.allocate_node();

        let idx = node as usize;
        self.split_features[idx] = feature;
        self.split_thresholds[idx] = threshold;
        self.left_children[idx] = left;
        self.right_children[idx] = right;
        self.is_leaf[idx] = false;

        (left, right)
    }

    /// Resolve `node` into a leaf.
    pub fn make_leaf(&mut self, node: NodeId, value: f32) {
        let idx = node as usize;
        self.is_leaf[idx] = true;
        self.leaf_values[idx] = value;
    }

    /// Finalize into immutable SoA storage.
    pub fn freeze(self) -> Tree {
        Tree {
            split_features: self.split_features,
            split_thresholds: self.split_thresholds,
            left_children: self.left_children,
            right_children: self.right_children,
            is_leaf: self.is_leaf,
            leaf_values: self.leaf_values,
        }
    }
}
