//! Bagged regression-tree ensemble (the static site regressor).
//!
//! Trained on static site vectors repeated once per timestep against the
//! per-timestep rise targets, so it captures the level contributed by fixed
//! site properties independent of time. Prediction averages the trees.

mod trainer;
mod tree;

pub use trainer::{BaggedForestTrainer, BaggedForestTrainerBuilder};
pub use tree::{NodeId, Tree, TreeBuilder};

use serde::{Deserialize, Serialize};

/// Forest training and prediction errors.
///
/// Malformed widths are reported, never silently broadcast.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForestError {
    #[error("shape mismatch: row width {expected} does not divide {got} values")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("number of targets ({targets}) does not match number of rows ({rows})")]
    TargetLenMismatch { rows: usize, targets: usize },

    #[error("cannot fit a forest on an empty matrix")]
    EmptyTraining,
}

/// A trained bag of regression trees.
///
/// Prediction is the mean of the per-tree leaf values. The struct is
/// read-only after training and safe to share across concurrent inference
/// requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaggedForest {
    trees: Vec<Tree>,
    n_features: usize,
}

impl BaggedForest {
    /// Assemble a forest from grown trees.
    pub fn from_trees(trees: Vec<Tree>, n_features: usize) -> Self {
        Self { trees, n_features }
    }

    /// Number of trees.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of input features.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Predict one value for a single feature row.
    pub fn predict_row(&self, features: &[f32]) -> Result<f32, ForestError> {
        if features.len() != self.n_features {
            return Err(ForestError::ShapeMismatch {
                expected: self.n_features,
                got: features.len(),
            });
        }

        let sum: f64 = self
            .trees
            .iter()
            .map(|tree| tree.predict_row(features) as f64)
            .sum();
        Ok((sum / self.trees.len().max(1) as f64) as f32)
    }

    /// Predict one value per row of a flat row-major matrix.
    pub fn predict_batch(&self, data: &[f32], n_rows: usize) -> Result<Vec<f32>, ForestError> {
        if data.len() != n_rows * self.n_features {
            return Err(ForestError::ShapeMismatch {
                expected: n_rows * self.n_features,
                got: data.len(),
            });
        }

        data.chunks(self.n_features).map(|row| self.predict_row(row)).collect()
    }
}
