//! Bagged forest training.
//!
//! Grows an ensemble of exact-split regression trees, each on a bootstrap
//! resample of the training rows. Splits minimize the summed squared error
//! of the two children (variance reduction); depth is unbounded by default
//! so each tree interpolates its resample, and averaging across the bag
//! supplies the regularization.

use derive_builder::Builder;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use super::tree::{NodeId, Tree, TreeBuilder};
use super::{BaggedForest, ForestError};

/// Bagged forest trainer.
///
/// Use [`BaggedForestTrainer::builder()`] for a fluent configuration API, or
/// [`BaggedForestTrainer::default()`] for the reference defaults (200 trees,
/// unbounded depth, bootstrap sampling).
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), default)]
pub struct BaggedForestTrainer {
    /// Number of trees in the bag.
    #[builder(default = "200")]
    pub n_trees: u32,

    /// Maximum tree depth. `None` grows until leaves are pure or too small.
    #[builder(default)]
    pub max_depth: Option<u32>,

    /// Minimum samples required to split a node.
    #[builder(default = "2")]
    pub min_samples_split: u32,

    /// Minimum samples required in each child of a split.
    #[builder(default = "1")]
    pub min_samples_leaf: u32,

    /// Sample rows with replacement per tree. Disabling makes every tree
    /// see the full training set.
    #[builder(default = "true")]
    pub bootstrap: bool,

    /// Random seed. Tree `t` derives its RNG from `seed.wrapping_add(t)`.
    #[builder(default = "0")]
    pub seed: u64,
}

impl Default for BaggedForestTrainer {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
            seed: 0,
        }
    }
}

impl BaggedForestTrainer {
    /// Create a builder for configuring the trainer.
    pub fn builder() -> BaggedForestTrainerBuilder {
        BaggedForestTrainerBuilder::default()
    }

    /// Fit a forest on a flat row-major matrix.
    ///
    /// # Arguments
    ///
    /// * `data` - Feature matrix, row-major (`n_rows x n_features`)
    /// * `n_features` - Number of feature columns
    /// * `targets` - One target per row
    pub fn fit(
        &self,
        data: &[f32],
        n_features: usize,
        targets: &[f32],
    ) -> Result<BaggedForest, ForestError> {
        if n_features == 0 || data.len() % n_features != 0 {
            return Err(ForestError::ShapeMismatch {
                expected: n_features.max(1),
                got: data.len(),
            });
        }
        let n_rows = data.len() / n_features;
        if n_rows == 0 {
            return Err(ForestError::EmptyTraining);
        }
        if targets.len() != n_rows {
            return Err(ForestError::TargetLenMismatch {
                rows: n_rows,
                targets: targets.len(),
            });
        }

        let context = GrowContext {
            data,
            n_features,
            targets,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split.max(2) as usize,
            min_samples_leaf: self.min_samples_leaf.max(1) as usize,
        };

        tracing::debug!(
            n_trees = self.n_trees,
            n_rows,
            n_features,
            "fitting bagged forest"
        );

        let trees: Vec<Tree> = (0..self.n_trees as u64)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed.wrapping_add(tree_idx));
                let indices: Vec<u32> = if self.bootstrap {
                    (0..n_rows)
                        .map(|_| rng.gen_range(0..n_rows) as u32)
                        .collect()
                } else {
                    (0..n_rows as u32).collect()
                };
                context.grow_tree(indices)
            })
            .collect();

        Ok(BaggedForest::from_trees(trees, n_features))
    }
}

/// Shared read-only state for growing one tree.
struct GrowContext<'a> {
    data: &'a [f32],
    n_features: usize,
    targets: &'a [f32],
    max_depth: Option<u32>,
    min_samples_split: usize,
    min_samples_leaf: usize,
}

/// A resolved split candidate.
struct Split {
    feature: u32,
    threshold: f32,
    gain: f64,
}

impl GrowContext<'_> {
    #[inline]
    fn value(&self, row: u32, feature: usize) -> f32 {
        self.data[row as usize * self.n_features + feature]
    }

    fn grow_tree(&self, root_indices: Vec<u32>) -> Tree {
        let mut builder = TreeBuilder::with_root();
        // Frontier of unresolved nodes with their row sets.
        let mut frontier: Vec<(NodeId, Vec<u32>, u32)> = vec![(0, root_indices, 0)];

        while let Some((node, indices, depth)) = frontier.pop() {
            let at_depth_limit = self.max_depth.is_some_and(|d| depth >= d);

            if at_depth_limit || indices.len() < self.min_samples_split {
                builder.make_leaf(node, mean_target(self.targets, &indices));
                continue;
            }

            match self.best_split(&indices) {
                None => builder.make_leaf(node, mean_target(self.targets, &indices)),
                Some(split) => {
                    let (left_rows, right_rows) = self.partition(&indices, &split);
                    let (left, right) = builder.apply_split(node, split.feature, split.threshold);
                    frontier.push((left, left_rows, depth + 1));
                    frontier.push((right, right_rows, depth + 1));
                }
            }
        }

        builder.freeze()
    }

    /// Find the variance-minimizing split over all features, or `None` if
    /// no split satisfies the leaf-size constraint or improves the error.
    fn best_split(&self, indices: &[u32]) -> Option<Split> {
        let n = indices.len();

        let mut total_sum = 0f64;
        let mut total_sq = 0f64;
        for &row in indices {
            let y = self.targets[row as usize] as f64;
            total_sum += y;
            total_sq += y * y;
        }
        let parent_sse = total_sq - total_sum * total_sum / n as f64;
        if parent_sse <= 1e-12 {
            return None;
        }

        let mut best: Option<Split> = None;
        let mut pairs: Vec<(f32, f64)> = Vec::with_capacity(n);

        for feature in 0..self.n_features {
            pairs.clear();
            pairs.extend(
                indices
                    .iter()
                    .map(|&row| (self.value(row, feature), self.targets[row as usize] as f64)),
            );
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0f64;
            let mut left_sq = 0f64;

            for k in 1..n {
                let (value, target) = pairs[k - 1];
                left_sum += target;
                left_sq += target * target;

                // Can only split between distinct feature values.
                if value >= pairs[k].0 {
                    continue;
                }
                if k < self.min_samples_leaf || n - k < self.min_samples_leaf {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse_left = left_sq - left_sum * left_sum / k as f64;
                let sse_right = right_sq - right_sum * right_sum / (n - k) as f64;
                let gain = parent_sse - sse_left - sse_right;

                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Split {
                        feature: feature as u32,
                        threshold: midpoint(value, pairs[k].0),
                        gain,
                    });
                }
            }
        }

        best
    }

    fn partition(&self, indices: &[u32], split: &Split) -> (Vec<u32>, Vec<u32>) {
        let feature = split.feature as usize;
        let mut left = Vec::new();
        let mut right = Vec::new();

        for &row in indices {
            if self.value(row, feature) < split.threshold {
                left.push(row);
            } else {
                right.push(row);
            }
        }

        (left, right)
    }
}

fn mean_target(targets: &[f32], indices: &[u32]) -> f32 {
    let sum: f64 = indices.iter().map(|&row| targets[row as usize] as f64).sum();
    (sum / indices.len().max(1) as f64) as f32
}

/// Midpoint between two adjacent distinct feature values.
fn midpoint(lower: f32, upper: f32) -> f32 {
    let mid = lower + (upper - lower) * 0.5;
    // Guard against midpoint rounding back onto the lower value.
    if mid > lower {
        mid
    } else {
        upper
    }
}
