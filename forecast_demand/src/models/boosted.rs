//! Gradient-boosted regression trees over context features and lagged demand
//!
//! Each tree is stored as flat node arrays: internal node `i` splits on
//! `split_features[i] <= thresholds[i]`, and a negative child `c` points at
//! leaf `-c - 1`.

use crate::config::BoostingConfig;
use crate::data::DemandSeries;
use crate::error::{ForecastError, Result};
use crate::features::{FEATURE_COUNT, FEATURE_NAMES};
use crate::models::{lag_features, DayContext, ForecastModel, TrainedForecastModel};
use serde::{Deserialize, Serialize};

/// Context features followed by `lag1`, `lag7` and `mean7`
pub const INPUT_COUNT: usize = FEATURE_COUNT + 3;

pub fn input_names() -> Vec<&'static str> {
    FEATURE_NAMES
        .iter()
        .copied()
        .chain(["lag1", "lag7", "mean7"])
        .collect()
}

fn inputs(ctx: &DayContext<'_>) -> Vec<f64> {
    let mut row = ctx.features.to_vector().to_vec();
    row.extend_from_slice(&lag_features(ctx.history));
    row
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    split_features: Vec<usize>,
    thresholds: Vec<f64>,
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    leaf_values: Vec<f64>,
}

impl RegressionTree {
    fn leaf_only(value: f64) -> Self {
        Self {
            split_features: Vec::new(),
            thresholds: Vec::new(),
            left_child: Vec::new(),
            right_child: Vec::new(),
            leaf_values: vec![value],
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.leaf_values.len()
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        if self.split_features.is_empty() {
            return self.leaf_values.first().copied().unwrap_or_default();
        }
        let mut node_idx = 0usize;
        loop {
            let feature_idx = self.split_features[node_idx];
            let feature_value = row.get(feature_idx).copied().unwrap_or(0.0);
            let child = if feature_value <= self.thresholds[node_idx] {
                self.left_child[node_idx]
            } else {
                self.right_child[node_idx]
            };
            if child < 0 {
                let leaf_idx = (-child - 1) as usize;
                return self.leaf_values.get(leaf_idx).copied().unwrap_or_default();
            }
            node_idx = child as usize;
        }
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    targets: &'a [f64],
    config: &'a BoostingConfig,
    tree: RegressionTree,
}

impl<'a> TreeBuilder<'a> {
    fn build(rows: &'a [Vec<f64>], targets: &'a [f64], config: &'a BoostingConfig) -> RegressionTree {
        let mut builder = Self {
            rows,
            targets,
            config,
            tree: RegressionTree::leaf_only(0.0),
        };
        builder.tree.leaf_values.clear();
        let all: Vec<usize> = (0..rows.len()).collect();
        let root = builder.grow(all, 0);
        if root < 0 {
            // The root is a leaf.
            let value = builder.tree.leaf_values.first().copied().unwrap_or_default();
            return RegressionTree::leaf_only(value);
        }
        builder.tree
    }

    fn leaf(&mut self, idx: &[usize]) -> i32 {
        let value = if idx.is_empty() {
            0.0
        } else {
            idx.iter().map(|&i| self.targets[i]).sum::<f64>() / idx.len() as f64
        };
        self.tree.leaf_values.push(value);
        -(self.tree.leaf_values.len() as i32)
    }

    fn grow(&mut self, idx: Vec<usize>, depth: usize) -> i32 {
        if depth >= self.config.max_depth || idx.len() < 2 * self.config.min_samples_leaf {
            return self.leaf(&idx);
        }
        let Some(split) = self.best_split(&idx) else {
            return self.leaf(&idx);
        };

        let node = self.tree.split_features.len();
        self.tree.split_features.push(split.feature);
        self.tree.thresholds.push(split.threshold);
        self.tree.left_child.push(0);
        self.tree.right_child.push(0);

        let (left, right): (Vec<usize>, Vec<usize>) = idx
            .into_iter()
            .partition(|&i| self.rows[i][split.feature] <= split.threshold);
        let left_child = self.grow(left, depth + 1);
        let right_child = self.grow(right, depth + 1);
        self.tree.left_child[node] = left_child;
        self.tree.right_child[node] = right_child;
        node as i32
    }

    fn best_split(&self, idx: &[usize]) -> Option<Split> {
        let min_leaf = self.config.min_samples_leaf.max(1);
        let n = idx.len();
        let total: f64 = idx.iter().map(|&i| self.targets[i]).sum();
        let parent_score = total * total / n as f64;
        let mut best: Option<Split> = None;

        for feature in 0..INPUT_COUNT {
            let mut order: Vec<usize> = idx.to_vec();
            order.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut left_sum = 0.0;
            for k in 1..n {
                left_sum += self.targets[order[k - 1]];
                if k < min_leaf || n - k < min_leaf {
                    continue;
                }
                let (lo, hi) = (self.rows[order[k - 1]][feature], self.rows[order[k]][feature]);
                if hi - lo <= f64::EPSILON {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / k as f64 + right_sum * right_sum / (n - k) as f64 - parent_score;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Split {
                        feature,
                        threshold: (lo + hi) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Gradient boosting with squared loss
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    config: BoostingConfig,
}

impl GradientBoostedTrees {
    pub fn new(config: BoostingConfig) -> Result<Self> {
        if config.n_estimators == 0 || config.max_depth == 0 || config.min_samples_leaf == 0 {
            return Err(ForecastError::InvalidParameter(
                "Boosting needs at least one estimator, depth and leaf sample".to_string(),
            ));
        }
        if !(config.learning_rate > 0.0 && config.learning_rate <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Learning rate must be in (0, 1], got {}",
                config.learning_rate
            )));
        }
        Ok(Self { config })
    }
}

/// Trained boosted ensemble of regression trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedBoostedTrees {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl TrainedBoostedTrees {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn score(&self, row: &[f64]) -> f64 {
        self.base_score + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

impl ForecastModel for GradientBoostedTrees {
    type Trained = TrainedBoostedTrees;

    fn train(&self, data: &DemandSeries) -> Result<Self::Trained> {
        let values = data.values();
        let needed = 2 * self.config.min_samples_leaf + 1;
        if values.len() < needed {
            return Err(ForecastError::TrainingError(format!(
                "Boosted model needs at least {} observations, got {}",
                needed,
                values.len()
            )));
        }

        // Row i predicts day i from the days before it.
        let rows: Vec<Vec<f64>> = (1..values.len())
            .map(|i| {
                let ctx = DayContext::new(data.dates()[i], &data.features()[i], &values[..i]);
                inputs(&ctx)
            })
            .collect();
        let targets = &values[1..];

        let base_score = targets.iter().sum::<f64>() / targets.len() as f64;
        let mut fitted = vec![base_score; targets.len()];
        let mut trees = Vec::with_capacity(self.config.n_estimators);
        for _ in 0..self.config.n_estimators {
            let residuals: Vec<f64> = targets.iter().zip(&fitted).map(|(y, f)| y - f).collect();
            let tree = TreeBuilder::build(&rows, &residuals, &self.config);
            for (f, row) in fitted.iter_mut().zip(&rows) {
                *f += self.config.learning_rate * tree.predict(row);
            }
            let done = tree.n_leaves() == 1;
            trees.push(tree);
            if done {
                break;
            }
        }

        Ok(TrainedBoostedTrees {
            base_score,
            learning_rate: self.config.learning_rate,
            trees,
        })
    }

    fn name(&self) -> &str {
        "gradient_boosted"
    }
}

impl TrainedForecastModel for TrainedBoostedTrees {
    fn predict_day(&self, ctx: &DayContext<'_>) -> Result<f64> {
        Ok(self.score(&inputs(ctx)).max(0.0))
    }

    fn name(&self) -> &str {
        "gradient_boosted"
    }
}
