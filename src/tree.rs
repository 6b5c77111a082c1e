//! Decision tree induction, prediction and feature importance
//!
//! The tree is stored as an arena of nodes addressed by index, with
//! internal nodes holding child indices. The structure is acyclic by
//! construction and serializes directly.

use crate::dataset::Dataset;
use crate::error::{OncoTreeError, Result};
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Write as _;

/// Impurity criterion for split selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    /// Gini impurity: `1 - sum(p_c^2)`
    Gini,
    /// Shannon entropy in bits: `-sum(p_c * log2(p_c))`
    Entropy,
}

impl Criterion {
    /// Impurity of a node given its per-class row counts.
    pub fn impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        match self {
            Criterion::Gini => {
                let sum_sq: f64 = counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p
                    })
                    .sum();
                1.0 - sum_sq
            }
            Criterion::Entropy => -counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.log2()
                })
                .sum::<f64>(),
        }
    }
}

/// Hyperparameter configuration for one tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    pub criterion: Criterion,
    /// Maximum depth of the tree; `None` leaves depth unbounded.
    /// `Some(0)` forbids any split and yields a single leaf.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            criterion: Criterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl TreeConfig {
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Check the parameter constraints.
    pub fn validate(&self) -> Result<()> {
        if self.min_samples_split < 2 {
            return Err(OncoTreeError::invalid_parameter(
                "min_samples_split",
                self.min_samples_split,
                "must be at least 2",
            ));
        }
        if self.min_samples_leaf < 1 {
            return Err(OncoTreeError::invalid_parameter(
                "min_samples_leaf",
                self.min_samples_leaf,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Index of a node in the tree arena
pub type NodeId = usize;

/// One node of a trained tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    /// Terminal node holding the class-probability vector derived from
    /// training-row counts.
    Leaf {
        probabilities: Vec<f64>,
        n_samples: usize,
    },
    /// Binary split: rows with `row[feature] <= threshold` go left.
    Internal {
        feature: usize,
        threshold: f64,
        gain: f64,
        n_samples: usize,
        left: NodeId,
        right: NodeId,
    },
}

/// A trained binary decision-tree classifier
///
/// Immutable after [`DecisionTree::fit`]; prediction is deterministic
/// for a given tree and input row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    config: TreeConfig,
    nodes: Vec<Node>,
    n_features: usize,
    n_classes: usize,
    feature_importances: Vec<f64>,
}

impl DecisionTree {
    /// Induce a tree on the full dataset under the given configuration.
    pub fn fit(dataset: &Dataset, config: &TreeConfig) -> Result<Self> {
        config.validate()?;
        if dataset.n_rows() == 0 {
            return Err(OncoTreeError::EmptyTrainingSet);
        }

        let mut builder = TreeBuilder {
            dataset,
            config,
            nodes: Vec::new(),
            importances: vec![0.0; dataset.n_features()],
            total_rows: dataset.n_rows(),
        };
        let indices: Vec<usize> = (0..dataset.n_rows()).collect();
        builder.grow(&indices, 0);

        let mut importances = builder.importances;
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }

        Ok(Self {
            config: config.clone(),
            nodes: builder.nodes,
            n_features: dataset.n_features(),
            n_classes: dataset.n_classes(),
            feature_importances: importances,
        })
    }

    /// Class-probability vector for a single row.
    pub fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        let mut id: NodeId = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { probabilities, .. } => return probabilities,
                Node::Internal {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Predicted class for a single row (argmax of the leaf vector;
    /// ties resolve to the lowest class code).
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> usize {
        argmax(self.predict_proba_row(row))
    }

    /// Predicted classes for a feature matrix.
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        self.check_arity(features)?;
        Ok((0..features.nrows())
            .map(|i| self.predict_row(features.row(i)))
            .collect())
    }

    /// Class-probability matrix (`n_rows x n_classes`) for a feature matrix.
    pub fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_arity(features)?;
        let mut probs = Array2::zeros((features.nrows(), self.n_classes));
        for i in 0..features.nrows() {
            let leaf = self.predict_proba_row(features.row(i));
            for (j, &p) in leaf.iter().enumerate() {
                probs[[i, j]] = p;
            }
        }
        Ok(probs)
    }

    fn check_arity(&self, features: &Array2<f64>) -> Result<()> {
        if features.ncols() != self.n_features {
            return Err(OncoTreeError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", features.ncols()),
            });
        }
        Ok(())
    }

    /// Normalized importance per feature. Sums to 1 for any tree with
    /// at least one internal node, to 0 for a single-leaf tree.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the tree; 0 for a single leaf.
    pub fn depth(&self) -> usize {
        self.node_depth(0)
    }

    fn node_depth(&self, id: NodeId) -> usize {
        match &self.nodes[id] {
            Node::Leaf { .. } => 0,
            Node::Internal { left, right, .. } => {
                1 + self.node_depth(*left).max(self.node_depth(*right))
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Indented textual rendering of the tree, in the style of
    /// sklearn's `export_text`.
    pub fn export_text(
        &self,
        feature_names: Option<&[String]>,
        class_tokens: Option<&[String]>,
    ) -> String {
        let mut out = String::new();
        self.render_node(0, 0, feature_names, class_tokens, &mut out);
        out
    }

    fn render_node(
        &self,
        id: NodeId,
        depth: usize,
        feature_names: Option<&[String]>,
        class_tokens: Option<&[String]>,
        out: &mut String,
    ) {
        let indent = "|   ".repeat(depth);
        match &self.nodes[id] {
            Node::Leaf {
                probabilities,
                n_samples,
            } => {
                let class = argmax(probabilities);
                let name = class_tokens
                    .and_then(|t| t.get(class).cloned())
                    .unwrap_or_else(|| class.to_string());
                let _ = writeln!(
                    out,
                    "{indent}|--- class: {name} (samples = {n_samples}, p = {probabilities:.3?})"
                );
            }
            Node::Internal {
                feature,
                threshold,
                left,
                right,
                ..
            } => {
                let name = feature_names
                    .and_then(|n| n.get(*feature).cloned())
                    .unwrap_or_else(|| format!("feature_{feature}"));
                let _ = writeln!(out, "{indent}|--- {name} <= {threshold:.3}");
                self.render_node(*left, depth + 1, feature_names, class_tokens, out);
                let _ = writeln!(out, "{indent}|--- {name} > {threshold:.3}");
                self.render_node(*right, depth + 1, feature_names, class_tokens, out);
            }
        }
    }
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Best split found for one candidate node
struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    dataset: &'a Dataset,
    config: &'a TreeConfig,
    nodes: Vec<Node>,
    importances: Vec<f64>,
    total_rows: usize,
}

impl TreeBuilder<'_> {
    /// Expand the candidate node holding `indices` at `depth`, pushing
    /// its subtree into the arena and returning the subtree root.
    fn grow(&mut self, indices: &[usize], depth: usize) -> NodeId {
        let counts = self.class_counts(indices);

        let stopped = self.is_pure(&counts)
            || self.config.max_depth.is_some_and(|d| depth >= d)
            || indices.len() < self.config.min_samples_split;

        let split = if stopped {
            None
        } else {
            self.find_best_split(indices, &counts)
        };

        match split {
            None => self.push_leaf(&counts, indices.len()),
            Some(split) => {
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| self.dataset.features()[[i, split.feature]] <= split.threshold);

                self.importances[split.feature] +=
                    indices.len() as f64 / self.total_rows as f64 * split.gain;

                // Reserve the slot so children land after their parent.
                let id = self.nodes.len();
                self.nodes.push(Node::Leaf {
                    probabilities: Vec::new(),
                    n_samples: 0,
                });
                let left = self.grow(&left_rows, depth + 1);
                let right = self.grow(&right_rows, depth + 1);
                self.nodes[id] = Node::Internal {
                    feature: split.feature,
                    threshold: split.threshold,
                    gain: split.gain,
                    n_samples: indices.len(),
                    left,
                    right,
                };
                id
            }
        }
    }

    fn push_leaf(&mut self, counts: &[usize], n_samples: usize) -> NodeId {
        let probabilities = counts
            .iter()
            .map(|&c| c as f64 / n_samples as f64)
            .collect();
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            probabilities,
            n_samples,
        });
        id
    }

    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.dataset.n_classes()];
        for &i in indices {
            counts[self.dataset.label(i)] += 1;
        }
        counts
    }

    fn is_pure(&self, counts: &[usize]) -> bool {
        counts.iter().filter(|&&c| c > 0).count() <= 1
    }

    /// Scan every feature for the threshold with the highest impurity
    /// reduction. Features are scanned in parallel; the winner is chosen
    /// by a sequential pass so ties always resolve to the lowest feature
    /// index, then the lowest threshold, independent of scheduling.
    fn find_best_split(&self, indices: &[usize], parent_counts: &[usize]) -> Option<Split> {
        let criterion = self.config.criterion;
        let parent_impurity = criterion.impurity(parent_counts, indices.len());

        let per_feature: Vec<Option<(f64, f64)>> = (0..self.dataset.n_features())
            .into_par_iter()
            .map(|feature| self.best_threshold(feature, indices, parent_counts, parent_impurity))
            .collect();

        let mut best: Option<Split> = None;
        for (feature, candidate) in per_feature.into_iter().enumerate() {
            if let Some((threshold, gain)) = candidate {
                if best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Split {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }

    /// Best (threshold, gain) for one feature, or `None` when no
    /// candidate produces a positive gain with both children holding at
    /// least `min_samples_leaf` rows. Thresholds are the midpoints
    /// between consecutive distinct sorted values; sweeping ascending
    /// with a strict comparison keeps the lowest winning threshold.
    fn best_threshold(
        &self,
        feature: usize,
        indices: &[usize],
        parent_counts: &[usize],
        parent_impurity: f64,
    ) -> Option<(f64, f64)> {
        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf;
        let criterion = self.config.criterion;

        let mut sorted: Vec<(f64, usize)> = indices
            .iter()
            .map(|&i| (self.dataset.features()[[i, feature]], self.dataset.label(i)))
            .collect();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let mut left_counts = vec![0usize; parent_counts.len()];
        let mut best: Option<(f64, f64)> = None;

        for i in 0..n - 1 {
            left_counts[sorted[i].1] += 1;
            if sorted[i].0 == sorted[i + 1].0 {
                continue;
            }

            let left_n = i + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }

            let right_counts: Vec<usize> = parent_counts
                .iter()
                .zip(left_counts.iter())
                .map(|(&p, &l)| p - l)
                .collect();

            let weighted = (left_n as f64 * criterion.impurity(&left_counts, left_n)
                + right_n as f64 * criterion.impurity(&right_counts, right_n))
                / n as f64;
            let gain = parent_impurity - weighted;
            if gain <= 0.0 {
                continue;
            }

            if best.map_or(true, |(_, g)| gain > g) {
                let threshold = (sorted[i].0 + sorted[i + 1].0) / 2.0;
                best = Some((threshold, gain));
            }
        }
        best
    }
}
