//! Cross-validated hyperparameter grid search
//!
//! Every (candidate, fold) unit is independent and runs on the rayon
//! pool; fold scores are sorted by a stable key before aggregation so
//! the selected configuration never depends on scheduling order.

use crate::dataset::Dataset;
use crate::error::{OncoTreeError, Result};
use crate::metrics;
use crate::split::{fold_train_indices, stratified_folds};
use crate::tree::{Criterion, DecisionTree, TreeConfig};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Option lists for each tree hyperparameter.
///
/// The candidate set is the Cartesian product, enumerated as the nested
/// loop criterion -> max_depth -> min_samples_split -> min_samples_leaf;
/// ties in mean score resolve to the earliest candidate in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperParamGrid {
    pub criteria: Vec<Criterion>,
    pub max_depths: Vec<Option<usize>>,
    pub min_samples_splits: Vec<usize>,
    pub min_samples_leafs: Vec<usize>,
}

impl Default for HyperParamGrid {
    fn default() -> Self {
        Self {
            criteria: vec![Criterion::Gini, Criterion::Entropy],
            max_depths: vec![Some(3), Some(5), Some(7), Some(10), None],
            min_samples_splits: vec![2, 5, 10],
            min_samples_leafs: vec![1, 2, 4],
        }
    }
}

impl HyperParamGrid {
    /// A single-candidate grid pinning one configuration.
    pub fn fixed(config: &TreeConfig) -> Self {
        Self {
            criteria: vec![config.criterion],
            max_depths: vec![config.max_depth],
            min_samples_splits: vec![config.min_samples_split],
            min_samples_leafs: vec![config.min_samples_leaf],
        }
    }

    /// Enumerate every candidate configuration in deterministic order.
    pub fn candidates(&self) -> Vec<TreeConfig> {
        let mut candidates = Vec::with_capacity(self.len());
        for &criterion in &self.criteria {
            for &max_depth in &self.max_depths {
                for &min_samples_split in &self.min_samples_splits {
                    for &min_samples_leaf in &self.min_samples_leafs {
                        candidates.push(TreeConfig {
                            criterion,
                            max_depth,
                            min_samples_split,
                            min_samples_leaf,
                        });
                    }
                }
            }
        }
        candidates
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
            * self.max_depths.len()
            * self.min_samples_splits.len()
            * self.min_samples_leafs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Metric used to score a candidate on a validation fold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    Accuracy,
    MacroF1,
}

impl Default for Scoring {
    fn default() -> Self {
        Scoring::Accuracy
    }
}

impl Scoring {
    fn score(&self, tree: &DecisionTree, validation: &Dataset) -> Result<f64> {
        let y_pred = tree.predict(validation.features())?;
        Ok(match self {
            Scoring::Accuracy => metrics::accuracy(validation.labels(), &y_pred),
            Scoring::MacroF1 => {
                metrics::macro_f1(validation.labels(), &y_pred, validation.n_classes())
            }
        })
    }
}

/// Score of one candidate on one validation fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldScore {
    pub candidate: usize,
    pub fold: usize,
    pub score: f64,
}

/// Per-candidate fold scores with mean and standard deviation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvSummary {
    pub scores: Vec<f64>,
    pub mean: f64,
    pub std: f64,
}

impl CvSummary {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            scores,
            mean,
            std: variance.sqrt(),
        }
    }
}

/// Outcome of a grid search: the winning configuration, its final tree
/// re-trained on the full input dataset, and every score computed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchResult {
    pub best_config: TreeConfig,
    pub best_index: usize,
    pub best_score: f64,
    /// All (candidate, fold) scores, sorted by candidate then fold.
    pub fold_scores: Vec<FoldScore>,
    /// One summary per candidate, in enumeration order.
    pub summaries: Vec<CvSummary>,
    pub best_tree: DecisionTree,
}

/// Exhaustive grid search with stratified k-fold cross-validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearch {
    grid: HyperParamGrid,
    k: usize,
    scoring: Scoring,
    seed: u64,
}

impl GridSearch {
    pub fn new(grid: HyperParamGrid) -> Self {
        Self {
            grid,
            k: 5,
            scoring: Scoring::Accuracy,
            seed: 42,
        }
    }

    pub fn with_folds(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Run the search. Selection is purely by mean cross-validation
    /// score on `dataset`; no held-out data is consulted.
    pub fn run(&self, dataset: &Dataset) -> Result<GridSearchResult> {
        let candidates = self.grid.candidates();
        if candidates.is_empty() {
            return Err(OncoTreeError::invalid_parameter(
                "grid",
                0,
                "grid must enumerate at least one candidate",
            ));
        }
        for candidate in &candidates {
            candidate.validate()?;
        }

        let folds = stratified_folds(dataset, self.k, self.seed)?;
        let train_sets: Vec<Dataset> = (0..self.k)
            .map(|fold| dataset.subset(&fold_train_indices(&folds, fold)))
            .collect();
        let validation_sets: Vec<Dataset> =
            folds.iter().map(|fold| dataset.subset(fold)).collect();

        info!(
            candidates = candidates.len(),
            folds = self.k,
            "starting grid search"
        );

        let units: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..self.k).map(move |f| (c, f)))
            .collect();

        let mut fold_scores: Vec<FoldScore> = units
            .into_par_iter()
            .map(|(candidate, fold)| {
                let tree = DecisionTree::fit(&train_sets[fold], &candidates[candidate])?;
                let score = self.scoring.score(&tree, &validation_sets[fold])?;
                Ok(FoldScore {
                    candidate,
                    fold,
                    score,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Stable aggregation order regardless of worker completion.
        fold_scores.sort_by_key(|s| (s.candidate, s.fold));

        let summaries: Vec<CvSummary> = fold_scores
            .chunks(self.k)
            .map(|chunk| CvSummary::from_scores(chunk.iter().map(|s| s.score).collect()))
            .collect();

        let mut best_index = 0;
        for (i, summary) in summaries.iter().enumerate() {
            if summary.mean > summaries[best_index].mean {
                best_index = i;
            }
        }
        let best_config = candidates[best_index].clone();
        let best_score = summaries[best_index].mean;

        debug!(
            ?best_config,
            best_score, "grid search selected configuration"
        );

        let best_tree = DecisionTree::fit(dataset, &best_config)?;

        Ok(GridSearchResult {
            best_config,
            best_index,
            best_score,
            fold_scores,
            summaries,
            best_tree,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use ndarray::Array2;

    /// 20 rows, 2 features; feature 0 separates the classes at 5.5,
    /// feature 1 is noise. The boundary values 5 and 6 are repeated so
    /// every cross-validation fold sees them in training and the
    /// learned threshold never drifts.
    fn separable_dataset() -> Dataset {
        let class0 = [1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0];
        let class1 = [6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let features = Array2::from_shape_fn((20, 2), |(i, j)| {
            if j == 0 {
                if i < 10 {
                    class0[i]
                } else {
                    class1[i - 10]
                }
            } else {
                ((i * 7) % 5) as f64
            }
        });
        let labels = (0..20).map(|i| usize::from(i >= 10)).collect();
        Dataset::new(features, labels, 2).unwrap()
    }

    fn small_grid() -> HyperParamGrid {
        HyperParamGrid {
            criteria: vec![Criterion::Gini, Criterion::Entropy],
            max_depths: vec![Some(1), Some(3)],
            min_samples_splits: vec![2],
            min_samples_leafs: vec![1, 2],
        }
    }

    #[test]
    fn test_candidate_enumeration_order() {
        let grid = small_grid();
        let candidates = grid.candidates();
        assert_eq!(candidates.len(), 8);
        assert_eq!(grid.len(), 8);

        // min_samples_leaf varies fastest, criterion slowest.
        assert_eq!(candidates[0].criterion, Criterion::Gini);
        assert_eq!(candidates[0].min_samples_leaf, 1);
        assert_eq!(candidates[1].min_samples_leaf, 2);
        assert_eq!(candidates[2].max_depth, Some(3));
        assert_eq!(candidates[4].criterion, Criterion::Entropy);
    }

    #[test]
    fn test_search_finds_separating_config() {
        let ds = separable_dataset();
        let result = GridSearch::new(small_grid())
            .with_folds(5)
            .with_seed(42)
            .run(&ds)
            .unwrap();

        // The data is perfectly separable at depth 1 already.
        assert_eq!(result.best_score, 1.0);
        let preds = result.best_tree.predict(ds.features()).unwrap();
        assert_eq!(preds, ds.labels());
    }

    #[test]
    fn test_best_score_is_max_of_summaries() {
        let ds = separable_dataset();
        let result = GridSearch::new(small_grid()).with_folds(4).run(&ds).unwrap();

        let max_mean = result
            .summaries
            .iter()
            .map(|s| s.mean)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(result.best_score, max_mean);
        assert_eq!(result.summaries.len(), 8);
        assert_eq!(result.fold_scores.len(), 8 * 4);
    }

    #[test]
    fn test_tie_breaks_to_first_candidate() {
        let ds = separable_dataset();
        let result = GridSearch::new(small_grid()).run(&ds).unwrap();

        // Every candidate scores 1.0 on this data, so enumeration
        // order decides.
        assert_eq!(result.best_index, 0);
        assert_eq!(result.best_config, small_grid().candidates()[0]);
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let ds = separable_dataset();
        let search = GridSearch::new(small_grid()).with_folds(5).with_seed(7);
        let a = search.run(&ds).unwrap();
        let b = search.run(&ds).unwrap();
        assert_eq!(a.best_index, b.best_index);
        assert_eq!(a.fold_scores, b.fold_scores);
        assert_eq!(a.summaries, b.summaries);
    }

    #[test]
    fn test_fold_scores_are_sorted() {
        let ds = separable_dataset();
        let result = GridSearch::new(small_grid()).with_folds(3).run(&ds).unwrap();
        let keys: Vec<(usize, usize)> = result
            .fold_scores
            .iter()
            .map(|s| (s.candidate, s.fold))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_rejects_bad_fold_counts() {
        let ds = separable_dataset();
        assert!(matches!(
            GridSearch::new(small_grid()).with_folds(1).run(&ds).unwrap_err(),
            OncoTreeError::InvalidParameter { .. }
        ));
        assert!(matches!(
            GridSearch::new(small_grid()).with_folds(11).run(&ds).unwrap_err(),
            OncoTreeError::InsufficientData { .. }
        ));
    }

    #[test]
    fn test_rejects_invalid_candidate() {
        let ds = separable_dataset();
        let grid = HyperParamGrid {
            criteria: vec![Criterion::Gini],
            max_depths: vec![None],
            min_samples_splits: vec![1],
            min_samples_leafs: vec![1],
        };
        assert!(matches!(
            GridSearch::new(grid).run(&ds).unwrap_err(),
            OncoTreeError::InvalidParameter { .. }
        ));
    }

    #[test]
    fn test_fixed_grid_has_one_candidate() {
        let config = TreeConfig::default().with_max_depth(5);
        let grid = HyperParamGrid::fixed(&config);
        assert_eq!(grid.candidates(), vec![config]);
    }

    #[test]
    fn test_scoring_variants() {
        let ds = separable_dataset();
        let result = GridSearch::new(small_grid())
            .with_scoring(Scoring::MacroF1)
            .run(&ds)
            .unwrap();
        assert_eq!(result.best_score, 1.0);
    }
}
