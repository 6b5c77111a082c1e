//! End-to-end training pipeline: split, search, evaluate
//!
//! Composes the splitter, grid search and evaluation module into the
//! flat report payload expected at the service boundary. Transport,
//! persistence and rendering stay with the caller.

use crate::dataset::{Dataset, DatasetSummary};
use crate::error::Result;
use crate::grid_search::{CvSummary, GridSearch, HyperParamGrid, Scoring};
use crate::metrics::{evaluate, Averaging, EvaluationReport};
use crate::split::train_test_split;
use crate::tree::{DecisionTree, TreeConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Configuration of one full training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub train_fraction: f64,
    pub folds: usize,
    pub seed: u64,
    pub grid: HyperParamGrid,
    pub scoring: Scoring,
    pub averaging: Averaging,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            folds: 5,
            seed: 42,
            grid: HyperParamGrid::default(),
            scoring: Scoring::Accuracy,
            averaging: Averaging::Weighted,
        }
    }
}

impl PipelineConfig {
    /// Pin a single configuration instead of searching a grid.
    pub fn with_fixed_config(mut self, config: &TreeConfig) -> Self {
        self.grid = HyperParamGrid::fixed(config);
        self
    }
}

/// Flat, serializable result of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub dataset: DatasetSummary,
    /// The winning hyperparameter configuration.
    pub config: TreeConfig,
    /// Cross-validation fold scores of the winner.
    pub cv: CvSummary,
    pub evaluation: EvaluationReport,
    pub feature_importances: Vec<f64>,
    pub tree_depth: usize,
    pub tree_leaves: usize,
}

/// Run the full pipeline on a dataset.
///
/// The dataset is stratified into train/test halves; the grid search
/// selects a configuration purely by cross-validation on the training
/// half and re-trains on it; the held-out test half is touched exactly
/// once, by the final evaluation.
pub fn run(dataset: &Dataset, config: &PipelineConfig) -> Result<(DecisionTree, PipelineReport)> {
    let split = train_test_split(dataset, config.train_fraction, config.seed)?;
    info!(
        train_rows = split.train.n_rows(),
        test_rows = split.test.n_rows(),
        "dataset split"
    );

    let result = GridSearch::new(config.grid.clone())
        .with_folds(config.folds)
        .with_scoring(config.scoring)
        .with_seed(config.seed)
        .run(&split.train)?;

    let evaluation = evaluate(&result.best_tree, &split.test, config.averaging)?;
    info!(
        accuracy = evaluation.accuracy,
        cv_score = result.best_score,
        "pipeline finished"
    );

    let report = PipelineReport {
        dataset: dataset.summary(),
        config: result.best_config,
        cv: result.summaries[result.best_index].clone(),
        evaluation,
        feature_importances: result.best_tree.feature_importances().to_vec(),
        tree_depth: result.best_tree.depth(),
        tree_leaves: result.best_tree.n_leaves(),
    };
    Ok((result.best_tree, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ClassEncoding;
    use crate::tree::Criterion;
    use ndarray::Array2;

    fn separable_dataset() -> Dataset {
        let class0 = [1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0];
        let class1 = [6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        let features = Array2::from_shape_fn((20, 1), |(i, _)| {
            if i < 10 {
                class0[i]
            } else {
                class1[i - 10]
            }
        });
        let labels = (0..20).map(|i| usize::from(i >= 10)).collect();
        Dataset::new(features, labels, 2)
            .unwrap()
            .with_encoding(ClassEncoding::new(vec!["B".into(), "M".into()]))
            .unwrap()
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            folds: 3,
            grid: HyperParamGrid {
                criteria: vec![Criterion::Gini],
                max_depths: vec![Some(1), Some(3)],
                min_samples_splits: vec![2],
                min_samples_leafs: vec![1],
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let ds = separable_dataset();
        let (tree, report) = run(&ds, &small_config()).unwrap();

        assert_eq!(report.dataset.n_rows, 20);
        assert_eq!(report.dataset.class_counts, vec![10, 10]);
        assert_eq!(report.dataset.class_tokens.as_deref(), Some(&["B".to_string(), "M".to_string()][..]));
        assert_eq!(report.evaluation.accuracy, 1.0);
        assert_eq!(report.tree_depth, 1);
        assert_eq!(report.tree_leaves, 2);
        assert_eq!(report.feature_importances, vec![1.0]);
        assert_eq!(tree.predict(ds.features()).unwrap(), ds.labels());
    }

    #[test]
    fn test_pipeline_deterministic_per_seed() {
        let ds = separable_dataset();
        let config = small_config();
        let (_, a) = run(&ds, &config).unwrap();
        let (_, b) = run(&ds, &config).unwrap();
        assert_eq!(a.config, b.config);
        assert_eq!(a.cv, b.cv);
        assert_eq!(a.evaluation.accuracy, b.evaluation.accuracy);
    }

    #[test]
    fn test_pipeline_fixed_config_skips_search() {
        let ds = separable_dataset();
        let fixed = TreeConfig::default().with_max_depth(1);
        let config = PipelineConfig {
            folds: 3,
            ..PipelineConfig::default()
        }
        .with_fixed_config(&fixed);

        let (_, report) = run(&ds, &config).unwrap();
        assert_eq!(report.config, fixed);
        assert_eq!(report.cv.scores.len(), 3);
    }

    #[test]
    fn test_report_is_serializable() {
        let ds = separable_dataset();
        let (_, report) = run(&ds, &small_config()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("evaluation").is_some());
        assert!(json.get("feature_importances").is_some());
        let restored: PipelineReport = serde_json::from_value(json).unwrap();
        assert_eq!(restored.config, report.config);
    }
}
