//! oncotree - decision-tree training and diagnostic evaluation engine
//!
//! A small, self-contained engine for fitting binary decision-tree
//! classifiers to tabular medical data and reporting diagnostic-quality
//! metrics:
//!
//! - [`dataset`] - Immutable in-memory tabular dataset
//! - [`split`] - Stratified train/test splitting and k-fold assignment
//! - [`tree`] - Decision-tree induction, prediction, feature importance
//! - [`grid_search`] - Cross-validated hyperparameter grid search
//! - [`metrics`] - Confusion matrix, precision/recall/F1, clinical
//!   rates, ROC and precision-recall curves
//! - [`pipeline`] - Split -> search -> evaluate orchestration
//!
//! The engine is a library, not a service: ingestion, persistence,
//! rendering and transport belong to the caller. Every randomized
//! operation takes an explicit seed and every result is independent of
//! worker scheduling, so a run is reproducible bit-for-bit.
//!
//! # Example
//!
//! ```
//! use ndarray::Array2;
//! use oncotree::prelude::*;
//!
//! let features = Array2::from_shape_fn((10, 1), |(i, _)| (i + 1) as f64);
//! let labels = vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
//! let dataset = Dataset::new(features, labels, 2)?;
//!
//! let config = TreeConfig::default().with_max_depth(1);
//! let tree = DecisionTree::fit(&dataset, &config)?;
//! let report = evaluate(&tree, &dataset, Averaging::Weighted)?;
//! assert_eq!(report.accuracy, 1.0);
//! # Ok::<(), oncotree::OncoTreeError>(())
//! ```

pub mod error;

pub mod dataset;
pub mod grid_search;
pub mod metrics;
pub mod pipeline;
pub mod split;
pub mod tree;

pub use error::{OncoTreeError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::dataset::{ClassEncoding, Dataset, DatasetSummary};
    pub use crate::error::{OncoTreeError, Result};
    pub use crate::grid_search::{GridSearch, GridSearchResult, HyperParamGrid, Scoring};
    pub use crate::metrics::{evaluate, Averaging, ConfusionMatrix, EvaluationReport};
    pub use crate::pipeline::{PipelineConfig, PipelineReport};
    pub use crate::split::{stratified_folds, train_test_split, TrainTestSplit};
    pub use crate::tree::{Criterion, DecisionTree, TreeConfig};
}
