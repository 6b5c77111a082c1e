//! Immutable tabular dataset shared by all training components

use crate::error::{OncoTreeError, Result};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Mapping from original label tokens (e.g. "B"/"M") to class codes `0..K-1`.
///
/// Produced by the ingestion collaborator and carried on the dataset so
/// reports can echo human-readable class names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEncoding {
    tokens: Vec<String>,
}

impl ClassEncoding {
    /// Create an encoding from tokens ordered by class code.
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens }
    }

    /// Token for a class code, if in range.
    pub fn token(&self, class: usize) -> Option<&str> {
        self.tokens.get(class).map(String::as_str)
    }

    /// Class code for a token, if known.
    pub fn code(&self, token: &str) -> Option<usize> {
        self.tokens.iter().position(|t| t == token)
    }

    pub fn n_classes(&self) -> usize {
        self.tokens.len()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// In-memory table of numeric feature columns plus one class-label column.
///
/// Invariants, checked at construction: every row has the same feature
/// arity and every label is in `0..n_classes`. The dataset is immutable
/// once built; downstream components consume it by shared reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    features: Array2<f64>,
    labels: Vec<usize>,
    n_classes: usize,
    feature_names: Option<Vec<String>>,
    encoding: Option<ClassEncoding>,
}

impl Dataset {
    /// Build a dataset from a feature matrix and a label vector.
    pub fn new(features: Array2<f64>, labels: Vec<usize>, n_classes: usize) -> Result<Self> {
        if labels.len() != features.nrows() {
            return Err(OncoTreeError::ShapeError {
                expected: format!("{} labels", features.nrows()),
                actual: format!("{} labels", labels.len()),
            });
        }
        if n_classes < 2 {
            return Err(OncoTreeError::invalid_parameter(
                "n_classes",
                n_classes,
                "at least 2 classes required",
            ));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(OncoTreeError::invalid_parameter(
                "labels",
                bad,
                format!("labels must be in 0..{}", n_classes),
            ));
        }
        Ok(Self {
            features,
            labels,
            n_classes,
            feature_names: None,
            encoding: None,
        })
    }

    /// Attach feature names (one per column).
    pub fn with_feature_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.n_features() {
            return Err(OncoTreeError::ShapeError {
                expected: format!("{} feature names", self.n_features()),
                actual: format!("{} feature names", names.len()),
            });
        }
        self.feature_names = Some(names);
        Ok(self)
    }

    /// Attach the original class-label encoding.
    pub fn with_encoding(mut self, encoding: ClassEncoding) -> Result<Self> {
        if encoding.n_classes() != self.n_classes {
            return Err(OncoTreeError::ShapeError {
                expected: format!("{} class tokens", self.n_classes),
                actual: format!("{} class tokens", encoding.n_classes()),
            });
        }
        self.encoding = Some(encoding);
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Label of a single row.
    pub fn label(&self, row: usize) -> usize {
        self.labels[row]
    }

    /// Feature values of a single row.
    pub fn row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.features.row(row)
    }

    pub fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    pub fn encoding(&self) -> Option<&ClassEncoding> {
        self.encoding.as_ref()
    }

    /// Row count per class, indexed by class code.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &label in &self.labels {
            counts[label] += 1;
        }
        counts
    }

    /// Materialize a new dataset from a subset of row indices.
    ///
    /// Feature names and class encoding are carried over; the class set
    /// stays the full `0..n_classes` even if a class has no rows in the
    /// subset.
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        let mut features = Array2::zeros((indices.len(), self.n_features()));
        let mut labels = Vec::with_capacity(indices.len());
        for (out, &idx) in indices.iter().enumerate() {
            features.row_mut(out).assign(&self.features.row(idx));
            labels.push(self.labels[idx]);
        }
        Dataset {
            features,
            labels,
            n_classes: self.n_classes,
            feature_names: self.feature_names.clone(),
            encoding: self.encoding.clone(),
        }
    }

    /// Flat summary for reports.
    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            n_rows: self.n_rows(),
            n_features: self.n_features(),
            class_counts: self.class_counts(),
            class_tokens: self.encoding.as_ref().map(|e| e.tokens().to_vec()),
        }
    }
}

/// Dataset shape and class balance, as exposed to reporting callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub n_rows: usize,
    pub n_features: usize,
    pub class_counts: Vec<usize>,
    pub class_tokens: Option<Vec<String>>,
}
