//! Classification and clinical evaluation metrics
//!
//! Produces the [`EvaluationReport`] consumed by reporting and
//! visualization collaborators. Rate metrics with a zero denominator
//! resolve to 0 and are listed in the report's `degenerate` field
//! instead of failing.

use crate::dataset::Dataset;
use crate::error::{OncoTreeError, Result};
use crate::tree::DecisionTree;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Aggregation policy for per-class precision/recall/F1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Averaging {
    /// Unweighted mean over classes
    Macro,
    /// Mean weighted by class support
    Weighted,
}

/// K x K count table indexed `[actual][predicted]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Self {
        let mut counts = vec![vec![0usize; n_classes]; n_classes];
        for (&actual, &predicted) in y_true.iter().zip(y_pred.iter()) {
            counts[actual][predicted] += 1;
        }
        Self { counts }
    }

    pub fn n_classes(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, actual: usize, predicted: usize) -> usize {
        self.counts[actual][predicted]
    }

    pub fn counts(&self) -> &[Vec<usize>] {
        &self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Correctly classified rows (diagonal sum).
    pub fn trace(&self) -> usize {
        (0..self.n_classes()).map(|c| self.counts[c][c]).sum()
    }

    /// Rows whose true class is `class` (the class support).
    pub fn actual_count(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    /// Rows predicted as `class`.
    pub fn predicted_count(&self, class: usize) -> usize {
        self.counts.iter().map(|row| row[class]).sum()
    }
}

/// Precision/recall/F1 for a single class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Binary-only diagnostic rates, class 1 positive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalMetrics {
    pub sensitivity: f64,
    pub specificity: f64,
    pub ppv: f64,
    pub npv: f64,
}

/// ROC curve as (false-positive-rate, true-positive-rate) points,
/// ordered by non-decreasing FPR, with the trapezoidal AUC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub points: Vec<(f64, f64)>,
    pub auc: f64,
}

/// Precision-recall curve as (recall, precision) points with the
/// rank-based average precision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrCurve {
    pub points: Vec<(f64, f64)>,
    pub average_precision: f64,
}

/// Full evaluation of a trained tree on a held-out test set
///
/// Immutable value object; the binary-only fields are `None` when the
/// problem has more than two classes or a class is absent from the
/// test set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub averaging: Averaging,
    pub per_class: Vec<ClassMetrics>,
    pub confusion: ConfusionMatrix,
    pub clinical: Option<ClinicalMetrics>,
    pub roc: Option<RocCurve>,
    pub pr: Option<PrCurve>,
    /// Positive-class probability per test row (binary case), so the
    /// rendering layer can build distribution charts without
    /// re-running prediction.
    pub positive_probabilities: Option<Vec<f64>>,
    /// Names of rate metrics whose denominator was zero and were
    /// resolved to 0.
    pub degenerate: Vec<String>,
}

/// Fraction of agreeing label pairs.
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Unweighted mean F1 over classes.
pub fn macro_f1(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> f64 {
    let cm = ConfusionMatrix::from_labels(y_true, y_pred, n_classes);
    let per_class = per_class_metrics(&cm, &mut Vec::new());
    per_class.iter().map(|m| m.f1).sum::<f64>() / n_classes as f64
}

fn safe_rate(num: usize, den: usize, name: &str, degenerate: &mut Vec<String>) -> f64 {
    if den == 0 {
        degenerate.push(name.to_string());
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn per_class_metrics(cm: &ConfusionMatrix, degenerate: &mut Vec<String>) -> Vec<ClassMetrics> {
    (0..cm.n_classes())
        .map(|c| {
            let tp = cm.count(c, c);
            let support = cm.actual_count(c);
            let predicted = cm.predicted_count(c);
            let precision = safe_rate(tp, predicted, &format!("precision[class {c}]"), degenerate);
            let recall = safe_rate(tp, support, &format!("recall[class {c}]"), degenerate);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect()
}

fn aggregate(per_class: &[ClassMetrics], averaging: Averaging, total: usize) -> (f64, f64, f64) {
    match averaging {
        Averaging::Macro => {
            let k = per_class.len() as f64;
            (
                per_class.iter().map(|m| m.precision).sum::<f64>() / k,
                per_class.iter().map(|m| m.recall).sum::<f64>() / k,
                per_class.iter().map(|m| m.f1).sum::<f64>() / k,
            )
        }
        Averaging::Weighted => {
            let n = total as f64;
            let weighted = |f: fn(&ClassMetrics) -> f64| {
                per_class
                    .iter()
                    .map(|m| f(m) * m.support as f64)
                    .sum::<f64>()
                    / n
            };
            (
                weighted(|m| m.precision),
                weighted(|m| m.recall),
                weighted(|m| m.f1),
            )
        }
    }
}

fn clinical_metrics(cm: &ConfusionMatrix, degenerate: &mut Vec<String>) -> ClinicalMetrics {
    let tp = cm.count(1, 1);
    let tn = cm.count(0, 0);
    let fp = cm.count(0, 1);
    let fn_ = cm.count(1, 0);
    ClinicalMetrics {
        sensitivity: safe_rate(tp, tp + fn_, "sensitivity", degenerate),
        specificity: safe_rate(tn, tn + fp, "specificity", degenerate),
        ppv: safe_rate(tp, tp + fp, "ppv", degenerate),
        npv: safe_rate(tn, tn + fn_, "npv", degenerate),
    }
}

/// Row order for threshold sweeps: descending score, stable by index.
fn rank_order(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    order
}

/// ROC curve over all distinct positive-class probabilities, swept in
/// descending order. Returns `None` when either class is absent.
pub fn roc_curve(y_true: &[usize], scores: &[f64]) -> Option<RocCurve> {
    let pos_total = y_true.iter().filter(|&&y| y == 1).count();
    let neg_total = y_true.len() - pos_total;
    if pos_total == 0 || neg_total == 0 {
        return None;
    }

    let order = rank_order(scores);
    let mut points = vec![(0.0, 0.0)];
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        while i < order.len() && scores[order[i]] == threshold {
            if y_true[order[i]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        points.push((fp as f64 / neg_total as f64, tp as f64 / pos_total as f64));
    }

    let auc = points
        .windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) / 2.0)
        .sum();
    Some(RocCurve { points, auc })
}

/// Precision-recall curve over all distinct positive-class
/// probabilities; average precision is the step-weighted sum of
/// precision at each recall increase. Returns `None` when no positive
/// rows exist.
pub fn pr_curve(y_true: &[usize], scores: &[f64]) -> Option<PrCurve> {
    let pos_total = y_true.iter().filter(|&&y| y == 1).count();
    if pos_total == 0 {
        return None;
    }

    let order = rank_order(scores);
    let mut points = Vec::new();
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut prev_recall = 0.0;
    let mut average_precision = 0.0;
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        while i < order.len() && scores[order[i]] == threshold {
            if y_true[order[i]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        let recall = tp as f64 / pos_total as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        points.push((recall, precision));
        average_precision += (recall - prev_recall) * precision;
        prev_recall = recall;
    }

    Some(PrCurve {
        points,
        average_precision,
    })
}

/// Evaluate a trained tree on a held-out test set.
pub fn evaluate(
    tree: &DecisionTree,
    test: &Dataset,
    averaging: Averaging,
) -> Result<EvaluationReport> {
    if test.n_rows() == 0 {
        return Err(OncoTreeError::invalid_parameter(
            "test_set",
            0,
            "test set must not be empty",
        ));
    }

    let y_true = test.labels();
    let y_pred = tree.predict(test.features())?;
    let n_classes = test.n_classes();

    let cm = ConfusionMatrix::from_labels(y_true, &y_pred, n_classes);
    let mut degenerate = Vec::new();
    let per_class = per_class_metrics(&cm, &mut degenerate);
    let (precision, recall, f1) = aggregate(&per_class, averaging, cm.total());

    let (clinical, roc, pr, positive_probabilities) = if n_classes == 2 {
        let probs = tree.predict_proba(test.features())?;
        let scores: Vec<f64> = probs.column(1).to_vec();
        let roc = roc_curve(y_true, &scores);
        if roc.is_none() {
            degenerate.push("roc_auc".to_string());
        }
        let pr = pr_curve(y_true, &scores);
        if pr.is_none() {
            degenerate.push("average_precision".to_string());
        }
        let clinical = clinical_metrics(&cm, &mut degenerate);
        (Some(clinical), roc, pr, Some(scores))
    } else {
        (None, None, None, None)
    };

    Ok(EvaluationReport {
        accuracy: cm.trace() as f64 / cm.total() as f64,
        precision,
        recall,
        f1,
        averaging,
        per_class,
        confusion: cm,
        clinical,
        roc,
        pr,
        positive_probabilities,
        degenerate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::tree::TreeConfig;
    use ndarray::Array2;

    fn step_dataset() -> Dataset {
        let features = Array2::from_shape_fn((10, 1), |(i, _)| (i + 1) as f64);
        Dataset::new(features, vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1], 2).unwrap()
    }

    #[test]
    fn test_confusion_matrix_row_sums_match_supports() {
        let y_true = vec![0, 0, 1, 1, 1, 0];
        let y_pred = vec![0, 1, 1, 0, 1, 0];
        let cm = ConfusionMatrix::from_labels(&y_true, &y_pred, 2);

        assert_eq!(cm.actual_count(0), 3);
        assert_eq!(cm.actual_count(1), 3);
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.trace(), 4);
    }

    #[test]
    fn test_accuracy_equals_trace_over_total() {
        let y_true = vec![0, 0, 1, 1, 1, 0];
        let y_pred = vec![0, 1, 1, 0, 1, 0];
        let cm = ConfusionMatrix::from_labels(&y_true, &y_pred, 2);
        let acc = accuracy(&y_true, &y_pred);
        assert!((acc - cm.trace() as f64 / cm.total() as f64).abs() < 1e-12);
    }

    #[test]
    fn test_macro_vs_weighted_on_imbalanced_data() {
        // Class 0: 4 rows, all correct. Class 1: 2 rows, one correct.
        let y_true = vec![0, 0, 0, 0, 1, 1];
        let y_pred = vec![0, 0, 0, 0, 1, 0];
        let cm = ConfusionMatrix::from_labels(&y_true, &y_pred, 2);
        let per_class = per_class_metrics(&cm, &mut Vec::new());

        let (macro_p, macro_r, _) = aggregate(&per_class, Averaging::Macro, cm.total());
        let (w_p, w_r, _) = aggregate(&per_class, Averaging::Weighted, cm.total());

        // recall: class 0 = 1.0, class 1 = 0.5
        assert!((macro_r - 0.75).abs() < 1e-12);
        assert!((w_r - (4.0 * 1.0 + 2.0 * 0.5) / 6.0).abs() < 1e-12);
        // precision: class 0 = 4/5, class 1 = 1.0
        assert!((macro_p - 0.9).abs() < 1e-12);
        assert!((w_p - (4.0 * 0.8 + 2.0 * 1.0) / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_denominator_is_flagged_not_fatal() {
        // Class 1 never predicted: its precision denominator is 0.
        let y_true = vec![0, 0, 1, 1];
        let y_pred = vec![0, 0, 0, 0];
        let cm = ConfusionMatrix::from_labels(&y_true, &y_pred, 2);
        let mut degenerate = Vec::new();
        let per_class = per_class_metrics(&cm, &mut degenerate);

        assert_eq!(per_class[1].precision, 0.0);
        assert_eq!(per_class[1].f1, 0.0);
        assert!(degenerate.contains(&"precision[class 1]".to_string()));
    }

    #[test]
    fn test_perfect_separator_has_auc_one() {
        let y_true = vec![0, 0, 0, 1, 1];
        let scores = vec![0.0, 0.0, 0.0, 1.0, 1.0];
        let roc = roc_curve(&y_true, &scores).unwrap();
        assert!((roc.auc - 1.0).abs() < 1e-12);
        assert_eq!(roc.points.first(), Some(&(0.0, 0.0)));
        assert_eq!(roc.points.last(), Some(&(1.0, 1.0)));
    }

    #[test]
    fn test_random_scores_have_auc_half() {
        // Every row shares one score: a single threshold step from
        // (0,0) to (1,1), trapezoid area 0.5.
        let y_true = vec![0, 1, 0, 1];
        let scores = vec![0.5, 0.5, 0.5, 0.5];
        let roc = roc_curve(&y_true, &scores).unwrap();
        assert!((roc.auc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_roc_none_when_one_class_absent() {
        assert!(roc_curve(&[0, 0, 0], &[0.1, 0.2, 0.3]).is_none());
        assert!(roc_curve(&[1, 1], &[0.9, 0.8]).is_none());
    }

    #[test]
    fn test_perfect_separator_average_precision_one() {
        let y_true = vec![0, 0, 1, 1];
        let scores = vec![0.1, 0.2, 0.9, 0.8];
        let pr = pr_curve(&y_true, &scores).unwrap();
        assert!((pr.average_precision - 1.0).abs() < 1e-12);
        // Recall reaches 1.0 with precision still 1.0 before any
        // negative row enters.
        assert!(pr.points.contains(&(1.0, 1.0)));
    }

    #[test]
    fn test_evaluate_report_on_step_data() {
        let ds = step_dataset();
        let config = TreeConfig::default().with_max_depth(1);
        let tree = crate::tree::DecisionTree::fit(&ds, &config).unwrap();
        let report = evaluate(&tree, &ds, Averaging::Weighted).unwrap();

        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.f1, 1.0);
        let clinical = report.clinical.unwrap();
        assert_eq!(clinical.sensitivity, 1.0);
        assert_eq!(clinical.specificity, 1.0);
        assert_eq!(clinical.ppv, 1.0);
        assert_eq!(clinical.npv, 1.0);
        assert!((report.roc.unwrap().auc - 1.0).abs() < 1e-12);
        assert!((report.pr.unwrap().average_precision - 1.0).abs() < 1e-12);
        assert_eq!(report.positive_probabilities.unwrap().len(), 10);
        assert!(report.degenerate.is_empty());

        // Row sums of the confusion matrix equal the true class counts.
        assert_eq!(report.confusion.actual_count(0), 5);
        assert_eq!(report.confusion.actual_count(1), 5);
    }

    #[test]
    fn test_depth_one_tree_is_perfect_on_held_out_split() {
        let ds = step_dataset();
        let config = TreeConfig::default().with_max_depth(1);
        let tree = crate::tree::DecisionTree::fit(&ds, &config).unwrap();
        let split = crate::split::train_test_split(&ds, 0.6, 42).unwrap();
        let report = evaluate(&tree, &split.test, Averaging::Macro).unwrap();
        assert_eq!(report.accuracy, 1.0);
    }

    #[test]
    fn test_evaluate_rejects_empty_test_set() {
        let ds = step_dataset();
        let tree = crate::tree::DecisionTree::fit(&ds, &TreeConfig::default()).unwrap();
        let empty = ds.subset(&[]);
        assert!(matches!(
            evaluate(&tree, &empty, Averaging::Macro).unwrap_err(),
            OncoTreeError::InvalidParameter { .. }
        ));
    }

    #[test]
    fn test_report_serializes() {
        let ds = step_dataset();
        let tree = crate::tree::DecisionTree::fit(&ds, &TreeConfig::default()).unwrap();
        let report = evaluate(&tree, &ds, Averaging::Macro).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"accuracy\":1.0"));
    }
}
