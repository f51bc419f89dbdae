//! Multi-class metrics for classifier training.
//!
//! Builds a confusion matrix from predicted and ground-truth label indices and
//! derives accuracy, per-label precision/recall/F1, and macro-averaged F1.

use serde::Serialize;
use std::fmt;

/// Precision, recall and F1 for a single label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Ground-truth samples carrying this label.
    pub support: usize,
}

/// Metrics computed from a confusion matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    /// Unweighted mean F1 over labels with support.
    pub macro_f1: f64,
    pub per_label: Vec<LabelMetrics>,
    /// `confusion[actual][predicted]`.
    pub confusion: Vec<Vec<usize>>,
    pub total: usize,
}

/// Compute classification metrics from predicted and ground-truth label
/// indices. Indices outside `label_names` are ignored.
pub fn compute_classification_metrics(
    predictions: &[usize],
    labels: &[usize],
    label_names: &[String],
) -> ClassificationMetrics {
    assert_eq!(
        predictions.len(),
        labels.len(),
        "predictions and labels must have same length"
    );

    let k = label_names.len();
    let mut confusion = vec![vec![0usize; k]; k];
    let mut total = 0usize;
    let mut correct = 0usize;

    for (&pred, &label) in predictions.iter().zip(labels.iter()) {
        if pred >= k || label >= k {
            continue;
        }
        confusion[label][pred] += 1;
        total += 1;
        if pred == label {
            correct += 1;
        }
    }

    let accuracy = if total > 0 {
        correct as f64 / total as f64
    } else {
        0.0
    };

    let per_label: Vec<LabelMetrics> = label_names
        .iter()
        .enumerate()
        .map(|(c, name)| {
            let tp = confusion[c][c];
            let predicted: usize = confusion.iter().map(|row| row[c]).sum();
            let support: usize = confusion[c].iter().sum();

            let precision = if predicted > 0 {
                tp as f64 / predicted as f64
            } else {
                0.0
            };
            let recall = if support > 0 {
                tp as f64 / support as f64
            } else {
                0.0
            };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            LabelMetrics {
                label: name.clone(),
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect();

    let supported: Vec<f64> = per_label
        .iter()
        .filter(|m| m.support > 0)
        .map(|m| m.f1)
        .collect();
    let macro_f1 = if supported.is_empty() {
        0.0
    } else {
        supported.iter().sum::<f64>() / supported.len() as f64
    };

    ClassificationMetrics {
        accuracy,
        macro_f1,
        per_label,
        confusion,
        total,
    }
}

impl fmt::Display for ClassificationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "acc={:.4} macro_f1={:.4} n={}",
            self.accuracy, self.macro_f1, self.total
        )?;
        for m in &self.per_label {
            write!(
                f,
                "\n  {:<32} P={:.4} R={:.4} F1={:.4} support={}",
                m.label, m.precision, m.recall, m.f1, m.support
            )?;
        }
        Ok(())
    }
}
