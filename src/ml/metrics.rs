//! Evaluation metrics for classification models.

use serde::{Deserialize, Serialize};

/// Confusion matrix for a `K`-class classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes.
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty `KxK` confusion matrix.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    pub fn from_predictions(truth: &[usize], predicted: &[usize], n_classes: usize) -> Self {
        let mut cm = Self::new(n_classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            cm.add(t, p);
        }
        cm
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }
}

/// Precision/recall statistics for a single class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f32,
    /// `TP / (TP + FN)`.
    pub recall: f32,
    /// Total number of true examples for the class.
    pub support: u32,
}

/// Compute per-class precision and recall from a confusion matrix.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes;
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = cm.get(class_idx, class_idx) as f32;
        let mut fp = 0f32;
        let mut fn_ = 0f32;
        let mut support = 0u32;
        for j in 0..k {
            let v = cm.get(class_idx, j);
            support = support.saturating_add(v);
            if j != class_idx {
                fn_ += v as f32;
            }
        }
        for i in 0..k {
            if i != class_idx {
                fp += cm.get(i, class_idx) as f32;
            }
        }
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        stats.push(PerClassStats {
            precision,
            recall,
            support,
        });
    }
    stats
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f32 {
    let total = cm.total();
    if total == 0 {
        return 0.0;
    }
    let correct: u64 = (0..cm.n_classes).map(|i| cm.get(i, i) as u64).sum();
    (correct as f32) / (total as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_and_per_class_stats() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 1, 1], &[0, 1, 1, 1], 2);
        assert_eq!(cm.total(), 4);
        assert!((accuracy(&cm) - 0.75).abs() < 1e-6);
        let stats = precision_recall_by_class(&cm);
        assert!((stats[0].precision - 1.0).abs() < 1e-6);
        assert!((stats[0].recall - 0.5).abs() < 1e-6);
        assert_eq!(stats[1].support, 2);
    }

    #[test]
    fn out_of_range_entries_are_ignored() {
        let mut cm = ConfusionMatrix::new(2);
        cm.add(5, 0);
        assert_eq!(cm.total(), 0);
        assert_eq!(accuracy(&cm), 0.0);
    }
}
