use std::cmp::Reverse;
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ml::metrics::{ConfusionMatrix, PerClassStats, accuracy, precision_recall_by_class};

/// Accuracy tagged with the rows it was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "evaluated_on", content = "value", rename_all = "snake_case")]
pub enum Accuracy {
    /// Measured on rows the model never saw.
    HeldOut(f32),
    /// No held-out rows existed; measured on the training rows themselves.
    TrainingSet(f32),
}

impl Accuracy {
    pub fn value(&self) -> f32 {
        match self {
            Accuracy::HeldOut(value) | Accuracy::TrainingSet(value) => *value,
        }
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accuracy::HeldOut(value) => write!(f, "HELD-OUT accuracy: {:.2}%", value * 100.0),
            Accuracy::TrainingSet(value) => {
                write!(f, "TRAINING SET accuracy: {:.2}%", value * 100.0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRank {
    pub index: usize,
    pub name: String,
    pub importance: f64,
}

/// Features ordered by descending importance; ties keep feature order.
pub fn rank_features(names: &[String], importance: &[f64]) -> Vec<FeatureRank> {
    let mut ranks: Vec<FeatureRank> = importance
        .iter()
        .enumerate()
        .map(|(index, &importance)| FeatureRank {
            index,
            name: names
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("Feature {}", index + 1)),
            importance,
        })
        .collect();
    ranks.sort_by_key(|rank| (Reverse(OrderedFloat(rank.importance)), rank.index));
    ranks
}

/// Outcome summary of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub classifier: String,
    pub class_names: Vec<String>,
    /// Training rows per class, in label order.
    pub class_counts: Vec<usize>,
    pub n_train: usize,
    pub n_test: usize,
    pub accuracy: Accuracy,
    pub confusion: ConfusionMatrix,
    /// Precision and recall per class, on the same rows as `accuracy`.
    #[serde(default)]
    pub per_class: Vec<PerClassStats>,
    pub feature_importance: Option<Vec<FeatureRank>>,
}

impl TrainingReport {
    pub fn new(
        classifier: String,
        class_names: Vec<String>,
        class_counts: Vec<usize>,
        n_train: usize,
        n_test: usize,
        confusion: ConfusionMatrix,
        feature_importance: Option<Vec<FeatureRank>>,
    ) -> Self {
        let value = accuracy(&confusion);
        let per_class = precision_recall_by_class(&confusion);
        let accuracy = if n_test > 0 {
            Accuracy::HeldOut(value)
        } else {
            Accuracy::TrainingSet(value)
        };
        Self {
            classifier,
            class_names,
            class_counts,
            n_train,
            n_test,
            accuracy,
            confusion,
            per_class,
            feature_importance,
        }
    }

    pub fn log(&self) {
        info!(
            "{} trained on {} samples ({} held out), {}",
            self.classifier, self.n_train, self.n_test, self.accuracy
        );
        for (index, (name, count)) in self.class_names.iter().zip(&self.class_counts).enumerate() {
            match self.per_class.get(index) {
                Some(stats) => info!(
                    "  {name}: {count} training samples, precision {:.2}, recall {:.2}",
                    stats.precision, stats.recall
                ),
                None => info!("  {name}: {count} training samples"),
            }
        }
        if let Some(ranks) = &self.feature_importance {
            info!("Feature importance:");
            for rank in ranks {
                info!("  {:.4}  {}", rank.importance, rank.name);
            }
        }
    }
}
