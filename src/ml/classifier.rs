use std::fmt;

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::gbdt_stump::{GbdtStumpModel, StumpOptions, train_gbdt_stump};
use super::knn::KnnModel;
use super::logreg::{LogRegModel, LogRegOptions, train_logreg};
use super::majority::MajorityModel;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Cannot train on an empty dataset")]
    EmptyDataset,
    #[error("Mismatched training data: {rows} rows but {labels} labels")]
    MismatchedLengths { rows: usize, labels: usize },
    #[error("Mismatched training data: {rows} rows but {weights} weights")]
    MismatchedWeights { rows: usize, weights: usize },
    #[error("Label {label} is outside the {classes} trained classes")]
    LabelOutOfRange { label: usize, classes: usize },
    #[error("Need at least {required} classes, found {found}")]
    TooFewClasses { required: usize, found: usize },
    #[error("Model expects {expected} features but received {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },
    #[error("Invalid model: {0}")]
    Invalid(String),
}

/// Borrowed training inputs shared by every model family.
#[derive(Debug, Clone, Copy)]
pub struct TrainingData<'a> {
    pub x: ArrayView2<'a, f32>,
    pub y: &'a [usize],
    /// One weight per row; `None` weighs every row equally.
    pub weights: Option<&'a [f32]>,
    pub n_classes: usize,
}

impl TrainingData<'_> {
    pub fn validate(&self) -> Result<(), ModelError> {
        let rows = self.x.nrows();
        if rows == 0 {
            return Err(ModelError::EmptyDataset);
        }
        if rows != self.y.len() {
            return Err(ModelError::MismatchedLengths {
                rows,
                labels: self.y.len(),
            });
        }
        if let Some(weights) = self.weights {
            if weights.len() != rows {
                return Err(ModelError::MismatchedWeights {
                    rows,
                    weights: weights.len(),
                });
            }
        }
        if let Some(&label) = self.y.iter().find(|&&label| label >= self.n_classes) {
            return Err(ModelError::LabelOutOfRange {
                label,
                classes: self.n_classes,
            });
        }
        Ok(())
    }

    pub fn weights_or_ones(&self) -> Vec<f32> {
        match self.weights {
            Some(weights) => weights.to_vec(),
            None => vec![1.0; self.x.nrows()],
        }
    }
}

/// Untrained classifier choice and its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Classifier {
    LogisticRegression(LogRegOptions),
    BoostedStumps(StumpOptions),
    NearestNeighbors { k: usize },
    Majority,
}

impl Classifier {
    /// Every built-in family with default settings.
    pub fn available() -> Vec<Classifier> {
        vec![
            Classifier::LogisticRegression(LogRegOptions::default()),
            Classifier::BoostedStumps(StumpOptions::default()),
            Classifier::NearestNeighbors { k: 5 },
            Classifier::Majority,
        ]
    }

    pub fn supports_probabilities(&self) -> bool {
        !matches!(self, Classifier::NearestNeighbors { .. })
    }

    pub fn train(&self, data: &TrainingData<'_>, seed: u64) -> Result<Model, ModelError> {
        Ok(match self {
            Classifier::LogisticRegression(options) => {
                Model::LogisticRegression(train_logreg(data, options, seed)?)
            }
            Classifier::BoostedStumps(options) => {
                Model::BoostedStumps(train_gbdt_stump(data, options)?)
            }
            Classifier::NearestNeighbors { k } => Model::NearestNeighbors(KnnModel::fit(data, *k)?),
            Classifier::Majority => Model::Majority(MajorityModel::fit(data)?),
        })
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier::BoostedStumps(StumpOptions::default())
    }
}

impl fmt::Display for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classifier::LogisticRegression(_) => f.write_str("Logistic regression"),
            Classifier::BoostedStumps(_) => f.write_str("Boosted stumps"),
            Classifier::NearestNeighbors { k } => write!(f, "{k}-nearest neighbours"),
            Classifier::Majority => f.write_str("Majority class"),
        }
    }
}

/// A trained classifier; callers only rely on these capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Model {
    LogisticRegression(LogRegModel),
    BoostedStumps(GbdtStumpModel),
    NearestNeighbors(KnnModel),
    Majority(MajorityModel),
}

impl Model {
    pub fn n_features(&self) -> usize {
        match self {
            Model::LogisticRegression(model) => model.n_features(),
            Model::BoostedStumps(model) => model.n_features,
            Model::NearestNeighbors(model) => model.n_features(),
            Model::Majority(model) => model.n_features,
        }
    }

    pub fn n_classes(&self) -> usize {
        match self {
            Model::LogisticRegression(model) => model.n_classes(),
            Model::BoostedStumps(model) => model.n_classes,
            Model::NearestNeighbors(model) => model.n_classes,
            Model::Majority(model) => model.priors.len(),
        }
    }

    pub fn supports_probabilities(&self) -> bool {
        !matches!(self, Model::NearestNeighbors(_))
    }

    pub fn predict_row(&self, features: ArrayView1<'_, f32>) -> usize {
        match self {
            Model::LogisticRegression(model) => model.predict_class_index(features),
            Model::BoostedStumps(model) => model.predict_class_index(&features.to_vec()),
            Model::NearestNeighbors(model) => model.predict_class_index(features),
            Model::Majority(model) => model.majority_class(),
        }
    }

    /// Class probabilities for one row, when the family provides them.
    pub fn predict_proba_row(&self, features: ArrayView1<'_, f32>) -> Option<Vec<f32>> {
        match self {
            Model::LogisticRegression(model) => Some(model.predict_proba(features)),
            Model::BoostedStumps(model) => Some(model.predict_proba(&features.to_vec())),
            Model::NearestNeighbors(_) => None,
            Model::Majority(model) => Some(model.priors.clone()),
        }
    }

    pub fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>, ModelError> {
        self.check_width(x)?;
        Ok(x.outer_iter().map(|row| self.predict_row(row)).collect())
    }

    /// Probability matrix of shape `(rows, classes)`, or `None` without support.
    pub fn predict_proba(&self, x: &Array2<f32>) -> Result<Option<Array2<f32>>, ModelError> {
        self.check_width(x)?;
        if !self.supports_probabilities() {
            return Ok(None);
        }
        let classes = self.n_classes();
        let mut out = Array2::<f32>::zeros((x.nrows(), classes));
        for (row, mut target) in x.outer_iter().zip(out.outer_iter_mut()) {
            if let Some(probs) = self.predict_proba_row(row) {
                for (slot, p) in target.iter_mut().zip(probs) {
                    *slot = p;
                }
            }
        }
        Ok(Some(out))
    }

    /// Per-feature importance, when the family can report it.
    pub fn feature_importance(&self) -> Option<Vec<f64>> {
        match self {
            Model::BoostedStumps(model) => Some(model.feature_importance()),
            _ => None,
        }
    }

    fn check_width(&self, x: &Array2<f32>) -> Result<(), ModelError> {
        if x.ncols() != self.n_features() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        Ok(())
    }
}
