//! Baseline classifier families and evaluation metrics.
//!
//! Each family is a variant of [`Model`]; the rest of the crate only uses the
//! shared capabilities (predict, optional probabilities, optional importance).

mod classifier;
pub mod gbdt_stump;
pub mod knn;
pub mod logreg;
pub mod majority;
pub mod metrics;

pub use classifier::{Classifier, Model, ModelError, TrainingData};
