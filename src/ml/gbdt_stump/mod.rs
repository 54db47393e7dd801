//! Deterministic gradient-boosted decision-stump classifier.
//!
//! A lightweight baseline that still supports:
//! - Multi-class classification via softmax boosting.
//! - Per-sample weights.
//! - Split-gain based feature importance.

mod model;
mod train;

pub use model::{GbdtStumpModel, Stump, argmax, softmax};
pub use train::{StumpOptions, train_gbdt_stump};
