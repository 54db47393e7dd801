//! Train/test splitting, reweighting, model fitting and reporting.

mod model;
mod report;
mod run;
mod split;
mod trainer;
mod weights;

pub use model::{ChannelType, ClassifierMetadata, DEFAULT_INPUT_SIZE, OutputChannel, TrainedModel};
pub use report::{Accuracy, FeatureRank, TrainingReport, rank_features};
pub use run::{TrainingJob, TrainingOutcome, run_training};
pub use split::{Split, split_indices};
pub use trainer::{
    DEFAULT_MAX_SAMPLES, DEFAULT_RNG_SEED, TrainOptions, TrainingPlan, train,
};
pub use weights::{class_weights, sample_weights};

use thiserror::Error;

use crate::dataset::AssembleError;
use crate::error::{ConfigurationError, ConsistencyError};
use crate::features::FeatureError;
use crate::imaging::TileSourceError;
use crate::ml::ModelError;
use crate::preprocess::PreprocessError;

/// Why a training run was aborted. The previously installed model stays active.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Source(#[from] TileSourceError),
    #[error("Feature computation failed: {0}")]
    Feature(String),
    #[error("Training aborted by a panic: {0}")]
    Panicked(String),
}

impl From<FeatureError> for TrainingError {
    fn from(error: FeatureError) -> Self {
        match error {
            FeatureError::Source(source) => TrainingError::Source(source),
            FeatureError::Preprocess(err) => TrainingError::Preprocess(err),
            other => TrainingError::Feature(other.to_string()),
        }
    }
}

impl From<AssembleError> for TrainingError {
    fn from(error: AssembleError) -> Self {
        match error {
            AssembleError::Feature(err) => err.into(),
            AssembleError::Consistency(err) => TrainingError::Consistency(err),
        }
    }
}
