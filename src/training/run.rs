use std::sync::Arc;

use tracing::{info, info_span};

use super::{ChannelType, TrainOptions, TrainedModel, TrainingError, TrainingPlan, train};
use crate::annotations::AnnotationHierarchy;
use crate::dataset::{Assembly, BoundaryStrategy, assemble};
use crate::error::ConfigurationError;
use crate::features::{FeatureCalculator, compose};
use crate::imaging::{Resolution, TileSource};
use crate::ml::Classifier;
use crate::preprocess::PreprocessSettings;
use crate::training::TrainingReport;

/// A full snapshot of the inputs for one training run.
#[derive(Clone)]
pub struct TrainingJob {
    pub hierarchy: Arc<dyn AnnotationHierarchy>,
    pub source: Option<Arc<dyn TileSource>>,
    pub calculator: Option<FeatureCalculator>,
    pub classifier: Option<Classifier>,
    pub resolution: Resolution,
    pub boundary: BoundaryStrategy,
    pub preprocessing: PreprocessSettings,
    pub output_type: ChannelType,
    pub options: TrainOptions,
}

#[derive(Debug, Clone)]
pub enum TrainingOutcome {
    Trained {
        model: Arc<TrainedModel>,
        report: TrainingReport,
    },
    /// No usable annotations; nothing was trained.
    NothingToTrain,
}

/// Compose features, assemble samples and train.
pub fn run_training(job: &TrainingJob) -> Result<TrainingOutcome, TrainingError> {
    let _span = info_span!(
        "training",
        classifier = job.classifier.as_ref().map(|c| c.to_string()),
        downsample = job.resolution.downsample,
        output = ?job.output_type,
    )
    .entered();
    let source = job.source.as_ref().ok_or(ConfigurationError::NoImage)?;
    let classifier = job
        .classifier
        .clone()
        .ok_or(ConfigurationError::NoClassifier)?;
    let operator = compose(job.calculator.as_ref(), &job.resolution)?;
    let table = match assemble(
        job.hierarchy.as_ref(),
        &operator,
        &job.boundary,
        source.as_ref(),
    )? {
        Assembly::Samples(table) => table,
        Assembly::NoSamples => {
            info!("No training samples available");
            return Ok(TrainingOutcome::NothingToTrain);
        }
    };
    let plan = TrainingPlan {
        classifier,
        preprocessing: job.preprocessing,
        output_type: job.output_type,
        options: job.options,
    };
    let (model, report) = train(&table, &operator, &plan)?;
    report.log();
    Ok(TrainingOutcome::Trained {
        model: Arc::new(model),
        report,
    })
}
