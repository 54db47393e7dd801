use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::report::{TrainingReport, rank_features};
use super::split::split_indices;
use super::weights::sample_weights;
use super::{ChannelType, ClassifierMetadata, TrainedModel, TrainingError};
use crate::dataset::SampleTable;
use crate::error::ConsistencyError;
use crate::features::{FeatureOp, FeatureOperator};
use crate::ml::metrics::ConfusionMatrix;
use crate::ml::{Classifier, TrainingData};
use crate::preprocess::PreprocessSettings;

pub const DEFAULT_MAX_SAMPLES: usize = 100_000;
pub const DEFAULT_RNG_SEED: u64 = 100;

/// Sampling options for a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainOptions {
    /// Cap on training rows; 0 disables the cap.
    pub max_samples: usize,
    pub rng_seed: u64,
    /// Weight rows so every class contributes equally.
    pub reweight_samples: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            max_samples: DEFAULT_MAX_SAMPLES,
            rng_seed: DEFAULT_RNG_SEED,
            reweight_samples: false,
        }
    }
}

/// Everything, apart from samples, that decides how a model is trained.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingPlan {
    pub classifier: Classifier,
    pub preprocessing: PreprocessSettings,
    pub output_type: ChannelType,
    pub options: TrainOptions,
}

/// Split, preprocess, fit and evaluate.
///
/// `operator` is the base feature chain that produced `table`; the returned
/// model carries it with the fitted preprocessing appended.
pub fn train(
    table: &SampleTable,
    operator: &FeatureOperator,
    plan: &TrainingPlan,
) -> Result<(TrainedModel, TrainingReport), TrainingError> {
    let label_map = table.label_map();
    let n_classes = label_map.len();
    let options = &plan.options;

    let split = split_indices(table.len(), options.max_samples, options.rng_seed);
    let train_rows = table.select_rows(&split.train);
    let test_rows = table.select_rows(&split.test);
    debug!(
        "Split {} samples into {} train / {} held out",
        table.len(),
        train_rows.len(),
        test_rows.len()
    );

    let preprocessor = plan.preprocessing.fit(train_rows.features())?;
    let train_x = preprocessor.apply(train_rows.features())?;
    let feature_names = preprocessor.output_names(table.feature_names());

    let weights = options
        .reweight_samples
        .then(|| sample_weights(train_rows.labels(), n_classes));
    let data = TrainingData {
        x: train_x.view(),
        y: train_rows.labels(),
        weights: weights.as_deref(),
        n_classes,
    };
    let model = plan.classifier.train(&data, options.rng_seed)?;
    if model.n_classes() != n_classes {
        return Err(ConsistencyError::ClassCountMismatch {
            label_map: n_classes,
            model: model.n_classes(),
        }
        .into());
    }

    let (eval_x, eval_y) = if split.has_held_out() {
        (preprocessor.apply(test_rows.features())?, test_rows.labels())
    } else {
        (train_x, train_rows.labels())
    };
    let predicted = model.predict(&eval_x)?;
    let confusion = ConfusionMatrix::from_predictions(eval_y, &predicted, n_classes);

    let feature_importance = model
        .feature_importance()
        .map(|importance| rank_features(&feature_names, &importance));

    let report = TrainingReport::new(
        plan.classifier.to_string(),
        label_map.names(),
        train_rows.class_counts(),
        train_rows.len(),
        test_rows.len(),
        confusion,
        feature_importance,
    );

    let operator = if preprocessor.does_something() {
        operator.append(FeatureOp::Preprocess(preprocessor))
    } else {
        operator.clone()
    };
    let channel_type = plan.output_type.resolve(model.supports_probabilities());
    if channel_type != plan.output_type {
        info!("{} does not support probabilities, using classification output", plan.classifier);
    }
    let metadata =
        ClassifierMetadata::from_label_map(operator.resolution().clone(), channel_type, label_map);
    let trained = TrainedModel {
        classifier_name: plan.classifier.to_string(),
        model,
        operator,
        metadata,
        label_map: label_map.clone(),
    };
    Ok((trained, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::PathClass;
    use crate::dataset::LabelMap;
    use crate::imaging::{PixelCalibration, Resolution};
    use crate::preprocess::Normalization;
    use ndarray::Array2;

    fn table(n: usize) -> SampleTable {
        let features = Array2::from_shape_fn((n, 2), |(r, c)| (r % 2) as f32 * 3.0 + c as f32);
        let labels = (0..n).map(|r| r % 2).collect();
        let map = LabelMap::from_classes([PathClass::from("Stroma"), PathClass::from("Tumor")]);
        SampleTable::new(features, labels, map, vec!["f1".into(), "f2".into()]).unwrap()
    }

    fn plan(classifier: Classifier) -> TrainingPlan {
        TrainingPlan {
            classifier,
            preprocessing: PreprocessSettings::default(),
            output_type: ChannelType::Probability,
            options: TrainOptions::default(),
        }
    }

    fn operator() -> FeatureOperator {
        FeatureOperator::new(Resolution::full(&PixelCalibration::uncalibrated()))
    }

    #[test]
    fn trains_on_everything_without_a_cap() {
        let (model, report) = train(&table(20), &operator(), &plan(Classifier::default())).unwrap();
        assert_eq!(report.n_train, 20);
        assert_eq!(report.n_test, 0);
        assert!(matches!(report.accuracy, crate::training::Accuracy::TrainingSet(_)));
        assert_eq!(report.class_counts, vec![10, 10]);
        assert!(report.feature_importance.is_some());
        assert_eq!(model.metadata.channel_type, ChannelType::Probability);
        assert_eq!(model.operator, operator());
    }

    #[test]
    fn knn_output_is_forced_to_classification() {
        let (model, report) = train(
            &table(10),
            &operator(),
            &plan(Classifier::NearestNeighbors { k: 1 }),
        )
        .unwrap();
        assert_eq!(model.metadata.channel_type, ChannelType::Classification);
        assert!(report.feature_importance.is_none());
    }

    #[test]
    fn preprocessing_is_appended_to_the_operator() {
        let mut plan = plan(Classifier::Majority);
        plan.preprocessing.normalization = Normalization::MeanStd;
        plan.options.max_samples = 6;
        let (model, report) = train(&table(10), &operator(), &plan).unwrap();
        assert_eq!(model.operator.ops().len(), 1);
        assert_ne!(model.operator, operator());
        assert_eq!(report.n_train, 6);
        assert_eq!(report.n_test, 4);
    }
}
