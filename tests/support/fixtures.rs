use std::sync::Arc;

use ndarray::Array3;
use pixclass::annotations::{Annotation, AnnotationSet, PathClass, Roi};
use pixclass::dataset::BoundaryStrategy;
use pixclass::features::{FeatureCalculator, FeatureOperator, compose};
use pixclass::imaging::{InMemoryImage, PixelCalibration, Resolution, TileSource};
use pixclass::ml::Classifier;
use pixclass::preprocess::PreprocessSettings;
use pixclass::training::{ChannelType, TrainOptions, TrainingJob};

pub const IMAGE_SIDE: usize = 64;

/// Dark left half, bright right half, with a little deterministic texture.
pub fn two_tone_image() -> InMemoryImage {
    let pixels = Array3::from_shape_fn((IMAGE_SIDE, IMAGE_SIDE, 1), |(r, c, _)| {
        let base = if c < IMAGE_SIDE / 2 { 0.2 } else { 0.8 };
        base + ((r * 7 + c * 13) % 10) as f32 / 100.0
    });
    InMemoryImage::from_array(pixels, vec!["Gray".into()], PixelCalibration::uncalibrated())
        .expect("fixture image")
}

pub fn two_tone_source() -> Arc<dyn TileSource> {
    Arc::new(two_tone_image())
}

pub fn rect(id: u64, x: f64, y: f64, width: f64, height: f64, class: &str) -> Annotation {
    Annotation::new(
        id,
        Roi::rectangle(x, y, width, height),
        Some(PathClass::new(class)),
    )
}

/// A 10x10 Tumor square on the bright side and a 20x10 Stroma block on the dark side.
pub fn tumor_and_stroma() -> AnnotationSet {
    AnnotationSet::new(vec![
        rect(1, 40.0, 4.0, 10.0, 10.0, "Tumor"),
        rect(2, 4.0, 4.0, 20.0, 10.0, "Stroma"),
    ])
}

/// 250 + 250 labeled pixels when no band is applied.
pub fn five_hundred_samples() -> AnnotationSet {
    AnnotationSet::new(vec![
        rect(1, 36.0, 2.0, 25.0, 10.0, "Tumor"),
        rect(2, 2.0, 2.0, 25.0, 10.0, "Stroma"),
    ])
}

pub fn full_resolution() -> Resolution {
    Resolution::full(&PixelCalibration::uncalibrated())
}

pub fn base_operator() -> FeatureOperator {
    compose(Some(&FeatureCalculator::default_multiscale()), &full_resolution())
        .expect("default operator")
}

pub fn job(
    annotations: AnnotationSet,
    classifier: Classifier,
    boundary: BoundaryStrategy,
    options: TrainOptions,
) -> TrainingJob {
    TrainingJob {
        hierarchy: Arc::new(annotations),
        source: Some(two_tone_source()),
        calculator: Some(FeatureCalculator::default_multiscale()),
        classifier: Some(classifier),
        resolution: full_resolution(),
        boundary,
        preprocessing: PreprocessSettings::default(),
        output_type: ChannelType::Classification,
        options,
    }
}
