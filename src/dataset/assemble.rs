use std::collections::BTreeSet;

use ndarray::Array2;
use thiserror::Error;
use tracing::debug;

use super::{BandLabel, BoundaryStrategy, LabelMap, SampleTable};
use crate::annotations::{Annotation, AnnotationHierarchy, PathClass};
use crate::error::ConsistencyError;
use crate::features::{FeatureError, FeatureOperator};
use crate::imaging::{RegionRequest, TileSource};

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

/// Result of walking the annotations.
#[derive(Debug, Clone, PartialEq)]
pub enum Assembly {
    Samples(SampleTable),
    /// No annotation produced a usable pixel.
    NoSamples,
}

/// Turn labeled annotations into one feature row per retained pixel.
///
/// Pixels are taken on the operator's resolution grid; a pixel belongs to an
/// annotation when its center lies inside the ROI.
pub fn assemble(
    hierarchy: &dyn AnnotationHierarchy,
    operator: &FeatureOperator,
    strategy: &BoundaryStrategy,
    source: &dyn TileSource,
) -> Result<Assembly, AssembleError> {
    let feature_names = operator.channel_names(&source.channel_names());
    let n_features = feature_names.len();
    let mut values: Vec<f32> = Vec::new();
    let mut classes: Vec<PathClass> = Vec::new();

    for annotation in hierarchy.annotations() {
        let Some(class) = annotation.training_class() else {
            continue;
        };
        let Some(request) = grid_request(&annotation, operator.resolution().downsample) else {
            continue;
        };
        let pixels = labeled_pixels(&annotation, class, &request, strategy);
        if pixels.is_empty() {
            continue;
        }
        let features = operator.compute_region(source, &request)?;
        let (rows, cols, channels) = features.dim();
        if channels != n_features {
            return Err(ConsistencyError::FeatureNameMismatch {
                columns: channels,
                names: n_features,
            }
            .into());
        }
        for (row, col, label) in pixels {
            if row >= rows || col >= cols {
                continue;
            }
            values.extend(features.slice(ndarray::s![row, col, ..]).iter());
            classes.push(label);
        }
    }

    if classes.is_empty() {
        debug!("No training samples found in annotations");
        return Ok(Assembly::NoSamples);
    }
    let label_map = LabelMap::from_classes(classes.iter().cloned().collect::<BTreeSet<_>>());
    let labels = classes
        .iter()
        .map(|class| label_map.index_of(class).unwrap_or_default())
        .collect::<Vec<_>>();
    let features = Array2::from_shape_vec((labels.len(), n_features), values).map_err(|_| {
        ConsistencyError::RowCountMismatch {
            rows: 0,
            labels: labels.len(),
        }
    })?;
    let table = SampleTable::new(features, labels, label_map, feature_names)?;
    debug!(
        "Assembled {} samples across {} classes",
        table.len(),
        table.label_map().len()
    );
    Ok(Assembly::Samples(table))
}

/// Request covering the annotation's bounds, snapped to the resolution grid.
fn grid_request(annotation: &Annotation, downsample: f64) -> Option<RegionRequest> {
    if annotation.roi.is_empty() {
        return None;
    }
    let bounds = annotation.roi.bounds();
    let col0 = (bounds.x / downsample).floor() as i64;
    let row0 = (bounds.y / downsample).floor() as i64;
    let col1 = (bounds.max_x() / downsample).ceil() as i64;
    let row1 = (bounds.max_y() / downsample).ceil() as i64;
    let request = RegionRequest::from_grid(
        downsample,
        col0,
        row0,
        (col1 - col0).max(0) as usize,
        (row1 - row0).max(0) as usize,
        annotation.z,
        annotation.t,
    );
    (!request.is_empty()).then_some(request)
}

fn labeled_pixels(
    annotation: &Annotation,
    class: &PathClass,
    request: &RegionRequest,
    strategy: &BoundaryStrategy,
) -> Vec<(usize, usize, PathClass)> {
    let band_label = strategy.band_label();
    let mut pixels = Vec::new();
    for row in 0..request.output_height() {
        for col in 0..request.output_width() {
            let (x, y) = request.pixel_center(col, row);
            if !annotation.roi.contains(x, y) {
                continue;
            }
            let distance = annotation.roi.boundary_distance(x, y) / request.downsample;
            if !strategy.in_band(distance) {
                pixels.push((row, col, class.clone()));
                continue;
            }
            if let BandLabel::Relabel(boundary) = &band_label {
                pixels.push((row, col, boundary.clone()));
            }
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{AnnotationSet, Roi};
    use crate::features::{FeatureCalculator, compose};
    use crate::imaging::{InMemoryImage, PixelCalibration, Resolution};
    use ndarray::Array3;

    fn image() -> InMemoryImage {
        let pixels = Array3::from_shape_fn((32, 32, 1), |(r, c, _)| (r * 32 + c) as f32 / 1024.0);
        InMemoryImage::from_array(pixels, vec!["Gray".into()], PixelCalibration::uncalibrated())
            .unwrap()
    }

    fn operator() -> FeatureOperator {
        compose(
            Some(&FeatureCalculator::default()),
            &Resolution::full(&PixelCalibration::uncalibrated()),
        )
        .unwrap()
    }

    fn single(class: &str) -> AnnotationSet {
        AnnotationSet::new(vec![Annotation::new(
            1,
            Roi::rectangle(4.0, 4.0, 6.0, 6.0),
            Some(class.into()),
        )])
    }

    fn table(assembly: Assembly) -> SampleTable {
        match assembly {
            Assembly::Samples(table) => table,
            Assembly::NoSamples => panic!("expected samples"),
        }
    }

    #[test]
    fn skip_drops_band_pixels() {
        let strategy = BoundaryStrategy::Skip { thickness: 1.0 };
        let samples = table(assemble(&single("Tumor"), &operator(), &strategy, &image()).unwrap());
        // 6x6 rectangle minus a one pixel ring.
        assert_eq!(samples.len(), 16);
        assert_eq!(samples.label_map().names(), vec!["Tumor"]);
    }

    #[test]
    fn derived_thickness_adds_boundary_class() {
        let strategy = BoundaryStrategy::DerivedThickness { thickness: 1.0 };
        let samples = table(assemble(&single("Tumor"), &operator(), &strategy, &image()).unwrap());
        assert_eq!(samples.len(), 36);
        assert_eq!(samples.label_map().names(), vec!["Boundary*", "Tumor"]);
        assert_eq!(samples.class_counts(), vec![20, 16]);
    }

    #[test]
    fn ignored_and_unclassified_annotations_yield_no_samples() {
        let hierarchy = AnnotationSet::new(vec![
            Annotation::new(1, Roi::rectangle(0.0, 0.0, 8.0, 8.0), Some("Ignore*".into())),
            Annotation::new(2, Roi::rectangle(8.0, 8.0, 8.0, 8.0), None),
        ]);
        let assembly =
            assemble(&hierarchy, &operator(), &BoundaryStrategy::default(), &image()).unwrap();
        assert_eq!(assembly, Assembly::NoSamples);
    }

    #[test]
    fn downsampled_grid_counts_pixels_at_resolution() {
        let resolution = Resolution::defaults(&PixelCalibration::uncalibrated())[1].clone();
        let operator = compose(Some(&FeatureCalculator::default()), &resolution).unwrap();
        let hierarchy = AnnotationSet::new(vec![Annotation::new(
            1,
            Roi::rectangle(0.0, 0.0, 8.0, 8.0),
            Some("Stroma".into()),
        )]);
        let strategy = BoundaryStrategy::Skip { thickness: 0.0 };
        let samples = table(assemble(&hierarchy, &operator, &strategy, &image()).unwrap());
        assert_eq!(samples.len(), 16);
        assert_eq!(samples.n_features(), 6);
    }
}
