//! Feature preprocessing fitted on the training split and replayed unchanged
//! on test rows and live predictions.

mod normalize;
mod pca;

pub use normalize::{FittedNormalizer, Normalization};
pub use pca::{FittedPca, PcaSettings};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreprocessError {
    #[error("Cannot fit preprocessing on an empty sample table")]
    Empty,
    #[error("PCA needs at least two samples, got {rows}")]
    NotEnoughSamples { rows: usize },
    #[error("Retained variance must be in (0, 1], got {0}")]
    InvalidRetainedVariance(f64),
    #[error("Preprocessor expects {expected} features but received {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },
    #[error("PCA failed: {0}")]
    Pca(String),
}

/// What to fit: a normalization and an optional PCA projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PreprocessSettings {
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pca: Option<PcaSettings>,
}

impl PreprocessSettings {
    pub fn does_something(&self) -> bool {
        self.normalization != Normalization::None || self.pca.is_some()
    }

    /// Fit on training rows only.
    pub fn fit(&self, train: &Array2<f32>) -> Result<FittedPreprocessor, PreprocessError> {
        if train.nrows() == 0 {
            return Err(PreprocessError::Empty);
        }
        let normalizer = FittedNormalizer::fit(self.normalization, train);
        let pca = match &self.pca {
            Some(settings) => {
                let normalized = match &normalizer {
                    Some(normalizer) => normalizer.apply(train),
                    None => train.clone(),
                };
                Some(FittedPca::fit(settings, &normalized)?)
            }
            None => None,
        };
        Ok(FittedPreprocessor {
            input_len: train.ncols(),
            normalizer,
            pca,
        })
    }
}

/// Immutable fitted transform; `apply` never changes its state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    input_len: usize,
    normalizer: Option<FittedNormalizer>,
    pca: Option<FittedPca>,
}

impl FittedPreprocessor {
    pub fn does_something(&self) -> bool {
        self.normalizer.is_some() || self.pca.is_some()
    }

    pub fn input_len(&self) -> usize {
        self.input_len
    }

    pub fn output_len(&self) -> usize {
        self.pca
            .as_ref()
            .map_or(self.input_len, FittedPca::components)
    }

    pub fn pca(&self) -> Option<&FittedPca> {
        self.pca.as_ref()
    }

    pub fn apply(&self, x: &Array2<f32>) -> Result<Array2<f32>, PreprocessError> {
        if x.ncols() != self.input_len {
            return Err(PreprocessError::FeatureCountMismatch {
                expected: self.input_len,
                actual: x.ncols(),
            });
        }
        let normalized = match &self.normalizer {
            Some(normalizer) => normalizer.apply(x),
            None => x.clone(),
        };
        Ok(match &self.pca {
            Some(pca) => pca.apply(&normalized),
            None => normalized,
        })
    }

    /// Names of the output features given the input feature names.
    pub fn output_names(&self, input: &[String]) -> Vec<String> {
        match &self.pca {
            Some(pca) => (1..=pca.components()).map(|i| format!("PC{i}")).collect(),
            None => input.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn default_settings_do_nothing() {
        let settings = PreprocessSettings::default();
        assert!(!settings.does_something());
        let fitted = settings.fit(&array![[1.0f32, 2.0]]).unwrap();
        assert!(!fitted.does_something());
        assert_eq!(fitted.apply(&array![[3.0f32, 4.0]]).unwrap(), array![[3.0f32, 4.0]]);
    }

    #[test]
    fn apply_is_repeatable_and_checks_width() {
        let train = array![[0.0f32, 10.0], [2.0, 30.0], [4.0, 20.0]];
        let fitted = PreprocessSettings {
            normalization: Normalization::MeanStd,
            pca: None,
        }
        .fit(&train)
        .unwrap();
        let first = fitted.apply(&train).unwrap();
        let second = fitted.apply(&train).unwrap();
        assert_eq!(first, second);
        assert!(matches!(
            fitted.apply(&array![[1.0f32]]),
            Err(PreprocessError::FeatureCountMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn pca_renames_outputs() {
        let train = Array2::from_shape_fn((12, 3), |(r, c)| ((r * (c + 1)) % 7) as f32);
        let fitted = PreprocessSettings {
            normalization: Normalization::None,
            pca: Some(PcaSettings {
                retained_variance: 1.0,
                normalize_output: false,
            }),
        }
        .fit(&train)
        .unwrap();
        let names = fitted.output_names(&["a".into(), "b".into(), "c".into()]);
        assert_eq!(names.len(), fitted.output_len());
        assert_eq!(names[0], "PC1");
    }

    #[test]
    fn constant_features_never_project_to_nothing() {
        let train = Array2::from_elem((20, 3), 4.0f32);
        let settings = PreprocessSettings {
            normalization: Normalization::MeanStd,
            pca: Some(PcaSettings::default()),
        };
        match settings.fit(&train) {
            Ok(fitted) => {
                assert!(fitted.output_len() >= 1);
                assert_eq!(fitted.apply(&train).unwrap().ncols(), fitted.output_len());
            }
            Err(err) => assert!(matches!(err, PreprocessError::Pca(_)), "{err}"),
        }
    }

    #[test]
    fn empty_train_is_rejected() {
        let empty = Array2::<f32>::zeros((0, 2));
        assert_eq!(
            PreprocessSettings::default().fit(&empty),
            Err(PreprocessError::Empty)
        );
    }
}
