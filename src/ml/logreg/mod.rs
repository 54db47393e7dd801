//! Multinomial logistic regression over pixel feature vectors.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::ml::ModelError;
use crate::ml::gbdt_stump::{argmax, softmax};

mod train;
pub use train::{LogRegOptions, train_logreg};

/// Linear softmax classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRegModel {
    /// Shape `(classes, features)`.
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

impl LogRegModel {
    pub fn n_classes(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.weights.ncols()
    }

    /// Validate the model dimensions.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.n_classes() == 0 {
            return Err(ModelError::TooFewClasses {
                required: 1,
                found: 0,
            });
        }
        if self.bias.len() != self.n_classes() {
            return Err(ModelError::Invalid("bias length mismatch".to_string()));
        }
        if self.weights.iter().chain(self.bias.iter()).any(|v| !v.is_finite()) {
            return Err(ModelError::Invalid("weights must be finite".to_string()));
        }
        Ok(())
    }

    pub fn logits(&self, features: ArrayView1<'_, f32>) -> Vec<f32> {
        (self.weights.dot(&features) + &self.bias).to_vec()
    }

    /// Compute class probabilities for a single feature vector.
    pub fn predict_proba(&self, features: ArrayView1<'_, f32>) -> Vec<f32> {
        softmax(&self.logits(features))
    }

    /// Return the argmax class index for the given feature vector.
    pub fn predict_class_index(&self, features: ArrayView1<'_, f32>) -> usize {
        argmax(&self.logits(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn zero_model_is_uniform() {
        let model = LogRegModel {
            weights: Array2::zeros((3, 4)),
            bias: Array1::zeros(3),
        };
        model.validate().unwrap();
        let out = model.predict_proba(Array1::zeros(4).view());
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!((out[0] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_mismatched_bias() {
        let model = LogRegModel {
            weights: array![[1.0f32, 0.0]],
            bias: array![0.0f32, 0.0],
        };
        assert!(matches!(model.validate(), Err(ModelError::Invalid(_))));
    }
}
