use serde::{Deserialize, Serialize};

use crate::ml::ModelError;

/// Single-node decision tree used as a weak learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    /// Feature index used for the split.
    pub feature_index: usize,
    /// Threshold in feature units.
    pub threshold: f32,
    /// Prediction for `feature <= threshold`.
    pub left_value: f32,
    /// Prediction for `feature > threshold`.
    pub right_value: f32,
    /// Weighted squared-error reduction achieved by the split.
    #[serde(default)]
    pub gain: f64,
}

impl Stump {
    /// Predict the stump value for a feature vector.
    pub fn predict(&self, features: &[f32]) -> f32 {
        let value = features.get(self.feature_index).copied().unwrap_or(0.0);
        if value <= self.threshold {
            self.left_value
        } else {
            self.right_value
        }
    }
}

/// Gradient-boosted decision stump model for multi-class classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtStumpModel {
    /// Number of `f32` values per feature vector.
    pub n_features: usize,
    pub n_classes: usize,
    /// Learning rate applied to each stump prediction.
    pub learning_rate: f32,
    /// Initial raw logits before boosting rounds.
    pub init_raw: Vec<f32>,
    /// Shape: `[n_rounds][n_classes]`.
    pub stumps: Vec<Vec<Stump>>,
}

impl GbdtStumpModel {
    /// Validate structural invariants of the model.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.n_classes < 2 {
            return Err(ModelError::TooFewClasses {
                required: 2,
                found: self.n_classes,
            });
        }
        if self.init_raw.len() != self.n_classes {
            return Err(ModelError::Invalid(
                "init_raw length must match class count".to_string(),
            ));
        }
        for (round_idx, round) in self.stumps.iter().enumerate() {
            if round.len() != self.n_classes {
                return Err(ModelError::Invalid(format!(
                    "Round {round_idx} has {} stumps but expected {}",
                    round.len(),
                    self.n_classes
                )));
            }
            if let Some(stump) = round.iter().find(|s| s.feature_index >= self.n_features) {
                return Err(ModelError::Invalid(format!(
                    "Stump splits on feature {} of {}",
                    stump.feature_index, self.n_features
                )));
            }
        }
        Ok(())
    }

    /// Predict raw logits for a feature vector.
    pub fn predict_raw(&self, features: &[f32]) -> Vec<f32> {
        let mut raw = self.init_raw.clone();
        for round in &self.stumps {
            for (class_idx, stump) in round.iter().enumerate() {
                raw[class_idx] += self.learning_rate * stump.predict(features);
            }
        }
        raw
    }

    /// Predict class probabilities for a feature vector.
    pub fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        softmax(&self.predict_raw(features))
    }

    /// Predict the best class index for a feature vector.
    pub fn predict_class_index(&self, features: &[f32]) -> usize {
        argmax(&self.predict_raw(features))
    }

    /// Total split gain per feature, normalized to sum to one.
    pub fn feature_importance(&self) -> Vec<f64> {
        let mut gains = vec![0.0f64; self.n_features];
        for stump in self.stumps.iter().flatten() {
            if let Some(slot) = gains.get_mut(stump.feature_index) {
                *slot += stump.gain.max(0.0);
            }
        }
        let total: f64 = gains.iter().sum();
        if total > 0.0 {
            for gain in &mut gains {
                *gain /= total;
            }
        }
        gains
    }
}

/// Compute a numerically-stable softmax for a set of logits.
pub fn softmax(raw: &[f32]) -> Vec<f32> {
    if raw.is_empty() {
        return Vec::new();
    }
    let max = raw
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, |a, b| a.max(b));
    let mut exps = Vec::with_capacity(raw.len());
    let mut sum = 0.0f32;
    for &v in raw {
        let e = (v - max).exp();
        exps.push(e);
        sum += e;
    }
    if sum == 0.0 || !sum.is_finite() {
        return vec![1.0 / raw.len() as f32; raw.len()];
    }
    for v in &mut exps {
        *v /= sum;
    }
    exps
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f32]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = idx;
        }
    }
    best_idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(feature_index: usize, left_value: f32, right_value: f32, gain: f64) -> Stump {
        Stump {
            feature_index,
            threshold: 0.0,
            left_value,
            right_value,
            gain,
        }
    }

    #[test]
    fn stump_predict_branches() {
        let stump = Stump {
            threshold: 0.5,
            ..stump(0, -1.0, 2.0, 0.0)
        };
        assert_eq!(stump.predict(&[0.0]), -1.0);
        assert_eq!(stump.predict(&[0.5]), -1.0);
        assert_eq!(stump.predict(&[0.6]), 2.0);
    }

    #[test]
    fn model_predicts_argmax_and_ranks_features() {
        let model = GbdtStumpModel {
            n_features: 2,
            n_classes: 2,
            learning_rate: 1.0,
            init_raw: vec![0.0, 0.0],
            stumps: vec![vec![stump(0, 1.0, -1.0, 3.0), stump(1, -1.0, 1.0, 1.0)]],
        };
        model.validate().unwrap();
        assert_eq!(model.predict_class_index(&[0.0, 0.0]), 0);
        assert_eq!(model.predict_class_index(&[1.0, 1.0]), 1);
        assert_eq!(model.feature_importance(), vec![0.75, 0.25]);
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert_eq!(argmax(&probs), 2);
    }
}
