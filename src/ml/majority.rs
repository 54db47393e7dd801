//! Baseline that always predicts the most frequent training class.

use serde::{Deserialize, Serialize};

use crate::ml::gbdt_stump::argmax;
use crate::ml::{ModelError, TrainingData};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MajorityModel {
    pub n_features: usize,
    /// Weighted class frequencies, summing to one.
    pub priors: Vec<f32>,
}

impl MajorityModel {
    pub fn fit(data: &TrainingData<'_>) -> Result<Self, ModelError> {
        data.validate()?;
        let weights = data.weights_or_ones();
        let mut totals = vec![0.0f32; data.n_classes];
        for (&label, &w) in data.y.iter().zip(&weights) {
            totals[label] += w;
        }
        let sum: f32 = totals.iter().sum();
        let priors = if sum > 0.0 {
            totals.into_iter().map(|t| t / sum).collect()
        } else {
            vec![1.0 / data.n_classes.max(1) as f32; data.n_classes]
        };
        Ok(Self {
            n_features: data.x.ncols(),
            priors,
        })
    }

    pub fn majority_class(&self) -> usize {
        argmax(&self.priors)
    }
}
