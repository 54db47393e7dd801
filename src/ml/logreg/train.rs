use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use super::LogRegModel;
use crate::ml::gbdt_stump::softmax;
use crate::ml::{ModelError, TrainingData};

/// Training options for the logistic regression classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogRegOptions {
    pub epochs: usize,
    pub learning_rate: f32,
    pub l2: f32,
    pub batch_size: usize,
}

impl Default for LogRegOptions {
    fn default() -> Self {
        Self {
            epochs: 20,
            learning_rate: 0.1,
            l2: 1e-4,
            batch_size: 128,
        }
    }
}

/// Mini-batch gradient descent on the weighted softmax cross-entropy.
pub fn train_logreg(
    data: &TrainingData<'_>,
    options: &LogRegOptions,
    seed: u64,
) -> Result<LogRegModel, ModelError> {
    data.validate()?;
    let classes = data.n_classes;
    if classes == 0 {
        return Err(ModelError::TooFewClasses {
            required: 1,
            found: 0,
        });
    }
    let dim = data.x.ncols();
    let sample_weights = data.weights_or_ones();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut weights = Array2::<f32>::zeros((classes, dim));
    let mut bias = Array1::<f32>::zeros(classes);
    for w in weights.iter_mut() {
        *w = (rng.random::<f32>() - 0.5) * 0.01;
    }

    let mut indices: Vec<usize> = (0..data.x.nrows()).collect();
    let batch_size = options.batch_size.max(1);
    let lr = options.learning_rate;
    let l2 = options.l2.max(0.0);

    for _epoch in 0..options.epochs {
        indices.shuffle(&mut rng);
        for chunk in indices.chunks(batch_size) {
            let mut grad_w = Array2::<f32>::zeros((classes, dim));
            let mut grad_b = Array1::<f32>::zeros(classes);
            let mut batch_weight = 0.0f32;
            for &idx in chunk {
                let x = data.x.row(idx);
                let y = data.y[idx];
                let weight = sample_weights[idx];
                if weight == 0.0 {
                    continue;
                }
                let logits = weights.dot(&x) + &bias;
                let probs = softmax(logits.as_slice().unwrap_or(&[]));
                for c in 0..classes {
                    let diff = (probs[c] - if c == y { 1.0 } else { 0.0 }) * weight;
                    grad_w
                        .row_mut(c)
                        .zip_mut_with(&x, |g, &xi| *g += diff * xi);
                    grad_b[c] += diff;
                }
                batch_weight += weight;
            }
            if batch_weight == 0.0 {
                continue;
            }
            let inv = 1.0 / batch_weight;
            weights.zip_mut_with(&grad_w, |w, &g| *w -= lr * (g * inv + l2 * *w));
            bias.zip_mut_with(&grad_b, |b, &g| *b -= lr * g * inv);
        }
    }

    let model = LogRegModel { weights, bias };
    model.validate()?;
    Ok(model)
}
