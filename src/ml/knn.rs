//! Brute-force k-nearest-neighbour classifier.
//!
//! Produces hard labels only; it does not report class probabilities.

use ndarray::{Array2, ArrayView1};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::ml::{ModelError, TrainingData};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnModel {
    pub k: usize,
    pub n_classes: usize,
    pub samples: Array2<f32>,
    pub labels: Vec<usize>,
    pub weights: Vec<f32>,
}

impl KnnModel {
    pub fn fit(data: &TrainingData<'_>, k: usize) -> Result<Self, ModelError> {
        data.validate()?;
        Ok(Self {
            k: k.max(1),
            n_classes: data.n_classes,
            samples: data.x.to_owned(),
            labels: data.y.to_vec(),
            weights: data.weights_or_ones(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.samples.ncols()
    }

    /// Weighted vote among the `k` nearest samples; ties go to the lower index.
    pub fn predict_class_index(&self, features: ArrayView1<'_, f32>) -> usize {
        let mut distances: Vec<(OrderedFloat<f32>, usize)> = self
            .samples
            .outer_iter()
            .enumerate()
            .map(|(idx, row)| {
                let d: f32 = row
                    .iter()
                    .zip(features.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (OrderedFloat(d), idx)
            })
            .collect();
        let k = self.k.min(distances.len());
        if k == 0 {
            return 0;
        }
        distances.select_nth_unstable(k - 1);
        let mut votes = vec![0.0f32; self.n_classes.max(1)];
        for &(_, idx) in &distances[..k] {
            if let Some(slot) = votes.get_mut(self.labels[idx]) {
                *slot += self.weights[idx];
            }
        }
        crate::ml::gbdt_stump::argmax(&votes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn votes_among_nearest_samples() {
        let x = array![[0.0f32], [0.1], [0.2], [5.0], [5.1]];
        let y = vec![0, 0, 0, 1, 1];
        let data = TrainingData {
            x: x.view(),
            y: &y,
            weights: None,
            n_classes: 2,
        };
        let model = KnnModel::fit(&data, 3).unwrap();
        assert_eq!(model.predict_class_index(array![0.05f32].view()), 0);
        assert_eq!(model.predict_class_index(array![4.9f32].view()), 1);
    }

    #[test]
    fn weights_shift_the_vote() {
        let x = array![[0.0f32], [1.0]];
        let y = vec![0, 1];
        let weights = vec![1.0, 3.0];
        let data = TrainingData {
            x: x.view(),
            y: &y,
            weights: Some(&weights),
            n_classes: 2,
        };
        let model = KnnModel::fit(&data, 2).unwrap();
        assert_eq!(model.predict_class_index(array![0.0f32].view()), 1);
    }
}
