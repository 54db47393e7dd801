use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use super::model::{GbdtStumpModel, Stump, softmax};
use crate::ml::{ModelError, TrainingData};

/// Training hyperparameters for stump boosting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StumpOptions {
    /// Number of boosting rounds.
    pub rounds: usize,
    /// Learning rate applied per round.
    pub learning_rate: f32,
    /// Number of bins used for split search.
    pub bins: usize,
}

impl Default for StumpOptions {
    fn default() -> Self {
        Self {
            rounds: 50,
            learning_rate: 0.1,
            bins: 32,
        }
    }
}

/// Train a multi-class stump-GBDT model using softmax gradient boosting.
pub fn train_gbdt_stump(
    data: &TrainingData<'_>,
    options: &StumpOptions,
) -> Result<GbdtStumpModel, ModelError> {
    data.validate()?;
    let n_classes = data.n_classes;
    if n_classes < 2 {
        return Err(ModelError::TooFewClasses {
            required: 2,
            found: n_classes,
        });
    }

    let x = data.x;
    let (n, d) = x.dim();
    if d == 0 {
        return Err(ModelError::Invalid(
            "stump boosting needs at least one feature".to_string(),
        ));
    }
    let weights = data.weights_or_ones();
    let bins = options.bins.clamp(2, 256);
    let (mins, maxs) = compute_feature_min_max(x);
    let binned = bin_features(x, &mins, &maxs, bins);

    let priors = class_priors(data.y, &weights, n_classes);
    let init_raw: Vec<f32> = priors.iter().map(|&p| (p.max(1e-6)).ln()).collect();
    let mut raw = vec![init_raw.clone(); n];

    let mut rounds_out: Vec<Vec<Stump>> = Vec::with_capacity(options.rounds);
    for _round in 0..options.rounds {
        let probs: Vec<Vec<f32>> = raw.iter().map(|r| softmax(r)).collect();
        let residuals = compute_residuals(data.y, &probs, n_classes);

        let mut stumps_for_round = Vec::with_capacity(n_classes);
        for class_residuals in residuals.iter() {
            let stump = fit_best_stump(
                &binned,
                x,
                &mins,
                &maxs,
                bins,
                class_residuals,
                &weights,
            );
            stumps_for_round.push(stump);
        }
        for (i, row) in x.outer_iter().enumerate() {
            let features = row.to_vec();
            for (class_idx, stump) in stumps_for_round.iter().enumerate() {
                raw[i][class_idx] += options.learning_rate * stump.predict(&features);
            }
        }
        rounds_out.push(stumps_for_round);
    }

    let model = GbdtStumpModel {
        n_features: d,
        n_classes,
        learning_rate: options.learning_rate,
        init_raw,
        stumps: rounds_out,
    };
    model.validate()?;
    Ok(model)
}

fn class_priors(y: &[usize], weights: &[f32], n_classes: usize) -> Vec<f32> {
    let mut totals = vec![0.0f32; n_classes];
    for (&label, &w) in y.iter().zip(weights) {
        if label < n_classes {
            totals[label] += w;
        }
    }
    let sum: f32 = totals.iter().sum();
    let sum = if sum > 0.0 { sum } else { 1.0 };
    totals.into_iter().map(|t| t / sum).collect()
}

fn compute_residuals(y: &[usize], probs: &[Vec<f32>], n_classes: usize) -> Vec<Vec<f32>> {
    let n = y.len();
    let mut residuals = vec![vec![0.0f32; n]; n_classes];
    for i in 0..n {
        let yi = y[i];
        for k in 0..n_classes {
            let target = if yi == k { 1.0 } else { 0.0 };
            residuals[k][i] = target - probs[i][k];
        }
    }
    residuals
}

fn compute_feature_min_max(x: ArrayView2<'_, f32>) -> (Vec<f32>, Vec<f32>) {
    let d = x.ncols();
    let mut mins = vec![f32::INFINITY; d];
    let mut maxs = vec![f32::NEG_INFINITY; d];
    for row in x.outer_iter() {
        for (j, &v) in row.iter().enumerate() {
            if v.is_finite() {
                mins[j] = mins[j].min(v);
                maxs[j] = maxs[j].max(v);
            }
        }
    }
    for j in 0..d {
        if !mins[j].is_finite() || !maxs[j].is_finite() {
            mins[j] = 0.0;
            maxs[j] = 0.0;
        }
        if mins[j] == maxs[j] {
            maxs[j] = mins[j] + 1.0;
        }
    }
    (mins, maxs)
}

/// Column-major bin indices: `binned[feature][row]`.
fn bin_features(x: ArrayView2<'_, f32>, mins: &[f32], maxs: &[f32], bins: usize) -> Vec<Vec<u8>> {
    let scale = (bins - 1) as f32;
    x.columns()
        .into_iter()
        .enumerate()
        .map(|(j, column)| {
            let (min, max) = (mins[j], maxs[j]);
            column
                .iter()
                .map(|&v| {
                    let t = if max > min && v.is_finite() {
                        ((v - min) / (max - min)).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    (t * scale).round() as u8
                })
                .collect()
        })
        .collect()
}

fn fit_best_stump(
    binned: &[Vec<u8>],
    x: ArrayView2<'_, f32>,
    mins: &[f32],
    maxs: &[f32],
    bins: usize,
    residuals: &[f32],
    weights: &[f32],
) -> Stump {
    let mut best = BestSplit::default();
    for (feature_idx, column) in binned.iter().enumerate() {
        let split = best_split_for_feature(column, residuals, weights, feature_idx, bins);
        if split.score < best.score {
            best = split;
        }
    }

    let feature_idx = best.feature_index;
    let threshold = threshold_for_bin(mins[feature_idx], maxs[feature_idx], best.split_bin, bins);
    let (left_value, right_value) =
        leaf_means_for_threshold(x, residuals, weights, feature_idx, threshold);
    Stump {
        feature_index: feature_idx,
        threshold,
        left_value,
        right_value,
        gain: if best.score.is_finite() {
            (best.total_sse - best.score).max(0.0)
        } else {
            0.0
        },
    }
}

#[derive(Debug, Clone)]
struct BestSplit {
    score: f64,
    total_sse: f64,
    feature_index: usize,
    split_bin: usize,
}

impl Default for BestSplit {
    fn default() -> Self {
        Self {
            score: f64::INFINITY,
            total_sse: 0.0,
            feature_index: 0,
            split_bin: 0,
        }
    }
}

fn best_split_for_feature(
    column: &[u8],
    residuals: &[f32],
    weights: &[f32],
    feature_idx: usize,
    bins: usize,
) -> BestSplit {
    let mut counts = vec![0f64; bins];
    let mut sums = vec![0f64; bins];
    let mut sums_sq = vec![0f64; bins];
    for (i, &b) in column.iter().enumerate() {
        let b = b as usize;
        let w = weights[i] as f64;
        let r = residuals[i] as f64;
        counts[b] += w;
        sums[b] += w * r;
        sums_sq[b] += w * r * r;
    }
    let total_count: f64 = counts.iter().sum();
    if total_count <= 0.0 {
        return BestSplit::default();
    }
    let total_sum: f64 = sums.iter().sum();
    let total_sum_sq: f64 = sums_sq.iter().sum();
    let total_sse = total_sum_sq - (total_sum * total_sum) / total_count;

    let mut best_score = f64::INFINITY;
    let mut best_bin = 0usize;

    let mut left_count = 0f64;
    let mut left_sum = 0f64;
    let mut left_sum_sq = 0f64;

    for split_bin in 0..(bins - 1) {
        left_count += counts[split_bin];
        left_sum += sums[split_bin];
        left_sum_sq += sums_sq[split_bin];
        let right_count = total_count - left_count;
        if left_count <= 0.0 || right_count <= 0.0 {
            continue;
        }
        let right_sum = total_sum - left_sum;
        let right_sum_sq = total_sum_sq - left_sum_sq;
        let left_sse = left_sum_sq - (left_sum * left_sum) / left_count;
        let right_sse = right_sum_sq - (right_sum * right_sum) / right_count;
        let score = left_sse + right_sse;
        if score < best_score {
            best_score = score;
            best_bin = split_bin;
        }
    }

    BestSplit {
        score: best_score,
        total_sse,
        feature_index: feature_idx,
        split_bin: best_bin,
    }
}

fn threshold_for_bin(min: f32, max: f32, split_bin: usize, bins: usize) -> f32 {
    // Bin b covers values rounding to b, so the boundary sits halfway to b + 1.
    let t = (split_bin as f32 + 0.5) / (bins - 1) as f32;
    min + t * (max - min)
}

fn leaf_means_for_threshold(
    x: ArrayView2<'_, f32>,
    residuals: &[f32],
    weights: &[f32],
    feature_idx: usize,
    threshold: f32,
) -> (f32, f32) {
    let mut left_sum = 0.0f32;
    let mut left_weight = 0.0f32;
    let mut right_sum = 0.0f32;
    let mut right_weight = 0.0f32;
    for (i, &v) in x.column(feature_idx).iter().enumerate() {
        let w = weights[i];
        if v <= threshold {
            left_sum += w * residuals[i];
            left_weight += w;
        } else {
            right_sum += w * residuals[i];
            right_weight += w;
        }
    }
    let left_mean = if left_weight == 0.0 {
        0.0
    } else {
        left_sum / left_weight
    };
    let right_mean = if right_weight == 0.0 {
        0.0
    } else {
        right_sum / right_weight
    };
    (left_mean, right_mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn separates_classes_on_informative_feature() {
        let x = Array2::from_shape_fn((40, 2), |(r, c)| {
            if c == 0 {
                if r < 20 { r as f32 * 0.01 } else { 1.0 + r as f32 * 0.01 }
            } else {
                ((r * 7) % 5) as f32
            }
        });
        let y: Vec<usize> = (0..40).map(|r| usize::from(r >= 20)).collect();
        let data = TrainingData {
            x: x.view(),
            y: &y,
            weights: None,
            n_classes: 2,
        };
        let model = train_gbdt_stump(&data, &StumpOptions::default()).unwrap();
        assert_eq!(model.predict_class_index(&[0.05, 1.0]), 0);
        assert_eq!(model.predict_class_index(&[1.3, 1.0]), 1);
        let importance = model.feature_importance();
        assert!(importance[0] > importance[1]);
    }

    #[test]
    fn requires_two_classes() {
        let x = Array2::<f32>::zeros((3, 1));
        let y = vec![0, 0, 0];
        let data = TrainingData {
            x: x.view(),
            y: &y,
            weights: None,
            n_classes: 1,
        };
        assert!(matches!(
            train_gbdt_stump(&data, &StumpOptions::default()),
            Err(ModelError::TooFewClasses { required: 2, found: 1 })
        ));
    }

    #[test]
    fn rejects_rows_without_features() {
        let x = Array2::<f32>::zeros((4, 0));
        let y = vec![0, 1, 0, 1];
        let data = TrainingData {
            x: x.view(),
            y: &y,
            weights: None,
            n_classes: 2,
        };
        assert!(matches!(
            train_gbdt_stump(&data, &StumpOptions::default()),
            Err(ModelError::Invalid(_))
        ));
    }
}
