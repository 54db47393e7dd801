use linfa::DatasetBase;
use linfa::traits::{Fit, Predict};
use linfa_reduction::Pca;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::PreprocessError;

/// Principal component projection options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PcaSettings {
    /// Fraction of variance to keep, in `(0, 1]`.
    pub retained_variance: f64,
    /// Scale every projected component to unit variance on the training rows.
    pub normalize_output: bool,
}

impl Default for PcaSettings {
    fn default() -> Self {
        Self {
            retained_variance: 0.99,
            normalize_output: false,
        }
    }
}

/// PCA captured as an affine map `x * weights + bias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPca {
    /// Shape `(input features, components)`.
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
    /// Explained variance ratio of each retained component.
    pub explained_variance_ratio: Vec<f64>,
}

impl FittedPca {
    pub fn fit(settings: &PcaSettings, x: &Array2<f32>) -> Result<Self, PreprocessError> {
        let v = settings.retained_variance;
        if !(v > 0.0 && v <= 1.0) {
            return Err(PreprocessError::InvalidRetainedVariance(v));
        }
        let (n, d) = x.dim();
        if n < 2 || d == 0 {
            return Err(PreprocessError::NotEnoughSamples { rows: n });
        }
        let records = x.mapv(f64::from);
        let full_rank = n.min(d);
        let full = fit_pca(&records, full_rank)?;
        let ratios = full.explained_variance_ratio();
        let k = components_for_variance(ratios.as_slice().unwrap_or(&[]), v).clamp(1, full_rank);
        let pca = if k == full_rank {
            full
        } else {
            fit_pca(&records, k)?
        };
        let explained_variance_ratio = ratios.iter().take(k).copied().collect();

        let (weights, bias) = affine_from(&pca, d)?;
        let mut fitted = Self {
            weights: weights.mapv(|w| w as f32),
            bias: bias.mapv(|b| b as f32),
            explained_variance_ratio,
        };
        if settings.normalize_output {
            let projected = fitted.apply(x);
            let std = projected.std_axis(Axis(0), 0.0);
            for (j, s) in std.iter().enumerate() {
                let s = if s.is_finite() && *s > 0.0 { *s } else { 1.0 };
                fitted.weights.column_mut(j).mapv_inplace(|w| w / s);
                fitted.bias[j] /= s;
            }
        }
        Ok(fitted)
    }

    pub fn components(&self) -> usize {
        self.weights.ncols()
    }

    pub fn input_len(&self) -> usize {
        self.weights.nrows()
    }

    pub fn apply(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weights) + &self.bias
    }
}

fn fit_pca(records: &Array2<f64>, components: usize) -> Result<Pca<f64>, PreprocessError> {
    let dataset = DatasetBase::from(records.clone());
    Pca::params(components)
        .fit(&dataset)
        .map_err(|err| PreprocessError::Pca(err.to_string()))
}

/// Project the origin and the unit vectors to recover the fitted weights and
/// bias.
fn affine_from(pca: &Pca<f64>, d: usize) -> Result<(Array2<f64>, Array1<f64>), PreprocessError> {
    let mut basis = Array2::<f64>::zeros((d + 1, d));
    for i in 0..d {
        basis[[i + 1, i]] = 1.0;
    }
    let projected: Array2<f64> = pca.predict(&basis);
    if projected.nrows() != d + 1 {
        return Err(PreprocessError::Pca(format!(
            "projection returned {} rows for {} basis rows",
            projected.nrows(),
            d + 1
        )));
    }
    if projected.ncols() == 0 {
        return Err(PreprocessError::Pca("projection kept no components".to_string()));
    }
    let bias = projected.row(0).to_owned();
    let weights = &projected.slice(ndarray::s![1.., ..]) - &bias;
    if weights.iter().chain(bias.iter()).any(|v| !v.is_finite()) {
        return Err(PreprocessError::Pca("projection is not finite".to_string()));
    }
    Ok((weights, bias))
}

/// Smallest component count whose cumulative ratio reaches `retained`.
pub(crate) fn components_for_variance(ratios: &[f64], retained: f64) -> usize {
    if ratios.iter().any(|r| !r.is_finite()) || ratios.is_empty() {
        return 1;
    }
    let mut cumulative = 0.0;
    for (idx, ratio) in ratios.iter().enumerate() {
        cumulative += ratio;
        if cumulative + 1e-9 >= retained {
            return idx + 1;
        }
    }
    ratios.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_smallest_count_reaching_threshold() {
        assert_eq!(components_for_variance(&[0.7, 0.2, 0.1], 0.5), 1);
        assert_eq!(components_for_variance(&[0.7, 0.2, 0.1], 0.9), 2);
        assert_eq!(components_for_variance(&[0.7, 0.2, 0.1], 1.0), 3);
        assert_eq!(components_for_variance(&[f64::NAN, 0.5], 0.9), 1);
    }

    #[test]
    fn collinear_features_collapse_to_one_component() {
        let x = Array2::from_shape_fn((20, 2), |(r, c)| (r as f32) * (c as f32 + 1.0));
        let settings = PcaSettings {
            retained_variance: 0.95,
            normalize_output: true,
        };
        let pca = FittedPca::fit(&settings, &x).unwrap();
        assert_eq!(pca.components(), 1);
        assert_eq!(pca.input_len(), 2);
        let projected = pca.apply(&x);
        let std = projected.std_axis(Axis(0), 0.0);
        assert!((std[0] - 1.0).abs() < 1e-3);
        let mean = projected.mean_axis(Axis(0)).unwrap();
        assert!(mean[0].abs() < 1e-3);
    }

    #[test]
    fn rejects_invalid_settings() {
        let x = Array2::<f32>::zeros((4, 2));
        let bad = PcaSettings {
            retained_variance: 0.0,
            normalize_output: false,
        };
        assert!(matches!(
            FittedPca::fit(&bad, &x),
            Err(PreprocessError::InvalidRetainedVariance(_))
        ));
        let one_row = Array2::<f32>::zeros((1, 2));
        assert!(matches!(
            FittedPca::fit(&PcaSettings::default(), &one_row),
            Err(PreprocessError::NotEnoughSamples { rows: 1 })
        ));
    }
}
