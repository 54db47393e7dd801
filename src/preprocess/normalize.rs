use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature normalization applied before any projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    None,
    /// Zero mean and unit (population) standard deviation.
    MeanStd,
    /// Map the observed range onto `[0, 1]`.
    MinMax,
}

/// Fitted `(value - offset) / scale` per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedNormalizer {
    pub kind: Normalization,
    pub offset: Array1<f32>,
    pub scale: Array1<f32>,
}

impl FittedNormalizer {
    /// Fit on the rows of `x`; returns `None` when the normalization is a no-op.
    pub fn fit(kind: Normalization, x: &Array2<f32>) -> Option<Self> {
        let n_features = x.ncols();
        let (offset, scale) = match kind {
            Normalization::None => return None,
            Normalization::MeanStd => {
                let mean = x
                    .mean_axis(Axis(0))
                    .unwrap_or_else(|| Array1::zeros(n_features));
                let std = x.std_axis(Axis(0), 0.0);
                (mean, std)
            }
            Normalization::MinMax => {
                let min = x.fold_axis(Axis(0), f32::INFINITY, |acc, v| acc.min(*v));
                let max = x.fold_axis(Axis(0), f32::NEG_INFINITY, |acc, v| acc.max(*v));
                let range = &max - &min;
                (min, range)
            }
        };
        let offset = offset.mapv(|v| if v.is_finite() { v } else { 0.0 });
        // Constant features keep their spread instead of dividing by zero.
        let scale = scale.mapv(|v| if v.is_finite() && v > 0.0 { v } else { 1.0 });
        Some(Self {
            kind,
            offset,
            scale,
        })
    }

    pub fn apply(&self, x: &Array2<f32>) -> Array2<f32> {
        (x - &self.offset) / &self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn mean_std_centers_and_scales() {
        let x = array![[1.0f32, 5.0], [3.0, 5.0]];
        let fitted = FittedNormalizer::fit(Normalization::MeanStd, &x).unwrap();
        let out = fitted.apply(&x);
        assert_eq!(out, array![[-1.0f32, 0.0], [1.0, 0.0]]);
        assert_eq!(fitted.scale[1], 1.0);
    }

    #[test]
    fn min_max_maps_to_unit_range() {
        let x = array![[2.0f32], [4.0], [6.0]];
        let fitted = FittedNormalizer::fit(Normalization::MinMax, &x).unwrap();
        assert_eq!(fitted.apply(&x), array![[0.0f32], [0.5], [1.0]]);
    }

    #[test]
    fn none_fits_nothing() {
        assert!(FittedNormalizer::fit(Normalization::None, &array![[1.0f32]]).is_none());
    }
}
