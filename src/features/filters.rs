//! Separable smoothing and derivative filters over single image planes.
//!
//! Edges are handled by clamping to the nearest pixel; callers that need exact
//! values near a tile border request a padded region and crop afterwards.

use std::fmt;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Filters available in a multi-scale filter bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Gaussian,
    GradientMagnitude,
    LaplacianOfGaussian,
}

impl FilterKind {
    pub const ALL: [FilterKind; 3] = [
        FilterKind::Gaussian,
        FilterKind::GradientMagnitude,
        FilterKind::LaplacianOfGaussian,
    ];

    /// Extra halo, beyond the smoothing radius, needed by the filter.
    pub fn derivative_padding(self) -> usize {
        match self {
            FilterKind::Gaussian => 0,
            FilterKind::GradientMagnitude | FilterKind::LaplacianOfGaussian => 1,
        }
    }

    /// Apply the filter to an already smoothed plane.
    pub fn apply_smoothed(self, smoothed: &Array2<f32>) -> Array2<f32> {
        match self {
            FilterKind::Gaussian => smoothed.clone(),
            FilterKind::GradientMagnitude => gradient_magnitude(smoothed),
            FilterKind::LaplacianOfGaussian => laplacian(smoothed),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FilterKind::Gaussian => "Gaussian",
            FilterKind::GradientMagnitude => "Gradient magnitude",
            FilterKind::LaplacianOfGaussian => "Laplacian of Gaussian",
        };
        f.write_str(label)
    }
}

pub fn kernel_radius(sigma: f64) -> usize {
    if sigma <= 0.0 {
        return 0;
    }
    (3.0 * sigma).ceil() as usize
}

/// Normalized 1-D Gaussian kernel of length `2 * radius + 1`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    let radius = kernel_radius(sigma) as i64;
    if radius == 0 {
        return vec![1.0];
    }
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / denom).exp() as f32)
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

pub fn gaussian(plane: ArrayView2<f32>, sigma: f64) -> Array2<f32> {
    let kernel = gaussian_kernel(sigma);
    if kernel.len() == 1 {
        return plane.to_owned();
    }
    let horizontal = convolve(plane, &kernel, Axis2::Cols);
    convolve(horizontal.view(), &kernel, Axis2::Rows)
}

pub fn gradient_magnitude(plane: &Array2<f32>) -> Array2<f32> {
    let (rows, cols) = plane.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let dx = (at(plane, r as i64, c as i64 + 1) - at(plane, r as i64, c as i64 - 1)) / 2.0;
        let dy = (at(plane, r as i64 + 1, c as i64) - at(plane, r as i64 - 1, c as i64)) / 2.0;
        (dx * dx + dy * dy).sqrt()
    })
}

pub fn laplacian(plane: &Array2<f32>) -> Array2<f32> {
    let (rows, cols) = plane.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let (r, c) = (r as i64, c as i64);
        at(plane, r, c + 1) + at(plane, r, c - 1) + at(plane, r + 1, c) + at(plane, r - 1, c)
            - 4.0 * at(plane, r, c)
    })
}

#[derive(Clone, Copy)]
enum Axis2 {
    Rows,
    Cols,
}

fn convolve(plane: ArrayView2<f32>, kernel: &[f32], axis: Axis2) -> Array2<f32> {
    let (rows, cols) = plane.dim();
    let radius = (kernel.len() / 2) as i64;
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let mut sum = 0.0f32;
        for (k, weight) in kernel.iter().enumerate() {
            let offset = k as i64 - radius;
            let value = match axis {
                Axis2::Cols => at_view(&plane, r as i64, c as i64 + offset),
                Axis2::Rows => at_view(&plane, r as i64 + offset, c as i64),
            };
            sum += weight * value;
        }
        sum
    })
}

fn at(plane: &Array2<f32>, r: i64, c: i64) -> f32 {
    at_view(&plane.view(), r, c)
}

fn at_view(plane: &ArrayView2<f32>, r: i64, c: i64) -> f32 {
    let (rows, cols) = plane.dim();
    let r = r.clamp(0, rows as i64 - 1) as usize;
    let c = c.clamp(0, cols as i64 - 1) as usize;
    plane[[r, c]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(1.5);
        assert_eq!(kernel.len(), 2 * 5 + 1);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(kernel[0], kernel[kernel.len() - 1]);
    }

    #[test]
    fn constant_plane_is_preserved_by_smoothing() {
        let plane = Array2::from_elem((6, 5), 3.0f32);
        let smoothed = gaussian(plane.view(), 2.0);
        assert!(smoothed.iter().all(|v| (v - 3.0).abs() < 1e-5));
        assert!(gradient_magnitude(&smoothed).iter().all(|v| v.abs() < 1e-5));
        assert!(laplacian(&smoothed).iter().all(|v| v.abs() < 1e-4));
    }

    #[test]
    fn gradient_responds_to_a_ramp() {
        let plane = Array2::from_shape_fn((4, 4), |(_, c)| c as f32);
        let grad = gradient_magnitude(&plane);
        assert!((grad[[1, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_sigma_is_identity() {
        let plane = Array2::from_shape_fn((3, 3), |(r, c)| (r * 3 + c) as f32);
        assert_eq!(gaussian(plane.view(), 0.0), plane);
        assert_eq!(kernel_radius(0.0), 0);
    }
}
