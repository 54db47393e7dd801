//! Feature extraction: filters, composable operator chains and calculators.

mod filters;
mod operator;
mod pipeline;

pub use filters::{FilterKind, gaussian, gaussian_kernel, gradient_magnitude, laplacian};
pub use operator::{
    FeatureError, FeatureOp, FeatureOperator, FeatureOperatorSpec, FilterBank, OperatorId,
};
pub use pipeline::{FeatureCalculator, compose};
