//! Errors shared by the feature pipeline, sample assembly and training.

use thiserror::Error;

/// The session is missing something required before training can start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// No feature calculator has been selected.
    #[error("No feature calculator available")]
    NoFeatureCalculator,
    /// No classifier has been selected.
    #[error("No classifier selected")]
    NoClassifier,
    /// The feature operator produces no channels for the current image.
    #[error("Feature calculator produces no channels")]
    NoFeatureChannels,
    /// No image is open in the session.
    #[error("No image available")]
    NoImage,
}

/// Labels, label maps and feature tables disagree with each other.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    /// Label indices do not cover `[0, K)` densely.
    #[error("Label indices are not dense: expected 0..{expected}, missing {missing}")]
    SparseLabels { expected: usize, missing: usize },
    /// A row carries a label outside the label map.
    #[error("Label {label} at row {row} is outside the label map of {classes} classes")]
    LabelOutOfRange {
        row: usize,
        label: usize,
        classes: usize,
    },
    /// Number of feature rows and labels differ.
    #[error("Mismatched sample table: {rows} feature rows but {labels} labels")]
    RowCountMismatch { rows: usize, labels: usize },
    /// Number of feature columns and feature names differ.
    #[error("Mismatched sample table: {columns} feature columns but {names} names")]
    FeatureNameMismatch { columns: usize, names: usize },
    /// A split was evaluated against a model trained for a different class count.
    #[error("Label map has {label_map} classes but the model predicts {model}")]
    ClassCountMismatch { label_map: usize, model: usize },
}
