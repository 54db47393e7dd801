//! Library exports for the pixel classifier core, its CLI and tests.
/// Annotation classes, shapes and hierarchy change events.
pub mod annotations;
/// Application directory helpers.
pub mod app_dirs;
/// Persisted classifier artifacts.
pub mod artifact;
/// TOML-backed session settings.
pub mod config;
/// Training coordinator state machine and its message loop.
pub mod coordinator;
/// Sample assembly from annotations.
pub mod dataset;
/// Cross-cutting configuration and consistency errors.
pub mod error;
/// Feature operators and their composition.
pub mod features;
/// Pixel calibration, resolutions, regions and tile sources.
pub mod imaging;
/// Logging setup.
pub mod logging;
/// Model families and evaluation metrics.
pub mod ml;
/// Tile prediction cache, worker pool and overlays.
pub mod overlay;
/// Feature normalization and PCA.
pub mod preprocess;
/// Train/test splitting, reweighting, training and reports.
pub mod training;
