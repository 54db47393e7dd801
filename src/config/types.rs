use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::defaults::{
    MAX_TILE_SIZE, MAX_TILE_WORKER_COUNT, MIN_TILE_SIZE, clamp_downsample, clamp_unit,
    default_cache_tiles, default_downsample, default_false, default_kept_logs, default_log_filter,
    default_max_samples, default_opacity, default_rng_seed, default_tile_size,
    default_worker_count,
};
use crate::dataset::BoundaryStrategy;
use crate::features::FeatureCalculator;
use crate::imaging::{PixelCalibration, Resolution};
use crate::ml::Classifier;
use crate::overlay::RegionMode;
use crate::preprocess::PreprocessSettings;
use crate::training::{ChannelType, TrainOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    #[error("No suitable config directory found")]
    NoConfigDir,
}

/// Persisted session preferences, one TOML table per section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub features: FeatureCalculator,
    #[serde(default)]
    pub preprocessing: PreprocessSettings,
    #[serde(default)]
    pub boundary: BoundaryStrategy,
    #[serde(default)]
    pub overlay: OverlaySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Cap on training rows (0 = no cap).
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,
    #[serde(default = "default_false")]
    pub reweight_samples: bool,
    /// Working resolution as a downsample of the full image.
    #[serde(default = "default_downsample")]
    pub downsample: f64,
    #[serde(default)]
    pub classifier: Classifier,
    #[serde(default)]
    pub output_type: ChannelType,
    #[serde(default = "default_false")]
    pub live_prediction: bool,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            max_samples: default_max_samples(),
            rng_seed: default_rng_seed(),
            reweight_samples: default_false(),
            downsample: default_downsample(),
            classifier: Classifier::default(),
            output_type: ChannelType::default(),
            live_prediction: default_false(),
        }
    }
}

impl TrainingSettings {
    pub fn options(&self) -> TrainOptions {
        TrainOptions {
            max_samples: self.max_samples,
            rng_seed: self.rng_seed,
            reweight_samples: self.reweight_samples,
        }
    }

    /// Named ladder entry matching the downsample, or a custom resolution.
    pub fn resolution(&self, calibration: &PixelCalibration) -> Resolution {
        Resolution::defaults(calibration)
            .into_iter()
            .find(|res| (res.downsample - self.downsample).abs() < 1e-9)
            .or_else(|| Resolution::new("Custom", calibration, self.downsample).ok())
            .unwrap_or_else(|| Resolution::full(calibration))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySettings {
    #[serde(default = "default_tile_size")]
    pub tile_size: usize,
    /// Tiles kept across all overlays.
    #[serde(default = "default_cache_tiles")]
    pub cache_tiles: usize,
    /// Tile worker override (0 = auto).
    #[serde(default = "default_worker_count")]
    pub worker_count: u32,
    #[serde(default)]
    pub region: RegionMode,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
            cache_tiles: default_cache_tiles(),
            worker_count: default_worker_count(),
            region: RegionMode::default(),
            opacity: default_opacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `tracing` filter directives, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Run logs kept in the logs directory.
    #[serde(default = "default_kept_logs")]
    pub keep_files: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            keep_files: default_kept_logs(),
        }
    }
}

impl SessionSettings {
    /// Clamp values into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.training.downsample = clamp_downsample(self.training.downsample);
        if let Classifier::NearestNeighbors { k } = &mut self.training.classifier {
            *k = (*k).max(1);
        }
        self.features
            .bank
            .sigmas
            .retain(|sigma| sigma.is_finite() && *sigma > 0.0);
        if let Some(pca) = &mut self.preprocessing.pca {
            pca.retained_variance = if pca.retained_variance.is_finite() {
                pca.retained_variance.clamp(0.01, 1.0)
            } else {
                1.0
            };
        }
        let thickness = self.boundary.thickness();
        if !thickness.is_finite() || thickness < 0.0 {
            self.boundary = self.boundary.with_thickness(0.0);
        }
        self.overlay.tile_size = self.overlay.tile_size.clamp(MIN_TILE_SIZE, MAX_TILE_SIZE);
        self.overlay.cache_tiles = self.overlay.cache_tiles.max(1);
        self.overlay.worker_count = self.overlay.worker_count.min(MAX_TILE_WORKER_COUNT);
        self.overlay.opacity = clamp_unit(self.overlay.opacity);
        self.logging.keep_files = self.logging.keep_files.max(1);
        if self.logging.filter.trim().is_empty() {
            self.logging.filter = default_log_filter();
        }
        self
    }
}
