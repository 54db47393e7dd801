//! Self-contained, JSON-serialized pixel classifier.
//!
//! An artifact carries the trained model, the full feature chain (including
//! fitted preprocessing) and the output metadata, so it can be applied to new
//! images without the session that produced it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::imaging::{PixelBuffer, RegionRequest, TileSource};
use crate::training::{TrainedModel, TrainingReport};

/// Format version written by this crate.
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to serialize classifier: {0}")]
    Serialize(serde_json::Error),
    #[error("Failed to write classifier {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read classifier {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid classifier JSON: {0}")]
    Parse(serde_json::Error),
    #[error("Unsupported classifier version {found} (expected {ARTIFACT_VERSION})")]
    UnsupportedVersion { found: u32 },
    #[error("Failed to apply classifier: {0}")]
    Apply(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelClassifierArtifact {
    pub version: u32,
    /// RFC 3339 creation time.
    pub created: String,
    pub model: TrainedModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<TrainingReport>,
}

impl PixelClassifierArtifact {
    pub fn new(model: &TrainedModel, report: Option<TrainingReport>) -> Self {
        let created = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        Self {
            version: ARTIFACT_VERSION,
            created,
            model: model.clone(),
            report,
        }
    }

    pub fn to_json(&self) -> Result<String, ArtifactError> {
        serde_json::to_string_pretty(self).map_err(ArtifactError::Serialize)
    }

    pub fn from_json(text: &str) -> Result<Self, ArtifactError> {
        let artifact: Self = serde_json::from_str(text).map_err(ArtifactError::Parse)?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: artifact.version,
            });
        }
        Ok(artifact)
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let data = self.to_json()?;
        std::fs::write(path, data).map_err(|source| ArtifactError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let text = std::fs::read_to_string(path).map_err(|source| ArtifactError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn into_model(self) -> Arc<TrainedModel> {
        Arc::new(self.model)
    }

    /// Classify a region at the model's own resolution.
    pub fn classify_region(
        &self,
        source: &dyn TileSource,
        request: &RegionRequest,
    ) -> Result<PixelBuffer, ArtifactError> {
        let features = self
            .model
            .operator
            .compute_region(source, request)
            .map_err(|err| ArtifactError::Apply(err.to_string()))?;
        self.model
            .classify_features(&features)
            .map_err(|err| ArtifactError::Apply(err.to_string()))
    }
}
