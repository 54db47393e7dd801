use std::sync::Arc;

use ndarray::{Array3, s};
use thiserror::Error;

use super::{ComputerId, TileGrid, TileKey};
use crate::features::{FeatureError, FeatureOperator};
use crate::imaging::{PixelBuffer, Resolution, TileSource};
use crate::ml::ModelError;
use crate::training::{ChannelType, TrainedModel};

#[derive(Debug, Error)]
pub enum TileError {
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Feature channel {channel} not produced (operator has {available})")]
    ChannelOutOfRange { channel: usize, available: usize },
}

/// What an overlay paints into its tiles.
#[derive(Debug, Clone)]
pub enum TileComputer {
    /// Per-pixel output of a trained classifier.
    Classification(Arc<TrainedModel>),
    /// One channel of a feature operator, for feature inspection.
    Feature {
        operator: FeatureOperator,
        channel: usize,
        name: String,
    },
}

impl TileComputer {
    /// Feature display for `channel`, named after the operator's output.
    pub fn feature(operator: FeatureOperator, channel: usize, input_names: &[String]) -> Self {
        let name = operator
            .channel_names(input_names)
            .get(channel)
            .cloned()
            .unwrap_or_else(|| format!("Feature {channel}"));
        TileComputer::Feature {
            operator,
            channel,
            name,
        }
    }

    pub fn id(&self) -> ComputerId {
        let mut hasher = blake3::Hasher::new();
        match self {
            TileComputer::Classification(model) => {
                hasher.update(b"classification");
                hasher.update(model.operator.id().as_bytes());
                let kind: &[u8] = match model.metadata.channel_type {
                    ChannelType::Classification => b"labels",
                    ChannelType::Probability => b"probabilities",
                };
                hasher.update(kind);
                hasher.update(model.classifier_name.as_bytes());
            }
            TileComputer::Feature {
                operator, channel, ..
            } => {
                hasher.update(b"feature");
                hasher.update(operator.id().as_bytes());
                hasher.update(&(*channel as u64).to_le_bytes());
            }
        }
        ComputerId(hasher.finalize())
    }

    pub fn resolution(&self) -> &Resolution {
        match self {
            TileComputer::Classification(model) => model.operator.resolution(),
            TileComputer::Feature { operator, .. } => operator.resolution(),
        }
    }

    pub fn grid(&self, tile_size: usize) -> TileGrid {
        TileGrid::new(self.resolution().downsample, tile_size)
    }

    /// Compute one level 0 tile from the source.
    ///
    /// Coarser tiles are never read directly; see [`merge_children`].
    pub fn compute(
        &self,
        source: &dyn TileSource,
        grid: &TileGrid,
        key: &TileKey,
    ) -> Result<PixelBuffer, TileError> {
        let request = grid.base_request(&TileKey { level: 0, ..*key });
        match self {
            TileComputer::Classification(model) => {
                let features = model.operator.compute_region(source, &request)?;
                Ok(model.classify_features(&features)?)
            }
            TileComputer::Feature {
                operator, channel, ..
            } => {
                let features = operator.compute_region(source, &request)?;
                let available = features.dim().2;
                if *channel >= available {
                    return Err(TileError::ChannelOutOfRange {
                        channel: *channel,
                        available,
                    });
                }
                let channel = *channel;
                Ok(features.slice(s![.., .., channel..channel + 1]).to_owned())
            }
        }
    }
}

/// Build a tile from its four children (in [`TileGrid::children`] order).
///
/// Output pixel `(r, c)` is child pixel `(2r, 2c)`, so every level samples
/// the same level 0 pixels. Missing children leave NaN.
pub(crate) fn merge_children(
    children: &[Option<Arc<PixelBuffer>>; 4],
    tile_size: usize,
) -> PixelBuffer {
    let bands = children
        .iter()
        .flatten()
        .map(|child| child.dim().2)
        .next()
        .unwrap_or(1);
    let half = tile_size.div_ceil(2);
    let mut out = Array3::from_elem((tile_size, tile_size, bands), f32::NAN);
    for (index, child) in children.iter().enumerate() {
        let Some(child) = child else {
            continue;
        };
        let (rows, cols, child_bands) = child.dim();
        let (col0, row0) = ((index % 2) * half, (index / 2) * half);
        for r in 0..half.min(tile_size - row0) {
            for c in 0..half.min(tile_size - col0) {
                let (cr, cc) = (r * 2, c * 2);
                if cr >= rows || cc >= cols {
                    continue;
                }
                for band in 0..bands.min(child_bands) {
                    out[[row0 + r, col0 + c, band]] = child[[cr, cc, band]];
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_tiles_sample_even_child_pixels() {
        let child = |offset: f32| {
            Some(Arc::new(Array3::from_shape_fn((4, 4, 1), |(r, c, _)| {
                offset + (r * 4 + c) as f32
            })))
        };
        let merged = merge_children(&[child(0.0), child(100.0), None, child(300.0)], 4);
        assert_eq!(merged.dim(), (4, 4, 1));
        assert_eq!(merged[[0, 0, 0]], 0.0);
        assert_eq!(merged[[1, 1, 0]], 10.0);
        assert_eq!(merged[[0, 2, 0]], 100.0);
        assert_eq!(merged[[3, 3, 0]], 310.0);
        assert!(merged[[2, 0, 0]].is_nan());
    }
}
