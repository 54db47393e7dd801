use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, Array3, Axis, s};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::filters::{FilterKind, gaussian, kernel_radius};
use crate::imaging::{PixelBuffer, RegionRequest, Resolution, TileSource, TileSourceError};
use crate::preprocess::{FittedPreprocessor, PreprocessError};

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Channel {index} requested but the input has {channels} channels")]
    ChannelOutOfRange { index: usize, channels: usize },
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Source(#[from] TileSourceError),
    #[error("Feature tile has an unexpected shape: {0}")]
    Shape(String),
}

/// Multi-scale filters evaluated for every selected input channel.
///
/// Output channels are ordered input channel, then sigma, then filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterBank {
    pub filters: Vec<FilterKind>,
    pub sigmas: Vec<f64>,
    /// Input channels to filter; `None` means all of them.
    #[serde(default)]
    pub channels: Option<Vec<usize>>,
}

impl FilterBank {
    pub fn padding(&self) -> usize {
        let sigma = self.sigmas.iter().copied().fold(0.0f64, f64::max);
        let derivative = self
            .filters
            .iter()
            .map(|f| f.derivative_padding())
            .max()
            .unwrap_or(0);
        kernel_radius(sigma) + derivative
    }

    fn selected(&self, n_channels: usize) -> Vec<usize> {
        match &self.channels {
            Some(channels) => channels.clone(),
            None => (0..n_channels).collect(),
        }
    }

    fn apply(&self, tile: &PixelBuffer) -> Result<PixelBuffer, FeatureError> {
        let (rows, cols, n_channels) = tile.dim();
        let selected = self.selected(n_channels);
        let n_out = selected.len() * self.sigmas.len() * self.filters.len();
        let mut out = Array3::<f32>::zeros((rows, cols, n_out));
        let mut out_idx = 0;
        for &channel in &selected {
            if channel >= n_channels {
                return Err(FeatureError::ChannelOutOfRange {
                    index: channel,
                    channels: n_channels,
                });
            }
            let plane = tile.index_axis(Axis(2), channel);
            for &sigma in &self.sigmas {
                let smoothed = gaussian(plane, sigma);
                for filter in &self.filters {
                    let response = filter.apply_smoothed(&smoothed);
                    out.index_axis_mut(Axis(2), out_idx).assign(&response);
                    out_idx += 1;
                }
            }
        }
        Ok(out)
    }

    fn channel_names(&self, input: &[String]) -> Vec<String> {
        let mut names = Vec::new();
        for channel in self.selected(input.len()) {
            let channel_name = input
                .get(channel)
                .cloned()
                .unwrap_or_else(|| format!("Channel {}", channel + 1));
            for sigma in &self.sigmas {
                for filter in &self.filters {
                    names.push(format!("{filter} σ={sigma:.1} ({channel_name})"));
                }
            }
        }
        names
    }
}

/// One step of a feature operator chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FeatureOp {
    FilterBank(FilterBank),
    SelectChannels { indices: Vec<usize> },
    /// Fitted preprocessing applied per pixel.
    Preprocess(FittedPreprocessor),
}

impl FeatureOp {
    pub fn padding(&self) -> usize {
        match self {
            FeatureOp::FilterBank(bank) => bank.padding(),
            FeatureOp::SelectChannels { .. } | FeatureOp::Preprocess(_) => 0,
        }
    }

    pub fn apply(&self, tile: &PixelBuffer) -> Result<PixelBuffer, FeatureError> {
        match self {
            FeatureOp::FilterBank(bank) => bank.apply(tile),
            FeatureOp::SelectChannels { indices } => {
                let channels = tile.dim().2;
                if let Some(&index) = indices.iter().find(|&&i| i >= channels) {
                    return Err(FeatureError::ChannelOutOfRange { index, channels });
                }
                Ok(tile.select(Axis(2), indices))
            }
            FeatureOp::Preprocess(preprocessor) => {
                let (rows, cols, _) = tile.dim();
                let applied = preprocessor.apply(&flatten_pixels(tile))?;
                let out_channels = applied.ncols();
                applied
                    .into_shape_with_order((rows, cols, out_channels))
                    .map_err(|err| FeatureError::Shape(err.to_string()))
            }
        }
    }

    pub fn channel_names(&self, input: &[String]) -> Vec<String> {
        match self {
            FeatureOp::FilterBank(bank) => bank.channel_names(input),
            FeatureOp::SelectChannels { indices } => indices
                .iter()
                .map(|&i| {
                    input
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| format!("Channel {}", i + 1))
                })
                .collect(),
            FeatureOp::Preprocess(preprocessor) => preprocessor.output_names(input),
        }
    }
}

/// One row per pixel, in row-major pixel order.
fn flatten_pixels(tile: &PixelBuffer) -> Array2<f32> {
    let (rows, cols, channels) = tile.dim();
    Array2::from_shape_fn((rows * cols, channels), |(p, c)| tile[[p / cols, p % cols, c]])
}

/// Content hash identifying an operator chain and its resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperatorId(blake3::Hash);

impl OperatorId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.0.to_hex();
        f.write_str(&hex[..12])
    }
}

/// Stream the JSON encoding of `value` into `hasher`.
///
/// JSON encoding can only fail on map keys it cannot express; the `Debug`
/// form is hashed after whatever was written in that case.
fn hash_encoded<T: Serialize + fmt::Debug>(hasher: &mut blake3::Hasher, value: &T) {
    if let Err(err) = serde_json::to_writer(&mut *hasher, value) {
        warn!(
            "Hashing {} by its debug form: {}",
            std::any::type_name::<T>(),
            err
        );
        hasher.update(format!("{value:?}").as_bytes());
    }
}

#[derive(Debug)]
struct OpNode {
    op: FeatureOp,
    prev: Option<Arc<OpNode>>,
    id: OperatorId,
}

/// Immutable chain of feature ops bound to a working resolution.
///
/// Appending returns a new operator that shares the existing chain, so a base
/// operator stays valid (and keeps its id) after preprocessing is appended.
#[derive(Debug, Clone)]
pub struct FeatureOperator {
    resolution: Resolution,
    root_id: OperatorId,
    tail: Option<Arc<OpNode>>,
}

impl FeatureOperator {
    pub fn new(resolution: Resolution) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"pixclass-operator");
        hash_encoded(&mut hasher, &resolution);
        Self {
            resolution,
            root_id: OperatorId(hasher.finalize()),
            tail: None,
        }
    }

    pub fn append(&self, op: FeatureOp) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.id().as_bytes());
        hash_encoded(&mut hasher, &op);
        let node = OpNode {
            op,
            prev: self.tail.clone(),
            id: OperatorId(hasher.finalize()),
        };
        Self {
            resolution: self.resolution.clone(),
            root_id: self.root_id,
            tail: Some(Arc::new(node)),
        }
    }

    pub fn id(&self) -> OperatorId {
        self.tail.as_ref().map_or(self.root_id, |node| node.id)
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Ops in application order.
    pub fn ops(&self) -> Vec<&FeatureOp> {
        let mut ops = Vec::new();
        let mut cursor = self.tail.as_deref();
        while let Some(node) = cursor {
            ops.push(&node.op);
            cursor = node.prev.as_deref();
        }
        ops.reverse();
        ops
    }

    /// Halo, in pixels at the working resolution, needed for exact output.
    pub fn padding(&self) -> usize {
        self.ops().iter().map(|op| op.padding()).sum()
    }

    pub fn channel_names(&self, input: &[String]) -> Vec<String> {
        self.ops()
            .iter()
            .fold(input.to_vec(), |names, op| op.channel_names(&names))
    }

    pub fn apply(&self, tile: &PixelBuffer) -> Result<PixelBuffer, FeatureError> {
        let mut current = tile.clone();
        for op in self.ops() {
            current = op.apply(&current)?;
        }
        Ok(current)
    }

    /// Features for a region at the operator's resolution, read with padding
    /// and cropped back to the requested size.
    pub fn compute_region(
        &self,
        source: &dyn TileSource,
        request: &RegionRequest,
    ) -> Result<PixelBuffer, FeatureError> {
        let pad = self.padding();
        let pixels = source.read_region(&request.padded(pad))?;
        let features = self.apply(&pixels)?;
        let (rows, cols) = (request.output_height(), request.output_width());
        let (avail_rows, avail_cols, _) = features.dim();
        let row_end = (pad + rows).min(avail_rows);
        let col_end = (pad + cols).min(avail_cols);
        Ok(features
            .slice(s![pad.min(row_end)..row_end, pad.min(col_end)..col_end, ..])
            .to_owned())
    }
}

impl PartialEq for FeatureOperator {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

/// Flat serialized form of a [`FeatureOperator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureOperatorSpec {
    pub resolution: Resolution,
    pub ops: Vec<FeatureOp>,
}

impl From<&FeatureOperator> for FeatureOperatorSpec {
    fn from(operator: &FeatureOperator) -> Self {
        Self {
            resolution: operator.resolution.clone(),
            ops: operator.ops().into_iter().cloned().collect(),
        }
    }
}

impl From<FeatureOperatorSpec> for FeatureOperator {
    fn from(spec: FeatureOperatorSpec) -> Self {
        spec.ops
            .into_iter()
            .fold(FeatureOperator::new(spec.resolution), |operator, op| {
                operator.append(op)
            })
    }
}

impl Serialize for FeatureOperator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FeatureOperatorSpec::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FeatureOperator {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        FeatureOperatorSpec::deserialize(deserializer).map(FeatureOperator::from)
    }
}
