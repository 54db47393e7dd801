use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::dataset::LabelMap;
use crate::features::FeatureOperator;
use crate::imaging::{PixelBuffer, Resolution};
use crate::ml::gbdt_stump::argmax;
use crate::ml::{Model, ModelError};

/// Tile edge used when the classifier is applied to an image.
pub const DEFAULT_INPUT_SIZE: usize = 512;

/// Kind of image a trained classifier produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// One band holding the label index per pixel.
    #[default]
    Classification,
    /// One band per class holding probabilities.
    Probability,
}

impl ChannelType {
    /// The requested type, downgraded when probabilities are unavailable.
    pub fn resolve(self, supports_probabilities: bool) -> Self {
        if supports_probabilities {
            self
        } else {
            ChannelType::Classification
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChannel {
    pub name: String,
    pub color: [u8; 3],
}

/// Describes what a trained classifier outputs and at which scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierMetadata {
    pub resolution: Resolution,
    pub channel_type: ChannelType,
    /// One entry per class, in label order.
    pub classes: Vec<OutputChannel>,
    pub input_width: usize,
    pub input_height: usize,
}

impl ClassifierMetadata {
    pub fn from_label_map(
        resolution: Resolution,
        channel_type: ChannelType,
        label_map: &LabelMap,
    ) -> Self {
        let classes = label_map
            .classes()
            .iter()
            .map(|class| OutputChannel {
                name: class.name().to_string(),
                color: class.color(),
            })
            .collect();
        Self {
            resolution,
            channel_type,
            classes,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
        }
    }

    /// Bands in an output tile.
    pub fn n_bands(&self) -> usize {
        match self.channel_type {
            ChannelType::Classification => 1,
            ChannelType::Probability => self.classes.len(),
        }
    }
}

/// A trained classifier together with the exact feature chain it expects.
///
/// Never mutated after training; shared with tile workers through `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub classifier_name: String,
    pub model: Model,
    pub operator: FeatureOperator,
    pub metadata: ClassifierMetadata,
    pub label_map: LabelMap,
}

impl TrainedModel {
    /// Classify a feature tile of shape `(rows, cols, features)`.
    ///
    /// Classification output holds label indices as `f32`; probability
    /// output holds one band per class.
    pub fn classify_features(&self, features: &PixelBuffer) -> Result<PixelBuffer, ModelError> {
        let (rows, cols, n_features) = features.dim();
        if n_features != self.model.n_features() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.model.n_features(),
                actual: n_features,
            });
        }
        let bands = self.metadata.n_bands();
        let mut out = Array3::<f32>::zeros((rows, cols, bands));
        for (mut out_row, feature_row) in out.outer_iter_mut().zip(features.outer_iter()) {
            for (mut out_px, px) in out_row.outer_iter_mut().zip(feature_row.outer_iter()) {
                match self.metadata.channel_type {
                    ChannelType::Classification => {
                        out_px[0] = self.model.predict_row(px) as f32;
                    }
                    ChannelType::Probability => {
                        if let Some(probs) = self.model.predict_proba_row(px) {
                            for (slot, p) in out_px.iter_mut().zip(probs) {
                                *slot = p;
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Winning label index for every pixel of an output tile.
    pub fn labels_of(&self, output: &PixelBuffer) -> Vec<Vec<usize>> {
        output
            .outer_iter()
            .map(|row| {
                row.outer_iter()
                    .map(|px| match self.metadata.channel_type {
                        ChannelType::Classification => px[0].max(0.0) as usize,
                        ChannelType::Probability => argmax(&px.to_vec()),
                    })
                    .collect()
            })
            .collect()
    }

    pub fn n_output_bands(&self) -> usize {
        self.metadata.n_bands()
    }

    pub fn output_names(&self) -> Vec<String> {
        match self.metadata.channel_type {
            ChannelType::Classification => vec!["Classification".to_string()],
            ChannelType::Probability => self.label_map.names(),
        }
    }
}
