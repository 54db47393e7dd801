use std::path::PathBuf;

use crate::annotations::HierarchyEvent;
use crate::dataset::BoundaryStrategy;
use crate::features::FeatureCalculator;
use crate::imaging::Resolution;
use crate::ml::Classifier;
use crate::overlay::{OverlayEvent, RegionMode, TileKey};
use crate::preprocess::PreprocessSettings;
use crate::training::{ChannelType, TrainOptions, TrainingError, TrainingOutcome, TrainingReport};

/// Everything the coordinator reacts to, from the UI or from its own workers.
#[derive(Debug)]
pub enum CoordinatorEvent {
    Hierarchy(HierarchyEvent),
    SetResolution(Resolution),
    SetFeatureCalculator(Option<FeatureCalculator>),
    SetClassifier(Option<Classifier>),
    SetOutputType(ChannelType),
    SetBoundaryStrategy(BoundaryStrategy),
    SetRegion(RegionMode),
    SetPreprocessing(PreprocessSettings),
    SetTrainOptions(TrainOptions),
    SetLivePrediction(bool),
    /// Show one feature channel in the feature overlay, or hide it.
    SetFeatureDisplay(Option<usize>),
    /// Train now, regardless of live prediction.
    Train,
    Export(PathBuf),
    TrainingFinished {
        ticket: u64,
        result: Result<TrainingOutcome, TrainingError>,
    },
    Overlay(OverlayEvent),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Installed model (or none) matches the current inputs.
    Idle,
    Training,
    /// Inputs changed since the last training; waiting for a request or live mode.
    Stale,
}

/// Published to the interactive side.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Status(SessionStatus),
    ModelInstalled {
        generation: u64,
        classifier: String,
    },
    /// The classification overlay was emptied.
    ModelCleared {
        generation: u64,
    },
    Report(TrainingReport),
    NothingToTrain,
    TrainingFailed(String),
    FeatureDisplayInstalled {
        generation: u64,
        name: String,
    },
    TileReady {
        tile: TileKey,
        generation: u64,
    },
    TileFailed {
        tile: TileKey,
        generation: u64,
        message: String,
    },
    Exported(PathBuf),
    ExportFailed(String),
}

impl From<OverlayEvent> for SessionUpdate {
    fn from(event: OverlayEvent) -> Self {
        match event {
            OverlayEvent::TileReady { tile, generation } => {
                SessionUpdate::TileReady { tile, generation }
            }
            OverlayEvent::TileFailed {
                tile,
                generation,
                message,
            } => SessionUpdate::TileFailed {
                tile,
                generation,
                message,
            },
        }
    }
}
