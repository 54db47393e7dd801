use std::sync::Arc;

use crate::config::SessionSettings;
use crate::dataset::BoundaryStrategy;
use crate::features::FeatureCalculator;
use crate::imaging::{PixelCalibration, Resolution};
use crate::ml::Classifier;
use crate::overlay::RegionMode;
use crate::preprocess::PreprocessSettings;
use crate::training::{ChannelType, TrainOptions, TrainedModel, TrainingReport};

use super::SessionStatus;

/// User-selected inputs of the pipeline, replaced field by field.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub resolution: Resolution,
    pub calculator: Option<FeatureCalculator>,
    pub classifier: Option<Classifier>,
    pub output_type: ChannelType,
    pub boundary: BoundaryStrategy,
    pub preprocessing: PreprocessSettings,
    pub options: TrainOptions,
    pub region: RegionMode,
    pub live: bool,
    pub feature_channel: Option<usize>,
}

impl SessionConfig {
    pub fn from_settings(settings: &SessionSettings, calibration: &PixelCalibration) -> Self {
        Self {
            resolution: settings.training.resolution(calibration),
            calculator: Some(settings.features.clone()),
            classifier: Some(settings.training.classifier.clone()),
            output_type: settings.training.output_type,
            boundary: settings.boundary.clone(),
            preprocessing: settings.preprocessing,
            options: settings.training.options(),
            region: settings.overlay.region,
            live: settings.training.live_prediction,
            feature_channel: None,
        }
    }
}

/// Fate of a finished training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Inputs are unchanged since the run started; its result may be installed.
    Current,
    /// The run was superseded while it was in flight.
    Superseded,
}

/// Generation bookkeeping and the single training slot.
///
/// `generation` tags everything installed into an overlay. `epoch` counts
/// configuration changes only; a training run is current while the epoch it
/// started at is. Pure state; threads and overlays are driven by the runner.
#[derive(Debug)]
pub struct SessionState {
    pub config: SessionConfig,
    generation: u64,
    epoch: u64,
    stale: bool,
    running: Option<u64>,
    queued: bool,
    model: Option<Arc<TrainedModel>>,
    report: Option<TrainingReport>,
}

impl SessionState {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            generation: 0,
            epoch: 0,
            stale: true,
            running: None,
            queued: false,
            model: None,
            report: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// The running pipeline no longer matches the inputs.
    ///
    /// Returns the new generation; any training in flight will be discarded.
    pub fn supersede(&mut self) -> u64 {
        self.stale = true;
        self.model = None;
        self.report = None;
        self.epoch += 1;
        self.next_generation()
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn is_training(&self) -> bool {
        self.running.is_some()
    }

    /// Claim the training slot, or queue one more run behind the current one.
    ///
    /// Returns the ticket of a run to start now.
    pub fn request_training(&mut self) -> Option<u64> {
        if self.running.is_some() {
            self.queued = true;
            return None;
        }
        self.stale = false;
        self.running = Some(self.epoch);
        Some(self.epoch)
    }

    pub fn finish_training(&mut self, ticket: u64) -> Completion {
        if self.running == Some(ticket) {
            self.running = None;
        }
        if ticket == self.epoch {
            Completion::Current
        } else {
            Completion::Superseded
        }
    }

    /// Whether a queued run should start now that the slot is free.
    pub fn take_queued(&mut self) -> bool {
        std::mem::take(&mut self.queued)
    }

    pub fn install(&mut self, model: Arc<TrainedModel>, report: TrainingReport) {
        self.model = Some(model);
        self.report = Some(report);
    }

    pub fn clear_model(&mut self) {
        self.model = None;
        self.report = None;
    }

    pub fn model(&self) -> Option<&Arc<TrainedModel>> {
        self.model.as_ref()
    }

    pub fn report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        if self.running.is_some() {
            SessionStatus::Training
        } else if self.stale {
            SessionStatus::Stale
        } else {
            SessionStatus::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        let settings = SessionSettings::default();
        SessionState::new(SessionConfig::from_settings(
            &settings,
            &PixelCalibration::uncalibrated(),
        ))
    }

    #[test]
    fn one_run_at_a_time_with_coalesced_queue() {
        let mut state = state();
        assert_eq!(state.request_training(), Some(0));
        assert_eq!(state.status(), SessionStatus::Training);
        assert_eq!(state.request_training(), None);
        assert_eq!(state.request_training(), None);
        assert_eq!(state.finish_training(0), Completion::Current);
        assert_eq!(state.next_generation(), 1);
        assert!(state.take_queued());
        assert!(!state.take_queued());
        assert_eq!(state.request_training(), Some(0));
    }

    #[test]
    fn superseded_run_is_discarded() {
        let mut state = state();
        let ticket = state.request_training().unwrap();
        assert_eq!(state.supersede(), 1);
        assert_eq!(state.finish_training(ticket), Completion::Superseded);
        assert_eq!(state.generation(), 1);
        assert_eq!(state.status(), SessionStatus::Stale);
    }

    #[test]
    fn display_changes_do_not_supersede_training() {
        let mut state = state();
        let ticket = state.request_training().unwrap();
        state.next_generation();
        assert_eq!(state.finish_training(ticket), Completion::Current);
    }

    #[test]
    fn generations_only_increase() {
        let mut state = state();
        let a = state.next_generation();
        let b = state.supersede();
        let ticket = state.request_training().unwrap();
        assert_eq!(state.finish_training(ticket), Completion::Current);
        let c = state.next_generation();
        assert!(a < b && b < c);
        assert_eq!(state.status(), SessionStatus::Idle);
    }
}
