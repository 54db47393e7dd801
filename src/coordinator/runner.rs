use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use image::RgbaImage;
use tracing::{debug, error, info, warn};

use super::state::{Completion, SessionConfig, SessionState};
use super::{CoordinatorEvent, SessionStatus, SessionUpdate};
use crate::annotations::{AnnotationHierarchy, HierarchyEvent};
use crate::artifact::PixelClassifierArtifact;
use crate::config::SessionSettings;
use crate::features::compose;
use crate::imaging::TileSource;
use crate::overlay::{
    OverlayEvent, PredictionOverlay, TileCache, TileComputer, TileKey, TileWorkerPool,
};
use crate::training::{TrainingError, TrainingJob, TrainingOutcome, TrainingReport, run_training};

/// Handle to the coordinator thread of one image session.
///
/// All session state lives on that thread; this handle only sends events,
/// drains updates and reads the (internally synchronized) overlays.
pub struct TrainingCoordinator {
    tx: Sender<CoordinatorEvent>,
    updates: Receiver<SessionUpdate>,
    overlay: Arc<PredictionOverlay>,
    feature_overlay: Arc<PredictionOverlay>,
    report: Option<TrainingReport>,
    thread: Option<JoinHandle<()>>,
}

impl TrainingCoordinator {
    pub fn start(
        hierarchy: Arc<dyn AnnotationHierarchy>,
        source: Arc<dyn TileSource>,
        settings: &SessionSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<CoordinatorEvent>();
        let (update_tx, updates) = mpsc::channel::<SessionUpdate>();
        let (overlay_tx, overlay_rx) = mpsc::channel::<OverlayEvent>();
        forward_overlay_events(overlay_rx, tx.clone());

        let cache = TileCache::new(settings.overlay.cache_tiles);
        let pool = Arc::new(TileWorkerPool::new(settings.overlay.worker_count));
        let new_overlay = || {
            let overlay = PredictionOverlay::new(
                source.clone(),
                cache.clone(),
                pool.clone(),
                settings.overlay.tile_size,
                Some(overlay_tx.clone()),
            );
            overlay.set_opacity(settings.overlay.opacity);
            overlay.set_region_mode(settings.overlay.region);
            overlay.set_live(settings.training.live_prediction);
            Arc::new(overlay)
        };
        let overlay = new_overlay();
        let feature_overlay = new_overlay();
        feature_overlay.set_live(true);

        let config = SessionConfig::from_settings(settings, source.calibration());
        let mut session = Session {
            state: SessionState::new(config),
            hierarchy,
            source,
            overlay: overlay.clone(),
            feature_overlay: feature_overlay.clone(),
            events: tx.clone(),
            updates: update_tx,
            training: None,
            last_status: None,
        };
        let thread = thread::spawn(move || session.run(rx));
        Self {
            tx,
            updates,
            overlay,
            feature_overlay,
            report: None,
            thread: Some(thread),
        }
    }

    /// Queue an event; false once the coordinator has stopped.
    pub fn send(&self, event: CoordinatorEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn hierarchy_changed(&self, event: HierarchyEvent) {
        self.send(CoordinatorEvent::Hierarchy(event));
    }

    pub fn set_live_prediction(&self, live: bool) {
        self.send(CoordinatorEvent::SetLivePrediction(live));
    }

    pub fn train(&self) {
        self.send(CoordinatorEvent::Train);
    }

    pub fn export(&self, path: PathBuf) {
        self.send(CoordinatorEvent::Export(path));
    }

    pub fn overlay(&self) -> &Arc<PredictionOverlay> {
        &self.overlay
    }

    pub fn feature_overlay(&self) -> &Arc<PredictionOverlay> {
        &self.feature_overlay
    }

    /// Rendered classification tile, if it is cached at the current generation.
    pub fn current_overlay_image(&self, tile: &TileKey) -> Option<RgbaImage> {
        self.overlay.render(tile)
    }

    /// Most recent report seen while draining updates.
    pub fn training_report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    pub fn try_recv_update(&mut self) -> Option<SessionUpdate> {
        let update = self.updates.try_recv().ok()?;
        self.observe(&update);
        Some(update)
    }

    pub fn recv_update_timeout(&mut self, timeout: Duration) -> Option<SessionUpdate> {
        let update = self.updates.recv_timeout(timeout).ok()?;
        self.observe(&update);
        Some(update)
    }

    fn observe(&mut self, update: &SessionUpdate) {
        match update {
            SessionUpdate::Report(report) => self.report = Some(report.clone()),
            SessionUpdate::ModelCleared { .. } | SessionUpdate::NothingToTrain => {
                self.report = None
            }
            _ => {}
        }
    }

    /// Stop the coordinator and both overlays; waits for a running training.
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(CoordinatorEvent::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.overlay.stop();
        self.feature_overlay.stop();
    }
}

impl Drop for TrainingCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn forward_overlay_events(rx: Receiver<OverlayEvent>, tx: Sender<CoordinatorEvent>) {
    thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            if tx.send(CoordinatorEvent::Overlay(event)).is_err() {
                break;
            }
        }
    });
}

/// Run a training job, turning a panic into an error so the session always
/// hears back from its training thread.
fn train_catching_panics(job: &TrainingJob) -> Result<TrainingOutcome, TrainingError> {
    panic::catch_unwind(AssertUnwindSafe(|| run_training(job))).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        error!("Training thread panicked: {}", message);
        Err(TrainingError::Panicked(message))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// State owned by the coordinator thread.
struct Session {
    state: SessionState,
    hierarchy: Arc<dyn AnnotationHierarchy>,
    source: Arc<dyn TileSource>,
    overlay: Arc<PredictionOverlay>,
    feature_overlay: Arc<PredictionOverlay>,
    events: Sender<CoordinatorEvent>,
    updates: Sender<SessionUpdate>,
    training: Option<JoinHandle<()>>,
    last_status: Option<SessionStatus>,
}

impl Session {
    fn run(&mut self, rx: Receiver<CoordinatorEvent>) {
        self.refresh_annotation_bounds();
        if self.state.config.live {
            self.request_training();
        }
        self.publish_status();
        loop {
            let event = match rx.recv_timeout(Duration::from_millis(250)) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if matches!(event, CoordinatorEvent::Shutdown) {
                break;
            }
            self.handle(event);
            self.publish_status();
        }
        if let Some(handle) = self.training.take() {
            let _ = handle.join();
        }
        debug!("Coordinator stopped");
    }

    fn publish(&self, update: SessionUpdate) {
        let _ = self.updates.send(update);
    }

    fn publish_status(&mut self) {
        let status = self.state.status();
        if self.last_status != Some(status) {
            self.last_status = Some(status);
            self.publish(SessionUpdate::Status(status));
        }
    }

    fn handle(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Hierarchy(event) => self.on_hierarchy(event),
            CoordinatorEvent::SetResolution(resolution) => {
                self.reconfigure(|config| config.resolution = resolution);
                self.refresh_feature_display();
            }
            CoordinatorEvent::SetFeatureCalculator(calculator) => {
                self.reconfigure(|config| config.calculator = calculator);
                self.refresh_feature_display();
            }
            CoordinatorEvent::SetClassifier(classifier) => {
                self.reconfigure(|config| config.classifier = classifier)
            }
            CoordinatorEvent::SetOutputType(output_type) => {
                self.reconfigure(|config| config.output_type = output_type)
            }
            CoordinatorEvent::SetBoundaryStrategy(boundary) => {
                self.reconfigure(|config| config.boundary = boundary)
            }
            CoordinatorEvent::SetPreprocessing(preprocessing) => {
                self.reconfigure(|config| config.preprocessing = preprocessing)
            }
            CoordinatorEvent::SetTrainOptions(options) => {
                self.reconfigure(|config| config.options = options)
            }
            CoordinatorEvent::SetRegion(region) => {
                self.state.config.region = region;
                self.overlay.set_region_mode(region);
                self.feature_overlay.set_region_mode(region);
            }
            CoordinatorEvent::SetLivePrediction(live) => {
                self.state.config.live = live;
                self.overlay.set_live(live);
                if live && self.state.is_stale() {
                    self.request_training();
                }
            }
            CoordinatorEvent::SetFeatureDisplay(channel) => {
                self.state.config.feature_channel = channel;
                self.refresh_feature_display();
            }
            CoordinatorEvent::Train => self.request_training(),
            CoordinatorEvent::Export(path) => self.export(&path),
            CoordinatorEvent::TrainingFinished { ticket, result } => {
                self.on_training_finished(ticket, result)
            }
            CoordinatorEvent::Overlay(event) => self.publish(event.into()),
            CoordinatorEvent::Shutdown => {}
        }
    }

    fn on_hierarchy(&mut self, event: HierarchyEvent) {
        if event.is_changing {
            return;
        }
        self.refresh_annotation_bounds();
        if !event.affects_training() {
            return;
        }
        if self.state.config.live {
            self.request_training();
        } else {
            self.state.mark_stale();
        }
    }

    /// Apply a parameter change that invalidates the current model.
    fn reconfigure(&mut self, change: impl FnOnce(&mut SessionConfig)) {
        let before = self.state.config.clone();
        change(&mut self.state.config);
        if self.state.config == before {
            return;
        }
        let generation = self.state.supersede();
        self.overlay.install(None, generation);
        self.publish(SessionUpdate::ModelCleared { generation });
        if self.state.config.live {
            self.request_training();
        }
    }

    fn refresh_annotation_bounds(&self) {
        let bounds: Vec<_> = self
            .hierarchy
            .annotations()
            .iter()
            .map(|annotation| annotation.roi.bounds())
            .collect();
        self.overlay.set_annotation_bounds(bounds.clone());
        self.feature_overlay.set_annotation_bounds(bounds);
    }

    fn refresh_feature_display(&mut self) {
        let config = &self.state.config;
        let computer = match config.feature_channel {
            Some(channel) => match compose(config.calculator.as_ref(), &config.resolution) {
                Ok(operator) => Some(TileComputer::feature(
                    operator,
                    channel,
                    &self.source.channel_names(),
                )),
                Err(err) => {
                    warn!("Feature display unavailable: {}", err);
                    None
                }
            },
            None => None,
        };
        let name = match &computer {
            Some(TileComputer::Feature { name, .. }) => Some(name.clone()),
            _ => None,
        };
        let generation = self.state.next_generation();
        self.feature_overlay.install(computer, generation);
        if let Some(name) = name {
            self.publish(SessionUpdate::FeatureDisplayInstalled { generation, name });
        }
    }

    fn request_training(&mut self) {
        let Some(ticket) = self.state.request_training() else {
            debug!("Training already running; request queued");
            return;
        };
        if let Some(previous) = self.training.take() {
            let _ = previous.join();
        }
        let config = &self.state.config;
        let job = TrainingJob {
            hierarchy: self.hierarchy.clone(),
            source: Some(self.source.clone()),
            calculator: config.calculator.clone(),
            classifier: config.classifier.clone(),
            resolution: config.resolution.clone(),
            boundary: config.boundary.clone(),
            preprocessing: config.preprocessing,
            output_type: config.output_type,
            options: config.options,
        };
        let events = self.events.clone();
        info!("Training started (epoch {})", ticket);
        self.training = Some(thread::spawn(move || {
            let result = train_catching_panics(&job);
            let _ = events.send(CoordinatorEvent::TrainingFinished { ticket, result });
        }));
    }

    fn on_training_finished(
        &mut self,
        ticket: u64,
        result: Result<TrainingOutcome, TrainingError>,
    ) {
        if self.state.finish_training(ticket) == Completion::Superseded {
            debug!("Discarding training result from epoch {}", ticket);
        } else {
            match result {
                Ok(TrainingOutcome::Trained { model, report }) => {
                    let generation = self.state.next_generation();
                    let classifier = model.classifier_name.clone();
                    self.overlay.install(
                        Some(TileComputer::Classification(model.clone())),
                        generation,
                    );
                    self.state.install(model, report.clone());
                    self.publish(SessionUpdate::ModelInstalled {
                        generation,
                        classifier,
                    });
                    self.publish(SessionUpdate::Report(report));
                }
                Ok(TrainingOutcome::NothingToTrain) => {
                    let generation = self.state.next_generation();
                    self.state.clear_model();
                    self.overlay.install(None, generation);
                    self.publish(SessionUpdate::NothingToTrain);
                }
                Err(err) => {
                    // Previous model and its tiles stay in place.
                    warn!("Training failed: {}", err);
                    self.publish(SessionUpdate::TrainingFailed(err.to_string()));
                }
            }
        }
        if self.state.take_queued() {
            self.request_training();
        }
    }

    fn export(&self, path: &Path) {
        let Some(model) = self.state.model() else {
            self.publish(SessionUpdate::ExportFailed(
                "No trained classifier to export".to_string(),
            ));
            return;
        };
        let artifact = PixelClassifierArtifact::new(model, self.state.report().cloned());
        match artifact.save(path) {
            Ok(()) => {
                info!("Classifier exported to {}", path.display());
                self.publish(SessionUpdate::Exported(path.to_path_buf()));
            }
            Err(err) => {
                warn!("Classifier export failed: {}", err);
                self.publish(SessionUpdate::ExportFailed(err.to_string()));
            }
        }
    }
}
