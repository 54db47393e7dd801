use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Condvar, Mutex, RwLock};

use pixclass::annotations::{Annotation, AnnotationHierarchy};
use pixclass::imaging::{
    InMemoryImage, PixelBuffer, PixelCalibration, RegionRequest, TileSource, TileSourceError,
};

/// Tile source whose reads block until the gate is opened.
pub struct GatedSource {
    inner: InMemoryImage,
    open: Mutex<bool>,
    opened: Condvar,
    started: Mutex<Sender<()>>,
}

impl GatedSource {
    pub fn new(inner: InMemoryImage, started: Sender<()>) -> Self {
        Self {
            inner,
            open: Mutex::new(false),
            opened: Condvar::new(),
            started: Mutex::new(started),
        }
    }

    pub fn open(&self) {
        let mut open = self.open.lock().unwrap();
        *open = true;
        self.opened.notify_all();
    }
}

impl TileSource for GatedSource {
    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn channel_names(&self) -> Vec<String> {
        self.inner.channel_names()
    }

    fn calibration(&self) -> &PixelCalibration {
        self.inner.calibration()
    }

    fn read_region(&self, request: &RegionRequest) -> Result<PixelBuffer, TileSourceError> {
        let _ = self.started.lock().unwrap().send(());
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        drop(open);
        self.inner.read_region(request)
    }
}

/// Tile source remembering the largest read it has served.
pub struct RecordingSource {
    inner: InMemoryImage,
    largest_read: AtomicUsize,
    reads: AtomicUsize,
}

impl RecordingSource {
    pub fn new(inner: InMemoryImage) -> Self {
        Self {
            inner,
            largest_read: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    /// Output pixels of the largest request so far.
    pub fn largest_read(&self) -> usize {
        self.largest_read.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.largest_read.store(0, Ordering::SeqCst);
        self.reads.store(0, Ordering::SeqCst);
    }
}

impl TileSource for RecordingSource {
    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn channel_names(&self) -> Vec<String> {
        self.inner.channel_names()
    }

    fn calibration(&self) -> &PixelCalibration {
        self.inner.calibration()
    }

    fn read_region(&self, request: &RegionRequest) -> Result<PixelBuffer, TileSourceError> {
        let pixels = request.output_width() * request.output_height();
        self.largest_read.fetch_max(pixels, Ordering::SeqCst);
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_region(request)
    }
}

/// Tile source that panics on every read while it is broken.
pub struct PanickingSource {
    inner: InMemoryImage,
    broken: AtomicBool,
}

impl PanickingSource {
    pub fn new(inner: InMemoryImage) -> Self {
        Self {
            inner,
            broken: AtomicBool::new(true),
        }
    }

    pub fn repair(&self) {
        self.broken.store(false, Ordering::SeqCst);
    }
}

impl TileSource for PanickingSource {
    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn channel_names(&self) -> Vec<String> {
        self.inner.channel_names()
    }

    fn calibration(&self) -> &PixelCalibration {
        self.inner.calibration()
    }

    fn read_region(&self, request: &RegionRequest) -> Result<PixelBuffer, TileSourceError> {
        if self.broken.load(Ordering::SeqCst) {
            panic!("pixel store went away");
        }
        self.inner.read_region(request)
    }
}

/// Annotation hierarchy that tests can edit while a coordinator reads it.
#[derive(Default)]
pub struct SharedAnnotations {
    annotations: RwLock<Vec<Annotation>>,
}

impl SharedAnnotations {
    pub fn new(annotations: Vec<Annotation>) -> Self {
        Self {
            annotations: RwLock::new(annotations),
        }
    }

    pub fn push(&self, annotation: Annotation) {
        self.annotations.write().unwrap().push(annotation);
    }
}

impl AnnotationHierarchy for SharedAnnotations {
    fn annotations(&self) -> Vec<Annotation> {
        self.annotations.read().unwrap().clone()
    }
}
