use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, mpsc::Sender};

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, warn};

use super::computer::merge_children;
use super::render::{auto_range, render_tile};
use super::{
    CacheKey, ComputerId, TileCache, TileComputer, TileError, TileGrid, TileKey, TileWorkerPool,
};
use crate::imaging::{PixelBuffer, Rect, TileSource};
use crate::training::ChannelType;

/// Which tiles an overlay is willing to compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionMode {
    #[default]
    WholeImage,
    AnnotationsOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Running,
    /// Terminal; a stopped overlay never computes again.
    Stopped,
}

#[derive(Debug, Clone)]
pub enum TileStatus {
    Ready(Arc<PixelBuffer>),
    /// Computation scheduled or already running.
    Pending,
    /// Tile lies outside the image or the eligible region.
    NoData,
    /// Nothing to show and nothing scheduled.
    Unavailable,
}

/// Sent whenever a scheduled tile settles.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEvent {
    TileReady {
        tile: TileKey,
        generation: u64,
    },
    TileFailed {
        tile: TileKey,
        generation: u64,
        message: String,
    },
}

struct Inner {
    state: OverlayState,
    generation: u64,
    computer: Option<(Arc<TileComputer>, ComputerId, TileGrid)>,
    in_flight: HashSet<TileKey>,
    failed: HashSet<TileKey>,
    live: bool,
    region: RegionMode,
    annotation_bounds: Vec<Rect>,
    opacity: f32,
    display_range: Option<(f32, f32)>,
}

struct Shared {
    inner: Mutex<Inner>,
    cache: TileCache,
    source: Arc<dyn TileSource>,
    events: Option<Sender<OverlayEvent>>,
    tile_size: usize,
}

impl Shared {
    // Lock order: `inner` before the cache.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn image_bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.source.width() as f64, self.source.height() as f64)
    }

    /// Cache `data` unless `key` has been superseded meanwhile.
    fn store_if_current(&self, key: CacheKey, data: Arc<PixelBuffer>) -> bool {
        let inner = self.lock();
        if !is_current(&inner, &key) {
            return false;
        }
        self.cache.insert(key, data);
        true
    }

    fn emit(&self, event: OverlayEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Asynchronously computed, generation-tagged prediction tiles for one image.
///
/// Requests never block on computation: misses are queued on the worker pool
/// and answered as pending. A finished tile is cached only if the overlay is
/// still at the generation and computer it was scheduled for.
pub struct PredictionOverlay {
    shared: Arc<Shared>,
    pool: Arc<TileWorkerPool>,
}

impl PredictionOverlay {
    pub fn new(
        source: Arc<dyn TileSource>,
        cache: TileCache,
        pool: Arc<TileWorkerPool>,
        tile_size: usize,
        events: Option<Sender<OverlayEvent>>,
    ) -> Self {
        let inner = Inner {
            state: OverlayState::Running,
            generation: 0,
            computer: None,
            in_flight: HashSet::new(),
            failed: HashSet::new(),
            live: true,
            region: RegionMode::WholeImage,
            annotation_bounds: Vec::new(),
            opacity: 1.0,
            display_range: None,
        };
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                cache,
                source,
                events,
                tile_size: tile_size.max(1),
            }),
            pool,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.shared.lock().state
    }

    pub fn generation(&self) -> u64 {
        self.shared.lock().generation
    }

    pub fn tile_size(&self) -> usize {
        self.shared.tile_size
    }

    pub fn computer(&self) -> Option<Arc<TileComputer>> {
        self.shared
            .lock()
            .computer
            .as_ref()
            .map(|(computer, _, _)| Arc::clone(computer))
    }

    pub fn grid(&self) -> Option<TileGrid> {
        self.shared.lock().computer.as_ref().map(|(_, _, grid)| *grid)
    }

    /// Replace what the overlay paints, tagging it with `generation`.
    ///
    /// Generations older than the current one are refused. Everything in
    /// flight becomes stale and cached tiles of the previous computer are
    /// dropped.
    pub fn install(&self, computer: Option<TileComputer>, generation: u64) -> bool {
        let mut inner = self.shared.lock();
        if inner.state == OverlayState::Stopped || generation < inner.generation {
            return false;
        }
        let previous = inner.computer.take();
        inner.generation = generation;
        inner.in_flight.clear();
        inner.failed.clear();
        inner.computer = computer.map(|computer| {
            let id = computer.id();
            let grid = computer.grid(self.shared.tile_size);
            (Arc::new(computer), id, grid)
        });
        if let Some((_, old_id, _)) = previous {
            if inner.computer.as_ref().map(|(_, id, _)| *id) != Some(old_id) {
                self.shared.cache.purge_computer(old_id);
            }
        }
        if let Some((_, id, _)) = &inner.computer {
            self.shared.cache.purge_stale(*id, generation);
        }
        true
    }

    /// Stop for good; pending results are discarded and tiles released.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        inner.state = OverlayState::Stopped;
        inner.in_flight.clear();
        inner.failed.clear();
        if let Some((_, id, _)) = inner.computer.take() {
            self.shared.cache.purge_computer(id);
        }
    }

    /// Turning liveness off suspends new computations but keeps the cache.
    pub fn set_live(&self, live: bool) {
        self.shared.lock().live = live;
    }

    pub fn is_live(&self) -> bool {
        self.shared.lock().live
    }

    pub fn set_region_mode(&self, region: RegionMode) {
        self.shared.lock().region = region;
    }

    pub fn region_mode(&self) -> RegionMode {
        self.shared.lock().region
    }

    /// Full-resolution bounds of the annotations, for `AnnotationsOnly`.
    pub fn set_annotation_bounds(&self, bounds: Vec<Rect>) {
        self.shared.lock().annotation_bounds = bounds;
    }

    pub fn set_opacity(&self, opacity: f32) {
        self.shared.lock().opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn opacity(&self) -> f32 {
        self.shared.lock().opacity
    }

    /// Fixed display range for feature tiles; `None` means automatic.
    pub fn set_display_range(&self, range: Option<(f32, f32)>) {
        self.shared.lock().display_range = range;
    }

    /// Configured range, or min/max over the tiles computed so far.
    pub fn display_range(&self) -> Option<(f32, f32)> {
        let inner = self.shared.lock();
        if inner.display_range.is_some() {
            return inner.display_range;
        }
        let (_, id, _) = inner.computer.as_ref()?;
        let tiles = self.shared.cache.tiles_for(*id, inner.generation);
        auto_range(tiles.iter().map(|(_, tile)| tile.as_ref()))
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock().in_flight.len()
    }

    /// Cached tile, or schedule it and report it as pending.
    ///
    /// Requests for a generation other than the current one are unavailable.
    pub fn request(&self, tile: TileKey, generation: u64) -> TileStatus {
        let mut inner = self.shared.lock();
        if inner.state == OverlayState::Stopped || generation != inner.generation {
            return TileStatus::Unavailable;
        }
        let Some((computer, id, grid)) = inner.computer.clone() else {
            return TileStatus::Unavailable;
        };
        if tile.level > TileGrid::MAX_LEVEL || !self.is_eligible(&inner, &grid, &tile) {
            return TileStatus::NoData;
        }
        let key = CacheKey {
            tile,
            generation,
            computer: id,
        };
        if let Some(data) = self.shared.cache.get(&key) {
            return TileStatus::Ready(data);
        }
        if inner.in_flight.contains(&tile) {
            return TileStatus::Pending;
        }
        if !inner.live || inner.failed.contains(&tile) {
            return TileStatus::Unavailable;
        }
        let shared = Arc::clone(&self.shared);
        let submitted = self.pool.submit(Box::new(move || {
            run_tile(&shared, &computer, &grid, key);
        }));
        if !submitted {
            return TileStatus::Unavailable;
        }
        inner.in_flight.insert(tile);
        TileStatus::Pending
    }

    fn is_eligible(&self, inner: &Inner, grid: &TileGrid, tile: &TileKey) -> bool {
        let bounds = grid.tile_bounds(tile);
        if !bounds.intersects(&self.shared.image_bounds()) {
            return false;
        }
        match inner.region {
            RegionMode::WholeImage => true,
            RegionMode::AnnotationsOnly => inner
                .annotation_bounds
                .iter()
                .any(|annotation| annotation.intersects(&bounds)),
        }
    }

    /// Current-generation tile if it has been computed.
    pub fn cached_tile(&self, tile: &TileKey) -> Option<Arc<PixelBuffer>> {
        let inner = self.shared.lock();
        let (_, id, _) = inner.computer.as_ref()?;
        self.shared.cache.peek(&CacheKey {
            tile: *tile,
            generation: inner.generation,
            computer: *id,
        })
    }

    /// Image of a cached tile, ready to draw over the viewer.
    pub fn render(&self, tile: &TileKey) -> Option<RgbaImage> {
        let data = self.cached_tile(tile)?;
        let computer = self.computer()?;
        let range = self.display_range().unwrap_or((0.0, 1.0));
        Some(render_tile(&computer, &data, self.opacity(), range))
    }

    /// Short description of the prediction under a full-resolution point.
    ///
    /// Looks at the finest cached level first.
    pub fn value_at(&self, x: f64, y: f64, z: usize, t: usize) -> Option<String> {
        let inner = self.shared.lock();
        let (computer, id, grid) = inner.computer.as_ref()?;
        for level in 0..=TileGrid::MAX_LEVEL {
            let tile = grid.tile_at(level, x, y, z, t);
            let key = CacheKey {
                tile,
                generation: inner.generation,
                computer: *id,
            };
            let Some(data) = self.shared.cache.peek(&key) else {
                continue;
            };
            let bounds = grid.tile_bounds(&tile);
            let ds = grid.level_downsample(level);
            let col = ((x - bounds.x) / ds).floor() as usize;
            let row = ((y - bounds.y) / ds).floor() as usize;
            let (rows, cols, _) = data.dim();
            if row >= rows || col >= cols {
                return None;
            }
            match describe(computer, &data, row, col) {
                Some(text) => return Some(text),
                None => continue,
            }
        }
        None
    }
}

fn describe(computer: &TileComputer, data: &PixelBuffer, row: usize, col: usize) -> Option<String> {
    if data[[row, col, 0]].is_nan() {
        return None;
    }
    match computer {
        TileComputer::Classification(model) => match model.metadata.channel_type {
            ChannelType::Classification => {
                let label = data[[row, col, 0]].max(0.0) as usize;
                let class = model.label_map.class(label)?;
                Some(format!("Classification: {}", class.name()))
            }
            ChannelType::Probability => {
                let parts: Vec<String> = model
                    .label_map
                    .names()
                    .iter()
                    .enumerate()
                    .map(|(band, name)| format!("{name}: {:.2}", data[[row, col, band]]))
                    .collect();
                Some(format!("Prediction: {}", parts.join(", ")))
            }
        },
        TileComputer::Feature { name, .. } => Some(format!("{name}: {:.3}", data[[row, col, 0]])),
    }
}

fn is_current(inner: &Inner, key: &CacheKey) -> bool {
    inner.state == OverlayState::Running
        && inner.generation == key.generation
        && inner.computer.as_ref().map(|(_, id, _)| *id) == Some(key.computer)
}

/// Compute `key`, merging coarser levels from cached or freshly built children.
///
/// `Ok(None)` means the overlay moved on while the children were built.
fn build_tile(
    shared: &Shared,
    computer: &TileComputer,
    grid: &TileGrid,
    key: CacheKey,
) -> Result<Option<PixelBuffer>, TileError> {
    let Some(children) = grid.children(&key.tile) else {
        return computer.compute(shared.source.as_ref(), grid, &key.tile).map(Some);
    };
    let image = shared.image_bounds();
    let mut parts: [Option<Arc<PixelBuffer>>; 4] = Default::default();
    for (slot, child) in parts.iter_mut().zip(children) {
        if !grid.tile_bounds(&child).intersects(&image) {
            continue;
        }
        let child_key = CacheKey { tile: child, ..key };
        if let Some(data) = shared.cache.get(&child_key) {
            *slot = Some(data);
            continue;
        }
        let Some(data) = build_tile(shared, computer, grid, child_key)? else {
            return Ok(None);
        };
        let data = Arc::new(data);
        if !shared.store_if_current(child_key, Arc::clone(&data)) {
            return Ok(None);
        }
        *slot = Some(data);
    }
    Ok(Some(merge_children(&parts, grid.tile_size)))
}

fn run_tile(shared: &Shared, computer: &TileComputer, grid: &TileGrid, key: CacheKey) {
    let _span = debug_span!(
        "tile",
        level = key.tile.level,
        x = key.tile.x,
        y = key.tile.y,
        generation = key.generation
    )
    .entered();
    if !is_current(&shared.lock(), &key) {
        debug!("Skipping superseded tile");
        return;
    }
    let result = build_tile(shared, computer, grid, key);
    let event = {
        let mut inner = shared.lock();
        if !is_current(&inner, &key) {
            debug!("Discarding stale tile");
            return;
        }
        inner.in_flight.remove(&key.tile);
        inner.in_flight.remove(&key.tile);
        match result {
            Ok(None) => {
                debug!("Tile superseded while merging");
                return;
            }
            Ok(Some(data)) => {
                shared.cache.insert(key, Arc::new(data));
                OverlayEvent::TileReady {
                    tile: key.tile,
                    generation: key.generation,
                }
            }
            Err(err) => {
                warn!("Tile failed: {}", err);
                inner.failed.insert(key.tile);
                OverlayEvent::TileFailed {
                    tile: key.tile,
                    generation: key.generation,
                    message: err.to_string(),
                }
            }
        }
    };
    shared.emit(event);
}
