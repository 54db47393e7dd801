//! Tile-granular asynchronous prediction cache behind the live overlay.

mod cache;
mod computer;
mod grid;
#[allow(clippy::module_inception)]
mod overlay;
mod pool;
pub mod render;

pub use cache::{CacheKey, ComputerId, TileCache};
pub use computer::{TileComputer, TileError};
pub use grid::{TileGrid, TileKey};
pub use overlay::{OverlayEvent, OverlayState, PredictionOverlay, RegionMode, TileStatus};
pub use pool::{TileWorkerPool, worker_count_with_override};

/// Default edge of an overlay tile in output pixels.
pub const DEFAULT_TILE_SIZE: usize = 256;
/// Default number of tiles kept across all overlays.
pub const DEFAULT_CACHE_TILES: usize = 512;
