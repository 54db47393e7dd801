//! Image-side plumbing: calibration, working resolutions, region requests and
//! the tile source collaborator.

mod calibration;
mod region;
mod source;

pub use calibration::{PixelCalibration, Resolution, ResolutionError, insert_sorted};
pub use region::{Rect, RegionRequest};
pub use source::{InMemoryImage, PixelBuffer, TileSource, TileSourceError};
