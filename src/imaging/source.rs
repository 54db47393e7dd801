use std::path::Path;

use image::DynamicImage;
use ndarray::Array3;
use thiserror::Error;

use super::{PixelCalibration, RegionRequest};

/// Pixels laid out as `(rows, cols, channels)`.
pub type PixelBuffer = Array3<f32>;

#[derive(Debug, Error)]
pub enum TileSourceError {
    #[error("Region request produces no pixels")]
    EmptyRegion,
    #[error("Plane z={z}, t={t} is not available")]
    PlaneOutOfRange { z: usize, t: usize },
    #[error("Failed to open image {path}: {source}")]
    Open {
        path: String,
        source: image::ImageError,
    },
    #[error("Pixel buffer shape does not match {expected} channel names")]
    ChannelMismatch { expected: usize },
}

/// Read-only access to the pixels of a (potentially huge) image.
///
/// Called concurrently from tile workers, so implementations must be `Sync`.
pub trait TileSource: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn channel_names(&self) -> Vec<String>;
    fn calibration(&self) -> &PixelCalibration;
    fn read_region(&self, request: &RegionRequest) -> Result<PixelBuffer, TileSourceError>;
}

/// A single-plane image held fully in memory.
///
/// Requests outside the image clamp to the nearest edge pixel.
#[derive(Debug, Clone)]
pub struct InMemoryImage {
    pixels: Array3<f32>,
    channel_names: Vec<String>,
    calibration: PixelCalibration,
}

impl InMemoryImage {
    pub fn from_array(
        pixels: Array3<f32>,
        channel_names: Vec<String>,
        calibration: PixelCalibration,
    ) -> Result<Self, TileSourceError> {
        if pixels.dim().2 != channel_names.len() {
            return Err(TileSourceError::ChannelMismatch {
                expected: channel_names.len(),
            });
        }
        Ok(Self {
            pixels,
            channel_names,
            calibration,
        })
    }

    /// Wrap a decoded image; grayscale images keep one channel, everything else
    /// becomes red/green/blue scaled to `[0, 1]`.
    pub fn from_dynamic(image: &DynamicImage, calibration: PixelCalibration) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        if image.color().has_color() {
            let rgb = image.to_rgb32f();
            let pixels = Array3::from_shape_fn((height, width, 3), |(row, col, ch)| {
                rgb.get_pixel(col as u32, row as u32)[ch]
            });
            Self {
                pixels,
                channel_names: vec!["Red".into(), "Green".into(), "Blue".into()],
                calibration,
            }
        } else {
            let luma = image.to_luma32f();
            let pixels = Array3::from_shape_fn((height, width, 1), |(row, col, _)| {
                luma.get_pixel(col as u32, row as u32)[0]
            });
            Self {
                pixels,
                channel_names: vec!["Gray".into()],
                calibration,
            }
        }
    }

    pub fn open(path: &Path, calibration: PixelCalibration) -> Result<Self, TileSourceError> {
        let image = image::open(path).map_err(|source| TileSourceError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_dynamic(&image, calibration))
    }

    fn clamped(&self, row: i64, col: i64, ch: usize) -> f32 {
        let (rows, cols, _) = self.pixels.dim();
        let r = row.clamp(0, rows as i64 - 1) as usize;
        let c = col.clamp(0, cols as i64 - 1) as usize;
        self.pixels[[r, c, ch]]
    }
}

impl TileSource for InMemoryImage {
    fn width(&self) -> u32 {
        self.pixels.dim().1 as u32
    }

    fn height(&self) -> u32 {
        self.pixels.dim().0 as u32
    }

    fn channel_names(&self) -> Vec<String> {
        self.channel_names.clone()
    }

    fn calibration(&self) -> &PixelCalibration {
        &self.calibration
    }

    fn read_region(&self, request: &RegionRequest) -> Result<PixelBuffer, TileSourceError> {
        if request.z != 0 || request.t != 0 {
            return Err(TileSourceError::PlaneOutOfRange {
                z: request.z,
                t: request.t,
            });
        }
        let (out_w, out_h) = (request.output_width(), request.output_height());
        if out_w == 0 || out_h == 0 || self.pixels.is_empty() {
            return Err(TileSourceError::EmptyRegion);
        }
        let channels = self.channel_names.len();
        let ds = request.downsample;
        let mut out = Array3::<f32>::zeros((out_h, out_w, channels));
        for row in 0..out_h {
            let y0 = (request.y + row as f64 * ds).floor() as i64;
            let y1 = ((request.y + (row + 1) as f64 * ds).ceil() as i64).max(y0 + 1);
            for col in 0..out_w {
                let x0 = (request.x + col as f64 * ds).floor() as i64;
                let x1 = ((request.x + (col + 1) as f64 * ds).ceil() as i64).max(x0 + 1);
                let count = ((y1 - y0) * (x1 - x0)) as f32;
                for ch in 0..channels {
                    let mut sum = 0.0f32;
                    for y in y0..y1 {
                        for x in x0..x1 {
                            sum += self.clamped(y, x, ch);
                        }
                    }
                    out[[row, col, ch]] = sum / count;
                }
            }
        }
        Ok(out)
    }
}
