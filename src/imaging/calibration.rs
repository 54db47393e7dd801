use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unit string used when an image carries no physical calibration.
pub const PIXEL_UNITS: &str = "px";
/// Unit string for micrometer calibrations.
pub const MICROMETER_UNITS: &str = "µm";

const DEFAULT_LADDER: &[(&str, f64)] = &[
    ("Full", 1.0),
    ("Very high", 2.0),
    ("High", 4.0),
    ("Moderate", 8.0),
    ("Low", 16.0),
    ("Very low", 32.0),
    ("Extremely low", 64.0),
];

/// Physical size of one pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelCalibration {
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub units: String,
}

impl PixelCalibration {
    /// Calibration of an image without physical units (1 px per px).
    pub fn uncalibrated() -> Self {
        Self {
            pixel_width: 1.0,
            pixel_height: 1.0,
            units: PIXEL_UNITS.to_string(),
        }
    }

    /// Square pixels measured in micrometers.
    pub fn microns(pixel_size: f64) -> Self {
        Self {
            pixel_width: pixel_size,
            pixel_height: pixel_size,
            units: MICROMETER_UNITS.to_string(),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.units != PIXEL_UNITS
    }

    pub fn averaged_pixel_size(&self) -> f64 {
        (self.pixel_width + self.pixel_height) / 2.0
    }

    /// Calibration of the same image after downsampling by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            pixel_width: self.pixel_width * factor,
            pixel_height: self.pixel_height * factor,
            units: self.units.clone(),
        }
    }
}

impl Default for PixelCalibration {
    fn default() -> Self {
        Self::uncalibrated()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    #[error("Resolution scale must be a finite positive number, got {0}")]
    InvalidScale(f64),
}

/// A named working scale, expressed as a downsample of the full-resolution image.
///
/// Once attached to a feature operator a resolution is never mutated; changing
/// it means building a new operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub name: String,
    pub downsample: f64,
    pub calibration: PixelCalibration,
}

impl Resolution {
    pub fn new(
        name: impl Into<String>,
        base: &PixelCalibration,
        downsample: f64,
    ) -> Result<Self, ResolutionError> {
        if !downsample.is_finite() || downsample <= 0.0 {
            return Err(ResolutionError::InvalidScale(downsample));
        }
        Ok(Self {
            name: name.into(),
            downsample,
            calibration: base.scaled(downsample),
        })
    }

    /// Full resolution of an image with the given calibration.
    pub fn full(base: &PixelCalibration) -> Self {
        Self {
            name: DEFAULT_LADDER[0].0.to_string(),
            downsample: 1.0,
            calibration: base.clone(),
        }
    }

    /// The default ladder of resolutions, finest first.
    pub fn defaults(base: &PixelCalibration) -> Vec<Self> {
        DEFAULT_LADDER
            .iter()
            .map(|(name, downsample)| Self {
                name: (*name).to_string(),
                downsample: *downsample,
                calibration: base.scaled(*downsample),
            })
            .collect()
    }

    /// Custom resolution requested by pixel size in the base calibration's units.
    ///
    /// Uncalibrated images interpret `value` as a downsample factor.
    pub fn custom(base: &PixelCalibration, value: f64) -> Result<Self, ResolutionError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ResolutionError::InvalidScale(value));
        }
        let downsample = if base.is_calibrated() {
            value / base.averaged_pixel_size()
        } else {
            value
        };
        Self::new("Custom", base, downsample)
    }

    pub fn pixel_size(&self) -> f64 {
        self.calibration.averaged_pixel_size()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.calibration.is_calibrated() {
            write!(
                f,
                "{} ({:.2} {}/px)",
                self.name,
                self.pixel_size(),
                self.calibration.units
            )
        } else {
            write!(f, "{} (downsample = {:.2})", self.name, self.downsample)
        }
    }
}

/// Insert a resolution keeping the list sorted by pixel size.
pub fn insert_sorted(resolutions: &mut Vec<Resolution>, resolution: Resolution) -> usize {
    let idx = resolutions
        .iter()
        .position(|existing| existing.pixel_size() > resolution.pixel_size())
        .unwrap_or(resolutions.len());
    resolutions.insert(idx, resolution);
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ladder_scales_calibration() {
        let base = PixelCalibration::microns(0.25);
        let ladder = Resolution::defaults(&base);
        assert_eq!(ladder.len(), 7);
        assert_eq!(ladder[2].name, "High");
        assert!((ladder[2].pixel_size() - 1.0).abs() < 1e-12);
        assert_eq!(ladder[2].to_string(), "High (1.00 µm/px)");
    }

    #[test]
    fn custom_resolution_uses_units_when_calibrated() {
        let base = PixelCalibration::microns(0.5);
        let custom = Resolution::custom(&base, 2.0).unwrap();
        assert!((custom.downsample - 4.0).abs() < 1e-12);

        let plain = Resolution::custom(&PixelCalibration::uncalibrated(), 3.0).unwrap();
        assert!((plain.downsample - 3.0).abs() < 1e-12);
        assert_eq!(plain.to_string(), "Custom (downsample = 3.00)");
    }

    #[test]
    fn rejects_non_positive_scale() {
        let base = PixelCalibration::uncalibrated();
        assert_eq!(
            Resolution::custom(&base, 0.0),
            Err(ResolutionError::InvalidScale(0.0))
        );
    }

    #[test]
    fn insert_keeps_pixel_size_order() {
        let base = PixelCalibration::uncalibrated();
        let mut list = Resolution::defaults(&base);
        let idx = insert_sorted(&mut list, Resolution::custom(&base, 3.0).unwrap());
        assert_eq!(idx, 2);
        let sizes: Vec<f64> = list.iter().map(Resolution::pixel_size).collect();
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
    }
}
