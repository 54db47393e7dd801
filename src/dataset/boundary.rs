use std::fmt;

use serde::{Deserialize, Serialize};

use crate::annotations::PathClass;

/// How pixels close to an annotation outline are used for training.
///
/// Thickness is measured in pixels at the working resolution; a thickness of
/// zero disables the band entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoundaryStrategy {
    /// Drop band pixels.
    Skip { thickness: f64 },
    /// Label band pixels with the synthetic boundary class.
    DerivedThickness { thickness: f64 },
    /// Label band pixels with a user class.
    ClassifyAs { class: PathClass, thickness: f64 },
}

/// What happens to a pixel inside the boundary band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BandLabel {
    Drop,
    Relabel(PathClass),
}

impl BoundaryStrategy {
    pub fn thickness(&self) -> f64 {
        match self {
            BoundaryStrategy::Skip { thickness }
            | BoundaryStrategy::DerivedThickness { thickness }
            | BoundaryStrategy::ClassifyAs { thickness, .. } => *thickness,
        }
    }

    /// Same strategy with a different band thickness.
    pub fn with_thickness(&self, thickness: f64) -> Self {
        let thickness = thickness.max(0.0);
        match self {
            BoundaryStrategy::Skip { .. } => BoundaryStrategy::Skip { thickness },
            BoundaryStrategy::DerivedThickness { .. } => {
                BoundaryStrategy::DerivedThickness { thickness }
            }
            BoundaryStrategy::ClassifyAs { class, .. } => BoundaryStrategy::ClassifyAs {
                class: class.clone(),
                thickness,
            },
        }
    }

    /// Whether a pixel at `distance` working-resolution pixels from the
    /// outline falls inside the band.
    pub fn in_band(&self, distance: f64) -> bool {
        let thickness = self.thickness();
        thickness > 0.0 && distance < thickness
    }

    pub fn band_label(&self) -> BandLabel {
        match self {
            BoundaryStrategy::Skip { .. } => BandLabel::Drop,
            BoundaryStrategy::DerivedThickness { .. } => BandLabel::Relabel(PathClass::boundary()),
            BoundaryStrategy::ClassifyAs { class, .. } => BandLabel::Relabel(class.clone()),
        }
    }
}

impl Default for BoundaryStrategy {
    fn default() -> Self {
        BoundaryStrategy::Skip { thickness: 1.0 }
    }
}

impl fmt::Display for BoundaryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryStrategy::Skip { .. } => f.write_str("Skip boundary"),
            BoundaryStrategy::DerivedThickness { .. } => f.write_str("Derived boundary"),
            BoundaryStrategy::ClassifyAs { class, .. } => write!(f, "Classify as {class}"),
        }
    }
}
