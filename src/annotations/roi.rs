use serde::{Deserialize, Serialize};

use crate::imaging::Rect;

const ELLIPSE_SEGMENTS: usize = 128;

/// Region of interest in full-resolution image coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Roi {
    Rectangle {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    /// Ellipse inscribed in the given bounding box.
    Ellipse {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    Polygon { points: Vec<(f64, f64)> },
}

impl Roi {
    pub fn rectangle(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::Rectangle {
            x,
            y,
            width,
            height,
        }
    }

    pub fn ellipse(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::Ellipse {
            x,
            y,
            width,
            height,
        }
    }

    pub fn polygon(points: Vec<(f64, f64)>) -> Self {
        Self::Polygon { points }
    }

    pub fn bounds(&self) -> Rect {
        match self {
            Roi::Rectangle {
                x,
                y,
                width,
                height,
            }
            | Roi::Ellipse {
                x,
                y,
                width,
                height,
            } => Rect::new(*x, *y, *width, *height),
            Roi::Polygon { points } => {
                Rect::bounding(points).unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Roi::Polygon { points } => points.len() < 3,
            _ => self.bounds().is_empty(),
        }
    }

    /// Whether a point lies inside the shape.
    ///
    /// Rectangles are half-open so adjacent rectangles never share a pixel center.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        match self {
            Roi::Rectangle { .. } => self.bounds().contains(px, py),
            Roi::Ellipse {
                x,
                y,
                width,
                height,
            } => {
                if *width <= 0.0 || *height <= 0.0 {
                    return false;
                }
                let (rx, ry) = (width / 2.0, height / 2.0);
                let dx = (px - (x + rx)) / rx;
                let dy = (py - (y + ry)) / ry;
                dx * dx + dy * dy <= 1.0
            }
            Roi::Polygon { points } => polygon_contains(points, px, py),
        }
    }

    /// Outline vertices; ellipses are approximated by a fine polygon.
    pub fn outline(&self) -> Vec<(f64, f64)> {
        match self {
            Roi::Rectangle {
                x,
                y,
                width,
                height,
            } => vec![
                (*x, *y),
                (x + width, *y),
                (x + width, y + height),
                (*x, y + height),
            ],
            Roi::Ellipse {
                x,
                y,
                width,
                height,
            } => {
                let (rx, ry) = (width / 2.0, height / 2.0);
                let (cx, cy) = (x + rx, y + ry);
                (0..ELLIPSE_SEGMENTS)
                    .map(|i| {
                        let theta = i as f64 / ELLIPSE_SEGMENTS as f64 * std::f64::consts::TAU;
                        (cx + rx * theta.cos(), cy + ry * theta.sin())
                    })
                    .collect()
            }
            Roi::Polygon { points } => points.clone(),
        }
    }

    /// Shortest distance from a point to the shape's outline.
    pub fn boundary_distance(&self, px: f64, py: f64) -> f64 {
        let outline = self.outline();
        if outline.is_empty() {
            return f64::INFINITY;
        }
        let n = outline.len();
        (0..n)
            .map(|i| segment_distance(outline[i], outline[(i + 1) % n], (px, py)))
            .fold(f64::INFINITY, f64::min)
    }
}

fn polygon_contains(points: &[(f64, f64)], px: f64, py: f64) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (xi, yi) = points[i];
        let (xj, yj) = points[j];
        if (yi > py) != (yj > py) {
            let x_cross = xi + (py - yi) * (xj - xi) / (yj - yi);
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn segment_distance(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}
