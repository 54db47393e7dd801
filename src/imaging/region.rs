use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in full-resolution image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Smallest rectangle covering every point, or `None` for an empty slice.
    pub fn bounding(points: &[(f64, f64)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (mut min_x, mut min_y) = *first;
        let (mut max_x, mut max_y) = *first;
        for &(x, y) in rest {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.max_x() && y >= self.y && y < self.max_y()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.max_x()
            && other.x < self.max_x()
            && self.y < other.max_y()
            && other.y < self.max_y()
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(
            x,
            y,
            self.max_x().max(other.max_x()) - x,
            self.max_y().max(other.max_y()) - y,
        )
    }
}

/// A request for pixels covering a full-resolution rectangle at a downsample.
///
/// Output pixel `(row, col)` averages the full-resolution box starting at
/// `(x + col * downsample, y + row * downsample)` with side `downsample`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionRequest {
    pub downsample: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub z: usize,
    pub t: usize,
}

impl RegionRequest {
    /// Request addressed in whole pixels of the downsampled grid.
    pub fn from_grid(
        downsample: f64,
        col: i64,
        row: i64,
        cols: usize,
        rows: usize,
        z: usize,
        t: usize,
    ) -> Self {
        Self {
            downsample,
            x: col as f64 * downsample,
            y: row as f64 * downsample,
            width: cols as f64 * downsample,
            height: rows as f64 * downsample,
            z,
            t,
        }
    }

    pub fn output_width(&self) -> usize {
        grid_len(self.width, self.downsample)
    }

    pub fn output_height(&self) -> usize {
        grid_len(self.height, self.downsample)
    }

    pub fn is_empty(&self) -> bool {
        self.output_width() == 0 || self.output_height() == 0
    }

    /// Grow the request by `pixels` downsampled pixels on every side.
    pub fn padded(&self, pixels: usize) -> Self {
        let pad = pixels as f64 * self.downsample;
        Self {
            x: self.x - pad,
            y: self.y - pad,
            width: self.width + 2.0 * pad,
            height: self.height + 2.0 * pad,
            ..*self
        }
    }

    /// Full-resolution coordinates of the center of an output pixel.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.x + (col as f64 + 0.5) * self.downsample,
            self.y + (row as f64 + 0.5) * self.downsample,
        )
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

fn grid_len(extent: f64, downsample: f64) -> usize {
    if downsample <= 0.0 || extent <= 0.0 {
        return 0;
    }
    // Guard against 511.9999 style rounding when extent is an exact multiple.
    (extent / downsample - 1e-9).ceil().max(0.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_requests_round_trip_output_size() {
        let req = RegionRequest::from_grid(4.0, 2, 3, 10, 7, 0, 0);
        assert_eq!(req.x, 8.0);
        assert_eq!(req.output_width(), 10);
        assert_eq!(req.output_height(), 7);
        let padded = req.padded(2);
        assert_eq!(padded.output_width(), 14);
        assert_eq!(padded.x, 0.0);
    }

    #[test]
    fn partial_pixels_round_up() {
        let req = RegionRequest {
            downsample: 2.0,
            x: 0.0,
            y: 0.0,
            width: 5.0,
            height: 4.0,
            z: 0,
            t: 0,
        };
        assert_eq!(req.output_width(), 3);
        assert_eq!(req.output_height(), 2);
        assert_eq!(req.pixel_center(1, 0), (3.0, 1.0));
    }

    #[test]
    fn rect_intersection_is_half_open() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 5.0, 5.0);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&Rect::new(9.0, 9.0, 5.0, 5.0)));
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 15.0, 10.0));
    }

    #[test]
    fn bounding_of_points() {
        assert!(Rect::bounding(&[]).is_none());
        let rect = Rect::bounding(&[(1.0, 5.0), (4.0, 2.0)]).unwrap();
        assert_eq!(rect, Rect::new(1.0, 2.0, 3.0, 3.0));
    }
}
