use serde::{Deserialize, Serialize};

use crate::imaging::{Rect, RegionRequest};

/// Address of one overlay tile.
///
/// Level 0 is the classifier's own resolution; every level above halves it,
/// up to [`TileGrid::MAX_LEVEL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub level: u32,
    pub x: i64,
    pub y: i64,
    pub z: usize,
    pub t: usize,
}

impl TileKey {
    pub fn new(level: u32, x: i64, y: i64) -> Self {
        Self {
            level,
            x,
            y,
            z: 0,
            t: 0,
        }
    }
}

/// Square tiling of the image anchored at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    pub base_downsample: f64,
    pub tile_size: usize,
}

impl TileGrid {
    /// Coarsest pyramid level; each level costs four tiles of the one below.
    pub const MAX_LEVEL: u32 = 8;

    pub fn new(base_downsample: f64, tile_size: usize) -> Self {
        Self {
            base_downsample,
            tile_size: tile_size.max(1),
        }
    }

    /// Base pixels per output pixel at `level`.
    pub fn stride(&self, level: u32) -> usize {
        1usize << level.min(Self::MAX_LEVEL)
    }

    pub fn level_downsample(&self, level: u32) -> f64 {
        self.base_downsample * self.stride(level) as f64
    }

    /// Coarsest level not coarser than the viewer's downsample.
    pub fn level_for_downsample(&self, downsample: f64) -> u32 {
        let mut level = 0;
        while level < Self::MAX_LEVEL && self.level_downsample(level + 1) <= downsample {
            level += 1;
        }
        level
    }

    /// Full-resolution area covered by a tile.
    pub fn tile_bounds(&self, key: &TileKey) -> Rect {
        let side = self.tile_size as f64 * self.level_downsample(key.level);
        Rect::new(key.x as f64 * side, key.y as f64 * side, side, side)
    }

    /// The four tiles one level finer that make up `key`, row by row.
    ///
    /// Level 0 tiles have no children.
    pub fn children(&self, key: &TileKey) -> Option<[TileKey; 4]> {
        let level = key.level.checked_sub(1)?;
        let child = |dx: i64, dy: i64| TileKey {
            level,
            x: key.x * 2 + dx,
            y: key.y * 2 + dy,
            ..*key
        };
        Some([child(0, 0), child(1, 0), child(0, 1), child(1, 1)])
    }

    /// Request at the base resolution covering the whole tile.
    ///
    /// Only level 0 tiles are read this way; coarser tiles are merged from
    /// their children.
    pub fn base_request(&self, key: &TileKey) -> RegionRequest {
        let span = self.tile_size * self.stride(key.level);
        RegionRequest::from_grid(
            self.base_downsample,
            key.x * span as i64,
            key.y * span as i64,
            span,
            span,
            key.z,
            key.t,
        )
    }

    /// Tile containing a full-resolution point.
    pub fn tile_at(&self, level: u32, x: f64, y: f64, z: usize, t: usize) -> TileKey {
        let side = self.tile_size as f64 * self.level_downsample(level);
        TileKey {
            level,
            x: (x / side).floor() as i64,
            y: (y / side).floor() as i64,
            z,
            t,
        }
    }

    /// Every tile at `level` intersecting `region`.
    pub fn tiles_in(&self, level: u32, region: &Rect, z: usize, t: usize) -> Vec<TileKey> {
        if region.is_empty() {
            return Vec::new();
        }
        let side = self.tile_size as f64 * self.level_downsample(level);
        let x0 = (region.x / side).floor() as i64;
        let y0 = (region.y / side).floor() as i64;
        let x1 = (region.max_x() / side).ceil() as i64;
        let y1 = (region.max_y() / side).ceil() as i64;
        let mut keys = Vec::new();
        for y in y0..y1 {
            for x in x0..x1 {
                keys.push(TileKey {
                    level,
                    x,
                    y,
                    z,
                    t,
                });
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_double_the_downsample() {
        let grid = TileGrid::new(2.0, 256);
        assert_eq!(grid.level_downsample(0), 2.0);
        assert_eq!(grid.level_downsample(3), 16.0);
        assert_eq!(grid.level_for_downsample(1.0), 0);
        assert_eq!(grid.level_for_downsample(9.0), 2);
    }

    #[test]
    fn tile_bounds_and_lookup_agree() {
        let grid = TileGrid::new(1.0, 64);
        let key = grid.tile_at(1, 130.0, 10.0, 0, 0);
        assert_eq!(key, TileKey::new(1, 1, 0));
        assert_eq!(grid.tile_bounds(&key), Rect::new(128.0, 0.0, 128.0, 128.0));
        let request = grid.base_request(&key);
        assert_eq!(request.output_width(), 128);
        assert_eq!(request.x, 128.0);
    }

    #[test]
    fn children_tile_their_parent() {
        let grid = TileGrid::new(1.0, 16);
        let parent = TileKey::new(2, 1, 3);
        let children = grid.children(&parent).unwrap();
        assert_eq!(children[0], TileKey::new(1, 2, 6));
        assert_eq!(children[3], TileKey::new(1, 3, 7));
        let bounds = grid.tile_bounds(&parent);
        let union = children
            .iter()
            .map(|child| grid.tile_bounds(child))
            .reduce(|a, b| a.union(&b))
            .unwrap();
        assert_eq!(union, bounds);
        assert!(grid.children(&TileKey::new(0, 0, 0)).is_none());
        assert_eq!(grid.level_for_downsample(1e9), TileGrid::MAX_LEVEL);
    }

    #[test]
    fn tiles_cover_region() {
        let grid = TileGrid::new(1.0, 100);
        let tiles = grid.tiles_in(0, &Rect::new(50.0, 50.0, 100.0, 20.0), 0, 0);
        assert_eq!(tiles, vec![TileKey::new(0, 0, 0), TileKey::new(0, 1, 0)]);
    }
}
