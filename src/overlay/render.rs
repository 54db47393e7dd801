use image::{Rgba, RgbaImage};

use super::TileComputer;
use crate::imaging::PixelBuffer;
use crate::training::{ChannelType, TrainedModel};

/// Paint a computed tile as an RGBA image.
///
/// `range` only matters for feature tiles.
pub fn render_tile(
    computer: &TileComputer,
    tile: &PixelBuffer,
    opacity: f32,
    range: (f32, f32),
) -> RgbaImage {
    match computer {
        TileComputer::Classification(model) => render_prediction(model, tile, opacity),
        TileComputer::Feature { .. } => render_feature(tile, range, opacity),
    }
}

fn alpha(opacity: f32) -> u8 {
    (opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn render_prediction(model: &TrainedModel, tile: &PixelBuffer, opacity: f32) -> RgbaImage {
    let (rows, cols, _) = tile.dim();
    let colors: Vec<[u8; 3]> = model.metadata.classes.iter().map(|c| c.color).collect();
    let a = alpha(opacity);
    RgbaImage::from_fn(cols as u32, rows as u32, |x, y| {
        let px = tile.slice(ndarray::s![y as usize, x as usize, ..]);
        if px[0].is_nan() {
            return Rgba([0, 0, 0, 0]);
        }
        match model.metadata.channel_type {
            ChannelType::Classification => {
                let label = px[0].max(0.0) as usize;
                match colors.get(label) {
                    Some(&[r, g, b]) => Rgba([r, g, b, a]),
                    None => Rgba([0, 0, 0, 0]),
                }
            }
            ChannelType::Probability => {
                let mut mixed = [0.0f32; 3];
                for (p, color) in px.iter().zip(&colors) {
                    for (slot, channel) in mixed.iter_mut().zip(color) {
                        *slot += p * *channel as f32;
                    }
                }
                let [r, g, b] = mixed.map(|v| v.round().clamp(0.0, 255.0) as u8);
                Rgba([r, g, b, a])
            }
        }
    })
}

pub fn render_feature(tile: &PixelBuffer, range: (f32, f32), opacity: f32) -> RgbaImage {
    let (rows, cols, _) = tile.dim();
    let (min, max) = range;
    let span = if max > min { max - min } else { 1.0 };
    let a = alpha(opacity);
    RgbaImage::from_fn(cols as u32, rows as u32, |x, y| {
        let v = tile[[y as usize, x as usize, 0]];
        if v.is_nan() {
            return Rgba([0, 0, 0, 0]);
        }
        let gray = (((v - min) / span).clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([gray, gray, gray, a])
    })
}

/// Min/max over finite values of a set of feature tiles.
pub fn auto_range<'a, I>(tiles: I) -> Option<(f32, f32)>
where
    I: IntoIterator<Item = &'a PixelBuffer>,
{
    let mut range: Option<(f32, f32)> = None;
    for tile in tiles {
        for &v in tile.iter().filter(|v| v.is_finite()) {
            range = Some(match range {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            });
        }
    }
    range.map(|(lo, hi)| if hi > lo { (lo, hi) } else { (lo, lo + 1.0) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn feature_tiles_map_range_to_gray() {
        let tile = Array3::from_shape_vec((1, 3, 1), vec![0.0, 5.0, 20.0]).unwrap();
        let img = render_feature(&tile, (0.0, 10.0), 0.5);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 128]);
        assert_eq!(img.get_pixel(1, 0).0[0], 128);
        assert_eq!(img.get_pixel(2, 0).0[0], 255);
        let outside = Array3::from_elem((1, 1, 1), f32::NAN);
        assert_eq!(render_feature(&outside, (0.0, 1.0), 1.0).get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn auto_range_skips_non_finite_values() {
        let a = Array3::from_shape_vec((1, 2, 1), vec![1.0, f32::NAN]).unwrap();
        let b = Array3::from_shape_vec((1, 2, 1), vec![-2.0, 4.0]).unwrap();
        assert_eq!(auto_range([&a, &b]), Some((-2.0, 4.0)));
        let flat = Array3::from_elem((1, 1, 1), 3.0);
        assert_eq!(auto_range([&flat]), Some((3.0, 4.0)));
        assert_eq!(auto_range(std::iter::empty()), None);
    }
}
