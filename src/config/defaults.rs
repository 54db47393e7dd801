use crate::overlay::{DEFAULT_CACHE_TILES, DEFAULT_TILE_SIZE};
use crate::training::{DEFAULT_MAX_SAMPLES, DEFAULT_RNG_SEED};

pub(super) const MAX_TILE_WORKER_COUNT: u32 = 64;
pub(super) const MIN_TILE_SIZE: usize = 32;
pub(super) const MAX_TILE_SIZE: usize = 2048;
pub(super) const MAX_DOWNSAMPLE: f64 = 1024.0;

pub(super) fn default_max_samples() -> usize {
    DEFAULT_MAX_SAMPLES
}

pub(super) fn default_rng_seed() -> u64 {
    DEFAULT_RNG_SEED
}

pub(super) fn default_downsample() -> f64 {
    4.0
}

pub(super) fn default_false() -> bool {
    false
}

pub(super) fn default_tile_size() -> usize {
    DEFAULT_TILE_SIZE
}

pub(super) fn default_cache_tiles() -> usize {
    DEFAULT_CACHE_TILES
}

pub(super) fn default_worker_count() -> u32 {
    0
}

pub(super) fn default_log_filter() -> String {
    "warn,pixclass=info".to_string()
}

pub(super) fn default_kept_logs() -> usize {
    10
}

pub(super) fn default_opacity() -> f32 {
    1.0
}

pub(super) fn clamp_downsample(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(1.0, MAX_DOWNSAMPLE)
    } else {
        default_downsample()
    }
}

pub(super) fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        default_opacity()
    }
}
