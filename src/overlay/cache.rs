use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;

use super::TileKey;
use crate::imaging::PixelBuffer;

/// Identity of whatever produces tile pixels (a model or a feature channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputerId(pub(crate) blake3::Hash);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tile: TileKey,
    pub generation: u64,
    pub computer: ComputerId,
}

/// LRU of computed tiles, shared by every overlay of a session.
///
/// Keys carry the producer and generation, so overlays never read each
/// other's tiles and superseded generations are never served.
#[derive(Clone)]
pub struct TileCache {
    inner: Arc<Mutex<LruCache<CacheKey, Arc<PixelBuffer>>>>,
}

impl TileCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, Arc<PixelBuffer>>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<PixelBuffer>> {
        self.lock().get(key).cloned()
    }

    pub fn peek(&self, key: &CacheKey) -> Option<Arc<PixelBuffer>> {
        self.lock().peek(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, tile: Arc<PixelBuffer>) {
        self.lock().put(key, tile);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().contains(key)
    }

    /// Drop every tile of `computer` not computed at `generation`.
    pub fn purge_stale(&self, computer: ComputerId, generation: u64) -> usize {
        let mut cache = self.lock();
        let stale: Vec<CacheKey> = cache
            .iter()
            .map(|(key, _)| *key)
            .filter(|key| key.computer == computer && key.generation != generation)
            .collect();
        for key in &stale {
            cache.pop(key);
        }
        stale.len()
    }

    /// Drop every tile of `computer`.
    pub fn purge_computer(&self, computer: ComputerId) -> usize {
        let mut cache = self.lock();
        let keys: Vec<CacheKey> = cache
            .iter()
            .map(|(key, _)| *key)
            .filter(|key| key.computer == computer)
            .collect();
        for key in &keys {
            cache.pop(key);
        }
        keys.len()
    }

    /// Tiles currently held for `computer` at `generation`.
    pub fn tiles_for(&self, computer: ComputerId, generation: u64) -> Vec<(TileKey, Arc<PixelBuffer>)> {
        self.lock()
            .iter()
            .filter(|(key, _)| key.computer == computer && key.generation == generation)
            .map(|(key, tile)| (key.tile, Arc::clone(tile)))
            .collect()
    }

    /// Generations present in the cache for `computer`.
    pub fn generations_for(&self, computer: ComputerId) -> Vec<u64> {
        let mut generations: Vec<u64> = self
            .lock()
            .iter()
            .filter(|(key, _)| key.computer == computer)
            .map(|(key, _)| key.generation)
            .collect();
        generations.sort_unstable();
        generations.dedup();
        generations
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn computer(tag: &[u8]) -> ComputerId {
        ComputerId(blake3::hash(tag))
    }

    fn key(x: i64, generation: u64, computer: ComputerId) -> CacheKey {
        CacheKey {
            tile: TileKey::new(0, x, 0),
            generation,
            computer,
        }
    }

    fn tile() -> Arc<PixelBuffer> {
        Arc::new(Array3::zeros((1, 1, 1)))
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = TileCache::new(2);
        let c = computer(b"a");
        cache.insert(key(0, 1, c), tile());
        cache.insert(key(1, 1, c), tile());
        assert!(cache.get(&key(0, 1, c)).is_some());
        cache.insert(key(2, 1, c), tile());
        assert!(cache.contains(&key(0, 1, c)));
        assert!(!cache.contains(&key(1, 1, c)));
    }

    #[test]
    fn purge_only_touches_one_computer() {
        let cache = TileCache::new(8);
        let (a, b) = (computer(b"a"), computer(b"b"));
        cache.insert(key(0, 1, a), tile());
        cache.insert(key(0, 2, a), tile());
        cache.insert(key(0, 1, b), tile());
        assert_eq!(cache.purge_stale(a, 2), 1);
        assert_eq!(cache.generations_for(a), vec![2]);
        assert_eq!(cache.generations_for(b), vec![1]);
        assert_eq!(cache.tiles_for(a, 2).len(), 1);
        assert_eq!(cache.purge_computer(b), 1);
        assert_eq!(cache.len(), 1);
    }
}
