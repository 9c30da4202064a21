use crate::overlay::{EffectiveOverlay, ViewerId};
use lru::LruCache;
use mirage_common::ChunkPos;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Bounded cache of resolved per-chunk overlay maps, keyed per viewer.
/// Entries must never be observed after a write touching their chunk;
/// every overlay mutation calls [`invalidate`](Self::invalidate). The
/// mutex gives the check-then-insert the atomicity worker races need.
#[derive(Debug)]
pub struct ResultCache {
    inner: Mutex<LruCache<(ViewerId, ChunkPos), Arc<EffectiveOverlay>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Returns the cached overlay for (viewer, chunk), or computes,
    /// inserts and returns it. The compute closure runs under the lock so
    /// two racing callers cannot both synthesize.
    pub fn get_or_insert_with<F>(
        &self,
        viewer: ViewerId,
        chunk: ChunkPos,
        compute: F,
    ) -> Arc<EffectiveOverlay>
    where
        F: FnOnce() -> EffectiveOverlay,
    {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.get(&(viewer, chunk)) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(cached);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let fresh = Arc::new(compute());
        cache.put((viewer, chunk), Arc::clone(&fresh));
        fresh
    }

    /// Drops the entry for one (viewer, chunk), if present.
    pub fn invalidate(&self, viewer: ViewerId, chunk: ChunkPos) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if cache.pop(&(viewer, chunk)).is_some() {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drops every entry belonging to a viewer.
    pub fn evict_viewer(&self, viewer: ViewerId) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let keys: Vec<_> = cache
            .iter()
            .map(|(key, _)| *key)
            .filter(|(v, _)| *v == viewer)
            .collect();
        for key in &keys {
            cache.pop(key);
        }
        self.invalidations
            .fetch_add(keys.len() as u64, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses, invalidations) since construction.
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.invalidations.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirage_common::{BlockPos, BlockState};
    use uuid::Uuid;

    fn overlay_with(pos: BlockPos, state: BlockState) -> EffectiveOverlay {
        let mut map = EffectiveOverlay::new();
        map.insert(pos, state);
        map
    }

    #[test]
    fn caches_until_invalidated() {
        let cache = ResultCache::new(8);
        let viewer = Uuid::new_v4();
        let chunk = ChunkPos::new(0, 0);
        let pos = BlockPos::new(1, 64, 1);

        let first = cache.get_or_insert_with(viewer, chunk, || {
            overlay_with(pos, BlockState::new(1, 0))
        });
        // Second read must not recompute.
        let second =
            cache.get_or_insert_with(viewer, chunk, || panic!("must not recompute"));
        assert!(Arc::ptr_eq(&first, &second));

        // After a write the old entry must never be returned.
        cache.invalidate(viewer, chunk);
        let third = cache.get_or_insert_with(viewer, chunk, || {
            overlay_with(pos, BlockState::new(2, 0))
        });
        assert_eq!(third[&pos], BlockState::new(2, 0));
    }

    #[test]
    fn lru_pressure_evicts_oldest() {
        let cache = ResultCache::new(2);
        let viewer = Uuid::new_v4();
        for x in 0..3 {
            cache.get_or_insert_with(viewer, ChunkPos::new(x, 0), EffectiveOverlay::new);
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn evict_viewer_leaves_others_alone() {
        let cache = ResultCache::new(8);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let chunk = ChunkPos::new(0, 0);

        cache.get_or_insert_with(a, chunk, EffectiveOverlay::new);
        cache.get_or_insert_with(b, chunk, EffectiveOverlay::new);

        cache.evict_viewer(a);
        assert_eq!(cache.len(), 1);
        cache.get_or_insert_with(b, chunk, || panic!("b's entry must survive"));
    }
}
