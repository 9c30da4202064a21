use mirage_common::BlockState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Memoizes the protocol-encoded form of block states. The distinct states
/// a server uses are finite and reused heavily, so entries are append-only
/// for the process lifetime. Safe for concurrent insert-if-absent from
/// worker threads.
#[derive(Debug, Default)]
pub struct BinaryStateCache {
    map: RwLock<HashMap<BlockState, u32>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BinaryStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded global id for a state, computed at most once per value.
    pub fn encode(&self, state: BlockState) -> u32 {
        if let Some(&id) = self.map.read().unwrap_or_else(|e| e.into_inner()).get(&state) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return id;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let mut map = self.map.write().unwrap_or_else(|e| e.into_inner());
        // Another thread may have won the race between the read and the
        // write lock.
        *map.entry(state).or_insert_with(|| state.global_id())
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since construction.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
