use mirage_common::{BlockPos, BlockState, ChunkPos};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub type ViewerId = Uuid;

/// The resolved `position -> block` view of one chunk's overlay for one
/// viewer, as consumed by the synthesizer.
pub type EffectiveOverlay = HashMap<BlockPos, BlockState>;

/// One layer's claim on a position. The effective value at a position is
/// the contribution with the highest priority; ties go to the most recent
/// merge. Keeping the full stack means unmerging any layer restores
/// whatever the surviving layers still claim, instead of last-write-wins
/// clearing a live layer's block.
#[derive(Debug, Clone)]
struct Contribution {
    layer: String,
    priority: i32,
    seq: u64,
    value: BlockState,
}

#[derive(Debug, Default)]
struct ChunkOverlay {
    positions: HashMap<BlockPos, Vec<Contribution>>,
}

impl ChunkOverlay {
    fn effective(&self) -> EffectiveOverlay {
        self.positions
            .iter()
            .filter_map(|(pos, stack)| {
                stack
                    .iter()
                    .max_by_key(|c| (c.priority, c.seq))
                    .map(|c| (*pos, c.value))
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct ViewerOverlay {
    chunks: HashMap<ChunkPos, ChunkOverlay>,
    /// Provenance: layer -> chunk -> positions that layer contributed.
    /// Invariant: the union over all layers equals the overlay's keys for
    /// each chunk.
    provenance: HashMap<String, HashMap<ChunkPos, HashSet<BlockPos>>>,
}

/// Per-viewer block override bookkeeping. Mutating calls must come from
/// the host main loop (single-writer discipline); the lock is there so
/// mid-flight reads from worker callbacks stay defined.
#[derive(Debug, Default)]
pub struct OverlayCache {
    viewers: RwLock<HashMap<ViewerId, ViewerOverlay>>,
    seq: AtomicU64,
}

impl OverlayCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocates empty overlay state for a viewer. No-op if present.
    pub fn init_viewer(&self, viewer: ViewerId) {
        let mut viewers = self.viewers.write().unwrap_or_else(|e| e.into_inner());
        viewers.entry(viewer).or_default();
    }

    /// Tears down all per-viewer state. Returns the chunks that carried
    /// overrides so the caller can evict derived caches. No-op on an
    /// unknown viewer.
    pub fn drop_viewer(&self, viewer: ViewerId) -> Vec<ChunkPos> {
        let mut viewers = self.viewers.write().unwrap_or_else(|e| e.into_inner());
        match viewers.remove(&viewer) {
            Some(state) => state.chunks.keys().copied().collect(),
            None => Vec::new(),
        }
    }

    pub fn viewer_known(&self, viewer: ViewerId) -> bool {
        self.viewers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&viewer)
    }

    /// Merges a layer's contributions for a viewer. Re-merging an existing
    /// layer updates both its values and its priority. Returns the chunks
    /// whose effective overlay actually changed (identical re-merges
    /// change nothing). Unknown viewer is a no-op.
    pub fn merge_layer(
        &self,
        viewer: ViewerId,
        layer: &str,
        priority: i32,
        contributions: &HashMap<ChunkPos, HashMap<BlockPos, BlockState>>,
    ) -> Vec<ChunkPos> {
        let mut viewers = self.viewers.write().unwrap_or_else(|e| e.into_inner());
        let Some(state) = viewers.get_mut(&viewer) else {
            return Vec::new();
        };

        let mut touched = Vec::new();
        for (chunk, positions) in contributions {
            let mut chunk_changed = false;
            let chunk_overlay = state.chunks.entry(*chunk).or_default();

            for (pos, value) in positions {
                debug_assert_eq!(pos.chunk(), *chunk, "contribution keyed to wrong chunk");
                let stack = chunk_overlay.positions.entry(*pos).or_default();
                match stack.iter_mut().find(|c| c.layer == layer) {
                    Some(existing)
                        if existing.value == *value && existing.priority == priority => {}
                    Some(existing) => {
                        existing.value = *value;
                        existing.priority = priority;
                        existing.seq = self.next_seq();
                        chunk_changed = true;
                    }
                    None => {
                        stack.push(Contribution {
                            layer: layer.to_owned(),
                            priority,
                            seq: self.next_seq(),
                            value: *value,
                        });
                        chunk_changed = true;
                    }
                }

                state
                    .provenance
                    .entry(layer.to_owned())
                    .or_default()
                    .entry(*chunk)
                    .or_default()
                    .insert(*pos);
            }

            if chunk_changed {
                touched.push(*chunk);
            }
        }

        debug!(%viewer, layer, chunks = touched.len(), "merged layer");
        touched
    }

    /// Removes exactly one layer's contributions. A position another layer
    /// still claims keeps that layer's value. Returns chunks whose
    /// effective overlay changed.
    pub fn unmerge_layer(&self, viewer: ViewerId, layer: &str) -> Vec<ChunkPos> {
        let mut viewers = self.viewers.write().unwrap_or_else(|e| e.into_inner());
        let Some(state) = viewers.get_mut(&viewer) else {
            return Vec::new();
        };
        let Some(owned) = state.provenance.remove(layer) else {
            return Vec::new();
        };

        let mut touched = Vec::new();
        for (chunk, positions) in owned {
            let Some(chunk_overlay) = state.chunks.get_mut(&chunk) else {
                continue;
            };
            let mut chunk_changed = false;
            for pos in positions {
                if let Some(stack) = chunk_overlay.positions.get_mut(&pos) {
                    let before = stack.len();
                    stack.retain(|c| c.layer != layer);
                    if stack.len() != before {
                        chunk_changed = true;
                    }
                    if stack.is_empty() {
                        chunk_overlay.positions.remove(&pos);
                    }
                }
            }
            // Empty inner maps are pruned immediately.
            if chunk_overlay.positions.is_empty() {
                state.chunks.remove(&chunk);
            }
            if chunk_changed {
                touched.push(chunk);
            }
        }

        debug!(%viewer, layer, chunks = touched.len(), "unmerged layer");
        touched
    }

    /// Single-position incremental update: add/update when `value` is
    /// present, remove the layer's claim when it is `None`. Returns the
    /// owning chunk when the effective overlay changed.
    pub fn apply_point_change(
        &self,
        viewer: ViewerId,
        layer: &str,
        priority: i32,
        pos: BlockPos,
        value: Option<BlockState>,
    ) -> Option<ChunkPos> {
        let chunk = pos.chunk();
        match value {
            Some(value) => {
                let mut contributions = HashMap::new();
                let mut positions = HashMap::new();
                positions.insert(pos, value);
                contributions.insert(chunk, positions);
                self.merge_layer(viewer, layer, priority, &contributions)
                    .into_iter()
                    .next()
            }
            None => {
                let mut viewers = self.viewers.write().unwrap_or_else(|e| e.into_inner());
                let state = viewers.get_mut(&viewer)?;

                let owned = state
                    .provenance
                    .get_mut(layer)
                    .and_then(|chunks| chunks.get_mut(&chunk))
                    .map(|positions| positions.remove(&pos))
                    .unwrap_or(false);
                if !owned {
                    return None;
                }
                // Prune emptied provenance maps.
                if let Some(chunks) = state.provenance.get_mut(layer) {
                    if chunks.get(&chunk).is_some_and(|p| p.is_empty()) {
                        chunks.remove(&chunk);
                    }
                    if chunks.is_empty() {
                        state.provenance.remove(layer);
                    }
                }

                let chunk_overlay = state.chunks.get_mut(&chunk)?;
                let mut changed = false;
                if let Some(stack) = chunk_overlay.positions.get_mut(&pos) {
                    let before = stack.len();
                    stack.retain(|c| c.layer != layer);
                    changed = stack.len() != before;
                    if stack.is_empty() {
                        chunk_overlay.positions.remove(&pos);
                    }
                }
                if chunk_overlay.positions.is_empty() {
                    state.chunks.remove(&chunk);
                }
                changed.then_some(chunk)
            }
        }
    }

    /// Resolved overlay for one chunk; `None` when the viewer is unknown
    /// or has nothing there.
    pub fn effective_for_chunk(&self, viewer: ViewerId, chunk: ChunkPos) -> Option<EffectiveOverlay> {
        let viewers = self.viewers.read().unwrap_or_else(|e| e.into_inner());
        let overlay = viewers.get(&viewer)?.chunks.get(&chunk)?.effective();
        (!overlay.is_empty()).then_some(overlay)
    }

    /// Effective value at a single position, if overridden.
    pub fn effective_at(&self, viewer: ViewerId, pos: BlockPos) -> Option<BlockState> {
        let viewers = self.viewers.read().unwrap_or_else(|e| e.into_inner());
        viewers
            .get(&viewer)?
            .chunks
            .get(&pos.chunk())?
            .positions
            .get(&pos)?
            .iter()
            .max_by_key(|c| (c.priority, c.seq))
            .map(|c| c.value)
    }

    /// All chunks a viewer currently overrides.
    pub fn overridden_chunks(&self, viewer: ViewerId) -> Vec<ChunkPos> {
        let viewers = self.viewers.read().unwrap_or_else(|e| e.into_inner());
        viewers
            .get(&viewer)
            .map(|state| state.chunks.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.viewers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Checks the provenance invariant for a viewer: the union of all
    /// layers' contributed positions equals the overlay's keys, chunk by
    /// chunk. Test/debug aid.
    #[doc(hidden)]
    pub fn provenance_consistent(&self, viewer: ViewerId) -> bool {
        let viewers = self.viewers.read().unwrap_or_else(|e| e.into_inner());
        let Some(state) = viewers.get(&viewer) else {
            return true;
        };

        let mut union: HashMap<ChunkPos, HashSet<BlockPos>> = HashMap::new();
        for chunks in state.provenance.values() {
            for (chunk, positions) in chunks {
                union.entry(*chunk).or_default().extend(positions.iter());
            }
        }

        let overlay_keys: HashMap<ChunkPos, HashSet<BlockPos>> = state
            .chunks
            .iter()
            .map(|(chunk, overlay)| (*chunk, overlay.positions.keys().copied().collect()))
            .collect();

        union == overlay_keys
    }
}
