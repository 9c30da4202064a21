use crate::config::EngineConfig;
use crate::light::LightOverrideStore;
use crate::metrics::Instrumentation;
use crate::overlay::{OverlayCache, ViewerId};
use crate::result_cache::ResultCache;
use crate::scheduler::DispatchScheduler;
use crate::snapshot::WorldView;
use crate::state_cache::BinaryStateCache;
use crate::synth::ChunkSynthesizer;
use crate::transport::ChunkTransport;
use mirage_common::{BlockPos, BlockState, ChunkPos, LightOverride, Result};
use mirage_protocol::MultiBlockChangePacket;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// The per-viewer overlay and chunk-synthesis engine. One instance per
/// hosting server, owned and driven by the composing application; there is
/// deliberately no global accessor.
///
/// Threading: every method except the synthesis internals must be called
/// from the host's main loop. `tick()` is the per-server-tick drive point.
pub struct OverlayEngine {
    config: EngineConfig,
    overlays: OverlayCache,
    light_overrides: Mutex<LightOverrideStore>,
    result_cache: ResultCache,
    state_cache: Arc<BinaryStateCache>,
    metrics: Arc<Instrumentation>,
    scheduler: DispatchScheduler,
    transport: Arc<dyn ChunkTransport>,
    stopped: bool,
}

impl OverlayEngine {
    pub fn new(
        config: EngineConfig,
        world: Arc<dyn WorldView>,
        transport: Arc<dyn ChunkTransport>,
    ) -> Result<Self> {
        config.validate()?;

        let state_cache = Arc::new(BinaryStateCache::new());
        let metrics = Arc::new(Instrumentation::new());
        let synthesizer = ChunkSynthesizer::new(
            Arc::clone(&state_cache),
            config.light_mode,
            config.default_biome,
            config.world_sections,
        );
        let scheduler = DispatchScheduler::new(
            config.pool_size,
            config.task_queue_bound,
            config.chunks_per_tick,
            world,
            synthesizer,
            Arc::clone(&metrics),
        );

        info!(
            pool_size = config.pool_size,
            chunks_per_tick = config.chunks_per_tick,
            light_mode = ?config.light_mode,
            "overlay engine up"
        );

        let result_cache = ResultCache::new(config.result_cache_capacity);
        Ok(Self {
            config,
            overlays: OverlayCache::new(),
            light_overrides: Mutex::new(LightOverrideStore::new()),
            result_cache,
            state_cache,
            metrics,
            scheduler,
            transport,
            stopped: false,
        })
    }

    // ---- viewer lifecycle -------------------------------------------------

    pub fn init_viewer(&mut self, viewer: ViewerId) {
        self.overlays.init_viewer(viewer);
    }

    /// Full teardown of a viewer: overlay state, cached results, and any
    /// active drain.
    pub fn drop_viewer(&mut self, viewer: ViewerId) {
        self.scheduler.cancel_viewer(viewer);
        self.overlays.drop_viewer(viewer);
        self.result_cache.evict_viewer(viewer);
    }

    // ---- overlay mutation (main loop only) --------------------------------

    pub fn merge_layer(
        &mut self,
        viewer: ViewerId,
        layer: &str,
        priority: i32,
        contributions: &HashMap<ChunkPos, HashMap<BlockPos, BlockState>>,
    ) {
        let started = self.metrics.start();
        let touched = self
            .overlays
            .merge_layer(viewer, layer, priority, contributions);
        for chunk in touched {
            self.result_cache.invalidate(viewer, chunk);
        }
        self.metrics.record("merge_layer", started);
    }

    pub fn unmerge_layer(&mut self, viewer: ViewerId, layer: &str) {
        let started = self.metrics.start();
        let touched = self.overlays.unmerge_layer(viewer, layer);
        for chunk in touched {
            self.result_cache.invalidate(viewer, chunk);
        }
        self.metrics.record("unmerge_layer", started);
    }

    pub fn apply_point_change(
        &mut self,
        viewer: ViewerId,
        layer: &str,
        priority: i32,
        pos: BlockPos,
        value: Option<BlockState>,
    ) {
        if let Some(chunk) = self
            .overlays
            .apply_point_change(viewer, layer, priority, pos, value)
        {
            self.result_cache.invalidate(viewer, chunk);
        }
    }

    // ---- lighting overrides -----------------------------------------------

    /// Values outside [0,15] are rejected with `InvalidInput` and leave no
    /// side effects.
    pub fn set_light_override(
        &mut self,
        scope: &str,
        pos: BlockPos,
        block: Option<u8>,
        sky: Option<u8>,
    ) -> Result<()> {
        self.light_overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .set(scope, pos, block, sky)
    }

    pub fn clear_light_override(&mut self, scope: &str, pos: BlockPos) {
        self.light_overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear(scope, pos);
    }

    pub fn clear_light_scope(&mut self, scope: &str) {
        self.light_overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear_scope(scope);
    }

    pub fn get_light_override(&self, scope: &str, pos: BlockPos) -> Option<LightOverride> {
        self.light_overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(scope, pos)
    }

    // ---- delivery ---------------------------------------------------------

    /// Enqueues a drain of `chunks` for each known viewer in `viewers`.
    /// Unknown viewers are skipped; a viewer's existing drain is replaced.
    pub fn send_chunks(&mut self, viewers: &[ViewerId], chunks: &[ChunkPos], unload: bool) {
        if self.stopped {
            return;
        }
        let known: Vec<Uuid> = viewers
            .iter()
            .copied()
            .filter(|v| self.overlays.viewer_known(*v))
            .collect();
        self.scheduler.schedule_send(&known, chunks, unload);
    }

    /// Pushes single-position deltas from the current overlay, bypassing
    /// full-column synthesis. Positions without an override are skipped
    /// (the host world value is already what the client sees).
    pub fn send_point_changes(&mut self, viewer: ViewerId, positions: &[BlockPos]) {
        if self.stopped || !self.overlays.viewer_known(viewer) {
            return;
        }

        let mut per_chunk: HashMap<ChunkPos, Vec<(BlockPos, BlockState)>> = HashMap::new();
        for &pos in positions {
            if let Some(state) = self.overlays.effective_at(viewer, pos) {
                per_chunk.entry(pos.chunk()).or_default().push((pos, state));
            }
        }

        for (chunk, changes) in per_chunk {
            let mut packet = MultiBlockChangePacket::new(chunk);
            for (pos, state) in changes {
                if let Err(e) = packet.push(pos, state) {
                    warn!(%viewer, %chunk, error = %e, "skipping point change");
                }
            }
            if packet.is_empty() {
                continue;
            }
            if let Err(e) = self.transport.send_block_changes(viewer, &packet) {
                warn!(%viewer, %chunk, error = %e, "block change send failed");
            } else {
                self.metrics.add("point_changes_sent", packet.len() as u64);
            }
        }
    }

    /// Drives one scheduler step. Call once per server tick, from the
    /// main loop.
    pub fn tick(&mut self) {
        if self.stopped {
            return;
        }
        let started = self.metrics.start();

        let overlays = &self.overlays;
        let result_cache = &self.result_cache;
        let light_overrides = &self.light_overrides;
        self.scheduler.tick(self.transport.as_ref(), |viewer, chunk| {
            let overlay = result_cache.get_or_insert_with(viewer, chunk, || {
                overlays
                    .effective_for_chunk(viewer, chunk)
                    .unwrap_or_default()
            });
            let overlay = (!overlay.is_empty()).then_some(overlay);
            let lights = light_overrides
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .for_chunk(chunk);
            (overlay, lights)
        });

        self.metrics.record("tick", started);
    }

    // ---- diagnostics ------------------------------------------------------

    /// Human-readable counters and latency table.
    pub fn performance_report(&self) -> String {
        let mut report = self.metrics.report();
        let (state_hits, state_misses) = self.state_cache.stats();
        let (result_hits, result_misses, invalidations) = self.result_cache.stats();
        report.push_str(&format!(
            "caches:\n  state memo    {} entries, {} hits / {} misses\n  result cache  {} entries, {} hits / {} misses, {} invalidations\n",
            self.state_cache.len(),
            state_hits,
            state_misses,
            self.result_cache.len(),
            result_hits,
            result_misses,
            invalidations,
        ));
        report
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn active_drains(&self) -> usize {
        self.scheduler.active_drains()
    }

    // ---- shutdown ---------------------------------------------------------

    /// Cancels all pending drains, stops the worker pool, clears caches
    /// and logs final counters. Further calls are no-ops.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.scheduler.shutdown();
        self.overlays.clear();
        self.result_cache.clear();
        self.light_overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear_all();
        info!("overlay engine stopped\n{}", self.metrics.report());
    }
}

impl Drop for OverlayEngine {
    fn drop(&mut self) {
        if !self.stopped {
            self.shutdown();
        }
    }
}
