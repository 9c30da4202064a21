use crate::metrics::Instrumentation;
use crate::overlay::{EffectiveOverlay, ViewerId};
use crate::snapshot::WorldView;
use crate::synth::{ChunkSynthesizer, ColumnUnit};
use crate::transport::ChunkTransport;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use mirage_common::{BlockPos, ChunkPos, LightOverride, MirageError};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, warn};

/// A unit of work handed to the synthesis pool.
struct SynthTask {
    viewer: ViewerId,
    chunk: ChunkPos,
    /// Which drain this task belongs to; outcomes from a replaced drain
    /// are discarded.
    generation: u64,
    /// Position within the drain, for in-order transmission.
    seq: u64,
    overlay: Option<Arc<EffectiveOverlay>>,
    light_overrides: Vec<(BlockPos, LightOverride)>,
    cancel: Arc<AtomicBool>,
}

struct SynthOutcome {
    viewer: ViewerId,
    generation: u64,
    seq: u64,
    chunk: ChunkPos,
    result: Result<ColumnUnit, MirageError>,
}

/// Fixed pool of synthesis workers fed through a bounded channel. Workers
/// only read shared state, so they may run while the main loop mutates
/// overlays for later ticks.
struct WorkerPool {
    task_tx: Option<Sender<SynthTask>>,
    outcome_rx: Receiver<SynthOutcome>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn new(
        pool_size: usize,
        queue_bound: usize,
        world: Arc<dyn WorldView>,
        synthesizer: ChunkSynthesizer,
        metrics: Arc<Instrumentation>,
    ) -> Self {
        let (task_tx, task_rx) = crossbeam_channel::bounded::<SynthTask>(queue_bound);
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(pool_size);
        for worker in 0..pool_size {
            let task_rx = task_rx.clone();
            let outcome_tx = outcome_tx.clone();
            let world = Arc::clone(&world);
            let synthesizer = synthesizer.clone();
            let metrics = Arc::clone(&metrics);
            let shutdown = Arc::clone(&shutdown);

            let handle = std::thread::Builder::new()
                .name(format!("mirage-synth-{worker}"))
                .spawn(move || {
                    worker_loop(task_rx, outcome_tx, world, synthesizer, metrics, shutdown)
                })
                .expect("failed to spawn synthesis worker");
            handles.push(handle);
        }

        Self {
            task_tx: Some(task_tx),
            outcome_rx,
            shutdown,
            handles,
        }
    }

    fn try_submit(&self, task: SynthTask) -> Result<(), SynthTask> {
        let Some(tx) = &self.task_tx else {
            return Err(task);
        };
        match tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(task)) | Err(TrySendError::Disconnected(task)) => Err(task),
        }
    }

    fn drain_outcomes(&self) -> Vec<SynthOutcome> {
        self.outcome_rx.try_iter().collect()
    }

    fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Closing the channel wakes idle workers; in-flight tasks finish
        // and their output is discarded.
        self.task_tx = None;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("synthesis worker panicked during shutdown");
            }
        }
    }
}

fn worker_loop(
    task_rx: Receiver<SynthTask>,
    outcome_tx: Sender<SynthOutcome>,
    world: Arc<dyn WorldView>,
    synthesizer: ChunkSynthesizer,
    metrics: Arc<Instrumentation>,
    shutdown: Arc<AtomicBool>,
) {
    for task in task_rx.iter() {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        if task.cancel.load(Ordering::Relaxed) {
            // Still report back so the drain's in-flight count settles.
            let _ = outcome_tx.send(SynthOutcome {
                viewer: task.viewer,
                generation: task.generation,
                seq: task.seq,
                chunk: task.chunk,
                result: Err(MirageError::Unexpected("cancelled".into())),
            });
            continue;
        }

        let started = Instant::now();
        let result = run_synthesis(&world, &synthesizer, &task);
        metrics.record("synthesize", started);

        let _ = outcome_tx.send(SynthOutcome {
            viewer: task.viewer,
            generation: task.generation,
            seq: task.seq,
            chunk: task.chunk,
            result,
        });
    }
}

/// Outermost boundary of one worker task: every failure, including a
/// panic, becomes an error value so one bad chunk cannot take down the
/// pool or another viewer's drain.
fn run_synthesis(
    world: &Arc<dyn WorldView>,
    synthesizer: &ChunkSynthesizer,
    task: &SynthTask,
) -> Result<ColumnUnit, MirageError> {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let snapshot = world.column_snapshot(task.chunk).ok_or_else(|| {
            MirageError::Synthesis(format!("world has no snapshot for chunk {}", task.chunk))
        })?;
        synthesizer.synthesize(
            task.chunk,
            &snapshot,
            task.overlay.as_deref(),
            &task.light_overrides,
        )
    }));

    match outcome {
        Ok(result) => result,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "opaque panic".to_owned());
            Err(MirageError::Unexpected(format!(
                "synthesis panicked for chunk {}: {}",
                task.chunk, msg
            )))
        }
    }
}

/// One viewer's in-progress drain: `Idle` is simply absence from the map.
struct Drain {
    queue: VecDeque<ChunkPos>,
    unload: bool,
    generation: u64,
    cancel: Arc<AtomicBool>,
    next_seq: u64,
    next_to_send: u64,
    /// Completed units that arrived ahead of their turn.
    ready: BTreeMap<u64, SynthOutcome>,
    in_flight: usize,
    started: Instant,
    sent: u64,
}

impl Drain {
    fn finished(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0 && self.ready.is_empty()
    }
}

/// Rate-limited, cancellable delivery of chunk units. Driven by the host
/// main loop via [`tick`](Self::tick); at most one active drain per viewer,
/// scheduling again replaces the previous drain outright.
pub struct DispatchScheduler {
    pool: WorkerPool,
    drains: HashMap<ViewerId, Drain>,
    chunks_per_tick: usize,
    generation: u64,
    metrics: Arc<Instrumentation>,
}

impl DispatchScheduler {
    pub fn new(
        pool_size: usize,
        queue_bound: usize,
        chunks_per_tick: usize,
        world: Arc<dyn WorldView>,
        synthesizer: ChunkSynthesizer,
        metrics: Arc<Instrumentation>,
    ) -> Self {
        Self {
            pool: WorkerPool::new(pool_size, queue_bound, world, synthesizer, Arc::clone(&metrics)),
            drains: HashMap::new(),
            chunks_per_tick: chunks_per_tick.max(1),
            generation: 0,
            metrics,
        }
    }

    /// Starts (or replaces) a drain for each viewer. Chunks are sent in
    /// the order given.
    pub fn schedule_send(&mut self, viewers: &[ViewerId], chunks: &[ChunkPos], unload: bool) {
        for &viewer in viewers {
            if let Some(previous) = self.drains.remove(&viewer) {
                previous.cancel.store(true, Ordering::Relaxed);
                self.metrics.inc("drains_replaced");
            }
            self.generation += 1;
            self.drains.insert(
                viewer,
                Drain {
                    queue: chunks.iter().copied().collect(),
                    unload,
                    generation: self.generation,
                    cancel: Arc::new(AtomicBool::new(false)),
                    next_seq: 0,
                    next_to_send: 0,
                    ready: BTreeMap::new(),
                    in_flight: 0,
                    started: Instant::now(),
                    sent: 0,
                },
            );
            self.metrics.inc("drains_started");
        }
    }

    /// Stops a viewer's drain immediately. In-flight tasks finish but
    /// their output is discarded.
    pub fn cancel_viewer(&mut self, viewer: ViewerId) {
        if let Some(drain) = self.drains.remove(&viewer) {
            drain.cancel.store(true, Ordering::Relaxed);
            self.metrics.inc("drains_cancelled");
        }
    }

    pub fn cancel_all(&mut self) {
        let viewers: Vec<_> = self.drains.keys().copied().collect();
        for viewer in viewers {
            self.cancel_viewer(viewer);
        }
    }

    pub fn active_drains(&self) -> usize {
        self.drains.len()
    }

    /// One main-loop step: collect finished units, transmit in order,
    /// then submit up to `chunks_per_tick` new tasks per viewer.
    /// `snapshot_overlay` resolves the viewer's current overlay and light
    /// overrides for a chunk; it runs on the caller's thread.
    pub fn tick<F>(&mut self, transport: &dyn ChunkTransport, mut snapshot_overlay: F)
    where
        F: FnMut(
            ViewerId,
            ChunkPos,
        ) -> (Option<Arc<EffectiveOverlay>>, Vec<(BlockPos, LightOverride)>),
    {
        self.collect_outcomes();
        self.transmit_ready(transport);
        self.submit_new(&mut snapshot_overlay);
        self.reap_finished();
    }

    fn collect_outcomes(&mut self) {
        for outcome in self.pool.drain_outcomes() {
            let Some(drain) = self.drains.get_mut(&outcome.viewer) else {
                // Viewer drain gone; late output is dropped.
                continue;
            };
            if drain.generation != outcome.generation {
                continue;
            }
            drain.in_flight -= 1;
            drain.ready.insert(outcome.seq, outcome);
        }
    }

    fn transmit_ready(&mut self, transport: &dyn ChunkTransport) {
        for (viewer, drain) in self.drains.iter_mut() {
            while let Some(outcome) = drain.ready.remove(&drain.next_to_send) {
                drain.next_to_send += 1;
                match outcome.result {
                    Ok(unit) => {
                        if drain.unload {
                            if let Err(e) = transport.send_unload(*viewer, outcome.chunk) {
                                warn!(%viewer, chunk = %outcome.chunk, error = %e, "unload send failed");
                            }
                        }
                        match transport.send_column(*viewer, &unit) {
                            Ok(()) => {
                                drain.sent += 1;
                                self.metrics.inc("chunks_sent");
                            }
                            Err(e) => {
                                warn!(%viewer, chunk = %outcome.chunk, error = %e, "column send failed");
                                self.metrics.inc("send_failures");
                            }
                        }
                    }
                    Err(MirageError::Synthesis(msg)) => {
                        // Scoped to this chunk; the viewer transiently sees
                        // the raw world until the chunk is rescheduled.
                        warn!(%viewer, chunk = %outcome.chunk, %msg, "chunk synthesis skipped");
                        self.metrics.inc("synthesis_failures");
                    }
                    Err(e) => {
                        error!(%viewer, chunk = %outcome.chunk, error = %e, "synthesis task failed");
                        self.metrics.inc("task_failures");
                    }
                }
            }
        }
    }

    fn submit_new<F>(&mut self, snapshot_overlay: &mut F)
    where
        F: FnMut(
            ViewerId,
            ChunkPos,
        ) -> (Option<Arc<EffectiveOverlay>>, Vec<(BlockPos, LightOverride)>),
    {
        for (viewer, drain) in self.drains.iter_mut() {
            let mut submitted = 0;
            while submitted < self.chunks_per_tick {
                let Some(chunk) = drain.queue.pop_front() else {
                    break;
                };
                let (overlay, light_overrides) = snapshot_overlay(*viewer, chunk);
                let task = SynthTask {
                    viewer: *viewer,
                    chunk,
                    generation: drain.generation,
                    seq: drain.next_seq,
                    overlay,
                    light_overrides,
                    cancel: Arc::clone(&drain.cancel),
                };
                match self.pool.try_submit(task) {
                    Ok(()) => {
                        drain.next_seq += 1;
                        drain.in_flight += 1;
                        submitted += 1;
                    }
                    Err(_rejected) => {
                        // Queue full: retry this chunk next tick, keeping
                        // its place at the head of the drain.
                        drain.queue.push_front(chunk);
                        self.metrics.inc("submissions_deferred");
                        break;
                    }
                }
            }
        }
    }

    fn reap_finished(&mut self) {
        let finished: Vec<_> = self
            .drains
            .iter()
            .filter(|(_, drain)| drain.finished())
            .map(|(viewer, _)| *viewer)
            .collect();
        for viewer in finished {
            if let Some(drain) = self.drains.remove(&viewer) {
                debug!(
                    %viewer,
                    chunks = drain.sent,
                    elapsed_ms = drain.started.elapsed().as_millis() as u64,
                    "drain complete"
                );
                self.metrics.inc("drains_completed");
            }
        }
    }

    /// Stops everything: cancels drains and joins the worker pool.
    pub fn shutdown(&mut self) {
        self.cancel_all();
        self.pool.shutdown();
    }
}

impl Drop for DispatchScheduler {
    fn drop(&mut self) {
        if self.pool.task_tx.is_some() {
            self.shutdown();
        }
    }
}
