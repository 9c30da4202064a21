//! Shared fixtures for the engine integration tests.

use mirage_common::{BlockPos, BlockState, ChunkPos};
use mirage_engine::snapshot::{ColumnSnapshot, SectionSnapshot, WorldView};
use mirage_engine::synth::ColumnUnit;
use mirage_engine::transport::ChunkTransport;
use mirage_engine::ViewerId;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const STONE: BlockState = BlockState {
    block_type: 1,
    properties: 0,
};
pub const ORE: BlockState = BlockState {
    block_type: 73,
    properties: 0,
};

/// World with one stone section (section 4) in every chunk, except chunks
/// registered as broken, which yield a malformed snapshot.
pub struct FakeWorld {
    sections: usize,
    broken: HashSet<ChunkPos>,
    missing: HashSet<ChunkPos>,
}

impl FakeWorld {
    pub fn new() -> Self {
        Self {
            sections: 16,
            broken: HashSet::new(),
            missing: HashSet::new(),
        }
    }

    pub fn with_broken(mut self, chunk: ChunkPos) -> Self {
        self.broken.insert(chunk);
        self
    }

    pub fn with_missing(mut self, chunk: ChunkPos) -> Self {
        self.missing.insert(chunk);
        self
    }
}

impl WorldView for FakeWorld {
    fn column_snapshot(&self, chunk: ChunkPos) -> Option<ColumnSnapshot> {
        if self.missing.contains(&chunk) {
            return None;
        }
        if self.broken.contains(&chunk) {
            // Wrong section count triggers a synthesis error.
            return Some(ColumnSnapshot::empty(chunk, 3));
        }
        let mut snapshot = ColumnSnapshot::empty(chunk, self.sections);
        snapshot.put_section(4, SectionSnapshot::filled(STONE, 3, 15));
        Some(snapshot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Column(ViewerId, ChunkPos),
    Unload(ViewerId, ChunkPos),
    BlockChanges(ViewerId, ChunkPos, usize),
}

/// Transport that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingTransport {
    pub events: Mutex<Vec<Sent>>,
    pub columns: Mutex<Vec<(ViewerId, ColumnUnit)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Sent> {
        self.events.lock().unwrap().clone()
    }

    pub fn columns_for(&self, viewer: ViewerId) -> Vec<ColumnUnit> {
        self.columns
            .lock()
            .unwrap()
            .iter()
            .filter(|(v, _)| *v == viewer)
            .map(|(_, unit)| unit.clone())
            .collect()
    }

    pub fn column_count(&self, viewer: ViewerId) -> usize {
        self.columns
            .lock()
            .unwrap()
            .iter()
            .filter(|(v, _)| *v == viewer)
            .count()
    }
}

impl ChunkTransport for RecordingTransport {
    fn send_column(&self, viewer: ViewerId, unit: &ColumnUnit) -> io::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(Sent::Column(viewer, unit.chunk));
        self.columns.lock().unwrap().push((viewer, unit.clone()));
        Ok(())
    }

    fn send_unload(&self, viewer: ViewerId, chunk: ChunkPos) -> io::Result<()> {
        self.events.lock().unwrap().push(Sent::Unload(viewer, chunk));
        Ok(())
    }

    fn send_block_changes(
        &self,
        viewer: ViewerId,
        packet: &mirage_protocol::MultiBlockChangePacket,
    ) -> io::Result<()> {
        // The packet does not expose its chunk; tests only need counts.
        self.events.lock().unwrap().push(Sent::BlockChanges(
            viewer,
            ChunkPos::new(0, 0),
            packet.len(),
        ));
        Ok(())
    }
}

/// Routes engine tracing into the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Ticks the engine until `done` holds or the deadline passes.
pub fn tick_until<F>(engine: &mut mirage_engine::OverlayEngine, mut done: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        engine.tick();
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

/// Contribution payload for a single position.
pub fn single_block(pos: BlockPos, state: BlockState) -> HashMap<ChunkPos, HashMap<BlockPos, BlockState>> {
    let mut inner = HashMap::new();
    inner.insert(pos, state);
    let mut outer = HashMap::new();
    outer.insert(pos.chunk(), inner);
    outer
}
