use mirage_common::{BlockState, ChunkPos};

/// Per-voxel contents of one vertical section, captured point-in-time from
/// the host world. Indexed by `y<<8 | z<<4 | x` (section-local).
#[derive(Debug, Clone)]
pub struct SectionSnapshot {
    blocks: Vec<BlockState>,
    /// Raw emitted-light values, one byte per voxel.
    block_light: Vec<u8>,
    /// Raw ambient sky-light values, one byte per voxel.
    sky_light: Vec<u8>,
}

pub const SECTION_VOLUME: usize = 4096;

impl SectionSnapshot {
    /// A section uniformly filled with one state and light pair.
    pub fn filled(state: BlockState, block_light: u8, sky_light: u8) -> Self {
        Self {
            blocks: vec![state; SECTION_VOLUME],
            block_light: vec![block_light; SECTION_VOLUME],
            sky_light: vec![sky_light; SECTION_VOLUME],
        }
    }

    pub fn block_at(&self, index: usize) -> BlockState {
        self.blocks[index]
    }

    pub fn block_light_at(&self, index: usize) -> u8 {
        self.block_light[index]
    }

    pub fn sky_light_at(&self, index: usize) -> u8 {
        self.sky_light[index]
    }

    pub fn set_block(&mut self, index: usize, state: BlockState) {
        self.blocks[index] = state;
    }

    pub fn set_light(&mut self, index: usize, block: u8, sky: u8) {
        self.block_light[index] = block;
        self.sky_light[index] = sky;
    }

    pub fn block_light_raw(&self) -> &[u8] {
        &self.block_light
    }

    pub fn sky_light_raw(&self) -> &[u8] {
        &self.sky_light
    }
}

/// Read-only snapshot of one chunk column. Absent sections are all air
/// with no recorded light.
#[derive(Debug, Clone)]
pub struct ColumnSnapshot {
    chunk: ChunkPos,
    sections: Vec<Option<SectionSnapshot>>,
}

impl ColumnSnapshot {
    pub fn new(chunk: ChunkPos, sections: Vec<Option<SectionSnapshot>>) -> Self {
        Self { chunk, sections }
    }

    /// An all-air column with the given number of sections.
    pub fn empty(chunk: ChunkPos, section_count: usize) -> Self {
        Self {
            chunk,
            sections: (0..section_count).map(|_| None).collect(),
        }
    }

    pub fn chunk(&self) -> ChunkPos {
        self.chunk
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn section(&self, section_y: usize) -> Option<&SectionSnapshot> {
        self.sections.get(section_y).and_then(|s| s.as_ref())
    }

    /// Inserts or replaces a section.
    pub fn put_section(&mut self, section_y: usize, section: SectionSnapshot) {
        if section_y < self.sections.len() {
            self.sections[section_y] = Some(section);
        }
    }
}

/// Provider of point-in-time world snapshots. Implemented by the host;
/// called from worker threads, so it must be safe to share.
pub trait WorldView: Send + Sync {
    /// Returns `None` for chunks the host has not loaded.
    fn column_snapshot(&self, chunk: ChunkPos) -> Option<ColumnSnapshot>;
}
