use serde::{Deserialize, Serialize};

/// Absolute block position in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Coordinates of a 16x16 chunk column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk column this position falls in.
    pub fn chunk(&self) -> ChunkPos {
        ChunkPos {
            x: self.x >> 4,
            z: self.z >> 4,
        }
    }

    /// Index of the 16-block-tall vertical section this position falls in.
    /// Negative for positions below y=0.
    pub fn section_y(&self) -> i32 {
        self.y >> 4
    }

    /// Coordinates local to the containing section, each in 0..16.
    pub fn local(&self) -> (usize, usize, usize) {
        (
            (self.x & 15) as usize,
            (self.y & 15) as usize,
            (self.z & 15) as usize,
        )
    }

    /// Voxel index within a section using the wire layout `y<<8 | z<<4 | x`.
    pub fn section_index(&self) -> usize {
        let (x, y, z) = self.local();
        (y << 8) | (z << 4) | x
    }
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// World coordinate of this chunk's west/north corner block.
    pub fn origin(&self) -> (i32, i32) {
        (self.x << 4, self.z << 4)
    }
}

impl std::fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}
