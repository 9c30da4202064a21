use crate::packet::{Packet, PacketBuffer};
use mirage_common::{BlockPos, BlockState, ChunkPos};
use std::io;

/// A batch of single-block updates within one chunk column, used to push
/// small overlay deltas without re-sending the whole column.
#[derive(Debug, Clone)]
pub struct MultiBlockChangePacket {
    chunk: ChunkPos,
    records: Vec<BlockChangeRecord>,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockChangeRecord {
    /// Horizontal position packed as `x << 4 | z`, both chunk-local.
    horizontal: u8,
    y: u8,
    state_id: u32,
}

impl MultiBlockChangePacket {
    pub fn new(chunk: ChunkPos) -> Self {
        Self {
            chunk,
            records: Vec::new(),
        }
    }

    /// Adds a record; the position must fall inside this packet's chunk.
    pub fn push(&mut self, pos: BlockPos, state: BlockState) -> io::Result<()> {
        if pos.chunk() != self.chunk {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("position {:?} outside chunk {}", pos, self.chunk),
            ));
        }
        if !(0..=255).contains(&pos.y) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("y {} outside column height", pos.y),
            ));
        }
        let (x, _, z) = (pos.x & 15, pos.y, pos.z & 15);
        self.records.push(BlockChangeRecord {
            horizontal: ((x << 4) | z) as u8,
            y: pos.y as u8,
            state_id: state.global_id(),
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

impl Packet for MultiBlockChangePacket {
    fn packet_id() -> i32 {
        0x0F
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> io::Result<()> {
        buffer.write_varint(Self::packet_id());
        buffer.write_i32(self.chunk.x);
        buffer.write_i32(self.chunk.z);
        buffer.write_varint(self.records.len() as i32);
        for record in &self.records {
            buffer.write_u8(record.horizontal);
            buffer.write_u8(record.y);
            buffer.write_varint(record.state_id as i32);
        }
        Ok(())
    }
}
