use crate::packet::{Packet, PacketBuffer};
use std::io;

/// Tells the client to forget a chunk column entirely. Sent immediately
/// before a replacement column when a viewer must visibly refresh
/// already-rendered geometry.
#[derive(Debug, Clone, Copy)]
pub struct UnloadChunkPacket {
    pub chunk_x: i32,
    pub chunk_z: i32,
}

impl UnloadChunkPacket {
    pub fn new(chunk_x: i32, chunk_z: i32) -> Self {
        Self { chunk_x, chunk_z }
    }
}

impl Packet for UnloadChunkPacket {
    fn packet_id() -> i32 {
        0x1D
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> io::Result<()> {
        buffer.write_varint(Self::packet_id());
        buffer.write_i32(self.chunk_x);
        buffer.write_i32(self.chunk_z);
        Ok(())
    }
}
