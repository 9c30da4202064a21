use crate::packet::{Packet, PacketBuffer};
use std::io;

/// Updates light levels for a chunk column. Sections flagged in the empty
/// masks carry no array and tell the client to recompute those sections
/// itself.
#[derive(Debug, Clone)]
pub struct UpdateLightPacket {
    chunk_x: i32,
    chunk_z: i32,
    trust_edges: bool,
    sky_light_mask: i32,
    block_light_mask: i32,
    empty_sky_light_mask: i32,
    empty_block_light_mask: i32,
    sky_light_arrays: Vec<Vec<u8>>,
    block_light_arrays: Vec<Vec<u8>>,
}

impl UpdateLightPacket {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chunk_x: i32,
        chunk_z: i32,
        trust_edges: bool,
        sky_light_mask: i32,
        block_light_mask: i32,
        empty_sky_light_mask: i32,
        empty_block_light_mask: i32,
        sky_light_arrays: Vec<Vec<u8>>,
        block_light_arrays: Vec<Vec<u8>>,
    ) -> io::Result<Self> {
        for array in sky_light_arrays.iter().chain(block_light_arrays.iter()) {
            if array.len() != 2048 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("light array must be exactly 2048 bytes, got {}", array.len()),
                ));
            }
        }

        Ok(Self {
            chunk_x,
            chunk_z,
            trust_edges,
            sky_light_mask,
            block_light_mask,
            empty_sky_light_mask,
            empty_block_light_mask,
            sky_light_arrays,
            block_light_arrays,
        })
    }

    pub fn sky_light_mask(&self) -> i32 {
        self.sky_light_mask
    }

    pub fn block_light_mask(&self) -> i32 {
        self.block_light_mask
    }

    pub fn empty_sky_light_mask(&self) -> i32 {
        self.empty_sky_light_mask
    }

    pub fn empty_block_light_mask(&self) -> i32 {
        self.empty_block_light_mask
    }

    pub fn block_light_arrays(&self) -> &[Vec<u8>] {
        &self.block_light_arrays
    }

    pub fn sky_light_arrays(&self) -> &[Vec<u8>] {
        &self.sky_light_arrays
    }
}

impl Packet for UpdateLightPacket {
    fn packet_id() -> i32 {
        0x23
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> io::Result<()> {
        buffer.write_varint(Self::packet_id());

        buffer.write_varint(self.chunk_x);
        buffer.write_varint(self.chunk_z);
        buffer.write_bool(self.trust_edges);

        buffer.write_varint(self.sky_light_mask);
        buffer.write_varint(self.block_light_mask);
        buffer.write_varint(self.empty_sky_light_mask);
        buffer.write_varint(self.empty_block_light_mask);

        for array in &self.sky_light_arrays {
            buffer.write_varint(2048);
            buffer.write_bytes_raw(array);
        }

        for array in &self.block_light_arrays {
            buffer.write_varint(2048);
            buffer.write_bytes_raw(array);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn rejects_wrong_array_size() {
        let result = UpdateLightPacket::new(0, 0, true, 1, 0, 0, 0, vec![vec![0; 100]], vec![]);
        assert_matches!(result, Err(e) if e.kind() == io::ErrorKind::InvalidData);
    }

    #[test]
    fn write_shape() {
        let packet = UpdateLightPacket::new(
            1,
            2,
            true,
            0b01,
            0b01,
            0b10,
            0b10,
            vec![vec![0xAA; 2048]],
            vec![vec![0x55; 2048]],
        )
        .unwrap();

        let mut buffer = PacketBuffer::new();
        packet.write_to_buffer(&mut buffer).unwrap();

        let mut read = PacketBuffer::from_bytes(buffer.buffer);
        assert_eq!(read.read_varint().unwrap(), UpdateLightPacket::packet_id());
        assert_eq!(read.read_varint().unwrap(), 1);
        assert_eq!(read.read_varint().unwrap(), 2);
        assert!(read.read_bool().unwrap());
        assert_eq!(read.read_varint().unwrap(), 0b01);
        assert_eq!(read.read_varint().unwrap(), 0b01);
        assert_eq!(read.read_varint().unwrap(), 0b10);
        assert_eq!(read.read_varint().unwrap(), 0b10);
        assert_eq!(read.read_varint().unwrap(), 2048);
    }
}
