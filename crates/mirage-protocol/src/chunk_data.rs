use crate::packet::{Packet, PacketBuffer};
use mirage_common::BlockState;
use std::io;

/// One vertical 16-voxel-tall slab of a chunk column, as carried on the
/// wire: paletted block data plus two nibble-packed light channels.
#[derive(Debug, Clone)]
pub struct ChunkSection {
    /// Number of non-air blocks in the section.
    block_count: i16,
    /// Bits used per block in the packed data array.
    bits_per_block: u8,
    /// Block states packed into 64-bit longs.
    data_array: Vec<u64>,
    /// Emitted light, 4 bits per voxel (2048 bytes).
    block_light: Vec<u8>,
    /// Sky light, 4 bits per voxel; absent for dimensions without sky.
    sky_light: Option<Vec<u8>>,
    palette: Palette,
}

/// Packing width once a section stops using a local palette. Direct
/// entries are raw global ids, which occupy the full 32 bits.
pub const DIRECT_BITS_PER_BLOCK: u8 = 32;

/// Palette used to map packed indices to global block state ids.
#[derive(Debug, Clone)]
pub enum Palette {
    /// Packed values are global block state ids.
    Direct,
    /// Packed values index into the section-local palette.
    Indirect {
        bits_per_block: u8,
        palette: Vec<u32>,
    },
}

/// A full chunk-column transfer unit.
#[derive(Debug, Clone)]
pub struct ChunkDataPacket {
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub full_chunk: bool,
    /// Bitmask of the sections carried in this packet.
    pub primary_bit_mask: i32,
    /// Biome ids, 1024 entries (4x4x4 cells); present only for full chunks.
    pub biomes: Option<Vec<i32>>,
    pub sections: Vec<ChunkSection>,
}

impl Packet for ChunkDataPacket {
    fn packet_id() -> i32 {
        0x22
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> io::Result<()> {
        buffer.write_varint(Self::packet_id());

        buffer.write_varint(self.chunk_x);
        buffer.write_varint(self.chunk_z);
        buffer.write_bool(self.full_chunk);
        buffer.write_varint(self.primary_bit_mask);

        if self.full_chunk {
            if let Some(biomes) = &self.biomes {
                for biome in biomes {
                    buffer.write_varint(*biome);
                }
            }
        }

        // Section payload is framed by its byte size, so build it aside.
        let mut section_buffer = PacketBuffer::new();
        for section in &self.sections {
            section.write(&mut section_buffer);
        }

        buffer.write_varint(section_buffer.buffer.len() as i32);
        buffer.write_bytes_raw(&section_buffer.buffer);

        Ok(())
    }
}

impl ChunkSection {
    pub fn new() -> Self {
        Self::with_bits_per_block(4)
    }

    /// Creates an empty section packed at the given width.
    pub fn with_bits_per_block(bits: u8) -> Self {
        let data_array_size = (4096 * bits as usize + 63) / 64;
        ChunkSection {
            block_count: 0,
            bits_per_block: bits,
            data_array: vec![0; data_array_size],
            block_light: vec![0; 2048],
            sky_light: None,
            palette: Palette::new(bits),
        }
    }

    pub fn block_count(&self) -> i16 {
        self.block_count
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn set_block_light(&mut self, packed: Vec<u8>) {
        debug_assert_eq!(packed.len(), 2048);
        self.block_light = packed;
    }

    pub fn set_sky_light(&mut self, packed: Option<Vec<u8>>) {
        if let Some(ref arr) = packed {
            debug_assert_eq!(arr.len(), 2048);
        }
        self.sky_light = packed;
    }

    fn write(&self, buffer: &mut PacketBuffer) {
        buffer.write_u16(self.block_count as u16);
        buffer.write_u8(self.bits_per_block);

        match &self.palette {
            Palette::Direct => {}
            Palette::Indirect { palette, .. } => {
                buffer.write_varint(palette.len() as i32);
                for entry in palette {
                    buffer.write_varint(*entry as i32);
                }
            }
        }

        buffer.write_varint(self.data_array.len() as i32);
        for value in &self.data_array {
            buffer.write_i64(*value as i64);
        }

        for light in &self.block_light {
            buffer.write_u8(*light);
        }
        if let Some(sky_light) = &self.sky_light {
            for light in sky_light {
                buffer.write_u8(*light);
            }
        }
    }

    /// Stores a block state at section-local coordinates, growing the
    /// palette as needed. `index = y*256 + z*16 + x`.
    pub fn set_block_state(&mut self, x: usize, y: usize, z: usize, state: BlockState) {
        self.set_block_id(x, y, z, state.global_id());
    }

    /// Same as [`set_block_state`](Self::set_block_state) but takes an
    /// already-encoded global id.
    pub fn set_block_id(&mut self, x: usize, y: usize, z: usize, global_id: u32) {
        let state_id = match &self.palette {
            Palette::Direct => global_id as u64,
            Palette::Indirect { .. } => self.get_or_add_palette_entry(global_id) as u64,
        };
        self.write_packed(x, y, z, state_id);
    }

    fn write_packed(&mut self, x: usize, y: usize, z: usize, state_id: u64) {
        let index = (y * 16 * 16) + (z * 16) + x;
        let bits = self.bits_per_block as usize;
        // An oversized id must not bleed into neighbouring entries.
        let state_id = state_id & ((1u64 << bits) - 1);
        let long_index = (index * bits) / 64;
        let bit_offset = (index * bits) % 64;

        let clear_mask = !(((1u64 << bits) - 1) << bit_offset);
        self.data_array[long_index] &= clear_mask;
        self.data_array[long_index] |= state_id << bit_offset;

        // Value may span into the next long.
        if bit_offset + bits > 64 {
            let bits_in_next = bit_offset + bits - 64;
            let next = long_index + 1;
            if next < self.data_array.len() {
                let next_clear_mask = !((1u64 << bits_in_next) - 1);
                self.data_array[next] &= next_clear_mask;
                self.data_array[next] |= state_id >> (bits - bits_in_next);
            }
        }
    }

    pub fn get_block_state(&self, x: usize, y: usize, z: usize) -> BlockState {
        let index = (y * 16 * 16) + (z * 16) + x;
        let bits = self.bits_per_block as usize;
        let long_index = (index * bits) / 64;
        let bit_offset = (index * bits) % 64;

        let mut value = (self.data_array[long_index] >> bit_offset) as u32;
        if bit_offset + bits > 64 {
            let bits_in_next = bit_offset + bits - 64;
            let next = long_index + 1;
            if next < self.data_array.len() {
                value |= ((self.data_array[next] & ((1u64 << bits_in_next) - 1))
                    << (bits - bits_in_next)) as u32;
            }
        }
        value &= ((1u64 << bits) - 1) as u32;

        match &self.palette {
            Palette::Direct => BlockState::from_global_id(value),
            Palette::Indirect { palette, .. } => {
                if value as usize >= palette.len() {
                    BlockState::default()
                } else {
                    BlockState::from_global_id(palette[value as usize])
                }
            }
        }
    }

    /// Recounts non-air blocks; the client trusts this for culling.
    pub fn recalculate_block_count(&mut self) {
        let mut count = 0;
        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    if !self.get_block_state(x, y, z).is_air() {
                        count += 1;
                    }
                }
            }
        }
        self.block_count = count;
    }

    fn resize_palette_if_needed(&mut self) {
        if let Palette::Indirect {
            bits_per_block,
            ref palette,
        } = self.palette
        {
            let max_size = 1 << bits_per_block;
            if palette.len() >= max_size {
                let new_bits = if bits_per_block >= 8 {
                    // Give up on the local palette; use global ids
                    // directly. Global ids carry the full block type in
                    // the high half, so the direct width must hold all
                    // 32 bits.
                    DIRECT_BITS_PER_BLOCK
                } else {
                    bits_per_block + 1
                };

                let mut widened = ChunkSection::with_bits_per_block(new_bits);
                for y in 0..16 {
                    for z in 0..16 {
                        for x in 0..16 {
                            let state = self.get_block_state(x, y, z);
                            widened.set_block_state(x, y, z, state);
                        }
                    }
                }

                self.bits_per_block = new_bits;
                self.data_array = widened.data_array;
                self.palette = widened.palette;
            }
        }
    }

    fn get_or_add_palette_entry(&mut self, global_id: u32) -> u32 {
        match &mut self.palette {
            Palette::Direct => global_id,
            Palette::Indirect { palette, .. } => {
                match palette.iter().position(|&id| id == global_id) {
                    Some(index) => index as u32,
                    None => {
                        self.resize_palette_if_needed();

                        // The resize may have switched us to Direct.
                        match &mut self.palette {
                            Palette::Direct => global_id,
                            Palette::Indirect { palette, .. } => {
                                palette.push(global_id);
                                (palette.len() - 1) as u32
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Default for ChunkSection {
    fn default() -> Self {
        Self::new()
    }
}

impl Palette {
    pub fn new(bits_per_block: u8) -> Self {
        if bits_per_block >= 9 {
            Palette::Direct
        } else {
            // Air is seeded at index 0 so untouched (all-zero) packed
            // entries decode as air.
            Palette::Indirect {
                bits_per_block: bits_per_block.max(4),
                palette: vec![0],
            }
        }
    }

    pub fn bits_per_block(&self) -> u8 {
        match self {
            Palette::Direct => DIRECT_BITS_PER_BLOCK,
            Palette::Indirect { bits_per_block, .. } => *bits_per_block,
        }
    }
}

impl ChunkDataPacket {
    pub fn has_section(&self, y: u8) -> bool {
        y < 32 && (self.primary_bit_mask & (1 << y)) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_state_round_trip_within_section() {
        let mut section = ChunkSection::new();
        let stone = BlockState::new(1, 0);
        let ore = BlockState::new(73, 2);

        section.set_block_state(10, 0, 10, ore);
        section.set_block_state(0, 15, 15, stone);

        assert_eq!(section.get_block_state(10, 0, 10), ore);
        assert_eq!(section.get_block_state(0, 15, 15), stone);
        assert!(section.get_block_state(5, 5, 5).is_air());

        section.recalculate_block_count();
        assert_eq!(section.block_count(), 2);
    }

    #[test]
    fn palette_grows_past_initial_width() {
        let mut section = ChunkSection::new();
        // 4-bit palette holds 16 entries; air occupies one slot implicitly
        // only when written, so write 40 distinct states.
        for i in 0..40u16 {
            section.set_block_state((i % 16) as usize, (i / 16) as usize, 0, BlockState::new(i + 1, 0));
        }
        for i in 0..40u16 {
            assert_eq!(
                section.get_block_state((i % 16) as usize, (i / 16) as usize, 0),
                BlockState::new(i + 1, 0),
            );
        }
        assert!(section.palette().bits_per_block() > 4);
    }

    #[test]
    fn direct_palette_preserves_wide_ids() {
        let mut section = ChunkSection::new();

        // 512 distinct states overflow the 8-bit local palette and force
        // the direct encoding; every id has its block type in the high
        // 16 bits and must read back intact.
        let mut n = 0u16;
        for y in 0..2usize {
            for z in 0..16usize {
                for x in 0..16usize {
                    n += 1;
                    section.set_block_state(x, y, z, BlockState::new(n, 1));
                }
            }
        }
        assert_eq!(section.palette().bits_per_block(), DIRECT_BITS_PER_BLOCK);

        let mut n = 0u16;
        for y in 0..2usize {
            for z in 0..16usize {
                for x in 0..16usize {
                    n += 1;
                    assert_eq!(section.get_block_state(x, y, z), BlockState::new(n, 1));
                }
            }
        }
        assert!(section.get_block_state(0, 3, 0).is_air());
    }

    #[test]
    fn values_spanning_two_longs_survive() {
        let mut section = ChunkSection::with_bits_per_block(5);
        // With 5-bit packing, indices around 12/13 straddle the first long
        // boundary (12*5 = 60).
        let state = BlockState::new(9, 3);
        section.set_block_state(12, 0, 0, state);
        section.set_block_state(13, 0, 0, state);
        assert_eq!(section.get_block_state(12, 0, 0), state);
        assert_eq!(section.get_block_state(13, 0, 0), state);
    }

    #[test]
    fn packet_write_shape() {
        let mut section = ChunkSection::new();
        section.set_block_state(0, 0, 0, BlockState::new(1, 0));
        section.recalculate_block_count();

        let packet = ChunkDataPacket {
            chunk_x: 3,
            chunk_z: -2,
            full_chunk: true,
            primary_bit_mask: 1,
            biomes: Some(vec![127; 1024]),
            sections: vec![section],
        };

        let mut buffer = PacketBuffer::new();
        packet.write_to_buffer(&mut buffer).unwrap();

        let mut read = PacketBuffer::from_bytes(buffer.buffer);
        assert_eq!(read.read_varint().unwrap(), ChunkDataPacket::packet_id());
        assert_eq!(read.read_varint().unwrap(), 3);
        assert_eq!(read.read_varint().unwrap(), -2);
        assert!(read.read_bool().unwrap());
        assert_eq!(read.read_varint().unwrap(), 1);
        for _ in 0..1024 {
            assert_eq!(read.read_varint().unwrap(), 127);
        }
        let payload_size = read.read_varint().unwrap();
        assert_eq!(payload_size as usize, read.remaining());
    }
}
